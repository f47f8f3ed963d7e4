//! Drawing-element synthesis for the Excalidraw canvas.
//!
//! Turns partial creation requests (a brush stroke, a typed shape) into the
//! full element records the canvas expects: identifiers, ordering hints,
//! bounding boxes and element-local point coordinates.

pub mod element;
pub mod error;
pub mod identity;

pub use element::{
    BrushStroke, Bounds, DrawingElement, ElementKind, ElementSpec, ElementStyle,
    ElementSynthesizer, Point, parse_points,
};
pub use error::ElementError;
pub use identity::{IdentityGenerator, RandomIdentity, SequentialIdentity};
