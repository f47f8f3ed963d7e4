use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::error::ElementError;
use crate::identity::{IdentityGenerator, RandomIdentity};

pub const DEFAULT_STROKE_COLOR: &str = "#1e1e1e";
pub const DEFAULT_BACKGROUND_COLOR: &str = "transparent";
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;
pub const DEFAULT_ROUGHNESS: f64 = 1.0;
pub const DEFAULT_OPACITY: f64 = 100.0;
pub const DEFAULT_SIZE: f64 = 100.0;

const TEXT_FONT_SIZE: i64 = 20;
const TEXT_FONT_FAMILY: i64 = 1;
const TEXT_LINE_HEIGHT: f64 = 1.25;

/// A single input coordinate, `[x, y]` or `[x, y, pressure]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub pressure: Option<f64>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            pressure: None,
        }
    }

    fn to_value(self) -> Value {
        let mut coords = vec![number(self.x), number(self.y)];
        if let Some(pressure) = self.pressure {
            coords.push(number(pressure));
        }
        Value::Array(coords)
    }
}

/// Parse a `points` argument. Absent or `null` reads as no points; anything
/// that is not an array of 2-3 numbers is rejected with its position.
pub fn parse_points(value: Option<&Value>) -> Result<Vec<Point>, ElementError> {
    let items = match value {
        Some(Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let coords = item
                .as_array()
                .filter(|coords| (2..=3).contains(&coords.len()))
                .ok_or(ElementError::MalformedPoint { index })?;
            let nums = coords
                .iter()
                .map(Value::as_f64)
                .collect::<Option<Vec<f64>>>()
                .ok_or(ElementError::MalformedPoint { index })?;
            Ok(Point {
                x: nums[0],
                y: nums[1],
                pressure: nums.get(2).copied(),
            })
        })
        .collect()
}

/// Serialize a coordinate: integral values become JSON integers so element
/// records keep the shape the canvas produces itself.
pub fn number(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Axis-aligned bounding box of a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn of(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let seed = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        Some(points.iter().skip(1).fold(seed, |b, p| Bounds {
            min_x: b.min_x.min(p.x),
            min_y: b.min_y.min(p.y),
            max_x: b.max_x.max(p.x),
            max_y: b.max_y.max(p.y),
        }))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Re-express `point` relative to the top-left corner. Pressure is dropped.
    pub fn relative(&self, point: &Point) -> Point {
        Point::new(point.x - self.min_x, point.y - self.min_y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Diamond,
    Text,
    Line,
    Arrow,
    Freedraw,
    /// Passed through with base fields only
    Other(String),
}

impl ElementKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "rectangle" => ElementKind::Rectangle,
            "ellipse" => ElementKind::Ellipse,
            "diamond" => ElementKind::Diamond,
            "text" => ElementKind::Text,
            "line" => ElementKind::Line,
            "arrow" => ElementKind::Arrow,
            "freedraw" => ElementKind::Freedraw,
            other => ElementKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ElementKind::Rectangle => "rectangle",
            ElementKind::Ellipse => "ellipse",
            ElementKind::Diamond => "diamond",
            ElementKind::Text => "text",
            ElementKind::Line => "line",
            ElementKind::Arrow => "arrow",
            ElementKind::Freedraw => "freedraw",
            ElementKind::Other(raw) => raw,
        }
    }

    /// Display label: first letter upper-cased, the rest lower-cased.
    pub fn label(&self) -> String {
        let mut chars = self.as_str().chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementStyle {
    pub stroke_color: String,
    pub background_color: String,
    pub stroke_width: f64,
    pub roughness: f64,
    pub opacity: f64,
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            stroke_color: DEFAULT_STROKE_COLOR.to_string(),
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            roughness: DEFAULT_ROUGHNESS,
            opacity: DEFAULT_OPACITY,
        }
    }
}

/// Input for `draw_with_brush`.
#[derive(Debug, Clone, PartialEq)]
pub struct BrushStroke {
    pub points: Vec<Point>,
    pub stroke_color: String,
    pub stroke_width: f64,
    pub opacity: f64,
    pub roughness: f64,
}

/// Input for `create_element`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpec {
    pub kind: ElementKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub style: ElementStyle,
    pub text: String,
    pub points: Vec<Point>,
}

impl ElementSpec {
    pub fn new(kind: ElementKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            x,
            y,
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
            style: ElementStyle::default(),
            text: String::new(),
            points: Vec::new(),
        }
    }
}

/// A complete element record, ready to append to a canvas snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingElement(Map<String, Value>);

impl DrawingElement {
    pub fn id(&self) -> &str {
        self.0.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Builds element records from partial attributes. Identity comes from the
/// injected generator so tests can pin ids and timestamps.
#[derive(Clone)]
pub struct ElementSynthesizer {
    identity: Arc<dyn IdentityGenerator>,
}

impl Default for ElementSynthesizer {
    fn default() -> Self {
        Self::new(Arc::new(RandomIdentity))
    }
}

impl std::fmt::Debug for ElementSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementSynthesizer").finish_non_exhaustive()
    }
}

impl ElementSynthesizer {
    pub fn new(identity: Arc<dyn IdentityGenerator>) -> Self {
        Self { identity }
    }

    /// Freedraw element for a brush stroke. Points are normalized to the
    /// stroke's bounding box.
    pub fn brush_stroke(&self, stroke: &BrushStroke) -> Result<DrawingElement, ElementError> {
        if stroke.points.len() < 2 {
            return Err(ElementError::InsufficientBrushPoints);
        }
        let style = ElementStyle {
            stroke_color: stroke.stroke_color.clone(),
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            stroke_width: stroke.stroke_width,
            roughness: stroke.roughness,
            opacity: stroke.opacity,
        };
        let mut element = self.base("freedraw", 0.0, 0.0, 0.0, 0.0, &style);
        apply_freedraw_geometry(&mut element, &stroke.points);
        Ok(DrawingElement(element))
    }

    /// Generic element creation, branching on the element type.
    pub fn element(&self, spec: &ElementSpec) -> Result<DrawingElement, ElementError> {
        // Validate before drawing any identity so failures are side-effect free.
        match &spec.kind {
            ElementKind::Line | ElementKind::Arrow if spec.points.len() < 2 => {
                return Err(ElementError::InsufficientPoints {
                    element_type: spec.kind.as_str().to_string(),
                });
            }
            ElementKind::Freedraw if spec.points.len() < 2 => {
                return Err(ElementError::InsufficientFreedrawPoints);
            }
            _ => {}
        }

        let mut element = self.base(
            spec.kind.as_str(),
            spec.x,
            spec.y,
            spec.width,
            spec.height,
            &spec.style,
        );

        match &spec.kind {
            ElementKind::Text => {
                element.insert("text".into(), json!(spec.text));
                element.insert("fontSize".into(), json!(TEXT_FONT_SIZE));
                element.insert("fontFamily".into(), json!(TEXT_FONT_FAMILY));
                element.insert("textAlign".into(), json!("left"));
                element.insert("verticalAlign".into(), json!("top"));
                element.insert("containerId".into(), Value::Null);
                element.insert("originalText".into(), json!(spec.text));
                element.insert("lineHeight".into(), json!(TEXT_LINE_HEIGHT));
            }
            ElementKind::Line | ElementKind::Arrow => {
                let points: Vec<Value> = spec.points.iter().map(|p| p.to_value()).collect();
                let last = points.last().cloned().unwrap_or(Value::Null);
                element.insert("points".into(), Value::Array(points));
                element.insert("lastCommittedPoint".into(), last);
                if spec.kind == ElementKind::Arrow {
                    element.insert("startArrowhead".into(), Value::Null);
                    element.insert("endArrowhead".into(), json!("arrow"));
                }
            }
            ElementKind::Freedraw => apply_freedraw_geometry(&mut element, &spec.points),
            ElementKind::Rectangle
            | ElementKind::Ellipse
            | ElementKind::Diamond
            | ElementKind::Other(_) => {}
        }

        Ok(DrawingElement(element))
    }

    fn base(
        &self,
        kind: &str,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        style: &ElementStyle,
    ) -> Map<String, Value> {
        let identity = &self.identity;
        let record = json!({
            "id": identity.element_id(),
            "type": kind,
            "x": number(x),
            "y": number(y),
            "width": number(width),
            "height": number(height),
            "angle": 0,
            "strokeColor": style.stroke_color,
            "backgroundColor": style.background_color,
            "fillStyle": "solid",
            "strokeWidth": number(style.stroke_width),
            "strokeStyle": "solid",
            "roughness": number(style.roughness),
            "opacity": number(style.opacity),
            "groupIds": [],
            "frameId": null,
            "index": identity.ordering_index(),
            "roundness": null,
            "seed": identity.seed(),
            "version": 1,
            "versionNonce": identity.version_nonce(),
            "isDeleted": false,
            "boundElements": null,
            "updated": identity.timestamp_ms(),
            "link": null,
            "locked": false
        });
        match record {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

fn apply_freedraw_geometry(element: &mut Map<String, Value>, points: &[Point]) {
    let Some(bounds) = Bounds::of(points) else {
        return;
    };
    let relative: Vec<Value> = points
        .iter()
        .map(|p| bounds.relative(p).to_value())
        .collect();
    let last = relative.last().cloned().unwrap_or(Value::Null);

    element.insert("x".into(), number(bounds.min_x));
    element.insert("y".into(), number(bounds.min_y));
    element.insert("width".into(), number(bounds.width()));
    element.insert("height".into(), number(bounds.height()));
    element.insert("points".into(), Value::Array(relative));
    element.insert("pressures".into(), json!([]));
    element.insert("simulatePressure".into(), json!(true));
    element.insert("lastCommittedPoint".into(), last);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SequentialIdentity;

    fn synthesizer() -> ElementSynthesizer {
        ElementSynthesizer::new(Arc::new(SequentialIdentity::new(1_700_000_042_000)))
    }

    fn points(raw: &[[f64; 2]]) -> Vec<Point> {
        raw.iter().map(|[x, y]| Point::new(*x, *y)).collect()
    }

    fn stroke(raw: &[[f64; 2]]) -> BrushStroke {
        BrushStroke {
            points: points(raw),
            stroke_color: DEFAULT_STROKE_COLOR.to_string(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            opacity: DEFAULT_OPACITY,
            roughness: DEFAULT_ROUGHNESS,
        }
    }

    #[test]
    fn brush_stroke_normalizes_points_to_bounding_box() {
        let element = synthesizer()
            .brush_stroke(&stroke(&[[10.0, 10.0], [20.0, 15.0], [15.0, 25.0]]))
            .unwrap();

        assert_eq!(element.get("type"), Some(&json!("freedraw")));
        assert_eq!(element.get("x"), Some(&json!(10)));
        assert_eq!(element.get("y"), Some(&json!(10)));
        assert_eq!(element.get("width"), Some(&json!(10)));
        assert_eq!(element.get("height"), Some(&json!(15)));
        assert_eq!(
            element.get("points"),
            Some(&json!([[0, 0], [10, 5], [5, 15]]))
        );
        assert_eq!(element.get("lastCommittedPoint"), Some(&json!([5, 15])));
        assert_eq!(element.get("pressures"), Some(&json!([])));
        assert_eq!(element.get("simulatePressure"), Some(&json!(true)));
    }

    #[test]
    fn brush_stroke_requires_two_points() {
        let err = synthesizer()
            .brush_stroke(&stroke(&[[1.0, 1.0]]))
            .expect_err("single point stroke should fail");
        assert_eq!(err, ElementError::InsufficientBrushPoints);
    }

    #[test]
    fn base_fields_are_creation_constants() {
        let element = synthesizer()
            .element(&ElementSpec::new(ElementKind::Rectangle, 5.0, 6.0))
            .unwrap();

        assert_eq!(element.get("angle"), Some(&json!(0)));
        assert_eq!(element.get("fillStyle"), Some(&json!("solid")));
        assert_eq!(element.get("strokeStyle"), Some(&json!("solid")));
        assert_eq!(element.get("isDeleted"), Some(&json!(false)));
        assert_eq!(element.get("locked"), Some(&json!(false)));
        assert_eq!(element.get("version"), Some(&json!(1)));
        assert_eq!(element.get("width"), Some(&json!(100)));
        assert_eq!(element.get("strokeColor"), Some(&json!("#1e1e1e")));
        assert_eq!(element.get("backgroundColor"), Some(&json!("transparent")));
        assert_eq!(element.get("index"), Some(&json!("a42000")));
        assert_eq!(element.get("updated"), Some(&json!(1_700_000_042_000_i64)));
        assert_eq!(element.id(), "el000000000000000001");
        assert!(element.get("points").is_none());
    }

    #[test]
    fn text_element_mirrors_literal_into_original_text() {
        let mut spec = ElementSpec::new(ElementKind::Text, 0.0, 0.0);
        spec.text = "hello".to_string();
        let element = synthesizer().element(&spec).unwrap();

        assert_eq!(element.get("text"), Some(&json!("hello")));
        assert_eq!(element.get("originalText"), Some(&json!("hello")));
        assert_eq!(element.get("fontSize"), Some(&json!(20)));
        assert_eq!(element.get("textAlign"), Some(&json!("left")));
        assert_eq!(element.get("verticalAlign"), Some(&json!("top")));
        assert_eq!(element.get("lineHeight"), Some(&json!(1.25)));
    }

    #[test]
    fn arrow_keeps_absolute_points_and_sets_arrowheads() {
        let mut spec = ElementSpec::new(ElementKind::Arrow, 0.0, 0.0);
        spec.points = points(&[[0.0, 0.0], [40.5, 12.0]]);
        let element = synthesizer().element(&spec).unwrap();

        assert_eq!(element.get("points"), Some(&json!([[0, 0], [40.5, 12]])));
        assert_eq!(element.get("lastCommittedPoint"), Some(&json!([40.5, 12])));
        assert_eq!(element.get("startArrowhead"), Some(&Value::Null));
        assert_eq!(element.get("endArrowhead"), Some(&json!("arrow")));
    }

    #[test]
    fn line_with_single_point_fails_textually() {
        let mut spec = ElementSpec::new(ElementKind::Line, 0.0, 0.0);
        spec.points = points(&[[0.0, 0.0]]);
        let err = synthesizer().element(&spec).unwrap_err();
        assert_eq!(err.to_string(), "line elements require at least 2 points");
    }

    #[test]
    fn generic_freedraw_overrides_position_with_bounds() {
        let mut spec = ElementSpec::new(ElementKind::Freedraw, 999.0, 999.0);
        spec.points = points(&[[3.0, 4.0], [7.0, 10.0]]);
        let element = synthesizer().element(&spec).unwrap();

        assert_eq!(element.get("x"), Some(&json!(3)));
        assert_eq!(element.get("y"), Some(&json!(4)));
        assert_eq!(element.get("width"), Some(&json!(4)));
        assert_eq!(element.get("height"), Some(&json!(6)));
        assert_eq!(element.get("points"), Some(&json!([[0, 0], [4, 6]])));
    }

    #[test]
    fn parse_points_accepts_pressure_and_rejects_garbage() {
        let parsed = parse_points(Some(&json!([[1, 2], [3.5, 4, 0.5]]))).unwrap();
        assert_eq!(parsed[1].pressure, Some(0.5));
        assert!(parse_points(None).unwrap().is_empty());

        let err = parse_points(Some(&json!([[1, 2], ["a", 3]]))).unwrap_err();
        assert_eq!(err, ElementError::MalformedPoint { index: 1 });
        let err = parse_points(Some(&json!([[1]]))).unwrap_err();
        assert_eq!(err, ElementError::MalformedPoint { index: 0 });
    }

    #[test]
    fn kind_label_capitalizes_like_a_title() {
        assert_eq!(ElementKind::parse("rectangle").label(), "Rectangle");
        assert_eq!(ElementKind::parse("myShape").label(), "Myshape");
        assert_eq!(ElementKind::parse("diamond"), ElementKind::Diamond);
    }
}
