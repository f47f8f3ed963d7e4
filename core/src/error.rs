use thiserror::Error;

/// Why a drawing element could not be synthesized.
///
/// These are user-input problems, not faults: the `Display` text is shown to
/// the caller verbatim (behind a failure marker) instead of being raised as a
/// protocol error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementError {
    /// `create_element` was called without `elementType`, `x` or `y`
    #[error("Missing required parameters: elementType, x, y")]
    MissingRequired,
    /// A brush stroke needs at least two points to have any extent
    #[error("Missing or insufficient points for brush stroke (minimum 2 points required)")]
    InsufficientBrushPoints,
    /// `freedraw` created through the generic path
    #[error("Freedraw elements require at least 2 points")]
    InsufficientFreedrawPoints,
    /// `line` / `arrow` with fewer than two points
    #[error("{element_type} elements require at least 2 points")]
    InsufficientPoints { element_type: String },
    /// A point that is not `[x, y]` or `[x, y, pressure]`
    #[error("Point {index} must be an array of 2 or 3 numbers")]
    MalformedPoint { index: usize },
}

/// Machine-readable codes, used in logs next to the human text.
pub mod codes {
    pub const MISSING_REQUIRED: &str = "missing_required";
    pub const INSUFFICIENT_POINTS: &str = "insufficient_points";
    pub const MALFORMED_POINT: &str = "malformed_point";
}

impl ElementError {
    pub fn code(&self) -> &'static str {
        match self {
            ElementError::MissingRequired => codes::MISSING_REQUIRED,
            ElementError::InsufficientBrushPoints
            | ElementError::InsufficientFreedrawPoints
            | ElementError::InsufficientPoints { .. } => codes::INSUFFICIENT_POINTS,
            ElementError::MalformedPoint { .. } => codes::MALFORMED_POINT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_text_names_the_element_type() {
        let err = ElementError::InsufficientPoints {
            element_type: "arrow".to_string(),
        };
        assert_eq!(err.to_string(), "arrow elements require at least 2 points");
        assert_eq!(err.code(), codes::INSUFFICIENT_POINTS);
    }
}
