use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtychoError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },

    #[error(
        "Scan position {index} at (row={row}, col={col}) places the probe outside the object"
    )]
    PositionOutOfBounds { index: usize, row: usize, col: usize },

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PtychoResult<T> = Result<T, PtychoError>;

impl PtychoError {
    /// Shape mismatch between two 2-D extents.
    pub fn shape_2d(what: &'static str, expected: (usize, usize), found: (usize, usize)) -> Self {
        PtychoError::ShapeMismatch {
            what,
            expected: format!("{}x{}", expected.0, expected.1),
            found: format!("{}x{}", found.0, found.1),
        }
    }
}
