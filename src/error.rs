use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColorError {
    #[error("Calibration set has no entries")]
    EmptyCalibration,

    #[error("Duplicate calibration temperature: {0}K")]
    DuplicateCct(f64),

    #[error("Invalid color temperature: {0}K")]
    InvalidCct(f64),

    #[error("Unsupported CFA pattern: {0}")]
    InvalidCfaPattern(String),

    #[error("Matrix dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    #[error("As-shot neutral entries must be positive: {0:?}")]
    InvalidNeutral(Vec<f64>),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error("Could not compute {0}")]
    Degenerate(&'static str),

    #[error("Invalid capture metadata: {0}")]
    Metadata(String),

    #[error("Invalid render config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl ColorError {
    pub(crate) fn dimensions(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ColorError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ColorError>;
