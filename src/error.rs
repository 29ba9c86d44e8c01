use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtworkError {
    #[error("parse error at line {line}: {message}")]
    Parse { line: u32, message: String },

    #[error("required state not set: {0}")]
    StateNotSet(&'static str),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ArtworkError {
    /// Parse error with a source line attached.
    pub fn parse(line: u32, message: impl Into<String>) -> Self {
        ArtworkError::Parse {
            line,
            message: message.into(),
        }
    }
}
