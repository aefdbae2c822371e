use thiserror::Error;

/// Failures raised by the generation backend itself.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by the generation API")]
    RateLimited,

    #[error("Unexpected response shape: {0}")]
    Response(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Input text is empty")]
    EmptyInput,

    #[error("Response contains no parseable JSON object: {0}")]
    MalformedResponse(String),

    #[error("Field '{field}' expected {expected}, got {actual}")]
    SchemaViolation {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Invalid extractor setup: {0}")]
    Setup(String),
}

impl ExtractError {
    /// Whether the failure belongs to this one input. Skippable failures are
    /// logged and the walk moves on; anything else aborts the channel.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            ExtractError::EmptyInput
                | ExtractError::MalformedResponse(_)
                | ExtractError::SchemaViolation { .. }
        )
    }

    pub(crate) fn violation(field: &str, expected: &str, actual: &str) -> Self {
        ExtractError::SchemaViolation {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
