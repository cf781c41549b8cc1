use thiserror::Error;

/// Error taxonomy shared by every engine crate. Inner layers return these
/// typed variants; only the API gateway translates them to HTTP statuses.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Data fetch failed: {0}")]
    DataFetch(String),

    #[error("Option data unavailable: {0}")]
    OptionDataUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Tier does not allow: {0}")]
    TierDenied(String),

    #[error("Quota exceeded: {used}/{limit} runs today")]
    QuotaExceeded { used: i64, limit: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Short machine-readable code used in API error bodies and run rows.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientData(_) => "insufficient_data",
            EngineError::DataFetch(_) => "data_fetch",
            EngineError::OptionDataUnavailable(_) => "option_data_unavailable",
            EngineError::Validation(_) => "validation",
            EngineError::Unauthorized => "unauthorized",
            EngineError::TierDenied(_) => "tier",
            EngineError::QuotaExceeded { .. } => "quota",
            EngineError::Database(_) => "database",
            EngineError::Internal(_) => "internal",
        }
    }
}
