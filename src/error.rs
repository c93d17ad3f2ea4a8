use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Typed failures surfaced at the orchestration boundary.
///
/// Degraded corrector runs and data-quality substitutions are not errors; they
/// are recorded on [`crate::domain::ForecastMetadata`] instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ForecastError {
    #[error("baseline model unavailable: {0}")]
    FatalModelUnavailable(String),

    #[error("insufficient history: need {required} hours, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("horizon of {requested} hours is outside 1..={max}")]
    HorizonOutOfBounds { requested: usize, max: usize },

    #[error("gap of {hours} hours exceeds the ceiling of {max}")]
    GapTooLong { hours: usize, max: usize },

    #[error("day block for {date} has {len} values, expected 24")]
    InvalidBlockLength { date: NaiveDate, len: usize },

    #[error("residual buffer scale ({buffer}) does not match corrector scale ({model})")]
    ScaleMismatch { buffer: String, model: String },

    #[error("unknown feature '{name}' for feature set {variant}")]
    UnknownFeature { name: String, variant: String },

    #[error("history ends at {last}, which is not before target {target}")]
    HistoryMisaligned {
        target: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("observation at {timestamp} does not follow {last}")]
    NonMonotonicHistory {
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("weather record mismatch: {0}")]
    WeatherMismatch(String),

    #[error("forecast run cancelled")]
    Cancelled,

    #[error("historical store error: {0}")]
    Store(String),

    #[error("weather provider error: {0}")]
    Weather(String),

    #[error("cache store error: {0}")]
    Cache(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ForecastError {
    /// Errors the downstream layer should report as service-unavailable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ForecastError::FatalModelUnavailable(_)
                | ForecastError::ScaleMismatch { .. }
                | ForecastError::Store(_)
                | ForecastError::Weather(_)
                | ForecastError::Cache(_)
                | ForecastError::Internal(_)
        )
    }

    /// Errors caused by the request itself rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientHistory { .. }
                | ForecastError::HorizonOutOfBounds { .. }
                | ForecastError::GapTooLong { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
