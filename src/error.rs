use thiserror::Error;

/// Error taxonomy for the prediction pipeline.
///
/// Request-level errors (`InvalidTarget`, `InvalidHorizonSpec`,
/// `InvalidSequence`) abort a request before any model invocation.
/// Horizon-level errors (`ModelNotFound`, `ModelLoad`, `PredictionFailed`)
/// are isolated to the horizon they occurred on. `LeakageConfiguration` is
/// a startup failure and must never surface per-request.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("unknown target '{0}'")]
    InvalidTarget(String),

    #[error("invalid horizon spec '{0}': expected comma-separated positive integers")]
    InvalidHorizonSpec(String),

    #[error("invalid observation sequence: {0}")]
    InvalidSequence(String),

    #[error("Model not found for target '{target}' at horizon {horizon_hours}h")]
    ModelNotFound { target: String, horizon_hours: u32 },

    #[error("failed to load model for target '{target}' at horizon {horizon_hours}h: {message}")]
    ModelLoad {
        target: String,
        horizon_hours: u32,
        message: String,
    },

    #[error("prediction failed for target '{target}' at horizon {horizon_hours}h: {message}")]
    PredictionFailed {
        target: String,
        horizon_hours: u32,
        message: String,
    },

    #[error(
        "insufficient history for feature '{column}': only {available} observation(s) supplied"
    )]
    InsufficientHistory { column: String, available: usize },

    #[error("leakage in feature catalog for target '{target}': column '{column}' derives from the label")]
    LeakageConfiguration { target: String, column: String },
}
