use std::fmt;

use foundation::MlErr;

/// All errors that can occur in the predictor.
#[derive(Debug)]
pub enum PredictorError {
    /// No backend is registered under the identifier.
    UnknownBackend { id: String, known: Vec<String> },
    /// Invalid configuration, caught before fitting anything.
    InvalidConfig(String),
    /// The training data can't be used as given.
    Data(MlErr),
    /// A backend failed while fitting and failures are fatal.
    Training { backend_id: String, cause: MlErr },
    /// Every backend failed or was skipped.
    NoModelsFitted,
    /// The operation doesn't apply to this problem type.
    UnsupportedOperation(String),
    /// Predicting failed, e.g. the data doesn't match the training schema.
    Prediction(MlErr),
    ModelNotFound(String),
    /// The predictor must be fit first.
    NotFitted,
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for PredictorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownBackend { id, known } => {
                write!(f, "unknown backend '{id}', known backends: {}", known.join(", "))
            }
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Data(e) => write!(f, "invalid training data: {e}"),
            Self::Training { backend_id, cause } => {
                write!(f, "backend {backend_id} failed to fit: {cause}")
            }
            Self::NoModelsFitted => write!(f, "no model was fitted"),
            Self::UnsupportedOperation(msg) => write!(f, "unsupported operation: {msg}"),
            Self::Prediction(e) => write!(f, "prediction failed: {e}"),
            Self::ModelNotFound(name) => write!(f, "there's no model named '{name}'"),
            Self::NotFitted => write!(f, "the predictor must be fit first"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for PredictorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Data(e) | Self::Prediction(e) => Some(e),
            Self::Training { cause, .. } => Some(cause),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PredictorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for PredictorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, PredictorError>;
