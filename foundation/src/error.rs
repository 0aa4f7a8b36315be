use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire foundation module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The foundation module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidTable(String),
    MissingColumn {
        name: String,
    },
    SchemaMismatch {
        column: String,
        reason: String,
    },
    InvalidLabel(String),
    InvalidArtifact(String),
    NotEnoughRows {
        got: usize,
        required: usize,
    },
    NonFiniteLoss {
        step: usize,
    },
    MetricMismatch {
        metric: &'static str,
    },
    NotFitted,
    Csv(csv::Error),
    Io(io::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
            ),
            MlErr::InvalidTable(msg) => write!(f, "invalid table: {msg}"),
            MlErr::MissingColumn { name } => write!(f, "column '{name}' is missing"),
            MlErr::SchemaMismatch { column, reason } => {
                write!(f, "schema mismatch on column '{column}': {reason}")
            }
            MlErr::InvalidLabel(msg) => write!(f, "invalid label: {msg}"),
            MlErr::InvalidArtifact(msg) => write!(f, "invalid artifact: {msg}"),
            MlErr::NotEnoughRows { got, required } => {
                write!(f, "not enough rows, got {got} and at least {required} are required")
            }
            MlErr::NonFiniteLoss { step } => {
                write!(f, "the loss became non finite at fine-tuning step {step}")
            }
            MlErr::MetricMismatch { metric } => {
                write!(f, "the metric '{metric}' does not apply to these predictions")
            }
            MlErr::NotFitted => write!(f, "the backend must be fitted before predicting"),
            MlErr::Csv(e) => write!(f, "csv error: {e}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Csv(e) => Some(e),
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for MlErr {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<safetensors::SafeTensorError> for MlErr {
    fn from(value: safetensors::SafeTensorError) -> Self {
        Self::InvalidArtifact(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_mismatch_names_both_sides() {
        let err = MlErr::SizeMismatch {
            a: "grad",
            b: "params",
            got: 3,
            expected: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("grad") && msg.contains("params"));
        assert!(msg.contains("got 3 and expected 2"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err: MlErr = io::Error::other("disk").into();
        assert!(err.source().is_some());
        assert!(MlErr::InvalidLabel("x".into()).source().is_none());
    }
}
