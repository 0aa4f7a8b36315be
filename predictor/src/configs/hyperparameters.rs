use foundation::arch::BackendKind;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{BackendConfig, MitraConfig, TabIclConfig, TabPfnV2Config};
use crate::error::{PredictorError, Result};

/// The backend configurations to fit, possibly several per backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters {
    configs: Vec<BackendConfig>,
}

impl Hyperparameters {
    pub fn new(configs: Vec<BackendConfig>) -> Self {
        Self { configs }
    }

    /// A single backend configuration.
    pub fn only<C: Into<BackendConfig>>(config: C) -> Self {
        Self::new(vec![config.into()])
    }

    pub fn configs(&self) -> &[BackendConfig] {
        &self.configs
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Parses `{"MITRA": {...}, "TABPFNV2": [{...}, {...}]}`, every key being a backend
    /// identifier mapped to one config object or a list of them.
    ///
    /// # Errors
    /// `Json` if `text` isn't JSON, `UnknownBackend` for unknown keys and
    /// `InvalidConfig` for malformed configs or unknown options.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(entries) = value else {
            return Err(PredictorError::InvalidConfig(
                "hyperparameters must be an object keyed by backend identifier".into(),
            ));
        };

        let mut configs = Vec::new();
        for (id, value) in entries {
            let kind = BackendKind::from_id(&id).ok_or_else(|| PredictorError::UnknownBackend {
                id: id.clone(),
                known: BackendKind::ALL.iter().map(|k| k.id().to_string()).collect(),
            })?;

            let values = match value {
                Value::Array(values) => values,
                value => vec![value],
            };
            for value in values {
                configs.push(parse(kind, value)?);
            }
        }

        Ok(Self::new(configs))
    }
}

impl Default for Hyperparameters {
    /// Every built-in backend, zero-shot.
    fn default() -> Self {
        Self::new(
            BackendKind::ALL
                .into_iter()
                .map(BackendConfig::default_for)
                .collect(),
        )
    }
}

fn parse(kind: BackendKind, value: Value) -> Result<BackendConfig> {
    match kind {
        BackendKind::Mitra => typed::<MitraConfig>(kind, value).map(BackendConfig::from),
        BackendKind::TabPfnV2 => typed::<TabPfnV2Config>(kind, value).map(BackendConfig::from),
        BackendKind::TabIcl => typed::<TabIclConfig>(kind, value).map(BackendConfig::from),
    }
}

fn typed<T: DeserializeOwned>(kind: BackendKind, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| PredictorError::InvalidConfig(format!("{}: {e}", kind.id())))
}
