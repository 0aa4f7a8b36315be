use std::{collections::BTreeMap, sync::Arc};

use foundation::arch::{
    Artifact, Backend, BackendKind, FineTune, InContextBackend, InContextOptions, Learner, Mitra,
    TabIcl, TabPfnV2,
};
use log::{debug, warn};

use crate::{
    configs::BackendConfig,
    error::{PredictorError, Result},
};

/// Builds a backend instance from its config.
pub type BackendFactory = Arc<dyn Fn(&BackendConfig) -> Result<Box<dyn Backend>> + Send + Sync>;

/// Maps backend identifiers to the factories that build them.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(BackendKind::Mitra.id(), mitra_factory);
        registry.register(BackendKind::TabPfnV2.id(), tabpfn_v2_factory);
        registry.register(BackendKind::TabIcl.id(), tabicl_factory);
        registry
    }

    /// Registers `factory` under `id`, replacing the previous one if any.
    pub fn register<S, F>(&mut self, id: S, factory: F)
    where
        S: Into<String>,
        F: Fn(&BackendConfig) -> Result<Box<dyn Backend>> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.factories.insert(id.clone(), Arc::new(factory)).is_some() {
            warn!(backend = id.as_str(); "replaced an already registered backend");
        } else {
            debug!(backend = id.as_str(); "registered backend");
        }
    }

    /// Builds the backend registered under `id`.
    ///
    /// # Errors
    /// `UnknownBackend` if nothing is registered under `id`, the factory's error if it
    /// rejects the config.
    pub fn create(&self, id: &str, config: &BackendConfig) -> Result<Box<dyn Backend>> {
        let factory = self.factories.get(id).ok_or_else(|| self.unknown(id))?;
        factory(config)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// The registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub(crate) fn unknown(&self, id: &str) -> PredictorError {
        PredictorError::UnknownBackend {
            id: id.to_string(),
            known: self.ids().into_iter().map(str::to_string).collect(),
        }
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

pub fn mitra_factory(config: &BackendConfig) -> Result<Box<dyn Backend>> {
    let BackendConfig::Mitra(c) = config else {
        return Err(mismatch(BackendKind::Mitra, config));
    };
    build(Mitra::new(c.temperature), config)
}

pub fn tabpfn_v2_factory(config: &BackendConfig) -> Result<Box<dyn Backend>> {
    if !matches!(config, BackendConfig::TabPfnV2(_)) {
        return Err(mismatch(BackendKind::TabPfnV2, config));
    }
    build(TabPfnV2, config)
}

pub fn tabicl_factory(config: &BackendConfig) -> Result<Box<dyn Backend>> {
    let BackendConfig::TabIcl(c) = config else {
        return Err(mismatch(BackendKind::TabIcl, config));
    };
    build(TabIcl::new(c.embed_dim, c.seed.unwrap_or_default()), config)
}

fn mismatch(expected: BackendKind, config: &BackendConfig) -> PredictorError {
    PredictorError::InvalidConfig(format!(
        "the {expected} backend can't be built from a {} config",
        config.kind()
    ))
}

fn build<L: Learner + 'static>(learner: L, config: &BackendConfig) -> Result<Box<dyn Backend>> {
    let tuning = config.tuning();
    let options = InContextOptions {
        max_context: tuning.max_context,
        seed: tuning.seed.unwrap_or_default(),
        fine_tune: tuning.fine_tune.then_some(FineTune {
            steps: tuning.fine_tune_steps,
            learning_rate: tuning.learning_rate,
            batch_size: tuning.batch_size,
            optimizer: tuning.optimizer,
        }),
    };

    let backend = InContextBackend::new(learner, options);
    let backend = match tuning.checkpoint {
        Some(path) => {
            let checkpoint = Artifact::load(path).map_err(|e| {
                PredictorError::InvalidConfig(format!(
                    "{}: checkpoint {}: {e}",
                    config.kind(),
                    path.display()
                ))
            })?;
            backend.with_checkpoint(checkpoint)
        }
        None => backend,
    };

    Ok(Box::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::{MitraConfig, TabIclConfig};

    #[test]
    fn defaults_are_registered() {
        let registry = ModelRegistry::with_defaults();
        assert_eq!(registry.ids(), ["MITRA", "TABICL", "TABPFNV2"]);
        for kind in BackendKind::ALL {
            let backend = registry
                .create(kind.id(), &BackendConfig::default_for(kind))
                .unwrap();
            assert_eq!(backend.id(), kind.id());
        }
    }

    #[test]
    fn unknown_ids_leave_the_registry_untouched() {
        let registry = ModelRegistry::with_defaults();
        let err = registry
            .create("XGB", &MitraConfig::default().into())
            .err().unwrap();

        assert!(matches!(&err, PredictorError::UnknownBackend { id, .. } if id == "XGB"));
        assert_eq!(registry.ids().len(), 3);
        assert!(!registry.contains("XGB"));
    }

    #[test]
    fn factories_reject_foreign_configs() {
        let registry = ModelRegistry::with_defaults();
        assert!(matches!(
            registry.create("MITRA", &TabIclConfig::default().into()),
            Err(PredictorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn registering_again_replaces() {
        let mut registry = ModelRegistry::with_defaults();
        registry.register("MITRA", tabicl_factory);
        let backend = registry
            .create("MITRA", &TabIclConfig::default().into())
            .unwrap();
        assert_eq!(backend.id(), "TABICL");
        assert_eq!(registry.ids().len(), 3);
    }

    #[test]
    fn checkpoints_are_loaded_by_the_factory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mitra.safetensors");
        let mut artifact = Artifact::new();
        artifact.insert("log_temperature", vec![0.0]);
        artifact.save(&path).unwrap();

        let config = MitraConfig {
            checkpoint: Some(path),
            ..Default::default()
        };
        assert!(mitra_factory(&config.into()).is_ok());

        std::fs::write(dir.path().join("bad.safetensors"), b"nope").unwrap();
        let config = MitraConfig {
            checkpoint: Some(dir.path().join("bad.safetensors")),
            ..Default::default()
        };
        assert!(matches!(
            mitra_factory(&config.into()),
            Err(PredictorError::InvalidConfig(_))
        ));
    }
}
