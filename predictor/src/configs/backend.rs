use std::path::{Path, PathBuf};

use foundation::{arch::{BackendKind, OptimizerKind}, problem::ProblemType};
use serde::{Deserialize, Serialize};

/// Naming, ordering and filtering options shared by every backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelArgs {
    /// Replaces the backend's display name.
    pub name: Option<String>,
    pub name_prefix: Option<String>,
    pub name_suffix: Option<String>,
    /// Higher priorities are fit first.
    pub priority: Option<i32>,
    /// The model is skipped for problem types not listed here.
    pub problem_types: Option<Vec<ProblemType>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MitraConfig {
    pub fine_tune: bool,
    pub fine_tune_steps: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
    pub max_context: usize,
    pub checkpoint: Option<PathBuf>,
    pub seed: Option<u64>,
    /// The prior attention temperature, relative to the feature width.
    pub temperature: f32,
    pub args: ModelArgs,
}

impl Default for MitraConfig {
    fn default() -> Self {
        Self {
            fine_tune: false,
            fine_tune_steps: 50,
            learning_rate: 0.01,
            batch_size: 32,
            optimizer: OptimizerKind::Adam,
            max_context: 1024,
            checkpoint: None,
            seed: None,
            temperature: 0.1,
            args: ModelArgs::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TabPfnV2Config {
    pub fine_tune: bool,
    pub fine_tune_steps: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
    pub max_context: usize,
    pub checkpoint: Option<PathBuf>,
    pub seed: Option<u64>,
    pub args: ModelArgs,
}

impl Default for TabPfnV2Config {
    fn default() -> Self {
        Self {
            fine_tune: false,
            fine_tune_steps: 50,
            learning_rate: 0.01,
            batch_size: 64,
            optimizer: OptimizerKind::Adam,
            max_context: 2048,
            checkpoint: None,
            seed: None,
            args: ModelArgs::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TabIclConfig {
    pub fine_tune: bool,
    pub fine_tune_steps: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
    pub max_context: usize,
    pub checkpoint: Option<PathBuf>,
    pub seed: Option<u64>,
    /// The width of the row embeddings.
    pub embed_dim: usize,
    pub args: ModelArgs,
}

impl Default for TabIclConfig {
    fn default() -> Self {
        Self {
            fine_tune: false,
            fine_tune_steps: 50,
            learning_rate: 0.01,
            batch_size: 32,
            optimizer: OptimizerKind::Adam,
            max_context: 1024,
            checkpoint: None,
            seed: None,
            embed_dim: 16,
            args: ModelArgs::default(),
        }
    }
}

/// The configuration of one backend instance.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Mitra(MitraConfig),
    TabPfnV2(TabPfnV2Config),
    TabIcl(TabIclConfig),
}

/// The options every backend config carries, borrowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning<'a> {
    pub fine_tune: bool,
    pub fine_tune_steps: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
    pub max_context: usize,
    pub checkpoint: Option<&'a Path>,
    pub seed: Option<u64>,
}

impl BackendConfig {
    /// The default, zero-shot configuration of `kind`.
    pub fn default_for(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Mitra => Self::Mitra(MitraConfig::default()),
            BackendKind::TabPfnV2 => Self::TabPfnV2(TabPfnV2Config::default()),
            BackendKind::TabIcl => Self::TabIcl(TabIclConfig::default()),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Mitra(_) => BackendKind::Mitra,
            Self::TabPfnV2(_) => BackendKind::TabPfnV2,
            Self::TabIcl(_) => BackendKind::TabIcl,
        }
    }

    pub fn args(&self) -> &ModelArgs {
        match self {
            Self::Mitra(c) => &c.args,
            Self::TabPfnV2(c) => &c.args,
            Self::TabIcl(c) => &c.args,
        }
    }

    pub fn tuning(&self) -> Tuning<'_> {
        match self {
            Self::Mitra(c) => Tuning {
                fine_tune: c.fine_tune,
                fine_tune_steps: c.fine_tune_steps,
                learning_rate: c.learning_rate,
                batch_size: c.batch_size,
                optimizer: c.optimizer,
                max_context: c.max_context,
                checkpoint: c.checkpoint.as_deref(),
                seed: c.seed,
            },
            Self::TabPfnV2(c) => Tuning {
                fine_tune: c.fine_tune,
                fine_tune_steps: c.fine_tune_steps,
                learning_rate: c.learning_rate,
                batch_size: c.batch_size,
                optimizer: c.optimizer,
                max_context: c.max_context,
                checkpoint: c.checkpoint.as_deref(),
                seed: c.seed,
            },
            Self::TabIcl(c) => Tuning {
                fine_tune: c.fine_tune,
                fine_tune_steps: c.fine_tune_steps,
                learning_rate: c.learning_rate,
                batch_size: c.batch_size,
                optimizer: c.optimizer,
                max_context: c.max_context,
                checkpoint: c.checkpoint.as_deref(),
                seed: c.seed,
            },
        }
    }

    /// Fills in the seed when the config doesn't pin one.
    pub(crate) fn seed_or(&mut self, seed: u64) {
        let slot = match self {
            Self::Mitra(c) => &mut c.seed,
            Self::TabPfnV2(c) => &mut c.seed,
            Self::TabIcl(c) => &mut c.seed,
        };
        slot.get_or_insert(seed);
    }
}

impl From<MitraConfig> for BackendConfig {
    fn from(c: MitraConfig) -> Self {
        Self::Mitra(c)
    }
}

impl From<TabPfnV2Config> for BackendConfig {
    fn from(c: TabPfnV2Config) -> Self {
        Self::TabPfnV2(c)
    }
}

impl From<TabIclConfig> for BackendConfig {
    fn from(c: TabIclConfig) -> Self {
        Self::TabIcl(c)
    }
}
