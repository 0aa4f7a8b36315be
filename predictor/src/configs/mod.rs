mod adapter;
mod backend;
mod fit;
mod hyperparameters;

pub use adapter::{Adapter, PlannedModel};
pub use backend::{BackendConfig, MitraConfig, ModelArgs, TabIclConfig, TabPfnV2Config, Tuning};
pub use fit::{FitOptions, FitStrategy, PredictorConfig};
pub use hyperparameters::Hyperparameters;
