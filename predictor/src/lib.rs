//! Fits pluggable in-context backends on tabular data, predicts with them and ranks
//! them.
//!
//! [`ModelRegistry`] builds backends from their configs, [`TrainingFacade`] fits them
//! and [`EvaluationFacade`] predicts and scores. [`TabularPredictor`] wires the three
//! together.

pub mod configs;
pub mod ensemble;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod predictor;
pub mod registry;
pub mod training;

pub use configs::{
    BackendConfig, FitOptions, FitStrategy, Hyperparameters, MitraConfig, PredictorConfig,
    TabIclConfig, TabPfnV2Config,
};
pub use error::{PredictorError, Result};
pub use evaluation::{EvaluationFacade, LeaderboardRow, Predictions, ProbaTable};
pub use model::{FittedModel, ModelRecord, ModelStatus, Preprocessor};
pub use predictor::{ModelMetadata, PredictorMetadata, TabularPredictor, load_metadata};
pub use registry::{BackendFactory, ModelRegistry};
pub use training::{FitReport, TrainingFacade, default_holdout_frac};
