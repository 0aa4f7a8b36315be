use std::{path::PathBuf, time::Duration};

use foundation::{metrics::EvalMetric, problem::ProblemType};
use serde::{Deserialize, Serialize};

/// How a predictor is set up before fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorConfig {
    /// The column to predict.
    pub label: String,
    /// Where fitted models and metadata are written, nothing is written when `None`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Inferred from the label when `None`.
    #[serde(default)]
    pub problem_type: Option<ProblemType>,
    /// Defaults to accuracy for classification and RMSE for regression.
    #[serde(default)]
    pub eval_metric: Option<EvalMetric>,
}

impl PredictorConfig {
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            path: None,
            problem_type: None,
            eval_metric: None,
        }
    }

    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_problem_type(mut self, problem_type: ProblemType) -> Self {
        self.problem_type = Some(problem_type);
        self
    }

    pub fn with_eval_metric(mut self, metric: EvalMetric) -> Self {
        self.eval_metric = Some(metric);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStrategy {
    /// One backend after the other, in priority order.
    #[default]
    Sequential,
    /// Every backend at once on the rayon pool.
    Parallel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// A wall-clock budget shared by every backend.
    pub time_limit: Option<Duration>,
    pub fit_strategy: FitStrategy,
    /// Abort on the first backend failure instead of skipping it.
    pub raise_on_model_failure: bool,
    pub fit_weighted_ensemble: bool,
    /// The share of training rows held out for validation when no tuning data is
    /// given. Picked from the table size when `None`.
    pub holdout_frac: Option<f64>,
    /// Only these backend identifiers are fit, when present.
    pub included_model_types: Option<Vec<String>>,
    pub excluded_model_types: Vec<String>,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            time_limit: None,
            fit_strategy: FitStrategy::Sequential,
            raise_on_model_failure: false,
            fit_weighted_ensemble: true,
            holdout_frac: None,
            included_model_types: None,
            excluded_model_types: Vec::new(),
            seed: 0,
        }
    }
}
