use std::{fs, path::Path};

use foundation::{MlErr, dataset::Table, metrics::EvalMetric, problem::ProblemType};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    configs::{FitOptions, Hyperparameters, PredictorConfig},
    error::{PredictorError, Result},
    evaluation::{EvaluationFacade, LeaderboardRow, Predictions, ProbaTable},
    model::{FittedModel, ModelRecord, Preprocessor},
    registry::ModelRegistry,
    training::{FitReport, TrainingFacade},
};

const MODELS_DIR: &str = "models";
const METADATA_FILE: &str = "predictor.json";

/// What `predictor.json` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorMetadata {
    pub label: String,
    pub problem_type: ProblemType,
    pub eval_metric: EvalMetric,
    pub best_model: Option<String>,
    pub preprocessor: Preprocessor,
    pub models: Vec<ModelMetadata>,
    pub records: Vec<ModelRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub backend_id: String,
    /// Relative to the predictor's path.
    pub artifact: String,
    pub fit_time_secs: f64,
    pub val_score: Option<f64>,
    pub stack_level: u8,
    pub fit_order: usize,
}

/// Registry, training and evaluation wired together behind one label column.
///
/// ```no_run
/// # use foundation::dataset::Table;
/// # use predictor::{FitOptions, Hyperparameters, PredictorConfig, TabularPredictor};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let train = Table::from_csv("train.csv")?;
/// let test = Table::from_csv("test.csv")?;
///
/// let mut predictor = TabularPredictor::new(PredictorConfig::new("class"));
/// predictor.fit(&train, None, &Hyperparameters::default(), FitOptions::default())?;
/// let labels = predictor.predict(&test)?;
/// let board = predictor.leaderboard(&test)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TabularPredictor {
    config: PredictorConfig,
    registry: ModelRegistry,
    report: Option<FitReport>,
}

impl TabularPredictor {
    /// Creates a predictor with the default backends registered.
    pub fn new(config: PredictorConfig) -> Self {
        Self::with_registry(config, ModelRegistry::with_defaults())
    }

    pub fn with_registry(config: PredictorConfig, registry: ModelRegistry) -> Self {
        Self {
            config,
            registry,
            report: None,
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Registering backends after a fit doesn't affect the fitted models.
    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    /// Fits every configured backend, replacing any previous fit. The models are
    /// written to the configured path afterwards.
    ///
    /// # Errors
    /// See [`TrainingFacade::fit_with_tuning`]. `Io`/`Json` if persisting fails, in
    /// which case the fitted models are still kept and usable.
    pub fn fit(
        &mut self,
        train: &Table,
        tuning: Option<&Table>,
        hyperparameters: &Hyperparameters,
        options: FitOptions,
    ) -> Result<&FitReport> {
        let time_limit = options.time_limit;
        let report = TrainingFacade::new(&self.registry, self.config.label.as_str())
            .with_problem_type(self.config.problem_type)
            .with_eval_metric(self.config.eval_metric)
            .with_options(options)
            .fit_with_tuning(train, tuning, hyperparameters, time_limit)?;

        info!(models = report.len(); "fit finished");
        let report = self.report.insert(report);
        if let Some(path) = &self.config.path {
            save(path, &self.config.label, report)?;
        }

        Ok(report)
    }

    pub fn report(&self) -> Result<&FitReport> {
        self.report.as_ref().ok_or(PredictorError::NotFitted)
    }

    pub fn is_fitted(&self) -> bool {
        self.report.is_some()
    }

    pub fn problem_type(&self) -> Result<ProblemType> {
        Ok(self.report()?.problem_type())
    }

    pub fn eval_metric(&self) -> Result<EvalMetric> {
        Ok(self.report()?.eval_metric())
    }

    /// The fitted model names, in fit order.
    pub fn model_names(&self) -> Result<Vec<&str>> {
        Ok(self.report()?.names())
    }

    /// The model used by [`TabularPredictor::predict`].
    pub fn best_model(&self) -> Result<&FittedModel> {
        self.report()?.best().ok_or(PredictorError::NoModelsFitted)
    }

    pub fn model(&self, name: &str) -> Result<&FittedModel> {
        self.report()?
            .get(name)
            .ok_or_else(|| PredictorError::ModelNotFound(name.to_string()))
    }

    /// Predicts with the best model.
    pub fn predict(&self, data: &Table) -> Result<Predictions> {
        self.evaluator()?.predict(self.best_model()?, data)
    }

    pub fn predict_with(&self, model: &str, data: &Table) -> Result<Predictions> {
        self.evaluator()?.predict(self.model(model)?, data)
    }

    /// Class probabilities from the best model.
    pub fn predict_proba(&self, data: &Table) -> Result<ProbaTable> {
        self.evaluator()?.predict_proba(self.best_model()?, data)
    }

    /// Every fitted model ranked on `data`, which must carry the label column.
    pub fn leaderboard(&self, data: &Table) -> Result<Vec<LeaderboardRow>> {
        self.evaluator()?.leaderboard(self.report()?.models(), data)
    }

    /// Every applicable metric for the best model.
    pub fn evaluate(&self, data: &Table) -> Result<Vec<(EvalMetric, f64)>> {
        self.evaluator()?.evaluate(self.best_model()?, data)
    }

    fn evaluator(&self) -> Result<EvaluationFacade> {
        Ok(EvaluationFacade::new(self.report()?.eval_metric()))
    }
}

/// Reads the metadata a fit left in `path`.
pub fn load_metadata<P: AsRef<Path>>(path: P) -> Result<PredictorMetadata> {
    let raw = fs::read_to_string(path.as_ref().join(METADATA_FILE))?;
    Ok(serde_json::from_str(&raw)?)
}

fn save(path: &Path, label: &str, report: &FitReport) -> Result<()> {
    let models_dir = path.join(MODELS_DIR);
    fs::create_dir_all(&models_dir)?;

    let mut models = Vec::with_capacity(report.len());
    for model in report.models() {
        let artifact = format!("{MODELS_DIR}/{}.safetensors", model.name());
        model
            .artifact()
            .and_then(|a| a.save(path.join(&artifact)))
            .map_err(persist_err)?;

        models.push(ModelMetadata {
            name: model.name().to_string(),
            backend_id: model.backend_id().to_string(),
            artifact,
            fit_time_secs: model.fit_time().as_secs_f64(),
            val_score: model.val_score(),
            stack_level: model.stack_level(),
            fit_order: model.fit_order(),
        });
    }

    let metadata = PredictorMetadata {
        label: label.to_string(),
        problem_type: report.problem_type(),
        eval_metric: report.eval_metric(),
        best_model: report.best().map(|m| m.name().to_string()),
        preprocessor: report.preprocessor().clone(),
        models,
        records: report.records().to_vec(),
    };
    fs::write(path.join(METADATA_FILE), serde_json::to_string_pretty(&metadata)?)?;

    info!(path:? = path, models = metadata.models.len(); "saved predictor");
    Ok(())
}

fn persist_err(e: MlErr) -> PredictorError {
    match e {
        MlErr::Io(e) => PredictorError::Io(e),
        e => PredictorError::Prediction(e),
    }
}
