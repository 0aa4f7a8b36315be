use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use foundation::{
    arch::{Backend, FitStats},
    dataset::{Table, stratified_split, train_test_split},
    encoding::Target,
    metrics::EvalMetric,
    problem::ProblemType,
    training::Budget,
};
use log::{info, warn};
use ndarray::Array2;
use rayon::prelude::*;

use crate::{
    configs::{Adapter, FitOptions, FitStrategy, Hyperparameters, PlannedModel},
    ensemble::{ENSEMBLE_ID, ENSEMBLE_NAME, WeightedEnsemble},
    error::{PredictorError, Result},
    evaluation::score_output,
    model::{FittedModel, ModelRecord, ModelStatus, Preprocessor},
    registry::ModelRegistry,
};

/// Tables smaller than this are never split for validation.
const MIN_HOLDOUT_ROWS: usize = 20;

/// The validation share used when none is configured.
pub fn default_holdout_frac(rows: usize) -> Option<f64> {
    match rows {
        n if n < MIN_HOLDOUT_ROWS => None,
        n if n < 2_500 => Some(0.2),
        n if n < 25_000 => Some(0.1),
        _ => Some(0.05),
    }
}

/// The outcome of a fit: the fitted models by name and what happened to each planned
/// model.
#[derive(Debug)]
pub struct FitReport {
    pub(crate) models: BTreeMap<String, FittedModel>,
    pub(crate) records: Vec<ModelRecord>,
    pub(crate) preprocessor: Arc<Preprocessor>,
    pub(crate) eval_metric: EvalMetric,
    pub(crate) fit_rows: usize,
    pub(crate) val_rows: usize,
}

impl FitReport {
    pub fn get(&self, name: &str) -> Option<&FittedModel> {
        self.models.get(name)
    }

    /// The fitted models in fit order.
    pub fn models(&self) -> Vec<&FittedModel> {
        let mut models: Vec<&FittedModel> = self.models.values().collect();
        models.sort_by_key(|m| m.fit_order());
        models
    }

    pub fn names(&self) -> Vec<&str> {
        self.models().into_iter().map(FittedModel::name).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn records(&self) -> &[ModelRecord] {
        &self.records
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn problem_type(&self) -> ProblemType {
        self.preprocessor.problem_type()
    }

    pub fn eval_metric(&self) -> EvalMetric {
        self.eval_metric
    }

    /// The amount of rows models were fit on and validated on.
    pub fn rows(&self) -> (usize, usize) {
        (self.fit_rows, self.val_rows)
    }

    /// The model with the best validation score, ties going to the earliest fit.
    /// Without validation scores the highest stack level wins.
    pub fn best(&self) -> Option<&FittedModel> {
        let models = self.models();
        let scored = models
            .iter()
            .filter(|m| m.val_score().is_some())
            .fold(None, |best: Option<&&FittedModel>, m| match best {
                Some(b) if b.val_score() >= m.val_score() => Some(b),
                _ => Some(m),
            });

        scored.copied().or_else(|| {
            models
                .iter()
                .fold(None, |best: Option<&&FittedModel>, m| match best {
                    Some(b) if b.stack_level() >= m.stack_level() => Some(b),
                    _ => Some(m),
                })
                .copied()
        })
    }
}

/// Fits the planned backends on a dataset.
#[derive(Debug)]
pub struct TrainingFacade<'r> {
    registry: &'r ModelRegistry,
    label: String,
    problem_type: Option<ProblemType>,
    eval_metric: Option<EvalMetric>,
    options: FitOptions,
}

/// A backend that's been built and is waiting for its turn.
struct Pending {
    plan: PlannedModel,
    backend: Box<dyn Backend>,
    record: ModelRecord,
}

enum Outcome {
    Fitted(FittedModel),
    Failed(foundation::MlErr),
    Skipped,
}

impl<'r> TrainingFacade<'r> {
    pub fn new<S: Into<String>>(registry: &'r ModelRegistry, label: S) -> Self {
        Self {
            registry,
            label: label.into(),
            problem_type: None,
            eval_metric: None,
            options: FitOptions::default(),
        }
    }

    pub fn with_problem_type(mut self, problem_type: Option<ProblemType>) -> Self {
        self.problem_type = problem_type;
        self
    }

    pub fn with_eval_metric(mut self, metric: Option<EvalMetric>) -> Self {
        self.eval_metric = metric;
        self
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    /// Fits every configured backend on `dataset`, holding out part of it for
    /// validation. `time_limit` overrides the one in the options.
    pub fn fit(
        &self,
        dataset: &Table,
        configs: &Hyperparameters,
        time_limit: Option<Duration>,
    ) -> Result<FitReport> {
        self.fit_with_tuning(dataset, None, configs, time_limit)
    }

    /// Like [`TrainingFacade::fit`] but validating on `tuning` when given.
    ///
    /// Configs are validated and every backend is built before anything is fit.
    ///
    /// # Errors
    /// `InvalidConfig`/`UnknownBackend` for bad configs, `Data` for unusable tables,
    /// `Training` if a backend fails and failures are fatal, `NoModelsFitted` if
    /// nothing could be fit.
    pub fn fit_with_tuning(
        &self,
        dataset: &Table,
        tuning: Option<&Table>,
        configs: &Hyperparameters,
        time_limit: Option<Duration>,
    ) -> Result<FitReport> {
        let label = dataset.require(&self.label).map_err(|_| {
            PredictorError::InvalidConfig(format!(
                "label column '{}' is missing from the training data",
                self.label
            ))
        })?;
        if let Some(tuning) = tuning {
            dataset
                .schema()
                .check_label_consistency(&tuning.schema(), &self.label)
                .map_err(PredictorError::Data)?;
        }

        let problem = ProblemType::resolve(self.problem_type, label).map_err(PredictorError::Data)?;
        let metric = self.eval_metric.unwrap_or(EvalMetric::default_for(problem));
        if !metric.supports(problem) {
            return Err(PredictorError::InvalidConfig(format!(
                "eval_metric {} doesn't apply to {problem} problems",
                metric.name()
            )));
        }

        let plan = Adapter::new().adapt(configs, &self.options, problem, self.registry)?;
        let pending = plan
            .into_iter()
            .map(|plan| {
                let backend = self.registry.create(&plan.backend_id, &plan.config)?;
                let record = ModelRecord::new(plan.name.as_str(), plan.backend_id.as_str());
                Ok(Pending {
                    plan,
                    backend,
                    record,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            problem:% = problem, metric = metric.name(), models = pending.len();
            "fitting {} rows", dataset.n_rows()
        );

        let (fit_table, val_table) = self.split(dataset, tuning, problem)?;
        let preprocessor = Arc::new(
            Preprocessor::fit(&fit_table, label, &self.label, problem).map_err(PredictorError::Data)?,
        );
        let x = preprocessor.features(&fit_table).map_err(PredictorError::Data)?;
        let y = preprocessor.target(&fit_table).map_err(PredictorError::Data)?;

        let budget = Budget::from_limit(time_limit.or(self.options.time_limit));
        let ctx = FitContext {
            x: &x,
            y: &y,
            val: val_table.as_ref(),
            preprocessor: &preprocessor,
            metric,
            budget: &budget,
        };

        let outcomes: Vec<(PlannedModel, ModelRecord, Outcome)> = match self.options.fit_strategy {
            FitStrategy::Sequential => {
                let mut outcomes = Vec::with_capacity(pending.len());
                for Pending {
                    plan,
                    backend,
                    mut record,
                } in pending
                {
                    let outcome = ctx.fit_one(&plan, backend, &mut record);
                    let fatal = matches!(outcome, Outcome::Failed(_)) && self.options.raise_on_model_failure;
                    outcomes.push((plan, record, outcome));
                    if fatal {
                        break;
                    }
                }
                outcomes
            }
            FitStrategy::Parallel => pending
                .into_par_iter()
                .map(|Pending { plan, backend, mut record }| {
                    let outcome = ctx.fit_one(&plan, backend, &mut record);
                    (plan, record, outcome)
                })
                .collect(),
        };

        let mut models = BTreeMap::new();
        let mut records = Vec::with_capacity(outcomes.len() + 1);
        for (plan, record, outcome) in outcomes {
            match outcome {
                Outcome::Fitted(mut model) => {
                    model.fit_order = models.len();
                    models.insert(model.name().to_string(), model);
                }
                Outcome::Failed(cause) if self.options.raise_on_model_failure => {
                    return Err(PredictorError::Training {
                        backend_id: plan.backend_id,
                        cause,
                    });
                }
                Outcome::Failed(_) | Outcome::Skipped => {}
            }
            records.push(record);
        }

        let unfinished = records.iter().filter(|r| !r.status.is_terminal()).count();
        if unfinished > 0 {
            warn!(skipped = unfinished, fitted = models.len(); "the time limit left models unfit");
        }

        if models.is_empty() {
            return Err(PredictorError::NoModelsFitted);
        }

        if self.options.fit_weighted_ensemble && models.len() >= 2 {
            ctx.fit_ensemble(&mut models, &mut records);
        }

        Ok(FitReport {
            models,
            records,
            preprocessor,
            eval_metric: metric,
            fit_rows: fit_table.n_rows(),
            val_rows: val_table.as_ref().map_or(0, Table::n_rows),
        })
    }

    /// Picks the fit and validation tables.
    fn split(
        &self,
        dataset: &Table,
        tuning: Option<&Table>,
        problem: ProblemType,
    ) -> Result<(Table, Option<Table>)> {
        if let Some(tuning) = tuning {
            return Ok((dataset.clone(), Some(tuning.clone())));
        }

        let frac = self
            .options
            .holdout_frac
            .or_else(|| default_holdout_frac(dataset.n_rows()))
            .filter(|&frac| frac > 0. && dataset.n_rows() >= 2);
        let Some(frac) = frac else {
            return Ok((dataset.clone(), None));
        };

        let (fit, val) = if problem.is_classification() {
            stratified_split(dataset, &self.label, frac, self.options.seed)
        } else {
            train_test_split(dataset, frac, self.options.seed)
        }
        .map_err(PredictorError::Data)?;

        info!(fit_rows = fit.n_rows(), val_rows = val.n_rows(); "held out validation data");
        Ok((fit, Some(val)))
    }
}

/// What every backend of a fit shares, read-only.
struct FitContext<'a> {
    x: &'a Array2<f32>,
    y: &'a Target,
    val: Option<&'a Table>,
    preprocessor: &'a Arc<Preprocessor>,
    metric: EvalMetric,
    budget: &'a Budget,
}

impl FitContext<'_> {
    /// Fits one backend, moving `record` along its lifecycle.
    fn fit_one(&self, plan: &PlannedModel, mut backend: Box<dyn Backend>, record: &mut ModelRecord) -> Outcome {
        if self.budget.expired() {
            warn!(model = plan.name.as_str(); "time limit reached, skipping");
            record.skip("time limit reached");
            return Outcome::Skipped;
        }

        record.advance(ModelStatus::Fitting);
        info!(model = plan.name.as_str(), backend = plan.backend_id.as_str(); "fitting");

        let start = Instant::now();
        let result: foundation::Result<FitStats> = backend.fit(self.x.view(), self.y, self.budget);
        let fit_time = start.elapsed();

        match result {
            Ok(stats) => {
                let mut model = FittedModel::new(
                    plan.name.clone(),
                    Arc::from(backend),
                    Arc::clone(self.preprocessor),
                    fit_time,
                );
                model.stats = Some(stats);
                model.val_score = self.validate(&model);
                record.advance(ModelStatus::Fitted);

                info!(
                    model = plan.name.as_str(), fit_time:? = fit_time, val_score:? = model.val_score;
                    "fitted"
                );
                Outcome::Fitted(model)
            }
            Err(e) => {
                warn!(model = plan.name.as_str(), backend = plan.backend_id.as_str(); "failed to fit: {e}");
                record.fail(e.to_string());
                Outcome::Failed(e)
            }
        }
    }

    fn validate(&self, model: &FittedModel) -> Option<f64> {
        let val = self.val?;
        let scored = model
            .predict_encoded(val)
            .and_then(|output| score_output(model, &output, val, self.metric));

        match scored {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(model = model.name(); "validation failed: {e}");
                None
            }
        }
    }

    /// Adds the weighted ensemble of every fitted model, logging instead of failing.
    fn fit_ensemble(&self, models: &mut BTreeMap<String, FittedModel>, records: &mut Vec<ModelRecord>) {
        let mut base: Vec<&FittedModel> = models.values().collect();
        base.sort_by_key(|m| m.fit_order());
        let members = base.iter().map(|m| Arc::clone(m.backend())).collect();

        let mut ensemble = WeightedEnsemble::new(members, self.metric);
        let mut record = ModelRecord::new(ENSEMBLE_NAME, ENSEMBLE_ID);
        record.advance(ModelStatus::Fitting);
        let start = Instant::now();

        if let Some(val) = self.val {
            let fitted = self
                .preprocessor
                .features(val)
                .and_then(|x| Ok((x, self.preprocessor.target(val)?)))
                .and_then(|(x, y)| ensemble.fit(x.view(), &y, self.budget));

            if let Err(e) = fitted {
                warn!(model = ENSEMBLE_NAME; "failed to fit: {e}");
                record.fail(e.to_string());
                records.push(record);
                return;
            }
        }

        let mut model = FittedModel::new(
            ENSEMBLE_NAME.to_string(),
            Arc::new(ensemble),
            Arc::clone(self.preprocessor),
            start.elapsed(),
        );
        model.stack_level = 2;
        model.fit_order = models.len();
        model.val_score = self.validate(&model);

        record.advance(ModelStatus::Fitted);
        records.push(record);
        models.insert(ENSEMBLE_NAME.to_string(), model);
    }
}
