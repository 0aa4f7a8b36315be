use std::collections::HashSet;

use foundation::problem::ProblemType;
use log::info;

use super::{BackendConfig, FitOptions, Hyperparameters};
use crate::{
    ensemble::ENSEMBLE_NAME,
    error::{PredictorError, Result},
    registry::ModelRegistry,
};

const MAX_EMBED_DIM: usize = 256;

/// A backend configuration that made it into the fit plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedModel {
    /// Unique within the plan.
    pub name: String,
    pub backend_id: String,
    pub priority: i32,
    pub config: BackendConfig,
}

/// Validates configs and turns them into an ordered, uniquely named fit plan.
#[derive(Debug, Default)]
pub struct Adapter;

impl Adapter {
    pub fn new() -> Self {
        Self
    }

    /// Validates everything up front and builds the plan for `problem`.
    ///
    /// # Errors
    /// `UnknownBackend` for identifiers the registry doesn't know, `InvalidConfig` for
    /// out of range options.
    pub fn adapt(
        &self,
        hyperparameters: &Hyperparameters,
        options: &FitOptions,
        problem: ProblemType,
        registry: &ModelRegistry,
    ) -> Result<Vec<PlannedModel>> {
        self.validate_options(options, registry)?;
        for config in hyperparameters.configs() {
            self.validate_config(config, registry)?;
        }

        Ok(self.plan(hyperparameters, options, problem))
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn validate_options(&self, options: &FitOptions, registry: &ModelRegistry) -> Result<()> {
        if let Some(frac) = options.holdout_frac {
            if !(0.0..1.0).contains(&frac) {
                return Err(PredictorError::InvalidConfig(format!(
                    "holdout_frac ({frac}) must be in [0, 1)"
                )));
            }
        }

        let filters = options
            .included_model_types
            .iter()
            .flatten()
            .chain(&options.excluded_model_types);
        for id in filters {
            if !registry.contains(id) {
                return Err(registry.unknown(id));
            }
        }

        Ok(())
    }

    fn validate_config(&self, config: &BackendConfig, registry: &ModelRegistry) -> Result<()> {
        let id = config.kind().id();
        if !registry.contains(id) {
            return Err(registry.unknown(id));
        }

        let invalid = |msg: String| Err(PredictorError::InvalidConfig(format!("{id}: {msg}")));
        let tuning = config.tuning();

        if tuning.max_context == 0 {
            return invalid("max_context must be greater than 0".into());
        }
        if tuning.fine_tune {
            if tuning.fine_tune_steps == 0 {
                return invalid("fine_tune_steps must be greater than 0".into());
            }
            if tuning.batch_size == 0 {
                return invalid("batch_size must be greater than 0".into());
            }
            if !(tuning.learning_rate.is_finite() && tuning.learning_rate > 0.) {
                return invalid(format!(
                    "learning_rate ({}) must be positive",
                    tuning.learning_rate
                ));
            }
        }
        if let Some(path) = tuning.checkpoint {
            if !path.is_file() {
                return invalid(format!("checkpoint {} does not exist", path.display()));
            }
        }

        match config {
            BackendConfig::Mitra(c) if !(c.temperature.is_finite() && c.temperature > 0.) => {
                return invalid(format!("temperature ({}) must be positive", c.temperature));
            }
            BackendConfig::TabIcl(c) if c.embed_dim == 0 || c.embed_dim > MAX_EMBED_DIM => {
                return invalid(format!(
                    "embed_dim ({}) must be in 1..={MAX_EMBED_DIM}",
                    c.embed_dim
                ));
            }
            _ => {}
        }

        let args = config.args();
        if args.name.as_deref().is_some_and(str::is_empty) {
            return invalid("name can't be empty".into());
        }
        if args.problem_types.as_ref().is_some_and(Vec::is_empty) {
            return invalid("problem_types can't be empty".into());
        }

        let name = base_name(config);
        if !is_file_name(&name) {
            return invalid(format!(
                "model name '{name}' may only hold ASCII letters, digits, '_', '-' and '.', \
                 and can't start with '.'"
            ));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Planning
    // -------------------------------------------------------------------------

    fn plan(
        &self,
        hyperparameters: &Hyperparameters,
        options: &FitOptions,
        problem: ProblemType,
    ) -> Vec<PlannedModel> {
        let mut entries: Vec<(i32, &BackendConfig)> = hyperparameters
            .configs()
            .iter()
            .filter(|config| {
                let id = config.kind().id();
                let excluded = options.excluded_model_types.iter().any(|e| e == id)
                    || options
                        .included_model_types
                        .as_ref()
                        .is_some_and(|included| !included.iter().any(|i| i == id));
                if excluded {
                    info!(backend = id; "excluded by the model type filters");
                }
                !excluded
            })
            .filter(|config| {
                let allowed = config
                    .args()
                    .problem_types
                    .as_ref()
                    .is_none_or(|types| types.contains(&problem));
                if !allowed {
                    info!(
                        backend = config.kind().id();
                        "skipped, {problem} is not in its problem_types"
                    );
                }
                allowed
            })
            .map(|config| {
                let priority = config
                    .args()
                    .priority
                    .unwrap_or_else(|| config.kind().default_priority());
                (priority, config)
            })
            .collect();

        // Stable, so equal priorities keep their given order.
        entries.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));

        // Fitted models are keyed by name, the ensemble's included.
        let mut taken = HashSet::from([ENSEMBLE_NAME.to_string()]);
        entries
            .into_iter()
            .map(|(priority, config)| {
                let mut config = config.clone();
                config.seed_or(options.seed);

                let name = unique_name(base_name(&config), &mut taken);
                PlannedModel {
                    name,
                    backend_id: config.kind().id().to_string(),
                    priority,
                    config,
                }
            })
            .collect()
    }
}

fn base_name(config: &BackendConfig) -> String {
    let args = config.args();
    let name = args
        .name
        .as_deref()
        .unwrap_or_else(|| config.kind().display_name());

    format!(
        "{}{name}{}",
        args.name_prefix.as_deref().unwrap_or_default(),
        args.name_suffix.as_deref().unwrap_or_default()
    )
}

/// Names end up as file names when a predictor is saved.
fn is_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// `name`, or `name_2`, `name_3`, ... when it's taken.
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.clone();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{name}_{n}");
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}
