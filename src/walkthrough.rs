use std::fs;

use anyhow::Context;
use foundation::dataset::{Table, train_test_split};
use log::info;
use predictor::{
    FitOptions, Hyperparameters, LeaderboardRow, PredictorConfig, Predictions, TabularPredictor,
};

use crate::{
    config::RunConfig,
    toy::{self, HOUSING_LABEL, WINE_LABEL},
};

const TEST_FRAC: f64 = 0.2;
const HOUSING_ROWS: usize = 300;

/// What one dataset's walkthrough produced.
#[derive(Debug)]
pub struct Summary {
    pub dataset: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub best_model: String,
    /// The first few test predictions.
    pub sample: Vec<String>,
    pub leaderboard: Vec<LeaderboardRow>,
}

/// Runs the fit, predict and leaderboard flow on the configured dataset, or on both
/// toy datasets when there's none.
pub fn run(config: &RunConfig) -> anyhow::Result<Vec<Summary>> {
    let hyperparameters = match &config.hyperparameters {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading hyperparameters from {}", path.display()))?;
            Hyperparameters::from_json(&raw)?
        }
        None => Hyperparameters::default(),
    };

    let datasets = match &config.csv {
        Some(csv) => {
            let table = Table::from_csv(&csv.path)
                .with_context(|| format!("loading {}", csv.path.display()))?;
            let name = csv
                .path
                .file_stem()
                .map_or_else(|| "csv".to_string(), |s| s.to_string_lossy().into_owned());
            vec![(name, table, csv.label.clone())]
        }
        None => vec![
            ("wine".to_string(), toy::wine_like(config.seed)?, WINE_LABEL.to_string()),
            (
                "housing".to_string(),
                toy::housing_like(HOUSING_ROWS, config.seed)?,
                HOUSING_LABEL.to_string(),
            ),
        ],
    };

    datasets
        .into_iter()
        .map(|(name, table, label)| walk(&name, &table, &label, &hyperparameters, config))
        .collect()
}

fn walk(
    name: &str,
    table: &Table,
    label: &str,
    hyperparameters: &Hyperparameters,
    config: &RunConfig,
) -> anyhow::Result<Summary> {
    let (train, test) = train_test_split(table, TEST_FRAC, config.seed)?;
    info!(dataset = name, train_rows = train.n_rows(), test_rows = test.n_rows(); "split");

    let mut predictor_config = PredictorConfig::new(label);
    if let Some(output) = &config.output {
        predictor_config = predictor_config.with_path(output.join(name));
    }

    let options = FitOptions {
        time_limit: config.time_limit,
        seed: config.seed,
        ..Default::default()
    };

    let mut predictor = TabularPredictor::new(predictor_config);
    predictor.fit(&train, None, hyperparameters, options)?;

    let predictions = predictor.predict(&test.without(label))?;
    if predictor.problem_type()?.is_classification() {
        let proba = predictor.predict_proba(&test)?;
        info!(dataset = name, classes = proba.classes.len(); "predicted probabilities");
    }

    let leaderboard = predictor.leaderboard(&test)?;
    let best_model = predictor.best_model()?.name().to_string();
    if let Some(path) = predictor.config().path.as_deref() {
        info!(dataset = name, path:? = path; "predictor written");
    }

    Ok(Summary {
        dataset: name.to_string(),
        train_rows: train.n_rows(),
        test_rows: test.n_rows(),
        best_model,
        sample: sample(&predictions, 5),
        leaderboard,
    })
}

fn sample(predictions: &Predictions, n: usize) -> Vec<String> {
    match predictions {
        Predictions::Labels(labels) => labels.iter().take(n).cloned().collect(),
        Predictions::Values(values) => values.iter().take(n).map(|v| format!("{v:.2}")).collect(),
    }
}
