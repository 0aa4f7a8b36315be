use std::time::{Duration, Instant};

use foundation::{
    MlErr,
    arch::Output,
    dataset::{Column, Table},
    metrics::{EvalMetric, Evaluation, argmax_rows},
};
use ndarray::Array2;

use crate::{
    error::{PredictorError, Result},
    model::FittedModel,
};

/// One prediction per input row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    /// Class labels, for classification.
    Labels(Vec<String>),
    /// Label values, for regression.
    Values(Vec<f64>),
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::Labels(labels) => labels.len(),
            Predictions::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Class probabilities, one column per class and one row per input row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbaTable {
    pub classes: Vec<String>,
    pub proba: Array2<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub model: String,
    pub backend_id: String,
    pub score_test: f64,
    pub score_val: Option<f64>,
    pub eval_metric: &'static str,
    pub fit_time: Duration,
    pub pred_time_test: Duration,
    pub stack_level: u8,
    pub fit_order: usize,
}

/// Predicts with fitted models and ranks them.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationFacade {
    metric: EvalMetric,
}

impl EvaluationFacade {
    pub fn new(metric: EvalMetric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> EvalMetric {
        self.metric
    }

    /// Predicts a label (or value) for every row of `data`. The label column, if
    /// present, is ignored.
    ///
    /// # Errors
    /// `Prediction` if `data` doesn't carry the training features.
    pub fn predict(&self, model: &FittedModel, data: &Table) -> Result<Predictions> {
        let output = model.predict_encoded(data)?;
        Ok(decode(model, &output))
    }

    /// Predicts the class probabilities of every row of `data`.
    ///
    /// # Errors
    /// `UnsupportedOperation` for regression models.
    pub fn predict_proba(&self, model: &FittedModel, data: &Table) -> Result<ProbaTable> {
        let classes = model.preprocessor().classes().ok_or_else(|| {
            PredictorError::UnsupportedOperation(format!(
                "predict_proba is only available for classification, '{}' is a {} model",
                model.name(),
                model.problem_type()
            ))
        })?;

        match model.predict_encoded(data)? {
            Output::Proba(proba) => Ok(ProbaTable {
                classes: classes.to_vec(),
                proba,
            }),
            Output::Values(_) => Err(PredictorError::Prediction(MlErr::MetricMismatch {
                metric: "proba",
            })),
        }
    }

    /// Scores `model` on `data` with `metric`.
    ///
    /// # Errors
    /// `Prediction` if the label column is missing or has the wrong type.
    pub fn score(&self, model: &FittedModel, data: &Table, metric: EvalMetric) -> Result<f64> {
        let output = model.predict_encoded(data)?;
        score_output(model, &output, data, metric)
    }

    /// Every metric that applies to the model's problem type.
    pub fn evaluate(&self, model: &FittedModel, data: &Table) -> Result<Vec<(EvalMetric, f64)>> {
        let output = model.predict_encoded(data)?;
        EvalMetric::all_for(model.problem_type())
            .into_iter()
            .map(|metric| Ok((metric, score_output(model, &output, data, metric)?)))
            .collect()
    }

    /// One row per model, best test score first. Ties keep the fit order.
    ///
    /// # Errors
    /// `Prediction` if `data` lacks the label column or the training features.
    pub fn leaderboard<'a, I>(&self, models: I, data: &Table) -> Result<Vec<LeaderboardRow>>
    where
        I: IntoIterator<Item = &'a FittedModel>,
    {
        let mut rows = models
            .into_iter()
            .map(|model| {
                let start = Instant::now();
                let output = model.predict_encoded(data)?;
                let pred_time_test = start.elapsed();

                Ok(LeaderboardRow {
                    model: model.name().to_string(),
                    backend_id: model.backend_id().to_string(),
                    score_test: score_output(model, &output, data, self.metric)?,
                    score_val: model.val_score(),
                    eval_metric: self.metric.name(),
                    fit_time: model.fit_time(),
                    pred_time_test,
                    stack_level: model.stack_level(),
                    fit_order: model.fit_order(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        rows.sort_by(|a, b| {
            b.score_test
                .total_cmp(&a.score_test)
                .then(a.fit_order.cmp(&b.fit_order))
        });
        Ok(rows)
    }
}

fn decode(model: &FittedModel, output: &Output) -> Predictions {
    let target = model.preprocessor().target_encoder();
    match output {
        Output::Proba(proba) => Predictions::Labels(
            argmax_rows(proba.view())
                .into_iter()
                .map(|code| target.decode_class(code).unwrap_or_default().to_string())
                .collect(),
        ),
        Output::Values(values) => {
            Predictions::Values(values.iter().map(|&v| target.decode_value(v)).collect())
        }
    }
}

/// Scores in label units: unseen classes count as misses, values are decoded.
pub(crate) fn score_output(
    model: &FittedModel,
    output: &Output,
    data: &Table,
    metric: EvalMetric,
) -> Result<f64> {
    let preprocessor = model.preprocessor();
    let label = data
        .require(preprocessor.label())
        .map_err(PredictorError::Prediction)?;
    let target = preprocessor.target_encoder();

    let score = match output {
        Output::Proba(proba) => {
            let truth = target.encode_lenient(label);
            metric.score(Evaluation::Classes {
                proba: proba.view(),
                truth: &truth,
            })
        }
        Output::Values(values) => {
            let Column::Numeric(truth) = label else {
                return Err(PredictorError::Prediction(MlErr::InvalidLabel(
                    "a regression label must be numeric".into(),
                )));
            };
            let pred: Vec<f64> = values.iter().map(|&v| target.decode_value(v)).collect();
            metric.score(Evaluation::Values {
                pred: &pred,
                truth,
            })
        }
    };

    score.map_err(PredictorError::Prediction)
}
