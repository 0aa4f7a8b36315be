use std::collections::BTreeMap;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::{
    arch::Output,
    encoding::Target,
    error::{MlErr, Result},
    problem::ProblemType,
};

const LOG_LOSS_EPS: f64 = 1e-15;

/// Predictions paired with the ground truth they're scored against.
#[derive(Debug, Clone, Copy)]
pub enum Evaluation<'a> {
    /// Class probabilities and the true class codes (`None` for classes unseen at fit).
    Classes {
        proba: ArrayView2<'a, f32>,
        truth: &'a [Option<usize>],
    },
    /// Predicted and true values, in label units.
    Values { pred: &'a [f64], truth: &'a [f64] },
}

impl Evaluation<'_> {
    fn len(&self) -> (usize, usize) {
        match self {
            Evaluation::Classes { proba, truth } => (proba.nrows(), truth.len()),
            Evaluation::Values { pred, truth } => (pred.len(), truth.len()),
        }
    }
}

/// The metrics models are ranked by. Scores are always reported so that higher is
/// better, error metrics are negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMetric {
    Accuracy,
    BalancedAccuracy,
    LogLoss,
    RootMeanSquaredError,
    MeanAbsoluteError,
    R2,
}

impl EvalMetric {
    pub fn name(self) -> &'static str {
        match self {
            EvalMetric::Accuracy => "accuracy",
            EvalMetric::BalancedAccuracy => "balanced_accuracy",
            EvalMetric::LogLoss => "log_loss",
            EvalMetric::RootMeanSquaredError => "root_mean_squared_error",
            EvalMetric::MeanAbsoluteError => "mean_absolute_error",
            EvalMetric::R2 => "r2",
        }
    }

    pub fn default_for(problem: ProblemType) -> Self {
        if problem.is_classification() {
            EvalMetric::Accuracy
        } else {
            EvalMetric::RootMeanSquaredError
        }
    }

    pub fn supports(self, problem: ProblemType) -> bool {
        let classification = matches!(
            self,
            EvalMetric::Accuracy | EvalMetric::BalancedAccuracy | EvalMetric::LogLoss
        );
        classification == problem.is_classification()
    }

    /// Every metric that applies to `problem`.
    pub fn all_for(problem: ProblemType) -> Vec<Self> {
        [
            EvalMetric::Accuracy,
            EvalMetric::BalancedAccuracy,
            EvalMetric::LogLoss,
            EvalMetric::RootMeanSquaredError,
            EvalMetric::MeanAbsoluteError,
            EvalMetric::R2,
        ]
        .into_iter()
        .filter(|m| m.supports(problem))
        .collect()
    }

    /// Scores `eval`, higher is better.
    ///
    /// # Errors
    /// If the metric doesn't apply to the evaluation kind, lengths differ or it's empty.
    pub fn score(self, eval: Evaluation<'_>) -> Result<f64> {
        let (got, expected) = eval.len();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                a: "predictions",
                b: "ground truth",
                got,
                expected,
            });
        }
        if expected == 0 {
            return Err(MlErr::NotEnoughRows {
                got: 0,
                required: 1,
            });
        }

        let n = expected as f64;
        match (self, eval) {
            (EvalMetric::Accuracy, Evaluation::Classes { proba, truth }) => {
                let hits = argmax_rows(proba)
                    .iter()
                    .zip(truth)
                    .filter(|(p, t)| Some(**p) == **t)
                    .count();
                Ok(hits as f64 / n)
            }
            (EvalMetric::BalancedAccuracy, Evaluation::Classes { proba, truth }) => {
                let mut per_class: BTreeMap<Option<usize>, (usize, usize)> = BTreeMap::new();
                for (p, t) in argmax_rows(proba).iter().zip(truth) {
                    let entry = per_class.entry(*t).or_default();
                    entry.1 += 1;
                    if Some(*p) == *t {
                        entry.0 += 1;
                    }
                }
                let recalls: f64 = per_class
                    .values()
                    .map(|(hits, total)| *hits as f64 / *total as f64)
                    .sum();
                Ok(recalls / per_class.len() as f64)
            }
            (EvalMetric::LogLoss, Evaluation::Classes { proba, truth }) => {
                let total: f64 = truth
                    .iter()
                    .enumerate()
                    .map(|(row, t)| {
                        let p = t
                            .and_then(|c| proba.get([row, c]).copied())
                            .unwrap_or(0.0) as f64;
                        -p.max(LOG_LOSS_EPS).ln()
                    })
                    .sum();
                Ok(-total / n)
            }
            (EvalMetric::RootMeanSquaredError, Evaluation::Values { pred, truth }) => {
                let mse = pred
                    .iter()
                    .zip(truth)
                    .map(|(p, t)| (p - t).powi(2))
                    .sum::<f64>()
                    / n;
                Ok(-mse.sqrt())
            }
            (EvalMetric::MeanAbsoluteError, Evaluation::Values { pred, truth }) => {
                let mae = pred.iter().zip(truth).map(|(p, t)| (p - t).abs()).sum::<f64>() / n;
                Ok(-mae)
            }
            (EvalMetric::R2, Evaluation::Values { pred, truth }) => {
                let mean = truth.iter().sum::<f64>() / n;
                let ss_res: f64 = pred.iter().zip(truth).map(|(p, t)| (t - p).powi(2)).sum();
                let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
                if ss_tot == 0.0 {
                    return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
                }
                Ok(1.0 - ss_res / ss_tot)
            }
            (metric, _) => Err(MlErr::MetricMismatch {
                metric: metric.name(),
            }),
        }
    }
}

impl EvalMetric {
    /// Scores raw backend outputs against an encoded target. Regression is scored in
    /// standardized units, which ranks models the same way the label units do.
    pub fn score_encoded(self, out: &Output, truth: &Target) -> Result<f64> {
        match (out, truth) {
            (Output::Proba(proba), Target::Classes { codes, .. }) => {
                let truth: Vec<Option<usize>> = codes.iter().copied().map(Some).collect();
                self.score(Evaluation::Classes {
                    proba: proba.view(),
                    truth: &truth,
                })
            }
            (Output::Values(pred), Target::Values(truth)) => {
                let pred: Vec<f64> = pred.iter().copied().map(f64::from).collect();
                let truth: Vec<f64> = truth.iter().copied().map(f64::from).collect();
                self.score(Evaluation::Values {
                    pred: &pred,
                    truth: &truth,
                })
            }
            _ => Err(MlErr::MetricMismatch {
                metric: self.name(),
            }),
        }
    }
}

/// The index of the largest value of each row, the first one on ties.
pub fn argmax_rows(proba: ArrayView2<'_, f32>) -> Vec<usize> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &p)| {
                    if p > best.1 { (i, p) } else { best }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn accuracy_and_balanced_accuracy() {
        let proba = array![[0.9, 0.1], [0.2, 0.8], [0.6, 0.4], [0.3, 0.7]];
        let truth = [Some(0), Some(1), Some(1), Some(1)];
        let eval = Evaluation::Classes {
            proba: proba.view(),
            truth: &truth,
        };

        assert_eq!(EvalMetric::Accuracy.score(eval).unwrap(), 0.75);
        // Class 0: 1/1, class 1: 2/3.
        let balanced = EvalMetric::BalancedAccuracy.score(eval).unwrap();
        assert!((balanced - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn log_loss_is_negated_and_clipped() {
        let proba = array![[1.0, 0.0], [0.5, 0.5]];
        let truth = [Some(1), None];
        let score = EvalMetric::LogLoss
            .score(Evaluation::Classes {
                proba: proba.view(),
                truth: &truth,
            })
            .unwrap();
        assert!((score - LOG_LOSS_EPS.ln()).abs() < 1e-9);
    }

    #[test]
    fn regression_errors_are_negated() {
        let eval = Evaluation::Values {
            pred: &[1.0, 2.0],
            truth: &[1.0, 4.0],
        };
        assert!((EvalMetric::RootMeanSquaredError.score(eval).unwrap() + 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(EvalMetric::MeanAbsoluteError.score(eval).unwrap(), -1.0);
        assert_eq!(
            EvalMetric::R2.score(eval).unwrap(),
            1.0 - 4.0 / 4.5
        );
    }

    #[test]
    fn mismatched_metric_kind_and_lengths_fail() {
        let eval = Evaluation::Values {
            pred: &[1.0],
            truth: &[1.0],
        };
        assert!(matches!(
            EvalMetric::Accuracy.score(eval),
            Err(MlErr::MetricMismatch { metric: "accuracy" })
        ));

        let eval = Evaluation::Values {
            pred: &[1.0],
            truth: &[1.0, 2.0],
        };
        assert!(matches!(
            EvalMetric::R2.score(eval),
            Err(MlErr::SizeMismatch { .. })
        ));
    }

    #[test]
    fn metrics_match_problem_types() {
        assert_eq!(
            EvalMetric::all_for(ProblemType::Regression),
            vec![
                EvalMetric::RootMeanSquaredError,
                EvalMetric::MeanAbsoluteError,
                EvalMetric::R2
            ]
        );
        assert!(EvalMetric::LogLoss.supports(ProblemType::Binary));
        assert_eq!(
            EvalMetric::default_for(ProblemType::Multiclass),
            EvalMetric::Accuracy
        );
    }

    #[test]
    fn encoded_outputs_are_scored() {
        let out = Output::Proba(array![[0.9, 0.1], [0.4, 0.6]]);
        let truth = Target::Classes {
            codes: vec![0, 0],
            n_classes: 2,
        };
        assert_eq!(EvalMetric::Accuracy.score_encoded(&out, &truth).unwrap(), 0.5);

        let out = Output::Values(array![1.0, 2.0]);
        assert!(matches!(
            EvalMetric::Accuracy.score_encoded(&out, &truth),
            Err(MlErr::MetricMismatch { .. })
        ));
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        let proba = array![[0.5, 0.5], [0.1, 0.9]];
        assert_eq!(argmax_rows(proba.view()), vec![0, 1]);
    }
}
