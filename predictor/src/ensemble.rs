use std::sync::Arc;

use foundation::{
    MlErr,
    arch::{Artifact, Backend, FitStats, Output},
    encoding::Target,
    metrics::EvalMetric,
    training::Budget,
};
use log::info;
use ndarray::ArrayView2;

/// The name the ensemble shows up with in the leaderboard.
pub const ENSEMBLE_NAME: &str = "WeightedEnsemble_L2";
pub const ENSEMBLE_ID: &str = "WEIGHTED_ENSEMBLE";
const DEFAULT_ITERATIONS: usize = 25;

/// A weighted average of fitted backends.
///
/// Weights start uniform. Fitting runs greedy forward selection with replacement: on
/// every iteration the member that most improves the metric of the running average
/// is added once more, the weights are the selection counts over the iterations.
pub struct WeightedEnsemble {
    members: Vec<Arc<dyn Backend>>,
    weights: Vec<f32>,
    metric: EvalMetric,
    iterations: usize,
}

impl WeightedEnsemble {
    pub fn new(members: Vec<Arc<dyn Backend>>, metric: EvalMetric) -> Self {
        let weights = vec![1. / members.len().max(1) as f32; members.len()];
        Self {
            members,
            weights,
            metric,
            iterations: DEFAULT_ITERATIONS,
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// One weight per member, summing to 1.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

impl Backend for WeightedEnsemble {
    fn id(&self) -> &str {
        ENSEMBLE_ID
    }

    fn fit(&mut self, x: ArrayView2<'_, f32>, y: &Target, budget: &Budget) -> foundation::Result<FitStats> {
        if self.members.is_empty() {
            return Err(MlErr::NotFitted);
        }

        let preds = self
            .members
            .iter()
            .map(|member| member.predict(x))
            .collect::<foundation::Result<Vec<_>>>()?;

        let mut counts = vec![0usize; preds.len()];
        let mut sum: Option<Output> = None;
        let mut done = 0;

        for it in 1..=self.iterations {
            if it > 1 && budget.expired() {
                break;
            }

            let mut best: Option<(usize, f64)> = None;
            for (i, pred) in preds.iter().enumerate() {
                let candidate = add(sum.as_ref(), pred, 1. / it as f32);
                let score = self.metric.score_encoded(&candidate, y)?;
                if best.is_none_or(|(_, s)| score > s) {
                    best = Some((i, score));
                }
            }

            let Some((i, _)) = best else { break };
            counts[i] += 1;
            sum = Some(add(sum.as_ref(), &preds[i], 1.));
            done = it;
        }

        self.weights = counts.iter().map(|&c| c as f32 / done as f32).collect();
        info!(
            metric = self.metric.name(), iterations = done;
            "ensemble weights {:?}", self.weights
        );

        Ok(FitStats {
            context_rows: x.nrows(),
            fine_tune: None,
        })
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> foundation::Result<Output> {
        let mut sum: Option<Output> = None;
        for (member, &w) in self.members.iter().zip(&self.weights) {
            if w > 0. {
                let pred = scale(&member.predict(x)?, w);
                sum = Some(add(sum.as_ref(), &pred, 1.));
            }
        }
        sum.ok_or(MlErr::NotFitted)
    }

    fn artifact(&self) -> foundation::Result<Artifact> {
        let mut artifact = Artifact::new();
        artifact.insert("weights", self.weights.clone());
        Ok(artifact)
    }
}

/// `(sum + next) * factor`, just `next * factor` without a sum.
fn add(sum: Option<&Output>, next: &Output, factor: f32) -> Output {
    match (sum, next) {
        (Some(Output::Proba(s)), Output::Proba(n)) => Output::Proba((s + n) * factor),
        (Some(Output::Values(s)), Output::Values(n)) => Output::Values((s + n) * factor),
        (_, next) => scale(next, factor),
    }
}

fn scale(out: &Output, factor: f32) -> Output {
    match out {
        Output::Proba(p) => Output::Proba(p * factor),
        Output::Values(v) => Output::Values(v * factor),
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    /// Always predicts the same row.
    struct Constant(Output);

    impl Backend for Constant {
        fn id(&self) -> &str {
            "CONSTANT"
        }

        fn fit(&mut self, x: ArrayView2<'_, f32>, _: &Target, _: &Budget) -> foundation::Result<FitStats> {
            Ok(FitStats {
                context_rows: x.nrows(),
                fine_tune: None,
            })
        }

        fn predict(&self, x: ArrayView2<'_, f32>) -> foundation::Result<Output> {
            Ok(match &self.0 {
                Output::Proba(p) => {
                    Output::Proba(Array2::from_shape_fn((x.nrows(), p.ncols()), |(_, j)| p[[0, j]]))
                }
                Output::Values(v) => Output::Values(ndarray::Array1::from_elem(x.nrows(), v[0])),
            })
        }

        fn artifact(&self) -> foundation::Result<Artifact> {
            Ok(Artifact::new())
        }
    }

    fn member(p: [f32; 2]) -> Arc<dyn Backend> {
        Arc::new(Constant(Output::Proba(array![[p[0], p[1]]])))
    }

    #[test]
    fn uniform_without_fitting() {
        let ens = WeightedEnsemble::new(vec![member([1., 0.]), member([0., 1.])], EvalMetric::LogLoss);
        assert_eq!(ens.weights(), [0.5, 0.5]);
        assert_eq!(
            ens.predict(Array2::zeros((1, 1)).view()).unwrap(),
            Output::Proba(array![[0.5, 0.5]])
        );
    }

    #[test]
    fn greedy_selection_prefers_the_better_member() {
        let mut ens = WeightedEnsemble::new(
            vec![member([0.2, 0.8]), member([0.9, 0.1])],
            EvalMetric::LogLoss,
        )
        .with_iterations(10);
        let y = Target::Classes {
            codes: vec![0, 0, 0],
            n_classes: 2,
        };

        ens.fit(Array2::zeros((3, 1)).view(), &y, &Budget::unlimited())
            .unwrap();
        assert_eq!(ens.weights(), [0.0, 1.0]);
        assert_eq!(ens.artifact().unwrap().get("weights"), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn blends_regression_values() {
        let low: Arc<dyn Backend> = Arc::new(Constant(Output::Values(array![-1.0])));
        let high: Arc<dyn Backend> = Arc::new(Constant(Output::Values(array![1.0])));
        let mut ens = WeightedEnsemble::new(vec![low, high], EvalMetric::RootMeanSquaredError)
            .with_iterations(2);

        // The truth sits between both members, averaging them is perfect.
        let y = Target::Values(array![0.0, 0.0]);
        ens.fit(Array2::zeros((2, 1)).view(), &y, &Budget::unlimited())
            .unwrap();
        assert_eq!(ens.weights(), [0.5, 0.5]);
        assert_eq!(
            ens.predict(Array2::zeros((1, 1)).view()).unwrap(),
            Output::Values(array![0.0])
        );
    }
}
