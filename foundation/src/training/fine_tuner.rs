use log::{debug, warn};
use rand::{SeedableRng, rngs::StdRng, seq::index};
use rayon::prelude::*;

use super::Budget;
use crate::{
    error::{MlErr, Result},
    optimization::Optimizer,
};

/// The step used for the central finite differences.
const PROBE_STEP: f32 = 1e-2;

/// A loss over a flat parameter vector, evaluated on batches of query rows.
///
/// Implementors decide what a batch is; the tuner only samples the row indices. The
/// loss may come back non finite, the tuner treats that as a failure.
pub trait Objective: Sync {
    type Batch: Sync;

    /// The amount of rows queries are sampled from.
    fn n_rows(&self) -> usize;

    /// Prepares the batch for the given query rows.
    fn batch(&self, queries: &[usize]) -> Self::Batch;

    fn loss(&self, params: &[f32], batch: &Self::Batch) -> f32;
}

/// What a fine-tuning run did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneStats {
    pub steps: usize,
    pub initial_loss: f32,
    pub final_loss: f32,
    /// The budget ran out before every step ran.
    pub stopped_early: bool,
    /// Tuning made the probe loss worse, so the starting parameters were kept.
    pub kept_initial: bool,
}

/// Minimizes an [`Objective`] with an [`Optimizer`] fed by finite-difference gradients.
pub struct FineTuner<O: Optimizer> {
    optimizer: O,
    steps: usize,
    batch_size: usize,
    rng: StdRng,
}

impl<O: Optimizer> FineTuner<O> {
    /// Creates a new `FineTuner`.
    ///
    /// # Arguments
    /// * `optimizer` - Dictates how the parameters move on each step.
    /// * `steps` - The maximum amount of optimizer steps.
    /// * `batch_size` - The amount of query rows sampled per step.
    /// * `seed` - Seeds the batch sampling.
    pub fn new(optimizer: O, steps: usize, batch_size: usize, seed: u64) -> Self {
        Self {
            optimizer,
            steps,
            batch_size,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Runs the optimization, **`params` gets updated** in place.
    ///
    /// The budget is checked before every step and the run winds down once it expires.
    /// The loss on a fixed probe batch is measured before and after; if it got worse
    /// `params` is restored.
    ///
    /// # Errors
    /// `NotEnoughRows` with fewer than 2 rows, `NonFiniteLoss` if the loss or a gradient
    /// stops being finite.
    pub fn tune<J: Objective>(
        &mut self,
        objective: &J,
        params: &mut [f32],
        budget: &Budget,
    ) -> Result<TuneStats> {
        let n = objective.n_rows();
        if n < 2 {
            return Err(MlErr::NotEnoughRows {
                got: n,
                required: 2,
            });
        }

        // Queries never take every row, something has to be left to attend to.
        let batch_size = self.batch_size.clamp(1, n - 1);
        let probe_size = batch_size.max((n - 1).min(64));
        let probe_rows = index::sample(&mut self.rng, n, probe_size).into_vec();
        let probe = objective.batch(&probe_rows);

        let initial = params.to_vec();
        let initial_loss = objective.loss(params, &probe);
        if !initial_loss.is_finite() {
            return Err(MlErr::NonFiniteLoss { step: 0 });
        }

        let mut steps = 0;
        let mut stopped_early = false;

        for step in 1..=self.steps {
            if budget.expired() {
                warn!(step = step, total = self.steps; "time budget exhausted, stopping fine-tuning early");
                stopped_early = true;
                break;
            }

            let rows = index::sample(&mut self.rng, n, batch_size).into_vec();
            let batch = objective.batch(&rows);
            let grad = gradient(objective, params, &batch);

            if grad.iter().any(|g| !g.is_finite()) {
                return Err(MlErr::NonFiniteLoss { step });
            }

            self.optimizer.update_params(&grad, params)?;
            steps = step;

            if step % 10 == 0 {
                debug!(step = step, loss = objective.loss(params, &batch); "fine-tuning");
            }
        }

        let mut final_loss = objective.loss(params, &probe);
        if !final_loss.is_finite() {
            return Err(MlErr::NonFiniteLoss { step: steps });
        }

        let kept_initial = final_loss > initial_loss;
        if kept_initial {
            params.copy_from_slice(&initial);
            final_loss = initial_loss;
        }

        Ok(TuneStats {
            steps,
            initial_loss,
            final_loss,
            stopped_early,
            kept_initial,
        })
    }
}

/// Central differences, one parameter per rayon task.
fn gradient<J: Objective>(objective: &J, params: &[f32], batch: &J::Batch) -> Vec<f32> {
    (0..params.len())
        .into_par_iter()
        .map(|i| {
            let mut probe = params.to_vec();
            probe[i] = params[i] + PROBE_STEP;
            let plus = objective.loss(&probe, batch);
            probe[i] = params[i] - PROBE_STEP;
            let minus = objective.loss(&probe, batch);
            (plus - minus) / (2. * PROBE_STEP)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{Adam, GradientDescent};

    /// Mean squared distance of the queried targets to the first parameter.
    struct Centre(Vec<f32>);

    impl Objective for Centre {
        type Batch = Vec<f32>;

        fn n_rows(&self) -> usize {
            self.0.len()
        }

        fn batch(&self, queries: &[usize]) -> Vec<f32> {
            queries.iter().map(|&i| self.0[i]).collect()
        }

        fn loss(&self, params: &[f32], batch: &Vec<f32>) -> f32 {
            batch.iter().map(|t| (params[0] - t).powi(2)).sum::<f32>() / batch.len() as f32
        }
    }

    #[test]
    fn moves_towards_the_minimum() {
        let objective = Centre((0..40).map(|i| 3.0 + (i % 5) as f32 * 0.1).collect());
        let mut tuner = FineTuner::new(Adam::new(1, 0.1), 200, 8, 7);
        let mut params = [0.0];

        let stats = tuner
            .tune(&objective, &mut params, &Budget::unlimited())
            .unwrap();

        assert_eq!(stats.steps, 200);
        assert!(!stats.stopped_early);
        assert!(stats.final_loss < stats.initial_loss);
        assert!((params[0] - 3.2).abs() < 0.2, "{params:?}");
    }

    #[test]
    fn expired_budget_stops_before_the_first_step() {
        let objective = Centre(vec![1.0; 10]);
        let mut tuner = FineTuner::new(GradientDescent::new(0.1), 50, 4, 0);
        let mut params = [0.0];

        let stats = tuner
            .tune(&objective, &mut params, &Budget::within(std::time::Duration::ZERO))
            .unwrap();

        assert_eq!(stats.steps, 0);
        assert!(stats.stopped_early);
        assert_eq!(params, [0.0]);
    }

    #[test]
    fn diverging_runs_fail() {
        let objective = Centre(vec![1.0; 10]);
        let mut tuner = FineTuner::new(GradientDescent::new(1e30), 5, 4, 0);
        let mut params = [0.0];

        let err = tuner
            .tune(&objective, &mut params, &Budget::unlimited())
            .unwrap_err();
        assert!(matches!(err, MlErr::NonFiniteLoss { .. }));
    }

    #[test]
    fn needs_two_rows() {
        let mut tuner = FineTuner::new(GradientDescent::new(0.1), 5, 4, 0);
        assert!(matches!(
            tuner.tune(&Centre(vec![1.0]), &mut [0.0], &Budget::unlimited()),
            Err(MlErr::NotEnoughRows { got: 1, required: 2 })
        ));
    }
}
