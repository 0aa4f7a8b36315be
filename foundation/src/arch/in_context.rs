use log::{debug, info, warn};
use ndarray::{ArrayView2, Axis};
use rand::{SeedableRng, rngs::StdRng, seq::index};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Artifact, Backend, BackendKind, Context, FitStats, Output};
use crate::{
    encoding::Target,
    error::{MlErr, Result},
    optimization::{Adam, GradientDescent},
    training::{Budget, FineTuner, Objective, TuneStats},
};

/// Rows predicted per rayon task.
const PREDICT_CHUNK: usize = 256;
/// Fine-tuning is skipped on smaller contexts.
const MIN_TUNE_ROWS: usize = 4;
const PROBA_FLOOR: f32 = 1e-7;

/// The model behind an [`InContextBackend`]: a function of a flat parameter vector, a
/// labelled context and the query rows.
pub trait Learner: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Sets the learner up for `width` encoded features and returns its fine-tunable
    /// tensors with their prior values, in the order they're laid out in the flat
    /// parameter vector.
    ///
    /// # Arguments
    /// * `width` - The amount of encoded feature columns.
    /// * `n_classes` - The amount of classes, `None` for regression.
    fn init(&mut self, width: usize, n_classes: Option<usize>) -> Vec<(&'static str, Vec<f32>)>;

    /// Predicts `queries` attending to `context`.
    fn forward(&self, params: &[f32], context: &Context, queries: ArrayView2<'_, f32>) -> Output;

    /// Tensors that are part of the model but are never fine-tuned.
    fn frozen(&self) -> Vec<(&'static str, Vec<f32>)> {
        Vec::new()
    }

    /// Replaces the frozen tensors with the ones found in `artifact`.
    fn restore(&mut self, _artifact: &Artifact) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    GradientDescent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FineTune {
    pub steps: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InContextOptions {
    /// Training rows beyond this are sampled away.
    pub max_context: usize,
    pub seed: u64,
    /// `None` keeps the backend zero-shot.
    pub fine_tune: Option<FineTune>,
}

impl Default for InContextOptions {
    fn default() -> Self {
        Self {
            max_context: 1024,
            seed: 0,
            fine_tune: None,
        }
    }
}

#[derive(Debug)]
struct Fitted {
    context: Context,
    segments: Vec<(&'static str, usize)>,
    params: Vec<f32>,
}

/// Adapts a [`Learner`] to the [`Backend`] interface.
///
/// Fitting stores the (capped) training rows as context, loads the prior weights,
/// overridden by the checkpoint when there's one, and optionally fine-tunes them on
/// held-out batches of the context.
#[derive(Debug)]
pub struct InContextBackend<L: Learner> {
    learner: L,
    options: InContextOptions,
    checkpoint: Option<Artifact>,
    fitted: Option<Fitted>,
}

impl<L: Learner> InContextBackend<L> {
    pub fn new(learner: L, options: InContextOptions) -> Self {
        Self {
            learner,
            options,
            checkpoint: None,
            fitted: None,
        }
    }

    /// Starts from the weights in `checkpoint` instead of the built-in priors.
    pub fn with_checkpoint(mut self, checkpoint: Artifact) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn options(&self) -> &InContextOptions {
        &self.options
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn initial_params(
        &mut self,
        width: usize,
        n_classes: Option<usize>,
    ) -> Result<(Vec<(&'static str, usize)>, Vec<f32>)> {
        let priors = self.learner.init(width, n_classes);
        if let Some(checkpoint) = &self.checkpoint {
            self.learner.restore(checkpoint)?;
        }

        let mut segments = Vec::with_capacity(priors.len());
        let mut params = Vec::new();
        for (name, prior) in priors {
            let values = match &self.checkpoint {
                Some(checkpoint) => checkpoint
                    .get_sized(name, prior.len())?
                    .map_or(prior, <[f32]>::to_vec),
                None => prior,
            };
            segments.push((name, values.len()));
            params.extend(values);
        }

        Ok((segments, params))
    }
}

impl<L: Learner> Backend for InContextBackend<L> {
    fn id(&self) -> &str {
        self.learner.kind().id()
    }

    fn fit(&mut self, x: ArrayView2<'_, f32>, y: &Target, budget: &Budget) -> Result<FitStats> {
        let n = x.nrows();
        if n != y.len() {
            return Err(MlErr::SizeMismatch {
                a: "features",
                b: "target",
                got: y.len(),
                expected: n,
            });
        }
        if n == 0 {
            return Err(MlErr::NotEnoughRows {
                got: 0,
                required: 1,
            });
        }

        let (segments, mut params) = self.initial_params(x.ncols(), y.n_classes())?;

        let max_context = self.options.max_context.max(1);
        let rows: Vec<usize> = if n > max_context {
            let mut rng = StdRng::seed_from_u64(self.options.seed);
            let mut rows = index::sample(&mut rng, n, max_context).into_vec();
            rows.sort_unstable();
            rows
        } else {
            (0..n).collect()
        };
        let context = Context::new(x.select(Axis(0), &rows), y.select(&rows))?;

        let fine_tune = match self.options.fine_tune {
            Some(options) if context.len() >= MIN_TUNE_ROWS => Some(fine_tune(
                &self.learner,
                &context,
                &mut params,
                &options,
                self.options.seed,
                budget,
            )?),
            Some(_) => {
                warn!(
                    backend = self.id(), rows = context.len();
                    "context too small to fine-tune, staying zero-shot"
                );
                None
            }
            None => None,
        };

        info!(
            backend = self.id(), context_rows = context.len(), params = params.len();
            "fitted"
        );

        let stats = FitStats {
            context_rows: context.len(),
            fine_tune,
        };
        self.fitted = Some(Fitted {
            context,
            segments,
            params,
        });

        Ok(stats)
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Output> {
        let fitted = self.fitted.as_ref().ok_or(MlErr::NotFitted)?;
        if x.ncols() != fitted.context.width() {
            return Err(MlErr::SizeMismatch {
                a: "queries",
                b: "context",
                got: x.ncols(),
                expected: fitted.context.width(),
            });
        }

        debug!(backend = self.id(), rows = x.nrows(); "predicting");

        let parts: Vec<Output> = x
            .axis_chunks_iter(Axis(0), PREDICT_CHUNK)
            .into_par_iter()
            .map(|chunk| {
                self.learner
                    .forward(&fitted.params, &fitted.context, chunk)
            })
            .collect();

        Ok(Output::concat(parts, fitted.context.y().n_classes()))
    }

    fn artifact(&self) -> Result<Artifact> {
        let fitted = self.fitted.as_ref().ok_or(MlErr::NotFitted)?;

        let mut artifact = Artifact::new();
        let mut at = 0;
        for &(name, len) in &fitted.segments {
            artifact.insert(name, fitted.params[at..at + len].to_vec());
            at += len;
        }
        for (name, values) in self.learner.frozen() {
            artifact.insert(name, values);
        }

        Ok(artifact)
    }
}

fn fine_tune<L: Learner>(
    learner: &L,
    context: &Context,
    params: &mut [f32],
    options: &FineTune,
    seed: u64,
    budget: &Budget,
) -> Result<TuneStats> {
    let objective = Holdout { learner, context };
    let stats = match options.optimizer {
        OptimizerKind::Adam => FineTuner::new(
            Adam::new(params.len(), options.learning_rate),
            options.steps,
            options.batch_size,
            seed,
        )
        .tune(&objective, params, budget)?,
        OptimizerKind::GradientDescent => FineTuner::new(
            GradientDescent::new(options.learning_rate),
            options.steps,
            options.batch_size,
            seed,
        )
        .tune(&objective, params, budget)?,
    };

    info!(
        backend = learner.kind().id(),
        steps = stats.steps,
        initial_loss = stats.initial_loss,
        final_loss = stats.final_loss;
        "fine-tuned"
    );

    Ok(stats)
}

/// Predicts sampled query rows from the rest of the context.
struct Holdout<'a, L> {
    learner: &'a L,
    context: &'a Context,
}

impl<L: Learner> Objective for Holdout<'_, L> {
    type Batch = (Context, Context);

    fn n_rows(&self) -> usize {
        self.context.len()
    }

    fn batch(&self, queries: &[usize]) -> Self::Batch {
        self.context.hold_out(queries)
    }

    fn loss(&self, params: &[f32], (queries, rest): &Self::Batch) -> f32 {
        let out = self.learner.forward(params, rest, queries.x());
        held_out_loss(&out, queries.y())
    }
}

/// Cross-entropy for classes and mean squared error for values, `NaN` on a mismatch.
pub(crate) fn held_out_loss(out: &Output, truth: &Target) -> f32 {
    match (out, truth) {
        (Output::Proba(proba), Target::Classes { codes, .. }) => {
            if proba.iter().any(|p| !p.is_finite()) || codes.is_empty() {
                return f32::NAN;
            }
            codes
                .iter()
                .enumerate()
                .map(|(row, &c)| -proba[[row, c]].max(PROBA_FLOOR).ln())
                .sum::<f32>()
                / codes.len() as f32
        }
        (Output::Values(pred), Target::Values(truth)) => {
            (pred - truth).mapv(|d| d * d).mean().unwrap_or(f32::NAN)
        }
        _ => f32::NAN,
    }
}
