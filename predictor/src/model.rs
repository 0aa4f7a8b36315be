use std::{sync::Arc, time::Duration};

use foundation::{
    MlErr,
    arch::{Backend, FitStats, Output},
    dataset::{Column, Table},
    encoding::{FeatureEncoder, Target, TargetEncoder},
    problem::ProblemType,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};

/// The encoding state every model of a fit shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    label: String,
    problem_type: ProblemType,
    features: FeatureEncoder,
    target: TargetEncoder,
}

impl Preprocessor {
    /// Learns the encodings from `features` and the label classes from `labels`.
    pub fn fit(
        features: &Table,
        labels: &Column,
        label: &str,
        problem_type: ProblemType,
    ) -> foundation::Result<Self> {
        Ok(Self {
            label: label.to_string(),
            problem_type,
            features: FeatureEncoder::fit(features, label)?,
            target: TargetEncoder::fit(labels, problem_type)?,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn problem_type(&self) -> ProblemType {
        self.problem_type
    }

    /// The class names, `None` for regression.
    pub fn classes(&self) -> Option<&[String]> {
        self.target.classes()
    }

    pub fn target_encoder(&self) -> &TargetEncoder {
        &self.target
    }

    /// Encodes the feature columns of `table`, the label column is ignored.
    pub fn features(&self, table: &Table) -> foundation::Result<Array2<f32>> {
        self.features.transform(table)
    }

    /// Encodes the label column of `table`.
    pub fn target(&self, table: &Table) -> foundation::Result<Target> {
        self.target.encode(table.require(&self.label)?)
    }
}

/// Where a model is in its lifecycle.
///
/// `Unfit → Fitting → Fitted` or `Unfit → Fitting → Failed`, both ends are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Unfit,
    Fitting,
    Fitted,
    Failed,
}

impl ModelStatus {
    /// Moves to `next`, `None` if the transition isn't allowed.
    pub fn advance(self, next: ModelStatus) -> Option<ModelStatus> {
        use ModelStatus::*;
        match (self, next) {
            (Unfit, Fitting) | (Fitting, Fitted) | (Fitting, Failed) => Some(next),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ModelStatus::Fitted | ModelStatus::Failed)
    }
}

/// What happened to a planned model during a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,
    pub backend_id: String,
    pub status: ModelStatus,
    /// Why the model failed or was skipped.
    pub reason: Option<String>,
}

impl ModelRecord {
    /// An `Unfit` record.
    pub fn new<N: Into<String>, B: Into<String>>(name: N, backend_id: B) -> Self {
        Self {
            name: name.into(),
            backend_id: backend_id.into(),
            status: ModelStatus::Unfit,
            reason: None,
        }
    }

    /// Moves the record to `next`, leaving it untouched and returning `false` if the
    /// lifecycle doesn't allow it.
    pub fn advance(&mut self, next: ModelStatus) -> bool {
        match self.status.advance(next) {
            Some(status) => {
                self.status = status;
                true
            }
            None => false,
        }
    }

    /// Marks a model that was never started.
    pub(crate) fn skip<S: Into<String>>(&mut self, reason: S) {
        self.reason = Some(reason.into());
    }

    /// Moves a fitting model to `Failed`.
    pub(crate) fn fail<S: Into<String>>(&mut self, reason: S) {
        if self.advance(ModelStatus::Failed) {
            self.reason = Some(reason.into());
        }
    }
}

/// A fitted backend plus everything needed to predict on raw tables.
pub struct FittedModel {
    name: String,
    backend_id: String,
    backend: Arc<dyn Backend>,
    preprocessor: Arc<Preprocessor>,
    pub(crate) fit_time: Duration,
    pub(crate) stats: Option<FitStats>,
    pub(crate) val_score: Option<f64>,
    pub(crate) stack_level: u8,
    pub(crate) fit_order: usize,
}

impl FittedModel {
    pub(crate) fn new(
        name: String,
        backend: Arc<dyn Backend>,
        preprocessor: Arc<Preprocessor>,
        fit_time: Duration,
    ) -> Self {
        Self {
            name,
            backend_id: backend.id().to_string(),
            backend,
            preprocessor,
            fit_time,
            stats: None,
            val_score: None,
            stack_level: 1,
            fit_order: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn problem_type(&self) -> ProblemType {
        self.preprocessor.problem_type
    }

    pub fn fit_time(&self) -> Duration {
        self.fit_time
    }

    /// Backend statistics, `None` for ensembles.
    pub fn stats(&self) -> Option<&FitStats> {
        self.stats.as_ref()
    }

    pub fn val_score(&self) -> Option<f64> {
        self.val_score
    }

    /// 1 for base models, 2 for the ensemble on top of them.
    pub fn stack_level(&self) -> u8 {
        self.stack_level
    }

    pub fn fit_order(&self) -> usize {
        self.fit_order
    }

    /// Encodes `table` and runs the backend on it.
    ///
    /// # Errors
    /// `Prediction` if `table` doesn't match the training schema.
    pub fn predict_encoded(&self, table: &Table) -> Result<Output> {
        let x = self
            .preprocessor
            .features(table)
            .map_err(PredictorError::Prediction)?;
        self.backend
            .predict(x.view())
            .map_err(PredictorError::Prediction)
    }

    /// The model's fitted weights.
    pub fn artifact(&self) -> std::result::Result<foundation::arch::Artifact, MlErr> {
        self.backend.artifact()
    }
}

impl std::fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FittedModel")
            .field("name", &self.name)
            .field("backend_id", &self.backend_id)
            .field("fit_time", &self.fit_time)
            .field("val_score", &self.val_score)
            .field("stack_level", &self.stack_level)
            .field("fit_order", &self.fit_order)
            .finish()
    }
}
