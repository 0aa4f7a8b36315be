use std::fmt;

use ndarray::{Array1, Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};

use super::Artifact;
use crate::{encoding::Target, error::Result, training::{Budget, TuneStats}};

/// The backends shipped with this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackendKind {
    Mitra,
    TabPfnV2,
    TabIcl,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Mitra, BackendKind::TabPfnV2, BackendKind::TabIcl];

    /// The identifier backends are registered and configured under.
    pub fn id(self) -> &'static str {
        match self {
            BackendKind::Mitra => "MITRA",
            BackendKind::TabPfnV2 => "TABPFNV2",
            BackendKind::TabIcl => "TABICL",
        }
    }

    /// The default model name.
    pub fn display_name(self) -> &'static str {
        match self {
            BackendKind::Mitra => "Mitra",
            BackendKind::TabPfnV2 => "TabPFNv2",
            BackendKind::TabIcl => "TabICL",
        }
    }

    /// Higher priorities are fit first.
    pub fn default_priority(self) -> i32 {
        match self {
            BackendKind::TabPfnV2 => 105,
            BackendKind::TabIcl => 65,
            BackendKind::Mitra => 55,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// What a backend predicts for a batch of rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// `(rows, classes)` probabilities, every row sums to 1.
    Proba(Array2<f32>),
    /// One standardized value per row.
    Values(Array1<f32>),
}

impl Output {
    pub fn len(&self) -> usize {
        match self {
            Output::Proba(proba) => proba.nrows(),
            Output::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stacks the outputs of consecutive row chunks.
    pub(crate) fn concat(parts: Vec<Output>, n_classes: Option<usize>) -> Output {
        let rows = parts.iter().map(Output::len).sum();

        let Some(k) = n_classes else {
            let values = parts
                .into_iter()
                .flat_map(|part| match part {
                    Output::Values(values) => values.to_vec(),
                    Output::Proba(_) => Vec::new(),
                })
                .collect();
            return Output::Values(values);
        };

        let mut proba = Array2::zeros((rows, k));
        let mut at = 0;
        for part in parts {
            if let Output::Proba(p) = part {
                proba.slice_mut(s![at..at + p.nrows(), ..]).assign(&p);
                at += p.nrows();
            }
        }
        Output::Proba(proba)
    }
}

/// What fitting a backend did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitStats {
    /// The amount of training rows kept as context.
    pub context_rows: usize,
    /// Present when the backend was fine-tuned.
    pub fine_tune: Option<TuneStats>,
}

/// A pre-trained tabular learner that can be fit on a dataset and then predict.
///
/// Backends work on encoded features and targets, turning tables into matrices is
/// the caller's job.
pub trait Backend: Send + Sync {
    /// The identifier this backend is registered under.
    fn id(&self) -> &str;

    /// Fits the backend, optionally fine-tuning it within `budget`.
    ///
    /// # Arguments
    /// * `x` - The `(rows, width)` encoded features.
    /// * `y` - One target per row.
    /// * `budget` - The time left, checked at safe points.
    ///
    /// # Returns
    /// Statistics about the fit or an error if it failed.
    fn fit(&mut self, x: ArrayView2<'_, f32>, y: &Target, budget: &Budget) -> Result<FitStats>;

    /// Predicts every row of `x`.
    ///
    /// # Errors
    /// `NotFitted` before [`Backend::fit`] succeeded, `SizeMismatch` if the width changed.
    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Output>;

    /// The backend's current weights.
    fn artifact(&self) -> Result<Artifact>;
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn ids_round_trip() {
        for kind in BackendKind::ALL {
            assert_eq!(BackendKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(BackendKind::from_id("mitra"), None);
        assert_eq!(BackendKind::TabPfnV2.display_name(), "TabPFNv2");
    }

    #[test]
    fn default_priorities_prefer_tabpfn() {
        let mut kinds = BackendKind::ALL;
        kinds.sort_by_key(|k| std::cmp::Reverse(k.default_priority()));
        assert_eq!(
            kinds,
            [BackendKind::TabPfnV2, BackendKind::TabIcl, BackendKind::Mitra]
        );
    }

    #[test]
    fn concat_keeps_row_order() {
        let parts = vec![
            Output::Proba(array![[1.0, 0.0]]),
            Output::Proba(array![[0.0, 1.0], [0.5, 0.5]]),
        ];
        assert_eq!(
            Output::concat(parts, Some(2)),
            Output::Proba(array![[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]])
        );

        let empty = Output::concat(Vec::new(), Some(3));
        assert_eq!(empty.len(), 0);
        assert_eq!(
            Output::concat(vec![Output::Values(array![1.0]), Output::Values(array![2.0])], None),
            Output::Values(array![1.0, 2.0])
        );
    }
}
