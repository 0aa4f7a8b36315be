use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    dataset::Column,
    error::{MlErr, Result},
};

/// Integer-valued numeric labels with at most this many distinct values are treated as
/// classes rather than as a regression target.
const MAX_INTEGER_CLASSES: usize = 20;

/// The kind of prediction problem a label column describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Binary,
    Multiclass,
    Regression,
}

impl ProblemType {
    pub fn is_classification(self) -> bool {
        !matches!(self, ProblemType::Regression)
    }

    /// Infers the problem type from the label column.
    ///
    /// Categorical labels are binary with two classes and multiclass with more. Numeric
    /// labels with two values are binary, integer labels with a handful of values are
    /// multiclass and anything else is regression.
    ///
    /// # Errors
    /// If the label has missing values or fewer than two distinct values.
    pub fn infer(label: &Column) -> Result<Self> {
        let unique = distinct(label)?;

        match label {
            Column::Categorical(_) => Ok(classes(unique.len())),
            Column::Numeric(values) => {
                let integral = values.iter().all(|v| v.fract() == 0.0);
                if unique.len() == 2 {
                    Ok(ProblemType::Binary)
                } else if integral
                    && unique.len() <= MAX_INTEGER_CLASSES
                    && unique.len() * 2 <= values.len()
                {
                    Ok(ProblemType::Multiclass)
                } else {
                    Ok(ProblemType::Regression)
                }
            }
        }
    }

    /// Uses `hint` when present, checking it's compatible with the label, and infers the
    /// problem type otherwise.
    pub fn resolve(hint: Option<ProblemType>, label: &Column) -> Result<Self> {
        let Some(hint) = hint else {
            return Self::infer(label);
        };

        let unique = distinct(label)?.len();
        match (hint, label) {
            (ProblemType::Regression, Column::Categorical(_)) => Err(MlErr::InvalidLabel(
                "a categorical label can't be used for regression".into(),
            )),
            (ProblemType::Binary, _) if unique != 2 => Err(MlErr::InvalidLabel(format!(
                "binary problems need exactly 2 classes, the label has {unique}"
            ))),
            _ => Ok(hint),
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProblemType::Binary => "binary",
            ProblemType::Multiclass => "multiclass",
            ProblemType::Regression => "regression",
        };
        write!(f, "{s}")
    }
}

fn classes(n: usize) -> ProblemType {
    if n == 2 {
        ProblemType::Binary
    } else {
        ProblemType::Multiclass
    }
}

fn distinct(label: &Column) -> Result<BTreeSet<String>> {
    let missing = match label {
        Column::Numeric(values) => values.iter().any(|v| !v.is_finite()),
        Column::Categorical(values) => values.iter().any(String::is_empty),
    };
    if missing {
        return Err(MlErr::InvalidLabel("the label has missing values".into()));
    }

    let unique: BTreeSet<String> = label.keys().into_iter().collect();
    if unique.len() < 2 {
        return Err(MlErr::InvalidLabel(format!(
            "the label needs at least 2 distinct values, got {}",
            unique.len()
        )));
    }

    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorical_labels_are_classification() {
        let label = Column::from(vec!["a", "b", "a"]);
        assert_eq!(ProblemType::infer(&label).unwrap(), ProblemType::Binary);

        let label = Column::from(vec!["a", "b", "c"]);
        assert_eq!(ProblemType::infer(&label).unwrap(), ProblemType::Multiclass);
    }

    #[test]
    fn small_integer_labels_are_multiclass() {
        let label = Column::from((0..30).map(|i| (i % 3) as f64).collect::<Vec<_>>());
        assert_eq!(ProblemType::infer(&label).unwrap(), ProblemType::Multiclass);
    }

    #[test]
    fn continuous_labels_are_regression() {
        let label = Column::from((0..30).map(|i| i as f64 * 0.5).collect::<Vec<_>>());
        assert_eq!(ProblemType::infer(&label).unwrap(), ProblemType::Regression);
    }

    #[test]
    fn constant_or_missing_labels_fail() {
        assert!(ProblemType::infer(&Column::from(vec![1.0, 1.0])).is_err());
        assert!(ProblemType::infer(&Column::from(vec![1.0, f64::NAN, 2.0])).is_err());
        assert!(ProblemType::infer(&Column::from(vec!["a", "", "b"])).is_err());
    }

    #[test]
    fn hints_are_validated() {
        let label = Column::from(vec!["a", "b", "c"]);
        assert!(ProblemType::resolve(Some(ProblemType::Regression), &label).is_err());
        assert!(ProblemType::resolve(Some(ProblemType::Binary), &label).is_err());

        let label = Column::from(vec![1.0, 2.0, 3.0, 1.0]);
        assert_eq!(
            ProblemType::resolve(Some(ProblemType::Regression), &label).unwrap(),
            ProblemType::Regression
        );
    }
}
