use std::fmt;

use serde::{Deserialize, Serialize};

/// The logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Numeric,
    Categorical,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Numeric => write!(f, "numeric"),
            DType::Categorical => write!(f, "categorical"),
        }
    }
}

/// A single typed column. Missing numeric values are stored as `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    /// Builds a categorical column from anything string-like.
    pub fn categorical<S, I>(values: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        Self::Categorical(values.into_iter().map(Into::into).collect())
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Categorical(values) => values.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        match self {
            Column::Numeric(_) => DType::Numeric,
            Column::Categorical(_) => DType::Categorical,
        }
    }

    /// Returns a new column holding the given rows, in the given order.
    ///
    /// # Panics
    /// If any index is out of bounds.
    pub fn take(&self, rows: &[usize]) -> Self {
        match self {
            Column::Numeric(values) => Column::Numeric(rows.iter().map(|&i| values[i]).collect()),
            Column::Categorical(values) => {
                Column::Categorical(rows.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }

    /// A stable string key per row, used to group rows by value.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Column::Numeric(values) => values.iter().map(|v| format_number(*v)).collect(),
            Column::Categorical(values) => values.clone(),
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(value: Vec<f64>) -> Self {
        Self::Numeric(value)
    }
}

impl From<Vec<String>> for Column {
    fn from(value: Vec<String>) -> Self {
        Self::Categorical(value)
    }
}

impl From<Vec<&str>> for Column {
    fn from(value: Vec<&str>) -> Self {
        Self::categorical(value)
    }
}

/// Formats integral values without a trailing `.0` so numeric class labels read naturally.
pub(crate) fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_preserves_requested_order() {
        let col = Column::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(col.take(&[2, 0]), Column::Numeric(vec![3.0, 1.0]));

        let col = Column::from(vec!["a", "b", "c"]);
        assert_eq!(col.take(&[1, 1]), Column::categorical(["b", "b"]));
    }

    #[test]
    fn numeric_keys_drop_integral_fraction() {
        let col = Column::from(vec![1.0, 2.5]);
        assert_eq!(col.keys(), vec!["1".to_string(), "2.5".to_string()]);
        assert_eq!(col.dtype(), DType::Numeric);
    }
}
