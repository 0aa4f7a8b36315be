use std::collections::BTreeSet;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{Column, DType, Field, Schema, Table},
    error::{MlErr, Result},
    problem::ProblemType,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FeatureKind {
    Numeric { mean: f64, std: f64 },
    Categorical { levels: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FeatureSpec {
    name: String,
    kind: FeatureKind,
}

impl FeatureSpec {
    fn width(&self) -> usize {
        match &self.kind {
            FeatureKind::Numeric { .. } => 1,
            FeatureKind::Categorical { levels } => levels.len(),
        }
    }

    fn dtype(&self) -> DType {
        match self.kind {
            FeatureKind::Numeric { .. } => DType::Numeric,
            FeatureKind::Categorical { .. } => DType::Categorical,
        }
    }
}

/// Turns the feature columns of a table into a dense `f32` matrix.
///
/// Numeric columns are standardized with the statistics seen at fit time (missing values
/// land on the mean), categorical columns are one-hot encoded over the levels seen at fit
/// time (unknown levels encode as all zeros).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    specs: Vec<FeatureSpec>,
    width: usize,
}

impl FeatureEncoder {
    /// Learns the encoding of every column of `table` except `label`.
    ///
    /// # Errors
    /// If there are no feature columns.
    pub fn fit(table: &Table, label: &str) -> Result<Self> {
        let specs: Vec<FeatureSpec> = table
            .columns()
            .filter(|(name, _)| *name != label)
            .map(|(name, column)| FeatureSpec {
                name: name.to_string(),
                kind: learn(column),
            })
            .collect();

        if specs.is_empty() {
            return Err(MlErr::InvalidTable(format!(
                "there are no feature columns besides the label '{label}'"
            )));
        }

        let width = specs.iter().map(FeatureSpec::width).sum();
        Ok(Self { specs, width })
    }

    /// The amount of encoded columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The schema of the feature columns this encoder expects.
    pub fn schema(&self) -> Schema {
        Schema::new(
            self.specs
                .iter()
                .map(|spec| Field::new(spec.name.clone(), spec.dtype()))
                .collect(),
        )
    }

    /// Encodes `table` into a `(rows, width)` matrix.
    ///
    /// # Errors
    /// `SchemaMismatch` if a feature column is missing or changed type.
    pub fn transform(&self, table: &Table) -> Result<Array2<f32>> {
        self.schema().check_subset_of(&table.schema())?;

        let mut out = Array2::<f32>::zeros((table.n_rows(), self.width));
        let mut offset = 0;

        for spec in &self.specs {
            let column = table.require(&spec.name)?;
            match (&spec.kind, column) {
                (FeatureKind::Numeric { mean, std }, Column::Numeric(values)) => {
                    for (row, v) in values.iter().enumerate() {
                        if v.is_finite() {
                            out[[row, offset]] = ((v - mean) / std) as f32;
                        }
                    }
                }
                (FeatureKind::Categorical { levels }, Column::Categorical(values)) => {
                    for (row, v) in values.iter().enumerate() {
                        if let Ok(level) = levels.binary_search(v) {
                            out[[row, offset + level]] = 1.0;
                        }
                    }
                }
                _ => unreachable!("column types were checked against the schema"),
            }
            offset += spec.width();
        }

        Ok(out)
    }
}

fn learn(column: &Column) -> FeatureKind {
    match column {
        Column::Numeric(values) => {
            let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                return FeatureKind::Numeric {
                    mean: 0.0,
                    std: 1.0,
                };
            }

            let n = finite.len() as f64;
            let mean = finite.iter().sum::<f64>() / n;
            let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };

            FeatureKind::Numeric { mean, std }
        }
        Column::Categorical(values) => {
            let levels: BTreeSet<&String> = values.iter().filter(|v| !v.is_empty()).collect();
            FeatureKind::Categorical {
                levels: levels.into_iter().cloned().collect(),
            }
        }
    }
}

/// The training target in the space the backends work in.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Class codes in `0..n_classes`.
    Classes { codes: Vec<usize>, n_classes: usize },
    /// Standardized regression values.
    Values(Array1<f32>),
}

impl Target {
    pub fn len(&self) -> usize {
        match self {
            Target::Classes { codes, .. } => codes.len(),
            Target::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` for regression targets.
    pub fn n_classes(&self) -> Option<usize> {
        match self {
            Target::Classes { n_classes, .. } => Some(*n_classes),
            Target::Values(_) => None,
        }
    }

    /// The target restricted to `rows`, in the given order.
    pub fn select(&self, rows: &[usize]) -> Target {
        match self {
            Target::Classes { codes, n_classes } => Target::Classes {
                codes: rows.iter().map(|&i| codes[i]).collect(),
                n_classes: *n_classes,
            },
            Target::Values(values) => Target::Values(rows.iter().map(|&i| values[i]).collect()),
        }
    }
}

/// Maps label values to [`Target`] and back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetEncoder {
    Classes { classes: Vec<String> },
    Values { mean: f64, std: f64 },
}

impl TargetEncoder {
    /// Learns the label encoding for `problem`.
    pub fn fit(label: &Column, problem: ProblemType) -> Result<Self> {
        if problem.is_classification() {
            let classes: BTreeSet<String> = label.keys().into_iter().collect();
            return Ok(Self::Classes {
                classes: classes.into_iter().collect(),
            });
        }

        let Column::Numeric(values) = label else {
            return Err(MlErr::InvalidLabel(
                "a regression label must be numeric".into(),
            ));
        };
        if values.is_empty() {
            return Err(MlErr::NotEnoughRows {
                got: 0,
                required: 1,
            });
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        let std = if std > 1e-12 { std } else { 1.0 };

        Ok(Self::Values { mean, std })
    }

    pub fn classes(&self) -> Option<&[String]> {
        match self {
            Self::Classes { classes } => Some(classes),
            Self::Values { .. } => None,
        }
    }

    /// Encodes a label column seen at fit time.
    ///
    /// # Errors
    /// If the column holds a class the encoder doesn't know about or has the wrong type.
    pub fn encode(&self, label: &Column) -> Result<Target> {
        match self {
            Self::Classes { classes } => {
                let codes = self
                    .encode_lenient(label)
                    .into_iter()
                    .zip(label.keys())
                    .map(|(code, key)| {
                        code.ok_or_else(|| MlErr::InvalidLabel(format!("unknown class '{key}'")))
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(Target::Classes {
                    codes,
                    n_classes: classes.len(),
                })
            }
            Self::Values { mean, std } => match label {
                Column::Numeric(values) => Ok(Target::Values(
                    values.iter().map(|v| ((v - mean) / std) as f32).collect(),
                )),
                Column::Categorical(_) => Err(MlErr::InvalidLabel(
                    "a regression label must be numeric".into(),
                )),
            },
        }
    }

    /// Encodes class labels mapping unseen classes to `None`. Regression encoders yield
    /// `None` for every row.
    pub fn encode_lenient(&self, label: &Column) -> Vec<Option<usize>> {
        match self {
            Self::Classes { classes } => label
                .keys()
                .iter()
                .map(|key| classes.binary_search(key).ok())
                .collect(),
            Self::Values { .. } => vec![None; label.len()],
        }
    }

    /// Maps a class code back to the class name.
    pub fn decode_class(&self, code: usize) -> Option<&str> {
        self.classes()
            .and_then(|classes| classes.get(code))
            .map(String::as_str)
    }

    /// Maps a standardized value back to the label's units.
    pub fn decode_value(&self, value: f32) -> f64 {
        match self {
            Self::Values { mean, std } => value as f64 * std + mean,
            Self::Classes { .. } => value as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(vec![
            ("size", Column::from(vec![1.0, 2.0, 3.0, f64::NAN])),
            ("color", Column::from(vec!["red", "blue", "red", "green"])),
            ("label", Column::from(vec!["a", "b", "a", "b"])),
        ])
        .unwrap()
    }

    #[test]
    fn encodes_numeric_and_one_hot_columns() {
        let table = table();
        let enc = FeatureEncoder::fit(&table, "label").unwrap();
        assert_eq!(enc.width(), 4);

        let x = enc.transform(&table).unwrap();
        assert_eq!(x.dim(), (4, 4));
        // Missing values sit on the mean.
        assert_eq!(x[[3, 0]], 0.0);
        assert!(x[[0, 0]] < 0.0 && x[[2, 0]] > 0.0);
        // Levels are sorted: blue, green, red.
        assert_eq!(x.row(1).to_vec()[1..], [1.0, 0.0, 0.0]);
        assert_eq!(x.row(0).to_vec()[1..], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn transform_ignores_label_and_rejects_retyped_columns() {
        let table = table();
        let enc = FeatureEncoder::fit(&table, "label").unwrap();
        assert!(enc.transform(&table.without("label")).is_ok());

        let retyped = Table::new(vec![
            ("size", Column::from(vec!["1"])),
            ("color", Column::from(vec!["red"])),
        ])
        .unwrap();
        assert!(matches!(
            enc.transform(&retyped),
            Err(MlErr::SchemaMismatch { column, .. }) if column == "size"
        ));
    }

    #[test]
    fn unknown_levels_encode_as_zeros() {
        let enc = FeatureEncoder::fit(&table(), "label").unwrap();
        let unseen = Table::new(vec![
            ("size", Column::from(vec![2.0])),
            ("color", Column::from(vec!["purple"])),
        ])
        .unwrap();
        let x = enc.transform(&unseen).unwrap();
        assert_eq!(x.row(0).iter().skip(1).sum::<f32>(), 0.0);
    }

    #[test]
    fn label_only_tables_have_no_features() {
        let table = Table::new(vec![("label", Column::from(vec!["a", "b"]))]).unwrap();
        assert!(FeatureEncoder::fit(&table, "label").is_err());
    }

    #[test]
    fn class_targets_round_trip() {
        let label = Column::from(vec!["b", "a", "c", "a"]);
        let enc = TargetEncoder::fit(&label, ProblemType::Multiclass).unwrap();
        assert_eq!(
            enc.encode(&label).unwrap(),
            Target::Classes {
                codes: vec![1, 0, 2, 0],
                n_classes: 3
            }
        );
        assert_eq!(enc.decode_class(2), Some("c"));
        assert!(enc.encode(&Column::from(vec!["d"])).is_err());
        assert_eq!(enc.encode_lenient(&Column::from(vec!["d", "a"])), vec![None, Some(0)]);
    }

    #[test]
    fn value_targets_are_standardized() {
        let label = Column::from(vec![1.0, 3.0]);
        let enc = TargetEncoder::fit(&label, ProblemType::Regression).unwrap();
        let Target::Values(values) = enc.encode(&label).unwrap() else {
            panic!("expected values");
        };
        assert_eq!(values.to_vec(), vec![-1.0, 1.0]);
        assert!((enc.decode_value(1.0) - 3.0).abs() < 1e-9);
    }
}
