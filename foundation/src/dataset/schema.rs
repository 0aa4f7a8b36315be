use serde::{Deserialize, Serialize};

use super::DType;
use crate::error::{MlErr, Result};

/// A named, typed column slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: DType,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// The ordered list of fields of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn without(&self, name: &str) -> Schema {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|f| f.name != name)
                .cloned()
                .collect(),
        }
    }

    /// Checks that `label` exists in both schemas with the same type.
    ///
    /// # Arguments
    /// * `other` - The schema of the other partition.
    /// * `label` - The label column's name.
    pub fn check_label_consistency(&self, other: &Schema, label: &str) -> Result<()> {
        let missing = || MlErr::MissingColumn {
            name: label.to_string(),
        };
        let ours = self.get(label).ok_or_else(missing)?;
        let theirs = other.get(label).ok_or_else(missing)?;

        if ours.dtype != theirs.dtype {
            return Err(MlErr::SchemaMismatch {
                column: label.to_string(),
                reason: format!("label is {} in one partition and {} in the other", ours.dtype, theirs.dtype),
            });
        }

        Ok(())
    }

    /// Checks that every field of this schema is present in `table` with the same type.
    /// Extra fields in `table` are allowed.
    pub fn check_subset_of(&self, table: &Schema) -> Result<()> {
        for field in &self.fields {
            match table.get(&field.name) {
                None => {
                    return Err(MlErr::SchemaMismatch {
                        column: field.name.clone(),
                        reason: "column seen during fit is missing".into(),
                    });
                }
                Some(other) if other.dtype != field.dtype => {
                    return Err(MlErr::SchemaMismatch {
                        column: field.name.clone(),
                        reason: format!("expected {}, got {}", field.dtype, other.dtype),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: &[(&str, DType)]) -> Schema {
        Schema::new(fields.iter().map(|(n, t)| Field::new(*n, *t)).collect())
    }

    #[test]
    fn label_must_exist_on_both_sides() {
        let train = schema(&[("x", DType::Numeric), ("y", DType::Categorical)]);
        let test = schema(&[("x", DType::Numeric)]);
        assert!(matches!(
            train.check_label_consistency(&test, "y"),
            Err(MlErr::MissingColumn { .. })
        ));
    }

    #[test]
    fn label_types_must_agree() {
        let train = schema(&[("y", DType::Categorical)]);
        let test = schema(&[("y", DType::Numeric)]);
        assert!(matches!(
            train.check_label_consistency(&test, "y"),
            Err(MlErr::SchemaMismatch { .. })
        ));
        assert!(train.check_label_consistency(&train, "y").is_ok());
    }

    #[test]
    fn subset_check_allows_extra_columns() {
        let features = schema(&[("x", DType::Numeric)]);
        let wide = schema(&[("x", DType::Numeric), ("label", DType::Categorical)]);
        assert!(features.check_subset_of(&wide).is_ok());

        let retyped = schema(&[("x", DType::Categorical)]);
        assert!(features.check_subset_of(&retyped).is_err());
        assert!(features.check_subset_of(&Schema::default()).is_err());
    }
}
