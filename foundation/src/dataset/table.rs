use std::{collections::HashSet, path::Path};

use super::{Column, Field, Schema};
use crate::error::{MlErr, Result};

/// An immutable in-memory table of named, typed columns.
///
/// Every column holds the same amount of rows and names are unique. There is no
/// mutating API: row subsets and column projections produce new tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Creates a new `Table`.
    ///
    /// # Arguments
    /// * `columns` - The `(name, column)` pairs, in order.
    ///
    /// # Returns
    /// An error if there are no columns, names repeat or lengths differ.
    pub fn new<S: Into<String>>(columns: Vec<(S, Column)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(MlErr::InvalidTable(
                "a table needs at least one column".into(),
            ));
        }

        let (names, columns): (Vec<String>, Vec<Column>) = columns
            .into_iter()
            .map(|(name, column)| (name.into(), column))
            .unzip();

        let mut seen = HashSet::with_capacity(names.len());
        if let Some(dup) = names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(MlErr::InvalidTable(format!("duplicated column '{dup}'")));
        }

        let rows = columns[0].len();
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != rows {
                return Err(MlErr::InvalidTable(format!(
                    "column '{name}' has {} rows, expected {rows}",
                    column.len()
                )));
            }
        }

        Ok(Self {
            names,
            columns,
            rows,
        })
    }

    /// Reads a table from a CSV file with a header row, inferring column types.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        super::reader::read_csv(path.as_ref())
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    /// Like [`Table::column`] but fails with `MissingColumn`.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| MlErr::MissingColumn {
            name: name.to_string(),
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(&self.columns)
    }

    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns()
                .map(|(name, column)| Field::new(name, column.dtype()))
                .collect(),
        )
    }

    /// Returns a table with the given rows, in the given order.
    ///
    /// # Panics
    /// If any index is out of bounds.
    pub fn take(&self, rows: &[usize]) -> Table {
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            rows: rows.len(),
        }
    }

    /// Returns a table without the named column, or a copy if it isn't present.
    pub fn without(&self, name: &str) -> Table {
        let (names, columns) = self
            .columns()
            .filter(|(n, _)| *n != name)
            .map(|(n, c)| (n.to_string(), c.clone()))
            .unzip();

        Self {
            names,
            columns,
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DType;

    fn table() -> Table {
        Table::new(vec![
            ("x", Column::from(vec![1.0, 2.0, 3.0])),
            ("y", Column::from(vec!["a", "b", "a"])),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Table::new(vec![
            ("x", Column::from(vec![1.0, 2.0])),
            ("y", Column::from(vec!["a"])),
        ])
        .unwrap_err();
        assert!(matches!(err, MlErr::InvalidTable(_)));
    }

    #[test]
    fn rejects_duplicated_names() {
        let err = Table::new(vec![
            ("x", Column::from(vec![1.0])),
            ("x", Column::from(vec![2.0])),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicated column 'x'"));
    }

    #[test]
    fn take_and_without() {
        let t = table();
        let sub = t.take(&[2, 1]);
        assert_eq!(sub.n_rows(), 2);
        assert_eq!(sub.column("y"), Some(&Column::categorical(["a", "b"])));

        let dropped = t.without("y");
        assert_eq!(dropped.names(), &["x".to_string()]);
        assert_eq!(dropped.n_rows(), 3);
        assert_eq!(t.without("missing"), t);
    }

    #[test]
    fn schema_lists_fields_in_order() {
        let schema = table().schema();
        assert_eq!(schema.get("x").map(|f| f.dtype), Some(DType::Numeric));
        assert_eq!(schema.get("y").map(|f| f.dtype), Some(DType::Categorical));
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn require_reports_missing_column() {
        assert!(matches!(
            table().require("z"),
            Err(MlErr::MissingColumn { name }) if name == "z"
        ));
    }
}
