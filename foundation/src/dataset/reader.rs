use std::path::Path;

use log::debug;

use super::{Column, Table};
use crate::error::{MlErr, Result};

/// Reads a headed CSV file into a [`Table`].
///
/// A column is numeric when every non-empty field parses as `f64` (empty fields become
/// `NaN`), otherwise it's categorical.
pub(super) fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    if headers.is_empty() {
        return Err(MlErr::InvalidTable(format!(
            "'{}' has no header row",
            path.display()
        )));
    }

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (values, field) in raw.iter_mut().zip(record.iter()) {
            values.push(field.trim().to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, values)| (name, infer_column(values)))
        .collect::<Vec<_>>();

    let table = Table::new(columns)?;
    debug!(
        "read {} rows and {} columns from {}",
        table.n_rows(),
        table.n_cols(),
        path.display()
    );

    Ok(table)
}

fn infer_column(values: Vec<String>) -> Column {
    let mut any = false;
    let parsed: Option<Vec<f64>> = values
        .iter()
        .map(|v| {
            if v.is_empty() {
                Some(f64::NAN)
            } else {
                any = true;
                v.parse::<f64>().ok()
            }
        })
        .collect();

    match parsed {
        Some(numbers) if any => Column::Numeric(numbers),
        _ => Column::Categorical(values),
    }
}
