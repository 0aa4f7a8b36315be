use std::collections::BTreeMap;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::Table;
use crate::error::{MlErr, Result};

/// Splits `table` into a `(train, test)` pair of shuffled partitions.
///
/// The test partition gets `ceil(test_frac * rows)` rows, clamped so both sides are non
/// empty; a 142 row table with `test_frac = 0.2` yields 113 and 29 rows.
///
/// # Arguments
/// * `table` - The table to split.
/// * `test_frac` - The fraction of rows that go to the test partition, in `(0, 1)`.
/// * `seed` - The seed of the shuffling rng.
pub fn train_test_split(table: &Table, test_frac: f64, seed: u64) -> Result<(Table, Table)> {
    let n_test = test_rows(table.n_rows(), test_frac)?;

    let mut rows: Vec<usize> = (0..table.n_rows()).collect();
    rows.shuffle(&mut StdRng::seed_from_u64(seed));

    let (test, train) = rows.split_at(n_test);
    Ok((table.take(train), table.take(test)))
}

/// Like [`train_test_split`] but keeps the label distribution similar on both sides and
/// keeps at least one row of every class in the train partition.
///
/// # Arguments
/// * `table` - The table to split.
/// * `label` - The column to stratify on.
/// * `test_frac` - The fraction of rows that go to the test partition, in `(0, 1)`.
/// * `seed` - The seed of the shuffling rng.
pub fn stratified_split(
    table: &Table,
    label: &str,
    test_frac: f64,
    seed: u64,
) -> Result<(Table, Table)> {
    let n_test = test_rows(table.n_rows(), test_frac)?;
    let keys = table.require(label)?.keys();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        groups.entry(key.as_str()).or_default().push(row);
    }

    let mut groups: Vec<Vec<usize>> = groups.into_values().collect();
    groups.iter_mut().for_each(|rows| rows.shuffle(&mut rng));

    // Largest remainder apportionment of the test rows among the classes.
    let exact: Vec<f64> = groups
        .iter()
        .map(|rows| test_frac * rows.len() as f64)
        .collect();
    let mut quotas: Vec<usize> = exact.iter().map(|q| q.floor() as usize).collect();

    let mut by_remainder: Vec<usize> = (0..groups.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra)
    });

    let mut missing = n_test.saturating_sub(quotas.iter().sum());
    for &g in by_remainder.iter().cycle().take(groups.len() * 2) {
        if missing == 0 {
            break;
        }
        if quotas[g] + 1 < groups[g].len() {
            quotas[g] += 1;
            missing -= 1;
        }
    }

    let mut train = Vec::with_capacity(table.n_rows() - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (rows, quota) in groups.iter().zip(&quotas) {
        let quota = (*quota).min(rows.len().saturating_sub(1));
        test.extend_from_slice(&rows[..quota]);
        train.extend_from_slice(&rows[quota..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    if test.is_empty() {
        return Err(MlErr::NotEnoughRows {
            got: table.n_rows(),
            required: 2 * groups.len(),
        });
    }

    Ok((table.take(&train), table.take(&test)))
}

fn test_rows(rows: usize, test_frac: f64) -> Result<usize> {
    if !(test_frac > 0.0 && test_frac < 1.0) {
        return Err(MlErr::InvalidTable(format!(
            "the test fraction must be in (0, 1), got {test_frac}"
        )));
    }

    if rows < 2 {
        return Err(MlErr::NotEnoughRows {
            got: rows,
            required: 2,
        });
    }

    let n_test = (test_frac * rows as f64).ceil() as usize;
    Ok(n_test.clamp(1, rows - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn labelled(rows: usize, classes: usize) -> Table {
        let x: Vec<f64> = (0..rows).map(|i| i as f64).collect();
        let y: Vec<String> = (0..rows).map(|i| format!("c{}", i % classes)).collect();
        Table::new(vec![("x", Column::from(x)), ("y", Column::from(y))]).unwrap()
    }

    #[test]
    fn split_142_rows_80_20() {
        let (train, test) = train_test_split(&labelled(142, 3), 0.2, 0).unwrap();
        assert_eq!(train.n_rows(), 113);
        assert_eq!(test.n_rows(), 29);
    }

    #[test]
    fn split_is_a_partition() {
        let table = labelled(50, 2);
        let (train, test) = train_test_split(&table, 0.3, 7).unwrap();

        let Some(Column::Numeric(a)) = train.column("x") else { panic!() };
        let Some(Column::Numeric(b)) = test.column("x") else { panic!() };
        let mut all: Vec<f64> = a.iter().chain(b).copied().collect();
        all.sort_by(f64::total_cmp);
        assert_eq!(all, (0..50).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        let table = labelled(30, 3);
        assert_eq!(
            train_test_split(&table, 0.2, 1).unwrap(),
            train_test_split(&table, 0.2, 1).unwrap()
        );
    }

    #[test]
    fn invalid_fraction_and_tiny_tables_fail() {
        assert!(train_test_split(&labelled(10, 2), 0.0, 0).is_err());
        assert!(train_test_split(&labelled(10, 2), 1.0, 0).is_err());
        assert!(matches!(
            train_test_split(&labelled(1, 1), 0.5, 0),
            Err(MlErr::NotEnoughRows { .. })
        ));
    }

    #[test]
    fn stratified_split_keeps_every_class_in_train() {
        let table = labelled(40, 4);
        let (train, test) = stratified_split(&table, "y", 0.25, 3).unwrap();
        assert_eq!(train.n_rows() + test.n_rows(), 40);
        assert_eq!(test.n_rows(), 10);

        let mut classes = train.require("y").unwrap().keys();
        classes.sort();
        classes.dedup();
        assert_eq!(classes.len(), 4);
    }
}
