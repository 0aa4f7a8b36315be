use ndarray::{Array2, ArrayView2, Axis};

use crate::{
    encoding::Target,
    error::{MlErr, Result},
};

/// The labelled rows an in-context learner attends to.
#[derive(Debug, Clone)]
pub struct Context {
    x: Array2<f32>,
    y: Target,
}

impl Context {
    /// # Errors
    /// `SizeMismatch` if `x` and `y` hold a different amount of rows.
    pub fn new(x: Array2<f32>, y: Target) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(MlErr::SizeMismatch {
                a: "features",
                b: "target",
                got: y.len(),
                expected: x.nrows(),
            });
        }

        Ok(Self { x, y })
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn y(&self) -> &Target {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> usize {
        self.x.ncols()
    }

    /// The context restricted to `rows`, in the given order.
    pub fn select(&self, rows: &[usize]) -> Context {
        Self {
            x: self.x.select(Axis(0), rows),
            y: self.y.select(rows),
        }
    }

    /// Splits off `queries`, returning them and the remaining rows.
    pub fn hold_out(&self, queries: &[usize]) -> (Context, Context) {
        let mut held = vec![false; self.len()];
        for &q in queries {
            held[q] = true;
        }
        let rest: Vec<usize> = (0..self.len()).filter(|&i| !held[i]).collect();

        (self.select(queries), self.select(&rest))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn hold_out_partitions_rows() {
        let ctx = Context::new(
            array![[0.0], [1.0], [2.0], [3.0]],
            Target::Classes {
                codes: vec![0, 1, 0, 1],
                n_classes: 2,
            },
        )
        .unwrap();

        let (queries, rest) = ctx.hold_out(&[3, 1]);
        assert_eq!(queries.x(), array![[3.0], [1.0]]);
        assert_eq!(rest.x(), array![[0.0], [2.0]]);
        assert_eq!(
            rest.y(),
            &Target::Classes {
                codes: vec![0, 0],
                n_classes: 2
            }
        );
    }

    #[test]
    fn rejects_mismatched_rows() {
        let err = Context::new(array![[0.0]], Target::Values(array![1.0, 2.0])).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { .. }));
    }
}
