use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::{
    BackendKind, Context, Learner, Output,
    linalg::{softmax_in_place, weighted_sq_dist},
};
use crate::encoding::Target;

/// The share of probability mass spread uniformly over the classes.
const SMOOTHING: f32 = 0.01;

/// Row attention: every query attends to the context rows through a softmax over
/// their negative scaled squared distances.
///
/// Parameters: `log_scales` (one per feature) and `log_temperature`. The temperature
/// is relative to the feature width.
#[derive(Debug, Clone)]
pub struct Mitra {
    log_temperature: f32,
}

impl Mitra {
    pub fn new(temperature: f32) -> Self {
        Self {
            log_temperature: temperature.ln(),
        }
    }
}

impl Default for Mitra {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl Learner for Mitra {
    fn kind(&self) -> BackendKind {
        BackendKind::Mitra
    }

    fn init(&mut self, width: usize, _n_classes: Option<usize>) -> Vec<(&'static str, Vec<f32>)> {
        vec![
            ("log_scales", vec![0.; width]),
            ("log_temperature", vec![self.log_temperature]),
        ]
    }

    fn forward(&self, params: &[f32], context: &Context, queries: ArrayView2<'_, f32>) -> Output {
        let width = queries.ncols();
        let (log_scales, log_temperature) = params.split_at(width);
        let weights: Vec<f32> = log_scales.iter().map(|s| (2. * s).exp()).collect();
        let temperature = log_temperature[0].exp() * width.max(1) as f32;

        let cx = context.x();
        let attention = |q: ArrayView1<'_, f32>| {
            let mut logits: Vec<f32> = cx
                .rows()
                .into_iter()
                .map(|row| -weighted_sq_dist(q, row, &weights) / temperature)
                .collect();
            softmax_in_place(&mut logits);
            logits
        };

        match context.y() {
            Target::Classes { codes, n_classes } => {
                let k = *n_classes;
                let mut proba = Array2::from_elem((queries.nrows(), k), SMOOTHING / k as f32);
                for (q, mut out) in queries.rows().into_iter().zip(proba.rows_mut()) {
                    for (a, &c) in attention(q).iter().zip(codes) {
                        out[c] += (1. - SMOOTHING) * a;
                    }
                }
                Output::Proba(proba)
            }
            Target::Values(values) => Output::Values(
                queries
                    .rows()
                    .into_iter()
                    .map(|q| attention(q).iter().zip(values).map(|(a, v)| a * v).sum::<f32>())
                    .collect::<Array1<f32>>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn context(y: Target) -> Context {
        Context::new(array![[-1.0, 0.0], [1.0, 0.0], [1.1, 0.0]], y).unwrap()
    }

    #[test]
    fn attends_to_the_nearest_rows() {
        let mut mitra = Mitra::default();
        let params: Vec<f32> = mitra.init(2, Some(2)).into_iter().flat_map(|(_, v)| v).collect();
        let ctx = context(Target::Classes {
            codes: vec![0, 1, 1],
            n_classes: 2,
        });

        let Output::Proba(proba) = mitra.forward(&params, &ctx, array![[-0.9, 0.0], [1.0, 0.1]].view())
        else {
            panic!("expected probabilities");
        };

        assert!(proba[[0, 0]] > 0.9);
        assert!(proba[[1, 1]] > 0.9);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn regression_is_a_weighted_mean() {
        let mut mitra = Mitra::default();
        let params: Vec<f32> = mitra.init(2, None).into_iter().flat_map(|(_, v)| v).collect();
        let ctx = context(Target::Values(array![-1.0, 1.0, 1.0]));

        let Output::Values(values) = mitra.forward(&params, &ctx, array![[1.05, 0.0]].view()) else {
            panic!("expected values");
        };
        assert!((values[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn zero_queries_give_an_empty_output() {
        let mut mitra = Mitra::default();
        let params: Vec<f32> = mitra.init(2, Some(2)).into_iter().flat_map(|(_, v)| v).collect();
        let ctx = context(Target::Classes {
            codes: vec![0, 1, 1],
            n_classes: 2,
        });
        let out = mitra.forward(&params, &ctx, Array2::zeros((0, 2)).view());
        assert!(out.is_empty());
    }
}
