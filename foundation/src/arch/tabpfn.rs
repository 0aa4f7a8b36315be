use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::{
    BackendKind, Context, Learner, Output,
    linalg::{softmax_in_place, solve_spd},
};
use crate::encoding::Target;

const PRIOR_SHRINKAGE: f32 = 1.0;
const PRIOR_VARIANCE_FLOOR: f32 = 0.1;
const PRIOR_TEMPERATURE: f32 = 1.0;
const PRIOR_PRECISION: f32 = 1.0;

/// Prior-fitted Bayesian rules.
///
/// Classification is a Gaussian class-conditional model with class means shrunk
/// towards the origin, a pooled diagonal variance with a floor and Laplace smoothed
/// class priors. Regression is ridge regression, the posterior mean under a Gaussian
/// prior with precision `alpha`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabPfnV2;

impl Learner for TabPfnV2 {
    fn kind(&self) -> BackendKind {
        BackendKind::TabPfnV2
    }

    fn init(&mut self, _width: usize, n_classes: Option<usize>) -> Vec<(&'static str, Vec<f32>)> {
        match n_classes {
            Some(_) => vec![
                ("log_shrinkage", vec![PRIOR_SHRINKAGE.ln()]),
                ("log_variance_floor", vec![PRIOR_VARIANCE_FLOOR.ln()]),
                ("log_temperature", vec![PRIOR_TEMPERATURE.ln()]),
            ],
            None => vec![("log_alpha", vec![PRIOR_PRECISION.ln()])],
        }
    }

    fn forward(&self, params: &[f32], context: &Context, queries: ArrayView2<'_, f32>) -> Output {
        match context.y() {
            Target::Classes { codes, n_classes } => {
                Output::Proba(classify(params, context.x(), codes, *n_classes, queries))
            }
            Target::Values(values) => Output::Values(regress(params[0], context.x(), values, queries)),
        }
    }
}

fn classify(
    params: &[f32],
    cx: ArrayView2<'_, f32>,
    codes: &[usize],
    k: usize,
    queries: ArrayView2<'_, f32>,
) -> Array2<f32> {
    let shrinkage = params[0].exp();
    let floor = params[1].exp();
    let temperature = params[2].exp();
    let (n, width) = cx.dim();

    let mut counts = vec![0usize; k];
    let mut means = Array2::<f32>::zeros((k, width));
    for (row, &c) in cx.rows().into_iter().zip(codes) {
        counts[c] += 1;
        let mut mean = means.row_mut(c);
        mean += &row;
    }
    for (mut mean, &count) in means.rows_mut().into_iter().zip(&counts) {
        mean /= count as f32 + shrinkage;
    }

    let mut var = Array1::<f32>::zeros(width);
    for (row, &c) in cx.rows().into_iter().zip(codes) {
        var += &(&row - &means.row(c)).mapv(|d| d * d);
    }
    var.mapv_inplace(|v| v / n.max(1) as f32 + floor);

    let log_prior: Vec<f32> = counts
        .iter()
        .map(|&count| ((count as f32 + 1.) / (n + k) as f32).ln())
        .collect();

    let mut proba = Array2::zeros((queries.nrows(), k));
    for (q, mut out) in queries.rows().into_iter().zip(proba.rows_mut()) {
        let mut logits: Vec<f32> = (0..k)
            .map(|c| {
                let d: f32 = q
                    .iter()
                    .zip(means.row(c))
                    .zip(&var)
                    .map(|((q, m), v)| (q - m).powi(2) / v)
                    .sum();
                (log_prior[c] - 0.5 * d) / temperature
            })
            .collect();
        softmax_in_place(&mut logits);

        for (o, l) in out.iter_mut().zip(&logits) {
            *o = *l;
        }
    }

    proba
}

fn regress(
    log_alpha: f32,
    cx: ArrayView2<'_, f32>,
    values: &Array1<f32>,
    queries: ArrayView2<'_, f32>,
) -> Array1<f32> {
    let alpha = f64::from(log_alpha.exp());
    let width = cx.ncols();

    let x = cx.mapv(f64::from);
    let y = values.mapv(f64::from);
    let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(width));
    let y_mean = y.mean().unwrap_or(0.);

    let xc = &x - &x_mean;
    let yc = &y - y_mean;

    let mut gram = xc.t().dot(&xc);
    for i in 0..width {
        gram[[i, i]] += alpha;
    }
    let coef = solve_spd(&gram, &xc.t().dot(&yc)).unwrap_or_else(|| Array1::zeros(width));

    queries
        .rows()
        .into_iter()
        .map(|q| {
            let dot: f64 = q
                .iter()
                .zip(&x_mean)
                .zip(&coef)
                .map(|((q, m), c)| (f64::from(*q) - m) * c)
                .sum();
            (y_mean + dot) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    fn params(n_classes: Option<usize>) -> Vec<f32> {
        TabPfnV2
            .init(1, n_classes)
            .into_iter()
            .flat_map(|(_, v)| v)
            .collect()
    }

    #[test]
    fn separates_gaussian_classes() {
        let ctx = Context::new(
            array![[-2.0], [-2.2], [-1.8], [2.0], [2.1], [1.9]],
            Target::Classes {
                codes: vec![0, 0, 0, 1, 1, 1],
                n_classes: 2,
            },
        )
        .unwrap();

        let Output::Proba(proba) =
            TabPfnV2.forward(&params(Some(2)), &ctx, array![[-2.0], [2.0], [0.0]].view())
        else {
            panic!("expected probabilities");
        };

        assert!(proba[[0, 0]] > 0.95);
        assert!(proba[[1, 1]] > 0.95);
        assert!((proba[[2, 0]] - 0.5).abs() < 0.1);
    }

    #[test]
    fn unseen_classes_keep_some_mass() {
        let ctx = Context::new(
            array![[0.0], [0.1]],
            Target::Classes {
                codes: vec![0, 0],
                n_classes: 3,
            },
        )
        .unwrap();
        let Output::Proba(proba) = TabPfnV2.forward(&params(Some(3)), &ctx, array![[0.0]].view())
        else {
            panic!("expected probabilities");
        };
        assert!(proba[[0, 0]] > proba[[0, 1]]);
        assert!(proba[[0, 1]] > 0.0);
        assert!((proba.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ridge_recovers_a_line() {
        let x = Array2::from_shape_fn((50, 1), |(i, _)| i as f32 / 10. - 2.5);
        let y = x.column(0).mapv(|v| 2. * v + 0.5);
        let ctx = Context::new(x, Target::Values(y)).unwrap();

        let Output::Values(pred) = TabPfnV2.forward(&params(None), &ctx, array![[1.0]].view())
        else {
            panic!("expected values");
        };
        // The prior pulls the slope slightly towards zero.
        assert!((pred[0] - 2.5).abs() < 0.1, "{pred}");
    }
}
