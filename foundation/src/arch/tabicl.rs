use ndarray::{Array1, Array2, ArrayView2};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

use super::{
    Artifact, BackendKind, Context, Learner, Output,
    linalg::{softmax_in_place, sq_dist},
};
use crate::{encoding::Target, error::Result};

/// Column embedding followed by in-context attention in embedding space.
///
/// Rows are embedded through a seeded Gaussian random projection and `tanh`, scaled by
/// per-dimension gates. Classes are predicted by attending to class prototypes,
/// values by kernel regression over the context embeddings.
#[derive(Debug, Clone)]
pub struct TabIcl {
    embed_dim: usize,
    seed: u64,
    projection: Array2<f32>,
}

impl TabIcl {
    pub fn new(embed_dim: usize, seed: u64) -> Self {
        Self {
            embed_dim: embed_dim.max(1),
            seed,
            projection: Array2::zeros((0, embed_dim.max(1))),
        }
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    fn embed(&self, x: ArrayView2<'_, f32>, log_gates: &[f32]) -> Array2<f32> {
        let gates: Array1<f32> = log_gates.iter().map(|g| g.exp()).collect();
        let mut e = x.dot(&self.projection).mapv(f32::tanh);
        e *= &gates;
        e
    }
}

impl Default for TabIcl {
    fn default() -> Self {
        Self::new(16, 0)
    }
}

impl Learner for TabIcl {
    fn kind(&self) -> BackendKind {
        BackendKind::TabIcl
    }

    fn init(&mut self, width: usize, n_classes: Option<usize>) -> Vec<(&'static str, Vec<f32>)> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let scale = 1. / (width.max(1) as f32).sqrt();
        self.projection = Array2::from_shape_simple_fn((width, self.embed_dim), || {
            rng.sample::<f32, _>(StandardNormal) * scale
        });

        let head = match n_classes {
            Some(_) => ("log_temperature", vec![0.]),
            None => ("log_bandwidth", vec![0.5f32.ln()]),
        };
        vec![("log_gates", vec![0.; self.embed_dim]), head]
    }

    fn forward(&self, params: &[f32], context: &Context, queries: ArrayView2<'_, f32>) -> Output {
        let (log_gates, head) = params.split_at(self.embed_dim);
        let scale = head[0].exp();
        let ctx = self.embed(context.x(), log_gates);
        let q = self.embed(queries, log_gates);

        match context.y() {
            Target::Classes { codes, n_classes } => {
                let k = *n_classes;
                let mut counts = vec![0usize; k];
                let mut prototypes = Array2::<f32>::zeros((k, self.embed_dim));
                for (row, &c) in ctx.rows().into_iter().zip(codes) {
                    counts[c] += 1;
                    let mut p = prototypes.row_mut(c);
                    p += &row;
                }
                for (mut p, &count) in prototypes.rows_mut().into_iter().zip(&counts) {
                    p /= count.max(1) as f32;
                }

                let n = codes.len();
                let log_prior: Vec<f32> = counts
                    .iter()
                    .map(|&count| ((count as f32 + 1.) / (n + k) as f32).ln())
                    .collect();

                let mut proba = Array2::zeros((q.nrows(), k));
                for (row, mut out) in q.rows().into_iter().zip(proba.rows_mut()) {
                    let mut logits: Vec<f32> = prototypes
                        .rows()
                        .into_iter()
                        .zip(&log_prior)
                        .map(|(p, prior)| -sq_dist(row, p) / scale + prior)
                        .collect();
                    softmax_in_place(&mut logits);

                    for (o, l) in out.iter_mut().zip(&logits) {
                        *o = *l;
                    }
                }
                Output::Proba(proba)
            }
            Target::Values(values) => Output::Values(
                q.rows()
                    .into_iter()
                    .map(|row| {
                        let mut weights: Vec<f32> = ctx
                            .rows()
                            .into_iter()
                            .map(|c| -sq_dist(row, c) / scale)
                            .collect();
                        softmax_in_place(&mut weights);
                        weights.iter().zip(values).map(|(w, v)| w * v).sum::<f32>()
                    })
                    .collect::<Array1<f32>>(),
            ),
        }
    }

    fn frozen(&self) -> Vec<(&'static str, Vec<f32>)> {
        vec![("projection", self.projection.iter().copied().collect())]
    }

    fn restore(&mut self, artifact: &Artifact) -> Result<()> {
        let (width, dim) = self.projection.dim();
        if let Some(values) = artifact.get_sized("projection", width * dim)? {
            self.projection = Array2::from_shape_fn((width, dim), |(i, j)| values[i * dim + j]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn init(icl: &mut TabIcl, width: usize, n_classes: Option<usize>) -> Vec<f32> {
        icl.init(width, n_classes)
            .into_iter()
            .flat_map(|(_, v)| v)
            .collect()
    }

    #[test]
    fn projection_is_seeded() {
        let mut a = TabIcl::new(4, 3);
        let mut b = TabIcl::new(4, 3);
        init(&mut a, 2, Some(2));
        init(&mut b, 2, Some(2));
        assert_eq!(a.frozen(), b.frozen());
        assert_eq!(a.frozen()[0].1.len(), 8);
    }

    #[test]
    fn prototypes_separate_clusters() {
        let mut icl = TabIcl::default();
        let params = init(&mut icl, 2, Some(2));
        let ctx = Context::new(
            array![[-2.0, -2.0], [-2.1, -1.9], [2.0, 2.0], [1.9, 2.1]],
            Target::Classes {
                codes: vec![0, 0, 1, 1],
                n_classes: 2,
            },
        )
        .unwrap();

        let Output::Proba(proba) = icl.forward(&params, &ctx, array![[-2.0, -2.1], [2.1, 2.0]].view())
        else {
            panic!("expected probabilities");
        };
        assert!(proba[[0, 0]] > proba[[0, 1]]);
        assert!(proba[[1, 1]] > proba[[1, 0]]);
    }

    #[test]
    fn restores_projection_from_artifacts() {
        let mut icl = TabIcl::new(2, 0);
        init(&mut icl, 1, None);

        let mut artifact = Artifact::new();
        artifact.insert("projection", vec![1.0, -1.0]);
        icl.restore(&artifact).unwrap();
        assert_eq!(icl.frozen()[0].1, vec![1.0, -1.0]);

        artifact.insert("projection", vec![1.0]);
        assert!(icl.restore(&artifact).is_err());
    }
}
