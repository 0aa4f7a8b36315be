use ndarray::{Array1, Array2, ArrayView1};

/// Turns `logits` into probabilities in place.
pub(super) fn softmax_in_place(logits: &mut [f32]) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.;
    for l in logits.iter_mut() {
        *l = (*l - max).exp();
        sum += *l;
    }
    for l in logits.iter_mut() {
        *l /= sum;
    }
}

/// `Σ w_i (a_i - b_i)²`.
pub(super) fn weighted_sq_dist(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>, w: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .zip(w)
        .map(|((a, b), w)| w * (a - b).powi(2))
        .sum()
}

pub(super) fn sq_dist(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b).map(|(a, b)| (a - b).powi(2)).sum()
}

/// Solves `a x = b` for a symmetric positive definite `a` through its Cholesky
/// factorization. `None` if `a` isn't positive definite.
pub(super) fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let d = a[[i, i]] - dot;
                if d <= 0. || !d.is_finite() {
                    return None;
                }
                l[[i, i]] = d.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - dot) / l[[j, j]];
            }
        }
    }

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let dot: f64 = (0..i).map(|k| l[[i, k]] * z[k]).sum();
        z[i] = (b[i] - dot) / l[[i, i]];
    }

    // Lᵀ x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let dot: f64 = (i + 1..n).map(|k| l[[k, i]] * x[k]).sum();
        x[i] = (z[i] - dot) / l[[i, i]];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn softmax_is_stable_and_normalized() {
        let mut logits = [1000.0, 1000.0, -1000.0];
        softmax_in_place(&mut logits);
        assert!((logits[0] - 0.5).abs() < 1e-6);
        assert_eq!(logits[2], 0.0);
    }

    #[test]
    fn solves_spd_systems() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = solve_spd(&a, &b).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    fn rejects_indefinite_matrices() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(solve_spd(&a, &array![1.0, 1.0]).is_none());
    }

    #[test]
    fn distances() {
        let a = array![1.0, 2.0];
        let b = array![0.0, 0.0];
        assert_eq!(sq_dist(a.view(), b.view()), 5.0);
        assert_eq!(weighted_sq_dist(a.view(), b.view(), &[2.0, 0.0]), 2.0);
    }
}
