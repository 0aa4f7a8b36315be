use super::{Optimizer, optimizer::check_sizes};
use crate::error::Result;

/// Adam with bias-corrected moment estimates, used when fine-tuning backend heads.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    betas: (f32, f32),
    epsilon: f32,
    /// Updates applied so far.
    steps: i32,
    /// First and second moment estimates, one per parameter.
    m: Box<[f32]>,
    v: Box<[f32]>,
}

impl Adam {
    /// Returns a new `Adam` with `betas = (0.9, 0.999)` and `epsilon = 1e-8`.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters updated on every step.
    /// * `learning_rate` - The *length* of the first step, later ones shrink as the
    ///   gradients settle.
    pub fn new(len: usize, learning_rate: f32) -> Self {
        Self {
            learning_rate,
            betas: (0.9, 0.999),
            epsilon: 1e-8,
            steps: 0,
            m: vec![0.; len].into_boxed_slice(),
            v: vec![0.; len].into_boxed_slice(),
        }
    }

    /// Sets the decay rates of the first and second moments.
    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.betas = (beta1, beta2);
        self
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn steps(&self) -> i32 {
        self.steps
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        check_sizes(&self.m, params)?;

        self.steps = self.steps.saturating_add(1);
        let (b1, b2) = self.betas;
        let eps = self.epsilon;

        // Folds both bias corrections into the step so the moments stay raw.
        let t = self.steps;
        let step = self.learning_rate * (1. - b2.powi(t)).sqrt() / (1. - b1.powi(t));

        let moments = self.m.iter_mut().zip(self.v.iter_mut());
        for ((p, &g), (m, v)) in params.iter_mut().zip(grad).zip(moments) {
            *m = b1 * *m + (1. - b1) * g;
            *v = b2 * *v + (1. - b2) * g * g;
            *p -= step * *m / (v.sqrt() + eps);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let mut adam = Adam::new(2, 0.1);
        let mut params = [0.0, 0.0];
        adam.update_params(&[3.0, -0.5], &mut params).unwrap();
        assert!((params[0] + 0.1).abs() < 1e-4);
        assert!((params[1] - 0.1).abs() < 1e-4);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn constant_gradients_keep_a_constant_step() {
        let mut adam = Adam::new(1, 0.05).with_betas(0.8, 0.99).with_epsilon(0.0);
        let mut params = [1.0];
        for step in 1..=20 {
            adam.update_params(&[4.0], &mut params).unwrap();
            assert!((params[0] - (1.0 - 0.05 * step as f32)).abs() < 1e-4, "{step}");
        }
    }

    #[test]
    fn minimizes_a_quadratic() {
        let mut adam = Adam::new(1, 0.1);
        let mut params = [5.0];
        for _ in 0..500 {
            let grad = [2.0 * (params[0] - 1.0)];
            adam.update_params(&grad, &mut params).unwrap();
        }
        assert!((params[0] - 1.0).abs() < 0.05);
    }

    #[test]
    fn rejects_mismatched_sizes() {
        let mut adam = Adam::new(2, 0.1);
        assert!(adam.update_params(&[1.0, 1.0, 1.0], &mut [0.0; 3]).is_err());
        assert_eq!(adam.steps(), 0);
    }
}
