use crate::error::Result;

/// Defines the strategy for updating parameters based on a gradient.
pub trait Optimizer: Send {
    /// Takes a step over `params` using `grad`.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the loss with respect to `params`.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}

pub(super) fn check_sizes(grad: &[f32], params: &[f32]) -> Result<()> {
    if grad.len() != params.len() {
        return Err(crate::error::MlErr::SizeMismatch {
            a: "grad",
            b: "params",
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}
