//! Gradient utilities
//!
//! Global-norm gradient clipping over an explicit parameter list, returning the
//! norm measured before clipping so the caller can log it. tch's
//! `Optimizer::clip_grad_norm` clips the same way but does not return the norm.

use anyhow::Result;
use tch::{Kind, Tensor};

/// Global L2 norm of all defined gradients in `parameters`
pub fn grad_norm(parameters: &[Tensor]) -> Result<f64> {
    let norms: Vec<Tensor> = tch::no_grad(|| {
        parameters
            .iter()
            .map(|p| p.grad())
            .filter(|g| g.defined())
            .map(|g| g.to_kind(Kind::Float).norm())
            .collect()
    });

    if norms.is_empty() {
        return Ok(0.0);
    }
    let total = tch::no_grad(|| Tensor::stack(&norms, 0).norm());
    Ok(f64::try_from(&total)?)
}

/// Rescale gradients in place so their global norm is at most `max_norm`
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(parameters: &[Tensor], max_norm: f64) -> Result<f64> {
    let total_norm = grad_norm(parameters)?;
    let clip_coef = max_norm / (total_norm + 1e-6);

    if clip_coef < 1.0 {
        tch::no_grad(|| {
            for p in parameters {
                let mut grad = p.grad();
                if grad.defined() {
                    let _ = grad.g_mul_scalar_(clip_coef);
                }
            }
        });
    }
    Ok(total_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn params_with_grad(scale: f64) -> Vec<Tensor> {
        let a = Tensor::ones([3, 4], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let b = Tensor::ones([5], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let loss = (&a * scale).sum(Kind::Float) + (&b * scale).sum(Kind::Float);
        loss.backward();
        vec![a, b]
    }

    #[test]
    fn test_grad_norm() {
        // 17 gradients of value 2 -> sqrt(17 * 4)
        let params = params_with_grad(2.0);
        let norm = grad_norm(&params).unwrap();
        assert!((norm - (68.0f64).sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_clip_bounds_norm() {
        let params = params_with_grad(10.0);
        let before = clip_grad_norm(&params, 0.5).unwrap();
        assert!(before > 0.5);

        let after = grad_norm(&params).unwrap();
        assert!(after <= 0.5 + 1e-4, "norm after clipping: {}", after);
    }

    #[test]
    fn test_clip_leaves_small_gradients() {
        let params = params_with_grad(0.01);
        let before = clip_grad_norm(&params, 10.0).unwrap();
        let after = grad_norm(&params).unwrap();
        assert!((before - after).abs() < 1e-6);
    }

    #[test]
    fn test_no_gradients() {
        let params = vec![Tensor::zeros([2], (Kind::Float, Device::Cpu))];
        assert_eq!(clip_grad_norm(&params, 1.0).unwrap(), 0.0);
    }
}
