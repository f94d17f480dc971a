//! Smooth invertible maps from unconstrained space onto the supports the
//! latent variables live on, with the log-Jacobian terms the transformed
//! variational densities need.

use crate::stable::log_sigmoid;
use candle_core::{Device, Result, Tensor};
use candle_nn::ops;

/// A differentiable change of variables. `forward` maps unconstrained
/// values onto the constrained support, `inverse` undoes it, and
/// `log_det_jacobian` evaluates `ln |d forward / dx|` elementwise at an
/// unconstrained point. All three broadcast over a leading sample
/// dimension.
pub trait Bijector {
    fn forward(&self, x: &Tensor) -> Result<Tensor>;
    fn inverse(&self, y: &Tensor) -> Result<Tensor>;
    fn log_det_jacobian(&self, x: &Tensor) -> Result<Tensor>;
}

/// `x -> a + b * sigmoid(x)`, a bijection onto the open interval
/// `(a, a + b)` for `b > 0`. With `a = 0, b = 1` this is the plain
/// logistic map onto the unit interval.
pub struct LogitShiftBijector {
    a: Tensor,
    b: Tensor,
}

impl LogitShiftBijector {
    pub fn new(a: Tensor, b: Tensor) -> Self {
        Self { a, b }
    }

    /// The `(0, 1)` special case used for pseudotimes and switch times.
    pub fn unit_interval(device: &Device) -> Result<Self> {
        Ok(Self::new(
            Tensor::new(0f32, device)?,
            Tensor::new(1f32, device)?,
        ))
    }
}

impl Bijector for LogitShiftBijector {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        ops::sigmoid(x)?
            .broadcast_mul(&self.b)?
            .broadcast_add(&self.a)
    }

    fn inverse(&self, y: &Tensor) -> Result<Tensor> {
        let r = y.broadcast_sub(&self.a)?.broadcast_div(&self.b)?;
        r.log()? - r.affine(-1.0, 1.0)?.log()?
    }

    // d/dx [a + b sigmoid(x)] = b sigmoid(x) sigmoid(-x)
    fn log_det_jacobian(&self, x: &Tensor) -> Result<Tensor> {
        let sig = (log_sigmoid(x)? + log_sigmoid(&x.neg()?)?)?;
        sig.broadcast_add(&self.b.log()?)
    }
}

/// `x -> exp(x)`, a bijection onto `(0, inf)` with `ln |J| = x`.
pub struct ExpBijector;

impl Bijector for ExpBijector {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.exp()
    }

    fn inverse(&self, y: &Tensor) -> Result<Tensor> {
        y.log()
    }

    fn log_det_jacobian(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    fn grid(dev: &Device) -> Tensor {
        let xs: Vec<f32> = (-12..=12).map(|v| v as f32 * 0.5).collect();
        let n = xs.len();
        Tensor::from_vec(xs, n, dev).unwrap()
    }

    fn interval(dev: &Device, a: f32, b: f32) -> LogitShiftBijector {
        LogitShiftBijector::new(
            Tensor::new(a, dev).unwrap(),
            Tensor::new(b, dev).unwrap(),
        )
    }

    #[test]
    fn logit_shift_round_trip() {
        let dev = Device::Cpu;
        let x = grid(&dev);
        for (a, b) in [(0f32, 1f32), (-2.0, 5.0), (0.5, 0.25)] {
            let bij = interval(&dev, a, b);
            let back = bij.inverse(&bij.forward(&x).unwrap()).unwrap();
            let x_v = x.to_vec1::<f32>().unwrap();
            let back_v = back.to_vec1::<f32>().unwrap();
            for (u, v) in x_v.iter().zip(back_v.iter()) {
                assert_relative_eq!(*u, *v, epsilon = 1e-4, max_relative = 1e-3);
            }
        }
    }

    #[test]
    fn logit_shift_range_and_monotonicity() {
        let dev = Device::Cpu;
        let x = grid(&dev);
        for (a, b) in [(0f32, 1f32), (-2.0, 5.0)] {
            let bij = interval(&dev, a, b);
            let y = bij.forward(&x).unwrap().to_vec1::<f32>().unwrap();
            for w in y.windows(2) {
                assert!(w[0] < w[1], "not strictly increasing: {:?}", w);
            }
            for v in &y {
                assert!(*v > a && *v < a + b, "{} outside ({}, {})", v, a, a + b);
            }
        }
    }

    #[test]
    fn logit_shift_jacobian_matches_derivative() {
        let dev = Device::Cpu;
        let bij = interval(&dev, -2.0, 5.0);
        let x = Tensor::from_vec(vec![-1.5f32, 0.0, 2.0], 3, &dev).unwrap();
        let ldj = bij.log_det_jacobian(&x).unwrap().to_vec1::<f32>().unwrap();
        for (x, got) in [-1.5f32, 0.0, 2.0].iter().zip(ldj.iter()) {
            let s = 1.0 / (1.0 + (-x).exp());
            let want = (5.0 * s * (1.0 - s)).ln();
            assert_relative_eq!(*got, want, max_relative = 1e-4);
        }
    }

    #[test]
    fn exp_bijector_round_trip_and_jacobian() {
        let dev = Device::Cpu;
        let x = Tensor::from_vec(vec![-2f32, 0.0, 3.0], 3, &dev).unwrap();
        let bij = ExpBijector;
        let y = bij.forward(&x).unwrap();
        for v in y.to_vec1::<f32>().unwrap() {
            assert!(v > 0.0);
        }
        let back = bij.inverse(&y).unwrap().to_vec1::<f32>().unwrap();
        for (u, v) in [-2f32, 0.0, 3.0].iter().zip(back.iter()) {
            assert_relative_eq!(*u, *v, max_relative = 1e-5);
        }
        let ldj = bij.log_det_jacobian(&x).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(ldj, vec![-2f32, 0.0, 3.0]);
    }
}
