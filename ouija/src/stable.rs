//! Numerically stable building blocks shared by the model and the
//! variational families.
//!
//! Everything operates on `candle` tensors in log space. The usual
//! trouble spots are handled explicitly:
//!
//! ```text
//! softplus(x)      = max(x, 0) + ln(1 + exp(-|x|))
//! log_sigmoid(x)   = -softplus(-x)
//! log_add_exp(a,b) = m + ln(exp(a - m) + exp(b - m)),  m = max(a, b)
//! ```
//!
//! with the max term in `log_add_exp` floored so that two `-inf`
//! operands return `-inf` instead of NaN.

use candle_core::{Result, Tensor};
use special::Gamma as SpecialGamma;

pub const LN_2PI: f64 = 1.8378770664093453;

/// `ln(1 + exp(x))` without overflow for large `|x|`.
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let linear = x.maximum(0f64)?;
    let curved = (x.abs()?.neg()?.exp()? + 1.0)?.log()?;
    linear + curved
}

/// `ln sigmoid(x) = -softplus(-x)`, exact down to the underflow limit.
pub fn log_sigmoid(x: &Tensor) -> Result<Tensor> {
    softplus(&x.neg()?)?.neg()
}

/// Elementwise `ln(exp(a) + exp(b))` for same-shaped tensors.
pub fn log_add_exp(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let m = a.maximum(b)?.maximum(-1e30)?;
    let sum = ((a - &m)?.exp()? + (b - &m)?.exp()?)?;
    sum.log()? + m
}

/// Gaussian log-density with tensor-valued mean and standard deviation,
/// broadcasting over a leading sample dimension.
pub fn normal_log_prob(x: &Tensor, mean: &Tensor, sd: &Tensor) -> Result<Tensor> {
    let z = x.broadcast_sub(mean)?.broadcast_div(sd)?;
    let quad = (z.sqr()? * (-0.5))?;
    quad.broadcast_sub(&sd.log()?)? - 0.5 * LN_2PI
}

/// Gaussian log-density against a fixed scalar mean and standard deviation.
pub fn normal_log_prob_scalar(x: &Tensor, mean: f64, sd: f64) -> Result<Tensor> {
    let z = ((x - mean)? / sd)?;
    (z.sqr()? * (-0.5))? - (sd.ln() + 0.5 * LN_2PI)
}

/// Gamma log-density in the shape/rate parameterization; support (0, inf).
pub fn gamma_log_prob(x: &Tensor, shape: f64, rate: f64) -> Result<Tensor> {
    let norm = shape * rate.ln() - SpecialGamma::ln_gamma(shape).0;
    let curve = (x.log()? * (shape - 1.0))?;
    (curve - (x * rate)?)? + norm
}

/// Sum a `(S, ...)` tensor over everything but the leading sample
/// dimension, yielding `(S,)`.
pub fn sum_event_dims(x: &Tensor) -> Result<Tensor> {
    if x.rank() <= 1 {
        return Ok(x.clone());
    }
    x.flatten_from(1)?.sum(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    fn vec_of(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn softplus_matches_naive_in_safe_range() {
        let dev = Device::Cpu;
        let xs = vec![-3.0f32, -0.5, 0.0, 0.5, 3.0];
        let t = Tensor::from_vec(xs.clone(), xs.len(), &dev).unwrap();
        let got = vec_of(&softplus(&t).unwrap());
        for (x, y) in xs.iter().zip(got.iter()) {
            assert_relative_eq!(*y, (1.0 + x.exp()).ln(), max_relative = 1e-5);
        }
    }

    #[test]
    fn softplus_is_linear_for_large_input() {
        let dev = Device::Cpu;
        let t = Tensor::from_vec(vec![80f32, -80.0], 2, &dev).unwrap();
        let got = vec_of(&softplus(&t).unwrap());
        assert_relative_eq!(got[0], 80.0, max_relative = 1e-6);
        assert!(got[1] >= 0.0 && got[1] < 1e-30);
    }

    #[test]
    fn log_sigmoid_at_zero() {
        let dev = Device::Cpu;
        let t = Tensor::from_vec(vec![0f32], 1, &dev).unwrap();
        let got = vec_of(&log_sigmoid(&t).unwrap());
        assert_relative_eq!(got[0], -(2f32.ln()), max_relative = 1e-6);
    }

    #[test]
    fn log_add_exp_matches_naive_and_survives_neg_inf() {
        let dev = Device::Cpu;
        let a = Tensor::from_vec(vec![-1.0f32, f32::NEG_INFINITY, f32::NEG_INFINITY], 3, &dev)
            .unwrap();
        let b = Tensor::from_vec(vec![0.5f32, 0.25, f32::NEG_INFINITY], 3, &dev).unwrap();
        let got = vec_of(&log_add_exp(&a, &b).unwrap());

        let naive = ((-1.0f32).exp() + 0.5f32.exp()).ln();
        assert_relative_eq!(got[0], naive, max_relative = 1e-5);
        // one -inf operand leaves the other untouched
        assert_relative_eq!(got[1], 0.25, max_relative = 1e-5);
        // both -inf must not produce NaN
        assert!(!got[2].is_nan());
        assert!(got[2] < -1e20);
    }

    #[test]
    fn normal_log_prob_closed_form() {
        let dev = Device::Cpu;
        let x = Tensor::from_vec(vec![1.3f32], 1, &dev).unwrap();
        let mean = Tensor::from_vec(vec![0.8f32], 1, &dev).unwrap();
        let sd = Tensor::from_vec(vec![2.0f32], 1, &dev).unwrap();
        let got = vec_of(&normal_log_prob(&x, &mean, &sd).unwrap());
        let z = (1.3f64 - 0.8) / 2.0;
        let want = -0.5 * z * z - 2f64.ln() - 0.5 * LN_2PI;
        assert_relative_eq!(got[0] as f64, want, max_relative = 1e-5);

        let got_scalar = vec_of(&normal_log_prob_scalar(&x, 0.8, 2.0).unwrap());
        assert_relative_eq!(got_scalar[0], got[0], max_relative = 1e-6);
    }

    #[test]
    fn gamma_log_prob_closed_form() {
        let dev = Device::Cpu;
        // Gamma(2, 1) density at 1 is exp(-1), so the log-density is -1
        let x = Tensor::from_vec(vec![1f32], 1, &dev).unwrap();
        let got = vec_of(&gamma_log_prob(&x, 2.0, 1.0).unwrap());
        assert_relative_eq!(got[0], -1.0, max_relative = 1e-5);
    }

    #[test]
    fn sum_event_dims_reduces_to_sample_dim() {
        let dev = Device::Cpu;
        let t = Tensor::from_vec((0..24).map(|v| v as f32).collect::<Vec<_>>(), (2, 3, 4), &dev)
            .unwrap();
        let s = sum_event_dims(&t).unwrap();
        assert_eq!(s.dims(), &[2]);
        let got = s.to_vec1::<f32>().unwrap();
        assert_relative_eq!(got[0], (0..12).sum::<i32>() as f32);
        assert_relative_eq!(got[1], (12..24).sum::<i32>() as f32);
    }
}
