//! Zero-inflated Gaussian emission for log-scale expression values.
//!
//! Each matrix entry is either dropped out (an exact zero) or detected,
//! in which case it follows a Gaussian around the mean curve:
//!
//! ```text
//! p(y) = p_drop * 1[y = 0] + (1 - p_drop) * N(y; loc, scale)
//! ```
//!
//! The mixture is evaluated entirely in log space. Both mixture weights
//! are stored as log-probabilities so that saturated dropout logits and
//! the exact `p_drop = 0` and `p_drop = 1` corners stay finite-or-`-inf`
//! instead of turning into NaN.

use crate::stable::{log_add_exp, log_sigmoid, normal_log_prob};
use candle_core::{Result, Tensor};
use rand::Rng;
use rand_distr::{Distribution, Normal};

pub struct DropoutNormal {
    ln_dropout: Tensor,
    ln_detect: Tensor,
    loc: Tensor,
    scale: Tensor,
}

impl DropoutNormal {
    /// Build the emission from raw dropout logits; the logistic link is
    /// applied internally via `log_sigmoid`, so the caller never has to
    /// materialize probabilities. All arguments must share one shape,
    /// which becomes the event shape of the distribution.
    pub fn from_logits(logits: &Tensor, loc: &Tensor, scale: &Tensor) -> Result<Self> {
        Ok(Self {
            ln_dropout: log_sigmoid(logits)?,
            ln_detect: log_sigmoid(&logits.neg()?)?,
            loc: loc.clone(),
            scale: scale.clone(),
        })
    }

    /// Build the emission from dropout probabilities in `[0, 1]`. The
    /// endpoints are honored exactly: `p = 0` reduces to the plain
    /// Gaussian and `p = 1` to a point mass at zero.
    pub fn from_probs(probs: &Tensor, loc: &Tensor, scale: &Tensor) -> Result<Self> {
        Ok(Self {
            ln_dropout: probs.log()?,
            ln_detect: probs.affine(-1.0, 1.0)?.log()?,
            loc: loc.clone(),
            scale: scale.clone(),
        })
    }

    /// Elementwise log-density of `y`, broadcast up to the event shape.
    ///
    /// Zeros score `ln(p_drop + (1 - p_drop) N(0; loc, scale))`; nonzero
    /// values score the detected branch alone. `log_prob(0)` therefore
    /// never falls below `ln p_drop`.
    pub fn log_prob(&self, y: &Tensor) -> Result<Tensor> {
        let y = y.broadcast_as(self.loc.shape())?;
        let detect_lp = (normal_log_prob(&y, &self.loc, &self.scale)? + &self.ln_detect)?;
        let zero_lp = log_add_exp(&self.ln_dropout, &detect_lp)?;
        let zero_mask = y.eq(0f64)?;
        zero_mask.where_cond(&zero_lp, &detect_lp)
    }

    /// Ancestral draw of one matrix with the event shape: a Bernoulli
    /// dropout gate per entry, then a Gaussian for the detected entries.
    /// Scalar CPU path for simulation; gradients never flow through it.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> anyhow::Result<Tensor> {
        let p_drop = self.ln_dropout.exp()?.flatten_all()?.to_vec1::<f32>()?;
        let loc = self.loc.flatten_all()?.to_vec1::<f32>()?;
        let scale = self.scale.flatten_all()?.to_vec1::<f32>()?;

        let mut draws = Vec::with_capacity(loc.len());
        for i in 0..loc.len() {
            if rng.random::<f32>() < p_drop[i] {
                draws.push(0f32);
            } else {
                draws.push(Normal::new(loc[i], scale[i])?.sample(rng));
            }
        }
        Ok(Tensor::from_vec(
            draws,
            self.loc.dims(),
            self.loc.device(),
        )?)
    }
}
