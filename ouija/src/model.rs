//! The generative model: each gene follows a sigmoidal mean curve along
//! a shared latent pseudotime, observed through the dropout emission.
//!
//! ```text
//! z_n    ~ Normal(0.5, 1)            cell pseudotime, constrained to (0, 1)
//! k_g    ~ Normal(0, 50)             switch strength (sign = direction)
//! t0_g   ~ Normal(0.5, 1)            switch time, constrained to (0, 1)
//! mu0_g  ~ Gamma(2, 1)               peak expression level
//! phi    ~ Gamma(2, 1)               mean-variance slope
//! pbeta  ~ Normal(0, 1)^2            dropout logit intercept and slope
//!
//! mu_ng     = mu0_g * sigmoid(k_g (z_n - t0_g))
//! logit_ng  = pbeta[0] + pbeta[1] * mu_ng
//! Y_ng      ~ DropoutNormal(logit_ng, mu_ng, sqrt(1 + phi * mu_ng))
//! ```
//!
//! The factor `k_g (z_n - t0_g)` is assembled as a batched product of a
//! cell design matrix `[z, -1]` and a gene design matrix `[k, k * t0]`.

use crate::dropout_normal::DropoutNormal;
use crate::stable::{gamma_log_prob, normal_log_prob_scalar, sum_event_dims};
use crate::variational::LatentDraws;
use candle_core::{Result, Tensor};
use candle_nn::ops;

/// Hyperparameters of the six priors; shape/rate for the Gamma pair.
#[derive(Clone, Debug)]
pub struct OuijaPriors {
    pub k_sd: f64,
    pub z_mean: f64,
    pub z_sd: f64,
    pub t0_mean: f64,
    pub t0_sd: f64,
    pub mu0_shape: f64,
    pub mu0_rate: f64,
    pub phi_shape: f64,
    pub phi_rate: f64,
    pub pbeta_sd: f64,
}

impl Default for OuijaPriors {
    fn default() -> Self {
        Self {
            k_sd: 50.0,
            z_mean: 0.5,
            z_sd: 1.0,
            t0_mean: 0.5,
            t0_sd: 1.0,
            mu0_shape: 2.0,
            mu0_rate: 1.0,
            phi_shape: 2.0,
            phi_rate: 1.0,
            pbeta_sd: 1.0,
        }
    }
}

pub struct OuijaModel {
    num_cells: usize,
    num_genes: usize,
    priors: OuijaPriors,
}

impl OuijaModel {
    pub fn new(num_cells: usize, num_genes: usize, priors: OuijaPriors) -> Self {
        Self {
            num_cells,
            num_genes,
            priors,
        }
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn num_genes(&self) -> usize {
        self.num_genes
    }

    /// Expected expression `mu` for every (sample, cell, gene) triple,
    /// shape `(S, N, G)`. Clamped above to keep a runaway baseline from
    /// overflowing the variance link downstream.
    pub fn mean_curve(&self, draws: &LatentDraws) -> Result<Tensor> {
        let (s, n, _q) = draws.z.dims3()?;

        let neg_ones = Tensor::full(-1f32, (s, n, 1), draws.z.device())?;
        let cell = Tensor::cat(&[&draws.z, &neg_ones], 2)?;

        let kt0 = (&draws.k * &draws.t0.unsqueeze(2)?)?;
        let gene = Tensor::cat(&[&draws.k, &kt0], 2)?;

        let factor = cell.matmul(&gene.transpose(1, 2)?.contiguous()?)?;
        let mu = ops::sigmoid(&factor)?.broadcast_mul(&draws.mu0.unsqueeze(1)?)?;
        mu.clamp(0f64, 1e6)
    }

    /// Joint log-likelihood of the observed matrix under each sampled
    /// parameter set, reduced over cells and genes to shape `(S,)`.
    pub fn log_likelihood(&self, y: &Tensor, draws: &LatentDraws) -> Result<Tensor> {
        let mu = self.mean_curve(draws)?;

        let phi = draws.phi.clamp(1e-6, 1e6)?.unsqueeze(2)?;
        let scale = (mu.broadcast_mul(&phi)? + 1.0)?.sqrt()?;

        let b0 = draws.pbeta.narrow(1, 0, 1)?.unsqueeze(2)?;
        let b1 = draws.pbeta.narrow(1, 1, 1)?.unsqueeze(2)?;
        let logits = mu.broadcast_mul(&b1)?.broadcast_add(&b0)?;

        let emission = DropoutNormal::from_logits(&logits, &mu, &scale)?;
        sum_event_dims(&emission.log_prob(y)?)
    }

    /// Sum of the six prior log-densities at the constrained draws,
    /// shape `(S,)`.
    pub fn log_prior(&self, draws: &LatentDraws) -> Result<Tensor> {
        let pr = &self.priors;
        let lp_k = sum_event_dims(&normal_log_prob_scalar(&draws.k, 0.0, pr.k_sd)?)?;
        let lp_z = sum_event_dims(&normal_log_prob_scalar(&draws.z, pr.z_mean, pr.z_sd)?)?;
        let lp_t0 = sum_event_dims(&normal_log_prob_scalar(&draws.t0, pr.t0_mean, pr.t0_sd)?)?;
        let lp_mu0 = sum_event_dims(&gamma_log_prob(&draws.mu0, pr.mu0_shape, pr.mu0_rate)?)?;
        let lp_phi = sum_event_dims(&gamma_log_prob(&draws.phi, pr.phi_shape, pr.phi_rate)?)?;
        let lp_pbeta = sum_event_dims(&normal_log_prob_scalar(&draws.pbeta, 0.0, pr.pbeta_sd)?)?;

        ((((lp_k + lp_z)? + lp_t0)? + lp_mu0)? + lp_phi)? + lp_pbeta
    }
}
