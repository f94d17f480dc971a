//! Mean-field variational families over the model latents.
//!
//! Every family is a Gaussian in unconstrained space whose location and
//! raw scale live in a `VarMap`; the scale goes through a softplus so
//! the optimizer moves freely in the reals. Latents with a constrained
//! support wrap the Gaussian in a bijector and pick up the log-Jacobian
//! correction in their `log q`.

use crate::bijector::{Bijector, ExpBijector, LogitShiftBijector};
use crate::stable::{normal_log_prob, softplus, sum_event_dims};
use candle_core::{Result, Tensor};
use candle_nn::{Init, VarBuilder};

/// One reparameterized draw batch: `value` is on the constrained
/// support with a leading sample dimension, `log_q` is the per-sample
/// variational log-density, shape `(S,)`.
pub struct LatentSample {
    pub value: Tensor,
    pub log_q: Tensor,
}

/// Common surface of all approximations: reparameterized sampling, the
/// posterior point estimate on the constrained support, and the raw
/// unconstrained (loc, scale) pair.
pub trait VariationalApprox {
    fn sample(&self, num_samples: usize) -> Result<LatentSample>;
    fn constrained_value(&self) -> Result<Tensor>;
    fn unconstrained_params(&self) -> Result<(Tensor, Tensor)>;
}

/// Fully factorized Gaussian with free location and softplus-linked
/// scale.
pub struct GaussianApprox {
    loc: Tensor,
    raw_scale: Tensor,
}

impl GaussianApprox {
    pub fn new(
        vb: &VarBuilder,
        name: &str,
        shape: &[usize],
        loc_init: Init,
        raw_scale_init: Init,
    ) -> Result<Self> {
        let vs = vb.pp(name);
        Ok(Self {
            loc: vs.get_with_hints(shape, "loc", loc_init)?,
            raw_scale: vs.get_with_hints(shape, "raw_scale", raw_scale_init)?,
        })
    }

    pub fn loc(&self) -> &Tensor {
        &self.loc
    }

    pub fn scale(&self) -> Result<Tensor> {
        softplus(&self.raw_scale)
    }

    /// Draw `num_samples` reparameterized samples in unconstrained
    /// space together with their summed log-density, shape `(S,)`.
    pub fn sample_unconstrained(&self, num_samples: usize) -> Result<(Tensor, Tensor)> {
        let scale = self.scale()?;
        let mut dims = Vec::with_capacity(self.loc.rank() + 1);
        dims.push(num_samples);
        dims.extend_from_slice(self.loc.dims());
        let eps = Tensor::randn(0f32, 1f32, dims, self.loc.device())?;
        let u = self.loc.broadcast_add(&eps.broadcast_mul(&scale)?)?;
        let log_q = sum_event_dims(&normal_log_prob(&u, &self.loc, &scale)?)?;
        Ok((u, log_q))
    }
}

impl VariationalApprox for GaussianApprox {
    fn sample(&self, num_samples: usize) -> Result<LatentSample> {
        let (value, log_q) = self.sample_unconstrained(num_samples)?;
        Ok(LatentSample { value, log_q })
    }

    fn constrained_value(&self) -> Result<Tensor> {
        Ok(self.loc.clone())
    }

    fn unconstrained_params(&self) -> Result<(Tensor, Tensor)> {
        Ok((self.loc.clone(), self.scale()?))
    }
}

/// A Gaussian base pushed through a bijector onto the latent's support.
/// `log q` picks up the change-of-variables term
/// `log q(x) = log q_base(u) - ln |J(u)|` at the unconstrained draw `u`.
pub struct TransformedApprox<B: Bijector> {
    base: GaussianApprox,
    bijector: B,
}

impl<B: Bijector> TransformedApprox<B> {
    pub fn new(base: GaussianApprox, bijector: B) -> Self {
        Self { base, bijector }
    }

    pub fn bijector(&self) -> &B {
        &self.bijector
    }

    pub fn base(&self) -> &GaussianApprox {
        &self.base
    }
}

impl<B: Bijector> VariationalApprox for TransformedApprox<B> {
    fn sample(&self, num_samples: usize) -> Result<LatentSample> {
        let (u, log_q_base) = self.base.sample_unconstrained(num_samples)?;
        let value = self.bijector.forward(&u)?;
        let ldj = sum_event_dims(&self.bijector.log_det_jacobian(&u)?)?;
        Ok(LatentSample {
            value,
            log_q: (log_q_base - ldj)?,
        })
    }

    fn constrained_value(&self) -> Result<Tensor> {
        self.bijector.forward(self.base.loc())
    }

    fn unconstrained_params(&self) -> Result<(Tensor, Tensor)> {
        self.base.unconstrained_params()
    }
}

/// Constrained-space draws for every latent, leading dimension `S`.
pub struct LatentDraws {
    pub k: Tensor,
    pub z: Tensor,
    pub t0: Tensor,
    pub mu0: Tensor,
    pub phi: Tensor,
    pub pbeta: Tensor,
}

/// The six named approximations, one per model latent.
pub struct ApproxDists {
    pub k: GaussianApprox,
    pub z: TransformedApprox<LogitShiftBijector>,
    pub mu0: TransformedApprox<ExpBijector>,
    pub phi: TransformedApprox<ExpBijector>,
    pub t0: TransformedApprox<LogitShiftBijector>,
    pub pbeta: GaussianApprox,
}

impl ApproxDists {
    /// Register fresh variational parameters for an `n` cells by `g`
    /// genes dataset. Locations start at zero (pseudotimes at 0.5,
    /// baselines at 1); `k`'s location gets a small random kick so the
    /// two trajectory orientations are not exactly tied. Raw scales
    /// start at 1 except `k`'s, which starts at 0.
    pub fn new(vb: &VarBuilder, n: usize, g: usize, q: usize) -> Result<Self> {
        let zeros = Init::Const(0.);
        let ones = Init::Const(1.0);
        let k_loc = Init::Randn {
            mean: 0.,
            stdev: 0.01,
        };
        Ok(Self {
            k: GaussianApprox::new(vb, "k", &[g, q], k_loc, zeros)?,
            z: TransformedApprox::new(
                GaussianApprox::new(vb, "z", &[n, q], zeros, ones)?,
                LogitShiftBijector::unit_interval(vb.device())?,
            ),
            mu0: TransformedApprox::new(
                GaussianApprox::new(vb, "mu0", &[g], zeros, ones)?,
                ExpBijector,
            ),
            phi: TransformedApprox::new(
                GaussianApprox::new(vb, "phi", &[1], zeros, ones)?,
                ExpBijector,
            ),
            t0: TransformedApprox::new(
                GaussianApprox::new(vb, "t0", &[g], zeros, ones)?,
                LogitShiftBijector::unit_interval(vb.device())?,
            ),
            pbeta: GaussianApprox::new(vb, "pbeta", &[2], zeros, ones)?,
        })
    }

    /// Draw all latents and accumulate the total `log q`, shape `(S,)`.
    pub fn sample_all(&self, num_samples: usize) -> Result<(LatentDraws, Tensor)> {
        let k = self.k.sample(num_samples)?;
        let z = self.z.sample(num_samples)?;
        let t0 = self.t0.sample(num_samples)?;
        let mu0 = self.mu0.sample(num_samples)?;
        let phi = self.phi.sample(num_samples)?;
        let pbeta = self.pbeta.sample(num_samples)?;

        let log_q =
            (((((k.log_q + z.log_q)? + t0.log_q)? + mu0.log_q)? + phi.log_q)? + pbeta.log_q)?;

        Ok((
            LatentDraws {
                k: k.value,
                z: z.value,
                t0: t0.value,
                mu0: mu0.value,
                phi: phi.value,
                pbeta: pbeta.value,
            },
            log_q,
        ))
    }
}
