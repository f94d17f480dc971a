//! Unsupervised pseudotime estimation for single-cell expression data.
//!
//! Given an `N x G` matrix of non-negative expression values, the model
//! orders the `N` cells along a latent `(0, 1)` pseudotime axis and
//! characterizes each gene by a sigmoidal switch along that axis.
//! Inference is stochastic variational: reparameterized Monte-Carlo
//! estimates of the evidence lower bound, optimized with candle-based
//! autodiff and AdamW.
//!
//! # Model
//!
//! Zero-inflated Gaussian emissions ([`DropoutNormal`]) around a
//! sigmoid mean curve `mu0 * sigmoid(k * (z - t0))`, with the dropout
//! probability tied to the mean through a logistic regression.
//!
//! # References
//!
//! Campbell & Yau (2017). "Probabilistic modeling of bifurcations in
//! single-cell gene expression data using a Bayesian mixture of factor
//! analyzers." Wellcome Open Research.

/// Interval and positivity transforms with log-Jacobians
pub mod bijector;

/// Plain-text and gzipped matrix/line IO
pub mod common_io;

/// Zero-inflated Gaussian emission distribution
pub mod dropout_normal;

/// SVI driver: ELBO assembly and the AdamW loop
pub mod inference;

/// Priors, mean curve, and joint log-density
pub mod model;

/// Posterior summaries and parquet/TSV export
pub mod posterior;

/// Synthetic switch-like expression data
pub mod simulate;

/// Numerically careful tensor primitives
pub mod stable;

/// Reparameterized Gaussian and transformed approximations
pub mod variational;

pub use dropout_normal::DropoutNormal;
pub use inference::{FitOptions, Ouija};
pub use posterior::GeneBehaviour;
pub use simulate::{simulate_trajectory, SimOptions, SimulatedTrajectory};
pub use variational::{ApproxDists, VariationalApprox};

pub use candle_core;
pub use candle_nn;
