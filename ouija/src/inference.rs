//! Stochastic variational inference for the pseudotime model.
//!
//! Each iteration draws a fresh batch of reparameterized samples from
//! every approximation, assembles the Monte-Carlo evidence lower bound
//!
//! ```text
//! ELBO = E_q[ log p(Y | theta) + log p(theta) - log q(theta) ]
//! ```
//!
//! and takes one AdamW step on its negation. No schedules, no restarts;
//! a non-finite objective is a hard error.

use crate::common_io::open_buf_writer;
use crate::model::{OuijaModel, OuijaPriors};
use crate::posterior::{gene_behaviour_table, pseudotime_vector, GeneBehaviour};
use crate::variational::ApproxDists;
use anyhow::{anyhow, bail, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, VarBuilder, VarMap};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use std::io::Write;

#[derive(Clone, Debug)]
pub struct FitOptions {
    pub n_iter: usize,
    pub learning_rate: f32,
    /// Monte-Carlo samples per ELBO evaluation.
    pub num_samples: usize,
    /// When set, a per-iteration ELBO trace is streamed to
    /// `<logdir>/elbo_trace.tsv`.
    pub logdir: Option<Box<str>>,
    /// Show a progress bar during fitting.
    pub verbose: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            n_iter: 1000,
            learning_rate: 0.01,
            num_samples: 10,
            logdir: None,
            verbose: false,
        }
    }
}

/// Monte-Carlo ELBO estimate with `num_samples` fresh draws, scalar.
pub fn compute_elbo(
    model: &OuijaModel,
    y: &Tensor,
    approx: &ApproxDists,
    num_samples: usize,
) -> candle_core::Result<Tensor> {
    let (draws, log_q) = approx.sample_all(num_samples)?;
    let llik = model.log_likelihood(y, &draws)?;
    let log_prior = model.log_prior(&draws)?;
    (((llik + log_prior)? - log_q)?).mean(0)
}

/// The loss minimized by the driver: the negated ELBO.
pub fn elbo_loss(
    model: &OuijaModel,
    y: &Tensor,
    approx: &ApproxDists,
    num_samples: usize,
) -> candle_core::Result<Tensor> {
    compute_elbo(model, y, approx, num_samples)?.neg()
}

struct FittedOuija {
    approx: ApproxDists,
    num_cells: usize,
    num_genes: usize,
    elbo_trace: Vec<f32>,
}

/// Unsupervised pseudotime inference over an `N x G` expression matrix.
///
/// A value starts unfitted; `fit` builds fresh variational state and
/// runs the optimization, after which `trajectory`, `gene_behaviour`
/// and `approx_dists` summarize the posterior. Fitting again rebuilds
/// everything from scratch.
pub struct Ouija {
    options: FitOptions,
    device: Device,
    priors: OuijaPriors,
    fitted: Option<FittedOuija>,
}

impl Ouija {
    pub fn new(options: FitOptions, device: Device) -> Self {
        Self {
            options,
            device,
            priors: OuijaPriors::default(),
            fitted: None,
        }
    }

    /// Fit by maximizing the Monte-Carlo ELBO over `n_iter` AdamW steps.
    ///
    /// `y` must be a 2-D matrix of finite, non-negative values with at
    /// least two cells. On success the fitted state replaces any
    /// previous one; on error the model is left unfitted.
    pub fn fit(&mut self, y: &Tensor) -> Result<()> {
        self.fitted = None;

        let dims = y.dims();
        if dims.len() != 2 {
            bail!(
                "expression matrix must be 2-dimensional (cells x genes), got {:?}",
                dims
            );
        }
        let (num_cells, num_genes) = y.dims2()?;
        if num_cells < 2 {
            bail!("need at least two cells to order, got {}", num_cells);
        }
        if num_genes == 0 {
            bail!("expression matrix has no genes");
        }
        if self.options.n_iter == 0 {
            bail!("n_iter must be positive");
        }
        if self.options.num_samples == 0 {
            bail!("num_samples must be positive");
        }

        let y = y.to_device(&self.device)?.to_dtype(DType::F32)?;
        for v in y.flatten_all()?.to_vec1::<f32>()? {
            if !v.is_finite() || v < 0.0 {
                bail!("expression values must be finite and non-negative, found {}", v);
            }
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);
        let approx = ApproxDists::new(&vb, num_cells, num_genes, 1)?;
        let model = OuijaModel::new(num_cells, num_genes, self.priors.clone());

        let mut optimizer = AdamW::new_lr(varmap.all_vars(), self.options.learning_rate.into())?;

        let mut trace_out = match &self.options.logdir {
            Some(dir) => {
                std::fs::create_dir_all(dir.as_ref())?;
                let mut out = open_buf_writer(&format!("{}/elbo_trace.tsv", dir))?;
                writeln!(out, "iter\telbo")?;
                Some(out)
            }
            None => None,
        };

        info!(
            "fitting pseudotime over {} cells x {} genes ({} iterations)",
            num_cells, num_genes, self.options.n_iter
        );

        let pb = ProgressBar::new(self.options.n_iter as u64);
        if !self.options.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut elbo_trace = Vec::with_capacity(self.options.n_iter);
        for it in 0..self.options.n_iter {
            let loss = elbo_loss(&model, &y, &approx, self.options.num_samples)?;
            optimizer.backward_step(&loss)?;

            let elbo = -loss.to_scalar::<f32>()?;
            if !elbo.is_finite() {
                bail!("ELBO became non-finite at iteration {}", it + 1);
            }
            elbo_trace.push(elbo);
            if let Some(out) = trace_out.as_mut() {
                writeln!(out, "{}\t{}", it + 1, elbo)?;
            }
            if (it + 1) % 100 == 0 {
                info!("[{}] ELBO {:.4}", it + 1, elbo);
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        if let Some(mut out) = trace_out.take() {
            out.flush()?;
        }

        self.fitted = Some(FittedOuija {
            approx,
            num_cells,
            num_genes,
            elbo_trace,
        });
        Ok(())
    }

    fn fitted(&self) -> Result<&FittedOuija> {
        self.fitted
            .as_ref()
            .ok_or_else(|| anyhow!("model has not been fitted; call fit() first"))
    }

    /// Posterior pseudotime point estimate per cell, length `N`, each
    /// value strictly inside `(0, 1)`.
    pub fn trajectory(&self) -> Result<Vec<f32>> {
        pseudotime_vector(&self.fitted()?.approx)
    }

    /// Per-gene switching summary, one row per gene.
    pub fn gene_behaviour(&self) -> Result<Vec<GeneBehaviour>> {
        gene_behaviour_table(&self.fitted()?.approx)
    }

    /// The six fitted approximations, keyed by field name.
    pub fn approx_dists(&self) -> Result<&ApproxDists> {
        Ok(&self.fitted()?.approx)
    }

    /// Per-iteration ELBO values from the last fit.
    pub fn elbo_trace(&self) -> Result<&[f32]> {
        Ok(self.fitted()?.elbo_trace.as_slice())
    }

    pub fn num_cells(&self) -> Result<usize> {
        Ok(self.fitted()?.num_cells)
    }

    pub fn num_genes(&self) -> Result<usize> {
        Ok(self.fitted()?.num_genes)
    }
}
