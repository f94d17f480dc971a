//! Seeded synthetic expression matrices drawn from the model's own
//! generative process, with the ground-truth latents returned alongside
//! for recovery checks.

use crate::dropout_normal::DropoutNormal;
use anyhow::{bail, Result};
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};

#[derive(Clone, Debug)]
pub struct SimOptions {
    pub num_cells: usize,
    pub num_genes: usize,
    /// Range of `|k|`; each gene flips a fair coin for the sign.
    pub switch_strength: (f32, f32),
    /// Range of the peak expression level `mu0`.
    pub baseline: (f32, f32),
    pub phi: f32,
    pub dropout_intercept: f32,
    pub dropout_slope: f32,
    pub rseed: u64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            num_cells: 200,
            num_genes: 20,
            switch_strength: (5.0, 15.0),
            baseline: (1.0, 3.0),
            phi: 0.5,
            dropout_intercept: -2.0,
            dropout_slope: -0.5,
            rseed: 42,
        }
    }
}

pub struct SimulatedTrajectory {
    /// `(num_cells, num_genes)` non-negative expression matrix.
    pub expression: Tensor,
    pub pseudotime: Vec<f32>,
    pub switch_strength: Vec<f32>,
    pub switch_time: Vec<f32>,
    pub baseline: Vec<f32>,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Draw pseudotimes uniformly on `(0, 1)`, gene parameters from the
/// configured ranges, then one matrix from the dropout emission.
/// Detected values are truncated at zero so the output satisfies the
/// non-negativity the fitting routine expects of real data.
pub fn simulate_trajectory(opts: &SimOptions, device: &Device) -> Result<SimulatedTrajectory> {
    let (num_cells, num_genes) = (opts.num_cells, opts.num_genes);
    if num_cells == 0 || num_genes == 0 {
        bail!("need at least one cell and one gene");
    }
    let (k_lo, k_hi) = opts.switch_strength;
    if !(k_lo > 0.0 && k_lo < k_hi) {
        bail!("switch strength range must be positive and increasing");
    }
    let (b_lo, b_hi) = opts.baseline;
    if !(b_lo > 0.0 && b_lo < b_hi) {
        bail!("baseline range must be positive and increasing");
    }
    if opts.phi < 0.0 {
        bail!("phi must be non-negative");
    }

    let mut rng = StdRng::seed_from_u64(opts.rseed);
    let runif = Uniform::new(0f32, 1f32)?;

    let pseudotime: Vec<f32> = (0..num_cells).map(|_| runif.sample(&mut rng)).collect();

    let switch_strength: Vec<f32> = (0..num_genes)
        .map(|_| {
            let magnitude = rng.random_range(k_lo..k_hi);
            if rng.random::<bool>() {
                magnitude
            } else {
                -magnitude
            }
        })
        .collect();

    // keep switches off the boundary so both regimes are observed
    let switch_time: Vec<f32> = (0..num_genes)
        .map(|_| rng.random_range(0.1f32..0.9))
        .collect();

    let baseline: Vec<f32> = (0..num_genes)
        .map(|_| rng.random_range(b_lo..b_hi))
        .collect();

    let mut mu = Vec::with_capacity(num_cells * num_genes);
    let mut logits = Vec::with_capacity(num_cells * num_genes);
    let mut scale = Vec::with_capacity(num_cells * num_genes);
    for z in &pseudotime {
        for j in 0..num_genes {
            let m = baseline[j] * sigmoid(switch_strength[j] * (z - switch_time[j]));
            mu.push(m);
            logits.push(opts.dropout_intercept + opts.dropout_slope * m);
            scale.push((1.0 + opts.phi * m).sqrt());
        }
    }

    let shape = (num_cells, num_genes);
    let mu = Tensor::from_vec(mu, shape, device)?;
    let logits = Tensor::from_vec(logits, shape, device)?;
    let scale = Tensor::from_vec(scale, shape, device)?;

    let emission = DropoutNormal::from_logits(&logits, &mu, &scale)?;
    let expression = emission.sample(&mut rng)?.maximum(0f64)?;

    Ok(SimulatedTrajectory {
        expression,
        pseudotime,
        switch_strength,
        switch_time,
        baseline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_and_truth_vectors_line_up() {
        let opts = SimOptions {
            num_cells: 30,
            num_genes: 7,
            ..SimOptions::default()
        };
        let sim = simulate_trajectory(&opts, &Device::Cpu).unwrap();
        assert_eq!(sim.expression.dims(), &[30, 7]);
        assert_eq!(sim.pseudotime.len(), 30);
        assert_eq!(sim.switch_strength.len(), 7);
        assert_eq!(sim.switch_time.len(), 7);
        assert_eq!(sim.baseline.len(), 7);
        for z in &sim.pseudotime {
            assert!(*z > 0.0 && *z < 1.0);
        }
        for k in &sim.switch_strength {
            assert!(k.abs() >= 5.0 && k.abs() <= 15.0);
        }
    }

    #[test]
    fn expression_is_non_negative_with_some_zeros() {
        let sim = simulate_trajectory(&SimOptions::default(), &Device::Cpu).unwrap();
        let vals = sim
            .expression
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        let zeros = vals.iter().filter(|v| **v == 0.0).count();
        for v in &vals {
            assert!(*v >= 0.0);
        }
        assert!(zeros > 0, "expected at least a few dropout zeros");
        assert!(
            (zeros as f32) < 0.9 * vals.len() as f32,
            "almost everything dropped out"
        );
    }

    #[test]
    fn same_seed_reproduces_the_matrix() {
        let opts = SimOptions {
            num_cells: 25,
            num_genes: 5,
            rseed: 7,
            ..SimOptions::default()
        };
        let a = simulate_trajectory(&opts, &Device::Cpu).unwrap();
        let b = simulate_trajectory(&opts, &Device::Cpu).unwrap();
        assert_eq!(
            a.expression.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            b.expression.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
        assert_eq!(a.pseudotime, b.pseudotime);

        let c = simulate_trajectory(
            &SimOptions {
                rseed: 8,
                ..opts
            },
            &Device::Cpu,
        )
        .unwrap();
        assert_ne!(a.pseudotime, c.pseudotime);
    }

    #[test]
    fn degenerate_options_are_rejected() {
        let bad = SimOptions {
            num_cells: 0,
            ..SimOptions::default()
        };
        assert!(simulate_trajectory(&bad, &Device::Cpu).is_err());

        let bad = SimOptions {
            switch_strength: (6.0, 2.0),
            ..SimOptions::default()
        };
        assert!(simulate_trajectory(&bad, &Device::Cpu).is_err());
    }
}
