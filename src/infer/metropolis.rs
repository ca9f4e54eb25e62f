//! Adaptive random-walk Metropolis sampler.
//!
//! During tuning the proposal covariance is diagonal with per-coordinate
//! widths learned from the chain's own history, and a global scale is steered
//! toward the requested acceptance rate. Tuning draws are discarded. Chains
//! are independent (seeded `seed + chain`) and run in parallel.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal, Uniform};
use rayon::prelude::*;
use tracing::debug;

use super::{Model, SampleSettings, Trace};
use crate::error::FitError;

/// Tuning window between proposal updates.
const ADAPT_WINDOW: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct Metropolis;

struct ChainOutput {
    draws: Vec<Vec<f64>>,
    accepted: usize,
}

impl Metropolis {
    pub fn run(&self, model: &dyn Model, start: &[f64], settings: &SampleSettings) -> Result<Trace, FitError> {
        if !model.log_prob(start).is_finite() {
            return Err(FitError::NonFiniteStart);
        }
        let chains = settings.chains.max(1);
        let outputs: Vec<ChainOutput> = (0..chains)
            .into_par_iter()
            .map(|chain| run_chain(model, start, settings, settings.seed.wrapping_add(chain as u64)))
            .collect();

        let total = (chains * settings.draws).max(1);
        let accepted: usize = outputs.iter().map(|o| o.accepted).sum();
        let draws: Vec<Vec<f64>> = outputs.into_iter().flat_map(|o| o.draws).collect();
        let acceptance = accepted as f64 / total as f64;
        debug!(chains, draws = draws.len(), acceptance, "metropolis sampling done");

        if draws.iter().any(|d| d.iter().any(|v| !v.is_finite())) {
            return Err(FitError::numerical("sampler produced non-finite draws"));
        }
        Ok(Trace { draws, acceptance })
    }
}

fn run_chain(model: &dyn Model, start: &[f64], settings: &SampleSettings, seed: u64) -> ChainOutput {
    let mut rng = StdRng::seed_from_u64(seed);
    let unit = Uniform::new(0.0_f64, 1.0);
    let dim = start.len();

    let mut scales: Vec<f64> = model
        .scales()
        .into_iter()
        .map(|s| if s > 0.0 { s } else { 0.1 })
        .collect();
    scales.resize(dim, 0.1);
    let mut global = 2.38 / (dim.max(1) as f64).sqrt();

    let mut x = start.to_vec();
    let mut lp = model.log_prob(&x);
    let mut proposal = vec![0.0; dim];

    // Running moments for the diagonal proposal (Welford).
    let mut n_hist = 0.0;
    let mut mean = vec![0.0; dim];
    let mut m2 = vec![0.0; dim];
    let mut window_accepts = 0;

    let mut draws = Vec::with_capacity(settings.draws);
    let mut accepted = 0;

    for step in 0..settings.tune + settings.draws {
        for i in 0..dim {
            let z: f64 = StandardNormal.sample(&mut rng);
            proposal[i] = x[i] + global * scales[i] * z;
        }
        let lp_new = model.log_prob(&proposal);
        let accept = lp_new.is_finite() && unit.sample(&mut rng).ln() < lp_new - lp;
        if accept {
            x.copy_from_slice(&proposal);
            lp = lp_new;
        }

        if step < settings.tune {
            window_accepts += usize::from(accept);
            n_hist += 1.0;
            for i in 0..dim {
                let delta = x[i] - mean[i];
                mean[i] += delta / n_hist;
                m2[i] += delta * (x[i] - mean[i]);
            }
            if (step + 1) % ADAPT_WINDOW == 0 {
                let rate = window_accepts as f64 / ADAPT_WINDOW as f64;
                global *= (rate - settings.target_accept).exp();
                window_accepts = 0;
                // Switch to empirical widths once enough history exists.
                if step + 1 >= 4 * ADAPT_WINDOW {
                    for i in 0..dim {
                        let sd = (m2[i] / n_hist).sqrt();
                        if sd.is_finite() && sd > 0.0 {
                            scales[i] = sd;
                        }
                    }
                }
            }
        } else {
            accepted += usize::from(accept);
            draws.push(x.clone());
        }
    }

    ChainOutput { draws, accepted }
}
