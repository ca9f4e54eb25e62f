//! Posterior optimization and sampling.
//!
//! Every probabilistic model in the pipeline (GP detrender, transit shape,
//! per-transit offsets, O-C trends, residual mixtures) implements [`Model`]:
//! a log-posterior over a flat vector of unconstrained parameters, organised
//! into named blocks by a [`ParamLayout`]. Fitting code never talks to a
//! concrete optimizer; it goes through the [`Solver`] capability:
//!
//! - `optimize(model, start, vars)` → MAP point, moving only `vars`
//! - `sample(model, start, settings)` → posterior draws
//!
//! [`Engine`] is the built-in implementation (adaptive Nelder-Mead plus
//! adaptive random-walk Metropolis).

pub mod layout;
pub mod metropolis;
pub mod nelder_mead;
pub mod prior;

pub use layout::ParamLayout;
pub use metropolis::Metropolis;
pub use nelder_mead::NelderMead;

use crate::error::FitError;
use crate::math::stats::nanmedian;

/// A log-posterior over unconstrained parameters.
pub trait Model: Sync {
    fn layout(&self) -> &ParamLayout;

    /// Default starting point (prior centres).
    fn initial_point(&self) -> Vec<f64>;

    /// Log-posterior up to a constant; `-inf`/NaN marks invalid points.
    fn log_prob(&self, theta: &[f64]) -> f64;

    /// Characteristic step size per coordinate.
    fn scales(&self) -> Vec<f64> {
        vec![0.1; self.layout().dim()]
    }
}

/// Which coordinates an optimization pass may move.
#[derive(Debug, Clone, Copy)]
pub enum Vars<'a> {
    All,
    Blocks(&'a [&'a str]),
}

impl Vars<'_> {
    pub fn resolve(&self, layout: &ParamLayout) -> Result<Vec<usize>, FitError> {
        match self {
            Vars::All => Ok((0..layout.dim()).collect()),
            Vars::Blocks(names) => layout.indices(names),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSettings {
    pub tune: usize,
    pub draws: usize,
    pub chains: usize,
    pub target_accept: f64,
    pub seed: u64,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            tune: 2000,
            draws: 1000,
            chains: 2,
            target_accept: 0.3,
            seed: 42,
        }
    }
}

/// Posterior draws pooled over chains.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub draws: Vec<Vec<f64>>,
    pub acceptance: f64,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Posterior median of a single coordinate.
    pub fn median(&self, index: usize) -> f64 {
        let col: Vec<f64> = self.draws.iter().map(|d| d[index]).collect();
        nanmedian(&col)
    }

    /// Element-wise posterior median of a derived quantity, evaluated on at
    /// most `max_draws` evenly thinned draws.
    pub fn median_of<F>(&self, max_draws: usize, f: F) -> Vec<f64>
    where
        F: Fn(&[f64]) -> Vec<f64> + Sync,
    {
        use rayon::prelude::*;

        if self.draws.is_empty() {
            return Vec::new();
        }
        let stride = self.draws.len().div_ceil(max_draws.max(1));
        let values: Vec<Vec<f64>> = self
            .draws
            .par_iter()
            .step_by(stride)
            .map(|d| f(d))
            .collect();
        let width = values[0].len();
        (0..width)
            .map(|k| {
                let col: Vec<f64> = values.iter().map(|v| v[k]).collect();
                nanmedian(&col)
            })
            .collect()
    }
}

/// MAP optimization and posterior sampling.
pub trait Solver: Sync {
    fn optimize(&self, model: &dyn Model, start: &[f64], vars: Vars<'_>) -> Result<Vec<f64>, FitError>;

    fn sample(&self, model: &dyn Model, start: &[f64], settings: &SampleSettings) -> Result<Trace, FitError>;

    /// Run a staged optimization: each stage moves a subset of blocks,
    /// starting from the previous stage's result.
    fn optimize_stages(
        &self,
        model: &dyn Model,
        start: &[f64],
        stages: &[Vars<'_>],
    ) -> Result<Vec<f64>, FitError> {
        let mut theta = start.to_vec();
        for vars in stages {
            theta = self.optimize(model, &theta, *vars)?;
        }
        Ok(theta)
    }
}

/// Built-in solver.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    pub optimizer: NelderMead,
    pub sampler: Metropolis,
}

impl Solver for Engine {
    fn optimize(&self, model: &dyn Model, start: &[f64], vars: Vars<'_>) -> Result<Vec<f64>, FitError> {
        let indices = vars.resolve(model.layout())?;
        self.optimizer.minimize_subset(model, start, &indices)
    }

    fn sample(&self, model: &dyn Model, start: &[f64], settings: &SampleSettings) -> Result<Trace, FitError> {
        self.sampler.run(model, start, settings)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::infer::prior::normal_lnpdf;

    /// Independent normals `x_i ~ N(mu_i, sd_i)`, one block per coordinate.
    pub struct Gaussian {
        pub layout: ParamLayout,
        pub mu: Vec<f64>,
        pub sd: Vec<f64>,
    }

    impl Gaussian {
        pub fn new(mu: &[f64], sd: &[f64]) -> Self {
            let mut layout = ParamLayout::new();
            for i in 0..mu.len() {
                layout.push(format!("x{i}"), 1);
            }
            Self {
                layout,
                mu: mu.to_vec(),
                sd: sd.to_vec(),
            }
        }
    }

    impl Model for Gaussian {
        fn layout(&self) -> &ParamLayout {
            &self.layout
        }

        fn initial_point(&self) -> Vec<f64> {
            vec![0.0; self.mu.len()]
        }

        fn log_prob(&self, theta: &[f64]) -> f64 {
            theta
                .iter()
                .zip(self.mu.iter().zip(&self.sd))
                .map(|(x, (m, s))| normal_lnpdf(*x, *m, *s))
                .sum()
        }

        fn scales(&self) -> Vec<f64> {
            self.sd.clone()
        }
    }
}
