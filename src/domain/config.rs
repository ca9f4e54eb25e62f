//! Run configuration.
//!
//! Every tunable of the pipeline lives here. Values come from built-in
//! defaults, then an optional JSON file, then CLI flags.

use serde::{Deserialize, Serialize};

use super::types::{DEFAULT_QUALITY_BITMASK, KernelChoice};
use crate::error::AppError;
use crate::infer::SampleSettings;

/// Posterior sampling budget for O-C models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub tune: usize,
    pub draws: usize,
    pub chains: usize,
    pub target_accept: f64,
    /// Draws used when summarising derived quantities (posterior medians).
    pub max_prediction_draws: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            tune: 4000,
            draws: 2000,
            chains: 2,
            target_accept: 0.3,
            max_prediction_draws: 400,
        }
    }
}

impl SamplingConfig {
    pub fn settings(&self, seed: u64) -> SampleSettings {
        SampleSettings {
            tune: self.tune,
            draws: self.draws,
            chains: self.chains,
            target_accept: self.target_accept,
            seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Raw photometry preparation.
    pub quality_bitmask: u32,
    pub clip_kernel: usize,
    pub clip_sigma: f64,

    // Detrending.
    pub jump_tolerance: f64,
    pub min_rotation_period: f64,
    pub kernel: KernelChoice,
    pub correct_ramp: bool,
    /// Known long cadence ringing frequencies (1/day); empty disables the filter.
    pub ringing_frequencies: Vec<f64>,
    pub ringing_bandwidth: f64,

    // Transit timing.
    /// Half-width of the photometry window around each transit (durations).
    pub slide_window: f64,
    /// Half-width of the template search around each transit (durations).
    pub slide_search: f64,
    pub chisq_smoothing: usize,
    pub max_delta_chisq: usize,
    /// Slide fits with uncertainty above this multiple of the median are rejected.
    pub slide_error_factor: f64,

    // O-C model selection.
    pub omc_outlier_sigma: f64,
    pub fap_single_planet: f64,
    pub fap_multi_planet: f64,
    pub fap_keep: f64,

    // Reconciliation.
    pub reconcile_sigma: f64,
    /// Minimum surviving cadence fraction for a quarter to be re-detrended.
    pub min_quarter_fraction: f64,

    /// Offset (days) converting prior TTV catalog times to mission time.
    pub prior_ttv_time_offset: f64,

    pub sampling: SamplingConfig,
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality_bitmask: DEFAULT_QUALITY_BITMASK,
            clip_kernel: 13,
            clip_sigma: 5.0,
            jump_tolerance: 5.0,
            min_rotation_period: 1.0,
            kernel: KernelChoice::Rotation,
            correct_ramp: true,
            ringing_frequencies: Vec::new(),
            ringing_bandwidth: 0.1,
            slide_window: 2.5,
            slide_search: 1.0,
            chisq_smoothing: 7,
            max_delta_chisq: 9,
            slide_error_factor: 8.0,
            omc_outlier_sigma: 5.0,
            fap_single_planet: 0.1,
            fap_multi_planet: 0.99,
            fap_keep: 0.1,
            reconcile_sigma: 5.0,
            min_quarter_fraction: 0.1,
            prior_ttv_time_offset: 67.0,
            sampling: SamplingConfig::default(),
            seed: 42,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        let config: PipelineConfig =
            serde_json::from_str(text).map_err(|e| AppError::input(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("clip_sigma", self.clip_sigma),
            ("jump_tolerance", self.jump_tolerance),
            ("min_rotation_period", self.min_rotation_period),
            ("ringing_bandwidth", self.ringing_bandwidth),
            ("slide_window", self.slide_window),
            ("slide_search", self.slide_search),
            ("slide_error_factor", self.slide_error_factor),
            ("omc_outlier_sigma", self.omc_outlier_sigma),
            ("reconcile_sigma", self.reconcile_sigma),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AppError::input(format!("{name} must be positive, got {value}")));
            }
        }
        if self.slide_search >= self.slide_window {
            return Err(AppError::input("slide_search must be narrower than slide_window"));
        }
        if self.ringing_frequencies.iter().any(|f| !(f.is_finite() && *f > 0.0)) {
            return Err(AppError::input("ringing frequencies must be positive"));
        }
        if !(0.0..1.0).contains(&self.min_quarter_fraction) {
            return Err(AppError::input("min_quarter_fraction must lie in [0, 1)"));
        }
        if self.sampling.draws == 0 || self.sampling.chains == 0 {
            return Err(AppError::input("sampling needs at least one draw and one chain"));
        }
        if !(self.sampling.target_accept > 0.0 && self.sampling.target_accept < 1.0) {
            return Err(AppError::input("target_accept must lie in (0, 1)"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PipelineConfig::from_json(r#"{"jump_tolerance": 4.0, "sampling": {"draws": 10}}"#).unwrap();
        assert_eq!(cfg.jump_tolerance, 4.0);
        assert_eq!(cfg.sampling.draws, 10);
        assert_eq!(cfg.sampling.tune, SamplingConfig::default().tune);
        assert_eq!(cfg.quality_bitmask, DEFAULT_QUALITY_BITMASK);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(PipelineConfig::from_json(r#"{"clip_sigma": -1}"#).is_err());
        assert!(PipelineConfig::from_json(r#"{"kernel": "matern"}"#).is_err());
        assert!(PipelineConfig::from_json(r#"{"slide_search": 3.0}"#).is_err());
    }
}
