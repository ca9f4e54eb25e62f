//! Transit fitting.
//!
//! Responsibilities:
//!
//! - flag well-covered and overlapping transits
//! - collect near-transit photometry per quarter
//! - fit a global transit shape (ShapeFitter)
//! - time each transit by template cross-correlation (SlideTTVFitter)
//! - refit transits the cross-correlation could not time (IndependentTTVFitter)

pub mod independent;
pub mod quality;
pub mod quarters;
pub mod shape;
pub mod slide;

pub use independent::*;
pub use quality::*;
pub use quarters::*;
pub use shape::*;
pub use slide::*;

use crate::domain::Planet;
use crate::math::poly::fit_ephemeris;

/// Transit times of one planet on a subset of its transits.
///
/// `error` is NaN where no uncertainty is available.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitTimes {
    pub index: Vec<i64>,
    pub tts: Vec<f64>,
    pub error: Vec<f64>,
}

impl TransitTimes {
    /// Current times of the planet's well-covered transits.
    pub fn good_transits(planet: &Planet) -> Self {
        let keep: Vec<usize> = (0..planet.len()).filter(|&i| planet.quality[i]).collect();
        Self {
            index: keep.iter().map(|&i| planet.index[i]).collect(),
            tts: keep.iter().map(|&i| planet.tts[i]).collect(),
            error: vec![f64::NAN; keep.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.tts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tts.is_empty()
    }

    /// Best-fit linear ephemeris evaluated at `index`.
    pub fn linear_ephemeris(&self, index: &[i64]) -> Option<Vec<f64>> {
        let (epoch, period) = fit_ephemeris(&self.index, &self.tts)?;
        Some(index.iter().map(|&i| epoch + period * i as f64).collect())
    }
}
