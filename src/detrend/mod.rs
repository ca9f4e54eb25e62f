//! Light-curve detrending.
//!
//! Segments are found at gaps and flux jumps, in-transit cadences are masked,
//! and a quasi-periodic GP (optionally with per-segment ramps) is fitted to the
//! out-of-transit flux and divided out. Known long cadence ringing modes can be
//! notch filtered beforehand.

pub mod gaps;
pub mod gp;
pub mod mask;
pub mod ringing;

pub use gaps::{Segmentation, identify_gaps};
pub use gp::{DetrendOptions, TrendFit, TrendModel, flatten_with_fallback, flatten_with_gp};
pub use mask::{make_transit_mask, mask_planets, mask_with_widths};
pub use ringing::filter_ringing;
