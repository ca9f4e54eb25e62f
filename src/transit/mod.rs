//! Transit light-curve model.
//!
//! Planets follow circular orbits parameterised by their total transit
//! duration; the star is quadratically limb darkened. Transit centres are
//! given explicitly so the same model serves linear ephemerides and
//! per-transit timing fits.

pub mod limbdark;
pub mod model;
pub mod orbit;

pub use limbdark::{QuadraticLimbDarkening, overlap_fraction, transit_depth};
pub use model::{PlanetTransits, TransitModel};
pub use orbit::CircularOrbit;
