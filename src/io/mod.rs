//! Input/output helpers.
//!
//! - planet catalog CSV (`catalog`)
//! - published transit-time catalogs (`prior_ttvs`)
//! - raw per-quarter photometry CSV (`raw`)
//! - binary LiteCurve tables (`litecurve`)
//! - quick-TTV text files (`ttvs`)

pub mod catalog;
pub mod litecurve;
pub mod prior_ttvs;
pub mod raw;
pub mod ttvs;

pub use catalog::{CatalogEntry, CatalogPlanet, load_catalog, parse_catalog};
pub use litecurve::{TableHeader, read_litecurve, read_table, write_litecurve, write_table};
pub use prior_ttvs::{PriorTimes, apply_prior_ttvs, load_prior_ttvs, parse_prior_ttvs, smooth_prior};
pub use raw::{RawPhotometry, assemble, load_raw_photometry, parse_raw_csv};
pub use ttvs::{parse_quick_ttvs, quick_ttvs_path, read_quick_ttvs, save_quick_ttvs, write_quick_ttvs};
