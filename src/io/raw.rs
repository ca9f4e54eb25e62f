//! Raw photometry ingest.
//!
//! Each `<target>_*.csv` file in the data directory holds rows with
//! `time,flux,flux_err,cadno,quarter,channel,quality`. Rows are grouped per
//! file and quarter, rows with non-finite values are dropped, and each group
//! is normalized by its median flux. Groups of the same quarter and cadence
//! are stitched in cadence-number order. A long cadence quarter is only kept
//! when no short cadence data exist for it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::catalog::{build_header_map, parse_field};
use crate::domain::{CadenceKind, LiteCurve};
use crate::error::AppError;
use crate::math::stats::median;

const COLUMNS: [&str; 7] = ["time", "flux", "flux_err", "cadno", "quarter", "channel", "quality"];

/// Per-quarter light curves, ascending by quarter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPhotometry {
    pub short: Vec<LiteCurve>,
    pub long: Vec<LiteCurve>,
}

impl RawPhotometry {
    pub fn is_empty(&self) -> bool {
        self.short.is_empty() && self.long.is_empty()
    }

    pub fn curves(&self, cadence: CadenceKind) -> &[LiteCurve] {
        match cadence {
            CadenceKind::Short => &self.short,
            CadenceKind::Long => &self.long,
        }
    }

    /// `(first, last)` time over every quarter.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.short
            .iter()
            .chain(&self.long)
            .flat_map(|lc| lc.time.iter().copied())
            .fold(None, |acc, t| match acc {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
    }
}

/// Parse one CSV source into per-quarter, median-normalized curves.
pub fn parse_raw_csv<R: Read>(reader: R, source: &str) -> Result<Vec<LiteCurve>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("{source}: failed to read headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    if let Some(missing) = COLUMNS.iter().find(|c| !header_map.contains_key(**c)) {
        return Err(AppError::input(format!("{source}: missing column `{missing}`")));
    }

    let mut groups: BTreeMap<i32, LiteCurve> = BTreeMap::new();
    let mut dropped = 0usize;
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::input(format!("{source} line {line}: {e}")))?;
        let row_err = |e: String| AppError::input(format!("{source} line {line}: {e}"));

        let time: f64 = parse_field(&record, &header_map, "time").map_err(row_err)?;
        let flux: f64 = parse_field(&record, &header_map, "flux").map_err(row_err)?;
        let error: f64 = parse_field(&record, &header_map, "flux_err").map_err(row_err)?;
        if !(time.is_finite() && flux.is_finite() && error.is_finite()) {
            dropped += 1;
            continue;
        }
        let quarter: i32 = parse_field(&record, &header_map, "quarter").map_err(row_err)?;
        let lc = groups.entry(quarter).or_default();
        lc.time.push(time);
        lc.flux.push(flux);
        lc.error.push(error);
        lc.cadno.push(parse_field(&record, &header_map, "cadno").map_err(row_err)?);
        lc.quarter.push(quarter);
        lc.channel.push(parse_field(&record, &header_map, "channel").map_err(row_err)?);
        lc.quality.push(parse_field(&record, &header_map, "quality").map_err(row_err)?);
        lc.mask.push(false);
    }
    if dropped > 0 {
        debug!(source, dropped, "rows with non-finite values dropped");
    }

    Ok(groups
        .into_values()
        .map(|lc| {
            let level = median(&lc.flux);
            if level.is_finite() && level != 0.0 {
                let scale = vec![level; lc.len()];
                lc.normalized_by(&scale)
            } else {
                lc
            }
        })
        .collect())
}

/// Rows sorted by cadence number, duplicates removed.
fn sorted_unique(lc: &LiteCurve) -> LiteCurve {
    fn reorder<T: Copy>(col: &[T], order: &[usize]) -> Vec<T> {
        order.iter().map(|&i| col[i]).collect()
    }
    let mut order: Vec<usize> = (0..lc.len()).collect();
    order.sort_by_key(|&i| lc.cadno[i]);
    order.dedup_by_key(|i| lc.cadno[*i]);
    LiteCurve {
        time: reorder(&lc.time, &order),
        flux: reorder(&lc.flux, &order),
        error: reorder(&lc.error, &order),
        cadno: reorder(&lc.cadno, &order),
        quarter: reorder(&lc.quarter, &order),
        channel: reorder(&lc.channel, &order),
        mask: reorder(&lc.mask, &order),
        quality: reorder(&lc.quality, &order),
    }
}

/// Group per-quarter pieces by cadence and quarter and stitch them.
pub fn assemble(pieces: Vec<LiteCurve>) -> Result<RawPhotometry, AppError> {
    let mut grouped: BTreeMap<(CadenceKind, i32), Vec<LiteCurve>> = BTreeMap::new();
    for lc in pieces {
        let (Some(cadence), Some(&quarter)) = (lc.cadence(), lc.quarter.first()) else {
            warn!(rows = lc.len(), "quarter piece too short to infer its cadence, skipped");
            continue;
        };
        grouped.entry((cadence, quarter)).or_default().push(lc);
    }

    let mut raw = RawPhotometry::default();
    for ((cadence, quarter), mut parts) in grouped {
        parts.sort_by_key(|p| p.cadno.iter().copied().min().unwrap_or(i64::MAX));
        let lc = sorted_unique(&LiteCurve::stitch(&parts));
        lc.validate()?;
        match cadence {
            CadenceKind::Short => raw.short.push(lc),
            CadenceKind::Long => raw.long.push(lc),
        }
        debug!(quarter, cadence = cadence.label(), "quarter assembled");
    }

    let short_quarters: Vec<i32> = raw.short.iter().filter_map(|lc| lc.quarter.first().copied()).collect();
    raw.long.retain(|lc| {
        lc.quarter
            .first()
            .is_some_and(|q| !short_quarters.contains(q))
    });
    Ok(raw)
}

fn source_files(dir: &Path, target: &str) -> Result<Vec<PathBuf>, AppError> {
    let prefix = format!("{target}_");
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::io(format!("Failed to list data directory '{}': {e}", dir.display())))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|e| e == "csv")
                && p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Load every raw photometry file of `target` from `dir`.
pub fn load_raw_photometry(dir: &Path, target: &str) -> Result<RawPhotometry, AppError> {
    let files = source_files(dir, target)?;
    let mut pieces = Vec::new();
    for path in &files {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("Failed to open '{}': {e}", path.display())))?;
        pieces.extend(parse_raw_csv(file, &path.display().to_string())?);
    }
    let raw = assemble(pieces)?;
    if raw.is_empty() {
        return Err(AppError::data(format!(
            "no photometry for {target} in '{}'",
            dir.display()
        )));
    }
    info!(
        files = files.len(),
        short_quarters = raw.short.len(),
        long_quarters = raw.long.len(),
        "raw photometry loaded"
    );
    Ok(raw)
}
