//! Planet catalog ingest.
//!
//! The catalog is a CSV with one row per planet candidate:
//! `koi_id,kic_id,npl,limbdark_1,limbdark_2,period,epoch,depth,duration,impact`
//! with depth in ppm and duration in hours. Rows of other targets are ignored;
//! star-level fields must agree across the target's rows.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Planet;
use crate::error::AppError;

const STAR_COLUMNS: [&str; 5] = ["koi_id", "kic_id", "npl", "limbdark_1", "limbdark_2"];
const PLANET_COLUMNS: [&str; 5] = ["period", "epoch", "depth", "duration", "impact"];

/// Catalog parameters of one planet, converted to days and fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPlanet {
    pub period: f64,
    pub epoch: f64,
    pub depth: f64,
    pub duration: f64,
    pub impact: f64,
}

/// Every catalog row of one target.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub koi_id: String,
    pub kic_id: i64,
    pub npl: usize,
    pub limbdark: [f64; 2],
    pub planets: Vec<CatalogPlanet>,
}

impl CatalogEntry {
    /// Planets ordered by period, with the epoch moved into
    /// `[time_start, time_start + period]` and a linear ephemeris over the
    /// baseline.
    pub fn initial_planets(&self, time_start: f64, time_end: f64) -> Result<Vec<Planet>, AppError> {
        if time_start < 0.0 {
            return Err(AppError::input(format!(
                "observation baseline starts at negative time {time_start}"
            )));
        }
        let mut planets: Vec<Planet> = self
            .planets
            .iter()
            .map(|c| {
                let shift = ((time_start - c.epoch) / c.period).ceil();
                let epoch = c.epoch + shift * c.period;

                let max_impact = 1.0 - c.depth.sqrt();
                let impact = if c.impact > max_impact {
                    max_impact.powi(2)
                } else {
                    c.impact
                };

                let n = ((time_end - epoch) / c.period).ceil().max(0.0) as i64;
                let index: Vec<i64> = (0..n).collect();
                let tts: Vec<f64> = index.iter().map(|&i| epoch + c.period * i as f64).collect();
                Planet {
                    epoch,
                    period: c.period,
                    depth: c.depth,
                    duration: c.duration,
                    impact,
                    quality: vec![true; tts.len()],
                    overlap: vec![false; tts.len()],
                    tts,
                    index,
                }
            })
            .collect();
        planets.sort_by(|a, b| a.period.total_cmp(&b.period));
        Ok(planets)
    }
}

/// Load the catalog rows of `koi_id` from a CSV file.
pub fn load_catalog(path: &Path, koi_id: &str) -> Result<CatalogEntry, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open catalog '{}': {e}", path.display())))?;
    parse_catalog(file, koi_id)
}

/// Parse catalog CSV from any reader.
pub fn parse_catalog<R: Read>(reader: R, koi_id: &str) -> Result<CatalogEntry, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read catalog headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for name in STAR_COLUMNS.iter().chain(&PLANET_COLUMNS) {
        if !header_map.contains_key(*name) {
            return Err(AppError::input(format!("Missing required catalog column: `{name}`")));
        }
    }

    let mut star: Option<(i64, usize, [f64; 2])> = None;
    let mut planets = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::input(format!("catalog line {line}: {e}")))?;
        if get_required(&record, &header_map, "koi_id").map_err(|e| row_error(line, e))? != koi_id {
            continue;
        }

        let kic_id = parse_field::<i64>(&record, &header_map, "kic_id").map_err(|e| row_error(line, e))?;
        let npl = parse_field::<usize>(&record, &header_map, "npl").map_err(|e| row_error(line, e))?;
        let limbdark = [
            parse_finite(&record, &header_map, "limbdark_1").map_err(|e| row_error(line, e))?,
            parse_finite(&record, &header_map, "limbdark_2").map_err(|e| row_error(line, e))?,
        ];
        match star {
            None => star = Some((kic_id, npl, limbdark)),
            Some((k, n, ld)) => {
                let field = if k != kic_id {
                    Some("kic_id")
                } else if n != npl {
                    Some("npl")
                } else if ld[0] != limbdark[0] {
                    Some("limbdark_1")
                } else if ld[1] != limbdark[1] {
                    Some("limbdark_2")
                } else {
                    None
                };
                if let Some(field) = field {
                    return Err(AppError::input(format!(
                        "inconsistent `{field}` across catalog rows of {koi_id} (line {line})"
                    )));
                }
            }
        }

        let [period, epoch, depth, duration, impact] = PLANET_COLUMNS
            .map(|name| parse_finite(&record, &header_map, name).map_err(|e| row_error(line, e)));
        let (period, epoch, depth, duration, impact) = (period?, epoch?, depth?, duration?, impact?);
        if !(period > 0.0 && duration > 0.0 && depth > 0.0) {
            return Err(row_error(line, "period, depth and duration must be positive".to_string()));
        }
        planets.push(CatalogPlanet {
            period,
            epoch,
            depth: depth * 1e-6,
            duration: duration / 24.0,
            impact,
        });
    }

    let Some((kic_id, npl, limbdark)) = star else {
        return Err(AppError::input(format!("target {koi_id} not found in catalog")));
    };
    if npl != planets.len() {
        return Err(AppError::input(format!(
            "catalog lists npl = {npl} for {koi_id} but has {} rows",
            planets.len()
        )));
    }
    Ok(CatalogEntry {
        koi_id: koi_id.to_string(),
        kic_id,
        npl,
        limbdark,
        planets,
    })
}

fn row_error(line: usize, message: String) -> AppError {
    AppError::input(format!("catalog line {line}: {message}"))
}

pub(crate) fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM on the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

pub(crate) fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

pub(crate) fn parse_field<T: std::str::FromStr>(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<T, String> {
    let raw = get_required(record, header_map, name)?;
    raw.parse::<T>()
        .map_err(|_| format!("Invalid `{name}` value '{raw}'"))
}

pub(crate) fn parse_finite(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<f64, String> {
    let v: f64 = parse_field(record, header_map, name)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite `{name}` value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
koi_id,kic_id,npl,limbdark_1,limbdark_2,period,epoch,depth,duration,impact
K00137,8644288,2,0.45,0.2,14.86,134.5,1500,4.8,0.3
K00137,8644288,2,0.45,0.2,7.64,133.1,500,3.6,0.2
K00001,11446443,1,0.4,0.25,2.47,132.0,14000,1.7,0.95
";

    #[test]
    fn parses_target_rows_and_converts_units() {
        let entry = parse_catalog(CSV.as_bytes(), "K00137").unwrap();
        assert_eq!(entry.kic_id, 8644288);
        assert_eq!(entry.planets.len(), 2);
        assert!((entry.planets[0].depth - 1.5e-3).abs() < 1e-15);
        assert!((entry.planets[0].duration - 0.2).abs() < 1e-12);
    }

    #[test]
    fn inconsistent_or_missing_rows_are_input_errors() {
        let bad = CSV.replace("K00137,8644288,2,0.45,0.2,7.64", "K00137,8644288,2,0.46,0.2,7.64");
        assert!(matches!(parse_catalog(bad.as_bytes(), "K00137"), Err(AppError::Input(_))));
        let nan = CSV.replace("14.86", "nan");
        assert!(parse_catalog(nan.as_bytes(), "K00137").is_err());
        assert!(parse_catalog(CSV.as_bytes(), "K09999").is_err());
        let wrong_npl = CSV.replace("K00001,11446443,1", "K00001,11446443,2");
        assert!(parse_catalog(wrong_npl.as_bytes(), "K00001").is_err());
    }

    #[test]
    fn initial_planets_are_sorted_and_start_in_baseline() {
        let entry = parse_catalog(CSV.as_bytes(), "K00137").unwrap();
        let planets = entry.initial_planets(140.0, 200.0).unwrap();
        assert!(planets[0].period < planets[1].period);
        for p in &planets {
            assert!(p.epoch >= 140.0 && p.epoch <= 140.0 + p.period);
            assert!(*p.tts.last().unwrap() < 200.0);
            assert_eq!(p.index[0], 0);
        }
        assert!(entry.initial_planets(-1.0, 10.0).is_err());
    }

    #[test]
    fn grazing_impact_is_clamped() {
        let entry = parse_catalog(CSV.as_bytes(), "K00001").unwrap();
        let p = &entry.initial_planets(130.0, 140.0).unwrap()[0];
        let limit = 1.0 - 0.014_f64.sqrt();
        assert!((p.impact - limit * limit).abs() < 1e-12);
    }
}
