//! Binary LiteCurve tables (`.ltc`).
//!
//! Layout:
//!
//! ```text
//! b"LTCV" | version: u8 | header_len: u32 LE | header (JSON) | columns (bincode)
//! ```
//!
//! The JSON header names the columns (`TIME, FLUX, ERROR, CADNO, QUARTER,
//! CHANNEL, MASK`) and carries run metadata; the payload stores them in that
//! order at full precision.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CadenceKind, LiteCurve};
use crate::error::AppError;

const MAGIC: &[u8; 4] = b"LTCV";
const VERSION: u8 = 1;
pub const COLUMNS: [&str; 7] = ["TIME", "FLUX", "ERROR", "CADNO", "QUARTER", "CHANNEL", "MASK"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableHeader {
    pub target: String,
    pub cadence: Option<CadenceKind>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub created: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct Columns {
    time: Vec<f64>,
    flux: Vec<f64>,
    error: Vec<f64>,
    cadno: Vec<i64>,
    quarter: Vec<i32>,
    channel: Vec<i32>,
    mask: Vec<bool>,
}

/// Serialize a light curve into any writer.
pub fn write_table<W: Write>(mut w: W, lc: &LiteCurve, target: &str) -> Result<(), AppError> {
    let header = TableHeader {
        target: target.to_string(),
        cadence: lc.cadence(),
        rows: lc.len(),
        columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        created: Utc::now(),
    };
    let header_bytes =
        serde_json::to_vec(&header).map_err(|e| AppError::io(format!("Failed to encode table header: {e}")))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| AppError::io("table header too large"))?;

    let columns = Columns {
        time: lc.time.clone(),
        flux: lc.flux.clone(),
        error: lc.error.clone(),
        cadno: lc.cadno.clone(),
        quarter: lc.quarter.clone(),
        channel: lc.channel.clone(),
        mask: lc.mask.clone(),
    };

    let io_err = |e: std::io::Error| AppError::io(format!("Failed to write table: {e}"));
    w.write_all(MAGIC).map_err(io_err)?;
    w.write_all(&[VERSION]).map_err(io_err)?;
    w.write_all(&header_len.to_le_bytes()).map_err(io_err)?;
    w.write_all(&header_bytes).map_err(io_err)?;
    bincode::serialize_into(&mut w, &columns)
        .map_err(|e| AppError::io(format!("Failed to encode table columns: {e}")))?;
    w.flush().map_err(io_err)
}

/// Deserialize a light curve; quality flags are not stored and read back as zero.
pub fn read_table<R: Read>(mut r: R) -> Result<(TableHeader, LiteCurve), AppError> {
    let io_err = |e: std::io::Error| AppError::io(format!("Failed to read table: {e}"));
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(io_err)?;
    if &magic != MAGIC {
        return Err(AppError::io("not a LiteCurve table (bad magic)"));
    }
    let mut version = [0u8; 1];
    r.read_exact(&mut version).map_err(io_err)?;
    if version[0] != VERSION {
        return Err(AppError::io(format!("unsupported table version {}", version[0])));
    }
    let mut len = [0u8; 4];
    r.read_exact(&mut len).map_err(io_err)?;
    let mut header_bytes = vec![0u8; u32::from_le_bytes(len) as usize];
    r.read_exact(&mut header_bytes).map_err(io_err)?;
    let header: TableHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| AppError::io(format!("Invalid table header: {e}")))?;

    let columns: Columns = bincode::deserialize_from(&mut r)
        .map_err(|e| AppError::io(format!("Invalid table columns: {e}")))?;
    let n = columns.time.len();
    let lc = LiteCurve {
        time: columns.time,
        flux: columns.flux,
        error: columns.error,
        cadno: columns.cadno,
        quarter: columns.quarter,
        channel: columns.channel,
        mask: columns.mask,
        quality: vec![0; n],
    };
    if n != header.rows {
        return Err(AppError::io(format!(
            "table header declares {} rows but payload holds {n}",
            header.rows
        )));
    }
    lc.validate()?;
    Ok((header, lc))
}

pub fn write_litecurve(path: &Path, lc: &LiteCurve, target: &str) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
    write_table(BufWriter::new(file), lc, target)
}

pub fn read_litecurve(path: &Path) -> Result<(TableHeader, LiteCurve), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open '{}': {e}", path.display())))?;
    read_table(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_foreign_bytes() {
        let err = read_table(&b"FITS\x01\x00\x00\x00\x00"[..]).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn header_names_columns() {
        let lc = LiteCurve {
            time: vec![1.0, 1.02],
            flux: vec![1.0, 0.999],
            error: vec![1e-4; 2],
            cadno: vec![7, 8],
            quarter: vec![2; 2],
            channel: vec![5; 2],
            mask: vec![false, true],
            quality: vec![0; 2],
        };
        let mut buf = Vec::new();
        write_table(&mut buf, &lc, "K00137").unwrap();
        let (header, back) = read_table(buf.as_slice()).unwrap();
        assert_eq!(header.columns, COLUMNS.to_vec());
        assert_eq!(header.rows, 2);
        assert_eq!(header.cadence, Some(CadenceKind::Long));
        assert_eq!(back.mask, lc.mask);
    }
}
