//! Quick-TTV text files.
//!
//! One tab-delimited row per well-covered transit:
//! `index  independent  quick  outlier_prob  outlier` (`%d %.8f %.8f %.8f %d`).

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::domain::QuickTtvs;
use crate::error::AppError;

/// `<dir>/<target>_<NN>_quick.ttvs`
pub fn quick_ttvs_path(dir: &Path, target: &str, planet: usize) -> PathBuf {
    dir.join(format!("{target}_{planet:02}_quick.ttvs"))
}

pub fn write_quick_ttvs<W: Write>(mut w: W, ttvs: &QuickTtvs) -> Result<(), AppError> {
    let io_err = |e: std::io::Error| AppError::io(format!("Failed to write quick TTVs: {e}"));
    for i in 0..ttvs.index.len() {
        writeln!(
            w,
            "{}\t{:.8}\t{:.8}\t{:.8}\t{}",
            ttvs.index[i],
            ttvs.independent[i],
            ttvs.quick[i],
            ttvs.outlier_prob[i],
            u8::from(ttvs.outlier[i]),
        )
        .map_err(io_err)?;
    }
    w.flush().map_err(io_err)
}

pub fn save_quick_ttvs(path: &Path, ttvs: &QuickTtvs) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
    write_quick_ttvs(BufWriter::new(file), ttvs)
}

pub fn read_quick_ttvs(path: &Path) -> Result<QuickTtvs, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to read '{}': {e}", path.display())))?;
    parse_quick_ttvs(file)
}

/// `index independent quick outlier_prob outlier`
type Row = (i64, f64, f64, f64, u8);

pub fn parse_quick_ttvs<R: Read>(reader: R) -> Result<QuickTtvs, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut out = QuickTtvs {
        index: Vec::new(),
        independent: Vec::new(),
        quick: Vec::new(),
        outlier_prob: Vec::new(),
        outlier: Vec::new(),
    };
    for (n, result) in reader.deserialize::<Row>().enumerate() {
        let (index, independent, quick, prob, flag) =
            result.map_err(|e| AppError::input(format!("quick TTV line {}: {e}", n + 1)))?;
        out.index.push(index);
        out.independent.push(independent);
        out.quick.push(quick);
        out.outlier_prob.push(prob);
        out.outlier.push(flag != 0);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_use_fixed_precision() {
        let ttvs = QuickTtvs {
            index: vec![0, 3],
            independent: vec![131.5, 175.123_456_789],
            quick: vec![131.500_01, 175.123_4],
            outlier_prob: vec![0.01, 0.97],
            outlier: vec![false, true],
        };
        let mut buf = Vec::new();
        write_quick_ttvs(&mut buf, &ttvs).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "0\t131.50000000\t131.50001000\t0.01000000\t0\n3\t175.12345679\t175.12340000\t0.97000000\t1\n"
        );
        assert_eq!(quick_ttvs_path(Path::new("out"), "K00137", 1), Path::new("out/K00137_01_quick.ttvs"));

        let back = parse_quick_ttvs(text.as_bytes()).unwrap();
        assert_eq!(back.index, ttvs.index);
        assert_eq!(back.outlier, ttvs.outlier);
        assert!((back.independent[1] - 175.123_456_79).abs() < 1e-12);
        assert!(parse_quick_ttvs("1\t2.0\t3.0\n".as_bytes()).is_err());
        assert!(parse_quick_ttvs("1\t2.0\t3.0\tx\t0\n".as_bytes()).is_err());
    }
}
