use ttv_curves::domain::{CadenceKind, LiteCurve, SCIT};
use ttv_curves::io::{read_litecurve, write_litecurve};

fn short_cadence(n: usize) -> LiteCurve {
    let cadno: Vec<i64> = (0..n as i64).map(|i| 1_000 + i + i / 50).collect();
    LiteCurve {
        time: cadno.iter().map(|&c| 131.512_345_678_9 + c as f64 * SCIT).collect(),
        flux: (0..n).map(|i| 1.0 + 1e-4 * (0.37 * i as f64).sin()).collect(),
        error: (0..n).map(|i| 2.5e-4 + 1e-9 * i as f64).collect(),
        cadno,
        quarter: vec![9; n],
        channel: vec![44; n],
        mask: (0..n).map(|i| i % 7 == 0).collect(),
        quality: vec![0; n],
    }
}

#[test]
fn stored_curve_reloads_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("K00137_sc_detrended.ltc");
    let lc = short_cadence(500);
    write_litecurve(&path, &lc, "K00137").unwrap();

    let (header, back) = read_litecurve(&path).unwrap();
    assert_eq!(header.target, "K00137");
    assert_eq!(header.cadence, Some(CadenceKind::Short));
    assert_eq!(header.rows, 500);
    assert_eq!(back, lc);
    for (a, b) in back.flux.iter().zip(&lc.flux) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn truncated_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cut.ltc");
    write_litecurve(&path, &short_cadence(50), "K00137").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(read_litecurve(&path).is_err());
}
