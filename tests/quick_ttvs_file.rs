use std::fs;

use ttv_curves::domain::QuickTtvs;
use ttv_curves::io::{quick_ttvs_path, read_quick_ttvs, save_quick_ttvs};

#[test]
fn quick_ttvs_are_written_per_planet() {
    let dir = tempfile::tempdir().unwrap();
    let ttvs = QuickTtvs {
        index: vec![0, 1, 2, 4],
        independent: vec![134.501_234_567, 149.36, 164.2189, 193.9381],
        quick: vec![134.501_2, 149.359_8, 164.219, 193.937_5],
        outlier_prob: vec![0.01, 0.02, 0.015, 0.99],
        outlier: vec![false, false, false, true],
    };
    let path = quick_ttvs_path(dir.path(), "K00137", 0);
    assert!(path.ends_with("K00137_00_quick.ttvs"));
    save_quick_ttvs(&path, &ttvs).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "0\t134.50123457\t134.50120000\t0.01000000\t0");
    assert!(lines[3].starts_with("4\t") && lines[3].ends_with("\t1"));

    let back = read_quick_ttvs(&path).unwrap();
    assert_eq!(back.index, ttvs.index);
    assert_eq!(back.outlier, ttvs.outlier);
    for (a, b) in back.quick.iter().zip(&ttvs.quick) {
        assert!((a - b).abs() < 1e-8);
    }
}
