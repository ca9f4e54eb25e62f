use std::fs;

use ttv_curves::domain::Mission;
use ttv_curves::error::AppError;
use ttv_curves::io::load_catalog;

const CATALOG: &str = "\
koi_id,kic_id,npl,limbdark_1,limbdark_2,period,epoch,depth,duration,impact
K00137,8644288,3,0.45,0.2,14.8589,134.5,1500,4.8,0.3
K00137,8644288,3,0.45,0.2,7.6415,133.1,500,3.6,0.2
K00137,8644288,3,0.45,0.2,3.5041,131.2,120,2.4,0.995
";

#[test]
fn catalog_rows_become_sorted_planets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.csv");
    fs::write(&path, CATALOG).unwrap();

    let koi = Mission::Simulated.koi_id("S00137").unwrap();
    let entry = load_catalog(&path, &koi).unwrap();
    assert_eq!(entry.npl, 3);
    assert_eq!(entry.limbdark, [0.45, 0.2]);

    let planets = entry.initial_planets(131.5, 300.0).unwrap();
    let periods: Vec<f64> = planets.iter().map(|p| p.period).collect();
    assert_eq!(periods, vec![3.5041, 7.6415, 14.8589]);

    for p in &planets {
        assert!(p.epoch >= 131.5 && p.epoch <= 131.5 + p.period);
        assert_eq!(p.tts.len(), p.index.len());
        assert!(p.tts.windows(2).all(|w| (w[1] - w[0] - p.period).abs() < 1e-9));
        assert!(*p.tts.last().unwrap() < 300.0);
    }
    // b = 0.995 exceeds 1 - sqrt(depth) and is clamped to its square.
    let limit = 1.0 - 120e-6_f64.sqrt();
    assert!((planets[0].impact - limit * limit).abs() < 1e-12);
    assert!((planets[2].duration - 0.2).abs() < 1e-12);
}

#[test]
fn missing_target_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.csv");
    fs::write(&path, CATALOG).unwrap();
    let err = load_catalog(&path, "K00001").unwrap_err();
    assert!(matches!(err, AppError::Input(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(load_catalog(&dir.path().join("nope.csv"), "K00137").is_err());
}
