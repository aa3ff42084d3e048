//! Scenario: config leaves the guard never reads are reported.
//!
//! # Invariants under test
//!
//! 1. `Warn` returns the report and still extracts the config.
//! 2. `Fail` rejects the config and names the offending pointer.
//! 3. Leaves outside `/guard` are unused too.

use og_config::{guard_config_from, load_layered_yaml_from_strings, UnusedKeyPolicy};

const YAML: &str = r#"
guard:
  store_timeout_ms: 100
  detection:
    price_deviaton_threshold: 0.2
dashboard:
  theme: dark
"#;

#[test]
fn warn_policy_reports_and_continues() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let (cfg, report) = guard_config_from(&loaded, UnusedKeyPolicy::Warn).unwrap();

    assert_eq!(cfg.store_timeout_ms, 100);
    // the misspelt key did not override anything
    assert_eq!(cfg.detection.price_deviation_threshold, 0.05);
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/dashboard/theme".to_string(),
            "/guard/detection/price_deviaton_threshold".to_string(),
        ]
    );
}

#[test]
fn fail_policy_rejects() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = guard_config_from(&loaded, UnusedKeyPolicy::Fail).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_UNUSED_KEYS"));
    assert!(msg.contains("price_deviaton_threshold"));
}
