//! Scenario: `og config-check` validates the guard section and reports keys
//! nothing reads.
//!
//! # Invariants under test
//!
//! 1. A clean layered config passes and prints a stable `config_hash=`.
//! 2. Unknown keys are listed but tolerated by default.
//! 3. `--fail-unused` turns unknown keys into a non-zero exit naming
//!    CONFIG_UNUSED_KEYS.
//! 4. Invalid thresholds are rejected.

use predicates::prelude::*;
use std::fs;

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn clean_config_passes_with_stable_hash() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = write(
        &dir,
        "base.yaml",
        "guard:\n  store_timeout_ms: 100\n  circuit:\n    failure_threshold: 4\n",
    );

    let first = assert_cmd::Command::cargo_bin("og")?
        .args(["config-check", "--config", base.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_ok=true"))
        .stdout(predicate::str::contains("unused_keys=0"))
        .get_output()
        .stdout
        .clone();

    let second = assert_cmd::Command::cargo_bin("og")?
        .args(["config-check", "--config", base.as_str()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(first, second);
    Ok(())
}

#[test]
fn unused_keys_warn_by_default_and_fail_on_request() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = write(&dir, "base.yaml", "guard:\n  detection:\n    z_score_threshold: 3.5\n");
    let extra = write(&dir, "extra.yaml", "guard:\n  detection:\n    bogus_knob: 1\n");

    assert_cmd::Command::cargo_bin("og")?
        .args(["config-check", "--config", base.as_str(), "--config", extra.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "unused_key=/guard/detection/bogus_knob",
        ));

    assert_cmd::Command::cargo_bin("og")?
        .args([
            "config-check",
            "--config",
            base.as_str(),
            "--config",
            extra.as_str(),
            "--fail-unused",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS"));
    Ok(())
}

#[test]
fn invalid_thresholds_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = write(&dir, "base.yaml", "guard:\n  circuit:\n    cooldown_ms: 0\n");

    assert_cmd::Command::cargo_bin("og")?
        .args(["config-check", "--config", base.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cooldown_ms"));
    Ok(())
}
