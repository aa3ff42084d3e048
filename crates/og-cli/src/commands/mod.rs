//! Command handler modules for og-cli.
//!
//! Shared config loading lives here; `replay` owns the JSONL driver.

pub mod replay;

use anyhow::{Context, Result};
use og_config::{GuardConfig, UnusedKeyPolicy, UnusedKeyReport};

/// Load the layered config (if any paths were given) and extract the guard
/// section. No paths means defaults.
pub fn load_guard_config(
    paths: &[String],
    policy: UnusedKeyPolicy,
) -> Result<(GuardConfig, UnusedKeyReport, Option<String>)> {
    if paths.is_empty() {
        return Ok((GuardConfig::default(), UnusedKeyReport::default(), None));
    }

    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = og_config::load_layered_yaml(&path_refs)
        .with_context(|| format!("load config layers: {}", paths.join(", ")))?;
    let (cfg, report) = og_config::guard_config_from(&loaded, policy)?;
    Ok((cfg, report, Some(loaded.config_hash)))
}

/// Execute `og config-check`.
pub fn config_check(paths: &[String], fail_unused: bool) -> Result<()> {
    let policy = if fail_unused {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let (_cfg, report, hash) = load_guard_config(paths, policy)?;

    println!("config_ok=true");
    if let Some(h) = hash {
        println!("config_hash={h}");
    }
    println!("unused_keys={}", report.unused_leaf_pointers.len());
    for p in &report.unused_leaf_pointers {
        println!("unused_key={p}");
    }
    Ok(())
}
