use crate::LoadedConfig;
use anyhow::{bail, Context, Result};
use og_circuit::{CircuitConfig, CircuitConfigError};
use og_spoof::{DetectionConfig, DetectionConfigError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// JSON pointer of the guard section inside the merged document.
pub const GUARD_POINTER: &str = "/guard";

// ---------------------------------------------------------------------------
// Typed guard config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub detection: DetectionConfig,
    pub circuit: CircuitConfig,
    /// Deadline for every coordination store call.
    pub store_timeout_ms: u64,
    /// Alerts retained in memory; the oldest is evicted first.
    pub max_alert_log: usize,
    /// A blocked submission is recorded as a failed request on its feed.
    pub spoof_blocks_count_as_failures: bool,
    /// A CRITICAL alert force-trips its feed immediately.
    pub trip_on_critical_alert: bool,
    /// Buffered events per subscriber before slow receivers lag.
    pub event_bus_capacity: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            circuit: CircuitConfig::default(),
            store_timeout_ms: 250,
            max_alert_log: 10_000,
            spoof_blocks_count_as_failures: true,
            trip_on_critical_alert: false,
            event_bus_capacity: 1_024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardConfigError {
    Detection(DetectionConfigError),
    Circuit(CircuitConfigError),
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl fmt::Display for GuardConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardConfigError::Detection(e) => write!(f, "{e}"),
            GuardConfigError::Circuit(e) => write!(f, "{e}"),
            GuardConfigError::Invalid { field, reason } => {
                write!(f, "invalid guard config: {field} {reason}")
            }
        }
    }
}

impl std::error::Error for GuardConfigError {}

impl GuardConfig {
    pub fn validate(&self) -> Result<(), GuardConfigError> {
        self.detection.validate().map_err(GuardConfigError::Detection)?;
        self.circuit.validate().map_err(GuardConfigError::Circuit)?;
        if self.store_timeout_ms == 0 {
            return Err(GuardConfigError::Invalid {
                field: "store_timeout_ms",
                reason: "must be > 0",
            });
        }
        if self.max_alert_log == 0 {
            return Err(GuardConfigError::Invalid {
                field: "max_alert_log",
                reason: "must be >= 1",
            });
        }
        if self.event_bus_capacity == 0 {
            return Err(GuardConfigError::Invalid {
                field: "event_bus_capacity",
                reason: "must be >= 1",
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Leaf pointers the guard reads (sorted, unique).
    pub consumed_pointers: Vec<String>,
    /// Leaf pointers present in the config that nothing reads (sorted).
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Every leaf the guard reads, derived from the shape of [`GuardConfig`].
fn consumed_pointers() -> Result<BTreeSet<String>> {
    let shape = serde_json::to_value(GuardConfig::default())
        .context("guard config shape serialize failed")?;
    let mut leaves = Vec::new();
    collect_leaf_pointers(&shape, GUARD_POINTER, &mut leaves);
    Ok(leaves.into_iter().collect())
}

/// Report config leaves the guard never reads.
/// `Fail` turns a non-empty report into an error; `Warn` logs and returns it.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed = consumed_pointers()?;

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_pointers: consumed.into_iter().collect(),
        unused_leaf_pointers: unused,
    };

    if !report.is_clean() {
        match policy {
            UnusedKeyPolicy::Fail => bail!(
                "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. First few: {}",
                report.unused_leaf_pointers.len(),
                preview_list(&report.unused_leaf_pointers, 12)
            ),
            UnusedKeyPolicy::Warn => {
                for p in &report.unused_leaf_pointers {
                    tracing::warn!(pointer = %p, "unused config key");
                }
            }
        }
    }

    Ok(report)
}

/// Extract and validate the `/guard` subtree. A missing subtree yields the
/// defaults.
pub fn guard_config_from(
    loaded: &LoadedConfig,
    policy: UnusedKeyPolicy,
) -> Result<(GuardConfig, UnusedKeyReport)> {
    let report = report_unused_keys(&loaded.config_json, policy)?;

    let cfg: GuardConfig = match loaded.config_json.pointer(GUARD_POINTER) {
        Some(v) => serde_json::from_value(v.clone()).context("invalid /guard section")?,
        None => GuardConfig::default(),
    };
    cfg.validate().context("guard config rejected")?;

    Ok((cfg, report))
}

// ---------------------------------------------------------------------------
// JSON pointer helpers
// ---------------------------------------------------------------------------

/// - exact match consumes
/// - "/a/b" consumes "/a/b/c" but NOT "/a/bc"
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

pub(crate) fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}
