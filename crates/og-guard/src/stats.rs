use og_schemas::Severity;
use og_spoof::AlertKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time aggregate over every feed and the alert log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardStatistics {
    pub feeds: usize,
    pub circuits_closed: usize,
    pub circuits_open: usize,
    pub circuits_half_open: usize,
    /// Mean breaker success rate; 1.0 with no feeds.
    pub average_success_rate: f64,
    pub total_trips: u64,
    /// Alerts currently retained in the log.
    pub total_alerts: usize,
    pub alerts_by_severity: BTreeMap<Severity, u64>,
    pub alerts_by_kind: BTreeMap<AlertKind, u64>,
    pub validations: u64,
    pub blocked_submissions: u64,
    /// Coordination store failures per check.
    pub check_failures: BTreeMap<AlertKind, u64>,
    pub blacklisted_identities: usize,
}
