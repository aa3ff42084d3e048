use crate::types::{AlertKind, SpoofAlert};
use og_schemas::{FeedId, Severity};
use std::collections::{BTreeMap, VecDeque};

/// Append-only alert history, bounded. The oldest alert is evicted once the
/// log holds `cap` entries.
#[derive(Clone, Debug)]
pub struct AlertLog {
    cap: usize,
    alerts: VecDeque<SpoofAlert>,
}

impl AlertLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            alerts: VecDeque::new(),
        }
    }

    pub fn push(&mut self, alert: SpoofAlert) {
        if self.alerts.len() == self.cap {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    /// Oldest first.
    pub fn all(&self) -> Vec<SpoofAlert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn by_severity(&self, severity: Severity) -> Vec<SpoofAlert> {
        self.alerts
            .iter()
            .filter(|a| a.severity == severity)
            .cloned()
            .collect()
    }

    pub fn for_feed(&self, feed: &FeedId) -> Vec<SpoofAlert> {
        self.alerts
            .iter()
            .filter(|a| &a.feed == feed)
            .cloned()
            .collect()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<AlertKind, u64> {
        let mut out = BTreeMap::new();
        for a in &self.alerts {
            *out.entry(a.kind).or_insert(0) += 1;
        }
        out
    }

    pub fn counts_by_severity(&self) -> BTreeMap<Severity, u64> {
        let mut out = BTreeMap::new();
        for a in &self.alerts {
            *out.entry(a.severity).or_insert(0) += 1;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
