use og_schemas::{FeedId, Identity, Price, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Detection thresholds. Immutable per engine instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Relative deviation from the window mean that makes a price suspect.
    pub price_deviation_threshold: f64,
    /// Points required (and averaged) by the price-manipulation check.
    pub price_window: usize,
    /// Minimum z-score for a price-manipulation alert.
    pub z_score_threshold: f64,

    pub flash_loan_window_ms: i64,
    /// Prior points inside the window required before the check runs.
    pub flash_loan_min_points: usize,
    /// Average consecutive relative change that marks a flash-loan swing.
    pub flash_loan_change_threshold: f64,

    pub coordinated_window_ms: i64,
    /// Relative price difference under which two submissions "agree".
    pub coordinated_price_tolerance: f64,
    pub coordinated_min_submissions: usize,
    pub coordinated_min_identities: usize,
    /// Length the shared recent-submission list is trimmed to.
    pub recent_submissions_cap: usize,

    /// Allowed clock skew into the future.
    pub future_tolerance_ms: i64,
    /// Latency above `delay_multiplier * average response time` is flagged.
    pub delay_multiplier: f64,

    pub proof_ttl_ms: i64,

    pub sybil_response_time_tolerance_ms: f64,
    pub sybil_accuracy_tolerance: f64,
    pub sybil_correlation_tolerance: f64,
    /// Lookalike profiles required to raise a sybil alert.
    pub sybil_min_matches: usize,
    /// Profiles with fewer submissions are never compared.
    pub sybil_min_observations: u64,

    pub front_running_window_ms: i64,
    pub pending_tx_cap: usize,
    pub pending_tx_ttl_ms: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            price_deviation_threshold: 0.05,
            price_window: 20,
            z_score_threshold: 3.0,
            flash_loan_window_ms: 1_000,
            flash_loan_min_points: 2,
            flash_loan_change_threshold: 0.10,
            coordinated_window_ms: 5_000,
            coordinated_price_tolerance: 0.001,
            coordinated_min_submissions: 3,
            coordinated_min_identities: 3,
            recent_submissions_cap: 100,
            future_tolerance_ms: 1_000,
            delay_multiplier: 10.0,
            proof_ttl_ms: 7 * 24 * 60 * 60 * 1_000,
            sybil_response_time_tolerance_ms: 10.0,
            sybil_accuracy_tolerance: 0.01,
            sybil_correlation_tolerance: 0.01,
            sybil_min_matches: 2,
            sybil_min_observations: 10,
            front_running_window_ms: 100,
            pending_tx_cap: 100,
            pending_tx_ttl_ms: 60_000,
        }
    }
}

/// Invalid detection threshold (fatal at construction).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionConfigError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl fmt::Display for DetectionConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid detection config: {} {}", self.field, self.reason)
    }
}

impl std::error::Error for DetectionConfigError {}

fn positive_f64(field: &'static str, v: f64) -> Result<(), DetectionConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(DetectionConfigError {
            field,
            reason: "must be a finite number > 0",
        })
    }
}

fn positive_i64(field: &'static str, v: i64) -> Result<(), DetectionConfigError> {
    if v > 0 {
        Ok(())
    } else {
        Err(DetectionConfigError {
            field,
            reason: "must be > 0",
        })
    }
}

fn at_least_one(field: &'static str, v: usize) -> Result<(), DetectionConfigError> {
    if v >= 1 {
        Ok(())
    } else {
        Err(DetectionConfigError {
            field,
            reason: "must be >= 1",
        })
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), DetectionConfigError> {
        positive_f64("price_deviation_threshold", self.price_deviation_threshold)?;
        at_least_one("price_window", self.price_window)?;
        positive_f64("z_score_threshold", self.z_score_threshold)?;
        positive_i64("flash_loan_window_ms", self.flash_loan_window_ms)?;
        at_least_one("flash_loan_min_points", self.flash_loan_min_points)?;
        positive_f64("flash_loan_change_threshold", self.flash_loan_change_threshold)?;
        positive_i64("coordinated_window_ms", self.coordinated_window_ms)?;
        positive_f64("coordinated_price_tolerance", self.coordinated_price_tolerance)?;
        at_least_one("coordinated_min_submissions", self.coordinated_min_submissions)?;
        at_least_one("coordinated_min_identities", self.coordinated_min_identities)?;
        at_least_one("recent_submissions_cap", self.recent_submissions_cap)?;
        if self.recent_submissions_cap < self.coordinated_min_submissions {
            return Err(DetectionConfigError {
                field: "recent_submissions_cap",
                reason: "must be >= coordinated_min_submissions",
            });
        }
        positive_i64("future_tolerance_ms", self.future_tolerance_ms)?;
        positive_f64("delay_multiplier", self.delay_multiplier)?;
        positive_i64("proof_ttl_ms", self.proof_ttl_ms)?;
        positive_f64(
            "sybil_response_time_tolerance_ms",
            self.sybil_response_time_tolerance_ms,
        )?;
        positive_f64("sybil_accuracy_tolerance", self.sybil_accuracy_tolerance)?;
        positive_f64("sybil_correlation_tolerance", self.sybil_correlation_tolerance)?;
        at_least_one("sybil_min_matches", self.sybil_min_matches)?;
        positive_i64("front_running_window_ms", self.front_running_window_ms)?;
        at_least_one("pending_tx_cap", self.pending_tx_cap)?;
        positive_i64("pending_tx_ttl_ms", self.pending_tx_ttl_ms)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Submission + malformed input
// ---------------------------------------------------------------------------

/// One incoming price update awaiting a verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub feed: FeedId,
    pub price: Price,
    /// Price observation time claimed by the submitter (epoch ms).
    pub timestamp_ms: i64,
    pub identity: Identity,
    /// Opaque replay-protection token.
    pub proof_token: String,
}

/// Why a submission or request was rejected before any check ran.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRejection {
    EmptyFeedId,
    EmptyIdentity,
    EmptyProofToken,
    ZeroPrice,
    NonPositiveTimestamp,
    NegativeLatency,
}

impl InputRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputRejection::EmptyFeedId => "empty_feed_id",
            InputRejection::EmptyIdentity => "empty_identity",
            InputRejection::EmptyProofToken => "empty_proof_token",
            InputRejection::ZeroPrice => "zero_price",
            InputRejection::NonPositiveTimestamp => "non_positive_timestamp",
            InputRejection::NegativeLatency => "negative_latency",
        }
    }
}

impl fmt::Display for InputRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed input: {}", self.as_str())
    }
}

impl std::error::Error for InputRejection {}

impl Submission {
    /// Structural checks. Runs before any detector.
    pub fn check_well_formed(&self) -> Result<(), InputRejection> {
        if self.feed.as_str().trim().is_empty() {
            return Err(InputRejection::EmptyFeedId);
        }
        if self.identity.as_str().trim().is_empty() {
            return Err(InputRejection::EmptyIdentity);
        }
        if self.proof_token.trim().is_empty() {
            return Err(InputRejection::EmptyProofToken);
        }
        if self.price.is_zero() {
            return Err(InputRejection::ZeroPrice);
        }
        if self.timestamp_ms <= 0 {
            return Err(InputRejection::NonPositiveTimestamp);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    PriceManipulation,
    FlashLoanAttack,
    CoordinatedAttack,
    TimestampManipulation,
    ReplayAttack,
    SybilAttack,
    FrontRunning,
}

impl AlertKind {
    pub const ALL: [AlertKind; 7] = [
        AlertKind::PriceManipulation,
        AlertKind::FlashLoanAttack,
        AlertKind::CoordinatedAttack,
        AlertKind::TimestampManipulation,
        AlertKind::ReplayAttack,
        AlertKind::SybilAttack,
        AlertKind::FrontRunning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::PriceManipulation => "PRICE_MANIPULATION",
            AlertKind::FlashLoanAttack => "FLASH_LOAN_ATTACK",
            AlertKind::CoordinatedAttack => "COORDINATED_ATTACK",
            AlertKind::TimestampManipulation => "TIMESTAMP_MANIPULATION",
            AlertKind::ReplayAttack => "REPLAY_ATTACK",
            AlertKind::SybilAttack => "SYBIL_ATTACK",
            AlertKind::FrontRunning => "FRONT_RUNNING",
        }
    }

    /// Whether an alert of this kind at `severity` blocks the submission.
    pub fn blocks(&self, severity: Severity) -> bool {
        match self {
            AlertKind::PriceManipulation => severity >= Severity::High,
            AlertKind::FlashLoanAttack
            | AlertKind::CoordinatedAttack
            | AlertKind::ReplayAttack
            | AlertKind::SybilAttack => true,
            AlertKind::TimestampManipulation | AlertKind::FrontRunning => false,
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            AlertKind::PriceManipulation => {
                "Halt updates for the feed and cross-reference independent sources."
            }
            AlertKind::FlashLoanAttack => {
                "Pause consumers of the feed and fall back to TWAP pricing."
            }
            AlertKind::CoordinatedAttack => {
                "Review the agreeing identities and require additional independent sources."
            }
            AlertKind::TimestampManipulation => {
                "Check the identity's clock synchronisation and network path."
            }
            AlertKind::ReplayAttack => {
                "Reject the proof and investigate the identity's key material."
            }
            AlertKind::SybilAttack => {
                "Verify the identities are operated independently; consider slashing."
            }
            AlertKind::FrontRunning => {
                "Review mempool activity and enable private transaction submission."
            }
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const EMERGENCY_PREFIX: &str = "EMERGENCY: trip the feed's circuit breaker. ";

/// Build the operator-facing recommendation for an alert.
pub fn recommendation_for(kind: AlertKind, severity: Severity) -> String {
    if severity == Severity::Critical {
        format!("{EMERGENCY_PREFIX}{}", kind.recommendation())
    } else {
        kind.recommendation().to_string()
    }
}

/// Immutable once emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpoofAlert {
    pub id: String,
    pub timestamp_ms: i64,
    pub kind: AlertKind,
    pub severity: Severity,
    pub feed: FeedId,
    pub affected: Vec<Identity>,
    /// Deterministic evidence map (sorted keys) for logs and audit.
    pub details: BTreeMap<String, String>,
    pub recommendation: String,
    pub blocked: bool,
}

impl SpoofAlert {
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        feed: &FeedId,
        affected: Vec<Identity>,
        now_ms: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp_ms: now_ms,
            kind,
            severity,
            feed: feed.clone(),
            affected,
            details: BTreeMap::new(),
            recommendation: recommendation_for(kind, severity),
            blocked: kind.blocks(severity),
        }
    }

    pub fn with_detail(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.details.insert(k.into(), v.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Aggregate verdict for one submission.
///
/// - accepted: `valid && !blocked`
/// - flagged:  `!valid && !blocked` (only non-blocking alerts)
/// - blocked:  `blocked`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// No alerts and well-formed input.
    pub valid: bool,
    pub alerts: Vec<SpoofAlert>,
    pub blocked: bool,
    /// Set when the submission was malformed; no checks ran.
    pub rejection: Option<InputRejection>,
}

impl ValidationResult {
    pub fn rejected(reason: InputRejection) -> Self {
        Self {
            valid: false,
            alerts: Vec::new(),
            blocked: true,
            rejection: Some(reason),
        }
    }

    pub fn from_alerts(alerts: Vec<SpoofAlert>) -> Self {
        let blocked = alerts.iter().any(|a| a.blocked);
        Self {
            valid: alerts.is_empty(),
            alerts,
            blocked,
            rejection: None,
        }
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.alerts.iter().map(|a| a.severity).max()
    }
}
