use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Work items ---

/// One unit of crawl work: a keyword, optionally scoped to a locality.
/// Generated once by the planner and assigned to exactly one worker chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub keyword: String,
    pub locality: Option<String>,
}

impl Query {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            locality: None,
        }
    }

    pub fn with_locality(keyword: &str, locality: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            locality: Some(locality.to_string()),
        }
    }

    /// The search term as typed into the listing source.
    pub fn term(&self) -> String {
        match &self.locality {
            Some(loc) => format!("{} {}", self.keyword, loc),
            None => self.keyword.clone(),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.term())
    }
}

// --- Classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceTier::High => write!(f, "HIGH"),
            ConfidenceTier::Medium => write!(f, "MEDIUM"),
            ConfidenceTier::Low => write!(f, "LOW"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Approved,
    NeedsReview,
    Rejected,
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::Approved => write!(f, "APPROVED"),
            LeadStatus::NeedsReview => write!(f, "NEEDS_REVIEW"),
            LeadStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// How a blacklist keyword hit affects scoring. Two behaviors shipped over the
/// source's history; both are kept behind this flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlacklistMode {
    /// A reseller keyword ends evaluation immediately with a fixed sentinel score.
    Terminal,
    /// A reseller keyword applies a fixed negative increment; other signals
    /// still accumulate.
    Penalty,
}

/// Identity rule used to collapse duplicate leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeStrategy {
    /// Phone when non-empty, brand name otherwise.
    PhoneThenName,
    /// Composite `phone|brand_name`.
    PhoneAndName,
}

// --- Output record ---

/// One normalized business-contact record. `brand_name` is never empty; `phone`
/// is either empty or a digits/leading-`+` string of length >= 10.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub brand_name: String,
    pub phone: String,
    pub website: String,
    pub category: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub query: String,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    pub confidence_score: i32,
    pub confidence_tier: ConfidenceTier,
    pub status: LeadStatus,
    pub ownership_signals: Vec<String>,
}

// --- Retry policy ---

/// Backoff policy consumed by the worker supervisor for renderer startup and
/// crash recovery. Delay for attempt `n` is `base * (n + 1)` plus up to
/// `jitter` of random slack.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub jitter: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Deterministic part of the delay before retry `attempt` (0-based).
    /// Callers add jitter themselves so this stays testable.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base * (attempt + 1)
    }

    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            jitter: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_term_includes_locality() {
        let q = Query::with_locality("MRF dealer", "Jaipur");
        assert_eq!(q.term(), "MRF dealer Jaipur");
        assert_eq!(Query::new("MRF dealer").term(), "MRF dealer");
    }

    #[test]
    fn backoff_delay_grows_linearly() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(2),
            jitter: Duration::ZERO,
            max_attempts: 3,
        };
        assert_eq!(policy.delay(0), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(6));
        assert!(!policy.attempts_exhausted(2));
        assert!(policy.attempts_exhausted(3));
    }
}
