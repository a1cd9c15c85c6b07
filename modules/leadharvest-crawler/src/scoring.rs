//! Confidence scoring: separates genuine brand owners from resellers and
//! aggregator listings. Pure and deterministic — identical inputs always
//! yield identical output.

use regex::Regex;

use leadharvest_common::{BlacklistMode, ConfidenceTier, LeadStatus};

/// Sentinel score for a terminal blacklist hit.
const BLACKLIST_SENTINEL: i32 = -100;

const LEGAL_ENTITY_PATTERN: &str = r"\b(pvt|private|ltd|limited)\b";

#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// Reseller/trader keywords.
    pub blacklist: Vec<String>,
    /// Ownership/manufacturing keywords.
    pub whitelist: Vec<String>,
    /// High-confidence ownership keywords.
    pub strong_signals: Vec<String>,
    /// Listing-aggregator domains; a website on one of these is demoted.
    pub aggregator_domains: Vec<String>,

    pub blacklist_mode: BlacklistMode,
    /// Increment applied per blacklist hit in `Penalty` mode.
    pub blacklist_penalty: i32,
    pub whitelist_bonus: i32,
    pub strong_signal_bonus: i32,
    pub website_bonus: i32,
    pub aggregator_penalty: i32,
    pub legal_entity_bonus: i32,

    pub high_rating_threshold: f32,
    pub low_rating_threshold: f32,
    pub rating_bonus: i32,
    pub rating_penalty: i32,
    pub review_volume_threshold: u32,
    pub review_volume_bonus: i32,

    /// Tier bands: score >= high is High, >= medium is Medium, else Low.
    pub high_tier_threshold: i32,
    pub medium_tier_threshold: i32,
    /// Status bands: score >= approve is Approved, >= review is NeedsReview,
    /// else Rejected.
    pub approve_threshold: i32,
    pub review_threshold: i32,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            blacklist: strings(&[
                "trader",
                "dealer",
                "distributor",
                "supplier",
                "wholesaler",
                "retailer",
                "shop",
                "store",
                "trading",
            ]),
            whitelist: strings(&[
                "manufacturer",
                "manufacturing",
                "industries",
                "factory",
                "private limited",
                "pvt ltd",
                "limited",
                "brand",
                "authorized distributor",
            ]),
            strong_signals: strings(&[
                "iso",
                "oem",
                "brand owner",
                "registered brand",
                "private label",
            ]),
            aggregator_domains: strings(&[
                "indiamart.com",
                "justdial.com",
                "tradeindia.com",
                "sulekha.com",
            ]),
            blacklist_mode: BlacklistMode::Terminal,
            blacklist_penalty: BLACKLIST_SENTINEL,
            whitelist_bonus: 20,
            strong_signal_bonus: 30,
            website_bonus: 20,
            aggregator_penalty: -10,
            legal_entity_bonus: 15,
            high_rating_threshold: 4.5,
            low_rating_threshold: 3.0,
            rating_bonus: 10,
            rating_penalty: -10,
            review_volume_threshold: 50,
            review_volume_bonus: 10,
            high_tier_threshold: 60,
            medium_tier_threshold: 30,
            approve_threshold: 60,
            review_threshold: 30,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: i32,
    pub tier: ConfidenceTier,
    pub status: LeadStatus,
    /// Matched signal reasons, deduplicated and sorted.
    pub signals: Vec<String>,
}

pub struct ScoringEngine {
    config: ScoreConfig,
    legal_entity_re: Regex,
}

impl ScoringEngine {
    pub fn new(config: ScoreConfig) -> Self {
        Self {
            config,
            legal_entity_re: Regex::new(LEGAL_ENTITY_PATTERN).expect("valid legal entity regex"),
        }
    }

    pub fn evaluate(
        &self,
        name: &str,
        category: &str,
        website: &str,
        rating: Option<f32>,
        review_count: Option<u32>,
    ) -> Evaluation {
        let text = format!("{} {}", name, category).to_lowercase();
        let mut score = 0i32;
        let mut signals: Vec<String> = Vec::new();

        // Blacklist short-circuit (or accumulating penalty, per config).
        if self.config.blacklist.iter().any(|w| text.contains(w.as_str())) {
            signals.push("reseller keyword".to_string());
            match self.config.blacklist_mode {
                BlacklistMode::Terminal => {
                    return self.finish(BLACKLIST_SENTINEL, signals);
                }
                BlacklistMode::Penalty => {
                    score += self.config.blacklist_penalty;
                }
            }
        }

        for word in &self.config.whitelist {
            if text.contains(word.as_str()) {
                score += self.config.whitelist_bonus;
                signals.push(word.clone());
            }
        }

        for word in &self.config.strong_signals {
            if text.contains(word.as_str()) {
                score += self.config.strong_signal_bonus;
                signals.push(word.clone());
            }
        }

        if !website.is_empty() {
            if self.is_aggregator(website) {
                score += self.config.aggregator_penalty;
                signals.push("aggregator website".to_string());
            } else {
                score += self.config.website_bonus;
                signals.push("website".to_string());
            }
        }

        if self.legal_entity_re.is_match(&text) {
            score += self.config.legal_entity_bonus;
            signals.push("legal entity".to_string());
        }

        if let Some(rating) = rating {
            if rating >= self.config.high_rating_threshold {
                score += self.config.rating_bonus;
                signals.push("high rating".to_string());
            } else if rating < self.config.low_rating_threshold {
                score += self.config.rating_penalty;
                signals.push("low rating".to_string());
            }
        }

        if let Some(reviews) = review_count {
            if reviews > self.config.review_volume_threshold {
                score += self.config.review_volume_bonus;
                signals.push("review volume".to_string());
            }
        }

        self.finish(score, signals)
    }

    fn is_aggregator(&self, website: &str) -> bool {
        let host = url::Url::parse(website)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| website.to_lowercase());
        self.config
            .aggregator_domains
            .iter()
            .any(|d| host.ends_with(d.as_str()) || host.contains(d.as_str()))
    }

    fn finish(&self, score: i32, mut signals: Vec<String>) -> Evaluation {
        signals.sort();
        signals.dedup();

        let tier = if score >= self.config.high_tier_threshold {
            ConfidenceTier::High
        } else if score >= self.config.medium_tier_threshold {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        };

        let status = if score >= self.config.approve_threshold {
            LeadStatus::Approved
        } else if score >= self.config.review_threshold {
            LeadStatus::NeedsReview
        } else {
            LeadStatus::Rejected
        };

        Evaluation {
            score,
            tier,
            status,
            signals,
        }
    }
}
