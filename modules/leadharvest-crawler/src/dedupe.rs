//! Duplicate collapsing over the derived lead identity. Pure functions so the
//! merge rule is testable without any file I/O.

use std::collections::HashSet;

use leadharvest_common::{DedupeStrategy, Lead};

/// Derived identity for a lead. Deterministic: phone when non-empty with brand
/// name as fallback, or the composite `phone|brand_name` variant.
pub fn dedupe_key(lead: &Lead, strategy: DedupeStrategy) -> String {
    match strategy {
        DedupeStrategy::PhoneThenName => {
            if lead.phone.is_empty() {
                lead.brand_name.clone()
            } else {
                lead.phone.clone()
            }
        }
        DedupeStrategy::PhoneAndName => format!("{}|{}", lead.phone, lead.brand_name),
    }
}

/// Concatenate `existing` then `incoming` and drop rows whose key was already
/// seen: previously persisted rows win over newly arriving duplicates.
/// Idempotent — merging the same input again does not change the row set.
pub fn merge(existing: Vec<Lead>, incoming: Vec<Lead>, strategy: DedupeStrategy) -> Vec<Lead> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());

    for lead in existing.into_iter().chain(incoming) {
        if seen.insert(dedupe_key(&lead, strategy)) {
            merged.push(lead);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadharvest_common::{ConfidenceTier, LeadStatus};

    fn lead(name: &str, phone: &str, category: &str) -> Lead {
        Lead {
            brand_name: name.to_string(),
            phone: phone.to_string(),
            website: String::new(),
            category: category.to_string(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            rating: None,
            review_count: None,
            query: "test".to_string(),
            source: "Google Maps".to_string(),
            scraped_at: Utc::now(),
            confidence_score: 0,
            confidence_tier: ConfidenceTier::Low,
            status: LeadStatus::NeedsReview,
            ownership_signals: Vec::new(),
        }
    }

    #[test]
    fn phone_key_falls_back_to_name() {
        let with_phone = lead("Apex", "9876543210", "");
        let without_phone = lead("Apex", "", "");

        assert_eq!(
            dedupe_key(&with_phone, DedupeStrategy::PhoneThenName),
            "9876543210"
        );
        assert_eq!(
            dedupe_key(&without_phone, DedupeStrategy::PhoneThenName),
            "Apex"
        );
        assert_eq!(
            dedupe_key(&with_phone, DedupeStrategy::PhoneAndName),
            "9876543210|Apex"
        );
    }

    #[test]
    fn merge_is_first_wins() {
        let existing = vec![lead("Apex", "9876543210", "Manufacturer")];
        let incoming = vec![
            lead("Apex", "9876543210", "Dealer"),
            lead("Zenith", "9123456780", ""),
        ];

        let merged = merge(existing, incoming, DedupeStrategy::PhoneThenName);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].category, "Manufacturer");
        assert_eq!(merged[1].brand_name, "Zenith");
    }

    #[test]
    fn merge_is_idempotent() {
        let batch = vec![
            lead("Apex", "9876543210", ""),
            lead("Zenith", "9123456780", ""),
        ];

        let once = merge(Vec::new(), batch.clone(), DedupeStrategy::PhoneThenName);
        let twice = merge(once.clone(), batch, DedupeStrategy::PhoneThenName);
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn composite_key_separates_same_phone_different_name() {
        let incoming = vec![
            lead("Apex", "9876543210", ""),
            lead("Apex Tyres", "9876543210", ""),
        ];

        let by_phone = merge(Vec::new(), incoming.clone(), DedupeStrategy::PhoneThenName);
        assert_eq!(by_phone.len(), 1);

        let composite = merge(Vec::new(), incoming, DedupeStrategy::PhoneAndName);
        assert_eq!(composite.len(), 2);
    }
}
