//! Lead persistence. The store is the only cross-worker shared resource;
//! every flush is a serialized read-modify-write that re-applies the dedupe
//! rule, so previously persisted rows always win over incoming duplicates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use leadharvest_common::{ConfidenceTier, DedupeStrategy, HarvestError, Lead, LeadStatus};

use crate::csv;
use crate::dedupe::merge;

pub const HEADERS: [&str; 16] = [
    "Brand_Name",
    "Phone",
    "Website",
    "Category",
    "Address",
    "City",
    "State",
    "Rating",
    "Review_Count",
    "Query",
    "Source",
    "Scraped_At",
    "Confidence_Score",
    "Confidence_Tier",
    "Status",
    "Ownership_Signals",
];

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// All currently persisted leads, in persisted order.
    async fn load(&self) -> Result<Vec<Lead>, HarvestError>;

    /// Merge a batch into the persisted dataset under exclusive access.
    /// Returns the total unique row count after the merge.
    async fn merge_flush(&self, batch: &[Lead]) -> Result<usize, HarvestError>;
}

/// CSV-file-backed store. Writes go to a temp file in the same directory and
/// are renamed into place, so readers never observe a half-written dataset.
pub struct CsvStore {
    path: PathBuf,
    strategy: DedupeStrategy,
    lock: Mutex<()>,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>, strategy: DedupeStrategy) -> Self {
        Self {
            path: path.into(),
            strategy,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_leads(&self) -> Result<Vec<Lead>, HarvestError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HarvestError::Persistence(format!(
                    "read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let mut rows = csv::parse_rows(&text);
        // Drop the header row if present.
        if rows.first().is_some_and(|r| r.first().map(String::as_str) == Some(HEADERS[0])) {
            rows.remove(0);
        }

        let mut leads = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            match lead_from_row(row) {
                Some(lead) => leads.push(lead),
                None => warn!(
                    path = %self.path.display(),
                    row = i + 2,
                    "Skipping malformed dataset row"
                ),
            }
        }
        Ok(leads)
    }

    fn write_leads(&self, leads: &[Lead]) -> Result<(), HarvestError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| HarvestError::Persistence(format!("create {}: {e}", dir.display())))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| HarvestError::Persistence(format!("temp file in {}: {e}", dir.display())))?;

        let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        csv::write_row(&mut tmp, &header)
            .map_err(|e| HarvestError::Persistence(e.to_string()))?;
        for lead in leads {
            csv::write_row(&mut tmp, &lead_to_row(lead))
                .map_err(|e| HarvestError::Persistence(e.to_string()))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| HarvestError::Persistence(format!("persist {}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl LeadStore for CsvStore {
    async fn load(&self) -> Result<Vec<Lead>, HarvestError> {
        let _guard = self.lock.lock().await;
        self.read_leads()
    }

    async fn merge_flush(&self, batch: &[Lead]) -> Result<usize, HarvestError> {
        let _guard = self.lock.lock().await;

        let existing = self.read_leads()?;
        let before = existing.len();
        let merged = merge(existing, batch.to_vec(), self.strategy);
        self.write_leads(&merged)?;

        debug!(
            path = %self.path.display(),
            incoming = batch.len(),
            added = merged.len() - before,
            total = merged.len(),
            "Flushed batch"
        );
        Ok(merged.len())
    }
}

/// Load every partition in worker-index order, apply the dedupe rule once
/// more, and persist the union into `final_store`. Returns the unique total.
pub async fn merge_partitions(
    partitions: &[Arc<dyn LeadStore>],
    final_store: &dyn LeadStore,
) -> Result<usize, HarvestError> {
    let mut all = Vec::new();
    for partition in partitions {
        all.extend(partition.load().await?);
    }
    final_store.merge_flush(&all).await
}

// --- Row conversion ---

fn lead_to_row(lead: &Lead) -> Vec<String> {
    vec![
        lead.brand_name.clone(),
        lead.phone.clone(),
        lead.website.clone(),
        lead.category.clone(),
        lead.address.clone(),
        lead.city.clone(),
        lead.state.clone(),
        lead.rating.map(|r| r.to_string()).unwrap_or_default(),
        lead.review_count.map(|c| c.to_string()).unwrap_or_default(),
        lead.query.clone(),
        lead.source.clone(),
        lead.scraped_at.to_rfc3339(),
        lead.confidence_score.to_string(),
        lead.confidence_tier.to_string(),
        lead.status.to_string(),
        lead.ownership_signals.join(", "),
    ]
}

fn lead_from_row(row: &[String]) -> Option<Lead> {
    if row.len() != HEADERS.len() {
        return None;
    }

    let rating = if row[7].is_empty() {
        None
    } else {
        Some(row[7].parse().ok()?)
    };
    let review_count = if row[8].is_empty() {
        None
    } else {
        Some(row[8].parse().ok()?)
    };

    Some(Lead {
        brand_name: row[0].clone(),
        phone: row[1].clone(),
        website: row[2].clone(),
        category: row[3].clone(),
        address: row[4].clone(),
        city: row[5].clone(),
        state: row[6].clone(),
        rating,
        review_count,
        query: row[9].clone(),
        source: row[10].clone(),
        scraped_at: DateTime::parse_from_rfc3339(&row[11])
            .ok()?
            .with_timezone(&Utc),
        confidence_score: row[12].parse().ok()?,
        confidence_tier: parse_tier(&row[13])?,
        status: parse_status(&row[14])?,
        ownership_signals: if row[15].is_empty() {
            Vec::new()
        } else {
            row[15].split(", ").map(str::to_string).collect()
        },
    })
}

fn parse_tier(s: &str) -> Option<ConfidenceTier> {
    match s {
        "HIGH" => Some(ConfidenceTier::High),
        "MEDIUM" => Some(ConfidenceTier::Medium),
        "LOW" => Some(ConfidenceTier::Low),
        _ => None,
    }
}

fn parse_status(s: &str) -> Option<LeadStatus> {
    match s {
        "APPROVED" => Some(LeadStatus::Approved),
        "NEEDS_REVIEW" => Some(LeadStatus::NeedsReview),
        "REJECTED" => Some(LeadStatus::Rejected),
        _ => None,
    }
}
