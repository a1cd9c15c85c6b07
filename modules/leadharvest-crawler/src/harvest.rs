//! Top-level run orchestration: partition the query plan across workers, run
//! every worker to completion against its own partition file, then merge the
//! partitions into the final dataset.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use leadharvest_common::{Config, DedupeStrategy, LeadStatus, Query};

use crate::extractor::{Extractor, ExtractorConfig};
use crate::planner;
use crate::renderer::RendererFactory;
use crate::scoring::{ScoreConfig, ScoringEngine};
use crate::store::{merge_partitions, CsvStore, LeadStore};
use crate::worker::{WorkerConfig, WorkerReport, WorkerSupervisor};

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub workers: usize,
    pub worker: WorkerConfig,
    pub extractor: ExtractorConfig,
    pub scoring: ScoreConfig,
    pub dedupe: DedupeStrategy,
    pub output_dir: PathBuf,
    /// File name of the merged dataset inside `output_dir`.
    pub output_file: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            worker: WorkerConfig::default(),
            extractor: ExtractorConfig::default(),
            scoring: ScoreConfig::default(),
            dedupe: DedupeStrategy::PhoneThenName,
            output_dir: PathBuf::from("output"),
            output_file: "leads.csv".to_string(),
        }
    }
}

impl HarvestConfig {
    /// Map the environment-level configuration onto the run configuration.
    pub fn from_app_config(config: &Config) -> Self {
        let mut harvest = Self {
            workers: config.workers,
            output_dir: PathBuf::from(&config.output_dir),
            output_file: config.output_file.clone(),
            ..Self::default()
        };
        harvest.worker.stagger = config.worker_stagger;
        harvest.worker.query_cooldown = config.query_cooldown;
        harvest.worker.crash_cooldown = config.crash_cooldown;
        harvest.worker.crawl.save_every = config.save_every;
        harvest.worker.crawl.card_delay = (config.card_delay_min, config.card_delay_max);
        harvest.extractor.blocked_numbers = config.blocked_numbers.clone();
        harvest
    }
}

#[derive(Debug)]
pub struct HarvestStats {
    /// Unique rows in the merged dataset.
    pub total_unique: usize,
    pub approved: usize,
    pub reports: Vec<WorkerReport>,
}

impl HarvestStats {
    pub fn workers_aborted(&self) -> usize {
        self.reports.iter().filter(|r| r.aborted).count()
    }
}

/// Run the full harvest. Worker faults are contained to their partitions;
/// the merge still happens over whatever each worker managed to persist.
pub async fn run(
    queries: Vec<Query>,
    factory: Arc<dyn RendererFactory>,
    config: HarvestConfig,
) -> anyhow::Result<HarvestStats> {
    let chunks = planner::chunk(queries, config.workers);
    info!(
        workers = chunks.len(),
        queries = chunks.iter().map(Vec::len).sum::<usize>(),
        output_dir = %config.output_dir.display(),
        "Starting harvest"
    );

    let extractor = Arc::new(Extractor::new(config.extractor.clone()));
    let scorer = Arc::new(ScoringEngine::new(config.scoring.clone()));

    let mut partitions: Vec<Arc<dyn LeadStore>> = Vec::new();
    let mut handles = Vec::new();
    for (id, chunk) in chunks.into_iter().enumerate() {
        let partition: Arc<dyn LeadStore> = Arc::new(CsvStore::new(
            config.output_dir.join(format!("leads_worker_{id}.csv")),
            config.dedupe,
        ));
        partitions.push(partition.clone());

        let worker = WorkerSupervisor::new(
            id,
            factory.clone(),
            partition,
            extractor.clone(),
            scorer.clone(),
            config.worker.clone(),
        );
        handles.push(tokio::spawn(worker.run(chunk)));
    }

    let mut reports = Vec::new();
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(worker = id, error = %e, "Worker task panicked");
                reports.push(WorkerReport {
                    id,
                    aborted: true,
                    ..WorkerReport::default()
                });
            }
        }
    }

    let final_store = CsvStore::new(config.output_dir.join(&config.output_file), config.dedupe);
    let total_unique = merge_partitions(&partitions, &final_store).await?;
    let approved = final_store
        .load()
        .await?
        .iter()
        .filter(|lead| lead.status == LeadStatus::Approved)
        .count();

    let stats = HarvestStats {
        total_unique,
        approved,
        reports,
    };
    info!(
        total_unique,
        approved,
        aborted_workers = stats.workers_aborted(),
        dataset = %final_store.path().display(),
        "Harvest complete"
    );
    Ok(stats)
}
