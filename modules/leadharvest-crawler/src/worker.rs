//! Worker supervision: each worker exclusively owns one renderer session,
//! works through its query chunk, and replaces the session when it crashes.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use leadharvest_common::{BackoffPolicy, HarvestError, Lead, Query};

use crate::crawler::{random_in, CrawlConfig, CrawlState, Crawler};
use crate::extractor::Extractor;
use crate::renderer::{Renderer, RendererFactory};
use crate::scoring::ScoringEngine;
use crate::store::LeadStore;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub crawl: CrawlConfig,
    pub startup_backoff: BackoffPolicy,
    /// Bounds renderer replacements within a single query before the query is
    /// abandoned.
    pub crash_backoff: BackoffPolicy,
    /// Startup offset per worker id, so sessions do not launch all at once.
    pub stagger: Duration,
    pub query_cooldown: (Duration, Duration),
    pub crash_cooldown: (Duration, Duration),
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            startup_backoff: BackoffPolicy::default(),
            crash_backoff: BackoffPolicy::default(),
            stagger: Duration::from_secs(5),
            query_cooldown: (Duration::from_secs(5), Duration::from_secs(10)),
            crash_cooldown: (Duration::from_secs(15), Duration::from_secs(25)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub id: usize,
    pub queries_completed: usize,
    pub queries_abandoned: usize,
    pub leads_collected: usize,
    pub renderer_restarts: usize,
    /// Set when the worker gave up before finishing its chunk (renderer could
    /// not be started or replaced). Other workers are unaffected.
    pub aborted: bool,
}

pub struct WorkerSupervisor {
    id: usize,
    factory: Arc<dyn RendererFactory>,
    store: Arc<dyn LeadStore>,
    extractor: Arc<Extractor>,
    scorer: Arc<ScoringEngine>,
    config: WorkerConfig,
}

impl WorkerSupervisor {
    pub fn new(
        id: usize,
        factory: Arc<dyn RendererFactory>,
        store: Arc<dyn LeadStore>,
        extractor: Arc<Extractor>,
        scorer: Arc<ScoringEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id,
            factory,
            store,
            extractor,
            scorer,
            config,
        }
    }

    /// Work through `queries` to completion. Always returns a report; faults
    /// are absorbed into it rather than propagated.
    pub async fn run(self, queries: Vec<Query>) -> WorkerReport {
        let mut report = WorkerReport {
            id: self.id,
            ..WorkerReport::default()
        };
        if queries.is_empty() {
            info!(worker = self.id, "No queries assigned");
            return report;
        }

        tokio::time::sleep(self.config.stagger * self.id as u32).await;
        info!(worker = self.id, queries = queries.len(), "Worker starting");

        let mut renderer = match self.start_renderer().await {
            Ok(renderer) => renderer,
            Err(e) => {
                error!(worker = self.id, error = %e, "Renderer never started, worker aborting");
                report.aborted = true;
                return report;
            }
        };

        let mut batch: Vec<Lead> = Vec::new();
        'queries: for query in &queries {
            let mut crashes = 0u32;
            loop {
                let crawler = Crawler::new(
                    renderer.as_ref(),
                    &self.extractor,
                    &self.scorer,
                    self.store.as_ref(),
                    &self.config.crawl,
                );
                match crawler.crawl(query, &mut batch).await {
                    Ok(outcome) => {
                        report.leads_collected += outcome.new_leads;
                        if outcome.state == CrawlState::Failed {
                            report.queries_abandoned += 1;
                        } else {
                            report.queries_completed += 1;
                        }
                        break;
                    }
                    Err(e) => {
                        warn!(
                            worker = self.id,
                            query = %query,
                            error = %e,
                            "Renderer fault, replacing session"
                        );
                        let _ = renderer.close().await;
                        tokio::time::sleep(random_in(self.config.crash_cooldown)).await;

                        renderer = match self.start_renderer().await {
                            Ok(renderer) => {
                                report.renderer_restarts += 1;
                                renderer
                            }
                            Err(e) => {
                                error!(
                                    worker = self.id,
                                    error = %e,
                                    "Replacement renderer never started, worker aborting"
                                );
                                report.aborted = true;
                                break 'queries;
                            }
                        };

                        crashes += 1;
                        if self.config.crash_backoff.attempts_exhausted(crashes) {
                            warn!(
                                worker = self.id,
                                query = %query,
                                crashes,
                                "Abandoning query after repeated renderer crashes"
                            );
                            report.queries_abandoned += 1;
                            break;
                        }
                        // The query restarts from scratch; duplicates from the
                        // crashed attempt collapse in the store.
                    }
                }
            }

            tokio::time::sleep(random_in(self.config.query_cooldown)).await;
        }

        if !batch.is_empty() {
            match self.store.merge_flush(&batch).await {
                Ok(total) => {
                    info!(worker = self.id, flushed = batch.len(), total_unique = total, "Final flush")
                }
                Err(e) => error!(worker = self.id, error = %e, "Final flush failed"),
            }
        }
        let _ = renderer.close().await;

        info!(
            worker = self.id,
            completed = report.queries_completed,
            abandoned = report.queries_abandoned,
            leads = report.leads_collected,
            restarts = report.renderer_restarts,
            "Worker finished"
        );
        report
    }

    /// Bounded startup retry with linear backoff and jitter.
    async fn start_renderer(&self) -> Result<Box<dyn Renderer>, HarvestError> {
        let policy = self.config.startup_backoff;
        let mut attempt = 0u32;
        loop {
            match self.factory.create().await {
                Ok(renderer) => return Ok(renderer),
                Err(e) => {
                    attempt += 1;
                    if policy.attempts_exhausted(attempt) {
                        return Err(e);
                    }
                    let delay = policy.delay(attempt - 1) + jittered(policy.jitter);
                    warn!(
                        worker = self.id,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Renderer startup failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn jittered(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractorConfig;
    use crate::scoring::ScoreConfig;
    use crate::testing::{MemoryStore, PhoneChannel, SimCard, SimRenderer, SimRendererFactory};

    fn fast_worker_config() -> WorkerConfig {
        WorkerConfig {
            crawl: CrawlConfig {
                feed_wait: Duration::from_millis(10),
                detail_wait: Duration::from_millis(10),
                scroll_settle: Duration::ZERO,
                card_delay: (Duration::ZERO, Duration::ZERO),
                save_every: 0,
                ..CrawlConfig::default()
            },
            startup_backoff: BackoffPolicy {
                base: Duration::ZERO,
                jitter: Duration::ZERO,
                max_attempts: 3,
            },
            crash_backoff: BackoffPolicy {
                base: Duration::ZERO,
                jitter: Duration::ZERO,
                max_attempts: 3,
            },
            stagger: Duration::ZERO,
            query_cooldown: (Duration::ZERO, Duration::ZERO),
            crash_cooldown: (Duration::ZERO, Duration::ZERO),
        }
    }

    fn feed(n: usize) -> Vec<SimCard> {
        (0..n)
            .map(|i| {
                SimCard::new(&format!("Apex Industries {i}"))
                    .with_phone(&format!("+91 98765 4321{i}"), PhoneChannel::Button)
                    .with_website(&format!("https://apex{i}.in"))
                    .with_category("Tyre manufacturer")
            })
            .collect()
    }

    fn supervisor(
        factory: SimRendererFactory,
        store: Arc<MemoryStore>,
        config: WorkerConfig,
    ) -> WorkerSupervisor {
        WorkerSupervisor::new(
            0,
            Arc::new(factory),
            store,
            Arc::new(Extractor::new(ExtractorConfig::default())),
            Arc::new(ScoringEngine::new(ScoreConfig::default())),
            config,
        )
    }

    #[tokio::test]
    async fn completes_chunk_and_flushes_at_shutdown() {
        let factory = SimRendererFactory::scripted(vec![SimRenderer::new(feed(4))]);
        let store = Arc::new(MemoryStore::default());
        let worker = supervisor(factory, store.clone(), fast_worker_config());

        let report = worker.run(vec![Query::new("tyre manufacturer")]).await;

        assert!(!report.aborted);
        assert_eq!(report.queries_completed, 1);
        assert_eq!(report.leads_collected, 4);
        assert_eq!(report.renderer_restarts, 0);
        assert_eq!(store.unique_count().await, 4);
    }

    #[tokio::test]
    async fn replaces_crashed_renderer_and_restarts_query() {
        let crashy = SimRenderer::new(feed(5)).with_crash_after_clicks(3);
        let healthy = SimRenderer::new(feed(5));
        let factory = SimRendererFactory::scripted(vec![crashy, healthy.clone()]);
        let store = Arc::new(MemoryStore::default());
        let worker = supervisor(factory, store.clone(), fast_worker_config());

        let report = worker.run(vec![Query::new("tyre manufacturer")]).await;

        assert!(!report.aborted);
        assert_eq!(report.renderer_restarts, 1);
        assert_eq!(report.queries_completed, 1);
        // The two leads extracted before the crash are re-extracted by the
        // replacement session and collapse in the store.
        assert_eq!(store.unique_count().await, 5);
        assert!(healthy.closed());
    }

    #[tokio::test]
    async fn abandons_query_after_repeated_crashes() {
        let config = WorkerConfig {
            crash_backoff: BackoffPolicy {
                base: Duration::ZERO,
                jitter: Duration::ZERO,
                max_attempts: 2,
            },
            ..fast_worker_config()
        };
        let factory = SimRendererFactory::scripted(vec![
            SimRenderer::new(feed(5)).with_crash_after_clicks(1),
            SimRenderer::new(feed(5)).with_crash_after_clicks(1),
            SimRenderer::new(feed(5)),
        ]);
        let store = Arc::new(MemoryStore::default());
        let worker = supervisor(factory, store.clone(), config);

        let report = worker.run(vec![Query::new("tyre manufacturer")]).await;

        assert!(!report.aborted);
        assert_eq!(report.queries_abandoned, 1);
        assert_eq!(report.queries_completed, 0);
        assert_eq!(report.renderer_restarts, 2);
    }

    #[tokio::test]
    async fn aborts_when_renderer_never_starts() {
        let factory = SimRendererFactory::scripted(vec![]);
        let creates = factory.creation_counter();
        let store = Arc::new(MemoryStore::default());
        let worker = supervisor(factory, store.clone(), fast_worker_config());

        let report = worker.run(vec![Query::new("tyre manufacturer")]).await;

        assert!(report.aborted);
        assert_eq!(report.queries_completed, 0);
        assert_eq!(creates.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(store.unique_count().await, 0);
    }

    #[tokio::test]
    async fn empty_chunk_returns_without_starting_a_renderer() {
        let factory = SimRendererFactory::scripted(vec![SimRenderer::new(feed(1))]);
        let creates = factory.creation_counter();
        let store = Arc::new(MemoryStore::default());
        let worker = supervisor(factory, store, fast_worker_config());

        let report = worker.run(Vec::new()).await;

        assert!(!report.aborted);
        assert_eq!(creates.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
