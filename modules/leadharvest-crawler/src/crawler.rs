//! Drives one query to completion: load the feed, walk currently visible
//! cards, extract and score each new one, scroll, and decide when the feed is
//! exhausted.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use leadharvest_common::{HarvestError, Lead, Query};

use crate::extractor::Extractor;
use crate::renderer::{CardHandle, Renderer};
use crate::scoring::ScoringEngine;
use crate::selectors;
use crate::store::LeadStore;

pub const END_OF_RESULTS_MARKER: &str = "You've reached the end of the list";

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Search URL prefix; the query term is appended with `+` separators.
    pub base_search_url: String,
    pub card_selector: String,
    pub name_selector: String,
    /// Bound on waiting for the first feed card after navigation.
    pub feed_wait: Duration,
    /// Bound on waiting for the detail view after clicking a card.
    pub detail_wait: Duration,
    /// Settle interval after each feed scroll.
    pub scroll_settle: Duration,
    /// Randomized pacing window after each successful extraction.
    pub card_delay: (Duration, Duration),
    /// Consecutive zero-growth passes before the feed counts as exhausted.
    pub max_stall_rounds: u32,
    pub end_of_results_marker: String,
    /// Flush the batch to the store every N leads (0 disables mid-crawl flush).
    pub save_every: usize,
    pub source_label: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_search_url: "https://www.google.com/maps/search/".to_string(),
            card_selector: selectors::CARD.to_string(),
            name_selector: selectors::DETAIL_NAME.to_string(),
            feed_wait: Duration::from_secs(20),
            detail_wait: Duration::from_secs(10),
            scroll_settle: Duration::from_millis(1500),
            card_delay: (Duration::from_millis(800), Duration::from_millis(1600)),
            max_stall_rounds: 3,
            end_of_results_marker: END_OF_RESULTS_MARKER.to_string(),
            save_every: 20,
            source_label: "Google Maps".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Loading,
    Extracting,
    Scrolling,
    Done,
    Failed,
}

/// Result of crawling one query. `Failed` means the query was abandoned
/// (feed never loaded); renderer-fatal faults surface as errors instead.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub state: CrawlState,
    pub new_leads: usize,
    /// Full extraction passes over visible cards.
    pub passes: u32,
}

pub struct Crawler<'a> {
    renderer: &'a dyn Renderer,
    extractor: &'a Extractor,
    scorer: &'a ScoringEngine,
    store: &'a dyn LeadStore,
    config: &'a CrawlConfig,
}

impl<'a> Crawler<'a> {
    pub fn new(
        renderer: &'a dyn Renderer,
        extractor: &'a Extractor,
        scorer: &'a ScoringEngine,
        store: &'a dyn LeadStore,
        config: &'a CrawlConfig,
    ) -> Self {
        Self {
            renderer,
            extractor,
            scorer,
            store,
            config,
        }
    }

    /// Crawl `query` to exhaustion, appending leads to `batch` and flushing
    /// to the store whenever the batch reaches the configured size.
    pub async fn crawl(
        &self,
        query: &Query,
        batch: &mut Vec<Lead>,
    ) -> Result<CrawlOutcome, HarvestError> {
        let url = self.search_url(query);
        info!(query = %query, url = url.as_str(), "Crawling query");

        let mut outcome = CrawlOutcome {
            state: CrawlState::Loading,
            new_leads: 0,
            passes: 0,
        };

        if let Err(e) = self.renderer.navigate(&url).await {
            if e.is_renderer_fatal() {
                return Err(e);
            }
            warn!(query = %query, error = %e, "Navigation failed, abandoning query");
            outcome.state = CrawlState::Failed;
            return Ok(outcome);
        }

        let feed_loaded = self
            .renderer
            .wait_for_selector(&self.config.card_selector, self.config.feed_wait)
            .await?;
        if !feed_loaded {
            warn!(query = %query, "Feed never appeared, abandoning query");
            outcome.state = CrawlState::Failed;
            return Ok(outcome);
        }

        // Per-query session state: names visited and the stall counter.
        let mut seen: HashSet<String> = HashSet::new();
        let mut stall_rounds = 0u32;

        loop {
            if self.end_of_results_visible().await? {
                debug!(query = %query, "End-of-results marker visible");
                outcome.state = CrawlState::Done;
                break;
            }

            outcome.state = CrawlState::Extracting;
            let cards = self.visible_cards().await?;
            let mut new_this_pass = 0usize;

            for card in &cards {
                match self.visit_card(card, query, &mut seen).await {
                    Ok(Some(lead)) => {
                        batch.push(lead);
                        new_this_pass += 1;
                        outcome.new_leads += 1;

                        if self.config.save_every > 0 && batch.len() >= self.config.save_every {
                            self.flush(query, batch).await;
                        }

                        tokio::time::sleep(random_in(self.config.card_delay)).await;
                    }
                    Ok(None) => {}
                    Err(e) if e.is_renderer_fatal() => return Err(e),
                    Err(e) => debug!(query = %query, error = %e, "Skipping card"),
                }
            }

            outcome.passes += 1;

            if new_this_pass == 0 {
                stall_rounds += 1;
                if stall_rounds >= self.config.max_stall_rounds {
                    debug!(query = %query, stall_rounds, "Feed exhausted");
                    outcome.state = CrawlState::Done;
                    break;
                }
            } else {
                stall_rounds = 0;
            }

            outcome.state = CrawlState::Scrolling;
            self.renderer.scroll_feed_to_bottom().await?;
            tokio::time::sleep(self.config.scroll_settle).await;
        }

        info!(
            query = %query,
            new_leads = outcome.new_leads,
            passes = outcome.passes,
            "Query complete"
        );
        Ok(outcome)
    }

    /// Open one card and turn it into a lead. Returns None for cards already
    /// seen this session, cards without a resolvable name, and detail views
    /// that never opened; per-card faults bubble up for the caller to skip.
    async fn visit_card(
        &self,
        card: &CardHandle,
        query: &Query,
        seen: &mut HashSet<String>,
    ) -> Result<Option<Lead>, HarvestError> {
        match self.renderer.scroll_into_view(card).await {
            Err(e) if e.is_renderer_fatal() => return Err(e),
            _ => {}
        }
        self.renderer.click(card).await?;

        let detail_open = self
            .renderer
            .wait_for_selector(&self.config.name_selector, self.config.detail_wait)
            .await?;
        if !detail_open {
            return Ok(None);
        }

        let name = match self.detail_name().await? {
            Some(name) => name,
            None => return Ok(None),
        };
        if !seen.insert(name.clone()) {
            // Idempotent visit: already extracted in this query session.
            return Ok(None);
        }

        let fields = self.extractor.extract(self.renderer).await?;
        let eval = self.scorer.evaluate(
            &name,
            &fields.category,
            &fields.website,
            fields.rating,
            fields.review_count,
        );

        Ok(Some(Lead {
            brand_name: name,
            phone: fields.phone,
            website: fields.website,
            category: fields.category,
            address: fields.address,
            city: fields.city,
            state: fields.state,
            rating: fields.rating,
            review_count: fields.review_count,
            query: query.term(),
            source: self.config.source_label.clone(),
            scraped_at: Utc::now(),
            confidence_score: eval.score,
            confidence_tier: eval.tier,
            status: eval.status,
            ownership_signals: eval.signals,
        }))
    }

    async fn detail_name(&self) -> Result<Option<String>, HarvestError> {
        let handles = match self.renderer.query_all(&self.config.name_selector).await {
            Ok(handles) => handles,
            Err(e) if e.is_renderer_fatal() => return Err(e),
            Err(_) => return Ok(None),
        };
        let Some(handle) = handles.first() else {
            return Ok(None);
        };
        match self.renderer.text(handle).await {
            Ok(text) => {
                let name = text.trim().to_string();
                Ok((!name.is_empty()).then_some(name))
            }
            Err(e) if e.is_renderer_fatal() => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn visible_cards(&self) -> Result<Vec<CardHandle>, HarvestError> {
        match self.renderer.query_all(&self.config.card_selector).await {
            Ok(cards) => Ok(cards),
            Err(e) if e.is_renderer_fatal() => Err(e),
            Err(_) => Ok(Vec::new()),
        }
    }

    async fn end_of_results_visible(&self) -> Result<bool, HarvestError> {
        match self.renderer.current_page_text().await {
            Ok(text) => Ok(text.contains(&self.config.end_of_results_marker)),
            Err(e) if e.is_renderer_fatal() => Err(e),
            Err(_) => Ok(false),
        }
    }

    /// Best-effort mid-crawl flush. On failure the batch is kept and retried
    /// at the next threshold or at worker shutdown.
    async fn flush(&self, query: &Query, batch: &mut Vec<Lead>) {
        match self.store.merge_flush(batch).await {
            Ok(total) => {
                info!(query = %query, flushed = batch.len(), total_unique = total, "Saved batch");
                batch.clear();
            }
            Err(e) => warn!(query = %query, error = %e, "Batch flush failed, keeping batch"),
        }
    }

    fn search_url(&self, query: &Query) -> String {
        format!(
            "{}{}",
            self.config.base_search_url,
            query.term().replace(' ', "+")
        )
    }
}

/// Random duration within an inclusive window.
pub(crate) fn random_in(window: (Duration, Duration)) -> Duration {
    let (min, max) = window;
    if max <= min {
        return min;
    }
    let millis = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractorConfig;
    use crate::scoring::ScoreConfig;
    use crate::testing::{MemoryStore, PhoneChannel, SimCard, SimRenderer};
    use leadharvest_common::LeadStatus;

    fn fast_config() -> CrawlConfig {
        CrawlConfig {
            feed_wait: Duration::from_millis(10),
            detail_wait: Duration::from_millis(10),
            scroll_settle: Duration::ZERO,
            card_delay: (Duration::ZERO, Duration::ZERO),
            save_every: 0,
            ..CrawlConfig::default()
        }
    }

    fn manufacturer_card(i: usize) -> SimCard {
        SimCard::new(&format!("Apex Industries {i}"))
            .with_phone(&format!("+91 98765 4321{i}"), PhoneChannel::Button)
            .with_website(&format!("https://apex{i}.in"))
            .with_category("Tyre manufacturer")
            .with_address("Plot 4, MIA, Jaipur, Rajasthan")
    }

    fn cards(n: usize) -> Vec<SimCard> {
        (0..n).map(manufacturer_card).collect()
    }

    async fn run_crawl(
        sim: &SimRenderer,
        config: &CrawlConfig,
    ) -> (CrawlOutcome, Vec<Lead>, MemoryStore) {
        let extractor = Extractor::new(ExtractorConfig::default());
        let scorer = ScoringEngine::new(ScoreConfig::default());
        let store = MemoryStore::default();
        let crawler = Crawler::new(sim, &extractor, &scorer, &store, config);

        let mut batch = Vec::new();
        let outcome = crawler
            .crawl(&Query::with_locality("MRF dealer", "Jaipur"), &mut batch)
            .await
            .expect("crawl should not fail");
        (outcome, batch, store)
    }

    #[tokio::test]
    async fn stall_termination_after_exactly_three_zero_growth_passes() {
        let sim = SimRenderer::new(cards(5));
        let config = fast_config();

        let (outcome, batch, _) = run_crawl(&sim, &config).await;

        assert_eq!(outcome.state, CrawlState::Done);
        assert_eq!(batch.len(), 5);
        // One productive pass plus exactly three stall passes.
        assert_eq!(outcome.passes, 4);
        assert_eq!(sim.scrolls(), 3);
    }

    #[tokio::test]
    async fn sentinel_short_circuits_before_stall_counter() {
        let sim = SimRenderer::new(cards(5)).with_end_marker_visible();
        let config = fast_config();

        let (outcome, batch, _) = run_crawl(&sim, &config).await;

        assert_eq!(outcome.state, CrawlState::Done);
        assert_eq!(outcome.passes, 0);
        assert!(batch.is_empty());
        assert_eq!(sim.card_queries(), 0);
    }

    #[tokio::test]
    async fn sentinel_appears_after_growth_stops_the_crawl() {
        let sim = SimRenderer::new(cards(6))
            .with_initial_visible(3)
            .with_grow_per_scroll(3)
            .with_end_marker_after_scrolls(1);
        let config = fast_config();

        let (outcome, batch, _) = run_crawl(&sim, &config).await;

        assert_eq!(outcome.state, CrawlState::Done);
        // First pass extracts 3, marker appears after the scroll, so the
        // remaining 3 cards are never visited.
        assert_eq!(batch.len(), 3);
        assert_eq!(outcome.passes, 1);
    }

    #[tokio::test]
    async fn duplicate_names_are_visited_once() {
        let mut feed = cards(3);
        feed.push(manufacturer_card(0)); // same name as the first card
        let sim = SimRenderer::new(feed);
        let config = fast_config();

        let (_, batch, _) = run_crawl(&sim, &config).await;
        assert_eq!(batch.len(), 3);
    }

    #[tokio::test]
    async fn stale_card_is_skipped_without_aborting() {
        let sim = SimRenderer::new(cards(5)).with_stale_cards(&[2]);
        let config = fast_config();

        let (outcome, batch, _) = run_crawl(&sim, &config).await;

        assert_eq!(outcome.state, CrawlState::Done);
        assert_eq!(batch.len(), 4);
    }

    #[tokio::test]
    async fn navigation_timeout_abandons_query_with_empty_result() {
        let sim = SimRenderer::new(cards(5)).with_navigation_timeout();
        let config = fast_config();

        let (outcome, batch, _) = run_crawl(&sim, &config).await;

        assert_eq!(outcome.state, CrawlState::Failed);
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn renderer_crash_surfaces_as_fatal_error() {
        let sim = SimRenderer::new(cards(5)).with_crash_after_clicks(3);
        let config = fast_config();

        let extractor = Extractor::new(ExtractorConfig::default());
        let scorer = ScoringEngine::new(ScoreConfig::default());
        let store = MemoryStore::default();
        let crawler = Crawler::new(&sim, &extractor, &scorer, &store, &config);

        let mut batch = Vec::new();
        let err = crawler
            .crawl(&Query::new("MRF dealer"), &mut batch)
            .await
            .expect_err("crash must propagate");
        assert!(err.is_renderer_fatal());
        // Leads collected before the crash stay in the batch.
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn batch_flushes_at_the_configured_threshold() {
        let sim = SimRenderer::new(cards(5));
        let config = CrawlConfig {
            save_every: 2,
            ..fast_config()
        };

        let (_, batch, store) = run_crawl(&sim, &config).await;

        assert_eq!(store.unique_count().await, 4);
        assert_eq!(batch.len(), 1);
        assert!(store.flushes() >= 2);
    }

    #[tokio::test]
    async fn extracted_leads_are_scored_and_normalized() {
        let sim = SimRenderer::new(vec![manufacturer_card(1)]);
        let config = fast_config();

        let (_, batch, _) = run_crawl(&sim, &config).await;

        let lead = &batch[0];
        assert_eq!(lead.phone, "+919876543211");
        assert_eq!(lead.city, "Jaipur");
        assert_eq!(lead.state, "Rajasthan");
        assert_eq!(lead.status, LeadStatus::Approved);
        assert_eq!(lead.query, "MRF dealer Jaipur");
    }

    #[tokio::test]
    async fn phone_falls_back_to_tel_link_and_page_sweep() {
        let by_tel = SimCard::new("Zenith Industries")
            .with_phone("+91 91234 56780", PhoneChannel::TelLink);
        let by_page = SimCard::new("Orbit Industries")
            .with_phone("98123 45678", PhoneChannel::PageText);

        let sim = SimRenderer::new(vec![by_tel, by_page]);
        let config = fast_config();

        let (_, batch, _) = run_crawl(&sim, &config).await;

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].phone, "+919123456780");
        assert_eq!(batch[1].phone, "9812345678");
    }
}
