//! Deterministic doubles for the renderer seam and the lead store, used by
//! unit and integration tests. Enabled through the `test-support` feature.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use leadharvest_common::{BackoffPolicy, DedupeStrategy, HarvestError, Lead};

use crate::crawler::{CrawlConfig, END_OF_RESULTS_MARKER};
use crate::dedupe::merge;
use crate::renderer::{CardHandle, Renderer, RendererFactory};
use crate::selectors;
use crate::store::LeadStore;
use crate::worker::WorkerConfig;

/// Worker timing profile with every delay zeroed, for simulator-backed runs.
pub fn zero_delay_worker_config() -> WorkerConfig {
    let zero_backoff = BackoffPolicy {
        base: Duration::ZERO,
        jitter: Duration::ZERO,
        max_attempts: 3,
    };
    WorkerConfig {
        crawl: CrawlConfig {
            feed_wait: Duration::from_millis(10),
            detail_wait: Duration::from_millis(10),
            scroll_settle: Duration::ZERO,
            card_delay: (Duration::ZERO, Duration::ZERO),
            ..CrawlConfig::default()
        },
        startup_backoff: zero_backoff,
        crash_backoff: zero_backoff,
        stagger: Duration::ZERO,
        query_cooldown: (Duration::ZERO, Duration::ZERO),
        crash_cooldown: (Duration::ZERO, Duration::ZERO),
    }
}

/// Where a simulated business exposes its phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneChannel {
    /// Labelled call/phone control in the detail view.
    Button,
    /// `tel:`-scheme link.
    TelLink,
    /// Only present in the rendered page text.
    PageText,
    None,
}

/// One simulated feed card plus its detail-view fields.
#[derive(Debug, Clone)]
pub struct SimCard {
    pub name: String,
    pub phone: Option<String>,
    pub phone_channel: PhoneChannel,
    pub website: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
}

impl SimCard {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            phone: None,
            phone_channel: PhoneChannel::None,
            website: None,
            category: None,
            address: None,
            rating: None,
            review_count: None,
        }
    }

    pub fn with_phone(mut self, phone: &str, channel: PhoneChannel) -> Self {
        self.phone = Some(phone.to_string());
        self.phone_channel = channel;
        self
    }

    pub fn with_website(mut self, website: &str) -> Self {
        self.website = Some(website.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn with_rating(mut self, rating: f32, review_count: u32) -> Self {
        self.rating = Some(rating);
        self.review_count = Some(review_count);
        self
    }
}

#[derive(Debug)]
struct SimState {
    cards: Vec<SimCard>,
    visible: usize,
    grow_per_scroll: usize,
    selected: Option<usize>,
    end_marker_visible: bool,
    end_marker_after_scrolls: Option<usize>,
    stale_cards: Vec<usize>,
    crash_after_clicks: Option<usize>,
    crashed: bool,
    navigation_timeout: bool,
    navigations: usize,
    scrolls: usize,
    clicks: usize,
    card_queries: usize,
    closed: bool,
}

/// Scripted renderer over a fixed card feed. Clones share state, so a test
/// can keep a handle for assertions after moving one into the code under test.
#[derive(Debug, Clone)]
pub struct SimRenderer {
    state: Arc<Mutex<SimState>>,
}

impl SimRenderer {
    pub fn new(cards: Vec<SimCard>) -> Self {
        let visible = cards.len();
        Self {
            state: Arc::new(Mutex::new(SimState {
                cards,
                visible,
                grow_per_scroll: 0,
                selected: None,
                end_marker_visible: false,
                end_marker_after_scrolls: None,
                stale_cards: Vec::new(),
                crash_after_clicks: None,
                crashed: false,
                navigation_timeout: false,
                navigations: 0,
                scrolls: 0,
                clicks: 0,
                card_queries: 0,
                closed: false,
            })),
        }
    }

    /// Limit how many cards are materialized before the first scroll.
    pub fn with_initial_visible(self, visible: usize) -> Self {
        self.state.lock().unwrap().visible = visible;
        self
    }

    /// Materialize this many additional cards per feed scroll.
    pub fn with_grow_per_scroll(self, grow: usize) -> Self {
        self.state.lock().unwrap().grow_per_scroll = grow;
        self
    }

    pub fn with_end_marker_visible(self) -> Self {
        self.state.lock().unwrap().end_marker_visible = true;
        self
    }

    pub fn with_end_marker_after_scrolls(self, scrolls: usize) -> Self {
        self.state.lock().unwrap().end_marker_after_scrolls = Some(scrolls);
        self
    }

    /// Cards at these feed indices fail every click as stale.
    pub fn with_stale_cards(self, indices: &[usize]) -> Self {
        self.state.lock().unwrap().stale_cards = indices.to_vec();
        self
    }

    /// The Nth card click crashes the session; every call after that fails.
    pub fn with_crash_after_clicks(self, nth: usize) -> Self {
        self.state.lock().unwrap().crash_after_clicks = Some(nth);
        self
    }

    /// The feed never materializes after navigation.
    pub fn with_navigation_timeout(self) -> Self {
        self.state.lock().unwrap().navigation_timeout = true;
        self
    }

    pub fn navigations(&self) -> usize {
        self.state.lock().unwrap().navigations
    }

    pub fn scrolls(&self) -> usize {
        self.state.lock().unwrap().scrolls
    }

    pub fn clicks(&self) -> usize {
        self.state.lock().unwrap().clicks
    }

    pub fn card_queries(&self) -> usize {
        self.state.lock().unwrap().card_queries
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn crashed_err() -> HarvestError {
        HarvestError::RendererCrashed("simulated session loss".to_string())
    }

    fn card_index(handle: &CardHandle) -> Option<usize> {
        handle.0.strip_prefix("card-")?.parse().ok()
    }
}

#[async_trait]
impl Renderer for SimRenderer {
    async fn navigate(&self, _url: &str) -> Result<(), HarvestError> {
        let mut state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }
        state.navigations += 1;
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, HarvestError> {
        let state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }
        if selector == selectors::CARD {
            if state.navigation_timeout {
                return Ok(false);
            }
            return Ok(state.visible > 0);
        }
        if selector == selectors::DETAIL_NAME {
            return Ok(state.selected.is_some());
        }
        Ok(true)
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<CardHandle>, HarvestError> {
        let mut state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }

        if selector == selectors::CARD {
            state.card_queries += 1;
            return Ok((0..state.visible)
                .map(|i| CardHandle(format!("card-{i}")))
                .collect());
        }

        let Some(card) = state.selected.and_then(|i| state.cards.get(i)) else {
            return Ok(Vec::new());
        };

        let handle = |id: &str| vec![CardHandle(id.to_string())];
        let found = match selector {
            s if s == selectors::DETAIL_NAME => handle("detail-name"),
            s if s == selectors::PHONE_BUTTON
                && card.phone_channel == PhoneChannel::Button
                && card.phone.is_some() =>
            {
                handle("detail-phone")
            }
            s if s == selectors::TEL_LINK
                && card.phone_channel == PhoneChannel::TelLink
                && card.phone.is_some() =>
            {
                handle("detail-tel")
            }
            s if s == selectors::WEBSITE_LINK && card.website.is_some() => handle("detail-website"),
            s if s == selectors::CATEGORY_BUTTON && card.category.is_some() => {
                handle("detail-category")
            }
            s if s == selectors::ADDRESS_BUTTON && card.address.is_some() => {
                handle("detail-address")
            }
            s if s == selectors::RATING && card.rating.is_some() => handle("detail-rating"),
            s if s == selectors::REVIEWS_BUTTON && card.review_count.is_some() => {
                handle("detail-reviews")
            }
            _ => Vec::new(),
        };
        Ok(found)
    }

    async fn text(&self, handle: &CardHandle) -> Result<String, HarvestError> {
        let state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }

        if let Some(i) = Self::card_index(handle) {
            return match state.cards.get(i) {
                Some(card) => Ok(card.name.clone()),
                None => Err(HarvestError::ElementNotFound(handle.0.clone())),
            };
        }

        let Some(card) = state.selected.and_then(|i| state.cards.get(i)) else {
            return Err(HarvestError::ElementNotFound(handle.0.clone()));
        };
        match handle.0.as_str() {
            "detail-name" => Ok(card.name.clone()),
            "detail-phone" => Ok(card.phone.clone().unwrap_or_default()),
            "detail-category" => Ok(card.category.clone().unwrap_or_default()),
            "detail-address" => Ok(card.address.clone().unwrap_or_default()),
            "detail-reviews" => Ok(card
                .review_count
                .map(|n| format!("{n} reviews"))
                .unwrap_or_default()),
            _ => Err(HarvestError::ElementNotFound(handle.0.clone())),
        }
    }

    async fn attribute(&self, handle: &CardHandle, name: &str) -> Result<String, HarvestError> {
        let state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }

        let Some(card) = state.selected.and_then(|i| state.cards.get(i)) else {
            return Ok(String::new());
        };
        let value = match (handle.0.as_str(), name) {
            ("detail-tel", "href") => card.phone.as_ref().map(|p| format!("tel:{p}")),
            ("detail-website", "href") => card.website.clone(),
            ("detail-rating", "aria-label") => card.rating.map(|r| format!("{r} stars")),
            ("detail-phone", "aria-label") => card.phone.as_ref().map(|p| format!("Phone: {p}")),
            _ => None,
        };
        Ok(value.unwrap_or_default())
    }

    async fn click(&self, handle: &CardHandle) -> Result<(), HarvestError> {
        let mut state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }

        let Some(i) = Self::card_index(handle) else {
            return Ok(());
        };
        if state.stale_cards.contains(&i) {
            return Err(HarvestError::StaleElement);
        }

        state.clicks += 1;
        if state
            .crash_after_clicks
            .is_some_and(|nth| state.clicks >= nth)
        {
            state.crashed = true;
            return Err(Self::crashed_err());
        }

        state.selected = Some(i);
        Ok(())
    }

    async fn scroll_into_view(&self, _handle: &CardHandle) -> Result<(), HarvestError> {
        let state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }
        Ok(())
    }

    async fn scroll_feed_to_bottom(&self) -> Result<(), HarvestError> {
        let mut state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }
        state.scrolls += 1;
        state.visible = (state.visible + state.grow_per_scroll).min(state.cards.len());
        if state
            .end_marker_after_scrolls
            .is_some_and(|n| state.scrolls >= n)
        {
            state.end_marker_visible = true;
        }
        Ok(())
    }

    async fn current_page_text(&self) -> Result<String, HarvestError> {
        let state = self.state.lock().unwrap();
        if state.crashed {
            return Err(Self::crashed_err());
        }

        let mut lines: Vec<String> = state
            .cards
            .iter()
            .take(state.visible)
            .map(|c| c.name.clone())
            .collect();
        if let Some(card) = state.selected.and_then(|i| state.cards.get(i)) {
            if card.phone_channel == PhoneChannel::PageText {
                if let Some(phone) = &card.phone {
                    lines.push(phone.clone());
                }
            }
        }
        if state.end_marker_visible {
            lines.push(END_OF_RESULTS_MARKER.to_string());
        }
        Ok(lines.join("\n"))
    }

    async fn close(&self) -> Result<(), HarvestError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Hands out pre-built renderers in order; once the script runs dry, every
/// `create` fails like a renderer that will not start.
pub struct SimRendererFactory {
    script: Mutex<VecDeque<SimRenderer>>,
    creations: Arc<AtomicUsize>,
}

impl SimRendererFactory {
    pub fn scripted(renderers: Vec<SimRenderer>) -> Self {
        Self {
            script: Mutex::new(renderers.into()),
            creations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `create` calls, valid after the factory moves away.
    pub fn creation_counter(&self) -> Arc<AtomicUsize> {
        self.creations.clone()
    }
}

#[async_trait]
impl RendererFactory for SimRendererFactory {
    async fn create(&self) -> Result<Box<dyn Renderer>, HarvestError> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(renderer) => Ok(Box::new(renderer)),
            None => Err(HarvestError::RendererStartup(
                "no scripted renderer available".to_string(),
            )),
        }
    }
}

/// In-memory `LeadStore` applying the same merge rule as the CSV store.
pub struct MemoryStore {
    leads: tokio::sync::Mutex<Vec<Lead>>,
    strategy: DedupeStrategy,
    flushes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(strategy: DedupeStrategy) -> Self {
        Self {
            leads: tokio::sync::Mutex::new(Vec::new()),
            strategy,
            flushes: AtomicUsize::new(0),
        }
    }

    pub async fn unique_count(&self) -> usize {
        self.leads.lock().await.len()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DedupeStrategy::PhoneThenName)
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn load(&self) -> Result<Vec<Lead>, HarvestError> {
        Ok(self.leads.lock().await.clone())
    }

    async fn merge_flush(&self, batch: &[Lead]) -> Result<usize, HarvestError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let mut leads = self.leads.lock().await;
        let merged = merge(std::mem::take(&mut *leads), batch.to_vec(), self.strategy);
        *leads = merged;
        Ok(leads.len())
    }
}
