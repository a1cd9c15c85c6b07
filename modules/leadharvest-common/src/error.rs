use thiserror::Error;

/// Error taxonomy for the harvest pipeline. Variants map one-to-one onto the
/// recovery levels: per-card (`StaleElement`, `ElementNotFound`), per-query
/// (`NavigationTimeout`), renderer-fatal (`RendererCrashed`), startup-fatal
/// (`RendererStartup`), and persistence.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timed out waiting for feed to load: {0}")]
    NavigationTimeout(String),

    #[error("Element no longer attached to the document")]
    StaleElement,

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Renderer session unusable: {0}")]
    RendererCrashed(String),

    #[error("Renderer could not be started: {0}")]
    RendererStartup(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl HarvestError {
    /// True when the whole automation session is unusable and the supervisor
    /// must replace the renderer and restart the current query.
    pub fn is_renderer_fatal(&self) -> bool {
        matches!(self, HarvestError::RendererCrashed(_))
    }

    /// True when only the current card is affected and the crawl should skip it.
    pub fn is_per_card(&self) -> bool {
        matches!(
            self,
            HarvestError::StaleElement | HarvestError::ElementNotFound(_)
        )
    }
}
