//! leadharvest — harvests business-contact leads from an infinite-scroll
//! listing source, scores them for brand ownership, and merges worker output
//! into one deduplicated dataset.

pub mod crawler;
pub mod csv;
pub mod dedupe;
pub mod extractor;
pub mod harvest;
pub mod planner;
pub mod renderer;
pub mod scoring;
pub mod selectors;
pub mod store;
pub mod worker;

#[cfg(feature = "test-support")]
pub mod testing;
