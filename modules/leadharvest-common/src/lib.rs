pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::HarvestError;
pub use types::{
    BackoffPolicy, BlacklistMode, ConfidenceTier, DedupeStrategy, Lead, LeadStatus, Query,
};
