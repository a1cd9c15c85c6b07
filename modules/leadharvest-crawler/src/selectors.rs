//! Default CSS selectors for the listing source. Kept in one place so the
//! extractor config and the simulation harness agree on them.

/// The virtualized scroll container holding listing cards.
pub const FEED: &str = "div[role='feed']";

/// One listing card in the feed.
pub const CARD: &str = "div[role='article']";

/// Business name heading in the opened detail view.
pub const DETAIL_NAME: &str = "h1.DUwDvf";

/// Labelled call/phone control in the detail view.
pub const PHONE_BUTTON: &str = "button[aria-label*='Phone'], button[aria-label*='Call']";

/// `tel:`-scheme links anywhere in the detail view.
pub const TEL_LINK: &str = "a[href^='tel:']";

pub const WEBSITE_LINK: &str = "a[aria-label*='Website']";

pub const CATEGORY_BUTTON: &str = "button[aria-label*='Category']";

pub const ADDRESS_BUTTON: &str = "button[aria-label*='Address']";

/// Star-rating element; the rating value lives in its aria-label.
pub const RATING: &str = "span[role='img'][aria-label*='star']";

pub const REVIEWS_BUTTON: &str = "button[aria-label*='review']";
