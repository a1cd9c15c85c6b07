//! Field extraction from an opened listing detail view. Each field goes
//! through an ordered fallback chain and tolerates its own failures; only a
//! renderer-fatal fault aborts extraction.

use regex::Regex;

use leadharvest_common::HarvestError;

use crate::renderer::{CardHandle, Renderer};
use crate::selectors;

/// Telephone shape for the free-text sweep: 10-14 digits, optionally prefixed
/// by a country code, with spaces/dashes tolerated.
const PHONE_SWEEP_PATTERN: &str = r"\+?\d[\d\s\-]{9,14}";

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub name_selector: String,
    pub phone_button_selector: String,
    pub tel_link_selector: String,
    pub website_selector: String,
    pub category_selector: String,
    pub address_selector: String,
    pub rating_selector: String,
    pub reviews_selector: String,
    /// Placeholder/support numbers rejected even when matched.
    pub blocked_numbers: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            name_selector: selectors::DETAIL_NAME.to_string(),
            phone_button_selector: selectors::PHONE_BUTTON.to_string(),
            tel_link_selector: selectors::TEL_LINK.to_string(),
            website_selector: selectors::WEBSITE_LINK.to_string(),
            category_selector: selectors::CATEGORY_BUTTON.to_string(),
            address_selector: selectors::ADDRESS_BUTTON.to_string(),
            rating_selector: selectors::RATING.to_string(),
            reviews_selector: selectors::REVIEWS_BUTTON.to_string(),
            blocked_numbers: Vec::new(),
        }
    }
}

/// Normalized field set for one opened card. The name is extracted by the
/// crawler (it drives the seen-set); everything else is extracted here.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    pub phone: String,
    pub website: String,
    pub category: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
}

/// Ordered phone-extraction strategies; the first one yielding a valid
/// normalized number wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhoneStrategy {
    /// Text/aria-label of labelled call/phone controls.
    LabelledControl,
    /// `tel:`-scheme link hrefs.
    TelLink,
    /// Regex sweep of the full rendered page text.
    PageSweep,
}

const PHONE_STRATEGIES: [PhoneStrategy; 3] = [
    PhoneStrategy::LabelledControl,
    PhoneStrategy::TelLink,
    PhoneStrategy::PageSweep,
];

pub struct Extractor {
    config: ExtractorConfig,
    sweep_re: Regex,
    float_re: Regex,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            sweep_re: Regex::new(PHONE_SWEEP_PATTERN).expect("valid phone sweep regex"),
            float_re: Regex::new(r"\d+(?:\.\d+)?").expect("valid float regex"),
        }
    }

    /// Extract all fields from the currently opened detail view. Individual
    /// field failures leave that field empty; only renderer-fatal faults
    /// propagate.
    pub async fn extract(&self, renderer: &dyn Renderer) -> Result<ExtractedFields, HarvestError> {
        let mut fields = ExtractedFields {
            phone: self.phone(renderer).await?.unwrap_or_default(),
            website: self
                .first_attribute(renderer, &self.config.website_selector, "href")
                .await?
                .unwrap_or_default(),
            category: self
                .first_text(renderer, &self.config.category_selector)
                .await?
                .unwrap_or_default(),
            address: self
                .first_text(renderer, &self.config.address_selector)
                .await?
                .unwrap_or_default(),
            ..Default::default()
        };

        let (city, state) = split_address(&fields.address);
        fields.city = city;
        fields.state = state;

        fields.rating = self
            .first_attribute(renderer, &self.config.rating_selector, "aria-label")
            .await?
            .and_then(|label| self.parse_rating(&label));

        fields.review_count = self
            .first_text(renderer, &self.config.reviews_selector)
            .await?
            .and_then(|text| parse_review_count(&text));

        Ok(fields)
    }

    async fn phone(&self, renderer: &dyn Renderer) -> Result<Option<String>, HarvestError> {
        for strategy in PHONE_STRATEGIES {
            let found = match strategy {
                PhoneStrategy::LabelledControl => self.phone_from_controls(renderer).await?,
                PhoneStrategy::TelLink => self.phone_from_tel_links(renderer).await?,
                PhoneStrategy::PageSweep => self.phone_from_page_sweep(renderer).await?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    async fn phone_from_controls(
        &self,
        renderer: &dyn Renderer,
    ) -> Result<Option<String>, HarvestError> {
        let handles = self
            .query_tolerant(renderer, &self.config.phone_button_selector)
            .await?;
        for handle in &handles {
            for candidate in [
                self.text_tolerant(renderer, handle).await?,
                self.attribute_tolerant(renderer, handle, "aria-label").await?,
            ] {
                if let Some(phone) =
                    candidate.and_then(|c| normalize_phone(&c, &self.config.blocked_numbers))
                {
                    return Ok(Some(phone));
                }
            }
        }
        Ok(None)
    }

    async fn phone_from_tel_links(
        &self,
        renderer: &dyn Renderer,
    ) -> Result<Option<String>, HarvestError> {
        let handles = self
            .query_tolerant(renderer, &self.config.tel_link_selector)
            .await?;
        for handle in &handles {
            if let Some(phone) = self
                .attribute_tolerant(renderer, handle, "href")
                .await?
                .and_then(|href| normalize_phone(&href, &self.config.blocked_numbers))
            {
                return Ok(Some(phone));
            }
        }
        Ok(None)
    }

    async fn phone_from_page_sweep(
        &self,
        renderer: &dyn Renderer,
    ) -> Result<Option<String>, HarvestError> {
        let page = match renderer.current_page_text().await {
            Ok(text) => text,
            Err(e) if e.is_renderer_fatal() => return Err(e),
            Err(_) => return Ok(None),
        };
        for candidate in self.sweep_re.find_iter(&page) {
            if let Some(phone) = normalize_phone(candidate.as_str(), &self.config.blocked_numbers) {
                return Ok(Some(phone));
            }
        }
        Ok(None)
    }

    fn parse_rating(&self, label: &str) -> Option<f32> {
        self.float_re.find(label)?.as_str().parse().ok()
    }

    /// First matching element's text, or None. Per-card faults are absorbed.
    async fn first_text(
        &self,
        renderer: &dyn Renderer,
        selector: &str,
    ) -> Result<Option<String>, HarvestError> {
        let handles = self.query_tolerant(renderer, selector).await?;
        match handles.first() {
            Some(handle) => {
                let text = self.text_tolerant(renderer, handle).await?;
                Ok(text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
            }
            None => Ok(None),
        }
    }

    async fn first_attribute(
        &self,
        renderer: &dyn Renderer,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        let handles = self.query_tolerant(renderer, selector).await?;
        match handles.first() {
            Some(handle) => {
                let value = self.attribute_tolerant(renderer, handle, name).await?;
                Ok(value.filter(|v| !v.is_empty()))
            }
            None => Ok(None),
        }
    }

    async fn query_tolerant(
        &self,
        renderer: &dyn Renderer,
        selector: &str,
    ) -> Result<Vec<CardHandle>, HarvestError> {
        match renderer.query_all(selector).await {
            Ok(handles) => Ok(handles),
            Err(e) if e.is_renderer_fatal() => Err(e),
            Err(_) => Ok(Vec::new()),
        }
    }

    async fn text_tolerant(
        &self,
        renderer: &dyn Renderer,
        handle: &CardHandle,
    ) -> Result<Option<String>, HarvestError> {
        match renderer.text(handle).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.is_renderer_fatal() => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn attribute_tolerant(
        &self,
        renderer: &dyn Renderer,
        handle: &CardHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        match renderer.attribute(handle, name).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_renderer_fatal() => Err(e),
            Err(_) => Ok(None),
        }
    }
}

/// Strip everything except digits and a leading `+`. Results shorter than 10
/// characters or containing a blocked number are rejected.
pub fn normalize_phone(raw: &str, blocked: &[String]) -> Option<String> {
    let mut out = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            out.push(ch);
        } else if ch == '+' && out.is_empty() {
            out.push('+');
        }
    }

    if out.len() < 10 {
        return None;
    }
    if blocked.iter().any(|b| !b.is_empty() && out.contains(b.as_str())) {
        return None;
    }
    Some(out)
}

/// City and state are the last two comma-segments of the address; both empty
/// when fewer than two segments exist.
pub fn split_address(address: &str) -> (String, String) {
    let parts: Vec<&str> = address.split(',').collect();
    if parts.len() < 2 {
        return (String::new(), String::new());
    }
    (
        parts[parts.len() - 2].trim().to_string(),
        parts[parts.len() - 1].trim().to_string(),
    )
}

fn parse_review_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_normalization_strips_separators() {
        assert_eq!(
            normalize_phone("+91 98765-43210", &[]),
            Some("+919876543210".to_string())
        );
        assert_eq!(
            normalize_phone("tel:+919876543210", &[]),
            Some("+919876543210".to_string())
        );
        assert_eq!(
            normalize_phone("098 765 43210", &[]),
            Some("09876543210".to_string())
        );
    }

    #[test]
    fn short_phones_are_rejected() {
        assert_eq!(normalize_phone("98765", &[]), None);
        assert_eq!(normalize_phone("+9 1 2 3", &[]), None);
        assert_eq!(normalize_phone("", &[]), None);
    }

    #[test]
    fn blocked_numbers_are_rejected() {
        let blocked = vec!["9999999776".to_string()];
        assert_eq!(normalize_phone("99999 99776", &blocked), None);
        assert_eq!(
            normalize_phone("98765 43210", &blocked),
            Some("9876543210".to_string())
        );
    }

    #[test]
    fn plus_is_only_kept_when_leading() {
        assert_eq!(
            normalize_phone("98765+43210 11", &[]),
            Some("987654321011".to_string())
        );
    }

    #[test]
    fn address_split_takes_last_two_segments() {
        let (city, state) = split_address("Plot 4, MIA Industrial Area, Jaipur, Rajasthan");
        assert_eq!(city, "Jaipur");
        assert_eq!(state, "Rajasthan");

        let (city, state) = split_address("Jaipur");
        assert_eq!(city, "");
        assert_eq!(state, "");

        let (city, state) = split_address("");
        assert_eq!(city, "");
        assert_eq!(state, "");
    }

    #[test]
    fn review_count_parses_digits_only() {
        assert_eq!(parse_review_count("1,204 reviews"), Some(1204));
        assert_eq!(parse_review_count("no reviews"), None);
    }

    #[test]
    fn rating_parses_leading_float_from_label() {
        let extractor = Extractor::new(ExtractorConfig::default());
        assert_eq!(extractor.parse_rating("4.6 stars"), Some(4.6));
        assert_eq!(extractor.parse_rating("5 stars"), Some(5.0));
        assert_eq!(extractor.parse_rating("stars"), None);
    }
}
