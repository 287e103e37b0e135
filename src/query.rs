//! Search intent and its URL-parameter codec.
//!
//! `QueryIntent` is the single authoritative description of what the user
//! wants to see. The codec below is the explicit bidirectional mapping to the
//! browser-addressable query string: serialization omits absent/default
//! fields to keep URLs minimal, and parsing is defensive (malformed values
//! fall back to absent/default rather than erroring).

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Storefront default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortBy {
    #[default]
    Newest,
    Name,
    PriceAsc,
    PriceDesc,
}

impl SortBy {
    /// Wire name used both on the search endpoint and in CLI flags.
    pub fn as_param(&self) -> &'static str {
        match self {
            SortBy::Newest => "newest",
            SortBy::Name => "name",
            SortBy::PriceAsc => "price-asc",
            SortBy::PriceDesc => "price-desc",
        }
    }

    pub fn from_param(s: &str) -> Option<Self> {
        match s {
            "newest" => Some(SortBy::Newest),
            "name" => Some(SortBy::Name),
            "price-asc" => Some(SortBy::PriceAsc),
            "price-desc" => Some(SortBy::PriceDesc),
            _ => None,
        }
    }
}

/// Complete, current description of the desired results.
///
/// `price_max` equal to "no upper bound" is represented as `None`, never as
/// infinity, so the wire boundary never sees a sentinel number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    /// Committed keyword, trimmed; empty means "no keyword".
    pub keyword: String,
    pub category_id: Option<i64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    /// 1-5 inclusive when present.
    pub min_rating: Option<f64>,
    pub sort_by: SortBy,
    /// 0-based.
    pub page_index: u32,
    /// Constant for the session.
    pub page_size: u32,
}

impl Default for QueryIntent {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl QueryIntent {
    pub fn new(page_size: u32) -> Self {
        Self {
            keyword: String::new(),
            category_id: None,
            price_min: None,
            price_max: None,
            min_rating: None,
            sort_by: SortBy::default(),
            page_index: 0,
            page_size: page_size.max(1),
        }
    }

    /// Any non-keyword filter dimension set?
    pub fn has_filters(&self) -> bool {
        self.category_id.is_some()
            || self.price_min.is_some()
            || self.price_max.is_some()
            || self.min_rating.is_some()
    }

    /// Whether the search operation (rather than list-all) must be used.
    pub fn is_search(&self) -> bool {
        !self.keyword.is_empty() || self.has_filters()
    }

    /// Merge changed filter fields and reset pagination to the first page.
    pub fn apply_filters(&mut self, patch: &FilterPatch) {
        if let Some(v) = patch.category_id {
            self.category_id = v;
        }
        if let Some(v) = patch.price_min {
            self.price_min = v;
        }
        if let Some(v) = patch.price_max {
            self.price_max = v;
        }
        if let Some(v) = patch.min_rating {
            self.min_rating = v;
        }
        self.page_index = 0;
    }
}

/// Partial filter update. Outer `None` leaves a field untouched; inner
/// `None` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPatch {
    pub category_id: Option<Option<i64>>,
    pub price_min: Option<Option<f64>>,
    pub price_max: Option<Option<f64>>,
    pub min_rating: Option<Option<f64>>,
}

impl FilterPatch {
    pub fn category(mut self, id: Option<i64>) -> Self {
        self.category_id = Some(id);
        self
    }

    pub fn price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.price_min = Some(min);
        self.price_max = Some(max);
        self
    }

    pub fn min_rating(mut self, rating: Option<f64>) -> Self {
        self.min_rating = Some(rating);
        self
    }
}

/// Serialize the shareable portion of the intent (keyword + filters).
///
/// Page and sort are deliberately not persisted: a reloaded URL reproduces
/// the filters at page 0 with the default sort.
pub fn to_query_string(intent: &QueryIntent) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !intent.keyword.is_empty() {
        parts.push(format!("keyword={}", urlencoding::encode(&intent.keyword)));
    }
    if let Some(id) = intent.category_id {
        parts.push(format!("category={id}"));
    }
    if let Some(v) = intent.price_min {
        parts.push(format!("minPrice={v}"));
    }
    if let Some(v) = intent.price_max {
        parts.push(format!("maxPrice={v}"));
    }
    if let Some(v) = intent.min_rating {
        parts.push(format!("minRating={v}"));
    }
    parts.join("&")
}

/// Parse a query string (with or without a leading `?`) back into an intent.
///
/// Unknown parameters are ignored; malformed numbers (non-numeric, negative
/// prices, out-of-range ratings) fall back to absent. A `page` parameter is
/// intentionally not read back, so reloads always land on page 0.
pub fn parse_query_string(qs: &str, page_size: u32) -> QueryIntent {
    let mut intent = QueryIntent::new(page_size);
    let qs = qs.trim_start_matches('?');
    for (key, value) in form_urlencoded::parse(qs.as_bytes()) {
        match key.as_ref() {
            "keyword" => intent.keyword = value.trim().to_string(),
            "category" => {
                intent.category_id = value.parse::<i64>().ok().filter(|id| *id >= 0);
            }
            "minPrice" => intent.price_min = parse_price(&value),
            "maxPrice" => intent.price_max = parse_price(&value),
            "minRating" => {
                intent.min_rating = value
                    .parse::<f64>()
                    .ok()
                    .filter(|r| (1.0..=5.0).contains(r));
            }
            _ => {}
        }
    }
    intent
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_only_present_fields() {
        let mut intent = QueryIntent::default();
        assert_eq!(to_query_string(&intent), "");

        intent.keyword = "tennis racket".into();
        intent.category_id = Some(5);
        intent.price_max = Some(99.5);
        assert_eq!(
            to_query_string(&intent),
            "keyword=tennis%20racket&category=5&maxPrice=99.5"
        );
    }

    #[test]
    fn round_trips_filter_fields() {
        let mut intent = QueryIntent::default();
        intent.keyword = "tennis".into();
        intent.category_id = Some(5);
        intent.price_min = Some(10.0);
        intent.price_max = Some(250.0);
        intent.min_rating = Some(4.0);
        intent.sort_by = SortBy::PriceAsc;
        intent.page_index = 3;

        let parsed = parse_query_string(&to_query_string(&intent), DEFAULT_PAGE_SIZE);
        assert_eq!(parsed.keyword, intent.keyword);
        assert_eq!(parsed.category_id, intent.category_id);
        assert_eq!(parsed.price_min, intent.price_min);
        assert_eq!(parsed.price_max, intent.price_max);
        assert_eq!(parsed.min_rating, intent.min_rating);
        // Page and sort are not persisted.
        assert_eq!(parsed.page_index, 0);
        assert_eq!(parsed.sort_by, SortBy::Newest);
    }

    #[test]
    fn malformed_parameters_fall_back_to_absent() {
        let parsed = parse_query_string(
            "?category=abc&minPrice=-3&maxPrice=banana&minRating=9&page=-2",
            DEFAULT_PAGE_SIZE,
        );
        assert_eq!(parsed.category_id, None);
        assert_eq!(parsed.price_min, None);
        assert_eq!(parsed.price_max, None);
        assert_eq!(parsed.min_rating, None);
        assert_eq!(parsed.page_index, 0);
    }

    #[test]
    fn filter_patch_resets_page() {
        let mut intent = QueryIntent::default();
        intent.keyword = "tennis".into();
        intent.page_index = 2;

        intent.apply_filters(&FilterPatch::default().category(Some(5)));
        assert_eq!(intent.category_id, Some(5));
        assert_eq!(intent.page_index, 0);
        assert_eq!(intent.keyword, "tennis");

        // Clearing a field goes through the same patch shape.
        intent.page_index = 4;
        intent.apply_filters(&FilterPatch::default().category(None));
        assert_eq!(intent.category_id, None);
        assert_eq!(intent.page_index, 0);
    }

    #[test]
    fn untouched_patch_fields_survive() {
        let mut intent = QueryIntent::default();
        intent.price_min = Some(10.0);
        intent.apply_filters(&FilterPatch::default().min_rating(Some(3.0)));
        assert_eq!(intent.price_min, Some(10.0));
        assert_eq!(intent.min_rating, Some(3.0));
    }

    #[test]
    fn sort_params_round_trip() {
        for sort in [
            SortBy::Newest,
            SortBy::Name,
            SortBy::PriceAsc,
            SortBy::PriceDesc,
        ] {
            assert_eq!(SortBy::from_param(sort.as_param()), Some(sort));
        }
        assert_eq!(SortBy::from_param("rating"), None);
    }
}
