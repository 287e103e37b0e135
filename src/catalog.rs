//! Catalog HTTP client.
//!
//! Thin, retrying wrapper around the remote catalog REST endpoints. Response
//! payloads are parsed leniently from `serde_json::Value` because the
//! backend's envelope shapes drift between endpoint versions (see
//! `envelope`). The orchestrator talks to the backend through the
//! [`CatalogApi`] trait so tests can script responses without a server.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::envelope::{self, normalize_page, sort_page_items, ProductPage};
use crate::query::QueryIntent;
use crate::util::env::{env_opt, env_parse};

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        // Back off to a char boundary; a byte-index truncate would panic
        // mid-codepoint.
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: env_opt("CATALOG_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080/api".to_string()),
            timeout_secs: env_parse("CATALOG_TIMEOUT_SECS", 15u64),
            retry_attempts: env_parse("CATALOG_RETRY_ATTEMPTS", 3u32),
            retry_base_delay_ms: env_parse("CATALOG_RETRY_BASE_DELAY_MS", 300u64),
            user_agent: env_opt("CATALOG_UA")
                .unwrap_or_else(|| "storefront-discovery/0.1".to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Server-computed facet counts for the current filter set (whole matching
/// set, not one page). Stale snapshots are replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FacetSet {
    pub categories: Vec<CategoryFacet>,
    pub price_ranges: Vec<PriceRangeFacet>,
    pub ratings: Vec<RatingFacet>,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFacet {
    pub id: i64,
    pub name: String,
    pub product_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRangeFacet {
    pub label: String,
    pub min_price: f64,
    /// Absent means "no upper bound"; never a sentinel number.
    pub max_price: Option<f64>,
    pub product_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingFacet {
    pub label: String,
    pub min_rating: f64,
    pub product_count: u64,
}

/// Lightweight shop projection shown beside product results; recomputed per
/// keyword, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopMatch {
    pub id: i64,
    pub name: String,
    pub highlighted_name: String,
    pub logo_url: Option<String>,
    pub product_count: u64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

fn str_of(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(|s| s.to_string())
}

fn count_of(v: &Value) -> u64 {
    v.get("productCount")
        .or_else(|| v.get("count"))
        .and_then(envelope::value_as_u64)
        .unwrap_or(0)
}

pub fn parse_facets(body: &Value) -> FacetSet {
    let mut out = FacetSet::default();
    if let Some(arr) = body.get("categories").and_then(|v| v.as_array()) {
        for c in arr {
            let (Some(id), Some(name)) = (
                c.get("id").and_then(envelope::value_as_i64),
                str_of(c, "name"),
            ) else {
                continue;
            };
            out.categories.push(CategoryFacet {
                id,
                name,
                product_count: count_of(c),
            });
        }
    }
    if let Some(arr) = body.get("priceRanges").and_then(|v| v.as_array()) {
        for r in arr {
            out.price_ranges.push(PriceRangeFacet {
                label: str_of(r, "label").unwrap_or_default(),
                min_price: r
                    .get("minPrice")
                    .and_then(envelope::value_as_f64)
                    .unwrap_or(0.0),
                max_price: r.get("maxPrice").and_then(envelope::value_as_f64),
                product_count: count_of(r),
            });
        }
    }
    if let Some(arr) = body.get("ratings").and_then(|v| v.as_array()) {
        for r in arr {
            out.ratings.push(RatingFacet {
                label: str_of(r, "label").unwrap_or_default(),
                min_rating: r
                    .get("minRating")
                    .and_then(envelope::value_as_f64)
                    .unwrap_or(0.0),
                product_count: count_of(r),
            });
        }
    }
    out.total_count = body
        .get("totalCount")
        .or_else(|| body.get("total"))
        .and_then(envelope::value_as_u64)
        .unwrap_or(0);
    out
}

pub fn parse_shops(body: &Value) -> Vec<ShopMatch> {
    let arr = body
        .get("content")
        .and_then(|v| v.as_array())
        .or_else(|| body.get("items").and_then(|v| v.as_array()))
        .or_else(|| body.as_array());
    let Some(arr) = arr else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|s| {
            let id = s.get("id").and_then(envelope::value_as_i64)?;
            let name = str_of(s, "name")?;
            Some(ShopMatch {
                highlighted_name: str_of(s, "highlightedName").unwrap_or_else(|| name.clone()),
                logo_url: str_of(s, "logoUrl"),
                product_count: count_of(s),
                status: str_of(s, "status").unwrap_or_default(),
                id,
                name,
            })
        })
        .collect()
}

pub fn parse_categories(body: &Value) -> Vec<Category> {
    let arr = body
        .as_array()
        .or_else(|| body.get("content").and_then(|v| v.as_array()));
    let Some(arr) = arr else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|c| {
            Some(Category {
                id: c.get("id").and_then(envelope::value_as_i64)?,
                name: str_of(c, "name")?,
            })
        })
        .collect()
}

/// Backend seam used by the orchestrator. One method per independent fetch
/// kind; the cart mutation stays off this trait because it is never
/// orchestrated.
#[async_trait]
pub trait CatalogApi: Send + Sync + 'static {
    async fn fetch_page(&self, intent: &QueryIntent) -> Result<ProductPage, CatalogError>;
    async fn fetch_facets(&self, intent: &QueryIntent) -> Result<FacetSet, CatalogError>;
    async fn search_shops(&self, keyword: &str, limit: u32)
        -> Result<Vec<ShopMatch>, CatalogError>;
}

#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    cfg: CatalogConfig,
}

impl CatalogClient {
    pub fn new(cfg: CatalogConfig) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .default_headers(headers)
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self, CatalogError> {
        Self::new(CatalogConfig::default())
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.cfg.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET with retries: network errors and 5xx back off and retry up to the
    /// configured attempts; 4xx fail fast.
    async fn get_json(&self, op: &'static str, url: String) -> Result<Value, CatalogError> {
        let mut attempt = 0u32;
        let max_attempts = self.cfg.retry_attempts.max(1);
        let mut delay = Duration::from_millis(self.cfg.retry_base_delay_ms.max(1));

        loop {
            attempt += 1;
            let t0 = Instant::now();
            info!(op, url = %url, attempt, "catalog request");

            let resp = match self.http.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(op, attempt, error = ?e, "catalog network error");
                    if attempt >= max_attempts {
                        return Err(CatalogError::Net(e));
                    }
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    continue;
                }
            };

            let status = resp.status();
            let body = match resp.text().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(op, attempt, error = ?e, "catalog body read error");
                    if attempt >= max_attempts {
                        return Err(CatalogError::Net(e));
                    }
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    continue;
                }
            };

            let elapsed = t0.elapsed().as_millis();
            info!(op, status = %status.as_u16(), body_len = body.len(), elapsed_ms = %elapsed, "catalog response");

            if !status.is_success() {
                if status.as_u16() >= 500 {
                    warn!(op, status = %status.as_u16(), "catalog server error, will retry if attempts remain");
                    if attempt >= max_attempts {
                        return Err(CatalogError::Http {
                            status: status.as_u16(),
                            body: truncate_for_log(body, 2000),
                        });
                    }
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    continue;
                }
                let sample = truncate_for_log(body, 2000);
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    error!(op, status = %status.as_u16(), body = %sample, "catalog auth/forbidden");
                } else {
                    warn!(op, status = %status.as_u16(), body = %sample, "catalog client error");
                }
                return Err(CatalogError::Http {
                    status: status.as_u16(),
                    body: sample,
                });
            }

            return Ok(serde_json::from_str(&body)?);
        }
    }

    /// `GET products?page,size` — unfiltered listing.
    pub async fn list_products(&self, page: u32, size: u32) -> Result<Value, CatalogError> {
        let url = format!("{}?page={page}&size={size}", self.url("products"));
        self.get_json("list_products", url).await
    }

    /// `GET products/search` with every set filter dimension.
    pub async fn search_products(&self, intent: &QueryIntent) -> Result<Value, CatalogError> {
        let mut url = format!(
            "{}?page={}&size={}&sortBy={}",
            self.url("products/search"),
            intent.page_index,
            intent.page_size,
            intent.sort_by.as_param()
        );
        if !intent.keyword.is_empty() {
            url.push_str(&format!(
                "&keyword={}",
                urlencoding::encode(&intent.keyword)
            ));
        }
        if let Some(id) = intent.category_id {
            url.push_str(&format!("&categoryId={id}"));
        }
        if let Some(v) = intent.price_min {
            url.push_str(&format!("&minPrice={v}"));
        }
        if let Some(v) = intent.price_max {
            url.push_str(&format!("&maxPrice={v}"));
        }
        if let Some(v) = intent.min_rating {
            url.push_str(&format!("&minRating={v}"));
        }
        self.get_json("search_products", url).await
    }

    /// `GET categories` — flat listing used to seed the filter sidebar.
    pub async fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
        let body = self.get_json("list_categories", self.url("categories")).await?;
        Ok(parse_categories(&body))
    }

    /// `POST cart/items` — fire-and-forget collaborator, no retry loop.
    pub async fn add_to_cart(&self, variant_id: i64, quantity: u32) -> Result<(), CatalogError> {
        let url = self.url("cart/items");
        info!(variant_id, quantity, "cart add");
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "variantId": variant_id, "quantity": quantity }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 2000);
            warn!(status = %status.as_u16(), body = %body, "cart add failed");
            return Err(CatalogError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    /// Resolve the intent into one normalized page: pick the list-all or
    /// search operation, normalize the envelope, then apply the
    /// presentation-level secondary sort.
    async fn fetch_page(&self, intent: &QueryIntent) -> Result<ProductPage, CatalogError> {
        let body = if intent.is_search() {
            self.search_products(intent).await?
        } else {
            self.list_products(intent.page_index, intent.page_size)
                .await?
        };
        let mut page = normalize_page(&body, intent.page_index, intent.page_size);
        sort_page_items(&mut page.items, intent.sort_by);
        Ok(page)
    }

    /// `GET search/facets` — keyword + filters only; facets describe the
    /// whole matching set, so pagination and sort are excluded.
    async fn fetch_facets(&self, intent: &QueryIntent) -> Result<FacetSet, CatalogError> {
        let mut params: Vec<String> = Vec::new();
        if !intent.keyword.is_empty() {
            params.push(format!("keyword={}", urlencoding::encode(&intent.keyword)));
        }
        if let Some(id) = intent.category_id {
            params.push(format!("categoryId={id}"));
        }
        if let Some(v) = intent.price_min {
            params.push(format!("minPrice={v}"));
        }
        if let Some(v) = intent.price_max {
            params.push(format!("maxPrice={v}"));
        }
        if let Some(v) = intent.min_rating {
            params.push(format!("minRating={v}"));
        }
        let mut url = self.url("search/facets");
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        let body = self.get_json("fetch_facets", url).await?;
        Ok(parse_facets(&body))
    }

    async fn search_shops(
        &self,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<ShopMatch>, CatalogError> {
        let url = format!(
            "{}?keyword={}&limit={limit}",
            self.url("shops/search"),
            urlencoding::encode(keyword)
        );
        let body = self.get_json("search_shops", url).await?;
        let mut shops = parse_shops(&body);
        shops.truncate(limit as usize);
        Ok(shops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_builds_with_default_config() {
        let client = CatalogClient::from_env().unwrap();
        assert!(client.url("products").ends_with("/products"));
        assert_eq!(
            client.url("/products/search"),
            format!(
                "{}/products/search",
                client.cfg.base_url.trim_end_matches('/')
            )
        );
    }

    #[test]
    fn parses_facet_payload() {
        let body = json!({
            "categories": [
                { "id": 5, "name": "Rackets", "productCount": 12 },
                { "name": "missing id, dropped" }
            ],
            "priceRanges": [
                { "label": "under 50", "minPrice": 0, "maxPrice": 50, "productCount": 7 },
                { "label": "over 200", "minPrice": 200, "productCount": 2 }
            ],
            "ratings": [
                { "label": "4 and up", "minRating": 4, "productCount": 9 }
            ],
            "totalCount": 21
        });
        let facets = parse_facets(&body);
        assert_eq!(facets.categories.len(), 1);
        assert_eq!(facets.categories[0].id, 5);
        assert_eq!(facets.price_ranges.len(), 2);
        assert_eq!(facets.price_ranges[1].max_price, None);
        assert_eq!(facets.ratings[0].min_rating, 4.0);
        assert_eq!(facets.total_count, 21);
    }

    #[test]
    fn parses_shop_payload_with_fallback_highlight() {
        let body = json!({
            "content": [
                {
                    "id": 3,
                    "name": "Tennis World",
                    "highlightedName": "<b>Tennis</b> World",
                    "logoUrl": "https://cdn.example/logo.png",
                    "productCount": 40,
                    "status": "active"
                },
                { "id": 4, "name": "Plain Shop" }
            ]
        });
        let shops = parse_shops(&body);
        assert_eq!(shops.len(), 2);
        assert_eq!(shops[0].highlighted_name, "<b>Tennis</b> World");
        assert_eq!(shops[1].highlighted_name, "Plain Shop");
        assert_eq!(shops[1].logo_url, None);
    }

    #[test]
    fn parses_bare_and_wrapped_category_lists() {
        let bare = json!([{ "id": 1, "name": "Rackets" }]);
        let wrapped = json!({ "content": [{ "id": 1, "name": "Rackets" }] });
        assert_eq!(parse_categories(&bare), parse_categories(&wrapped));
        assert_eq!(parse_categories(&bare).len(), 1);
    }

    #[test]
    fn truncates_long_log_bodies() {
        let out = truncate_for_log("x".repeat(50), 10);
        assert!(out.starts_with("xxxxxxxxxx"));
        assert!(out.ends_with('…'));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 667 three-byte chars = 2001 bytes; the 2000-byte cut lands
        // mid-codepoint.
        let out = truncate_for_log("€".repeat(667), 2000);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().filter(|c| *c == '€').count(), 666);

        let mixed = truncate_for_log("aé".repeat(100), 7);
        assert!(mixed.is_char_boundary(mixed.len()));
        assert!(mixed.ends_with('…'));

        // Short bodies pass through untouched.
        assert_eq!(truncate_for_log("café".into(), 10), "café");
    }
}
