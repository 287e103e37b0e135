//! Page-envelope normalization.
//!
//! The catalog backend has shipped three envelope generations: pagination
//! metadata nested under a `page` object, flat fields on the payload, and an
//! older shape with no metadata at all. Normalization probes each location in
//! that priority order and derives whatever is missing, so callers always see
//! one `ProductPage` shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::SortBy;

/// Lenient projection of one catalog product. Unknown fields are ignored and
/// missing optional fields become `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub base_price: f64,
    pub discounted_price: Option<f64>,
    pub image_url: Option<String>,
    pub average_rating: Option<f64>,
    pub sold_count: Option<u64>,
}

/// Normalized paging result.
///
/// A successfully normalized page always has `total_pages >= 1`, even for an
/// empty result set, so pager rendering stays well-defined. `total_pages == 0`
/// is reserved for the fetch-failure shape (`empty_error`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total_elements: u64,
    pub total_pages: u32,
    /// Echo of the requested page index.
    pub page_index: u32,
}

impl ProductPage {
    /// The shape published when the product fetch fails outright.
    pub fn empty_error(page_index: u32) -> Self {
        Self {
            items: Vec::new(),
            total_elements: 0,
            total_pages: 0,
            page_index,
        }
    }

    pub fn is_error(&self) -> bool {
        self.total_pages == 0
    }
}

pub(crate) fn value_as_f64(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    if let Some(n) = v.as_i64() {
        return Some(n as f64);
    }
    if let Some(s) = v.as_str() {
        return s.parse::<f64>().ok();
    }
    None
}

pub(crate) fn value_as_i64(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(s) = v.as_str() {
        return s.parse::<i64>().ok();
    }
    None
}

pub(crate) fn value_as_u64(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    if let Some(s) = v.as_str() {
        return s.parse::<u64>().ok();
    }
    None
}

fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| v.as_str())
        .map(|s| s.to_string())
}

fn f64_field(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(value_as_f64)
}

/// Parse one product object; entries without an id or a display name are
/// dropped rather than failing the page.
pub fn parse_product(v: &Value) -> Option<Product> {
    let id = v.get("id").and_then(value_as_i64)?;
    let name = str_field(v, &["name", "productName", "title"])?;
    Some(Product {
        id,
        name,
        base_price: f64_field(v, &["basePrice", "price", "minPrice"]).unwrap_or(0.0),
        discounted_price: f64_field(v, &["discountedPrice", "salePrice"]),
        image_url: str_field(v, &["imageUrl", "thumbnailUrl", "image"]),
        average_rating: f64_field(v, &["averageRating", "rating"]),
        sold_count: v
            .get("soldCount")
            .or_else(|| v.get("sold"))
            .and_then(value_as_u64),
    })
}

fn extract_items(body: &Value) -> Vec<Product> {
    let arr = body
        .get("content")
        .and_then(|v| v.as_array())
        .or_else(|| body.get("items").and_then(|v| v.as_array()))
        .or_else(|| body.get("products").and_then(|v| v.as_array()))
        .or_else(|| body.as_array());
    match arr {
        Some(items) => items.iter().filter_map(parse_product).collect(),
        None => Vec::new(),
    }
}

#[derive(Debug, Default)]
struct PageMeta {
    total_elements: Option<u64>,
    total_pages: Option<u32>,
}

fn u64_meta(obj: &Value, camel: &str, snake: &str) -> Option<u64> {
    obj.get(camel)
        .or_else(|| obj.get(snake))
        .and_then(value_as_u64)
}

/// Probe pagination metadata: nested `page` object first, then flat fields.
fn extract_meta(body: &Value) -> PageMeta {
    let source = body
        .get("page")
        .filter(|p| p.is_object())
        .unwrap_or(body);
    PageMeta {
        total_elements: u64_meta(source, "totalElements", "total_elements")
            .or_else(|| u64_meta(source, "total", "totalCount")),
        total_pages: u64_meta(source, "totalPages", "total_pages").map(|v| v as u32),
    }
}

/// Normalize a raw page envelope for the request that produced it.
pub fn normalize_page(body: &Value, page_index: u32, page_size: u32) -> ProductPage {
    let page_size = page_size.max(1);
    let mut items = extract_items(body);
    // Invariant: never publish more than one page's worth.
    items.truncate(page_size as usize);

    let meta = extract_meta(body);
    let total_elements = meta.total_elements.unwrap_or(items.len() as u64);
    let total_pages = meta
        .total_pages
        .unwrap_or_else(|| total_elements.div_ceil(page_size as u64) as u32)
        // Keep pager rendering well-defined for empty result sets.
        .max(1);

    ProductPage {
        items,
        total_elements,
        total_pages,
        page_index,
    }
}

/// Deterministic presentation-level re-ordering of the current page only.
/// This is not a substitute for server-side sorting across pages.
pub fn sort_page_items(items: &mut [Product], sort_by: SortBy) {
    match sort_by {
        SortBy::Name => items.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        }),
        SortBy::PriceAsc => items.sort_by(|a, b| {
            a.base_price
                .total_cmp(&b.base_price)
                .then_with(|| a.id.cmp(&b.id))
        }),
        SortBy::PriceDesc => items.sort_by(|a, b| {
            b.base_price
                .total_cmp(&a.base_price)
                .then_with(|| a.id.cmp(&b.id))
        }),
        SortBy::Newest => items.sort_by(|a, b| b.id.cmp(&a.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(id: i64, name: &str, price: f64) -> Value {
        json!({ "id": id, "name": name, "basePrice": price })
    }

    #[test]
    fn nested_page_object_takes_priority() {
        let body = json!({
            "content": [product(1, "Racket", 89.0)],
            "page": { "size": 12, "number": 0, "totalElements": 37, "totalPages": 4 },
            // Conflicting flat fields must lose to the nested object.
            "totalElements": 999,
            "totalPages": 99
        });
        let page = normalize_page(&body, 0, 12);
        assert_eq!(page.total_elements, 37);
        assert_eq!(page.total_pages, 4);
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn flat_fields_are_second_choice() {
        let body = json!({
            "content": [product(1, "Racket", 89.0)],
            "totalElements": 25,
            "totalPages": 3
        });
        let page = normalize_page(&body, 1, 12);
        assert_eq!(page.total_elements, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page_index, 1);
    }

    #[test]
    fn missing_total_pages_is_derived() {
        let body = json!({
            "items": [product(1, "Racket", 89.0)],
            "totalElements": 25
        });
        let page = normalize_page(&body, 0, 12);
        assert_eq!(page.total_pages, 3); // ceil(25 / 12)
    }

    #[test]
    fn bare_legacy_shape_falls_back_to_one_page() {
        let body = json!([product(1, "Racket", 89.0), product(2, "Balls", 9.5)]);
        let page = normalize_page(&body, 0, 12);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_elements, 2);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn envelope_variants_normalize_identically() {
        let items = vec![product(1, "Racket", 89.0)];
        let nested = json!({
            "content": items,
            "page": { "size": 12, "number": 0, "totalElements": 1, "totalPages": 1 }
        });
        let flat = json!({
            "content": [product(1, "Racket", 89.0)],
            "totalElements": 1,
            "totalPages": 1
        });
        let legacy = json!([product(1, "Racket", 89.0)]);

        let a = normalize_page(&nested, 0, 12);
        let b = normalize_page(&flat, 0, 12);
        let c = normalize_page(&legacy, 0, 12);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn empty_result_keeps_at_least_one_page() {
        let body = json!({ "content": [], "totalElements": 0, "totalPages": 0 });
        let page = normalize_page(&body, 0, 12);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
        assert!(!page.is_error());
        assert!(ProductPage::empty_error(0).is_error());
    }

    #[test]
    fn oversized_pages_are_truncated() {
        let body = json!({
            "content": (0..20).map(|i| product(i, "p", 1.0)).collect::<Vec<_>>(),
            "totalElements": 20
        });
        let page = normalize_page(&body, 0, 12);
        assert_eq!(page.items.len(), 12);
    }

    #[test]
    fn unparseable_entries_are_dropped() {
        let body = json!({
            "content": [product(1, "Racket", 89.0), { "garbage": true }, { "id": 2 }]
        });
        let page = normalize_page(&body, 0, 12);
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn numeric_fields_accept_string_payloads() {
        let body = json!({
            "content": [{ "id": "7", "name": "Racket", "price": "12.50" }]
        });
        let page = normalize_page(&body, 0, 12);
        assert_eq!(page.items[0].id, 7);
        assert_eq!(page.items[0].base_price, 12.5);
    }

    #[test]
    fn secondary_sorts_are_deterministic() {
        let mut items: Vec<Product> = [
            (3, "banana", 5.0),
            (1, "Apple", 9.0),
            (2, "cherry", 5.0),
        ]
        .into_iter()
        .map(|(id, name, price)| {
            parse_product(&product(id, name, price)).unwrap()
        })
        .collect();

        sort_page_items(&mut items, SortBy::Name);
        assert_eq!(
            items.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 3, 2]
        );

        sort_page_items(&mut items, SortBy::PriceAsc);
        assert_eq!(
            items.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![2, 3, 1]
        );

        sort_page_items(&mut items, SortBy::PriceDesc);
        assert_eq!(
            items.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        sort_page_items(&mut items, SortBy::Newest);
        assert_eq!(
            items.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
    }
}
