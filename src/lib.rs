//! Product-discovery orchestration for a storefront catalog.
//!
//! The crate is the headless engine behind a browse/search page: a single
//! [`QueryIntent`] drives a product-page fetch, a facet-count fetch, and a
//! keyword-matched shop lookup against the catalog HTTP API. Results land on
//! watch channels as wholesale snapshots, guarded per fetch kind so a slow
//! stale response can never overwrite a newer one. [`pager::page_window`]
//! turns the resulting page counts into an ellipsis-aware pagination strip,
//! and [`query`] round-trips the committed intent through a shareable query
//! string.

pub mod catalog;
pub mod debounce;
pub mod envelope;
pub mod logging;
pub mod orchestrator;
pub mod pager;
pub mod query;

pub mod util {
    pub mod env;
}

pub use catalog::{
    CatalogApi, CatalogClient, CatalogConfig, CatalogError, Category, CategoryFacet, FacetSet,
    PriceRangeFacet, RatingFacet, ShopMatch,
};
pub use debounce::KeywordDebouncer;
pub use envelope::{Product, ProductPage};
pub use orchestrator::{Discovery, DiscoverySnapshots, Notice};
pub use pager::{page_window, PageEntry};
pub use query::{FilterPatch, QueryIntent, SortBy};
