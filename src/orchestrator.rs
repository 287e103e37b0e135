//! Discovery orchestrator: the query state store plus the coordination of
//! the three independent fetches (product page, facets, shop matches).
//!
//! `QueryIntent` is the only mutable shared structure; every derived snapshot
//! (page, facets, shop list, URL string) is replaced wholesale on a watch
//! channel. Each fetch kind carries a generation token captured at dispatch;
//! a resolution applies only while its token is still the latest, so result
//! application is last-request-wins even when responses arrive out of order.
//! Superseded in-flight tasks are additionally aborted, and dropping the
//! orchestrator aborts everything still pending.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogApi, FacetSet, ShopMatch};
use crate::envelope::ProductPage;
use crate::query::{self, FilterPatch, QueryIntent, SortBy};

/// Maximum shops shown beside product results.
pub const SHOP_MATCH_LIMIT: u32 = 5;
/// Keywords shorter than this clear the shop panel without a network call.
pub const MIN_SHOP_KEYWORD_LEN: usize = 2;

/// Non-blocking user-visible notification (the toast surrogate).
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Receiver half handed to the embedding UI.
pub struct DiscoverySnapshots {
    pub products: watch::Receiver<ProductPage>,
    pub facets: watch::Receiver<Option<FacetSet>>,
    pub shops: watch::Receiver<Vec<ShopMatch>>,
    /// Serialized shareable query string; the embedder mirrors it into the
    /// address bar on change.
    pub url: watch::Receiver<String>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

#[derive(Default)]
struct TaskSlots {
    products: Option<JoinHandle<()>>,
    facets: Option<JoinHandle<()>>,
    shops: Option<JoinHandle<()>>,
}

pub struct Discovery {
    api: Arc<dyn CatalogApi>,
    intent: Mutex<QueryIntent>,
    product_gen: AtomicU64,
    facet_gen: AtomicU64,
    shop_gen: AtomicU64,
    facets_loading: AtomicBool,
    products_tx: watch::Sender<ProductPage>,
    facets_tx: watch::Sender<Option<FacetSet>>,
    shops_tx: watch::Sender<Vec<ShopMatch>>,
    url_tx: watch::Sender<String>,
    notices_tx: mpsc::UnboundedSender<Notice>,
    tasks: Mutex<TaskSlots>,
}

impl Discovery {
    /// Build an orchestrator around an initial intent (typically parsed from
    /// the page URL via [`query::parse_query_string`]). No fetch is issued
    /// until [`bootstrap`](Self::bootstrap).
    pub fn new(api: Arc<dyn CatalogApi>, intent: QueryIntent) -> (Arc<Self>, DiscoverySnapshots) {
        let (products_tx, products_rx) = watch::channel(ProductPage::default());
        let (facets_tx, facets_rx) = watch::channel(None);
        let (shops_tx, shops_rx) = watch::channel(Vec::new());
        let (url_tx, url_rx) = watch::channel(query::to_query_string(&intent));
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let discovery = Arc::new(Self {
            api,
            intent: Mutex::new(intent),
            product_gen: AtomicU64::new(0),
            facet_gen: AtomicU64::new(0),
            shop_gen: AtomicU64::new(0),
            facets_loading: AtomicBool::new(false),
            products_tx,
            facets_tx,
            shops_tx,
            url_tx,
            notices_tx,
            tasks: Mutex::new(TaskSlots::default()),
        });
        let snapshots = DiscoverySnapshots {
            products: products_rx,
            facets: facets_rx,
            shops: shops_rx,
            url: url_rx,
            notices: notices_rx,
        };
        (discovery, snapshots)
    }

    /// Mount: issue the initial round of fetches for the current intent.
    pub fn bootstrap(self: &Arc<Self>) {
        let intent = self.intent();
        self.refresh_products(intent.clone());
        self.refresh_facets(intent.clone());
        if intent.keyword.chars().count() >= MIN_SHOP_KEYWORD_LEN {
            self.refresh_shops(intent.keyword);
        }
    }

    pub fn intent(&self) -> QueryIntent {
        self.intent.lock().expect("intent lock").clone()
    }

    /// Whether a facet fetch is currently in flight (sidebar spinner).
    pub fn facets_loading(&self) -> bool {
        self.facets_loading.load(Ordering::SeqCst)
    }

    /// Spawn a listener that applies committed keywords from a
    /// [`KeywordDebouncer`](crate::debounce::KeywordDebouncer) channel.
    pub fn spawn_keyword_listener(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<String>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(keyword) = rx.recv().await {
                let Some(discovery) = weak.upgrade() else {
                    return;
                };
                discovery.commit_keyword(&keyword);
            }
        })
    }

    /// Merge changed filter fields; resets to page 0 and re-issues the
    /// product and facet fetches.
    pub fn set_filters(self: &Arc<Self>, patch: FilterPatch) {
        let intent = {
            let mut intent = self.intent.lock().expect("intent lock");
            intent.apply_filters(&patch);
            intent.clone()
        };
        info!(?patch, "filters changed");
        self.publish_url(&intent);
        self.refresh_products(intent.clone());
        self.refresh_facets(intent);
    }

    /// Change sort order. Resets to page 0 (the reset rule is unified across
    /// filter and sort changes) and re-fetches products only: facets do not
    /// depend on sort.
    pub fn set_sort(self: &Arc<Self>, sort_by: SortBy) {
        let intent = {
            let mut intent = self.intent.lock().expect("intent lock");
            if intent.sort_by == sort_by {
                return;
            }
            intent.sort_by = sort_by;
            intent.page_index = 0;
            intent.clone()
        };
        info!(sort = sort_by.as_param(), "sort changed");
        self.refresh_products(intent);
    }

    /// Navigate to a page. Out-of-range requests (including anything while an
    /// error page is displayed) are silently ignored.
    pub fn set_page(self: &Arc<Self>, index: u32) {
        let total_pages = self.products_tx.borrow().total_pages;
        if index >= total_pages {
            debug!(index, total_pages, "page out of range; ignored");
            return;
        }
        let intent = {
            let mut intent = self.intent.lock().expect("intent lock");
            intent.page_index = index;
            intent.clone()
        };
        // Pure pagination change: facets and shops stay as they are.
        self.refresh_products(intent);
    }

    /// Apply a committed keyword (from the debounced channel). Resets to page
    /// 0, re-issues products and facets, and refreshes or clears the shop
    /// panel depending on keyword length.
    pub fn commit_keyword(self: &Arc<Self>, keyword: &str) {
        let keyword = keyword.trim();
        let intent = {
            let mut intent = self.intent.lock().expect("intent lock");
            if intent.keyword == keyword {
                return;
            }
            intent.keyword = keyword.to_string();
            intent.page_index = 0;
            intent.clone()
        };
        info!(keyword, "keyword committed");
        self.publish_url(&intent);
        self.refresh_products(intent.clone());
        self.refresh_facets(intent.clone());
        if intent.keyword.chars().count() >= MIN_SHOP_KEYWORD_LEN {
            self.refresh_shops(intent.keyword);
        } else {
            self.clear_shops();
        }
    }

    /// Reset every field to defaults, clear the URL, re-fetch everything.
    pub fn clear_all(self: &Arc<Self>) {
        let intent = {
            let mut intent = self.intent.lock().expect("intent lock");
            *intent = QueryIntent::new(intent.page_size);
            intent.clone()
        };
        info!("filters cleared");
        self.publish_url(&intent);
        self.refresh_products(intent.clone());
        self.refresh_facets(intent);
        self.clear_shops();
    }

    fn publish_url(&self, intent: &QueryIntent) {
        let serialized = query::to_query_string(intent);
        self.url_tx.send_if_modified(|current| {
            if *current == serialized {
                return false;
            }
            *current = serialized;
            true
        });
    }

    fn refresh_products(self: &Arc<Self>, intent: QueryIntent) {
        let gen = self.product_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let api = Arc::clone(&self.api);
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let page_index = intent.page_index;
            let result = api.fetch_page(&intent).await;
            let Some(this) = weak.upgrade() else {
                return;
            };
            if this.product_gen.load(Ordering::SeqCst) != gen {
                debug!(gen, "stale product fetch discarded");
                return;
            }
            match result {
                Ok(page) => {
                    debug!(
                        gen,
                        page_index = page.page_index,
                        items = page.items.len(),
                        total_pages = page.total_pages,
                        "product page applied"
                    );
                    this.products_tx.send_replace(page);
                }
                Err(e) => {
                    warn!(gen, error = %e, "product fetch failed");
                    this.products_tx
                        .send_replace(ProductPage::empty_error(page_index));
                    let _ = this.notices_tx.send(Notice {
                        message: format!("failed to load products: {e}"),
                        at: Utc::now(),
                    });
                }
            }
        });
        self.store_task(|slots| &mut slots.products, handle);
    }

    fn refresh_facets(self: &Arc<Self>, mut intent: QueryIntent) {
        // Facets describe the whole matching set: pagination and sort are
        // excluded from the request identity.
        intent.page_index = 0;
        intent.sort_by = SortBy::default();
        let gen = self.facet_gen.fetch_add(1, Ordering::SeqCst) + 1;
        self.facets_loading.store(true, Ordering::SeqCst);
        let api = Arc::clone(&self.api);
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let result = api.fetch_facets(&intent).await;
            let Some(this) = weak.upgrade() else {
                return;
            };
            if this.facet_gen.load(Ordering::SeqCst) != gen {
                debug!(gen, "stale facet fetch discarded");
                return;
            }
            this.facets_loading.store(false, Ordering::SeqCst);
            match result {
                Ok(facets) => {
                    this.facets_tx.send_replace(Some(facets));
                }
                Err(e) => {
                    // Non-critical path: keep the previous snapshot, no toast.
                    warn!(gen, error = %e, "facet fetch failed; keeping previous snapshot");
                }
            }
        });
        self.store_task(|slots| &mut slots.facets, handle);
    }

    fn refresh_shops(self: &Arc<Self>, keyword: String) {
        let gen = self.shop_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let api = Arc::clone(&self.api);
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let result = api.search_shops(&keyword, SHOP_MATCH_LIMIT).await;
            let Some(this) = weak.upgrade() else {
                return;
            };
            if this.shop_gen.load(Ordering::SeqCst) != gen {
                debug!(gen, "stale shop fetch discarded");
                return;
            }
            match result {
                Ok(shops) => {
                    this.shops_tx.send_replace(shops);
                }
                Err(e) => {
                    // Stale shop matches are worse than an empty panel.
                    warn!(gen, error = %e, "shop search failed; clearing matches");
                    this.shops_tx.send_replace(Vec::new());
                }
            }
        });
        self.store_task(|slots| &mut slots.shops, handle);
    }

    fn clear_shops(&self) {
        // Invalidate any in-flight shop fetch before clearing the panel.
        self.shop_gen.fetch_add(1, Ordering::SeqCst);
        {
            let mut slots = self.tasks.lock().expect("task lock");
            if let Some(old) = slots.shops.take() {
                old.abort();
            }
        }
        self.shops_tx.send_replace(Vec::new());
    }

    fn store_task(
        &self,
        slot: impl FnOnce(&mut TaskSlots) -> &mut Option<JoinHandle<()>>,
        handle: JoinHandle<()>,
    ) {
        let mut slots = self.tasks.lock().expect("task lock");
        if let Some(old) = slot(&mut slots).replace(handle) {
            old.abort();
        }
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.tasks.lock() {
            for handle in [
                slots.products.take(),
                slots.facets.take(),
                slots.shops.take(),
            ]
            .into_iter()
            .flatten()
            {
                handle.abort();
            }
        }
    }
}
