use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;

use storefront_discovery::pager::{can_next, can_prev};
use storefront_discovery::query::DEFAULT_PAGE_SIZE;
use storefront_discovery::util::env::init_env;
use storefront_discovery::{
    page_window, CatalogClient, CatalogConfig, Discovery, PageEntry, QueryIntent, SortBy,
};

/// One-shot discovery query against the catalog API: runs the same fetches
/// the browse page would and prints the resulting snapshots.
#[derive(Parser, Debug)]
#[command(name = "discover", version, about = "Query the storefront catalog")]
struct Cli {
    /// Search keyword (omit to list everything)
    #[arg(long, default_value = "")]
    keyword: String,
    /// Restrict to a category id
    #[arg(long)]
    category: Option<i64>,
    /// Minimum price
    #[arg(long)]
    min_price: Option<f64>,
    /// Maximum price
    #[arg(long)]
    max_price: Option<f64>,
    /// Minimum average rating (1.0 to 5.0)
    #[arg(long)]
    min_rating: Option<f64>,
    /// Sort order: newest, name, price-asc, price-desc
    #[arg(long, default_value = "newest")]
    sort: String,
    /// Zero-based page index
    #[arg(long, default_value_t = 0)]
    page: u32,
    /// Page size
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    size: u32,
    /// Override CATALOG_BASE_URL
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env();
    storefront_discovery::logging::init_tracing("info")?;
    let cli = Cli::parse();

    let mut intent = QueryIntent::new(cli.size);
    intent.keyword = cli.keyword.trim().to_string();
    intent.category_id = cli.category;
    intent.price_min = cli.min_price;
    intent.price_max = cli.max_price;
    intent.min_rating = cli.min_rating;
    intent.sort_by = SortBy::from_param(&cli.sort)
        .with_context(|| format!("unknown sort order '{}'", cli.sort))?;
    intent.page_index = cli.page;

    let mut cfg = CatalogConfig::default();
    if let Some(base_url) = cli.base_url {
        cfg.base_url = base_url;
    }
    let client = CatalogClient::new(cfg).context("building catalog client")?;

    let (discovery, mut snapshots) = Discovery::new(std::sync::Arc::new(client), intent);
    discovery.bootstrap();

    snapshots
        .products
        .changed()
        .await
        .context("product fetch never resolved")?;
    let page = snapshots.products.borrow_and_update().clone();

    if page.is_error() {
        if let Ok(notice) = snapshots.notices.try_recv() {
            eprintln!("{}", notice.message);
        }
        anyhow::bail!("product fetch failed");
    }

    println!(
        "{} products (page {} of {}):",
        page.total_elements,
        page.page_index + 1,
        page.total_pages
    );
    for p in &page.items {
        let price = p.discounted_price.unwrap_or(p.base_price);
        let rating = p
            .average_rating
            .map(|r| format!(" {r:.1}*"))
            .unwrap_or_default();
        println!("  [{}] {} - {:.2}{}", p.id, p.name, price, rating);
    }

    // Facets and shop matches are best-effort side panels; give them a
    // moment but print the products regardless.
    if tokio::time::timeout(Duration::from_secs(5), snapshots.facets.changed())
        .await
        .is_ok()
    {
        if let Some(facets) = snapshots.facets.borrow_and_update().clone() {
            let cats = facets
                .categories
                .iter()
                .map(|c| format!("{} ({})", c.name, c.product_count))
                .join(", ");
            if !cats.is_empty() {
                println!("categories: {cats}");
            }
        }
    }
    if discovery.intent().keyword.chars().count() >= 2
        && tokio::time::timeout(Duration::from_secs(5), snapshots.shops.changed())
            .await
            .is_ok()
    {
        let shops = snapshots.shops.borrow_and_update().clone();
        if !shops.is_empty() {
            println!(
                "shops: {}",
                shops
                    .iter()
                    .map(|s| format!("{} ({})", s.name, s.product_count))
                    .join(", ")
            );
        }
    }

    let strip = page_window(page.page_index, page.total_pages)
        .into_iter()
        .map(|entry| match entry {
            PageEntry::Page(i) if i == page.page_index => format!("[{}]", i + 1),
            PageEntry::Page(i) => (i + 1).to_string(),
            PageEntry::Ellipsis => "…".to_string(),
        })
        .join(" ");
    println!(
        "pages: {}{}{}",
        if can_prev(page.page_index) { "« " } else { "" },
        strip,
        if can_next(page.page_index, page.total_pages) {
            " »"
        } else {
            ""
        }
    );
    println!("url: ?{}", snapshots.url.borrow().as_str());
    Ok(())
}
