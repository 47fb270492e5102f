// Integration tests for the yield scanner
// These tests run whole scans against a local mock of the listing site

pub mod cache_tests;
pub mod scan_tests;

use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yield_scanner::config::{DelayRange, FetcherConfig, SearchConfig};
use yield_scanner::{Fetcher, ListingCache, ListingSearch, ScanConfig, ScanReport, Scanner};

/// Fetcher settings without any politeness delay.
pub fn fast_fetcher_config() -> FetcherConfig {
    FetcherConfig {
        base_delay: DelayRange::new(0, 0),
        retry_tiers: vec![DelayRange::new(0, 0)],
        request_timeout: 5,
        ..FetcherConfig::default()
    }
}

pub fn search_config(base_url: &str) -> SearchConfig {
    SearchConfig {
        base_url: base_url.to_string(),
        ..SearchConfig::default()
    }
}

pub fn scan_config(dir: &TempDir, page_limit: u32) -> ScanConfig {
    ScanConfig {
        page_limit,
        cache_path: dir.path().join("property_cache.json"),
        ..ScanConfig::default()
    }
}

pub fn ad_path(id: u32) -> String {
    format!("/ad/ventes_immobilieres/{}", id)
}

pub fn ad_url(server: &MockServer, id: u32) -> String {
    format!("{}{}", server.uri(), ad_path(id))
}

pub fn search_page(ids: &[u32]) -> String {
    let anchors: String = ids
        .iter()
        .map(|id| format!(r#"<li><a href="{}">Annonce {}</a></li>"#, ad_path(*id), id))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", anchors)
}

/// A sale ad with its price in the page data and the rent in the description.
pub fn listing_page(title: &str, price: u64, description: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body>
        <h1>{title}</h1><p>{description}</p>
        <script id="__NEXT_DATA__" type="application/json">{{"props":{{"pageProps":{{"ad":{{"price":[{price}],"body":"{description}"}}}}}}}}</script>
        </body></html>"#
    )
}

pub async fn mount_search(server: &MockServer, ids: &[u32]) {
    Mock::given(method("GET"))
        .and(path("/recherche"))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_page(ids)))
        .mount(server)
        .await;
}

pub async fn mount_listing(server: &MockServer, id: u32, html: String) {
    Mock::given(method("GET"))
        .and(path(ad_path(id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

/// One scan with the cache at `scan_config.cache_path`, as the CLI runs it.
pub async fn run_scan(base_url: &str, config: ScanConfig) -> anyhow::Result<ScanReport> {
    let mut cache = ListingCache::open(&config.cache_path)?;
    let fetcher = Fetcher::from_config(fast_fetcher_config())?;
    let search = ListingSearch::new(&search_config(base_url))?;

    let report = Scanner::new(fetcher, search, &mut cache, config).run().await?;
    Ok(report)
}

pub fn reload(path: &Path) -> ListingCache {
    ListingCache::load(path).expect("cache file should be readable")
}
