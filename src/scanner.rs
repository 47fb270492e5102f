use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::ListingCache;
use crate::config::ScanConfig;
use crate::extractor::ListingExtractor;
use crate::fetcher::PageFetcher;
use crate::models::ListingRecord;
use crate::search::{ListingSearch, paged_search_url};
use crate::utils::error::{ExtractError, FetchError, ScanError};

#[derive(Debug, Clone, PartialEq)]
pub enum ItemFailure {
    Fetch(FetchError),
    Extract(ExtractError),
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFailure::Fetch(e) => write!(f, "{}", e),
            ItemFailure::Extract(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanFailure {
    pub url: String,
    pub failure: ItemFailure,
}

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Unique listing URLs found on the search pages.
    pub listed: usize,
    /// Already cached, not fetched.
    pub skipped: usize,
    /// Newly cached listings.
    pub cached: Vec<String>,
    /// Known listings whose financial fields were re-scraped.
    pub refreshed: Vec<String>,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn merged(&self) -> usize {
        self.cached.len() + self.refreshed.len()
    }

    /// URLs of the listings cached or refreshed by this scan.
    pub fn merged_urls(&self) -> impl Iterator<Item = &String> {
        self.cached.iter().chain(self.refreshed.iter())
    }
}

/// Smallest, largest and mean of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Spread {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { min, max, mean })
    }
}

/// Field coverage and rent/yield spread over a set of listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanStats {
    pub total: usize,
    pub with_price: usize,
    pub with_rent: usize,
    pub with_charges: usize,
    pub with_gross_yield: usize,
    pub monthly_rent: Option<Spread>,
    pub gross_yield_pct: Option<Spread>,
}

impl ScanStats {
    pub fn collect<'r>(records: impl IntoIterator<Item = &'r ListingRecord>) -> Self {
        let mut stats = ScanStats::default();
        let mut rents = Vec::new();
        let mut yields = Vec::new();

        for record in records {
            stats.total += 1;
            if record.price.is_some() {
                stats.with_price += 1;
            }
            if let Some(rent) = record.monthly_rent {
                stats.with_rent += 1;
                rents.push(rent);
            }
            if record.monthly_charges.is_some() {
                stats.with_charges += 1;
            }
            if let Some(gross) = record.gross_yield_pct {
                stats.with_gross_yield += 1;
                yields.push(gross);
            }
        }

        stats.monthly_rent = Spread::of(&rents);
        stats.gross_yield_pct = Spread::of(&yields);
        stats
    }
}

/// Drives a scan: search pages, then fetch, extract and cache each new listing.
pub struct Scanner<'a, F: PageFetcher> {
    fetcher: F,
    search: ListingSearch,
    extractor: ListingExtractor,
    cache: &'a mut ListingCache,
    config: ScanConfig,
}

impl<'a, F: PageFetcher> Scanner<'a, F> {
    pub fn new(fetcher: F, search: ListingSearch, cache: &'a mut ListingCache, config: ScanConfig) -> Self {
        Self {
            fetcher,
            search,
            extractor: ListingExtractor::new(),
            cache,
            config,
        }
    }

    /// Listing URLs from search pages `1..=page_limit`, in order and deduplicated.
    ///
    /// Stops at the first page that adds nothing new. Fails only when no page
    /// could be fetched and the site looked unreachable.
    pub async fn collect_listing_urls(&self) -> Result<Vec<String>, ScanError> {
        let mut urls = Vec::new();
        let mut seen = HashSet::new();
        let mut pages_fetched = 0;
        let mut last_connectivity_error = None;

        let search_url = match &self.config.search_url {
            Some(raw) => Some(Url::parse(raw).map_err(|e| ScanError::InvalidSearchUrl {
                url: raw.clone(),
                message: e.to_string(),
            })?),
            None => None,
        };

        for page in 1..=self.config.page_limit {
            let page_url = match &search_url {
                Some(search_url) => paged_search_url(search_url, page),
                None => self.search.page_url(&self.config.city, &self.config.query, page),
            };
            info!("Scanning search page {}: {}", page, page_url);

            let html = match self.fetcher.fetch(&page_url, (page - 1) as usize).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Search page {} failed: {}", page, e);
                    if e.is_connectivity() {
                        last_connectivity_error = Some(e);
                    }
                    continue;
                }
            };
            pages_fetched += 1;

            let before = urls.len();
            for url in self.search.listing_urls(&html) {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }

            let added = urls.len() - before;
            info!("Page {}: {} new listings", page, added);
            if added == 0 {
                debug!("No new listings on page {}, stopping", page);
                break;
            }
        }

        if pages_fetched == 0 {
            if let Some(e) = last_connectivity_error {
                return Err(ScanError::Unreachable {
                    message: format!("no search page could be fetched: {}", e),
                });
            }
        }

        Ok(urls)
    }

    /// Fetch, extract and cache every listing in `urls` that needs it.
    ///
    /// Per-item failures are recorded in the report. The cache is saved after
    /// each merged listing.
    pub async fn scan_listings(&mut self, urls: &[String]) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport {
            listed: urls.len(),
            ..ScanReport::default()
        };
        let mut attempted = 0;
        let mut connectivity_failures = 0;

        for (index, url) in urls.iter().enumerate() {
            let known = self.cache.contains(url);
            if known && !self.config.refresh {
                if self.config.debug {
                    let title = self.cache.get(url).map(|r| r.title.as_str()).unwrap_or_default();
                    info!("[{}/{}] Cached: {} ({})", index + 1, urls.len(), title, url);
                } else {
                    debug!("[{}/{}] Cached: {}", index + 1, urls.len(), url);
                }
                report.skipped += 1;
                continue;
            }

            attempted += 1;
            let html = match self.fetcher.fetch(url, index).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("[{}/{}] Fetch failed: {}", index + 1, urls.len(), e);
                    if e.is_connectivity() {
                        connectivity_failures += 1;
                    }
                    report.failures.push(ScanFailure {
                        url: url.clone(),
                        failure: ItemFailure::Fetch(e),
                    });
                    continue;
                }
            };

            let mut record = match self.extractor.extract(url, &html) {
                Ok(record) => record,
                Err(e) => {
                    warn!("[{}/{}] Skipping {}: {}", index + 1, urls.len(), url, e);
                    report.failures.push(ScanFailure {
                        url: url.clone(),
                        failure: ItemFailure::Extract(e),
                    });
                    continue;
                }
            };
            record.scraped_at = Some(Utc::now());

            info!(
                "[{}/{}] {} | {} € | {:.2}%",
                index + 1,
                urls.len(),
                record.title,
                record.price.unwrap_or_default(),
                record.gross_yield_pct.unwrap_or_default()
            );

            if known {
                self.cache.refresh(record);
                report.refreshed.push(url.clone());
            } else {
                self.cache.upsert(record);
                report.cached.push(url.clone());
            }
            self.cache.save()?;
        }

        if attempted > 0 && connectivity_failures == attempted {
            return Err(ScanError::Unreachable {
                message: format!("all {} listing fetches failed", attempted),
            });
        }

        Ok(report)
    }

    /// Collect listing URLs, then scan them.
    pub async fn run(&mut self) -> Result<ScanReport, ScanError> {
        let mut urls = self.collect_listing_urls().await?;
        info!("{} unique listings found", urls.len());

        if let Some(max_ads) = self.config.max_ads {
            if urls.len() > max_ads {
                urls.truncate(max_ads);
                info!("Limited to the first {} listings", max_ads);
            }
        }

        let report = self.scan_listings(&urls).await?;
        info!(
            "Scan done: {} new, {} refreshed, {} from cache, {} failed",
            report.cached.len(),
            report.refreshed.len(),
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }
}
