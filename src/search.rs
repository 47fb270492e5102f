use config::ConfigError;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

use crate::config::SearchConfig;
use crate::utils::error::{AppError, Result};

/// Path prefixes that lead to an ad page.
const AD_PREFIXES: [&str; 4] = ["annonces", "v", "vi", "ad"];

/// Builds search-result URLs and finds listing links in search-result pages.
pub struct ListingSearch {
    base: Url,
    category: String,
    anchor_selector: Selector,
    json_ld_selector: Selector,
    quoted_path_regex: Regex,
}

impl ListingSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            AppError::Config(ConfigError::Message(format!(
                "Invalid search base URL '{}': {}",
                config.base_url, e
            )))
        })?;

        Ok(Self {
            base,
            category: config.category.clone(),
            anchor_selector: Selector::parse("a[href]").expect("valid anchor selector"),
            json_ld_selector: Selector::parse(r#"script[type="application/ld+json"]"#)
                .expect("valid JSON-LD selector"),
            quoted_path_regex: Regex::new(r#"["'](/(?:annonces|vi?|ad)[^"'\s]+)["']"#)
                .expect("valid path pattern"),
        })
    }

    /// Search-result page `page` (1-based) for `query` in `city`, newest first.
    pub fn page_url(&self, city: &str, query: &str, page: u32) -> String {
        let mut url = self.base.clone();
        url.set_path("/recherche");
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("text", query)
                .append_pair("locations", city)
                .append_pair("category", &self.category)
                .append_pair("owner_type", "all")
                .append_pair("sort", "time")
                .append_pair("order", "desc");
            if page > 1 {
                pairs.append_pair("page", &page.to_string());
            }
        }
        url.to_string()
    }

    /// Listing URLs on a search-result page, in document order, without duplicates.
    ///
    /// Anchors are read first, then JSON-LD blocks, then any quoted ad path in
    /// the raw markup.
    pub fn listing_urls(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut candidates = Vec::new();

        for anchor in document.select(&self.anchor_selector) {
            if let Some(href) = anchor.value().attr("href") {
                candidates.push(href.to_string());
            }
        }

        for script in document.select(&self.json_ld_selector) {
            let raw = script.text().collect::<String>();
            if let Ok(data) = serde_json::from_str::<Value>(&raw) {
                collect_strings(&data, &mut candidates);
            }
        }

        for caps in self.quoted_path_regex.captures_iter(html) {
            candidates.push(caps[1].to_string());
        }

        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter_map(|candidate| self.resolve(candidate))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    /// Absolute ad URL for `candidate`, or `None` if it is not an ad link.
    fn resolve(&self, candidate: &str) -> Option<String> {
        let candidate = candidate.trim();
        if !(candidate.starts_with('/') || candidate.starts_with("http")) {
            return None;
        }

        let mut url = self.base.join(candidate).ok()?;
        if url.host_str() != self.base.host_str() {
            return None;
        }
        url.set_fragment(None);

        is_ad_path(url.path()).then(|| url.to_string())
    }
}

/// `search_url` pointed at result page `page`, replacing any page it already names.
pub fn paged_search_url(search_url: &Url, page: u32) -> String {
    let pairs: Vec<(String, String)> = search_url
        .query_pairs()
        .into_owned()
        .filter(|(key, _)| key != "page")
        .collect();

    let mut url = search_url.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("page", &page.to_string());
    url.to_string()
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}

/// An ad path either sits under a known prefix with an identifier after it,
/// or carries a numeric id or an `.htm` page somewhere.
pub fn is_ad_path(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(first) = segments.first() else {
        return false;
    };

    if AD_PREFIXES.contains(first) && segments.len() >= 2 {
        return true;
    }

    segments.iter().any(|segment| {
        (!segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
            || segment.ends_with(".htm")
            || segment.ends_with(".html")
    })
}
