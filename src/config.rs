use config::{Config, ConfigError, Environment, File};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub fetcher: FetcherConfig,
    pub search: SearchConfig,
}

/// Inclusive millisecond range a delay is drawn from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetcherConfig {
    /// Applied before every request.
    pub base_delay: DelayRange,
    /// One entry per retry after a blocking response; its length is the retry bound.
    pub retry_tiers: Vec<DelayRange>,
    /// Seconds.
    pub request_timeout: u64,
    pub user_agents: Vec<String>,
    pub accept_language: String,
    pub referer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    pub base_url: String,
    /// Site category for real-estate sales.
    pub category: String,
}

/// Per-run parameters supplied by the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub city: String,
    pub query: String,
    pub page_limit: u32,
    /// A full search-result URL used instead of the one built from city and query.
    pub search_url: Option<String>,
    /// Scan at most this many listings.
    pub max_ads: Option<usize>,
    pub cache_path: PathBuf,
    /// Per-listing progress at info level.
    pub debug: bool,
    pub refresh: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            city: "Nantes".to_string(),
            query: "loyer".to_string(),
            page_limit: 20,
            search_url: None,
            max_ads: None,
            cache_path: PathBuf::from("property_cache.json"),
            debug: false,
            refresh: false,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_delay: DelayRange::new(2_000, 3_000),
            retry_tiers: vec![DelayRange::new(5_000, 7_000), DelayRange::new(25_000, 27_000)],
            request_timeout: 15,
            user_agents: vec![
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Safari/605.1.15".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            ],
            accept_language: "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            referer: "https://www.leboncoin.fr/".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.leboncoin.fr".to_string(),
            category: "9".to_string(),
        }
    }
}

impl AppConfig {
    /// Layer built-in defaults, `<dir>/default`, `<dir>/local` and
    /// `YIELD_SCANNER__*` environment variables.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from(config_dir.join("default")).required(false))
            .add_source(File::from(config_dir.join("local")).required(false))
            .add_source(Environment::with_prefix("YIELD_SCANNER").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fetcher = &self.fetcher;

        if fetcher.user_agents.is_empty() {
            return Err(ConfigError::Message("Fetcher user_agents must not be empty".into()));
        }

        if fetcher.base_delay.min_ms > fetcher.base_delay.max_ms {
            return Err(ConfigError::Message("Fetcher base_delay min_ms cannot exceed max_ms".into()));
        }

        if fetcher.retry_tiers.iter().any(|tier| tier.min_ms > tier.max_ms) {
            return Err(ConfigError::Message("Fetcher retry tier min_ms cannot exceed max_ms".into()));
        }

        if fetcher.request_timeout == 0 {
            return Err(ConfigError::Message("Fetcher request_timeout must be greater than 0".into()));
        }

        if Url::parse(&self.search.base_url).is_err() {
            return Err(ConfigError::Message("Invalid search base URL format".into()));
        }

        if self.search.category.is_empty() {
            return Err(ConfigError::Message("Search category must not be empty".into()));
        }

        Ok(())
    }
}
