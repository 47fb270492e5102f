use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use yield_scanner::advisor::{GroqAdvisor, advise_listing, parse_advice};
use yield_scanner::scanner::{ScanStats, Spread};
use yield_scanner::utils::error::AppError;
use yield_scanner::{
    Annotation, AppConfig, Fetcher, ListingCache, ListingRecord, ListingSearch, ScanConfig, Scanner, UserStatus,
};

#[derive(Parser)]
#[command(name = "yield-scanner")]
#[command(about = "Rental yield scanner for LeBonCoin real-estate listings")]
struct Cli {
    /// Directory holding the optional `default` and `local` config files
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    /// Listing cache file
    #[arg(long, global = true, default_value = "property_cache.json")]
    cache: PathBuf,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan search pages and cache every new listing
    Scan {
        #[arg(long, default_value = "Nantes")]
        city: String,
        #[arg(long, default_value = "loyer")]
        query: String,
        /// Maximum number of search pages
        #[arg(long, default_value_t = 20)]
        pages: u32,
        /// Full search-result URL to page through instead of city and query
        #[arg(long)]
        search_url: Option<String>,
        /// Scan at most this many listings
        #[arg(long)]
        max_ads: Option<usize>,
        /// Re-scrape listings that are already cached
        #[arg(long)]
        refresh: bool,
    },

    /// Show cached listings, best gross yield first
    List {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Set your own status on a cached listing
    Status {
        url: String,
        /// interested, not-interested, undecided or unset
        status: UserStatus,
    },

    /// Ask the advisory service about a listing, caching it first if needed
    Advise { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let directive = if cli.debug {
        "yield_scanner=debug"
    } else {
        "yield_scanner=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let config = AppConfig::load(&cli.config_dir).context("loading configuration")?;

    match cli.command {
        Commands::Scan {
            city,
            query,
            pages,
            search_url,
            max_ads,
            refresh,
        } => {
            let scan_config = ScanConfig {
                city,
                query,
                page_limit: pages,
                search_url,
                max_ads,
                cache_path: cli.cache,
                debug: cli.debug,
                refresh,
            };
            scan(&config, scan_config).await
        }
        Commands::List { limit } => list(&cli.cache, limit),
        Commands::Status { url, status } => set_status(&cli.cache, &url, status),
        Commands::Advise { url } => advise(&config, &cli.cache, &url).await,
    }
}

async fn scan(config: &AppConfig, scan_config: ScanConfig) -> Result<()> {
    info!(
        "Scanning '{}' in {} ({} pages max)",
        scan_config.query, scan_config.city, scan_config.page_limit
    );

    let mut cache = ListingCache::open(&scan_config.cache_path)?;
    let fetcher = Fetcher::from_config(config.fetcher.clone())?;
    let search = ListingSearch::new(&config.search)?;

    let report = Scanner::new(fetcher, search, &mut cache, scan_config).run().await?;

    println!(
        "{} listings found: {} new, {} refreshed, {} already cached, {} failed",
        report.listed,
        report.cached.len(),
        report.refreshed.len(),
        report.skipped,
        report.failures.len()
    );
    for failure in &report.failures {
        println!("  ✗ {} ({})", failure.url, failure.failure);
    }

    let stats = ScanStats::collect(report.merged_urls().filter_map(|url| cache.get(url)));
    print_stats(&stats);

    print_listings(&cache, Some(10));
    Ok(())
}

fn print_stats(stats: &ScanStats) {
    println!("\nListings extracted: {}", stats.total);
    println!("  with price        : {}", stats.with_price);
    println!("  with rent         : {}", stats.with_rent);
    println!("  with charges      : {}", stats.with_charges);
    println!("  with gross yield  : {}", stats.with_gross_yield);

    let print_spread = |label: &str, spread: &Spread, unit: &str| {
        println!(
            "{}: min {:.2}{unit}, max {:.2}{unit}, mean {:.2}{unit}",
            label, spread.min, spread.max, spread.mean
        );
    };
    if let Some(rent) = &stats.monthly_rent {
        print_spread("Monthly rent", rent, "€");
    }
    if let Some(gross) = &stats.gross_yield_pct {
        print_spread("Gross yield ", gross, "%");
    }
    println!();
}

fn list(cache_path: &Path, limit: Option<usize>) -> Result<()> {
    let cache = ListingCache::open(cache_path)?;
    if cache.is_empty() {
        println!("No cached listings in {}", cache_path.display());
        return Ok(());
    }
    print_listings(&cache, limit);
    Ok(())
}

fn print_listings(cache: &ListingCache, limit: Option<usize>) {
    let listings = cache.complete_listings();
    let shown = limit.unwrap_or(listings.len()).min(listings.len());

    for (idx, record) in listings.iter().take(shown).enumerate() {
        let verdict = record
            .analysis_ai
            .as_deref()
            .and_then(|text| parse_advice(text).ok())
            .map(|advice| format!("{:?} {:.1}/10", advice.verdict, advice.score))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:3}. {:<45} | {:>9} € | {:>7.2} €/m | {:>6.2}% | {:2} | {:<16} | {}",
            idx + 1,
            record.title.chars().take(45).collect::<String>(),
            record.price.unwrap_or_default(),
            record.monthly_rent.unwrap_or_default(),
            record.gross_yield_pct.unwrap_or_default(),
            record.user_status.emoji(),
            verdict,
            record.url
        );
    }
    println!("{} of {} complete listings", shown, listings.len());
}

fn set_status(cache_path: &Path, url: &str, status: UserStatus) -> Result<()> {
    let mut cache = ListingCache::open(cache_path)?;
    if !cache.annotate(url, Annotation::Status(status)) {
        return Err(AppError::NotFound {
            resource: url.to_string(),
        }
        .into());
    }
    cache.save()?;
    println!("{} {}", status.emoji(), url);
    Ok(())
}

fn print_summary(record: &ListingRecord) {
    println!("{}", record.title);
    println!("  Prix            : {} €", record.price.unwrap_or_default());
    println!("  Loyer mensuel   : {:.2} €", record.monthly_rent.unwrap_or_default());
    println!("  Rendement brut  : {:.2} %", record.gross_yield_pct.unwrap_or_default());
    println!("  Rendement net   : {:.2} %", record.net_yield_pct.unwrap_or_default());

    if let Some(summary) = record.investment_summary() {
        let (years, months) = summary.payback_years_months();
        println!("  Retour sur inv. : {} ans {} mois", years, months);
        println!("  Cash-flow       : {:.2} €/mois", summary.monthly_cash_flow);
        if let Some(price_per_m2) = summary.price_per_m2 {
            println!("  Prix au m²      : {:.0} €", price_per_m2);
        }
    }
}

async fn advise(config: &AppConfig, cache_path: &Path, url: &str) -> Result<()> {
    let mut cache = ListingCache::open(cache_path)?;
    let advisor = GroqAdvisor::from_env()?;
    let fetcher = Fetcher::from_config(config.fetcher.clone())?;

    let outcome = advise_listing(&fetcher, &advisor, &mut cache, url).await?;
    print_summary(&outcome.record);
    println!("\n{}\n", outcome.body);

    match outcome.advice {
        Some(advice) => println!(
            "Verdict: {:?} | Avis: {:?} | Score: {:.1}/10",
            advice.verdict, advice.rating, advice.score
        ),
        None => println!("No verdict line in the advice; the text was stored as is."),
    }
    Ok(())
}
