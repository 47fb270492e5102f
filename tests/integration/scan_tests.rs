use super::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yield_scanner::scanner::ItemFailure;
use yield_scanner::utils::error::{ExtractError, FetchError, ScanError};
use yield_scanner::{Annotation, UserStatus};

#[tokio::test]
async fn test_scan_caches_plausible_listings_only() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_search(&server, &[1001, 1002, 1003]).await;
    mount_listing(
        &server,
        1001,
        listing_page("Studio 18 m² loué - Nantes", 25_000, "Vendu loué. Loyer 350€/mois."),
    )
    .await;
    mount_listing(
        &server,
        1002,
        listing_page("Parking loué", 10_000, "Loyer 350€/mois hors charges."),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(ad_path(1003)))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let config = scan_config(&dir, 1);
    let cache_path = config.cache_path.clone();
    let report = run_scan(&server.uri(), config).await?;

    assert_eq!(report.listed, 3);
    assert_eq!(report.cached, vec![ad_url(&server, 1001)]);
    assert_eq!(report.failures.len(), 2);
    println!("✓ Scan report: {} cached, {} failed", report.cached.len(), report.failures.len());

    let implausible = &report.failures[0];
    assert_eq!(implausible.url, ad_url(&server, 1002));
    assert!(matches!(
        implausible.failure,
        ItemFailure::Extract(ExtractError::ImplausibleYield { .. })
    ));

    let blocked = &report.failures[1];
    assert_eq!(blocked.url, ad_url(&server, 1003));
    assert!(matches!(
        blocked.failure,
        ItemFailure::Fetch(FetchError::Blocked { attempts: 2, .. })
    ));

    let cache = reload(&cache_path);
    assert_eq!(cache.len(), 1);
    let record = cache.get(&ad_url(&server, 1001)).unwrap();
    assert_eq!(record.price, Some(25_000));
    assert_eq!(record.monthly_rent, Some(350.0));
    assert!((record.gross_yield_pct.unwrap() - 16.8).abs() < 1e-9);
    assert!(record.scraped_at.is_some());
    println!("✓ Persisted listing has a {:.1}% gross yield", record.gross_yield_pct.unwrap());

    Ok(())
}

#[tokio::test]
async fn test_second_scan_reuses_cache() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_search(&server, &[2001]).await;
    Mock::given(method("GET"))
        .and(path(ad_path(2001)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page("T2 40 m²", 96_000, "Loyer 500€/mois")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let first = run_scan(&server.uri(), scan_config(&dir, 1)).await?;
    assert_eq!(first.cached.len(), 1);

    let second = run_scan(&server.uri(), scan_config(&dir, 1)).await?;
    assert_eq!(second.listed, 1);
    assert_eq!(second.skipped, 1);
    assert!(second.cached.is_empty());
    assert!(second.failures.is_empty());
    println!("✓ Cached listing was not fetched again");

    Ok(())
}

#[tokio::test]
async fn test_refresh_updates_figures_and_keeps_status() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_search(&server, &[3001]).await;
    mount_listing(&server, 3001, listing_page("T2 40 m²", 96_000, "Loyer 500€/mois")).await;

    let config = scan_config(&dir, 1);
    let cache_path = config.cache_path.clone();
    run_scan(&server.uri(), config).await?;

    let mut cache = reload(&cache_path);
    assert!(cache.annotate(&ad_url(&server, 3001), Annotation::Status(UserStatus::Interested)));
    cache.save()?;
    println!("✓ Marked listing as interesting");

    server.reset().await;
    mount_search(&server, &[3001]).await;
    mount_listing(&server, 3001, listing_page("T2 40 m²", 96_000, "Loyer 600€/mois")).await;

    let config = ScanConfig {
        refresh: true,
        ..scan_config(&dir, 1)
    };
    let report = run_scan(&server.uri(), config).await?;
    assert_eq!(report.refreshed, vec![ad_url(&server, 3001)]);

    let cache = reload(&cache_path);
    let record = cache.get(&ad_url(&server, 3001)).unwrap();
    assert_eq!(record.monthly_rent, Some(600.0));
    assert!((record.gross_yield_pct.unwrap() - 7.5).abs() < 1e-9);
    assert_eq!(record.user_status, UserStatus::Interested);
    println!("✓ Refresh kept the user's status");

    Ok(())
}

#[tokio::test]
async fn test_unreachable_site_fails_the_run() -> anyhow::Result<()> {
    let dir = TempDir::new()?;

    // Nothing listens on the discard port.
    let result = run_scan("http://127.0.0.1:9", scan_config(&dir, 2)).await;

    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ScanError>(),
        Some(ScanError::Unreachable { .. })
    ));
    assert!(!dir.path().join("property_cache.json").exists());
    println!("✓ Unreachable site reported: {}", err);

    Ok(())
}
