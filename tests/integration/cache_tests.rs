use super::*;
use serde_json::Value;
use tempfile::TempDir;
use yield_scanner::advisor::{Verdict, parse_advice};
use yield_scanner::utils::error::CacheError;
use yield_scanner::{Annotation, UserStatus};

const LEGACY_CACHE: &str = r#"{
  "https://www.leboncoin.fr/ad/ventes_immobilieres/11": {
    "url": "https://www.leboncoin.fr/ad/ventes_immobilieres/11",
    "title": "Studio 20 m² vendu loué",
    "price": 60000.0,
    "monthly_rent": 450.0,
    "annual_rent": 5400.0,
    "monthly_charges": 30.0,
    "annual_charges": 360.0,
    "taxe_fonciere_annual": 480.0,
    "gross_yield_pct": 9.0,
    "net_yield_pct": 7.6,
    "analysis_ai": "Bon rapport.\nVERDICT: ACHETER\nAVIS: BONNE\nSCORE: 8/10",
    "user_status": "👍"
  },
  "https://www.leboncoin.fr/ad/ventes_immobilieres/12": {
    "title": "T3 65 m²",
    "price": 150000.0,
    "monthly_rent": 750.0,
    "annual_rent": 9000.0,
    "monthly_charges": null,
    "annual_charges": null,
    "taxe_fonciere_annual": null,
    "gross_yield_pct": 6.0,
    "net_yield_pct": 6.0,
    "user_status": ""
  },
  "https://www.leboncoin.fr/ad/ventes_immobilieres/13": {
    "title": "Maison à rénover",
    "price": 90000.0,
    "monthly_rent": null,
    "annual_rent": null,
    "gross_yield_pct": null,
    "net_yield_pct": null
  }
}"#;

#[tokio::test]
async fn test_legacy_cache_is_read_and_rewritten() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("property_cache.json");
    std::fs::write(&path, LEGACY_CACHE)?;

    let mut cache = ListingCache::load(&path)?;
    assert_eq!(cache.len(), 3);

    let studio = cache.get("https://www.leboncoin.fr/ad/ventes_immobilieres/11").unwrap();
    assert_eq!(studio.price, Some(60_000));
    assert_eq!(studio.annual_property_tax, Some(480.0));
    assert_eq!(studio.user_status, UserStatus::Interested);
    let advice = parse_advice(studio.analysis_ai.as_deref().unwrap())?;
    assert_eq!(advice.verdict, Verdict::Buy);

    let t3 = cache.get("https://www.leboncoin.fr/ad/ventes_immobilieres/12").unwrap();
    assert_eq!(t3.url, "https://www.leboncoin.fr/ad/ventes_immobilieres/12");
    assert_eq!(t3.user_status, UserStatus::Unset);
    println!("✓ Loaded legacy cache with {} listings", cache.len());

    // Incomplete listings stay cached but are not ranked
    let ranked: Vec<_> = cache.complete_listings().iter().map(|r| r.price).collect();
    assert_eq!(ranked, vec![Some(60_000), Some(150_000)]);

    assert!(cache.annotate(
        "https://www.leboncoin.fr/ad/ventes_immobilieres/12",
        Annotation::Status(UserStatus::Undecided)
    ));
    cache.save()?;

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let t3 = &saved["https://www.leboncoin.fr/ad/ventes_immobilieres/12"];
    assert_eq!(t3["user_status"], "undecided");
    assert_eq!(t3["price"], 150_000);
    assert!(t3.get("annual_property_tax").is_some());
    assert!(t3.get("taxe_fonciere_annual").is_none());
    println!("✓ Rewrote cache in the current format");

    let reloaded = reload(&path);
    assert_eq!(reloaded.len(), 3);
    assert_eq!(
        reloaded.get("https://www.leboncoin.fr/ad/ventes_immobilieres/11").unwrap().user_status,
        UserStatus::Interested
    );

    Ok(())
}

#[tokio::test]
async fn test_corrupt_cache_does_not_stop_a_scan() -> anyhow::Result<()> {
    let server = wiremock::MockServer::start().await;
    let dir = TempDir::new()?;
    let config = scan_config(&dir, 1);
    std::fs::write(&config.cache_path, "{ not json")?;

    assert!(matches!(
        ListingCache::load(&config.cache_path),
        Err(CacheError::Corrupt { .. })
    ));

    mount_search(&server, &[4001]).await;
    mount_listing(&server, 4001, listing_page("T1 25 m²", 70_000, "Loyer 420€/mois")).await;

    let cache_path = config.cache_path.clone();
    let report = run_scan(&server.uri(), config).await?;
    assert_eq!(report.cached, vec![ad_url(&server, 4001)]);

    let cache = reload(&cache_path);
    assert_eq!(cache.len(), 1);
    println!("✓ Corrupt cache replaced after a successful scan");

    Ok(())
}
