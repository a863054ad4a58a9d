mod helpers;

use std::sync::Arc;

use candela::{CandelaError, Timeframe};
use candela_core::{CsvStore, SeriesKey, SeriesStore, WriteMode};
use candela_mock::{MockExchange, fixtures};
use helpers::*;

async fn synced(derived: &[Timeframe]) -> (tempfile::TempDir, Arc<CsvStore>, candela::Candela) {
    let (dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 120)),
    );
    let candela = builder(&mock, &store, 120)
        .symbols([BTC, ETH])
        .derived(derived.iter().copied())
        .build()
        .unwrap();
    candela.run_pass().await;
    (dir, store, candela)
}

#[tokio::test]
async fn list_reports_every_configured_series() {
    let (_dir, _store, candela) = synced(&[Timeframe::H1]).await;
    let entries = candela.catalog().list().await.unwrap();

    let names: Vec<&str> = entries.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, ["btc1m.csv", "btc1h.csv", "eth1m.csv", "eth1h.csv"]);

    let btc = &entries[0];
    assert!(btc.base && btc.present && btc.size > 0);
    assert_eq!(btc.last_timestamp_ms, Some(t0() + minutes(119)));
    assert_eq!(entries[1].last_timestamp_ms, Some(t0() + minutes(60)));

    // ETH failed upstream, so nothing is on disk for it.
    assert!(!entries[2].present);
    assert_eq!(entries[2].size, 0);
    assert_eq!(entries[2].last_timestamp_ms, None);
}

#[tokio::test]
async fn open_only_resolves_configured_present_files() {
    let (dir, _store, candela) = synced(&[Timeframe::H1]).await;
    let catalog = candela.catalog();

    assert_eq!(
        catalog.open("btc/usdt", Timeframe::M1).unwrap(),
        dir.path().join("btc1m.csv")
    );
    assert_eq!(
        catalog.open_file("btc1h.csv").unwrap(),
        dir.path().join("btc1h.csv")
    );
    assert!(matches!(
        catalog.open("DOGE/USDT", Timeframe::M1),
        Err(CandelaError::NotFound { .. })
    ));
    assert!(matches!(
        catalog.open(BTC, Timeframe::D1),
        Err(CandelaError::NotFound { .. })
    ));
    assert!(matches!(
        catalog.open(ETH, Timeframe::M1),
        Err(CandelaError::NotFound { .. })
    ));

    std::fs::write(dir.path().join("notes.csv"), "secret").unwrap();
    assert!(matches!(
        catalog.open_file("notes.csv"),
        Err(CandelaError::NotFound { .. })
    ));
    assert!(matches!(
        catalog.open_file("../btc1m.csv"),
        Err(CandelaError::NotFound { .. })
    ));
}

#[tokio::test]
async fn synthesize_matches_pre_generated_output() {
    let (dir, _store, candela) = synced(&[Timeframe::H1]).await;
    let catalog = candela.catalog();

    let bytes = catalog.synthesize(BTC, Timeframe::H1).await.unwrap();
    let on_disk = std::fs::read(dir.path().join("btc1h.csv")).unwrap();
    assert_eq!(bytes.as_slice(), on_disk.as_slice());

    let again = catalog.synthesize(BTC, Timeframe::H1).await.unwrap();
    assert!(Arc::ptr_eq(&bytes, &again));
}

#[tokio::test]
async fn synthesize_refreshes_when_the_base_grows() {
    let (_dir, store, candela) = synced(&[]).await;
    let catalog = candela.catalog();

    let before = catalog.synthesize(BTC, Timeframe::H4).await.unwrap();
    store
        .write(
            &SeriesKey::new(BTC, Timeframe::M1),
            &fixtures::series(t0() + minutes(120), Timeframe::M1, 180),
            WriteMode::Append,
        )
        .unwrap();
    let after = catalog.synthesize(BTC, Timeframe::H4).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    let text = String::from_utf8(after.to_vec()).unwrap();
    // header + two 4h buckets (00:00 and 04:00)
    assert_eq!(text.lines().count(), 3);
}

#[tokio::test]
async fn synthesize_rejects_bad_requests() {
    let (_dir, _store, candela) = synced(&[]).await;
    let catalog = candela.catalog();

    assert!(matches!(
        catalog.synthesize("DOGE/USDT", Timeframe::H1).await,
        Err(CandelaError::NotFound { .. })
    ));
    assert!(matches!(
        catalog.synthesize(ETH, Timeframe::H1).await,
        Err(CandelaError::NotFound { .. })
    ));
    assert!(matches!(
        catalog.synthesize(BTC, Timeframe::M1).await,
        Err(CandelaError::InvalidArg(_))
    ));
}
