mod helpers;

use std::sync::Arc;
use std::time::Duration;

use candela::{
    CandelaError, RebuildPolicy, SymbolOutcome, SyncPhase, SyncState, TargetEnd, Timeframe,
};
use candela_core::{SeriesKey, SeriesStore, WriteMode};
use candela_mock::{MockBehavior, MockExchange, fixtures};
use helpers::*;

#[tokio::test]
async fn five_candle_window_is_created_in_one_write() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 5)),
    );
    let candela = builder(&mock, &store, 5).symbols([BTC]).build().unwrap();

    let report = candela.run_pass().await;
    assert_eq!(report.target_end_ms, t0() + minutes(5));
    let btc = &report.symbols[0];
    assert_eq!(btc.initial_state, SyncState::Empty);
    assert_eq!(
        btc.outcome,
        SymbolOutcome::Synced {
            rows: 5,
            flushes: 1,
            created: true
        }
    );

    let stored = store.read_full(&SeriesKey::new(BTC, Timeframe::M1)).unwrap();
    let offsets: Vec<i64> = timestamps(&stored).iter().map(|ts| ts - t0()).collect();
    assert_eq!(offsets, [0, 60_000, 120_000, 180_000, 240_000]);
    assert_eq!(stored, fixtures::series(t0(), Timeframe::M1, 5));
}

#[tokio::test]
async fn second_pass_makes_no_network_calls() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new()
            .with_series(BTC, fixtures::series(t0(), Timeframe::M1, 30))
            .with_series(ETH, fixtures::series(t0(), Timeframe::M1, 30)),
    );
    let candela = builder(&mock, &store, 30)
        .symbols([BTC, ETH])
        .page_limit(7)
        .build()
        .unwrap();

    let first = candela.run_pass().await;
    assert_eq!(first.rows_written(), 60);
    mock.clear_calls().await;

    let second = candela.run_pass().await;
    assert!(mock.calls().await.is_empty());
    assert_eq!(second.rows_written(), 0);
    for r in &second.symbols {
        assert_eq!(r.initial_state, SyncState::Complete);
        assert_eq!(r.outcome, SymbolOutcome::Skipped);
    }
}

#[tokio::test]
async fn resume_requests_exactly_one_bucket_after_the_tail() {
    let (_dir, store) = temp_store();
    let key = SeriesKey::new(BTC, Timeframe::M1);
    store
        .write(&key, &fixtures::series(t0(), Timeframe::M1, 10), WriteMode::Create)
        .unwrap();
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 60)),
    );
    let candela = builder(&mock, &store, 60)
        .symbols([BTC])
        .tolerance(Duration::ZERO)
        .build()
        .unwrap();

    let report = candela.run_pass().await;
    assert_eq!(
        report.symbols[0].initial_state,
        SyncState::Partial(t0() + minutes(10))
    );
    let calls = mock.calls_for(BTC).await;
    assert_eq!(calls[0].since_ms, t0() + minutes(10));
    assert_eq!(
        report.symbols[0].outcome,
        SymbolOutcome::Synced {
            rows: 50,
            flushes: 1,
            created: false
        }
    );

    let stored = store.read_full(&key).unwrap();
    assert_eq!(stored, fixtures::series(t0(), Timeframe::M1, 60));
}

#[tokio::test]
async fn flush_boundaries_never_duplicate_rows() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new()
            .with_series(BTC, fixtures::series(t0(), Timeframe::M1, 23))
            .with_stale_overlap(2),
    );
    let candela = builder(&mock, &store, 23)
        .symbols([BTC])
        .page_limit(5)
        .flush_rows(7)
        .build()
        .unwrap();

    let report = candela.run_pass().await;
    assert_eq!(
        report.symbols[0].outcome,
        SymbolOutcome::Synced {
            rows: 23,
            flushes: 4,
            created: true
        }
    );
    let stored = store.read_full(&SeriesKey::new(BTC, Timeframe::M1)).unwrap();
    assert_eq!(stored.len(), 23);
    assert!(timestamps(&stored).windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn upstream_gaps_are_not_errors() {
    let (_dir, store) = temp_store();
    let mut candles = fixtures::series(t0(), Timeframe::M1, 5);
    candles.extend(fixtures::series(t0() + minutes(30), Timeframe::M1, 5));
    let mock = Arc::new(MockExchange::new().with_series(BTC, candles.clone()));
    let candela = builder(&mock, &store, 40)
        .symbols([BTC])
        .tolerance(Duration::ZERO)
        .page_limit(5)
        .build()
        .unwrap();

    let report = candela.run_pass().await;
    assert!(!report.symbols[0].is_failed());
    assert_eq!(
        store.read_full(&SeriesKey::new(BTC, Timeframe::M1)).unwrap(),
        candles
    );

    // The tail gap up to the end is re-probed and skipped without writing.
    let again = candela.run_pass().await;
    assert_eq!(again.symbols[0].initial_state, SyncState::Partial(t0() + minutes(35)));
    assert_eq!(
        again.symbols[0].outcome,
        SymbolOutcome::Synced {
            rows: 0,
            flushes: 0,
            created: false
        }
    );
}

#[tokio::test]
async fn corrupt_tail_is_rebuilt_from_start() {
    let (dir, store) = temp_store();
    let path = dir.path().join("btc1m.csv");
    std::fs::write(
        &path,
        "timestamp,open,high,low,close,volume,datetime\n1704067200000,1,1,1,1,1,2024-01-01 00:00:00\n17040672",
    )
    .unwrap();
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 8)),
    );
    let candela = builder(&mock, &store, 8).symbols([BTC]).build().unwrap();

    let report = candela.run_pass().await;
    let btc = &report.symbols[0];
    assert!(matches!(btc.initial_state, SyncState::Corrupt(_)));
    assert!(matches!(btc.warnings[0], CandelaError::Storage { .. }));
    assert_eq!(
        btc.outcome,
        SymbolOutcome::Synced {
            rows: 8,
            flushes: 1,
            created: true
        }
    );
    assert_eq!(mock.calls().await[0].since_ms, t0());
    assert_eq!(
        store.read_full(&SeriesKey::new(BTC, Timeframe::M1)).unwrap(),
        fixtures::series(t0(), Timeframe::M1, 8)
    );
}

#[tokio::test]
async fn always_rebuild_discards_resumable_data() {
    let (_dir, store) = temp_store();
    let key = SeriesKey::new(BTC, Timeframe::M1);
    store
        .write(&key, &fixtures::series(t0(), Timeframe::M1, 3), WriteMode::Create)
        .unwrap();
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 20)),
    );
    let candela = builder(&mock, &store, 20)
        .symbols([BTC])
        .rebuild_policy(RebuildPolicy::AlwaysRebuild)
        .build()
        .unwrap();

    let report = candela.run_pass().await;
    assert_eq!(mock.calls().await[0].since_ms, t0());
    assert_eq!(
        report.symbols[0].outcome,
        SymbolOutcome::Synced {
            rows: 20,
            flushes: 1,
            created: true
        }
    );
    assert_eq!(store.read_full(&key).unwrap().len(), 20);
}

#[tokio::test]
async fn failures_are_contained_per_symbol() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new()
            .with_series(BTC, fixtures::series(t0(), Timeframe::M1, 10))
            .with_series(ETH, fixtures::series(t0(), Timeframe::M1, 10)),
    );
    let candela = builder(&mock, &store, 10)
        .symbols([BTC, "NOPE/USDT", ETH])
        .build()
        .unwrap();

    let report = candela.run_pass().await;
    assert_eq!(report.failures().count(), 1);
    let nope = &report.symbols[1];
    assert!(matches!(
        nope.outcome,
        SymbolOutcome::Failed {
            phase: SyncPhase::Fetching,
            rows: 0,
            error: CandelaError::InvalidArg(_)
        }
    ));
    assert_eq!(report.symbols[0].rows_written(), 10);
    assert_eq!(report.symbols[2].rows_written(), 10);
}

#[tokio::test]
async fn rows_fetched_before_a_hard_failure_are_kept() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new().with_series(ETH, fixtures::series(t0(), Timeframe::M1, 20)),
    );
    mock.push_behavior(
        ETH,
        MockBehavior::Page(fixtures::series(t0(), Timeframe::M1, 5)),
    )
    .await;
    mock.push_behavior(ETH, MockBehavior::Fail(CandelaError::Data("bad row".into())))
        .await;
    let candela = builder(&mock, &store, 20).symbols([ETH]).build().unwrap();

    let report = candela.run_pass().await;
    assert_eq!(
        report.symbols[0].outcome,
        SymbolOutcome::Failed {
            phase: SyncPhase::Fetching,
            rows: 5,
            error: CandelaError::Data("bad row".into())
        }
    );
    let key = SeriesKey::new(ETH, Timeframe::M1);
    assert_eq!(store.probe_last_timestamp(&key), Some(t0() + minutes(4)));

    // Next pass resumes right after the kept rows.
    mock.clear_calls().await;
    let report = candela.run_pass().await;
    assert_eq!(mock.calls().await[0].since_ms, t0() + minutes(5));
    assert_eq!(report.symbols[0].rows_written(), 15);
    assert_eq!(store.read_full(&key).unwrap().len(), 20);
}

#[tokio::test]
async fn transient_failures_are_retried_within_the_pass() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 6)),
    );
    for _ in 0..3 {
        mock.push_behavior(
            BTC,
            MockBehavior::Fail(CandelaError::connector("candela-mock", "connection reset")),
        )
        .await;
    }
    let candela = builder(&mock, &store, 6).symbols([BTC]).build().unwrap();

    let report = candela.run_pass().await;
    assert_eq!(report.symbols[0].rows_written(), 6);
    let calls = mock.calls().await;
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|c| c.since_ms == t0()));
}

#[tokio::test]
async fn live_end_excludes_the_bucket_in_progress() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new()
            .with_series(BTC, fixtures::series(t0(), Timeframe::M1, 11))
            .with_now(t0() + minutes(10) + 30_000),
    );
    let candela = builder(&mock, &store, 0)
        .symbols([BTC])
        .end(TargetEnd::Now)
        .build()
        .unwrap();

    let report = candela.run_pass().await;
    assert_eq!(report.target_end_ms, t0() + minutes(10));
    let stored = store.read_full(&SeriesKey::new(BTC, Timeframe::M1)).unwrap();
    assert_eq!(stored.len(), 10);
    assert_eq!(stored.last().unwrap().timestamp_ms, t0() + minutes(9));
}

#[tokio::test]
async fn future_fixed_end_waits_for_the_bucket_in_progress() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new()
            .with_series(BTC, fixtures::series(t0(), Timeframe::M1, 11))
            .with_now(t0() + minutes(10) + 30_000),
    );
    let candela = builder(&mock, &store, 24 * 60).symbols([BTC]).build().unwrap();
    let key = SeriesKey::new(BTC, Timeframe::M1);

    let first = candela.run_pass().await;
    assert_eq!(first.target_end_ms, t0() + minutes(10));
    assert_eq!(store.probe_last_timestamp(&key), Some(t0() + minutes(9)));

    // Minute 10 closes at a different price than it showed while in progress.
    let mut finished = fixtures::candle_at(t0() + minutes(10));
    finished.close = rust_decimal::Decimal::new(42, 0);
    mock.extend_series(BTC, vec![finished, fixtures::candle_at(t0() + minutes(11))])
        .await;
    mock.set_now(t0() + minutes(12));

    let second = candela.run_pass().await;
    assert_eq!(second.target_end_ms, t0() + minutes(12));
    let stored = store.read_full(&key).unwrap();
    assert_eq!(stored.len(), 12);
    assert_eq!(stored[10].close, rust_decimal::Decimal::new(42, 0));
}

#[tokio::test]
async fn derived_series_follow_the_base() {
    let (dir, store) = temp_store();
    let mock = Arc::new(
        MockExchange::new().with_series(ETH, fixtures::series(t0(), Timeframe::M1, 120)),
    );
    let candela = builder(&mock, &store, 120)
        .symbols([ETH])
        .derived([Timeframe::M15, Timeframe::H1])
        .build()
        .unwrap();

    let report = candela.run_pass().await;
    assert_eq!(report.symbols[0].derived, [Timeframe::M15, Timeframe::H1]);
    let hourly = store.read_full(&SeriesKey::new(ETH, Timeframe::H1)).unwrap();
    assert_eq!(timestamps(&hourly), [t0(), t0() + minutes(60)]);
    let base = fixtures::series(t0(), Timeframe::M1, 60);
    assert_eq!(hourly[0].open, base[0].open);
    assert_eq!(hourly[0].close, base[59].close);
    assert_eq!(
        hourly[0].volume,
        base.iter().map(|c| c.volume).sum::<rust_decimal::Decimal>()
    );

    // Up-to-date base and present derived files: nothing to do.
    let idle = candela.run_pass().await;
    assert!(idle.symbols[0].derived.is_empty());

    // A missing derived file is regenerated without touching the exchange.
    std::fs::remove_file(dir.path().join("eth15m.csv")).unwrap();
    mock.clear_calls().await;
    let repaired = candela.run_pass().await;
    assert!(mock.calls().await.is_empty());
    assert_eq!(repaired.symbols[0].derived, [Timeframe::M15, Timeframe::H1]);
    assert_eq!(
        store
            .read_full(&SeriesKey::new(ETH, Timeframe::M15))
            .unwrap()
            .len(),
        8
    );
}

#[test]
fn builder_rejects_incomplete_or_invalid_setups() {
    let (_dir, store) = temp_store();
    let mock = Arc::new(MockExchange::new());

    let no_client = candela::Candela::builder()
        .store(store.clone())
        .symbols([BTC])
        .build();
    assert!(matches!(no_client, Err(CandelaError::InvalidArg(_))));

    let bad_derived = builder(&mock, &store, 10)
        .symbols([BTC])
        .derived([Timeframe::M1])
        .build();
    assert!(matches!(bad_derived, Err(CandelaError::InvalidArg(_))));

    let colliding = builder(&mock, &store, 10)
        .symbols(["BTC/USDT", "BTC/EUR"])
        .build();
    assert!(matches!(colliding, Err(CandelaError::InvalidArg(m)) if m.contains("btc1m.csv")));
}
