mod helpers;

use std::sync::Arc;
use std::time::Duration;

use candela::{BackoffConfig, CandelaError, Paginator, Timeframe};
use candela_mock::{MockBehavior, MockExchange, fixtures};
use futures::StreamExt;
use helpers::*;

fn pager(mock: &Arc<MockExchange>, since: i64, until: i64, limit: usize) -> Paginator {
    Paginator::new(
        mock.clone(),
        BTC,
        Timeframe::M1,
        since,
        until,
        limit,
        BackoffConfig {
            delay_ms: 5_000,
            jitter_percent: 0,
        },
    )
}

#[tokio::test]
async fn empty_page_skips_a_full_page_width() {
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 30)),
    );
    mock.push_behavior(BTC, MockBehavior::Page(Vec::new())).await;
    let mut p = pager(&mock, t0(), t0() + minutes(30), 10);

    let page = p.next_page().await.unwrap().unwrap();
    assert_eq!(page.first().unwrap().timestamp_ms, t0() + minutes(10));
    let calls = mock.calls().await;
    assert_eq!(calls[0].since_ms, t0());
    assert_eq!(calls[1].since_ms, t0() + minutes(10));
}

#[tokio::test]
async fn empty_page_reaching_the_end_stops() {
    let mock = Arc::new(MockExchange::new().with_series(BTC, Vec::new()));
    let mut p = pager(&mock, t0(), t0() + minutes(25), 10);
    assert!(p.next_page().await.unwrap().is_none());
    // 0, +10m, +20m; the next step lands past the end.
    assert_eq!(mock.calls().await.len(), 3);
    assert!(p.next_page().await.unwrap().is_none());
    assert_eq!(mock.calls().await.len(), 3);
}

#[tokio::test]
async fn candles_at_or_past_the_end_are_dropped() {
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 10)),
    );
    let mut p = pager(&mock, t0(), t0() + minutes(4), 100);
    let page = p.next_page().await.unwrap().unwrap();
    assert_eq!(timestamps(&page), [t0(), t0() + minutes(1), t0() + minutes(2), t0() + minutes(3)]);
    assert!(p.next_page().await.unwrap().is_none());
    assert_eq!(mock.calls().await.len(), 1);
}

#[tokio::test]
async fn page_entirely_past_the_end_is_the_live_edge() {
    let mock = Arc::new(MockExchange::new().with_series(
        BTC,
        fixtures::series(t0() + minutes(50), Timeframe::M1, 5),
    ));
    let mut p = pager(&mock, t0(), t0() + minutes(20), 10);
    assert!(p.next_page().await.unwrap().is_none());
    assert_eq!(mock.calls().await.len(), 1);
}

#[tokio::test]
async fn stale_and_out_of_order_candles_are_filtered() {
    let mock = Arc::new(MockExchange::new().with_series(BTC, Vec::new()));
    let mut scrambled = fixtures::series(t0() - minutes(2), Timeframe::M1, 6);
    scrambled.swap(3, 4);
    scrambled.push(fixtures::candle_at(t0() + minutes(1)));
    mock.push_behavior(BTC, MockBehavior::Page(scrambled)).await;
    let mut p = pager(&mock, t0(), t0() + minutes(60), 10);

    let page = p.next_page().await.unwrap().unwrap();
    // t0-2m and t0-1m are stale; t0+2m arrives before t0+1m so the later t0+1m is dropped.
    assert_eq!(timestamps(&page), [t0(), t0() + minutes(2), t0() + minutes(3)]);
    assert_eq!(p.cursor(), t0() + minutes(4));
}

#[tokio::test]
async fn all_stale_page_forces_the_cursor_forward() {
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 30)),
    );
    mock.push_behavior(
        BTC,
        MockBehavior::Page(fixtures::series(t0() - minutes(5), Timeframe::M1, 3)),
    )
    .await;
    let mut p = pager(&mock, t0(), t0() + minutes(30), 10);

    let page = p.next_page().await.unwrap().unwrap();
    assert_eq!(page[0].timestamp_ms, t0() + minutes(10));
    assert_eq!(mock.calls().await[1].since_ms, t0() + minutes(10));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_wait_and_retry_the_same_page() {
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 3)),
    );
    mock.push_behavior(BTC, MockBehavior::Fail(CandelaError::provider_timeout("candela-mock")))
        .await;
    mock.push_behavior(
        BTC,
        MockBehavior::Fail(CandelaError::connector("candela-mock", "reset")),
    )
    .await;
    let mut p = pager(&mock, t0(), t0() + minutes(3), 10);
    let start = tokio::time::Instant::now();

    let page = p.next_page().await.unwrap().unwrap();
    assert_eq!(page.len(), 3);
    assert_eq!(p.retries(), 2);
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert!(mock.calls().await.iter().all(|c| c.since_ms == t0()));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_at_least_the_upstream_window() {
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 3)),
    );
    mock.push_behavior(
        BTC,
        MockBehavior::Fail(CandelaError::RateLimitExceeded {
            limit: 0,
            window_ms: 30_000,
        }),
    )
    .await;
    let mut p = pager(&mock, t0(), t0() + minutes(3), 10);
    let start = tokio::time::Instant::now();
    assert!(p.next_page().await.unwrap().is_some());
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test]
async fn hard_errors_end_the_sequence() {
    let mock = Arc::new(MockExchange::new());
    let mut p = Paginator::new(
        mock.clone(),
        "NOPE/USDT",
        Timeframe::M1,
        t0(),
        t0() + minutes(10),
        10,
        BackoffConfig::default(),
    );
    assert!(matches!(
        p.next_page().await,
        Err(CandelaError::InvalidArg(_))
    ));
    assert!(p.next_page().await.unwrap().is_none());
    assert_eq!(mock.calls().await.len(), 1);
}

#[tokio::test]
async fn stream_yields_contiguous_pages() {
    let mock = Arc::new(
        MockExchange::new().with_series(BTC, fixtures::series(t0(), Timeframe::M1, 25)),
    );
    let pages: Vec<_> = pager(&mock, t0(), t0() + minutes(25), 10)
        .into_stream()
        .collect()
        .await;
    let sizes: Vec<usize> = pages.iter().map(|p| p.as_ref().unwrap().len()).collect();
    assert_eq!(sizes, [10, 10, 5]);
    let all: Vec<i64> = pages
        .into_iter()
        .flat_map(|p| timestamps(&p.unwrap()))
        .collect();
    assert_eq!(all, timestamps(&fixtures::series(t0(), Timeframe::M1, 25)));
}
