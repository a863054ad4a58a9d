use std::sync::Arc;
use std::time::Duration;

use candela_core::{CandelaError, ExchangeClient, Timeframe};
use candela_middleware::{ClientBuilder, QuotaAwareClient};
use candela_mock::{MockBehavior, MockExchange, fixtures};
use candela_types::QuotaConfig;

fn mock() -> Arc<MockExchange> {
    Arc::new(MockExchange::new().with_series(
        "BTC/USDT",
        fixtures::series(0, Timeframe::M1, 100),
    ))
}

fn make_wrapper(inner: Arc<MockExchange>, limit: u64, window_ms: u64) -> QuotaAwareClient {
    QuotaAwareClient::new(
        inner,
        QuotaConfig {
            limit,
            window: Duration::from_millis(window_ms),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn allows_until_limit_then_blocks() {
    let wrapper = make_wrapper(mock(), 3, 10_000);

    assert!(wrapper.should_allow_call().is_ok());
    assert!(wrapper.should_allow_call().is_ok());
    assert!(wrapper.should_allow_call().is_ok());
    match wrapper.should_allow_call() {
        Err(CandelaError::QuotaExceeded {
            remaining,
            reset_in_ms,
        }) => {
            assert_eq!(remaining, 0);
            assert!(reset_in_ms <= 10_000);
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn window_reset_allows_after_duration() {
    let wrapper = make_wrapper(mock(), 2, 50);

    assert!(wrapper.should_allow_call().is_ok());
    assert!(wrapper.should_allow_call().is_ok());
    assert!(wrapper.should_allow_call().is_err());

    tokio::time::advance(Duration::from_millis(60)).await;

    assert!(wrapper.should_allow_call().is_ok());
    assert_eq!(wrapper.state().remaining, 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_waits_for_next_window_instead_of_failing() {
    let inner = mock();
    let wrapper = make_wrapper(inner.clone(), 2, 1_000);
    let start = tokio::time::Instant::now();

    for _ in 0..5 {
        wrapper
            .fetch_candles("BTC/USDT", Timeframe::M1, 0, 10)
            .await
            .expect("paced call succeeds");
    }

    // Five calls at two per second need two full window rollovers.
    assert!(start.elapsed() >= Duration::from_millis(2_000));
    assert_eq!(inner.calls().await.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn upstream_rate_limit_spends_the_window() {
    let inner = mock();
    inner
        .push_behavior(
            "BTC/USDT",
            MockBehavior::Fail(CandelaError::RateLimitExceeded {
                limit: 0,
                window_ms: 0,
            }),
        )
        .await;
    let wrapper = make_wrapper(inner, 100, 1_000);

    let err = wrapper
        .fetch_candles("BTC/USDT", Timeframe::M1, 0, 10)
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(wrapper.state().remaining, 0);

    let start = tokio::time::Instant::now();
    wrapper
        .fetch_candles("BTC/USDT", Timeframe::M1, 0, 10)
        .await
        .unwrap();
    assert!(start.elapsed() > Duration::ZERO);
}

#[tokio::test]
async fn builder_replaces_quota_and_preserves_window() {
    let builder = ClientBuilder::new(mock())
        .with_quota(&QuotaConfig {
            limit: 10,
            window: Duration::from_secs(5),
        })
        .quota_limit(20);
    let layers = builder.describe();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].0, "QuotaAwareClient");
    assert_eq!(layers[0].1["limit"], 20);
    assert_eq!(layers[0].1["window_ms"], 5_000);
    assert_eq!(layers[1].1["name"], "candela-mock");

    let client = builder.build();
    assert_eq!(client.name(), "candela-mock");
    assert_eq!(
        client
            .fetch_candles("BTC/USDT", Timeframe::M1, 0, 3)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn quota_window_keeps_the_configured_limit() {
    let layers = ClientBuilder::new(mock())
        .quota_limit(7)
        .quota_window(Duration::from_secs(2))
        .describe();
    assert_eq!(layers[0].1["limit"], 7);
    assert_eq!(layers[0].1["window_ms"], 2_000);

    let defaults = ClientBuilder::new(mock())
        .quota_window(Duration::from_millis(250))
        .describe();
    assert_eq!(defaults[0].1["limit"], QuotaConfig::default().limit);
    assert_eq!(defaults[0].1["window_ms"], 250);
}

#[tokio::test(start_paused = true)]
async fn state_reports_remaining_budget_and_reset() {
    let wrapper = make_wrapper(mock(), 4, 1_000);
    assert_eq!(wrapper.state().remaining, 4);

    wrapper
        .fetch_candles("BTC/USDT", Timeframe::M1, 0, 10)
        .await
        .unwrap();
    tokio::time::advance(Duration::from_millis(400)).await;

    let state = wrapper.state();
    assert_eq!(state.limit, 4);
    assert_eq!(state.remaining, 3);
    assert_eq!(state.reset_in, Duration::from_millis(600));
}

#[test]
fn builder_without_quota_is_pass_through() {
    let builder = ClientBuilder::new(mock()).quota_limit(5).without_quota();
    assert_eq!(builder.describe().len(), 1);
}
