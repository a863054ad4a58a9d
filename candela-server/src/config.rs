use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use candela::{
    BackoffConfig, CandelaError, QuotaConfig, RebuildPolicy, SyncConfig, SyncMode, TargetEnd,
    Timeframe,
};
use candela_binance::DEFAULT_BASE_URL;
use chrono::{NaiveDate, NaiveDateTime};

/// Pairs mirrored when `CANDELA_SYMBOLS` is not set.
pub const DEFAULT_SYMBOLS: &[&str] = &[
    "BTC/USDT", "ETH/USDT", "XRP/USDT", "SOL/USDT", "DOGE/USDT", "ADA/USDT", "BCH/USDT",
    "LINK/USDT", "XLM/USDT", "SUI/USDT", "AVAX/USDT", "LTC/USDT", "HBAR/USDT", "SHIB/USDT",
    "TON/USDT",
];

/// Server configuration derived from environment variables (a `.env` file is honored).
///
/// | Variable | Default |
/// |---|---|
/// | `CANDELA_SYMBOLS` | the fifteen USDT pairs in [`DEFAULT_SYMBOLS`] |
/// | `CANDELA_TIMEFRAME` | `1m` |
/// | `CANDELA_START` | `2020-01-01 00:00:00` (also `YYYY-MM-DD`, RFC 3339 or epoch ms) |
/// | `CANDELA_END` | `now` |
/// | `CANDELA_DERIVED` | empty (comma separated labels, e.g. `1h,1d`) |
/// | `CANDELA_FLUSH_ROWS` | `50000` |
/// | `CANDELA_TOLERANCE_MS` | `120000` |
/// | `CANDELA_PAGE_LIMIT` | `1000` |
/// | `CANDELA_RETRY_DELAY_MS` / `CANDELA_RETRY_JITTER_PERCENT` | `5000` / `0` |
/// | `CANDELA_REBUILD` | `resume` (or `always`) |
/// | `CANDELA_MODE` / `CANDELA_POLL_INTERVAL_SECS` | `poll` / `30` |
/// | `CANDELA_DATA_DIR` | `data` |
/// | `CANDELA_BIND` / `CANDELA_PORT` | `0.0.0.0` / `8000` |
/// | `CANDELA_EXCHANGE_URL` | the public Binance API |
/// | `CANDELA_RATE_LIMIT_PER_MIN` | `1200` (`0` disables pacing) |
/// | `CANDELA_CLEANUP` | `true` |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding the series files and the lock file.
    pub data_dir: PathBuf,
    /// Address the HTTP listener binds to.
    pub bind: String,
    /// HTTP port.
    pub port: u16,
    /// Root of the exchange REST API.
    pub exchange_url: String,
    /// Client-side request pacing; `None` disables it.
    pub rate_limit: Option<QuotaConfig>,
    /// Remove files outside the configured series at startup.
    pub cleanup: bool,
    /// Synchronizer settings.
    pub sync: SyncConfig,
}

impl ServerConfig {
    /// Load `.env` (if present) and read the process environment.
    ///
    /// # Errors
    /// Returns `InvalidArg` for values that do not parse or a configuration that
    /// fails [`SyncConfig::validate`].
    pub fn from_env() -> Result<Self, CandelaError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// # Errors
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup<F>(get: F) -> Result<Self, CandelaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            get(name)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let symbols = var("CANDELA_SYMBOLS").map_or_else(
            || DEFAULT_SYMBOLS.iter().map(|s| (*s).to_string()).collect(),
            |raw| {
                raw.split(',')
                    .map(|s| s.trim().to_ascii_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            },
        );
        let timeframe: Timeframe = parsed(&var, "CANDELA_TIMEFRAME", Timeframe::M1)?;
        let start_ms = match var("CANDELA_START") {
            Some(raw) => parse_instant("CANDELA_START", &raw)?,
            None => candela_core::DEFAULT_START_MS,
        };
        let end = match var("CANDELA_END") {
            None => TargetEnd::Now,
            Some(raw) if raw.eq_ignore_ascii_case("now") => TargetEnd::Now,
            Some(raw) => TargetEnd::Fixed(parse_instant("CANDELA_END", &raw)?),
        };
        let derived = match var("CANDELA_DERIVED") {
            None => Vec::new(),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Timeframe::from_str)
                .collect::<Result<Vec<_>, _>>()?,
        };
        let rebuild_policy = match var("CANDELA_REBUILD").as_deref() {
            None | Some("resume") => RebuildPolicy::Resume,
            Some("always") => RebuildPolicy::AlwaysRebuild,
            Some(other) => {
                return Err(CandelaError::InvalidArg(format!(
                    "CANDELA_REBUILD must be 'resume' or 'always', got '{other}'"
                )));
            }
        };
        let poll_secs: u64 = parsed(&var, "CANDELA_POLL_INTERVAL_SECS", 30)?;
        let mode = match var("CANDELA_MODE").as_deref() {
            None | Some("poll") => SyncMode::Poll {
                min_interval: Duration::from_secs(poll_secs.max(1)),
            },
            Some("once") => SyncMode::Once,
            Some(other) => {
                return Err(CandelaError::InvalidArg(format!(
                    "CANDELA_MODE must be 'once' or 'poll', got '{other}'"
                )));
            }
        };

        let sync = SyncConfig {
            symbols,
            timeframe,
            start_ms,
            end,
            derived,
            flush_rows: parsed(&var, "CANDELA_FLUSH_ROWS", 50_000)?,
            tolerance_ms: parsed(&var, "CANDELA_TOLERANCE_MS", 120_000)?,
            page_limit: parsed(&var, "CANDELA_PAGE_LIMIT", 1_000)?,
            backoff: BackoffConfig {
                delay_ms: parsed(&var, "CANDELA_RETRY_DELAY_MS", 5_000)?,
                jitter_percent: parsed(&var, "CANDELA_RETRY_JITTER_PERCENT", 0)?,
            },
            rebuild_policy,
            mode,
        };
        sync.validate()?;

        let per_minute: u64 = parsed(&var, "CANDELA_RATE_LIMIT_PER_MIN", 1_200)?;
        Ok(Self {
            data_dir: PathBuf::from(var("CANDELA_DATA_DIR").unwrap_or_else(|| "data".into())),
            bind: var("CANDELA_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&var, "CANDELA_PORT", 8_000)?,
            exchange_url: var("CANDELA_EXCHANGE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            rate_limit: (per_minute > 0).then(|| QuotaConfig {
                limit: per_minute,
                window: Duration::from_secs(60),
            }),
            cleanup: match var("CANDELA_CLEANUP") {
                None => true,
                Some(raw) => parse_bool("CANDELA_CLEANUP", &raw)?,
            },
            sync,
        })
    }
}

fn parsed<T, V>(var: &V, name: &str, default: T) -> Result<T, CandelaError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| CandelaError::InvalidArg(format!("{name}='{raw}': {e}"))),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, CandelaError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(CandelaError::InvalidArg(format!(
            "{name}='{raw}' is not a boolean"
        ))),
    }
}

/// Parse epoch milliseconds, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or RFC 3339 (UTC).
fn parse_instant(name: &str, raw: &str) -> Result<i64, CandelaError> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc().timestamp_millis());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(dt) = d.and_hms_opt(0, 0, 0)
    {
        return Ok(dt.and_utc().timestamp_millis());
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| CandelaError::InvalidArg(format!("{name}='{raw}' is not a recognised instant")))
}
