//! Environment configuration.
//!
//! Every variable is optional; unset variables fall back to [`EngineConfig::default`].
//! A variable that is set but malformed is a [`ConfigError`] at start-up.

use pulse_data::{BASE_URL_BINANCE_FUTURES_USD, WebhookFormat};
use pulse_engine::{
    change::Materiality,
    config::EngineConfig,
    error::ConfigError,
    notify::channel::Channel,
    types::{InstrumentId, Window},
};
use std::{collections::BTreeMap, str::FromStr, time::Duration};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    pub binance_url: String,
    /// Webhook url per channel, from `WEBHOOK_URL_<CHANNEL>`.
    pub webhooks: BTreeMap<Channel, String>,
    pub webhook_format: WebhookFormat,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut engine = EngineConfig::default();

        if let Some(intervals) = env.get("WINDOW_INTERVALS") {
            engine.window_intervals = parse_window_intervals(&intervals)?;
        }

        if let Some(size) = env.parse("RANKING_SIZE")? {
            engine.ranking_size = size;
        }
        if let Some(size) = env.parse("COMBINED_RANKING_SIZE")? {
            engine.combined_ranking_size = size;
        }

        let percent = env
            .parse::<f64>("MATERIALITY_PERCENT")?
            .unwrap_or(engine.materiality.percent);
        let mut materiality = Materiality::percent(percent);
        if let Some(absolute) = env.parse::<f64>("MATERIALITY_ABSOLUTE")? {
            materiality = materiality.with_absolute(absolute);
        }
        engine.materiality = materiality;

        if let Some(cooldown) = env.secs("COOLDOWN_SECS")? {
            engine.cooldown = cooldown;
        }
        if let Some(capacity) = env.parse("DEDUP_CAPACITY")? {
            engine.dedup_capacity = capacity;
        }
        if let Some(timeout) = env.millis("SEND_TIMEOUT_MS")? {
            engine.send_timeout = timeout;
        }
        if let Some(interval) = env.secs("SAMPLE_INTERVAL_SECS")? {
            engine.sample_interval = interval;
        }
        if let Some(interval) = env.secs("ROLL_INTERVAL_SECS")? {
            engine.roll_interval = interval;
        }
        if let Some(interval) = env.secs("REPORT_INTERVAL_SECS")? {
            engine.report_interval = interval;
        }
        if let Some(size) = env.parse("BATCH_SIZE")? {
            engine.batch_size = size;
        }
        if let Some(delay) = env.millis("BATCH_DELAY_MS")? {
            engine.batch_delay = delay;
        }
        if let Some(timeout) = env.millis("FETCH_TIMEOUT_MS")? {
            engine.fetch_timeout = timeout;
        }
        if let Some(refresh) = env.secs("UNIVERSE_REFRESH_SECS")? {
            engine.universe_refresh = refresh;
        }
        if let Some(stale) = env.secs("STALE_AFTER_SECS")? {
            engine.stale_after = stale;
        }

        if let Some(instruments) = env.get("INSTRUMENTS") {
            let instruments: Vec<InstrumentId> = instruments
                .split(',')
                .map(|symbol| symbol.trim().to_uppercase())
                .filter(|symbol| !symbol.is_empty())
                .map(InstrumentId::from)
                .collect();
            if !instruments.is_empty() {
                engine.instruments = Some(instruments);
            }
        }

        let webhooks = Channel::ALL
            .into_iter()
            .filter_map(|channel| {
                let key = format!("WEBHOOK_URL_{}", channel.as_str().to_uppercase());
                env.get(&key).map(|url| (channel, url))
            })
            .collect();

        let webhook_format = env.parse("WEBHOOK_FORMAT")?.unwrap_or_default();

        Ok(Self {
            engine,
            binance_url: env
                .get("BINANCE_FAPI_URL")
                .unwrap_or_else(|| BASE_URL_BINANCE_FUTURES_USD.to_string()),
            webhooks,
            webhook_format,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set, non-blank value.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|value| {
                value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn secs(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }

    fn millis(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }
}

/// Parse `"5m=300000,15m=900000"` (window name = roll interval in milliseconds).
pub fn parse_window_intervals(raw: &str) -> Result<BTreeMap<Window, Duration>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || ConfigError::InvalidValue {
                key: "WINDOW_INTERVALS".to_string(),
                value: entry.to_string(),
            };
            let (window, millis) = entry.split_once('=').ok_or_else(invalid)?;
            let window = window.parse::<Window>()?;
            let millis = millis.trim().parse::<u64>().map_err(|_| invalid())?;
            if millis == 0 {
                return Err(invalid());
            }
            Ok((window, Duration::from_millis(millis)))
        })
        .collect()
}
