use pulse_data::{BinanceFuturesUsd, WebhookSink};
use pulse_engine::{dedup::AlertDedupGate, engine::Engine, notify::dispatch::Dispatcher};
use std::{process::ExitCode, sync::Arc};
use tracing::{error, info, warn};

mod config;

use config::ServerConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging
    init_logging();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        binance_url = %config.binance_url,
        windows = ?config.engine.window_intervals.keys().collect::<Vec<_>>(),
        instruments = config.engine.instruments.as_ref().map(Vec::len),
        "Starting pulse server"
    );

    let source = match BinanceFuturesUsd::new(&config.binance_url, config.engine.fetch_timeout) {
        Ok(source) => source,
        Err(error) => {
            error!(%error, "failed to initialise Binance client");
            return ExitCode::FAILURE;
        }
    };

    let Some(dispatcher) = init_dispatcher(&config) else {
        return ExitCode::FAILURE;
    };

    Engine::new(config.engine, source, dispatcher)
        .run(shutdown_signal())
        .await;

    info!("pulse server stopped");
    ExitCode::SUCCESS
}

/// Register one webhook sink per configured channel.
fn init_dispatcher(config: &ServerConfig) -> Option<Dispatcher> {
    let gate = AlertDedupGate::new(config.engine.cooldown, config.engine.dedup_capacity);
    let mut dispatcher = Dispatcher::new(gate).with_send_timeout(config.engine.send_timeout);

    for (channel, url) in &config.webhooks {
        match WebhookSink::new(url, config.webhook_format) {
            Ok(sink) => {
                info!(%channel, host = sink.url().host_str().unwrap_or_default(), "registered webhook sink");
                dispatcher.register(*channel, Arc::new(sink));
            }
            Err(error) => {
                error!(%channel, %error, "invalid webhook url");
                return None;
            }
        }
    }

    if config.webhooks.is_empty() {
        warn!("no webhook configured, notifications will only be logged");
    }

    Some(dispatcher)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Initialize logging
///
/// `RUST_LOG` controls the filter (default `info`), `LOG_FORMAT=json` switches to JSON lines.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
