//! Binance USDⓈ-M futures REST client.
//!
//! Endpoints used:
//! - `GET /fapi/v1/exchangeInfo`: instrument universe
//! - `GET /fapi/v1/openInterest`: open contracts per symbol
//! - `GET /fapi/v1/premiumIndex`: mark price and last funding rate per symbol

use crate::{
    de::{de_str, de_u64_epoch_ms_as_datetime_utc},
    error::DataError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_engine::{
    error::FetchError,
    sampler::MetricSource,
    types::{InstrumentId, MetricKind, MetricSample},
};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default Binance USDⓈ-M futures REST base url.
pub const BASE_URL_BINANCE_FUTURES_USD: &str = "https://fapi.binance.com";

// Relative to the base url so a path prefix (eg/ a proxy mount point) is preserved.
const PATH_EXCHANGE_INFO: &str = "fapi/v1/exchangeInfo";
const PATH_OPEN_INTEREST: &str = "fapi/v1/openInterest";
const PATH_PREMIUM_INDEX: &str = "fapi/v1/premiumIndex";

/// Subset of the `exchangeInfo` response.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceExchangeInfo {
    pub symbols: Vec<BinanceSymbol>,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceSymbol {
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub contract_type: String,
    pub quote_asset: String,
}

impl BinanceSymbol {
    pub fn is_tradable_usdt_perpetual(&self) -> bool {
        self.status == "TRADING" && self.contract_type == "PERPETUAL" && self.quote_asset == "USDT"
    }
}

impl BinanceExchangeInfo {
    /// Trading USDT-margined perpetuals, sorted by symbol.
    pub fn usdt_perpetuals(&self) -> Vec<InstrumentId> {
        let mut instruments: Vec<InstrumentId> = self
            .symbols
            .iter()
            .filter(|symbol| symbol.is_tradable_usdt_perpetual())
            .map(|symbol| InstrumentId::new(&symbol.symbol))
            .collect();
        instruments.sort();
        instruments
    }
}

/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Open-Interest>
/// ```json
/// {
///     "openInterest": "10659.509",
///     "symbol": "BTCUSDT",
///     "time": 1589437530011
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceOpenInterest {
    pub symbol: String,
    #[serde(rename = "openInterest", deserialize_with = "de_str")]
    pub open_interest: f64,
    #[serde(deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
}

/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Mark-Price>
/// ```json
/// {
///     "symbol": "BTCUSDT",
///     "markPrice": "11793.63104562",
///     "indexPrice": "11781.80495970",
///     "lastFundingRate": "0.00038246",
///     "nextFundingTime": 1597392000000,
///     "time": 1597370495002
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinancePremiumIndex {
    pub symbol: String,
    #[serde(rename = "markPrice", deserialize_with = "de_str")]
    pub mark_price: f64,
    #[serde(rename = "lastFundingRate", deserialize_with = "de_str")]
    pub last_funding_rate: f64,
    #[serde(deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
}

/// Open interest sample: contracts as value, notional (contracts x mark price) as auxiliary.
pub fn open_interest_sample(
    instrument: &InstrumentId,
    open_interest: &BinanceOpenInterest,
    premium: &BinancePremiumIndex,
) -> MetricSample {
    MetricSample::new(instrument.clone(), open_interest.open_interest, open_interest.time)
        .with_auxiliary(open_interest.open_interest * premium.mark_price)
}

/// Price sample: mark price.
pub fn price_sample(instrument: &InstrumentId, premium: &BinancePremiumIndex) -> MetricSample {
    MetricSample::new(instrument.clone(), premium.mark_price, premium.time)
}

/// Funding rate sample: last funding rate as value, mark price as auxiliary.
pub fn funding_rate_sample(
    instrument: &InstrumentId,
    premium: &BinancePremiumIndex,
) -> MetricSample {
    MetricSample::new(instrument.clone(), premium.last_funding_rate, premium.time)
        .with_auxiliary(premium.mark_price)
}

/// Binance USDⓈ-M futures REST client.
#[derive(Debug, Clone)]
pub struct BinanceFuturesUsd {
    client: Client,
    base_url: Url,
}

impl BinanceFuturesUsd {
    /// `base_url` may carry a path prefix, eg/ `https://proxy.example/binance`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DataError> {
        let client = Client::builder().timeout(timeout).build()?;
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, DataError> {
        self.base_url.join(path).map_err(DataError::from)
    }

    async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, DataError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DataError::from_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(DataError::from)
    }

    pub async fn exchange_info(&self) -> Result<BinanceExchangeInfo, DataError> {
        self.get(PATH_EXCHANGE_INFO, &[]).await
    }

    pub async fn open_interest(&self, symbol: &str) -> Result<BinanceOpenInterest, DataError> {
        self.get(PATH_OPEN_INTEREST, &[("symbol", symbol)]).await
    }

    pub async fn premium_index(&self, symbol: &str) -> Result<BinancePremiumIndex, DataError> {
        self.get(PATH_PREMIUM_INDEX, &[("symbol", symbol)]).await
    }
}

#[async_trait]
impl MetricSource for BinanceFuturesUsd {
    async fn instruments(&self) -> Result<Vec<InstrumentId>, FetchError> {
        let info = self.exchange_info().await?;
        let instruments = info.usdt_perpetuals();
        debug!(
            listed = info.symbols.len(),
            tradable = instruments.len(),
            "fetched Binance exchange info"
        );
        Ok(instruments)
    }

    async fn fetch(
        &self,
        metric: MetricKind,
        instrument: &InstrumentId,
    ) -> Result<MetricSample, FetchError> {
        let symbol = instrument.as_str();
        let sample = match metric {
            MetricKind::OpenInterest => {
                let (open_interest, premium) =
                    tokio::try_join!(self.open_interest(symbol), self.premium_index(symbol))?;
                open_interest_sample(instrument, &open_interest, &premium)
            }
            MetricKind::Price => price_sample(instrument, &self.premium_index(symbol).await?),
            MetricKind::FundingRate => {
                funding_rate_sample(instrument, &self.premium_index(symbol).await?)
            }
        };
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    const EXCHANGE_INFO: &str = r#"{
        "timezone": "UTC",
        "serverTime": 1700000000000,
        "symbols": [
            {"symbol":"ETHUSDT","pair":"ETHUSDT","contractType":"PERPETUAL","status":"TRADING","baseAsset":"ETH","quoteAsset":"USDT"},
            {"symbol":"BTCUSDT","pair":"BTCUSDT","contractType":"PERPETUAL","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT"},
            {"symbol":"BTCUSDT_240329","pair":"BTCUSDT","contractType":"CURRENT_QUARTER","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT"},
            {"symbol":"BTCUSDC","pair":"BTCUSDC","contractType":"PERPETUAL","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDC"},
            {"symbol":"OLDUSDT","pair":"OLDUSDT","contractType":"PERPETUAL","status":"SETTLING","baseAsset":"OLD","quoteAsset":"USDT"},
            {"symbol":"NEWUSDT","pair":"NEWUSDT","contractType":"","status":"PENDING_TRADING","baseAsset":"NEW","quoteAsset":"USDT"}
        ]
    }"#;

    const OPEN_INTEREST: &str =
        r#"{"openInterest":"10659.509","symbol":"BTCUSDT","time":1589437530011}"#;

    const PREMIUM_INDEX: &str = r#"{
        "symbol":"BTCUSDT",
        "markPrice":"11793.63104562",
        "indexPrice":"11781.80495970",
        "estimatedSettlePrice":"11781.16138815",
        "lastFundingRate":"0.00038246",
        "interestRate":"0.00010000",
        "nextFundingTime":1597392000000,
        "time":1597370495002
    }"#;

    #[test]
    fn test_exchange_info_usdt_perpetuals() {
        let info: BinanceExchangeInfo = serde_json::from_str(EXCHANGE_INFO).unwrap();
        assert_eq!(info.symbols.len(), 6);
        assert_eq!(
            info.usdt_perpetuals(),
            vec![InstrumentId::from("BTCUSDT"), InstrumentId::from("ETHUSDT")]
        );
    }

    #[test]
    fn test_samples_from_payloads() {
        let instrument = InstrumentId::from("BTCUSDT");
        let open_interest: BinanceOpenInterest = serde_json::from_str(OPEN_INTEREST).unwrap();
        let premium: BinancePremiumIndex = serde_json::from_str(PREMIUM_INDEX).unwrap();

        let sample = open_interest_sample(&instrument, &open_interest, &premium);
        assert_eq!(sample.value, 10659.509);
        assert!((sample.auxiliary.unwrap() - 10659.509 * 11793.63104562).abs() < 1e-6);
        assert_eq!(sample.timestamp.timestamp_millis(), 1_589_437_530_011);

        let sample = price_sample(&instrument, &premium);
        assert_eq!(sample.value, 11793.63104562);
        assert_eq!(sample.auxiliary, None);

        let sample = funding_rate_sample(&instrument, &premium);
        assert_eq!(sample.value, 0.00038246);
        assert_eq!(sample.auxiliary, Some(11793.63104562));
    }

    #[test]
    fn test_premium_index_rejects_empty_funding_rate() {
        let payload = PREMIUM_INDEX.replace("\"0.00038246\"", "\"\"");
        assert!(serde_json::from_str::<BinancePremiumIndex>(&payload).is_err());
    }

    #[test]
    fn test_endpoint_keeps_base_url_path_prefix() {
        struct TestCase {
            base_url: &'static str,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: origin only
                base_url: "https://fapi.binance.com",
                expected: "https://fapi.binance.com/fapi/v1/openInterest",
            },
            TestCase {
                // TC1: path prefix without trailing slash
                base_url: "https://proxy.example/binance",
                expected: "https://proxy.example/binance/fapi/v1/openInterest",
            },
            TestCase {
                // TC2: path prefix with trailing slash
                base_url: "https://proxy.example/binance/",
                expected: "https://proxy.example/binance/fapi/v1/openInterest",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let client = BinanceFuturesUsd::new(test.base_url, Duration::from_secs(5)).unwrap();
            let actual = client.endpoint(PATH_OPEN_INTEREST).unwrap();
            assert_eq!(actual.as_str(), test.expected, "TC{} failed", index);
        }
    }

    /// Serve canned HTTP responses, one per connection, in order.
    async fn serve(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buffer = vec![0u8; 4096];
                let mut read = 0;
                while !buffer[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buffer[read..]).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    read += n;
                }
                let response = format!(
                    "HTTP/1.1 {status} STATUS\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_price_over_http() {
        let base_url = serve(vec![(200, PREMIUM_INDEX)]).await;
        let client = BinanceFuturesUsd::new(&base_url, Duration::from_secs(5)).unwrap();

        let sample = client
            .fetch(MetricKind::Price, &InstrumentId::from("BTCUSDT"))
            .await
            .unwrap();
        assert_eq!(sample.value, 11793.63104562);
    }

    #[tokio::test]
    async fn test_fetch_maps_http_errors() {
        struct TestCase {
            status: u16,
            body: &'static str,
            expected_rate_limited: bool,
            expected_parse: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: weight limit exceeded
                status: 429,
                body: r#"{"code":-1003,"msg":"Too many requests"}"#,
                expected_rate_limited: true,
                expected_parse: false,
            },
            TestCase {
                // TC1: invalid symbol
                status: 400,
                body: r#"{"code":-1121,"msg":"Invalid symbol."}"#,
                expected_rate_limited: false,
                expected_parse: false,
            },
            TestCase {
                // TC2: malformed body
                status: 200,
                body: r#"{"symbol":"BTCUSDT"}"#,
                expected_rate_limited: false,
                expected_parse: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let base_url = serve(vec![(test.status, test.body)]).await;
            let client = BinanceFuturesUsd::new(&base_url, Duration::from_secs(5)).unwrap();
            let error = client
                .fetch(MetricKind::FundingRate, &InstrumentId::from("BTCUSDT"))
                .await
                .unwrap_err();

            assert_eq!(error.is_rate_limited(), test.expected_rate_limited, "TC{} failed", index);
            assert_eq!(
                matches!(error, FetchError::Parse(_)),
                test.expected_parse,
                "TC{} failed",
                index
            );
        }
    }
}
