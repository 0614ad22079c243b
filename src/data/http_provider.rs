use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ScanError;

use super::{MarketDataProvider, MarketQuote, OptionsChain};

/// JSON market-data client. One provider instance is shared by every
/// strategy; per-request failures surface as `ScanError::Provider`.
pub struct HttpMarketDataProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: rust_decimal::Decimal,
    volume: u64,
    implied_volatility: Option<rust_decimal::Decimal>,
}

#[derive(Debug, Deserialize)]
struct ExpirationsResponse {
    expirations: Vec<NaiveDate>,
}

impl HttpMarketDataProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ScanError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(ScanError::provider)?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ScanError> {
        debug!("GET {}", path);
        let response = self
            .request(path)
            .send()
            .await
            .map_err(ScanError::provider)?
            .error_for_status()
            .map_err(ScanError::provider)?;

        response.json::<T>().await.map_err(ScanError::provider)
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    async fn get_market_data(&self, symbol: &str) -> Result<MarketQuote, ScanError> {
        let quote: QuoteResponse = self.fetch_json(&format!("/quotes/{symbol}")).await?;
        Ok(MarketQuote {
            symbol: symbol.to_string(),
            price: quote.price,
            volume: quote.volume,
            implied_volatility: quote.implied_volatility,
            timestamp: Utc::now(),
        })
    }

    async fn get_options_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> Result<OptionsChain, ScanError> {
        self.fetch_json(&format!("/options/{symbol}?expiration={expiration}"))
            .await
    }

    async fn get_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>, ScanError> {
        let response: ExpirationsResponse = self
            .fetch_json(&format!("/options/{symbol}/expirations"))
            .await?;
        Ok(response.expirations)
    }
}
