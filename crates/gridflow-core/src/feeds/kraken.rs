//! Kraken public ticker: last trade price for a currency pair.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::{FeedError, FeedSource};

const KRAKEN_BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenTicker {
    client: reqwest::Client,
    base_url: String,
    pair: String,
    name: String,
}

impl KrakenTicker {
    pub fn new(client: reqwest::Client, pair: impl Into<String>) -> KrakenTicker {
        let pair = pair.into();
        KrakenTicker {
            client,
            base_url: KRAKEN_BASE_URL.to_string(),
            name: format!("kraken:{}", pair),
            pair,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> KrakenTicker {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl FeedSource for KrakenTicker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<f64, FeedError> {
        let url = format!("{}/0/public/Ticker", self.base_url.trim_end_matches('/'));
        let body = self
            .client
            .get(url)
            .query(&[("pair", self.pair.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_ticker(&body, &self.pair)
    }
}

#[derive(Deserialize)]
struct TickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, TickerEntry>,
}

#[derive(Deserialize)]
struct TickerEntry {
    /// Last trade closed: `[price, lot volume]`.
    c: Vec<String>,
}

/// Extract the last trade price from a ticker response body.
///
/// Kraken answers under its own pair name (`XBTUSD` comes back as
/// `XXBTZUSD`), so a lone entry is accepted whatever its key.
pub fn parse_ticker(body: &str, pair: &str) -> Result<f64, FeedError> {
    let response: TickerResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;
    if !response.error.is_empty() {
        return Err(FeedError::Api(response.error.join("; ")));
    }

    let entry = match response.result.get(pair) {
        Some(entry) => entry,
        None if response.result.len() == 1 => response
            .result
            .values()
            .next()
            .ok_or_else(|| FeedError::Missing(pair.to_string()))?,
        None => return Err(FeedError::Missing(pair.to_string())),
    };

    let last = entry
        .c
        .first()
        .ok_or_else(|| FeedError::Missing(format!("{} last trade", pair)))?;
    last.parse::<f64>()
        .map_err(|e| FeedError::Parse(format!("price '{}': {}", last, e)))
}
