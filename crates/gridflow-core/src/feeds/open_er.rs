//! open.er-api.com latest exchange rates.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::{FeedError, FeedSource};

const OPEN_ER_BASE_URL: &str = "https://open.er-api.com";

pub struct OpenErRates {
    client: reqwest::Client,
    base_url: String,
    base: String,
    symbol: String,
    name: String,
}

impl OpenErRates {
    /// Rate of `symbol` per one unit of `base`.
    pub fn new(
        client: reqwest::Client,
        base: impl Into<String>,
        symbol: impl Into<String>,
    ) -> OpenErRates {
        let base = base.into();
        let symbol = symbol.into();
        OpenErRates {
            client,
            base_url: OPEN_ER_BASE_URL.to_string(),
            name: format!("open-er:{}/{}", base, symbol),
            base,
            symbol,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> OpenErRates {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl FeedSource for OpenErRates {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<f64, FeedError> {
        let url = format!(
            "{}/v6/latest/{}",
            self.base_url.trim_end_matches('/'),
            self.base
        );
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_rates(&body, &self.symbol)
    }
}

#[derive(Deserialize)]
struct RatesResponse {
    result: String,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// Extract the rate for `symbol` from a `/v6/latest` response body.
pub fn parse_rates(body: &str, symbol: &str) -> Result<f64, FeedError> {
    let response: RatesResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;
    if response.result != "success" {
        return Err(FeedError::Api(
            response
                .error_type
                .unwrap_or_else(|| response.result.clone()),
        ));
    }
    response
        .rates
        .get(symbol)
        .copied()
        .ok_or_else(|| FeedError::Missing(symbol.to_string()))
}
