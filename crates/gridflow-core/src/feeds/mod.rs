//! External numeric feeds.
//!
//! A feed fetches one number from somewhere outside the graph and writes it
//! into an independent cell. Fetch failures never touch the graph; they are
//! reported on a [`FeedErrors`] channel for the display layer.

mod kraken;
mod open_er;
mod scheduler;

pub use kraken::{KrakenTicker, parse_ticker};
pub use open_er::{OpenErRates, parse_rates};
pub use scheduler::{FeedScheduler, FeedSpec};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Response has no value for {0}")]
    Missing(String),
}

/// A source of one numeric value.
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<f64, FeedError>;
}

/// Shared HTTP client for the built-in sources.
pub fn http_client() -> Result<reqwest::Client, FeedError> {
    Ok(reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("gridflow/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// One failed poll, as shown to the user.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedFailure {
    pub feed: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Latest feed failure plus a running count.
#[derive(Debug)]
pub struct FeedErrors {
    latest: watch::Sender<Option<FeedFailure>>,
    count: AtomicU64,
}

impl FeedErrors {
    pub fn new() -> FeedErrors {
        FeedErrors {
            latest: watch::Sender::new(None),
            count: AtomicU64::new(0),
        }
    }

    pub fn report(&self, feed: &str, message: impl Into<String>) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.latest.send_replace(Some(FeedFailure {
            feed: feed.to_string(),
            message: message.into(),
            at: Utc::now(),
        }));
    }

    pub fn latest(&self) -> Option<FeedFailure> {
        self.latest.borrow().clone()
    }

    pub fn failure_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Receiver that wakes on every new failure.
    pub fn subscribe(&self) -> watch::Receiver<Option<FeedFailure>> {
        self.latest.subscribe()
    }
}

impl Default for FeedErrors {
    fn default() -> Self {
        Self::new()
    }
}
