use std::sync::Arc;
use tracing::info;

use super::Workbook;
use super::state::FeedEntry;
use crate::config::SourceKind;
use crate::error::{GridflowError, Result};
use crate::feeds::{FeedSource, FeedSpec, KrakenTicker, OpenErRates, http_client};

impl Workbook {
    /// Start every configured feed on the current tokio runtime.
    ///
    /// Returns the names of the feeds started.
    pub fn start_feeds(&self) -> Result<Vec<String>> {
        if self.feeds.is_empty() {
            return Ok(Vec::new());
        }
        let client = http_client()?;
        let specs = self
            .feeds
            .iter()
            .map(|entry| Ok(spec_for(entry, build_source(entry, &client)?)))
            .collect::<Result<Vec<FeedSpec>>>()?;
        self.start_feeds_with(specs)
    }

    /// Start feeds from ready-made specs, e.g. with custom sources.
    ///
    /// Every spec is checked before any feed starts; on error none of them
    /// are running.
    pub fn start_feeds_with(&self, specs: Vec<FeedSpec>) -> Result<Vec<String>> {
        tokio::runtime::Handle::try_current().map_err(|_| GridflowError::NoRuntime)?;
        for spec in &specs {
            if !self.layout.contains(spec.cell) {
                return Err(GridflowError::OutOfGrid(spec.cell));
            }
        }

        let mut started: Vec<String> = Vec::with_capacity(specs.len());
        for spec in specs {
            let name = spec.name.clone();
            if let Err(err) = self.scheduler.spawn(spec) {
                for name in &started {
                    self.scheduler.cancel(name);
                }
                return Err(err);
            }
            started.push(name);
        }
        info!("{} feeds running", self.scheduler.running().len());
        Ok(started)
    }

    /// Stop one feed by name.
    pub fn cancel_feed(&self, name: &str) -> Result<()> {
        if self.scheduler.cancel(name) {
            Ok(())
        } else {
            Err(GridflowError::UnknownFeed(name.to_string()))
        }
    }

    pub fn running_feeds(&self) -> Vec<String> {
        self.scheduler.running()
    }

    /// Stop every feed. The grid keeps its last values.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

/// A spec for a configured feed, fetching from `source`.
pub(crate) fn spec_for(entry: &FeedEntry, source: Arc<dyn FeedSource>) -> FeedSpec {
    FeedSpec {
        name: entry.config.name.clone(),
        source,
        cell: entry.cell,
        interval: entry.config.interval(),
        fetch_on_start: entry.config.fetch_on_start,
    }
}

fn build_source(entry: &FeedEntry, client: &reqwest::Client) -> Result<Arc<dyn FeedSource>> {
    let config = &entry.config;
    let key = |value: &Option<String>, key: &str| {
        value.clone().ok_or_else(|| {
            GridflowError::Config(format!("feed '{}' needs '{}'", config.name, key))
        })
    };
    let source: Arc<dyn FeedSource> = match config.source {
        SourceKind::Kraken => Arc::new(KrakenTicker::new(client.clone(), key(&config.pair, "pair")?)),
        SourceKind::OpenEr => Arc::new(OpenErRates::new(
            client.clone(),
            key(&config.base, "base")?,
            key(&config.symbol, "symbol")?,
        )),
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feeds::FeedError;
    use async_trait::async_trait;
    use gridflow_engine::CellId;
    use std::time::Duration;

    struct Fixed(f64);

    #[async_trait]
    impl FeedSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self) -> std::result::Result<f64, FeedError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_builds_configured_sources() {
        let workbook = Workbook::from_config(&Config::builtin()).unwrap();
        let client = reqwest::Client::new();
        let names: Vec<String> = workbook
            .feeds
            .iter()
            .map(|entry| build_source(entry, &client).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["kraken:XBTUSD", "open-er:USD/CAD"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_feed_with_substitute_source() {
        let workbook = Workbook::from_config(&Config::builtin()).unwrap();
        let specs = workbook
            .feeds
            .iter()
            .map(|entry| spec_for(entry, Arc::new(Fixed(2.0))))
            .collect();

        let started = workbook.start_feeds_with(specs).unwrap();
        assert_eq!(started, vec!["btc-usd", "usd-cad"]);
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A1 = 2, F1 = 2
        assert_eq!(workbook.value(CellId::new(1)).unwrap(), 4.0);
        assert_eq!(workbook.value(CellId::new(3)).unwrap(), 6.0);
        assert_eq!(workbook.value(CellId::new(6)).unwrap(), 0.5);

        workbook.cancel_feed("btc-usd").unwrap();
        assert_eq!(workbook.running_feeds(), vec!["usd-cad".to_string()]);
        assert!(matches!(
            workbook.cancel_feed("btc-usd"),
            Err(GridflowError::UnknownFeed(_))
        ));

        workbook.shutdown();
        assert!(workbook.running_feeds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_spec_starts_nothing() {
        let workbook = Workbook::from_config(&Config::builtin()).unwrap();
        let mut specs: Vec<FeedSpec> = workbook
            .feeds
            .iter()
            .map(|entry| spec_for(entry, Arc::new(Fixed(2.0))))
            .collect();
        specs[1].cell = CellId::new(60);

        let err = workbook.start_feeds_with(specs).unwrap_err();
        assert!(matches!(err, GridflowError::OutOfGrid(id) if id == CellId::new(60)));
        assert!(workbook.running_feeds().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(workbook.value(CellId::new(0)).unwrap(), 1.0);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let workbook = Workbook::from_config(&Config::builtin()).unwrap();
        let specs = workbook
            .feeds
            .iter()
            .map(|entry| spec_for(entry, Arc::new(Fixed(2.0))))
            .collect();
        assert!(matches!(
            workbook.start_feeds_with(specs),
            Err(GridflowError::NoRuntime)
        ));
    }
}
