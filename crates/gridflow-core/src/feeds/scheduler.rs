//! Repeating feed tasks.
//!
//! Each feed runs as its own tokio task: an optional fetch at startup, then
//! one fetch per interval. A failed fetch is reported and the task simply
//! waits for its next tick. Feeds are cancelled one by one or all together;
//! dropping the scheduler cancels everything it started.

use gridflow_engine::{CellId, Engine};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{FeedErrors, FeedSource};
use crate::error::{GridflowError, Result};

/// What to fetch, where to put it and how often.
#[derive(Clone)]
pub struct FeedSpec {
    pub name: String,
    pub source: Arc<dyn FeedSource>,
    pub cell: CellId,
    pub interval: Duration,
    pub fetch_on_start: bool,
}

pub struct FeedScheduler {
    engine: Arc<Engine>,
    errors: Arc<FeedErrors>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl FeedScheduler {
    pub fn new(engine: Arc<Engine>, errors: Arc<FeedErrors>) -> FeedScheduler {
        FeedScheduler {
            engine,
            errors,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start a feed on the current tokio runtime, replacing any feed with the
    /// same name.
    pub fn spawn(&self, spec: FeedSpec) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| GridflowError::NoRuntime)?;
        if !self.engine.contains(spec.cell) {
            return Err(GridflowError::Engine(
                gridflow_engine::EngineError::UnknownCell(spec.cell),
            ));
        }

        let name = spec.name.clone();
        info!(
            "starting feed '{}' ({}) -> {} every {:?}",
            name,
            spec.source.name(),
            spec.cell,
            spec.interval
        );
        let handle = runtime.spawn(run_feed(
            spec,
            Arc::clone(&self.engine),
            Arc::clone(&self.errors),
        ));

        if let Some(previous) = self.tasks.lock().insert(name, handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop one feed. Returns false if no feed has that name.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock().remove(name) {
            Some(handle) => {
                handle.abort();
                info!("cancelled feed '{}'", name);
                true
            }
            None => false,
        }
    }

    /// Names of the feeds currently scheduled, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Stop every feed.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        for (name, handle) in tasks.drain() {
            handle.abort();
            debug!("cancelled feed '{}'", name);
        }
    }
}

impl Drop for FeedScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_feed(spec: FeedSpec, engine: Arc<Engine>, errors: Arc<FeedErrors>) {
    if spec.fetch_on_start {
        poll_once(&spec, &engine, &errors).await;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + spec.interval, spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        poll_once(&spec, &engine, &errors).await;
    }
}

/// Fetch once and write the result. Every failure ends up on `errors`.
async fn poll_once(spec: &FeedSpec, engine: &Engine, errors: &FeedErrors) {
    let value = match spec.source.fetch().await {
        Ok(value) => value,
        Err(err) => {
            warn!("feed '{}' fetch failed: {}", spec.name, err);
            errors.report(&spec.name, err.to_string());
            return;
        }
    };

    match engine.update_independent_cell(spec.cell, value) {
        Ok(report) => debug!("feed '{}' wrote {} -> {}: {}", spec.name, value, spec.cell, report.log_line()),
        Err(err) => {
            warn!("feed '{}' update failed: {}", spec.name, err);
            errors.report(&spec.name, err.to_string());
        }
    }
}
