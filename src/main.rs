//! Gridflow - reactive grid of numeric cells driven by live data feeds

use anyhow::{Context, Result, bail};
use gridflow_core::{Workbook, load_config};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!("Usage: gridflow [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>       Load workbook config from a TOML file");
    eprintln!("  -s, --set <CELL=VALUE>    Set a cell before printing (can be repeated)");
    eprintln!("  --click <CELL>            Add 1 to a cell (can be repeated)");
    eprintln!("  -w, --watch <SECS>        Run the feeds for SECS seconds, then print");
    eprintln!("  --no-feeds                Never start the configured feeds");
    eprintln!("  -h, --help                Print help");
    eprintln!();
    eprintln!("Cells are given as A1-style labels or ids (B2, #7, 7).");
}

/// A display-layer action, applied in command-line order.
enum Action {
    Set(String, f64),
    Click(String),
}

struct Options {
    config: Option<PathBuf>,
    actions: Vec<Action>,
    watch: Option<Duration>,
    feeds: bool,
}

fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options {
        config: None,
        actions: Vec::new(),
        watch: None,
        feeds: true,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || next_value(args, &mut i, flag);
        match flag {
            "-h" | "--help" => return Ok(None),
            "-c" | "--config" => options.config = Some(PathBuf::from(value()?)),
            "-s" | "--set" => {
                let text = value()?;
                let (cell, number) = text
                    .split_once('=')
                    .with_context(|| format!("expected CELL=VALUE, got '{}'", text))?;
                let number: f64 = number
                    .trim()
                    .parse()
                    .with_context(|| format!("'{}' is not a number", number.trim()))?;
                options.actions.push(Action::Set(cell.trim().to_string(), number));
            }
            "--click" => options.actions.push(Action::Click(value()?.clone())),
            "-w" | "--watch" => {
                let text = value()?;
                let secs: f64 = text
                    .parse()
                    .with_context(|| format!("'{}' is not a number of seconds", text))?;
                if !secs.is_finite() || secs < 0.0 {
                    bail!("--watch needs a non-negative number of seconds");
                }
                options.watch = Some(Duration::from_secs_f64(secs));
            }
            "--no-feeds" => options.feeds = false,
            arg => bail!("Unknown option: {}", arg),
        }
        i += 1;
    }
    Ok(Some(options))
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a String> {
    *i += 1;
    args.get(*i)
        .with_context(|| format!("{} requires a value", flag))
}

async fn run(options: Options) -> Result<()> {
    let (config, warnings) = load_config(options.config.as_deref()).context("loading config")?;
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }

    let workbook = Workbook::from_config(&config).context("building workbook")?;

    for action in &options.actions {
        match action {
            Action::Set(label, value) => {
                let id = workbook.parse_cell(label)?;
                workbook
                    .edit(id, *value)
                    .with_context(|| format!("setting {}", label))?;
            }
            Action::Click(label) => {
                let id = workbook.parse_cell(label)?;
                workbook
                    .click(id)
                    .with_context(|| format!("clicking {}", label))?;
            }
        }
    }

    if let Some(duration) = options.watch {
        if options.feeds {
            let mut failures = workbook.feed_errors().subscribe();
            let reporter = tokio::spawn(async move {
                while failures.changed().await.is_ok() {
                    let latest = failures.borrow_and_update().clone();
                    if let Some(failure) = latest {
                        eprintln!(
                            "Feed error [{}] {}: {}",
                            failure.at.format("%H:%M:%S"),
                            failure.feed,
                            failure.message
                        );
                    }
                }
            });

            let started = workbook.start_feeds().context("starting feeds")?;
            info!("watching {} feeds for {:?}", started.len(), duration);
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = tokio::signal::ctrl_c() => eprintln!("Interrupted"),
            }
            workbook.shutdown();
            reporter.abort();
        } else {
            tokio::time::sleep(duration).await;
        }
    }

    print!("{}", workbook.render());
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = run(options).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
