//! Workbook configuration loaded from TOML.
//!
//! ```toml
//! [grid]
//! cols = 6
//! rows = 10
//! seed = 1.0
//!
//! [policy]
//! edits = "locked"
//!
//! [[formula]]
//! target = "B1"
//! inputs = ["A1", "F1"]
//! op = "product"
//!
//! [[feed]]
//! name = "btc-usd"
//! source = "kraken"
//! pair = "XBTUSD"
//! cell = "A1"
//! interval_secs = 5
//! ```

use directories::ProjectDirs;
use gridflow_engine::engine::{CellId, FormulaError, Op};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GridflowError, Result};
use crate::layout::GridLayout;

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default, rename = "formula")]
    pub formulas: Vec<FormulaConfig>,
    #[serde(default, rename = "feed")]
    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GridConfig {
    pub cols: usize,
    pub rows: usize,
    pub seed: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            cols: 6,
            rows: 10,
            seed: 1.0,
        }
    }
}

impl GridConfig {
    pub fn layout(&self) -> GridLayout {
        GridLayout::new(self.cols, self.rows)
    }
}

/// Whether display-layer edits may target cells that carry a formula.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditPolicy {
    /// Edits to derived cells are rejected.
    #[default]
    Locked,
    /// Edits go through and last until the next recompute of that cell.
    Permissive,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default)]
    pub edits: EditPolicy,
}

/// A cell given either by index or by label (`"B1"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CellSpec {
    Index(u32),
    Label(String),
}

impl CellSpec {
    pub fn resolve(&self, layout: &GridLayout) -> Result<CellId> {
        match self {
            CellSpec::Index(raw) => {
                let id = CellId::new(*raw);
                if layout.contains(id) {
                    Ok(id)
                } else {
                    Err(GridflowError::OutOfGrid(id))
                }
            }
            CellSpec::Label(label) => layout
                .parse_cell(label)
                .ok_or_else(|| GridflowError::UnknownCellName(label.clone())),
        }
    }
}

impl From<u32> for CellSpec {
    fn from(raw: u32) -> Self {
        CellSpec::Index(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpName {
    Sum,
    Product,
    Mean,
    Min,
    Max,
    Difference,
    Ratio,
    Reciprocal,
    Scale,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaConfig {
    pub target: CellSpec,
    pub inputs: Vec<CellSpec>,
    pub op: OpName,
    /// Multiplier for `scale`.
    #[serde(default)]
    pub factor: Option<f64>,
}

impl FormulaConfig {
    pub fn op(&self) -> std::result::Result<Op, FormulaError> {
        let op = match self.op {
            OpName::Sum => Op::Sum,
            OpName::Product => Op::Product,
            OpName::Mean => Op::Mean,
            OpName::Min => Op::Min,
            OpName::Max => Op::Max,
            OpName::Difference => Op::Difference,
            OpName::Ratio => Op::Ratio,
            OpName::Reciprocal => Op::Reciprocal,
            OpName::Scale => {
                let factor = self
                    .factor
                    .ok_or_else(|| FormulaError::new("scale requires a factor"))?;
                Op::Scale(factor)
            }
        };
        if self.factor.is_some() && self.op != OpName::Scale {
            return Err(FormulaError::new(format!(
                "factor only applies to scale, not {}",
                op.name()
            )));
        }
        Ok(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Kraken public ticker, last trade price.
    Kraken,
    /// open.er-api.com exchange rates.
    OpenEr,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    pub name: String,
    pub source: SourceKind,
    pub cell: CellSpec,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_on_start")]
    pub fetch_on_start: bool,
    /// Kraken pair, e.g. `XBTUSD`.
    #[serde(default)]
    pub pair: Option<String>,
    /// Base currency for open.er-api.com.
    #[serde(default)]
    pub base: Option<String>,
    /// Quoted currency for open.er-api.com.
    #[serde(default)]
    pub symbol: Option<String>,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_fetch_on_start() -> bool {
    true
}

impl FeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Config {
    /// The setup used when no config file exists: a 6x10 grid of 1.0 with
    /// D1 = A1 + B1, B1 = A1 * F1 and A2 = 1 / F1. A BTC/USD price feeds A1
    /// every 5 s and the USD/CAD rate feeds F1 every 30 s.
    pub fn builtin() -> Config {
        Config {
            grid: GridConfig::default(),
            policy: PolicyConfig::default(),
            formulas: vec![
                FormulaConfig {
                    target: 3.into(),
                    inputs: vec![0.into(), 1.into()],
                    op: OpName::Sum,
                    factor: None,
                },
                FormulaConfig {
                    target: 1.into(),
                    inputs: vec![0.into(), 5.into()],
                    op: OpName::Product,
                    factor: None,
                },
                FormulaConfig {
                    target: 6.into(),
                    inputs: vec![5.into()],
                    op: OpName::Reciprocal,
                    factor: None,
                },
            ],
            feeds: vec![
                FeedConfig {
                    name: "btc-usd".to_string(),
                    source: SourceKind::Kraken,
                    cell: 0.into(),
                    interval_secs: 5,
                    fetch_on_start: true,
                    pair: Some("XBTUSD".to_string()),
                    base: None,
                    symbol: None,
                },
                FeedConfig {
                    name: "usd-cad".to_string(),
                    source: SourceKind::OpenEr,
                    cell: 5.into(),
                    interval_secs: 30,
                    fetch_on_start: true,
                    pair: None,
                    base: Some("USD".to_string()),
                    symbol: Some("CAD".to_string()),
                },
            ],
        }
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| GridflowError::Config(e.to_string()))
    }
}

/// Load configuration.
///
/// An explicit path must exist and parse. Without one, `config.toml` in the
/// user config directory is used if present; problems with that file are
/// returned as warnings and the built-in config is used instead.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, Vec<String>)> {
    let mut warnings = Vec::new();

    if let Some(path) = explicit {
        let content = read_bounded(path)?;
        return Ok((Config::from_toml(&content)?, warnings));
    }

    let Some(path) = user_config_path() else {
        return Ok((Config::builtin(), warnings));
    };
    if !path.exists() {
        return Ok((Config::builtin(), warnings));
    }

    match read_bounded(&path).and_then(|content| Config::from_toml(&content)) {
        Ok(config) => Ok((config, warnings)),
        Err(err) => {
            warnings.push(format!(
                "Ignoring {}: {}; using built-in config",
                path.display(),
                err
            ));
            Ok((Config::builtin(), warnings))
        }
    }
}

fn read_bounded(path: &Path) -> Result<String> {
    let meta = std::fs::metadata(path)?;
    if meta.len() > MAX_CONFIG_FILE_BYTES {
        return Err(GridflowError::Config(format!(
            "refusing to read {}: file too large ({} bytes, max {})",
            path.display(),
            meta.len(),
            MAX_CONFIG_FILE_BYTES
        )));
    }
    Ok(std::fs::read_to_string(path)?)
}

pub fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "gridflow")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}
