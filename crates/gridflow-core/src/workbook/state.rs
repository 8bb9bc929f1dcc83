use gridflow_engine::{CellId, Engine, EngineError};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, EditPolicy, FeedConfig, SourceKind};
use crate::error::{GridflowError, Result};
use crate::feeds::{FeedErrors, FeedScheduler};
use crate::layout::GridLayout;

/// Largest grid a workbook will allocate.
pub const MAX_CELLS: usize = 1 << 20;

/// A feed from the config with its target cell resolved.
#[derive(Debug, Clone)]
pub(crate) struct FeedEntry {
    pub config: FeedConfig,
    pub cell: CellId,
}

/// A grid of cells, its formulas and the feeds that drive it.
pub struct Workbook {
    pub(crate) engine: Arc<Engine>,
    pub(crate) layout: GridLayout,
    pub(crate) policy: EditPolicy,
    pub(crate) feeds: Vec<FeedEntry>,
    pub(crate) errors: Arc<FeedErrors>,
    pub(crate) scheduler: FeedScheduler,
}

impl Workbook {
    /// Build the grid, bind every configured formula and check the feeds.
    ///
    /// Bad cell references, wrong arity and loops are errors. A formula that
    /// binds but fails its first evaluation is logged and kept.
    pub fn from_config(config: &Config) -> Result<Workbook> {
        let layout = config.grid.layout();
        let cell_count = match layout.cell_count() {
            Some(count) if (1..=MAX_CELLS).contains(&count) => count,
            _ => {
                return Err(GridflowError::Config(format!(
                    "grid of {} x {} cells is not usable (1 to {} cells allowed)",
                    layout.cols, layout.rows, MAX_CELLS
                )));
            }
        };

        let engine = Arc::new(Engine::new(cell_count, config.grid.seed));

        for formula in &config.formulas {
            let target = formula.target.resolve(&layout)?;
            let inputs = formula
                .inputs
                .iter()
                .map(|input| input.resolve(&layout))
                .collect::<Result<Vec<CellId>>>()?;
            let bound = formula
                .op()
                .and_then(|op| op.formula(inputs))
                .map_err(|source| GridflowError::Formula { target, source })?;

            match engine.bind_formula(target, bound) {
                Ok(report) => debug!("bound {}: {}", target, report.log_line()),
                Err(err @ EngineError::FormulaEvaluation { .. }) => {
                    warn!("formula for {} bound but failed: {}", target, err)
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut names = HashSet::new();
        let mut feeds = Vec::with_capacity(config.feeds.len());
        for feed in &config.feeds {
            if !names.insert(feed.name.as_str()) {
                return Err(GridflowError::Config(format!(
                    "feed '{}' is defined twice",
                    feed.name
                )));
            }
            check_source_keys(feed)?;
            let cell = feed.cell.resolve(&layout)?;
            if engine.has_formula(cell)? {
                return Err(GridflowError::DerivedCell(cell));
            }
            feeds.push(FeedEntry {
                config: feed.clone(),
                cell,
            });
        }

        info!(
            "workbook ready: {} cells, {} formulas, {} feeds",
            cell_count,
            config.formulas.len(),
            feeds.len()
        );

        let errors = Arc::new(FeedErrors::new());
        let scheduler = FeedScheduler::new(Arc::clone(&engine), Arc::clone(&errors));
        Ok(Workbook {
            engine,
            layout,
            policy: config.policy.edits,
            feeds,
            errors,
            scheduler,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn policy(&self) -> EditPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: EditPolicy) {
        self.policy = policy;
    }

    /// Resolve a label such as `B2`, `#7` or `7`.
    pub fn parse_cell(&self, text: &str) -> Result<CellId> {
        self.layout
            .parse_cell(text)
            .ok_or_else(|| GridflowError::UnknownCellName(text.to_string()))
    }

    pub fn value(&self, id: CellId) -> Result<f64> {
        Ok(self.engine.value(id)?)
    }

    /// Label for display, falling back to `#n` off the grid.
    pub fn label(&self, id: CellId) -> String {
        self.layout.label(id).unwrap_or_else(|| id.to_string())
    }

    /// Configured feed names, in config order.
    pub fn feed_names(&self) -> Vec<&str> {
        self.feeds.iter().map(|f| f.config.name.as_str()).collect()
    }

    /// Failures reported by running feeds.
    pub fn feed_errors(&self) -> &Arc<FeedErrors> {
        &self.errors
    }
}

/// Each source needs its own keys: `pair` for Kraken, `base` and `symbol`
/// for open.er-api.
pub(crate) fn check_source_keys(feed: &FeedConfig) -> Result<()> {
    let missing = |key: &str| {
        GridflowError::Config(format!(
            "feed '{}' needs '{}' for source {:?}",
            feed.name, key, feed.source
        ))
    };
    match feed.source {
        SourceKind::Kraken => {
            feed.pair.as_ref().ok_or_else(|| missing("pair"))?;
        }
        SourceKind::OpenEr => {
            feed.base.as_ref().ok_or_else(|| missing("base"))?;
            feed.symbol.as_ref().ok_or_else(|| missing("symbol"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CellSpec, FormulaConfig, GridConfig, OpName};

    fn config(formulas: Vec<FormulaConfig>) -> Config {
        Config {
            grid: GridConfig {
                cols: 3,
                rows: 2,
                seed: 2.0,
            },
            formulas,
            feeds: Vec::new(),
            ..Config::builtin()
        }
    }

    fn formula(target: CellSpec, inputs: Vec<CellSpec>, op: OpName) -> FormulaConfig {
        FormulaConfig {
            target,
            inputs,
            op,
            factor: None,
        }
    }

    #[test]
    fn test_builtin_workbook_values() {
        let workbook = Workbook::from_config(&Config::builtin()).unwrap();
        let engine = workbook.engine();
        assert_eq!(engine.len(), 60);
        // B1 = A1 * F1, D1 = A1 + B1, A2 = 1 / F1
        assert_eq!(engine.value(CellId::new(1)).unwrap(), 1.0);
        assert_eq!(engine.value(CellId::new(3)).unwrap(), 2.0);
        assert_eq!(engine.value(CellId::new(6)).unwrap(), 1.0);
        assert!(engine.has_formula(CellId::new(3)).unwrap());
        assert_eq!(workbook.feed_names(), vec!["btc-usd", "usd-cad"]);
        assert_eq!(workbook.policy(), EditPolicy::Locked);
    }

    #[test]
    fn test_labels_resolve_in_formulas() {
        let workbook = Workbook::from_config(&config(vec![formula(
            CellSpec::Label("C1".to_string()),
            vec![CellSpec::Label("A1".to_string()), CellSpec::Index(1)],
            OpName::Sum,
        )]))
        .unwrap();
        assert_eq!(workbook.value(CellId::new(2)).unwrap(), 4.0);
        assert_eq!(workbook.label(CellId::new(2)), "C1");
        assert_eq!(workbook.label(CellId::new(40)), "#40");
    }

    #[test]
    fn test_cycle_in_config_is_rejected() {
        let err = Workbook::from_config(&config(vec![
            formula(1.into(), vec![0.into()], OpName::Sum),
            formula(0.into(), vec![1.into()], OpName::Sum),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, GridflowError::Engine(EngineError::Cycle { .. })));
    }

    #[test]
    fn test_out_of_grid_and_bad_arity() {
        let err = Workbook::from_config(&config(vec![formula(
            1.into(),
            vec![6.into()],
            OpName::Sum,
        )]))
        .err()
        .unwrap();
        assert!(matches!(err, GridflowError::OutOfGrid(id) if id == CellId::new(6)));

        let err = Workbook::from_config(&config(vec![formula(
            1.into(),
            vec![0.into(), 2.into()],
            OpName::Reciprocal,
        )]))
        .err()
        .unwrap();
        assert!(matches!(err, GridflowError::Formula { target, .. } if target == CellId::new(1)));
    }

    #[test]
    fn test_feed_checks() {
        let mut bad = Config::builtin();
        bad.feeds[1].symbol = None;
        assert!(matches!(
            Workbook::from_config(&bad),
            Err(GridflowError::Config(_))
        ));

        let mut twice = Config::builtin();
        twice.feeds[1].name = "btc-usd".to_string();
        assert!(matches!(
            Workbook::from_config(&twice),
            Err(GridflowError::Config(_))
        ));

        let mut derived = Config::builtin();
        derived.feeds[0].cell = 3.into();
        assert!(matches!(
            Workbook::from_config(&derived),
            Err(GridflowError::DerivedCell(_))
        ));
    }

    #[test]
    fn test_oversized_grids_rejected() {
        let overflowing =
            Config::from_toml("[grid]\ncols = 4294967296\nrows = 4294967296\n").unwrap();
        assert!(matches!(
            Workbook::from_config(&overflowing),
            Err(GridflowError::Config(_))
        ));

        let too_many = Config::from_toml("[grid]\ncols = 4294967295\nrows = 1\n").unwrap();
        assert!(matches!(
            Workbook::from_config(&too_many),
            Err(GridflowError::Config(_))
        ));

        let mut just_over = config(Vec::new());
        just_over.grid.cols = 1024;
        just_over.grid.rows = MAX_CELLS / 1024 + 1;
        let err = Workbook::from_config(&just_over).err().unwrap();
        assert!(err.to_string().contains("not usable"));
    }

    #[test]
    fn test_empty_grid_rejected() {
        let mut empty = config(Vec::new());
        empty.grid.rows = 0;
        assert!(matches!(
            Workbook::from_config(&empty),
            Err(GridflowError::Config(_))
        ));
    }
}
