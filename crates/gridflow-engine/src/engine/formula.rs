//! Formula bindings.
//!
//! A [`Formula`] is an ordered list of input cells plus a pure function of
//! their values. The function sees nothing but the values it is handed; data
//! from outside the graph enters through independent cells only.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use thiserror::Error;

use super::cell_id::CellId;

/// A formula function failed to produce a value.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct FormulaError {
    pub message: String,
}

impl FormulaError {
    pub fn new(message: impl Into<String>) -> FormulaError {
        FormulaError {
            message: message.into(),
        }
    }
}

type FormulaFn = dyn Fn(&[f64]) -> Result<f64, FormulaError> + Send + Sync;

/// Inputs and computation attached to a derived cell.
///
/// The input list is fixed once built; changing arity or order means binding
/// a new formula.
#[derive(Clone)]
pub struct Formula {
    inputs: Vec<CellId>,
    func: Arc<FormulaFn>,
}

impl Formula {
    /// Formula whose computation cannot fail.
    pub fn new<F>(inputs: Vec<CellId>, func: F) -> Formula
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Formula {
            inputs,
            func: Arc::new(move |values| Ok(func(values))),
        }
    }

    /// Formula whose computation may report an error.
    pub fn try_new<F>(inputs: Vec<CellId>, func: F) -> Formula
    where
        F: Fn(&[f64]) -> Result<f64, FormulaError> + Send + Sync + 'static,
    {
        Formula {
            inputs,
            func: Arc::new(func),
        }
    }

    pub fn inputs(&self) -> &[CellId] {
        &self.inputs
    }

    /// Run the computation. A panic inside the function is reported as an error.
    pub fn evaluate(&self, values: &[f64]) -> Result<f64, FormulaError> {
        match catch_unwind(AssertUnwindSafe(|| (self.func)(values))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "formula panicked".to_string());
                Err(FormulaError::new(message))
            }
        }
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Ready-made computations over the ordered input values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Op {
    Sum,
    Product,
    Mean,
    Min,
    Max,
    /// First input minus the remaining inputs.
    Difference,
    /// First input divided by each remaining input.
    Ratio,
    /// `1 / x` of a single input.
    Reciprocal,
    /// Single input multiplied by a constant.
    Scale(f64),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Sum => "sum",
            Op::Product => "product",
            Op::Mean => "mean",
            Op::Min => "min",
            Op::Max => "max",
            Op::Difference => "difference",
            Op::Ratio => "ratio",
            Op::Reciprocal => "reciprocal",
            Op::Scale(_) => "scale",
        }
    }

    /// Check the number of inputs this op accepts.
    pub fn check_arity(&self, inputs: usize) -> Result<(), FormulaError> {
        let ok = match self {
            Op::Reciprocal | Op::Scale(_) => inputs == 1,
            _ => inputs >= 1,
        };
        if ok {
            Ok(())
        } else {
            let expected = match self {
                Op::Reciprocal | Op::Scale(_) => "exactly 1 input",
                _ => "at least 1 input",
            };
            Err(FormulaError::new(format!(
                "{} expects {}, got {}",
                self.name(),
                expected,
                inputs
            )))
        }
    }

    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Op::Sum => values.iter().sum(),
            Op::Product => values.iter().product(),
            Op::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Op::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Op::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Op::Difference => match values.split_first() {
                Some((first, rest)) => rest.iter().fold(*first, |acc, v| acc - v),
                None => 0.0,
            },
            Op::Ratio => match values.split_first() {
                Some((first, rest)) => rest.iter().fold(*first, |acc, v| acc / v),
                None => f64::NAN,
            },
            Op::Reciprocal => 1.0 / values.first().copied().unwrap_or(f64::NAN),
            Op::Scale(k) => values.first().copied().unwrap_or(f64::NAN) * k,
        }
    }

    /// Build a formula over `inputs`, rejecting a wrong input count.
    pub fn formula(self, inputs: Vec<CellId>) -> Result<Formula, FormulaError> {
        self.check_arity(inputs.len())?;
        Ok(Formula::new(inputs, move |values| self.apply(values)))
    }
}
