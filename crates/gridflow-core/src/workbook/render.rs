use super::Workbook;
use crate::layout::col_to_letters;

const COLUMN_WIDTH: usize = 12;

/// Format a value with two decimals.
pub fn format_value(n: f64) -> String {
    if n.is_nan() {
        "#NAN!".to_string()
    } else if n.is_infinite() {
        "#INF!".to_string()
    } else {
        format!("{:.2}", n)
    }
}

impl Workbook {
    /// Plain-text table of the grid. Cells with a formula are marked `=`.
    pub fn render(&self) -> String {
        let mut views = self.engine.snapshot().into_iter();
        let mut out = format!("{:>4}", "");
        for col in 0..self.layout.cols {
            out.push_str(&format!(" {:>w$}", col_to_letters(col), w = COLUMN_WIDTH));
        }
        out.push('\n');

        for row in 0..self.layout.rows {
            out.push_str(&format!("{:>4}", row + 1));
            for _ in 0..self.layout.cols {
                let text = match views.next() {
                    Some(view) if view.has_formula => format!("={}", format_value(view.value)),
                    Some(view) => format_value(view.value),
                    None => String::new(),
                };
                out.push_str(&format!(" {:>w$}", text, w = COLUMN_WIDTH));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, FormulaConfig, GridConfig, OpName};

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1.0), "1.00");
        assert_eq!(format_value(-0.125), "-0.13");
        assert_eq!(format_value(64210.1), "64210.10");
        assert_eq!(format_value(f64::NAN), "#NAN!");
        assert_eq!(format_value(f64::NEG_INFINITY), "#INF!");
    }

    #[test]
    fn test_render_marks_derived_cells() {
        let config = Config {
            grid: GridConfig {
                cols: 2,
                rows: 1,
                seed: 1.5,
            },
            formulas: vec![FormulaConfig {
                target: 1.into(),
                inputs: vec![0.into()],
                op: OpName::Scale,
                factor: Some(2.0),
            }],
            feeds: Vec::new(),
            ..Config::builtin()
        };
        let workbook = Workbook::from_config(&config).unwrap();

        let expected = format!(
            "{:>4} {:>12} {:>12}\n{:>4} {:>12} {:>12}\n",
            "", "A", "B", 1, "1.50", "=3.00"
        );
        assert_eq!(workbook.render(), expected);
    }

    #[test]
    fn test_render_builtin_shape() {
        let workbook = Workbook::from_config(&Config::builtin()).unwrap();
        let rendered = workbook.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 11);
        assert!(lines[0].trim_start().starts_with('A'));
        assert!(lines[0].ends_with('F'));
        assert!(lines[1].contains("=2.00"));
        assert!(lines[10].trim_start().starts_with("10"));
    }
}
