//! Terminal UI utilities.
//!
//! ## Example
//!
//! ```rust
//! use protovend::ui::Table;
//!
//! let mut table = Table::new(&["Source", "Revision", "Files"]);
//! table.add_row(vec![
//!     "github.com/envoyproxy/protoc-gen-validate".to_string(),
//!     "v0.10.1".to_string(),
//!     "3".to_string(),
//! ]);
//! table.print();
//! ```

use colored::*;
use console::{Term, measure_text_width, truncate_str};

/// Narrowest a column gets squeezed to when the terminal is too small.
const MIN_COLUMN_WIDTH: usize = 8;

/// Box-drawn table sized to the terminal.
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are ignored.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row.iter().map(|cell| single_line(cell)).collect());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) {
        let (_, columns) = Term::stdout().size();
        for line in self.render(columns as usize) {
            println!("{}", line);
        }
    }

    /// Lines of the table, fitted into `max_width` where the columns allow it.
    pub fn render(&self, max_width: usize) -> Vec<String> {
        if self.headers.is_empty() {
            return Vec::new();
        }
        let widths = self.column_widths(max_width);

        let border = |left: &str, mid: &str, right: &str| {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}", left, segments.join(mid), right)
        };
        let row = |cells: &[String], bold: bool| {
            let mut line = String::from("  │");
            for (cell, width) in cells.iter().zip(&widths) {
                let text = truncate_str(cell, *width, "...");
                let padding = width.saturating_sub(measure_text_width(&text));
                let text = if bold {
                    text.as_ref().bold().to_string()
                } else {
                    text.to_string()
                };
                line.push_str(&format!(" {}{} │", text, " ".repeat(padding)));
            }
            line
        };

        let mut lines = Vec::with_capacity(self.rows.len() + 4);
        lines.push(border("┌", "┬", "┐"));
        lines.push(row(&self.headers, true));
        lines.push(border("├", "┼", "┤"));
        for cells in &self.rows {
            lines.push(row(cells, false));
        }
        lines.push(border("└", "┴", "┘"));
        lines
    }

    fn column_widths(&self, max_width: usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self
            .headers
            .iter()
            .map(|header| measure_text_width(header))
            .collect();
        for cells in &self.rows {
            for (width, cell) in widths.iter_mut().zip(cells) {
                *width = (*width).max(measure_text_width(cell));
            }
        }

        // Indent, outer borders and cell padding.
        let overhead = 3 + 3 * widths.len();
        let budget = max_width.saturating_sub(overhead);
        while widths.iter().sum::<usize>() > budget {
            let Some(widest) = widths
                .iter_mut()
                .filter(|w| **w > MIN_COLUMN_WIDTH)
                .max_by_key(|w| **w)
            else {
                break;
            };
            *widest -= 1;
        }
        widths
    }
}

fn single_line(cell: &str) -> String {
    cell.replace(['\n', '\r', '\t'], " ")
}
