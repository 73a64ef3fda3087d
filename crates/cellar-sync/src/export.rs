//! Export cells back to `.cellar` source.

use cellar_core::{Cell, CellKind};

use crate::parser::TEXT_DELIMITER;

/// Render cells as `.cellar` source that parses back to the same cells.
///
/// Adjacent code cells are separated by an empty text block.
pub fn export_source(cells: &[Cell]) -> String {
    let mut out = String::new();
    let mut previous: Option<CellKind> = None;

    for cell in cells {
        if !out.is_empty() {
            out.push('\n');
        }
        match cell.kind {
            CellKind::Text => {
                out.push_str(&format!("{0}\n{1}\n{0}\n", TEXT_DELIMITER, cell.content));
            }
            CellKind::Code => {
                if previous == Some(CellKind::Code) {
                    out.push_str(&format!("{0}\n{0}\n", TEXT_DELIMITER));
                }
                out.push_str(&cell.content);
                out.push('\n');
            }
        }
        previous = Some(cell.kind);
    }

    out
}
