//! Progress reporting for notebook runs.
//!
//! Progress goes to stderr so stdout carries only cell outputs.

use cellar_core::{Cell, CellOutput, DroppedBinding, Error, ExecutionCallback};

use crate::colors;

/// Progress callback that prints execution status to the terminal.
pub struct ProgressCallback {
    /// Total number of code cells in the run.
    total: usize,
}

impl ProgressCallback {
    /// Create a new progress callback.
    pub fn new(total: usize) -> Self {
        Self { total }
    }

    fn label(&self, cell: &Cell) -> String {
        format!(
            "[{}/{}] {}{}{}",
            cell.index + 1,
            self.total,
            colors::BOLD,
            cell.snippet(),
            colors::RESET
        )
    }
}

impl ExecutionCallback for ProgressCallback {
    fn on_cell_replayed(&self, cell: &Cell, _output: &CellOutput) {
        eprintln!(
            "{}  ↺ Cached{} {}",
            colors::DIM,
            colors::RESET,
            self.label(cell)
        );
    }

    fn on_cell_started(&self, cell: &Cell) {
        eprint!(
            "{}  ▶ Running{} {}... ",
            colors::CYAN,
            colors::RESET,
            self.label(cell)
        );
        colors::flush_stderr();
    }

    fn on_cell_completed(&self, _cell: &Cell, _output: &CellOutput) {
        eprintln!("{}✓{}", colors::GREEN, colors::RESET);
    }

    fn on_cell_error(&self, _cell: &Cell, error: &Error) {
        eprintln!("{}✗{}", colors::RED, colors::RESET);
        eprintln!("{}    Error:{} {}", colors::RED, colors::RESET, error);
    }

    fn on_cache_degraded(&self, cell: &Cell, dropped: &[DroppedBinding]) {
        let names: Vec<String> = dropped.iter().map(ToString::to_string).collect();
        eprintln!(
            "{}  ! Caching disabled after cell {}{}: cannot snapshot {}",
            colors::YELLOW,
            cell.index,
            colors::RESET,
            names.join(", ")
        );
    }
}
