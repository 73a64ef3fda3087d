//! Execution controller: the per-cell replay/execute loop.
//!
//! Cells are processed strictly in index order. While the controller is
//! replaying, each code cell is looked up in the session store and its
//! snapshot restored into the kernel. The first miss (or unusable entry)
//! switches the controller to executing for the rest of the run, since every
//! later cell starts from live-derived state.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cell::{Cell, CellKind};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::kernel::{CellOutput, DroppedBinding, Kernel};
use crate::policy::{CacheMode, CachePolicy};
use crate::store::SessionStore;

/// Where the controller is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Consuming cached entries.
    Replaying,
    /// Running cells live.
    Executing,
    /// Every cell has been processed.
    Done,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Replaying => write!(f, "replaying"),
            ControllerState::Executing => write!(f, "executing"),
            ControllerState::Done => write!(f, "done"),
        }
    }
}

/// Where a cell's output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Replayed from a cache entry.
    Cache,
    /// Produced by live execution.
    Live,
    /// Text cell, rendered without touching the session.
    Rendered,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Cache => write!(f, "cache"),
            Provenance::Live => write!(f, "live"),
            Provenance::Rendered => write!(f, "rendered"),
        }
    }
}

/// Outcome of one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellReport {
    /// Cell index
    pub index: usize,
    /// Cell kind
    pub kind: CellKind,
    /// Fingerprint (code cells only)
    pub fingerprint: Option<Fingerprint>,
    /// Captured output (code cells only)
    pub output: Option<CellOutput>,
    /// Where the output came from
    pub provenance: Provenance,
}

/// Counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Code cells served from the cache
    pub replayed: usize,
    /// Code cells executed live
    pub executed: usize,
    /// New cache entries written
    pub stored: usize,
    /// Text cells rendered
    pub rendered: usize,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One report per cell, in index order
    pub cells: Vec<CellReport>,
    /// Counters
    pub stats: RunStats,
    /// Index of the cell whose capture degraded caching, if any
    pub degraded: Option<usize>,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl RunReport {
    /// Report for the cell at `index`.
    pub fn cell(&self, index: usize) -> Option<&CellReport> {
        self.cells.get(index)
    }

    /// Outputs of every code cell, in order.
    pub fn outputs(&self) -> impl Iterator<Item = &CellOutput> {
        self.cells.iter().filter_map(|c| c.output.as_ref())
    }

    /// Whether the run finished without executing anything live.
    pub fn fully_cached(&self) -> bool {
        self.stats.executed == 0
    }
}

/// Callback for run progress.
pub trait ExecutionCallback {
    /// A code cell was served from the cache.
    fn on_cell_replayed(&self, cell: &Cell, output: &CellOutput);

    /// A code cell is about to run live.
    fn on_cell_started(&self, cell: &Cell);

    /// A code cell finished running live.
    fn on_cell_completed(&self, cell: &Cell, output: &CellOutput);

    /// A code cell failed while running live.
    fn on_cell_error(&self, cell: &Cell, error: &Error);

    /// Caching was disabled for the rest of the run after this cell.
    fn on_cache_degraded(&self, _cell: &Cell, _dropped: &[DroppedBinding]) {}
}

/// Drives one notebook run against a kernel and a session store.
pub struct ExecutionController<K, S> {
    kernel: K,
    store: S,
    fingerprinter: Fingerprinter,
    policy: CachePolicy,
    state: ControllerState,
    callback: Option<Box<dyn ExecutionCallback>>,
}

impl<K: Kernel, S: SessionStore> ExecutionController<K, S> {
    /// Create a controller for a run.
    pub fn new(kernel: K, store: S, fingerprinter: Fingerprinter, mode: CacheMode) -> Self {
        let policy = CachePolicy::new(mode);
        let state = if policy.reads_allowed() {
            ControllerState::Replaying
        } else {
            ControllerState::Executing
        };
        Self {
            kernel,
            store,
            fingerprinter,
            policy,
            state,
            callback: None,
        }
    }

    /// Set the execution callback for progress reporting.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Cache policy of the run.
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// The kernel holding the live session.
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// The session store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the controller, returning the kernel.
    pub fn into_kernel(self) -> K {
        self.kernel
    }

    /// Run every cell in order.
    ///
    /// Cache misses, store errors and degraded captures never fail the run;
    /// only a live execution error does, leaving entries for earlier cells
    /// in place.
    pub fn run(&mut self, cells: &[Cell]) -> Result<RunReport> {
        if self.state == ControllerState::Done {
            return Err(Error::InvalidOperation(
                "controller has already completed a run".to_string(),
            ));
        }
        for (position, cell) in cells.iter().enumerate() {
            if cell.index != position {
                return Err(Error::InvalidOperation(format!(
                    "cell at position {} has index {}",
                    position, cell.index
                )));
            }
        }

        let start = Instant::now();
        let mut reports = Vec::with_capacity(cells.len());
        let mut stats = RunStats::default();

        debug!(
            "Starting run of {} ({} cells, cache {}, {})",
            self.fingerprinter.identity(),
            cells.len(),
            self.policy.mode(),
            self.state
        );

        for cell in cells {
            let report = match cell.kind {
                CellKind::Text => {
                    stats.rendered += 1;
                    CellReport {
                        index: cell.index,
                        kind: CellKind::Text,
                        fingerprint: None,
                        output: None,
                        provenance: Provenance::Rendered,
                    }
                }
                CellKind::Code => self.run_code_cell(cell, &mut stats)?,
            };
            reports.push(report);
        }

        self.state = ControllerState::Done;
        let elapsed = start.elapsed();
        debug!(
            "Run finished in {:?}: {} replayed, {} executed, {} stored",
            elapsed, stats.replayed, stats.executed, stats.stored
        );

        Ok(RunReport {
            cells: reports,
            stats,
            degraded: self.policy.degraded_at(),
            elapsed,
        })
    }

    fn run_code_cell(&mut self, cell: &Cell, stats: &mut RunStats) -> Result<CellReport> {
        let fingerprint = self.fingerprinter.fingerprint(cell)?;

        if self.state == ControllerState::Replaying {
            if let Some(output) = self.replay(cell, &fingerprint) {
                stats.replayed += 1;
                if let Some(ref callback) = self.callback {
                    callback.on_cell_replayed(cell, &output);
                }
                return Ok(CellReport {
                    index: cell.index,
                    kind: CellKind::Code,
                    fingerprint: Some(fingerprint),
                    output: Some(output),
                    provenance: Provenance::Cache,
                });
            }
            debug!("Switching to live execution at cell {}", cell.index);
            self.state = ControllerState::Executing;
        }

        let output = self.execute(cell, &fingerprint)?;
        stats.executed += 1;

        if self.policy.writes_allowed() && self.store_entry(cell, &fingerprint, &output) {
            stats.stored += 1;
        }

        Ok(CellReport {
            index: cell.index,
            kind: CellKind::Code,
            fingerprint: Some(fingerprint),
            output: Some(output),
            provenance: Provenance::Live,
        })
    }

    /// Try to serve a cell from the cache. `None` means the cell must run live.
    fn replay(&mut self, cell: &Cell, fingerprint: &Fingerprint) -> Option<CellOutput> {
        let entry = match self.store.get(fingerprint) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("Cache miss for cell {} [{}]", cell.index, fingerprint.short());
                return None;
            }
            Err(e) => {
                warn!(
                    "Cache lookup failed for cell {} [{}], running live: {}",
                    cell.index,
                    fingerprint.short(),
                    e
                );
                return None;
            }
        };

        if !entry.valid {
            warn!(
                "Ignoring invalid cache entry for cell {} [{}]",
                cell.index,
                fingerprint.short()
            );
            return None;
        }

        if let Err(e) = self.kernel.restore(&entry.snapshot) {
            warn!(
                "Could not restore session for cell {} [{}], running live: {}",
                cell.index,
                fingerprint.short(),
                e
            );
            return None;
        }

        info!(
            "Loading cell {} [{}] from cache: {}",
            cell.index,
            fingerprint.short(),
            cell.snippet()
        );
        Some(entry.output)
    }

    fn execute(&mut self, cell: &Cell, fingerprint: &Fingerprint) -> Result<CellOutput> {
        info!(
            "Running cell {} [{}]: {}",
            cell.index,
            fingerprint.short(),
            cell.snippet()
        );
        if let Some(ref callback) = self.callback {
            callback.on_cell_started(cell);
        }

        match self.kernel.execute(&cell.content) {
            Ok(output) => {
                if let Some(ref callback) = self.callback {
                    callback.on_cell_completed(cell, &output);
                }
                Ok(output)
            }
            Err(e) => {
                let error = Error::Execution {
                    index: cell.index,
                    message: e.to_string(),
                };
                if let Some(ref callback) = self.callback {
                    callback.on_cell_error(cell, &error);
                }
                Err(error)
            }
        }
    }

    /// Capture the session and write an entry. Returns whether one was written.
    fn store_entry(&mut self, cell: &Cell, fingerprint: &Fingerprint, output: &CellOutput) -> bool {
        let capture = match self.kernel.capture() {
            Ok(capture) => capture,
            Err(e) => {
                warn!(
                    "Session capture failed after cell {}, caching disabled for the rest of the run: {}",
                    cell.index, e
                );
                self.degrade(cell, &[]);
                return false;
            }
        };

        if capture.is_degraded() {
            for dropped in &capture.dropped {
                warn!(
                    "Cannot capture binding {} after cell {}",
                    dropped, cell.index
                );
            }
            warn!(
                "Caching disabled from cell {} for the rest of the run",
                cell.index
            );
            self.degrade(cell, &capture.dropped);
            return false;
        }

        match self.store.put(fingerprint, output, &capture.snapshot) {
            Ok(()) => {
                debug!(
                    "Stored cache entry for cell {} [{}]",
                    cell.index,
                    fingerprint.short()
                );
                true
            }
            Err(e) => {
                warn!(
                    "Could not store cache entry for cell {} [{}]: {}",
                    cell.index,
                    fingerprint.short(),
                    e
                );
                false
            }
        }
    }

    fn degrade(&mut self, cell: &Cell, dropped: &[DroppedBinding]) {
        self.policy.mark_degraded(cell.index);
        if let Some(ref callback) = self.callback {
            callback.on_cache_degraded(cell, dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::cell::{NotebookIdentity, ParameterSet};
    use crate::kernel::{Capture, Snapshot};
    use crate::store::{CacheEntry, MemoryStore};

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct MockError(String);

    /// Kernel whose session is the list of code it has run.
    ///
    /// Outputs depend on the history, so a replayed cell only matches a live
    /// one if the session was restored correctly.
    #[derive(Default)]
    struct MockKernel {
        history: Vec<String>,
        executed: Vec<String>,
        restores: usize,
    }

    impl Kernel for MockKernel {
        type Error = MockError;

        fn name(&self) -> &str {
            "mock"
        }

        fn execute(&mut self, code: &str) -> std::result::Result<CellOutput, MockError> {
            if code.contains("raise") {
                return Err(MockError(format!("raised in '{}'", code)));
            }
            self.executed.push(code.to_string());
            self.history.push(code.to_string());
            Ok(CellOutput {
                stdout: String::new(),
                result: Some(format!("{}:{}", self.history.len(), code)),
            })
        }

        fn capture(&mut self) -> std::result::Result<Capture, MockError> {
            let snapshot = Snapshot::from_bytes(
                serde_json::to_vec(&self.history).map_err(|e| MockError(e.to_string()))?,
            );
            let dropped = self
                .history
                .iter()
                .filter(|code| code.starts_with("handle"))
                .map(|code| DroppedBinding {
                    name: code.clone(),
                    reason: "open file handle".to_string(),
                })
                .collect();
            Ok(Capture { snapshot, dropped })
        }

        fn restore(&mut self, snapshot: &Snapshot) -> std::result::Result<(), MockError> {
            let history: Vec<String> = serde_json::from_slice(snapshot.as_bytes())
                .map_err(|e| MockError(e.to_string()))?;
            self.history = history;
            self.restores += 1;
            Ok(())
        }
    }

    /// Store that fails reads and/or writes, delegating the rest to memory.
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_get: bool,
        fail_put: bool,
    }

    impl SessionStore for FailingStore {
        fn put(
            &self,
            fingerprint: &Fingerprint,
            output: &CellOutput,
            snapshot: &Snapshot,
        ) -> Result<()> {
            if self.fail_put {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.inner.put(fingerprint, output, snapshot)
        }

        fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
            if self.fail_get {
                return Err(Error::Deserialization("corrupt entry".to_string()));
            }
            self.inner.get(fingerprint)
        }

        fn clear(&self) -> Result<usize> {
            self.inner.clear()
        }
    }

    fn fingerprinter(params: &[(&str, &str)]) -> Fingerprinter {
        Fingerprinter::new(
            NotebookIdentity::new("/nb/test.cellar:test"),
            params.iter().copied().collect(),
        )
    }

    fn code_cells(sources: &[&str]) -> Vec<Cell> {
        sources
            .iter()
            .enumerate()
            .map(|(i, s)| Cell::code(i, *s))
            .collect()
    }

    fn run(
        store: &MemoryStore,
        mode: CacheMode,
        cells: &[Cell],
    ) -> (Result<RunReport>, MockKernel) {
        let mut controller =
            ExecutionController::new(MockKernel::default(), store, fingerprinter(&[]), mode);
        let report = controller.run(cells);
        (report, controller.into_kernel())
    }

    fn results(report: &RunReport) -> Vec<String> {
        report
            .outputs()
            .map(|o| o.result.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_empty_notebook_is_done() {
        let store = MemoryStore::new();
        let mut controller = ExecutionController::new(
            MockKernel::default(),
            &store,
            fingerprinter(&[]),
            CacheMode::Enabled,
        );
        assert_eq!(controller.state(), ControllerState::Replaying);

        let report = controller.run(&[]).unwrap();
        assert!(report.cells.is_empty());
        assert_eq!(controller.state(), ControllerState::Done);
        assert!(store.is_empty());
    }

    #[test]
    fn test_full_cache_hit_runs_nothing() {
        let store = MemoryStore::new();
        let cells = code_cells(&["a", "b", "c"]);

        let (first, kernel) = run(&store, CacheMode::Enabled, &cells);
        let first = first.unwrap();
        assert_eq!(first.stats.executed, 3);
        assert_eq!(first.stats.stored, 3);
        assert_eq!(kernel.executed.len(), 3);

        let (second, kernel) = run(&store, CacheMode::Enabled, &cells);
        let second = second.unwrap();
        assert!(second.fully_cached());
        assert_eq!(second.stats.replayed, 3);
        assert!(kernel.executed.is_empty());
        assert_eq!(kernel.restores, 3);
        assert_eq!(kernel.history, vec!["a", "b", "c"]);

        assert_eq!(results(&first), results(&second));
        assert!(
            second
                .cells
                .iter()
                .all(|c| c.provenance == Provenance::Cache)
        );
    }

    #[test]
    fn test_prefix_invalidation() {
        let store = MemoryStore::new();
        run(&store, CacheMode::Enabled, &code_cells(&["a", "b", "c", "d"]))
            .0
            .unwrap();

        let changed = code_cells(&["a", "B", "c", "d"]);
        let (report, kernel) = run(&store, CacheMode::Enabled, &changed);
        let report = report.unwrap();

        let provenance: Vec<_> = report.cells.iter().map(|c| c.provenance).collect();
        assert_eq!(
            provenance,
            vec![
                Provenance::Cache,
                Provenance::Live,
                Provenance::Live,
                Provenance::Live
            ]
        );
        // "c" and "d" are unchanged but must still run live.
        assert_eq!(kernel.executed, vec!["B", "c", "d"]);
        assert_eq!(results(&report), vec!["1:a", "2:B", "3:c", "4:d"]);
    }

    #[test]
    fn test_text_cells_do_not_break_replay() {
        let store = MemoryStore::new();
        let cells = vec![
            Cell::text(0, "# Title"),
            Cell::code(1, "a"),
            Cell::text(2, "middle"),
            Cell::code(3, "b"),
        ];
        run(&store, CacheMode::Enabled, &cells).0.unwrap();

        let (report, kernel) = run(&store, CacheMode::Enabled, &cells);
        let report = report.unwrap();
        assert!(kernel.executed.is_empty());
        assert_eq!(report.stats.rendered, 2);
        assert_eq!(report.stats.replayed, 2);
        assert_eq!(report.cell(0).unwrap().provenance, Provenance::Rendered);
        assert!(report.cell(0).unwrap().fingerprint.is_none());
    }

    #[test]
    fn test_params_change_fingerprints() {
        let store = MemoryStore::new();
        let cells = code_cells(&["a + b"]);

        for (b, expect_hit) in [("5", false), ("5", true), ("6", false)] {
            let mut controller = ExecutionController::new(
                MockKernel::default(),
                &store,
                fingerprinter(&[("a", "3"), ("b", b)]),
                CacheMode::Enabled,
            );
            let report = controller.run(&cells).unwrap();
            assert_eq!(report.fully_cached(), expect_hit, "b={}", b);
        }
        // Old entry is kept alongside the new one.
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_degraded_capture_stops_caching() {
        let store = MemoryStore::new();
        let cells = code_cells(&["a", "handle f", "c"]);

        let (report, _) = run(&store, CacheMode::Enabled, &cells);
        let report = report.unwrap();
        assert_eq!(report.degraded, Some(1));
        assert_eq!(report.stats.executed, 3);
        assert_eq!(report.stats.stored, 1);
        assert_eq!(results(&report), vec!["1:a", "2:handle f", "3:c"]);

        let (rerun, kernel) = run(&store, CacheMode::Enabled, &cells);
        let rerun = rerun.unwrap();
        assert_eq!(rerun.stats.replayed, 1);
        assert_eq!(kernel.executed, vec!["handle f", "c"]);
        assert_eq!(results(&rerun), results(&report));
    }

    #[test]
    fn test_restore_failure_runs_live() {
        let store = MemoryStore::new();
        let cells = code_cells(&["a", "b"]);
        run(&store, CacheMode::Enabled, &cells).0.unwrap();

        let key = fingerprinter(&[]).fingerprint(&cells[1]).unwrap();
        assert!(store.replace_snapshot(&key, Snapshot::from_bytes(b"corrupt".to_vec())));

        let (report, kernel) = run(&store, CacheMode::Enabled, &cells);
        let report = report.unwrap();
        assert_eq!(report.stats.replayed, 1);
        assert_eq!(kernel.executed, vec!["b"]);
        assert_eq!(results(&report), vec!["1:a", "2:b"]);
    }

    #[test]
    fn test_entry_removed_between_runs() {
        let store = MemoryStore::new();
        let cells = code_cells(&["a", "b", "c"]);
        run(&store, CacheMode::Enabled, &cells).0.unwrap();

        let key = fingerprinter(&[]).fingerprint(&cells[0]).unwrap();
        store.remove(&key);

        let (report, kernel) = run(&store, CacheMode::Enabled, &cells);
        assert_eq!(report.unwrap().stats.replayed, 0);
        assert_eq!(kernel.executed.len(), 3);
    }

    #[test]
    fn test_disabled_mode_never_touches_store() {
        let store = MemoryStore::new();
        let cells = code_cells(&["a", "b"]);

        let (first, _) = run(&store, CacheMode::Disabled, &cells);
        let (second, kernel) = run(&store, CacheMode::Disabled, &cells);
        assert!(store.is_empty());
        assert_eq!(kernel.executed.len(), 2);

        let (enabled, _) = run(&store, CacheMode::Enabled, &cells);
        assert_eq!(results(&first.unwrap()), results(&second.unwrap()));
        assert_eq!(results(&enabled.unwrap()), vec!["1:a", "2:b"]);
    }

    #[test]
    fn test_ignore_mode_refreshes_without_reading() {
        let store = MemoryStore::new();
        let cells = code_cells(&["a", "b"]);
        run(&store, CacheMode::Enabled, &cells).0.unwrap();

        let mut controller = ExecutionController::new(
            MockKernel::default(),
            &store,
            fingerprinter(&[]),
            CacheMode::Ignore,
        );
        assert_eq!(controller.state(), ControllerState::Executing);
        let report = controller.run(&cells).unwrap();
        assert_eq!(report.stats.executed, 2);
        assert_eq!(report.stats.stored, 2);
        assert_eq!(controller.kernel().restores, 0);
    }

    #[test]
    fn test_execution_error_keeps_prior_entries() {
        let store = MemoryStore::new();
        let broken = code_cells(&["a", "b", "raise x", "d"]);

        let (report, kernel) = run(&store, CacheMode::Enabled, &broken);
        match report {
            Err(Error::Execution { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected execution error, got {:?}", other),
        }
        assert_eq!(kernel.executed, vec!["a", "b"]);
        assert_eq!(store.len(), 2);

        let fixed = code_cells(&["a", "b", "c", "d"]);
        let (report, kernel) = run(&store, CacheMode::Enabled, &fixed);
        assert_eq!(report.unwrap().stats.replayed, 2);
        assert_eq!(kernel.executed, vec!["c", "d"]);
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let store = MemoryStore::new();
        let mut controller = ExecutionController::new(
            MockKernel::default(),
            &store,
            fingerprinter(&[]),
            CacheMode::Enabled,
        );
        controller.run(&code_cells(&["a"])).unwrap();
        assert!(matches!(
            controller.run(&code_cells(&["a"])),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_misnumbered_cells_are_rejected() {
        let store = MemoryStore::new();
        let cells = vec![Cell::code(0, "a"), Cell::code(2, "b")];
        let (report, kernel) = run(&store, CacheMode::Enabled, &cells);
        assert!(matches!(report, Err(Error::InvalidOperation(_))));
        assert!(kernel.executed.is_empty());
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl ExecutionCallback for Recorder {
        fn on_cell_replayed(&self, cell: &Cell, _output: &CellOutput) {
            self.events.borrow_mut().push(format!("replayed {}", cell.index));
        }

        fn on_cell_started(&self, cell: &Cell) {
            self.events.borrow_mut().push(format!("started {}", cell.index));
        }

        fn on_cell_completed(&self, cell: &Cell, _output: &CellOutput) {
            self.events.borrow_mut().push(format!("completed {}", cell.index));
        }

        fn on_cell_error(&self, cell: &Cell, _error: &Error) {
            self.events.borrow_mut().push(format!("error {}", cell.index));
        }

        fn on_cache_degraded(&self, cell: &Cell, dropped: &[DroppedBinding]) {
            self.events
                .borrow_mut()
                .push(format!("degraded {} ({})", cell.index, dropped.len()));
        }
    }

    fn run_with(store: &FailingStore, cells: &[Cell]) -> RunReport {
        ExecutionController::new(MockKernel::default(), store, fingerprinter(&[]), CacheMode::Enabled)
            .run(cells)
            .unwrap()
    }

    #[test]
    fn test_failing_get_runs_live() {
        let store = FailingStore {
            fail_get: true,
            ..Default::default()
        };
        let cells = code_cells(&["a", "b"]);

        let first = run_with(&store, &cells);
        assert_eq!(first.stats.executed, 2);
        assert_eq!(first.stats.stored, 2);

        // Entries exist but every lookup errors, so nothing is replayed.
        let second = run_with(&store, &cells);
        assert_eq!(second.stats.replayed, 0);
        assert_eq!(second.stats.executed, 2);
        assert_eq!(results(&second), vec!["1:a", "2:b"]);
    }

    #[test]
    fn test_failing_put_keeps_outputs() {
        let store = FailingStore {
            fail_put: true,
            ..Default::default()
        };
        let cells = code_cells(&["a", "b", "c"]);

        let report = run_with(&store, &cells);
        assert_eq!(report.stats.executed, 3);
        assert_eq!(report.stats.stored, 0);
        assert_eq!(report.degraded, None);
        assert_eq!(results(&report), vec!["1:a", "2:b", "3:c"]);
        assert!(store.inner.is_empty());

        let both = FailingStore {
            fail_get: true,
            fail_put: true,
            ..Default::default()
        };
        let report = run_with(&both, &cells);
        assert_eq!(report.stats.executed, 3);
        assert_eq!(results(&report), vec!["1:a", "2:b", "3:c"]);
    }

    #[test]
    fn test_callback_events() {
        let store = MemoryStore::new();
        run(&store, CacheMode::Enabled, &code_cells(&["a"]))
            .0
            .unwrap();

        let recorder = Recorder::default();
        let mut controller = ExecutionController::new(
            MockKernel::default(),
            &store,
            fingerprinter(&[]),
            CacheMode::Enabled,
        );
        controller.set_callback(recorder.clone());
        let result = controller.run(&code_cells(&["a", "handle h", "raise"]));
        assert!(result.is_err());

        assert_eq!(
            *recorder.events.borrow(),
            vec![
                "replayed 0",
                "started 1",
                "completed 1",
                "degraded 1 (1)",
                "started 2",
                "error 2",
            ]
        );
    }
}
