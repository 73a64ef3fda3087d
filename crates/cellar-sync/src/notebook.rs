//! Assembled notebooks: the cell sequence handed to the execution controller.

use std::fs;
use std::path::{Path, PathBuf};

use cellar_core::{Cell, CellKind, Fingerprinter, NotebookIdentity, ParameterSet};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::footer::{Footer, is_footer};
use crate::ipynb::JupyterNotebook;
use crate::params::{inject, resolve};
use crate::parser::{SourceCell, SourceParser};

/// A notebook ready to run.
#[derive(Debug, Clone)]
pub struct Notebook {
    /// Name used in messages and the footer
    pub name: String,
    /// Identity hashed into every fingerprint
    pub identity: NotebookIdentity,
    /// Resolved parameters
    pub params: ParameterSet,
    /// Cells in final order, indexed after parameter injection
    pub cells: Vec<Cell>,
    /// File the notebook was loaded from
    pub source_path: Option<PathBuf>,
}

impl Notebook {
    /// Load a `.cellar` source file and resolve its parameters.
    ///
    /// The identity is `<canonical path>:<file stem>`.
    pub fn from_source_file(
        path: impl AsRef<Path>,
        overrides: &[(String, String)],
    ) -> SyncResult<Self> {
        let path = path.as_ref();
        let canonical = canonicalize(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = fs::read_to_string(path).map_err(|e| SyncError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        info!("Loading notebook {}", path.display());
        let identity = NotebookIdentity::new(format!("{}:{}", canonical.display(), stem));
        let mut notebook =
            Self::from_source(path.display().to_string(), identity, &source, overrides)?;
        notebook.source_path = Some(canonical);
        Ok(notebook)
    }

    /// Build a notebook from source text.
    pub fn from_source(
        name: impl Into<String>,
        identity: NotebookIdentity,
        source: &str,
        overrides: &[(String, String)],
    ) -> SyncResult<Self> {
        let parsed = SourceParser::new().parse_source(source)?;
        let params = resolve(&parsed.params, overrides)?;

        let mut cells = parsed.cells;
        inject(&mut cells, &params);

        Ok(Self {
            name: name.into(),
            identity,
            params,
            cells: index_cells(cells),
            source_path: None,
        })
    }

    /// Import cells from a Jupyter notebook. Imported notebooks have no parameters.
    ///
    /// The identity is the canonical path of the file.
    pub fn from_ipynb_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let canonical = canonicalize(path)?;
        let jupyter = JupyterNotebook::read_from_file(path)?;
        let cells = jupyter.source_cells()?;

        info!(
            "Imported {} cells from {}",
            cells.len(),
            path.display()
        );
        Ok(Self {
            name: path.display().to_string(),
            identity: NotebookIdentity::new(canonical.display().to_string()),
            params: ParameterSet::new(),
            cells: index_cells(cells),
            source_path: Some(canonical),
        })
    }

    /// Append the cache disambiguator to the identity.
    pub fn with_tag(mut self, tag: Option<&str>) -> Self {
        if let Some(tag) = tag {
            self.identity = self.identity.with_tag(tag);
        }
        self
    }

    /// Fingerprint engine for running this notebook.
    pub fn fingerprinter(&self) -> Fingerprinter {
        Fingerprinter::new(self.identity.clone(), self.params.clone())
    }

    /// Number of code cells.
    pub fn code_cell_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_code()).count()
    }

    /// Append the footer as a text cell, unless one is already present.
    ///
    /// Returns whether a footer was added.
    pub fn add_footer(&mut self, footer: &Footer) -> bool {
        if self
            .cells
            .iter()
            .any(|c| c.kind == CellKind::Text && is_footer(&c.content))
        {
            debug!("Footer cell already present");
            return false;
        }
        self.cells.push(Cell::text(self.cells.len(), footer.render()));
        true
    }
}

fn index_cells(cells: Vec<SourceCell>) -> Vec<Cell> {
    cells
        .into_iter()
        .enumerate()
        .map(|(index, cell)| Cell {
            kind: cell.kind,
            content: cell.content,
            index,
        })
        .collect()
}

fn canonicalize(path: &Path) -> SyncResult<PathBuf> {
    path.canonicalize().map_err(|e| SyncError::ReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
