//! Notebook loading and conversion for cellar.
//!
//! Turns `.cellar` sources (or imported `.ipynb` files) into the indexed cell
//! sequence the execution controller runs, and writes runs back out.
//!
//! # Architecture
//!
//! ```text
//! notebook.cellar ──► SourceParser ──► params::inject ──► Notebook ──► ExecutionController
//!                                                            │               │
//! notebook.ipynb ──► JupyterNotebook ─────────────────────────┘               ▼
//!                                                                        RunReport
//!                                                                            │
//!                              notebook.ipynb ◄── IpynbGenerator ◄───────────┤
//!                              notebook.html  ◄── HtmlGenerator  ◄───────────┘
//! ```

mod error;
mod export;
mod footer;
mod html;
mod ipynb;
mod notebook;
mod params;
mod parser;

pub use error::{SyncError, SyncResult};
pub use export::export_source;
pub use footer::{FOOTER_TAG, Footer, is_footer};
pub use html::HtmlGenerator;
pub use ipynb::{IpynbGenerator, JupyterNotebook, JupyterOutput, MultilineText};
pub use notebook::Notebook;
pub use params::{PARAMETERS_HEADER, inject, parameter_cell, parse_assignment, resolve};
pub use parser::{PARAM_DIRECTIVE, ParamDecl, ParsedSource, SourceCell, SourceParser, TEXT_DELIMITER};

use std::path::Path;

use cellar_core::RunReport;

/// Write a notebook, with the outputs of `report` when given, as `.ipynb`.
pub fn export_ipynb(
    notebook: &Notebook,
    report: Option<&RunReport>,
    ipynb_path: impl AsRef<Path>,
) -> SyncResult<()> {
    let ipynb_path = ipynb_path.as_ref();

    let mut generator = IpynbGenerator::new();
    let jupyter = generator.generate(notebook, report);
    jupyter.write_to_file(ipynb_path)?;

    tracing::info!(
        "Exported {} → {} ({} cells)",
        notebook.name,
        ipynb_path.display(),
        notebook.cells.len()
    );

    Ok(())
}

/// Get the default `.ipynb` path for a `.cellar` notebook.
pub fn default_ipynb_path(source_path: impl AsRef<Path>) -> std::path::PathBuf {
    source_path.as_ref().with_extension("ipynb")
}
