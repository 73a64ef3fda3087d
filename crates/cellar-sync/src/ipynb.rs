//! Jupyter notebook (.ipynb) export and import.
//!
//! Export writes nbformat 4.5 with the cached or live outputs of a run; code
//! cells carry a `cellar` metadata block naming their fingerprint and where
//! the output came from. Import only reads cell types and sources.

use std::fs;
use std::path::Path;

use cellar_core::{CellKind, Provenance, RunReport};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::notebook::Notebook;
use crate::parser::SourceCell;

/// Text stored either as one string or as a list of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultilineText {
    Lines(Vec<String>),
    Single(String),
}

impl MultilineText {
    /// Split text into lines, each but the last keeping its newline.
    pub fn from_text(text: &str) -> Self {
        MultilineText::Lines(text.split_inclusive('\n').map(str::to_string).collect())
    }

    /// Join back into a single string.
    pub fn to_text(&self) -> String {
        match self {
            MultilineText::Lines(lines) => lines.concat(),
            MultilineText::Single(text) => text.clone(),
        }
    }
}

impl Default for MultilineText {
    fn default() -> Self {
        MultilineText::Lines(Vec::new())
    }
}

/// A Jupyter notebook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupyterNotebook {
    /// Notebook metadata
    #[serde(default)]
    pub metadata: JupyterMetadata,

    /// Format version (always 4)
    pub nbformat: u32,

    /// Minor format version
    pub nbformat_minor: u32,

    /// Notebook cells
    pub cells: Vec<JupyterCell>,
}

/// Jupyter notebook metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JupyterMetadata {
    /// Kernel specification
    pub kernelspec: KernelSpec,

    /// Language info
    pub language_info: LanguageInfo,

    /// Run information for round-trip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cellar: Option<CellarMetadata>,
}

/// Kernel specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSpec {
    /// Display name
    pub display_name: String,

    /// Language
    pub language: String,

    /// Kernel name
    pub name: String,
}

/// Language information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageInfo {
    /// File extension
    pub file_extension: String,

    /// MIME type
    pub mimetype: String,

    /// Language name
    pub name: String,
}

/// Notebook-level run information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellarMetadata {
    /// Source file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// Notebook identity the fingerprints were computed with
    pub identity: String,

    /// Resolved parameters, in declaration order
    pub params: Vec<(String, String)>,

    /// cellar version
    pub version: String,
}

/// A Jupyter cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupyterCell {
    /// Cell id (nbformat 4.5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Cell type
    pub cell_type: String,

    /// Cell metadata
    #[serde(default)]
    pub metadata: CellMetadata,

    /// Cell source
    #[serde(default)]
    pub source: MultilineText,

    /// Cell outputs (for code cells)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<JupyterOutput>>,

    /// Execution count (for code cells)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<u32>,
}

/// Cell metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellMetadata {
    /// Cache information for code cells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cellar: Option<CellarCellMetadata>,
}

/// Per-cell cache information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellarCellMetadata {
    /// Fingerprint hex
    pub fingerprint: String,

    /// `cache` or `live`
    pub provenance: String,
}

/// Cell output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "output_type")]
pub enum JupyterOutput {
    /// Standard output/error
    #[serde(rename = "stream")]
    Stream { name: String, text: MultilineText },

    /// Value of the cell's final expression
    #[serde(rename = "execute_result")]
    ExecuteResult {
        execution_count: Option<u32>,
        data: OutputData,
        metadata: serde_json::Value,
    },

    /// Display data
    #[serde(rename = "display_data")]
    DisplayData {
        data: OutputData,
        metadata: serde_json::Value,
    },

    /// Error output
    #[serde(rename = "error")]
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

/// Output data; only the plain text representation is produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputData {
    /// Plain text
    #[serde(
        rename = "text/plain",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub text_plain: Option<MultilineText>,
}

impl JupyterNotebook {
    /// Create a new empty notebook.
    pub fn new() -> Self {
        Self {
            metadata: JupyterMetadata::default(),
            nbformat: 4,
            nbformat_minor: 5,
            cells: Vec::new(),
        }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the notebook to a file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| SyncError::WriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Read a notebook from a file.
    pub fn read_from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| SyncError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let notebook: Self = serde_json::from_str(&content)?;
        if notebook.nbformat != 4 {
            return Err(SyncError::InvalidNotebook(format!(
                "unsupported nbformat {}",
                notebook.nbformat
            )));
        }
        Ok(notebook)
    }

    /// Cells as text/code source cells.
    pub fn source_cells(&self) -> SyncResult<Vec<SourceCell>> {
        self.cells
            .iter()
            .map(|cell| {
                let text = cell.source.to_text();
                match cell.cell_type.as_str() {
                    "markdown" | "raw" => Ok(SourceCell::text(text)),
                    "code" => Ok(SourceCell::code(text.trim())),
                    other => Err(SyncError::InvalidNotebook(format!(
                        "unknown cell type '{}'",
                        other
                    ))),
                }
            })
            .collect()
    }
}

impl Default for JupyterNotebook {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for JupyterMetadata {
    fn default() -> Self {
        Self {
            kernelspec: KernelSpec {
                display_name: "cellar script".to_string(),
                language: "cellar".to_string(),
                name: cellar_script::KERNEL_NAME.to_string(),
            },
            language_info: LanguageInfo {
                file_extension: ".cellar".to_string(),
                mimetype: "text/x-cellar".to_string(),
                name: "cellar".to_string(),
            },
            cellar: None,
        }
    }
}

/// Generator for Jupyter notebooks from cellar notebooks.
pub struct IpynbGenerator {
    /// Execution counter
    execution_count: u32,
}

impl IpynbGenerator {
    /// Create a new generator.
    pub fn new() -> Self {
        Self { execution_count: 1 }
    }

    /// Generate a Jupyter notebook, with outputs from `report` when given.
    pub fn generate(&mut self, notebook: &Notebook, report: Option<&RunReport>) -> JupyterNotebook {
        let mut jupyter = JupyterNotebook::new();
        jupyter.metadata.cellar = Some(CellarMetadata {
            source_file: notebook
                .source_path
                .as_ref()
                .map(|p| p.display().to_string()),
            identity: notebook.identity.to_string(),
            params: notebook
                .params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        for cell in &notebook.cells {
            let cell_report = report.and_then(|r| r.cell(cell.index));
            let id = Some(format!("cell-{}", cell.index));
            let source = MultilineText::from_text(&cell.content);

            let jupyter_cell = match cell.kind {
                CellKind::Text => JupyterCell {
                    id,
                    cell_type: "markdown".to_string(),
                    metadata: CellMetadata::default(),
                    source,
                    outputs: None,
                    execution_count: None,
                },
                CellKind::Code => {
                    let executed = cell_report.and_then(|r| r.output.as_ref());
                    let execution_count = executed.map(|_| {
                        let count = self.execution_count;
                        self.execution_count += 1;
                        count
                    });

                    let mut outputs = Vec::new();
                    if let Some(output) = executed {
                        if !output.stdout.is_empty() {
                            outputs.push(JupyterOutput::Stream {
                                name: "stdout".to_string(),
                                text: MultilineText::from_text(&output.stdout),
                            });
                        }
                        if let Some(result) = &output.result {
                            outputs.push(JupyterOutput::ExecuteResult {
                                execution_count,
                                data: OutputData {
                                    text_plain: Some(MultilineText::from_text(result)),
                                },
                                metadata: serde_json::json!({}),
                            });
                        }
                    }

                    let cellar = cell_report.and_then(|r| {
                        let fingerprint = r.fingerprint.as_ref()?;
                        let provenance = match r.provenance {
                            Provenance::Cache => "cache",
                            Provenance::Live => "live",
                            Provenance::Rendered => return None,
                        };
                        Some(CellarCellMetadata {
                            fingerprint: fingerprint.to_string(),
                            provenance: provenance.to_string(),
                        })
                    });

                    JupyterCell {
                        id,
                        cell_type: "code".to_string(),
                        metadata: CellMetadata { cellar },
                        source,
                        outputs: Some(outputs),
                        execution_count,
                    }
                }
            };
            jupyter.cells.push(jupyter_cell);
        }

        jupyter
    }
}

impl Default for IpynbGenerator {
    fn default() -> Self {
        Self::new()
    }
}
