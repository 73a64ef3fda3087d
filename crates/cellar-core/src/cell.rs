//! Cell model consumed by the execution controller.
//!
//! Cells, the parameter set and the notebook identity are produced once by the
//! parser/injector before a run starts and are never mutated afterwards.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Type of cell in the notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Text cell (markdown, non-executable).
    Text,
    /// Code cell, executed against the live session.
    Code,
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellKind::Text => write!(f, "text"),
            CellKind::Code => write!(f, "code"),
        }
    }
}

/// One element of a parsed notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell type
    pub kind: CellKind,
    /// Raw source text, already trimmed by the parser
    pub content: String,
    /// 0-based position in the final cell sequence (after parameter injection)
    pub index: usize,
}

impl Cell {
    /// Create a text cell.
    pub fn text(index: usize, content: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Text,
            content: content.into(),
            index,
        }
    }

    /// Create a code cell.
    pub fn code(index: usize, content: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Code,
            content: content.into(),
            index,
        }
    }

    /// Whether this cell is executable.
    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }

    /// Short single-line preview of the content, used in log lines.
    pub fn snippet(&self) -> String {
        let collapsed = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut snippet: String = collapsed.chars().take(40).collect();
        if collapsed.chars().count() > 40 {
            snippet.push_str("..");
        }
        snippet
    }
}

/// String uniquely naming a notebook definition.
///
/// The optional tag is the user-supplied disambiguator appended by the caller;
/// two runs of the same notebook with different tags never share cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotebookIdentity {
    base: String,
    tag: Option<String>,
}

impl NotebookIdentity {
    /// Create an identity without a disambiguator.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            tag: None,
        }
    }

    /// Append a disambiguator. Empty tags are ignored.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.tag = if tag.is_empty() { None } else { Some(tag) };
        self
    }

    /// The notebook path/name part.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The disambiguator, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl fmt::Display for NotebookIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}#{}", self.base, tag),
            None => write!(f, "{}", self.base),
        }
    }
}

/// Ordered mapping from parameter name to its literal string value.
///
/// Insertion order is kept for display and for the injected parameter cell;
/// fingerprinting uses [`ParameterSet::canonical`], which is sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: IndexMap<String, String>,
}

impl ParameterSet {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value but keeping its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Get a parameter value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether a parameter is set.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name-sorted view, independent of the order parameters were supplied in.
    pub fn canonical(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = ParameterSet::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", items.join(", "))
    }
}
