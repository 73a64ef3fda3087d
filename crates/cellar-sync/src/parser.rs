//! Parser for `.cellar` notebook sources.
//!
//! A source file is cellar script with a few structural conventions:
//!
//! ```text
//! @param a = 3          # parameter directives, before anything else
//! @param b
//! '''
//! # Title              <- text (markdown) cell
//! '''
//! a + b                 <- code cell
//! '''
//! '''                   <- empty text block: plain cell separator
//! print(a * b)
//! return                <- everything below is ignored
//! ```

use std::fs;
use std::path::Path;

use cellar_core::CellKind;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

/// Line that toggles between code and text mode.
pub const TEXT_DELIMITER: &str = "'''";

/// Directive declaring a notebook parameter.
pub const PARAM_DIRECTIVE: &str = "@param";

const RESERVED: &[&str] = &["let", "del", "true", "false", "nil", "and", "or", "not"];

/// A declared notebook parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    /// Parameter name
    pub name: String,
    /// Default value, if the declaration has one
    pub default: Option<String>,
}

/// A cell as written in the source, before parameter injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCell {
    /// Cell type
    pub kind: CellKind,
    /// Cell content
    pub content: String,
}

impl SourceCell {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Text,
            content: content.into(),
        }
    }

    pub fn code(content: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Code,
            content: content.into(),
        }
    }
}

/// Result of parsing a notebook source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSource {
    /// Parameter declarations, in order
    pub params: Vec<ParamDecl>,
    /// Cells, in order
    pub cells: Vec<SourceCell>,
}

/// Parser for `.cellar` notebooks.
#[derive(Debug, Default)]
pub struct SourceParser {}

impl SourceParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self {}
    }

    /// Parse a `.cellar` file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> SyncResult<ParsedSource> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| SyncError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.parse_source(&source)
    }

    /// Parse notebook source text.
    pub fn parse_source(&self, source: &str) -> SyncResult<ParsedSource> {
        let mut parsed = ParsedSource::default();
        let mut body: Vec<(usize, &str)> = Vec::new();
        let mut in_header = true;

        for (number, line) in source.lines().enumerate().map(|(i, l)| (i + 1, l)) {
            let trimmed = line.trim();
            if in_header {
                if is_directive(trimmed) {
                    let decl = parse_directive(trimmed, number)?;
                    if parsed.params.iter().any(|p| p.name == decl.name) {
                        return Err(SyncError::ParseError {
                            line: number,
                            message: format!("parameter '{}' declared twice", decl.name),
                        });
                    }
                    parsed.params.push(decl);
                    continue;
                }
                if !(trimmed.is_empty() || trimmed.starts_with('#')) {
                    in_header = false;
                }
            }
            body.push((number, line));
        }

        parsed.cells = self.split_cells(&body)?;
        debug!(
            "Parsed {} parameters and {} cells",
            parsed.params.len(),
            parsed.cells.len()
        );
        Ok(parsed)
    }

    fn split_cells(&self, lines: &[(usize, &str)]) -> SyncResult<Vec<SourceCell>> {
        let mut cells = Vec::new();
        let mut buffer = String::new();
        let mut in_text = false;
        let mut indent: Option<usize> = None;

        for &(number, raw) in lines {
            let line = if raw.trim().is_empty() {
                raw
            } else {
                let width = *indent.get_or_insert_with(|| leading_whitespace(raw));
                strip_indent(raw, width)
            };
            let trimmed = line.trim();

            if !in_text && trimmed == "return" {
                info!(
                    "Encountered 'return' at line {}, ignoring the rest of the notebook",
                    number
                );
                break;
            }
            if !in_text && is_directive(trimmed) {
                return Err(SyncError::ParseError {
                    line: number,
                    message: "parameter directives must come before the first cell".to_string(),
                });
            }

            if trimmed == TEXT_DELIMITER {
                flush(&mut cells, &buffer, in_text);
                buffer.clear();
                in_text = !in_text;
            } else {
                buffer.push_str(line);
                buffer.push('\n');
            }
        }

        if in_text && !buffer.trim().is_empty() {
            debug!("Unterminated text block at end of notebook");
        }
        flush(&mut cells, &buffer, in_text);
        Ok(cells)
    }
}

fn flush(cells: &mut Vec<SourceCell>, buffer: &str, in_text: bool) {
    if buffer.trim().is_empty() {
        return;
    }
    if in_text {
        cells.push(SourceCell::text(trim_blank_lines(buffer)));
    } else {
        cells.push(SourceCell::code(buffer.trim()));
    }
}

/// Drop leading and trailing blank lines, keeping indentation inside the text.
fn trim_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(0);
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

fn strip_indent(line: &str, width: usize) -> &str {
    let strip = leading_whitespace(line).min(width);
    // Spaces and tabs are single-byte, so the char count is a byte offset.
    &line[strip..]
}

fn is_directive(trimmed: &str) -> bool {
    trimmed
        .strip_prefix(PARAM_DIRECTIVE)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

fn parse_directive(trimmed: &str, line: usize) -> SyncResult<ParamDecl> {
    let error = |message: String| SyncError::ParseError { line, message };
    let rest = trimmed[PARAM_DIRECTIVE.len()..].trim();

    let (name, default) = match rest.split_once('=') {
        Some((name, value)) => {
            let value = value.trim();
            if value.is_empty() {
                return Err(error(format!(
                    "missing default value for parameter '{}'",
                    name.trim()
                )));
            }
            (name.trim(), Some(unquote(value).to_string()))
        }
        None => (rest, None),
    };

    if !is_identifier(name) {
        return Err(error(format!("invalid parameter name '{}'", name)));
    }
    if RESERVED.contains(&name) {
        return Err(error(format!("'{}' is a reserved word", name)));
    }

    Ok(ParamDecl {
        name: name.to_string(),
        default,
    })
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
