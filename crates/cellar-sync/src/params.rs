//! Parameter resolution and injection.

use cellar_core::ParameterSet;
use cellar_script::literal;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::parser::{ParamDecl, SourceCell, is_identifier};

/// Header line of the injected parameter cell.
pub const PARAMETERS_HEADER: &str = "# Parameters:";

/// Split a `NAME=VALUE` command line override on the first `=`.
pub fn parse_assignment(arg: &str) -> SyncResult<(String, String)> {
    let (name, value) = arg.split_once('=').ok_or_else(|| {
        SyncError::ParameterError(format!("expected NAME=VALUE, got '{}'", arg))
    })?;
    let name = name.trim();
    if !is_identifier(name) {
        return Err(SyncError::ParameterError(format!(
            "invalid parameter name '{}'",
            name
        )));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Merge declared defaults with command line overrides.
///
/// The result follows declaration order. Overriding an undeclared parameter,
/// or leaving a parameter without default unset, is an error.
pub fn resolve(declared: &[ParamDecl], overrides: &[(String, String)]) -> SyncResult<ParameterSet> {
    for (name, _) in overrides {
        if !declared.iter().any(|d| &d.name == name) {
            return Err(SyncError::ParameterError(format!(
                "unknown parameter '{}'",
                name
            )));
        }
    }

    let mut params = ParameterSet::new();
    for decl in declared {
        // Later overrides win.
        let value = overrides
            .iter()
            .rev()
            .find(|(name, _)| name == &decl.name)
            .map(|(_, value)| value.clone())
            .or_else(|| decl.default.clone())
            .ok_or_else(|| {
                SyncError::ParameterError(format!(
                    "notebook parameter '{}' required but not found",
                    decl.name
                ))
            })?;
        params.insert(decl.name.clone(), value);
    }

    debug!("Resolved parameters: {}", params);
    Ok(params)
}

/// Source of the code cell binding every parameter.
pub fn parameter_cell(params: &ParameterSet) -> String {
    let mut content = PARAMETERS_HEADER.to_string();
    for (name, value) in params.iter() {
        content.push('\n');
        content.push_str(&format!("{} = {}", name, literal(value)));
    }
    content
}

/// Insert the parameter cell.
///
/// It goes second when the first cell is text (taken to be the title),
/// first otherwise. Nothing is inserted for an empty parameter set.
pub fn inject(cells: &mut Vec<SourceCell>, params: &ParameterSet) {
    if params.is_empty() {
        return;
    }
    let position = match cells.first() {
        Some(first) if first.kind == cellar_core::CellKind::Text => 1,
        _ => 0,
    };
    cells.insert(position, SourceCell::code(parameter_cell(params)));
}
