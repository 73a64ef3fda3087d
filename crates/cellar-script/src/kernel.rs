//! Snapshot-capable kernel backed by the script interpreter.
//!
//! A snapshot is a JSON document holding every capturable binding. Each
//! binding is converted on its own, so one live handle only drops that
//! binding and marks the capture degraded.

use std::collections::BTreeMap;

use cellar_core::{Capture, CellOutput, DroppedBinding, Kernel, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::parser::parse;
use crate::value::{Handle, Value};

/// Format marker written into every snapshot.
pub const SNAPSHOT_FORMAT: &str = "cellar-script/1";

/// Name reported by the kernel.
pub const KERNEL_NAME: &str = "cellar-script";

/// Serializable form of a binding's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
enum StoredValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<StoredValue>),
}

impl StoredValue {
    /// Convert a live value, or explain why it cannot be stored.
    fn capture(value: &Value) -> Result<Self, String> {
        Ok(match value {
            Value::Nil => StoredValue::Nil,
            Value::Bool(b) => StoredValue::Bool(*b),
            Value::Int(n) => StoredValue::Int(*n),
            Value::Float(x) if x.is_finite() => StoredValue::Float(*x),
            Value::Float(x) => return Err(format!("non-finite float {}", value_repr(*x))),
            Value::Str(s) => StoredValue::Str(s.clone()),
            Value::List(items) => StoredValue::List(
                items
                    .iter()
                    .map(StoredValue::capture)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Handle(Handle::File(file)) => {
                return Err(format!(
                    "open file handle '{}'",
                    file.borrow().path.display()
                ));
            }
            Value::Handle(Handle::Iter(_)) => return Err("iterator".to_string()),
        })
    }

    fn restore(self) -> Value {
        match self {
            StoredValue::Nil => Value::Nil,
            StoredValue::Bool(b) => Value::Bool(b),
            StoredValue::Int(n) => Value::Int(n),
            StoredValue::Float(x) => Value::Float(x),
            StoredValue::Str(s) => Value::Str(s),
            StoredValue::List(items) => {
                Value::List(items.into_iter().map(StoredValue::restore).collect())
            }
        }
    }
}

fn value_repr(x: f64) -> String {
    Value::Float(x).repr()
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    format: String,
    bindings: BTreeMap<String, StoredValue>,
}

/// Kernel running cells with the cellar script interpreter.
#[derive(Debug, Default)]
pub struct ScriptKernel {
    interpreter: Interpreter,
}

impl ScriptKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying interpreter.
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    /// Encode the namespace, listing bindings that had to be left out.
    pub fn capture_bindings(&self) -> ScriptResult<Capture> {
        let mut bindings = BTreeMap::new();
        let mut dropped = Vec::new();

        for (name, value) in self.interpreter.bindings() {
            match StoredValue::capture(value) {
                Ok(stored) => {
                    bindings.insert(name.clone(), stored);
                }
                Err(reason) => dropped.push(DroppedBinding {
                    name: name.clone(),
                    reason,
                }),
            }
        }

        let document = SnapshotDocument {
            format: SNAPSHOT_FORMAT.to_string(),
            bindings,
        };
        let bytes =
            serde_json::to_vec(&document).map_err(|e| ScriptError::Snapshot(e.to_string()))?;
        debug!(
            "Captured {} bindings ({} bytes, {} dropped)",
            document.bindings.len(),
            bytes.len(),
            dropped.len()
        );

        Ok(Capture {
            snapshot: Snapshot::from_bytes(bytes),
            dropped,
        })
    }

    /// Decode a snapshot and replace the namespace with it.
    ///
    /// The namespace is only touched once the whole snapshot has decoded.
    pub fn restore_bindings(&mut self, snapshot: &Snapshot) -> ScriptResult<()> {
        let document: SnapshotDocument = serde_json::from_slice(snapshot.as_bytes())
            .map_err(|e| ScriptError::Snapshot(e.to_string()))?;
        if document.format != SNAPSHOT_FORMAT {
            return Err(ScriptError::Snapshot(format!(
                "unsupported snapshot format '{}'",
                document.format
            )));
        }

        let bindings: BTreeMap<String, Value> = document
            .bindings
            .into_iter()
            .map(|(name, stored)| (name, stored.restore()))
            .collect();
        debug!("Restored {} bindings", bindings.len());
        self.interpreter.replace_bindings(bindings);
        Ok(())
    }
}

impl Kernel for ScriptKernel {
    type Error = ScriptError;

    fn name(&self) -> &str {
        KERNEL_NAME
    }

    fn execute(&mut self, code: &str) -> ScriptResult<CellOutput> {
        let evaluation = self.interpreter.run(code)?;
        Ok(CellOutput {
            stdout: evaluation.stdout,
            result: evaluation.value.map(|v| v.repr()),
        })
    }

    fn capture(&mut self) -> ScriptResult<Capture> {
        self.capture_bindings()
    }

    fn restore(&mut self, snapshot: &Snapshot) -> ScriptResult<()> {
        self.restore_bindings(snapshot)
    }

    fn check(&self, code: &str) -> ScriptResult<()> {
        parse(code).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_restore_round_trip() {
        let mut kernel = ScriptKernel::new();
        kernel
            .execute("a = 3; b = [1, 'two', [3.5, nil], true]; c = 0.1 + 0.2")
            .unwrap();
        let capture = kernel.capture().unwrap();
        assert!(!capture.is_degraded());

        let mut fresh = ScriptKernel::new();
        fresh.restore(&capture.snapshot).unwrap();
        assert_eq!(fresh.interpreter().bindings(), kernel.interpreter().bindings());
        assert_eq!(
            fresh.execute("c").unwrap().result,
            kernel.execute("c").unwrap().result
        );
    }

    #[test]
    fn test_handles_are_dropped() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "x").unwrap();

        let mut kernel = ScriptKernel::new();
        kernel
            .interpreter_mut()
            .set("path", Value::Str(path.to_string_lossy().into_owned()));
        kernel
            .execute("f = open(path); it = iter([1]); nested = [iter([])]; bad = [1 / 0.5, float('inf')]; ok = 1")
            .unwrap();

        let capture = kernel.capture().unwrap();
        let dropped: Vec<&str> = capture.dropped.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(dropped, vec!["bad", "f", "it", "nested"]);
        assert!(capture.dropped[1].reason.starts_with("open file handle"));

        let mut fresh = ScriptKernel::new();
        fresh.restore(&capture.snapshot).unwrap();
        assert_eq!(fresh.interpreter().get("ok"), Some(&Value::Int(1)));
        assert!(fresh.interpreter().get("f").is_none());
    }

    #[test]
    fn test_failed_restore_leaves_session() {
        let mut kernel = ScriptKernel::new();
        kernel.execute("x = 1").unwrap();

        let corrupt = Snapshot::from_bytes(b"{\"format\": \"cellar-script/1\", \"bindings\": {\"y\": ".to_vec());
        assert!(kernel.restore(&corrupt).is_err());

        let wrong_format =
            Snapshot::from_bytes(br#"{"format": "other/9", "bindings": {}}"#.to_vec());
        assert!(kernel.restore(&wrong_format).is_err());

        assert_eq!(kernel.interpreter().get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_restore_replaces_namespace() {
        let mut source = ScriptKernel::new();
        source.execute("a = 1").unwrap();
        let snapshot = source.capture().unwrap().snapshot;

        let mut kernel = ScriptKernel::new();
        kernel.execute("stale = 2").unwrap();
        kernel.restore(&snapshot).unwrap();
        assert!(kernel.interpreter().get("stale").is_none());
        assert_eq!(kernel.interpreter().get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_check_does_not_execute() {
        let kernel = ScriptKernel::new();
        assert!(kernel.check("x = 1 +").is_err());
        assert!(kernel.check("print(undefined_name)").is_ok());
        assert!(kernel.interpreter().bindings().is_empty());
    }

    #[test]
    fn test_execute_output() {
        let mut kernel = ScriptKernel::new();
        let output = kernel.execute("print('hi')\n'x'").unwrap();
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(output.result.as_deref(), Some("'x'"));
        assert_eq!(kernel.name(), "cellar-script");
    }
}
