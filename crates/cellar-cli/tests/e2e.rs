//! End-to-end tests for cellar CLI commands.
//!
//! These tests run the `cellar` binary against real notebook files, each with
//! its own cache directory.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A notebook file with a private cache directory.
struct TestNotebook {
    temp_dir: TempDir,
    notebook_path: PathBuf,
}

impl TestNotebook {
    fn new(filename: &str, source: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let notebook_path = temp_dir.path().join(filename);
        fs::write(&notebook_path, source).expect("Failed to write notebook");

        Self {
            temp_dir,
            notebook_path,
        }
    }

    fn path(&self) -> &PathBuf {
        &self.notebook_path
    }

    fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn cache_dir(&self) -> PathBuf {
        self.temp_dir.path().join("cache")
    }

    fn cache_entries(&self) -> usize {
        fs::read_dir(self.cache_dir())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().ends_with(".entry"))
                    .count()
            })
            .unwrap_or(0)
    }

    /// `cellar run <notebook> --cache-dir <dir>`, plus extra arguments.
    fn run(&self, extra: &[&str]) -> assert_cmd::assert::Assert {
        cellar()
            .arg("run")
            .arg(self.path())
            .arg("--cache-dir")
            .arg(self.cache_dir())
            .args(extra)
            .assert()
    }
}

fn cellar() -> Command {
    let mut cmd = Command::cargo_bin("cellar").expect("Failed to find cellar binary");
    cmd.env_remove("CELLAR_CACHE_DIR").env_remove("RUST_LOG");
    cmd
}

fn sum_notebook() -> &'static str {
    r#"@param a = 3
@param b = 5
'''
# Sum
'''
a + b
"#
}

// =============================================================================
// Run
// =============================================================================

#[test]
fn test_run_replays_from_cache() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());

    nb.run(&[])
        .success()
        .stdout(predicate::str::contains("8"))
        .stderr(predicate::str::contains("Running"));
    assert_eq!(nb.cache_entries(), 2);

    nb.run(&[])
        .success()
        .stdout(predicate::str::contains("8"))
        .stderr(predicate::str::contains("Cached"))
        .stderr(predicate::str::contains("Running").not());
}

#[test]
fn test_parameter_override_invalidates() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());

    nb.run(&[]).success();
    nb.run(&["--param", "b=6"])
        .success()
        .stdout(predicate::str::contains("9"))
        .stderr(predicate::str::contains("Running"));

    // Entries for both parameter sets stay on disk.
    assert_eq!(nb.cache_entries(), 4);
}

#[test]
fn test_cache_tag_separates_entries() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());

    nb.run(&[]).success();
    nb.run(&["--cache-tag", "v2"])
        .success()
        .stderr(predicate::str::contains("Cached").not());
    assert_eq!(nb.cache_entries(), 4);
}

#[test]
fn test_disable_cache_writes_nothing() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());

    nb.run(&["--disable-cache"])
        .success()
        .stdout(predicate::str::contains("8"));
    assert_eq!(nb.cache_entries(), 0);
}

/// Notebook plus a cache directory nested under a regular file.
fn blocked_cache_dir(nb: &TestNotebook) -> PathBuf {
    let blocker = nb.dir().join("blocker");
    fs::write(&blocker, "not a directory").expect("Failed to write blocker");
    blocker.join("cache")
}

#[test]
fn test_unusable_cache_dir_runs_uncached() {
    let nb = TestNotebook::new("calc.cellar", "x = 3\nx + 5\n");
    let cache_dir = blocked_cache_dir(&nb);

    cellar()
        .arg("run")
        .arg(nb.path())
        .arg("--cache-dir")
        .arg(&cache_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("8"))
        .stderr(predicate::str::contains("running with caching disabled"));
}

#[test]
fn test_disable_cache_never_opens_cache_dir() {
    let nb = TestNotebook::new("calc.cellar", "x = 3\nx + 5\n");
    let cache_dir = blocked_cache_dir(&nb);

    cellar()
        .arg("run")
        .arg(nb.path())
        .arg("--cache-dir")
        .arg(&cache_dir)
        .arg("--disable-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("8"))
        .stderr(predicate::str::contains("Cache directory unavailable").not());
}

#[test]
fn test_ignore_cache_reexecutes() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());

    nb.run(&[]).success();
    nb.run(&["--ignore-cache"])
        .success()
        .stderr(predicate::str::contains("Cached").not());
    assert_eq!(nb.cache_entries(), 2);
}

#[test]
fn test_cache_flags_conflict() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());
    nb.run(&["--disable-cache", "--ignore-cache"]).failure();
}

#[test]
fn test_print_output() {
    let nb = TestNotebook::new(
        "hello.cellar",
        "name = \"world\"\nprint(\"hello\", name)\n",
    );

    nb.run(&[])
        .success()
        .stdout(predicate::str::contains("hello world"));
}

#[test]
fn test_unknown_parameter_fails() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());

    nb.run(&["--param", "zzz=1"])
        .failure()
        .stderr(predicate::str::contains("unknown parameter 'zzz'"));
}

#[test]
fn test_missing_parameter_fails() {
    let nb = TestNotebook::new("need.cellar", "@param n\nn * 2\n");

    nb.run(&[])
        .failure()
        .stderr(predicate::str::contains("required but not found"));
    nb.run(&["--param", "n=21"])
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_cell_error_fails() {
    let nb = TestNotebook::new("broken.cellar", "x = 1\n'''\n'''\nx / 0\n");

    nb.run(&[])
        .failure()
        .stderr(predicate::str::contains("ZeroDivisionError"));
}

#[test]
fn test_check_syntax() {
    let nb = TestNotebook::new("bad.cellar", "x = 1\n'''\n'''\nx = (1 +\n");

    nb.run(&["--check-syntax", "--no-exec"])
        .failure()
        .stderr(predicate::str::contains("Syntax error in cell 1"));

    let good = TestNotebook::new("good.cellar", sum_notebook());
    good.run(&["--check-syntax", "--no-exec"]).success();
    assert_eq!(good.cache_entries(), 0);
}

#[test]
fn test_open_handle_degrades_cache() {
    let nb = TestNotebook::new("data.txt", "");
    let data = nb.dir().join("data.txt");
    fs::write(&data, "payload").expect("Failed to write data");

    let source = format!(
        "x = 1\n'''\n'''\nf = open(\"{}\")\n'''\n'''\nx + 1\n",
        data.display()
    );
    let notebook = nb.dir().join("handle.cellar");
    fs::write(&notebook, source).expect("Failed to write notebook");

    cellar()
        .arg("run")
        .arg(&notebook)
        .arg("--cache-dir")
        .arg(nb.cache_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains("2"))
        .stderr(predicate::str::contains("Caching disabled after cell 1"));

    // Only the cell before the handle was stored.
    assert_eq!(nb.cache_entries(), 1);
}

// =============================================================================
// Export / import
// =============================================================================

#[test]
fn test_export_ipynb_with_footer() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());
    let ipynb = nb.dir().join("sum.ipynb");

    nb.run(&["--export-ipynb", ipynb.to_str().expect("utf-8 path")])
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&ipynb).expect("ipynb written"))
            .expect("valid JSON");
    assert_eq!(json["nbformat"], 4);

    let cells = json["cells"].as_array().expect("cells array");
    // Title, parameters, sum, footer.
    assert_eq!(cells.len(), 4);
    assert_eq!(cells[2]["outputs"][0]["output_type"], "execute_result");
    assert_eq!(cells[2]["metadata"]["cellar"]["provenance"], "live");

    let footer: String = cells[3]["source"]
        .as_array()
        .expect("source lines")
        .iter()
        .filter_map(|l| l.as_str())
        .collect();
    assert!(footer.contains("cellar_footer_tag"));
}

#[test]
fn test_export_ipynb_to_stdout() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());

    let output = cellar()
        .arg("run")
        .arg(nb.path())
        .arg("--cache-dir")
        .arg(nb.cache_dir())
        .args(["--export-ipynb", "-", "--disable-footer"])
        .output()
        .expect("Failed to run cellar");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(json["cells"].as_array().map(Vec::len), Some(3));
}

#[test]
fn test_export_html() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());
    let html_path = nb.dir().join("sum.html");

    nb.run(&["--export-html", html_path.to_str().expect("utf-8 path")])
        .success()
        .stdout(predicate::str::contains("8"));

    let html = fs::read_to_string(&html_path).expect("html written");
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<h1>Sum</h1>"));
    assert!(html.contains("<pre class=\"source\">a + b</pre>"));
    assert!(html.contains("<pre class=\"result\">8</pre>"));
    // The footer renders; its marker line does not.
    assert!(html.contains("<strong>Notebook</strong>"));
    assert!(!html.contains("cellar_footer_tag"));

    nb.run(&["--export-html", "-", "--disable-footer"])
        .success()
        .stdout(predicate::str::contains("data-provenance=\"cache\""))
        .stdout(predicate::str::contains("<strong>Notebook</strong>").not());
}

#[test]
fn test_export_source_requires_no_exec() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());
    nb.run(&["--export-source", "-"]).failure();
}

#[test]
fn test_export_source() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());

    nb.run(&["--no-exec", "--export-source", "-", "--param", "a=10"])
        .success()
        .stdout(predicate::str::contains("'''\n# Sum\n'''"))
        .stdout(predicate::str::contains("# Parameters:\na = 10\nb = 5"));
    assert_eq!(nb.cache_entries(), 0);
}

#[test]
fn test_import_ipynb() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());
    let ipynb = nb.dir().join("sum.ipynb");
    let ipynb_arg = ipynb.to_str().expect("utf-8 path");

    nb.run(&["--no-exec", "--export-ipynb", ipynb_arg, "--param", "b=6"])
        .success();

    cellar()
        .arg("run")
        .args(["--import-ipynb", ipynb_arg])
        .arg("--cache-dir")
        .arg(nb.cache_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains("9"));

    cellar()
        .arg("run")
        .args(["--import-ipynb", ipynb_arg, "--param", "a=1"])
        .arg("--cache-dir")
        .arg(nb.cache_dir())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--param cannot be combined"));
}

// =============================================================================
// Clean
// =============================================================================

#[test]
fn test_clean() {
    let nb = TestNotebook::new("sum.cellar", sum_notebook());
    nb.run(&[]).success();
    assert_eq!(nb.cache_entries(), 2);

    cellar()
        .arg("clean")
        .arg("--cache-dir")
        .arg(nb.cache_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains(" 2 cache entries"));
    assert_eq!(nb.cache_entries(), 0);

    nb.run(&[])
        .success()
        .stderr(predicate::str::contains("Cached").not());
}
