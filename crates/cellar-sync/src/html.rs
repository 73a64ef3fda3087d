//! Standalone HTML rendering of a notebook run.
//!
//! Text cells are rendered as Markdown; code cells show their source and,
//! when a run report is given, the captured stdout and result.

use cellar_core::{CellKind, CellOutput, Provenance, RunReport};
use pulldown_cmark::{Options, Parser, html};

use crate::notebook::Notebook;

const STYLE: &str = "\
body { font-family: sans-serif; max-width: 60em; margin: 2em auto; padding: 0 1em; }
.cell { margin: 1em 0; }
.code .prompt { color: #303f9f; font-family: monospace; font-size: 0.85em; }
pre { margin: 0.25em 0; padding: 0.5em; overflow-x: auto; }
pre.source { background: #f7f7f7; border: 1px solid #e0e0e0; }
pre.stdout { border-left: 3px solid #9e9e9e; }
pre.result { border-left: 3px solid #303f9f; }
";

/// Renders a notebook, with outputs from a run, as one HTML document.
#[derive(Debug)]
pub struct HtmlGenerator {
    execution_count: u32,
    options: Options,
}

impl HtmlGenerator {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        Self {
            execution_count: 1,
            options,
        }
    }

    /// Render the notebook; code cells get outputs from `report` when given.
    pub fn generate(&mut self, notebook: &Notebook, report: Option<&RunReport>) -> String {
        let mut body = String::new();

        for cell in &notebook.cells {
            match cell.kind {
                CellKind::Text => {
                    body.push_str("<div class=\"cell text\">\n");
                    html::push_html(&mut body, Parser::new_ext(&cell.content, self.options));
                    body.push_str("</div>\n");
                }
                CellKind::Code => {
                    let cell_report = report.and_then(|r| r.cell(cell.index));
                    let output = cell_report.and_then(|r| r.output.as_ref());
                    let provenance = match cell_report.map(|r| r.provenance) {
                        Some(Provenance::Cache) => " data-provenance=\"cache\"",
                        Some(Provenance::Live) => " data-provenance=\"live\"",
                        _ => "",
                    };
                    let prompt = match output {
                        Some(_) => {
                            let count = self.execution_count;
                            self.execution_count += 1;
                            format!("In [{}]:", count)
                        }
                        None => "In [ ]:".to_string(),
                    };

                    body.push_str(&format!(
                        "<div class=\"cell code\"{}>\n<div class=\"prompt\">{}</div>\n",
                        provenance, prompt
                    ));
                    body.push_str(&pre("source", &cell.content));
                    if let Some(output) = output {
                        push_output(&mut body, output);
                    }
                    body.push_str("</div>\n");
                }
            }
        }

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
            escape(&notebook.name),
            STYLE,
            body
        )
    }
}

impl Default for HtmlGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn push_output(body: &mut String, output: &CellOutput) {
    if !output.stdout.is_empty() {
        body.push_str(&pre("stdout", &output.stdout));
    }
    if let Some(result) = &output.result {
        body.push_str(&pre("result", result));
    }
}

fn pre(class: &str, text: &str) -> String {
    format!(
        "<pre class=\"{}\">{}</pre>\n",
        class,
        escape(text.trim_end_matches('\n'))
    )
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
