//! Footer text cell appended after a run.

use std::time::Duration;

use chrono::{DateTime, Local};

/// Marker identifying a footer cell, invisible when rendered as markdown.
pub const FOOTER_TAG: &str = "[//]: # (cellar_footer_tag)";

/// Facts about a run, rendered as the closing text cell.
#[derive(Debug, Clone)]
pub struct Footer {
    /// Notebook name as given on the command line
    pub notebook: String,
    /// When execution started
    pub started: DateTime<Local>,
    /// How long execution took
    pub duration: Duration,
    /// Full command line
    pub command_line: Vec<String>,
}

impl Footer {
    /// Render the footer as markdown.
    pub fn render(&self) -> String {
        format!(
            "---\n\
             * **Notebook**: {}\n\
             * **Execution time**: {}\n\
             * **Execution duration**: {:.2}s\n\
             * **Command line**: `{}`\n\n\
             {}",
            self.notebook,
            self.started.format("%Y-%m-%d %H:%M:%S %:z"),
            self.duration.as_secs_f64(),
            self.command_line.join(" "),
            FOOTER_TAG
        )
    }
}

/// Whether a text cell is a footer.
pub fn is_footer(content: &str) -> bool {
    content.contains(FOOTER_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let footer = Footer {
            notebook: "sum.cellar".to_string(),
            started: Local::now(),
            duration: Duration::from_millis(1500),
            command_line: vec!["cellar".to_string(), "run".to_string()],
        };
        let text = footer.render();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("* **Notebook**: sum.cellar\n"));
        assert!(text.contains("1.50s"));
        assert!(text.contains("`cellar run`"));
        assert!(is_footer(&text));
        assert!(!is_footer("# Title"));
    }
}
