//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)
//!
//! Logs go to stderr, so stdout stays parseable in JSON mode.

use anyhow::Result;
use optimist_core::{NetworkStatus, SyncOutcome, Synced, Widget};
use serde_json::{json, Value};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print the widget list
    pub fn print_widgets(&self, widgets: &[Synced<Widget>]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if widgets.is_empty() {
                    println!("No widgets found.");
                    return Ok(());
                }
                for widget in widgets {
                    println!("{}", widget_line(widget));
                }
                println!("\n{} widget(s)", widgets.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(widgets)?);
            }
            OutputFormat::Quiet => {
                for widget in widgets {
                    println!("{}", display_id(&widget.data));
                }
            }
        }
        Ok(())
    }

    /// Print one live status change (human mode only)
    pub fn status_change(&self, widget: &Synced<Widget>) {
        if self.format == OutputFormat::Human {
            println!("  {}", widget_line(widget));
        }
    }

    /// Print that a widget left the list (human mode only)
    pub fn removed(&self, widget: &Synced<Widget>) {
        if self.format == OutputFormat::Human {
            println!(
                "  - {} removed ({})",
                widget.data.description,
                widget.clientside_id()
            );
        }
    }

    /// Print how a batch of operations ended, followed by the widget list
    ///
    /// JSON mode emits both as one document.
    pub fn print_result(
        &self,
        outcomes: &[SyncOutcome],
        widgets: &[Synced<Widget>],
    ) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                let failed = outcomes.iter().filter(|o| !o.is_synced()).count();
                let attempts: u32 = outcomes.iter().map(|o| o.attempts).sum();
                println!();
                if failed == 0 {
                    println!(
                        "✓ {} operation(s) synced ({} attempt(s))",
                        outcomes.len(),
                        attempts
                    );
                } else {
                    println!(
                        "✗ {} of {} operation(s) failed ({} attempt(s))",
                        failed,
                        outcomes.len(),
                        attempts
                    );
                }
                println!();
                self.print_widgets(widgets)?;
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result_json(outcomes, widgets))?
                );
            }
            OutputFormat::Quiet => self.print_widgets(widgets)?,
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn result_json(outcomes: &[SyncOutcome], widgets: &[Synced<Widget>]) -> Value {
    let outcomes: Vec<Value> = outcomes
        .iter()
        .map(|o| {
            json!({
                "status": o.status,
                "attempts": o.attempts,
                "clientside_ids": o.clientside_ids,
            })
        })
        .collect();
    json!({ "outcomes": outcomes, "widgets": widgets })
}

/// Glyph for a status, so in-flight and failed rows stand out
fn status_glyph(status: NetworkStatus) -> &'static str {
    match status {
        NetworkStatus::Synced => "✓",
        NetworkStatus::SentRequest => "…",
        NetworkStatus::GotError | NetworkStatus::SentRetry => "⚠",
        NetworkStatus::Failed => "✗",
    }
}

fn display_id(widget: &Widget) -> String {
    widget
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn widget_line(widget: &Synced<Widget>) -> String {
    format!(
        "{} {:<12} {:>5} | {:<3} | {} ({})",
        status_glyph(widget.status()),
        widget.status(),
        display_id(&widget.data),
        if widget.data.active { "on" } else { "off" },
        truncate(&widget.data.description, 40),
        widget.clientside_id()
    )
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimist_core::{ClientsideId, SyncMeta};

    fn synced(widget: Widget, status: NetworkStatus) -> Synced<Widget> {
        Synced {
            data: widget,
            meta: SyncMeta {
                clientside_id: ClientsideId::from("0a1b2c3d"),
                network_status: status,
            },
        }
    }

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_widget_line() {
        let line = widget_line(&synced(
            Widget::with_id(3, "widget 3", true),
            NetworkStatus::SentRetry,
        ));
        assert!(line.starts_with("⚠ sent-retry"));
        assert!(line.contains("    3 | on "));
        assert!(line.ends_with("widget 3 (0a1b2c3d)"));
    }

    #[test]
    fn test_result_is_one_json_document() {
        let widgets = vec![synced(
            Widget::with_id(1, "widget 1", false),
            NetworkStatus::Failed,
        )];
        let outcomes = vec![SyncOutcome {
            status: NetworkStatus::Failed,
            attempts: 3,
            clientside_ids: vec![ClientsideId::from("0a1b2c3d")],
        }];

        let value = result_json(&outcomes, &widgets);
        let text = serde_json::to_string_pretty(&value).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed["outcomes"][0]["status"], "failed");
        assert_eq!(parsed["outcomes"][0]["attempts"], 3);
        assert_eq!(parsed["outcomes"][0]["clientside_ids"][0], "0a1b2c3d");
        assert_eq!(parsed["widgets"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_pending_creation_has_no_id() {
        let line = widget_line(&synced(
            Widget::new("new one", false),
            NetworkStatus::SentRequest,
        ));
        assert!(line.contains("    - | off"));
    }
}
