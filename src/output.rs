// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use crate::exec::{Outcome, RunOutput};
use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Whether remote output should stream to the terminal as it arrives.
    pub fn streams_output(&self) -> bool {
        self.mode != OutputMode::Json
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            eprintln!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        if let Some(line) = self.render_message("success", message) {
            println!("{line}");
        }
    }

    pub fn warning(&self, message: &str) {
        if let Some(line) = self.render_message("warning", message) {
            eprintln!("{line}");
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        if let Some(line) = self.render_message("error", message) {
            eprintln!("{line}");
        }
    }

    /// Print a list of names, one per line.
    pub fn names(&self, names: &[String]) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                for name in names {
                    println!("{name}");
                }
            }
            OutputMode::Json => {
                let event = JsonEvent {
                    lines: Some(names),
                    ..JsonEvent::new("names")
                };
                print_json(&event);
            }
        }
    }

    /// Report a finished remote command. Lines are printed only when they were
    /// captured and not already streamed.
    pub fn command_result(&self, output: &RunOutput, streamed: bool) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                if !streamed {
                    for line in &output.lines {
                        println!("{line}");
                    }
                }
                match output.outcome {
                    Outcome::TimedOut => self.warning("command timed out"),
                    Outcome::Interrupted => self.warning("stopped waiting for command"),
                    Outcome::Completed | Outcome::Cancelled => {}
                }
                if self.mode == OutputMode::Normal && !output.success() {
                    eprintln!("exit code {}", output.exit_code);
                }
            }
            OutputMode::Json => print_json(&self.command_event(output)),
        }
    }

    fn command_event<'a>(&self, output: &'a RunOutput) -> JsonEvent<'a> {
        JsonEvent {
            exit_code: Some(output.exit_code),
            outcome: Some(outcome_name(output.outcome)),
            lines: Some(output.lines.as_slice()),
            duration_secs: self.duration(),
            ..JsonEvent::new("command")
        }
    }

    fn render_message(&self, event: &str, message: &str) -> Option<String> {
        match self.mode {
            OutputMode::Normal => match event {
                "success" => {
                    let elapsed = self.elapsed_secs();
                    if elapsed > 0.0 {
                        Some(format!("{message} ({:.1}s)", elapsed))
                    } else {
                        Some(message.to_string())
                    }
                }
                "warning" => Some(format!("Warning: {message}")),
                "error" => Some(format!("Error: {message}")),
                _ => Some(message.to_string()),
            },
            OutputMode::Quiet => match event {
                "success" => Some(message.to_string()),
                "error" => Some(format!("Error: {message}")),
                _ => None,
            },
            OutputMode::Json => {
                let event = JsonEvent {
                    message: Some(message),
                    duration_secs: self.duration(),
                    ..JsonEvent::new(event)
                };
                serde_json::to_string(&event).ok()
            }
        }
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }
}

fn outcome_name(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Completed => "completed",
        Outcome::TimedOut => "timed_out",
        Outcome::Interrupted => "interrupted",
        Outcome::Cancelled => "cancelled",
    }
}

fn print_json(event: &JsonEvent<'_>) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lines: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

impl<'a> JsonEvent<'a> {
    fn new(event: &'a str) -> Self {
        Self {
            event,
            message: None,
            exit_code: None,
            outcome: None,
            lines: None,
            duration_secs: None,
        }
    }
}
