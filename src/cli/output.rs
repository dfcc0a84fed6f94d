//! Output formatting module for rustible-vmss
//!
//! Provides colored human output plus JSON and YAML documents for scripting.

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use rustible_vmss::modules::{ModuleOutput, ModuleStatus};

use super::OutputFormat;

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// Selected output format
    format: OutputFormat,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration calculations
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, format: OutputFormat, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            format,
            verbosity,
            start_time: Instant::now(),
        }
    }

    fn is_structured(&self) -> bool {
        self.format != OutputFormat::Human
    }

    fn emit_event(&self, kind: &str, message: &str, to_stderr: bool) {
        let event = serde_json::json!({ "type": kind, "message": message });
        let line = serde_json::to_string(&event).unwrap_or_default();
        if to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.is_structured() {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}\n", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}\n", line);
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.is_structured() {
            return;
        }

        if self.use_color {
            println!("\n{}", title.cyan().bold());
            println!("{}", "-".repeat(title.len()).cyan());
        } else {
            println!("\n{}", title);
            println!("{}", "-".repeat(title.len()));
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.is_structured() {
            self.emit_event("error", message, true);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.is_structured() {
            self.emit_event("warning", message, true);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print a hint message
    pub fn hint(&self, message: &str) {
        if self.is_structured() {
            self.emit_event("hint", message, true);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "HINT:".cyan().bold(), message);
        } else {
            eprintln!("HINT: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 || self.is_structured() {
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }

    /// Print a debug message (requires higher verbosity)
    pub fn debug(&self, message: &str) {
        if self.verbosity < 2 || self.is_structured() {
            return;
        }

        if self.use_color {
            println!("{} {}", "DEBUG:".magenta(), message);
        } else {
            println!("DEBUG: {}", message);
        }
    }

    /// Print a unified diff produced by a module, one colored line per change
    pub fn diff(&self, details: &str) {
        if self.is_structured() {
            return;
        }

        println!();
        for line in details.lines() {
            if !self.use_color {
                println!("{}", line);
                continue;
            }
            match line.chars().next() {
                Some('+') => println!("{}", line.green()),
                Some('-') => println!("{}", line.red()),
                _ => println!("{}", line.dimmed()),
            }
        }
        println!();
    }

    /// Print the outcome of a module run
    pub fn module_result(&self, resource: &str, output: &ModuleOutput) {
        if self.is_structured() {
            self.document(output);
            return;
        }

        let status = if self.use_color {
            match output.status {
                ModuleStatus::Ok => "ok".green().to_string(),
                ModuleStatus::Changed => "changed".yellow().to_string(),
            }
        } else {
            output.status.to_string()
        };

        let resource = if self.use_color {
            resource.bright_white().bold().to_string()
        } else {
            resource.to_string()
        };

        println!("{}: [{}] => {}", status, resource, output.msg);

        if let Some(details) = output.diff.as_ref().and_then(|d| d.details.as_deref()) {
            if !details.is_empty() {
                self.diff(details);
            }
        }

        if self.verbosity >= 1 {
            let mut keys: Vec<&String> = output.data.keys().collect();
            keys.sort();
            for key in keys {
                if key == "resource" {
                    continue;
                }
                let value = &output.data[key];
                if self.use_color {
                    println!("    {}: {}", key.bright_black(), value);
                } else {
                    println!("    {}: {}", key, value);
                }
            }
        }

        let elapsed = format_duration(self.start_time.elapsed());
        if self.use_color {
            println!("{} {}", "Finished in".bright_black(), elapsed.bright_white());
        } else {
            println!("Finished in {}", elapsed);
        }
    }

    /// Print a serializable document in the selected format; human output uses YAML
    pub fn document<T: Serialize + ?Sized>(&self, value: &T) {
        let rendered = match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            OutputFormat::Human | OutputFormat::Yaml => {
                serde_yaml::to_string(value).map_err(|e| e.to_string())
            }
        };

        match rendered {
            Ok(text) => println!("{}", text.trim_end()),
            Err(e) => self.error(&format!("Failed to render output: {}", e)),
        }
    }

    /// Flush stdout
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// Format a duration for display
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
