//! Output control module with structured logging
//!
//! Everything here is written to standard error: standard output may be
//! carrying the squashed archive.

use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct OutputManager {
    pub verbose: bool,
    quiet: bool,
    start_time: Option<Instant>,
}

impl OutputManager {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Some(Instant::now()),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            start_time: Some(Instant::now()),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    // Structured logging levels
    pub fn debug(&self, message: &str) {
        if self.verbose {
            self.print_with_timestamp("DEBUG", message, "🐛");
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.print_with_timestamp("INFO", message, "ℹ️");
        }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.print_with_timestamp("SUCCESS", message, "✅");
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            self.print_with_timestamp("WARN", message, "⚠️");
        }
    }

    pub fn error(&self, message: &str) {
        self.print_with_timestamp("ERROR", message, "❌");
    }

    // Section headers
    pub fn section(&self, title: &str) {
        if self.quiet {
            return;
        }

        if self.verbose {
            let separator = "━".repeat(60);
            eprintln!("\n{}", separator);
            eprintln!("📋 {}", title);
            eprintln!("{}", separator);
        } else {
            eprintln!("\n📋 {}", title);
        }
    }

    pub fn subsection(&self, title: &str) {
        if self.verbose {
            eprintln!("  📂 {}", title);
        }
    }

    pub fn step(&self, step: &str) {
        if self.verbose {
            eprintln!("    🔸 {}", step);
        }
    }

    pub fn detail(&self, detail: &str) {
        if self.verbose {
            eprintln!("      📝 {}", detail);
        }
    }

    // Helper methods
    fn print_with_timestamp(&self, level: &str, message: &str, emoji: &str) {
        let timestamp = if let Some(start_time) = self.start_time {
            format!("[{:8.3}s]", start_time.elapsed().as_secs_f64())
        } else {
            String::new()
        };

        if self.verbose {
            eprintln!("{} {} {} {}", timestamp, emoji, level, message);
        } else {
            eprintln!("{} {}", emoji, message);
        }
    }

    pub fn format_size(&self, size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }

    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m{:02}s", secs / 60, secs % 60)
        } else {
            format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }

    // Summary and statistics
    pub fn summary(&self, title: &str, items: &[(&str, String)]) {
        if self.quiet {
            return;
        }

        eprintln!("\n📊 {}", title);
        for (key, value) in items {
            eprintln!("  • {}: {}", key, value);
        }
    }

    pub fn elapsed_time(&self) -> String {
        if let Some(start_time) = self.start_time {
            self.format_duration(start_time.elapsed())
        } else {
            "Unknown".to_string()
        }
    }
}
