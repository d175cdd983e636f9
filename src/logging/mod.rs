//! Logging and output control
//!
//! This module provides the [`Logger`] used by every component of the puller.
//! It supports quiet and verbose output and formats sizes and durations for
//! download reporting. A logger is cheap to clone and is handed to each
//! component at construction; there is no global logger.

use std::time::Duration;

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    // Structured logging levels
    pub fn trace(&self, message: &str) {
        if self.is_verbose() {
            println!("🔍 TRACE: {}", message);
        }
    }

    pub fn debug(&self, message: &str) {
        if self.is_verbose() {
            println!("🐛 DEBUG: {}", message);
        }
    }

    pub fn verbose(&self, message: &str) {
        if self.is_verbose() {
            println!("📝 {}", message);
        }
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.is_verbose() {
            println!("   {}", message);
        }
    }

    /// Information message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("ℹ️  {}", message);
        }
    }

    /// Success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("✅ {}", message);
        }
    }

    /// Warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("⚠️  WARNING: {}", message);
        }
    }

    /// Error message
    pub fn error(&self, message: &str) {
        eprintln!("❌ ERROR: {}", message);
    }

    /// Format file size in human-readable units
    pub fn format_size(&self, bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs == 0 {
            format!("{}ms", duration.as_millis())
        } else if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        let logger = Logger::new_quiet();
        assert_eq!(logger.format_size(512), "512 B");
        assert_eq!(logger.format_size(2048), "2.0 KB");
        assert_eq!(logger.format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(logger.format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_duration() {
        let logger = Logger::new_quiet();
        assert_eq!(logger.format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(logger.format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(logger.format_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(logger.format_duration(Duration::from_secs(3725)), "1h2m5s");
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let mut logger = Logger::new(true);
        assert!(logger.is_verbose());
        logger.quiet = true;
        assert!(!logger.is_verbose());
    }
}
