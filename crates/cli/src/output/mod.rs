//! Output formatting utilities
//!
//! Formatters for human-readable and JSON output, plus the spinner shown
//! while pages are being fetched.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::PageProgress;

/// Output configuration derived from CLI flags and config defaults
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Use JSON output format
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
    /// Disable the paging spinner
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}

impl OutputConfig {
    /// Whether interactive decorations (spinner, colors) may be drawn
    pub fn decorations_allowed(&self) -> bool {
        !self.json && !self.quiet
    }
}
