//! Spinner shown while a listing is paging
//!
//! Listings have no known total, so progress is a spinner reporting how
//! many entries and pages have arrived so far.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use super::OutputConfig;

/// Paging spinner
///
/// Hidden in quiet, JSON, or no-progress mode. Draws to stderr so stdout
/// stays clean for piping.
#[derive(Debug)]
pub struct PageProgress {
    bar: Option<ProgressBar>,
    entries: u64,
}

impl PageProgress {
    /// Create a spinner with an initial message
    pub fn new(config: &OutputConfig, message: &str) -> Self {
        let bar = if !config.decorations_allowed() || config.no_progress {
            None
        } else {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(100));
            Some(bar)
        };

        Self { bar, entries: 0 }
    }

    /// Record entries received from the backend
    pub fn add_entries(&mut self, count: usize, pages: usize) {
        self.entries += count as u64;
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} entries, {pages} pages", self.entries));
        }
    }

    /// Entries recorded so far
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Check if the spinner is drawn
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}

impl Drop for PageProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_hidden_when_quiet_or_json() {
        let quiet = OutputConfig {
            quiet: true,
            ..Default::default()
        };
        assert!(!PageProgress::new(&quiet, "listing").is_visible());

        let json = OutputConfig {
            json: true,
            ..Default::default()
        };
        assert!(!PageProgress::new(&json, "listing").is_visible());

        let off = OutputConfig {
            no_progress: true,
            ..Default::default()
        };
        assert!(!PageProgress::new(&off, "listing").is_visible());
    }

    #[test]
    fn test_progress_counts_entries_while_hidden() {
        let config = OutputConfig {
            no_progress: true,
            ..Default::default()
        };
        let mut progress = PageProgress::new(&config, "listing");
        progress.add_entries(3, 1);
        progress.add_entries(2, 2);
        assert_eq!(progress.entries(), 5);
    }

    #[test]
    fn test_progress_visible_by_default() {
        let progress = PageProgress::new(&OutputConfig::default(), "listing");
        assert!(progress.is_visible());
    }
}
