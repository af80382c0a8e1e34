//! Progress reporting for an ingestion run
//!
//! `ConsoleReporter` draws an indicatif spinner on stderr; `SilentReporter`
//! is for tests and `--quiet`.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Run phases shown next to the spinner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetching,
    Ingesting,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Fetching => write!(f, "Fetching planets"),
            Phase::Ingesting => write!(f, "Ingesting"),
            Phase::Complete => write!(f, "Complete"),
        }
    }
}

/// Trait for progress output - allows both a console spinner and silent/test modes
pub trait Reporter {
    fn set_phase(&mut self, phase: Phase);
    fn set_progress(&mut self, processed: u64, label: impl Into<String>);
    fn log(&mut self, message: impl Into<String>);
}

pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {prefix:.bold} [{pos}] {wide_msg}")
        {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn set_phase(&mut self, phase: Phase) {
        if phase == Phase::Complete {
            self.bar.finish_and_clear();
        } else {
            self.bar.set_prefix(phase.to_string());
        }
    }

    fn set_progress(&mut self, processed: u64, label: impl Into<String>) {
        self.bar.set_position(processed);
        self.bar.set_message(label.into());
    }

    fn log(&mut self, message: impl Into<String>) {
        self.bar.println(message.into());
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[derive(Default)]
pub struct SilentReporter;

impl SilentReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for SilentReporter {
    fn set_phase(&mut self, _phase: Phase) {}
    fn set_progress(&mut self, _processed: u64, _label: impl Into<String>) {}
    fn log(&mut self, _message: impl Into<String>) {}
}
