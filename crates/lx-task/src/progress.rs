//! Progress bar handle.
//!
//! One bar per phase, shared by every worker. Diagnostics go through
//! [`Progress::println`] so compiler output never tears the bar apart
//! mid-redraw.

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;

pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    enabled: bool,
}

impl Progress {
    /// A progress handle that draws to stderr.
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            enabled: true,
        }
    }

    /// A silent handle, for tests and `--verbose` runs.
    pub fn disabled() -> Self {
        Self {
            bar: Mutex::new(None),
            enabled: false,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:>20} [{bar:40}] {pos}/{len}")
            .expect("valid progress template")
            .progress_chars("=> ")
    }

    /// Begin a named phase with a known task count.
    pub fn start_task(&self, name: &str, total: u64) {
        if !self.enabled {
            return;
        }
        let bar = ProgressBar::new(total).with_style(Self::style());
        bar.set_prefix(name.to_string());
        *self.bar.lock() = Some(bar);
    }

    /// Grow the phase: the scanner discovers headers mid-flight.
    pub fn add_total(&self, amount: u64) {
        if let Some(bar) = self.bar.lock().as_ref() {
            bar.inc_length(amount);
        }
    }

    pub fn step(&self) {
        if let Some(bar) = self.bar.lock().as_ref() {
            bar.inc(1);
        }
    }

    pub fn finish_task(&self) {
        if let Some(bar) = self.bar.lock().take() {
            bar.finish_and_clear();
        }
    }

    /// Print a line above the bar (or straight to stderr when no phase is
    /// active).
    pub fn println(&self, message: &str) {
        match self.bar.lock().as_ref() {
            // A hidden bar (stderr is not a terminal) swallows println.
            Some(bar) if !bar.is_hidden() => bar.println(message),
            _ => eprintln!("{message}"),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}
