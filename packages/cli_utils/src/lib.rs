#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the catchment toolchain.
//!
//! Provides an `indicatif`-backed [`ProgressCallback`] for isochrone runs,
//! plus [`init_logger`] which sets up `indicatif-log-bridge` so that the
//! task's `log::info!` lines are suspended while the bar redraws.

use std::sync::Arc;
use std::time::Duration;

use catchment_isochrone::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `set_total()` provides a known length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Creates the bar for an isochrone run.
    ///
    /// Starts as a spinner while the task prepares its points and turns
    /// into a percentage bar with ETA once
    /// [`ProgressCallback::set_total()`] is called.
    #[must_use]
    pub fn task_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        Arc::new(Self::styled(bar, message))
    }

    fn styled(bar: ProgressBar, message: &str) -> Self {
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {pos}% [{elapsed_precise}, eta {eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already set when several tests initialize it

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> IndicatifProgress {
        IndicatifProgress::styled(ProgressBar::hidden(), "Fetching")
    }

    #[test]
    fn set_total_resets_position() {
        let progress = hidden();
        progress.set_position(7);
        progress.set_total(100);
        assert_eq!(progress.bar.length(), Some(100));
        assert_eq!(progress.bar.position(), 0);
    }

    #[test]
    fn positions_follow_the_task() {
        let progress = hidden();
        progress.set_total(100);
        progress.set_position(40);
        progress.set_position(60);
        assert_eq!(progress.bar.position(), 60);
        progress.set_position(55);
        assert_eq!(progress.bar.position(), 55);
    }

    #[test]
    fn finish_keeps_the_message() {
        let progress = hidden();
        progress.finish("Done".to_string());
        assert!(progress.bar.is_finished());
        assert_eq!(progress.bar.message(), "Done");
    }

    #[test]
    fn logger_can_be_initialized_twice() {
        let _first = init_logger();
        let _second = init_logger();
    }
}
