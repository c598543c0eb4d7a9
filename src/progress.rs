//! Row counter shown while a table is being written.
//!
//! With the `progress` feature, [`RowProgress`] drives an `indicatif` spinner
//! showing the number of rows written and the throughput. Without it the same
//! type compiles to nothing, so callers never need their own `cfg` blocks.
#[cfg(feature = "progress")]
use std::time::Duration;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

#[cfg(feature = "progress")]
pub(crate) struct RowProgress {
    bar: ProgressBar,
}

#[cfg(feature = "progress")]
impl RowProgress {
    pub(crate) fn new(table: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan} {msg} {pos} rows | {per_sec} | {elapsed_precise}",
        ) {
            bar.set_style(style);
        }
        bar.set_message(table.to_string());
        bar.enable_steady_tick(Duration::from_millis(200));
        RowProgress { bar }
    }

    #[inline]
    pub(crate) fn inc(&self) {
        self.bar.inc(1);
    }

    pub(crate) fn finish(self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(not(feature = "progress"))]
pub(crate) struct RowProgress;

#[cfg(not(feature = "progress"))]
impl RowProgress {
    pub(crate) fn new(_table: &str) -> Self {
        RowProgress
    }

    #[inline]
    pub(crate) fn inc(&self) {}

    pub(crate) fn finish(self) {}
}
