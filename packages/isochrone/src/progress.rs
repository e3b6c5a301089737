//! Progress reporting for isochrone runs.
//!
//! The task reports the share of processed points through a
//! [`ProgressCallback`] so the host can render it however it likes
//! (`indicatif` bars in the CLI, nothing in tests).

use std::sync::Arc;

/// Receives progress updates from a running task.
///
/// Implementations must be `Send + Sync`: the task runs on a spawned tokio
/// task and shares the callback through an `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total number of work units.
    fn set_total(&self, total: u64);

    /// Sets the absolute position.
    fn set_position(&self, pos: u64);

    /// Replaces the text shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks progress as complete with a final message.
    fn finish(&self, msg: String);

    /// Marks progress as complete and removes the indicator.
    fn finish_and_clear(&self);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::ProgressCallback;

    /// Records every position it is given.
    #[derive(Default)]
    pub struct RecordingProgress {
        pub total: Mutex<Option<u64>>,
        pub positions: Mutex<Vec<u64>>,
        pub finished: Mutex<Option<String>>,
    }

    impl ProgressCallback for RecordingProgress {
        fn set_total(&self, total: u64) {
            *self.total.lock().unwrap() = Some(total);
        }

        fn set_position(&self, pos: u64) {
            self.positions.lock().unwrap().push(pos);
        }

        fn set_message(&self, _msg: String) {}

        fn finish(&self, msg: String) {
            *self.finished.lock().unwrap() = Some(msg);
        }

        fn finish_and_clear(&self) {
            *self.finished.lock().unwrap() = Some(String::new());
        }
    }
}
