//! Progress reporting interface.
//!
//! The orchestrator and downloader report status text and percentages
//! through a [`ProgressSink`] injected at construction. The engine never
//! talks to a UI directly; a frontend implements this trait and decides
//! how (and on which thread) to render the calls.

/// Receiver for progress updates during an update run.
///
/// Implementations must be cheap: `set_progress` is invoked from the
/// download loop once per buffer read. If rendering requires marshalling
/// onto another execution context, that is the implementation's job.
pub trait ProgressSink {
    /// Updates the status label (e.g. "Downloading Addon Loader").
    fn set_label(&self, text: &str);

    /// Updates the progress percentage (0..=100).
    fn set_progress(&self, percent: u8);

    /// Signals that the run has reached a terminal state.
    fn set_complete(&self, done: bool);
}

/// Sink that discards all updates.
///
/// Useful for headless operation and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn set_label(&self, _text: &str) {}
    fn set_progress(&self, _percent: u8) {}
    fn set_complete(&self, _done: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_accepts_everything() {
        let sink = NullSink;
        sink.set_label("checking");
        sink.set_progress(0);
        sink.set_progress(100);
        sink.set_complete(true);
    }
}
