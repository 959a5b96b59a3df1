//! Structured progress reporting.
//!
//! The pipeline emits typed events instead of printing; the CLI decides
//! how to render them (indicatif bars, plain lines, or nothing).

/// What the indexing flows report as they run.
#[derive(Debug, Clone)]
pub enum IndexEvent {
    /// Discovery finished; `total` files will be visited
    ScanFinished { total: usize },
    /// One file re-extracted and written
    FileIndexed { path: String, symbols: usize },
    /// One file skipped because its digest was unchanged
    FileSkipped { path: String },
    /// One file excluded after a read or parse problem
    FileFailed { path: String, reason: String },
    /// Embedding generation started for `total` symbols
    EmbeddingStarted { total: usize },
    /// Embedding generation finished
    EmbeddingFinished,
}

/// Consumer of indexing events.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &IndexEvent);
}

/// Default reporter: drops everything.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _event: &IndexEvent) {}
}

/// Reporter that forwards events over a channel, for consumers that
/// render on a separate thread.
pub struct ChannelReporter {
    sender: crossbeam::channel::Sender<IndexEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, crossbeam::channel::Receiver<IndexEvent>) {
        let (sender, receiver) = crossbeam::channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: &IndexEvent) {
        // A disconnected consumer is not the pipeline's problem
        let _ = self.sender.send(event.clone());
    }
}
