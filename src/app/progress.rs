// logfacts - app/progress.rs
//
// Progress reporting. The coordinator calls a `ProgressSink` from partition
// worker threads, so sinks must be cheap and thread-safe.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Receives progress of file parses.
pub trait ProgressSink: Send + Sync {
    /// A file's lines are loaded; `total` lines will be processed.
    fn setup(&self, file: &Path, total: u64);

    /// `increment` more lines were processed.
    fn step(&self, file: &Path, increment: u64, message: &str);

    fn completed(&self, file: &Path);

    fn error(&self, file: &Path, message: &str);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn setup(&self, _file: &Path, _total: u64) {}
    fn step(&self, _file: &Path, _increment: u64, _message: &str) {}
    fn completed(&self, _file: &Path) {}
    fn error(&self, _file: &Path, _message: &str) {}
}

/// Reports progress through `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn setup(&self, file: &Path, total: u64) {
        tracing::info!(file = %file.display(), lines = total, "Parse started");
    }

    fn step(&self, file: &Path, increment: u64, message: &str) {
        tracing::debug!(file = %file.display(), increment, "{message}");
    }

    fn completed(&self, file: &Path) {
        tracing::info!(file = %file.display(), "Parse completed");
    }

    fn error(&self, file: &Path, message: &str) {
        tracing::error!(file = %file.display(), error = message, "Parse failed");
    }
}

/// Messages sent by `ChannelProgress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseProgress {
    Setup {
        file: PathBuf,
        total: u64,
    },
    Step {
        file: PathBuf,
        increment: u64,
        message: String,
    },
    Completed {
        file: PathBuf,
    },
    Error {
        file: PathBuf,
        message: String,
    },
}

/// Forwards progress to another thread over an mpsc channel. A dropped
/// receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::Sender<ParseProgress>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::Sender<ParseProgress>) -> Self {
        Self { tx }
    }

    /// A sink and the receiver for its messages.
    pub fn channel() -> (Self, mpsc::Receiver<ParseProgress>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn send(&self, msg: ParseProgress) {
        let _ = self.tx.send(msg);
    }
}

impl ProgressSink for ChannelProgress {
    fn setup(&self, file: &Path, total: u64) {
        self.send(ParseProgress::Setup {
            file: file.to_path_buf(),
            total,
        });
    }

    fn step(&self, file: &Path, increment: u64, message: &str) {
        self.send(ParseProgress::Step {
            file: file.to_path_buf(),
            increment,
            message: message.to_string(),
        });
    }

    fn completed(&self, file: &Path) {
        self.send(ParseProgress::Completed {
            file: file.to_path_buf(),
        });
    }

    fn error(&self, file: &Path, message: &str) {
        self.send(ParseProgress::Error {
            file: file.to_path_buf(),
            message: message.to_string(),
        });
    }
}
