use crate::errors::CoreError;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    Trash,
    Restore,
    Purge,
}

/// Progress report of a running batch. `index` is the position of the path
/// in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    BatchStarted {
        kind: OperationKind,
        total: usize,
    },
    PathStarted {
        index: usize,
        source: PathBuf,
    },
    BytesCopied {
        index: usize,
        copied: u64,
        total: u64,
    },
    PathFinished {
        index: usize,
        source: PathBuf,
        status: &'static str,
    },
    BatchFinished {
        kind: OperationKind,
        succeeded: usize,
        total: usize,
    },
}

/// Cancellation signal plus optional progress sink shared between a batch
/// and its caller.
#[derive(Debug, Clone, Default)]
pub struct OperationChannel {
    cancellation: CancellationToken,
    sender: Option<UnboundedSender<ProgressEvent>>,
}

impl OperationChannel {
    /// Channel with a progress receiver for the caller.
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let channel = Self {
            cancellation: CancellationToken::new(),
            sender: Some(sender),
        };
        (channel, receiver)
    }

    /// Channel without progress reporting.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Observes an existing token, e.g. a child of an application wide one.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with `Cancelled` once cancellation was requested.
    pub(crate) fn checkpoint(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// A dropped receiver only means nobody is watching.
    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
