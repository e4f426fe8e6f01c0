//! Bounded progress channel from the orchestrator to external observers.
//!
//! The channel holds `buffer + 2` messages. Updates are only sent while fewer
//! than `buffer` messages are queued; the two extra slots are kept for the
//! final data flush and the terminal message, so `finish` never blocks.
//! When the queue is full, counter-only updates are dropped and updates that
//! carry entities or edges are merged into the next send.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifacts::EdgeRecord;
use crate::model::RunStatus;

const RESERVED_SLOTS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub entities_added: Vec<String>,
    pub edges_added: Vec<EdgeRecord>,
    pub files_processed: usize,
    pub files_total: usize,
}

impl BatchUpdate {
    pub fn counters(files_processed: usize, files_total: usize) -> Self {
        Self {
            files_processed,
            files_total,
            ..Self::default()
        }
    }

    pub fn carries_data(&self) -> bool {
        !self.entities_added.is_empty() || !self.edges_added.is_empty()
    }

    /// Fold a later update into this one.
    fn absorb(&mut self, later: BatchUpdate) {
        self.entities_added.extend(later.entities_added);
        self.edges_added.extend(later.edges_added);
        self.files_processed = later.files_processed;
        self.files_total = later.files_total;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMessage {
    Batch(BatchUpdate),
    Finished { status: RunStatus },
}

/// Producer side of one subscription.
pub struct ProgressPublisher {
    sender: Sender<ProgressMessage>,
    buffer: usize,
    pending: Option<BatchUpdate>,
    dropped: usize,
    finished: bool,
}

/// A publisher and the receiver handed to the subscriber.
pub fn channel(buffer: usize) -> (ProgressPublisher, Receiver<ProgressMessage>) {
    let buffer = buffer.max(1);
    let (sender, receiver) = bounded(buffer + RESERVED_SLOTS);
    (
        ProgressPublisher {
            sender,
            buffer,
            pending: None,
            dropped: 0,
            finished: false,
        },
        receiver,
    )
}

impl ProgressPublisher {
    fn has_room(&self) -> bool {
        self.sender.len() < self.buffer
    }

    fn send(&self, message: ProgressMessage) {
        match self.sender.try_send(message) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            // unreachable while the reserved slots are honoured
            Err(TrySendError::Full(_)) => debug!("progress channel unexpectedly full"),
        }
    }

    pub fn publish(&mut self, update: BatchUpdate) {
        if self.finished {
            return;
        }
        let update = match self.pending.take() {
            Some(mut pending) => {
                pending.absorb(update);
                pending
            }
            None => update,
        };
        if self.has_room() {
            self.send(ProgressMessage::Batch(update));
        } else if update.carries_data() {
            self.pending = Some(update);
        } else {
            self.dropped += 1;
        }
    }

    /// Flush any coalesced data and send the terminal message.
    pub fn finish(&mut self, status: RunStatus) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(pending) = self.pending.take() {
            self.send(ProgressMessage::Batch(pending));
        }
        self.send(ProgressMessage::Finished { status });
        if self.dropped > 0 {
            debug!("dropped {} progress updates for a slow consumer", self.dropped);
        }
    }

    /// Counter-only updates dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
