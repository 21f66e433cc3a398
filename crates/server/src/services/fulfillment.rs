//! Fulfillment sinks.
//!
//! A committed purchase is handed to exactly one [`FulfillmentSink`]. Two
//! delivery strategies exist and a deployment picks one at startup:
//!
//! - [`PollQueue`] - FIFO queue polled by the dispenser (`peek` then `ack`).
//!   A command stays at the head until acknowledged, so a crashed dispenser
//!   sees it again on its next poll.
//! - [`Broadcaster`] - pushes each command to the observers connected at
//!   that moment. No backlog and no replay.
//!
//! Neither sink ever blocks or fails on dispatch.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use rewards_core::PurchaseCommand;

use crate::config::FulfillmentMode;

/// Destination for committed purchase commands.
pub trait FulfillmentSink: Send + Sync {
    /// Hand off a command. Must not block and cannot fail.
    fn dispatch(&self, command: PurchaseCommand);
}

/// Ack on an empty queue. An expected steady-state condition for a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue empty")]
pub struct QueueEmpty;

// =============================================================================
// Poll/ack queue
// =============================================================================

/// Process-scoped FIFO of pending purchase commands.
#[derive(Debug, Default)]
pub struct PollQueue {
    pending: Mutex<VecDeque<PurchaseCommand>>,
}

impl PollQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<PurchaseCommand>> {
        // Every mutation is a single push/pop, so a poisoned queue is intact.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the tail.
    pub fn enqueue(&self, command: PurchaseCommand) {
        let mut pending = self.pending();
        pending.push_back(command);
        debug!(depth = pending.len(), "command enqueued");
    }

    /// The oldest pending command, without removing it.
    #[must_use]
    pub fn peek_head(&self) -> Option<PurchaseCommand> {
        self.pending().front().cloned()
    }

    /// Remove and return the oldest pending command.
    ///
    /// # Errors
    ///
    /// Returns [`QueueEmpty`] when nothing is pending.
    pub fn ack_head(&self) -> Result<PurchaseCommand, QueueEmpty> {
        self.pending().pop_front().ok_or(QueueEmpty)
    }

    /// Number of pending commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }
}

impl FulfillmentSink for PollQueue {
    fn dispatch(&self, command: PurchaseCommand) {
        self.enqueue(command);
    }
}

// =============================================================================
// Broadcast
// =============================================================================

/// Best-effort fan-out of purchase commands to live observers.
///
/// Each observer has its own bounded buffer; an observer that falls behind
/// loses the oldest messages rather than slowing the sender.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<PurchaseCommand>,
}

impl Broadcaster {
    /// Create a broadcaster with a per-observer buffer of `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Push `command` to every observer connected right now.
    ///
    /// Returns how many observers it was queued for. Zero observers is not
    /// an error; the command is simply dropped.
    pub fn broadcast(&self, command: PurchaseCommand) -> usize {
        let delivered = self.sender.send(command).unwrap_or(0);
        debug!(observers = delivered, "command broadcast");
        delivered
    }

    /// Register a new observer. It sees only commands broadcast after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PurchaseCommand> {
        self.sender.subscribe()
    }

    /// Number of connected observers.
    #[must_use]
    pub fn observers(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl FulfillmentSink for Broadcaster {
    fn dispatch(&self, command: PurchaseCommand) {
        self.broadcast(command);
    }
}

// =============================================================================
// Selection
// =============================================================================

/// The fulfillment strategy chosen for this process.
#[derive(Debug, Clone)]
pub enum Fulfillment {
    /// Dispenser polls `/queue/next` and acknowledges via `/queue/ack`.
    Queue(Arc<PollQueue>),
    /// Observers connect to `/push`.
    Broadcast(Arc<Broadcaster>),
}

impl Fulfillment {
    /// Build the sink for a configured mode.
    #[must_use]
    pub fn from_mode(mode: &FulfillmentMode) -> Self {
        match mode {
            FulfillmentMode::Queue => Self::Queue(Arc::new(PollQueue::new())),
            FulfillmentMode::Broadcast { capacity } => {
                Self::Broadcast(Arc::new(Broadcaster::new(*capacity)))
            }
        }
    }

    /// The active strategy as a sink for the purchase pipeline.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn FulfillmentSink> {
        match self {
            Self::Queue(queue) => Arc::clone(queue) as Arc<dyn FulfillmentSink>,
            Self::Broadcast(broadcaster) => Arc::clone(broadcaster) as Arc<dyn FulfillmentSink>,
        }
    }

    /// The poll queue, when running in queue mode.
    #[must_use]
    pub fn queue(&self) -> Option<&Arc<PollQueue>> {
        match self {
            Self::Queue(queue) => Some(queue),
            Self::Broadcast(_) => None,
        }
    }

    /// The broadcaster, when running in broadcast mode.
    #[must_use]
    pub fn broadcaster(&self) -> Option<&Arc<Broadcaster>> {
        match self {
            Self::Broadcast(broadcaster) => Some(broadcaster),
            Self::Queue(_) => None,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Queue(_) => "queue",
            Self::Broadcast(_) => "broadcast",
        }
    }
}
