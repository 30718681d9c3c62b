use std::fmt;
use thiserror::Error;

use super::event::Event;

/// Abstract event emitter the executor and tools can clone freely.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    /// Emit an event in a synchronous, non-blocking manner.
    fn emit(&self, event: Event) -> Result<(), EmitterError>;
}

/// Errors that can occur when emitting an event.
#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event bus closed")]
    Closed,
    #[error("event emission failed: {0}")]
    Other(String),
}

/// Emitter backed by the bus's internal channel.
#[derive(Clone, Debug)]
pub struct BusEmitter {
    pub(super) sender: flume::Sender<Event>,
}

impl EventEmitter for BusEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitterError> {
        self.sender.send(event).map_err(|_| EmitterError::Closed)
    }
}
