use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};

use super::event::Event;

/// Abstraction over an output target that consumes full Event objects.
pub trait EventSink: Send + Sync {
    /// Handle a structured event. The sink decides how to serialize it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Stdout sink rendering one line per event.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        writeln!(self.handle, "{event}")?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Channel-based sink forwarding events to an async consumer.
///
/// Useful for live dashboards or CLI progress views; the receiver side of
/// the flume channel can be consumed from sync or async code.
pub struct ChannelSink {
    tx: flume::Sender<Event>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::event::RunEvent;

    fn sample_event() -> Event {
        Event::new(RunEvent::RunStarted {
            run_id: "run-1".to_string(),
            graph_id: "g".to_string(),
        })
    }

    #[test]
    /// MemorySink captures events in order and clears on demand.
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.handle(&sample_event()).unwrap();
        sink.handle(&sample_event()).unwrap();
        assert_eq!(sink.snapshot().len(), 2);
        sink.clear();
        assert!(sink.snapshot().is_empty());
    }

    #[test]
    /// ChannelSink forwards events and reports a broken pipe once the
    /// receiver is gone.
    fn test_channel_sink() {
        let (tx, rx) = flume::unbounded();
        let mut sink = ChannelSink::new(tx);
        sink.handle(&sample_event()).unwrap();
        assert_eq!(rx.recv().unwrap().kind(), "run_started");

        drop(rx);
        assert!(sink.handle(&sample_event()).is_err());
    }
}
