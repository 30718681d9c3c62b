use std::sync::{Arc, Mutex};
use tokio::{sync::oneshot, task};

use super::emitter::{BusEmitter, EmitterError};
use super::event::Event;
use super::sink::{ChannelSink, EventSink, StdOutSink};

/// EventBus receives run lifecycle events and broadcasts them to sinks.
///
/// Delivery is at-least-once to every sink registered at publish time; a
/// sink added after an event was published never sees it. One bus instance
/// is safe to share across concurrent, unrelated runs.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    /// Create an EventBus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self {
            sinks: Arc::new(Mutex::new(vec![Box::new(sink)])),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Create an EventBus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (useful for per-run streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().unwrap().push(Box::new(sink));
    }

    /// Publish a single event to the bus.
    pub fn publish(&self, event: Event) -> Result<(), EmitterError> {
        self.event_channel
            .0
            .send(event)
            .map_err(|_| EmitterError::Closed)
    }

    /// Get a cloneable emitter handle so producers can emit events.
    pub fn emitter(&self) -> BusEmitter {
        BusEmitter {
            sender: self.event_channel.0.clone(),
        }
    }

    /// Subscribe to all events published from this point on.
    ///
    /// Registers a channel sink and returns its receiving half. Late
    /// subscribers only observe events published after subscription.
    pub fn subscribe(&self) -> flume::Receiver<Event> {
        let (tx, rx) = flume::unbounded();
        self.add_sink(ChannelSink::new(tx));
        rx
    }

    /// Async-stream flavor of [`subscribe`](Self::subscribe), for consumers
    /// driving events with stream combinators.
    pub fn subscribe_stream(&self) -> impl futures_util::Stream<Item = Event> {
        self.subscribe().into_stream()
    }

    /// Spawn a background task that listens for events and broadcasts to
    /// all sinks. Idempotent: calling multiple times has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return; // Already listening
        }

        let receiver_clone = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver_clone.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks_guard = sinks.lock().unwrap();
                            for sink in sinks_guard.iter_mut() {
                                if let Err(e) = sink.handle(&event) {
                                    tracing::warn!(error = %e, "event sink error");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener task, draining nothing further.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::event::RunEvent;
    use crate::event_bus::sink::MemorySink;
    use std::time::Duration;

    fn sample(run_id: &str) -> Event {
        Event::new(RunEvent::RunStarted {
            run_id: run_id.to_string(),
            graph_id: "g".to_string(),
        })
    }

    #[tokio::test]
    /// Published events fan out to every registered sink.
    async fn test_fanout_to_sinks() {
        let sink = MemorySink::new();
        let bus = EventBus::with_sink(sink.clone());
        bus.listen_for_events();

        bus.publish(sample("run-1")).unwrap();
        bus.publish(sample("run-2")).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.stop_listener().await;

        let seen = sink.snapshot();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].run_id(), "run-1");
        assert_eq!(seen[1].run_id(), "run-2");
    }

    #[tokio::test]
    /// Subscribers registered after an event was published never see it.
    async fn test_late_subscriber() {
        let bus = EventBus::with_sinks(vec![]);
        bus.listen_for_events();

        bus.publish(sample("early")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let rx = bus.subscribe();
        bus.publish(sample("late")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.stop_listener().await;

        let seen: Vec<_> = rx.drain().collect();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].run_id(), "late");
    }

    #[tokio::test]
    /// The stream flavor of subscribe yields events in publish order.
    async fn test_subscribe_stream() {
        use futures_util::StreamExt;

        let bus = EventBus::with_sinks(vec![]);
        bus.listen_for_events();
        let mut stream = bus.subscribe_stream();

        bus.publish(sample("run-1")).unwrap();
        bus.publish(sample("run-2")).unwrap();

        assert_eq!(stream.next().await.unwrap().run_id(), "run-1");
        assert_eq!(stream.next().await.unwrap().run_id(), "run-2");
        bus.stop_listener().await;
    }

    #[tokio::test]
    /// The emitter handle keeps working after the bus reference is cloned
    /// around, and listen_for_events is idempotent.
    async fn test_emitter_handle() {
        use crate::event_bus::emitter::EventEmitter;

        let sink = MemorySink::new();
        let bus = EventBus::with_sink(sink.clone());
        bus.listen_for_events();
        bus.listen_for_events();

        let emitter = bus.emitter();
        emitter.emit(sample("run-1")).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.stop_listener().await;
        assert_eq!(sink.snapshot().len(), 1);
    }
}
