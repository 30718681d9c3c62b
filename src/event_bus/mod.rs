//! Run lifecycle events: publish/subscribe fan-out with pluggable sinks.
//!
//! The executor publishes [`Event`]s describing run progress; observers
//! consume them through [`EventSink`]s registered on an [`EventBus`] or via
//! [`EventBus::subscribe`]. Detailed diagnostics flow here, never through
//! the run's return value.

pub mod bus;
pub mod emitter;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use emitter::{BusEmitter, EmitterError, EventEmitter};
pub use event::{Event, RunEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
