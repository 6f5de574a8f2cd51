//! # kairos-telemetry
//!
//! Event bus for time-marching telemetry. Emits structured events
//! (step attempts, accepted steps, nonlinear convergence, timing) that
//! are consumed by pluggable sinks (in-memory log, `tracing`, ...).

pub mod bus;
pub mod events;
pub mod sinks;

pub use bus::EventBus;
pub use events::{EventKind, SimulationEvent};
pub use sinks::{EventLog, EventSink, TracingSink, VecSink};
