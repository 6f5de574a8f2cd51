//! Pluggable event sinks.
//!
//! Sinks consume events from the bus and process them (collect for
//! inspection, log through `tracing`, write to disk, ...).

use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;

use crate::events::SimulationEvent;

/// Trait for event consumers.
///
/// Implement this to create custom telemetry outputs.
pub trait EventSink: Send {
    /// Process a single event.
    fn handle(&mut self, event: &SimulationEvent);

    /// Called when the run ends. Flush buffers, close files, etc.
    fn finalize(&mut self) {}

    /// Returns a human-readable name for this sink.
    fn name(&self) -> &str;
}

/// Shared, cloneable view of the events a [`VecSink`] collected.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<SimulationEvent>>>);

impl EventLog {
    /// Copy of the collected events.
    pub fn snapshot(&self) -> Vec<SimulationEvent> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of collected events.
    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of collected events whose label is `label`.
    pub fn count(&self, label: &str) -> usize {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.label() == label)
            .count()
    }

    fn push(&self, event: SimulationEvent) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// A sink that collects events in memory for testing and inspection.
///
/// The sink is moved into the bus; keep an [`EventLog`] handle from
/// [`VecSink::log`] to read the events afterwards.
#[derive(Debug, Default)]
pub struct VecSink {
    log: EventLog,
}

impl VecSink {
    /// Creates an empty vec sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the collected events.
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

impl EventSink for VecSink {
    fn handle(&mut self, event: &SimulationEvent) {
        self.log.push(event.clone());
    }

    fn name(&self) -> &str {
        "vec_sink"
    }
}

/// A sink that logs events using the `tracing` crate.
pub struct TracingSink {
    level: Level,
}

impl TracingSink {
    /// Creates a new tracing sink at the given log level.
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// The level events are logged at.
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl EventSink for TracingSink {
    fn handle(&mut self, event: &SimulationEvent) {
        // `tracing` needs the level at compile time.
        let (timestep, kind) = (event.timestep, &event.kind);
        if self.level == Level::ERROR {
            tracing::error!(timestep, event = ?kind, "simulation_event");
        } else if self.level == Level::WARN {
            tracing::warn!(timestep, event = ?kind, "simulation_event");
        } else if self.level == Level::INFO {
            tracing::info!(timestep, event = ?kind, "simulation_event");
        } else if self.level == Level::DEBUG {
            tracing::debug!(timestep, event = ?kind, "simulation_event");
        } else {
            tracing::trace!(timestep, event = ?kind, "simulation_event");
        }
    }

    fn name(&self) -> &str {
        "tracing_sink"
    }
}
