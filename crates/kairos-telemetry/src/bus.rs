//! Event bus with a timestep clock.
//!
//! Producers queue events on a `std::sync::mpsc` channel; the queue is
//! handed to every registered sink on `flush`. The bus also keeps the
//! index of the current advance, so a time-marching loop only calls
//! [`EventBus::record`] for each event and [`EventBus::end_timestep`]
//! once the advance is committed.

use std::sync::mpsc;

use crate::events::{EventKind, SimulationEvent};
use crate::sinks::EventSink;

/// Broadcast event bus for time-marching telemetry.
pub struct EventBus {
    sender: mpsc::Sender<SimulationEvent>,
    receiver: mpsc::Receiver<SimulationEvent>,
    sinks: Vec<Box<dyn EventSink>>,
    enabled: bool,
    /// Index stamped on events queued through `record`.
    timestep: u32,
    emitted: usize,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            sinks: Vec::new(),
            enabled: true,
            timestep: 0,
            emitted: 0,
        }
    }

    /// Registers a sink to receive events.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// A disabled bus drops events silently.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Queue a fully built event. No-op while disabled.
    pub fn emit(&mut self, event: SimulationEvent) {
        if !self.enabled {
            return;
        }
        if self.sender.send(event).is_ok() {
            self.emitted += 1;
        }
    }

    /// Queue `kind` stamped with the current timestep.
    pub fn record(&mut self, kind: EventKind) {
        self.emit(SimulationEvent::new(self.timestep, kind));
    }

    /// Dispatch the events of the finished advance and move the clock on.
    pub fn end_timestep(&mut self) {
        self.flush();
        self.timestep += 1;
    }

    /// Dispatch anything pending and reset the clock for a new run.
    pub fn restart(&mut self) {
        self.flush();
        self.timestep = 0;
    }

    /// Index of the advance currently being recorded.
    pub fn timestep(&self) -> u32 {
        self.timestep
    }

    /// Dispatch all queued events to the registered sinks.
    pub fn flush(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            for sink in &mut self.sinks {
                sink.handle(&event);
            }
        }
    }

    /// Flush, then let every sink finalize.
    pub fn finalize(&mut self) {
        self.flush();
        for sink in &mut self.sinks {
            sink.finalize();
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Names of the registered sinks, in registration order.
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Events accepted by `emit` or `record` since creation.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
