use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Events shipped to controllers in world-update deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    SimPaused { paused: bool },
    RateChanged { rate: f64 },
    AircraftSpawned { callsign: String },
    AircraftDeleted { callsign: String },
    AircraftLanded { callsign: String },
    HandoffOffered { callsign: String, from: String, to: String },
    HandoffCancelled { callsign: String, by: String },
    PointOut { callsign: String, from: String, to: String },
    DataAcceptance { flight_id: String, facility: String },
    DataRejection { flight_id: String, facility: String },
    WentAround { callsign: String },
    /// The queue overflowed; treat the accompanying snapshot as
    /// authoritative.
    Resync,
}

pub const EVENT_QUEUE_BOUND: usize = 10_000;

/// Bounded per-participant FIFO. Overflow marks the queue dropped; the next
/// drain yields a single resync marker instead of a partial history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQueue {
    events: VecDeque<ServerEvent>,
    dropped: bool,
}

impl EventQueue {
    pub fn post(&mut self, event: ServerEvent) {
        if self.dropped {
            return;
        }
        if self.events.len() >= EVENT_QUEUE_BOUND {
            self.dropped = true;
            self.events.clear();
            return;
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<ServerEvent> {
        if self.dropped {
            self.dropped = false;
            self.events.clear();
            return vec![ServerEvent::Resync];
        }
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q = EventQueue::default();
        q.post(ServerEvent::AircraftSpawned { callsign: "A".into() });
        q.post(ServerEvent::AircraftSpawned { callsign: "B".into() });
        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(&drained[0], ServerEvent::AircraftSpawned { callsign } if callsign == "A"));
    }

    #[test]
    fn test_overflow_resyncs() {
        let mut q = EventQueue::default();
        for _ in 0..=EVENT_QUEUE_BOUND {
            q.post(ServerEvent::Resync);
        }
        let drained = q.drain();
        assert_eq!(drained, vec![ServerEvent::Resync]);
        // Afterwards the queue is usable again.
        q.post(ServerEvent::RateChanged { rate: 2.0 });
        assert_eq!(q.drain().len(), 1);
    }
}
