// EdpSim: Quantum Network Entanglement Distribution Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module for defining events and the slot-keyed event queue.
//!
//! The simulator is single-threaded and cooperative: the controller pops one event at a time and
//! dispatches on its kind. Events within the same slot fire in insertion order (a monotonic
//! sequence number breaks ties), which pins down the per-slot routine chain
//! `GenEps -> HandleRequests -> ManageLinks` and makes the whole simulation deterministic for a
//! fixed seed.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::types::{OpId, Time};

/// Event to handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Periodic routine: serve queued link-generation demands.
    GenEps,
    /// Periodic routine: advance every request by its ready operations.
    HandleRequests,
    /// Periodic routine: promote staged pairs, decohere, and scan for PSW candidates.
    ManageLinks,
    /// Delayed completion of a successful swap. The fidelity and span of the product were fixed
    /// when the inputs were consumed.
    SwapSucceeded {
        /// The swap operation that consumed its inputs.
        op: OpId,
        /// Fidelity of the produced pair.
        fidelity: f64,
        /// Physical span of the produced pair in meters.
        length: f64,
    },
    /// Delayed outcome of a purification round; success is drawn when the event fires.
    PurifyOutcome {
        /// The purify operation whose sacrifice was consumed.
        op: OpId,
        /// Fidelity of the target should the round succeed.
        new_fidelity: f64,
        /// Probability that the round succeeds.
        success_prob: f64,
    },
}

impl Event {
    /// Returns true if the event is one of the three periodic routines.
    pub fn is_routine(&self) -> bool {
        matches!(self, Event::GenEps | Event::HandleRequests | Event::ManageLinks)
    }

    /// Return the operation this event completes, if any.
    pub fn op(&self) -> Option<OpId> {
        match self {
            Event::SwapSucceeded { op, .. } | Event::PurifyOutcome { op, .. } => Some(*op),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct QueueEntry {
    time: Time,
    seq: u64,
    event: Event,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Deterministic event queue keyed by time slot.
///
/// A min-heap of `(slot, seq, event)`; `seq` increases monotonically with every push and provides
/// a stable FIFO tie-break within a slot. Events scheduled at or after the simulation end `te`
/// are discarded on push.
#[derive(Debug)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    seq: u64,
    tc: Time,
    ts: Time,
    te: Time,
}

impl EventQueue {
    /// Create a new empty event queue spanning `[ts, te)`.
    pub fn new(ts: Time, te: Time) -> Self {
        Self { heap: BinaryHeap::new(), seq: 0, tc: ts, ts, te }
    }

    /// Enqueue an event at time `t`. Events at or past the simulation end are silently dropped.
    pub fn push(&mut self, t: Time, event: Event) {
        if t >= self.te {
            log::trace!("dropping {event:?} scheduled at {t} past the simulation end {}", self.te);
            return;
        }
        let entry = QueueEntry { time: t, seq: self.seq, event };
        self.seq += 1;
        self.heap.push(Reverse(entry));
    }

    /// Pop the next event, advancing the current time to its slot.
    pub fn pop(&mut self) -> Option<(Time, Event)> {
        let Reverse(entry) = self.heap.pop()?;
        self.tc = entry.time;
        Some((entry.time, entry.event))
    }

    /// Peek the next event without advancing time.
    pub fn peek(&self) -> Option<(Time, &Event)> {
        self.heap.peek().map(|Reverse(e)| (e.time, &e.event))
    }

    /// Get the number of enqueued events
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Return `True` if no event is enqueued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove all events from the queue.
    pub fn clear(&mut self) {
        self.heap.clear()
    }

    /// The current time: the slot of the most recently popped event.
    pub fn tc(&self) -> Time {
        self.tc
    }

    /// The simulation start time.
    pub fn ts(&self) -> Time {
        self.ts
    }

    /// The simulation end time (exclusive).
    pub fn te(&self) -> Time {
        self.te
    }
}
