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

use pretty_assertions::assert_eq;

use crate::event::{Event, EventQueue};
use crate::types::{OpId, Time};

fn t(slots: u64) -> Time {
    Time::from_slots(slots)
}

#[test]
fn pops_in_time_order() {
    let mut q = EventQueue::new(Time::ZERO, t(100));
    q.push(t(5), Event::GenEps);
    q.push(t(1), Event::ManageLinks);
    q.push(t(3), Event::HandleRequests);
    assert_eq!(q.pop(), Some((t(1), Event::ManageLinks)));
    assert_eq!(q.pop(), Some((t(3), Event::HandleRequests)));
    assert_eq!(q.pop(), Some((t(5), Event::GenEps)));
    assert_eq!(q.tc(), t(5));
    assert_eq!(q.pop(), None);
}

#[test]
fn same_slot_is_fifo() {
    let mut q = EventQueue::new(Time::ZERO, t(100));
    let first = Event::SwapSucceeded { op: OpId(0), fidelity: 0.9, length: 1_000.0 };
    let second = Event::GenEps;
    let third = Event::PurifyOutcome { op: OpId(1), new_fidelity: 0.95, success_prob: 0.8 };
    q.push(t(2), first.clone());
    q.push(t(2), second.clone());
    q.push(t(2), third.clone());
    assert_eq!(q.pop(), Some((t(2), first)));
    assert_eq!(q.pop(), Some((t(2), second)));
    assert_eq!(q.pop(), Some((t(2), third)));
}

#[test]
fn drops_events_at_or_past_the_end() {
    let mut q = EventQueue::new(Time::ZERO, t(10));
    q.push(t(10), Event::GenEps);
    assert!(q.is_empty());
    q.push(t(11), Event::GenEps);
    assert!(q.is_empty());
    q.push(t(9), Event::GenEps);
    assert_eq!(q.len(), 1);
}

#[test]
fn clear_empties_the_queue() {
    let mut q = EventQueue::new(Time::ZERO, t(10));
    q.push(t(1), Event::GenEps);
    q.push(t(2), Event::HandleRequests);
    assert_eq!(q.len(), 2);
    q.clear();
    assert!(q.is_empty());
    assert_eq!(q.pop(), None);
}

#[test]
fn routine_classification() {
    assert!(Event::GenEps.is_routine());
    assert!(Event::HandleRequests.is_routine());
    assert!(Event::ManageLinks.is_routine());
    let done = Event::SwapSucceeded { op: OpId(3), fidelity: 0.9, length: 1.0 };
    assert!(!done.is_routine());
    assert_eq!(done.op(), Some(OpId(3)));
    assert_eq!(Event::GenEps.op(), None);
}
