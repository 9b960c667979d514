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

//! Module containing all type definitions

use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) type IndexType = u32;
/// Node Identification (and index into the topology graph)
pub type NodeId = NodeIndex<IndexType>;

/// Quantum channel identification (index into the channel arena).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelId(pub usize);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "qc{}", self.0)
    }
}

impl From<usize> for ChannelId {
    fn from(x: usize) -> Self {
        Self(x)
    }
}

/// Bell-pair identification. Ids are handed out monotonically, so ordering by `EpId` is ordering
/// by creation.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpId(pub u64);

impl std::fmt::Display for EpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

/// Operation identification (index into the operation arena).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpId(pub usize);

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Request identification (index into the request list, including synthetic PSW requests).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequestId(pub usize);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req{}", self.0)
    }
}

/// Simulation time, measured in integer time slots (ticks). The conversion between slots and
/// seconds goes through the simulator `accuracy` (ticks per second), so that the same `Time` can
/// be compared against memory lifetimes and classical-signalling delays given in seconds.
#[derive(
    PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize,
)]
pub struct Time(u64);

impl Time {
    /// The beginning of time.
    pub const ZERO: Time = Time(0);

    /// Create a time from a raw slot count.
    pub fn from_slots(slots: u64) -> Self {
        Self(slots)
    }

    /// Create a time from seconds, rounding to the nearest slot at the given accuracy (ticks per
    /// second).
    pub fn from_sec(sec: f64, accuracy: u64) -> Self {
        Self((sec * accuracy as f64).round() as u64)
    }

    /// The raw slot count.
    pub fn slots(self) -> u64 {
        self.0
    }

    /// This time expressed in seconds at the given accuracy.
    pub fn sec(self, accuracy: u64) -> f64 {
        self.0 as f64 / accuracy as f64
    }

    /// The number of slots from `earlier` to `self`, saturating at zero.
    pub fn since(self, earlier: Time) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::ops::Add<u64> for Time {
    type Output = Time;

    fn add(self, slots: u64) -> Time {
        Time(self.0 + slots)
    }
}

impl std::ops::AddAssign<u64> for Time {
    fn add_assign(&mut self, slots: u64) {
        self.0 += slots;
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl From<u64> for Time {
    fn from(x: u64) -> Self {
        Self(x)
    }
}

/// Simulation error
#[derive(Error, Debug)]
pub enum SimError {
    /// Node is not present in the topology
    #[error("Node was not found in topology: {0:?}")]
    NodeNotFound(NodeId),
    /// Node name is not present in the topology
    #[error("Node name was not found in topology: {0}")]
    NodeNameNotFound(String),
    /// No quantum channel connects the two nodes
    #[error("Channel does not exist: {0:?} -- {1:?}")]
    ChannelNotFound(NodeId, NodeId),
    /// The routing query found no path between the two nodes
    #[error("No route from {0:?} to {1:?}")]
    NoRoute(NodeId, NodeId),
    /// Operation id does not resolve in the arena
    #[error("Operation was not found: {0}")]
    OpNotFound(OpId),
    /// Bell pair id does not resolve in the pool
    #[error("Bell pair was not found: {0}")]
    EpNotFound(EpId),
    /// The simulator state disagrees with itself. This is fatal; the run is aborted and the
    /// harness records an error row.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// Json error
    #[error("{0}")]
    JsonError(Box<serde_json::Error>),
}

impl From<serde_json::Error> for SimError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(Box::new(value))
    }
}

impl PartialEq for SimError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NodeNotFound(l0), Self::NodeNotFound(r0)) => l0 == r0,
            (Self::NodeNameNotFound(l0), Self::NodeNameNotFound(r0)) => l0 == r0,
            (Self::ChannelNotFound(l0, l1), Self::ChannelNotFound(r0, r1)) => {
                l0 == r0 && l1 == r1
            }
            (Self::NoRoute(l0, l1), Self::NoRoute(r0, r1)) => l0 == r0 && l1 == r1,
            (Self::OpNotFound(l0), Self::OpNotFound(r0)) => l0 == r0,
            (Self::EpNotFound(l0), Self::EpNotFound(r0)) => l0 == r0,
            (Self::InvariantViolation(l0), Self::InvariantViolation(r0)) => l0 == r0,
            (Self::JsonError(l), Self::JsonError(r)) => l.to_string() == r.to_string(),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
