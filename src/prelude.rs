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

//! Convenience re-export of common members.

pub use crate::builder::{ChannelSpec, NetworkBuilder};
pub use crate::config::SimConfig;
pub use crate::controller::{Controller, Request};
pub use crate::event::{Event, EventQueue};
pub use crate::formatter::NetworkFormatter;
pub use crate::network::Network;
pub use crate::record::{Metrics, RunSummary};
pub use crate::types::{ChannelId, EpId, NodeId, OpId, RequestId, SimError, Time};
