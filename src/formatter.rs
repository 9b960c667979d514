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

//! Module for formatting ids with the names stored in the network. Use this for log messages
//! and test assertions, where raw graph indices are hard to read.

use itertools::Itertools;

use crate::network::Network;
use crate::types::{ChannelId, NodeId};

/// Render an id (or a structure of ids) using the names known to the network.
pub trait NetworkFormatter {
    /// Return the name of this element.
    fn fmt(&self, net: &Network) -> String;
}

impl NetworkFormatter for NodeId {
    fn fmt(&self, net: &Network) -> String {
        net.get_node_name(*self).map(|n| n.to_string()).unwrap_or_else(|_| format!("{self:?}"))
    }
}

impl NetworkFormatter for ChannelId {
    fn fmt(&self, net: &Network) -> String {
        net.channel(*self).name().to_string()
    }
}

impl NetworkFormatter for (NodeId, NodeId) {
    fn fmt(&self, net: &Network) -> String {
        format!("({}, {})", self.0.fmt(net), self.1.fmt(net))
    }
}

impl NetworkFormatter for &[NodeId] {
    fn fmt(&self, net: &Network) -> String {
        self.iter().map(|n| n.fmt(net)).join(" => ")
    }
}

impl NetworkFormatter for Vec<NodeId> {
    fn fmt(&self, net: &Network) -> String {
        self.as_slice().fmt(net)
    }
}
