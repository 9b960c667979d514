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

//! # Topology module
//!
//! This module represents the physical network: quantum nodes, the quantum channels connecting
//! them, and shortest-path route queries over the channel graph. The topology is immutable once
//! the simulation starts, except for the per-channel memory counters maintained by the
//! controller.

use std::collections::BTreeMap;

use petgraph::algo::astar;
use petgraph::stable_graph::StableUnGraph;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, IndexType, NodeId, SimError};

/// A quantum repeater node. Identity only; all state (memories, pending operations) is tracked
/// by the controller against the node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QNode {
    name: String,
}

impl QNode {
    /// The node name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An undirected quantum channel between two adjacent nodes.
///
/// The channel provides the physical substrate for link-level Bell pairs: each pair generated on
/// the channel occupies one memory slot at both ends until it is consumed or decoheres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QChannel {
    name: String,
    a: NodeId,
    b: NodeId,
    length: f64,
    fidelity_init: f64,
    memory_capacity: usize,
    memory_usage: usize,
}

impl QChannel {
    /// The channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The two endpoints, in insertion order.
    pub fn nodes(&self) -> (NodeId, NodeId) {
        (self.a, self.b)
    }

    /// The physical length in meters.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Fidelity of freshly generated pairs on this channel.
    pub fn fidelity_init(&self) -> f64 {
        self.fidelity_init
    }

    /// Maximum number of concurrently stored link-level pairs.
    pub fn memory_capacity(&self) -> usize {
        self.memory_capacity
    }

    /// Number of link-level pairs currently occupying memory slots.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    /// Whether all memory slots are occupied.
    pub fn is_full(&self) -> bool {
        self.memory_usage >= self.memory_capacity
    }

    /// Given one endpoint, return the other one.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.a {
            Some(self.b)
        } else if node == self.b {
            Some(self.a)
        } else {
            None
        }
    }

    /// Occupy one memory slot. The caller checks [`QChannel::is_full`] first.
    pub(crate) fn alloc_memory(&mut self) {
        debug_assert!(!self.is_full(), "allocating a memory slot on a full channel");
        self.memory_usage += 1;
    }

    /// Release one memory slot.
    pub(crate) fn free_memory(&mut self) {
        debug_assert!(self.memory_usage > 0, "releasing a memory slot on an empty channel");
        self.memory_usage = self.memory_usage.saturating_sub(1);
    }
}

/// Normalized endpoint pair used as a lookup key, so that `(a, b)` and `(b, a)` address the same
/// channel.
fn edge_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// # Network struct
///
/// The struct contains all information about the underlying physical topology: the nodes, the
/// quantum channels connecting them, and the graph used to answer shortest-path route queries.
///
/// ```rust
/// use edpsim::network::Network;
///
/// let mut net = Network::new();
/// let n1 = net.add_node("n1");
/// let n2 = net.add_node("n2");
/// let qc = net.add_channel(n1, n2, 1_000.0, 0.99, 5).unwrap();
/// assert_eq!(net.channel(qc).nodes(), (n1, n2));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub(crate) graph: StableUnGraph<(), f64, IndexType>,
    pub(crate) nodes: BTreeMap<NodeId, QNode>,
    pub(crate) channels: Vec<QChannel>,
    pub(crate) channel_lut: BTreeMap<(NodeId, NodeId), ChannelId>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Generate an empty network.
    pub fn new() -> Self {
        Self {
            graph: StableUnGraph::default(),
            nodes: BTreeMap::new(),
            channels: Vec::new(),
            channel_lut: BTreeMap::new(),
        }
    }

    /// Add a new node to the topology. This function returns the id of the node, which is used
    /// to reference it in channels, requests and route queries.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.graph.add_node(());
        self.nodes.insert(id, QNode { name: name.into() });
        id
    }

    /// Add a quantum channel between two existing nodes. The channel is named after its
    /// endpoints. Returns an error if either endpoint does not exist, and silently returns the
    /// existing id if the two nodes are already connected.
    pub fn add_channel(
        &mut self,
        a: NodeId,
        b: NodeId,
        length: f64,
        fidelity_init: f64,
        memory_capacity: usize,
    ) -> Result<ChannelId, SimError> {
        if !self.nodes.contains_key(&a) {
            return Err(SimError::NodeNotFound(a));
        }
        if !self.nodes.contains_key(&b) {
            return Err(SimError::NodeNotFound(b));
        }
        if let Some(id) = self.channel_lut.get(&edge_key(a, b)) {
            return Ok(*id);
        }
        let id = ChannelId(self.channels.len());
        let name = format!("qc-{}-{}", self.nodes[&a].name(), self.nodes[&b].name());
        self.channels.push(QChannel {
            name,
            a,
            b,
            length,
            fidelity_init,
            memory_capacity,
            memory_usage: 0,
        });
        self.graph.add_edge(a, b, length);
        self.channel_lut.insert(edge_key(a, b), id);
        Ok(id)
    }

    /// Get a reference to a node.
    pub fn node(&self, id: NodeId) -> Option<&QNode> {
        self.nodes.get(&id)
    }

    /// Get the name of a node.
    pub fn get_node_name(&self, id: NodeId) -> Result<&str, SimError> {
        self.nodes.get(&id).map(|n| n.name()).ok_or(SimError::NodeNotFound(id))
    }

    /// Look up a node by name.
    pub fn find_node(&self, name: &str) -> Result<NodeId, SimError> {
        self.nodes
            .iter()
            .find(|(_, n)| n.name() == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| SimError::NodeNameNotFound(name.to_string()))
    }

    /// Iterate over all node ids in id order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// The number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Get a reference to a channel.
    ///
    /// # Panics
    /// Panics if the id was not handed out by this network.
    pub fn channel(&self, id: ChannelId) -> &QChannel {
        &self.channels[id.0]
    }

    pub(crate) fn channel_mut(&mut self, id: ChannelId) -> &mut QChannel {
        &mut self.channels[id.0]
    }

    /// Find the channel connecting two adjacent nodes.
    pub fn get_channel(&self, a: NodeId, b: NodeId) -> Result<ChannelId, SimError> {
        self.channel_lut.get(&edge_key(a, b)).copied().ok_or(SimError::ChannelNotFound(a, b))
    }

    /// Iterate over all channel ids in creation order.
    pub fn channel_ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        (0..self.channels.len()).map(ChannelId)
    }

    /// The number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Query the route between two nodes: the sequence of nodes along the shortest path by
    /// physical length, both endpoints included.
    pub fn query_route(&self, src: NodeId, dst: NodeId) -> Result<Vec<NodeId>, SimError> {
        if !self.nodes.contains_key(&src) {
            return Err(SimError::NodeNotFound(src));
        }
        if !self.nodes.contains_key(&dst) {
            return Err(SimError::NodeNotFound(dst));
        }
        astar(&self.graph, src, |n| n == dst, |e| *e.weight(), |_| 0.0)
            .map(|(_, path)| path)
            .ok_or(SimError::NoRoute(src, dst))
    }
}
