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

//! Module for generating standard topologies and random request sets.
//!
//! Randomized builders take an explicit `&mut impl Rng`; pass the controller's
//! request-generation stream (or any seeded generator) to keep runs reproducible.

use itertools::Itertools;
use rand::{
    distributions::{Distribution, Uniform},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::network::Network;
use crate::types::{NodeId, SimError};

/// Parameters shared by every channel of a generated topology.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Physical channel length in meters. Ignored by [`NetworkBuilder::build_waxman`], which
    /// derives lengths from node placement.
    pub length: f64,
    /// Fidelity of freshly generated pairs.
    pub fidelity_init: f64,
    /// Memory slots per channel.
    pub memory_capacity: usize,
}

impl Default for ChannelSpec {
    fn default() -> Self {
        Self { length: 1_000.0, fidelity_init: 0.99, memory_capacity: 5 }
    }
}

/// Trait for generating standard topologies quickly. The following example builds a five-node
/// line and picks a random request on it:
///
/// ```
/// use edpsim::builder::{ChannelSpec, NetworkBuilder};
/// use edpsim::network::Network;
/// use rand::prelude::*;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let net = Network::build_line(5, ChannelSpec::default())?;
/// let mut rng = StdRng::seed_from_u64(0);
/// let requests = net.random_requests(1, &mut rng);
/// assert_eq!(requests.len(), 1);
/// # Ok(())
/// # }
/// ```
pub trait NetworkBuilder: Sized {
    /// Build a line topology `n1 -- n2 -- ... -- nN`.
    fn build_line(n: usize, spec: ChannelSpec) -> Result<Self, SimError>;

    /// Build a `width x height` grid topology with nodes named `n1..n{w*h}` in row-major order.
    fn build_grid(width: usize, height: usize, spec: ChannelSpec) -> Result<Self, SimError>;

    /// Build a random Waxman graph: `n` nodes placed uniformly in a `size x size` square
    /// (meters), with an edge between two nodes at distance `d` with probability
    /// `beta * exp(-d / (alpha * l_max))` where `l_max` is the diameter of the square. The
    /// result is made connected by bridging components with their closest node pair.
    fn build_waxman(
        n: usize,
        size: f64,
        alpha: f64,
        beta: f64,
        spec: ChannelSpec,
        rng: &mut impl Rng,
    ) -> Result<Self, SimError>;

    /// Draw `number` random `(src, dst)` request pairs. Endpoints are sampled without reuse
    /// across requests as long as enough nodes are available, and with reuse otherwise.
    fn random_requests(&self, number: usize, rng: &mut impl Rng) -> Vec<(NodeId, NodeId)>;
}

impl NetworkBuilder for Network {
    fn build_line(n: usize, spec: ChannelSpec) -> Result<Self, SimError> {
        let mut net = Network::new();
        let nodes: Vec<NodeId> = (1..=n).map(|i| net.add_node(format!("n{i}"))).collect();
        for (a, b) in nodes.iter().copied().tuple_windows() {
            net.add_channel(a, b, spec.length, spec.fidelity_init, spec.memory_capacity)?;
        }
        Ok(net)
    }

    fn build_grid(width: usize, height: usize, spec: ChannelSpec) -> Result<Self, SimError> {
        let mut net = Network::new();
        let nodes: Vec<NodeId> =
            (1..=width * height).map(|i| net.add_node(format!("n{i}"))).collect();
        let at = |x: usize, y: usize| nodes[y * width + x];
        for y in 0..height {
            for x in 0..width {
                if x + 1 < width {
                    net.add_channel(
                        at(x, y),
                        at(x + 1, y),
                        spec.length,
                        spec.fidelity_init,
                        spec.memory_capacity,
                    )?;
                }
                if y + 1 < height {
                    net.add_channel(
                        at(x, y),
                        at(x, y + 1),
                        spec.length,
                        spec.fidelity_init,
                        spec.memory_capacity,
                    )?;
                }
            }
        }
        Ok(net)
    }

    fn build_waxman(
        n: usize,
        size: f64,
        alpha: f64,
        beta: f64,
        spec: ChannelSpec,
        rng: &mut impl Rng,
    ) -> Result<Self, SimError> {
        let mut net = Network::new();
        let coord = Uniform::new(0.0, size);
        let nodes: Vec<NodeId> = (1..=n).map(|i| net.add_node(format!("n{i}"))).collect();
        let pos: Vec<(f64, f64)> =
            (0..n).map(|_| (coord.sample(rng), coord.sample(rng))).collect();
        let dist = |i: usize, j: usize| -> f64 {
            let (dx, dy) = (pos[i].0 - pos[j].0, pos[i].1 - pos[j].1);
            (dx * dx + dy * dy).sqrt()
        };
        let l_max = size * std::f64::consts::SQRT_2;

        for i in 0..n {
            for j in (i + 1)..n {
                let d = dist(i, j);
                let p = beta * (-d / (alpha * l_max)).exp();
                if rng.gen::<f64>() < p {
                    net.add_channel(
                        nodes[i],
                        nodes[j],
                        d,
                        spec.fidelity_init,
                        spec.memory_capacity,
                    )?;
                }
            }
        }

        // bridge disconnected components, closest pair first
        let mut component = union_components(&net, &nodes);
        while component.iter().unique().count() > 1 {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..n {
                for j in (i + 1)..n {
                    if component[i] != component[j] {
                        let d = dist(i, j);
                        if best.map(|(_, _, bd)| d < bd).unwrap_or(true) {
                            best = Some((i, j, d));
                        }
                    }
                }
            }
            let (i, j, d) = best.expect("disconnected graph must have a cross-component pair");
            net.add_channel(nodes[i], nodes[j], d, spec.fidelity_init, spec.memory_capacity)?;
            component = union_components(&net, &nodes);
        }

        Ok(net)
    }

    fn random_requests(&self, number: usize, rng: &mut impl Rng) -> Vec<(NodeId, NodeId)> {
        let nodes: Vec<NodeId> = self.node_ids().collect();
        let reuse = 2 * number > nodes.len();
        let mut used: Vec<NodeId> = Vec::new();
        let mut requests = Vec::with_capacity(number);
        while requests.len() < number {
            let src = nodes[rng.gen_range(0..nodes.len())];
            let dst = nodes[rng.gen_range(0..nodes.len())];
            if src == dst {
                continue;
            }
            if !reuse && (used.contains(&src) || used.contains(&dst)) {
                continue;
            }
            used.push(src);
            used.push(dst);
            requests.push((src, dst));
        }
        requests
    }
}

/// Label each node with a component id by repeated relaxation over the channel list.
fn union_components(net: &Network, nodes: &[NodeId]) -> Vec<usize> {
    let index_of = |id: NodeId| nodes.iter().position(|n| *n == id).unwrap();
    let mut component: Vec<usize> = (0..nodes.len()).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for qc in net.channel_ids() {
            let (a, b) = net.channel(qc).nodes();
            let (ia, ib) = (index_of(a), index_of(b));
            let min = component[ia].min(component[ib]);
            if component[ia] != min || component[ib] != min {
                component[ia] = min;
                component[ib] = min;
                changed = true;
            }
        }
    }
    component
}
