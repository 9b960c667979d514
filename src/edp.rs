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

//! The entanglement-distribution-plan (EDP) builder.
//!
//! A bottom-up dynamic program over a routed path: for a node pair and a required fidelity it
//! considers the direct link, every entanglement swap through an intermediate of the path, and
//! purification from a lower fidelity, and keeps the minimum-latency plan tree. Results are
//! memoized on `(u, v, f_req)`; the memo lives inside the builder value, which is constructed
//! fresh for every simulation so node identities can never leak between runs.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::models;
use crate::network::Network;
use crate::op::{OpArena, OpKind, OpStatus};
use crate::types::{NodeId, OpId, RequestId, SimError};

/// What a single channel offers the planner: generation rate (pairs per second) and the
/// fidelity of fresh pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkCapability {
    /// Pair generation rate in pairs per second.
    pub rate: f64,
    /// Fidelity of freshly generated pairs.
    pub fid: f64,
}

/// Plan-time model parameters of the dynamic program.
///
/// These are estimates used for latency scoring only; the runtime draws its own success
/// probabilities from [`crate::config::SimConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanParams {
    /// Lower bound of the fidelity grid.
    pub grid_lo: f64,
    /// Upper bound of the fidelity grid.
    pub grid_hi: f64,
    /// Step of the fidelity grid.
    pub grid_step: f64,
    /// Recursion depth cap; deeper searches return no plan.
    pub max_depth: usize,
    /// Assumed swap success probability.
    pub swap_success: f64,
    /// Swap feed-forward time in seconds.
    pub swap_tau_f: f64,
    /// Swap classical-signalling time in seconds.
    pub swap_tau_c: f64,
    /// Assumed purification success probability.
    pub pur_success: f64,
    /// Purification processing time in seconds.
    pub pur_tau_p: f64,
    /// Purification classical-signalling time in seconds.
    pub pur_tau_c: f64,
}

impl Default for PlanParams {
    fn default() -> Self {
        Self {
            grid_lo: 0.70,
            grid_hi: 1.00,
            grid_step: 0.01,
            max_depth: 20,
            swap_success: 0.8,
            swap_tau_f: 1.0,
            swap_tau_c: 1.0,
            pur_success: 0.8,
            pur_tau_p: 10.0,
            pur_tau_c: 10.0,
        }
    }
}

/// A plan tree: the recipe for delivering one end-to-end pair at the required fidelity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanTree {
    /// Generate a link-level pair on the direct channel.
    Link {
        /// First endpoint.
        a: NodeId,
        /// Second endpoint.
        b: NodeId,
    },
    /// Swap the pairs of the two subtrees at `via`.
    Swap {
        /// The intermediate node.
        via: NodeId,
        /// First outer endpoint.
        a: NodeId,
        /// Second outer endpoint.
        b: NodeId,
        /// Plan for the `(a, via)` pair.
        left: Box<PlanTree>,
        /// Plan for the `(via, b)` pair.
        right: Box<PlanTree>,
    },
    /// Purify the subtree's pair with a second pair from the same subtree.
    Purify {
        /// First endpoint.
        a: NodeId,
        /// Second endpoint.
        b: NodeId,
        /// Plan for both input pairs.
        child: Box<PlanTree>,
    },
}

impl PlanTree {
    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        match self {
            PlanTree::Link { .. } => 1,
            PlanTree::Swap { left, right, .. } => 1 + left.size() + right.size(),
            PlanTree::Purify { child, .. } => 1 + child.size(),
        }
    }
}

type MemoKey = (NodeId, NodeId, NotNan<f64>);

/// The memoized plan builder. Construct one per simulation, seed it with the network's link
/// capabilities, and call [`EdpBuilder::build`] once per request.
#[derive(Debug)]
pub struct EdpBuilder {
    q: BTreeMap<(NodeId, NodeId), LinkCapability>,
    grid: Vec<f64>,
    params: PlanParams,
    memo: HashMap<MemoKey, Option<(NotNan<f64>, PlanTree)>>,
}

impl EdpBuilder {
    /// Create a builder from the network's channels. Every channel contributes a
    /// [`LinkCapability`] with the given generation rate and its initial fidelity.
    pub fn new(net: &Network, gen_rate: u64, params: PlanParams) -> Self {
        let mut q = BTreeMap::new();
        for qc in net.channel_ids() {
            let channel = net.channel(qc);
            let (a, b) = channel.nodes();
            let key = if a <= b { (a, b) } else { (b, a) };
            q.insert(
                key,
                LinkCapability { rate: gen_rate.max(1) as f64, fid: channel.fidelity_init() },
            );
        }
        let steps = ((params.grid_hi - params.grid_lo) / params.grid_step).round() as usize;
        let grid = (0..=steps)
            .map(|i| ((params.grid_lo + i as f64 * params.grid_step) * 1000.0).round() / 1000.0)
            .collect();
        Self { q, grid, params, memo: HashMap::new() }
    }

    /// The fidelity grid.
    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    /// Build the optimal plan for one request along a routed path. Returns the expected latency
    /// in seconds together with the plan tree, or `None` if no plan reaches `f_req` within the
    /// depth cap.
    pub fn build(
        &mut self,
        src: NodeId,
        dst: NodeId,
        f_req: f64,
        path: &[NodeId],
    ) -> Option<(f64, PlanTree)> {
        if !path.contains(&src) || !path.contains(&dst) {
            return None;
        }
        let f_req = NotNan::new(f_req).ok()?;
        self.dp(src, dst, f_req, path, 0).map(|(l, t)| (l.into_inner(), t))
    }

    fn direct_link(&self, x: NodeId, y: NodeId, f_req: NotNan<f64>) -> Option<(NotNan<f64>, PlanTree)> {
        let key = if x <= y { (x, y) } else { (y, x) };
        let cap = self.q.get(&key)?;
        if cap.fid >= f_req.into_inner() {
            Some((NotNan::new(1.0 / cap.rate).unwrap(), PlanTree::Link { a: x, b: y }))
        } else {
            None
        }
    }

    fn dp(
        &mut self,
        x: NodeId,
        y: NodeId,
        f_req: NotNan<f64>,
        path: &[NodeId],
        depth: usize,
    ) -> Option<(NotNan<f64>, PlanTree)> {
        if depth > self.params.max_depth {
            return None;
        }
        let key = (x, y, f_req);
        if let Some(hit) = self.memo.get(&key) {
            return hit.clone();
        }

        // Candidates are considered in a fixed order with strict improvement, so the earlier
        // candidate wins ties: direct link, then swaps in path order, then purification.
        let mut best = self.direct_link(x, y, f_req);

        let i_x = path.iter().position(|n| *n == x);
        let i_y = path.iter().position(|n| *n == y);
        if let (Some(i_x), Some(i_y)) = (i_x, i_y) {
            let (lo, hi) = if i_x <= i_y { (i_x, i_y) } else { (i_y, i_x) };
            for z in path[lo + 1..hi].to_vec() {
                for (f1, f2) in self.grid.clone().into_iter().cartesian_product(self.grid.clone())
                {
                    if models::f_swap(f1, f2) < f_req.into_inner() {
                        continue;
                    }
                    let res1 = self.dp(x, z, NotNan::new(f1).unwrap(), path, depth + 1);
                    let res2 = self.dp(z, y, NotNan::new(f2).unwrap(), path, depth + 1);
                    if let (Some((l1, t1)), Some((l2, t2))) = (res1, res2) {
                        let latency = NotNan::new(models::l_swap(
                            l1.into_inner(),
                            l2.into_inner(),
                            self.params.swap_success,
                            self.params.swap_tau_f,
                            self.params.swap_tau_c,
                        ))
                        .unwrap();
                        if best.as_ref().map(|(bl, _)| latency < *bl).unwrap_or(true) {
                            best = Some((
                                latency,
                                PlanTree::Swap {
                                    via: z,
                                    a: x,
                                    b: y,
                                    left: Box::new(t1),
                                    right: Box::new(t2),
                                },
                            ));
                        }
                    }
                }
            }
        }

        for f0 in self.grid.clone() {
            if f0 >= f_req.into_inner() {
                continue;
            }
            if models::f_pur(f0, f0) < f_req.into_inner() {
                continue;
            }
            if let Some((l, t)) = self.dp(x, y, NotNan::new(f0).unwrap(), path, depth + 1) {
                let latency = NotNan::new(models::l_pur(
                    l.into_inner(),
                    self.params.pur_success,
                    self.params.pur_tau_p,
                    self.params.pur_tau_c,
                ))
                .unwrap();
                if best.as_ref().map(|(bl, _)| latency < *bl).unwrap_or(true) {
                    best = Some((latency, PlanTree::Purify { a: x, b: y, child: Box::new(t) }));
                }
            }
        }

        self.memo.insert(key, best.clone());
        best
    }
}

/// Flatten a plan tree into arena operations for one request. Walks the tree post-order:
/// children are allocated before their parent, link-generation leaves start `Ready`, internal
/// nodes start `Waiting`. Returns the root operation and the full operation list in walk order.
pub fn flatten_plan(
    tree: &PlanTree,
    request: RequestId,
    net: &Network,
    arena: &mut OpArena,
) -> Result<(OpId, Vec<OpId>), SimError> {
    let mut ops = Vec::with_capacity(tree.size());
    let root = flatten_rec(tree, request, net, arena, &mut ops)?;
    Ok((root, ops))
}

fn flatten_rec(
    tree: &PlanTree,
    request: RequestId,
    net: &Network,
    arena: &mut OpArena,
    ops: &mut Vec<OpId>,
) -> Result<OpId, SimError> {
    let id = match tree {
        PlanTree::Link { a, b } => {
            let channel = net.get_channel(*a, *b)?;
            arena.alloc(
                OpKind::GenLink { channel, demand_registered: false },
                *a,
                *b,
                OpStatus::Ready,
                request,
            )
        }
        PlanTree::Swap { via, a, b, left, right } => {
            let left = flatten_rec(left, request, net, arena, ops)?;
            let right = flatten_rec(right, request, net, arena, ops)?;
            let id = arena.alloc(
                OpKind::Swap { via: *via, left, right },
                *a,
                *b,
                OpStatus::Waiting,
                request,
            );
            arena[left].parent = Some(id);
            arena[right].parent = Some(id);
            id
        }
        PlanTree::Purify { a, b, child } => {
            let child = flatten_rec(child, request, net, arena, ops)?;
            let id = arena.alloc(
                OpKind::Purify { child, target_ep: None, sacrifice_ep: None },
                *a,
                *b,
                OpStatus::Waiting,
                request,
            );
            arena[child].parent = Some(id);
            id
        }
    };
    ops.push(id);
    Ok(id)
}
