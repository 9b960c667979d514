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

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;

use super::{line, node, WEAK_SPEC};
use crate::builder::NetworkBuilder;
use crate::edp::{flatten_plan, EdpBuilder, PlanParams, PlanTree};
use crate::models;
use crate::network::Network;
use crate::op::{OpArena, OpKind, OpStatus};
use crate::types::RequestId;

fn builder_for(net: &Network) -> EdpBuilder {
    EdpBuilder::new(net, 50, PlanParams::default())
}

#[test]
fn the_fidelity_grid_is_inclusive() {
    let net = line(2);
    let builder = builder_for(&net);
    let grid = builder.grid();
    assert_eq!(grid.len(), 31);
    assert_relative_eq!(grid[0], 0.70, epsilon = 1e-12);
    assert_relative_eq!(grid[30], 1.00, epsilon = 1e-12);
}

#[test]
fn direct_link_wins_for_adjacent_nodes() {
    let net = line(2);
    let (n1, n2) = (node(&net, "n1"), node(&net, "n2"));
    let path = net.query_route(n1, n2).unwrap();
    let (latency, tree) = builder_for(&net).build(n1, n2, 0.8, &path).unwrap();
    assert_eq!(tree, PlanTree::Link { a: n1, b: n2 });
    assert_relative_eq!(latency, 1.0 / 50.0, epsilon = 1e-12);
}

#[test]
fn two_hops_swap_through_the_middle() {
    let net = line(3);
    let (n1, n2, n3) = (node(&net, "n1"), node(&net, "n2"), node(&net, "n3"));
    let path = net.query_route(n1, n3).unwrap();
    let (latency, tree) = builder_for(&net).build(n1, n3, 0.8, &path).unwrap();
    let PlanTree::Swap { via, left, right, .. } = tree else {
        panic!("expected a swap plan, got {tree:?}")
    };
    assert_eq!(via, n2);
    assert_eq!(*left, PlanTree::Link { a: n1, b: n2 });
    assert_eq!(*right, PlanTree::Link { a: n2, b: n3 });
    assert_relative_eq!(latency, models::l_swap(0.02, 0.02, 0.8, 1.0, 1.0), epsilon = 1e-12);
}

#[test]
fn weak_links_get_purified() {
    let net = Network::build_line(2, *WEAK_SPEC).unwrap();
    let (n1, n2) = (node(&net, "n1"), node(&net, "n2"));
    let path = net.query_route(n1, n2).unwrap();
    let (_, tree) = builder_for(&net).build(n1, n2, 0.92, &path).unwrap();
    let PlanTree::Purify { child, .. } = tree else {
        panic!("expected a purify plan, got {tree:?}")
    };
    assert_eq!(*child, PlanTree::Link { a: n1, b: n2 });
}

#[test]
fn unreachable_targets_return_none() {
    let net = Network::build_line(2, *WEAK_SPEC).unwrap();
    let (n1, n2) = (node(&net, "n1"), node(&net, "n2"));
    let path = net.query_route(n1, n2).unwrap();
    assert_eq!(builder_for(&net).build(n1, n2, 0.999, &path), None);
}

#[test]
fn the_depth_cap_limits_recursion() {
    let net = line(3);
    let (n1, n2, n3) = (node(&net, "n1"), node(&net, "n2"), node(&net, "n3"));
    let params = PlanParams { max_depth: 0, ..Default::default() };
    let mut builder = EdpBuilder::new(&net, 50, params);
    // adjacent pairs still work at depth zero, a swap does not
    let path = net.query_route(n1, n2).unwrap();
    assert!(builder.build(n1, n2, 0.8, &path).is_some());
    let path = net.query_route(n1, n3).unwrap();
    assert_eq!(builder.build(n1, n3, 0.8, &path), None);
}

#[test]
fn returned_latency_is_a_lower_bound() {
    let net = line(3);
    let (n1, n3) = (node(&net, "n1"), node(&net, "n3"));
    let path = net.query_route(n1, n3).unwrap();
    let (best, _) = builder_for(&net).build(n1, n3, 0.8, &path).unwrap();
    // one enumerable candidate: swap two direct links at fidelity 0.99 each
    assert!(models::f_swap(0.99, 0.99) >= 0.8);
    let candidate = models::l_swap(0.02, 0.02, 0.8, 1.0, 1.0);
    assert!(best <= candidate + 1e-12);
}

#[test]
fn rebuilding_is_deterministic() {
    let net = line(5);
    let (n1, n5) = (node(&net, "n1"), node(&net, "n5"));
    let path = net.query_route(n1, n5).unwrap();
    let mut builder = builder_for(&net);
    let first = builder.build(n1, n5, 0.7, &path).unwrap();
    let second = builder.build(n1, n5, 0.7, &path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn flattening_wires_statuses_and_parents() {
    let net = line(3);
    let (n1, n3) = (node(&net, "n1"), node(&net, "n3"));
    let path = net.query_route(n1, n3).unwrap();
    let (_, tree) = builder_for(&net).build(n1, n3, 0.8, &path).unwrap();

    let mut arena = OpArena::new();
    let (root, ops) = flatten_plan(&tree, RequestId(0), &net, &mut arena).unwrap();
    assert_eq!(ops.len(), 3);
    assert_eq!(*ops.last().unwrap(), root);

    let root_op = arena.get(root).unwrap();
    assert_eq!(root_op.status, OpStatus::Waiting);
    assert_eq!(root_op.parent, None);
    let children = root_op.children();
    assert_eq!(children.len(), 2);
    for child in children {
        let op = arena.get(child).unwrap();
        assert_eq!(op.status, OpStatus::Ready);
        assert_eq!(op.parent, Some(root));
        assert!(matches!(op.kind, OpKind::GenLink { demand_registered: false, .. }));
        // the leaf's channel connects its endpoints
        let OpKind::GenLink { channel, .. } = op.kind else { unreachable!() };
        assert_eq!(net.get_channel(op.a, op.b).unwrap(), channel);
    }
}
