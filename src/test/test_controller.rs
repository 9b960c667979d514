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

//! End-to-end controller runs on small topologies, pinned down to the slot.

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use rand::prelude::*;

use super::{init_logger, line, node, WEAK_SPEC};
use crate::builder::{ChannelSpec, NetworkBuilder};
use crate::config::SimConfig;
use crate::controller::Controller;
use crate::models;
use crate::network::Network;
use crate::op::OpStatus;
use crate::types::Time;

/// Deterministic swapping over a line with effectively ideal memories.
fn line_config() -> SimConfig {
    SimConfig { p_swap: 1.0, f_req: 0.7, t_mem: 1_000.0, ..Default::default() }
        .with_sim_slots(10_000)
}

/// One decoherence sweep over a fresh link-level pair (1 ms at 1000 slots per second).
fn aged(fidelity: f64, t_mem: f64) -> f64 {
    models::f_decohere(fidelity, 1e-3, t_mem)
}

#[test]
fn line3_delivers_one_swapped_pair() {
    init_logger();
    let net = line(3);
    let (n1, n3) = (node(&net, "n1"), node(&net, "n3"));
    let mut c = Controller::new(net, line_config());
    c.install_requests(&[(n1, n3)]).unwrap();
    c.run().unwrap();

    let m = c.metrics();
    assert_eq!(m.finished(), 1);
    // both inputs are generated at slot 20, promoted and aged once, and swapped at slot 21;
    // the completion signal arrives one slot later
    let f1 = aged(0.99, 1_000.0);
    assert_relative_eq!(m.completed_requests[0].fidelity, models::f_swap(f1, f1), epsilon = 1e-9);
    assert_eq!(m.completed_requests[0].finish_time_slot, 22);
    assert_eq!(m.completed_requests[0].name, "req0");
    assert_eq!(m.swap_wait_times, vec![1, 1]);
    assert_eq!(m.swap_wait_times_by_req["req0"], vec![1, 1]);
    c.check_invariants().unwrap();
}

#[test]
fn line5_composes_a_balanced_swap_tree() {
    init_logger();
    let net = line(5);
    let (n1, n5) = (node(&net, "n1"), node(&net, "n5"));
    let mut c = Controller::new(net, line_config());
    c.install_requests(&[(n1, n5)]).unwrap();
    c.run().unwrap();

    let m = c.metrics();
    assert_eq!(m.finished(), 1);
    // the two lower swaps fire at slot 21, their products are promoted and aged once, and the
    // top swap fires at slot 23
    let f1 = aged(0.99, 1_000.0);
    let low = models::f_swap(f1, f1);
    let low_aged = aged(low, 1_000.0);
    let expected = models::f_swap(low_aged, low_aged);
    assert_relative_eq!(m.completed_requests[0].fidelity, expected, epsilon = 1e-9);
    assert_eq!(m.completed_requests[0].finish_time_slot, 24);
    assert_eq!(m.swap_wait_times, vec![1, 1, 1, 1, 1, 1]);
    c.check_invariants().unwrap();
}

#[test]
fn failed_swaps_starve_the_run() {
    let net = line(3);
    let (n1, n3) = (node(&net, "n1"), node(&net, "n3"));
    let config = SimConfig { p_swap: 0.0, ..line_config() }.with_sim_slots(300);
    let mut c = Controller::new(net, config);
    c.install_requests(&[(n1, n3)]).unwrap();
    c.run().unwrap();

    let m = c.metrics();
    assert_eq!(m.finished(), 0);
    assert!(!m.swap_wait_times.is_empty(), "swaps must have been attempted");
    assert!(!c.requests()[0].is_done);
    c.check_invariants().unwrap();
}

#[test]
fn zero_gen_rate_falls_back_to_one_slot() {
    assert_eq!(SimConfig { gen_rate: 0, ..Default::default() }.gen_interval(), 1);
    assert_eq!(SimConfig { gen_rate: 50, accuracy: 1_000, ..Default::default() }.gen_interval(), 20);
    assert_eq!(SimConfig { gen_rate: 3, accuracy: 1_000, ..Default::default() }.gen_interval(), 334);
    assert_eq!(SimConfig { gen_rate: 1_000, accuracy: 1_000, ..Default::default() }.gen_interval(), 1);
}

#[test]
fn aggressive_cut_retires_every_pair() {
    let net = line(3);
    let (n1, n3) = (node(&net, "n1"), node(&net, "n3"));
    let config = SimConfig { f_cut: 1.0, ..line_config() }.with_sim_slots(100);
    let mut c = Controller::new(net, config);
    c.install_requests(&[(n1, n3)]).unwrap();
    c.run().unwrap();

    let m = c.metrics();
    assert_eq!(m.finished(), 0);
    // every pair is retired at its first maintenance sweep, so no swap ever consumed inputs
    assert!(m.swap_wait_times.is_empty());
    assert!(c.pool().is_empty());
    for qc in c.network().channel_ids() {
        assert_eq!(c.network().channel(qc).memory_usage(), 0);
    }
    c.check_invariants().unwrap();
}

#[test]
fn capacity_one_queues_demands() {
    let config = SimConfig { p_swap: 1.0, f_req: 0.7, memory_capacity: 1, ..Default::default() }
        .with_sim_slots(10_000);
    let net = Network::build_line(2, config.channel_spec(1_000.0)).unwrap();
    let (n1, n2) = (node(&net, "n1"), node(&net, "n2"));
    // the default short memory lifetime (0.1 s) retires the first pair after 109 sweeps,
    // freeing the single memory slot for the second request
    let mut c = Controller::new(net, config);
    c.install_requests(&[(n1, n2), (n1, n2)]).unwrap();
    c.run().unwrap();

    let m = c.metrics();
    assert_eq!(m.finished(), 2);
    assert_eq!(m.completed_requests[0].finish_time_slot, 20);
    assert_eq!(m.completed_requests[1].finish_time_slot, 140);
    assert!(c.network().channel(c.network().get_channel(n1, n2).unwrap()).memory_usage() <= 1);
    c.check_invariants().unwrap();
}

#[test]
fn build_failure_marks_the_request_done() {
    let net = Network::build_line(2, *WEAK_SPEC).unwrap();
    let (n1, n2) = (node(&net, "n1"), node(&net, "n2"));
    let config = SimConfig { f_req: 0.999, ..Default::default() }.with_sim_slots(1_000);
    let mut c = Controller::new(net, config);
    c.install_requests(&[(n1, n2)]).unwrap();

    let r = &c.requests()[0];
    assert!(r.is_done);
    assert_eq!(r.root, None);
    assert_eq!(r.final_fidelity, Some(0.0));

    c.run().unwrap();
    // a failed build never completes, and never schedules anything
    assert_eq!(c.metrics().finished(), 0);
    assert!(c.pool().is_empty());
}

#[test]
fn disconnected_pairs_fail_to_build() {
    let mut net = Network::new();
    let a = net.add_node("a");
    let b = net.add_node("b");
    let mut c = Controller::new(net, SimConfig::default().with_sim_slots(100));
    c.install_requests(&[(a, b)]).unwrap();
    assert!(c.requests()[0].is_done);
    assert_eq!(c.requests()[0].root, None);
}

#[test]
fn demand_registration_is_idempotent() {
    let net = line(2);
    let (n1, n2) = (node(&net, "n1"), node(&net, "n2"));
    let mut c = Controller::new(net, SimConfig { f_req: 0.7, ..Default::default() });
    c.install_requests(&[(n1, n2)]).unwrap();
    let root = c.requests()[0].root.unwrap();

    c.run_op(Time::ZERO, root).unwrap();
    c.run_op(Time::ZERO, root).unwrap();
    let queued: usize = c.demand.values().map(|q| q.len()).sum();
    assert_eq!(queued, 1);
    assert_eq!(c.ops()[root].status, OpStatus::Waiting);
}

#[test]
fn fixed_seeds_reproduce_runs_exactly() {
    fn run_once(seed: u64) -> crate::record::Metrics {
        let mut rng = StdRng::seed_from_u64(seed);
        let net =
            Network::build_waxman(8, 100_000.0, 0.2, 0.6, ChannelSpec::default(), &mut rng)
                .unwrap();
        let config = SimConfig {
            p_swap: 0.4,
            f_req: 0.8,
            t_mem: 10.0,
            seed,
            ..Default::default()
        }
        .with_sim_slots(3_000);
        let mut c = Controller::new(net, config);
        c.install_random_requests(2).unwrap();
        c.run().unwrap();
        c.check_invariants().unwrap();
        c.metrics().clone()
    }

    assert_eq!(run_once(7), run_once(7));
}
