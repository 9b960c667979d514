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

use lazy_static::lazy_static;

use crate::builder::{ChannelSpec, NetworkBuilder};
use crate::network::Network;
use crate::types::NodeId;

mod test_controller;
mod test_edp;
mod test_event;
mod test_models;
mod test_record;

lazy_static! {
    /// Channels too weak to satisfy a request without purification.
    static ref WEAK_SPEC: ChannelSpec = ChannelSpec { fidelity_init: 0.9, ..Default::default() };
}

/// A line topology with the default channel template (1 km, fidelity 0.99, 5 memory slots).
fn line(n: usize) -> Network {
    Network::build_line(n, ChannelSpec::default()).unwrap()
}

fn node(net: &Network, name: &str) -> NodeId {
    net.find_node(name).unwrap()
}

/// Opt-in log capture: run with `RUST_LOG=edpsim=trace` to follow the routine chain.
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
