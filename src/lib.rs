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

#![deny(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # EdpSim
//!
//! This is a discrete-event simulator for the control plane of a quantum network distributing
//! end-to-end Bell pairs over a graph of nodes connected by quantum channels.
//!
//! ## Main Concepts
//!
//! The [`network::Network`] holds the physical topology: nodes, channels (with their length,
//! initial fidelity, and memory budget), and shortest-path route queries on a graph (see
//! [Petgraph](https://docs.rs/petgraph/latest/petgraph/index.html)). Standard topologies (line,
//! grid, Waxman) come from the [`builder::NetworkBuilder`] trait.
//!
//! For every request, the [`edp::EdpBuilder`] runs a memoized dynamic program over the routed
//! path and produces a *swapping tree*: a plan of link generation, entanglement swapping and
//! purification operations that delivers one pair at the required fidelity with minimum
//! expected latency.
//!
//! The [`controller::Controller`] then drives those trees against the clock. Each time slot
//! chains three routines: serve link-generation demands, advance ready operations, and maintain
//! the pair pool (promotion, decoherence, retirement below the fidelity cut). Swap and purify
//! outcomes arrive as delayed events modelling the classical signalling between the endpoints.
//! Optionally, the [`psw`] subsystem speculatively purifies pairs that idle in memory while
//! their sibling in a pending swap is still being produced.
//!
//! Only scalar fidelities and success probabilities are tracked; there is no quantum-state
//! simulation. With a fixed seed the whole simulation is deterministic.
//!
//! ```rust
//! use edpsim::prelude::*;
//!
//! fn main() -> Result<(), SimError> {
//!     // a five-node line, one request across it
//!     let net = Network::build_line(5, ChannelSpec::default())?;
//!     let (src, dst) = (net.find_node("n1")?, net.find_node("n5")?);
//!
//!     let config = SimConfig {
//!         p_swap: 1.0,
//!         f_req: 0.7,
//!         t_mem: 1_000.0,
//!         ..Default::default()
//!     }
//!     .with_sim_time_sec(10.0);
//!
//!     let mut controller = Controller::new(net, config);
//!     controller.install_requests(&[(src, dst)])?;
//!     controller.run()?;
//!
//!     assert_eq!(controller.metrics().finished(), 1);
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod controller;
pub mod edp;
pub mod ep;
pub mod event;
pub mod formatter;
pub mod models;
pub mod network;
pub mod op;
pub mod prelude;
pub mod psw;
pub mod record;
pub mod types;

#[cfg(test)]
mod test;
