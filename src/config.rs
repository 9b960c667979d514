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

//! Simulation configuration.

use serde::{Deserialize, Serialize};

use crate::builder::ChannelSpec;
use crate::edp::PlanParams;
use crate::types::Time;

/// Default simulator accuracy in slots per second.
pub const DEFAULT_ACCURACY: u64 = 1_000;

/// All tunable knobs of a simulation run.
///
/// The defaults reproduce the canonical sweep configuration: moderately lossy swapping over
/// channels of fidelity 0.99 with five memory slots each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Probability that an entanglement swap succeeds.
    pub p_swap: f64,
    /// Probability that a granted link-generation attempt yields a pair.
    pub p_gen: f64,
    /// Link-level pair generation rate per channel, in pairs per second. Zero falls back to one
    /// generation opportunity per slot.
    pub gen_rate: u64,
    /// End-to-end fidelity a request must reach.
    pub f_req: f64,
    /// Fidelity of freshly generated link-level pairs, applied to channels built from
    /// [`SimConfig::channel_spec`].
    pub init_fidelity: f64,
    /// Memory lifetime in seconds, driving the decoherence kernel.
    pub t_mem: f64,
    /// Pairs whose fidelity falls strictly below this cut are retired by the maintenance sweep.
    pub f_cut: f64,
    /// Memory slots per channel.
    pub memory_capacity: usize,
    /// Slots per second.
    pub accuracy: u64,
    /// Simulation start.
    pub ts: Time,
    /// Simulation end (exclusive).
    pub te: Time,
    /// Whether the opportunistic purify-while-swap-waiting subsystem runs at all.
    pub enable_psw: bool,
    /// Fidelity below which a waiting pair becomes a PSW candidate. `None` disables PSW even
    /// when `enable_psw` is set.
    pub psw_threshold: Option<f64>,
    /// Seed for both deterministic random streams (request generation and operation outcomes).
    pub seed: u64,
    /// Plan-time model parameters of the EDP builder.
    pub plan: PlanParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            p_swap: 0.4,
            p_gen: 1.0,
            gen_rate: 50,
            f_req: 0.8,
            init_fidelity: 0.99,
            t_mem: 0.1,
            f_cut: 0.5,
            memory_capacity: 5,
            accuracy: DEFAULT_ACCURACY,
            ts: Time::ZERO,
            te: Time::from_slots(300_000),
            enable_psw: false,
            psw_threshold: None,
            seed: 0,
            plan: PlanParams::default(),
        }
    }
}

impl SimConfig {
    /// Whether PSW is effectively enabled: the flag is set and a threshold is configured.
    pub fn psw_enabled(&self) -> bool {
        self.enable_psw && self.psw_threshold.is_some()
    }

    /// The channel template for the topology builders: channels of the given length with this
    /// configuration's initial fidelity and memory capacity.
    pub fn channel_spec(&self, length: f64) -> ChannelSpec {
        ChannelSpec {
            length,
            fidelity_init: self.init_fidelity,
            memory_capacity: self.memory_capacity,
        }
    }

    /// The generation interval in slots: `accuracy / gen_rate`, at least one slot.
    pub fn gen_interval(&self) -> u64 {
        if self.gen_rate == 0 {
            return 1;
        }
        ((self.accuracy as f64 / self.gen_rate as f64).ceil() as u64).max(1)
    }

    /// Set the simulation span from seconds at the configured accuracy.
    pub fn with_sim_time_sec(mut self, sec: f64) -> Self {
        self.ts = Time::ZERO;
        self.te = Time::from_sec(sec, self.accuracy);
        self
    }

    /// Set the simulation span from a slot count.
    pub fn with_sim_slots(mut self, slots: u64) -> Self {
        self.ts = Time::ZERO;
        self.te = Time::from_slots(slots);
        self
    }
}
