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

//! Laws of the physical models.

use approx::assert_relative_eq;

use crate::models::*;

#[test]
fn swap_preserves_perfect_fidelity() {
    assert_relative_eq!(f_swap(1.0, 1.0), 1.0, epsilon = 1e-12);
}

#[test]
fn swap_of_equal_inputs() {
    assert_relative_eq!(f_swap(0.99, 0.99), 0.980_133_333_333_333_3, epsilon = 1e-12);
    // swapping degrades anything below perfect fidelity
    assert!(f_swap(0.9, 0.9) < 0.9);
}

#[test]
fn decohere_is_the_identity_at_zero_dt() {
    for f in [0.3, 0.75, 0.99] {
        assert_relative_eq!(f_decohere(f, 0.0, 10.0), f, epsilon = 1e-12);
    }
}

#[test]
fn decohere_converges_to_the_maximally_mixed_state() {
    assert_relative_eq!(f_decohere(0.99, 1e9, 1.0), 0.25, epsilon = 1e-9);
    assert_relative_eq!(f_decohere(0.3, 1e9, 1.0), 0.25, epsilon = 1e-9);
}

#[test]
fn purification_gains_exactly_above_one_half() {
    for f in [0.55, 0.7, 0.9] {
        assert!(f_pur(f, f) > f, "purification should improve f = {f}");
    }
    for f in [0.3, 0.45] {
        assert!(f_pur(f, f) < f, "purification should degrade f = {f}");
    }
    assert_relative_eq!(f_pur(0.5, 0.5), 0.5, epsilon = 1e-12);
}

#[test]
fn purification_success_probability_is_valid() {
    for ft in [0.5, 0.75, 0.99] {
        for fs in [0.5, 0.75, 0.99] {
            let p = p_pur(ft, fs);
            assert!(p > 0.0 && p <= 1.0, "p_pur({ft}, {fs}) = {p}");
        }
    }
}

#[test]
fn pumping_converges_upwards() {
    let f0 = 0.9;
    let f1 = pump_fidelity(f0, 1);
    let f2 = pump_fidelity(f0, 2);
    assert!(f0 < f1 && f1 < f2);
    assert_relative_eq!(f1, f_pur(f0, f0), epsilon = 1e-12);
}

#[test]
fn latency_models() {
    assert_relative_eq!(l_swap(0.02, 0.02, 0.8, 1.0, 1.0), (1.5 * 0.02 + 2.0) / 0.8, epsilon = 1e-12);
    // the slower subtree dominates
    assert_relative_eq!(l_swap(0.02, 1.0, 0.8, 1.0, 1.0), l_swap(1.0, 0.02, 0.8, 1.0, 1.0), epsilon = 1e-12);
    assert_relative_eq!(l_pur(0.02, 0.8, 10.0, 10.0), 20.02 / 0.8, epsilon = 1e-12);
}

#[test]
fn classical_delay_is_at_least_one_slot() {
    assert_eq!(classical_delay_slots(0.0, 1_000), 1);
    assert_eq!(classical_delay_slots(1_000.0, 1_000), 1);
    // a 1000 km pair at microsecond resolution: 10 ms of signalling
    assert_eq!(classical_delay_slots(1_000_000.0, 1_000_000), 10_000);
}
