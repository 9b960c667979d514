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

use crate::record::{
    mean_or_none, percentile, safe_div, CompletedRequest, Metrics, RunStatus, RunSummary,
};

#[test]
fn percentile_interpolates_linearly() {
    let xs = [1.0, 2.0, 3.0, 4.0];
    assert_eq!(percentile(&xs, 50.0), Some(2.5));
    assert_eq!(percentile(&xs, 0.0), Some(1.0));
    assert_eq!(percentile(&xs, 100.0), Some(4.0));
    assert_eq!(percentile(&[5.0], 90.0), Some(5.0));
    assert_eq!(percentile(&[], 50.0), None);
    // unsorted input is handled
    assert_eq!(percentile(&[3.0, 1.0, 2.0], 50.0), Some(2.0));
}

#[test]
fn mean_and_safe_div() {
    assert_eq!(mean_or_none(&[]), None);
    assert_relative_eq!(mean_or_none(&[1.0, 2.0, 3.0]).unwrap(), 2.0, epsilon = 1e-12);
    assert_eq!(safe_div(1.0, 0.0), None);
    assert_eq!(safe_div(1.0, 4.0), Some(0.25));
}

fn sample_metrics() -> Metrics {
    let mut metrics = Metrics::default();
    metrics.completed_requests.push(CompletedRequest {
        index: 0,
        name: "req0".to_string(),
        finish_time_slot: 10,
        fidelity: 0.9,
    });
    metrics.completed_requests.push(CompletedRequest {
        index: 1,
        name: "req1".to_string(),
        finish_time_slot: 20,
        fidelity: 0.8,
    });
    metrics.swap_wait_times = vec![1, 2, 3];
    metrics.psw_purify_scheduled = 4;
    metrics.psw_purify_success = 2;
    metrics.psw_purify_fail = 1;
    metrics.psw_cancelled = 1;
    metrics
}

#[test]
fn summary_aggregates_a_run() {
    let summary = RunSummary::from_metrics(&sample_metrics(), 100);
    assert_eq!(summary.finished, 2);
    assert_relative_eq!(summary.avg_wait.unwrap(), 15.0, epsilon = 1e-12);
    assert_relative_eq!(summary.p50_wait.unwrap(), 15.0, epsilon = 1e-12);
    assert_relative_eq!(summary.throughput.unwrap(), 0.02, epsilon = 1e-12);
    assert_relative_eq!(summary.final_fidelity_mean.unwrap(), 0.85, epsilon = 1e-12);
    assert_relative_eq!(summary.swap_wait_time_mean.unwrap(), 2.0, epsilon = 1e-12);
    assert_eq!(summary.psw_attempts, 4);
    assert_relative_eq!(summary.attempts_per_finished.unwrap(), 2.0, epsilon = 1e-12);
    assert_eq!(summary.status, RunStatus::Ok);
    assert_eq!(summary.error_type, None);
}

#[test]
fn empty_runs_produce_empty_aggregates() {
    let summary = RunSummary::from_metrics(&Metrics::default(), 100);
    assert_eq!(summary.finished, 0);
    assert_eq!(summary.avg_wait, None);
    assert_eq!(summary.p90_wait, None);
    assert_eq!(summary.final_fidelity_p10, None);
    assert_eq!(summary.attempts_per_finished, None);
}

#[test]
fn error_rows_carry_the_error() {
    let summary = RunSummary::from_error("InvariantViolation", "channel over capacity");
    assert_eq!(summary.status, RunStatus::Error);
    assert_eq!(summary.error_type.as_deref(), Some("InvariantViolation"));
    assert_eq!(summary.error_message.as_deref(), Some("channel over capacity"));
    assert_eq!(summary.finished, 0);
}

#[test]
fn summaries_serialize_to_json() {
    let json = RunSummary::from_metrics(&sample_metrics(), 100).to_json().unwrap();
    assert!(json.contains("\"finished\":2"));
    assert!(json.contains("\"status\":\"ok\""));
    assert!(json.contains("\"psw_attempts\":4"));
}
