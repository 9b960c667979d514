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

//! Metrics collected during a run and the per-run summary consumed by experiment harnesses.
//!
//! The simulator itself never writes files; everything here is serde-serializable so a sweep
//! driver can emit its own CSV or JSON rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One finished request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRequest {
    /// Position of the request in the installed request list.
    pub index: usize,
    /// Request name.
    pub name: String,
    /// Slot at which the end-to-end pair was delivered.
    pub finish_time_slot: u64,
    /// Fidelity of the delivered pair.
    pub fidelity: f64,
}

/// Everything the controller counts during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Finished requests in completion order. Synthetic PSW requests are not recorded here.
    pub completed_requests: Vec<CompletedRequest>,
    /// For every executed swap, how many slots each input pair sat in memory before being
    /// consumed.
    pub swap_wait_times: Vec<u64>,
    /// The same samples grouped by request name.
    pub swap_wait_times_by_req: BTreeMap<String, Vec<u64>>,
    /// Number of speculative purifications scheduled.
    pub psw_purify_scheduled: u64,
    /// Number of speculative purifications that improved their target.
    pub psw_purify_success: u64,
    /// Number of speculative purifications that failed and retired their target.
    pub psw_purify_fail: u64,
    /// Number of speculative attempts abandoned because the target stopped waiting.
    pub psw_cancelled: u64,
}

impl Metrics {
    /// Number of finished requests.
    pub fn finished(&self) -> usize {
        self.completed_requests.len()
    }

    /// Record a swap-wait sample for a request.
    pub(crate) fn record_swap_wait(&mut self, request: &str, slots: u64) {
        self.swap_wait_times.push(slots);
        self.swap_wait_times_by_req.entry(request.to_string()).or_default().push(slots);
    }
}

/// Run status recorded in summary rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run completed.
    Ok,
    /// The run aborted; see the error fields.
    Error,
}

/// The aggregate row of one run, in the canonical sweep column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of finished requests.
    pub finished: usize,
    /// Mean completion slot over finished requests.
    pub avg_wait: Option<f64>,
    /// Median completion slot.
    pub p50_wait: Option<f64>,
    /// 90th-percentile completion slot.
    pub p90_wait: Option<f64>,
    /// Finished requests per simulated slot.
    pub throughput: Option<f64>,
    /// Mean delivered fidelity.
    pub final_fidelity_mean: Option<f64>,
    /// 10th-percentile delivered fidelity.
    pub final_fidelity_p10: Option<f64>,
    /// Mean swap-wait sample in slots.
    pub swap_wait_time_mean: Option<f64>,
    /// Speculative purifications scheduled.
    pub psw_attempts: u64,
    /// Speculative purifications succeeded.
    pub psw_success: u64,
    /// Speculative purifications failed.
    pub psw_fail: u64,
    /// Speculative attempts cancelled.
    pub psw_cancelled: u64,
    /// Attempts per finished request.
    pub attempts_per_finished: Option<f64>,
    /// Run status.
    pub status: RunStatus,
    /// Error kind for aborted runs.
    pub error_type: Option<String>,
    /// Error message for aborted runs.
    pub error_message: Option<String>,
}

impl RunSummary {
    /// Aggregate the metrics of a completed run over `sim_span_slot` simulated slots.
    pub fn from_metrics(metrics: &Metrics, sim_span_slot: u64) -> Self {
        let wait_times: Vec<f64> =
            metrics.completed_requests.iter().map(|r| r.finish_time_slot as f64).collect();
        let fidelities: Vec<f64> =
            metrics.completed_requests.iter().map(|r| r.fidelity).collect();
        let swap_waits: Vec<f64> = metrics.swap_wait_times.iter().map(|w| *w as f64).collect();
        let finished = metrics.finished();
        Self {
            finished,
            avg_wait: mean_or_none(&wait_times),
            p50_wait: percentile(&wait_times, 50.0),
            p90_wait: percentile(&wait_times, 90.0),
            throughput: safe_div(finished as f64, sim_span_slot as f64),
            final_fidelity_mean: mean_or_none(&fidelities),
            final_fidelity_p10: percentile(&fidelities, 10.0),
            swap_wait_time_mean: mean_or_none(&swap_waits),
            psw_attempts: metrics.psw_purify_scheduled,
            psw_success: metrics.psw_purify_success,
            psw_fail: metrics.psw_purify_fail,
            psw_cancelled: metrics.psw_cancelled,
            attempts_per_finished: safe_div(metrics.psw_purify_scheduled as f64, finished as f64),
            status: RunStatus::Ok,
            error_type: None,
            error_message: None,
        }
    }

    /// The summary row of a run that aborted with an error.
    pub fn from_error(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            finished: 0,
            avg_wait: None,
            p50_wait: None,
            p90_wait: None,
            throughput: None,
            final_fidelity_mean: None,
            final_fidelity_p10: None,
            swap_wait_time_mean: None,
            psw_attempts: 0,
            psw_success: 0,
            psw_fail: 0,
            psw_cancelled: 0,
            attempts_per_finished: None,
            status: RunStatus::Error,
            error_type: Some(error_type.into()),
            error_message: Some(error_message.into()),
        }
    }

    /// Serialize the row as a JSON object.
    pub fn to_json(&self) -> Result<String, crate::types::SimError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Mean of the values, or `None` for an empty slice.
pub fn mean_or_none(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// The given percentile with linear interpolation between closest ranks, or `None` for an empty
/// slice.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut xs = values.to_vec();
    xs.sort_by(|a, b| a.partial_cmp(b).expect("percentile over NaN"));
    if pct <= 0.0 {
        return xs.first().copied();
    }
    if pct >= 100.0 {
        return xs.last().copied();
    }
    let k = (xs.len() - 1) as f64 * pct / 100.0;
    let f = k.floor() as usize;
    let c = k.ceil() as usize;
    if f == c {
        Some(xs[f])
    } else {
        Some(xs[f] + (xs[c] - xs[f]) * (k - f as f64))
    }
}

/// `numer / denom`, or `None` when the denominator is zero.
pub fn safe_div(numer: f64, denom: f64) -> Option<f64> {
    if denom == 0.0 {
        None
    } else {
        Some(numer / denom)
    }
}
