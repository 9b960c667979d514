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

//! Purify-while-swap-waiting (PSW).
//!
//! When one half of a pending swap already delivered its pair and that pair drifts below the
//! configured threshold, the controller speculatively clones the subtree that produced it under
//! a synthetic request. Once the clone delivers a sacrificial pair and the original pair is
//! still waiting, a purification round is spliced in; on success the improved pair is handed
//! back to the original operation. The speculation never blocks the original request: if the
//! target resolves first, the attempt is cancelled and the sacrificial pair discarded.

use std::collections::{BTreeMap, BTreeSet};

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::controller::{Controller, Request};
use crate::op::{OpKind, OpStatus};
use crate::types::{EpId, OpId, RequestId, SimError, Time};

/// What a registered operation does for its PSW group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PswRole {
    /// Root of the cloned subtree manufacturing the sacrificial pair.
    Sacrificial,
    /// The spliced-in purification consuming the sacrifice.
    Purify,
}

/// Bookkeeping for one registered PSW operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PswMeta {
    /// The operation whose waiting pair is being improved.
    pub target: OpId,
    /// Role of the registered operation.
    pub role: PswRole,
    /// The group this operation belongs to, keyed by the clone root.
    pub group: OpId,
    /// The synthetic request carrying the group's operations.
    pub request: RequestId,
}

/// One active speculation: the cloned operations plus the synthetic request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PswGroup {
    /// All operations of the group, clone subtree first, splice purify last.
    pub ops: Vec<OpId>,
    /// The synthetic request.
    pub request: RequestId,
}

/// All PSW state of the controller: a single metadata map plus the group registry and the set
/// of targets with a speculation in flight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PswRegistry {
    pub(crate) meta: BTreeMap<OpId, PswMeta>,
    pub(crate) groups: BTreeMap<OpId, PswGroup>,
    pub(crate) busy_targets: BTreeSet<OpId>,
    spawned: usize,
}

impl PswRegistry {
    /// The role of an operation, if it is registered.
    pub fn role_of(&self, op: OpId) -> Option<PswRole> {
        self.meta.get(&op).map(|m| m.role)
    }

    /// The metadata of an operation, if it is registered.
    pub fn meta(&self, op: OpId) -> Option<&PswMeta> {
        self.meta.get(&op)
    }

    /// Whether the operation is the root of a live clone subtree.
    pub fn is_sacrificial_root(&self, op: OpId) -> bool {
        self.meta.get(&op).map(|m| m.role == PswRole::Sacrificial && m.group == op).unwrap_or(false)
    }

    /// Whether a speculation currently targets this operation.
    pub fn is_busy_target(&self, op: OpId) -> bool {
        self.busy_targets.contains(&op)
    }

    /// Number of active groups.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Verify the registry invariants: every metadata entry points into a live group, every
    /// registered operation sits in exactly one group, and every group has a busy target.
    pub(crate) fn check(&self) -> Result<(), SimError> {
        for (op, meta) in &self.meta {
            let group = self.groups.get(&meta.group).ok_or_else(|| {
                SimError::InvariantViolation(format!("{op} references the dead group {}", meta.group))
            })?;
            if !group.ops.contains(op) {
                return Err(SimError::InvariantViolation(format!(
                    "{op} is registered for group {} but not listed in it",
                    meta.group
                )));
            }
        }
        let mut seen: BTreeSet<OpId> = BTreeSet::new();
        for group in self.groups.values() {
            for op in &group.ops {
                if !seen.insert(*op) {
                    return Err(SimError::InvariantViolation(format!(
                        "{op} is referenced by more than one PSW group"
                    )));
                }
            }
        }
        if self.busy_targets.len() != self.groups.len() {
            return Err(SimError::InvariantViolation(format!(
                "{} busy targets for {} PSW groups",
                self.busy_targets.len(),
                self.groups.len()
            )));
        }
        Ok(())
    }
}

impl Controller {
    /// Scan every pending non-synthetic request for waiting pairs below the PSW threshold and
    /// schedule a speculation for each eligible one. Called from the link-maintenance sweep,
    /// after promotion and decoherence.
    pub(crate) fn psw_scan(&mut self, t: Time) {
        let Some(threshold) = self.config.psw_threshold else { return };
        for i in 0..self.requests.len() {
            if self.requests[i].is_psw || self.requests[i].is_done {
                continue;
            }
            for op_id in self.requests[i].ops.clone() {
                if self.ops[op_id].threshold_purified || self.psw.is_busy_target(op_id) {
                    continue;
                }
                let Some(ep_id) = self.exposed_waiting_ep(op_id) else { continue };
                let fidelity = self.pool.get(ep_id).map(|ep| ep.fidelity).unwrap_or(1.0);
                if fidelity >= threshold {
                    continue;
                }
                log::debug!(
                    "{op_id} exposes {ep_id} at fidelity {fidelity:.4} < {threshold}, \
                     scheduling a speculative purification"
                );
                self.psw_schedule(t, op_id);
            }
        }
    }

    /// The pair an operation exposes while waiting for the rest of its tree, if any: either a
    /// completed operation whose parent has not consumed the product yet, or a purify holding
    /// its target while the sacrifice is being regenerated.
    pub(crate) fn exposed_waiting_ep(&self, op_id: OpId) -> Option<EpId> {
        let op = &self.ops[op_id];
        let ep = match (&op.kind, op.status) {
            (OpKind::Purify { target_ep: Some(te), sacrifice_ep: None, .. }, OpStatus::Waiting) => {
                Some(*te)
            }
            (_, OpStatus::Done) => match op.parent {
                Some(p) if self.ops[p].status.is_pending() => op.ep,
                _ => None,
            },
            _ => None,
        };
        ep.filter(|e| self.pool.contains(*e))
    }

    /// Clone the target's subtree under a fresh synthetic request and register the group.
    fn psw_schedule(&mut self, _t: Time, target_op: OpId) {
        let req_id = RequestId(self.requests.len());
        let name = format!("psw{}", self.psw.spawned);
        self.psw.spawned += 1;
        let origin = self.ops[target_op].request;
        let f_req = self.requests[origin.0].f_req;
        let (a, b) = (self.ops[target_op].a, self.ops[target_op].b);

        let mut ops = Vec::new();
        let root = self.clone_subtree(target_op, req_id, &mut ops);

        self.requests.push(Request {
            id: req_id,
            name,
            src: a,
            dst: b,
            priority: 0,
            f_req,
            root: Some(root),
            ops: ops.clone(),
            is_done: false,
            finished_at: None,
            final_fidelity: None,
            is_psw: true,
            target_op: Some(target_op),
        });
        self.psw.groups.insert(root, PswGroup { ops, request: req_id });
        self.psw.meta.insert(
            root,
            PswMeta { target: target_op, role: PswRole::Sacrificial, group: root, request: req_id },
        );
        self.psw.busy_targets.insert(target_op);
        self.metrics.psw_purify_scheduled += 1;
    }

    /// Clone an operation subtree verbatim: same kinds and endpoints, fresh ids, leaves
    /// `Ready`, internals `Waiting`.
    fn clone_subtree(&mut self, src: OpId, request: RequestId, ops: &mut Vec<OpId>) -> OpId {
        let (a, b) = (self.ops[src].a, self.ops[src].b);
        let id = match self.ops[src].kind {
            OpKind::GenLink { channel, .. } => self.ops.alloc(
                OpKind::GenLink { channel, demand_registered: false },
                a,
                b,
                OpStatus::Ready,
                request,
            ),
            OpKind::Swap { via, left, right } => {
                let left = self.clone_subtree(left, request, ops);
                let right = self.clone_subtree(right, request, ops);
                let id = self.ops.alloc(
                    OpKind::Swap { via, left, right },
                    a,
                    b,
                    OpStatus::Waiting,
                    request,
                );
                self.ops[left].parent = Some(id);
                self.ops[right].parent = Some(id);
                id
            }
            OpKind::Purify { child, .. } => {
                let child = self.clone_subtree(child, request, ops);
                let id = self.ops.alloc(
                    OpKind::Purify { child, target_ep: None, sacrifice_ep: None },
                    a,
                    b,
                    OpStatus::Waiting,
                    request,
                );
                self.ops[child].parent = Some(id);
                id
            }
        };
        ops.push(id);
        id
    }

    /// The clone root delivered its sacrificial pair. If the original target is still waiting,
    /// splice a purification in; otherwise discard the sacrifice and cancel.
    pub(crate) fn psw_sacrifice_ready(&mut self, t: Time, root: OpId) {
        let Some(meta) = self.psw.meta.get(&root).cloned() else { return };
        let Some(sacrifice) = self.ops[root].ep else {
            log::error!("PSW clone root {root} completed without a pair");
            return;
        };
        let target = meta.target;
        match self.exposed_waiting_ep(target) {
            Some(target_pair) => {
                let (a, b) = (self.ops[target].a, self.ops[target].b);
                let purify = self.ops.alloc(
                    OpKind::Purify {
                        child: target,
                        target_ep: Some(target_pair),
                        sacrifice_ep: Some(sacrifice),
                    },
                    a,
                    b,
                    OpStatus::Ready,
                    meta.request,
                );
                // the purify takes over both pairs
                self.ops[root].ep = None;
                if let Some(ep) = self.pool.get_mut(sacrifice) {
                    ep.owner = Some(purify);
                }
                self.steal_waiting_ep(target, target_pair);
                if let Some(ep) = self.pool.get_mut(target_pair) {
                    ep.owner = Some(purify);
                    ep.is_free = false;
                }
                self.psw.meta.insert(
                    purify,
                    PswMeta { target, role: PswRole::Purify, group: meta.group, request: meta.request },
                );
                self.psw
                    .groups
                    .get_mut(&meta.group)
                    .expect("group of a registered root")
                    .ops
                    .push(purify);
                self.requests[meta.request.0].ops.push(purify);
                log::debug!("{purify} splices a purification onto {target} (target pair {target_pair})");
            }
            None => {
                log::debug!("{target} stopped waiting, cancelling the speculation of {root}");
                if self.pool.contains(sacrifice) {
                    let _ = self.consume_ep(sacrifice);
                }
                self.metrics.psw_cancelled += 1;
                self.psw_cleanup_group(meta.group, target);
                self.finish_psw_request(t, meta.request);
            }
        }
    }

    /// Detach the exposed pair from the target operation's slot, so the splice purify can hold
    /// it exclusively.
    fn steal_waiting_ep(&mut self, target: OpId, ep: EpId) {
        let op = self.ops.get_mut(target).expect("target of a registered group");
        if op.ep == Some(ep) {
            op.ep = None;
        }
        if let OpKind::Purify { target_ep, .. } = &mut op.kind {
            if *target_ep == Some(ep) {
                *target_ep = None;
            }
        }
    }

    /// Hand the (possibly improved) pair back to the target operation. Returns `false` when the
    /// target moved on and can no longer accept it.
    fn restore_waiting_ep(&mut self, target: OpId, ep: EpId) -> bool {
        let restored = {
            let op = self.ops.get_mut(target).expect("target of a registered group");
            let status = op.status;
            let product_empty = op.ep.is_none();
            match &mut op.kind {
                OpKind::Purify { target_ep, sacrifice_ep, .. }
                    if status == OpStatus::Waiting
                        && target_ep.is_none()
                        && sacrifice_ep.is_none() =>
                {
                    *target_ep = Some(ep);
                    true
                }
                _ if status == OpStatus::Done && product_empty => {
                    op.ep = Some(ep);
                    true
                }
                _ => false,
            }
        };
        if restored {
            if let Some(pair) = self.pool.get_mut(ep) {
                pair.owner = Some(target);
                pair.is_free = false;
            }
        }
        restored
    }

    /// Resolve a speculative purification outcome. Mirrors the regular purify completion, but
    /// splices the result back into the original request instead of propagating to a parent.
    pub(crate) fn psw_complete_purify(
        &mut self,
        t: Time,
        op_id: OpId,
        new_fidelity: f64,
        success_prob: f64,
    ) -> Result<(), SimError> {
        let Some(meta) = self.psw.meta.get(&op_id).cloned() else {
            return Err(SimError::InvariantViolation(format!(
                "{op_id} completed a PSW purification without registration"
            )));
        };
        let target = meta.target;
        let OpKind::Purify { target_ep, .. } = self.ops[op_id].kind else {
            unreachable!("PSW purify completion for a non-purify operation")
        };
        self.ops[op_id].status = OpStatus::Done;
        if let OpKind::Purify { target_ep, .. } = &mut self.ops[op_id].kind {
            *target_ep = None;
        }

        match target_ep.filter(|e| self.pool.contains(*e)) {
            None => {
                log::debug!("the target pair of {op_id} vanished mid-flight, cancelling");
                self.metrics.psw_cancelled += 1;
                self.request_regen(t, target);
            }
            Some(pair) => {
                if self.rng.gen::<f64>() < success_prob {
                    self.pool.get_mut(pair).expect("checked above").fidelity = new_fidelity;
                    if self.restore_waiting_ep(target, pair) {
                        log::debug!(
                            "speculative purification of {target} succeeded, fidelity now \
                             {new_fidelity:.4}"
                        );
                        self.metrics.psw_purify_success += 1;
                    } else {
                        log::debug!("{target} stopped waiting mid-flight, discarding the result");
                        if let Some(ep) = self.pool.get_mut(pair) {
                            ep.owner = None;
                            ep.is_free = true;
                        }
                        self.delete_ep(pair);
                        self.metrics.psw_cancelled += 1;
                    }
                } else {
                    log::debug!("speculative purification of {target} failed");
                    if let Some(ep) = self.pool.get_mut(pair) {
                        ep.owner = None;
                        ep.is_free = true;
                    }
                    self.delete_ep(pair);
                    self.request_regen(t, target);
                    self.metrics.psw_purify_fail += 1;
                }
                self.ops[target].threshold_purified = true;
            }
        }

        self.psw_cleanup_group(meta.group, target);
        self.finish_psw_request(t, meta.request);
        Ok(())
    }

    /// Abandon a speculative purification before its outcome resolved: return the target pair
    /// if it is still around, discard the sacrifice, and fold the group up.
    pub(crate) fn psw_abort(&mut self, t: Time, op_id: OpId) {
        let Some(meta) = self.psw.meta.get(&op_id).cloned() else { return };
        let target = meta.target;
        let (held_target, held_sacrifice) = {
            let op = self.ops.get_mut(op_id).expect("abort on a live operation");
            op.status = OpStatus::Done;
            match &mut op.kind {
                OpKind::Purify { target_ep, sacrifice_ep, .. } => {
                    (target_ep.take(), sacrifice_ep.take())
                }
                _ => (None, None),
            }
        };
        if let Some(ep) = held_sacrifice.filter(|e| self.pool.contains(*e)) {
            if let Some(pair) = self.pool.get_mut(ep) {
                pair.owner = None;
                pair.is_free = true;
            }
            self.delete_ep(ep);
        }
        match held_target.filter(|e| self.pool.contains(*e)) {
            Some(ep) => {
                if !self.restore_waiting_ep(target, ep) {
                    if let Some(pair) = self.pool.get_mut(ep) {
                        pair.owner = None;
                        pair.is_free = true;
                    }
                    self.delete_ep(ep);
                    self.request_regen(t, target);
                }
            }
            None => {
                // the target pair is already gone; rebuild promptly
                self.request_regen(t, target);
            }
        }
        log::debug!("aborted the speculative purification {op_id} targeting {target}");
        self.metrics.psw_cancelled += 1;
        self.psw_cleanup_group(meta.group, target);
        self.finish_psw_request(t, meta.request);
    }

    /// Drop all bookkeeping of a group: metadata of every member, the group entry, and the busy
    /// mark on the target.
    fn psw_cleanup_group(&mut self, group: OpId, target: OpId) {
        if let Some(g) = self.psw.groups.remove(&group) {
            for op in g.ops {
                self.psw.meta.remove(&op);
            }
        }
        self.psw.busy_targets.remove(&target);
    }

    /// Mark a synthetic request as resolved.
    fn finish_psw_request(&mut self, t: Time, request: RequestId) {
        let r = &mut self.requests[request.0];
        r.is_done = true;
        r.finished_at = Some(t);
    }
}
