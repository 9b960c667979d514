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

//! # The controller
//!
//! The central scheduler driving every request's swapping tree against the clock. Each slot runs
//! three chained routines in a fixed order:
//!
//! 1. [`GenEps`](crate::event::Event::GenEps) serves queued link-generation demands, subject to
//!    per-channel memory budgets and the generation interval.
//! 2. [`HandleRequests`](crate::event::Event::HandleRequests) advances every request by the
//!    operations that were ready when the sweep started, one firing per operation per slot.
//! 3. [`ManageLinks`](crate::event::Event::ManageLinks) promotes freshly generated pairs,
//!    applies memory decoherence, retires pairs below the fidelity cut, and scans for
//!    opportunistic purification candidates.
//!
//! Swap and purify completions arrive as delayed events modelling the two-way classical
//! signalling; a completion finding its operation no longer `Running` is silently dropped, since
//! the operation may have been reset in the meantime.

use std::collections::{BTreeMap, VecDeque};

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::edp::{flatten_plan, EdpBuilder};
use crate::ep::EpPool;
use crate::event::{Event, EventQueue};
use crate::models;
use crate::network::Network;
use crate::op::{OpArena, OpKind, OpStatus};
use crate::psw::{PswRegistry, PswRole};
use crate::record::{CompletedRequest, Metrics};
use crate::types::{ChannelId, EpId, NodeId, OpId, RequestId, SimError, Time};

/// One end-to-end Bell-pair distribution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Index into the controller's request list.
    pub id: RequestId,
    /// Request name, `req{i}` for installed requests and `psw{i}` for synthetic ones.
    pub name: String,
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dst: NodeId,
    /// Scheduling priority. Currently informational; requests advance in insertion order.
    pub priority: u8,
    /// Required end-to-end fidelity.
    pub f_req: f64,
    /// Root of the swapping tree, `None` when the plan build failed.
    pub root: Option<OpId>,
    /// All operations of the tree, in flattening order.
    pub ops: Vec<OpId>,
    /// Whether the request is finished (delivered, failed to build, or, for synthetic
    /// requests, resolved).
    pub is_done: bool,
    /// Slot at which the request finished.
    pub finished_at: Option<Time>,
    /// Fidelity of the delivered pair; zero for failed builds.
    pub final_fidelity: Option<f64>,
    /// Whether this is a synthetic purify-while-swap-waiting request.
    pub is_psw: bool,
    /// For synthetic requests: the operation whose waiting pair is being improved.
    pub target_op: Option<OpId>,
}

/// # The controller
///
/// Owns the network, the pair pool, the operation arena, the request list, and the event queue,
/// and runs the whole simulation single-threadedly. See the [module documentation](self) for
/// the per-slot routine chain.
///
/// ```rust
/// use edpsim::prelude::*;
///
/// fn main() -> Result<(), SimError> {
///     let net = Network::build_line(3, ChannelSpec::default())?;
///     let (n1, n3) = (net.find_node("n1")?, net.find_node("n3")?);
///     let config = SimConfig { p_swap: 1.0, f_req: 0.7, ..Default::default() }
///         .with_sim_slots(10_000);
///     let mut controller = Controller::new(net, config);
///     controller.install_requests(&[(n1, n3)])?;
///     controller.run()?;
///     assert_eq!(controller.metrics().finished(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Controller {
    pub(crate) config: SimConfig,
    pub(crate) net: Network,
    pub(crate) pool: EpPool,
    pub(crate) ops: OpArena,
    pub(crate) requests: Vec<Request>,
    pub(crate) demand: BTreeMap<ChannelId, VecDeque<OpId>>,
    pub(crate) queue: EventQueue,
    /// Outcome stream: swap/purify success and link-generation draws.
    pub(crate) rng: StdRng,
    /// Request-generation stream, kept separate so that changing the request count does not
    /// shift the operation outcomes of a fixed seed.
    req_rng: StdRng,
    next_gen_time: Time,
    pub(crate) metrics: Metrics,
    pub(crate) psw: PswRegistry,
}

impl Controller {
    /// Create a controller over a finished topology.
    pub fn new(net: Network, config: SimConfig) -> Self {
        let queue = EventQueue::new(config.ts, config.te);
        let rng = StdRng::seed_from_u64(config.seed.wrapping_add(0x9e37_79b9_7f4a_7c15));
        let req_rng = StdRng::seed_from_u64(config.seed);
        let next_gen_time = config.ts;
        Self {
            config,
            net,
            pool: EpPool::new(),
            ops: OpArena::new(),
            requests: Vec::new(),
            demand: BTreeMap::new(),
            queue,
            rng,
            req_rng,
            next_gen_time,
            metrics: Metrics::default(),
            psw: PswRegistry::default(),
        }
    }

    /// The request-generation random stream, for use with
    /// [`NetworkBuilder::random_requests`](crate::builder::NetworkBuilder::random_requests).
    pub fn request_rng(&mut self) -> &mut StdRng {
        &mut self.req_rng
    }

    /// Convert the given `(src, dst)` pairs into internal requests and build an EDP plan for
    /// each. A pair without a route or without a plan reaching
    /// [`f_req`](crate::config::SimConfig::f_req) is marked done immediately with zero fidelity
    /// and never scheduled.
    pub fn install_requests(&mut self, pairs: &[(NodeId, NodeId)]) -> Result<(), SimError> {
        let mut builder = EdpBuilder::new(&self.net, self.config.gen_rate, self.config.plan);
        for (src, dst) in pairs.iter().copied() {
            let id = RequestId(self.requests.len());
            let name = format!("req{}", id.0);
            let path = match self.net.query_route(src, dst) {
                Ok(path) => Some(path),
                Err(SimError::NoRoute(..)) => None,
                Err(e) => return Err(e),
            };
            let plan = path.and_then(|p| builder.build(src, dst, self.config.f_req, &p));
            match plan {
                Some((latency, tree)) => {
                    log::debug!(
                        "{name}: planned {} operations, expected latency {latency:.3}s",
                        tree.size()
                    );
                    let (root, ops) = flatten_plan(&tree, id, &self.net, &mut self.ops)?;
                    self.requests.push(Request {
                        id,
                        name,
                        src,
                        dst,
                        priority: 0,
                        f_req: self.config.f_req,
                        root: Some(root),
                        ops,
                        is_done: false,
                        finished_at: None,
                        final_fidelity: None,
                        is_psw: false,
                        target_op: None,
                    });
                }
                None => {
                    log::warn!(
                        "{name}: no plan reaches fidelity {} between {src:?} and {dst:?}",
                        self.config.f_req
                    );
                    self.requests.push(Request {
                        id,
                        name,
                        src,
                        dst,
                        priority: 0,
                        f_req: self.config.f_req,
                        root: None,
                        ops: Vec::new(),
                        is_done: true,
                        finished_at: None,
                        final_fidelity: Some(0.0),
                        is_psw: false,
                        target_op: None,
                    });
                }
            }
        }
        Ok(())
    }

    /// Draw `number` random request pairs from the request-generation stream and install them.
    pub fn install_random_requests(
        &mut self,
        number: usize,
    ) -> Result<Vec<(NodeId, NodeId)>, SimError> {
        use crate::builder::NetworkBuilder;
        let pairs = self.net.random_requests(number, &mut self.req_rng);
        self.install_requests(&pairs)?;
        Ok(pairs)
    }

    /// Run the simulation until the end time, or until every request (including synthetic PSW
    /// requests) is done.
    pub fn run(&mut self) -> Result<(), SimError> {
        self.queue.push(self.config.ts, Event::GenEps);
        while let Some((t, event)) = self.queue.pop() {
            self.dispatch(t, event)?;
        }
        log::debug!(
            "simulation over at {}: {}/{} requests finished",
            self.queue.tc(),
            self.metrics.finished(),
            self.requests.iter().filter(|r| !r.is_psw).count()
        );
        Ok(())
    }

    pub(crate) fn dispatch(&mut self, t: Time, event: Event) -> Result<(), SimError> {
        match event {
            Event::GenEps => {
                self.gen_ep_routine(t);
                Ok(())
            }
            Event::HandleRequests => self.request_handler_routine(t),
            Event::ManageLinks => self.links_manager_routine(t),
            Event::SwapSucceeded { op, fidelity, length } => {
                self.complete_swap(t, op, fidelity, length)
            }
            Event::PurifyOutcome { op, new_fidelity, success_prob } => {
                self.complete_purify(t, op, new_fidelity, success_prob)
            }
        }
    }

    // ------------------------------------------------------------------------------------------
    // the three periodic routines
    // ------------------------------------------------------------------------------------------

    /// Serve one queued link-generation demand per channel, every generation interval.
    fn gen_ep_routine(&mut self, t: Time) {
        self.queue.push(t, Event::HandleRequests);
        if t < self.next_gen_time {
            return;
        }
        self.serve_demands(t);
        self.next_gen_time += self.config.gen_interval();
    }

    fn serve_demands(&mut self, t: Time) {
        let channels: Vec<ChannelId> = self.demand.keys().copied().collect();
        for qc in channels {
            loop {
                let Some(op_id) = self.demand.get(&qc).and_then(|q| q.front()).copied() else {
                    break;
                };
                // drop stale demands of operations that were reset or already served
                let op = &self.ops[op_id];
                let live = op.status == OpStatus::Waiting
                    && matches!(op.kind, OpKind::GenLink { demand_registered: true, .. });
                if !live {
                    self.demand.get_mut(&qc).expect("demand queue exists").pop_front();
                    continue;
                }
                // capacity exhausted: the demand stays at the head and is retried next interval
                if self.net.channel(qc).is_full() {
                    log::trace!("channel {} full, {} keeps waiting", self.net.channel(qc).name(), op_id);
                    break;
                }
                if self.config.p_gen < 1.0 && self.rng.gen::<f64>() >= self.config.p_gen {
                    break;
                }
                self.demand.get_mut(&qc).expect("demand queue exists").pop_front();
                let channel = self.net.channel_mut(qc);
                channel.alloc_memory();
                let (a, b) = channel.nodes();
                let (fid, length) = (channel.fidelity_init(), channel.length());
                let ep = self.pool.stage(a, b, fid, Some(qc), t, length, Some(op_id));
                let op = self.ops.get_mut(op_id).expect("demand references a live operation");
                op.ep = Some(ep);
                if let OpKind::GenLink { demand_registered, .. } = &mut op.kind {
                    *demand_registered = false;
                }
                log::trace!("generated {ep} for {op_id} on {}", self.net.channel(qc).name());
                self.op_done(t, op_id);
                break;
            }
        }
    }

    /// Advance every request by the operations that were ready when the sweep started.
    fn request_handler_routine(&mut self, t: Time) -> Result<(), SimError> {
        self.queue.push(t, Event::ManageLinks);
        for i in 0..self.requests.len() {
            if self.requests[i].is_done {
                continue;
            }
            // snapshot, so that one firing cannot cascade into multi-hop progress in one slot
            let ready: Vec<OpId> = self.requests[i]
                .ops
                .iter()
                .copied()
                .filter(|o| self.ops[*o].status == OpStatus::Ready)
                .collect();
            for op in ready {
                if self.ops[op].status != OpStatus::Ready {
                    continue;
                }
                if let Err(e) = self.run_op(t, op) {
                    match e {
                        e @ SimError::InvariantViolation(_) => return Err(e),
                        e => log::error!("error while running {op}: {e}"),
                    }
                }
                self.check_request_done(t, RequestId(i));
                if self.requests[i].is_done {
                    break;
                }
            }
            self.check_request_done(t, RequestId(i));
        }
        if !self.requests.is_empty() && self.requests.iter().all(|r| r.is_done) {
            log::debug!("all requests done at {t}, draining the event queue");
            self.queue.clear();
        }
        Ok(())
    }

    /// Promote staged pairs, decohere the pool, and scan for PSW candidates.
    fn links_manager_routine(&mut self, t: Time) -> Result<(), SimError> {
        self.queue.push(t + 1, Event::GenEps);
        self.pool.promote();
        let dt = 1.0 / self.config.accuracy as f64;
        for ep_id in self.pool.link_ids() {
            let Some(ep) = self.pool.get_mut(ep_id) else { continue };
            ep.fidelity_update(dt, self.config.t_mem);
            if ep.fidelity < self.config.f_cut {
                log::trace!("{ep_id} decohered below the cut, retiring it");
                self.decohere_ep(t, ep_id);
            }
        }
        if self.config.psw_enabled() {
            self.psw_scan(t);
        }
        Ok(())
    }

    fn check_request_done(&mut self, t: Time, req: RequestId) {
        let r = &self.requests[req.0];
        if r.is_done || r.is_psw {
            return;
        }
        let Some(root) = r.root else { return };
        if self.ops[root].status != OpStatus::Done {
            return;
        }
        let Some(ep) = self.ops[root].ep.and_then(|e| self.pool.get(e)) else { return };
        if ep.fidelity >= r.f_req {
            let fidelity = ep.fidelity;
            let r = &mut self.requests[req.0];
            r.is_done = true;
            r.finished_at = Some(t);
            r.final_fidelity = Some(fidelity);
            log::debug!("{} finished at {t} with fidelity {fidelity:.4}", r.name);
            self.metrics.completed_requests.push(CompletedRequest {
                index: req.0,
                name: self.requests[req.0].name.clone(),
                finish_time_slot: t.slots(),
                fidelity,
            });
        }
    }

    // ------------------------------------------------------------------------------------------
    // per-operation handlers
    // ------------------------------------------------------------------------------------------

    pub(crate) fn run_op(&mut self, t: Time, op: OpId) -> Result<(), SimError> {
        match self.ops[op].kind {
            OpKind::GenLink { .. } => {
                self.handle_gen_link(op);
                Ok(())
            }
            OpKind::Swap { .. } => self.handle_swap(t, op),
            OpKind::Purify { .. } => self.handle_purify(t, op),
        }
    }

    /// Register a link-generation demand on the owning channel's queue. Idempotent through the
    /// `demand_registered` gate; the channel scan in [`Event::GenEps`] is what eventually
    /// completes the operation.
    fn handle_gen_link(&mut self, op_id: OpId) {
        let op = self.ops.get_mut(op_id).expect("handler runs on a live operation");
        op.status = OpStatus::Waiting;
        let OpKind::GenLink { channel, demand_registered } = &mut op.kind else {
            unreachable!("handle_gen_link on a non-gen-link operation")
        };
        if *demand_registered {
            return;
        }
        *demand_registered = true;
        let qc = *channel;
        self.demand.entry(qc).or_default().push_back(op_id);
        log::trace!("{op_id} queued a demand on {}", self.net.channel(qc).name());
    }

    fn handle_swap(&mut self, t: Time, op_id: OpId) -> Result<(), SimError> {
        let OpKind::Swap { via, left, right } = self.ops[op_id].kind else {
            unreachable!("handle_swap on a non-swap operation")
        };
        let left_ep = self.ops[left].ep.filter(|e| self.pool.contains(*e));
        let right_ep = self.ops[right].ep.filter(|e| self.pool.contains(*e));
        let (Some(left_ep), Some(right_ep)) = (left_ep, right_ep) else {
            // an input vanished between readiness and firing: rebuild the missing side only
            log::debug!("{op_id} is missing an input pair, regenerating");
            if left_ep.is_none() {
                self.request_regen(t, left);
            }
            if right_ep.is_none() {
                self.request_regen(t, right);
            }
            self.ops[op_id].status = OpStatus::Waiting;
            return Ok(());
        };
        if !self.pool.is_active(left_ep) || !self.pool.is_active(right_ep) {
            // an input is still staged; it becomes usable after the next promotion
            return Ok(());
        }
        let le = self.pool.get(left_ep).expect("checked above").clone();
        let re = self.pool.get(right_ep).expect("checked above").clone();
        if !(le.has_node(via) && re.has_node(via)) {
            return Err(SimError::InvariantViolation(format!(
                "{op_id} swaps at {via:?}, but its inputs span {:?} and {:?}",
                le.nodes(),
                re.nodes()
            )));
        }

        let req_name = self.requests[self.ops[op_id].request.0].name.clone();
        self.metrics.record_swap_wait(&req_name, t.since(le.created_at));
        self.metrics.record_swap_wait(&req_name, t.since(re.created_at));

        self.consume_ep(left_ep)?;
        self.consume_ep(right_ep)?;
        self.ops[op_id].status = OpStatus::Running;

        if self.rng.gen::<f64>() < self.config.p_swap {
            let fidelity = models::f_swap(le.fidelity, re.fidelity);
            let length = le.length + re.length;
            let delay =
                models::classical_delay_slots(le.length.max(re.length), self.config.accuracy);
            log::trace!("{op_id} swap succeeded, completion in {delay} slots");
            self.queue.push(t + delay, Event::SwapSucceeded { op: op_id, fidelity, length });
        } else {
            log::trace!("{op_id} swap failed, regenerating the subtree");
            self.request_regen(t, op_id);
        }
        Ok(())
    }

    fn complete_swap(
        &mut self,
        t: Time,
        op_id: OpId,
        fidelity: f64,
        length: f64,
    ) -> Result<(), SimError> {
        if self.ops[op_id].status != OpStatus::Running {
            log::trace!("stale swap completion for {op_id}, dropping");
            return Ok(());
        }
        let (a, b) = (self.ops[op_id].a, self.ops[op_id].b);
        let ep = self.pool.stage(a, b, fidelity, None, t, length, Some(op_id));
        self.ops[op_id].ep = Some(ep);
        self.op_done(t, op_id);
        Ok(())
    }

    fn handle_purify(&mut self, t: Time, op_id: OpId) -> Result<(), SimError> {
        let OpKind::Purify { child, target_ep, sacrifice_ep } = self.ops[op_id].kind else {
            unreachable!("handle_purify on a non-purify operation")
        };
        let (Some(target), Some(sacrifice)) = (target_ep, sacrifice_ep) else {
            return Err(SimError::InvariantViolation(format!(
                "{op_id} fired without both purification inputs"
            )));
        };
        if !self.pool.contains(target) {
            log::debug!("{op_id} lost its purification target, regenerating");
            if self.psw.role_of(op_id) == Some(PswRole::Purify) {
                self.psw_abort(t, op_id);
            } else {
                self.request_regen(t, op_id);
            }
            return Ok(());
        }
        if !self.pool.contains(sacrifice) {
            log::debug!("{op_id} lost its sacrificial pair, regenerating the child");
            if self.psw.role_of(op_id) == Some(PswRole::Purify) {
                self.psw_abort(t, op_id);
                return Ok(());
            }
            if let OpKind::Purify { sacrifice_ep, .. } = &mut self.ops[op_id].kind {
                *sacrifice_ep = None;
            }
            self.ops[op_id].status = OpStatus::Waiting;
            self.request_regen(t, child);
            return Ok(());
        }
        if !self.pool.is_active(target) || !self.pool.is_active(sacrifice) {
            // an input is still staged; it becomes usable after the next promotion
            return Ok(());
        }

        let ft = self.pool.get(target).expect("checked above").fidelity;
        let fs = self.pool.get(sacrifice).expect("checked above").fidelity;
        let target_length = self.pool.get(target).expect("checked above").length;
        let new_fidelity = models::f_pur(ft, fs);
        let success_prob = models::p_pur(ft, fs);

        // the sacrifice is consumed up front; its fidelity is already folded in
        self.consume_ep(sacrifice)?;
        self.ops[op_id].status = OpStatus::Running;
        let delay = models::classical_delay_slots(target_length, self.config.accuracy);
        log::trace!(
            "{op_id} purifies {ft:.4} with {fs:.4}: p={success_prob:.4}, outcome in {delay} slots"
        );
        self.queue.push(t + delay, Event::PurifyOutcome { op: op_id, new_fidelity, success_prob });
        Ok(())
    }

    fn complete_purify(
        &mut self,
        t: Time,
        op_id: OpId,
        new_fidelity: f64,
        success_prob: f64,
    ) -> Result<(), SimError> {
        if self.ops[op_id].status != OpStatus::Running {
            log::trace!("stale purify completion for {op_id}, dropping");
            return Ok(());
        }
        if self.psw.role_of(op_id) == Some(PswRole::Purify) {
            return self.psw_complete_purify(t, op_id, new_fidelity, success_prob);
        }
        let OpKind::Purify { target_ep, .. } = self.ops[op_id].kind else {
            unreachable!("purify completion for a non-purify operation")
        };
        let Some(target) = target_ep else {
            return Err(SimError::InvariantViolation(format!(
                "{op_id} completed a purification without a target"
            )));
        };
        if !self.pool.contains(target) {
            log::debug!("{op_id}'s target decohered before the purification signal arrived");
            self.request_regen(t, op_id);
            return Ok(());
        }
        if self.rng.gen::<f64>() < success_prob {
            self.pool.get_mut(target).expect("checked above").fidelity = new_fidelity;
            let op = self.ops.get_mut(op_id).expect("completion references a live operation");
            if let OpKind::Purify { target_ep, .. } = &mut op.kind {
                *target_ep = None;
            }
            op.ep = Some(target);
            log::trace!("{op_id} purification succeeded, fidelity now {new_fidelity:.4}");
            self.op_done(t, op_id);
        } else {
            log::trace!("{op_id} purification failed, regenerating");
            self.consume_ep(target)?;
            self.request_regen(t, op_id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------------------------
    // the status machine
    // ------------------------------------------------------------------------------------------

    /// Mark an operation done and notify its parent (and, for PSW clone roots, the PSW
    /// subsystem).
    pub(crate) fn op_done(&mut self, t: Time, op_id: OpId) {
        self.ops[op_id].status = OpStatus::Done;
        log::trace!("{op_id} ({}) done", self.ops[op_id].kind.name());
        if let Some(parent) = self.ops[op_id].parent {
            self.judge_ready(t, parent);
        }
        if self.psw.is_sacrificial_root(op_id) {
            self.psw_sacrifice_ready(t, op_id);
        }
    }

    /// Re-evaluate an operation after one of its children completed.
    pub(crate) fn judge_ready(&mut self, t: Time, op_id: OpId) {
        match self.ops[op_id].kind {
            OpKind::GenLink { .. } => {
                if self.ops[op_id].status.is_pending() {
                    self.ops[op_id].status = OpStatus::Ready;
                }
            }
            OpKind::Swap { .. } => {
                if self.ops[op_id].status.is_pending() && self.ops.all_children_done(op_id) {
                    self.ops[op_id].status = OpStatus::Ready;
                }
            }
            OpKind::Purify { child, .. } => {
                if self.ops[child].status != OpStatus::Done {
                    return;
                }
                let Some(ep_id) = self.ops[child].ep.take() else { return };
                if let Some(ep) = self.pool.get_mut(ep_id) {
                    ep.owner = Some(op_id);
                    ep.is_free = false;
                }
                let op = self.ops.get_mut(op_id).expect("parent of a live operation");
                let OpKind::Purify { target_ep, sacrifice_ep, .. } = &mut op.kind else {
                    unreachable!()
                };
                if target_ep.is_none() {
                    *target_ep = Some(ep_id);
                    op.status = OpStatus::Waiting;
                    // the child runs a second time to produce the sacrifice
                    self.request_regen(t, child);
                } else if sacrifice_ep.is_none() {
                    *sacrifice_ep = Some(ep_id);
                    op.status = OpStatus::Ready;
                } else {
                    log::error!("{op_id} received a third purification input, ignoring it");
                }
            }
        }
    }

    /// Reset an operation and its whole subtree so that everything is produced again: held
    /// pairs are released, gen-link leaves become `Ready`, internal nodes `Retry`.
    pub(crate) fn request_regen(&mut self, t: Time, op_id: OpId) {
        if self.psw.role_of(op_id) == Some(PswRole::Purify) {
            // a speculative purification never rebuilds anything: fold it up instead
            self.psw_abort(t, op_id);
            return;
        }
        let mut held: Vec<EpId> = Vec::new();
        let op = self.ops.get_mut(op_id).expect("regen on a live operation");
        held.extend(op.ep.take());
        match &mut op.kind {
            OpKind::GenLink { demand_registered, .. } => {
                *demand_registered = false;
                op.status = OpStatus::Ready;
            }
            OpKind::Swap { .. } => op.status = OpStatus::Retry,
            OpKind::Purify { target_ep, sacrifice_ep, .. } => {
                held.extend(target_ep.take());
                held.extend(sacrifice_ep.take());
                op.status = OpStatus::Retry;
            }
        }
        for ep in held {
            if self.pool.contains(ep) {
                self.delete_ep(ep);
            }
        }
        for child in self.ops[op_id].children() {
            self.request_regen(t, child);
        }
    }

    // ------------------------------------------------------------------------------------------
    // pair lifecycle
    // ------------------------------------------------------------------------------------------

    /// Consume a pair held by an operation: detach it from its owner and delete it.
    pub(crate) fn consume_ep(&mut self, ep_id: EpId) -> Result<(), SimError> {
        let owner = self
            .pool
            .get(ep_id)
            .ok_or(SimError::EpNotFound(ep_id))?
            .owner
            .ok_or_else(|| {
                SimError::InvariantViolation(format!("consuming the unowned pair {ep_id}"))
            })?;
        self.detach_ep(owner, ep_id);
        self.delete_ep(ep_id);
        Ok(())
    }

    /// Remove a pair from the pool, releasing its channel memory slot.
    pub(crate) fn delete_ep(&mut self, ep_id: EpId) {
        if let Some(ep) = self.pool.remove(ep_id) {
            if let Some(qc) = ep.channel {
                self.net.channel_mut(qc).free_memory();
            }
        }
    }

    /// Retire a pair that decohered below the cut: clear its ownership, delete it, and notify
    /// the owning operation so the subtree is rebuilt.
    pub(crate) fn decohere_ep(&mut self, t: Time, ep_id: EpId) {
        let owner = self.pool.get(ep_id).and_then(|ep| ep.owner);
        if let Some(owner) = owner {
            self.detach_ep(owner, ep_id);
        }
        self.delete_ep(ep_id);
        if let Some(owner) = owner {
            self.request_regen(t, owner);
        }
    }

    /// Clear every reference the owner holds on the given pair.
    fn detach_ep(&mut self, owner: OpId, ep_id: EpId) {
        let Some(op) = self.ops.get_mut(owner) else { return };
        if op.ep == Some(ep_id) {
            op.ep = None;
        }
        if let OpKind::Purify { target_ep, sacrifice_ep, .. } = &mut op.kind {
            if *target_ep == Some(ep_id) {
                *target_ep = None;
            }
            if *sacrifice_ep == Some(ep_id) {
                *sacrifice_ep = None;
            }
        }
        if let Some(ep) = self.pool.get_mut(ep_id) {
            ep.owner = None;
            ep.is_free = true;
        }
    }

    // ------------------------------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------------------------------

    /// The metrics collected so far.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The network.
    pub fn network(&self) -> &Network {
        &self.net
    }

    /// The configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// All requests, installed and synthetic.
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// The operation arena.
    pub fn ops(&self) -> &OpArena {
        &self.ops
    }

    /// The pair pool.
    pub fn pool(&self) -> &EpPool {
        &self.pool
    }

    /// The current simulation time.
    pub fn tc(&self) -> Time {
        self.queue.tc()
    }

    /// Verify the cross-structure invariants: channel memory accounting, pair/owner coherence,
    /// product presence for exposed completed operations, and PSW bookkeeping. Returns the
    /// first violation found.
    pub fn check_invariants(&self) -> Result<(), SimError> {
        // channel memory counters match the pool
        for qc in self.net.channel_ids() {
            let channel = self.net.channel(qc);
            if channel.memory_usage() > channel.memory_capacity() {
                return Err(SimError::InvariantViolation(format!(
                    "{} holds {} pairs over its capacity {}",
                    channel.name(),
                    channel.memory_usage(),
                    channel.memory_capacity()
                )));
            }
            let live = self.pool.count_on_channel(qc);
            if live != channel.memory_usage() {
                return Err(SimError::InvariantViolation(format!(
                    "{} accounts for {} pairs but the pool holds {live}",
                    channel.name(),
                    channel.memory_usage()
                )));
            }
        }
        // ownership coherence
        for ep in self.pool.links().chain(self.pool.links_next()) {
            if ep.owner.is_some() == ep.is_free {
                return Err(SimError::InvariantViolation(format!(
                    "{} has owner {:?} but is_free = {}",
                    ep.id, ep.owner, ep.is_free
                )));
            }
            if let Some(owner) = ep.owner {
                let op = self.ops.get(owner).ok_or_else(|| {
                    SimError::InvariantViolation(format!("{} is owned by unknown {owner}", ep.id))
                })?;
                let referenced = op.ep == Some(ep.id)
                    || matches!(
                        op.kind,
                        OpKind::Purify { target_ep, sacrifice_ep, .. }
                            if target_ep == Some(ep.id) || sacrifice_ep == Some(ep.id)
                    );
                if !referenced {
                    return Err(SimError::InvariantViolation(format!(
                        "{} is owned by {owner}, which does not reference it",
                        ep.id
                    )));
                }
            }
        }
        // a completed operation whose product was not yet consumed still holds it
        for op in self.ops.iter() {
            if op.status != OpStatus::Done || self.psw.is_busy_target(op.id) {
                continue;
            }
            let exposed = match op.parent {
                None => !self.requests[op.request.0].is_psw,
                Some(p) => {
                    matches!(self.ops[p].kind, OpKind::Swap { .. })
                        && matches!(self.ops[p].status, OpStatus::Waiting | OpStatus::Ready)
                }
            };
            if exposed && op.ep.and_then(|e| self.pool.get(e)).is_none() {
                return Err(SimError::InvariantViolation(format!(
                    "{} is done but its product is gone",
                    op.id
                )));
            }
        }
        self.psw.check()
    }
}
