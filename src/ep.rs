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

//! The Bell-pair pool.
//!
//! A pair enters the pool through the `links_next` staging set and becomes visible to swap and
//! purify handlers once promoted into `links` at the start of the next link-maintenance sweep.
//! The pool itself is a dumb store: memory accounting against channels and ownership transfers
//! are driven by the controller, which owns both sides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models;
use crate::types::{ChannelId, EpId, NodeId, OpId, Time};

/// A single entangled pair (EP) shared between two nodes.
///
/// Only the scalar fidelity is tracked, no quantum state. A pair produced on a channel occupies
/// one of that channel's memory slots until it is consumed or retired; pairs produced by swap or
/// purify carry `channel = None` and occupy no slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ep {
    /// Unique id.
    pub id: EpId,
    /// First endpoint.
    pub a: NodeId,
    /// Second endpoint.
    pub b: NodeId,
    /// Current fidelity in `[0, 1]`.
    pub fidelity: f64,
    /// The channel this pair was generated on, or `None` for swap/purify products.
    pub channel: Option<ChannelId>,
    /// Slot at which the pair was created.
    pub created_at: Time,
    /// Physical span in meters, used by the classical-signalling delay model. Channel length
    /// for link-level pairs; sum of the input spans for swap products.
    pub length: f64,
    /// Whether the pair is unowned and available.
    pub is_free: bool,
    /// The operation owning this pair. `Some` if and only if `is_free` is `false`.
    pub owner: Option<OpId>,
}

impl Ep {
    /// The two endpoints.
    pub fn nodes(&self) -> (NodeId, NodeId) {
        (self.a, self.b)
    }

    /// Whether `node` is one of the endpoints.
    pub fn has_node(&self, node: NodeId) -> bool {
        self.a == node || self.b == node
    }

    /// Apply the decoherence kernel for `dt` seconds of storage.
    pub fn fidelity_update(&mut self, dt: f64, t_mem: f64) {
        self.fidelity = models::f_decohere(self.fidelity, dt, t_mem);
    }
}

/// The pool of live pairs: the active set `links` and the staging set `links_next`.
///
/// Both sets are keyed by the monotonically increasing [`EpId`], so iteration is in creation
/// order and the simulation stays deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpPool {
    links: BTreeMap<EpId, Ep>,
    links_next: BTreeMap<EpId, Ep>,
    next_id: u64,
}

impl EpPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new pair into `links_next` and return its id. Channel memory accounting is the
    /// caller's concern.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn stage(
        &mut self,
        a: NodeId,
        b: NodeId,
        fidelity: f64,
        channel: Option<ChannelId>,
        created_at: Time,
        length: f64,
        owner: Option<OpId>,
    ) -> EpId {
        let id = EpId(self.next_id);
        self.next_id += 1;
        self.links_next.insert(
            id,
            Ep { id, a, b, fidelity, channel, created_at, length, is_free: owner.is_none(), owner },
        );
        id
    }

    /// Promote all staged pairs into the active set.
    pub(crate) fn promote(&mut self) {
        let staged = std::mem::take(&mut self.links_next);
        self.links.extend(staged);
    }

    /// Get a pair from either set.
    pub fn get(&self, id: EpId) -> Option<&Ep> {
        self.links.get(&id).or_else(|| self.links_next.get(&id))
    }

    /// Get a mutable pair from either set.
    pub(crate) fn get_mut(&mut self, id: EpId) -> Option<&mut Ep> {
        self.links.get_mut(&id).or_else(|| self.links_next.get_mut(&id))
    }

    /// Whether the pair is still present in either set.
    pub fn contains(&self, id: EpId) -> bool {
        self.links.contains_key(&id) || self.links_next.contains_key(&id)
    }

    /// Whether the pair has been promoted into the active set. Staged pairs are invisible to
    /// the swap and purify handlers until the next link-maintenance sweep.
    pub fn is_active(&self, id: EpId) -> bool {
        self.links.contains_key(&id)
    }

    /// Remove a pair from whichever set holds it.
    pub(crate) fn remove(&mut self, id: EpId) -> Option<Ep> {
        self.links.remove(&id).or_else(|| self.links_next.remove(&id))
    }

    /// Iterate over the active set in creation order.
    pub fn links(&self) -> impl Iterator<Item = &Ep> {
        self.links.values()
    }

    /// Iterate over the staging set in creation order.
    pub fn links_next(&self) -> impl Iterator<Item = &Ep> {
        self.links_next.values()
    }

    /// Ids of the active set, in creation order.
    pub(crate) fn link_ids(&self) -> Vec<EpId> {
        self.links.keys().copied().collect()
    }

    /// Number of live pairs across both sets.
    pub fn len(&self) -> usize {
        self.links.len() + self.links_next.len()
    }

    /// Whether the pool holds no pairs at all.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.links_next.is_empty()
    }

    /// Count the live pairs generated on the given channel (both sets). Used by the invariant
    /// checks: this must always equal the channel's `memory_usage`.
    pub fn count_on_channel(&self, channel: ChannelId) -> usize {
        self.links
            .values()
            .chain(self.links_next.values())
            .filter(|ep| ep.channel == Some(channel))
            .count()
    }
}
