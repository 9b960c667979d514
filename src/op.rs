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

//! Operations of a swapping tree and their status machine.
//!
//! Operations live in an append-only arena owned by the controller; every relation
//! (parent/children, owning request, produced pair) is an id. The status transitions themselves
//! are driven by the controller, since they touch the pair pool and channel memory.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, EpId, NodeId, OpId, RequestId};

/// Status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpStatus {
    /// Waiting for children to complete.
    Waiting,
    /// All inputs available; the next request-handler sweep may run it.
    Ready,
    /// Fired; a delayed completion (or a link-generation grant) is outstanding.
    Running,
    /// Completed; the produced pair is recorded in `ep`.
    Done,
    /// Reset after a failure; becomes `Ready` again once the children are rebuilt.
    Retry,
}

impl OpStatus {
    /// Whether the status counts as "not yet fired": `Waiting` or `Retry`.
    pub fn is_pending(self) -> bool {
        matches!(self, OpStatus::Waiting | OpStatus::Retry)
    }
}

/// The type-specific payload of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    /// Generate one link-level pair on a channel. Always a leaf.
    GenLink {
        /// The channel to generate on.
        channel: ChannelId,
        /// Gate making demand registration idempotent: set while a demand for this operation
        /// sits in the channel queue or a grant is outstanding.
        demand_registered: bool,
    },
    /// Combine the pairs of the two children at the shared node `via`.
    Swap {
        /// The node performing the Bell-state measurement.
        via: NodeId,
        /// Child producing the pair on the `(a, via)` side.
        left: OpId,
        /// Child producing the pair on the `(via, b)` side.
        right: OpId,
    },
    /// Consume a sacrificial pair to improve a target pair over the same endpoints.
    Purify {
        /// The subtree producing both input pairs (the target first, then, after a
        /// re-generation, the sacrifice).
        child: OpId,
        /// The pair being improved. First input acquired.
        target_ep: Option<EpId>,
        /// The pair consumed by the round. Second input acquired.
        sacrifice_ep: Option<EpId>,
    },
}

impl OpKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::GenLink { .. } => "gen-link",
            OpKind::Swap { .. } => "swap",
            OpKind::Purify { .. } => "purify",
        }
    }
}

/// A single node of a swapping tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    /// Arena id.
    pub id: OpId,
    /// Type-specific payload.
    pub kind: OpKind,
    /// First endpoint of the pair this operation delivers.
    pub a: NodeId,
    /// Second endpoint of the pair this operation delivers.
    pub b: NodeId,
    /// Current status.
    pub status: OpStatus,
    /// Parent in the tree, if any.
    pub parent: Option<OpId>,
    /// The request owning this operation.
    pub request: RequestId,
    /// The produced pair once `Done`.
    pub ep: Option<EpId>,
    /// Latch preventing repeated opportunistic purification of the same waiting pair.
    pub threshold_purified: bool,
}

impl Op {
    /// Whether the operation has no children.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, OpKind::GenLink { .. })
    }

    /// The children in tree order (empty for leaves).
    pub fn children(&self) -> Vec<OpId> {
        match &self.kind {
            OpKind::GenLink { .. } => vec![],
            OpKind::Swap { left, right, .. } => vec![*left, *right],
            OpKind::Purify { child, .. } => vec![*child],
        }
    }
}

/// Append-only arena of operations. Ids are never reused; completed trees simply stay in place
/// until the simulation ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpArena {
    ops: Vec<Op>,
}

impl OpArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new operation and return its id. `parent` is wired later by the caller where
    /// the tree is built bottom-up.
    pub(crate) fn alloc(
        &mut self,
        kind: OpKind,
        a: NodeId,
        b: NodeId,
        status: OpStatus,
        request: RequestId,
    ) -> OpId {
        let id = OpId(self.ops.len());
        self.ops.push(Op {
            id,
            kind,
            a,
            b,
            status,
            parent: None,
            request,
            ep: None,
            threshold_purified: false,
        });
        id
    }

    /// Get a reference to an operation.
    pub fn get(&self, id: OpId) -> Option<&Op> {
        self.ops.get(id.0)
    }

    /// Get a mutable reference to an operation.
    pub(crate) fn get_mut(&mut self, id: OpId) -> Option<&mut Op> {
        self.ops.get_mut(id.0)
    }

    /// Whether all children of the operation are `Done` (vacuously true for leaves).
    pub fn all_children_done(&self, id: OpId) -> bool {
        self[id].children().iter().all(|c| self[*c].status == OpStatus::Done)
    }

    /// The number of operations ever allocated.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate over all operations in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter()
    }
}

impl std::ops::Index<OpId> for OpArena {
    type Output = Op;

    fn index(&self, id: OpId) -> &Op {
        &self.ops[id.0]
    }
}

impl std::ops::IndexMut<OpId> for OpArena {
    fn index_mut(&mut self, id: OpId) -> &mut Op {
        &mut self.ops[id.0]
    }
}
