//! Edit scripts: ordered structural change operations.

use std::sync::Arc;

use serde::Serialize;

use crate::item::Item;

/// One structural change to a positional list.
///
/// Positions refer to the list as it stands when the operation is applied,
/// not to either endpoint list in isolation. The sink must apply operations
/// strictly in script order and must not re-derive positions on its own.
#[derive(Debug, Clone, Serialize)]
pub enum EditOp {
    /// Insert `count` new rows starting at `position`.
    Insert {
        /// First inserted position.
        position: usize,
        /// Number of rows inserted.
        count: usize,
    },
    /// Remove the `count` rows starting at `position`.
    Remove {
        /// First removed position.
        position: usize,
        /// Number of rows removed.
        count: usize,
    },
    /// Move the row at `from` so it ends up at `to`.
    Move {
        /// Source position.
        from: usize,
        /// Destination position after removal.
        to: usize,
    },
    /// Rebind the `count` rows starting at `position` in place.
    ///
    /// The payload carries the previous items in position order, so the
    /// rendering surface can compute partial rebinds against the old state.
    Update {
        /// First updated position.
        position: usize,
        /// Number of rows updated.
        count: usize,
        /// Previous items for the updated range, oldest state first.
        #[serde(skip)]
        payload: Vec<Arc<dyn Item>>,
    },
}

/// An ordered sequence of [`EditOp`]s transforming one frozen list's
/// positions into another's.
///
/// Computed once per build, applied once by the change sink, then
/// discarded. Operations are ordered for safe sequential application:
/// removals first (emitted back to front so earlier removals never
/// invalidate later indices), then in-place updates, then a back-to-front
/// placement pass interleaving inserts and moves.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EditScript {
    ops: Vec<EditOp>,
}

impl EditScript {
    pub(crate) fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub(crate) fn push(&mut self, op: EditOp) {
        self.ops.push(op);
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut EditOp> {
        self.ops.last_mut()
    }

    /// Returns `true` if the script changes nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// The operations in application order.
    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    /// Iterate the operations in application order.
    pub fn iter(&self) -> impl Iterator<Item = &EditOp> {
        self.ops.iter()
    }
}

impl IntoIterator for EditScript {
    type Item = EditOp;
    type IntoIter = std::vec::IntoIter<EditOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
