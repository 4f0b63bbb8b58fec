//! Error types for controller usage violations.

use thiserror::Error;

use crate::item::Identity;

/// Usage errors raised by the controller.
///
/// These represent programmer errors, not runtime conditions: each variant
/// names a contract of the build pipeline that the caller violated. They
/// fail fast out of the call that triggered them and are never retried
/// internally.
///
/// Recoverable conditions (a duplicate discarded under the filter policy)
/// are deliberately *not* errors; they are reported through
/// [`Tracer::on_duplicate_filtered`](crate::Tracer::on_duplicate_filtered)
/// and the build continues. A coalesced rebuild request is a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// Two items in one build share the same identity.
    ///
    /// Identities must be unique within a built list so the diff engine can
    /// match rows across builds. Enable
    /// [`filter_duplicates`](crate::ControllerBuilder::filter_duplicates)
    /// to keep the first occurrence and discard the rest instead.
    #[error("duplicate item identity {identity} at positions {first_position} and {duplicate_position}")]
    DuplicateIdentity {
        /// The identity shared by both items.
        identity: Identity,
        /// Position of the occurrence that is kept under the filter policy.
        first_position: usize,
        /// Position of the conflicting occurrence.
        duplicate_position: usize,
    },

    /// `request_rebuild` was called from inside build logic or an
    /// interceptor of the same controller.
    #[error("cannot request a rebuild from inside build logic of the same controller")]
    ReentrantBuild,

    /// `move_item` was called with a position outside the current list.
    #[error("cannot move item from {from} to {to} in a list of length {len}")]
    MoveOutOfBounds {
        /// Source position.
        from: usize,
        /// Destination position.
        to: usize,
        /// Length of the current list.
        len: usize,
    },

    /// `request_rebuild` was called directly on a [`SimpleController`].
    ///
    /// [`SimpleController`]: crate::SimpleController
    #[error("cannot call request_rebuild directly; call set_items instead")]
    DirectRebuild,
}
