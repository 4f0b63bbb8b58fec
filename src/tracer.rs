//! Tracer trait for observing the build pipeline.
//!
//! This module defines the [`Tracer`] trait and related types for observing
//! controller activity: build lifecycle, coalescing, duplicate filtering,
//! and the edit scripts handed to the sink. The default [`NoopTracer`]
//! provides zero cost when tracing is not needed.
//!
//! Recoverable conditions are only visible here. In particular,
//! [`Tracer::on_duplicate_filtered`] fires exactly once per item discarded
//! under the filter-duplicates policy, which is how tests and telemetry
//! detect swallowed duplicates without crashing the build.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;
use crate::list::DuplicateConflict;
use crate::op::EditScript;

/// Unique identifier for one build cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildId(pub u64);

/// How a build cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
    /// The diff produced operations that were handed to the sink.
    Applied {
        /// Number of operations in the edit script.
        ops: usize,
    },
    /// The new list was identical to the previous one; nothing was notified.
    NoChanges,
    /// The build was aborted by a usage error.
    Failed(ControllerError),
}

/// Tracer trait for observing controller execution.
///
/// Implementations can collect events for testing, forward to the `tracing`
/// crate, or feed telemetry. All methods except [`next_build_id`] have
/// default empty implementations, so you only override the events you care
/// about. [`NoopTracer`] uses all defaults for zero cost when tracing is
/// disabled.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: hooks fire on whichever executor
/// runs the corresponding pipeline stage.
///
/// [`next_build_id`]: Tracer::next_build_id
pub trait Tracer: Send + Sync + 'static {
    /// Generate a new unique build ID.
    ///
    /// This is the only required method. Called once per build cycle, before
    /// `on_build_start`.
    fn next_build_id(&self) -> BuildId;

    /// Called on every `request_rebuild`. `coalesced` is `true` when the
    /// request was folded into a build that is already pending or running.
    #[inline]
    fn on_build_requested(&self, _coalesced: bool) {}

    /// Called when a build cycle starts on the build executor.
    #[inline]
    fn on_build_start(&self, _id: BuildId) {}

    /// Called when a build cycle ends, however it ends.
    #[inline]
    fn on_build_end(&self, _id: BuildId, _result: &BuildResult) {}

    /// Called once per item discarded under the filter-duplicates policy.
    ///
    /// This is the observable form of a recoverable condition: the build
    /// continues, and nothing else reports the discard.
    #[inline]
    fn on_duplicate_filtered(&self, _id: BuildId, _conflict: &DuplicateConflict) {}

    /// Called with the computed edit script before it is handed to the
    /// notify executor. Not called when the script is empty.
    #[inline]
    fn on_edit_script(&self, _id: BuildId, _script: &EditScript) {}

    /// Called when `move_item` applies a direct single-item move, bypassing
    /// the diff engine.
    #[inline]
    fn on_item_moved(&self, _from: usize, _to: usize) {}
}

/// Zero-cost tracer that discards all events.
///
/// This is the default tracer for [`Controller`](crate::Controller).
pub struct NoopTracer;

/// Global build counter for NoopTracer.
static NOOP_BUILD_COUNTER: AtomicU64 = AtomicU64::new(1);

impl Tracer for NoopTracer {
    #[inline(always)]
    fn next_build_id(&self) -> BuildId {
        BuildId(NOOP_BUILD_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
    // All other methods use the default empty implementations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingTracer {
        starts: AtomicUsize,
        ends: AtomicUsize,
    }

    impl CountingTracer {
        fn new() -> Self {
            Self {
                starts: AtomicUsize::new(0),
                ends: AtomicUsize::new(0),
            }
        }
    }

    impl Tracer for CountingTracer {
        fn next_build_id(&self) -> BuildId {
            BuildId(1)
        }

        fn on_build_start(&self, _id: BuildId) {
            self.starts.fetch_add(1, Ordering::Relaxed);
        }

        fn on_build_end(&self, _id: BuildId, _result: &BuildResult) {
            self.ends.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn noop_tracer_ids_are_unique() {
        let tracer = NoopTracer;
        assert_ne!(tracer.next_build_id(), tracer.next_build_id());
    }

    #[test]
    fn counting_tracer_counts() {
        let tracer = CountingTracer::new();
        tracer.on_build_start(BuildId(1));
        tracer.on_build_start(BuildId(2));
        tracer.on_build_end(BuildId(1), &BuildResult::NoChanges);
        assert_eq!(tracer.starts.load(Ordering::Relaxed), 2);
        assert_eq!(tracer.ends.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn tracer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopTracer>();
        assert_send_sync::<Arc<CountingTracer>>();
    }
}
