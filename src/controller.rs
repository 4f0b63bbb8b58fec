//! Build pipeline controller.
//!
//! A [`Controller`] owns the current frozen list and turns rebuild requests
//! into edit scripts. One build cycle runs: build logic → duplicate
//! validation → interceptor chain → freeze → diff → notify. The cycle runs
//! on the injected build executor; the resulting script is applied to the
//! [`ChangeSink`] on the injected notify executor, strictly in request
//! order.
//!
//! Rebuild requests are coalesced: while a build is pending or running, at
//! most one trailing build is kept, and redundant intermediate requests are
//! dropped. A dropped request is a silent no-op.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::diff::compute_edit_script;
use crate::error::ControllerError;
use crate::executor::{Executor, ImmediateExecutor};
use crate::item::Item;
use crate::list::{BuildList, FrozenList};
use crate::op::{EditOp, EditScript};
use crate::tracer::{BuildResult, NoopTracer, Tracer};

// Thread-local stack of controllers currently running build logic, for
// reentrancy detection.
thread_local! {
    static BUILD_STACK: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

// One frame per `request_rebuild` currently executing on this thread. A
// build cycle that fails while a frame is open delivers its error to that
// frame, making the error synchronous exactly when the build executor ran
// the cycle inline.
thread_local! {
    static INLINE_ERRORS: RefCell<Vec<Option<ControllerError>>> = const { RefCell::new(Vec::new()) };
}

static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(1);

/// User-supplied list construction logic.
///
/// Invoked once per build cycle with an empty [`BuildList`]; it adds zero or
/// more items. It must not call [`Controller::request_rebuild`] on the same
/// controller; doing so fails fast with
/// [`ControllerError::ReentrantBuild`].
///
/// Implemented for any `Fn(&mut BuildList)` closure.
pub trait BuildModels: Send + Sync + 'static {
    /// Populate the list for this build.
    fn build_models(&self, list: &mut BuildList);
}

impl<F> BuildModels for F
where
    F: Fn(&mut BuildList) + Send + Sync + 'static,
{
    fn build_models(&self, list: &mut BuildList) {
        self(list)
    }
}

/// A post-build hook with mutate-before-freeze capability.
///
/// Interceptors run after duplicate resolution and before freezing, in
/// registration order, each receiving the same in-progress list.
///
/// Implemented for any `Fn(&mut BuildList)` closure.
pub trait Interceptor: Send + Sync + 'static {
    /// Inspect or mutate the in-progress list.
    fn intercept(&self, list: &mut BuildList);
}

impl<F> Interceptor for F
where
    F: Fn(&mut BuildList) + Send + Sync + 'static,
{
    fn intercept(&self, list: &mut BuildList) {
        self(list)
    }
}

/// The rendering surface's view of structural changes.
///
/// The controller invokes these callbacks on the notify executor, in edit
/// script order. Implementations must apply each operation as given and
/// must not re-derive positions independently; the script's ordering
/// contract guarantees every position is valid at its application time.
pub trait ChangeSink: Send + Sync + 'static {
    /// `count` rows inserted starting at `position`.
    fn on_inserted(&self, position: usize, count: usize);
    /// `count` rows removed starting at `position`.
    fn on_removed(&self, position: usize, count: usize);
    /// The row at `from` moved to `to`.
    fn on_moved(&self, from: usize, to: usize);
    /// `count` rows rebound in place starting at `position`; `payload`
    /// holds the previous items in position order.
    fn on_updated(&self, position: usize, count: usize, payload: &[Arc<dyn Item>]);
}

/// Pipeline stage of a controller, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No build cycle in progress.
    Idle,
    /// Build logic is executing.
    Building,
    /// The interceptor chain is executing.
    Intercepting,
    /// The frozen list is being diffed against the previous one.
    Diffing,
    /// The edit script is being handed to the notify executor.
    Notifying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Idle,
    /// A build job is posted to the build executor but has not started.
    Scheduled,
    /// A build cycle is running on the build executor.
    Running,
}

struct ScheduleState {
    schedule: Schedule,
    /// A request arrived while running; run one more cycle afterwards.
    trailing: bool,
}

struct ControllerInner {
    id: u64,
    build_logic: Box<dyn BuildModels>,
    sink: Arc<dyn ChangeSink>,
    build_executor: Arc<dyn Executor>,
    notify_executor: Arc<dyn Executor>,
    tracer: Arc<dyn Tracer>,
    filter_duplicates: AtomicBool,
    interceptors: Mutex<Vec<Arc<dyn Interceptor>>>,
    current: RwLock<FrozenList>,
    state: Mutex<ScheduleState>,
    phase: Mutex<Phase>,
    last_error: Mutex<Option<ControllerError>>,
}

/// Orchestrates rebuilds and owns the current frozen list.
///
/// Cheap to clone; clones share the same pipeline. Controllers are fully
/// independent of each other.
///
/// # Example
///
/// ```ignore
/// use model_flow::{Controller, ImmediateExecutor, RowItem, ViewType};
///
/// let controller = Controller::builder(
///     |list: &mut model_flow::BuildList| {
///         list.add(RowItem::new(ViewType(0)).id(1).field("title", "hello"));
///     },
///     sink,
/// )
/// .build();
///
/// controller.request_rebuild()?;
/// ```
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

/// Builder for [`Controller`].
///
/// Both executors default to [`ImmediateExecutor`]; pass a
/// [`WorkerExecutor`](crate::WorkerExecutor) as the build executor to move
/// building and diffing off the rendering thread.
pub struct ControllerBuilder {
    build_logic: Box<dyn BuildModels>,
    sink: Arc<dyn ChangeSink>,
    build_executor: Arc<dyn Executor>,
    notify_executor: Arc<dyn Executor>,
    tracer: Arc<dyn Tracer>,
    filter_duplicates: bool,
}

impl ControllerBuilder {
    fn new(build_logic: impl BuildModels, sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            build_logic: Box::new(build_logic),
            sink,
            build_executor: Arc::new(ImmediateExecutor),
            notify_executor: Arc::new(ImmediateExecutor),
            tracer: Arc::new(NoopTracer),
            filter_duplicates: false,
        }
    }

    /// Set the executor that runs build logic, validation, and diffing.
    pub fn build_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.build_executor = executor;
        self
    }

    /// Set the executor that applies edit scripts to the sink.
    ///
    /// This must represent the single thread that owns the rendering
    /// surface.
    pub fn notify_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.notify_executor = executor;
        self
    }

    /// Set the tracer receiving pipeline events.
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Enable or disable the filter-duplicates policy.
    ///
    /// Disabled (the default), duplicate identities in a build fail fast.
    /// Enabled, the first occurrence is kept, later ones are discarded, and
    /// each discard is reported through
    /// [`Tracer::on_duplicate_filtered`].
    pub fn filter_duplicates(mut self, filter: bool) -> Self {
        self.filter_duplicates = filter;
        self
    }

    /// Build the controller.
    pub fn build(self) -> Controller {
        Controller {
            inner: Arc::new(ControllerInner {
                id: NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed),
                build_logic: self.build_logic,
                sink: self.sink,
                build_executor: self.build_executor,
                notify_executor: self.notify_executor,
                tracer: self.tracer,
                filter_duplicates: AtomicBool::new(self.filter_duplicates),
                interceptors: Mutex::new(Vec::new()),
                current: RwLock::new(FrozenList::empty()),
                state: Mutex::new(ScheduleState {
                    schedule: Schedule::Idle,
                    trailing: false,
                }),
                phase: Mutex::new(Phase::Idle),
                last_error: Mutex::new(None),
            }),
        }
    }
}

impl Controller {
    /// Start building a controller from its two required collaborators.
    pub fn builder(build_logic: impl BuildModels, sink: Arc<dyn ChangeSink>) -> ControllerBuilder {
        ControllerBuilder::new(build_logic, sink)
    }

    /// Request a rebuild of the item list.
    ///
    /// At most one build runs at a time per controller. Requests made while
    /// a build is pending or running are coalesced into one trailing build;
    /// the dropped intermediates are silent no-ops. Requests are never
    /// reordered: scripts reach the sink in request order.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::ReentrantBuild`] when called from inside this
    ///   controller's build logic or interceptors.
    /// - With an [`ImmediateExecutor`] build executor the whole cycle runs
    ///   inside this call, so build-time usage errors (such as
    ///   [`ControllerError::DuplicateIdentity`]) are returned here. With a
    ///   background build executor they are reported through
    ///   [`Tracer::on_build_end`] and retained for
    ///   [`take_build_error`](Self::take_build_error).
    pub fn request_rebuild(&self) -> Result<(), ControllerError> {
        let reentrant = BUILD_STACK.with(|stack| stack.borrow().contains(&self.inner.id));
        if reentrant {
            return Err(ControllerError::ReentrantBuild);
        }

        let schedule_job = {
            let mut state = self.inner.state.lock();
            match state.schedule {
                Schedule::Idle => {
                    state.schedule = Schedule::Scheduled;
                    true
                }
                Schedule::Scheduled => {
                    // Already queued and not yet started; it will see this
                    // request's data when it runs.
                    false
                }
                Schedule::Running => {
                    state.trailing = true;
                    false
                }
            }
        };

        self.inner.tracer.on_build_requested(!schedule_job);
        if !schedule_job {
            tracing::debug!(controller = self.inner.id, "rebuild coalesced");
            return Ok(());
        }

        tracing::debug!(controller = self.inner.id, "rebuild scheduled");
        let inner = self.inner.clone();
        INLINE_ERRORS.with(|frames| frames.borrow_mut().push(None));
        self.inner
            .build_executor
            .execute(Box::new(move || ControllerInner::run_builds(&inner)));
        // An inline executor has run the whole cycle by now and left any
        // failure in our frame; a background executor leaves it untouched.
        match INLINE_ERRORS.with(|frames| frames.borrow_mut().pop().flatten()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Move a single item without a full rebuild.
    ///
    /// Replaces the retained list with a moved copy and emits exactly one
    /// Move to the sink, bypassing the diff engine. A subsequent rebuild
    /// that produces the same order yields no operations.
    ///
    /// # Errors
    ///
    /// [`ControllerError::MoveOutOfBounds`] when either position is outside
    /// the current list.
    pub fn move_item(&self, from: usize, to: usize) -> Result<(), ControllerError> {
        {
            let mut current = self.inner.current.write();
            let len = current.len();
            if from >= len || to >= len {
                return Err(ControllerError::MoveOutOfBounds { from, to, len });
            }
            *current = current.with_moved(from, to);
        }
        self.inner.tracer.on_item_moved(from, to);
        tracing::debug!(controller = self.inner.id, from, to, "direct item move");
        let sink = self.inner.sink.clone();
        self.inner
            .notify_executor
            .execute(Box::new(move || sink.on_moved(from, to)));
        Ok(())
    }

    /// Register an interceptor. Registration order is execution order;
    /// interceptors cannot be removed.
    pub fn add_interceptor(&self, interceptor: impl Interceptor) {
        self.inner.interceptors.lock().push(Arc::new(interceptor));
    }

    /// Enable or disable the filter-duplicates policy for future builds.
    pub fn set_filter_duplicates(&self, filter: bool) {
        self.inner
            .filter_duplicates
            .store(filter, Ordering::Relaxed);
    }

    /// A consistent snapshot of the current list.
    ///
    /// Never observes an in-progress build; the retained list is replaced
    /// atomically when a build completes.
    pub fn current_items(&self) -> FrozenList {
        self.inner.current.read().clone()
    }

    /// Number of items in the current list.
    pub fn item_count(&self) -> usize {
        self.inner.current.read().len()
    }

    /// The pipeline stage this controller is in.
    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock()
    }

    /// Returns `true` while build logic is executing.
    pub fn is_building(&self) -> bool {
        matches!(self.phase(), Phase::Building)
    }

    /// Take the most recent build-cycle error, if any.
    ///
    /// Build-time usage errors from a background build executor are
    /// retained here after being reported to the tracer.
    pub fn take_build_error(&self) -> Option<ControllerError> {
        self.inner.last_error.lock().take()
    }
}

impl ControllerInner {
    /// Run one build cycle, plus one trailing cycle per coalesced batch of
    /// requests that arrived while running.
    fn run_builds(inner: &Arc<ControllerInner>) {
        {
            let mut state = inner.state.lock();
            state.schedule = Schedule::Running;
        }
        loop {
            Self::run_cycle(inner);
            let mut state = inner.state.lock();
            if state.trailing {
                state.trailing = false;
            } else {
                state.schedule = Schedule::Idle;
                break;
            }
        }
    }

    fn run_cycle(inner: &Arc<ControllerInner>) {
        let build_id = inner.tracer.next_build_id();
        inner.tracer.on_build_start(build_id);
        tracing::debug!(controller = inner.id, build = build_id.0, "build start");

        BUILD_STACK.with(|stack| stack.borrow_mut().push(inner.id));
        let outcome = Self::build_list(inner, build_id);
        BUILD_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        let next = match outcome {
            Ok(next) => next,
            Err(err) => {
                *inner.phase.lock() = Phase::Idle;
                inner
                    .tracer
                    .on_build_end(build_id, &BuildResult::Failed(err.clone()));
                tracing::debug!(controller = inner.id, build = build_id.0, %err, "build failed");
                let delivered = INLINE_ERRORS.with(|frames| {
                    match frames.borrow_mut().last_mut() {
                        Some(frame) => {
                            *frame = Some(err.clone());
                            true
                        }
                        None => false,
                    }
                });
                if !delivered {
                    *inner.last_error.lock() = Some(err);
                }
                return;
            }
        };

        *inner.phase.lock() = Phase::Diffing;
        let previous = inner.current.read().clone();
        let script = compute_edit_script(&previous, &next);

        *inner.phase.lock() = Phase::Notifying;
        *inner.current.write() = next;

        let result = if script.is_empty() {
            BuildResult::NoChanges
        } else {
            inner.tracer.on_edit_script(build_id, &script);
            let ops = script.len();
            let sink = inner.sink.clone();
            inner.notify_executor.execute(Box::new(move || {
                apply_script(&*sink, script);
            }));
            BuildResult::Applied { ops }
        };

        *inner.phase.lock() = Phase::Idle;
        inner.tracer.on_build_end(build_id, &result);
        tracing::debug!(controller = inner.id, build = build_id.0, ?result, "build end");
    }

    /// Build logic, duplicate validation, interceptor chain, freeze.
    fn build_list(
        inner: &Arc<ControllerInner>,
        build_id: crate::tracer::BuildId,
    ) -> Result<FrozenList, ControllerError> {
        *inner.phase.lock() = Phase::Building;
        let mut list = BuildList::new();
        inner.build_logic.build_models(&mut list);

        if inner.filter_duplicates.load(Ordering::Relaxed) {
            for conflict in list.drop_duplicates() {
                inner.tracer.on_duplicate_filtered(build_id, &conflict);
            }
        } else if let Some(conflict) = list.scan_duplicates().into_iter().next() {
            return Err(ControllerError::DuplicateIdentity {
                identity: conflict.identity,
                first_position: conflict.first_position,
                duplicate_position: conflict.duplicate_position,
            });
        }

        *inner.phase.lock() = Phase::Intercepting;
        let interceptors = inner.interceptors.lock().clone();
        for interceptor in interceptors {
            interceptor.intercept(&mut list);
        }

        Ok(list.freeze())
    }
}

fn apply_script(sink: &dyn ChangeSink, script: EditScript) {
    for op in script {
        match op {
            EditOp::Insert { position, count } => sink.on_inserted(position, count),
            EditOp::Remove { position, count } => sink.on_removed(position, count),
            EditOp::Move { from, to } => sink.on_moved(from, to),
            EditOp::Update {
                position,
                count,
                payload,
            } => sink.on_updated(position, count, &payload),
        }
    }
}

/// A controller that takes its item list directly.
///
/// Instead of supplying build logic, callers hand over the full list with
/// [`set_items`](Self::set_items). Calling
/// [`request_rebuild`](Self::request_rebuild) directly is a usage error;
/// rebuilds happen only through `set_items`.
pub struct SimpleController {
    controller: Controller,
    items: Arc<RwLock<Vec<Arc<dyn Item>>>>,
    inside_set_items: AtomicBool,
}

impl SimpleController {
    /// Create a controller applying everything inline on the calling
    /// thread.
    pub fn new(sink: Arc<dyn ChangeSink>) -> Self {
        Self::with_executors(sink, Arc::new(ImmediateExecutor), Arc::new(ImmediateExecutor))
    }

    /// Create a controller with explicit build and notify executors.
    pub fn with_executors(
        sink: Arc<dyn ChangeSink>,
        build_executor: Arc<dyn Executor>,
        notify_executor: Arc<dyn Executor>,
    ) -> Self {
        let items: Arc<RwLock<Vec<Arc<dyn Item>>>> = Arc::new(RwLock::new(Vec::new()));
        let build_items = items.clone();
        let controller = Controller::builder(
            move |list: &mut BuildList| {
                for item in build_items.read().iter() {
                    list.add_item(item.clone());
                }
            },
            sink,
        )
        .build_executor(build_executor)
        .notify_executor(notify_executor)
        .build();
        Self {
            controller,
            items,
            inside_set_items: AtomicBool::new(false),
        }
    }

    /// Replace the item list and rebuild.
    pub fn set_items(&self, items: Vec<Arc<dyn Item>>) -> Result<(), ControllerError> {
        *self.items.write() = items;
        self.inside_set_items.store(true, Ordering::SeqCst);
        let result = self.controller.request_rebuild();
        self.inside_set_items.store(false, Ordering::SeqCst);
        result
    }

    /// Rejected unless called from within [`set_items`](Self::set_items).
    pub fn request_rebuild(&self) -> Result<(), ControllerError> {
        if !self.inside_set_items.load(Ordering::SeqCst) {
            return Err(ControllerError::DirectRebuild);
        }
        self.controller.request_rebuild()
    }

    /// The underlying controller, for snapshots and moves.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}
