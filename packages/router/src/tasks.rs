//! Sequential execution of a navigation's asynchronous steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::LocalBoxFuture;

/// Shared abort flag for one navigation's pipeline.
///
/// Cancellation is cooperative: an aborted pipeline finishes the step it is
/// currently awaiting, discards the result, and stops. It never touches the
/// router's committed state.
#[derive(Clone, Default)]
pub(crate) struct TaskControl {
    aborted: Arc<AtomicBool>,
}

impl TaskControl {
    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Whether both handles control the same pipeline.
    pub(crate) fn same(&self, other: &TaskControl) -> bool {
        Arc::ptr_eq(&self.aborted, &other.aborted)
    }
}

/// How the pipeline ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskStatus {
    /// Every step ran.
    Finished,
    /// A newer navigation superseded this one.
    Aborted,
    /// The step callback stopped the pipeline (denial or redirect).
    Stopped,
}

/// What the callback decided after seeing a step's result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskFlow {
    Continue,
    Stop,
}

type Step<T> = Box<dyn FnOnce() -> LocalBoxFuture<'static, T>>;

/// An ordered list of lazily-started async steps.
///
/// Steps run strictly one after another; a step's future is not created
/// before every earlier step has resolved. The shared [`TaskControl`] is
/// checked both before a step starts and after it resolves, so a supersede
/// that lands mid-await discards that step's outcome.
pub(crate) struct Tasks<T> {
    steps: Vec<Step<T>>,
    control: TaskControl,
}

impl<T> Tasks<T> {
    pub(crate) fn new(control: TaskControl) -> Self {
        Self {
            steps: Vec::new(),
            control,
        }
    }

    pub(crate) fn push(&mut self, step: impl FnOnce() -> LocalBoxFuture<'static, T> + 'static) {
        self.steps.push(Box::new(step));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) async fn run(self, mut on_result: impl FnMut(T) -> TaskFlow) -> TaskStatus {
        for step in self.steps {
            if self.control.is_aborted() {
                return TaskStatus::Aborted;
            }

            let result = step().await;

            if self.control.is_aborted() {
                return TaskStatus::Aborted;
            }
            if on_result(result) == TaskFlow::Stop {
                return TaskStatus::Stopped;
            }
        }

        TaskStatus::Finished
    }
}
