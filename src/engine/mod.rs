//! Background task execution.
//!
//! A `TaskExecutor` runs exactly one `Pipeline` on a dedicated OS thread and reports
//! what its steps produce as ordered `TaskEvent`s on a bounded channel. Steps call
//! blocking remote services, so cancellation is cooperative: it is honored only at
//! step boundaries, and `cancel` gives up waiting after a bounded timeout.

mod pipeline;
mod prompts;

pub use pipeline::{Pipeline, StepOutcome, DETECTED, PROGRESS_FETCHING, PROGRESS_SUMMARIZING};

use crate::backend::Services;
use crate::error::{ErrorKind, HubError};
use crate::model::{TaskEvent, TaskId, TaskRequest, TaskStatus};
use pipeline::StepContext;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Upper bound on events one run can produce (two progress messages, one
/// intermediate, the terminal event and `Done`), rounded up. Channels are never
/// smaller, so a worker never blocks on delivery.
pub const MIN_EVENT_CAPACITY: usize = 8;

/// Create the bounded event channel for one executor.
pub fn event_channel(
    capacity: usize,
) -> (mpsc::Sender<TaskEvent>, mpsc::Receiver<TaskEvent>) {
    mpsc::channel(capacity.max(MIN_EVENT_CAPACITY))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The executor was never started; it is now `Cancelled`.
    NotStarted,
    /// The run reached a terminal state within the timeout.
    Stopped,
    /// An in-flight call outlived the timeout; the thread was detached.
    Abandoned,
}

struct Shared {
    status: Mutex<TaskStatus>,
    changed: Condvar,
    cancel: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TaskStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn finish(&self, status: TaskStatus) {
        *self.lock() = status;
        self.changed.notify_all();
    }
}

pub struct TaskExecutor {
    id: TaskId,
    services: Services,
    event_tx: Option<mpsc::Sender<TaskEvent>>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl TaskExecutor {
    pub fn new(id: TaskId, services: Services, event_tx: mpsc::Sender<TaskEvent>) -> Self {
        Self {
            id,
            services,
            event_tx: Some(event_tx),
            shared: Arc::new(Shared {
                status: Mutex::new(TaskStatus::Idle),
                changed: Condvar::new(),
                cancel: AtomicBool::new(false),
            }),
            handle: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        *self.shared.lock()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Schedule `pipeline` on a new thread and return immediately.
    ///
    /// Only an `Idle` executor can start; anything else is `AlreadyStarted`.
    pub fn start(&mut self, pipeline: Pipeline, request: TaskRequest) -> Result<(), HubError> {
        let event_tx = {
            let mut status = self.shared.lock();
            if *status != TaskStatus::Idle {
                return Err(HubError::AlreadyStarted);
            }
            if !pipeline.accepts(&request) {
                return Err(HubError::Internal(format!(
                    "{:?} pipeline cannot run a {:?} request",
                    pipeline.feature(),
                    request.feature()
                )));
            }
            let Some(event_tx) = self.event_tx.take() else {
                return Err(HubError::AlreadyStarted);
            };
            *status = TaskStatus::Running;
            event_tx
        };

        let worker = Worker {
            id: self.id,
            pipeline,
            request,
            services: self.services.clone(),
            shared: self.shared.clone(),
            event_tx,
        };
        let spawned = std::thread::Builder::new()
            .name(format!("task-{}", self.id))
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                info!(task = self.id, "task started");
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.finish(TaskStatus::Failed);
                Err(HubError::Internal(format!("spawn task thread: {e}")))
            }
        }
    }

    /// Ask the run to stop at its next step boundary. Does not wait.
    pub fn request_cancel(&self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
    }

    /// Request cancellation and wait up to `timeout` for the run to end.
    pub fn cancel(&mut self, timeout: Duration) -> CancelOutcome {
        self.request_cancel();

        let status = {
            let mut guard = self.shared.lock();
            if *guard == TaskStatus::Idle {
                *guard = TaskStatus::Cancelled;
                self.event_tx = None;
                self.shared.changed.notify_all();
                return CancelOutcome::NotStarted;
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout_while(guard, timeout, |s| !s.is_terminal())
                .unwrap_or_else(PoisonError::into_inner);
            *guard
        };

        if status.is_terminal() {
            self.reap();
            CancelOutcome::Stopped
        } else {
            warn!(
                task = self.id,
                timeout = %humantime::format_duration(timeout),
                "task did not stop in time; abandoning its thread"
            );
            // Dropping the handle detaches the thread; it exits once its call returns.
            self.handle = None;
            CancelOutcome::Abandoned
        }
    }

    /// Join the worker if it has already exited; otherwise let it finish detached.
    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        if !self.is_terminal() {
            self.request_cancel();
        }
        self.reap();
    }
}

struct Worker {
    id: TaskId,
    pipeline: Pipeline,
    request: TaskRequest,
    services: Services,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<TaskEvent>,
}

impl Worker {
    fn run(self) {
        let Worker {
            id,
            pipeline,
            request,
            services,
            shared,
            event_tx,
        } = self;
        let send = |ev: TaskEvent| {
            // A closed channel means the page is gone; the run still finishes.
            let _ = event_tx.blocking_send(ev);
        };

        let mut ctx = StepContext::new(&request, &services);
        let mut terminal = None;

        for step in pipeline.steps() {
            if shared.cancel_requested() {
                terminal = Some(cancelled(step.name));
                break;
            }
            debug!(task = id, step = step.name, "step started");
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (step.run)(&mut ctx)))
                .unwrap_or_else(|payload| StepOutcome::Failure {
                    kind: ErrorKind::Internal,
                    detail: format!("step panicked: {}", panic_message(payload.as_ref())),
                });
            if shared.cancel_requested() {
                terminal = Some(cancelled(step.name));
                break;
            }

            match outcome {
                StepOutcome::Progress(message) => send(TaskEvent::Progress { message }),
                StepOutcome::Intermediate { tag, value } => send(TaskEvent::Intermediate {
                    tag: tag.to_string(),
                    value,
                }),
                StepOutcome::Value(payload) => {
                    terminal = Some((TaskStatus::Succeeded, TaskEvent::Result { payload }));
                    break;
                }
                StepOutcome::Failure { kind, detail } => {
                    terminal = Some((
                        TaskStatus::Failed,
                        TaskEvent::Error {
                            kind,
                            step: Some(step.name.to_string()),
                            detail,
                        },
                    ));
                    break;
                }
            }
        }

        let (status, event) = terminal.unwrap_or_else(|| {
            (
                TaskStatus::Failed,
                TaskEvent::Error {
                    kind: ErrorKind::Internal,
                    step: None,
                    detail: "pipeline finished without a result".into(),
                },
            )
        });
        match &event {
            TaskEvent::Error { kind, step, detail } => {
                info!(task = id, ?kind, step = step.as_deref().unwrap_or("-"), %detail, "task failed")
            }
            _ => info!(task = id, "task succeeded"),
        }

        send(event);
        send(TaskEvent::Done);
        // Published last: a terminal status means every event is already queued.
        shared.finish(status);
    }
}

fn cancelled(step: &str) -> (TaskStatus, TaskEvent) {
    (
        TaskStatus::Cancelled,
        TaskEvent::Error {
            kind: ErrorKind::Cancelled,
            step: Some(step.to_string()),
            detail: "task was cancelled".into(),
        },
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}
