//! Per-feature page controller.
//!
//! Owns at most one active task, validates input, rejects a submit while a run is in
//! flight, and tracks whether the page's action affordance should be enabled.

use crate::backend::Services;
use crate::engine::{self, CancelOutcome, Pipeline, TaskExecutor};
use crate::error::HubError;
use crate::model::{Feature, Language, PageEvent, TaskEvent, TaskId, TaskRequest, TaskStatus};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{info, warn};

/// Raw user input as the presentation layer collected it.
#[derive(Debug, Clone, Default)]
pub struct PageInput {
    pub text: String,
    /// Target language for the translator page, by name, code or selector label.
    pub target: Option<String>,
}

impl PageInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: None,
        }
    }

    pub fn translation(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: Some(target.into()),
        }
    }
}

/// What happened to a page's task during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub feature: Feature,
    pub task_id: TaskId,
    pub outcome: CancelOutcome,
}

struct ActiveTask {
    executor: TaskExecutor,
    events: mpsc::Receiver<TaskEvent>,
}

impl ActiveTask {
    fn id(&self) -> TaskId {
        self.executor.id()
    }
}

/// Holds the page's active task. Replacement only succeeds when the slot is empty
/// or its executor has reached a terminal state.
#[derive(Default)]
struct TaskSlot {
    active: Option<ActiveTask>,
}

impl TaskSlot {
    fn can_replace(&self) -> bool {
        self.active
            .as_ref()
            .map_or(true, |task| task.executor.is_terminal())
    }

    /// Check-and-set. On success returns the task that was replaced, if any.
    fn try_install(&mut self, task: ActiveTask) -> Result<Option<ActiveTask>, ActiveTask> {
        if !self.can_replace() {
            return Err(task);
        }
        Ok(self.active.replace(task))
    }

    fn release(&mut self, id: TaskId) {
        if self.active.as_ref().is_some_and(|task| task.id() == id) {
            self.active = None;
        }
    }

    fn current_id(&self) -> Option<TaskId> {
        self.active.as_ref().map(ActiveTask::id)
    }
}

pub struct PageController {
    feature: Feature,
    services: Services,
    event_capacity: usize,
    slot: TaskSlot,
    /// Events of a replaced run still owed to the presentation layer.
    outbox: VecDeque<PageEvent>,
    affordance_enabled: bool,
    tasks_started: usize,
    next_id: TaskId,
}

impl PageController {
    pub fn new(feature: Feature, services: Services, event_capacity: usize) -> Self {
        let affordance_enabled = services.chat.is_ready();
        Self {
            feature,
            services,
            event_capacity,
            slot: TaskSlot::default(),
            outbox: VecDeque::new(),
            affordance_enabled,
            tasks_started: 0,
            next_id: 1,
        }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    /// Validate `input` and start a run for it.
    ///
    /// Input errors are returned synchronously and never create an executor. A submit
    /// while the previous run is still in flight fails with `HubError::Busy`.
    pub fn submit(&mut self, input: PageInput) -> Result<TaskId, HubError> {
        let request = self.validate(input)?;
        if !self.services.chat.is_ready() {
            return Err(HubError::ServiceUnreachable(
                "LLM is not ready. Check console for model pull status.".into(),
            ));
        }
        if !self.slot.can_replace() {
            return Err(HubError::Busy(self.feature));
        }

        let id = self.next_id;
        let (tx, rx) = engine::event_channel(self.event_capacity);
        let task = ActiveTask {
            executor: TaskExecutor::new(id, self.services.clone(), tx),
            events: rx,
        };
        let replaced = self
            .slot
            .try_install(task)
            .map_err(|_| HubError::Busy(self.feature))?;
        self.next_id += 1;
        if let Some(old) = replaced {
            self.drain_into_outbox(old);
        }

        self.affordance_enabled = false;
        let pipeline = Pipeline::for_request(&request);
        let started = match self.slot.active.as_mut() {
            Some(task) => task.executor.start(pipeline, request),
            None => Err(HubError::Internal("task slot emptied during submit".into())),
        };
        if let Err(e) = started {
            self.slot.release(id);
            self.affordance_enabled = true;
            return Err(e);
        }

        self.tasks_started += 1;
        info!(page = %self.feature, task = id, "task submitted");
        Ok(id)
    }

    /// Turn raw input into a request for this page, or an `Input` error.
    pub fn validate(&self, input: PageInput) -> Result<TaskRequest, HubError> {
        let text = input.text.trim().to_string();
        match self.feature {
            Feature::Summarize => {
                if text.is_empty() {
                    return Err(HubError::Input(
                        "Please paste text into the input box to summarize.".into(),
                    ));
                }
                Ok(TaskRequest::Summarize { text })
            }
            Feature::Translate => {
                if text.is_empty() {
                    return Err(HubError::Input("Please enter text to translate.".into()));
                }
                let raw = input.target.unwrap_or_default();
                let target = Language::parse(&raw).ok_or_else(|| {
                    HubError::Input(format!("Unsupported target language: {:?}", raw.trim()))
                })?;
                Ok(TaskRequest::Translate { text, target })
            }
            Feature::VideoSummarize => {
                if text.is_empty() {
                    return Err(HubError::Input("Please enter a video URL.".into()));
                }
                Ok(TaskRequest::VideoSummarize { url: text })
            }
        }
    }

    fn drain_into_outbox(&mut self, mut old: ActiveTask) {
        let id = old.id();
        while let Ok(event) = old.events.try_recv() {
            self.outbox.push_back(PageEvent {
                feature: self.feature,
                task_id: id,
                event,
            });
        }
    }

    /// Collect every event that is ready without blocking.
    pub fn poll(&mut self) -> Vec<PageEvent> {
        let mut ready: Vec<PageEvent> = self.outbox.drain(..).collect();
        if let Some(task) = self.slot.active.as_mut() {
            let id = task.id();
            loop {
                match task.events.try_recv() {
                    Ok(event) => ready.push(PageEvent {
                        feature: self.feature,
                        task_id: id,
                        event,
                    }),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }
        for ev in &ready {
            self.observe(ev);
        }
        ready
    }

    /// Wait for the next event. Returns `None` once the page has nothing left to deliver.
    pub async fn recv(&mut self) -> Option<PageEvent> {
        if let Some(ev) = self.outbox.pop_front() {
            self.observe(&ev);
            return Some(ev);
        }
        let task = self.slot.active.as_mut()?;
        let task_id = task.id();
        let event = task.events.recv().await?;
        let ev = PageEvent {
            feature: self.feature,
            task_id,
            event,
        };
        self.observe(&ev);
        Some(ev)
    }

    fn observe(&mut self, ev: &PageEvent) {
        if self.slot.current_id() != Some(ev.task_id) {
            return;
        }
        if ev.event.is_terminal() {
            self.affordance_enabled = true;
        }
        if ev.event == TaskEvent::Done {
            self.slot.release(ev.task_id);
        }
    }

    /// True while the active run has not reached a terminal state.
    pub fn is_busy(&self) -> bool {
        !self.slot.can_replace()
    }

    pub fn affordance_enabled(&self) -> bool {
        self.affordance_enabled && self.services.chat.is_ready()
    }

    /// Status of the active run; `Idle` when the slot is empty.
    pub fn status(&self) -> TaskStatus {
        self.slot
            .active
            .as_ref()
            .map_or(TaskStatus::Idle, |task| task.executor.status())
    }

    /// Number of executors this page has moved to `Running`.
    pub fn tasks_started(&self) -> usize {
        self.tasks_started
    }

    /// Ask the active run to stop at its next step boundary.
    /// Returns false when nothing was running.
    pub fn request_cancel(&self) -> bool {
        match self.slot.active.as_ref() {
            Some(task) if !task.executor.is_terminal() => {
                task.executor.request_cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel the active run within `timeout` and clear the slot.
    pub fn shutdown(&mut self, timeout: Duration) -> Option<ShutdownReport> {
        self.outbox.clear();
        let mut task = self.slot.active.take()?;
        self.affordance_enabled = true;
        if task.executor.is_terminal() {
            return None;
        }

        let outcome = task.executor.cancel(timeout);
        if outcome == CancelOutcome::Abandoned {
            warn!(
                page = %self.feature,
                task = task.id(),
                "task still running at shutdown; continuing without it"
            );
        }
        Some(ShutdownReport {
            feature: self.feature,
            task_id: task.id(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{self, FakeTranscripts, Reply, ScriptedChat};
    use crate::engine::DETECTED;
    use crate::error::ErrorKind;
    use std::time::Instant;

    fn page(feature: Feature, services: Services) -> PageController {
        PageController::new(feature, services, 16)
    }

    /// Block until the worker is inside its `n`th chat call.
    fn wait_for_calls(chat: &ScriptedChat, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while chat.calls() < n {
            assert!(Instant::now() < deadline, "worker never reached the chat call");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Poll until `Done` for `id` arrives.
    fn drain_run(page: &mut PageController, id: TaskId) -> Vec<TaskEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        loop {
            for ev in page.poll() {
                assert_eq!(ev.feature, page.feature());
                if ev.task_id == id {
                    let done = ev.event == TaskEvent::Done;
                    events.push(ev.event);
                    if done {
                        return events;
                    }
                }
            }
            assert!(Instant::now() < deadline, "no Done after {events:?}");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn empty_text_is_rejected_without_an_executor() {
        let chat = ScriptedChat::new([]);
        let mut p = page(Feature::Summarize, mock::chat_only(&chat));

        let err = p.submit(PageInput::text("   \n")).unwrap_err();
        assert!(matches!(err, HubError::Input(ref m) if m.contains("summarize")));
        assert_eq!(p.tasks_started(), 0);
        assert_eq!(p.status(), TaskStatus::Idle);
        assert!(p.affordance_enabled());
        assert_eq!(chat.calls(), 0);
    }

    #[test]
    fn second_submit_while_running_is_busy() {
        let chat = ScriptedChat::new([Reply::Hang, Reply::text("unused")]);
        let mut p = page(Feature::Summarize, mock::chat_only(&chat));

        p.submit(PageInput::text("first")).unwrap();
        assert!(p.is_busy());
        assert!(!p.affordance_enabled());

        let err = p.submit(PageInput::text("second")).unwrap_err();
        assert!(matches!(err, HubError::Busy(Feature::Summarize)));
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(p.tasks_started(), 1);

        wait_for_calls(&chat, 1);
        let report = p.shutdown(Duration::from_millis(20)).unwrap();
        assert_eq!(report.outcome, CancelOutcome::Abandoned);
    }

    #[test]
    fn translator_scenario_end_to_end() {
        let chat = ScriptedChat::new([Reply::text("English"), Reply::text("これはテストです。")]);
        let mut p = page(Feature::Translate, mock::chat_only(&chat));

        let id = p
            .submit(PageInput::translation("This is a test.", "Japanese (JA)"))
            .unwrap();
        let events = drain_run(&mut p, id);

        assert_eq!(
            events,
            vec![
                TaskEvent::Intermediate {
                    tag: DETECTED.into(),
                    value: "English".into()
                },
                TaskEvent::Result {
                    payload: "これはテストです。".into()
                },
                TaskEvent::Done,
            ]
        );
        assert!(p.affordance_enabled());
        assert!(!p.is_busy());
        assert_eq!(p.status(), TaskStatus::Idle);
    }

    #[test]
    fn page_accepts_a_new_run_after_done() {
        let chat = ScriptedChat::new([Reply::text("one"), Reply::text("two")]);
        let mut p = page(Feature::Summarize, mock::chat_only(&chat));

        let first = p.submit(PageInput::text("a")).unwrap();
        drain_run(&mut p, first);
        let second = p.submit(PageInput::text("b")).unwrap();
        assert_ne!(first, second);
        let events = drain_run(&mut p, second);
        assert_eq!(
            events[0],
            TaskEvent::Result {
                payload: "two".into()
            }
        );
        assert_eq!(p.tasks_started(), 2);
    }

    #[test]
    fn replaced_run_still_delivers_its_done() {
        let chat = ScriptedChat::new([Reply::text("one"), Reply::text("two")]);
        let mut p = page(Feature::Summarize, mock::chat_only(&chat));

        let first = p.submit(PageInput::text("a")).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while p.is_busy() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(2));
        }
        // The first run is terminal but none of its events were polled yet.
        let second = p.submit(PageInput::text("b")).unwrap();

        let mut seen = Vec::new();
        while seen.iter().filter(|ev: &&PageEvent| ev.event == TaskEvent::Done).count() < 2 {
            assert!(Instant::now() < deadline, "{seen:?}");
            seen.extend(p.poll());
            std::thread::sleep(Duration::from_millis(2));
        }
        let of = |id| -> Vec<TaskEvent> {
            seen.iter()
                .filter(|ev| ev.task_id == id)
                .map(|ev| ev.event.clone())
                .collect()
        };
        assert_eq!(
            of(first),
            vec![TaskEvent::Result { payload: "one".into() }, TaskEvent::Done]
        );
        assert_eq!(
            of(second),
            vec![TaskEvent::Result { payload: "two".into() }, TaskEvent::Done]
        );
        assert!(p.affordance_enabled());
        assert!(!p.is_busy());
    }

    #[test]
    fn unknown_target_language_is_input_error() {
        let chat = ScriptedChat::new([]);
        let mut p = page(Feature::Translate, mock::chat_only(&chat));

        assert!(matches!(
            p.submit(PageInput::translation("hola", "Klingon")),
            Err(HubError::Input(_))
        ));
        assert!(matches!(
            p.submit(PageInput::text("hola")),
            Err(HubError::Input(_))
        ));
        assert_eq!(p.tasks_started(), 0);
    }

    #[test]
    fn not_ready_connector_refuses_submits() {
        let chat = ScriptedChat::not_ready();
        let mut p = page(Feature::Summarize, mock::chat_only(&chat));

        assert!(!p.affordance_enabled());
        let err = p.submit(PageInput::text("text")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnreachable);
        assert_eq!(p.tasks_started(), 0);
    }

    #[test]
    fn unrecognized_video_link_reports_input_error() {
        let chat = ScriptedChat::new([]);
        let transcripts = FakeTranscripts::with_fragments(&["unused"]);
        let mut p = page(Feature::VideoSummarize, mock::services(&chat, &transcripts));

        let id = p.submit(PageInput::text("https://example.com")).unwrap();
        let events = drain_run(&mut p, id);

        assert!(matches!(
            events[0],
            TaskEvent::Error {
                kind: ErrorKind::Input,
                ..
            }
        ));
        assert_eq!(events[1], TaskEvent::Done);
        assert_eq!(transcripts.fetches(), 0);
        assert_eq!(chat.calls(), 0);
    }

    #[test]
    fn shutdown_of_a_stuck_task_is_bounded() {
        let chat = ScriptedChat::new([Reply::Hang]);
        let mut p = page(Feature::Summarize, mock::chat_only(&chat));
        p.submit(PageInput::text("stuck")).unwrap();
        wait_for_calls(&chat, 1);

        let started = Instant::now();
        let report = p.shutdown(Duration::from_millis(100)).unwrap();
        assert_eq!(report.outcome, CancelOutcome::Abandoned);
        assert!(started.elapsed() < Duration::from_millis(600));
        assert!(!p.is_busy());
        assert!(p.shutdown(Duration::from_millis(100)).is_none());
    }

    #[test]
    fn cancel_request_ends_the_run_as_cancelled() {
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let chat = ScriptedChat::new([Reply::Wait(gate_rx), Reply::text("unused")]);
        let mut p = page(Feature::Translate, mock::chat_only(&chat));

        let id = p.submit(PageInput::translation("Hallo", "en")).unwrap();
        assert!(p.request_cancel());
        let _ = gate_tx.send("German".to_string());

        let events = drain_run(&mut p, id);
        assert!(matches!(
            events[0],
            TaskEvent::Error {
                kind: ErrorKind::Cancelled,
                ..
            }
        ));
        assert_eq!(events.len(), 2);
        assert!(!p.request_cancel());
    }

    #[tokio::test]
    async fn recv_yields_events_then_none() {
        let chat = ScriptedChat::new([Reply::text("short summary")]);
        let mut p = page(Feature::Summarize, mock::chat_only(&chat));
        let id = p.submit(PageInput::text("long text")).unwrap();

        let first = p.recv().await.unwrap();
        assert_eq!(first.task_id, id);
        assert_eq!(
            first.event,
            TaskEvent::Result {
                payload: "short summary".into()
            }
        );
        assert_eq!(p.recv().await.unwrap().event, TaskEvent::Done);
        assert!(p.recv().await.is_none());
    }
}
