use crate::engine::{DETECTED, PROGRESS_FETCHING, PROGRESS_SUMMARIZING};
use crate::error::{ErrorKind, HubError};
use crate::model::{Feature, TaskEvent, TaskId, LANGUAGES};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::time::{Duration, Instant};

/// How long a cancel may stay silent before the status line says so.
pub const CANCEL_WATCHDOG: Duration = Duration::from_secs(3);

/// Per-page presentation state. Owned by the UI thread only.
pub struct PageUi {
    pub feature: Feature,
    pub input: String,
    pub output: String,
    pub status: String,
    /// Translator only: the detected source language.
    pub detected: Option<String>,
    /// Translator only: index into `LANGUAGES`.
    pub target: usize,
    pub task: Option<TaskId>,
    pub cancel_deadline: Option<Instant>,
    pub finished_at: Option<String>,
}

impl PageUi {
    pub fn new(feature: Feature) -> Self {
        Self {
            feature,
            input: String::new(),
            output: String::new(),
            status: "Ready".into(),
            detected: None,
            target: 0,
            task: None,
            cancel_deadline: None,
            finished_at: None,
        }
    }

    pub fn target_label(&self) -> String {
        LANGUAGES[self.target % LANGUAGES.len()].label()
    }

    pub fn cycle_target(&mut self, forward: bool) {
        let n = LANGUAGES.len();
        self.target = if forward {
            (self.target + 1) % n
        } else {
            (self.target + n - 1) % n
        };
    }

    /// Reflect an accepted submission.
    pub fn on_submitted(&mut self, task: TaskId) {
        self.task = Some(task);
        self.finished_at = None;
        self.cancel_deadline = None;
        self.status = "Running…".into();
        self.output = match self.feature {
            Feature::Translate => {
                self.detected = Some("Detecting...".into());
                format!(
                    "Detecting language, then translating to {}...",
                    LANGUAGES[self.target % LANGUAGES.len()].name
                )
            }
            Feature::Summarize => "Summarizing...".into(),
            Feature::VideoSummarize => "Starting video processing...".into(),
        };
    }

    /// Reflect a rejected submission.
    pub fn on_rejected(&mut self, err: &HubError) {
        match err {
            HubError::Busy(_) => self.status = err.to_string(),
            HubError::Input(msg) => {
                self.output = msg.clone();
                self.status = err.kind().title().into();
            }
            _ => {
                self.output = err.to_string();
                self.status = err.kind().title().into();
            }
        }
    }

    pub fn on_cancel_requested(&mut self, now: Instant) {
        self.status = "Cancelling…".into();
        self.cancel_deadline = Some(now + CANCEL_WATCHDOG);
    }

    /// Keep feedback alive while a cancel waits on an in-flight call.
    pub fn tick(&mut self, now: Instant, busy: bool) {
        if let Some(deadline) = self.cancel_deadline {
            if now >= deadline && busy {
                self.status = "Still cancelling…".into();
                self.cancel_deadline = None;
            }
        }
    }

    /// Apply one event of the page's current run.
    pub fn apply(&mut self, task: TaskId, event: &TaskEvent, finished_at: impl FnOnce() -> String) {
        if self.task != Some(task) {
            return;
        }
        match event {
            TaskEvent::Progress { message } => {
                self.output = progress_text(message);
            }
            TaskEvent::Intermediate { tag, value } if tag == DETECTED => {
                self.detected = Some(value.clone());
                self.output = format!("Language {value} detected. Starting translation...");
            }
            TaskEvent::Intermediate { .. } => {}
            TaskEvent::Result { payload } => {
                self.output = payload.clone();
                self.status = "Done".into();
            }
            TaskEvent::Error { kind, detail, .. } => {
                if self.feature == Feature::Translate
                    && self.detected.as_deref() == Some("Detecting...")
                {
                    self.detected = None;
                }
                self.output = failure_text(self.feature, *kind, detail);
                self.status = kind.title().into();
            }
            TaskEvent::Done => {
                self.cancel_deadline = None;
                self.finished_at = Some(finished_at());
            }
        }
    }
}

fn progress_text(message: &str) -> String {
    match message {
        PROGRESS_FETCHING => "Fetching video transcript (Step 1/2)...".into(),
        PROGRESS_SUMMARIZING => "Sending transcript to LLM for summarization (Step 2/2)...".into(),
        other => format!("{other}..."),
    }
}

fn failure_text(feature: Feature, kind: ErrorKind, detail: &str) -> String {
    if kind == ErrorKind::Cancelled {
        return "Cancelled.".into();
    }
    match feature {
        Feature::Translate => format!("Translation failed. Details: {detail}"),
        Feature::Summarize => format!("Summary generation failed. Details: {detail}"),
        Feature::VideoSummarize => format!("Video summary failed. Details: {detail}"),
    }
}

pub struct UiState {
    pub tab: usize,
    pub model: String,
    pub info: String,
    pub pages: Vec<PageUi>,
}

impl UiState {
    pub fn new(model: &str) -> Self {
        Self {
            tab: 0,
            model: model.to_string(),
            info: String::new(),
            pages: Feature::ALL.iter().map(|&f| PageUi::new(f)).collect(),
        }
    }

    /// The feature shown on the current tab, or `None` on the help tab.
    pub fn current_feature(&self) -> Option<Feature> {
        Feature::ALL.get(self.tab).copied()
    }

    pub fn page(&self, feature: Feature) -> &PageUi {
        &self.pages[feature.index()]
    }

    pub fn page_mut(&mut self, feature: Feature) -> &mut PageUi {
        &mut self.pages[feature.index()]
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> String {
        "12:00:00".into()
    }

    #[test]
    fn translator_page_follows_its_run() {
        let mut page = PageUi::new(Feature::Translate);
        assert_eq!(page.target_label(), "English (EN)");
        page.cycle_target(true);
        page.on_submitted(4);
        assert_eq!(page.detected.as_deref(), Some("Detecting..."));
        assert!(page.output.contains("translating to Japanese"));

        page.apply(
            4,
            &TaskEvent::Intermediate {
                tag: DETECTED.into(),
                value: "English".into(),
            },
            stamp,
        );
        assert_eq!(page.detected.as_deref(), Some("English"));

        page.apply(
            4,
            &TaskEvent::Result {
                payload: "これはテストです。".into(),
            },
            stamp,
        );
        page.apply(4, &TaskEvent::Done, stamp);
        assert_eq!(page.output, "これはテストです。");
        assert_eq!(page.status, "Done");
        assert_eq!(page.finished_at.as_deref(), Some("12:00:00"));
    }

    #[test]
    fn events_of_an_older_run_are_ignored() {
        let mut page = PageUi::new(Feature::Summarize);
        page.on_submitted(2);
        page.apply(
            1,
            &TaskEvent::Result {
                payload: "stale".into(),
            },
            stamp,
        );
        assert_eq!(page.output, "Summarizing...");
    }

    #[test]
    fn video_progress_uses_step_labels() {
        let mut page = PageUi::new(Feature::VideoSummarize);
        page.on_submitted(1);
        page.apply(
            1,
            &TaskEvent::Progress {
                message: PROGRESS_SUMMARIZING.into(),
            },
            stamp,
        );
        assert!(page.output.contains("Step 2/2"));

        page.apply(
            1,
            &TaskEvent::Error {
                kind: ErrorKind::ExternalDataUnavailable,
                step: Some("fetch".into()),
                detail: "no captions".into(),
            },
            stamp,
        );
        assert_eq!(page.output, "Video summary failed. Details: no captions");
        assert_eq!(page.status, "Transcript unavailable");
    }

    #[test]
    fn cancel_watchdog_fires_once() {
        let mut page = PageUi::new(Feature::Summarize);
        let now = Instant::now();
        page.on_cancel_requested(now);
        page.tick(now + Duration::from_secs(1), true);
        assert_eq!(page.status, "Cancelling…");
        page.tick(now + CANCEL_WATCHDOG, true);
        assert_eq!(page.status, "Still cancelling…");
        assert!(page.cancel_deadline.is_none());
    }

    #[test]
    fn target_selection_wraps() {
        let mut page = PageUi::new(Feature::Translate);
        page.cycle_target(false);
        assert_eq!(page.target_label(), "Dutch (NL)");
        page.cycle_target(true);
        assert_eq!(page.target_label(), "English (EN)");
    }

    #[test]
    fn wrapped_status_splits_long_values() {
        let mut out = Vec::new();
        push_wrapped_status_kv(&mut out, "Model", "ibm/granite3.2:8b", 14);
        assert!(out.len() > 1);
        push_wrapped_status_kv(&mut out, "Empty", "   ", 40);
        let before = out.len();
        push_wrapped_status_kv(&mut out, "Empty", "", 40);
        assert_eq!(out.len(), before);
    }
}
