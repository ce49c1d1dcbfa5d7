//! Line formatting for text mode and the startup pull.
//!
//! This module folds task events into a `TaskReport` and renders human-readable lines.

use crate::engine::DETECTED;
use crate::model::{Feature, PullProgress, ReportedError, TaskEvent, TaskReport, TaskRequest};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const BAR_WIDTH: usize = 20;

/// Render one pull chunk as `status [=====     ] 45.00%`.
///
/// Digest chunks (per-layer hashes) carry no useful status and are skipped.
pub(crate) fn render_pull_progress(p: &PullProgress) -> Option<String> {
    if p.status.is_empty() || p.status.to_lowercase().contains("digest") {
        return None;
    }
    if p.total == 0 {
        return Some(format!("{}...", p.status));
    }
    let completed = p.completed.min(p.total);
    let ratio = completed as f64 / p.total as f64;
    let filled = (completed as u128 * BAR_WIDTH as u128 / p.total as u128) as usize;
    Some(format!(
        "{} [{}{}] {:.2}%",
        p.status,
        "=".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
        ratio * 100.0
    ))
}

/// Progress line for stderr, if the event has one.
pub(crate) fn event_line(event: &TaskEvent) -> Option<String> {
    match event {
        TaskEvent::Progress { message } => Some(format!("... {message}")),
        TaskEvent::Intermediate { tag, value } if tag == DETECTED => {
            Some(format!("Language detected: {value}"))
        }
        TaskEvent::Intermediate { tag, value } => Some(format!("{tag}: {value}")),
        TaskEvent::Error { kind, step, detail } => Some(match step {
            Some(step) => format!("{} ({step}): {detail}", kind.title()),
            None => format!("{}: {detail}", kind.title()),
        }),
        TaskEvent::Result { .. } | TaskEvent::Done => None,
    }
}

/// Accumulates one run's events into a `TaskReport`.
pub(crate) struct ReportBuilder {
    feature: Feature,
    model: String,
    request: TaskRequest,
    detected_language: Option<String>,
    progress: Vec<String>,
    result: Option<String>,
    error: Option<ReportedError>,
}

impl ReportBuilder {
    pub(crate) fn new(model: &str, request: TaskRequest) -> Self {
        Self {
            feature: request.feature(),
            model: model.to_string(),
            request,
            detected_language: None,
            progress: Vec::new(),
            result: None,
            error: None,
        }
    }

    pub(crate) fn observe(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Progress { message } => self.progress.push(message.clone()),
            TaskEvent::Intermediate { tag, value } if tag == DETECTED => {
                self.detected_language = Some(value.clone())
            }
            TaskEvent::Intermediate { .. } | TaskEvent::Done => {}
            TaskEvent::Result { payload } => self.result = Some(payload.clone()),
            TaskEvent::Error { kind, step, detail } => {
                self.error = Some(ReportedError {
                    kind: *kind,
                    step: step.clone(),
                    detail: detail.clone(),
                })
            }
        }
    }

    pub(crate) fn failed(&self) -> Option<&ReportedError> {
        self.error.as_ref()
    }

    pub(crate) fn finish(self, elapsed: Duration) -> TaskReport {
        let finished_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        TaskReport {
            feature: self.feature,
            model: self.model,
            request: self.request,
            detected_language: self.detected_language,
            progress: self.progress,
            result: self.result,
            error: self.error,
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::Language;

    fn chunk(status: &str, completed: u64, total: u64) -> PullProgress {
        PullProgress {
            status: status.into(),
            total,
            completed,
        }
    }

    #[test]
    fn pull_progress_bar() {
        assert_eq!(
            render_pull_progress(&chunk("pulling manifest", 0, 0)).unwrap(),
            "pulling manifest..."
        );
        assert_eq!(
            render_pull_progress(&chunk("downloading", 45, 100)).unwrap(),
            "downloading [=========           ] 45.00%"
        );
        assert_eq!(
            render_pull_progress(&chunk("downloading", 100, 100)).unwrap(),
            "downloading [====================] 100.00%"
        );
        assert!(render_pull_progress(&chunk("verifying sha256 digest", 1, 2)).is_none());
    }

    #[test]
    fn error_lines_name_kind_and_step() {
        let line = event_line(&TaskEvent::Error {
            kind: ErrorKind::ExternalDataUnavailable,
            step: Some("fetch".into()),
            detail: "no captions".into(),
        })
        .unwrap();
        assert_eq!(line, "Transcript unavailable (fetch): no captions");
        assert!(event_line(&TaskEvent::Done).is_none());
    }

    #[test]
    fn report_collects_detection_and_result() {
        let request = TaskRequest::Translate {
            text: "This is a test.".into(),
            target: Language::parse("ja").unwrap(),
        };
        let mut builder = ReportBuilder::new("test-model", request);
        for ev in [
            TaskEvent::Intermediate {
                tag: DETECTED.into(),
                value: "English".into(),
            },
            TaskEvent::Result {
                payload: "これはテストです。".into(),
            },
            TaskEvent::Done,
        ] {
            builder.observe(&ev);
        }
        assert!(builder.failed().is_none());

        let report = builder.finish(Duration::from_millis(1500));
        assert_eq!(report.feature, Feature::Translate);
        assert_eq!(report.detected_language.as_deref(), Some("English"));
        assert_eq!(report.elapsed_ms, 1500);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["request"]["Translate"]["target"]["code"], "JA");
        assert!(OffsetDateTime::parse(&report.finished_at, &Rfc3339).is_ok());
    }
}
