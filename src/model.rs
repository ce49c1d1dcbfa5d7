use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub host: String,
    pub model: String,
    pub pull: bool,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    pub transcript_languages: Vec<String>,
    pub event_capacity: usize,
    pub user_agent: String,
}

/// The three feature pages of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Translate,
    Summarize,
    VideoSummarize,
}

impl Feature {
    pub const ALL: [Feature; 3] = [
        Feature::Translate,
        Feature::Summarize,
        Feature::VideoSummarize,
    ];

    pub fn index(self) -> usize {
        match self {
            Feature::Translate => 0,
            Feature::Summarize => 1,
            Feature::VideoSummarize => 2,
        }
    }

    /// Label of the triggering affordance.
    pub fn action_label(self) -> &'static str {
        match self {
            Feature::Translate => "Translate",
            Feature::Summarize => "Summarize",
            Feature::VideoSummarize => "Fetch and Summarize Video",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::Translate => "Translator",
            Feature::Summarize => "Text Summary",
            Feature::VideoSummarize => "Video Summary",
        };
        f.write_str(name)
    }
}

/// A translation target offered by the translator page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub name: &'static str,
    pub code: &'static str,
}

pub const LANGUAGES: [Language; 12] = [
    Language { name: "English", code: "EN" },
    Language { name: "Japanese", code: "JA" },
    Language { name: "Korean", code: "KO" },
    Language { name: "Chinese", code: "ZH" },
    Language { name: "Spanish", code: "ES" },
    Language { name: "Portuguese", code: "PT" },
    Language { name: "Italian", code: "IT" },
    Language { name: "French", code: "FR" },
    Language { name: "German", code: "DE" },
    Language { name: "Arabic", code: "AR" },
    Language { name: "Czech", code: "CS" },
    Language { name: "Dutch", code: "NL" },
];

impl Language {
    /// Look up a language by name or two-letter code, case-insensitively.
    /// Also accepts the selector label form, e.g. `"Japanese (JA)"`.
    pub fn parse(s: &str) -> Option<Language> {
        let s = s.trim();
        let s = s.split(" (").next().unwrap_or(s).trim();
        LANGUAGES
            .iter()
            .copied()
            .find(|l| l.name.eq_ignore_ascii_case(s) || l.code.eq_ignore_ascii_case(s))
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.code)
    }
}

/// Validated, immutable input for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskRequest {
    Summarize { text: String },
    Translate { text: String, target: Language },
    VideoSummarize { url: String },
}

impl TaskRequest {
    pub fn feature(&self) -> Feature {
        match self {
            TaskRequest::Summarize { .. } => Feature::Summarize,
            TaskRequest::Translate { .. } => Feature::Translate,
            TaskRequest::VideoSummarize { .. } => Feature::VideoSummarize,
        }
    }
}

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Events emitted by a task executor, in production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEvent {
    Progress {
        message: String,
    },
    Intermediate {
        tag: String,
        value: String,
    },
    Result {
        payload: String,
    },
    Error {
        kind: ErrorKind,
        step: Option<String>,
        detail: String,
    },
    /// Sent exactly once after the terminal event.
    Done,
}

impl TaskEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Result { .. } | TaskEvent::Error { .. })
    }
}

/// A task event tagged with the page and run it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEvent {
    pub feature: Feature,
    pub task_id: TaskId,
    pub event: TaskEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chunk of a streamed model pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    pub status: String,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
}

/// Outcome of a text-mode run, printed with `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub feature: Feature,
    pub model: String,
    pub request: TaskRequest,
    pub detected_language: Option<String>,
    pub progress: Vec<String>,
    pub result: Option<String>,
    pub error: Option<ReportedError>,
    pub elapsed_ms: u64,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedError {
    pub kind: ErrorKind,
    pub step: Option<String>,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_parse_accepts_name_code_and_label() {
        assert_eq!(Language::parse("Japanese").map(|l| l.code), Some("JA"));
        assert_eq!(Language::parse("ja").map(|l| l.name), Some("Japanese"));
        assert_eq!(Language::parse("German (DE)").map(|l| l.code), Some("DE"));
        assert_eq!(Language::parse("Klingon"), None);
        assert_eq!(Language::parse(""), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Idle.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskEvent::Result { payload: "x".into() }.is_terminal());
        assert!(!TaskEvent::Done.is_terminal());
    }

    #[test]
    fn chat_roles_serialize_lowercase() {
        let s = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert_eq!(s, r#"{"role":"system","content":"hi"}"#);
    }
}
