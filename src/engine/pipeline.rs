//! Pipelines: fixed, named step sequences sharing one step signature.

use super::prompts;
use crate::backend::Services;
use crate::error::{ErrorKind, HubError};
use crate::model::{ChatMessage, Feature, TaskRequest};

/// Tag of the detected-language intermediate event.
pub const DETECTED: &str = "detected";
pub const PROGRESS_FETCHING: &str = "fetching transcript";
pub const PROGRESS_SUMMARIZING: &str = "summarizing";

/// What a single step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Progress(String),
    Intermediate { tag: &'static str, value: String },
    /// Final output; ends the run.
    Value(String),
    /// Ends the run.
    Failure { kind: ErrorKind, detail: String },
}

impl StepOutcome {
    fn failure(err: HubError) -> Self {
        StepOutcome::Failure {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// Values handed from one step to the next within a run.
#[derive(Debug, Default)]
pub struct Scratch {
    pub video_id: Option<String>,
    pub transcript: Option<String>,
    pub detected_language: Option<String>,
}

pub struct StepContext<'a> {
    pub request: &'a TaskRequest,
    pub services: &'a Services,
    pub scratch: Scratch,
}

impl<'a> StepContext<'a> {
    pub fn new(request: &'a TaskRequest, services: &'a Services) -> Self {
        Self {
            request,
            services,
            scratch: Scratch::default(),
        }
    }

    fn chat(&self, system: &str, user: &str) -> Result<String, HubError> {
        self.services
            .chat
            .chat(&[ChatMessage::system(system), ChatMessage::user(user)])
    }
}

pub type StepFn = fn(&mut StepContext<'_>) -> StepOutcome;

#[derive(Clone, Copy)]
pub struct Step {
    pub name: &'static str,
    pub run: StepFn,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    feature: Feature,
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn summarize() -> Self {
        Self {
            feature: Feature::Summarize,
            steps: vec![Step {
                name: "summarize",
                run: summarize_text,
            }],
        }
    }

    pub fn translate() -> Self {
        Self {
            feature: Feature::Translate,
            steps: vec![
                Step {
                    name: "detect",
                    run: detect_language,
                },
                Step {
                    name: "translate",
                    run: translate_text,
                },
            ],
        }
    }

    pub fn video_summarize() -> Self {
        Self {
            feature: Feature::VideoSummarize,
            steps: vec![
                Step {
                    name: "resolve",
                    run: resolve_video,
                },
                Step {
                    name: "fetch",
                    run: fetch_transcript,
                },
                Step {
                    name: "summarize",
                    run: summarize_transcript,
                },
            ],
        }
    }

    pub fn for_request(request: &TaskRequest) -> Self {
        match request.feature() {
            Feature::Summarize => Self::summarize(),
            Feature::Translate => Self::translate(),
            Feature::VideoSummarize => Self::video_summarize(),
        }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn accepts(&self, request: &TaskRequest) -> bool {
        request.feature() == self.feature
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

fn mismatch() -> StepOutcome {
    StepOutcome::Failure {
        kind: ErrorKind::Internal,
        detail: "request does not match pipeline".into(),
    }
}

fn summarize_text(ctx: &mut StepContext<'_>) -> StepOutcome {
    let TaskRequest::Summarize { text } = ctx.request else {
        return mismatch();
    };
    match ctx.chat(prompts::SUMMARIZE_TEXT, text) {
        Ok(summary) => StepOutcome::Value(summary),
        Err(e) => StepOutcome::failure(e),
    }
}

fn detect_language(ctx: &mut StepContext<'_>) -> StepOutcome {
    let TaskRequest::Translate { text, .. } = ctx.request else {
        return mismatch();
    };
    let reply = match ctx.chat(prompts::DETECT_LANGUAGE, text) {
        Ok(reply) => reply,
        Err(e) => return StepOutcome::failure(e),
    };
    let language = first_line(&reply);
    if language.is_empty() {
        return StepOutcome::failure(HubError::Service(
            "model did not name a language".into(),
        ));
    }
    ctx.scratch.detected_language = Some(language.clone());
    StepOutcome::Intermediate {
        tag: DETECTED,
        value: language,
    }
}

fn translate_text(ctx: &mut StepContext<'_>) -> StepOutcome {
    let TaskRequest::Translate { text, target } = ctx.request else {
        return mismatch();
    };
    let Some(detected) = ctx.scratch.detected_language.as_deref() else {
        return StepOutcome::Failure {
            kind: ErrorKind::Internal,
            detail: "translation ran without a detected language".into(),
        };
    };
    let instruction = prompts::translate(detected, target.name);
    match ctx.chat(&instruction, text) {
        Ok(translation) => StepOutcome::Value(translation),
        Err(e) => StepOutcome::failure(e),
    }
}

fn resolve_video(ctx: &mut StepContext<'_>) -> StepOutcome {
    let TaskRequest::VideoSummarize { url } = ctx.request else {
        return mismatch();
    };
    match ctx.services.transcripts.resolve_id(url) {
        Ok(id) => {
            ctx.scratch.video_id = Some(id);
            StepOutcome::Progress(PROGRESS_FETCHING.into())
        }
        // Any resolver fault here is a malformed link.
        Err(e) => StepOutcome::Failure {
            kind: ErrorKind::Input,
            detail: e.to_string(),
        },
    }
}

fn fetch_transcript(ctx: &mut StepContext<'_>) -> StepOutcome {
    let Some(id) = ctx.scratch.video_id.as_deref() else {
        return mismatch();
    };
    let fragments = match ctx.services.transcripts.fetch_fragments(id) {
        Ok(fragments) => fragments,
        Err(e) => {
            return StepOutcome::Failure {
                kind: ErrorKind::ExternalDataUnavailable,
                detail: e.to_string(),
            }
        }
    };
    let transcript = fragments.join(" ");
    if transcript.trim().is_empty() {
        return StepOutcome::Failure {
            kind: ErrorKind::ExternalDataUnavailable,
            detail: "transcript fetched, but it was empty".into(),
        };
    }
    ctx.scratch.transcript = Some(transcript);
    StepOutcome::Progress(PROGRESS_SUMMARIZING.into())
}

fn summarize_transcript(ctx: &mut StepContext<'_>) -> StepOutcome {
    let Some(transcript) = ctx.scratch.transcript.as_deref() else {
        return mismatch();
    };
    match ctx.chat(prompts::SUMMARIZE_VIDEO, transcript) {
        Ok(summary) => StepOutcome::Value(summary),
        Err(e) => StepOutcome::failure(e),
    }
}

fn first_line(reply: &str) -> String {
    reply.lines().next().unwrap_or_default().trim().to_string()
}
