//! Leaf collaborators invoked by pipeline steps.
//!
//! Both seams are blocking and synchronous: they are only ever called from a task
//! executor's own thread, never from the interactive loop. Implementations are
//! immutable after construction and shared through `Arc` without locking.

#[cfg(test)]
pub(crate) mod mock;
pub mod ollama;
pub mod youtube;

use crate::error::HubError;
use crate::model::ChatMessage;
use std::sync::Arc;

/// Chat-completion side of the connector.
pub trait ChatBackend: Send + Sync {
    fn model(&self) -> &str;

    /// Readiness flag fixed at startup.
    fn is_ready(&self) -> bool;

    /// Blocking chat completion; returns the assistant reply.
    fn chat(&self, messages: &[ChatMessage]) -> Result<String, HubError>;
}

/// Transcript resolver.
pub trait TranscriptSource: Send + Sync {
    /// Map a video link to its identifier. No network access.
    fn resolve_id(&self, url: &str) -> Result<String, HubError> {
        youtube::resolve_video_id(url)
    }

    /// Fetch the ordered text fragments of a transcript.
    fn fetch_fragments(&self, video_id: &str) -> Result<Vec<String>, HubError>;
}

/// Read-only handles shared by every pipeline run.
#[derive(Clone)]
pub struct Services {
    pub chat: Arc<dyn ChatBackend>,
    pub transcripts: Arc<dyn TranscriptSource>,
}

impl Services {
    pub fn new(chat: Arc<dyn ChatBackend>, transcripts: Arc<dyn TranscriptSource>) -> Self {
        Self { chat, transcripts }
    }
}
