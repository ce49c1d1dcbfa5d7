//! Scripted stand-ins for the connector and the transcript resolver.

use super::{youtube, ChatBackend, Services, TranscriptSource};
use crate::error::HubError;
use crate::model::ChatMessage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

pub(crate) enum Reply {
    Text(String),
    Fail(HubError),
    /// Blocks until the test sends the reply text.
    Wait(mpsc::Receiver<String>),
    /// Never returns, like a remote call stuck in flight.
    Hang,
    Panic,
}

impl Reply {
    pub(crate) fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

pub(crate) struct ScriptedChat {
    ready: bool,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            ready: true,
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn not_ready() -> Arc<Self> {
        Arc::new(Self {
            ready: false,
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatBackend for ScriptedChat {
    fn model(&self) -> &str {
        "test-model"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<String, HubError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(s)) => Ok(s),
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Wait(rx)) => rx
                .recv()
                .map_err(|_| HubError::Service("gate dropped".into())),
            Some(Reply::Hang) => loop {
                std::thread::park();
            },
            Some(Reply::Panic) => panic!("scripted chat panic"),
            None => Err(HubError::Service("no scripted reply left".into())),
        }
    }
}

pub(crate) struct FakeTranscripts {
    fragments: Result<Vec<String>, HubError>,
    resolves: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeTranscripts {
    pub(crate) fn with_fragments(fragments: &[&str]) -> Arc<Self> {
        Self::new(Ok(fragments.iter().map(|s| s.to_string()).collect()))
    }

    pub(crate) fn failing(err: HubError) -> Arc<Self> {
        Self::new(Err(err))
    }

    fn new(fragments: Result<Vec<String>, HubError>) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            resolves: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        })
    }

    pub(crate) fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TranscriptSource for FakeTranscripts {
    fn resolve_id(&self, url: &str) -> Result<String, HubError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        youtube::resolve_video_id(url)
    }

    fn fetch_fragments(&self, _video_id: &str) -> Result<Vec<String>, HubError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fragments.clone()
    }
}

pub(crate) fn services(chat: &Arc<ScriptedChat>, transcripts: &Arc<FakeTranscripts>) -> Services {
    Services::new(chat.clone(), transcripts.clone())
}

/// Services for tests that never touch transcripts.
pub(crate) fn chat_only(chat: &Arc<ScriptedChat>) -> Services {
    services(chat, &FakeTranscripts::with_fragments(&[]))
}
