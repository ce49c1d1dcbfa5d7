//! YouTube transcript resolver.
//!
//! Link parsing is pure. Fetching reads the caption track list embedded in the watch
//! page, picks a track by language preference and downloads its timed-text XML.

use super::TranscriptSource;
use crate::error::HubError;
use crate::model::HubConfig;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

const WATCH_URL: &str = "https://www.youtube.com/watch";

static TEXT_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();
static NUMERIC_ENTITY_RE: OnceLock<Regex> = OnceLock::new();

/// Extract the video identifier from a YouTube link.
pub fn resolve_video_id(url: &str) -> Result<String, HubError> {
    let invalid =
        || HubError::Input("Invalid or unsupported video URL. Must be a valid YouTube link.".into());

    let parsed = Url::parse(url.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let host = parsed.host_str().ok_or_else(invalid)?;
    let mut segments = parsed.path().trim_start_matches('/').split('/');

    let id = match host {
        "youtu.be" | "www.youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "www.youtube.com" | "m.youtube.com" => match segments.next() {
            Some("watch") => parsed
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("shorts") | Some("embed") | Some("live") => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    };

    match id {
        Some(id) if is_video_id(&id) => Ok(id),
        _ => Err(invalid()),
    }
}

fn is_video_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// Fetches transcripts over HTTPS.
pub struct YouTubeTranscripts {
    http: Client,
    languages: Vec<String>,
}

impl YouTubeTranscripts {
    pub fn new(cfg: &HubConfig) -> Result<Self, HubError> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| HubError::Internal(format!("build http client: {e}")))?;
        let languages = if cfg.transcript_languages.is_empty() {
            vec!["en".to_string()]
        } else {
            cfg.transcript_languages.clone()
        };
        Ok(Self { http, languages })
    }

    fn get_text(&self, url: &str) -> Result<String, HubError> {
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US")
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| HubError::ExternalDataUnavailable(e.to_string()))?;
        resp.text()
            .map_err(|e| HubError::ExternalDataUnavailable(e.to_string()))
    }
}

impl TranscriptSource for YouTubeTranscripts {
    fn fetch_fragments(&self, video_id: &str) -> Result<Vec<String>, HubError> {
        let html = self.get_text(&format!("{WATCH_URL}?v={video_id}"))?;
        if html.contains("class=\"g-recaptcha\"") {
            return Err(HubError::ExternalDataUnavailable(
                "YouTube is rate limiting transcript requests; try again later".into(),
            ));
        }

        let tracks = extract_caption_tracks(&html)?;
        let track = select_track(&tracks, &self.languages).ok_or_else(|| {
            let available: Vec<&str> = tracks.iter().map(|t| t.language_code.as_str()).collect();
            HubError::ExternalDataUnavailable(format!(
                "no transcript in {:?} (available: {:?})",
                self.languages, available
            ))
        })?;
        debug!(video_id, language = %track.language_code, generated = track.is_generated(), "fetching transcript");

        let xml = self.get_text(&track.base_url.replace("&fmt=srv3", ""))?;
        let fragments = parse_timedtext(&xml);
        if fragments.is_empty() {
            return Err(HubError::ExternalDataUnavailable(
                "transcript fetched, but it was empty".into(),
            ));
        }
        Ok(fragments)
    }
}

/// Pull `captions.playerCaptionsTracklistRenderer.captionTracks` out of a watch page.
fn extract_caption_tracks(html: &str) -> Result<Vec<CaptionTrack>, HubError> {
    let unavailable = || {
        HubError::ExternalDataUnavailable("transcripts are disabled for this video".into())
    };
    let (_, after) = html.split_once("\"captions\":").ok_or_else(unavailable)?;
    let (captions, _) = after.split_once(",\"videoDetails").ok_or_else(unavailable)?;

    let v: serde_json::Value = serde_json::from_str(captions)
        .map_err(|e| HubError::ExternalDataUnavailable(format!("malformed caption data: {e}")))?;
    let tracks = v
        .get("playerCaptionsTracklistRenderer")
        .and_then(|r| r.get("captionTracks"))
        .cloned()
        .ok_or_else(unavailable)?;
    let tracks: Vec<CaptionTrack> = serde_json::from_value(tracks)
        .map_err(|e| HubError::ExternalDataUnavailable(format!("malformed caption tracks: {e}")))?;
    if tracks.is_empty() {
        return Err(unavailable());
    }
    Ok(tracks)
}

/// First preferred language wins; within a language, manual tracks beat generated ones.
fn select_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    languages.iter().find_map(|lang| {
        let matching = tracks
            .iter()
            .filter(move |t| t.language_code.eq_ignore_ascii_case(lang));
        matching
            .clone()
            .find(|t| !t.is_generated())
            .or_else(|| matching.clone().next())
    })
}

/// Text fragments of a timed-text document, in order, with markup removed.
fn parse_timedtext(xml: &str) -> Vec<String> {
    let text_re =
        TEXT_RE.get_or_init(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("static regex"));
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"));

    text_re
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| {
            let decoded = unescape(m.as_str());
            tag_re.replace_all(&decoded, "").trim().to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decode XML entities. `&amp;` goes first so double-escaped text (`&amp;#39;`)
/// decodes fully, as YouTube emits it.
fn unescape(s: &str) -> String {
    let s = s
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");
    let numeric = NUMERIC_ENTITY_RE
        .get_or_init(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("static regex"));
    numeric
        .replace_all(&s, |caps: &regex::Captures<'_>| {
            let raw = &caps[1];
            let code = match raw.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => raw.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
