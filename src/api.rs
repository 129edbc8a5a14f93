//! HTTP client for the assistant server so every call shares auth and error policy.
//!
//! Auth rides on an HTTP-only cookie managed by the client's cookie store.
//! A 401 from any endpoint maps to [`ClientError::SessionExpired`] here, once,
//! so callers never special-case it individually.

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Exchanges can sit behind STT + LLM + TTS server-side; allow for it.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Message author, as the server spells it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai")]
    Assistant,
}

/// Which knowledge base an answer drew from. Drives a badge only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "general")]
    #[default]
    General,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub is_voice: bool,
    #[serde(default)]
    pub source: Source,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionDetail {
    pub id: i64,
    pub title: String,
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub session_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceResponse {
    #[serde(default)]
    pub question: Option<String>,
    pub answer: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub session_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdfInfo {
    pub id: i64,
    pub original_name: String,
    pub page_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadReply {
    pub message: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<i64>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: UserInfo,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Map a non-success status (plus the server's `detail`, when parseable) to a
/// client error. 401 is the one cross-cutting case.
fn classify_status(status: StatusCode, detail: Option<String>) -> Option<ClientError> {
    if status == StatusCode::UNAUTHORIZED {
        return Some(ClientError::SessionExpired);
    }
    if !status.is_success() {
        let message = detail.unwrap_or_else(|| format!("server error ({status})"));
        return Some(ClientError::Transport(message));
    }
    None
}

/// Cookie-authenticated client for the assistant server.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Absolute URL for a server-relative media path (`audio_url`/`audio_file`).
    pub fn media_url(&self, relative: &str) -> String {
        format!("{}/{}", self.base, relative.trim_start_matches('/'))
    }

    fn take_ok(resp: Response) -> ClientResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = resp
            .text()
            .ok()
            .and_then(|raw| serde_json::from_str::<ErrorBody>(&raw).ok())
            .and_then(|body| body.detail);
        Err(classify_status(status, detail)
            .unwrap_or_else(|| ClientError::Transport(format!("server error ({status})"))))
    }

    // ── Auth ──────────────────────────────────────────────────────────

    pub fn login(&self, username: &str, password: &str) -> ClientResult<UserInfo> {
        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest { username, password })
            .send()?;
        let envelope: UserEnvelope = Self::take_ok(resp)?.json()?;
        Ok(envelope.user)
    }

    pub fn register(&self, username: &str, email: &str, password: &str) -> ClientResult<UserInfo> {
        let resp = self
            .http
            .post(self.url("/api/auth/register"))
            .json(&RegisterRequest {
                username,
                email,
                password,
            })
            .send()?;
        let envelope: UserEnvelope = Self::take_ok(resp)?.json()?;
        Ok(envelope.user)
    }

    /// Best-effort server-side cookie clear; local state is reset regardless.
    pub fn logout(&self) {
        if let Err(err) = self.http.post(self.url("/api/auth/logout")).send() {
            debug!("logout request failed: {err}");
        }
    }

    pub fn me(&self) -> ClientResult<UserInfo> {
        let resp = self.http.get(self.url("/api/auth/me")).send()?;
        Ok(Self::take_ok(resp)?.json()?)
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn list_sessions(&self) -> ClientResult<Vec<SessionSummary>> {
        let resp = self.http.get(self.url("/api/chat/sessions")).send()?;
        Ok(Self::take_ok(resp)?.json()?)
    }

    pub fn get_session(&self, id: i64) -> ClientResult<SessionDetail> {
        let resp = self
            .http
            .get(self.url(&format!("/api/chat/sessions/{id}")))
            .send()?;
        Ok(Self::take_ok(resp)?.json()?)
    }

    pub fn delete_session(&self, id: i64) -> ClientResult<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/chat/sessions/{id}")))
            .send()?;
        Self::take_ok(resp)?;
        Ok(())
    }

    // ── Exchanges ─────────────────────────────────────────────────────

    pub fn ask_text(&self, question: &str, session_id: Option<i64>) -> ClientResult<AskResponse> {
        let resp = self
            .http
            .post(self.url("/api/chat/ask"))
            .json(&AskRequest {
                question,
                session_id,
            })
            .send()?;
        Ok(Self::take_ok(resp)?.json()?)
    }

    /// Submit a captured recording as multipart; the payload stays opaque.
    pub fn ask_voice(
        &self,
        wav: Vec<u8>,
        session_id: Option<i64>,
    ) -> ClientResult<VoiceResponse> {
        let part = Part::bytes(wav)
            .file_name("voice.wav")
            .mime_str("audio/wav")
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let mut form = Form::new().part("file", part);
        if let Some(id) = session_id {
            form = form.text("session_id", id.to_string());
        }
        let resp = self
            .http
            .post(self.url("/api/chat/voice"))
            .multipart(form)
            .send()?;
        Ok(Self::take_ok(resp)?.json()?)
    }

    /// Fetch response audio bytes for playback.
    pub fn fetch_audio(&self, relative: &str) -> ClientResult<Vec<u8>> {
        let resp = self.http.get(self.media_url(relative)).send()?;
        let bytes = Self::take_ok(resp)?.bytes()?;
        Ok(bytes.to_vec())
    }

    // ── PDF library ───────────────────────────────────────────────────

    pub fn list_pdfs(&self) -> ClientResult<Vec<PdfInfo>> {
        let resp = self.http.get(self.url("/api/pdf/list")).send()?;
        Ok(Self::take_ok(resp)?.json()?)
    }

    pub fn upload_pdf(&self, path: &std::path::Path) -> ClientResult<UploadReply> {
        let form = Form::new()
            .file("file", path)
            .map_err(ClientError::Io)?;
        let resp = self
            .http
            .post(self.url("/api/pdf/upload"))
            .multipart(form)
            .send()?;
        Ok(Self::take_ok(resp)?.json()?)
    }

    pub fn delete_pdf(&self, id: i64) -> ClientResult<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/pdf/{id}")))
            .send()?;
        Self::take_ok(resp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_session_expired() {
        let err = classify_status(StatusCode::UNAUTHORIZED, None);
        assert!(matches!(err, Some(ClientError::SessionExpired)));
    }

    #[test]
    fn server_detail_carries_through() {
        let err = classify_status(
            StatusCode::BAD_REQUEST,
            Some("Audio file is too short".to_string()),
        );
        match err {
            Some(ClientError::Transport(detail)) => {
                assert_eq!(detail, "Audio file is too short");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn missing_detail_falls_back_to_status() {
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, None);
        match err {
            Some(ClientError::Transport(detail)) => {
                assert!(detail.contains("500"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn success_statuses_classify_as_none() {
        assert!(classify_status(StatusCode::OK, None).is_none());
        assert!(classify_status(StatusCode::CREATED, None).is_none());
    }

    #[test]
    fn media_url_prefixes_relative_paths() {
        let api = ApiClient::new("http://localhost:8000/").expect("client");
        assert_eq!(
            api.media_url("media/1.mp3"),
            "http://localhost:8000/media/1.mp3"
        );
        assert_eq!(
            api.media_url("/media/1.mp3"),
            "http://localhost:8000/media/1.mp3"
        );
    }

    #[test]
    fn wire_message_tolerates_missing_optionals() {
        let msg: WireMessage =
            serde_json::from_str(r#"{"role":"ai","content":"hi"}"#).expect("parse");
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.audio_url.is_none());
        assert!(!msg.is_voice);
        assert_eq!(msg.source, Source::General);
    }

    #[test]
    fn voice_response_parses_full_shape() {
        let json = r#"{
            "question": "hi",
            "answer": "hello",
            "source": "pdf",
            "audio_file": "media/1.mp3",
            "session_id": 7
        }"#;
        let resp: VoiceResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(resp.question.as_deref(), Some("hi"));
        assert_eq!(resp.source, Source::Pdf);
        assert_eq!(resp.session_id, Some(7));
    }
}
