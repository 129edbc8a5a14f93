//! Session and message bookkeeping so the transcript mirrors server state.
//!
//! The displayed list is optimistic: locally appended entries are tagged
//! pending until the server round-trip resolves them. List/open/delete reads
//! are best-effort (a stale side list is acceptable); only a 401 escapes this
//! layer, because expired auth must reset the whole client.

use tracing::debug;

use crate::api::{ApiClient, Role, SessionDetail, SessionSummary, Source, WireMessage};
use crate::error::{ClientError, ClientResult};

/// Label shown on a voice question until the transcript arrives.
pub const VOICE_PLACEHOLDER: &str = "Voice message";

/// Session titles derive from the first question, clipped to this many chars.
pub const TITLE_MAX_CHARS: usize = 60;

const UNTITLED: &str = "New Chat";

/// One transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub audio_url: Option<String>,
    pub source: Source,
    pub is_voice: bool,
    /// Locally appended, not yet confirmed by a server response.
    pub pending: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            audio_url: None,
            source: Source::General,
            is_voice: false,
            pending: true,
        }
    }

    pub fn voice_placeholder() -> Self {
        Self {
            is_voice: true,
            ..Self::user(VOICE_PLACEHOLDER)
        }
    }

    pub fn assistant(text: impl Into<String>, source: Source, audio_url: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            audio_url,
            source,
            is_voice: false,
            pending: false,
        }
    }

    /// Terminal error entry; a failed exchange resolves into one of these
    /// rather than silently dropping the provisional question.
    pub fn error(text: impl Into<String>) -> Self {
        Self::assistant(text, Source::General, None)
    }
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            role: wire.role,
            text: wire.content,
            audio_url: wire.audio_url,
            source: wire.source,
            is_voice: wire.is_voice,
            pending: false,
        }
    }
}

/// Clip a title seed the way the server derives titles from first questions.
pub fn derive_title(seed: &str) -> String {
    seed.chars().take(TITLE_MAX_CHARS).collect()
}

/// Run a best-effort read: transport failures are swallowed (logged, `None`),
/// expired auth propagates.
fn best_effort<T>(result: ClientResult<T>, what: &str) -> ClientResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ClientError::SessionExpired) => Err(ClientError::SessionExpired),
        Err(err) => {
            debug!("{what} failed: {err}");
            Ok(None)
        }
    }
}

/// Active session, its transcript, and the side list of all sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    active_id: Option<i64>,
    title: String,
    messages: Vec<Message>,
    sessions: Vec<SessionSummary>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            active_id: None,
            title: UNTITLED.to_string(),
            messages: Vec::new(),
            sessions: Vec::new(),
        }
    }

    pub fn active_id(&self) -> Option<i64> {
        self.active_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    /// Drop everything, including the side list. Used on auth reset.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Start a fresh local conversation; the server session is created on the
    /// first completed exchange.
    pub fn new_session(&mut self) {
        self.active_id = None;
        self.title = UNTITLED.to_string();
        self.messages.clear();
    }

    /// Optimistic append; returns the entry's index.
    pub fn append(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Replace the placeholder label on the most recently appended user
    /// message with the transcribed question. Returns the index touched.
    pub fn resolve_voice_transcript(&mut self, transcript: &str) -> Option<usize> {
        let index = self
            .messages
            .iter()
            .rposition(|message| message.role == Role::User)?;
        self.messages[index].text = transcript.to_string();
        self.messages[index].pending = false;
        Some(index)
    }

    /// Mark a provisional entry as confirmed by a server response.
    pub fn confirm(&mut self, index: usize) {
        if let Some(message) = self.messages.get_mut(index) {
            message.pending = false;
        }
    }

    /// Adopt a server-assigned session id when none is active, deriving the
    /// title from the triggering question. Returns true when adopted.
    pub fn reconcile(&mut self, session_id: Option<i64>, title_seed: &str) -> bool {
        let Some(id) = session_id else {
            return false;
        };
        if self.active_id.is_some() {
            return false;
        }
        self.active_id = Some(id);
        self.title = if title_seed.is_empty() {
            UNTITLED.to_string()
        } else {
            derive_title(title_seed)
        };
        true
    }

    fn apply_sessions(&mut self, sessions: Vec<SessionSummary>) {
        self.sessions = sessions;
    }

    fn apply_history(&mut self, detail: SessionDetail) {
        self.active_id = Some(detail.id);
        self.title = detail.title;
        self.messages = detail.messages.into_iter().map(Message::from).collect();
    }

    /// Remove a deleted session from the side list; returns true when the
    /// active session was the one deleted (caller sees a fresh conversation).
    fn apply_deleted(&mut self, id: i64) -> bool {
        self.sessions.retain(|session| session.id != id);
        if self.active_id == Some(id) {
            self.new_session();
            true
        } else {
            false
        }
    }

    // ── Server-backed operations (best-effort except 401) ─────────────

    pub fn refresh_sessions(&mut self, api: &ApiClient) -> ClientResult<()> {
        if let Some(list) = best_effort(api.list_sessions(), "session list")? {
            self.apply_sessions(list);
        }
        Ok(())
    }

    pub fn open_session(&mut self, api: &ApiClient, id: i64) -> ClientResult<()> {
        if let Some(detail) = best_effort(api.get_session(id), "session open")? {
            self.apply_history(detail);
        }
        self.refresh_sessions(api)
    }

    pub fn delete_session(&mut self, api: &ApiClient, id: i64) -> ClientResult<()> {
        if best_effort(api.delete_session(id), "session delete")?.is_some() {
            self.apply_deleted(id);
        }
        self.refresh_sessions(api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: i64, title: &str) -> SessionSummary {
        serde_json::from_value(serde_json::json!({ "id": id, "title": title }))
            .expect("summary fixture")
    }

    #[test]
    fn append_preserves_order() {
        let mut store = SessionStore::new();
        store.append(Message::user("one"));
        store.append(Message::assistant("two", Source::General, None));
        let texts: Vec<&str> = store.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn reconcile_adopts_id_and_title_when_none_active() {
        let mut store = SessionStore::new();
        assert!(store.reconcile(Some(7), "hi"));
        assert_eq!(store.active_id(), Some(7));
        assert_eq!(store.title(), "hi");
    }

    #[test]
    fn reconcile_keeps_existing_active_session() {
        let mut store = SessionStore::new();
        assert!(store.reconcile(Some(3), "first"));
        assert!(!store.reconcile(Some(9), "second"));
        assert_eq!(store.active_id(), Some(3));
        assert_eq!(store.title(), "first");
    }

    #[test]
    fn reconcile_without_id_is_a_no_op() {
        let mut store = SessionStore::new();
        assert!(!store.reconcile(None, "hi"));
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn derived_title_clips_at_sixty_chars() {
        let long = "x".repeat(200);
        let mut store = SessionStore::new();
        store.reconcile(Some(1), &long);
        assert_eq!(store.title().chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn voice_transcript_replaces_latest_user_message() {
        let mut store = SessionStore::new();
        store.append(Message::user("earlier question"));
        store.append(Message::assistant("earlier answer", Source::General, None));
        let placeholder = store.append(Message::voice_placeholder());

        let touched = store.resolve_voice_transcript("what is rust");
        assert_eq!(touched, Some(placeholder));
        assert_eq!(store.messages()[placeholder].text, "what is rust");
        assert!(!store.messages()[placeholder].pending);
        assert_eq!(store.messages()[0].text, "earlier question");
    }

    #[test]
    fn voice_transcript_with_no_user_message_touches_nothing() {
        let mut store = SessionStore::new();
        store.append(Message::assistant("answer", Source::General, None));
        assert_eq!(store.resolve_voice_transcript("hi"), None);
    }

    #[test]
    fn deleting_the_active_session_clears_the_view() {
        let mut store = SessionStore::new();
        store.apply_sessions(vec![summary(1, "a"), summary(2, "b")]);
        store.reconcile(Some(2), "b question");
        store.append(Message::user("hello"));

        assert!(store.apply_deleted(2));
        assert_eq!(store.active_id(), None);
        assert!(store.messages().is_empty());
        assert_eq!(store.sessions().len(), 1);
    }

    #[test]
    fn deleting_another_session_leaves_the_view_alone() {
        let mut store = SessionStore::new();
        store.apply_sessions(vec![summary(1, "a"), summary(2, "b")]);
        store.reconcile(Some(2), "b question");
        store.append(Message::user("hello"));

        assert!(!store.apply_deleted(1));
        assert_eq!(store.active_id(), Some(2));
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn history_replaces_the_displayed_list() {
        let mut store = SessionStore::new();
        store.append(Message::user("local"));
        let detail: SessionDetail = serde_json::from_value(serde_json::json!({
            "id": 4,
            "title": "opened",
            "messages": [
                { "role": "user", "content": "q", "is_voice": true },
                { "role": "ai", "content": "a", "audio_url": "media/2.mp3", "source": "pdf" }
            ]
        }))
        .expect("detail fixture");

        store.apply_history(detail);
        assert_eq!(store.active_id(), Some(4));
        assert_eq!(store.title(), "opened");
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.messages()[0].role, Role::User);
        assert!(store.messages()[0].is_voice);
        assert_eq!(store.messages()[1].source, Source::Pdf);
        assert_eq!(
            store.messages()[1].audio_url.as_deref(),
            Some("media/2.mp3")
        );
    }

    #[test]
    fn best_effort_swallows_transport_and_propagates_expiry() {
        let swallowed = best_effort::<()>(
            Err(ClientError::Transport("down".to_string())),
            "session list",
        );
        assert!(matches!(swallowed, Ok(None)));

        let expired = best_effort::<()>(Err(ClientError::SessionExpired), "session list");
        assert!(matches!(expired, Err(ClientError::SessionExpired)));
    }

    #[test]
    fn reset_drops_everything() {
        let mut store = SessionStore::new();
        store.apply_sessions(vec![summary(1, "a")]);
        store.reconcile(Some(1), "q");
        store.append(Message::user("hello"));

        store.reset();
        assert_eq!(store.active_id(), None);
        assert!(store.messages().is_empty());
        assert!(store.sessions().is_empty());
        assert_eq!(store.title(), UNTITLED);
    }
}
