//! Exchange orchestration and application state so one flight runs at a time.
//!
//! Text and voice asks share one busy gate: while a flight is outstanding, a
//! new send is a rejected no-op, never queued. Workers run the blocking HTTP
//! call off-thread and report back over a channel the UI loop drains.

use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::{debug, warn};

use crate::api::{ApiClient, AskResponse, Source, UserInfo, VoiceResponse};
use crate::audio::EncodedAudio;
use crate::error::{ClientError, ClientResult};
use crate::session::{Message, SessionStore};

/// Unified success payload for both exchange paths.
#[derive(Debug, Clone)]
pub struct ExchangeReply {
    pub question: Option<String>,
    pub answer: String,
    pub source: Source,
    pub audio_file: Option<String>,
    pub session_id: Option<i64>,
}

impl From<AskResponse> for ExchangeReply {
    fn from(resp: AskResponse) -> Self {
        Self {
            question: None,
            answer: resp.answer,
            source: resp.source,
            audio_file: None,
            session_id: resp.session_id,
        }
    }
}

impl From<VoiceResponse> for ExchangeReply {
    fn from(resp: VoiceResponse) -> Self {
        Self {
            question: resp.question,
            answer: resp.answer,
            source: resp.source,
            audio_file: resp.audio_file,
            session_id: resp.session_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeKind {
    Text,
    Voice,
}

struct ExchangeFlight {
    kind: ExchangeKind,
    /// Question text used to seed the session title on text asks; voice asks
    /// seed from the transcript in the reply.
    title_seed: Option<String>,
    rx: Receiver<ClientResult<ExchangeReply>>,
}

/// What the UI must react to after draining a flight or resetting auth.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A transcript entry landed at this index.
    MessageAppended(usize),
    /// The provisional voice label at this index now shows the transcript.
    TranscriptResolved(usize),
    /// A server-assigned session id was adopted.
    SessionAdopted { id: i64, title: String },
    /// One user-visible notification; never stacked per failure instance.
    Notice(String),
    /// Server-relative path of response audio to fetch and play now.
    PlayAudio(String),
    /// Auth is gone; the UI must fall back to the unauthenticated view.
    AuthExpired,
}

/// Explicit application state: current user, conversation store, audio
/// affordances, and the single outstanding flight.
pub struct AppState {
    pub user: Option<UserInfo>,
    pub store: SessionStore,
    pub autoplay: bool,
    pub last_audio: Option<String>,
    flight: Option<ExchangeFlight>,
}

impl AppState {
    pub fn new(autoplay: bool) -> Self {
        Self {
            user: None,
            store: SessionStore::new(),
            autoplay,
            last_audio: None,
            flight: None,
        }
    }

    /// True while an exchange is outstanding; send affordances are disabled.
    pub fn is_busy(&self) -> bool {
        self.flight.is_some()
    }

    /// Drop every trace of the authenticated session. Handled once here for
    /// the cross-cutting 401 signal, whatever operation tripped it.
    pub fn reset_auth(&mut self) {
        self.user = None;
        self.store.reset();
        self.last_audio = None;
        self.flight = None;
    }

    /// Launch a text exchange. Returns false (and changes nothing) when busy
    /// or the question is blank.
    pub fn send_text(&mut self, api: &ApiClient, question: &str) -> bool {
        let question = question.trim();
        if question.is_empty() {
            return false;
        }
        let (tx, rx) = bounded(1);
        let session_id = self.store.active_id();
        if !self.begin_text_exchange(question.to_string(), rx) {
            return false;
        }
        let api = api.clone();
        let question = question.to_string();
        thread::spawn(move || {
            let outcome = api
                .ask_text(&question, session_id)
                .map(ExchangeReply::from);
            if tx.send(outcome).is_err() {
                warn!("text exchange finished after state was dropped");
            }
        });
        true
    }

    /// Launch a voice exchange with a finalized capture payload.
    pub fn send_voice(&mut self, api: &ApiClient, audio: EncodedAudio) -> bool {
        let (tx, rx) = bounded(1);
        let session_id = self.store.active_id();
        if !self.begin_voice_exchange(rx) {
            return false;
        }
        debug!(
            bytes = audio.wav.len(),
            duration_secs = audio.duration_secs,
            "submitting voice exchange"
        );
        let api = api.clone();
        thread::spawn(move || {
            let outcome = api
                .ask_voice(audio.wav, session_id)
                .map(ExchangeReply::from);
            if tx.send(outcome).is_err() {
                warn!("voice exchange finished after state was dropped");
            }
        });
        true
    }

    fn begin_text_exchange(
        &mut self,
        question: String,
        rx: Receiver<ClientResult<ExchangeReply>>,
    ) -> bool {
        if self.is_busy() {
            return false;
        }
        self.store.append(Message::user(question.clone()));
        self.flight = Some(ExchangeFlight {
            kind: ExchangeKind::Text,
            title_seed: Some(question),
            rx,
        });
        true
    }

    fn begin_voice_exchange(&mut self, rx: Receiver<ClientResult<ExchangeReply>>) -> bool {
        if self.is_busy() {
            return false;
        }
        self.store.append(Message::voice_placeholder());
        self.flight = Some(ExchangeFlight {
            kind: ExchangeKind::Voice,
            title_seed: None,
            rx,
        });
        true
    }

    /// Poll the outstanding flight once and fold its outcome into the store.
    /// Cheap when idle or still waiting.
    pub fn drain(&mut self) -> Vec<AppEvent> {
        let outcome = match &self.flight {
            None => return Vec::new(),
            Some(flight) => match flight.rx.try_recv() {
                Err(TryRecvError::Empty) => return Vec::new(),
                Err(TryRecvError::Disconnected) => {
                    Err(ClientError::Transport("exchange worker lost".to_string()))
                }
                Ok(outcome) => outcome,
            },
        };
        let flight = match self.flight.take() {
            Some(flight) => flight,
            None => return Vec::new(),
        };
        match outcome {
            Ok(reply) => self.apply_reply(flight, reply),
            Err(err) => self.apply_failure(err),
        }
    }

    fn apply_reply(&mut self, flight: ExchangeFlight, reply: ExchangeReply) -> Vec<AppEvent> {
        let mut events = Vec::new();

        match flight.kind {
            ExchangeKind::Voice => {
                if let Some(question) = reply.question.as_deref() {
                    if let Some(index) = self.store.resolve_voice_transcript(question) {
                        events.push(AppEvent::TranscriptResolved(index));
                    }
                }
            }
            ExchangeKind::Text => {
                if let Some(index) = self.store.messages().len().checked_sub(1) {
                    self.store.confirm(index);
                }
            }
        }

        let index = self.store.append(Message::assistant(
            reply.answer.clone(),
            reply.source,
            reply.audio_file.clone(),
        ));
        events.push(AppEvent::MessageAppended(index));

        if let Some(path) = reply.audio_file {
            self.last_audio = Some(path.clone());
            if self.autoplay {
                events.push(AppEvent::PlayAudio(path));
            }
        }

        let seed = reply
            .question
            .or(flight.title_seed)
            .unwrap_or_else(|| "Voice Chat".to_string());
        if self.store.reconcile(reply.session_id, &seed) {
            events.push(AppEvent::SessionAdopted {
                id: self.store.active_id().unwrap_or_default(),
                title: self.store.title().to_string(),
            });
        }

        events
    }

    fn apply_failure(&mut self, err: ClientError) -> Vec<AppEvent> {
        if matches!(err, ClientError::SessionExpired) {
            self.reset_auth();
            return vec![
                AppEvent::AuthExpired,
                AppEvent::Notice("Session expired — please log in again".to_string()),
            ];
        }
        let index = self.store.append(Message::error(format!("Error: {err}")));
        vec![
            AppEvent::MessageAppended(index),
            AppEvent::Notice(err.to_string()),
        ]
    }
}
