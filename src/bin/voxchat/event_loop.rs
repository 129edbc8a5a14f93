//! Cooperative UI loop so input keys, meter ticks, and flight drains share one thread.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tracing::{debug, warn};
use unicode_width::UnicodeWidthChar;

use voxchat::api::ApiClient;
use voxchat::app::{AppEvent, AppState};
use voxchat::audio::Recorder;
use voxchat::error::ClientError;
use voxchat::playback::Player;
use voxchat::spectrum::{bar_heights, SpectrumAnalyser, BAR_COUNT, BAR_FLOOR};

use crate::commands::{parse_line, Command};
use crate::stats::{format_run_stats, RunStats};
use crate::status_line;
use crate::theme::Palette;
use crate::transcript;

const POLL_MS: u64 = 50;
const METER_UPDATE_MS: u64 = 80;
const SPINNER_TICK_MS: u64 = 120;

/// Columns reserved for the status segment when clipping echoed input.
const STATUS_RESERVE_COLS: usize = 44;

pub struct LoopDeps {
    pub api: ApiClient,
    pub recorder: Recorder,
    pub player: Option<Player>,
    pub palette: Palette,
}

/// Restores the terminal even when the loop unwinds.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

enum Flow {
    Continue,
    Quit,
}

pub struct EventLoop {
    deps: LoopDeps,
    app: AppState,
    stats: RunStats,
    input: String,
    meter: Option<SpectrumAnalyser>,
    bars: [u8; BAR_COUNT],
    record_started: Option<Instant>,
    spinner_index: usize,
    last_meter_tick: Instant,
    last_spinner_tick: Instant,
    status_dirty: bool,
}

impl EventLoop {
    pub fn new(deps: LoopDeps, app: AppState) -> Self {
        Self {
            deps,
            app,
            stats: RunStats::new(),
            input: String::new(),
            meter: None,
            bars: [BAR_FLOOR; BAR_COUNT],
            record_started: None,
            spinner_index: 0,
            last_meter_tick: Instant::now(),
            last_spinner_tick: Instant::now(),
            status_dirty: true,
        }
    }

    pub fn run(mut self) -> Result<RunStats> {
        let _guard = RawModeGuard::enter()?;
        self.print_info(&transcript::empty_state(&self.deps.palette))?;

        loop {
            if event::poll(Duration::from_millis(POLL_MS))? {
                if let Event::Key(key) = event::read()? {
                    if matches!(self.handle_key(key)?, Flow::Quit) {
                        break;
                    }
                }
            }
            if matches!(self.run_periodic(Instant::now())?, Flow::Quit) {
                break;
            }
            if self.status_dirty {
                self.redraw_status()?;
            }
        }

        // Abandoning a live capture still releases the device.
        if self.deps.recorder.is_recording() {
            self.deps.recorder.discard();
            self.meter = None;
        }
        let mut out = io::stdout();
        write!(out, "\r\x1b[2K")?;
        out.flush()?;
        let summary = format_run_stats(&self.stats);
        if !summary.is_empty() {
            write!(out, "{}", summary.replace('\n', "\r\n"))?;
            out.flush()?;
        }
        Ok(self.stats)
    }

    // ── Input handling ────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Result<Flow> {
        if key.kind != KeyEventKind::Press {
            return Ok(Flow::Continue);
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('d') => Ok(Flow::Quit),
                KeyCode::Char('r') => self.toggle_recording().map(|()| Flow::Continue),
                KeyCode::Char('p') => self.replay_last().map(|()| Flow::Continue),
                KeyCode::Char('t') => {
                    self.app.autoplay = !self.app.autoplay;
                    let label = if self.app.autoplay { "on" } else { "off" };
                    self.print_info(&format!("voice playback {label}"))?;
                    Ok(Flow::Continue)
                }
                _ => Ok(Flow::Continue),
            };
        }
        match key.code {
            KeyCode::Enter => self.submit_line(),
            KeyCode::Backspace => {
                self.input.pop();
                self.status_dirty = true;
                Ok(Flow::Continue)
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                self.status_dirty = true;
                Ok(Flow::Continue)
            }
            _ => Ok(Flow::Continue),
        }
    }

    fn submit_line(&mut self) -> Result<Flow> {
        let line = std::mem::take(&mut self.input);
        self.status_dirty = true;
        let Some(command) = parse_line(&line) else {
            return Ok(Flow::Continue);
        };
        match command {
            Command::Ask(question) => {
                if self.app.is_busy() {
                    // Rejected, not queued; keep the draft in the input line.
                    self.input = line;
                    return Ok(Flow::Continue);
                }
                if self.app.send_text(&self.deps.api, &question) {
                    self.stats.record_text();
                    self.print_latest_message()?;
                }
                Ok(Flow::Continue)
            }
            Command::Sessions => {
                if let Err(err) = self.app.store.refresh_sessions(&self.deps.api) {
                    return self.expire(err);
                }
                self.print_session_list()?;
                Ok(Flow::Continue)
            }
            Command::Open(id) => {
                if let Err(err) = self.app.store.open_session(&self.deps.api, id) {
                    return self.expire(err);
                }
                self.print_opened_session()?;
                Ok(Flow::Continue)
            }
            Command::New => {
                self.app.store.new_session();
                self.print_info("── New Chat ──")?;
                self.print_info(&transcript::empty_state(&self.deps.palette))?;
                Ok(Flow::Continue)
            }
            Command::Delete(id) => {
                if let Err(err) = self.app.store.delete_session(&self.deps.api, id) {
                    return self.expire(err);
                }
                self.print_info("chat deleted")?;
                Ok(Flow::Continue)
            }
            Command::Pdfs => self.show_pdfs(),
            Command::Upload(path) => self.upload_pdf(&path),
            Command::RemovePdf(id) => self.remove_pdf(id),
            Command::Replay => self.replay_last().map(|()| Flow::Continue),
            Command::Autoplay => {
                self.app.autoplay = !self.app.autoplay;
                let label = if self.app.autoplay { "on" } else { "off" };
                self.print_info(&format!("voice playback {label}"))?;
                Ok(Flow::Continue)
            }
            Command::Help => {
                self.print_help()?;
                Ok(Flow::Continue)
            }
            Command::Quit => Ok(Flow::Quit),
            Command::Unknown(what) => {
                self.print_notice(&format!("unknown command: {what}"))?;
                Ok(Flow::Continue)
            }
        }
    }

    // ── Capture toggle ────────────────────────────────────────────────

    fn toggle_recording(&mut self) -> Result<()> {
        if self.deps.recorder.is_recording() {
            self.meter = None;
            self.record_started = None;
            self.bars = [BAR_FLOOR; BAR_COUNT];
            match self.deps.recorder.stop() {
                Ok(audio) => {
                    self.stats.record_voice(audio.duration_secs);
                    if self.app.send_voice(&self.deps.api, audio) {
                        self.print_latest_message()?;
                    }
                }
                Err(err) => {
                    self.stats.record_error();
                    self.print_notice(&err.to_string())?;
                }
            }
            self.status_dirty = true;
            return Ok(());
        }

        // One shared gate: no new capture while an exchange is outstanding.
        if self.app.is_busy() {
            return Ok(());
        }
        match self.deps.recorder.start() {
            Ok(tap) => {
                self.meter = Some(tap);
                self.record_started = Some(Instant::now());
                self.status_dirty = true;
            }
            Err(ClientError::PermissionDenied) => {
                self.stats.record_error();
                self.print_notice("Microphone access denied")?;
            }
            Err(err) => {
                self.stats.record_error();
                self.print_notice(&err.to_string())?;
            }
        }
        Ok(())
    }

    // ── Periodic work ─────────────────────────────────────────────────

    fn run_periodic(&mut self, now: Instant) -> Result<Flow> {
        let was_busy = self.app.is_busy();
        for event in self.app.drain() {
            if matches!(self.handle_app_event(event)?, Flow::Quit) {
                return Ok(Flow::Quit);
            }
        }
        if was_busy != self.app.is_busy() {
            self.status_dirty = true;
        }

        if let Some(tap) = self.meter.clone() {
            if now.duration_since(self.last_meter_tick) >= Duration::from_millis(METER_UPDATE_MS) {
                self.last_meter_tick = now;
                match tap.snapshot() {
                    Some(snapshot) => {
                        self.bars = bar_heights(&snapshot);
                        self.status_dirty = true;
                    }
                    // Tap latched shut: the capture session is gone.
                    None => self.meter = None,
                }
            }
        }

        if self.app.is_busy()
            && now.duration_since(self.last_spinner_tick) >= Duration::from_millis(SPINNER_TICK_MS)
        {
            self.last_spinner_tick = now;
            self.spinner_index = self.spinner_index.wrapping_add(1);
            self.status_dirty = true;
        }
        Ok(Flow::Continue)
    }

    fn handle_app_event(&mut self, event: AppEvent) -> Result<Flow> {
        match event {
            AppEvent::MessageAppended(index) => {
                if let Some(message) = self.app.store.messages().get(index) {
                    let line = transcript::format_message(message, &self.deps.palette);
                    self.print_block(&line)?;
                }
            }
            AppEvent::TranscriptResolved(index) => {
                if let Some(message) = self.app.store.messages().get(index) {
                    let line = transcript::format_message(message, &self.deps.palette);
                    self.print_block(&line)?;
                }
            }
            AppEvent::SessionAdopted { id, title } => {
                self.print_info(&format!("session #{id} · {title}"))?;
                if let Err(err) = self.app.store.refresh_sessions(&self.deps.api) {
                    return self.expire(err);
                }
            }
            AppEvent::Notice(text) => {
                self.stats.record_error();
                self.print_notice(&text)?;
            }
            AppEvent::PlayAudio(path) => self.play_audio(&path)?,
            AppEvent::AuthExpired => {
                self.deps.api.logout();
                self.print_notice("Session expired — please log in again")?;
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    // ── Audio playback ────────────────────────────────────────────────

    fn replay_last(&mut self) -> Result<()> {
        match self.app.last_audio.clone() {
            Some(path) => self.play_audio(&path),
            None => self.print_info("nothing to replay"),
        }
    }

    fn play_audio(&mut self, path: &str) -> Result<()> {
        let Some(player) = &self.deps.player else {
            debug!("no output device; skipping playback of {path}");
            return Ok(());
        };
        match self
            .deps
            .api
            .fetch_audio(path)
            .and_then(|bytes| player.play(bytes))
        {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("playback of {path} failed: {err}");
                self.print_notice(&format!("could not play response audio: {err}"))
            }
        }
    }

    // ── PDF library ───────────────────────────────────────────────────

    fn show_pdfs(&mut self) -> Result<Flow> {
        match self.deps.api.list_pdfs() {
            Ok(list) if list.is_empty() => {
                self.print_info("no PDFs uploaded")?;
            }
            Ok(list) => {
                for pdf in list {
                    self.print_info(&format!(
                        "{:>4}  {} ({}pg)",
                        pdf.id, pdf.original_name, pdf.page_count
                    ))?;
                }
            }
            Err(ClientError::SessionExpired) => return self.expire(ClientError::SessionExpired),
            Err(err) => {
                debug!("pdf list failed: {err}");
                self.print_info("could not load PDFs")?;
            }
        }
        Ok(Flow::Continue)
    }

    fn upload_pdf(&mut self, path: &std::path::Path) -> Result<Flow> {
        self.print_info(&format!("indexing {}…", path.display()))?;
        match self.deps.api.upload_pdf(path) {
            Ok(reply) => self.print_info(&format!("✓ {}", reply.message))?,
            Err(ClientError::SessionExpired) => return self.expire(ClientError::SessionExpired),
            Err(err) => {
                self.stats.record_error();
                self.print_notice(&format!("✗ {err}"))?;
            }
        }
        Ok(Flow::Continue)
    }

    fn remove_pdf(&mut self, id: i64) -> Result<Flow> {
        match self.deps.api.delete_pdf(id) {
            Ok(()) => self.print_info("PDF removed")?,
            Err(ClientError::SessionExpired) => return self.expire(ClientError::SessionExpired),
            Err(err) => {
                debug!("pdf delete failed: {err}");
                self.print_info("could not remove PDF")?;
            }
        }
        Ok(Flow::Continue)
    }

    // ── Session views ─────────────────────────────────────────────────

    fn print_session_list(&mut self) -> Result<()> {
        if self.app.store.sessions().is_empty() {
            return self.print_info("no chats yet");
        }
        let rows: Vec<String> = self
            .app
            .store
            .sessions()
            .iter()
            .map(|session| {
                let marker = if Some(session.id) == self.app.store.active_id() {
                    "▸"
                } else {
                    " "
                };
                format!("{marker} {:>4}  {}", session.id, session.title)
            })
            .collect();
        for row in rows {
            self.print_info(&row)?;
        }
        Ok(())
    }

    fn print_opened_session(&mut self) -> Result<()> {
        let title = self.app.store.title().to_string();
        self.print_info(&format!("── {title} ──"))?;
        if self.app.store.messages().is_empty() {
            return self.print_info(&transcript::empty_state(&self.deps.palette));
        }
        let blocks: Vec<String> = self
            .app
            .store
            .messages()
            .iter()
            .map(|message| transcript::format_message(message, &self.deps.palette))
            .collect();
        for block in blocks {
            self.print_block(&block)?;
        }
        Ok(())
    }

    fn print_help(&mut self) -> Result<()> {
        let help = [
            "enter      send the typed question",
            "ctrl-r     start/stop voice capture",
            "ctrl-p     replay the last response audio",
            "ctrl-t     toggle voice playback",
            "/sessions  list chats   /open <id>   /new   /delete <id>",
            "/pdfs      list PDFs    /upload <path>      /rmpdf <id>",
            "/replay    /autoplay    /help               /quit",
        ];
        for line in help {
            self.print_info(line)?;
        }
        Ok(())
    }

    // ── Rendering ─────────────────────────────────────────────────────

    fn expire(&mut self, err: ClientError) -> Result<Flow> {
        debug!("auth expired during command dispatch: {err}");
        self.app.reset_auth();
        self.deps.api.logout();
        self.print_notice("Session expired — please log in again")?;
        Ok(Flow::Quit)
    }

    fn print_latest_message(&mut self) -> Result<()> {
        if let Some(message) = self.app.store.messages().last() {
            let line = transcript::format_message(message, &self.deps.palette);
            self.print_block(&line)?;
        }
        Ok(())
    }

    fn print_block(&mut self, block: &str) -> Result<()> {
        let mut out = io::stdout();
        write!(out, "\r\x1b[2K{}\r\n", block.replace('\n', "\r\n"))?;
        out.flush()?;
        self.status_dirty = true;
        Ok(())
    }

    fn print_info(&mut self, text: &str) -> Result<()> {
        let palette = self.deps.palette;
        self.print_block(&format!("{}{text}{}", palette.dim, palette.reset))
    }

    fn print_notice(&mut self, text: &str) -> Result<()> {
        let palette = self.deps.palette;
        self.print_block(&format!("{}{text}{}", palette.warning, palette.reset))
    }

    fn redraw_status(&mut self) -> Result<()> {
        let palette = &self.deps.palette;
        let status = if self.meter.is_some() {
            let elapsed = self
                .record_started
                .map(|at| at.elapsed().as_secs_f32())
                .unwrap_or_default();
            status_line::format_recording(&self.bars, elapsed, palette)
        } else if self.app.is_busy() {
            status_line::format_thinking(self.spinner_index, palette)
        } else {
            status_line::format_idle(self.app.store.title(), self.app.autoplay, palette)
        };

        let cols = terminal::size().map(|(c, _)| usize::from(c)).unwrap_or(80);
        let budget = cols.saturating_sub(STATUS_RESERVE_COLS).max(10);
        let shown = tail_columns(&self.input, budget);

        let mut out = io::stdout();
        write!(out, "\r\x1b[2K{status} ❯ {shown}")?;
        out.flush()?;
        self.status_dirty = false;
        Ok(())
    }
}

/// Last `max` display columns of the input, so the status row never wraps.
fn tail_columns(input: &str, max: usize) -> String {
    let mut width = 0usize;
    let mut chars: Vec<char> = Vec::new();
    for c in input.chars().rev() {
        let w = c.width().unwrap_or(0);
        if width + w > max {
            break;
        }
        width += w;
        chars.push(c);
    }
    chars.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_columns_keeps_short_input_whole() {
        assert_eq!(tail_columns("hello", 10), "hello");
    }

    #[test]
    fn tail_columns_clips_to_the_most_recent_text() {
        assert_eq!(tail_columns("abcdefgh", 3), "fgh");
    }

    #[test]
    fn tail_columns_counts_wide_glyphs() {
        // Each CJK glyph is two columns wide.
        assert_eq!(tail_columns("ab漢字", 4), "漢字");
        assert_eq!(tail_columns("ab漢字", 5), "b漢字");
    }
}
