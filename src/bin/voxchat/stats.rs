//! Run statistics so the exit summary reflects real session activity.

use std::time::{Duration, Instant};

/// Counters for one client run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub text_asks: u32,
    pub voice_asks: u32,
    pub errors: u32,
    pub speech_secs: f32,
    started: Instant,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            text_asks: 0,
            voice_asks: 0,
            errors: 0,
            speech_secs: 0.0,
            started: Instant::now(),
        }
    }

    pub fn record_text(&mut self) {
        self.text_asks += 1;
    }

    pub fn record_voice(&mut self, speech_secs: f32) {
        self.voice_asks += 1;
        self.speech_secs += speech_secs;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn has_activity(&self) -> bool {
        self.text_asks > 0 || self.voice_asks > 0 || self.errors > 0
    }

    pub fn run_duration(&self) -> Duration {
        self.started.elapsed()
    }
}

fn format_duration(secs: f32) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let mins = (secs / 60.0).floor();
        format!("{}m {:.0}s", mins as u32, secs % 60.0)
    }
}

/// Exit summary; empty when nothing happened.
pub fn format_run_stats(stats: &RunStats) -> String {
    if !stats.has_activity() {
        return String::new();
    }
    let mut lines = vec![
        String::new(),
        "Session Summary".to_string(),
        "───────────────".to_string(),
        format!("{:<12} {}", "Questions", stats.text_asks),
        format!("{:<12} {}", "Voice asks", stats.voice_asks),
    ];
    if stats.voice_asks > 0 {
        lines.push(format!(
            "{:<12} {}",
            "Speech",
            format_duration(stats.speech_secs)
        ));
    }
    if stats.errors > 0 {
        lines.push(format!("{:<12} {}", "Errors", stats.errors));
    }
    lines.push(format!(
        "{:<12} {}",
        "Duration",
        format_duration(stats.run_duration().as_secs_f32())
    ));
    lines.push(String::new());
    lines.join("\n")
}
