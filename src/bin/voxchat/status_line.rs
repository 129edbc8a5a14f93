//! Status-line formatting so capture and flight state stay visible in one row.

use voxchat::spectrum::{BAR_COUNT, BAR_FLOOR};

use crate::theme::Palette;

/// Vertical bar glyphs, quiet to loud.
const WAVE_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Spinner frames while an exchange is outstanding.
const SPINNER_FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Bar heights reach this many meter units at full scale (255 / 6).
const BAR_MAX: u8 = 42;

/// Map one bar height to its glyph. The floor maps to the lowest glyph so an
/// idle meter stays visible.
fn wave_glyph(height: u8) -> char {
    let span = BAR_MAX.saturating_sub(BAR_FLOOR).max(1);
    let clamped = height.clamp(BAR_FLOOR, BAR_MAX) - BAR_FLOOR;
    let index = (usize::from(clamped) * (WAVE_GLYPHS.len() - 1)) / usize::from(span);
    WAVE_GLYPHS[index]
}

/// Render the 20-bar meter for the status line.
pub fn format_wave(bars: &[u8; BAR_COUNT], palette: &Palette) -> String {
    let mut out = String::with_capacity(BAR_COUNT + 16);
    out.push_str(palette.success);
    for &height in bars {
        out.push(wave_glyph(height));
    }
    out.push_str(palette.reset);
    out
}

pub fn spinner_frame(index: usize) -> char {
    SPINNER_FRAMES[index % SPINNER_FRAMES.len()]
}

/// Recording row: indicator, live meter, elapsed seconds.
pub fn format_recording(bars: &[u8; BAR_COUNT], elapsed_secs: f32, palette: &Palette) -> String {
    format!(
        "{}● REC{} {} {}{:.1}s{}",
        palette.error,
        palette.reset,
        format_wave(bars, palette),
        palette.dim,
        elapsed_secs,
        palette.reset
    )
}

/// Thinking row while a flight is outstanding.
pub fn format_thinking(spinner_index: usize, palette: &Palette) -> String {
    format!(
        "{}{} thinking…{}",
        palette.info,
        spinner_frame(spinner_index),
        palette.reset
    )
}

/// Idle row: active chat title plus the key hints.
pub fn format_idle(title: &str, autoplay: bool, palette: &Palette) -> String {
    let speaker = if autoplay { "🔊" } else { "🔇" };
    format!(
        "{}{title}{} {speaker} {}ctrl-r mic · /help{}",
        palette.bold, palette.reset, palette.dim, palette.reset
    )
}
