//! Transcript formatting so rendered answers read naturally in a terminal.
//!
//! Assistant markdown goes through the shared renderer first; the markup is
//! then translated to ANSI styling here. Tag translation runs before entity
//! unescaping so escaped input can never smuggle styling in.

use voxchat::api::{Role, Source};
use voxchat::markdown::render_markdown;
use voxchat::session::Message;

use crate::theme::Palette;

/// Translate renderer markup into ANSI-styled terminal text.
pub fn markup_to_ansi(markup: &str, palette: &Palette) -> String {
    let text = markup
        .replace("<pre><code>", &format!("\n{}", palette.dim))
        .replace("</code></pre>", &format!("{}\n", palette.reset))
        .replace("<code>", palette.code)
        .replace("</code>", palette.reset)
        .replace("<strong>", palette.bold)
        .replace("</strong>", palette.reset)
        .replace("<em>", palette.italic)
        .replace("</em>", palette.reset)
        .replace("<ul>", "")
        .replace("</ul>", "\n")
        .replace("<li>", "  • ")
        .replace("</li>", "")
        .replace("<p>", "")
        .replace("</p>", "\n")
        .replace("<br>", "\n");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn source_badge(source: Source, palette: &Palette) -> String {
    match source {
        Source::Pdf => format!("{}[PDF]{}", palette.warning, palette.reset),
        Source::General => format!("{}[General]{}", palette.dim, palette.reset),
    }
}

/// Render one transcript entry as terminal lines (no trailing newline).
pub fn format_message(message: &Message, palette: &Palette) -> String {
    match message.role {
        Role::User => {
            let mic = if message.is_voice { "🎤 " } else { "" };
            format!(
                "{}you ❯{} {mic}{}",
                palette.info, palette.reset, message.text
            )
        }
        Role::Assistant => {
            let body = markup_to_ansi(&render_markdown(&message.text), palette);
            let mut meta = source_badge(message.source, palette);
            if message.audio_url.is_some() {
                meta.push_str(&format!(
                    " {}▶ audio (ctrl-p replays){}",
                    palette.dim, palette.reset
                ));
            }
            format!(
                "{}ai  ❯{} {}\n    {meta}",
                palette.accent,
                palette.reset,
                body.trim_end()
            )
        }
    }
}

/// Shown when an opened session has no history yet.
pub fn empty_state(palette: &Palette) -> String {
    format!(
        "{}Start a conversation — type a message or press ctrl-r to talk.{}",
        palette.dim, palette.reset
    )
}
