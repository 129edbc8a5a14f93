//! Input-line command parsing so slash commands and questions share one entry.

use std::path::PathBuf;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plain question text for the assistant.
    Ask(String),
    Sessions,
    Open(i64),
    New,
    Delete(i64),
    Pdfs,
    Upload(PathBuf),
    RemovePdf(i64),
    Replay,
    Autoplay,
    Help,
    Quit,
    /// Malformed or unrecognized slash command, kept for the notice text.
    Unknown(String),
}

/// Parse a submitted line. `None` for blank input.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Ask(line.to_string()));
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    let command = match name {
        "/sessions" => Command::Sessions,
        "/open" => with_id(name, arg, Command::Open),
        "/new" => Command::New,
        "/delete" => with_id(name, arg, Command::Delete),
        "/pdfs" => Command::Pdfs,
        "/upload" if !arg.is_empty() => Command::Upload(PathBuf::from(arg)),
        "/rmpdf" => with_id(name, arg, Command::RemovePdf),
        "/replay" => Command::Replay,
        "/autoplay" => Command::Autoplay,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

fn with_id(name: &str, arg: &str, make: impl FnOnce(i64) -> Command) -> Command {
    match arg.parse::<i64>() {
        Ok(id) => make(id),
        Err(_) => Command::Unknown(format!("{name} needs a numeric id")),
    }
}
