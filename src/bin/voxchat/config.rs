//! Client configuration assembly so CLI flags and the config file resolve consistently.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

#[derive(Debug, Parser)]
#[command(
    name = "voxchat",
    version,
    about = "Voice-first terminal client for a PDF-aware chat assistant"
)]
pub struct Cli {
    /// Assistant server base URL.
    #[arg(long, env = "VOXCHAT_SERVER")]
    pub server: Option<String>,

    /// Account username; prompts a login at startup.
    #[arg(long, env = "VOXCHAT_USERNAME")]
    pub username: Option<String>,

    /// Account password.
    #[arg(long, env = "VOXCHAT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Create the account before logging in (needs --email).
    #[arg(long)]
    pub register: bool,

    /// Email address for --register.
    #[arg(long, env = "VOXCHAT_EMAIL")]
    pub email: Option<String>,

    /// Capture device name; defaults to the system input device.
    #[arg(long, env = "VOXCHAT_INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Do not autoplay voice-response audio.
    #[arg(long)]
    pub no_autoplay: bool,

    /// Disable ANSI colors.
    #[arg(long)]
    pub no_color: bool,

    /// List capture devices and exit.
    #[arg(long)]
    pub list_input_devices: bool,

    /// Debug-level logging to the log file.
    #[arg(long, short)]
    pub verbose: bool,
}

/// Optional on-disk defaults; every CLI flag wins over its file counterpart.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<String>,
    pub username: Option<String>,
    pub input_device: Option<String>,
    pub autoplay: Option<bool>,
}

pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("voxchat")
        .join("config.toml")
}

/// Load the config file; a missing file is simply empty defaults.
pub fn load_file_config(path: &PathBuf) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// Fully resolved configuration the rest of the binary consumes.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub register: bool,
    pub email: Option<String>,
    pub input_device: Option<String>,
    pub autoplay: bool,
    pub no_color: bool,
    pub verbose: bool,
}

impl AppConfig {
    pub fn resolve(cli: Cli, file: FileConfig) -> Self {
        Self {
            server: cli
                .server
                .or(file.server)
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            username: cli.username.or(file.username),
            password: cli.password,
            register: cli.register,
            email: cli.email,
            input_device: cli.input_device.or(file.input_device),
            autoplay: if cli.no_autoplay {
                false
            } else {
                file.autoplay.unwrap_or(true)
            },
            no_color: cli.no_color,
            verbose: cli.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["voxchat"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_apply_with_no_flags_and_no_file() {
        let config = AppConfig::resolve(cli(&[]), FileConfig::default());
        assert_eq!(config.server, DEFAULT_SERVER);
        assert!(config.autoplay);
        assert!(config.username.is_none());
    }

    #[test]
    fn cli_flags_override_file_values() {
        let file = FileConfig {
            server: Some("http://file:1".to_string()),
            username: Some("file-user".to_string()),
            input_device: Some("file-mic".to_string()),
            autoplay: Some(true),
        };
        let config = AppConfig::resolve(
            cli(&["--server", "http://cli:2", "--username", "cli-user"]),
            file,
        );
        assert_eq!(config.server, "http://cli:2");
        assert_eq!(config.username.as_deref(), Some("cli-user"));
        assert_eq!(config.input_device.as_deref(), Some("file-mic"));
    }

    #[test]
    fn no_autoplay_flag_beats_file_opt_in() {
        let file = FileConfig {
            autoplay: Some(true),
            ..FileConfig::default()
        };
        let config = AppConfig::resolve(cli(&["--no-autoplay"]), file);
        assert!(!config.autoplay);
    }

    #[test]
    fn file_can_disable_autoplay_by_default() {
        let file = FileConfig {
            autoplay: Some(false),
            ..FileConfig::default()
        };
        let config = AppConfig::resolve(cli(&[]), file);
        assert!(!config.autoplay);
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let parsed: FileConfig =
            toml::from_str("server = \"http://box:9\"\nautoplay = false\n").expect("parse");
        assert_eq!(parsed.server.as_deref(), Some("http://box:9"));
        assert_eq!(parsed.autoplay, Some(false));
        assert!(parsed.username.is_none());
    }
}
