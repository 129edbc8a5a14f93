//! voxchat entrypoint so configuration, auth, and the UI loop start as one runtime.
//!
//! Logs in against the assistant server, then hands control to a cooperative
//! terminal loop: typed questions and captured voice share one exchange path,
//! with a live frequency meter while the microphone is open.

mod commands;
mod config;
mod event_loop;
mod stats;
mod status_line;
mod theme;
mod transcript;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{info, warn};

use voxchat::api::ApiClient;
use voxchat::app::AppState;
use voxchat::audio::Recorder;
use voxchat::playback::Player;
use voxchat::telemetry;

use crate::config::{config_file_path, load_file_config, AppConfig, Cli};
use crate::event_loop::{EventLoop, LoopDeps};
use crate::theme::Palette;

fn list_input_devices() -> Result<()> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    for device in host.input_devices().context("enumerating input devices")? {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let marker = if Some(&name) == default_name.as_ref() {
            "*"
        } else {
            " "
        };
        println!("{marker} {name}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.list_input_devices {
        return list_input_devices();
    }

    let file = load_file_config(&config_file_path())?;
    let config = AppConfig::resolve(cli, file);
    let log_path = telemetry::init_logging(config.verbose)?;

    let api = ApiClient::new(&config.server)?;

    let (Some(username), Some(password)) = (config.username.clone(), config.password.clone())
    else {
        bail!(
            "credentials required: pass --username/--password \
             or set VOXCHAT_USERNAME/VOXCHAT_PASSWORD"
        );
    };
    let user = if config.register {
        let Some(email) = config.email.clone() else {
            bail!("--register needs --email");
        };
        api.register(&username, &email, &password)
            .context("registration failed")?
    } else {
        api.login(&username, &password).context("login failed")?
    };
    info!(user = %user.username, server = %config.server, "logged in");

    let palette = Palette::detect(config.no_color);
    println!("Welcome back, {}!", user.username);
    println!("{}(log: {}){}", palette.dim, log_path.display(), palette.reset);

    let mut app = AppState::new(config.autoplay);
    app.user = Some(user);
    app.store
        .refresh_sessions(&api)
        .context("session expired at startup")?;
    if !app.store.sessions().is_empty() {
        println!(
            "{}{} saved chats — /sessions to browse{}",
            palette.dim,
            app.store.sessions().len(),
            palette.reset
        );
    }

    let player = match Player::new() {
        Ok(player) => Some(player),
        Err(err) => {
            warn!("audio output unavailable: {err}");
            None
        }
    };
    let recorder = Recorder::new(config.input_device.clone());

    let deps = LoopDeps {
        api,
        recorder,
        player,
        palette,
    };
    EventLoop::new(deps, app).run()?;
    Ok(())
}
