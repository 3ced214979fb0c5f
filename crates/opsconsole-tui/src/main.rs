use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use opsconsole_core::{ConsoleApi, ConsoleConfig, ConversationController, HttpClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const LOG_ENV: &str = "OPSCONSOLE_LOG";

#[derive(Parser, Debug)]
#[command(name = "opsconsole", version)]
#[command(about = "Terminal console for the DevOps agent")]
struct Args {
    /// Console server, e.g. https://ops.example.com
    #[arg(long)]
    base_url: Option<String>,
    /// Session cookies as `name=value; name2=value2`
    #[arg(long)]
    session: Option<String>,
    /// State poll period in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,
    /// Read settings from this file instead of the user config directory
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the effective settings to the config file and exit
    #[arg(long)]
    save_config: bool,
}

fn load_config(args: &Args) -> Result<ConsoleConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = ConsoleConfig::load_from(path)
                .with_context(|| format!("reading {}", path.display()))?;
            config.apply_env();
            config
        }
        None => ConsoleConfig::load()?,
    };

    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(session) = &args.session {
        config.session_cookie = Some(session.clone());
    }
    if let Some(poll_ms) = args.poll_ms {
        config.poll_interval_ms = poll_ms;
    }
    Ok(config)
}

/// Persist `config` where it was read from. Returns the file written.
fn save_config(args: &Args, config: &ConsoleConfig) -> Result<PathBuf> {
    match &args.config {
        Some(path) => {
            config
                .save_to(path)
                .with_context(|| format!("writing {}", path.display()))?;
            Ok(path.clone())
        }
        None => {
            config.save()?;
            ConsoleConfig::get_config_path()
        }
    }
}

/// The terminal belongs to the UI, so logs go to a file.
fn init_logging(config: &ConsoleConfig) -> Result<PathBuf> {
    let path = match &config.log_file {
        Some(path) => path.clone(),
        None => ConsoleConfig::default_log_path()?,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    if args.save_config {
        let path = save_config(&args, &config)?;
        println!("Settings saved to {}", path.display());
        return Ok(());
    }
    let log_path = init_logging(&config)?;

    let client = HttpClient::from_config(&config)?;
    info!(base_url = %client.base_url(), log = %log_path.display(), "starting console");
    let controller = ConversationController::new(ConsoleApi::new(Arc::new(client.clone())));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new(config.poll_interval());
    let mut app = App::new(controller, &client, events.sender());

    // Settings first; their completion triggers the first state sync
    handler::spawn_settings(&app);

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    info!("console closed");
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flags_override_file_and_save_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.json");
        let args = Args::parse_from([
            "opsconsole",
            "--config",
            path.to_str().unwrap(),
            "--base-url",
            "https://ops.example.com",
            "--poll-ms",
            "500",
            "--save-config",
        ]);
        assert!(args.save_config);

        let config = load_config(&args).unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(save_config(&args, &config).unwrap(), path);

        let saved = ConsoleConfig::load_from(&path).unwrap();
        assert_eq!(saved.base_url, "https://ops.example.com");
        assert_eq!(saved.poll_interval_ms, 500);
    }
}
