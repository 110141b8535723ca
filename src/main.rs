use clap::{Parser, Subcommand};
use colored::*;
use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

mod app;
mod audio;
mod client;
mod config;
mod handler;
mod speech;
mod tui;
mod ui;

use app::App;
use audio::AudioPlayer;
use client::ChatClient;
use config::Config;

#[derive(Parser)]
#[command(name = "soulmate")]
#[command(about = "Chat with the SoulMate (暖心) companion server from the terminal", version)]
struct Cli {
    /// Chat server base URL (overrides the config file)
    #[arg(short, long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the reply, without the chat interface
    Ask {
        /// The message to send
        message: String,
        /// Also speak the reply aloud
        #[arg(short, long)]
        speak: bool,
    },
    /// Speak text aloud with the companion voice
    Speak {
        /// The text to speak
        text: String,
    },
    /// Save a server URL as the default in the config file
    SetServer {
        /// Chat server base URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // No subscriber is installed yet, so a broken config file goes straight
    // to stderr instead of vanishing
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("warning: could not read config file ({e:#}); using defaults");
        Config::new()
    });
    if let Some(server) = cli.server {
        config.server_url = Some(server);
    }

    match cli.command {
        Some(Commands::Ask { message, speak }) => {
            init_stderr_logging();
            ask(&config, &message, speak).await
        }
        Some(Commands::Speak { text }) => {
            init_stderr_logging();
            speech::speak(text).await;
            Ok(())
        }
        Some(Commands::SetServer { url }) => {
            Config::save_server_url(&url)?;
            println!("Default server set to {}", url.bold());
            Ok(())
        }
        None => {
            init_file_logging()?;
            run_tui(App::new(config)).await
        }
    }
}

async fn run_tui(mut app: App) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = loop {
        if let Err(e) = terminal.draw(|frame| ui::render(&mut app, frame)) {
            break Err(e.into());
        }

        match events.next().await {
            Some(event) => {
                if let Err(e) = handler::handle_event(&mut app, event).await {
                    break Err(e);
                }
            }
            None => break Ok(()),
        }

        // The 300ms tick keeps this polling prompt even on a quiet keyboard
        app.poll_reply().await;

        if app.should_quit {
            break Ok(());
        }
    };

    tui::restore()?;
    result
}

async fn ask(config: &Config, message: &str, speak: bool) -> Result<()> {
    let message = message.trim();
    if message.is_empty() {
        return Ok(());
    }

    let client = ChatClient::new(&config.server_url());
    let bot_label = format!("{}:", config.bot_name());

    println!("{} {}", "You:".cyan().bold(), message);

    match client.send(message).await {
        Ok(reply) => {
            println!("{} {}", bot_label.yellow().bold(), reply.response);

            if let Some(payload) = reply.audio.as_deref() {
                play_reply_audio(payload, config.volume());
            }
            if speak {
                speech::speak(reply.response).await;
            }
        }
        Err(e) => {
            tracing::error!("chat request failed: {e:#}");
            println!("{} {}", bot_label.yellow().bold(), app::CONNECTION_APOLOGY);
        }
    }

    Ok(())
}

fn play_reply_audio(payload: &str, volume: f32) {
    let bytes = match audio::decode_payload(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("bad audio in reply: {e:#}");
            return;
        }
    };

    match AudioPlayer::new() {
        Some(player) => {
            if let Err(e) = player.play_to_end(bytes, volume) {
                tracing::warn!("audio playback failed: {e:#}");
            }
        }
        None => tracing::debug!("skipping reply audio: no output device"),
    }
}

fn init_stderr_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("soulmate=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The terminal UI owns stderr, so its diagnostics go to a file under the
/// user data directory instead.
fn init_file_logging() -> Result<()> {
    let dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join("soulmate");
    std::fs::create_dir_all(&dir)?;
    let file = std::fs::File::create(dir.join("soulmate.log"))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("soulmate=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
