//! Wick Engine entry point.
//!
//! A 2D tile-based adventure-game engine:
//! - **raylib** for windowing, graphics, and audio
//! - **mlua** (vendored Lua 5.4) for game logic scripting
//! - TMX maps, XML sprites, and XML NPC schedules as content
//!
//! Boot order: logging → config → audio thread → game + script runtime →
//! startup map → main loop (input → simulation tick → draw).

// Do not create console on Windows
#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

use clap::Parser;
use std::path::PathBuf;

use wickengine::audio::AudioPlayer;
use wickengine::config::Config;
use wickengine::game::{Engine, Game};
use wickengine::logging::FileLogger;
use wickengine::render::backend::{RaylibBackend, spawn_audio_thread};
use wickengine::render::draw_frame;

/// Wick Engine 2D
#[derive(Parser)]
#[command(version, about = "Wick Engine: a 2D tile-based adventure-game engine")]
struct Cli {
    /// Configuration file path.
    #[arg(long, value_name = "PATH", default_value = "config.ini")]
    config: PathBuf,

    /// Override the startup map.
    #[arg(long, value_name = "MAP")]
    map: Option<String>,

    /// Log to stderr regardless of the logging config.
    #[arg(long)]
    stderr_log: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut config = Config::with_path(&cli.config);
    if let Err(e) = config.load_from_file() {
        eprintln!("Using default configuration: {}", e);
    }
    for warning in &config.warnings {
        eprintln!("Config warning: {}", warning);
    }
    if let Some(map) = &cli.map {
        config.startup.map = map.clone();
    }

    // Logging: file sink per config, else env_logger on stderr.
    if config.logging.enabled && !cli.stderr_log {
        match FileLogger::new(&config.logging) {
            Ok(logger) => {
                if logger.install().is_err() {
                    eprintln!("Logger already installed");
                }
            }
            Err(e) => {
                eprintln!("Failed to open log file, logging to stderr: {}", e);
                env_logger::Builder::from_env(
                    env_logger::Env::default().default_filter_or("info"),
                )
                .init();
            }
        }
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    log::info!("Wick Engine starting up");

    let mut backend = RaylibBackend::init(&config);

    // Audio runs on its own thread; if the device is missing the player
    // degrades to silence.
    let (tx, rx, handle) = spawn_audio_thread();
    let audio = AudioPlayer::new(tx, rx, handle, &config.audio);

    let game = Game::with_audio(config, audio);
    let mut engine = match Engine::new(game) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to start script runtime: {}", e);
            return;
        }
    };
    if let Err(e) = engine.boot() {
        log::error!("Failed to load startup map: {}", e);
    }

    while !backend.should_close() && !engine.game.borrow().quit_requested {
        let snapshot = backend.input_snapshot();
        let ticks = backend.window_ticks();
        engine.update(&snapshot, ticks);

        {
            let game = engine.game.borrow();
            backend.ensure_textures(game.assets.texture_keys());
            backend.frame(|renderer| draw_frame(renderer, &game));
        }
    }

    engine.game.borrow_mut().audio.shutdown();
    log::info!("Wick Engine shut down");
}
