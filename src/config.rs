//! Engine configuration.
//!
//! Settings load from a flat INI-style `section.key = value` file. Every key
//! has a safe default so a missing or partial file still boots the engine.
//! Parse problems are collected as warnings instead of failing the load, and
//! unknown keys are kept verbatim so that saving the file round-trips them.

use configparser::ini::Ini;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

use crate::util::color::Color;

#[derive(Debug, Clone)]
pub struct GraphicsConfig {
    pub game_width: u32,
    pub game_height: u32,
    pub logic_fps: u32,
    pub canvas_fps: u32,
    pub fullscreen: bool,
    pub scale_mode: String,
    pub brightness: f32,
    pub contrast: f32,
    pub gamma: f32,
}

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub music_volume: f32,
    pub sound_volume: f32,
    pub sound_attenuation_factor: f32,
    pub mute_on_pause: bool,
}

#[derive(Debug, Clone)]
pub struct TextConfig {
    pub fade_in_duration: i64,
    pub fade_out_duration: i64,
    pub choice_selected_color: String,
    pub background_color: Color,
    pub canvas_priority: i32,
    pub screen_edge_margin_x: f32,
    pub screen_edge_margin_y: f32,
}

#[derive(Debug, Clone)]
pub struct ControlsConfig {
    pub action_button: String,
    pub cancel_button: String,
    pub pause_button: String,
    pub gamepad_enabled: bool,
    pub stick_sensitivity: f32,
    pub mapping_file: String,
}

#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub use_fbo: bool,
    pub pathfinding_sprite: String,
    pub update_config_files: bool,
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub collision_check_delay: i64,
    pub edge_tolerance_pixels: f32,
    pub proximity_distance: f32,
}

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub map: String,
    pub player_sprite: String,
    pub player_position_x: f32,
    pub player_position_y: f32,
    pub tint_color: Color,
    pub clear_color: Color,
    pub time_multiplier: f32,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub filename: String,
    pub level: String,
    pub mode: String,
    pub file_count: u32,
    pub max_file_size_kb: u64,
}

/// Typed view over the configuration file.
#[derive(Debug, Clone)]
pub struct Config {
    pub graphics: GraphicsConfig,
    pub audio: AudioConfig,
    pub text: TextConfig,
    pub controls: ControlsConfig,
    pub debug: DebugConfig,
    pub player: PlayerConfig,
    pub startup: StartupConfig,
    pub logging: LoggingConfig,
    /// Unknown `(section, key, value)` triples kept for round-tripping.
    pub extra: Vec<(String, String, String)>,
    /// Non-fatal problems found while loading.
    pub warnings: Vec<String>,
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            graphics: GraphicsConfig {
                game_width: 320,
                game_height: 240,
                logic_fps: 60,
                canvas_fps: 40,
                fullscreen: false,
                scale_mode: "aspect".to_string(),
                brightness: 1.0,
                contrast: 1.0,
                gamma: 1.0,
            },
            audio: AudioConfig {
                music_volume: 1.0,
                sound_volume: 1.0,
                sound_attenuation_factor: 100.0,
                mute_on_pause: true,
            },
            text: TextConfig {
                fade_in_duration: 250,
                fade_out_duration: 250,
                choice_selected_color: "#FF00FF00".to_string(),
                background_color: Color::new(0.0, 0.0, 0.0, 0.5),
                canvas_priority: 1000,
                screen_edge_margin_x: 20.0,
                screen_edge_margin_y: 20.0,
            },
            controls: ControlsConfig {
                action_button: "A".to_string(),
                cancel_button: "B".to_string(),
                pause_button: "PAUSE".to_string(),
                gamepad_enabled: true,
                stick_sensitivity: 0.5,
                mapping_file: "keymap.ini".to_string(),
            },
            debug: DebugConfig {
                use_fbo: true,
                pathfinding_sprite: String::new(),
                update_config_files: false,
            },
            player: PlayerConfig {
                collision_check_delay: 50,
                edge_tolerance_pixels: 8.0,
                proximity_distance: 8.0,
            },
            startup: StartupConfig {
                map: String::new(),
                player_sprite: String::new(),
                player_position_x: 0.0,
                player_position_y: 0.0,
                tint_color: Color::TRANSPARENT,
                clear_color: Color::BLACK,
                time_multiplier: 1.0,
            },
            logging: LoggingConfig {
                enabled: true,
                filename: "game.log".to_string(),
                level: "INFO".to_string(),
                mode: "truncate".to_string(),
                file_count: 5,
                max_file_size_kb: 1024,
            },
            extra: Vec::new(),
            warnings: Vec::new(),
            path: PathBuf::from("./config.ini"),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::new()
        }
    }

    /// Load configuration from the INI file at `self.path`.
    ///
    /// Missing values retain their defaults; malformed values are reported in
    /// `warnings`. Returns an error only if the file cannot be read.
    pub fn load_from_file(&mut self) -> Result<(), String> {
        let mut ini = Ini::new();
        ini.load(&self.path)
            .map_err(|e| format!("Failed to load config file: {}", e))?;
        self.read_ini(&ini);
        log::info!(
            "Loaded config from {:?} ({} warnings)",
            self.path,
            self.warnings.len()
        );
        Ok(())
    }

    fn read_ini(&mut self, ini: &Ini) {
        let mut known: FxHashSet<(String, String)> = FxHashSet::default();
        let mut track = |section: &str, key: &str| {
            known.insert((section.to_string(), key.to_string()));
        };

        macro_rules! get_num {
            ($field:expr, $section:expr, $key:expr, $ty:ty) => {
                track($section, $key);
                if let Some(raw) = ini.get($section, $key) {
                    match raw.trim().parse::<$ty>() {
                        Ok(v) => $field = v,
                        Err(_) => self.warnings.push(format!(
                            "Invalid value '{}' for {}.{}",
                            raw, $section, $key
                        )),
                    }
                }
            };
        }
        macro_rules! get_bool {
            ($field:expr, $section:expr, $key:expr) => {
                track($section, $key);
                match ini.getbool($section, $key) {
                    Ok(Some(v)) => $field = v,
                    Ok(None) => {}
                    Err(_) => self
                        .warnings
                        .push(format!("Invalid boolean for {}.{}", $section, $key)),
                }
            };
        }
        macro_rules! get_str {
            ($field:expr, $section:expr, $key:expr) => {
                track($section, $key);
                if let Some(v) = ini.get($section, $key) {
                    $field = v;
                }
            };
        }
        macro_rules! get_color {
            ($field:expr, $section:expr, $key:expr) => {
                track($section, $key);
                if let Some(raw) = ini.get($section, $key) {
                    match Color::from_hex(&raw) {
                        Some(c) => $field = c,
                        None => self.warnings.push(format!(
                            "Invalid color '{}' for {}.{}",
                            raw, $section, $key
                        )),
                    }
                }
            };
        }

        get_num!(self.graphics.game_width, "graphics", "game-width", u32);
        get_num!(self.graphics.game_height, "graphics", "game-height", u32);
        get_num!(self.graphics.logic_fps, "graphics", "logic-fps", u32);
        get_num!(self.graphics.canvas_fps, "graphics", "canvas-fps", u32);
        get_bool!(self.graphics.fullscreen, "graphics", "fullscreen");
        get_str!(self.graphics.scale_mode, "graphics", "scale-mode");
        get_num!(self.graphics.brightness, "graphics", "brightness", f32);
        get_num!(self.graphics.contrast, "graphics", "contrast", f32);
        get_num!(self.graphics.gamma, "graphics", "gamma", f32);

        get_num!(self.audio.music_volume, "audio", "music-volume", f32);
        get_num!(self.audio.sound_volume, "audio", "sound-volume", f32);
        get_num!(
            self.audio.sound_attenuation_factor,
            "audio",
            "sound-attenuation-factor",
            f32
        );
        get_bool!(self.audio.mute_on_pause, "audio", "mute-on-pause");

        get_num!(self.text.fade_in_duration, "text", "fade-in-duration", i64);
        get_num!(self.text.fade_out_duration, "text", "fade-out-duration", i64);
        get_str!(
            self.text.choice_selected_color,
            "text",
            "choice-selected-color"
        );
        get_color!(self.text.background_color, "text", "background-color");
        get_num!(self.text.canvas_priority, "text", "canvas-priority", i32);
        get_num!(
            self.text.screen_edge_margin_x,
            "text",
            "screen-edge-margin-x",
            f32
        );
        get_num!(
            self.text.screen_edge_margin_y,
            "text",
            "screen-edge-margin-y",
            f32
        );

        get_str!(self.controls.action_button, "controls", "action-button");
        get_str!(self.controls.cancel_button, "controls", "cancel-button");
        get_str!(self.controls.pause_button, "controls", "pause-button");
        get_bool!(self.controls.gamepad_enabled, "controls", "gamepad-enabled");
        get_num!(
            self.controls.stick_sensitivity,
            "controls",
            "stick-sensitivity",
            f32
        );
        get_str!(self.controls.mapping_file, "controls", "mapping-file");

        get_bool!(self.debug.use_fbo, "debug", "use-fbo");
        get_str!(self.debug.pathfinding_sprite, "debug", "pathfinding-sprite");
        get_bool!(
            self.debug.update_config_files,
            "debug",
            "update-config-files"
        );

        get_num!(
            self.player.collision_check_delay,
            "player",
            "collision-check-delay",
            i64
        );
        get_num!(
            self.player.edge_tolerance_pixels,
            "player",
            "edge-tolerance-pixels",
            f32
        );
        get_num!(
            self.player.proximity_distance,
            "player",
            "proximity-distance",
            f32
        );

        get_str!(self.startup.map, "startup", "map");
        get_str!(self.startup.player_sprite, "startup", "player-sprite");
        get_num!(
            self.startup.player_position_x,
            "startup",
            "player-position-x",
            f32
        );
        get_num!(
            self.startup.player_position_y,
            "startup",
            "player-position-y",
            f32
        );
        get_color!(self.startup.tint_color, "startup", "tint-color");
        get_color!(self.startup.clear_color, "startup", "clear-color");
        get_num!(
            self.startup.time_multiplier,
            "startup",
            "time-multiplier",
            f32
        );

        get_bool!(self.logging.enabled, "logging", "enabled");
        get_str!(self.logging.filename, "logging", "filename");
        get_str!(self.logging.level, "logging", "level");
        get_str!(self.logging.mode, "logging", "mode");
        get_num!(self.logging.file_count, "logging", "file-count", u32);
        get_num!(
            self.logging.max_file_size_kb,
            "logging",
            "max-file-size-kb",
            u64
        );

        // Anything not claimed above is kept verbatim for round-tripping.
        self.extra.clear();
        for (section, keys) in ini.get_map_ref() {
            for (key, value) in keys {
                if known.contains(&(section.clone(), key.clone())) {
                    continue;
                }
                if let Some(value) = value {
                    self.extra
                        .push((section.clone(), key.clone(), value.clone()));
                }
            }
        }
        self.extra.sort();
    }

    /// Save the configuration, including unknown keys, back to `self.path`.
    pub fn save_to_file(&self) -> Result<(), String> {
        let mut ini = Ini::new();
        let g = &self.graphics;
        ini.set("graphics", "game-width", Some(g.game_width.to_string()));
        ini.set("graphics", "game-height", Some(g.game_height.to_string()));
        ini.set("graphics", "logic-fps", Some(g.logic_fps.to_string()));
        ini.set("graphics", "canvas-fps", Some(g.canvas_fps.to_string()));
        ini.set("graphics", "fullscreen", Some(g.fullscreen.to_string()));
        ini.set("graphics", "scale-mode", Some(g.scale_mode.clone()));
        ini.set("graphics", "brightness", Some(g.brightness.to_string()));
        ini.set("graphics", "contrast", Some(g.contrast.to_string()));
        ini.set("graphics", "gamma", Some(g.gamma.to_string()));

        let a = &self.audio;
        ini.set("audio", "music-volume", Some(a.music_volume.to_string()));
        ini.set("audio", "sound-volume", Some(a.sound_volume.to_string()));
        ini.set(
            "audio",
            "sound-attenuation-factor",
            Some(a.sound_attenuation_factor.to_string()),
        );
        ini.set("audio", "mute-on-pause", Some(a.mute_on_pause.to_string()));

        let t = &self.text;
        ini.set("text", "fade-in-duration", Some(t.fade_in_duration.to_string()));
        ini.set(
            "text",
            "fade-out-duration",
            Some(t.fade_out_duration.to_string()),
        );
        ini.set(
            "text",
            "choice-selected-color",
            Some(t.choice_selected_color.clone()),
        );
        ini.set(
            "text",
            "background-color",
            Some(t.background_color.to_hex()),
        );
        ini.set("text", "canvas-priority", Some(t.canvas_priority.to_string()));
        ini.set(
            "text",
            "screen-edge-margin-x",
            Some(t.screen_edge_margin_x.to_string()),
        );
        ini.set(
            "text",
            "screen-edge-margin-y",
            Some(t.screen_edge_margin_y.to_string()),
        );

        let c = &self.controls;
        ini.set("controls", "action-button", Some(c.action_button.clone()));
        ini.set("controls", "cancel-button", Some(c.cancel_button.clone()));
        ini.set("controls", "pause-button", Some(c.pause_button.clone()));
        ini.set(
            "controls",
            "gamepad-enabled",
            Some(c.gamepad_enabled.to_string()),
        );
        ini.set(
            "controls",
            "stick-sensitivity",
            Some(c.stick_sensitivity.to_string()),
        );
        ini.set("controls", "mapping-file", Some(c.mapping_file.clone()));

        let d = &self.debug;
        ini.set("debug", "use-fbo", Some(d.use_fbo.to_string()));
        ini.set(
            "debug",
            "pathfinding-sprite",
            Some(d.pathfinding_sprite.clone()),
        );
        ini.set(
            "debug",
            "update-config-files",
            Some(d.update_config_files.to_string()),
        );

        let p = &self.player;
        ini.set(
            "player",
            "collision-check-delay",
            Some(p.collision_check_delay.to_string()),
        );
        ini.set(
            "player",
            "edge-tolerance-pixels",
            Some(p.edge_tolerance_pixels.to_string()),
        );
        ini.set(
            "player",
            "proximity-distance",
            Some(p.proximity_distance.to_string()),
        );

        let s = &self.startup;
        ini.set("startup", "map", Some(s.map.clone()));
        ini.set("startup", "player-sprite", Some(s.player_sprite.clone()));
        ini.set(
            "startup",
            "player-position-x",
            Some(s.player_position_x.to_string()),
        );
        ini.set(
            "startup",
            "player-position-y",
            Some(s.player_position_y.to_string()),
        );
        ini.set("startup", "tint-color", Some(s.tint_color.to_hex()));
        ini.set("startup", "clear-color", Some(s.clear_color.to_hex()));
        ini.set(
            "startup",
            "time-multiplier",
            Some(s.time_multiplier.to_string()),
        );

        let l = &self.logging;
        ini.set("logging", "enabled", Some(l.enabled.to_string()));
        ini.set("logging", "filename", Some(l.filename.clone()));
        ini.set("logging", "level", Some(l.level.clone()));
        ini.set("logging", "mode", Some(l.mode.clone()));
        ini.set("logging", "file-count", Some(l.file_count.to_string()));
        ini.set(
            "logging",
            "max-file-size-kb",
            Some(l.max_file_size_kb.to_string()),
        );

        for (section, key, value) in &self.extra {
            ini.set(section, key, Some(value.clone()));
        }

        ini.write(&self.path)
            .map_err(|e| format!("Failed to save config file: {}", e))?;
        log::info!("Saved config to {:?}", self.path);
        Ok(())
    }

    /// Milliseconds per logic frame.
    pub fn logic_frame_time(&self) -> i64 {
        (1000 / self.graphics.logic_fps.max(1)) as i64
    }

    /// Resolve the keymap path relative to the config file's directory.
    pub fn keymap_path(&self) -> PathBuf {
        let mapping = Path::new(&self.controls.mapping_file);
        if mapping.is_absolute() {
            mapping.to_path_buf()
        } else {
            self.path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(mapping)
        }
    }
}
