//! Game state and the per-tick update order.
//!
//! [`Game`] owns everything the simulation touches: config, clock, assets,
//! audio, the current map, camera, command queues, and input state. The
//! [`Engine`] wraps it in an `Rc<RefCell>` shared with the Lua runtime and
//! drives the tick order: input → player → commands → scripts → NPC
//! scheduler → map update → camera → deferred map load.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use glam::Vec2;

use crate::assets::AssetCache;
use crate::audio::AudioPlayer;
use crate::camera::Camera;
use crate::clock::Clock;
use crate::commands::{Command, CommandContext, CommandQueue, SharedCommand};
use crate::config::Config;
use crate::error::Result;
use crate::input::{InputSnapshot, InputState, KeyBinder};
use crate::map::object::ScriptContext;
use crate::map::{Map, MapObject, ObjectId, tmx};
use crate::npc::NpcScheduler;
use crate::player::PlayerController;
use crate::scripting::ScriptEngine;
use crate::sprite::Sprite;
use crate::text::Typewriter;
use crate::util::direction::Direction;

/// A deferred map change, applied at the end of the tick.
pub struct MapLoadRequest {
    pub filename: String,
    pub position: Vec2,
    pub direction: Direction,
}

pub struct Game {
    pub config: Config,
    pub clock: Clock,
    /// Wall ticks from the windowing backend.
    pub window_ticks: i64,
    pub assets: AssetCache,
    pub audio: AudioPlayer,
    pub map: Map,
    pub camera: Camera,
    pub player_id: Option<ObjectId>,
    /// Commands owned by the map scripting interface; stopped on map change.
    pub commands: CommandQueue,
    /// Commands owned by the global interface; survive map changes.
    pub global_commands: CommandQueue,
    pub typewriter: Typewriter,
    pub input: InputState,
    pub key_binder: KeyBinder,
    pub npcs: NpcScheduler,
    /// Scripts queued from inside Lua, started by the engine next pass.
    pub pending_scripts: Vec<(String, ScriptContext)>,
    paused: bool,
    pub next_map: Option<MapLoadRequest>,
    pub quit_requested: bool,
}

impl Game {
    pub fn new(config: Config) -> Game {
        let audio = AudioPlayer::disabled(&config.audio);
        Game::with_audio(config, audio)
    }

    pub fn with_audio(config: Config, audio: AudioPlayer) -> Game {
        let camera = Camera::new(&config);
        let mut key_binder = KeyBinder::new();
        let keymap_path = config.keymap_path();
        if keymap_path.exists()
            && let Err(e) = key_binder.load(&keymap_path)
        {
            log::warn!("Failed to load keymap: {}", e);
        }
        let mut map = Map::new(1, 1, 16, 16);
        map.proximity_distance = config.player.proximity_distance;
        map.edge_tolerance_pixels = config.player.edge_tolerance_pixels;
        Game {
            clock: Clock::new(0),
            window_ticks: 0,
            assets: AssetCache::new(),
            audio,
            map,
            camera,
            player_id: None,
            commands: CommandQueue::new(),
            global_commands: CommandQueue::new(),
            typewriter: Typewriter::default(),
            input: InputState::default(),
            key_binder,
            npcs: NpcScheduler::new(),
            pending_scripts: Vec::new(),
            paused: false,
            next_map: None,
            quit_requested: false,
            config,
        }
    }

    /// Game ticks: wall ticks minus stopped time.
    pub fn ticks(&self) -> i64 {
        self.clock.ticks(self.window_ticks)
    }

    /// Total game seconds, scaled by the configured time multiplier.
    pub fn seconds(&self) -> i64 {
        (self.ticks() as f64 * self.config.startup.time_multiplier as f64 / 1000.0) as i64
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pause: the clock stops and map commands freeze. Global commands keep
    /// executing so a pause menu can run; anything measuring game ticks
    /// stalls anyway because the clock is stopped, while pause-safe commands
    /// consult window ticks and continue.
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.clock.stop_time(self.window_ticks);
        self.commands.pause_all(self.window_ticks);
        if self.audio.mute_on_pause() {
            self.audio.pause_all();
        }
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.clock.resume_time(self.window_ticks);
        self.commands.resume_all(self.window_ticks);
        if self.audio.mute_on_pause() {
            self.audio.resume_all();
        }
    }

    /// Queue a command on the right queue for a scripting context.
    pub fn enqueue_command(&mut self, command: Command, context: ScriptContext) -> SharedCommand {
        match context {
            ScriptContext::Map => self.commands.push(command),
            ScriptContext::Global => self.global_commands.push(command),
        }
    }

    /// Request a map change; applied at the end of the current tick.
    pub fn request_map(&mut self, filename: &str, position: Vec2, direction: Direction) {
        self.next_map = Some(MapLoadRequest {
            filename: filename.to_string(),
            position,
            direction,
        });
    }

    /// Spawn the player object on the current map from startup config.
    pub fn spawn_player(&mut self, position: Vec2, direction: Direction) -> Result<ObjectId> {
        let ticks = self.ticks();
        let mut player = MapObject::new(0, "player");
        player.position = position;
        player.direction = if direction == Direction::NONE {
            Direction::DOWN
        } else {
            direction
        };
        player.speed = 2.0;
        let sprite_file = self.config.startup.player_sprite.clone();
        if !sprite_file.is_empty() {
            let data = self.assets.sprite(&sprite_file)?;
            player.set_sprite(Sprite::new(data, ticks), ticks);
        } else {
            player.size = Vec2::new(16.0, 16.0);
        }
        let id = self.map.add_object(player, None);
        self.player_id = Some(id);
        self.camera.track_object(Some(id));
        Ok(id)
    }

    /// Delete an object with the full reference sweep. The player
    /// controller's slots are ids re-validated every tick, so they cannot
    /// dangle past this point.
    pub fn delete_object(&mut self, id: ObjectId) {
        self.map.delete_object(id);
        if self.player_id == Some(id) {
            self.player_id = None;
        }
        if self.camera.tracked_object() == Some(id) {
            self.camera.track_object(None);
        }
    }

    /// Borrow the pieces a command may touch.
    pub fn command_context(&mut self) -> CommandContext<'_> {
        let ticks = self.clock.ticks(self.window_ticks);
        CommandContext {
            map: &mut self.map,
            camera: &mut self.camera,
            audio: &mut self.audio,
            input: &self.input,
            config: &self.config,
            typewriter: &mut self.typewriter,
            ticks,
            window_ticks: self.window_ticks,
        }
    }

    /// On-load script from the map's properties, if any.
    pub fn map_load_script(&self) -> Option<String> {
        self.map
            .properties
            .get("on-load")
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    }

    pub fn map_exit_script(&self) -> Option<String> {
        self.map
            .properties
            .get("on-exit")
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    }
}

/// The runner: shares the game with the script engine and owns the
/// per-tick order.
pub struct Engine {
    pub game: Rc<RefCell<Game>>,
    pub scripts: ScriptEngine,
    pub player: PlayerController,
}

impl Engine {
    pub fn new(game: Game) -> Result<Engine> {
        let game = Rc::new(RefCell::new(game));
        let scripts = ScriptEngine::new(game.clone())?;
        Ok(Engine {
            game,
            scripts,
            player: PlayerController::new(),
        })
    }

    /// Load the startup map and place the player per config.
    pub fn boot(&mut self) -> Result<()> {
        let (map_file, position, direction) = {
            let game = self.game.borrow();
            (
                game.config.startup.map.clone(),
                Vec2::new(
                    game.config.startup.player_position_x,
                    game.config.startup.player_position_y,
                ),
                Direction::DOWN,
            )
        };
        if !map_file.is_empty() {
            self.load_map_now(&map_file, position, direction)?;
        }
        Ok(())
    }

    /// One logic tick.
    pub fn update(&mut self, snapshot: &InputSnapshot, window_ticks: i64) {
        {
            let mut game = self.game.borrow_mut();
            game.window_ticks = window_ticks;
            let ticks = game.ticks();
            game.map.set_ticks(ticks);

            let binder = game.key_binder.clone();
            game.input.update(snapshot, &binder);

            // Pause toggling works even while paused.
            let pause_button = game.config.controls.pause_button.clone();
            if game.input.is_triggered(&pause_button) {
                if game.is_paused() {
                    game.resume();
                } else {
                    game.pause();
                }
            }
        }

        let paused = self.game.borrow().is_paused();
        if paused {
            // Only the global interface runs under pause: its queue drives
            // pause menus, and its coroutines may await pause-safe commands.
            {
                let mut game = self.game.borrow_mut();
                let game = &mut *game;
                let ticks = game.clock.ticks(game.window_ticks);
                let mut ctx = CommandContext {
                    map: &mut game.map,
                    camera: &mut game.camera,
                    audio: &mut game.audio,
                    input: &game.input,
                    config: &game.config,
                    typewriter: &mut game.typewriter,
                    ticks,
                    window_ticks: game.window_ticks,
                };
                game.global_commands.update(&mut ctx);
            }
            self.scripts.update_global_only();
        }
        if !paused {
            // Player input and collision-triggered scripts.
            let triggered = {
                let mut game = self.game.borrow_mut();
                self.player.update(&mut game)
            };
            for (script, context) in triggered {
                self.run_script(&script, context);
            }

            // Commands.
            {
                let mut game = self.game.borrow_mut();
                let game = &mut *game;
                let ticks = game.clock.ticks(game.window_ticks);
                let mut ctx = CommandContext {
                    map: &mut game.map,
                    camera: &mut game.camera,
                    audio: &mut game.audio,
                    input: &game.input,
                    config: &game.config,
                    typewriter: &mut game.typewriter,
                    ticks,
                    window_ticks: game.window_ticks,
                };
                game.commands.update(&mut ctx);
                game.global_commands.update(&mut ctx);
            }

            // Script coroutines.
            self.scripts.update();

            // Scripts queued from inside Lua (object:run_script and such).
            let pending: Vec<_> = self.game.borrow_mut().pending_scripts.drain(..).collect();
            for (script, context) in pending {
                self.run_script(&script, context);
            }

            // NPC schedules.
            let npc_scripts = {
                let mut game = self.game.borrow_mut();
                let game = &mut *game;
                let ticks = game.clock.ticks(game.window_ticks);
                let seconds =
                    (ticks as f64 * game.config.startup.time_multiplier as f64 / 1000.0) as i64;
                let frame_time = game.config.logic_frame_time();
                let time_multiplier = game.config.startup.time_multiplier;
                let current_map = game.map.filename.clone();
                let player_id = game.player_id;
                let mut ctx = CommandContext {
                    map: &mut game.map,
                    camera: &mut game.camera,
                    audio: &mut game.audio,
                    input: &game.input,
                    config: &game.config,
                    typewriter: &mut game.typewriter,
                    ticks,
                    window_ticks: game.window_ticks,
                };
                let assets = &mut game.assets;
                let mut loader = |file: &str, ticks: i64| -> Option<Sprite> {
                    if file.is_empty() {
                        return None;
                    }
                    assets
                        .sprite(file)
                        .ok()
                        .map(|data| Sprite::new(data, ticks))
                };
                game.npcs.update(
                    &mut ctx,
                    &current_map,
                    seconds,
                    frame_time,
                    time_multiplier,
                    player_id,
                    &mut loader,
                )
            };
            for (script, context) in npc_scripts.scripts {
                self.run_script(&script, context);
            }

            // Map, canvases, camera.
            {
                let mut game = self.game.borrow_mut();
                let game = &mut *game;
                let ticks = game.clock.ticks(game.window_ticks);
                let frame_seconds = game.config.logic_frame_time() as f32 / 1000.0;
                let player_position = game
                    .player_id
                    .and_then(|id| game.map.get_object(id))
                    .map(|player| player.centered_position());
                game.map
                    .update(ticks, frame_seconds, Some(&mut game.audio), player_position);
                for canvas in game.map.canvases() {
                    canvas.borrow_mut().update(ticks);
                }
                game.camera.update(&game.map);
                game.audio.update();
            }
        }

        // Deferred map change.
        let request = self.game.borrow_mut().next_map.take();
        if let Some(request) = request {
            if let Err(e) =
                self.load_map_now(&request.filename, request.position, request.direction)
            {
                log::error!("Failed to load map {}: {}", request.filename, e);
                // The previous map stays active.
            }
        }
    }

    /// Run a script source or file in the given context, logging errors.
    pub fn run_script(&mut self, script: &str, context: ScriptContext) {
        if script.is_empty() {
            return;
        }
        if let Err(e) = self.scripts.run(script, context) {
            log::error!("Script error: {}", e);
        }
    }

    /// Load a map immediately: stop pending commands, drop map-context
    /// coroutines, keep the old map if loading fails.
    pub fn load_map_now(
        &mut self,
        filename: &str,
        position: Vec2,
        direction: Direction,
    ) -> Result<()> {
        let exit_script = self.game.borrow().map_exit_script();
        if let Some(script) = exit_script {
            self.run_script(&script, ScriptContext::Global);
        }

        let new_map = {
            let mut game = self.game.borrow_mut();
            let game = &mut *game;
            let ticks = game.clock.ticks(game.window_ticks);
            tmx::load_map(
                Path::new(filename),
                &mut game.assets,
                &game.config,
                ticks,
            )
        }?;

        {
            let mut game = self.game.borrow_mut();
            let game = &mut *game;
            // Stop in-flight commands so awaiting coroutines unblock.
            let ticks = game.clock.ticks(game.window_ticks);
            let mut ctx = CommandContext {
                map: &mut game.map,
                camera: &mut game.camera,
                audio: &mut game.audio,
                input: &game.input,
                config: &game.config,
                typewriter: &mut game.typewriter,
                ticks,
                window_ticks: game.window_ticks,
            };
            game.commands.stop_all(&mut ctx);
        }
        // Map-context coroutines die with the map.
        self.scripts.drop_map_tasks();

        {
            let mut game = self.game.borrow_mut();
            game.npcs.forget_map_objects();
            game.map = new_map;
            game.player_id = None;
        }
        {
            let mut game = self.game.borrow_mut();
            game.spawn_player(position, direction)?;
        }
        self.scripts.refresh_player_global();

        let load_script = self.game.borrow().map_load_script();
        if let Some(script) = load_script {
            self.run_script(&script, ScriptContext::Map);
        }
        log::info!("Loaded map {}", filename);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> Game {
        Game::new(Config::new())
    }

    #[test]
    fn test_ticks_follow_window() {
        let mut game = game();
        game.window_ticks = 500;
        assert_eq!(game.ticks(), 500);
    }

    #[test]
    fn test_pause_freezes_game_ticks() {
        let mut game = game();
        game.window_ticks = 100;
        game.pause();
        game.window_ticks = 600;
        assert_eq!(game.ticks(), 100);
        assert!(game.is_paused());
        game.resume();
        game.window_ticks = 700;
        assert_eq!(game.ticks(), 200);
    }

    #[test]
    fn test_seconds_scaled_by_multiplier() {
        let mut game = game();
        game.config.startup.time_multiplier = 2.0;
        game.window_ticks = 3000;
        assert_eq!(game.seconds(), 6);
    }

    #[test]
    fn test_spawn_player_without_sprite() {
        let mut game = game();
        let id = game.spawn_player(Vec2::new(10.0, 20.0), Direction::LEFT).unwrap();
        let player = game.map.get_object(id).unwrap();
        assert_eq!(player.name(), "PLAYER");
        assert_eq!(player.direction, Direction::LEFT);
        assert_eq!(game.camera.tracked_object(), Some(id));
    }

    #[test]
    fn test_delete_object_clears_player_slots() {
        let mut game = game();
        let id = game.spawn_player(Vec2::ZERO, Direction::DOWN).unwrap();
        game.delete_object(id);
        assert_eq!(game.player_id, None);
        assert_eq!(game.camera.tracked_object(), None);
        assert!(game.map.get_object(id).is_none());
    }

    #[test]
    fn test_request_map_defers() {
        let mut game = game();
        game.request_map("maps/next.tmx", Vec2::ZERO, Direction::UP);
        assert!(game.next_map.is_some());
    }
}
