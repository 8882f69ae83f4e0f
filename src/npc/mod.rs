//! NPC schedules: keypoint timelines executed on the current map and
//! simulated virtually everywhere else.
//!
//! Each NPC owns named schedules of keypoints. Every tick the scheduler picks
//! the latest keypoint whose day selector matches and whose timestamp has
//! passed, walks it to its position, runs its activation script, and drives
//! its sub-commands. NPCs on other maps advance through the same commands
//! virtually with expected completion times instead of real movement.

pub mod loader;

use glam::Vec2;
use rustc_hash::FxHashMap;

use crate::commands::CommandContext;
use crate::map::object::{MapObject, ScriptContext};
use crate::map::{CollisionCheck, ObjectId};
use crate::sprite::Sprite;
use crate::util::direction::Direction;

pub const DEFAULT_DAY_LENGTH_SECONDS: i64 = 86_400;
/// Lag beyond which a keypoint is fast-forwarded instead of walked.
const CATCH_UP_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySelector {
    /// Every `n` days (1 = daily).
    EveryN(i64),
    Even,
    Odd,
    /// Exactly once, on the given day.
    Once(i64),
}

impl DaySelector {
    pub fn matches(&self, day: i64) -> bool {
        match *self {
            DaySelector::EveryN(n) => n > 0 && day % n == 0,
            DaySelector::Even => day % 2 == 0,
            DaySelector::Odd => day % 2 == 1,
            DaySelector::Once(n) => day == n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeypointStatus {
    #[default]
    Pending,
    Started,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeypointCommand {
    Move { x: f32, y: f32 },
    Face { direction: Direction },
    Teleport { map: String, x: f32, y: f32 },
    Wait { duration: i64 },
    Visibility { visible: bool },
    Passthrough { enabled: bool },
}

#[derive(Debug, Clone)]
pub struct Keypoint {
    /// Map the keypoint happens on.
    pub map: String,
    pub day: DaySelector,
    /// Seconds of day when the keypoint activates.
    pub timestamp: i64,
    pub position: Vec2,
    pub pose: String,
    pub direction: Direction,
    pub activation_script: String,
    pub commands: Vec<KeypointCommand>,
    /// Move on to the next keypoint once this one completes.
    pub sequential: bool,
    pub status: KeypointStatus,
    pub completion_day: i64,
    pub command_index: usize,
}

impl Keypoint {
    pub fn new(map: impl Into<String>, timestamp: i64, position: Vec2) -> Keypoint {
        Keypoint {
            map: map.into(),
            day: DaySelector::EveryN(1),
            timestamp,
            position,
            pose: String::new(),
            direction: Direction::NONE,
            activation_script: String::new(),
            commands: Vec::new(),
            sequential: false,
            status: KeypointStatus::Pending,
            completion_day: 0,
            command_index: 0,
        }
    }

    pub fn reset(&mut self) {
        self.status = KeypointStatus::Pending;
        self.completion_day = 0;
        self.command_index = 0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub name: String,
    pub keypoints: Vec<Keypoint>,
}

pub struct Npc {
    pub name: String,
    pub display_name: String,
    /// Sprite file spawned for the on-map object.
    pub sprite_file: String,
    /// Map the NPC currently lives on.
    pub map_name: String,
    /// Last known (or simulated) position.
    pub position: Vec2,
    pub direction: Direction,
    pub visible: bool,
    pub passthrough: bool,
    pub active: bool,
    pub schedules: FxHashMap<String, Schedule>,
    current_schedule: String,
    /// Keypoint currently being driven, index into the current schedule.
    current_keypoint: Option<usize>,
    /// Object on the current map, when present there.
    pub object_id: Option<ObjectId>,
    /// Virtual command completion tick for off-map simulation.
    expected_completion: i64,
    expected_position: Vec2,
    /// Wait sub-command deadline.
    wait_until: i64,
}

impl Npc {
    pub fn new(name: impl Into<String>) -> Npc {
        Npc {
            name: name.into(),
            display_name: String::new(),
            sprite_file: String::new(),
            map_name: String::new(),
            position: Vec2::ZERO,
            direction: Direction::DOWN,
            visible: true,
            passthrough: false,
            active: true,
            schedules: FxHashMap::default(),
            current_schedule: String::new(),
            current_keypoint: None,
            object_id: None,
            expected_completion: -1,
            expected_position: Vec2::ZERO,
            wait_until: -1,
        }
    }

    pub fn has_schedule(&self, name: &str) -> bool {
        self.schedules.contains_key(name)
    }

    pub fn schedule_name(&self) -> &str {
        &self.current_schedule
    }

    /// Switch schedules, resetting keypoint progress.
    pub fn set_schedule(&mut self, name: &str) {
        if !self.schedules.contains_key(name) {
            log::warn!("NPC {} has no schedule named {}", self.name, name);
            return;
        }
        self.current_schedule = name.to_string();
        self.current_keypoint = None;
        self.expected_completion = -1;
        self.wait_until = -1;
        if let Some(schedule) = self.schedules.get_mut(name) {
            for keypoint in &mut schedule.keypoints {
                keypoint.reset();
            }
        }
    }

    fn schedule(&self) -> Option<&Schedule> {
        self.schedules.get(&self.current_schedule)
    }

    /// Latest keypoint whose day selector matches and whose timestamp has
    /// passed, then forward over sequential keypoints already done today.
    fn pick_keypoint(&self, day: i64, seconds_of_day: i64) -> Option<usize> {
        let schedule = self.schedule()?;
        let mut best: Option<usize> = None;
        for (i, keypoint) in schedule.keypoints.iter().enumerate() {
            if keypoint.day.matches(day) && keypoint.timestamp <= seconds_of_day {
                best = Some(i);
            }
        }
        let mut index = best?;
        while index + 1 < schedule.keypoints.len() {
            let keypoint = &schedule.keypoints[index];
            let done_today =
                keypoint.status == KeypointStatus::Completed && keypoint.completion_day == day;
            if keypoint.sequential && done_today {
                index += 1;
            } else {
                break;
            }
        }
        Some(index)
    }
}

/// Scripts the scheduler wants run, surfaced to the game loop.
pub struct NpcScripts {
    pub scripts: Vec<(String, ScriptContext)>,
}

/// Owns every NPC and the game-time mapping that drives their schedules.
pub struct NpcScheduler {
    pub npcs: Vec<Npc>,
    pub day_length_seconds: i64,
    /// Multiplier on expected travel time for virtual moves.
    travel_factor: f32,
}

impl Default for NpcScheduler {
    fn default() -> Self {
        NpcScheduler {
            npcs: Vec::new(),
            day_length_seconds: DEFAULT_DAY_LENGTH_SECONDS,
            travel_factor: 1.25,
        }
    }
}

impl NpcScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, npc: Npc) {
        self.npcs.push(npc);
    }

    pub fn get(&self, name: &str) -> Option<&Npc> {
        self.npcs.iter().find(|npc| npc.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Npc> {
        self.npcs.iter_mut().find(|npc| npc.name == name)
    }

    /// Day number for a total of game seconds, starting from day 1.
    pub fn day(&self, game_seconds: i64) -> i64 {
        game_seconds / self.day_length_seconds + 1
    }

    pub fn seconds_of_day(&self, game_seconds: i64) -> i64 {
        game_seconds % self.day_length_seconds
    }

    /// Drop object links into a map that is being unloaded.
    pub fn forget_map_objects(&mut self) {
        for npc in &mut self.npcs {
            npc.object_id = None;
        }
    }

    /// Per-tick scheduler pass.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        ctx: &mut CommandContext,
        current_map: &str,
        game_seconds: i64,
        frame_time: i64,
        time_multiplier: f32,
        player_id: Option<ObjectId>,
        sprite_loader: &mut dyn FnMut(&str, i64) -> Option<Sprite>,
    ) -> NpcScripts {
        let day = self.day(game_seconds);
        let seconds_of_day = self.seconds_of_day(game_seconds);
        let travel_factor = self.travel_factor;
        let mut scripts = NpcScripts {
            scripts: Vec::new(),
        };

        for npc in &mut self.npcs {
            if !npc.active {
                continue;
            }
            update_npc(
                npc,
                ctx,
                current_map,
                day,
                seconds_of_day,
                frame_time,
                time_multiplier,
                travel_factor,
                player_id,
                sprite_loader,
                &mut scripts,
            );
        }
        scripts
    }
}

#[allow(clippy::too_many_arguments)]
fn update_npc(
    npc: &mut Npc,
    ctx: &mut CommandContext,
    current_map: &str,
    day: i64,
    seconds_of_day: i64,
    frame_time: i64,
    time_multiplier: f32,
    travel_factor: f32,
    player_id: Option<ObjectId>,
    sprite_loader: &mut dyn FnMut(&str, i64) -> Option<Sprite>,
    scripts: &mut NpcScripts,
) {
    // A stale object link (map changed, object deleted) is dropped and the
    // NPC keeps simulating off-map.
    if let Some(object_id) = npc.object_id
        && (npc.map_name != current_map || ctx.map.get_object(object_id).is_none())
    {
        npc.object_id = None;
    }

    let Some(index) = npc.pick_keypoint(day, seconds_of_day) else {
        // Nothing scheduled now: the NPC leaves the map.
        if let Some(object_id) = npc.object_id.take() {
            ctx.map.delete_object(object_id);
        }
        npc.current_keypoint = None;
        return;
    };

    if npc.current_keypoint != Some(index) {
        npc.current_keypoint = Some(index);
        npc.expected_completion = -1;
        npc.wait_until = -1;
        if let Some(schedule) = npc.schedules.get_mut(&npc.current_schedule) {
            schedule.keypoints[index].command_index = 0;
            if schedule.keypoints[index].status == KeypointStatus::Started {
                schedule.keypoints[index].status = KeypointStatus::Pending;
            }
        }
    }

    let keypoint_map;
    {
        let Some(schedule) = npc.schedules.get(&npc.current_schedule) else {
            return;
        };
        keypoint_map = schedule.keypoints[index].map.clone();
    }

    if keypoint_map == current_map && npc.map_name == current_map {
        update_on_map(npc, ctx, index, day, seconds_of_day, player_id, sprite_loader, scripts);
    } else {
        update_off_map(npc, ctx.ticks, index, day, frame_time, time_multiplier, travel_factor);
        // A teleport may have brought the NPC onto the current map; its
        // object appears on the next pass.
    }
}

#[allow(clippy::too_many_arguments)]
fn update_on_map(
    npc: &mut Npc,
    ctx: &mut CommandContext,
    index: usize,
    day: i64,
    seconds_of_day: i64,
    player_id: Option<ObjectId>,
    sprite_loader: &mut dyn FnMut(&str, i64) -> Option<Sprite>,
    scripts: &mut NpcScripts,
) {
    let ticks = ctx.ticks;

    // Ensure the map object exists.
    if npc.object_id.is_none() {
        let mut object = MapObject::new(0, &npc.name);
        object.position = npc.position;
        object.direction = npc.direction;
        object.passthrough = npc.passthrough;
        if let Some(sprite) = sprite_loader(&npc.sprite_file, ticks) {
            object.set_sprite(sprite, ticks);
        } else {
            object.size = Vec2::new(16.0, 16.0);
        }
        object.set_visible(npc.visible, ticks);
        let id = ctx.map.add_object(object, None);
        npc.object_id = Some(id);
    }
    let Some(object_id) = npc.object_id else { return };

    let (status, target, pose, direction, activation, lag) = {
        let Some(schedule) = npc.schedules.get(&npc.current_schedule) else {
            return;
        };
        let keypoint = &schedule.keypoints[index];
        (
            keypoint.status,
            keypoint.position,
            keypoint.pose.clone(),
            keypoint.direction,
            keypoint.activation_script.clone(),
            seconds_of_day - keypoint.timestamp,
        )
    };

    if status == KeypointStatus::Completed {
        npc.sync_from_object(ctx);
        return;
    }

    if status == KeypointStatus::Pending {
        let arrived = {
            let Some(object) = ctx.map.get_object(object_id) else {
                return;
            };
            (object.position - target).abs().max_element() < 0.5
        };
        if !arrived {
            if lag > CATCH_UP_SECONDS {
                // Way behind schedule: snap straight there.
                if let Some(object) = ctx.map.get_object_mut(object_id) {
                    object.position = target;
                }
            } else {
                walk_towards(ctx, object_id, target, player_id);
                npc.sync_from_object(ctx);
                return;
            }
        }
        // Arrived: start the keypoint.
        if let Some(schedule) = npc.schedules.get_mut(&npc.current_schedule) {
            schedule.keypoints[index].status = KeypointStatus::Started;
            schedule.keypoints[index].command_index = 0;
        }
        if let Some(object) = ctx.map.get_object_mut(object_id) {
            if direction != Direction::NONE {
                object.face(direction, ticks);
            }
            if !pose.is_empty() {
                object.show_pose(&pose, "", Direction::NONE, ticks);
            }
        }
        if !activation.is_empty() {
            scripts.scripts.push((activation, ScriptContext::Map));
        }
        npc.wait_until = -1;
    }

    // Drive sub-commands.
    let catch_up = lag > CATCH_UP_SECONDS;
    loop {
        let command = {
            let Some(schedule) = npc.schedules.get(&npc.current_schedule) else {
                return;
            };
            let keypoint = &schedule.keypoints[index];
            keypoint.commands.get(keypoint.command_index).cloned()
        };
        let Some(command) = command else {
            // All commands done: the keypoint completes.
            if let Some(schedule) = npc.schedules.get_mut(&npc.current_schedule) {
                let keypoint = &mut schedule.keypoints[index];
                keypoint.status = KeypointStatus::Completed;
                keypoint.completion_day = day;
            }
            npc.sync_from_object(ctx);
            return;
        };

        let done = run_map_command(npc, ctx, object_id, &command, player_id, catch_up);
        if done {
            if let Some(schedule) = npc.schedules.get_mut(&npc.current_schedule) {
                schedule.keypoints[index].command_index += 1;
            }
            npc.wait_until = -1;
            if catch_up {
                continue; // fast-forward the rest this tick
            }
        }
        break;
    }
    npc.sync_from_object(ctx);
}

/// Step one keypoint sub-command on the live object. Returns completion.
fn run_map_command(
    npc: &mut Npc,
    ctx: &mut CommandContext,
    object_id: ObjectId,
    command: &KeypointCommand,
    player_id: Option<ObjectId>,
    catch_up: bool,
) -> bool {
    let ticks = ctx.ticks;
    match command {
        KeypointCommand::Move { x, y } => {
            let target = Vec2::new(*x, *y);
            if catch_up {
                if let Some(object) = ctx.map.get_object_mut(object_id) {
                    object.position = target;
                }
                return true;
            }
            walk_towards(ctx, object_id, target, player_id);
            ctx.map
                .get_object(object_id)
                .map(|object| (object.position - target).abs().max_element() < 0.5)
                .unwrap_or(true)
        }
        KeypointCommand::Face { direction } => {
            if let Some(object) = ctx.map.get_object_mut(object_id) {
                object.face(*direction, ticks);
            }
            true
        }
        KeypointCommand::Teleport { map, x, y } => {
            npc.map_name = map.clone();
            npc.position = Vec2::new(*x, *y);
            if map == &ctx.map.filename || ctx.map.filename.is_empty() {
                if let Some(object) = ctx.map.get_object_mut(object_id) {
                    object.position = npc.position;
                }
            } else if let Some(object_id) = npc.object_id.take() {
                ctx.map.delete_object(object_id);
            }
            true
        }
        KeypointCommand::Wait { duration } => {
            if catch_up {
                return true;
            }
            if npc.wait_until < 0 {
                npc.wait_until = ticks + duration;
            }
            ticks >= npc.wait_until
        }
        KeypointCommand::Visibility { visible } => {
            npc.visible = *visible;
            if let Some(object) = ctx.map.get_object_mut(object_id) {
                object.set_visible(*visible, ticks);
            }
            true
        }
        KeypointCommand::Passthrough { enabled } => {
            npc.passthrough = *enabled;
            if let Some(object) = ctx.map.get_object_mut(object_id) {
                object.passthrough = *enabled;
            }
            true
        }
    }
}

/// One tick of movement toward a target with tile collision. The player is
/// made passthrough for the step so NPCs never deadlock against them.
fn walk_towards(
    ctx: &mut CommandContext,
    object_id: ObjectId,
    target: Vec2,
    player_id: Option<ObjectId>,
) {
    let saved_passthrough = player_id.and_then(|id| {
        ctx.map.get_object_mut(id).map(|player| {
            let saved = player.passthrough;
            player.passthrough = true;
            saved
        })
    });

    if let Some(object) = ctx.map.get_object(object_id) {
        let speed = object.speed;
        let delta = target - object.position;
        let dx = delta.x.abs().min(speed);
        let dy = delta.y.abs().min(speed);
        if dx > crate::util::EPSILON {
            let dir = if delta.x > 0.0 {
                Direction::RIGHT
            } else {
                Direction::LEFT
            };
            ctx.map
                .move_object(object_id, dir, dx, CollisionCheck::TILE, true, true);
        }
        if dy > crate::util::EPSILON {
            let dir = if delta.y > 0.0 {
                Direction::DOWN
            } else {
                Direction::UP
            };
            ctx.map
                .move_object(object_id, dir, dy, CollisionCheck::TILE, true, true);
        }
    }

    if let (Some(id), Some(saved)) = (player_id, saved_passthrough)
        && let Some(player) = ctx.map.get_object_mut(id)
    {
        player.passthrough = saved;
    }
}

#[allow(clippy::too_many_arguments)]
fn update_off_map(
    npc: &mut Npc,
    ticks: i64,
    index: usize,
    day: i64,
    frame_time: i64,
    time_multiplier: f32,
    travel_factor: f32,
) {
    let (status, target) = {
        let Some(schedule) = npc.schedules.get(&npc.current_schedule) else {
            return;
        };
        let keypoint = &schedule.keypoints[index];
        (keypoint.status, keypoint.position)
    };

    let travel = |from: Vec2, to: Vec2| -> i64 {
        let chebyshev = (to - from).abs().max_element();
        (chebyshev * travel_factor * frame_time as f32 * time_multiplier / 1000.0).ceil() as i64
    };

    if status == KeypointStatus::Pending {
        if let Some(schedule) = npc.schedules.get_mut(&npc.current_schedule) {
            let keypoint = &mut schedule.keypoints[index];
            keypoint.status = KeypointStatus::Started;
            keypoint.command_index = 0;
            npc.map_name = keypoint.map.clone();
        }
        npc.expected_completion = ticks + travel(npc.position, target);
        npc.expected_position = target;
        return;
    }
    if status == KeypointStatus::Completed {
        return;
    }

    // Started: wait out the current virtual step.
    if npc.expected_completion >= 0 && ticks < npc.expected_completion {
        return;
    }
    npc.position = npc.expected_position;
    npc.expected_completion = -1;

    // Advance through sub-commands virtually.
    loop {
        let command = {
            let Some(schedule) = npc.schedules.get(&npc.current_schedule) else {
                return;
            };
            let keypoint = &schedule.keypoints[index];
            keypoint.commands.get(keypoint.command_index).cloned()
        };
        let Some(command) = command else {
            if let Some(schedule) = npc.schedules.get_mut(&npc.current_schedule) {
                let keypoint = &mut schedule.keypoints[index];
                keypoint.status = KeypointStatus::Completed;
                keypoint.completion_day = day;
            }
            return;
        };

        match &command {
            KeypointCommand::Move { x, y } => {
                let target = Vec2::new(*x, *y);
                npc.expected_completion = ticks + travel(npc.position, target);
                npc.expected_position = target;
            }
            KeypointCommand::Teleport { map, x, y } => {
                npc.map_name = map.clone();
                npc.position = Vec2::new(*x, *y);
                npc.expected_position = npc.position;
            }
            KeypointCommand::Face { direction } => npc.direction = *direction,
            KeypointCommand::Wait { duration } => {
                npc.expected_completion = ticks + duration;
                npc.expected_position = npc.position;
            }
            KeypointCommand::Visibility { visible } => npc.visible = *visible,
            KeypointCommand::Passthrough { enabled } => npc.passthrough = *enabled,
        }
        if let Some(schedule) = npc.schedules.get_mut(&npc.current_schedule) {
            schedule.keypoints[index].command_index += 1;
        }
        // Timed steps park the loop until their expected completion.
        if npc.expected_completion >= 0 && ticks < npc.expected_completion {
            return;
        }
        npc.position = npc.expected_position;
        npc.expected_completion = -1;
    }
}

impl Npc {
    /// Mirror the live object's state back into the NPC record.
    fn sync_from_object(&mut self, ctx: &CommandContext) {
        if let Some(object_id) = self.object_id
            && let Some(object) = ctx.map.get_object(object_id)
        {
            self.position = object.position;
            self.direction = object.direction;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioPlayer;
    use crate::camera::Camera;
    use crate::config::Config;
    use crate::input::InputState;
    use crate::map::layer::{Layer, LayerKind, ObjectLayer, TileLayer};
    use crate::map::{Map, Tileset};
    use crate::text::Typewriter;

    struct World {
        map: Map,
        camera: Camera,
        audio: AudioPlayer,
        input: InputState,
        config: Config,
        typewriter: Typewriter,
        ticks: i64,
    }

    impl World {
        fn new() -> World {
            let config = Config::new();
            let mut map = Map::new(20, 20, 16, 16);
            map.filename = "town.tmx".to_string();
            map.add_tileset(Tileset {
                first_id: 1,
                name: "collision".to_string(),
                tile_width: 16,
                tile_height: 16,
                image_width: 64,
                image_height: 16,
                ..Tileset::default()
            });
            map.add_layer(Layer::new(
                "collision",
                20,
                20,
                LayerKind::Tile(TileLayer {
                    tiles: vec![1; 400],
                }),
            ));
            map.add_layer(Layer::new(
                "objects",
                20,
                20,
                LayerKind::Object(ObjectLayer::default()),
            ));
            World {
                camera: Camera::new(&config),
                audio: AudioPlayer::disabled(&config.audio),
                input: InputState::default(),
                typewriter: Typewriter::default(),
                config,
                map,
                ticks: 0,
            }
        }

        fn ctx(&mut self) -> CommandContext<'_> {
            CommandContext {
                map: &mut self.map,
                camera: &mut self.camera,
                audio: &mut self.audio,
                input: &self.input,
                config: &self.config,
                typewriter: &mut self.typewriter,
                ticks: self.ticks,
                window_ticks: self.ticks,
            }
        }
    }

    fn npc_with_keypoint(keypoint: Keypoint) -> Npc {
        let mut npc = Npc::new("baker");
        npc.map_name = "town.tmx".to_string();
        npc.position = Vec2::new(32.0, 32.0);
        npc.schedules.insert(
            "default".to_string(),
            Schedule {
                name: "default".to_string(),
                keypoints: vec![keypoint],
            },
        );
        npc.set_schedule("default");
        npc
    }

    fn no_sprite(_: &str, _: i64) -> Option<Sprite> {
        None
    }

    #[test]
    fn test_day_selector() {
        assert!(DaySelector::EveryN(1).matches(5));
        assert!(DaySelector::EveryN(3).matches(6));
        assert!(!DaySelector::EveryN(3).matches(7));
        assert!(DaySelector::Even.matches(4));
        assert!(DaySelector::Odd.matches(3));
        assert!(DaySelector::Once(7).matches(7));
        assert!(!DaySelector::Once(7).matches(8));
    }

    #[test]
    fn test_day_math() {
        let scheduler = NpcScheduler::new();
        assert_eq!(scheduler.day(0), 1);
        assert_eq!(scheduler.day(86_400), 2);
        assert_eq!(scheduler.seconds_of_day(86_400 + 120), 120);
    }

    #[test]
    fn test_on_map_npc_spawns_object_and_completes() {
        let mut world = World::new();
        let mut scheduler = NpcScheduler::new();
        // Keypoint at the NPC's current position, already due.
        let keypoint = Keypoint::new("town.tmx", 0, Vec2::new(32.0, 32.0));
        scheduler.add(npc_with_keypoint(keypoint));

        world.ticks = 16;
        let mut loader = no_sprite;
        let mut ctx = world.ctx();
        scheduler.update(&mut ctx, "town.tmx", 10, 16, 1.0, None, &mut loader);
        drop(ctx);

        let npc = scheduler.get("baker").unwrap();
        assert!(npc.object_id.is_some());
        let object = world.map.get_object(npc.object_id.unwrap()).unwrap();
        assert_eq!(object.name(), "BAKER");
        let schedule = &npc.schedules["default"];
        assert_eq!(schedule.keypoints[0].status, KeypointStatus::Completed);
    }

    #[test]
    fn test_on_map_npc_walks_to_keypoint() {
        let mut world = World::new();
        let mut scheduler = NpcScheduler::new();
        let keypoint = Keypoint::new("town.tmx", 0, Vec2::new(64.0, 32.0));
        scheduler.add(npc_with_keypoint(keypoint));

        let mut loader = no_sprite;
        let mut done = false;
        for i in 1..200 {
            world.ticks = i * 16;
            let mut ctx = world.ctx();
            scheduler.update(&mut ctx, "town.tmx", 10, 16, 1.0, None, &mut loader);
            drop(ctx);
            let npc = scheduler.get("baker").unwrap();
            if npc.schedules["default"].keypoints[0].status == KeypointStatus::Completed {
                done = true;
                break;
            }
        }
        assert!(done);
        let npc = scheduler.get("baker").unwrap();
        assert!((npc.position - Vec2::new(64.0, 32.0)).length() < 1.0);
    }

    #[test]
    fn test_keypoint_commands_run_in_order() {
        let mut world = World::new();
        let mut scheduler = NpcScheduler::new();
        let mut keypoint = Keypoint::new("town.tmx", 0, Vec2::new(32.0, 32.0));
        keypoint.commands = vec![
            KeypointCommand::Face {
                direction: Direction::LEFT,
            },
            KeypointCommand::Visibility { visible: false },
        ];
        scheduler.add(npc_with_keypoint(keypoint));

        let mut loader = no_sprite;
        for i in 1..10 {
            world.ticks = i * 16;
            let mut ctx = world.ctx();
            scheduler.update(&mut ctx, "town.tmx", 10, 16, 1.0, None, &mut loader);
        }
        let npc = scheduler.get("baker").unwrap();
        assert_eq!(npc.direction, Direction::LEFT);
        assert!(!npc.visible);
        assert_eq!(
            npc.schedules["default"].keypoints[0].status,
            KeypointStatus::Completed
        );
    }

    #[test]
    fn test_no_matching_keypoint_removes_object() {
        let mut world = World::new();
        let mut scheduler = NpcScheduler::new();
        // Keypoint in the future.
        let keypoint = Keypoint::new("town.tmx", 5000, Vec2::new(32.0, 32.0));
        scheduler.add(npc_with_keypoint(keypoint));

        let mut loader = no_sprite;
        // First pass with a due keypoint time to spawn the object.
        world.ticks = 16;
        let mut ctx = world.ctx();
        scheduler.update(&mut ctx, "town.tmx", 6000, 16, 1.0, None, &mut loader);
        drop(ctx);
        assert!(scheduler.get("baker").unwrap().object_id.is_some());

        // Now a time before the keypoint: nothing scheduled, object leaves.
        world.ticks = 32;
        let mut ctx = world.ctx();
        scheduler.update(&mut ctx, "town.tmx", 1000, 16, 1.0, None, &mut loader);
        drop(ctx);
        assert!(scheduler.get("baker").unwrap().object_id.is_none());
        assert_eq!(world.map.object_count(), 0);
    }

    #[test]
    fn test_off_map_simulation_with_teleport() {
        let mut world = World::new();
        let mut scheduler = NpcScheduler::new();
        let mut keypoint = Keypoint::new("village.tmx", 0, Vec2::new(160.0, 0.0));
        keypoint.commands = vec![KeypointCommand::Teleport {
            map: "castle.tmx".to_string(),
            x: 5.0,
            y: 6.0,
        }];
        let mut npc = npc_with_keypoint(keypoint);
        npc.map_name = "village.tmx".to_string();
        npc.position = Vec2::ZERO;
        scheduler.npcs.clear();
        scheduler.add(npc);

        let mut loader = no_sprite;
        let mut teleported = false;
        for i in 1..100 {
            world.ticks = i * 160;
            let mut ctx = world.ctx();
            scheduler.update(&mut ctx, "town.tmx", 10, 16, 1.0, None, &mut loader);
            drop(ctx);
            let npc = scheduler.get("baker").unwrap();
            if npc.map_name == "castle.tmx" {
                teleported = true;
                assert_eq!(npc.position, Vec2::new(5.0, 6.0));
                break;
            }
        }
        assert!(teleported);
    }

    #[test]
    fn test_set_schedule_resets_progress() {
        let mut npc = Npc::new("guard");
        npc.schedules.insert(
            "day".to_string(),
            Schedule {
                name: "day".to_string(),
                keypoints: vec![{
                    let mut k = Keypoint::new("town.tmx", 0, Vec2::ZERO);
                    k.status = KeypointStatus::Completed;
                    k.completion_day = 3;
                    k
                }],
            },
        );
        npc.set_schedule("day");
        assert_eq!(
            npc.schedules["day"].keypoints[0].status,
            KeypointStatus::Pending
        );
    }

    #[test]
    fn test_sequential_keypoints_advance() {
        let npc = {
            let mut npc = Npc::new("baker");
            let mut first = Keypoint::new("town.tmx", 100, Vec2::ZERO);
            first.sequential = true;
            first.status = KeypointStatus::Completed;
            first.completion_day = 1;
            let second = Keypoint::new("town.tmx", 200, Vec2::ZERO);
            npc.schedules.insert(
                "default".to_string(),
                Schedule {
                    name: "default".to_string(),
                    keypoints: vec![first, second],
                },
            );
            npc.current_schedule = "default".to_string();
            npc
        };
        // Both due; the first is done today and sequential, so the second
        // is picked even though the first is "latest started".
        assert_eq!(npc.pick_keypoint(1, 150), Some(1));
    }
}
