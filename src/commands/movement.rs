//! Movement commands: straight moves, pathfinding moves, pose changes.

use std::cell::RefCell;
use std::rc::Rc;

use glam::{IVec2, Vec2};

use crate::canvas::Canvas;
use crate::commands::{CommandContext, CommandStatus};
use crate::map::collision::CollisionCheck;
use crate::map::pathfinder::{self, Path};
use crate::map::ObjectId;
use crate::util::direction::Direction;

const ARRIVAL_TOLERANCE: f32 = 1.0;

/// Move an object a fixed number of pixels in one direction.
pub struct MoveObject {
    object: ObjectId,
    dir: Direction,
    pixels: f32,
    skip_blocking: bool,
    change_facing: bool,
    /// Animation state to restore on completion, captured on the first step.
    old_state: Option<String>,
}

impl MoveObject {
    pub fn new(
        object: ObjectId,
        dir: Direction,
        pixels: f32,
        skip_blocking: bool,
        change_facing: bool,
    ) -> Self {
        MoveObject {
            object,
            dir,
            pixels,
            skip_blocking,
            change_facing,
            old_state: None,
        }
    }

    fn finish(&self, ctx: &mut CommandContext) {
        if let (Some(state), Some(object)) =
            (self.old_state.as_ref(), ctx.map.get_object_mut(self.object))
        {
            let state = state.clone();
            let ticks = ctx.ticks;
            object.update_state(&state, ticks);
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        let Some(object) = ctx.map.get_object(self.object) else {
            return CommandStatus::Complete;
        };
        if self.old_state.is_none() {
            self.old_state = Some(object.state().to_string());
        }
        if object.stopped || self.pixels <= crate::util::EPSILON {
            self.finish(ctx);
            return CommandStatus::Complete;
        }

        let step = object.speed.min(self.pixels);
        let record = ctx.map.move_object(
            self.object,
            self.dir,
            step,
            CollisionCheck::BOTH,
            self.change_facing,
            true,
        );
        if record.passable() {
            self.pixels -= step;
        } else if self.skip_blocking {
            self.pixels = 0.0;
        }

        if self.pixels <= crate::util::EPSILON {
            self.finish(ctx);
            return CommandStatus::Complete;
        }
        CommandStatus::Running
    }

    pub fn stop(&mut self, ctx: &mut CommandContext) {
        self.finish(ctx);
    }
}

/// Walk an object to a pixel destination along a pathfinder route,
/// re-planning when blocked.
pub struct MoveObjectTo {
    object: ObjectId,
    destination: Vec2,
    check: CollisionCheck,
    keep_trying: bool,
    path: Option<Path>,
    /// Index of the path step being walked and pixels done within it.
    step_index: usize,
    step_pixels: f32,
    blocked: bool,
    no_path: bool,
    last_attempt_time: i64,
    /// Best-seen tile carried across retries to bias future runs.
    nearest: Option<IVec2>,
}

impl MoveObjectTo {
    pub fn new(object: ObjectId, destination: Vec2, check: CollisionCheck, keep_trying: bool) -> Self {
        MoveObjectTo {
            object,
            destination,
            check,
            keep_trying,
            path: None,
            step_index: 0,
            step_pixels: 0.0,
            blocked: false,
            no_path: false,
            last_attempt_time: 0,
            nearest: None,
        }
    }

    fn plan(&mut self, ctx: &mut CommandContext) {
        let dest_tile = pathfinder::tile_of(ctx.map, self.destination);
        // A one-shot run insists on the real goal; a keep-trying run settles
        // for the nearest reachable tile and retries from there.
        let path = pathfinder::find_path(
            ctx.map,
            self.object,
            dest_tile,
            self.check,
            self.keep_trying,
        );
        // Remember the closest the search has ever been.
        let improved = self
            .nearest
            .map(|old| {
                let old_d = (old - dest_tile).abs().max_element();
                let new_d = (path.nearest - dest_tile).abs().max_element();
                new_d < old_d
            })
            .unwrap_or(true);
        if improved {
            self.nearest = Some(path.nearest);
        }
        self.no_path = !path.is_found();
        self.path = Some(path);
        self.step_index = 0;
        self.step_pixels = 0.0;
        self.blocked = false;
        self.last_attempt_time = ctx.ticks;
    }

    fn arrived(&self, ctx: &CommandContext) -> bool {
        ctx.map
            .get_object(self.object)
            .map(|object| {
                (object.position.x - self.destination.x).abs() < ARRIVAL_TOLERANCE
                    && (object.position.y - self.destination.y).abs() < ARRIVAL_TOLERANCE
            })
            .unwrap_or(true)
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        let Some(object) = ctx.map.get_object(self.object) else {
            return CommandStatus::Complete;
        };
        if object.stopped || self.arrived(ctx) {
            self.face_rest(ctx);
            return CommandStatus::Complete;
        }

        if self.path.is_none() {
            self.plan(ctx);
        }

        if (self.no_path || self.blocked) && !self.keep_trying {
            self.face_rest(ctx);
            return CommandStatus::Complete;
        }

        if self.blocked || self.no_path {
            self.face_rest(ctx);
            let time_passed = ctx.ticks - self.last_attempt_time;
            let retry = (ctx.map.objects_moved && time_passed > 1000) || time_passed > 5000;
            if retry {
                self.plan(ctx);
            }
            return CommandStatus::Running;
        }

        let path_len = self.path.as_ref().map(|p| p.directions.len()).unwrap_or(0);
        if self.step_index >= path_len {
            return self.final_approach(ctx);
        }

        let dir = self.path.as_ref().map(|p| p.directions[self.step_index]);
        let Some(dir) = dir else {
            return CommandStatus::Complete;
        };
        let tile_size = ctx.map.tile_width() as f32;
        let speed = ctx
            .map
            .get_object(self.object)
            .map(|o| o.speed)
            .unwrap_or(1.0);
        let step = speed.min(tile_size - self.step_pixels);
        let record = ctx
            .map
            .move_object(self.object, dir, step, self.check, true, true);
        if record.passable() {
            self.step_pixels += step;
            if self.step_pixels >= tile_size - crate::util::EPSILON {
                self.step_index += 1;
                self.step_pixels = 0.0;
            }
        } else {
            self.blocked = true;
            self.last_attempt_time = ctx.ticks;
        }
        CommandStatus::Running
    }

    /// Close the final sub-tile gap straight toward the destination.
    fn final_approach(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        let Some(object) = ctx.map.get_object(self.object) else {
            return CommandStatus::Complete;
        };
        let speed = object.speed;
        let delta = self.destination - object.position;
        let dx = delta.x.abs().min(speed);
        let dy = delta.y.abs().min(speed);
        let mut blocked = false;
        if dx > crate::util::EPSILON {
            let dir = if delta.x > 0.0 {
                Direction::RIGHT
            } else {
                Direction::LEFT
            };
            blocked |= !ctx
                .map
                .move_object(self.object, dir, dx, self.check, true, true)
                .passable();
        }
        if dy > crate::util::EPSILON {
            let dir = if delta.y > 0.0 {
                Direction::DOWN
            } else {
                Direction::UP
            };
            blocked |= !ctx
                .map
                .move_object(self.object, dir, dy, self.check, true, true)
                .passable();
        }
        if self.arrived(ctx) {
            self.face_rest(ctx);
            return CommandStatus::Complete;
        }
        if blocked {
            self.blocked = true;
            self.last_attempt_time = ctx.ticks;
        }
        CommandStatus::Running
    }

    fn face_rest(&self, ctx: &mut CommandContext) {
        let ticks = ctx.ticks;
        if let Some(object) = ctx.map.get_object_mut(self.object) {
            object.update_state("FACE", ticks);
        }
    }

    pub fn shift_start(&mut self, delta: i64) {
        self.last_attempt_time += delta;
    }
}

/// What a Show_Pose targets.
pub enum PoseTarget {
    Object(ObjectId),
    Canvas(Rc<RefCell<Canvas>>),
}

/// Switch a sprite holder's pose; completes when a finite pose finishes.
pub struct ShowPose {
    target: PoseTarget,
    pose: String,
    state: String,
    direction: Direction,
    applied: bool,
}

impl ShowPose {
    pub fn new(target: PoseTarget, pose: &str, state: &str, direction: Direction) -> Self {
        ShowPose {
            target,
            pose: pose.to_string(),
            state: state.to_string(),
            direction,
            applied: false,
        }
    }

    /// The caller already set the pose; the command only tracks completion.
    pub fn applied(mut self) -> Self {
        self.applied = true;
        self
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        if !self.applied {
            self.applied = true;
            match &self.target {
                PoseTarget::Object(id) => {
                    if let Some(object) = ctx.map.get_object_mut(*id) {
                        object.show_pose(&self.pose, &self.state, self.direction, ctx.ticks);
                    } else {
                        return CommandStatus::Complete;
                    }
                }
                PoseTarget::Canvas(canvas) => {
                    let mut canvas = canvas.borrow_mut();
                    if let Some(sprite) = canvas.sprite_mut() {
                        sprite.set_pose(&self.pose, &self.state, self.direction, true, ctx.ticks);
                    } else {
                        return CommandStatus::Complete;
                    }
                }
            }
        }

        let finished = match &self.target {
            PoseTarget::Object(id) => ctx
                .map
                .get_object(*id)
                .and_then(|object| object.sprite())
                .map(|sprite| sprite.pose().repeats == -1 || sprite.is_stopped())
                .unwrap_or(true),
            PoseTarget::Canvas(canvas) => canvas
                .borrow()
                .sprite()
                .map(|sprite| sprite.pose().repeats == -1 || sprite.is_stopped())
                .unwrap_or(true),
        };
        if finished {
            CommandStatus::Complete
        } else {
            CommandStatus::Running
        }
    }
}
