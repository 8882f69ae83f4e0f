//! Camera commands: pan, tint, shake.

use glam::Vec2;

use crate::commands::{CommandContext, CommandStatus, CommandTimer};
use crate::util::color::Color;

/// Pan the camera to a map position at a fixed speed, detaching it from any
/// tracked object.
pub struct MoveCamera {
    target: Vec2,
    speed: f32,
    detached: bool,
}

impl MoveCamera {
    pub fn new(target: Vec2, speed: f32) -> Self {
        MoveCamera {
            target,
            speed: speed.max(0.01),
            detached: false,
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        if !self.detached {
            ctx.camera.track_object(None);
            self.detached = true;
        }
        let position = ctx.camera.position();
        let displacement = self.target - position;
        let remaining = displacement.length();
        if remaining < 0.01 {
            return CommandStatus::Complete;
        }
        let step = displacement.normalize_or_zero() * self.speed.min(remaining);
        ctx.camera.set_position(position + step, ctx.map);
        // Clamping may pin the camera short of an off-map target.
        if ctx.camera.position() == position {
            return CommandStatus::Complete;
        }
        CommandStatus::Running
    }
}

/// Fade the camera tint towards a colour.
pub struct TintScreen {
    target: Color,
    pub timer: CommandTimer,
    start_color: Option<Color>,
}

impl TintScreen {
    pub fn new(target: Color, now: i64, duration: i64) -> Self {
        TintScreen {
            target,
            timer: CommandTimer::new(now, duration),
            start_color: None,
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        let start = *self
            .start_color
            .get_or_insert_with(|| ctx.camera.tint_color);
        let alpha = self.timer.alpha(ctx.ticks);
        ctx.camera.tint_color = start.lerp(&self.target, alpha);
        if self.timer.expired(ctx.ticks) {
            ctx.camera.tint_color = self.target;
            CommandStatus::Complete
        } else {
            CommandStatus::Running
        }
    }
}

/// Shake the screen for a duration.
pub struct ShakeScreen {
    strength: f32,
    speed: f32,
    pub timer: CommandTimer,
    started: bool,
}

impl ShakeScreen {
    pub fn new(strength: f32, speed: f32, now: i64, duration: i64) -> Self {
        ShakeScreen {
            strength,
            speed,
            timer: CommandTimer::new(now, duration),
            started: false,
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        if !self.started {
            ctx.camera.start_shaking(self.strength, self.speed);
            self.started = true;
        }
        if self.timer.expired(ctx.ticks) {
            ctx.camera.cease_shaking();
            CommandStatus::Complete
        } else {
            CommandStatus::Running
        }
    }

    pub fn stop(&mut self, ctx: &mut CommandContext) {
        if self.started {
            ctx.camera.cease_shaking();
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
    use crate::map::layer::{LayerKind, ObjectLayer};
    use crate::map::{Layer, Map};
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
            let mut map = Map::new(100, 100, 16, 16); // 1600x1600
            map.add_layer(Layer::new(
                "objects",
                100,
                100,
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

    #[test]
    fn test_move_camera_reaches_target() {
        let mut world = World::new();
        let mut command = MoveCamera::new(Vec2::new(100.0, 40.0), 8.0);
        let mut complete = false;
        for _ in 0..64 {
            world.ticks += 16;
            if command.step(&mut world.ctx()) == CommandStatus::Complete {
                complete = true;
                break;
            }
        }
        assert!(complete);
        assert!((world.camera.position() - Vec2::new(100.0, 40.0)).length() < 0.01);
    }

    #[test]
    fn test_move_camera_detaches_tracking() {
        let mut world = World::new();
        let id = world.map.new_object("hero");
        world.camera.track_object(Some(id));
        let mut command = MoveCamera::new(Vec2::new(50.0, 50.0), 4.0);
        world.ticks += 16;
        command.step(&mut world.ctx());
        assert_eq!(world.camera.tracked_object(), None);
    }

    #[test]
    fn test_tint_screen_lerps_and_finishes() {
        let mut world = World::new();
        world.camera.tint_color = Color::new(0.0, 0.0, 0.0, 0.0);
        let mut command = TintScreen::new(Color::new(1.0, 0.0, 0.0, 1.0), 0, 100);

        world.ticks = 50;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Running);
        assert!((world.camera.tint_color.r - 0.5).abs() < 1e-4);

        world.ticks = 150;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
        assert_eq!(world.camera.tint_color, Color::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_shake_screen_runs_then_stops() {
        let mut world = World::new();
        let mut command = ShakeScreen::new(4.0, 2.0, 0, 100);
        world.ticks = 10;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Running);
        assert!(world.camera.is_shaking());
        world.ticks = 150;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
        assert!(!world.camera.is_shaking());
    }
}
