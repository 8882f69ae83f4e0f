//! Lerp-over-time commands: canvas attributes, layer opacity, music volume,
//! and the plain wait timer.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

use crate::canvas::Canvas;
use crate::commands::{CommandContext, CommandStatus, CommandTimer};
use crate::util::lerp;

/// Animate a canvas's position, magnification, angle, and opacity together.
pub struct CanvasUpdate {
    canvas: Rc<RefCell<Canvas>>,
    target_position: Vec2,
    target_magnification: Vec2,
    target_angle: f32,
    target_opacity: f32,
    pub timer: CommandTimer,
    start: Option<(Vec2, Vec2, f32, f32)>,
}

impl CanvasUpdate {
    pub fn new(
        canvas: Rc<RefCell<Canvas>>,
        target_position: Vec2,
        target_magnification: Vec2,
        target_angle: f32,
        target_opacity: f32,
        now: i64,
        duration: i64,
    ) -> Self {
        CanvasUpdate {
            canvas,
            target_position,
            target_magnification,
            target_angle,
            target_opacity,
            timer: CommandTimer::new(now, duration),
            start: None,
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        let mut canvas = self.canvas.borrow_mut();
        let (position, magnification, angle, opacity) = *self.start.get_or_insert_with(|| {
            (
                canvas.position(),
                canvas.magnification(),
                canvas.angle().unwrap_or(0.0),
                canvas.opacity(),
            )
        });
        let alpha = self.timer.alpha(ctx.ticks);
        canvas.set_position(crate::util::lerp_v2(position, self.target_position, alpha));
        canvas.set_magnification(crate::util::lerp_v2(
            magnification,
            self.target_magnification,
            alpha,
        ));
        canvas.set_angle(Some(lerp(angle, self.target_angle, alpha)));
        canvas.set_opacity(lerp(opacity, self.target_opacity, alpha));
        if self.timer.expired(ctx.ticks) {
            CommandStatus::Complete
        } else {
            CommandStatus::Running
        }
    }
}

/// Fade a layer's opacity.
pub struct LayerOpacityUpdate {
    layer_index: usize,
    target: f32,
    pub timer: CommandTimer,
    start: Option<f32>,
}

impl LayerOpacityUpdate {
    pub fn new(layer_index: usize, target: f32, now: i64, duration: i64) -> Self {
        LayerOpacityUpdate {
            layer_index,
            target,
            timer: CommandTimer::new(now, duration),
            start: None,
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        let Some(layer) = ctx.map.layers.get_mut(self.layer_index) else {
            return CommandStatus::Complete;
        };
        let start = *self.start.get_or_insert(layer.opacity);
        let alpha = self.timer.alpha(ctx.ticks);
        layer.set_opacity(lerp(start, self.target, alpha));
        if self.timer.expired(ctx.ticks) {
            CommandStatus::Complete
        } else {
            CommandStatus::Running
        }
    }
}

/// Fade a music track's volume through the audio player.
pub struct MusicFade {
    music_key: String,
    target: f32,
    pub timer: CommandTimer,
    start: Option<f32>,
}

impl MusicFade {
    pub fn new(music_key: impl Into<String>, target: f32, now: i64, duration: i64) -> Self {
        MusicFade {
            music_key: music_key.into(),
            target,
            timer: CommandTimer::new(now, duration),
            start: None,
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        let start = *self
            .start
            .get_or_insert_with(|| ctx.audio.music_volume_of(&self.music_key));
        let alpha = self.timer.alpha(ctx.ticks);
        ctx.audio
            .set_music_volume(&self.music_key, lerp(start, self.target, alpha));
        if self.timer.expired(ctx.ticks) {
            CommandStatus::Complete
        } else {
            CommandStatus::Running
        }
    }
}

/// Pure timer against the game clock; pausing freezes it.
pub struct Wait {
    pub timer: CommandTimer,
}

impl Wait {
    pub fn new(now: i64, duration: i64) -> Self {
        Wait {
            timer: CommandTimer::new(now, duration),
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        if self.timer.expired(ctx.ticks) {
            CommandStatus::Complete
        } else {
            CommandStatus::Running
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
    use crate::map::Map;
    use crate::map::layer::{Layer, LayerKind, TileLayer};
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
            let mut map = Map::new(10, 10, 16, 16);
            map.add_layer(Layer::new(
                "fog",
                10,
                10,
                LayerKind::Tile(TileLayer { tiles: vec![0; 100] }),
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
    fn test_canvas_update_lerps_all_attributes() {
        let mut world = World::new();
        let canvas = Rc::new(RefCell::new(Canvas::new_image("a.png", Vec2::ZERO)));
        let mut command = CanvasUpdate::new(
            canvas.clone(),
            Vec2::new(100.0, 0.0),
            Vec2::new(2.0, 2.0),
            90.0,
            0.0,
            0,
            100,
        );
        world.ticks = 50;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Running);
        {
            let canvas = canvas.borrow();
            assert!((canvas.position().x - 50.0).abs() < 1e-3);
            assert!((canvas.magnification().x - 1.5).abs() < 1e-3);
            assert!((canvas.angle().unwrap() - 45.0).abs() < 1e-3);
            assert!((canvas.opacity() - 0.5).abs() < 1e-3);
        }
        world.ticks = 200;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
        assert_eq!(canvas.borrow().position().x, 100.0);
    }

    #[test]
    fn test_layer_opacity_update() {
        let mut world = World::new();
        let mut command = LayerOpacityUpdate::new(0, 0.0, 0, 100);
        world.ticks = 50;
        command.step(&mut world.ctx());
        assert!((world.map.layers[0].opacity - 0.5).abs() < 1e-3);
        world.ticks = 101;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
    }

    #[test]
    fn test_music_fade_tracks_volume() {
        let mut world = World::new();
        world.audio.set_music_volume("theme", 1.0);
        let mut command = MusicFade::new("theme", 0.0, 0, 100);
        world.ticks = 50;
        command.step(&mut world.ctx());
        assert!((world.audio.music_volume_of("theme") - 0.5).abs() < 1e-3);
        world.ticks = 150;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
        assert_eq!(world.audio.music_volume_of("theme"), 0.0);
    }

    #[test]
    fn test_wait_respects_game_ticks() {
        let mut world = World::new();
        let mut command = Wait::new(0, 100);
        world.ticks = 100;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Running);
        world.ticks = 101;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
    }
}
