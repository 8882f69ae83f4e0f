//! The Show_Text command: dialogue boxes and choice menus.
//!
//! Builds a text canvas registered weakly with the map, optionally types the
//! text out, tracks the active choice with the configured highlight colour,
//! and completes on timeout, action press, or cancel. Dropping the command
//! releases the canvas; the map compacts it away on the next tick.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

use crate::canvas::{Canvas, TextStyle};
use crate::commands::{CommandContext, CommandStatus, CommandTimer};
use crate::map::ObjectId;
use crate::util::rect::Rect;

/// Where the text box goes.
pub enum TextPosition {
    /// Game-space position.
    Exact(Vec2),
    /// Above an object, following the camera.
    Object(ObjectId),
}

pub struct TextOptions {
    pub text: String,
    pub position: TextPosition,
    pub choices: Vec<String>,
    /// Auto-dismiss after this long; None waits for input.
    pub duration: Option<i64>,
    pub cancelable: bool,
    pub show_background: bool,
    pub typewriter_on: bool,
    /// Read window ticks instead of game ticks (pause menu text).
    pub pause_safe: bool,
}

impl TextOptions {
    pub fn new(text: impl Into<String>, position: TextPosition) -> Self {
        TextOptions {
            text: text.into(),
            position,
            choices: Vec::new(),
            duration: None,
            cancelable: false,
            show_background: true,
            typewriter_on: false,
            pause_safe: false,
        }
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Monotonic slot source for typewriter state.
static NEXT_SLOT: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(1);

pub struct ShowText {
    options: TextOptions,
    canvas: Option<Rc<RefCell<Canvas>>>,
    timer: Option<CommandTimer>,
    selected: usize,
    chosen: Option<usize>,
    typewriter_slot: i32,
    /// Canvas text as last rendered, to avoid redundant redraws.
    last_rendered: String,
}

impl ShowText {
    pub fn new(options: TextOptions) -> Self {
        ShowText {
            options,
            canvas: None,
            timer: None,
            selected: 0,
            chosen: None,
            typewriter_slot: NEXT_SLOT.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            last_rendered: String::new(),
        }
    }

    pub fn selected_choice(&self) -> Option<usize> {
        self.chosen
    }

    fn now(&self, ctx: &CommandContext) -> i64 {
        if self.options.pause_safe {
            ctx.window_ticks
        } else {
            ctx.ticks
        }
    }

    /// Full markup text including choices, with the active one highlighted.
    fn full_text(&self, ctx: &CommandContext) -> String {
        let mut text = self.options.text.clone();
        for (i, choice) in self.options.choices.iter().enumerate() {
            if !text.is_empty() || i > 0 {
                text.push('\n');
            }
            if i == self.selected {
                text.push_str(&format!(
                    "{{color={}}}{}{{/color}}",
                    ctx.config.text.choice_selected_color.trim_start_matches('#'),
                    choice
                ));
            } else {
                text.push_str(choice);
            }
        }
        text
    }

    fn canvas_position(&self, ctx: &CommandContext) -> Vec2 {
        let game_size = ctx.camera.game_size();
        let margin_x = ctx.config.text.screen_edge_margin_x;
        let margin_y = ctx.config.text.screen_edge_margin_y;
        let raw = match &self.options.position {
            TextPosition::Exact(position) => *position,
            TextPosition::Object(id) => ctx
                .map
                .get_object(*id)
                .map(|object| {
                    let above = object.centered_position()
                        - Vec2::new(0.0, object.bounding_box().h + 16.0);
                    above - ctx.camera.position()
                })
                .unwrap_or(game_size * 0.5),
        };
        Vec2::new(
            raw.x.clamp(margin_x, (game_size.x - margin_x).max(margin_x)),
            raw.y.clamp(margin_y, (game_size.y - margin_y).max(margin_y)),
        )
    }

    fn build_canvas(&mut self, ctx: &mut CommandContext) {
        let style = TextStyle {
            color: crate::util::color::Color::WHITE,
            ..TextStyle::default()
        };
        let position = self.canvas_position(ctx);
        let mut canvas = Canvas::new_text(self.full_text(ctx), position, style);
        canvas.priority = ctx.config.text.canvas_priority;
        if self.options.show_background {
            canvas.background_visible = true;
            canvas.background_color = ctx.config.text.background_color;
            let lines = 1 + self.options.text.matches('\n').count() + self.options.choices.len();
            canvas.background_rect = Rect::new(
                -4.0,
                -4.0,
                ctx.camera.game_size().x - position.x * 2.0 + 8.0,
                lines as f32 * canvas.style.line_height + 8.0,
            );
        }
        let canvas = Rc::new(RefCell::new(canvas));
        ctx.map.register_canvas(&canvas);
        self.canvas = Some(canvas);
        if let Some(duration) = self.options.duration {
            self.timer = Some(CommandTimer::new(self.now(ctx), duration));
        }
    }

    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        if self.canvas.is_none() {
            self.build_canvas(ctx);
        }
        let now = self.now(ctx);

        // Choice navigation.
        if !self.options.choices.is_empty() {
            let count = self.options.choices.len();
            if ctx.input.is_triggered("DOWN") {
                self.selected = (self.selected + 1) % count;
            }
            if ctx.input.is_triggered("UP") {
                self.selected = (self.selected + count - 1) % count;
            }
        }

        // Refresh the canvas text (typewriter + active choice highlight).
        let full = self.full_text(ctx);
        let rendered = if self.options.typewriter_on {
            ctx.typewriter.apply(self.typewriter_slot, &full, now)
        } else {
            full
        };
        if rendered != self.last_rendered
            && let Some(canvas) = &self.canvas
        {
            canvas.borrow_mut().set_text(rendered.clone());
            self.last_rendered = rendered;
        }

        // Completion checks.
        let timed_out = self
            .timer
            .map(|timer| timer.expired(now))
            .unwrap_or(false);
        let action = ctx.input.is_triggered(&ctx.config.controls.action_button);
        let cancel =
            self.options.cancelable && ctx.input.is_triggered(&ctx.config.controls.cancel_button);

        if action && !self.options.choices.is_empty() {
            // Let the typewriter finish before a choice can be confirmed.
            if self.options.typewriter_on && !ctx.typewriter.is_done(self.typewriter_slot) {
                ctx.typewriter.finish(self.typewriter_slot);
                return CommandStatus::Running;
            }
            self.chosen = Some(self.selected);
            self.close();
            return CommandStatus::Complete;
        }
        if (action && self.options.choices.is_empty()) || cancel || timed_out {
            if action && self.options.typewriter_on && !ctx.typewriter.is_done(self.typewriter_slot)
            {
                ctx.typewriter.finish(self.typewriter_slot);
                return CommandStatus::Running;
            }
            self.close();
            return CommandStatus::Complete;
        }
        CommandStatus::Running
    }

    fn close(&mut self) {
        // Dropping the owning Rc leaves only the map's weak entry, which is
        // compacted on the next map update.
        self.canvas = None;
    }

    pub fn stop(&mut self, _ctx: &mut CommandContext) {
        self.close();
    }

    pub fn shift_start(&mut self, delta: i64) {
        if let Some(timer) = &mut self.timer {
            timer.shift(delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioPlayer;
    use crate::camera::Camera;
    use crate::config::Config;
    use crate::input::{InputSnapshot, InputState, KeyBinder};
    use crate::map::Map;
    use crate::map::layer::{Layer, LayerKind, ObjectLayer};
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
            let mut map = Map::new(40, 40, 16, 16);
            map.add_layer(Layer::new(
                "objects",
                40,
                40,
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

        fn press(&mut self, key: &str) {
            let binder = KeyBinder::new();
            let snapshot = InputSnapshot::default().with_pressed(key);
            self.input.update(&snapshot, &binder);
        }

        fn release_all(&mut self) {
            let binder = KeyBinder::new();
            self.input.update(&InputSnapshot::default(), &binder);
        }
    }

    #[test]
    fn test_text_creates_canvas_and_completes_on_action() {
        let mut world = World::new();
        let mut command = ShowText::new(TextOptions::new(
            "Hello there",
            TextPosition::Exact(Vec2::new(50.0, 50.0)),
        ));
        world.ticks = 16;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Running);
        assert_eq!(world.map.canvases().len(), 1);
        assert_eq!(
            world.map.canvases()[0].borrow().text(),
            Some("Hello there")
        );

        world.press("Z"); // bound to the A action button
        world.ticks = 32;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
        // Canvas dropped; compaction clears the weak entry.
        world.map.update(32, 0.016, None, None);
        assert!(world.map.canvases().is_empty());
    }

    #[test]
    fn test_text_duration_expires() {
        let mut world = World::new();
        let mut command = ShowText::new(
            TextOptions::new("Timed", TextPosition::Exact(Vec2::new(50.0, 50.0)))
                .with_duration(100),
        );
        world.ticks = 16;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Running);
        world.ticks = 200;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
    }

    #[test]
    fn test_choice_navigation_and_selection() {
        let mut world = World::new();
        let mut command = ShowText::new(
            TextOptions::new("Pick one", TextPosition::Exact(Vec2::new(50.0, 50.0)))
                .with_choices(vec!["Yes".to_string(), "No".to_string()]),
        );
        world.ticks = 16;
        command.step(&mut world.ctx());
        let initial = world.map.canvases()[0].borrow().text().unwrap().to_string();
        assert!(initial.contains("{color="));
        let highlight_pos = initial.find("{color=").unwrap();
        assert!(initial[highlight_pos..].contains("Yes"));

        // Down moves the highlight to "No".
        world.press("DOWN");
        world.ticks = 32;
        command.step(&mut world.ctx());
        let moved = world.map.canvases()[0].borrow().text().unwrap().to_string();
        let highlight_pos = moved.find("{color=").unwrap();
        assert!(moved[highlight_pos..].starts_with("{color="));
        assert!(moved[highlight_pos..].contains("No"));

        world.release_all();
        world.press("Z");
        world.ticks = 48;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
        assert_eq!(command.selected_choice(), Some(1));
    }

    #[test]
    fn test_cancel_only_when_cancelable() {
        let mut world = World::new();
        let mut options = TextOptions::new("Q", TextPosition::Exact(Vec2::new(50.0, 50.0)));
        options.cancelable = true;
        let mut command = ShowText::new(options);
        world.ticks = 16;
        command.step(&mut world.ctx());
        world.press("X"); // cancel button
        world.ticks = 32;
        assert_eq!(command.step(&mut world.ctx()), CommandStatus::Complete);
        assert_eq!(command.selected_choice(), None);
    }

    #[test]
    fn test_stop_releases_canvas() {
        let mut world = World::new();
        let mut command = ShowText::new(TextOptions::new(
            "Bye",
            TextPosition::Exact(Vec2::new(50.0, 50.0)),
        ));
        world.ticks = 16;
        command.step(&mut world.ctx());
        command.stop(&mut world.ctx());
        world.map.update(32, 0.016, None, None);
        assert!(world.map.canvases().is_empty());
    }
}
