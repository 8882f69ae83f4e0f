//! Deferred commands and their scheduler.
//!
//! A command is a tagged value stepped once per tick by the map updater
//! until it reports completion; scripts await commands by yielding until
//! `is_complete()` holds. Loading a new map force-stops every pending
//! command so suspended coroutines unblock with a stopped status.
//!
//! Pausing shifts each command's captured start time by the paused interval,
//! so time-based commands do not advance across a pause even when they
//! measure a tick source that keeps running.

pub mod movement;
pub mod screen;
pub mod text;
pub mod update;

pub use movement::{MoveObject, MoveObjectTo, PoseTarget, ShowPose};
pub use screen::{MoveCamera, ShakeScreen, TintScreen};
pub use text::{ShowText, TextOptions, TextPosition};
pub use update::{CanvasUpdate, LayerOpacityUpdate, MusicFade, Wait};

use std::cell::RefCell;
use std::rc::Rc;

use crate::audio::AudioPlayer;
use crate::camera::Camera;
use crate::config::Config;
use crate::input::InputState;
use crate::map::Map;
use crate::text::Typewriter;

/// Outcome of stepping a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Running,
    Complete,
    /// Force-stopped; awaiting coroutines resume and run their cleanup.
    Stopped,
}

/// Mutable world borrows a command may touch during one step.
pub struct CommandContext<'a> {
    pub map: &'a mut Map,
    pub camera: &'a mut Camera,
    pub audio: &'a mut AudioPlayer,
    pub input: &'a InputState,
    pub config: &'a Config,
    pub typewriter: &'a mut Typewriter,
    /// Game ticks (frozen while paused or time-stopped).
    pub ticks: i64,
    /// Wall ticks; pause-safe consumers read these instead.
    pub window_ticks: i64,
}

/// Start-time/duration bookkeeping shared by the lerp-style commands.
#[derive(Debug, Clone, Copy)]
pub struct CommandTimer {
    start_time: i64,
    duration: i64,
}

impl CommandTimer {
    pub fn new(now: i64, duration: i64) -> Self {
        CommandTimer {
            start_time: now,
            duration: duration.max(0),
        }
    }

    /// Normalized progress in [0, 1].
    pub fn alpha(&self, now: i64) -> f32 {
        if self.duration <= 0 {
            return 1.0;
        }
        ((now - self.start_time) as f32 / self.duration as f32).clamp(0.0, 1.0)
    }

    pub fn expired(&self, now: i64) -> bool {
        now > self.start_time + self.duration
    }

    pub fn shift(&mut self, delta: i64) {
        self.start_time += delta;
    }
}

pub enum Command {
    MoveObject(MoveObject),
    MoveObjectTo(MoveObjectTo),
    ShowPose(ShowPose),
    MoveCamera(MoveCamera),
    TintScreen(TintScreen),
    ShakeScreen(ShakeScreen),
    CanvasUpdate(CanvasUpdate),
    LayerOpacityUpdate(LayerOpacityUpdate),
    MusicFade(MusicFade),
    Wait(Wait),
    ShowText(ShowText),
}

impl Command {
    pub fn step(&mut self, ctx: &mut CommandContext) -> CommandStatus {
        match self {
            Command::MoveObject(c) => c.step(ctx),
            Command::MoveObjectTo(c) => c.step(ctx),
            Command::ShowPose(c) => c.step(ctx),
            Command::MoveCamera(c) => c.step(ctx),
            Command::TintScreen(c) => c.step(ctx),
            Command::ShakeScreen(c) => c.step(ctx),
            Command::CanvasUpdate(c) => c.step(ctx),
            Command::LayerOpacityUpdate(c) => c.step(ctx),
            Command::MusicFade(c) => c.step(ctx),
            Command::Wait(c) => c.step(ctx),
            Command::ShowText(c) => c.step(ctx),
        }
    }

    /// Force-stop, running whatever cleanup the variant needs.
    pub fn stop(&mut self, ctx: &mut CommandContext) {
        match self {
            Command::MoveObject(c) => c.stop(ctx),
            Command::ShakeScreen(c) => c.stop(ctx),
            Command::ShowText(c) => c.stop(ctx),
            _ => {}
        }
    }

    /// Shift captured start times after a pause.
    pub fn shift_start(&mut self, delta: i64) {
        match self {
            Command::TintScreen(c) => c.timer.shift(delta),
            Command::CanvasUpdate(c) => c.timer.shift(delta),
            Command::LayerOpacityUpdate(c) => c.timer.shift(delta),
            Command::MusicFade(c) => c.timer.shift(delta),
            Command::ShakeScreen(c) => c.timer.shift(delta),
            Command::Wait(c) => c.timer.shift(delta),
            Command::ShowText(c) => c.shift_start(delta),
            Command::MoveObjectTo(c) => c.shift_start(delta),
            Command::MoveObject(_) | Command::ShowPose(_) | Command::MoveCamera(_) => {}
        }
    }

    /// The chosen option index of a finished Show_Text with choices.
    pub fn text_result(&self) -> Option<usize> {
        match self {
            Command::ShowText(c) => c.selected_choice(),
            _ => None,
        }
    }
}

/// A queued command plus its scheduler state; scripts hold these shared to
/// poll completion and request stops.
pub struct ActiveCommand {
    pub command: Command,
    status: CommandStatus,
    paused_at: Option<i64>,
    stop_requested: bool,
}

pub type SharedCommand = Rc<RefCell<ActiveCommand>>;

impl ActiveCommand {
    pub fn new(command: Command) -> Self {
        ActiveCommand {
            command,
            status: CommandStatus::Running,
            paused_at: None,
            stop_requested: false,
        }
    }

    pub fn execute(&mut self, ctx: &mut CommandContext) {
        if self.status != CommandStatus::Running || self.paused_at.is_some() {
            return;
        }
        if self.stop_requested {
            self.command.stop(ctx);
            self.status = CommandStatus::Stopped;
            return;
        }
        self.status = self.command.step(ctx);
    }

    pub fn is_complete(&self) -> bool {
        self.status != CommandStatus::Running
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    /// Ask the scheduler to stop this command on its next pass.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Stop immediately (used on map change, with a context in hand).
    pub fn force_stop(&mut self, ctx: &mut CommandContext) {
        if self.status == CommandStatus::Running {
            self.command.stop(ctx);
            self.status = CommandStatus::Stopped;
        }
    }

    pub fn pause(&mut self, now: i64) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: i64) {
        if let Some(paused_at) = self.paused_at.take() {
            self.command.shift_start(now - paused_at);
        }
    }
}

/// Commands pending for one scripting interface.
#[derive(Default)]
pub struct CommandQueue {
    commands: Vec<SharedCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) -> SharedCommand {
        let shared = Rc::new(RefCell::new(ActiveCommand::new(command)));
        self.commands.push(shared.clone());
        shared
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run every active command once, dropping the finished ones.
    pub fn update(&mut self, ctx: &mut CommandContext) {
        for command in &self.commands {
            command.borrow_mut().execute(ctx);
        }
        self.commands.retain(|c| !c.borrow().is_complete());
    }

    /// Force-stop everything (map change).
    pub fn stop_all(&mut self, ctx: &mut CommandContext) {
        for command in &self.commands {
            command.borrow_mut().force_stop(ctx);
        }
        self.commands.clear();
    }

    pub fn pause_all(&mut self, now: i64) {
        for command in &self.commands {
            command.borrow_mut().pause(now);
        }
    }

    pub fn resume_all(&mut self, now: i64) {
        for command in &self.commands {
            command.borrow_mut().resume(now);
        }
    }
}
