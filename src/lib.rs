//! Wick Engine library.
//!
//! Runtime core of a 2D tile-based adventure-game engine: maps, objects,
//! sprites, collision, pathfinding, camera, canvases, NPC schedules, and a
//! coroutine-style command scheduler driven by embedded Lua.
//!
//! The modules are exposed for use in integration tests and as a reusable
//! library; the `wickengine` binary wires them to the raylib backend.

pub mod assets;
pub mod audio;
pub mod camera;
pub mod canvas;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod game;
pub mod input;
pub mod logging;
pub mod map;
pub mod npc;
pub mod player;
pub mod render;
pub mod scripting;
pub mod sprite;
pub mod text;
pub mod util;

pub use error::{Error, Result};
