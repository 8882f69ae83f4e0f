//! Crate-wide error type.
//!
//! One variant per failure family: asset loading, format parsing, collision
//! misconfiguration, scripting, audio, and configuration. Map and sprite
//! loads surface these to the caller; script errors terminate only the
//! offending task; audio errors degrade to silent no-ops at the call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A file was missing or unreadable.
    #[error("failed to load asset {path}: {source}")]
    Asset {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// An XML/TMX/sprite/NPC document violated its schema.
    #[error("format error in {file}: {reason}")]
    Format { file: String, reason: String },
    /// A collision shape that the engine cannot represent,
    /// e.g. an ellipse object whose width differs from its height.
    #[error("collision misconfiguration: {0}")]
    CollisionMisconfig(String),
    /// A runtime error inside a user script.
    #[error("script error: {0}")]
    Script(#[from] mlua::Error),
    /// The audio backend failed; playback degrades to a no-op.
    #[error("audio error: {0}")]
    Audio(String),
    /// The configuration file could not be parsed at all.
    #[error("config error in {file}: {reason}")]
    Config { file: String, reason: String },
}

impl Error {
    /// Shorthand for a format error.
    pub fn format(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Format {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
