//! Sprites: shared pose/frame data and per-instance animation state.

pub mod data;
pub mod instance;
pub mod loader;

pub use data::{Frame, Pose, SpriteData};
pub use instance::{Sprite, SpriteUpdate};

use crate::util::direction::Direction;

/// Anything that carries a sprite and can switch poses: map objects,
/// sprite canvases, image layers.
pub trait SpriteHolder {
    fn sprite(&self) -> Option<&Sprite>;
    fn sprite_mut(&mut self) -> Option<&mut Sprite>;

    /// Select a pose by tag triple.
    fn set_pose(&mut self, pose: &str, state: &str, direction: Direction, ticks: i64) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.set_pose(pose, state, direction, true, ticks);
        }
    }
}
