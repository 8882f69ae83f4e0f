//! 8-way direction bitset.
//!
//! Directions are a bitset over the four cardinals so that diagonals are
//! plain combinations (`UP | RIGHT`). `FORWARD` and `BACKWARD` are relative
//! sentinels accepted as inputs only; they must be resolved against an
//! object's current facing before any geometric use.

use bitflags::bitflags;
use glam::{IVec2, Vec2};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Direction: u32 {
        const UP = 1;
        const RIGHT = 2;
        const DOWN = 4;
        const LEFT = 8;
        /// Relative to current facing; input only.
        const FORWARD = 16;
        /// Relative to current facing; input only.
        const BACKWARD = 32;
    }
}

const NAMES: [&str; 16] = [
    "",
    "Up",
    "Right",
    "Up|Right",
    "Down",
    "Up|Down",
    "Down|Right",
    "Up|Down|Right",
    "Left",
    "Up|Left",
    "Left|Right",
    "Up|Left|Right",
    "Down|Left",
    "Up|Down|Left",
    "Down|Left|Right",
    "Up|Down|Left|Right",
];

impl Direction {
    pub const NONE: Direction = Direction::empty();

    /// The opposite direction. Works for cardinals and diagonals alike
    /// (UP|RIGHT becomes DOWN|LEFT); relative sentinels are masked off.
    pub fn opposite(self) -> Direction {
        let bits = self.cardinal().bits();
        Direction::from_bits_truncate((bits + bits * 3) % 15)
    }

    /// Only the cardinal bits.
    pub fn cardinal(self) -> Direction {
        self & (Direction::UP | Direction::RIGHT | Direction::DOWN | Direction::LEFT)
    }

    /// Resolve FORWARD/BACKWARD against a concrete facing.
    pub fn resolve(self, facing: Direction) -> Direction {
        if self.contains(Direction::FORWARD) {
            facing.cardinal()
        } else if self.contains(Direction::BACKWARD) {
            facing.opposite()
        } else {
            self.cardinal()
        }
    }

    /// Convert to a unit-step vector. When both bits of an axis are set the
    /// positive one wins, matching the movement code's expectations.
    pub fn to_vector(self) -> Vec2 {
        let x = if self.contains(Direction::RIGHT) {
            1.0
        } else if self.contains(Direction::LEFT) {
            -1.0
        } else {
            0.0
        };
        let y = if self.contains(Direction::DOWN) {
            1.0
        } else if self.contains(Direction::UP) {
            -1.0
        } else {
            0.0
        };
        Vec2::new(x, y)
    }

    /// Direction of a movement vector (screen coordinates, +y is down).
    pub fn from_vector(vec: Vec2) -> Direction {
        let mut dir = Direction::NONE;
        if vec.x > 0.0 {
            dir |= Direction::RIGHT;
        }
        if vec.x < 0.0 {
            dir |= Direction::LEFT;
        }
        if vec.y > 0.0 {
            dir |= Direction::DOWN;
        }
        if vec.y < 0.0 {
            dir |= Direction::UP;
        }
        dir
    }

    /// More than one cardinal bit set.
    pub fn is_diagonal(self) -> bool {
        let bits = self.cardinal().bits();
        bits & bits.wrapping_sub(1) != 0
    }

    /// Collapse a diagonal to a single cardinal, UP > DOWN > LEFT > RIGHT.
    pub fn to_four_directions(self) -> Direction {
        for dir in [
            Direction::UP,
            Direction::DOWN,
            Direction::LEFT,
            Direction::RIGHT,
        ] {
            if self.contains(dir) {
                return dir;
            }
        }
        Direction::NONE
    }

    /// Parse "Up|Right" style names, case-insensitively. Unknown parts are
    /// ignored with a warning.
    pub fn parse(text: &str) -> Direction {
        let mut dir = Direction::NONE;
        if text.is_empty() {
            return dir;
        }
        for part in crate::util::split_trimmed(&text.to_uppercase(), '|') {
            match part.as_str() {
                "UP" => dir |= Direction::UP,
                "DOWN" => dir |= Direction::DOWN,
                "LEFT" => dir |= Direction::LEFT,
                "RIGHT" => dir |= Direction::RIGHT,
                other => {
                    log::warn!("Unexpected direction {} in directional string {}", other, text)
                }
            }
        }
        dir
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", NAMES[self.cardinal().bits() as usize])
    }
}

/// Direction an object at `pos1` should face to look at `pos2`. Without
/// `diagonal` only the axis with the larger distance is kept.
pub fn facing_direction(pos1: Vec2, pos2: Vec2, diagonal: bool) -> Direction {
    let mut x_change = pos2.x - pos1.x;
    let mut y_change = pos2.y - pos1.y;
    if !diagonal {
        if y_change.abs() > 0.0 && y_change.abs() > x_change.abs() {
            x_change = 0.0;
        } else if x_change.abs() > 0.0 && x_change.abs() > y_change.abs() {
            y_change = 0.0;
        }
    }

    if diagonal {
        Direction::from_vector(Vec2::new(x_change, y_change))
    } else if x_change > 0.0 {
        Direction::RIGHT
    } else if x_change < 0.0 {
        Direction::LEFT
    } else if y_change > 0.0 {
        Direction::DOWN
    } else if y_change < 0.0 {
        Direction::UP
    } else {
        Direction::NONE
    }
}

/// Tile-coordinate variant of [`facing_direction`].
pub fn facing_direction_tiles(pos1: IVec2, pos2: IVec2) -> Direction {
    facing_direction(pos1.as_vec2(), pos2.as_vec2(), false)
}
