//! Collision query results.
//!
//! `Map::passable` returns a [`CollisionRecord`] describing what (if
//! anything) the candidate position runs into. Areas are passable but still
//! recorded so the player controller can fire their scripts.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::map::ObjectId;
use crate::util::direction::Direction;

bitflags! {
    /// What to test in a passability query.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CollisionCheck: u32 {
        const TILE = 1;
        const OBJECT = 2;
        const BOTH = 3;
        /// Expand the candidate box by the configured proximity distance,
        /// for the object pass only.
        const PROXIMITY = 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionType {
    /// Nothing in the way.
    #[default]
    None,
    /// The move had no extent.
    NoMove,
    /// Blocked by the collision tile layer or the map edge.
    Tile,
    /// Blocked by a solid object.
    Object,
    /// Overlapping a passable scripted area.
    Area,
}

#[derive(Debug, Clone, Default)]
pub struct CollisionRecord {
    pub collision_type: CollisionType,
    pub this_object: Option<ObjectId>,
    /// First (script-bearing preferred) solid object hit.
    pub other_object: Option<ObjectId>,
    /// First area overlapped.
    pub other_area: Option<ObjectId>,
    /// All solid objects hit, by uppercased name.
    pub other_objects: FxHashMap<String, ObjectId>,
    /// All areas overlapped, by uppercased name.
    pub other_areas: FxHashMap<String, ObjectId>,
    /// Advisory slide suggestion produced by the tile pass near doorways.
    pub edge_direction: Direction,
}

impl CollisionRecord {
    pub fn new(collision_type: CollisionType) -> Self {
        CollisionRecord {
            collision_type,
            edge_direction: Direction::NONE,
            ..CollisionRecord::default()
        }
    }

    pub fn no_move() -> Self {
        Self::new(CollisionType::NoMove)
    }

    /// Movement may proceed: nothing blocked, or only an area overlaps.
    pub fn passable(&self) -> bool {
        matches!(
            self.collision_type,
            CollisionType::None | CollisionType::Area
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passable_matches_type() {
        for (ty, expected) in [
            (CollisionType::None, true),
            (CollisionType::Area, true),
            (CollisionType::NoMove, false),
            (CollisionType::Tile, false),
            (CollisionType::Object, false),
        ] {
            assert_eq!(CollisionRecord::new(ty).passable(), expected, "{:?}", ty);
        }
    }

    #[test]
    fn test_check_both_contains_parts() {
        assert!(CollisionCheck::BOTH.contains(CollisionCheck::TILE));
        assert!(CollisionCheck::BOTH.contains(CollisionCheck::OBJECT));
        assert!(!CollisionCheck::OBJECT.contains(CollisionCheck::TILE));
    }
}
