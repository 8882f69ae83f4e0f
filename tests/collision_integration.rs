//! Collision semantics across the map, object, and player controller:
//! the tile-slide, diagonal-slide, and area-trigger scenarios.

mod common;

use common::{TestEngine, block_tile, open_map};
use glam::Vec2;
use wickengine::input::InputSnapshot;
use wickengine::map::collision::{CollisionCheck, CollisionType};
use wickengine::util::direction::Direction;

/// Universal invariant: lookups by id and by name agree.
#[test]
fn test_object_lookup_invariant() {
    let mut map = open_map(10, 10);
    for name in ["Door", "Chest", "Guard"] {
        let id = map.new_object(name);
        let by_id = map.get_object(id).unwrap();
        assert_eq!(by_id.id(), id);
        let by_name = map.get_object_by_name(name).unwrap();
        assert_eq!(by_name.id(), id);
    }
}

/// Universal invariant: passable() matches the record type.
#[test]
fn test_passable_matches_type() {
    let mut map = open_map(10, 10);
    block_tile(&mut map, 3, 1);
    let hero = map.new_object("hero");
    {
        let object = map.get_object_mut(hero).unwrap();
        object.position = Vec2::new(16.0, 16.0);
        object.size = Vec2::new(16.0, 16.0);
    }
    let object = map.get_object(hero).unwrap();
    for (dir, speed) in [
        (Direction::RIGHT, 32.0), // into the wall
        (Direction::DOWN, 4.0),   // open ground
        (Direction::LEFT, 32.0),  // off the map
    ] {
        let record = map.passable_at(object, dir, object.position, speed, CollisionCheck::BOTH);
        assert_eq!(
            record.passable(),
            matches!(
                record.collision_type,
                CollisionType::None | CollisionType::Area
            )
        );
    }
}

/// Tile slide: a wall stops movement dead, state drops to the face state.
#[test]
fn test_wall_blocks_and_faces() {
    let mut map = open_map(32, 32);
    for y in 0..32 {
        block_tile(&mut map, 5, y);
    }
    let hero = map.new_object("hero");
    {
        let object = map.get_object_mut(hero).unwrap();
        object.position = Vec2::new(64.0, 80.0);
        object.size = Vec2::new(16.0, 16.0);
        object.direction = Direction::RIGHT;
    }
    let record = map.move_object(hero, Direction::RIGHT, 2.0, CollisionCheck::BOTH, true, true);
    assert_eq!(record.collision_type, CollisionType::Tile);
    let object = map.get_object(hero).unwrap();
    assert_eq!(object.position, Vec2::new(64.0, 80.0));
    assert_eq!(object.state(), "FACE");
}

/// Diagonal slide: UP|RIGHT against an east wall moves along UP only and
/// faces UP.
#[test]
fn test_diagonal_slide() {
    let mut map = open_map(32, 32);
    for y in 0..32 {
        block_tile(&mut map, 5, y);
    }
    let hero = map.new_object("hero");
    {
        let object = map.get_object_mut(hero).unwrap();
        object.position = Vec2::new(64.0, 80.0);
        object.size = Vec2::new(16.0, 16.0);
    }
    let record = map.move_object(
        hero,
        Direction::UP | Direction::RIGHT,
        2.0,
        CollisionCheck::BOTH,
        true,
        true,
    );
    assert!(record.passable());
    let object = map.get_object(hero).unwrap();
    assert_eq!(object.position, Vec2::new(64.0, 78.0));
    assert_eq!(object.direction, Direction::UP);
}

/// Area trigger flow through the player controller: touch once on entry,
/// no re-trigger while standing, leave once on exit.
#[test]
fn test_area_touch_and_leave_through_engine() {
    let mut world = TestEngine::new();
    {
        let mut game = world.engine.game.borrow_mut();
        let door = game.map.new_object("door");
        let object = game.map.get_object_mut(door).unwrap();
        object.position = Vec2::new(40.0, 16.0);
        object.size = Vec2::new(16.0, 16.0);
        object.passthrough = true;
        object.touch_script = "touches = (touches or 0) + 1".to_string();
        object.leave_script = "leaves = (leaves or 0) + 1".to_string();
    }

    // Walk right onto the area.
    let right = InputSnapshot::default().with_down("RIGHT");
    for _ in 0..6 {
        world.tick_with(&right);
    }
    let globals_touches: i64 = world
        .engine
        .scripts
        .lua()
        .globals()
        .get("touches")
        .unwrap_or(0);
    assert_eq!(globals_touches, 1);

    // Stand still on it for a while: no re-trigger.
    for _ in 0..10 {
        world.tick();
    }
    let globals_touches: i64 = world
        .engine
        .scripts
        .lua()
        .globals()
        .get("touches")
        .unwrap_or(0);
    assert_eq!(globals_touches, 1);

    // Walk away until clear.
    let left = InputSnapshot::default().with_down("LEFT");
    for _ in 0..12 {
        world.tick_with(&left);
    }
    let leaves: i64 = world
        .engine
        .scripts
        .lua()
        .globals()
        .get("leaves")
        .unwrap_or(0);
    assert_eq!(leaves, 1);
}

/// The trigger script runs with the action button and the area faces the
/// player.
#[test]
fn test_area_trigger_script() {
    let mut world = TestEngine::new();
    {
        let mut game = world.engine.game.borrow_mut();
        let sign = game.map.new_object("sign");
        let object = game.map.get_object_mut(sign).unwrap();
        object.position = Vec2::new(40.0, 16.0);
        object.size = Vec2::new(16.0, 16.0);
        object.passthrough = true;
        object.trigger_script = "read = true".to_string();
    }
    let right = InputSnapshot::default().with_down("RIGHT");
    for _ in 0..4 {
        world.tick_with(&right);
    }
    let press = InputSnapshot::default().with_pressed("Z");
    world.tick_with(&press);

    let read: bool = world
        .engine
        .scripts
        .lua()
        .globals()
        .get("read")
        .unwrap_or(false);
    assert!(read);
}
