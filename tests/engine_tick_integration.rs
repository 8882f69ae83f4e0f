//! Whole-engine tick behaviour: input-driven movement, camera tracking,
//! pause semantics, sprite completion, and NPC schedules on a live map.

mod common;

use common::TestEngine;
use glam::Vec2;
use std::rc::Rc;
use wickengine::input::InputSnapshot;
use wickengine::npc::{Keypoint, KeypointCommand, Npc, Schedule};
use wickengine::sprite::data::{Frame, Pose, SpriteData};
use wickengine::sprite::Sprite;
use wickengine::util::direction::Direction;

#[test]
fn test_held_input_moves_player() {
    let mut world = TestEngine::new();
    let right = InputSnapshot::default().with_down("RIGHT");
    for _ in 0..5 {
        world.tick_with(&right);
    }
    assert_eq!(world.player_position(), Vec2::new(36.0, 16.0));
    assert_eq!(world.player_direction(), Direction::RIGHT);
}

#[test]
fn test_camera_tracks_player() {
    let mut world = TestEngine::new();
    let down = InputSnapshot::default().with_down("DOWN");
    for _ in 0..40 {
        world.tick_with(&down);
    }
    let game = world.engine.game.borrow();
    // 20x20 tiles of 16px = 320px; view is 320x240 so only y can move.
    let player_center = game
        .map
        .get_object(game.player_id.unwrap())
        .unwrap()
        .centered_position();
    let camera = game.camera.position();
    assert_eq!(camera.x, 0.0);
    assert!((camera.y - (player_center.y - 120.0)).abs() < 0.01);
}

#[test]
fn test_pause_button_toggles_and_freezes_clock() {
    let mut world = TestEngine::new();
    world.tick();
    let pause = InputSnapshot::default().with_pressed("P");
    world.tick_with(&pause);
    assert!(world.engine.game.borrow().is_paused());

    let before = world.engine.game.borrow().ticks();
    for _ in 0..10 {
        world.tick();
    }
    assert_eq!(world.engine.game.borrow().ticks(), before);

    let resume = InputSnapshot::default().with_pressed("P");
    world.tick_with(&resume);
    assert!(!world.engine.game.borrow().is_paused());
    world.tick();
    assert!(world.engine.game.borrow().ticks() > before);
}

#[test]
fn test_finite_pose_completes_and_stays_complete() {
    let mut world = TestEngine::new();
    let data = Rc::new(SpriteData {
        filename: "blink.xml".to_string(),
        image: Some("blink.png".to_string()),
        poses: vec![Pose {
            name: "BLINK".to_string(),
            repeats: 2,
            frames: vec![
                Frame {
                    duration: 30,
                    ..Frame::default()
                },
                Frame {
                    duration: 30,
                    ..Frame::default()
                },
            ],
            ..Pose::default()
        }],
        ..SpriteData::default()
    });
    {
        let mut game = world.engine.game.borrow_mut();
        let ticks = game.ticks();
        let player_id = game.player_id.unwrap();
        let player = game.map.get_object_mut(player_id).unwrap();
        player.set_sprite(Sprite::new(data, ticks), ticks);
        player.show_pose("BLINK", "", Direction::NONE, ticks);
    }
    let finished = world.tick_until(100, |engine| {
        let game = engine.game.borrow();
        let player = game.map.get_object(game.player_id.unwrap()).unwrap();
        player.sprite().map(|s| s.is_complete()).unwrap_or(false)
    });
    assert!(finished);
    // Completion sticks across further ticks.
    for _ in 0..10 {
        world.tick();
        let game = world.engine.game.borrow();
        let player = game.map.get_object(game.player_id.unwrap()).unwrap();
        assert!(player.sprite().unwrap().is_complete());
    }
}

#[test]
fn test_npc_keypoint_runs_activation_script_on_live_map() {
    let mut world = TestEngine::new();
    {
        let mut game = world.engine.game.borrow_mut();
        let mut npc = Npc::new("baker");
        npc.map_name = "test.tmx".to_string();
        npc.position = Vec2::new(64.0, 64.0);
        let mut keypoint = Keypoint::new("test.tmx", 0, Vec2::new(64.0, 64.0));
        keypoint.activation_script = "baked = true".to_string();
        keypoint.commands = vec![KeypointCommand::Face {
            direction: Direction::LEFT,
        }];
        npc.schedules.insert(
            "default".to_string(),
            Schedule {
                name: "default".to_string(),
                keypoints: vec![keypoint],
            },
        );
        npc.set_schedule("default");
        game.npcs.add(npc);
    }

    let finished = world.tick_until(20, |engine| {
        engine
            .scripts
            .lua()
            .globals()
            .get::<bool>("baked")
            .unwrap_or(false)
    });
    assert!(finished);

    let game = world.engine.game.borrow();
    let baker = game.map.get_object_by_name("baker").unwrap();
    assert_eq!(baker.direction, Direction::LEFT);
}

#[test]
fn test_quit_flag_from_script() {
    let mut world = TestEngine::new();
    world
        .engine
        .run_script("game:quit()", wickengine::map::object::ScriptContext::Global);
    assert!(world.engine.game.borrow().quit_requested);
}
