//! Script-driven command scheduling across full engine ticks: coroutines
//! await commands, resume in order, and survive other scripts failing.

mod common;

use common::TestEngine;
use glam::Vec2;
use wickengine::map::object::ScriptContext;
use wickengine::util::direction::Direction;

#[test]
fn test_move_to_then_face_resumes_after_arrival() {
    let mut world = TestEngine::new();
    world.engine.run_script(
        "player:move_to(100, 100):wait()\nplayer:face(UP)",
        ScriptContext::Map,
    );

    // While the move command is pending the face has not run.
    world.tick();
    assert_ne!(world.player_direction(), Direction::UP);

    let finished = world.tick_until(400, |engine| engine.scripts.task_count() == 0);
    assert!(finished, "script never completed");

    let position = world.player_position();
    assert!((position - Vec2::new(100.0, 100.0)).length() < 1.5);
    assert_eq!(world.player_direction(), Direction::UP);
}

#[test]
fn test_commands_from_one_script_run_in_submission_order() {
    let mut world = TestEngine::new();
    world.engine.run_script(
        "player:move(RIGHT, 32):wait()\nplayer:move(DOWN, 32):wait()\ndone = true",
        ScriptContext::Map,
    );
    let finished = world.tick_until(400, |engine| {
        engine
            .scripts
            .lua()
            .globals()
            .get::<bool>("done")
            .unwrap_or(false)
    });
    assert!(finished);
    let position = world.player_position();
    assert!((position - Vec2::new(48.0, 48.0)).length() < 0.01);
}

#[test]
fn test_wait_freezes_while_paused() {
    let mut world = TestEngine::new();
    world
        .engine
        .run_script("wait(200)\nwaited = true", ScriptContext::Map);

    // A few ticks in, pause and let the wall clock run far ahead.
    for _ in 0..3 {
        world.tick();
    }
    world.engine.game.borrow_mut().pause();
    for _ in 0..100 {
        world.tick();
    }
    let done: bool = world
        .engine
        .scripts
        .lua()
        .globals()
        .get("waited")
        .unwrap_or(false);
    assert!(!done, "wait() advanced while paused");

    world.engine.game.borrow_mut().resume();
    let finished = world.tick_until(100, |engine| {
        engine.scripts.lua().globals().get::<bool>("waited").unwrap_or(false)
    });
    assert!(finished);
}

#[test]
fn test_failing_script_leaves_others_running() {
    let mut world = TestEngine::new();
    world
        .engine
        .run_script("wait(50)\nerror('boom')", ScriptContext::Map);
    world
        .engine
        .run_script("wait(100)\nsurvivor = true", ScriptContext::Map);
    let finished = world.tick_until(100, |engine| {
        engine
            .scripts
            .lua()
            .globals()
            .get::<bool>("survivor")
            .unwrap_or(false)
    });
    assert!(finished);
}

#[test]
fn test_map_scripts_die_on_map_change_globals_survive() {
    let mut world = TestEngine::new();
    world.engine.run_script("wait(100000)", ScriptContext::Map);
    world.engine.run_script("wait(100000)", ScriptContext::Global);
    assert_eq!(world.engine.scripts.task_count(), 2);

    world.engine.scripts.drop_map_tasks();
    assert_eq!(world.engine.scripts.task_count(), 1);
}

#[test]
fn test_show_text_and_dismiss_with_action() {
    let mut world = TestEngine::new();
    world.engine.run_script(
        "text(player, 'Hello!'):wait()\nsaid = true",
        ScriptContext::Map,
    );
    world.tick();
    assert_eq!(world.engine.game.borrow().map.canvases().len(), 1);

    // Press the action button to dismiss.
    let snapshot = wickengine::input::InputSnapshot::default().with_pressed("Z");
    world.tick_with(&snapshot);
    let finished = world.tick_until(10, |engine| {
        engine.scripts.lua().globals().get::<bool>("said").unwrap_or(false)
    });
    assert!(finished);
    // The canvas is compacted away once the command drops it.
    assert!(world.engine.game.borrow().map.canvases().is_empty());
}

#[test]
fn test_choices_report_selection() {
    let mut world = TestEngine::new();
    world.engine.run_script(
        "local c = choices(player, 'Pick', {'Yes', 'No'})\nc:wait()\npicked = c:selected()",
        ScriptContext::Map,
    );
    world.tick();
    // Move the highlight down to "No", then confirm.
    let down = wickengine::input::InputSnapshot::default().with_pressed("DOWN");
    world.tick_with(&down);
    let confirm = wickengine::input::InputSnapshot::default().with_pressed("Z");
    world.tick_with(&confirm);
    let finished = world.tick_until(10, |engine| {
        engine
            .scripts
            .lua()
            .globals()
            .get::<Option<i64>>("picked")
            .ok()
            .flatten()
            .is_some()
    });
    assert!(finished);
    let picked: i64 = world.engine.scripts.lua().globals().get("picked").unwrap();
    assert_eq!(picked, 2); // 1-based in Lua
}

#[test]
fn test_game_save_and_load_roundtrip() {
    let dir = std::env::temp_dir().join("wickengine_test_save");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("slot1.json");
    std::fs::remove_file(&path).ok();

    let mut world = TestEngine::new();
    let script = format!(
        "game:save('{}', {{ gold = 42, name = 'Wick' }})\n\
         local data = game:load('{}')\n\
         loaded_gold = data.gold\n\
         loaded_name = data.name",
        path.display(),
        path.display()
    );
    world.engine.run_script(&script, ScriptContext::Global);
    world.tick();

    let globals = world.engine.scripts.lua().globals();
    assert_eq!(globals.get::<i64>("loaded_gold").unwrap(), 42);
    assert_eq!(globals.get::<String>("loaded_name").unwrap(), "Wick");

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_camera_tint_script() {
    let mut world = TestEngine::new();
    world.engine.run_script(
        "camera:tint_screen('80ff0000', 100):wait()\ntinted = true",
        ScriptContext::Map,
    );
    let finished = world.tick_until(50, |engine| {
        engine.scripts.lua().globals().get::<bool>("tinted").unwrap_or(false)
    });
    assert!(finished);
    let tint = world.engine.game.borrow().camera.tint_color;
    assert!((tint.r - 1.0).abs() < 0.01);
    assert!((tint.a - 128.0 / 255.0).abs() < 0.01);
}
