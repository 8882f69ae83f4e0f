//! Shared helpers for integration tests: a headless engine on a small
//! in-memory map, plus input shorthand.

use glam::Vec2;
use wickengine::config::Config;
use wickengine::game::{Engine, Game};
use wickengine::input::InputSnapshot;
use wickengine::map::layer::{Layer, LayerKind, ObjectLayer, TileLayer};
use wickengine::map::{Map, ObjectId, Tileset};
use wickengine::util::direction::Direction;

pub const TILE: i32 = 16;

/// An open map with a collision tileset/layer and an object layer.
pub fn open_map(width: i32, height: i32) -> Map {
    let mut map = Map::new(width, height, TILE, TILE);
    map.filename = "test.tmx".to_string();
    map.add_tileset(Tileset {
        first_id: 1,
        name: "collision".to_string(),
        tile_width: TILE,
        tile_height: TILE,
        image_width: 64,
        image_height: 16,
        ..Tileset::default()
    });
    map.add_layer(Layer::new(
        "collision",
        width,
        height,
        LayerKind::Tile(TileLayer {
            tiles: vec![1; (width * height) as usize],
        }),
    ));
    map.add_layer(Layer::new(
        "objects",
        width,
        height,
        LayerKind::Object(ObjectLayer::default()),
    ));
    map
}

/// Block the collision tile at (x, y).
pub fn block_tile(map: &mut Map, x: i32, y: i32) {
    let width = map.width();
    let index = map.layer_index("collision").unwrap();
    if let LayerKind::Tile(tiles) = &mut map.layers[index].kind {
        tiles.tiles[(x + y * width) as usize] = 3;
    }
}

pub struct TestEngine {
    pub engine: Engine,
    pub ticks: i64,
}

impl TestEngine {
    /// Headless engine with a 20x20 open map and a player at (16, 16).
    pub fn new() -> TestEngine {
        Self::with_map(open_map(20, 20))
    }

    pub fn with_map(map: Map) -> TestEngine {
        let mut game = Game::new(Config::new());
        game.map = map;
        let mut engine = Engine::new(game).expect("script runtime");
        {
            let mut game = engine.game.borrow_mut();
            let id = game
                .spawn_player(Vec2::new(16.0, 16.0), Direction::DOWN)
                .expect("player");
            game.map.get_object_mut(id).unwrap().speed = 4.0;
        }
        engine.scripts.refresh_player_global();
        TestEngine { engine, ticks: 0 }
    }

    pub fn player_id(&self) -> ObjectId {
        self.engine.game.borrow().player_id.expect("player id")
    }

    /// Advance one 16 ms logic tick with no input.
    pub fn tick(&mut self) {
        self.tick_with(&InputSnapshot::default());
    }

    pub fn tick_with(&mut self, snapshot: &InputSnapshot) {
        self.ticks += 16;
        self.engine.update(snapshot, self.ticks);
    }

    /// Run ticks until the predicate holds or the limit is reached.
    pub fn tick_until(&mut self, limit: usize, mut done: impl FnMut(&Engine) -> bool) -> bool {
        for _ in 0..limit {
            self.tick();
            if done(&self.engine) {
                return true;
            }
        }
        false
    }

    pub fn player_position(&self) -> Vec2 {
        let game = self.engine.game.borrow();
        game.map.get_object(game.player_id.unwrap()).unwrap().position
    }

    pub fn player_direction(&self) -> Direction {
        let game = self.engine.game.borrow();
        game.map
            .get_object(game.player_id.unwrap())
            .unwrap()
            .direction
    }
}
