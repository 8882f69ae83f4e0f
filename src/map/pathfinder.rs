//! Tile-level A* on top of the collision engine.
//!
//! Transitions are tested with the real passability query (so doorways and
//! object collisions are honoured), the heuristic is Chebyshev distance with
//! a +1 penalty on diagonal heading changes to discourage zig-zagging, and
//! the best-seen node is tracked so `get_close` can settle for the nearest
//! reachable tile when the goal is walled off.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use glam::IVec2;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::map::collision::CollisionCheck;
use crate::map::{Map, ObjectId};
use crate::util::direction::Direction;

/// Result of a pathfinding run.
#[derive(Debug, Default)]
pub struct Path {
    found: bool,
    /// Steps from the start tile to the goal.
    pub directions: VecDeque<Direction>,
    /// The goal actually pathed to (the nearest tile under `get_close`).
    pub goal: IVec2,
    /// Best-seen tile: smallest heuristic distance to the goal.
    pub nearest: IVec2,
    /// Closed tiles, for debug visualisation.
    pub visited: Vec<IVec2>,
}

impl Path {
    pub fn is_found(&self) -> bool {
        self.found
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    cost: i32,
    h: i32,
    tile: IVec2,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the lowest cost pops first.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| (other.tile.x, other.tile.y).cmp(&(self.tile.x, self.tile.y)))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
struct NodeRecord {
    g: i32,
    parent: Option<IVec2>,
    step: Direction,
}

fn chebyshev(a: IVec2, b: IVec2) -> i32 {
    (a.x - b.x).abs().max((a.y - b.y).abs())
}

const STEPS: [Direction; 8] = [
    Direction::UP,
    Direction::RIGHT,
    Direction::DOWN,
    Direction::LEFT,
    Direction::UP.union(Direction::RIGHT),
    Direction::DOWN.union(Direction::RIGHT),
    Direction::DOWN.union(Direction::LEFT),
    Direction::UP.union(Direction::LEFT),
];

/// Tile coordinate of a pixel position.
pub fn tile_of(map: &Map, position: glam::Vec2) -> IVec2 {
    IVec2::new(
        (position.x / map.tile_width() as f32).floor() as i32,
        (position.y / map.tile_height() as f32).floor() as i32,
    )
}

/// Find a path for `object_id` from its current tile to `dest`.
///
/// With `get_close`, an unreachable goal is replaced by the best-seen tile
/// (smallest heuristic) and the search reruns against it.
pub fn find_path(
    map: &Map,
    object_id: ObjectId,
    dest: IVec2,
    check: CollisionCheck,
    get_close: bool,
) -> Path {
    let Some(object) = map.get_object(object_id) else {
        return Path::default();
    };
    let start = tile_of(map, object.position);

    let mut path = search(map, object_id, start, dest, check);
    if !path.is_found() && get_close {
        let nearest = path.nearest;
        if nearest != dest && nearest != start {
            path = search(map, object_id, start, nearest, check);
        }
    }
    path
}

fn search(map: &Map, object_id: ObjectId, start: IVec2, goal: IVec2, check: CollisionCheck) -> Path {
    let object = match map.get_object(object_id) {
        Some(object) => object,
        None => return Path::default(),
    };
    let tile_size = map.tile_width() as f32;

    let mut open = BinaryHeap::new();
    let mut records: FxHashMap<IVec2, NodeRecord> = FxHashMap::default();
    let mut closed: FxHashMap<IVec2, NodeRecord> = FxHashMap::default();

    records.insert(
        start,
        NodeRecord {
            g: 0,
            parent: None,
            step: Direction::NONE,
        },
    );
    open.push(HeapEntry {
        cost: chebyshev(start, goal),
        h: chebyshev(start, goal),
        tile: start,
    });

    let mut found = false;
    let mut nearest = start;
    let mut nearest_h = chebyshev(start, goal);
    while let Some(entry) = open.pop() {
        let tile = entry.tile;
        if closed.contains_key(&tile) {
            continue;
        }
        let record = records[&tile];
        closed.insert(tile, record);
        let tile_h = chebyshev(tile, goal);
        if tile_h < nearest_h {
            nearest = tile;
            nearest_h = tile_h;
        }
        if tile == goal {
            found = true;
            break;
        }

        let position = glam::Vec2::new(
            (tile.x * map.tile_width()) as f32,
            (tile.y * map.tile_height()) as f32,
        );
        let neighbours: SmallVec<[(Direction, IVec2); 8]> = STEPS
            .iter()
            .map(|&step| (step, tile + IVec2::new(step.to_vector().x as i32, step.to_vector().y as i32)))
            .collect();
        for (step, neighbour) in neighbours {
            if neighbour.x < 0
                || neighbour.y < 0
                || neighbour.x >= map.width()
                || neighbour.y >= map.height()
                || closed.contains_key(&neighbour)
            {
                continue;
            }
            // Test the actual transition so object and doorway collisions
            // are honoured.
            if !map
                .passable_at(object, step, position, tile_size, check)
                .passable()
            {
                continue;
            }
            let g = record.g + 1;
            let mut h = chebyshev(neighbour, goal);
            // Penalise diagonal heading changes.
            if step.is_diagonal() && record.step != step {
                h += 1;
            }
            let better = records.get(&neighbour).map(|r| g < r.g).unwrap_or(true);
            if better {
                records.insert(
                    neighbour,
                    NodeRecord {
                        g,
                        parent: Some(tile),
                        step,
                    },
                );
                open.push(HeapEntry {
                    cost: g + h,
                    h,
                    tile: neighbour,
                });
            }
        }
    }

    let mut path = Path {
        found,
        directions: VecDeque::new(),
        goal,
        nearest,
        visited: closed.keys().copied().collect(),
    };
    path.visited.sort_by_key(|t| (t.y, t.x));

    if found {
        let mut tile = goal;
        while let Some(record) = closed.get(&tile) {
            let Some(parent) = record.parent else { break };
            path.directions.push_front(record.step);
            tile = parent;
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::layer::{LayerKind, ObjectLayer, TileLayer};
    use crate::map::{Layer, Tileset};
    use glam::Vec2;

    fn open_map(width: i32, height: i32) -> Map {
        let mut map = Map::new(width, height, 16, 16);
        map.add_tileset(Tileset {
            first_id: 1,
            name: "collision".to_string(),
            tile_width: 16,
            tile_height: 16,
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

    fn block(map: &mut Map, x: i32, y: i32) {
        let width = map.width();
        let index = map.layer_index("collision").unwrap();
        if let LayerKind::Tile(tiles) = &mut map.layers[index].kind {
            tiles.tiles[(x + y * width) as usize] = 3;
        }
    }

    fn walker(map: &mut Map, x: i32, y: i32) -> ObjectId {
        let id = map.new_object("walker");
        let object = map.get_object_mut(id).unwrap();
        object.position = Vec2::new((x * 16) as f32, (y * 16) as f32);
        object.size = Vec2::new(16.0, 16.0);
        id
    }

    fn walk(start: IVec2, path: &Path) -> IVec2 {
        let mut tile = start;
        for dir in &path.directions {
            let v = dir.to_vector();
            tile += IVec2::new(v.x as i32, v.y as i32);
        }
        tile
    }

    #[test]
    fn test_straight_path() {
        let mut map = open_map(10, 10);
        let id = walker(&mut map, 1, 5);
        let path = find_path(&map, id, IVec2::new(4, 5), CollisionCheck::BOTH, false);
        assert!(path.is_found());
        assert_eq!(path.directions.len(), 3);
        assert!(path.directions.iter().all(|&d| d == Direction::RIGHT));
    }

    #[test]
    fn test_path_through_gap() {
        let mut map = open_map(10, 10);
        for y in 0..10 {
            if y != 5 {
                block(&mut map, 4, y);
            }
        }
        let id = walker(&mut map, 1, 5);
        let path = find_path(&map, id, IVec2::new(8, 5), CollisionCheck::BOTH, false);
        assert!(path.is_found());
        // Optimal route goes straight through the (4, 5) gap.
        assert_eq!(path.directions.len(), 7);
        let mut tile = IVec2::new(1, 5);
        let mut through_gap = false;
        for dir in &path.directions {
            let v = dir.to_vector();
            tile += IVec2::new(v.x as i32, v.y as i32);
            if tile == IVec2::new(4, 5) {
                through_gap = true;
            }
        }
        assert!(through_gap);
        assert_eq!(tile, IVec2::new(8, 5));
    }

    #[test]
    fn test_no_path_when_walled_off() {
        let mut map = open_map(10, 10);
        for y in 0..10 {
            block(&mut map, 4, y);
        }
        let id = walker(&mut map, 1, 5);
        let path = find_path(&map, id, IVec2::new(8, 5), CollisionCheck::BOTH, false);
        assert!(!path.is_found());
        assert!(path.directions.is_empty());
    }

    #[test]
    fn test_get_close_stops_at_wall() {
        let mut map = open_map(10, 10);
        for y in 0..10 {
            block(&mut map, 4, y);
        }
        let id = walker(&mut map, 1, 5);
        let path = find_path(&map, id, IVec2::new(8, 5), CollisionCheck::BOTH, true);
        assert!(path.is_found());
        // Ends adjacent to the wall, as close as reachable.
        let end = walk(IVec2::new(1, 5), &path);
        assert_eq!(end.x, 3);
        assert_eq!(path.goal.x, 3);
    }

    #[test]
    fn test_path_around_obstacle_detours() {
        let mut map = open_map(10, 10);
        // Wall with the gap at the top.
        for y in 1..10 {
            block(&mut map, 4, y);
        }
        let id = walker(&mut map, 1, 5);
        let path = find_path(&map, id, IVec2::new(8, 5), CollisionCheck::BOTH, false);
        assert!(path.is_found());
        let end = walk(IVec2::new(1, 5), &path);
        assert_eq!(end, IVec2::new(8, 5));
        // Must detour: longer than the unobstructed Chebyshev distance.
        assert!(path.directions.len() > 7);
        assert!(path.directions.iter().any(|d| d.contains(Direction::UP)));
    }

    #[test]
    fn test_object_blocks_path() {
        let mut map = open_map(10, 10);
        let id = walker(&mut map, 1, 5);
        // A solid object fence on column 4.
        for y in 0..10 {
            let fence = map.new_object("fence");
            let object = map.get_object_mut(fence).unwrap();
            object.position = Vec2::new(64.0, (y * 16) as f32);
            object.size = Vec2::new(16.0, 16.0);
        }
        let path = find_path(&map, id, IVec2::new(8, 5), CollisionCheck::BOTH, false);
        assert!(!path.is_found());
    }
}
