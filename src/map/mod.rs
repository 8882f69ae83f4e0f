//! The map: layers, tilesets, and the object table.
//!
//! The map is the unique owner of every [`MapObject`]; ids are assigned
//! monotonically and all cross-object relationships are ids resolved through
//! the table. Deleting an object always runs the reference sweep first so no
//! stale id survives.
//!
//! Collision semantics live here too: `passable` resolves tile, object, and
//! area collisions for a candidate move, and `move_object` implements the
//! slide/facing rules on top of it.

pub mod collision;
pub mod layer;
pub mod object;
pub mod pathfinder;
pub mod tileset;
pub mod tmx;

pub use collision::{CollisionCheck, CollisionRecord, CollisionType};
pub use layer::{ImageLayer, Layer, LayerKind, ObjectLayer, TileLayer};
pub use object::{MapObject, ObjectId};
pub use tileset::Tileset;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glam::Vec2;
use rustc_hash::FxHashMap;

use crate::audio::AudioPlayer;
use crate::canvas::Canvas;
use crate::sprite::SpriteUpdate;
use crate::util::direction::Direction;
use crate::util::rect::Rect;
use crate::util::{approx_eq, approx_zero};

/// Ordered string property bag, preserved for file round-tripping.
#[derive(Debug, Clone, Default)]
pub struct Properties(Vec<(String, String)>);

impl Properties {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.0.push((key.to_string(), value));
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Map {
    pub filename: String,
    width: i32,
    height: i32,
    tile_width: i32,
    tile_height: i32,
    pub layers: Vec<Layer>,
    objects: FxHashMap<ObjectId, MapObject>,
    /// Uppercased name → ids, in insertion order.
    name_to_ids: FxHashMap<String, Vec<ObjectId>>,
    pub tilesets: Vec<Tileset>,
    collision_layer_index: Option<usize>,
    collision_tileset_index: Option<usize>,
    /// Fallback object layer for objects added without one.
    default_object_layer: Option<usize>,
    canvases: Vec<Weak<RefCell<Canvas>>>,
    pub properties: Properties,
    next_object_id: ObjectId,
    /// Set whenever any object moves this tick.
    pub objects_moved: bool,
    /// Game ticks, refreshed by the owner each tick.
    ticks: i64,
    /// Proximity expansion for PROXIMITY queries, from config.
    pub proximity_distance: f32,
    /// Doorway tolerance for edge suggestions, from config.
    pub edge_tolerance_pixels: f32,
}

impl Map {
    pub fn new(width: i32, height: i32, tile_width: i32, tile_height: i32) -> Map {
        Map {
            filename: String::new(),
            width,
            height,
            tile_width,
            tile_height,
            layers: Vec::new(),
            objects: FxHashMap::default(),
            name_to_ids: FxHashMap::default(),
            tilesets: Vec::new(),
            collision_layer_index: None,
            collision_tileset_index: None,
            default_object_layer: None,
            canvases: Vec::new(),
            properties: Properties::default(),
            next_object_id: 1,
            objects_moved: false,
            ticks: 0,
            proximity_distance: 8.0,
            edge_tolerance_pixels: 8.0,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn tile_width(&self) -> i32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> i32 {
        self.tile_height
    }

    pub fn pixel_width(&self) -> f32 {
        (self.width * self.tile_width) as f32
    }

    pub fn pixel_height(&self) -> f32 {
        (self.height * self.tile_height) as f32
    }

    pub fn ticks(&self) -> i64 {
        self.ticks
    }

    pub fn set_ticks(&mut self, ticks: i64) {
        self.ticks = ticks;
    }

    // ==================== Layers ====================

    /// Append a layer; collision and default object layers are recognized on
    /// the way in.
    pub fn add_layer(&mut self, layer: Layer) -> usize {
        let index = self.layers.len();
        let is_collision = layer.name.eq_ignore_ascii_case("collision");
        let is_objects = layer.name.eq_ignore_ascii_case("objects");
        match &layer.kind {
            LayerKind::Tile(_) if is_collision => self.collision_layer_index = Some(index),
            LayerKind::Object(_) => {
                if is_objects || self.default_object_layer.is_none() {
                    self.default_object_layer = Some(index);
                }
            }
            _ => {}
        }
        self.layers.push(layer);
        index
    }

    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers
            .iter()
            .position(|l| l.name.eq_ignore_ascii_case(name))
    }

    pub fn get_layer(&self, name: &str) -> Option<&Layer> {
        self.layer_index(name).map(|i| &self.layers[i])
    }

    pub fn get_layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layer_index(name).map(move |i| &mut self.layers[i])
    }

    pub fn collision_layer(&self) -> Option<&Layer> {
        self.collision_layer_index.map(|i| &self.layers[i])
    }

    pub fn set_collision_layer(&mut self, index: usize) {
        self.collision_layer_index = Some(index);
    }

    pub fn add_tileset(&mut self, tileset: Tileset) {
        if tileset.name.eq_ignore_ascii_case("collision") {
            self.collision_tileset_index = Some(self.tilesets.len());
        }
        self.tilesets.push(tileset);
    }

    pub fn collision_tileset(&self) -> Option<&Tileset> {
        self.collision_tileset_index.map(|i| &self.tilesets[i])
    }

    /// Tileset that owns a gid, searching from the highest first id down.
    pub fn tileset_for_gid(&self, gid: u32) -> Option<&Tileset> {
        self.tilesets
            .iter()
            .filter(|t| t.first_id <= gid)
            .max_by_key(|t| t.first_id)
    }

    // ==================== Objects ====================

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Create an empty object on the default object layer.
    pub fn new_object(&mut self, name: &str) -> ObjectId {
        let id = self.next_object_id;
        let object = MapObject::new(id, name);
        self.add_object(object, None)
    }

    /// Insert an object. An id of 0 (or a clash) gets the next free id.
    /// Without a layer the object lands on the default object layer.
    pub fn add_object(&mut self, object: MapObject, layer: Option<usize>) -> ObjectId {
        let mut object = object;
        let mut id = object.id();
        if id <= 0 || self.objects.contains_key(&id) {
            id = self.next_object_id;
            object.set_id(id);
        }
        self.next_object_id = self.next_object_id.max(id + 1);

        let layer_index = layer.or(self.default_object_layer);
        object.layer_index = layer_index;
        if let Some(layer_index) = layer_index
            && let Some(object_layer) = self
                .layers
                .get_mut(layer_index)
                .and_then(Layer::as_object_mut)
        {
            object_layer.object_ids.push(id);
        }

        self.name_to_ids
            .entry(object.name().to_string())
            .or_default()
            .push(id);
        self.objects.insert(id, object);
        id
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&MapObject> {
        self.objects.get(&id)
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut MapObject> {
        self.objects.get_mut(&id)
    }

    /// First object with the given (case-insensitive) name.
    pub fn get_object_by_name(&self, name: &str) -> Option<&MapObject> {
        let ids = self.name_to_ids.get(&name.to_uppercase())?;
        ids.first().and_then(|id| self.objects.get(id))
    }

    pub fn object_id_by_name(&self, name: &str) -> Option<ObjectId> {
        self.name_to_ids
            .get(&name.to_uppercase())?
            .first()
            .copied()
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn objects(&self) -> impl Iterator<Item = &MapObject> {
        self.objects.values()
    }

    /// Keep an object's name-table entry in sync after a rename.
    pub fn rename_object(&mut self, id: ObjectId, new_name: &str) {
        let Some(object) = self.objects.get_mut(&id) else {
            return;
        };
        let old_name = object.name().to_string();
        object.set_name(new_name);
        let new_name = object.name().to_string();
        self.remove_name_entry(&old_name, id);
        self.name_to_ids.entry(new_name).or_default().push(id);
    }

    fn remove_name_entry(&mut self, name: &str, id: ObjectId) {
        let emptied = match self.name_to_ids.get_mut(name) {
            Some(ids) => {
                ids.retain(|&other| other != id);
                ids.is_empty()
            }
            None => false,
        };
        if emptied {
            self.name_to_ids.remove(name);
        }
    }

    /// Clear every stale id reference to an object about to be deleted.
    /// Callers outside the map (player slots, NPC links) run their own sweep.
    pub fn erase_object_references(&mut self, id: ObjectId) {
        for object in self.objects.values_mut() {
            object.linked_objects.retain(|&linked| linked != id);
            if object.collision_area_id == Some(id) {
                object.collision_area_id = None;
            }
            if object.triggered_object_id == Some(id) {
                object.triggered_object_id = None;
            }
            if object.outlined_object_id == Some(id) {
                object.outlined_object_id = None;
            }
            if object.outlining_object_id == Some(id) {
                object.outlining_object_id = None;
            }
        }
    }

    /// Delete an object, sweeping references first.
    pub fn delete_object(&mut self, id: ObjectId) {
        self.erase_object_references(id);
        let Some(object) = self.objects.remove(&id) else {
            return;
        };
        let name = object.name().to_string();
        self.remove_name_entry(&name, id);
        if let Some(layer_index) = object.layer_index
            && let Some(object_layer) = self
                .layers
                .get_mut(layer_index)
                .and_then(Layer::as_object_mut)
        {
            object_layer.object_ids.retain(|&other| other != id);
        }
    }

    // ==================== Collision ====================

    /// Is the tile at (x, y) passable for tile collision purposes?
    pub fn tile_passable(&self, x: i32, y: i32) -> bool {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return false;
        }
        !self.tile_blocked(x, y)
    }

    fn tile_blocked(&self, x: i32, y: i32) -> bool {
        let (Some(layer_index), Some(tileset_index)) =
            (self.collision_layer_index, self.collision_tileset_index)
        else {
            return false;
        };
        let Some(tile_layer) = self.layers[layer_index].as_tile() else {
            return false;
        };
        let gid = tile_layer.tile_at(x, y, self.width);
        let first_id = self.tilesets[tileset_index].first_id;
        // The first two tiles of the collision tileset mean passable.
        gid >= first_id && gid - first_id >= 2
    }

    pub fn passable(
        &self,
        object: &MapObject,
        dir: Direction,
        check: CollisionCheck,
    ) -> CollisionRecord {
        self.passable_at(object, dir, object.position, object.speed, check)
    }

    /// Full passability query at an explicit position and step size.
    pub fn passable_at(
        &self,
        object: &MapObject,
        dir: Direction,
        position: Vec2,
        speed: f32,
        check: CollisionCheck,
    ) -> CollisionRecord {
        let mut result = CollisionRecord::new(CollisionType::None);
        result.this_object = Some(object.id());

        if object.initiates_passthrough() {
            return result;
        }
        let bounding_box = object.bounding_box();
        if bounding_box.w < 1.0 || bounding_box.h < 1.0 {
            return result;
        }

        let dir = dir.cardinal();
        let change = dir.to_vector() * speed;
        let this_box = Rect::new(
            position.x + change.x + bounding_box.x,
            position.y + change.y + bounding_box.y,
            bounding_box.w,
            bounding_box.h,
        );

        let mut check_tile = check.contains(CollisionCheck::TILE);

        if check.contains(CollisionCheck::OBJECT) {
            let probe_box = if check.contains(CollisionCheck::PROXIMITY) {
                this_box.expanded(self.proximity_distance)
            } else {
                this_box
            };
            for other_id in self.object_ids() {
                let other = &self.objects[&other_id];
                let other_box = other.world_bounding_box();
                if other_box.w < 1.0 || other_box.h < 1.0 {
                    continue;
                }
                let intersects = match other.world_bounding_circle() {
                    Some(circle) => circle.intersects_rect(&probe_box),
                    None => probe_box.intersects(&other_box),
                };

                let visible = other.is_visible();
                let passthrough = other.receives_passthrough();
                // A visible passthrough object may switch off tile collision
                // under whatever overlaps it.
                if other.override_tile_collision && visible && passthrough && intersects {
                    check_tile = false;
                }

                let is_area = other.is_area();
                if other_id == object.id() || !visible || (passthrough && !is_area) {
                    continue;
                }
                if !intersects {
                    continue;
                }

                if is_area {
                    if result.collision_type == CollisionType::None {
                        result.collision_type = CollisionType::Area;
                    }
                    if result.other_area.is_none() {
                        result.other_area = Some(other_id);
                    }
                    result
                        .other_areas
                        .insert(other.name().to_string(), other_id);
                } else {
                    result.collision_type = CollisionType::Object;
                    // Prefer objects with scripts.
                    if result.other_object.is_none() || other.has_any_script() {
                        result.other_object = Some(other_id);
                    }
                    result
                        .other_objects
                        .insert(other.name().to_string(), other_id);
                    check_tile = false;
                }
            }
        }

        if check_tile {
            self.check_tiles(dir, &this_box, &mut result);
        }

        result
    }

    fn check_tiles(&self, dir: Direction, this_box: &Rect, result: &mut CollisionRecord) {
        let tile_w = self.tile_width as f32;
        let tile_h = self.tile_height as f32;
        // Minimum bounds before small negatives truncate to 0.
        if this_box.x < 0.0 || this_box.y < 0.0 {
            result.collision_type = CollisionType::Tile;
            return;
        }
        let min_x = (this_box.x / tile_w) as i32;
        let min_y = (this_box.y / tile_h) as i32;
        let max_x = ((this_box.x + this_box.w - 1.0) / tile_w) as i32;
        let max_y = ((this_box.y + this_box.h - 1.0) / tile_h) as i32;

        let mut any_blocked = false;
        let mut all_top = true;
        let mut all_bottom = true;
        let mut all_left = true;
        let mut all_right = true;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if x >= self.width || y >= self.height {
                    result.collision_type = CollisionType::Tile;
                    return;
                }
                if !self.tile_blocked(x, y) {
                    continue;
                }
                any_blocked = true;
                all_top &= y == min_y;
                all_bottom &= y == max_y;
                all_left &= x == min_x;
                all_right &= x == max_x;
            }
        }
        if !any_blocked {
            return;
        }
        result.collision_type = CollisionType::Tile;
        result.edge_direction = self.edge_suggestion(
            dir, this_box, min_x, max_x, min_y, max_y, all_top, all_bottom, all_left, all_right,
        );
    }

    /// Doorway hint: when a single-axis move is blocked only at one edge of
    /// the box, and the overlap into that edge is within tolerance, suggest
    /// sliding off it. The caller treats this as advisory.
    #[allow(clippy::too_many_arguments)]
    fn edge_suggestion(
        &self,
        dir: Direction,
        this_box: &Rect,
        min_x: i32,
        max_x: i32,
        min_y: i32,
        max_y: i32,
        all_top: bool,
        all_bottom: bool,
        all_left: bool,
        all_right: bool,
    ) -> Direction {
        let tile_w = self.tile_width as f32;
        let tile_h = self.tile_height as f32;
        let tolerance = self.edge_tolerance_pixels;
        let horizontal = dir.cardinal() & (Direction::LEFT | Direction::RIGHT) != Direction::NONE;
        let vertical = dir.cardinal() & (Direction::UP | Direction::DOWN) != Direction::NONE;

        if horizontal && !vertical && max_y > min_y {
            let top_overlap = (min_y + 1) as f32 * tile_h - this_box.y;
            if all_top && top_overlap <= tolerance {
                return Direction::DOWN;
            }
            let bottom_overlap = this_box.bottom() - max_y as f32 * tile_h;
            if all_bottom && bottom_overlap <= tolerance {
                return Direction::UP;
            }
        } else if vertical && !horizontal && max_x > min_x {
            let left_overlap = (min_x + 1) as f32 * tile_w - this_box.x;
            if all_left && left_overlap <= tolerance {
                return Direction::RIGHT;
            }
            let right_overlap = this_box.right() - max_x as f32 * tile_w;
            if all_right && right_overlap <= tolerance {
                return Direction::LEFT;
            }
        }
        Direction::NONE
    }

    // ==================== Movement ====================

    /// Move an object per the collision rules, propagating to its linked
    /// objects one level deep.
    pub fn move_object(
        &mut self,
        id: ObjectId,
        dir: Direction,
        pixels: f32,
        check: CollisionCheck,
        change_facing: bool,
        animated: bool,
    ) -> CollisionRecord {
        self.move_object_impl(id, dir, pixels, check, change_facing, animated, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn move_object_impl(
        &mut self,
        id: ObjectId,
        dir: Direction,
        pixels: f32,
        check: CollisionCheck,
        change_facing: bool,
        animated: bool,
        propagate: bool,
    ) -> CollisionRecord {
        // Take the object out of the table while moving it so passability
        // queries see everyone else.
        let Some(mut object) = self.objects.remove(&id) else {
            return CollisionRecord::no_move();
        };
        let record = self.perform_move(&mut object, dir, pixels, check, change_facing, animated);
        let linked = if propagate {
            object.linked_objects.clone()
        } else {
            Vec::new()
        };
        self.objects.insert(id, object);
        for linked_id in linked {
            if linked_id != id {
                self.move_object_impl(
                    linked_id,
                    dir,
                    pixels,
                    check,
                    change_facing,
                    animated,
                    false,
                );
            }
        }
        record
    }

    fn perform_move(
        &mut self,
        object: &mut MapObject,
        dir: Direction,
        pixels: f32,
        mut check: CollisionCheck,
        change_facing: bool,
        animated: bool,
    ) -> CollisionRecord {
        let ticks = self.ticks;
        let mut move_dir = dir.resolve(object.direction);
        let movement_vector = move_dir.to_vector();
        let mut change = movement_vector * pixels;
        let x_changed = !approx_zero(change.x);
        let y_changed = !approx_zero(change.y);
        let multiple_directions = x_changed && y_changed;
        let movement = x_changed || y_changed;

        if !movement {
            let face_state = object.face_state.clone();
            object.update_state(&face_state, ticks);
            // No need for tile checks, but object checks may still trigger
            // scripts.
            if check.contains(CollisionCheck::OBJECT) {
                check &= !CollisionCheck::TILE;
            } else {
                let mut record = CollisionRecord::no_move();
                record.this_object = Some(object.id());
                return record;
            }
        }

        let query_dir = if movement { move_dir } else { object.direction };
        let mut record = self.passable_at(object, query_dir, object.position, pixels, check);

        // Suggested direction from the tile pass (doorway correction).
        let mut corrected_dir = Direction::NONE;
        if record.edge_direction != Direction::NONE
            && movement
            && !multiple_directions
            && !record.passable()
        {
            let edge_vector = record.edge_direction.to_vector();
            let candidate = Direction::from_vector(movement_vector + edge_vector);
            if candidate != Direction::NONE {
                let corrected = self.passable_at(object, candidate, object.position, pixels, check);
                if corrected.passable() {
                    change = candidate.to_vector() * pixels;
                    corrected_dir = candidate;
                    record = corrected;
                } else {
                    // Too deep for the diagonal; slide along the edge alone
                    // until the doorway lines up.
                    let edge_dir = record.edge_direction;
                    let slide = self.passable_at(object, edge_dir, object.position, pixels, check);
                    if slide.passable() {
                        change = edge_vector * pixels;
                        corrected_dir = edge_dir;
                        record = slide;
                    }
                }
            }
        }

        let mut moved = false;
        let mut suppress_facing = false;
        if record.passable() {
            if movement {
                object.position += change;
                moved = true;
            }
        } else if multiple_directions && !object.strict_multidirectional_movement {
            // Sliding around a curved surface should not flip facing back
            // and forth.
            suppress_facing = record
                .other_object
                .and_then(|other| self.objects.get(&other))
                .map(|other| other.bounding_circle().is_some())
                .unwrap_or(false);

            let vertical = move_dir & (Direction::UP | Direction::DOWN);
            let slide = self.passable_at(object, vertical, object.position, pixels, check);
            if slide.passable() {
                change.x = 0.0;
                record = slide;
            } else {
                let horizontal = move_dir & (Direction::LEFT | Direction::RIGHT);
                let slide = self.passable_at(object, horizontal, object.position, pixels, check);
                if slide.passable() {
                    change.y = 0.0;
                    record = slide;
                }
            }
            if record.passable() {
                object.position += change;
                move_dir = Direction::from_vector(change);
                moved = true;
            }
        }

        if !moved {
            if movement && change_facing {
                object.direction = move_dir.cardinal();
            }
            let face_state = object.face_state.clone();
            object.update_state(&face_state, ticks);
            return record;
        }

        if movement {
            if change_facing && !suppress_facing {
                if corrected_dir != Direction::NONE {
                    object.direction = move_dir.cardinal();
                } else if object.is_eight_directional() {
                    object.direction = Direction::from_vector(change);
                } else if approx_eq(change.y, -pixels) {
                    object.direction = Direction::UP;
                } else if approx_eq(change.y, pixels) {
                    object.direction = Direction::DOWN;
                } else if approx_eq(change.x, -pixels) {
                    object.direction = Direction::LEFT;
                } else if approx_eq(change.x, pixels) {
                    object.direction = Direction::RIGHT;
                } else {
                    object.direction = move_dir.cardinal();
                    let face_state = object.face_state.clone();
                    object.update_state(&face_state, ticks);
                    return record;
                }
            }
            if animated {
                let walk_state = object.walk_state.clone();
                object.update_state(&walk_state, ticks);
            }
            self.objects_moved = true;
        }
        record
    }

    // ==================== Canvases ====================

    /// The map holds canvases weakly; scripts own them.
    pub fn register_canvas(&mut self, canvas: &Rc<RefCell<Canvas>>) {
        self.canvases.push(Rc::downgrade(canvas));
    }

    /// Live canvases sorted by priority.
    pub fn canvases(&self) -> Vec<Rc<RefCell<Canvas>>> {
        let mut live: Vec<Rc<RefCell<Canvas>>> =
            self.canvases.iter().filter_map(Weak::upgrade).collect();
        live.sort_by_key(|canvas| canvas.borrow().priority);
        live
    }

    // ==================== Update ====================

    /// Per-tick map update: layers scroll/animate, object sprites advance,
    /// and the dead canvas entries are compacted away.
    pub fn update(
        &mut self,
        ticks: i64,
        frame_seconds: f32,
        mut audio: Option<&mut AudioPlayer>,
        player_position: Option<Vec2>,
    ) {
        self.ticks = ticks;
        self.objects_moved = false;

        for layer in &mut self.layers {
            layer.update(ticks, frame_seconds);
        }

        for object in self.objects.values_mut() {
            if !object.is_visible() {
                continue;
            }
            let position = object.centered_position();
            let attenuate = object.sound_attenuation_enabled;
            if let Some(sprite) = object.sprite_mut() {
                if attenuate
                    && let (Some(audio), Some(listener)) = (audio.as_deref_mut(), player_position)
                {
                    sprite.update_sound_attenuation(audio, position, listener);
                }
                let ctx = SpriteUpdate {
                    ticks,
                    audio: audio.as_deref_mut(),
                    position: if attenuate { Some(position) } else { None },
                    listener: if attenuate { player_position } else { None },
                };
                sprite.update(ctx);
            }
        }

        self.canvases.retain(|weak| weak.strong_count() > 0);
    }
}
