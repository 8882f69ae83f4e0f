//! Positioned map entities.
//!
//! A `MapObject` is owned exclusively by its map's id → object table; every
//! cross-object relationship (linked objects, collision areas, outline
//! chains, triggered objects) is stored as an id resolved through that table
//! and cleared by the map's reference sweep when an object is deleted.

use bitflags::bitflags;
use glam::Vec2;

use crate::map::Properties;
use crate::sprite::{Sprite, SpriteHolder};
use crate::util::color::Color;
use crate::util::direction::Direction;
use crate::util::rect::{Circle, Rect};

pub type ObjectId = i32;

/// Which scripting interface an object's scripts run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptContext {
    #[default]
    Map,
    Global,
}

/// Role an object plays in passthrough checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassthroughType {
    Initiator,
    Receiver,
    #[default]
    Both,
}

impl PassthroughType {
    pub fn initiates(self) -> bool {
        matches!(self, PassthroughType::Initiator | PassthroughType::Both)
    }

    pub fn receives(self) -> bool {
        matches!(self, PassthroughType::Receiver | PassthroughType::Both)
    }
}

/// Where the object draws relative to its layer's sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawOrder {
    Below,
    #[default]
    Normal,
    Above,
}

bitflags! {
    /// When an object is drawn with an outline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutlineConditions: u32 {
        const NEVER = 1;
        const TOUCHED = 2;
        const PROXIMATE = 4;
        const SOLID = 8;
        const SCRIPT = 16;
    }
}

impl Default for OutlineConditions {
    fn default() -> Self {
        OutlineConditions::TOUCHED | OutlineConditions::SOLID | OutlineConditions::SCRIPT
    }
}

#[derive(Debug)]
pub struct MapObject {
    id: ObjectId,
    /// Uppercased.
    name: String,
    pub object_type: String,
    pub position: Vec2,
    pub size: Vec2,
    pub color: Color,
    pub magnification: Vec2,
    /// Tile gid for tile-based objects, 0 otherwise.
    pub gid: u32,
    pub opacity: f32,
    visible: bool,
    disabled: bool,
    pub stopped: bool,
    pub frozen: bool,
    pub passthrough: bool,
    pub passthrough_type: PassthroughType,
    pub override_tile_collision: bool,
    pub strict_multidirectional_movement: bool,
    pub use_layer_color: bool,
    pub sound_attenuation_enabled: bool,
    pub direction: Direction,
    /// Current animation state, uppercased (e.g. "FACE", "WALK").
    state: String,
    pub face_state: String,
    pub walk_state: String,
    pub script_context: ScriptContext,
    pub trigger_script: String,
    pub touch_script: String,
    pub leave_script: String,
    pub outline_conditions: OutlineConditions,
    /// Next object in an outline chain.
    pub outlined_object_id: Option<ObjectId>,
    /// Object currently outlining this one (back reference).
    pub outlining_object_id: Option<ObjectId>,
    pub draw_order: DrawOrder,
    pub speed: f32,
    /// Objects that mirror this object's movement, one level deep.
    pub linked_objects: Vec<ObjectId>,
    /// Area the object is currently standing in (back reference).
    pub collision_area_id: Option<ObjectId>,
    /// Object this one last triggered (back reference).
    pub triggered_object_id: Option<ObjectId>,
    sprite: Option<Sprite>,
    /// Circle collision shape for ellipse objects without a sprite circle.
    pub ellipse: Option<Circle>,
    /// Index of the owning object layer in the map's layer list.
    pub layer_index: Option<usize>,
    pub properties: Properties,
}

impl MapObject {
    pub fn new(id: ObjectId, name: &str) -> Self {
        MapObject {
            id,
            name: name.to_uppercase(),
            object_type: String::new(),
            position: Vec2::ZERO,
            size: Vec2::ZERO,
            color: Color::WHITE,
            magnification: Vec2::ONE,
            gid: 0,
            opacity: 1.0,
            visible: true,
            disabled: false,
            stopped: false,
            frozen: false,
            passthrough: false,
            passthrough_type: PassthroughType::default(),
            override_tile_collision: false,
            strict_multidirectional_movement: false,
            use_layer_color: true,
            sound_attenuation_enabled: false,
            direction: Direction::DOWN,
            state: "FACE".to_string(),
            face_state: "FACE".to_string(),
            walk_state: "WALK".to_string(),
            script_context: ScriptContext::default(),
            trigger_script: String::new(),
            touch_script: String::new(),
            leave_script: String::new(),
            outline_conditions: OutlineConditions::default(),
            outlined_object_id: None,
            outlining_object_id: None,
            draw_order: DrawOrder::default(),
            speed: 1.0,
            linked_objects: Vec::new(),
            collision_area_id: None,
            triggered_object_id: None,
            sprite: None,
            ellipse: None,
            layer_index: None,
            properties: Properties::default(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Only the map reassigns ids, while inserting.
    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_uppercase();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Turning visibility back on restarts the animation.
    pub fn set_visible(&mut self, visible: bool, ticks: i64) {
        if visible && !self.visible
            && let Some(sprite) = &mut self.sprite
        {
            sprite.reset(true, ticks);
        }
        self.visible = visible;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Disabling an object mid-walk drops it to the literal "FACE" state.
    /// Scripts rely on seeing exactly that string, so the custom face state
    /// is deliberately not used here.
    pub fn set_disabled(&mut self, disabled: bool, ticks: i64) {
        if disabled && self.state == self.walk_state {
            self.set_state("FACE", ticks);
        }
        self.disabled = disabled;
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Set the animation state unless the object is frozen.
    pub fn update_state(&mut self, state: &str, ticks: i64) {
        if self.frozen {
            return;
        }
        self.set_state(state, ticks);
    }

    fn set_state(&mut self, state: &str, ticks: i64) {
        self.state = state.to_uppercase();
        self.refresh_pose(ticks);
    }

    pub fn face(&mut self, dir: Direction, ticks: i64) {
        self.direction = dir.cardinal();
        let face_state = self.face_state.clone();
        self.update_state(&face_state, ticks);
    }

    pub fn face_towards(&mut self, target: Vec2, ticks: i64) {
        let diagonal = self
            .sprite
            .as_ref()
            .map(Sprite::is_eight_directional)
            .unwrap_or(false);
        let dir =
            crate::util::direction::facing_direction(self.centered_position(), target, diagonal);
        if dir != Direction::NONE {
            self.face(dir, ticks);
        }
    }

    /// Current pose name; empty when there is no sprite.
    pub fn pose_name(&self) -> &str {
        self.sprite.as_ref().map(Sprite::pose_name).unwrap_or("")
    }

    /// Show a pose directly, optionally with state and direction overrides.
    pub fn show_pose(&mut self, pose: &str, state: &str, dir: Direction, ticks: i64) {
        if !state.is_empty() {
            self.state = state.to_uppercase();
        }
        if dir != Direction::NONE {
            self.direction = dir.cardinal();
        }
        let state = self.state.clone();
        let direction = self.direction;
        if let Some(sprite) = &mut self.sprite {
            sprite.set_pose(pose, &state, direction, true, ticks);
        }
    }

    /// Re-select the sprite pose from the current name/state/direction.
    pub fn refresh_pose(&mut self, ticks: i64) {
        let state = self.state.clone();
        let direction = self.direction;
        if let Some(sprite) = &mut self.sprite {
            let pose = sprite.pose_name().to_string();
            sprite.set_pose(&pose, &state, direction, true, ticks);
        }
    }

    pub fn set_sprite(&mut self, sprite: Sprite, ticks: i64) {
        self.sprite = Some(sprite);
        self.refresh_pose(ticks);
    }

    pub fn clear_sprite(&mut self) {
        self.sprite = None;
    }

    /// Bounding box relative to the object position: the sprite pose's box,
    /// or the object size for sprite-less objects.
    pub fn bounding_box(&self) -> Rect {
        if let Some(sprite) = &self.sprite {
            let box_ = sprite.bounding_box();
            if !box_.is_degenerate() {
                return box_;
            }
        }
        Rect::new(0.0, 0.0, self.size.x, self.size.y)
    }

    pub fn bounding_circle(&self) -> Option<Circle> {
        self.sprite
            .as_ref()
            .and_then(Sprite::bounding_circle)
            .or(self.ellipse)
    }

    /// Bounding box in map space.
    pub fn world_bounding_box(&self) -> Rect {
        self.bounding_box().translated(self.position)
    }

    pub fn world_bounding_circle(&self) -> Option<Circle> {
        self.bounding_circle().map(|c| c.translated(self.position))
    }

    /// Centre of the bounding box in map space.
    pub fn centered_position(&self) -> Vec2 {
        self.world_bounding_box().center()
    }

    pub fn has_any_script(&self) -> bool {
        !self.trigger_script.is_empty()
            || !self.touch_script.is_empty()
            || !self.leave_script.is_empty()
    }

    /// This object ignores collision when moving.
    pub fn initiates_passthrough(&self) -> bool {
        self.passthrough && self.passthrough_type.initiates()
    }

    /// Other objects pass through this one.
    pub fn receives_passthrough(&self) -> bool {
        self.passthrough && self.passthrough_type.receives()
    }

    /// An area is a passthrough object with at least one script.
    pub fn is_area(&self) -> bool {
        self.receives_passthrough() && self.has_any_script()
    }

    pub fn sprite(&self) -> Option<&Sprite> {
        self.sprite.as_ref()
    }

    pub fn sprite_mut(&mut self) -> Option<&mut Sprite> {
        self.sprite.as_mut()
    }

    pub fn is_eight_directional(&self) -> bool {
        self.sprite
            .as_ref()
            .map(Sprite::is_eight_directional)
            .unwrap_or(false)
    }
}

impl SpriteHolder for MapObject {
    fn sprite(&self) -> Option<&Sprite> {
        self.sprite.as_ref()
    }

    fn sprite_mut(&mut self) -> Option<&mut Sprite> {
        self.sprite.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::data::{Frame, Pose, SpriteData};
    use std::rc::Rc;

    fn sprite_with_box(rect: Rect) -> Sprite {
        let data = Rc::new(SpriteData {
            filename: "test.xml".to_string(),
            poses: vec![Pose {
                bounding_box: rect,
                frames: vec![Frame::default()],
                ..Pose::default()
            }],
            ..SpriteData::default()
        });
        Sprite::new(data, 0)
    }

    #[test]
    fn test_name_uppercased() {
        let mut object = MapObject::new(1, "door");
        assert_eq!(object.name(), "DOOR");
        object.set_name("Chest");
        assert_eq!(object.name(), "CHEST");
    }

    #[test]
    fn test_bounding_box_without_sprite() {
        let mut object = MapObject::new(1, "o");
        object.size = Vec2::new(16.0, 24.0);
        object.position = Vec2::new(10.0, 20.0);
        assert_eq!(object.bounding_box(), Rect::new(0.0, 0.0, 16.0, 24.0));
        assert_eq!(object.world_bounding_box(), Rect::new(10.0, 20.0, 16.0, 24.0));
        assert_eq!(object.centered_position(), Vec2::new(18.0, 32.0));
    }

    #[test]
    fn test_bounding_box_from_sprite_pose() {
        let mut object = MapObject::new(1, "o");
        object.size = Vec2::new(32.0, 32.0);
        object.set_sprite(sprite_with_box(Rect::new(4.0, 8.0, 8.0, 8.0)), 0);
        assert_eq!(object.bounding_box(), Rect::new(4.0, 8.0, 8.0, 8.0));
    }

    #[test]
    fn test_area_definition() {
        let mut object = MapObject::new(1, "door");
        object.passthrough = true;
        assert!(!object.is_area());
        object.trigger_script = "door_open()".to_string();
        assert!(object.is_area());
        object.passthrough_type = PassthroughType::Initiator;
        assert!(!object.is_area());
    }

    #[test]
    fn test_set_disabled_forces_literal_face() {
        let mut object = MapObject::new(1, "npc");
        object.face_state = "IDLE".to_string();
        object.update_state("WALK", 0);
        object.set_disabled(true, 0);
        // Deliberately the literal FACE, not the custom face state.
        assert_eq!(object.state(), "FACE");
        assert!(object.is_disabled());
    }

    #[test]
    fn test_frozen_blocks_state_updates() {
        let mut object = MapObject::new(1, "statue");
        object.frozen = true;
        object.update_state("WALK", 0);
        assert_eq!(object.state(), "FACE");
    }

    #[test]
    fn test_visibility_toggle_resets_sprite() {
        let mut object = MapObject::new(1, "o");
        object.set_sprite(sprite_with_box(Rect::new(0.0, 0.0, 8.0, 8.0)), 0);
        object.set_visible(false, 0);
        object.set_visible(true, 100);
        // No panic and sprite still selected; reset covered by sprite tests.
        assert!(object.sprite().is_some());
    }
}
