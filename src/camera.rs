//! Camera: viewport position, object tracking, tint, shake, scissor.
//!
//! The camera lives in map pixel space and is clamped so the view never
//! leaves the map. Draw-time concerns (projection, actual GL scissor) are the
//! render backend's job; it reads the state computed here.

use glam::Vec2;

use crate::config::Config;
use crate::map::{Map, ObjectId};
use crate::util::color::Color;
use crate::util::rect::Rect;

#[derive(Debug, Clone, Copy)]
struct Shaker {
    strength: f32,
    speed: f32,
    offset: f32,
    direction: f32,
}

pub struct Camera {
    position: Vec2,
    game_width: f32,
    game_height: f32,
    tracked_object: Option<ObjectId>,
    /// Extra offset applied while tracking.
    pub tracking_offset: Vec2,
    pub tint_color: Color,
    pub brightness: f32,
    pub contrast: f32,
    pub gamma: f32,
    shaker: Option<Shaker>,
    /// Scissor rectangle in game space, when enabled.
    scissor: Option<Rect>,
}

impl Camera {
    pub fn new(config: &Config) -> Camera {
        Camera {
            position: Vec2::ZERO,
            game_width: config.graphics.game_width as f32,
            game_height: config.graphics.game_height as f32,
            tracked_object: None,
            tracking_offset: Vec2::ZERO,
            tint_color: config.startup.tint_color,
            brightness: config.graphics.brightness,
            contrast: config.graphics.contrast,
            gamma: config.graphics.gamma,
            shaker: None,
            scissor: None,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn game_size(&self) -> Vec2 {
        Vec2::new(self.game_width, self.game_height)
    }

    /// Legal camera positions for a map: the view never leaves it.
    pub fn position_bounds(&self, map: &Map) -> Rect {
        let max_x = (map.pixel_width() - self.game_width).max(0.0);
        let max_y = (map.pixel_height() - self.game_height).max(0.0);
        Rect::new(0.0, 0.0, max_x, max_y)
    }

    pub fn set_position(&mut self, position: Vec2, map: &Map) {
        let bounds = self.position_bounds(map);
        self.position = Vec2::new(
            position.x.clamp(bounds.x, bounds.x + bounds.w),
            position.y.clamp(bounds.y, bounds.y + bounds.h),
        );
    }

    /// Centre the view on a map position.
    pub fn center_at(&mut self, target: Vec2, map: &Map) {
        self.set_position(
            target - Vec2::new(self.game_width * 0.5, self.game_height * 0.5),
            map,
        );
    }

    pub fn tracked_object(&self) -> Option<ObjectId> {
        self.tracked_object
    }

    pub fn track_object(&mut self, id: Option<ObjectId>) {
        self.tracked_object = id;
    }

    /// Per-frame update: recentre on the tracked object and advance the
    /// shaker.
    pub fn update(&mut self, map: &Map) {
        if let Some(id) = self.tracked_object
            && let Some(object) = map.get_object(id)
        {
            let target = object.centered_position() + self.tracking_offset;
            self.center_at(target, map);
        }
        if let Some(shaker) = &mut self.shaker {
            shaker.offset += shaker.direction * shaker.strength * shaker.speed * 0.5;
            if shaker.offset.abs() > shaker.strength * 2.0 {
                shaker.direction = -shaker.direction;
            }
        }
    }

    pub fn start_shaking(&mut self, strength: f32, speed: f32) {
        self.shaker = Some(Shaker {
            strength,
            speed,
            offset: 0.0,
            direction: 1.0,
        });
    }

    pub fn cease_shaking(&mut self) {
        self.shaker = None;
    }

    pub fn is_shaking(&self) -> bool {
        self.shaker.is_some()
    }

    /// Horizontal displacement the renderer applies while shaking.
    pub fn shake_offset(&self) -> f32 {
        self.shaker.map(|s| s.offset).unwrap_or(0.0)
    }

    /// Convert a game-space rectangle into window pixels for GL scissoring.
    pub fn scissor_to_window(&self, rect: &Rect, viewport: &Rect) -> Rect {
        let scale_x = viewport.w / self.game_width;
        let scale_y = viewport.h / self.game_height;
        Rect::new(
            viewport.x + rect.x * scale_x,
            viewport.y + rect.y * scale_y,
            rect.w * scale_x,
            rect.h * scale_y,
        )
    }

    pub fn enable_scissor_test(&mut self, rect: Rect) {
        self.scissor = Some(rect);
    }

    pub fn disable_scissor_test(&mut self) {
        self.scissor = None;
    }

    pub fn scissor(&self) -> Option<Rect> {
        self.scissor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::layer::{LayerKind, ObjectLayer};
    use crate::map::Layer;

    fn camera() -> Camera {
        // 320x240 game view from default config.
        Camera::new(&Config::new())
    }

    fn map_with_objects() -> Map {
        let mut map = Map::new(40, 40, 16, 16); // 640x640 px
        map.add_layer(Layer::new(
            "objects",
            40,
            40,
            LayerKind::Object(ObjectLayer::default()),
        ));
        map
    }

    #[test]
    fn test_set_position_clamps_to_bounds() {
        let mut camera = camera();
        let map = map_with_objects();
        camera.set_position(Vec2::new(-50.0, 10_000.0), &map);
        assert_eq!(camera.position(), Vec2::new(0.0, 400.0)); // 640 - 240
    }

    #[test]
    fn test_set_position_idempotent() {
        let mut camera = camera();
        let map = map_with_objects();
        camera.set_position(Vec2::new(100.0, 50.0), &map);
        let first = camera.position();
        camera.set_position(first, &map);
        assert_eq!(camera.position(), first);
    }

    #[test]
    fn test_small_map_pins_camera() {
        let mut camera = camera();
        let map = Map::new(5, 5, 16, 16); // smaller than the view
        camera.set_position(Vec2::new(30.0, 30.0), &map);
        assert_eq!(camera.position(), Vec2::ZERO);
    }

    #[test]
    fn test_tracking_centers_on_object() {
        let mut camera = camera();
        let mut map = map_with_objects();
        let id = map.new_object("hero");
        {
            let object = map.get_object_mut(id).unwrap();
            object.position = Vec2::new(320.0, 320.0);
            object.size = Vec2::new(16.0, 16.0);
        }
        camera.track_object(Some(id));
        camera.update(&map);
        // Centered position is (328, 328); view is 320x240.
        assert_eq!(camera.position(), Vec2::new(168.0, 208.0));
    }

    #[test]
    fn test_shake_oscillates_and_stops() {
        let mut camera = camera();
        let map = map_with_objects();
        camera.start_shaking(4.0, 1.0);
        assert!(camera.is_shaking());
        let mut seen_positive = false;
        let mut seen_negative = false;
        for _ in 0..64 {
            camera.update(&map);
            let offset = camera.shake_offset();
            assert!(offset.abs() <= 4.0 * 2.0 + 4.0);
            seen_positive |= offset > 0.0;
            seen_negative |= offset < 0.0;
        }
        assert!(seen_positive && seen_negative);
        camera.cease_shaking();
        assert_eq!(camera.shake_offset(), 0.0);
    }

    #[test]
    fn test_scissor_to_window() {
        let camera = camera();
        let window = Rect::new(0.0, 0.0, 640.0, 480.0); // 2x scale
        let rect = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(
            camera.scissor_to_window(&rect, &window),
            Rect::new(20.0, 40.0, 200.0, 100.0)
        );
    }
}
