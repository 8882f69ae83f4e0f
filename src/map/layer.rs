//! Map layers.
//!
//! Three variants share the common header (name, size, opacity, visibility,
//! optional shaders, properties): tile layers hold a flat gid vector, image
//! layers scroll a texture or a sprite, object layers hold draw-ordered
//! object ids and a tint colour.

use glam::Vec2;

use crate::map::{ObjectId, Properties};
use crate::sprite::{Sprite, SpriteUpdate};
use crate::util::color::Color;

#[derive(Debug, Default)]
pub struct TileLayer {
    /// Row-major tile gids, `width * height` entries.
    pub tiles: Vec<u32>,
}

impl TileLayer {
    pub fn tile_at(&self, x: i32, y: i32, width: i32) -> u32 {
        self.tiles
            .get((x + y * width) as usize)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct ImageLayer {
    pub image: Option<String>,
    /// Sprite-backed image layers animate like any other sprite.
    pub sprite: Option<Sprite>,
    pub repeat: bool,
    pub fixed: bool,
    /// Pixels per second of automatic scrolling.
    pub velocity: Vec2,
    /// Accumulated scroll offset.
    pub position: Vec2,
}

#[derive(Debug, Default)]
pub struct ObjectLayer {
    /// Non-owning object references in draw-sort order.
    pub object_ids: Vec<ObjectId>,
    pub tint_color: Color,
}

#[derive(Debug)]
pub enum LayerKind {
    Tile(TileLayer),
    Image(ImageLayer),
    Object(ObjectLayer),
}

#[derive(Debug)]
pub struct Layer {
    pub name: String,
    pub width: i32,
    pub height: i32,
    /// In [0, 1].
    pub opacity: f32,
    pub visible: bool,
    pub vertex_shader: Option<String>,
    pub fragment_shader: Option<String>,
    pub properties: Properties,
    pub kind: LayerKind,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: i32, height: i32, kind: LayerKind) -> Self {
        Layer {
            name: name.into(),
            width,
            height,
            opacity: 1.0,
            visible: true,
            vertex_shader: None,
            fragment_shader: None,
            properties: Properties::default(),
            kind,
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn as_tile(&self) -> Option<&TileLayer> {
        match &self.kind {
            LayerKind::Tile(tile) => Some(tile),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectLayer> {
        match &self.kind {
            LayerKind::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectLayer> {
        match &mut self.kind {
            LayerKind::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Per-tick update: image layers scroll and animate.
    pub fn update(&mut self, ticks: i64, frame_seconds: f32) {
        if let LayerKind::Image(image) = &mut self.kind {
            if image.velocity != Vec2::ZERO {
                image.position += image.velocity * frame_seconds;
                // Keep the offset bounded for repeating layers.
                if image.repeat {
                    image.position.x %= 1_000_000.0;
                    image.position.y %= 1_000_000.0;
                }
            }
            if let Some(sprite) = &mut image.sprite {
                sprite.update(SpriteUpdate::silent(ticks));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_at() {
        let layer = TileLayer {
            tiles: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(layer.tile_at(0, 0, 3), 1);
        assert_eq!(layer.tile_at(2, 1, 3), 6);
        assert_eq!(layer.tile_at(9, 9, 3), 0);
    }

    #[test]
    fn test_opacity_clamped() {
        let mut layer = Layer::new("fog", 4, 4, LayerKind::Tile(TileLayer::default()));
        layer.set_opacity(2.0);
        assert_eq!(layer.opacity, 1.0);
        layer.set_opacity(-1.0);
        assert_eq!(layer.opacity, 0.0);
    }

    #[test]
    fn test_image_layer_scrolls() {
        let mut layer = Layer::new(
            "clouds",
            4,
            4,
            LayerKind::Image(ImageLayer {
                velocity: Vec2::new(10.0, -5.0),
                repeat: true,
                ..ImageLayer::default()
            }),
        );
        layer.update(0, 0.5);
        match &layer.kind {
            LayerKind::Image(image) => {
                assert_eq!(image.position, Vec2::new(5.0, -2.5));
            }
            _ => unreachable!(),
        }
    }
}
