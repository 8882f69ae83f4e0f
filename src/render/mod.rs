//! Rendering seam.
//!
//! The simulation draws through the narrow [`Renderer`] trait: textured
//! quads, filled rectangles, text, scissor, and optional canvas caching into
//! render textures. `draw_frame` walks layers, objects, and canvases in
//! draw order; the raylib implementation lives in [`backend`] and tests use
//! [`headless::HeadlessRenderer`].

pub mod headless;

#[cfg(any(target_os = "linux", target_os = "windows", target_os = "macos"))]
pub mod backend;

use glam::Vec2;

use crate::canvas::{Canvas, TextStyle};
use crate::game::Game;
use crate::map::object::DrawOrder;
use crate::map::{Layer, LayerKind, Map};
use crate::util::color::Color;
use crate::util::rect::Rect;

/// One textured quad submission.
#[derive(Debug, Clone)]
pub struct Quad {
    pub texture: String,
    /// Source rectangle in the texture; None draws the whole texture.
    pub src: Option<Rect>,
    /// Destination position in screen space.
    pub position: Vec2,
    pub origin: Vec2,
    /// Degrees.
    pub angle: f32,
    pub magnification: Vec2,
    pub color: Color,
}

pub trait Renderer {
    fn clear(&mut self, color: Color);
    fn draw_quad(&mut self, quad: &Quad);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn draw_text(&mut self, text: &str, position: Vec2, style: &TextStyle);
    fn measure_text(&self, text: &str, style: &TextStyle) -> Vec2;
    fn set_scissor(&mut self, rect: Option<Rect>);

    /// Framebuffer-backed canvas caching; the default degrades gracefully,
    /// treating every canvas as needing a repaint each frame.
    fn supports_framebuffers(&self) -> bool {
        false
    }
    fn begin_canvas_cache(&mut self, _key: u32, _size: Vec2) -> bool {
        false
    }
    fn end_canvas_cache(&mut self) {}
    fn draw_canvas_cache(&mut self, _key: u32, _position: Vec2, _color: Color) {}
}

/// Render one full frame of the game.
pub fn draw_frame(renderer: &mut dyn Renderer, game: &Game) {
    renderer.clear(game.config.startup.clear_color);

    let camera_position = game.camera.position() - Vec2::new(game.camera.shake_offset(), 0.0);

    for layer in &game.map.layers {
        if !layer.visible || layer.opacity <= 0.0 {
            continue;
        }
        match &layer.kind {
            LayerKind::Tile(_) => draw_tile_layer(renderer, &game.map, layer, camera_position),
            LayerKind::Image(_) => draw_image_layer(renderer, layer, camera_position),
            LayerKind::Object(_) => draw_object_layer(renderer, &game.map, layer, camera_position),
        }
    }

    // Screen tint.
    let tint = game.camera.tint_color;
    if tint.a > 0.0 {
        let size = game.camera.game_size();
        renderer.fill_rect(Rect::new(0.0, 0.0, size.x, size.y), tint);
    }

    // Canvases, lowest priority first.
    let ticks = game.ticks();
    for canvas in game.map.canvases() {
        {
            let canvas = canvas.borrow();
            draw_canvas(
                renderer,
                &canvas,
                Vec2::ZERO,
                true,
                false,
                ticks,
                camera_position,
            );
        }
        // Record the cache as fresh so FBO-capable backends can reuse it.
        let mut canvas = canvas.borrow_mut();
        if canvas.uses_fbo(renderer.supports_framebuffers(), true) {
            canvas.mark_drawn(ticks, camera_position);
        }
    }
}

/// The collision layer draws only in debug builds of maps; a hidden layer's
/// `visible` flag already covers it, so nothing special happens here.
fn draw_tile_layer(renderer: &mut dyn Renderer, map: &Map, layer: &Layer, camera: Vec2) {
    let Some(tile_layer) = layer.as_tile() else {
        return;
    };
    let tile_width = map.tile_width();
    let tile_height = map.tile_height();
    for y in 0..layer.height {
        for x in 0..layer.width {
            let gid = tile_layer.tile_at(x, y, layer.width);
            if gid == 0 {
                continue;
            }
            let Some(tileset) = map.tileset_for_gid(gid) else {
                continue;
            };
            let Some(texture) = &tileset.image else {
                continue;
            };
            let src = tileset.tile_source_rect(gid - tileset.first_id);
            renderer.draw_quad(&Quad {
                texture: texture.clone(),
                src: Some(src),
                position: Vec2::new((x * tile_width) as f32, (y * tile_height) as f32) - camera,
                origin: Vec2::ZERO,
                angle: 0.0,
                magnification: Vec2::ONE,
                color: Color::WHITE.with_alpha(layer.opacity),
            });
        }
    }
}

fn draw_image_layer(renderer: &mut dyn Renderer, layer: &Layer, camera: Vec2) {
    let LayerKind::Image(image) = &layer.kind else {
        return;
    };
    let offset = if image.fixed { Vec2::ZERO } else { -camera };
    if let Some(sprite) = &image.sprite {
        if let Some(texture) = sprite.image() {
            let frame = sprite.current_frame();
            renderer.draw_quad(&Quad {
                texture: texture.to_string(),
                src: Some(frame.rectangle),
                position: image.position + offset,
                origin: sprite.pose().origin,
                angle: frame.angle,
                magnification: frame.magnification,
                color: Color::WHITE.with_alpha(layer.opacity * frame.opacity),
            });
        }
    } else if let Some(texture) = &image.image {
        renderer.draw_quad(&Quad {
            texture: texture.clone(),
            src: None,
            position: image.position + offset,
            origin: Vec2::ZERO,
            angle: 0.0,
            magnification: Vec2::ONE,
            color: Color::WHITE.with_alpha(layer.opacity),
        });
    }
}

fn draw_object_layer(renderer: &mut dyn Renderer, map: &Map, layer: &Layer, camera: Vec2) {
    let Some(object_layer) = layer.as_object() else {
        return;
    };
    // Draw-sort: BELOW first, then NORMAL by y, then ABOVE.
    let mut draw_list: Vec<_> = object_layer
        .object_ids
        .iter()
        .filter_map(|&id| map.get_object(id))
        .filter(|object| object.is_visible())
        .collect();
    draw_list.sort_by(|a, b| {
        let order = |o: &crate::map::MapObject| match o.draw_order {
            DrawOrder::Below => 0,
            DrawOrder::Normal => 1,
            DrawOrder::Above => 2,
        };
        order(a)
            .cmp(&order(b))
            .then_with(|| a.position.y.total_cmp(&b.position.y))
            .then_with(|| a.id().cmp(&b.id()))
    });

    for object in draw_list {
        let mut color = object.color;
        if object.use_layer_color {
            let tint = object_layer.tint_color;
            color = Color::new(
                color.r * tint.r,
                color.g * tint.g,
                color.b * tint.b,
                color.a * tint.a,
            );
        }
        color.a *= object.opacity * layer.opacity;

        if let Some(sprite) = object.sprite() {
            let Some(texture) = sprite.image() else {
                continue;
            };
            let frame = sprite.current_frame();
            renderer.draw_quad(&Quad {
                texture: texture.to_string(),
                src: Some(frame.rectangle),
                position: object.position - camera,
                origin: sprite.pose().origin,
                angle: frame.angle,
                magnification: frame.magnification * object.magnification,
                color: color.with_alpha(color.a * frame.opacity),
            });
        } else if object.gid > 0 {
            let Some(tileset) = map.tileset_for_gid(object.gid) else {
                continue;
            };
            let Some(texture) = &tileset.image else {
                continue;
            };
            renderer.draw_quad(&Quad {
                texture: texture.clone(),
                src: Some(tileset.tile_source_rect(object.gid - tileset.first_id)),
                position: object.position - camera,
                origin: Vec2::ZERO,
                angle: 0.0,
                magnification: object.magnification,
                color,
            });
        }
    }
}

/// Recursive canvas compositor. Top-level canvases with children or text
/// draw through a cached render texture when the backend supports one;
/// otherwise everything repaints each frame.
#[allow(clippy::too_many_arguments)]
fn draw_canvas(
    renderer: &mut dyn Renderer,
    canvas: &Canvas,
    parent_offset: Vec2,
    is_root: bool,
    parent_redraw: bool,
    ticks: i64,
    camera: Vec2,
) {
    if !canvas.is_visible() || canvas.opacity() <= 0.0 {
        return;
    }
    let position = parent_offset + canvas.position();

    if canvas.background_visible {
        let rect = canvas.background_rect.translated(position);
        renderer.fill_rect(rect, canvas.background_color.scaled(canvas.opacity()));
    }

    let using_fbo = canvas.uses_fbo(renderer.supports_framebuffers(), is_root);
    let redraw = canvas.should_redraw(parent_redraw, using_fbo);

    let cached = using_fbo && !redraw && canvas.framebuffer_key.is_some();
    if cached {
        // Reuse the cache, compensating for camera drift when the canvas is
        // not camera-relative.
        let drift = if canvas.camera_relative {
            Vec2::ZERO
        } else {
            canvas.last_camera_position - camera
        };
        if let Some(key) = canvas.framebuffer_key {
            renderer.draw_canvas_cache(key, position + drift, canvas.color());
        }
        return;
    }

    if let Some(scissor) = canvas.scissor {
        renderer.set_scissor(Some(scissor.translated(position)));
    }

    render_canvas_content(renderer, canvas, position);
    for child in canvas.children() {
        draw_canvas(
            renderer,
            &child.borrow(),
            position,
            false,
            redraw,
            ticks,
            camera,
        );
    }

    if canvas.scissor.is_some() {
        renderer.set_scissor(None);
    }
}

fn render_canvas_content(renderer: &mut dyn Renderer, canvas: &Canvas, position: Vec2) {
    if canvas.is_text() || canvas.text().is_some() {
        let style = &canvas.style;
        for (i, line) in canvas.lines().iter().enumerate() {
            let line_position = position + Vec2::new(0.0, i as f32 * style.line_height);
            renderer.draw_text(line, line_position, style);
        }
    }
    if let Some(texture) = canvas.image() {
        renderer.draw_quad(&Quad {
            texture: texture.to_string(),
            src: None,
            position,
            origin: canvas.origin().unwrap_or(Vec2::ZERO),
            angle: canvas.angle().unwrap_or(0.0),
            magnification: canvas.magnification(),
            color: canvas.color(),
        });
    }
    if let Some(sprite) = canvas.sprite() {
        if let Some(texture) = sprite.image() {
            let frame = sprite.current_frame();
            renderer.draw_quad(&Quad {
                texture: texture.to_string(),
                src: Some(frame.rectangle),
                position,
                origin: canvas.origin().unwrap_or(sprite.pose().origin),
                angle: canvas.angle().unwrap_or(frame.angle),
                magnification: frame.magnification * canvas.magnification(),
                color: canvas.color().with_alpha(canvas.opacity() * frame.opacity),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::map::layer::{ObjectLayer, TileLayer};
    use crate::map::Tileset;
    use headless::{HeadlessRenderer, RenderOp};

    fn game_with_tiles() -> Game {
        let mut game = Game::new(Config::new());
        let mut map = Map::new(4, 4, 16, 16);
        map.add_tileset(Tileset {
            first_id: 1,
            name: "ground".to_string(),
            tile_width: 16,
            tile_height: 16,
            image: Some("tiles.png".to_string()),
            image_width: 64,
            image_height: 16,
            ..Tileset::default()
        });
        map.add_layer(Layer::new(
            "ground",
            4,
            4,
            LayerKind::Tile(TileLayer {
                tiles: vec![1; 16],
            }),
        ));
        map.add_layer(Layer::new(
            "objects",
            4,
            4,
            LayerKind::Object(ObjectLayer::default()),
        ));
        game.map = map;
        game
    }

    #[test]
    fn test_draw_frame_emits_tile_quads() {
        let game = game_with_tiles();
        let mut renderer = HeadlessRenderer::new();
        draw_frame(&mut renderer, &game);
        let quads = renderer
            .ops
            .iter()
            .filter(|op| matches!(op, RenderOp::Quad { .. }))
            .count();
        assert_eq!(quads, 16);
    }

    #[test]
    fn test_invisible_layer_skipped() {
        let mut game = game_with_tiles();
        game.map.layers[0].visible = false;
        let mut renderer = HeadlessRenderer::new();
        draw_frame(&mut renderer, &game);
        let quads = renderer
            .ops
            .iter()
            .filter(|op| matches!(op, RenderOp::Quad { .. }))
            .count();
        assert_eq!(quads, 0);
    }

    #[test]
    fn test_draw_order_below_before_above() {
        let mut game = game_with_tiles();
        game.map.layers[0].visible = false;
        let below = game.map.new_object("below");
        let above = game.map.new_object("above");
        for (id, order, gid) in [(below, DrawOrder::Below, 1), (above, DrawOrder::Above, 2)] {
            let object = game.map.get_object_mut(id).unwrap();
            object.gid = gid;
            object.size = glam::Vec2::new(16.0, 16.0);
            object.draw_order = order;
        }
        let mut renderer = HeadlessRenderer::new();
        draw_frame(&mut renderer, &game);
        let sources: Vec<f32> = renderer
            .ops
            .iter()
            .filter_map(|op| match op {
                RenderOp::Quad { src_x, .. } => Some(*src_x),
                _ => None,
            })
            .collect();
        // gid 1 (src x 0) first, gid 2 (src x 16) second.
        assert_eq!(sources, vec![0.0, 16.0]);
    }

    #[test]
    fn test_tint_overlay_when_alpha() {
        let mut game = game_with_tiles();
        game.camera.tint_color = Color::new(1.0, 0.0, 0.0, 0.5);
        let mut renderer = HeadlessRenderer::new();
        draw_frame(&mut renderer, &game);
        assert!(renderer
            .ops
            .iter()
            .any(|op| matches!(op, RenderOp::Rect { .. })));
    }
}
