//! Recording renderer for tests.
//!
//! Captures every submission as a [`RenderOp`] so tests can assert on draw
//! order and content without a window. Framebuffers are unsupported, which
//! also exercises the degraded always-redraw canvas path.

use glam::Vec2;

use crate::canvas::TextStyle;
use crate::render::{Quad, Renderer};
use crate::util::color::Color;
use crate::util::rect::Rect;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    Clear,
    Quad {
        texture: String,
        src_x: f32,
        src_y: f32,
        x: f32,
        y: f32,
    },
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
    },
    Scissor(Option<(f32, f32, f32, f32)>),
}

#[derive(Default)]
pub struct HeadlessRenderer {
    pub ops: Vec<RenderOp>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                RenderOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for HeadlessRenderer {
    fn clear(&mut self, _color: Color) {
        self.ops.push(RenderOp::Clear);
    }

    fn draw_quad(&mut self, quad: &Quad) {
        let src = quad.src.unwrap_or_default();
        self.ops.push(RenderOp::Quad {
            texture: quad.texture.clone(),
            src_x: src.x,
            src_y: src.y,
            x: quad.position.x,
            y: quad.position.y,
        });
    }

    fn fill_rect(&mut self, rect: Rect, _color: Color) {
        self.ops.push(RenderOp::Rect {
            x: rect.x,
            y: rect.y,
            w: rect.w,
            h: rect.h,
        });
    }

    fn draw_text(&mut self, text: &str, position: Vec2, _style: &TextStyle) {
        self.ops.push(RenderOp::Text {
            text: text.to_string(),
            x: position.x,
            y: position.y,
        });
    }

    fn measure_text(&self, text: &str, style: &TextStyle) -> Vec2 {
        Vec2::new(text.chars().count() as f32 * style.size * 0.5, style.size)
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        self.ops
            .push(RenderOp::Scissor(rect.map(|r| (r.x, r.y, r.w, r.h))));
    }
}
