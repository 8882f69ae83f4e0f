//! Canvas tree: composited drawables owned by scripts.
//!
//! A canvas is an image, a sprite, or a text block, optionally with owned
//! children. The map holds registered canvases weakly and drops dead entries
//! each tick. Top-level canvases with children or text cache their composite
//! into a framebuffer texture when the backend supports it; every mutation
//! flips the redraw flag so the cache is refreshed lazily.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

use crate::sprite::{Sprite, SpriteUpdate};
use crate::util::color::Color;
use crate::util::rect::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasType {
    Image,
    Sprite,
    Text,
    /// An image canvas with a text descendant; always composited via FBO.
    Mixed,
}

/// Font styling for text canvases.
#[derive(Debug, Clone)]
pub struct TextStyle {
    pub size: f32,
    pub line_height: f32,
    pub color: Color,
    pub outline: Option<(f32, Color)>,
    pub shadow: Option<(Vec2, Color)>,
    pub font_type: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        TextStyle {
            size: 16.0,
            line_height: 20.0,
            color: Color::WHITE,
            outline: None,
            shadow: None,
            font_type: None,
        }
    }
}

pub struct Canvas {
    canvas_type: CanvasType,
    pub priority: i32,
    position: Vec2,
    origin: Option<Vec2>,
    magnification: Vec2,
    angle: Option<f32>,
    color: Color,
    pub scissor: Option<Rect>,
    visible: bool,
    /// Fixed to the screen rather than the map.
    pub camera_relative: bool,
    children: Vec<Rc<RefCell<Canvas>>>,
    /// Render-texture key allocated by the backend on first FBO use.
    pub framebuffer_key: Option<u32>,
    text: Option<String>,
    lines: Vec<String>,
    pub style: TextStyle,
    pub last_drawn_time: i64,
    pub last_camera_position: Vec2,
    redraw_needed: bool,
    pub background_visible: bool,
    pub background_rect: Rect,
    pub background_color: Color,
    image: Option<String>,
    sprite: Option<Sprite>,
}

impl Canvas {
    fn base(canvas_type: CanvasType, position: Vec2) -> Canvas {
        Canvas {
            canvas_type,
            priority: 0,
            position,
            origin: None,
            magnification: Vec2::ONE,
            angle: None,
            color: Color::WHITE,
            scissor: None,
            visible: true,
            camera_relative: true,
            children: Vec::new(),
            framebuffer_key: None,
            text: None,
            lines: Vec::new(),
            style: TextStyle::default(),
            last_drawn_time: 0,
            last_camera_position: Vec2::ZERO,
            redraw_needed: true,
            background_visible: false,
            background_rect: Rect::default(),
            background_color: Color::TRANSPARENT,
            image: None,
            sprite: None,
        }
    }

    pub fn new_image(filename: impl Into<String>, position: Vec2) -> Canvas {
        let mut canvas = Canvas::base(CanvasType::Image, position);
        canvas.image = Some(filename.into());
        canvas
    }

    pub fn new_sprite(sprite: Sprite, position: Vec2) -> Canvas {
        let mut canvas = Canvas::base(CanvasType::Sprite, position);
        canvas.sprite = Some(sprite);
        canvas
    }

    pub fn new_text(text: impl Into<String>, position: Vec2, style: TextStyle) -> Canvas {
        let mut canvas = Canvas::base(CanvasType::Text, position);
        canvas.style = style;
        canvas.set_text(text);
        canvas
    }

    pub fn canvas_type(&self) -> CanvasType {
        self.canvas_type
    }

    pub fn is_text(&self) -> bool {
        self.canvas_type == CanvasType::Text
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn sprite(&self) -> Option<&Sprite> {
        self.sprite.as_ref()
    }

    pub fn sprite_mut(&mut self) -> Option<&mut Sprite> {
        self.redraw_needed = true;
        self.sprite.as_mut()
    }

    // ==================== Mutations (all mark redraw) ====================

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        if self.position != position {
            self.position = position;
            self.redraw_needed = true;
        }
    }

    pub fn origin(&self) -> Option<Vec2> {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Option<Vec2>) {
        self.origin = origin;
        self.redraw_needed = true;
    }

    pub fn magnification(&self) -> Vec2 {
        self.magnification
    }

    pub fn set_magnification(&mut self, magnification: Vec2) {
        if self.magnification != magnification {
            self.magnification = magnification;
            self.redraw_needed = true;
        }
    }

    pub fn angle(&self) -> Option<f32> {
        self.angle
    }

    pub fn set_angle(&mut self, angle: Option<f32>) {
        if self.angle != angle {
            self.angle = angle;
            self.redraw_needed = true;
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        if self.color != color {
            self.color = color;
            self.redraw_needed = true;
        }
    }

    pub fn opacity(&self) -> f32 {
        self.color.a
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.set_color(self.color.with_alpha(opacity));
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.redraw_needed = true;
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Replace the text, splitting it into lines for the renderer.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.lines = text.split('\n').map(str::to_string).collect();
        self.text = Some(text);
        if self.canvas_type == CanvasType::Image {
            self.canvas_type = CanvasType::Mixed;
        }
        self.redraw_needed = true;
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    // ==================== Children ====================

    pub fn add_child(&mut self, child: Rc<RefCell<Canvas>>) {
        // Text anywhere below an image canvas forces FBO compositing.
        if self.canvas_type == CanvasType::Image && child.borrow().has_text_descendant() {
            self.canvas_type = CanvasType::Mixed;
        }
        self.children.push(child);
        self.redraw_needed = true;
    }

    pub fn remove_child(&mut self, child: &Rc<RefCell<Canvas>>) {
        self.children.retain(|other| !Rc::ptr_eq(other, child));
        self.redraw_needed = true;
    }

    pub fn children(&self) -> &[Rc<RefCell<Canvas>>] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has_text_descendant(&self) -> bool {
        self.is_text()
            || self.canvas_type == CanvasType::Mixed
            || self
                .children
                .iter()
                .any(|child| child.borrow().has_text_descendant())
    }

    // ==================== Redraw / FBO decisions ====================

    /// A root canvas composites through its framebuffer when the backend
    /// supports one and the content benefits from caching.
    pub fn uses_fbo(&self, fbo_supported: bool, is_root: bool) -> bool {
        is_root && fbo_supported && (self.has_text_descendant() || !self.children.is_empty())
    }

    /// Should this canvas repaint this frame?
    pub fn should_redraw(&self, parent_redraw: bool, using_fbo: bool) -> bool {
        self.redraw_needed
            || parent_redraw
            || (!self.is_text() && (self.children.is_empty() || !using_fbo))
    }

    pub fn request_redraw(&mut self) {
        self.redraw_needed = true;
    }

    /// Record that the canvas (and its cache) is up to date.
    pub fn mark_drawn(&mut self, ticks: i64, camera_position: Vec2) {
        self.redraw_needed = false;
        self.last_drawn_time = ticks;
        self.last_camera_position = camera_position;
    }

    /// Per-tick update: animate sprite canvases, recurse into children.
    pub fn update(&mut self, ticks: i64) {
        if let Some(sprite) = &mut self.sprite {
            sprite.update(SpriteUpdate::silent(ticks));
            self.redraw_needed = true;
        }
        for child in &self.children {
            child.borrow_mut().update(ticks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_canvas() -> Canvas {
        Canvas::new_image("ui/panel.png", Vec2::new(10.0, 10.0))
    }

    fn text_canvas() -> Canvas {
        Canvas::new_text("hello", Vec2::ZERO, TextStyle::default())
    }

    #[test]
    fn test_mutations_set_redraw() {
        let mut canvas = image_canvas();
        canvas.mark_drawn(0, Vec2::ZERO);
        assert!(!canvas.should_redraw(false, true) || canvas.children().is_empty());

        canvas.set_position(Vec2::new(5.0, 5.0));
        assert!(canvas.should_redraw(false, true));
        canvas.mark_drawn(0, Vec2::ZERO);
        canvas.set_opacity(0.5);
        assert!(canvas.should_redraw(false, true));
    }

    #[test]
    fn test_redraw_idempotent() {
        let mut canvas = image_canvas();
        canvas.request_redraw();
        canvas.request_redraw();
        assert!(canvas.should_redraw(false, true));
        canvas.mark_drawn(42, Vec2::new(1.0, 2.0));
        assert_eq!(canvas.last_drawn_time, 42);
        assert_eq!(canvas.last_camera_position, Vec2::new(1.0, 2.0));
    }

    #[test]
    fn test_text_child_makes_mixed() {
        let mut root = image_canvas();
        assert_eq!(root.canvas_type(), CanvasType::Image);
        root.add_child(Rc::new(RefCell::new(text_canvas())));
        assert_eq!(root.canvas_type(), CanvasType::Mixed);
        assert!(root.has_text_descendant());
    }

    #[test]
    fn test_uses_fbo_rules() {
        let mut root = image_canvas();
        // Leaf image canvas: no FBO.
        assert!(!root.uses_fbo(true, true));
        root.add_child(Rc::new(RefCell::new(image_canvas())));
        assert!(root.uses_fbo(true, true));
        // Never without support, never for non-roots.
        assert!(!root.uses_fbo(false, true));
        assert!(!root.uses_fbo(true, false));

        let text = text_canvas();
        assert!(text.uses_fbo(true, true));
    }

    #[test]
    fn test_should_redraw_degrades_without_fbo() {
        let mut canvas = image_canvas();
        canvas.mark_drawn(0, Vec2::ZERO);
        // Leaf non-text canvases repaint every frame.
        assert!(canvas.should_redraw(false, false));
        // Text canvases only repaint when dirty.
        let mut text = text_canvas();
        text.mark_drawn(0, Vec2::ZERO);
        assert!(!text.should_redraw(false, true));
        assert!(text.should_redraw(true, true));
    }

    #[test]
    fn test_set_text_splits_lines() {
        let mut canvas = text_canvas();
        canvas.set_text("line one\nline two");
        assert_eq!(canvas.lines(), ["line one", "line two"]);
    }
}
