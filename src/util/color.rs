//! RGBA colour with hex parsing.
//!
//! Components are floats in [0, 1]. Hex strings accept `RRGGBB` and
//! `AARRGGBB`, with or without a leading `#`, which matches the colour
//! properties found in map and config files.

use crate::util::lerp;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Parse `RRGGBB` or `AARRGGBB`, `#` optional.
    pub fn from_hex(text: &str) -> Option<Color> {
        let hex = text.trim().trim_start_matches('#');
        let (a, rest) = match hex.len() {
            6 => (255u8, hex),
            8 => (u8::from_str_radix(&hex[0..2], 16).ok()?, &hex[2..]),
            _ => return None,
        };
        let r = u8::from_str_radix(&rest[0..2], 16).ok()?;
        let g = u8::from_str_radix(&rest[2..4], 16).ok()?;
        let b = u8::from_str_radix(&rest[4..6], 16).ok()?;
        Some(Color::from_rgba8(r, g, b, a))
    }

    /// Format as `AARRGGBB` without the leading `#`.
    pub fn to_hex(&self) -> String {
        format!(
            "{:02x}{:02x}{:02x}{:02x}",
            (self.a * 255.0).round() as u8,
            (self.r * 255.0).round() as u8,
            (self.g * 255.0).round() as u8,
            (self.b * 255.0).round() as u8
        )
    }

    pub fn with_alpha(&self, a: f32) -> Color {
        Color::new(self.r, self.g, self.b, a)
    }

    /// Multiply all components, used for opacity application.
    pub fn scaled(&self, factor: f32) -> Color {
        Color::new(
            self.r * factor,
            self.g * factor,
            self.b * factor,
            self.a * factor,
        )
    }

    pub fn lerp(&self, other: &Color, t: f32) -> Color {
        Color::new(
            lerp(self.r, other.r, t),
            lerp(self.g, other.g, t),
            lerp(self.b, other.b, t),
            lerp(self.a, other.a, t),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::approx_eq;

    #[test]
    fn test_from_hex_rgb() {
        let c = Color::from_hex("ff8000").unwrap();
        assert!(approx_eq(c.r, 1.0));
        assert!(approx_eq(c.g, 128.0 / 255.0));
        assert!(approx_eq(c.b, 0.0));
        assert!(approx_eq(c.a, 1.0));
    }

    #[test]
    fn test_from_hex_argb_and_hash() {
        let c = Color::from_hex("#80ff0000").unwrap();
        assert!(approx_eq(c.a, 128.0 / 255.0));
        assert!(approx_eq(c.r, 1.0));
    }

    #[test]
    fn test_from_hex_invalid() {
        assert!(Color::from_hex("xyz").is_none());
        assert!(Color::from_hex("12345").is_none());
    }

    #[test]
    fn test_hex_roundtrip() {
        let c = Color::from_rgba8(10, 20, 30, 40);
        let back = Color::from_hex(&c.to_hex()).unwrap();
        assert_eq!(c, back);
    }

    #[test]
    fn test_lerp() {
        let c = Color::BLACK.lerp(&Color::WHITE, 0.5);
        assert!(approx_eq(c.r, 0.5));
        assert!(approx_eq(c.a, 1.0));
    }
}
