//! Shared utilities: interpolation, float comparison, string helpers, and
//! time-of-day conversions.

pub mod color;
pub mod direction;
pub mod rect;

use glam::Vec2;

/// Epsilon used for "did we actually move" style comparisons.
pub const EPSILON: f32 = 1e-4;

/// Linearly interpolate between two floats.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Linearly interpolate between two 2D vectors.
pub fn lerp_v2(a: Vec2, b: Vec2, t: f32) -> Vec2 {
    Vec2::new(lerp(a.x, b.x, t), lerp(a.y, b.y, t))
}

/// Approximate float equality against [`EPSILON`].
pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

/// True when the value is within [`EPSILON`] of zero.
pub fn approx_zero(v: f32) -> bool {
    v.abs() < EPSILON
}

/// Uppercase a name the way object/pose lookups expect.
pub fn capitalize(s: &str) -> String {
    s.to_uppercase()
}

/// Split on a separator, trimming surrounding whitespace from each part and
/// dropping empty parts.
pub fn split_trimmed(s: &str, sep: char) -> Vec<String> {
    s.split(sep)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `HH:MM:SS` (or `HH:MM`) timestamp into seconds of day.
pub fn timestamp_to_seconds(text: &str) -> Option<u32> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut seconds = 0u32;
    for part in &parts {
        seconds = seconds * 60 + part.trim().parse::<u32>().ok()?;
    }
    // A bare "HH" or "HH:MM" still means hours first
    for _ in parts.len()..3 {
        seconds *= 60;
    }
    Some(seconds)
}

/// Format seconds of day back into `HH:MM:SS`.
pub fn seconds_to_timestamp(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}
