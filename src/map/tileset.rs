//! Tilesets: shared tile images addressed by global ids.
//!
//! A tile gid combines the tileset's `first_id` with a local tile index. The
//! collision tileset is special: local ids 0 and 1 mean passable, anything
//! from 2 up blocks.

use rustc_hash::FxHashMap;

use crate::map::Properties;
use crate::util::color::Color;
use crate::util::rect::Rect;

#[derive(Debug, Clone, Default)]
pub struct Tileset {
    /// First global tile id of this tileset.
    pub first_id: u32,
    pub name: String,
    pub tile_width: i32,
    pub tile_height: i32,
    pub image: Option<String>,
    /// Image dimensions from the map file, used to derive the column count.
    pub image_width: i32,
    pub image_height: i32,
    pub transparent_color: Option<Color>,
    /// Per-tile property bags keyed by local tile id.
    pub tile_properties: FxHashMap<u32, Properties>,
}

impl Tileset {
    /// Number of tiles per image row.
    pub fn columns(&self) -> u32 {
        if self.tile_width <= 0 || self.image_width <= 0 {
            return 1;
        }
        ((self.image_width / self.tile_width) as u32).max(1)
    }

    /// Source rectangle of a local tile id inside the tileset image.
    pub fn tile_source_rect(&self, local_id: u32) -> Rect {
        let columns = self.columns();
        let col = local_id % columns;
        let row = local_id / columns;
        Rect::new(
            (col as i32 * self.tile_width) as f32,
            (row as i32 * self.tile_height) as f32,
            self.tile_width as f32,
            self.tile_height as f32,
        )
    }

    /// Does this tileset own the given global id?
    pub fn contains_gid(&self, gid: u32) -> bool {
        let count = if self.tile_width > 0 && self.tile_height > 0 {
            self.columns() * ((self.image_height / self.tile_height).max(1) as u32)
        } else {
            0
        };
        gid >= self.first_id && gid < self.first_id + count.max(1)
    }

    pub fn tile_property(&self, local_id: u32, key: &str) -> Option<&str> {
        self.tile_properties.get(&local_id)?.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tileset() -> Tileset {
        Tileset {
            first_id: 1,
            tile_width: 16,
            tile_height: 16,
            image: Some("tiles.png".to_string()),
            image_width: 64,
            image_height: 32,
            ..Tileset::default()
        }
    }

    #[test]
    fn test_columns() {
        assert_eq!(tileset().columns(), 4);
    }

    #[test]
    fn test_tile_source_rect() {
        let ts = tileset();
        assert_eq!(ts.tile_source_rect(0), Rect::new(0.0, 0.0, 16.0, 16.0));
        assert_eq!(ts.tile_source_rect(5), Rect::new(16.0, 16.0, 16.0, 16.0));
    }

    #[test]
    fn test_contains_gid() {
        let ts = tileset();
        assert!(ts.contains_gid(1));
        assert!(ts.contains_gid(8));
        assert!(!ts.contains_gid(0));
        assert!(!ts.contains_gid(9));
    }
}
