//! Asset cache.
//!
//! Interns shared immutable data by normalized filename so every holder of
//! the same sprite file sees one `Rc<SpriteData>`. Textures and sounds are
//! loaded by their backends; the cache only interns their keys so lookups
//! agree on spelling. Cached entries outlive individual maps until released.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::rc::Rc;

use crate::error::Result;
use crate::sprite::SpriteData;
use crate::sprite::loader;

/// Normalize a filename into a cache key.
pub fn normalize_key(filename: &str) -> String {
    filename.replace('\\', "/")
}

#[derive(Default)]
pub struct AssetCache {
    sprites: FxHashMap<String, Rc<SpriteData>>,
    /// Texture filenames seen so far; the render backend resolves them.
    textures: FxHashSet<String>,
    /// Sound filenames seen so far; the audio thread resolves them.
    sounds: FxHashSet<String>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or fetch the cached) sprite data for a file. Failures are not
    /// cached so a later retry can succeed after the file is fixed.
    pub fn sprite(&mut self, filename: &str) -> Result<Rc<SpriteData>> {
        let key = normalize_key(filename);
        if let Some(data) = self.sprites.get(&key) {
            return Ok(data.clone());
        }
        let data = Rc::new(loader::load_sprite(Path::new(&key))?);
        self.register_sprite_assets(&data);
        self.sprites.insert(key, data.clone());
        Ok(data)
    }

    /// Insert pre-built sprite data, used by tests and generated sprites.
    pub fn insert_sprite(&mut self, data: Rc<SpriteData>) {
        let key = normalize_key(&data.filename);
        self.register_sprite_assets(&data);
        self.sprites.insert(key, data);
    }

    pub fn cached_sprite(&self, filename: &str) -> Option<Rc<SpriteData>> {
        self.sprites.get(&normalize_key(filename)).cloned()
    }

    fn register_sprite_assets(&mut self, data: &SpriteData) {
        if let Some(image) = &data.image {
            self.intern_texture(image);
        }
        for pose in &data.poses {
            if let Some(image) = &pose.image {
                self.intern_texture(image);
            }
            for frame in &pose.frames {
                if let Some(image) = &frame.image {
                    self.intern_texture(image);
                }
                if let Some(sound) = &frame.sound_file {
                    self.intern_sound(sound);
                }
            }
        }
    }

    pub fn intern_texture(&mut self, filename: &str) -> String {
        let key = normalize_key(filename);
        self.textures.insert(key.clone());
        key
    }

    pub fn intern_sound(&mut self, filename: &str) -> String {
        let key = normalize_key(filename);
        self.sounds.insert(key.clone());
        key
    }

    pub fn texture_keys(&self) -> impl Iterator<Item = &String> {
        self.textures.iter()
    }

    pub fn sound_keys(&self) -> impl Iterator<Item = &String> {
        self.sounds.iter()
    }

    /// Drop a cached entry; shared holders keep their `Rc` alive until they
    /// are gone themselves.
    pub fn release(&mut self, filename: &str) {
        let key = normalize_key(filename);
        self.sprites.remove(&key);
        self.textures.remove(&key);
        self.sounds.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::data::{Frame, Pose};

    fn sample_sprite(name: &str) -> Rc<SpriteData> {
        Rc::new(SpriteData {
            filename: name.to_string(),
            image: Some("img/hero.png".to_string()),
            poses: vec![Pose {
                frames: vec![Frame {
                    sound_file: Some("sfx/step.wav".to_string()),
                    ..Frame::default()
                }],
                ..Pose::default()
            }],
            ..SpriteData::default()
        })
    }

    #[test]
    fn test_insert_and_fetch_shares_rc() {
        let mut cache = AssetCache::new();
        cache.insert_sprite(sample_sprite("sprites\\hero.xml"));
        let a = cache.cached_sprite("sprites/hero.xml").unwrap();
        let b = cache.cached_sprite("sprites\\hero.xml").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_referenced_assets_interned() {
        let mut cache = AssetCache::new();
        cache.insert_sprite(sample_sprite("hero.xml"));
        assert!(cache.texture_keys().any(|k| k == "img/hero.png"));
        assert!(cache.sound_keys().any(|k| k == "sfx/step.wav"));
    }

    #[test]
    fn test_release_evicts() {
        let mut cache = AssetCache::new();
        cache.insert_sprite(sample_sprite("hero.xml"));
        cache.release("hero.xml");
        assert!(cache.cached_sprite("hero.xml").is_none());
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut cache = AssetCache::new();
        assert!(cache.sprite("/nonexistent/sprite.xml").is_err());
    }
}
