//! TMX map reading and writing.
//!
//! Orthogonal maps only; tile data is base64-encoded, zlib-compressed
//! little-endian u32 gids. Unknown properties are carried verbatim in the
//! property bags, so loading a map and saving it again round-trips cleanly
//! for maps without shader or uniform properties.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use glam::Vec2;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rustc_hash::FxHashMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::assets::AssetCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::map::layer::{ImageLayer, Layer, LayerKind, ObjectLayer, TileLayer};
use crate::map::object::{
    DrawOrder, MapObject, OutlineConditions, PassthroughType, ScriptContext,
};
use crate::map::tileset::Tileset;
use crate::map::{Map, Properties};
use crate::sprite::Sprite;
use crate::util::color::Color;
use crate::util::direction::Direction;
use crate::util::rect::Circle;

pub fn load_map(
    path: &Path,
    assets: &mut AssetCache,
    config: &Config,
    ticks: i64,
) -> Result<Map> {
    let filename = path.to_string_lossy().into_owned();
    let xml = std::fs::read_to_string(path).map_err(|source| Error::Asset {
        path: filename.clone(),
        source,
    })?;
    parse_map(&xml, &filename, assets, config, ticks)
}

pub fn save_map(map: &Map, path: &Path) -> Result<()> {
    let xml = map_to_xml(map)?;
    std::fs::write(path, xml).map_err(|source| Error::Asset {
        path: path.to_string_lossy().into_owned(),
        source,
    })
}

// ==================== Reading ====================

fn attributes(e: &BytesStart, file: &str) -> Result<FxHashMap<String, String>> {
    let mut map = FxHashMap::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::format(file, err.to_string()))?;
        map.insert(
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            attr.unescape_value()
                .map_err(|err| Error::format(file, err.to_string()))?
                .into_owned(),
        );
    }
    Ok(map)
}

fn decode_tile_data(text: &str, file: &str, expected: usize) -> Result<Vec<u32>> {
    let compressed = BASE64
        .decode(text.trim())
        .map_err(|e| Error::format(file, format!("bad base64 tile data: {}", e)))?;
    let mut bytes = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut bytes)
        .map_err(|e| Error::format(file, format!("bad zlib tile data: {}", e)))?;
    if bytes.len() != expected * 4 {
        return Err(Error::format(
            file,
            format!(
                "tile data holds {} bytes, expected {}",
                bytes.len(),
                expected * 4
            ),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn encode_tile_data(tiles: &[u32]) -> Result<String> {
    let mut bytes = Vec::with_capacity(tiles.len() * 4);
    for tile in tiles {
        bytes.extend_from_slice(&tile.to_le_bytes());
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&bytes)
        .and_then(|_| encoder.finish())
        .map(|compressed| BASE64.encode(compressed))
        .map_err(|e| Error::format("map", format!("zlib compression failed: {}", e)))
}

/// What an upcoming `<properties>` block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyTarget {
    Map,
    Tileset,
    TilesetTile(u32),
    Layer,
    Object,
}

struct MapParser<'a> {
    filename: &'a str,
    assets: &'a mut AssetCache,
    ticks: i64,
    map: Map,
    tileset: Option<Tileset>,
    tileset_tile: Option<u32>,
    layer: Option<Layer>,
    layer_kind: Option<LayerKind>,
    object: Option<PendingObject>,
    object_layer_index: Option<usize>,
    data_attrs: Option<(String, String)>,
    data_text: String,
    /// Objects parsed for the current object group.
    pending_objects: Vec<PendingObject>,
}

struct PendingObject {
    object: MapObject,
    sprite_file: Option<String>,
    has_ellipse: bool,
    width: f32,
    height: f32,
}

impl MapParser<'_> {
    fn property_target(&self) -> PropertyTarget {
        if self.object.is_some() {
            PropertyTarget::Object
        } else if let Some(tile) = self.tileset_tile {
            PropertyTarget::TilesetTile(tile)
        } else if self.tileset.is_some() {
            PropertyTarget::Tileset
        } else if self.layer.is_some() {
            PropertyTarget::Layer
        } else {
            PropertyTarget::Map
        }
    }

    fn apply_property(&mut self, name: &str, value: &str) -> Result<()> {
        match self.property_target() {
            PropertyTarget::Map => self.map.properties.set(name, value),
            PropertyTarget::Tileset => {
                if let Some(tileset) = &mut self.tileset {
                    tileset
                        .tile_properties
                        .entry(u32::MAX)
                        .or_default()
                        .set(name, value);
                }
            }
            PropertyTarget::TilesetTile(tile) => {
                if let Some(tileset) = &mut self.tileset {
                    tileset
                        .tile_properties
                        .entry(tile)
                        .or_default()
                        .set(name, value);
                }
            }
            PropertyTarget::Layer => self.apply_layer_property(name, value),
            PropertyTarget::Object => return self.apply_object_property(name, value),
        }
        Ok(())
    }

    fn apply_layer_property(&mut self, name: &str, value: &str) {
        let Some(layer) = &mut self.layer else { return };
        match (&mut self.layer_kind, name) {
            (Some(LayerKind::Image(image)), "xspeed") => {
                image.velocity.x = value.parse().unwrap_or(0.0);
            }
            (Some(LayerKind::Image(image)), "yspeed") => {
                image.velocity.y = value.parse().unwrap_or(0.0);
            }
            (Some(LayerKind::Image(image)), "repeat") => image.repeat = value == "true",
            (Some(LayerKind::Image(image)), "fixed") => image.fixed = value == "true",
            (_, "vertex-shader") => layer.vertex_shader = Some(value.to_string()),
            (_, "fragment-shader") => layer.fragment_shader = Some(value.to_string()),
            _ => layer.properties.set(name, value),
        }
        // Sprite-backed image layers load on layer close, from the bag.
        if name == "sprite" {
            layer.properties.set(name, value);
        }
    }

    fn apply_object_property(&mut self, name: &str, value: &str) -> Result<()> {
        let Some(pending) = &mut self.object else {
            return Ok(());
        };
        let object = &mut pending.object;
        match name {
            "sprite" => pending.sprite_file = Some(value.to_string()),
            "direction" => object.direction = Direction::parse(value),
            "pose" => object.properties.set("pose", value),
            "state" => object.properties.set("state", value),
            "face-state" => object.face_state = value.to_uppercase(),
            "walk-state" => object.walk_state = value.to_uppercase(),
            "speed" => object.speed = value.parse().unwrap_or(1.0),
            "opacity" => object.opacity = value.parse().unwrap_or(1.0),
            "color" => {
                if let Some(color) = Color::from_hex(value) {
                    object.color = color;
                }
            }
            "passthrough" => object.passthrough = value == "true",
            "passthrough-type" => {
                object.passthrough_type = match value.to_lowercase().as_str() {
                    "initiator" => PassthroughType::Initiator,
                    "receiver" => PassthroughType::Receiver,
                    _ => PassthroughType::Both,
                }
            }
            "override-tile-collision" => object.override_tile_collision = value == "true",
            "strict-multidirectional-movement" => {
                object.strict_multidirectional_movement = value == "true"
            }
            "use-layer-color" => object.use_layer_color = value == "true",
            "sound-attenuation" => object.sound_attenuation_enabled = value == "true",
            "script" => object.trigger_script = value.to_string(),
            "touch-script" => object.touch_script = value.to_string(),
            "leave-script" => object.leave_script = value.to_string(),
            "script-context" => {
                object.script_context = if value.eq_ignore_ascii_case("global") {
                    ScriptContext::Global
                } else {
                    ScriptContext::Map
                }
            }
            "draw-order" => {
                object.draw_order = match value.to_lowercase().as_str() {
                    "below" => DrawOrder::Below,
                    "above" => DrawOrder::Above,
                    _ => DrawOrder::Normal,
                }
            }
            "outline-conditions" => {
                let mut conditions = OutlineConditions::empty();
                for part in crate::util::split_trimmed(&value.to_uppercase(), ',') {
                    conditions |= match part.as_str() {
                        "NEVER" => OutlineConditions::NEVER,
                        "TOUCHED" => OutlineConditions::TOUCHED,
                        "PROXIMATE" => OutlineConditions::PROXIMATE,
                        "SOLID" => OutlineConditions::SOLID,
                        "SCRIPT" => OutlineConditions::SCRIPT,
                        _ => OutlineConditions::empty(),
                    };
                }
                object.outline_conditions = conditions;
            }
            _ => object.properties.set(name, value),
        }
        Ok(())
    }

    fn finish_object(&mut self) -> Result<()> {
        let Some(mut pending) = self.object.take() else {
            return Ok(());
        };
        if pending.has_ellipse {
            if (pending.width - pending.height).abs() > 0.01 {
                return Err(Error::CollisionMisconfig(format!(
                    "ellipse object '{}' must be circular ({}x{})",
                    pending.object.name(),
                    pending.width,
                    pending.height
                )));
            }
            let radius = pending.width * 0.5;
            pending.object.ellipse = Some(Circle::new(radius, radius, radius));
        }
        if let Some(sprite_file) = &pending.sprite_file {
            let data = self.assets.sprite(sprite_file)?;
            let sprite = Sprite::new(data, self.ticks);
            pending.object.set_sprite(sprite, self.ticks);
            let pose = pending
                .object
                .properties
                .get("pose")
                .unwrap_or("")
                .to_string();
            if !pose.is_empty() {
                pending
                    .object
                    .show_pose(&pose, "", Direction::NONE, self.ticks);
            }
        }
        self.pending_objects.push(pending);
        Ok(())
    }

    fn finish_layer(&mut self) {
        let (Some(mut layer), Some(kind)) = (self.layer.take(), self.layer_kind.take()) else {
            return;
        };
        layer.kind = kind;
        let index = self.map.add_layer(layer);
        if matches!(self.map.layers[index].kind, LayerKind::Object(_)) {
            self.object_layer_index = Some(index);
            for pending in self.pending_objects.drain(..) {
                self.map.add_object(pending.object, Some(index));
            }
        }
    }
}

pub fn parse_map(
    xml: &str,
    filename: &str,
    assets: &mut AssetCache,
    config: &Config,
    ticks: i64,
) -> Result<Map> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parser = MapParser {
        filename,
        assets,
        ticks,
        map: Map::new(0, 0, 0, 0),
        tileset: None,
        tileset_tile: None,
        layer: None,
        layer_kind: None,
        object: None,
        object_layer_index: None,
        data_attrs: None,
        data_text: String::new(),
        pending_objects: Vec::new(),
    };
    let mut seen_map = false;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::format(filename, e.to_string()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = attributes(e, filename)?;
                let get_i32 =
                    |key: &str| attrs.get(key).and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);
                let get_f32 =
                    |key: &str| attrs.get(key).and_then(|v| v.parse::<f32>().ok()).unwrap_or(0.0);
                match name.as_str() {
                    "map" => {
                        seen_map = true;
                        if let Some(orientation) = attrs.get("orientation")
                            && orientation != "orthogonal"
                        {
                            return Err(Error::format(
                                filename,
                                format!("unsupported orientation '{}'", orientation),
                            ));
                        }
                        parser.map = Map::new(
                            get_i32("width"),
                            get_i32("height"),
                            get_i32("tilewidth"),
                            get_i32("tileheight"),
                        );
                        parser.map.filename = filename.to_string();
                        parser.map.proximity_distance = config.player.proximity_distance;
                        parser.map.edge_tolerance_pixels = config.player.edge_tolerance_pixels;
                    }
                    "tileset" => {
                        let tileset = Tileset {
                            first_id: attrs
                                .get("firstgid")
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(1),
                            name: attrs.get("name").cloned().unwrap_or_default(),
                            tile_width: get_i32("tilewidth"),
                            tile_height: get_i32("tileheight"),
                            ..Tileset::default()
                        };
                        if empty {
                            parser.map.add_tileset(tileset);
                        } else {
                            parser.tileset = Some(tileset);
                        }
                    }
                    "tile" => {
                        parser.tileset_tile = attrs.get("id").and_then(|v| v.parse().ok());
                        if empty {
                            parser.tileset_tile = None;
                        }
                    }
                    "image" => {
                        let source = attrs.get("source").cloned().unwrap_or_default();
                        let trans = attrs.get("trans").and_then(|v| Color::from_hex(v));
                        if let Some(tileset) = &mut parser.tileset {
                            parser.assets.intern_texture(&source);
                            tileset.image = Some(source);
                            tileset.image_width = get_i32("width");
                            tileset.image_height = get_i32("height");
                            tileset.transparent_color = trans;
                        } else if let Some(LayerKind::Image(image)) = &mut parser.layer_kind {
                            parser.assets.intern_texture(&source);
                            image.image = Some(source);
                        }
                    }
                    "layer" => {
                        let width = get_i32("width");
                        let height = get_i32("height");
                        let mut layer = Layer::new(
                            attrs.get("name").cloned().unwrap_or_default(),
                            width,
                            height,
                            LayerKind::Tile(TileLayer::default()),
                        );
                        if let Some(opacity) = attrs.get("opacity") {
                            layer.set_opacity(opacity.parse().unwrap_or(1.0));
                        }
                        layer.visible = attrs.get("visible").map(String::as_str) != Some("0");
                        parser.layer = Some(layer);
                        parser.layer_kind = Some(LayerKind::Tile(TileLayer::default()));
                    }
                    "imagelayer" => {
                        let mut layer = Layer::new(
                            attrs.get("name").cloned().unwrap_or_default(),
                            parser.map.width(),
                            parser.map.height(),
                            LayerKind::Tile(TileLayer::default()),
                        );
                        if let Some(opacity) = attrs.get("opacity") {
                            layer.set_opacity(opacity.parse().unwrap_or(1.0));
                        }
                        layer.visible = attrs.get("visible").map(String::as_str) != Some("0");
                        parser.layer = Some(layer);
                        parser.layer_kind = Some(LayerKind::Image(ImageLayer::default()));
                    }
                    "objectgroup" => {
                        let mut layer = Layer::new(
                            attrs.get("name").cloned().unwrap_or_default(),
                            parser.map.width(),
                            parser.map.height(),
                            LayerKind::Tile(TileLayer::default()),
                        );
                        if let Some(opacity) = attrs.get("opacity") {
                            layer.set_opacity(opacity.parse().unwrap_or(1.0));
                        }
                        layer.visible = attrs.get("visible").map(String::as_str) != Some("0");
                        let mut object_layer = ObjectLayer::default();
                        if let Some(tint) = attrs.get("tintcolor").and_then(|v| Color::from_hex(v))
                        {
                            object_layer.tint_color = tint;
                        }
                        parser.layer = Some(layer);
                        parser.layer_kind = Some(LayerKind::Object(object_layer));
                        if empty {
                            parser.finish_layer();
                        }
                    }
                    "object" => {
                        let id = get_i32("id");
                        let mut object =
                            MapObject::new(id, attrs.get("name").map(String::as_str).unwrap_or(""));
                        object.object_type = attrs.get("type").cloned().unwrap_or_default();
                        let width = get_f32("width");
                        let height = get_f32("height");
                        let gid = attrs.get("gid").and_then(|v| v.parse().ok()).unwrap_or(0);
                        object.gid = gid;
                        object.size = Vec2::new(width, height);
                        // Tile objects anchor at their bottom-left in TMX.
                        let y = get_f32("y");
                        object.position = Vec2::new(
                            get_f32("x"),
                            if gid > 0 { y - height } else { y },
                        );
                        object.set_visible(
                            attrs.get("visible").map(String::as_str) != Some("0"),
                            ticks,
                        );
                        let pending = PendingObject {
                            object,
                            sprite_file: None,
                            has_ellipse: false,
                            width,
                            height,
                        };
                        if empty {
                            parser.object = Some(pending);
                            parser.finish_object()?;
                        } else {
                            parser.object = Some(pending);
                        }
                    }
                    "ellipse" => {
                        if let Some(pending) = &mut parser.object {
                            pending.has_ellipse = true;
                        }
                    }
                    "data" => {
                        parser.data_attrs = Some((
                            attrs.get("encoding").cloned().unwrap_or_default(),
                            attrs.get("compression").cloned().unwrap_or_default(),
                        ));
                        parser.data_text.clear();
                    }
                    "property" => {
                        let name = attrs.get("name").cloned().unwrap_or_default();
                        let value = attrs.get("value").cloned().unwrap_or_default();
                        parser.apply_property(&name, &value)?;
                    }
                    _ => {}
                }
            }
            Event::Text(ref text) => {
                if parser.data_attrs.is_some() {
                    parser.data_text.push_str(
                        &text
                            .unescape()
                            .map_err(|e| Error::format(filename, e.to_string()))?,
                    );
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"tileset" => {
                    if let Some(tileset) = parser.tileset.take() {
                        parser.map.add_tileset(tileset);
                    }
                }
                b"tile" => parser.tileset_tile = None,
                b"data" => {
                    if let Some((encoding, compression)) = parser.data_attrs.take() {
                        if encoding != "base64" || compression != "zlib" {
                            return Err(Error::format(
                                filename,
                                format!(
                                    "unsupported tile data encoding '{}'/'{}'",
                                    encoding, compression
                                ),
                            ));
                        }
                        let expected = parser
                            .layer
                            .as_ref()
                            .map(|l| (l.width * l.height) as usize)
                            .unwrap_or(0);
                        let tiles =
                            decode_tile_data(&parser.data_text, parser.filename, expected)?;
                        if let Some(LayerKind::Tile(tile_layer)) = &mut parser.layer_kind {
                            tile_layer.tiles = tiles;
                        }
                    }
                }
                b"object" => parser.finish_object()?,
                b"layer" | b"imagelayer" | b"objectgroup" => parser.finish_layer(),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_map {
        return Err(Error::format(filename, "Missing map node"));
    }
    finish_map(&mut parser)?;
    Ok(parser.map)
}

/// Post-parse fixups: sprite image layers, gid object sizes.
fn finish_map(parser: &mut MapParser) -> Result<()> {
    let ticks = parser.ticks;
    // Sprite-backed image layers.
    let mut layer_sprites: Vec<(usize, String)> = Vec::new();
    for (index, layer) in parser.map.layers.iter().enumerate() {
        if let LayerKind::Image(_) = layer.kind
            && let Some(sprite_file) = layer.properties.get("sprite")
        {
            layer_sprites.push((index, sprite_file.to_string()));
        }
    }
    for (index, sprite_file) in layer_sprites {
        let data = parser.assets.sprite(&sprite_file)?;
        if let LayerKind::Image(image) = &mut parser.map.layers[index].kind {
            image.sprite = Some(Sprite::new(data, ticks));
        }
    }
    // Tile objects inherit their tileset's tile size when unsized.
    let fixes: Vec<(i32, Vec2)> = parser
        .map
        .objects()
        .filter(|object| object.gid > 0 && object.size == Vec2::ZERO)
        .map(|object| {
            let size = parser
                .map
                .tileset_for_gid(object.gid)
                .map(|tileset| {
                    Vec2::new(tileset.tile_width as f32, tileset.tile_height as f32)
                })
                .unwrap_or(Vec2::ZERO);
            (object.id(), size)
        })
        .collect();
    for (id, size) in fixes {
        if let Some(object) = parser.map.get_object_mut(id) {
            object.size = size;
        }
    }
    Ok(())
}

// ==================== Writing ====================

type XmlWriter = Writer<Vec<u8>>;

fn write_error(e: impl std::fmt::Display) -> Error {
    Error::format("map", e.to_string())
}

fn write_properties(writer: &mut XmlWriter, properties: &Properties) -> Result<()> {
    if properties.is_empty() {
        return Ok(());
    }
    writer
        .write_event(Event::Start(BytesStart::new("properties")))
        .map_err(write_error)?;
    for (name, value) in properties.iter() {
        let mut property = BytesStart::new("property");
        property.push_attribute(("name", name.as_str()));
        property.push_attribute(("value", value.as_str()));
        writer
            .write_event(Event::Empty(property))
            .map_err(write_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("properties")))
        .map_err(write_error)?;
    Ok(())
}

fn object_properties(object: &MapObject) -> Properties {
    let mut properties = Properties::default();
    if let Some(sprite) = object.sprite() {
        properties.set("sprite", sprite.filename());
    }
    if object.direction != Direction::DOWN {
        properties.set("direction", object.direction.to_string());
    }
    if (object.speed - 1.0).abs() > f32::EPSILON {
        properties.set("speed", object.speed.to_string());
    }
    if object.passthrough {
        properties.set("passthrough", "true");
    }
    match object.passthrough_type {
        PassthroughType::Both => {}
        PassthroughType::Initiator => {
            properties.set("passthrough-type", "initiator");
        }
        PassthroughType::Receiver => {
            properties.set("passthrough-type", "receiver");
        }
    }
    if object.override_tile_collision {
        properties.set("override-tile-collision", "true");
    }
    if object.strict_multidirectional_movement {
        properties.set("strict-multidirectional-movement", "true");
    }
    if !object.trigger_script.is_empty() {
        properties.set("script", &object.trigger_script);
    }
    if !object.touch_script.is_empty() {
        properties.set("touch-script", &object.touch_script);
    }
    if !object.leave_script.is_empty() {
        properties.set("leave-script", &object.leave_script);
    }
    if object.script_context == ScriptContext::Global {
        properties.set("script-context", "global");
    }
    match object.draw_order {
        DrawOrder::Normal => {}
        DrawOrder::Below => properties.set("draw-order", "below"),
        DrawOrder::Above => properties.set("draw-order", "above"),
    }
    for (name, value) in object.properties.iter() {
        properties.set(name, value.clone());
    }
    properties
}

pub fn map_to_xml(map: &Map) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_error)?;

    let mut map_start = BytesStart::new("map");
    map_start.push_attribute(("version", "1.0"));
    map_start.push_attribute(("orientation", "orthogonal"));
    map_start.push_attribute(("width", map.width().to_string().as_str()));
    map_start.push_attribute(("height", map.height().to_string().as_str()));
    map_start.push_attribute(("tilewidth", map.tile_width().to_string().as_str()));
    map_start.push_attribute(("tileheight", map.tile_height().to_string().as_str()));
    writer
        .write_event(Event::Start(map_start))
        .map_err(write_error)?;

    write_properties(&mut writer, &map.properties)?;

    for tileset in &map.tilesets {
        let mut start = BytesStart::new("tileset");
        start.push_attribute(("firstgid", tileset.first_id.to_string().as_str()));
        start.push_attribute(("name", tileset.name.as_str()));
        start.push_attribute(("tilewidth", tileset.tile_width.to_string().as_str()));
        start.push_attribute(("tileheight", tileset.tile_height.to_string().as_str()));
        writer
            .write_event(Event::Start(start))
            .map_err(write_error)?;
        if let Some(image) = &tileset.image {
            let mut image_start = BytesStart::new("image");
            image_start.push_attribute(("source", image.as_str()));
            image_start.push_attribute(("width", tileset.image_width.to_string().as_str()));
            image_start.push_attribute(("height", tileset.image_height.to_string().as_str()));
            if let Some(trans) = &tileset.transparent_color {
                image_start.push_attribute(("trans", trans.to_hex().as_str()));
            }
            writer
                .write_event(Event::Empty(image_start))
                .map_err(write_error)?;
        }
        let mut tile_ids: Vec<u32> = tileset
            .tile_properties
            .keys()
            .copied()
            .filter(|&id| id != u32::MAX)
            .collect();
        tile_ids.sort_unstable();
        for tile_id in tile_ids {
            let mut tile_start = BytesStart::new("tile");
            tile_start.push_attribute(("id", tile_id.to_string().as_str()));
            writer
                .write_event(Event::Start(tile_start))
                .map_err(write_error)?;
            write_properties(&mut writer, &tileset.tile_properties[&tile_id])?;
            writer
                .write_event(Event::End(BytesEnd::new("tile")))
                .map_err(write_error)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("tileset")))
            .map_err(write_error)?;
    }

    for layer in &map.layers {
        match &layer.kind {
            LayerKind::Tile(tile_layer) => {
                let mut start = BytesStart::new("layer");
                start.push_attribute(("name", layer.name.as_str()));
                start.push_attribute(("width", layer.width.to_string().as_str()));
                start.push_attribute(("height", layer.height.to_string().as_str()));
                if layer.opacity < 1.0 {
                    start.push_attribute(("opacity", layer.opacity.to_string().as_str()));
                }
                if !layer.visible {
                    start.push_attribute(("visible", "0"));
                }
                writer
                    .write_event(Event::Start(start))
                    .map_err(write_error)?;
                write_properties(&mut writer, &layer.properties)?;
                let mut data_start = BytesStart::new("data");
                data_start.push_attribute(("encoding", "base64"));
                data_start.push_attribute(("compression", "zlib"));
                writer
                    .write_event(Event::Start(data_start))
                    .map_err(write_error)?;
                writer
                    .write_event(Event::Text(BytesText::new(&encode_tile_data(
                        &tile_layer.tiles,
                    )?)))
                    .map_err(write_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new("data")))
                    .map_err(write_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new("layer")))
                    .map_err(write_error)?;
            }
            LayerKind::Image(image) => {
                let mut start = BytesStart::new("imagelayer");
                start.push_attribute(("name", layer.name.as_str()));
                if layer.opacity < 1.0 {
                    start.push_attribute(("opacity", layer.opacity.to_string().as_str()));
                }
                if !layer.visible {
                    start.push_attribute(("visible", "0"));
                }
                writer
                    .write_event(Event::Start(start))
                    .map_err(write_error)?;
                if let Some(source) = &image.image {
                    let mut image_start = BytesStart::new("image");
                    image_start.push_attribute(("source", source.as_str()));
                    writer
                        .write_event(Event::Empty(image_start))
                        .map_err(write_error)?;
                }
                let mut properties = layer.properties.clone();
                if image.velocity.x != 0.0 {
                    properties.set("xspeed", image.velocity.x.to_string());
                }
                if image.velocity.y != 0.0 {
                    properties.set("yspeed", image.velocity.y.to_string());
                }
                if image.repeat {
                    properties.set("repeat", "true");
                }
                if image.fixed {
                    properties.set("fixed", "true");
                }
                write_properties(&mut writer, &properties)?;
                writer
                    .write_event(Event::End(BytesEnd::new("imagelayer")))
                    .map_err(write_error)?;
            }
            LayerKind::Object(object_layer) => {
                let mut start = BytesStart::new("objectgroup");
                start.push_attribute(("name", layer.name.as_str()));
                if layer.opacity < 1.0 {
                    start.push_attribute(("opacity", layer.opacity.to_string().as_str()));
                }
                if !layer.visible {
                    start.push_attribute(("visible", "0"));
                }
                if object_layer.tint_color != Color::default() {
                    start.push_attribute((
                        "tintcolor",
                        object_layer.tint_color.to_hex().as_str(),
                    ));
                }
                writer
                    .write_event(Event::Start(start))
                    .map_err(write_error)?;
                write_properties(&mut writer, &layer.properties)?;
                for &object_id in &object_layer.object_ids {
                    let Some(object) = map.get_object(object_id) else {
                        continue;
                    };
                    let mut object_start = BytesStart::new("object");
                    object_start.push_attribute(("id", object.id().to_string().as_str()));
                    object_start.push_attribute(("name", object.name()));
                    if !object.object_type.is_empty() {
                        object_start.push_attribute(("type", object.object_type.as_str()));
                    }
                    object_start.push_attribute(("x", object.position.x.to_string().as_str()));
                    let y = if object.gid > 0 {
                        object.position.y + object.size.y
                    } else {
                        object.position.y
                    };
                    object_start.push_attribute(("y", y.to_string().as_str()));
                    object_start
                        .push_attribute(("width", object.size.x.to_string().as_str()));
                    object_start
                        .push_attribute(("height", object.size.y.to_string().as_str()));
                    if object.gid > 0 {
                        object_start.push_attribute(("gid", object.gid.to_string().as_str()));
                    }
                    if !object.is_visible() {
                        object_start.push_attribute(("visible", "0"));
                    }
                    writer
                        .write_event(Event::Start(object_start))
                        .map_err(write_error)?;
                    if object.ellipse.is_some() {
                        writer
                            .write_event(Event::Empty(BytesStart::new("ellipse")))
                            .map_err(write_error)?;
                    }
                    write_properties(&mut writer, &object_properties(object))?;
                    writer
                        .write_event(Event::End(BytesEnd::new("object")))
                        .map_err(write_error)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new("objectgroup")))
                    .map_err(write_error)?;
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("map")))
        .map_err(write_error)?;
    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|e| Error::format("map", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tiles(width: usize, height: usize) -> Vec<u32> {
        (0..width * height).map(|i| (i % 7) as u32).collect()
    }

    fn sample_xml() -> String {
        let data = encode_tile_data(&sample_tiles(4, 3)).unwrap();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.0" orientation="orthogonal" width="4" height="3" tilewidth="16" tileheight="16">
 <properties>
  <property name="music" value="bgm/town.ogg"/>
 </properties>
 <tileset firstgid="1" name="ground" tilewidth="16" tileheight="16">
  <image source="tiles.png" width="64" height="32" trans="ffff00ff"/>
  <tile id="2">
   <properties>
    <property name="terrain" value="water"/>
   </properties>
  </tile>
 </tileset>
 <layer name="ground" width="4" height="3">
  <data encoding="base64" compression="zlib">{data}</data>
 </layer>
 <imagelayer name="sky">
  <image source="sky.png"/>
  <properties>
   <property name="xspeed" value="2"/>
   <property name="repeat" value="true"/>
  </properties>
 </imagelayer>
 <objectgroup name="objects">
  <object id="5" name="door" type="door" x="32" y="16" width="16" height="16">
   <properties>
    <property name="passthrough" value="true"/>
    <property name="script" value="scripts/door.lua"/>
    <property name="quest-flag" value="chapter1"/>
   </properties>
  </object>
  <object id="9" name="well" x="48" y="32" width="16" height="16">
   <ellipse/>
  </object>
 </objectgroup>
</map>"#
        )
    }

    fn parse(xml: &str) -> Map {
        let mut assets = AssetCache::new();
        let config = Config::new();
        parse_map(xml, "test.tmx", &mut assets, &config, 0).unwrap()
    }

    #[test]
    fn test_parse_basics() {
        let map = parse(&sample_xml());
        assert_eq!(map.width(), 4);
        assert_eq!(map.height(), 3);
        assert_eq!(map.tile_width(), 16);
        assert_eq!(map.properties.get("music"), Some("bgm/town.ogg"));
        assert_eq!(map.tilesets.len(), 1);
        assert_eq!(map.tilesets[0].tile_property(2, "terrain"), Some("water"));
        assert_eq!(map.layers.len(), 3);
    }

    #[test]
    fn test_parse_tile_data() {
        let map = parse(&sample_xml());
        let tile_layer = map.layers[0].as_tile().unwrap();
        assert_eq!(tile_layer.tiles, sample_tiles(4, 3));
    }

    #[test]
    fn test_parse_image_layer() {
        let map = parse(&sample_xml());
        match &map.layers[1].kind {
            LayerKind::Image(image) => {
                assert_eq!(image.image.as_deref(), Some("sky.png"));
                assert_eq!(image.velocity.x, 2.0);
                assert!(image.repeat);
            }
            _ => panic!("expected image layer"),
        }
    }

    #[test]
    fn test_parse_objects() {
        let map = parse(&sample_xml());
        let door = map.get_object_by_name("door").unwrap();
        assert_eq!(door.id(), 5);
        assert_eq!(door.object_type, "door");
        assert_eq!(door.position, Vec2::new(32.0, 16.0));
        assert!(door.passthrough);
        assert_eq!(door.trigger_script, "scripts/door.lua");
        assert_eq!(door.properties.get("quest-flag"), Some("chapter1"));
        assert!(door.is_area());

        let well = map.get_object_by_name("well").unwrap();
        assert!(well.bounding_circle().is_some());
    }

    #[test]
    fn test_non_circular_ellipse_fails() {
        let xml = r#"<map orientation="orthogonal" width="2" height="2" tilewidth="16" tileheight="16">
 <objectgroup name="objects">
  <object id="1" name="oval" x="0" y="0" width="32" height="16">
   <ellipse/>
  </object>
 </objectgroup>
</map>"#;
        let mut assets = AssetCache::new();
        let config = Config::new();
        let result = parse_map(xml, "bad.tmx", &mut assets, &config, 0);
        assert!(matches!(result, Err(Error::CollisionMisconfig(_))));
    }

    #[test]
    fn test_unsupported_encoding_fails() {
        let xml = r#"<map orientation="orthogonal" width="1" height="1" tilewidth="16" tileheight="16">
 <layer name="ground" width="1" height="1">
  <data encoding="csv">1</data>
 </layer>
</map>"#;
        let mut assets = AssetCache::new();
        let config = Config::new();
        assert!(parse_map(xml, "bad.tmx", &mut assets, &config, 0).is_err());
    }

    #[test]
    fn test_roundtrip_structural_equivalence() {
        let original = parse(&sample_xml());
        let saved = map_to_xml(&original).unwrap();
        let reloaded = parse(&saved);

        assert_eq!(reloaded.width(), original.width());
        assert_eq!(reloaded.height(), original.height());
        assert_eq!(reloaded.layers.len(), original.layers.len());
        for (a, b) in original.layers.iter().zip(reloaded.layers.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(
                std::mem::discriminant(&a.kind),
                std::mem::discriminant(&b.kind)
            );
        }
        // Tile data bit-identical after the base64+zlib round trip.
        assert_eq!(
            original.layers[0].as_tile().unwrap().tiles,
            reloaded.layers[0].as_tile().unwrap().tiles
        );
        // Objects preserved, ids and all.
        assert_eq!(reloaded.object_count(), original.object_count());
        let door = reloaded.get_object_by_name("door").unwrap();
        assert_eq!(door.id(), 5);
        assert!(door.passthrough);
        assert_eq!(door.properties.get("quest-flag"), Some("chapter1"));
        // Map properties survive.
        assert_eq!(reloaded.properties.get("music"), Some("bgm/town.ogg"));
    }

    #[test]
    fn test_save_to_disk() {
        let dir = std::env::temp_dir().join("wickengine_test_tmx");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.tmx");
        let map = parse(&sample_xml());
        save_map(&map, &path).unwrap();
        assert!(path.exists());
        std::fs::remove_file(&path).ok();
    }
}
