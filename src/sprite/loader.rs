//! Sprite XML reader.
//!
//! ```xml
//! <Sprite Image="hero.png" Transparent-Color="ff00ff" Default-Pose="FACE">
//!   <Pose Duration="200" Repeats="-1" X-Origin="8" Y-Origin="16">
//!     <Tag Key="Name" Value="Face"/>
//!     <Tag Key="Direction" Value="Down"/>
//!     <Bounding-Box X="0" Y="8" Width="16" Height="8"/>
//!     <Frame Duration="100" Marker="blink" Sound="blink.wav">
//!       <Rectangle X="0" Y="0" Width="16" Height="24"/>
//!     </Frame>
//!   </Pose>
//! </Sprite>
//! ```

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rustc_hash::FxHashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::sprite::data::{Frame, Pose, SpriteData};
use crate::util::color::Color;
use crate::util::direction::Direction;
use crate::util::rect::{Circle, Rect};

pub fn load_sprite(path: &Path) -> Result<SpriteData> {
    let filename = path.to_string_lossy().into_owned();
    let xml = std::fs::read_to_string(path).map_err(|source| Error::Asset {
        path: filename.clone(),
        source,
    })?;
    parse_sprite(&xml, &filename)
}

fn attributes(e: &BytesStart, file: &str) -> Result<FxHashMap<String, String>> {
    let mut map = FxHashMap::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::format(file, err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::format(file, err.to_string()))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn parse_rect(attrs: &FxHashMap<String, String>) -> Rect {
    let get = |key: &str| attrs.get(key).and_then(|v| v.parse().ok()).unwrap_or(0.0);
    Rect::new(get("X"), get("Y"), get("Width"), get("Height"))
}

pub fn parse_sprite(xml: &str, filename: &str) -> Result<SpriteData> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut data = SpriteData {
        filename: filename.to_string(),
        ..SpriteData::default()
    };
    let mut seen_sprite = false;
    let mut pose: Option<Pose> = None;
    let mut frame: Option<Frame> = None;
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
                match name.as_str() {
                    "Sprite" => {
                        seen_sprite = true;
                        data.image = attrs.get("Image").cloned();
                        data.transparent_color = attrs
                            .get("Transparent-Color")
                            .and_then(|v| Color::from_hex(v));
                        data.default_pose = attrs
                            .get("Default-Pose")
                            .map(|v| v.to_uppercase())
                            .unwrap_or_default();
                    }
                    "Pose" => {
                        let mut new_pose = Pose {
                            transparent_color: data.transparent_color,
                            ..Pose::default()
                        };
                        if let Some(v) = attrs.get("Duration") {
                            new_pose.duration = v.parse().unwrap_or(new_pose.duration);
                        }
                        if let Some(v) = attrs.get("Repeats") {
                            new_pose.repeats = v.parse().unwrap_or(-1);
                        }
                        new_pose.require_completion =
                            attrs.get("Require-Completion").map(String::as_str) == Some("true");
                        if let Some(v) = attrs.get("Completion-Frames") {
                            let frames: Vec<usize> = crate::util::split_trimmed(v, ',')
                                .iter()
                                .filter_map(|p| p.parse().ok())
                                .collect();
                            if !frames.is_empty() {
                                new_pose.completion_frames = Some(frames);
                            }
                        }
                        if let Some(v) = attrs.get("X-Origin") {
                            new_pose.origin.x = v.parse().unwrap_or(0.0);
                        }
                        if let Some(v) = attrs.get("Y-Origin") {
                            new_pose.origin.y = v.parse().unwrap_or(0.0);
                        }
                        if let Some(v) = attrs.get("Transparent-Color") {
                            new_pose.transparent_color = Color::from_hex(v);
                        }
                        new_pose.image = attrs.get("Image").cloned();
                        if empty {
                            return Err(Error::format(
                                filename,
                                "Pose must have at least one frame",
                            ));
                        }
                        pose = Some(new_pose);
                    }
                    "Tag" => {
                        if let Some(pose) = pose.as_mut() {
                            let key = attrs
                                .get("Key")
                                .map(|v| v.to_uppercase())
                                .unwrap_or_default();
                            let value = attrs
                                .get("Value")
                                .map(|v| v.to_uppercase())
                                .unwrap_or_default();
                            match key.as_str() {
                                "NAME" => pose.name = value,
                                "STATE" => pose.state = value,
                                "DIRECTION" => pose.direction = Direction::parse(&value),
                                other => log::warn!(
                                    "Unknown pose tag key '{}' in {}",
                                    other,
                                    filename
                                ),
                            }
                        }
                    }
                    "Bounding-Box" => {
                        if let Some(pose) = pose.as_mut() {
                            let rect = parse_rect(&attrs);
                            pose.bounding_box.x = rect.x;
                            pose.bounding_box.y = rect.y;
                            if rect.w > 0.0 {
                                pose.bounding_box.w = rect.w;
                            }
                            if rect.h > 0.0 {
                                pose.bounding_box.h = rect.h;
                            }
                        }
                    }
                    "Bounding-Circle" => {
                        if let Some(pose) = pose.as_mut() {
                            let get = |key: &str| {
                                attrs.get(key).and_then(|v| v.parse().ok()).unwrap_or(0.0)
                            };
                            pose.bounding_circle =
                                Some(Circle::new(get("X"), get("Y"), get("Radius")));
                        }
                    }
                    "Frame" if pose.is_some() => {
                        let pose = pose.as_mut().unwrap();
                        let mut new_frame = Frame {
                            transparent_color: pose.transparent_color,
                            ..Frame::default()
                        };
                        if let Some(v) = attrs.get("Duration") {
                            new_frame.duration = v.parse().unwrap_or(-1);
                        }
                        if let Some(v) = attrs.get("Max-Duration") {
                            new_frame.max_duration = v.parse().unwrap_or(-1);
                        }
                        if let Some(v) = attrs.get("Marker") {
                            new_frame.marker = v.clone();
                        }
                        if let Some(v) = attrs.get("X-Mag") {
                            new_frame.magnification.x = v.parse().unwrap_or(1.0);
                        }
                        if let Some(v) = attrs.get("Y-Mag") {
                            new_frame.magnification.y = v.parse().unwrap_or(1.0);
                        }
                        if let Some(v) = attrs.get("Angle") {
                            new_frame.angle = v.parse().unwrap_or(0.0);
                        }
                        if let Some(v) = attrs.get("Opacity") {
                            new_frame.opacity = v.parse().unwrap_or(1.0);
                        }
                        new_frame.tween = attrs.get("Tween").map(String::as_str) == Some("true");
                        if let Some(v) = attrs.get("Transparent-Color") {
                            new_frame.transparent_color = Color::from_hex(v);
                        }
                        new_frame.image = attrs.get("Image").cloned();
                        new_frame.sound_file = attrs.get("Sound").cloned();
                        if let Some(v) = attrs.get("Sound-Volume") {
                            new_frame.sound_volume = v.parse().unwrap_or(1.0);
                        }
                        if empty {
                            pose.frames.push(new_frame);
                        } else {
                            frame = Some(new_frame);
                        }
                    }
                    "Rectangle" => {
                        if let Some(frame) = frame.as_mut() {
                            frame.rectangle = parse_rect(&attrs);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"Frame" => {
                    if let (Some(pose), Some(frame)) = (pose.as_mut(), frame.take()) {
                        pose.frames.push(frame);
                    }
                }
                b"Pose" => {
                    if let Some(pose) = pose.take() {
                        if pose.frames.is_empty() {
                            return Err(Error::format(
                                filename,
                                "Pose must have at least one frame",
                            ));
                        }
                        if pose.direction.is_diagonal() {
                            data.has_diagonal_directions = true;
                        }
                        data.poses.push(pose);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_sprite {
        return Err(Error::format(filename, "Missing Sprite node"));
    }
    if data.poses.is_empty() {
        return Err(Error::format(filename, "Missing poses"));
    }
    if !data.default_pose.is_empty() && !data.poses.iter().any(|p| p.name == data.default_pose) {
        log::warn!(
            "Could not find default pose {} when loading {}",
            data.default_pose,
            filename
        );
        data.default_pose = String::new();
    }
    let any_image = data.image.is_some()
        || data
            .poses
            .iter()
            .all(|p| p.image.is_some() || p.frames.iter().all(|f| f.image.is_some()));
    if !any_image {
        return Err(Error::format(filename, "Missing image"));
    }
    Ok(data)
}
