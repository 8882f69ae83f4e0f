//! NPC XML reader.
//!
//! ```xml
//! <npc name="baker" sprite="sprites/baker.xml">
//!   <schedule name="default">
//!     <keypoint map="maps/town.tmx" x="64" y="80" pose="Work" direction="Down"
//!               activation="scripts/baker.lua" sequential="true">
//!       <time day="even" timestamp="08:00:00"/>
//!       <commands>
//!         <command type="move" x="96" y="80"/>
//!         <command type="wait" duration="2000"/>
//!       </commands>
//!     </keypoint>
//!   </schedule>
//! </npc>
//! ```

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rustc_hash::FxHashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::npc::{DaySelector, Keypoint, KeypointCommand, Npc, Schedule};
use crate::util::direction::Direction;
use glam::Vec2;

pub fn load_npc(path: &Path) -> Result<Npc> {
    let filename = path.to_string_lossy().into_owned();
    let xml = std::fs::read_to_string(path).map_err(|source| Error::Asset {
        path: filename.clone(),
        source,
    })?;
    parse_npc(&xml, &filename)
}

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

/// `even`, `odd`, `once N`, or a plain repeat interval `N`.
fn parse_day_selector(text: &str) -> DaySelector {
    let text = text.trim().to_lowercase();
    match text.as_str() {
        "even" => DaySelector::Even,
        "odd" => DaySelector::Odd,
        _ => {
            if let Some(day) = text.strip_prefix("once") {
                DaySelector::Once(day.trim().parse().unwrap_or(1))
            } else {
                DaySelector::EveryN(text.parse().unwrap_or(1))
            }
        }
    }
}

fn parse_command(attrs: &FxHashMap<String, String>, file: &str) -> Result<KeypointCommand> {
    let get_f32 = |key: &str| attrs.get(key).and_then(|v| v.parse::<f32>().ok());
    let command_type = attrs
        .get("type")
        .map(|v| v.to_lowercase())
        .ok_or_else(|| Error::format(file, "command without type"))?;
    match command_type.as_str() {
        "move" => Ok(KeypointCommand::Move {
            x: get_f32("x").unwrap_or(0.0),
            y: get_f32("y").unwrap_or(0.0),
        }),
        "face" => Ok(KeypointCommand::Face {
            direction: attrs
                .get("direction")
                .map(|v| Direction::parse(v))
                .unwrap_or(Direction::DOWN),
        }),
        "teleport" => Ok(KeypointCommand::Teleport {
            map: attrs.get("map").cloned().unwrap_or_default(),
            x: get_f32("x").unwrap_or(0.0),
            y: get_f32("y").unwrap_or(0.0),
        }),
        "wait" => Ok(KeypointCommand::Wait {
            duration: attrs
                .get("duration")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }),
        "visibility" => Ok(KeypointCommand::Visibility {
            visible: attrs.get("visible").map(String::as_str) != Some("false"),
        }),
        "passthrough" => Ok(KeypointCommand::Passthrough {
            enabled: attrs.get("enabled").map(String::as_str) != Some("false"),
        }),
        other => Err(Error::format(
            file,
            format!("unknown keypoint command type '{}'", other),
        )),
    }
}

pub fn parse_npc(xml: &str, filename: &str) -> Result<Npc> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut npc: Option<Npc> = None;
    let mut schedule: Option<Schedule> = None;
    let mut keypoint: Option<Keypoint> = None;
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
                    "npc" => {
                        let npc_name = attrs
                            .get("name")
                            .cloned()
                            .ok_or_else(|| Error::format(filename, "npc without a name"))?;
                        let mut new_npc = Npc::new(npc_name);
                        new_npc.sprite_file = attrs.get("sprite").cloned().unwrap_or_default();
                        new_npc.display_name =
                            attrs.get("display-name").cloned().unwrap_or_default();
                        new_npc.map_name = attrs.get("map").cloned().unwrap_or_default();
                        new_npc.position = Vec2::new(
                            attrs.get("x").and_then(|v| v.parse().ok()).unwrap_or(0.0),
                            attrs.get("y").and_then(|v| v.parse().ok()).unwrap_or(0.0),
                        );
                        npc = Some(new_npc);
                    }
                    "schedule" => {
                        schedule = Some(Schedule {
                            name: attrs.get("name").cloned().unwrap_or_default(),
                            keypoints: Vec::new(),
                        });
                    }
                    "keypoint" => {
                        let mut new_keypoint = Keypoint::new(
                            attrs.get("map").cloned().unwrap_or_default(),
                            0,
                            Vec2::new(
                                attrs.get("x").and_then(|v| v.parse().ok()).unwrap_or(0.0),
                                attrs.get("y").and_then(|v| v.parse().ok()).unwrap_or(0.0),
                            ),
                        );
                        new_keypoint.pose = attrs.get("pose").cloned().unwrap_or_default();
                        new_keypoint.direction = attrs
                            .get("direction")
                            .map(|v| Direction::parse(v))
                            .unwrap_or(Direction::NONE);
                        new_keypoint.activation_script =
                            attrs.get("activation").cloned().unwrap_or_default();
                        new_keypoint.sequential =
                            attrs.get("sequential").map(String::as_str) == Some("true");
                        if empty {
                            if let Some(schedule) = schedule.as_mut() {
                                schedule.keypoints.push(new_keypoint);
                            }
                        } else {
                            keypoint = Some(new_keypoint);
                        }
                    }
                    "time" => {
                        if let Some(keypoint) = keypoint.as_mut() {
                            if let Some(day) = attrs.get("day") {
                                keypoint.day = parse_day_selector(day);
                            }
                            if let Some(timestamp) = attrs.get("timestamp") {
                                match crate::util::timestamp_to_seconds(timestamp) {
                                    Some(seconds) => keypoint.timestamp = seconds as i64,
                                    None => {
                                        return Err(Error::format(
                                            filename,
                                            format!("bad timestamp '{}'", timestamp),
                                        ));
                                    }
                                }
                            }
                        }
                    }
                    "command" => {
                        if let Some(keypoint) = keypoint.as_mut() {
                            keypoint.commands.push(parse_command(&attrs, filename)?);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"keypoint" => {
                    if let (Some(schedule), Some(keypoint)) = (schedule.as_mut(), keypoint.take()) {
                        schedule.keypoints.push(keypoint);
                    }
                }
                b"schedule" => {
                    if let (Some(npc), Some(schedule)) = (npc.as_mut(), schedule.take()) {
                        npc.schedules.insert(schedule.name.clone(), schedule);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut npc = npc.ok_or_else(|| Error::format(filename, "Missing npc node"))?;
    if npc.schedules.is_empty() {
        return Err(Error::format(filename, "NPC has no schedules"));
    }
    if npc.schedule_name().is_empty() {
        let first = npc
            .schedules
            .keys()
            .min()
            .cloned()
            .unwrap_or_default();
        npc.set_schedule(&first);
    }
    Ok(npc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::KeypointStatus;

    const SAMPLE: &str = r#"
        <npc name="baker" sprite="sprites/baker.xml" map="maps/town.tmx" x="64" y="80">
          <schedule name="default">
            <keypoint map="maps/town.tmx" x="96" y="80" pose="Work" direction="Down"
                      activation="scripts/baker.lua" sequential="true">
              <time day="even" timestamp="08:30:00"/>
              <commands>
                <command type="move" x="128" y="80"/>
                <command type="face" direction="Left"/>
                <command type="wait" duration="2000"/>
                <command type="teleport" map="maps/bakery.tmx" x="16" y="16"/>
                <command type="visibility" visible="false"/>
                <command type="passthrough" enabled="true"/>
              </commands>
            </keypoint>
            <keypoint map="maps/bakery.tmx" x="32" y="32">
              <time day="once 3" timestamp="12:00:00"/>
            </keypoint>
          </schedule>
        </npc>"#;

    #[test]
    fn test_parse_npc() {
        let npc = parse_npc(SAMPLE, "baker.xml").unwrap();
        assert_eq!(npc.name, "baker");
        assert_eq!(npc.sprite_file, "sprites/baker.xml");
        assert_eq!(npc.map_name, "maps/town.tmx");
        assert_eq!(npc.schedule_name(), "default");

        let schedule = &npc.schedules["default"];
        assert_eq!(schedule.keypoints.len(), 2);

        let first = &schedule.keypoints[0];
        assert_eq!(first.day, DaySelector::Even);
        assert_eq!(first.timestamp, 8 * 3600 + 30 * 60);
        assert_eq!(first.pose, "Work");
        assert_eq!(first.direction, Direction::DOWN);
        assert!(first.sequential);
        assert_eq!(first.status, KeypointStatus::Pending);
        assert_eq!(first.commands.len(), 6);
        assert_eq!(
            first.commands[0],
            KeypointCommand::Move { x: 128.0, y: 80.0 }
        );
        assert_eq!(
            first.commands[3],
            KeypointCommand::Teleport {
                map: "maps/bakery.tmx".to_string(),
                x: 16.0,
                y: 16.0
            }
        );

        let second = &schedule.keypoints[1];
        assert_eq!(second.day, DaySelector::Once(3));
        assert_eq!(second.timestamp, 12 * 3600);
    }

    #[test]
    fn test_day_selector_forms() {
        assert_eq!(parse_day_selector("even"), DaySelector::Even);
        assert_eq!(parse_day_selector("Odd"), DaySelector::Odd);
        assert_eq!(parse_day_selector("3"), DaySelector::EveryN(3));
        assert_eq!(parse_day_selector("once 7"), DaySelector::Once(7));
    }

    #[test]
    fn test_missing_npc_node() {
        assert!(parse_npc("<schedule/>", "bad.xml").is_err());
    }

    #[test]
    fn test_npc_without_schedules_fails() {
        assert!(parse_npc(r#"<npc name="x"/>"#, "bad.xml").is_err());
    }

    #[test]
    fn test_unknown_command_type_fails() {
        let xml = r#"<npc name="x"><schedule name="s">
            <keypoint map="m" x="0" y="0"><commands>
              <command type="dance"/>
            </commands></keypoint>
        </schedule></npc>"#;
        assert!(parse_npc(xml, "bad.xml").is_err());
    }
}
