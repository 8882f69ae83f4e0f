//! Parsed sprite data: a tree of poses and frames shared between every
//! instance of the same sprite file.
//!
//! Poses are selected by up to three tags (name, state, direction). The
//! matcher scores each pose by how many requested tags it satisfies,
//! preferring the sprite's default pose and then the first encountered on
//! ties. Instances cache the result keyed on the exact
//! `P:NAME|S:STATE|D:DIR` triple.

use glam::Vec2;
use rustc_hash::FxHashMap;

use crate::util::color::Color;
use crate::util::direction::Direction;
use crate::util::rect::{Circle, Rect};

/// One animation frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Source rectangle in the sprite image.
    pub rectangle: Rect,
    /// Duration in ms; -1 means use the pose duration.
    pub duration: i64,
    /// When greater than the base duration, the actual duration is sampled
    /// uniformly from [duration, max_duration] on each frame entry.
    pub max_duration: i64,
    /// Named checkpoint recorded when the animation enters this frame.
    pub marker: String,
    pub magnification: Vec2,
    /// Rotation in degrees.
    pub angle: f32,
    pub opacity: f32,
    /// Tween frames interpolate magnification/angle/opacity between their
    /// neighbours and inherit the previous frame's rectangle.
    pub tween: bool,
    pub image: Option<String>,
    pub transparent_color: Option<Color>,
    pub sound_file: Option<String>,
    pub sound_volume: f32,
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            rectangle: Rect::default(),
            duration: -1,
            max_duration: -1,
            marker: String::new(),
            magnification: Vec2::ONE,
            angle: 0.0,
            opacity: 1.0,
            tween: false,
            image: None,
            transparent_color: None,
            sound_file: None,
            sound_volume: 1.0,
        }
    }
}

/// A named animation, optionally tagged with a state and a direction.
#[derive(Debug, Clone)]
pub struct Pose {
    /// NAME tag, uppercased.
    pub name: String,
    /// STATE tag, uppercased.
    pub state: String,
    /// DIRECTION tag.
    pub direction: Direction,
    pub bounding_box: Rect,
    pub bounding_circle: Option<Circle>,
    /// Default frame duration in ms.
    pub duration: i64,
    /// -1 repeats forever.
    pub repeats: i32,
    /// The pose is not marked complete until a completion frame is reached.
    pub require_completion: bool,
    /// Frame indices that complete the pose; defaults to the last frame.
    pub completion_frames: Option<Vec<usize>>,
    pub origin: Vec2,
    pub image: Option<String>,
    pub transparent_color: Option<Color>,
    pub frames: Vec<Frame>,
}

impl Default for Pose {
    fn default() -> Self {
        Pose {
            name: String::new(),
            state: String::new(),
            direction: Direction::NONE,
            bounding_box: Rect::default(),
            bounding_circle: None,
            duration: 100,
            repeats: -1,
            require_completion: false,
            completion_frames: None,
            origin: Vec2::ZERO,
            image: None,
            transparent_color: None,
            frames: Vec::new(),
        }
    }
}

/// Shared, cached sprite file contents.
#[derive(Debug, Clone, Default)]
pub struct SpriteData {
    pub filename: String,
    pub image: Option<String>,
    pub transparent_color: Option<Color>,
    /// Uppercased default pose name, may be empty.
    pub default_pose: String,
    pub poses: Vec<Pose>,
    /// Any pose tagged with a diagonal direction makes the sprite
    /// eight-directional for facing purposes.
    pub has_diagonal_directions: bool,
}

impl SpriteData {
    /// The canonical cache key for a tag triple. Uppercasing happens here and
    /// nowhere else so every call site agrees on the key.
    pub fn pose_key(pose: &str, state: &str, direction: Direction) -> String {
        format!(
            "P:{}|S:{}|D:{}",
            pose.to_uppercase(),
            state.to_uppercase(),
            direction
        )
    }

    /// Find the best pose for a tag triple. Uncached; instances keep their
    /// own key → index map.
    pub fn match_pose(&self, pose_name: &str, state_name: &str, dir: Direction) -> usize {
        let pose_name = pose_name.to_uppercase();
        let state_name = state_name.to_uppercase();
        let mut matches: FxHashMap<usize, u32> = FxHashMap::default();
        let matches_needed = u32::from(!pose_name.is_empty())
            + u32::from(!state_name.is_empty())
            + u32::from(dir != Direction::NONE);

        let mut matched_pose: Option<usize> = None;
        let mut default_pose: Option<usize> = None;
        let mut default_name_matched = false;
        let is_default = !self.default_pose.is_empty() && pose_name == self.default_pose;

        let score = |index: Option<usize>, matches: &FxHashMap<usize, u32>| -> u32 {
            index.and_then(|i| matches.get(&i).copied()).unwrap_or(0)
        };

        for (i, pose) in self.poses.iter().enumerate() {
            let name_matched = pose_name == pose.name;
            if !pose_name.is_empty() && name_matched {
                *matches.entry(i).or_default() += 1;
                if is_default && matches[&i] > score(default_pose, &matches) {
                    default_pose = Some(i);
                    default_name_matched = true;
                }
            }
            if !state_name.is_empty() && state_name == pose.state {
                *matches.entry(i).or_default() += 1;
            }
            if dir != Direction::NONE && dir == pose.direction {
                *matches.entry(i).or_default() += 1;
            }

            let candidate = score(Some(i), &matches);
            let best = score(matched_pose, &matches);
            if candidate > best || (candidate == best && name_matched) {
                matched_pose = Some(i);
            }
            if candidate == matches_needed && matches_needed > 0 {
                break;
            }
        }

        // Prefer the default pose over other poses with the same match count.
        let best = score(matched_pose, &matches);
        if matched_pose.is_none() || (default_name_matched && best == score(default_pose, &matches))
        {
            return default_pose.unwrap_or(0);
        }
        matched_pose.unwrap_or(0)
    }

    /// Index of the default pose (name match), falling back to 0.
    pub fn default_pose_index(&self) -> usize {
        if self.default_pose.is_empty() {
            return 0;
        }
        self.poses
            .iter()
            .position(|p| p.name == self.default_pose)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(name: &str, state: &str, dir: Direction) -> Pose {
        Pose {
            name: name.to_string(),
            state: state.to_string(),
            direction: dir,
            frames: vec![Frame::default()],
            ..Pose::default()
        }
    }

    fn sample_data() -> SpriteData {
        SpriteData {
            filename: "hero.xml".to_string(),
            default_pose: "WALK".to_string(),
            poses: vec![
                pose("WALK", "", Direction::UP),
                pose("WALK", "", Direction::DOWN),
                pose("WALK", "WET", Direction::DOWN),
                pose("FACE", "", Direction::DOWN),
                pose("SWIM", "", Direction::NONE),
            ],
            ..SpriteData::default()
        }
    }

    #[test]
    fn test_pose_key_is_uppercased() {
        assert_eq!(
            SpriteData::pose_key("walk", "wet", Direction::UP),
            "P:WALK|S:WET|D:Up"
        );
    }

    #[test]
    fn test_exact_match() {
        let data = sample_data();
        assert_eq!(data.match_pose("WALK", "WET", Direction::DOWN), 2);
        assert_eq!(data.match_pose("FACE", "", Direction::DOWN), 3);
    }

    #[test]
    fn test_partial_match_prefers_more_tags() {
        let data = sample_data();
        // No WET+UP pose exists; WALK+UP wins over WALK+WET+DOWN on direction
        // versus state parity, first encountered breaking the tie.
        let index = data.match_pose("WALK", "", Direction::UP);
        assert_eq!(index, 0);
    }

    #[test]
    fn test_case_insensitive() {
        let data = sample_data();
        assert_eq!(data.match_pose("swim", "", Direction::NONE), 4);
    }

    #[test]
    fn test_unknown_falls_back_to_default() {
        let data = sample_data();
        let index = data.match_pose("TELEPORT", "", Direction::NONE);
        // No tag matches at all: the default pose (WALK, first entry) wins.
        assert_eq!(index, 0);
    }

    #[test]
    fn test_default_pose_index() {
        let data = sample_data();
        assert_eq!(data.default_pose_index(), 0);
        let mut no_default = sample_data();
        no_default.default_pose = String::new();
        assert_eq!(no_default.default_pose_index(), 0);
    }
}
