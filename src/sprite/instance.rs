//! Per-instance animation state machine.
//!
//! Every holder of a sprite (map object, sprite canvas, image layer) owns one
//! of these. Time is absolute game ticks supplied by the caller, so pausing
//! the clock freezes every animation for free; pausing a single sprite shifts
//! its reference time instead.

use std::rc::Rc;

use glam::Vec2;
use rustc_hash::FxHashMap;

use crate::audio::AudioPlayer;
use crate::sprite::data::{Frame, Pose, SpriteData};
use crate::util::direction::Direction;
use crate::util::lerp;
use crate::util::rect::{Circle, Rect};

/// Context for one update tick.
pub struct SpriteUpdate<'a> {
    /// Absolute game ticks.
    pub ticks: i64,
    pub audio: Option<&'a mut AudioPlayer>,
    /// Centered position of the holder, for positional sounds.
    pub position: Option<Vec2>,
    /// Centered position of the listener (the player).
    pub listener: Option<Vec2>,
}

impl SpriteUpdate<'_> {
    /// Silent update at the given ticks.
    pub fn silent(ticks: i64) -> SpriteUpdate<'static> {
        SpriteUpdate {
            ticks,
            audio: None,
            position: None,
            listener: None,
        }
    }
}

#[derive(Debug)]
pub struct Sprite {
    data: Rc<SpriteData>,
    pose_index: usize,
    /// Tag triple of the last `set_pose` call, uppercased.
    pose_name: String,
    pose_state: String,
    pose_direction: Direction,
    /// Cache of tag key → pose index.
    tag_map: FxHashMap<String, usize>,
    frame_index: usize,
    /// Tick of the last frame advance.
    old_time: i64,
    /// Sampled duration of the current frame; -1 means not sampled yet.
    frame_duration: i64,
    passed_markers: Vec<String>,
    /// Frame whose marker was last recorded, to record once per entry.
    marker_frame: i64,
    repeat_count: i32,
    tweening: bool,
    /// Instance-local copy of the current tween frame; shared data stays
    /// immutable.
    tween_frame: Option<Frame>,
    completed: bool,
    completion_indexes: Vec<usize>,
    stop_updating: bool,
    paused: bool,
    pause_start: i64,
    last_sound_frame: i64,
    speed: f32,
    sfx_volume: f32,
}

impl Sprite {
    pub fn new(data: Rc<SpriteData>, ticks: i64) -> Sprite {
        let pose_index = data.default_pose_index();
        let mut sprite = Sprite {
            data,
            pose_index,
            pose_name: String::new(),
            pose_state: String::new(),
            pose_direction: Direction::NONE,
            tag_map: FxHashMap::default(),
            frame_index: 0,
            old_time: ticks,
            frame_duration: -1,
            passed_markers: Vec::new(),
            marker_frame: -1,
            repeat_count: 0,
            tweening: false,
            tween_frame: None,
            completed: false,
            completion_indexes: Vec::new(),
            stop_updating: false,
            paused: false,
            pause_start: -1,
            last_sound_frame: -1,
            speed: 1.0,
            sfx_volume: 1.0,
        };
        sprite.reset(true, ticks);
        sprite
    }

    pub fn data(&self) -> &Rc<SpriteData> {
        &self.data
    }

    pub fn filename(&self) -> &str {
        &self.data.filename
    }

    pub fn pose(&self) -> &Pose {
        &self.data.poses[self.pose_index]
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// The frame being shown, with tween interpolation applied.
    pub fn current_frame(&self) -> &Frame {
        if self.tweening
            && let Some(tween) = &self.tween_frame
        {
            return tween;
        }
        &self.pose().frames[self.frame_index]
    }

    /// Image used for the current frame: frame image, then pose image, then
    /// the sprite file image.
    pub fn image(&self) -> Option<&str> {
        let pose = self.pose();
        self.current_frame()
            .image
            .as_deref()
            .or(pose.image.as_deref())
            .or(self.data.image.as_deref())
    }

    pub fn bounding_box(&self) -> Rect {
        self.pose().bounding_box
    }

    pub fn bounding_circle(&self) -> Option<Circle> {
        self.pose().bounding_circle
    }

    /// Size of the first frame's source rectangle.
    pub fn size(&self) -> Vec2 {
        self.pose()
            .frames
            .first()
            .map(|f| f.rectangle.size())
            .unwrap_or(Vec2::ZERO)
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_updating
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_eight_directional(&self) -> bool {
        self.data.has_diagonal_directions
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.01);
    }

    pub fn sfx_volume(&self) -> f32 {
        self.sfx_volume
    }

    pub fn set_sfx_volume(&mut self, volume: f32) {
        self.sfx_volume = volume.clamp(0.0, 1.0);
    }

    pub fn last_marker(&self) -> Option<&str> {
        self.passed_markers.last().map(String::as_str)
    }

    pub fn passed_marker(&self, marker: &str) -> bool {
        self.passed_markers.iter().any(|m| m == marker)
    }

    pub fn pause(&mut self, ticks: i64) {
        self.paused = true;
        self.pause_start = ticks;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.pause_start = -1;
    }

    fn paused_time(&self, ticks: i64) -> i64 {
        if self.pause_start == -1 {
            0
        } else {
            ticks - self.pause_start
        }
    }

    fn passed_time(&self, ticks: i64) -> i64 {
        ticks - self.old_time - self.paused_time(ticks)
    }

    /// Sample the duration of a frame, honoring the random range and the
    /// animation speed.
    fn sample_frame_time(&self, frame: &Frame) -> i64 {
        let mut frame_time = if frame.duration == -1 {
            self.pose().duration
        } else {
            frame.duration
        };
        if frame.max_duration > frame_time {
            frame_time += fastrand::i64(0..=frame.max_duration - frame_time);
        }
        (frame_time as f32 / self.speed) as i64
    }

    fn finished_repeating(&self) -> bool {
        let pose = self.pose();
        pose.repeats != -1 && self.repeat_count >= pose.repeats
    }

    /// Reset animation bookkeeping after a pose change.
    /// With `reset_current_frame` false the frame index is preserved modulo
    /// the new pose's frame count.
    pub fn reset(&mut self, reset_current_frame: bool, ticks: i64) {
        self.frame_duration = -1;
        self.repeat_count = 0;
        self.last_sound_frame = -1;
        self.marker_frame = -1;
        self.completed = false;
        self.completion_indexes.clear();
        self.passed_markers.clear();
        self.stop_updating = false;
        self.tweening = false;
        self.tween_frame = None;
        if reset_current_frame {
            self.frame_index = 0;
            self.old_time = ticks;
        }

        let pose = &self.data.poses[self.pose_index];
        let frame_count = pose.frames.len();
        if !reset_current_frame && frame_count > 0 {
            self.frame_index %= frame_count;
        }

        if !pose.require_completion {
            return;
        }
        if let Some(frames) = &pose.completion_frames {
            self.completion_indexes = frames.clone();
        } else if frame_count > 0 {
            self.completion_indexes.push(frame_count - 1);
        } else {
            self.completed = true;
        }
    }

    /// Advance the animation state machine by one tick.
    pub fn update(&mut self, ctx: SpriteUpdate) {
        let frame_count = self.pose().frames.len();
        if frame_count == 0 || self.stop_updating {
            return;
        }
        let ticks = ctx.ticks;

        if self.frame_duration < 0 {
            self.frame_duration = self.sample_frame_time(&self.pose().frames[self.frame_index]);
        }

        self.play_frame_sound(ctx);

        if self.passed_time(ticks) > self.frame_duration {
            let frame_index = self.frame_index;
            let hold_for_completion = !self.completed
                && self.pose().require_completion
                && self.completion_indexes.contains(&frame_index);
            if hold_for_completion {
                // Hold the completed flag for one update before moving on.
                self.completed = true;
                return;
            }

            self.old_time = ticks;
            self.tweening = false;
            self.tween_frame = None;

            if self.frame_index + 1 >= frame_count {
                self.repeat_count += 1;
                self.last_sound_frame = -1;
                if self.finished_repeating() {
                    self.completed = true;
                    self.stop_updating = true;
                    return;
                }
                self.passed_markers.clear();
                self.marker_frame = -1;
            }
            self.frame_index = (self.frame_index + 1) % frame_count;
            self.frame_duration = -1;

            if self.completed && !self.completion_indexes.is_empty() {
                self.completed = false;
            }
        }

        let marker = self.pose().frames[self.frame_index].marker.clone();
        if !marker.is_empty() && self.marker_frame != self.frame_index as i64 {
            self.marker_frame = self.frame_index as i64;
            self.passed_markers.push(marker);
        }

        self.update_tween(ticks);
    }

    fn update_tween(&mut self, ticks: i64) {
        let frame_count = self.pose().frames.len();
        // A tween frame needs both neighbours.
        if self.frame_index == 0 || self.frame_index + 1 >= frame_count {
            return;
        }
        let frame = self.pose().frames[self.frame_index].clone();
        if !frame.tween {
            return;
        }
        let prev = self.pose().frames[self.frame_index - 1].clone();
        let next = self.pose().frames[self.frame_index + 1].clone();

        if !self.tweening {
            let mut tween = frame.clone();
            tween.rectangle = prev.rectangle;
            self.tween_frame = Some(tween);
            self.old_time = ticks;
            self.frame_duration = self.sample_frame_time(&frame);
            self.tweening = true;
        }

        let alpha = if self.frame_duration > 0 {
            (self.passed_time(ticks) as f32 / self.frame_duration as f32).clamp(0.0, 1.0)
        } else {
            1.0
        };
        if let Some(tween) = &mut self.tween_frame {
            tween.magnification = Vec2::new(
                lerp(prev.magnification.x, next.magnification.x, alpha),
                lerp(prev.magnification.y, next.magnification.y, alpha),
            );
            tween.angle = lerp(prev.angle, next.angle, alpha);
            tween.opacity = lerp(prev.opacity, next.opacity, alpha);
        }
    }

    fn play_frame_sound(&mut self, ctx: SpriteUpdate) {
        let (sound_file, base_volume) = {
            let frame = &self.pose().frames[self.frame_index];
            (frame.sound_file.clone(), frame.sound_volume)
        };
        let Some(sound) = sound_file else { return };
        if self.last_sound_frame == self.frame_index as i64 {
            return;
        }
        self.last_sound_frame = self.frame_index as i64;
        let Some(audio) = ctx.audio else { return };
        let attenuation = match (ctx.position, ctx.listener) {
            (Some(position), Some(listener)) => audio.attenuation(position, listener),
            _ => 1.0,
        };
        audio.play_sound(&sound, base_volume * self.sfx_volume * attenuation);
    }

    /// Re-apply attenuation to the current frame's sound while it plays.
    pub fn update_sound_attenuation(
        &self,
        audio: &mut AudioPlayer,
        position: Vec2,
        listener: Vec2,
    ) {
        let frame = &self.pose().frames[self.frame_index];
        let Some(sound) = &frame.sound_file else {
            return;
        };
        let attenuation = audio.attenuation(position, listener);
        audio.set_sound_volume(sound, frame.sound_volume * self.sfx_volume * attenuation);
    }

    /// Select a pose by tag triple. Keeps the frame index when
    /// `reset_current_frame` is false.
    pub fn set_pose(
        &mut self,
        pose_name: &str,
        state_name: &str,
        dir: Direction,
        reset_current_frame: bool,
        ticks: i64,
    ) {
        self.pose_name = pose_name.to_uppercase();
        self.pose_state = state_name.to_uppercase();
        self.pose_direction = dir;

        let key = SpriteData::pose_key(pose_name, state_name, dir);
        let matched = match self.tag_map.get(&key) {
            Some(&index) => index,
            None => {
                let index = self.data.match_pose(pose_name, state_name, dir);
                self.tag_map.insert(key, index);
                index
            }
        };

        if matched != self.pose_index || self.stop_updating {
            self.pose_index = matched;
            self.reset(reset_current_frame, ticks);
        }
    }

    pub fn pose_name(&self) -> &str {
        &self.pose_name
    }

    pub fn pose_state(&self) -> &str {
        &self.pose_state
    }

    pub fn pose_direction(&self) -> Direction {
        self.pose_direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::data::{Frame, Pose};
    use crate::util::approx_eq;
    use crate::util::rect::Rect;

    fn frame(duration: i64) -> Frame {
        Frame {
            duration,
            ..Frame::default()
        }
    }

    fn data_with_pose(pose: Pose) -> Rc<SpriteData> {
        Rc::new(SpriteData {
            filename: "test.xml".to_string(),
            poses: vec![pose],
            ..SpriteData::default()
        })
    }

    fn step(sprite: &mut Sprite, ticks: i64) {
        sprite.update(SpriteUpdate::silent(ticks));
    }

    // ==================== FRAME ADVANCE TESTS ====================

    #[test]
    fn test_advances_after_duration() {
        let data = data_with_pose(Pose {
            frames: vec![frame(100), frame(100), frame(100)],
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);
        step(&mut sprite, 50);
        assert_eq!(sprite.frame_index(), 0);
        step(&mut sprite, 150);
        assert_eq!(sprite.frame_index(), 1);
        step(&mut sprite, 300);
        assert_eq!(sprite.frame_index(), 2);
        step(&mut sprite, 450);
        assert_eq!(sprite.frame_index(), 0); // wrapped
    }

    #[test]
    fn test_finite_pose_completes_and_sticks() {
        let data = data_with_pose(Pose {
            repeats: 1,
            frames: vec![frame(50), frame(50)],
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);
        step(&mut sprite, 60);
        assert!(!sprite.is_complete());
        step(&mut sprite, 120);
        assert!(sprite.is_complete());
        assert!(sprite.is_stopped());
        let index = sprite.frame_index();
        // Frozen on the last frame from now on.
        step(&mut sprite, 1000);
        assert_eq!(sprite.frame_index(), index);
        assert!(sprite.is_complete());
    }

    #[test]
    fn test_set_pose_clears_completion() {
        let data = data_with_pose(Pose {
            name: "BLINK".to_string(),
            repeats: 1,
            frames: vec![frame(50)],
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);
        step(&mut sprite, 60);
        assert!(sprite.is_complete());
        sprite.set_pose("BLINK", "", Direction::NONE, true, 100);
        assert!(!sprite.is_complete());
        assert!(!sprite.is_stopped());
    }

    #[test]
    fn test_pose_duration_used_when_frame_has_none() {
        let data = data_with_pose(Pose {
            duration: 200,
            frames: vec![frame(-1), frame(-1)],
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);
        step(&mut sprite, 150);
        assert_eq!(sprite.frame_index(), 0);
        step(&mut sprite, 250);
        assert_eq!(sprite.frame_index(), 1);
    }

    #[test]
    fn test_speed_divides_duration() {
        let data = data_with_pose(Pose {
            frames: vec![frame(100), frame(100)],
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);
        sprite.set_speed(2.0);
        step(&mut sprite, 60);
        assert_eq!(sprite.frame_index(), 1);
    }

    // ==================== PAUSE TESTS ====================

    #[test]
    fn test_pause_freezes_animation() {
        let data = data_with_pose(Pose {
            frames: vec![frame(100), frame(100)],
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);
        sprite.pause(10);
        step(&mut sprite, 500);
        assert_eq!(sprite.frame_index(), 0);
    }

    // ==================== MARKER TESTS ====================

    #[test]
    fn test_markers_recorded_once_and_cleared_on_wrap() {
        let mut pose = Pose {
            frames: vec![frame(50), frame(50)],
            ..Pose::default()
        };
        pose.frames[1].marker = "step".to_string();
        let data = data_with_pose(pose);
        let mut sprite = Sprite::new(data, 0);

        step(&mut sprite, 60);
        assert!(sprite.passed_marker("step"));
        assert_eq!(sprite.last_marker(), Some("step"));
        step(&mut sprite, 80);
        assert_eq!(sprite.passed_markers.len(), 1);

        // Wrap clears the marker list.
        step(&mut sprite, 120);
        assert_eq!(sprite.frame_index(), 0);
        assert!(!sprite.passed_marker("step"));
    }

    // ==================== COMPLETION FRAME TESTS ====================

    #[test]
    fn test_require_completion_holds_one_update() {
        let data = data_with_pose(Pose {
            require_completion: true,
            completion_frames: Some(vec![1]),
            frames: vec![frame(50), frame(50), frame(50)],
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);
        step(&mut sprite, 60);
        assert_eq!(sprite.frame_index(), 1);
        assert!(!sprite.is_complete());
        // Frame 1 expires: completion is flagged and held for one update.
        step(&mut sprite, 120);
        assert!(sprite.is_complete());
        assert_eq!(sprite.frame_index(), 1);
        // Next update advances and clears the flag again.
        step(&mut sprite, 130);
        assert_eq!(sprite.frame_index(), 2);
        assert!(!sprite.is_complete());
    }

    // ==================== TWEEN TESTS ====================

    #[test]
    fn test_tween_interpolates_between_neighbours() {
        let mut frames = vec![frame(100), frame(100), frame(100)];
        frames[0].magnification = Vec2::ONE;
        frames[0].angle = 0.0;
        frames[0].rectangle = Rect::new(0.0, 0.0, 16.0, 16.0);
        frames[1].tween = true;
        frames[2].magnification = Vec2::new(2.0, 2.0);
        frames[2].angle = 90.0;
        let data = data_with_pose(Pose {
            frames,
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);

        // Enter the tween frame.
        step(&mut sprite, 110);
        assert_eq!(sprite.frame_index(), 1);
        // Tween inherits the previous frame's rectangle.
        assert_eq!(sprite.current_frame().rectangle, Rect::new(0.0, 0.0, 16.0, 16.0));

        // Halfway through: magnification ~1.5, angle ~45.
        step(&mut sprite, 160);
        let mid = sprite.current_frame();
        assert!(approx_eq(mid.magnification.x, 1.5));
        assert!((mid.angle - 45.0).abs() < 1.0);

        // Past the duration: transition to the final frame.
        step(&mut sprite, 215);
        assert_eq!(sprite.frame_index(), 2);
        assert!(approx_eq(sprite.current_frame().magnification.x, 2.0));
    }

    // ==================== POSE SWITCH TESTS ====================

    #[test]
    fn test_set_pose_preserves_frame_modulo() {
        let data = Rc::new(SpriteData {
            filename: "test.xml".to_string(),
            poses: vec![
                Pose {
                    name: "LONG".to_string(),
                    frames: vec![frame(10), frame(10), frame(10), frame(10)],
                    ..Pose::default()
                },
                Pose {
                    name: "SHORT".to_string(),
                    frames: vec![frame(10), frame(10)],
                    ..Pose::default()
                },
            ],
            ..SpriteData::default()
        });
        let mut sprite = Sprite::new(data, 0);
        step(&mut sprite, 15);
        step(&mut sprite, 30);
        step(&mut sprite, 45);
        assert_eq!(sprite.frame_index(), 3);
        sprite.set_pose("SHORT", "", Direction::NONE, false, 50);
        assert_eq!(sprite.frame_index(), 1); // 3 % 2
    }

    #[test]
    fn test_set_pose_same_pose_does_not_reset() {
        let data = data_with_pose(Pose {
            name: "IDLE".to_string(),
            frames: vec![frame(10), frame(10)],
            ..Pose::default()
        });
        let mut sprite = Sprite::new(data, 0);
        step(&mut sprite, 15);
        assert_eq!(sprite.frame_index(), 1);
        sprite.set_pose("IDLE", "", Direction::NONE, true, 20);
        assert_eq!(sprite.frame_index(), 1);
    }
}
