//! Audio playback facade.
//!
//! The audio device runs on its own background thread behind a pair of
//! channels; the simulation only ever touches [`AudioPlayer`]. When no device
//! is available (headless tests, broken driver) the player is constructed
//! disabled and every call degrades to a silent no-op. Load failures null the
//! asset and are warned about once.

use crossbeam_channel::{Receiver, Sender};
use glam::Vec2;
use rustc_hash::{FxHashMap, FxHashSet};

/// Channel groups with independent volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelGroup {
    Music,
    Sound,
}

/// Commands sent to the audio thread.
#[derive(Debug, Clone)]
pub enum AudioCmd {
    LoadMusic { key: String, path: String },
    LoadSound { key: String, path: String },
    PlayMusic { key: String, looped: bool },
    StopMusic { key: String },
    PauseMusic { key: String },
    ResumeMusic { key: String },
    SetMusicVolume { key: String, volume: f32 },
    PlaySound { key: String, volume: f32 },
    StopSound { key: String },
    SetSoundVolume { key: String, volume: f32 },
    SetGroupVolume { group: ChannelGroup, volume: f32 },
    PauseAll,
    ResumeAll,
    Shutdown,
}

/// Messages produced by the audio thread.
#[derive(Debug, Clone)]
pub enum AudioMessage {
    LoadFailed { key: String, reason: String },
    DeviceUnavailable { reason: String },
}

#[derive(Debug, Clone, Default)]
struct MusicState {
    playing: bool,
    volume: f32,
}

/// Main-thread handle to the audio backend.
pub struct AudioPlayer {
    tx: Option<Sender<AudioCmd>>,
    rx: Option<Receiver<AudioMessage>>,
    handle: Option<std::thread::JoinHandle<()>>,
    music_volume: f32,
    sound_volume: f32,
    attenuation_factor: f32,
    mute_on_pause: bool,
    /// Assets that failed to load; playback requests become no-ops and the
    /// failure is only logged the first time.
    failed: FxHashSet<String>,
    music_states: FxHashMap<String, MusicState>,
}

impl AudioPlayer {
    /// Player connected to a running audio thread.
    pub fn new(
        tx: Sender<AudioCmd>,
        rx: Receiver<AudioMessage>,
        handle: std::thread::JoinHandle<()>,
        config: &crate::config::AudioConfig,
    ) -> Self {
        let mut player = AudioPlayer {
            tx: Some(tx),
            rx: Some(rx),
            handle: Some(handle),
            music_volume: config.music_volume,
            sound_volume: config.sound_volume,
            attenuation_factor: config.sound_attenuation_factor,
            mute_on_pause: config.mute_on_pause,
            failed: FxHashSet::default(),
            music_states: FxHashMap::default(),
        };
        player.send(AudioCmd::SetGroupVolume {
            group: ChannelGroup::Music,
            volume: config.music_volume,
        });
        player.send(AudioCmd::SetGroupVolume {
            group: ChannelGroup::Sound,
            volume: config.sound_volume,
        });
        player
    }

    /// Player with no backing device; every operation is a no-op.
    pub fn disabled(config: &crate::config::AudioConfig) -> Self {
        AudioPlayer {
            tx: None,
            rx: None,
            handle: None,
            music_volume: config.music_volume,
            sound_volume: config.sound_volume,
            attenuation_factor: config.sound_attenuation_factor,
            mute_on_pause: config.mute_on_pause,
            failed: FxHashSet::default(),
            music_states: FxHashMap::default(),
        }
    }

    fn send(&mut self, cmd: AudioCmd) {
        let failed = match &self.tx {
            Some(tx) => tx.send(cmd).is_err(),
            None => false,
        };
        if failed {
            // The audio thread died; degrade to disabled.
            log::warn!("Audio thread unreachable, disabling audio");
            self.tx = None;
        }
    }

    /// Drain messages from the audio thread, recording failed assets.
    pub fn update(&mut self) {
        let Some(rx) = &self.rx else { return };
        let messages: Vec<AudioMessage> = rx.try_iter().collect();
        for message in messages {
            match message {
                AudioMessage::LoadFailed { key, reason } => {
                    if self.failed.insert(key.clone()) {
                        log::warn!("Failed to load audio '{}': {}", key, reason);
                    }
                }
                AudioMessage::DeviceUnavailable { reason } => {
                    log::warn!("Audio device unavailable: {}", reason);
                    self.tx = None;
                }
            }
        }
    }

    pub fn enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn mute_on_pause(&self) -> bool {
        self.mute_on_pause
    }

    pub fn load_music(&mut self, key: &str, path: &str) {
        if self.failed.contains(key) {
            return;
        }
        self.send(AudioCmd::LoadMusic {
            key: key.to_string(),
            path: path.to_string(),
        });
    }

    pub fn load_sound(&mut self, key: &str, path: &str) {
        if self.failed.contains(key) {
            return;
        }
        self.send(AudioCmd::LoadSound {
            key: key.to_string(),
            path: path.to_string(),
        });
    }

    pub fn play_music(&mut self, key: &str, looped: bool) {
        if self.failed.contains(key) {
            return;
        }
        self.music_states.insert(
            key.to_string(),
            MusicState {
                playing: true,
                volume: 1.0,
            },
        );
        self.send(AudioCmd::PlayMusic {
            key: key.to_string(),
            looped,
        });
    }

    pub fn stop_music(&mut self, key: &str) {
        if let Some(state) = self.music_states.get_mut(key) {
            state.playing = false;
        }
        self.send(AudioCmd::StopMusic {
            key: key.to_string(),
        });
    }

    pub fn set_music_volume(&mut self, key: &str, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.music_states
            .entry(key.to_string())
            .or_default()
            .volume = volume;
        self.send(AudioCmd::SetMusicVolume {
            key: key.to_string(),
            volume,
        });
    }

    pub fn music_volume_of(&self, key: &str) -> f32 {
        self.music_states.get(key).map(|s| s.volume).unwrap_or(1.0)
    }

    pub fn music_playing(&self, key: &str) -> bool {
        self.music_states.get(key).map(|s| s.playing).unwrap_or(false)
    }

    pub fn play_sound(&mut self, key: &str, volume: f32) {
        if self.failed.contains(key) {
            return;
        }
        self.send(AudioCmd::PlaySound {
            key: key.to_string(),
            volume: volume.clamp(0.0, 1.0),
        });
    }

    pub fn stop_sound(&mut self, key: &str) {
        self.send(AudioCmd::StopSound {
            key: key.to_string(),
        });
    }

    pub fn set_sound_volume(&mut self, key: &str, volume: f32) {
        self.send(AudioCmd::SetSoundVolume {
            key: key.to_string(),
            volume: volume.clamp(0.0, 1.0),
        });
    }

    pub fn set_group_volume(&mut self, group: ChannelGroup, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        match group {
            ChannelGroup::Music => self.music_volume = volume,
            ChannelGroup::Sound => self.sound_volume = volume,
        }
        self.send(AudioCmd::SetGroupVolume { group, volume });
    }

    pub fn group_volume(&self, group: ChannelGroup) -> f32 {
        match group {
            ChannelGroup::Music => self.music_volume,
            ChannelGroup::Sound => self.sound_volume,
        }
    }

    pub fn pause_all(&mut self) {
        self.send(AudioCmd::PauseAll);
    }

    pub fn resume_all(&mut self) {
        self.send(AudioCmd::ResumeAll);
    }

    /// Distance attenuation for positional sounds: `min(1, factor / d)`.
    pub fn attenuation(&self, position: Vec2, listener: Vec2) -> f32 {
        let distance = position.distance(listener);
        if distance <= f32::EPSILON {
            1.0
        } else {
            (self.attenuation_factor / distance).min(1.0)
        }
    }

    /// Stop the audio thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        self.send(AudioCmd::Shutdown);
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
