//! Input mapping.
//!
//! The windowing backend reports which physical keys are down/pressed each
//! tick as an [`InputSnapshot`]; the [`KeyBinder`] translates those into
//! virtual button names from the keymap file (`virtual-name = PHYSICAL1,
//! PHYSICAL2, GAMEPAD-...`), and [`InputState`] is the per-tick view the
//! player controller and scripts read.

use configparser::ini::Ini;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;

use crate::util::direction::Direction;

const GAMEPAD_NAMES: [&str; 17] = [
    "A", "B", "X", "Y", "LB", "RB", "LT", "RT", "UP", "DOWN", "LEFT", "RIGHT", "START", "BACK",
    "GUIDE", "LSB", "RSB",
];

/// Validate a physical key name per the keymap format.
pub fn is_valid_physical_name(name: &str) -> bool {
    if let Some(button) = name.strip_prefix("GAMEPAD-") {
        return GAMEPAD_NAMES.contains(&button);
    }
    match name {
        "LEFT" | "RIGHT" | "UP" | "DOWN" | "SPACE" | "ENTER" | "ESC" | "TAB" | "BACKSPACE"
        | "PAUSE" | "LSHIFT" | "RSHIFT" | "LCTRL" | "RCTRL" | "LALT" | "RALT" => true,
        _ => {
            if name.len() == 1 {
                let c = name.chars().next().unwrap();
                return c.is_ascii_uppercase() || c.is_ascii_digit();
            }
            if let Some(num) = name.strip_prefix('F') {
                return matches!(num.parse::<u32>(), Ok(1..=12));
            }
            if let Some(num) = name.strip_prefix("NUMPAD") {
                return matches!(num.parse::<u32>(), Ok(0..=9));
            }
            false
        }
    }
}

/// Maps virtual button names to lists of physical key names.
#[derive(Debug, Clone)]
pub struct KeyBinder {
    bindings: FxHashMap<String, Vec<String>>,
}

impl Default for KeyBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyBinder {
    /// Sensible defaults used when no keymap file is present.
    pub fn new() -> Self {
        let mut binder = KeyBinder {
            bindings: FxHashMap::default(),
        };
        binder.bind("UP", &["UP", "GAMEPAD-UP"]);
        binder.bind("DOWN", &["DOWN", "GAMEPAD-DOWN"]);
        binder.bind("LEFT", &["LEFT", "GAMEPAD-LEFT"]);
        binder.bind("RIGHT", &["RIGHT", "GAMEPAD-RIGHT"]);
        binder.bind("A", &["Z", "ENTER", "GAMEPAD-A"]);
        binder.bind("B", &["X", "ESC", "GAMEPAD-B"]);
        binder.bind("PAUSE", &["P", "PAUSE", "GAMEPAD-START"]);
        binder
    }

    fn bind(&mut self, virtual_name: &str, physical: &[&str]) {
        self.bindings.insert(
            virtual_name.to_uppercase(),
            physical.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Load bindings from a keymap file, replacing defaults for any virtual
    /// name that appears there. Invalid physical names are skipped with a
    /// warning. Returns the list of warnings.
    pub fn load(&mut self, path: &Path) -> Result<Vec<String>, String> {
        let mut ini = Ini::new_cs();
        ini.load(path)
            .map_err(|e| format!("Failed to load keymap file: {}", e))?;
        let mut warnings = Vec::new();
        for (section, keys) in ini.get_map_ref() {
            for (virtual_name, value) in keys {
                let Some(value) = value else { continue };
                let mut physical = Vec::new();
                for name in crate::util::split_trimmed(value, ',') {
                    let name = name.to_uppercase();
                    if is_valid_physical_name(&name) {
                        physical.push(name);
                    } else {
                        warnings.push(format!(
                            "Unknown physical key '{}' bound to {}",
                            name, virtual_name
                        ));
                    }
                }
                if physical.is_empty() {
                    warnings.push(format!("No valid keys bound to {}", virtual_name));
                    continue;
                }
                let _ = section; // keymap files are sectionless; any section is accepted
                self.bindings.insert(virtual_name.to_uppercase(), physical);
            }
        }
        for warning in &warnings {
            log::warn!("{}", warning);
        }
        Ok(warnings)
    }

    pub fn physical_keys(&self, virtual_name: &str) -> &[String] {
        self.bindings
            .get(&virtual_name.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Raw physical key state reported by the backend for one tick.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    /// Physical keys currently held, uppercase names.
    pub down: FxHashSet<String>,
    /// Physical keys that went down this tick.
    pub pressed: FxHashSet<String>,
}

impl InputSnapshot {
    pub fn with_down(mut self, name: &str) -> Self {
        self.down.insert(name.to_uppercase());
        self
    }

    pub fn with_pressed(mut self, name: &str) -> Self {
        let name = name.to_uppercase();
        self.down.insert(name.clone());
        self.pressed.insert(name);
        self
    }
}

/// Virtual button state for the current tick.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    held: FxHashSet<String>,
    triggered: FxHashSet<String>,
}

impl InputState {
    pub fn update(&mut self, snapshot: &InputSnapshot, binder: &KeyBinder) {
        self.held.clear();
        self.triggered.clear();
        for (virtual_name, physical) in &binder.bindings {
            if physical.iter().any(|p| snapshot.down.contains(p)) {
                self.held.insert(virtual_name.clone());
            }
            if physical.iter().any(|p| snapshot.pressed.contains(p)) {
                self.triggered.insert(virtual_name.clone());
            }
        }
    }

    pub fn is_down(&self, virtual_name: &str) -> bool {
        self.held.contains(&virtual_name.to_uppercase())
    }

    /// Went down this tick.
    pub fn is_triggered(&self, virtual_name: &str) -> bool {
        self.triggered.contains(&virtual_name.to_uppercase())
    }

    /// Direction bitset from the held UP/DOWN/LEFT/RIGHT buttons.
    pub fn direction(&self) -> Direction {
        let mut dir = Direction::NONE;
        if self.is_down("UP") {
            dir |= Direction::UP;
        }
        if self.is_down("DOWN") {
            dir |= Direction::DOWN;
        }
        if self.is_down("LEFT") {
            dir |= Direction::LEFT;
        }
        if self.is_down("RIGHT") {
            dir |= Direction::RIGHT;
        }
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_valid_physical_names() {
        for name in ["A", "Z", "0", "9", "F1", "F12", "NUMPAD5", "LEFT", "PAUSE"] {
            assert!(is_valid_physical_name(name), "{} should be valid", name);
        }
        for name in ["GAMEPAD-A", "GAMEPAD-LSB", "GAMEPAD-START"] {
            assert!(is_valid_physical_name(name), "{} should be valid", name);
        }
        for name in ["F13", "NUMPAD10", "GAMEPAD-Q", "??", "AB"] {
            assert!(!is_valid_physical_name(name), "{} should be invalid", name);
        }
    }

    #[test]
    fn test_default_bindings() {
        let binder = KeyBinder::new();
        assert!(binder.physical_keys("a").contains(&"Z".to_string()));
        assert!(binder.physical_keys("UP").contains(&"GAMEPAD-UP".to_string()));
    }

    #[test]
    fn test_load_keymap() {
        let dir = std::env::temp_dir().join("wickengine_test_keymap");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("keymap.ini");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "A = SPACE, GAMEPAD-A\nRUN = LSHIFT, BANANA").unwrap();

        let mut binder = KeyBinder::new();
        let warnings = binder.load(&path).unwrap();
        assert_eq!(binder.physical_keys("A"), ["SPACE", "GAMEPAD-A"]);
        assert_eq!(binder.physical_keys("RUN"), ["LSHIFT"]);
        assert_eq!(warnings.len(), 1);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_input_state_update() {
        let binder = KeyBinder::new();
        let snapshot = InputSnapshot::default()
            .with_down("UP")
            .with_pressed("Z");
        let mut input = InputState::default();
        input.update(&snapshot, &binder);

        assert!(input.is_down("UP"));
        assert!(input.is_down("A"));
        assert!(input.is_triggered("A"));
        assert!(!input.is_triggered("UP"));
        assert_eq!(input.direction(), Direction::UP);
    }

    #[test]
    fn test_direction_diagonal() {
        let binder = KeyBinder::new();
        let snapshot = InputSnapshot::default().with_down("UP").with_down("RIGHT");
        let mut input = InputState::default();
        input.update(&snapshot, &binder);
        assert_eq!(input.direction(), Direction::UP | Direction::RIGHT);
    }
}
