//! Typewriter text reveal.
//!
//! Reveals text one character at a time, passing tags through whole so that
//! markup never appears half-typed. States are keyed by slot so several text
//! canvases can type independently. Callers pick which tick source to pass:
//! game ticks normally, window ticks for pause-safe consumers such as pause
//! menu text.

use rustc_hash::FxHashMap;

use crate::text::parser::{self, TokenType};

const DEFAULT_CHARS_PER_SECOND: f32 = 40.0;

#[derive(Debug, Clone)]
struct State {
    start_time: i64,
    text: String,
    done: bool,
}

#[derive(Debug)]
pub struct Typewriter {
    states: FxHashMap<i32, State>,
    pub chars_per_second: f32,
}

impl Default for Typewriter {
    fn default() -> Self {
        Typewriter {
            states: FxHashMap::default(),
            chars_per_second: DEFAULT_CHARS_PER_SECOND,
        }
    }
}

impl Typewriter {
    pub fn new(chars_per_second: f32) -> Typewriter {
        Typewriter {
            states: FxHashMap::default(),
            chars_per_second: chars_per_second.max(1.0),
        }
    }

    /// The currently visible prefix of `text` for a slot. The first call for
    /// a slot (or a call with different text) restarts the reveal.
    pub fn apply(&mut self, slot: i32, text: &str, ticks: i64) -> String {
        let restart = self
            .states
            .get(&slot)
            .map(|state| state.text != text)
            .unwrap_or(true);
        if restart {
            self.states.insert(
                slot,
                State {
                    start_time: ticks,
                    text: text.to_string(),
                    done: false,
                },
            );
        }
        let state = self.states.get_mut(&slot).expect("state just inserted");

        let elapsed = (ticks - state.start_time).max(0) as f32;
        let visible_chars = (elapsed / 1000.0 * self.chars_per_second) as usize;

        let Ok(tokens) = parser::parse(text, true) else {
            state.done = true;
            return text.to_string();
        };

        let mut output = String::new();
        let mut used = 0usize;
        let mut truncated = false;
        for token in tokens {
            match token.token_type {
                TokenType::Text => {
                    for c in token.value.chars() {
                        if used >= visible_chars {
                            truncated = true;
                            break;
                        }
                        output.push(c);
                        used += 1;
                    }
                    if truncated {
                        break;
                    }
                }
                TokenType::OpeningTag => {
                    output.push('{');
                    output.push_str(&token.tag);
                    if !token.value.is_empty() {
                        output.push('=');
                        output.push_str(&token.value);
                    }
                    output.push('}');
                }
                TokenType::ClosingTag => {
                    output.push_str("{/");
                    output.push_str(&token.tag);
                    output.push('}');
                }
            }
        }
        if !truncated {
            state.done = true;
        }
        output
    }

    /// Skip straight to the full text.
    pub fn finish(&mut self, slot: i32) {
        if let Some(state) = self.states.get_mut(&slot) {
            state.start_time = i64::MIN / 2;
            state.done = true;
        }
    }

    pub fn is_done(&self, slot: i32) -> bool {
        self.states.get(&slot).map(|s| s.done).unwrap_or(true)
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }
}
