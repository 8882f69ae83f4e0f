//! Text markup parsing and decoration.

pub mod parser;
pub mod typewriter;

pub use parser::{Token, TokenType, parse};
pub use typewriter::Typewriter;
