//! Tokenizer for `{tag}`/`{tag=value}`/`{/tag}` text markup.
//!
//! Opening and closing tags are matched by name as they are parsed; anything
//! left over keeps `unmatched = true`. In permissive mode malformed input is
//! tolerated (bad tags are dropped, text carries on); otherwise it is a
//! format error.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Text,
    OpeningTag,
    ClosingTag,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    /// Tag name; empty for text tokens.
    pub tag: String,
    /// Tag value or text content.
    pub value: String,
    /// Opening tag with no closer (or closer with no opener).
    pub unmatched: bool,
    /// Character (not byte) indices into the source text.
    pub start_index: usize,
    pub end_index: usize,
}

const SPECIAL: [char; 5] = ['{', '}', '/', '$', '='];

fn failure(message: &str, text: &str) -> Error {
    Error::format(
        "text",
        format!("Parsing failure: {}. Text: {}", message, text),
    )
}

/// Tokenize markup text into tag and text tokens.
pub fn parse(text: &str, permissive: bool) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut tokens: Vec<Token> = Vec::new();
    let mut unmatched_tokens: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    let mut i = 0usize;

    while i < len {
        if chars[i] == '{' {
            let mut token = Token {
                token_type: TokenType::OpeningTag,
                tag: String::new(),
                value: String::new(),
                unmatched: false,
                start_index: i,
                end_index: 0,
            };
            i += 1;
            if i >= len {
                if permissive {
                    break;
                }
                return Err(failure("open brace at the end", text));
            }
            if chars[i] == '/' {
                token.token_type = TokenType::ClosingTag;
                i += 1;
                if i >= len {
                    if permissive {
                        break;
                    }
                    return Err(failure("close brace at the end", text));
                }
            }

            let mut tag_name = String::new();
            let mut value = String::new();
            let mut has_value = false;
            let mut error = false;
            while i < len {
                let c = chars[i];
                if !SPECIAL.contains(&c) {
                    if token.tag.is_empty() {
                        tag_name.push(c);
                    } else {
                        value.push(c);
                    }
                } else if c == '=' {
                    if token.token_type == TokenType::OpeningTag {
                        token.tag = tag_name.clone();
                        has_value = true;
                    } else {
                        if !permissive {
                            return Err(failure("equal sign in closing tag", text));
                        }
                        error = true;
                        break;
                    }
                } else if c == '}' {
                    token.end_index = i;
                    if token.tag.is_empty() {
                        if tag_name.is_empty() {
                            if !permissive {
                                return Err(failure("empty tag", text));
                            }
                            error = true;
                            break;
                        }
                        token.tag = tag_name.clone();
                    } else {
                        if value.is_empty() {
                            if !permissive {
                                return Err(failure("empty value", text));
                            }
                            error = true;
                            break;
                        }
                        token.value = value.clone();
                    }

                    match token.token_type {
                        TokenType::OpeningTag => {
                            unmatched_tokens
                                .entry(token.tag.clone())
                                .or_default()
                                .push(tokens.len());
                            token.unmatched = true;
                        }
                        TokenType::ClosingTag => {
                            let stack = unmatched_tokens.entry(token.tag.clone()).or_default();
                            match stack.last().copied() {
                                None => token.unmatched = true,
                                Some(open_index) => {
                                    if tokens[open_index].start_index < token.start_index {
                                        tokens[open_index].unmatched = false;
                                        stack.pop();
                                    }
                                }
                            }
                        }
                        TokenType::Text => {}
                    }

                    i += 1;
                    break;
                } else {
                    if !permissive {
                        return Err(failure("unexpected character in tag", text));
                    }
                    error = true;
                    break;
                }
                i += 1;
            }

            let unclosed = token.tag.is_empty() || (has_value && token.value.is_empty());
            if !error {
                if unclosed {
                    if !permissive {
                        return Err(failure("tag was not closed", text));
                    }
                } else {
                    tokens.push(token);
                }
            }
        }

        if i < len {
            let start_index = i;
            let mut parsed_text = String::new();
            while i < len {
                let c = chars[i];
                if c == '{' {
                    break;
                }
                if c == '}' {
                    if !permissive {
                        return Err(failure("unexpected closing tag", text));
                    }
                } else {
                    parsed_text.push(c);
                }
                i += 1;
            }
            if !parsed_text.is_empty() {
                tokens.push(Token {
                    token_type: TokenType::Text,
                    tag: String::new(),
                    value: parsed_text,
                    unmatched: false,
                    start_index,
                    end_index: i - 1,
                });
            }
        }
    }

    Ok(tokens)
}

/// Strip all tags, leaving the visible text.
pub fn strip_tags(text: &str) -> String {
    match parse(text, true) {
        Ok(tokens) => tokens
            .into_iter()
            .filter(|t| t.token_type == TokenType::Text)
            .map(|t| t.value)
            .collect(),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let tokens = parse("hello world", false).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token_type, TokenType::Text);
        assert_eq!(tokens[0].value, "hello world");
        assert_eq!(tokens[0].start_index, 0);
        assert_eq!(tokens[0].end_index, 10);
    }

    #[test]
    fn test_matched_tags() {
        let tokens = parse("{color=red}stop{/color}", false).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].token_type, TokenType::OpeningTag);
        assert_eq!(tokens[0].tag, "color");
        assert_eq!(tokens[0].value, "red");
        assert!(!tokens[0].unmatched);
        assert_eq!(tokens[1].value, "stop");
        assert_eq!(tokens[2].token_type, TokenType::ClosingTag);
        assert_eq!(tokens[2].tag, "color");
    }

    #[test]
    fn test_valueless_tag() {
        let tokens = parse("{b}bold{/b}", false).unwrap();
        assert_eq!(tokens[0].tag, "b");
        assert_eq!(tokens[0].value, "");
        assert!(!tokens[0].unmatched);
    }

    #[test]
    fn test_unmatched_opening_tag() {
        let tokens = parse("{b}bold", false).unwrap();
        assert!(tokens[0].unmatched);
    }

    #[test]
    fn test_unmatched_closing_tag() {
        let tokens = parse("bold{/b}", false).unwrap();
        assert!(tokens[1].unmatched);
    }

    #[test]
    fn test_nested_same_tag() {
        let tokens = parse("{a}x{a}y{/a}z{/a}", false).unwrap();
        assert!(tokens.iter().all(|t| !t.unmatched));
    }

    #[test]
    fn test_strict_errors() {
        assert!(parse("{", false).is_err());
        assert!(parse("{}", false).is_err());
        assert!(parse("{a=}", false).is_err());
        assert!(parse("text } here", false).is_err());
        assert!(parse("{a$b}", false).is_err());
    }

    #[test]
    fn test_permissive_swallows_errors() {
        assert!(parse("{", true).is_ok());
        let tokens = parse("a } b", true).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, "a  b");
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("{color=red}stop{/color} now"), "stop now");
    }
}
