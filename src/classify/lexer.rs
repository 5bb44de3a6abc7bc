//! Tokenizer for the command part of an instruction line.
//!
//! Splits `G1 X10.0 Y5.2 E0.4` into a command word and parameter words.
//! Comments never reach this layer; the line type strips them first.

/// Token types in a command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    /// Command like "G1", "M104"
    Command,
    /// Parameter like "X10", "S255"
    Parameter,
}

/// A token with its text content
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

/// Tokenize the command part of a line
pub fn tokenize_code(code: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = code.char_indices().peekable();

    while let Some((start_idx, ch)) = chars.next() {
        match ch {
            ' ' | '\t' => continue,

            c if c.is_ascii_alphabetic() => {
                let mut end_idx = start_idx + ch.len_utf8();

                // Consume alphanumerics, dots, minus, plus, underscore
                while let Some(&(idx, next_ch)) = chars.peek() {
                    if next_ch.is_ascii_alphanumeric()
                        || next_ch == '.'
                        || next_ch == '-'
                        || next_ch == '+'
                        || next_ch == '_'
                    {
                        end_idx = idx + next_ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }

                let text = code[start_idx..end_idx].to_string();
                let kind = if tokens.is_empty() && is_command(&text) {
                    TokenKind::Command
                } else {
                    TokenKind::Parameter
                };
                tokens.push(Token { kind, text });
            }

            // Skip anything else (malformed input passes through as NoMatch)
            _ => continue,
        }
    }

    tokens
}

/// Commands start with G, M or T; everything else is a parameter
fn is_command(text: &str) -> bool {
    match text.chars().next() {
        Some(c) => matches!(c.to_ascii_uppercase(), 'G' | 'M' | 'T'),
        None => false,
    }
}

/// Split a parameter token like "X10.5" into its letter and value text
pub fn split_parameter(text: &str) -> Option<(char, &str)> {
    let mut chars = text.chars();
    let letter = chars.next()?;
    if !letter.is_ascii_alphabetic() {
        return None;
    }
    Some((letter.to_ascii_uppercase(), chars.as_str()))
}
