//! Tokenizer for policy expressions

use super::PolicyError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Int(i128),
    Float(f64),
    Str(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// 0-based byte offset in the source
    pub offset: usize,
}

/// Split an expression into tokens.
///
/// Rules:
/// - whitespace separates tokens and is otherwise ignored
/// - strings use single or double quotes, `\` escapes the next character
/// - numbers are decimal; a `.` followed by a digit makes a float
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, PolicyError> {
    let mut out = Vec::with_capacity(16);
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let single = |kind| Token { kind, offset };

        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '.' => {
                out.push(single(TokenKind::Dot));
                i += 1;
            }
            '[' => {
                out.push(single(TokenKind::LBracket));
                i += 1;
            }
            ']' => {
                out.push(single(TokenKind::RBracket));
                i += 1;
            }
            '(' => {
                out.push(single(TokenKind::LParen));
                i += 1;
            }
            ')' => {
                out.push(single(TokenKind::RParen));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next_is_eq = matches!(chars.get(i + 1), Some((_, '=')));
                let kind = match (c, next_is_eq) {
                    ('=', true) => TokenKind::Eq,
                    ('!', true) => TokenKind::Ne,
                    ('<', true) => TokenKind::Le,
                    ('>', true) => TokenKind::Ge,
                    ('<', false) => TokenKind::Lt,
                    ('>', false) => TokenKind::Gt,
                    _ => {
                        return Err(PolicyError::Syntax {
                            offset,
                            message: format!("unexpected character `{}`", c),
                        })
                    }
                };
                out.push(single(kind));
                i += if next_is_eq { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    match chars[j].1 {
                        '\\' if j + 1 < chars.len() => {
                            text.push(chars[j + 1].1);
                            j += 2;
                        }
                        ch if ch == quote => {
                            closed = true;
                            j += 1;
                            break;
                        }
                        ch => {
                            text.push(ch);
                            j += 1;
                        }
                    }
                }
                if !closed {
                    return Err(PolicyError::Syntax {
                        offset,
                        message: "unterminated string literal".to_string(),
                    });
                }
                out.push(single(TokenKind::Str(text)));
                i = j;
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    j += 1;
                }
                let is_float = j + 1 < chars.len()
                    && chars[j].1 == '.'
                    && chars[j + 1].1.is_ascii_digit();
                if is_float {
                    j += 1;
                    while j < chars.len() && chars[j].1.is_ascii_digit() {
                        j += 1;
                    }
                }
                let end = chars.get(j).map_or(source.len(), |(o, _)| *o);
                let text = &source[offset..end];
                let kind = if is_float {
                    text.parse().map(TokenKind::Float).ok()
                } else {
                    text.parse().map(TokenKind::Int).ok()
                };
                let kind = kind.ok_or_else(|| PolicyError::Syntax {
                    offset,
                    message: format!("invalid number `{}`", text),
                })?;
                out.push(single(kind));
                i = j;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].1.is_ascii_alphanumeric() || chars[j].1 == '_') {
                    j += 1;
                }
                let end = chars.get(j).map_or(source.len(), |(o, _)| *o);
                out.push(single(TokenKind::Ident(source[offset..end].to_string())));
                i = j;
            }
            c => {
                return Err(PolicyError::Syntax {
                    offset,
                    message: format!("unexpected character `{}`", c),
                })
            }
        }
    }

    Ok(out)
}

fn next_is_digit(chars: &[(usize, char)], i: usize) -> bool {
    matches!(chars.get(i + 1), Some((_, d)) if d.is_ascii_digit())
}
