//! FILENAME: core/template/src/lexer.rs
//! PURPOSE: Splits template source into segments and scans tag expressions into Tokens.
//! CONTEXT: This is the first stage of the template pipeline. Liquid source is
//! cut into text, `{{ output }}` and `{% tag %}` segments (honouring the `-`
//! whitespace-trim markers); display source is cut into text and `{name}`
//! placeholders. The inside of every liquid marker is then tokenized by `Lexer`.
//!
//! SUPPORTED OPERATORS:
//! - Single char: . | : , [ ] ( ) < > =
//! - Multi char: == != <> <= >= ..
//! - Quoted strings: "text" or 'text'

use crate::parser::ParseError;
use crate::token::Token;

/// A raw piece of liquid source.
#[derive(Debug, PartialEq, Clone)]
pub enum Segment {
    Text(String),
    /// Inside of `{{ ... }}`
    Output(String),
    /// Inside of `{% ... %}`
    Tag(String),
}

/// A raw piece of display (brace-format) source.
#[derive(Debug, PartialEq, Clone)]
pub enum DisplaySegment {
    Text(String),
    /// `{name}` or `{name:spec}`
    Placeholder { name: String, spec: Option<String> },
}

/// Cuts liquid source into segments.
/// `{{-`/`{%-` strip whitespace to the left, `-}}`/`-%}` to the right.
pub fn split_liquid(source: &str) -> Result<Vec<Segment>, ParseError> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    loop {
        let next_open = match (rest.find("{{"), rest.find("{%")) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let Some(start) = next_open else {
            push_text(&mut segments, rest, trim_next, false);
            break;
        };

        let is_output = rest[start..].starts_with("{{");
        let close = if is_output { "}}" } else { "%}" };
        let body_start = start + 2;
        let Some(rel_end) = rest[body_start..].find(close) else {
            return Err(ParseError::new(format!(
                "Unclosed '{}' starting at '{}'",
                &rest[start..body_start],
                preview(&rest[start..])
            )));
        };
        let body_end = body_start + rel_end;

        let mut body = &rest[body_start..body_end];
        let trim_left = body.starts_with('-');
        if trim_left {
            body = &body[1..];
        }
        let trim_right = body.ends_with('-');
        if trim_right {
            body = &body[..body.len() - 1];
        }

        push_text(&mut segments, &rest[..start], trim_next, trim_left);

        let body = body.trim().to_string();
        segments.push(if is_output {
            Segment::Output(body)
        } else {
            Segment::Tag(body)
        });

        trim_next = trim_right;
        rest = &rest[body_end + 2..];
    }

    Ok(segments)
}

fn push_text(segments: &mut Vec<Segment>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
}

fn preview(s: &str) -> String {
    s.chars().take(20).collect()
}

/// Cuts display source into text and placeholders.
/// `{{` and `}}` are literal braces.
pub fn split_display(source: &str) -> Result<Vec<DisplaySegment>, ParseError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(ParseError::new(format!(
                        "Unclosed placeholder '{{{}'",
                        inner
                    )));
                }
                let (name, spec) = match inner.split_once(':') {
                    Some((n, s)) => (n.trim().to_string(), Some(s.to_string())),
                    None => (inner.trim().to_string(), None),
                };
                if name.is_empty() {
                    return Err(ParseError::new(
                        "Empty placeholder '{}': positional fields are not supported",
                    ));
                }
                if !text.is_empty() {
                    segments.push(DisplaySegment::Text(std::mem::take(&mut text)));
                }
                segments.push(DisplaySegment::Placeholder { name, spec });
            }
            '}' => {
                return Err(ParseError::new("Single '}' encountered in display template"));
            }
            other => text.push(other),
        }
    }

    if !text.is_empty() {
        segments.push(DisplaySegment::Text(text));
    }
    Ok(segments)
}

/// Tokenizer for the inside of a liquid marker.
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.bump() {
            Some('|') => Token::Pipe,
            Some(':') => Token::Colon,
            Some(',') => Token::Comma,
            Some('[') => Token::LBracket,
            Some(']') => Token::RBracket,
            Some('(') => Token::LParen,
            Some(')') => Token::RParen,

            Some('.') => {
                if self.peek() == Some('.') {
                    self.bump();
                    Token::DotDot
                } else {
                    Token::Dot
                }
            }

            Some('=') => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token::Equal
                } else {
                    Token::Assign
                }
            }

            Some('!') => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token::NotEqual
                } else {
                    Token::Illegal('!')
                }
            }

            Some('<') => self.read_less_than_operator(),
            Some('>') => self.read_greater_than_operator(),

            Some(q @ ('"' | '\'')) => self.read_string(q),

            Some('-') if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number('-'),
            Some(ch) if ch.is_ascii_digit() => self.read_number(ch),

            Some(ch) if is_letter(ch) => self.read_identifier(ch),

            None => Token::EOF,

            Some(ch) => Token::Illegal(ch),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    /// Handles operators starting with '<': <, <=, <>
    fn read_less_than_operator(&mut self) -> Token {
        match self.peek() {
            Some('=') => {
                self.bump();
                Token::LessEqual
            }
            Some('>') => {
                self.bump();
                Token::NotEqual
            }
            _ => Token::LessThan,
        }
    }

    /// Handles operators starting with '>': >, >=
    fn read_greater_than_operator(&mut self) -> Token {
        match self.peek() {
            Some('=') => {
                self.bump();
                Token::GreaterEqual
            }
            _ => Token::GreaterThan,
        }
    }

    fn read_string(&mut self, quote: char) -> Token {
        let mut result = String::new();
        while let Some(ch) = self.bump() {
            if ch == quote {
                return Token::String(result);
            }
            result.push(ch);
        }
        // Unterminated string: return what we have.
        Token::String(result)
    }

    fn read_number(&mut self, first_char: char) -> Token {
        let mut number_str = String::from(first_char);
        let mut has_dot = false;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.pos += 1;
            } else if ch == '.'
                && !has_dot
                && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
            {
                // A second '.' would be the start of a range operator.
                has_dot = true;
                number_str.push(ch);
                self.pos += 1;
            } else {
                break;
            }
        }

        match number_str.parse::<f64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Illegal(first_char),
        }
    }

    fn read_identifier(&mut self, first_char: char) -> Token {
        let mut ident = String::from(first_char);

        while let Some(ch) = self.peek() {
            if is_letter(ch) || ch.is_ascii_digit() || ch == '?' {
                ident.push(ch);
                self.pos += 1;
            } else {
                break;
            }
        }

        Token::Identifier(ident)
    }
}

/// Returns true if `ch` can start an identifier.
fn is_letter(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}
