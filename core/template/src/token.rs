//! FILENAME: core/template/src/token.rs
//! PURPOSE: Token definitions for the expression part of liquid tags.
//! CONTEXT: Tokens are produced by the expression lexer for the inside of
//! `{{ ... }}` and `{% ... %}` markers and consumed by the parser.

/// Tokens recognized inside a liquid output or tag marker.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    Identifier(String),

    // Operators
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    Assign,

    // Delimiters
    Dot,
    Pipe,
    Colon,
    Comma,
    LBracket,
    RBracket,
    /// Range operator inside `(1..3)`
    DotDot,
    LParen,
    RParen,

    // Special
    EOF,
    Illegal(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Equal => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::LessThan => write!(f, "<"),
            Token::GreaterThan => write!(f, ">"),
            Token::LessEqual => write!(f, "<="),
            Token::GreaterEqual => write!(f, ">="),
            Token::Assign => write!(f, "="),
            Token::Dot => write!(f, "."),
            Token::Pipe => write!(f, "|"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::DotDot => write!(f, ".."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::EOF => write!(f, "EOF"),
            Token::Illegal(c) => write!(f, "ILLEGAL({})", c),
        }
    }
}
