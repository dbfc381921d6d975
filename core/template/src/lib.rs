//! FILENAME: core/template/src/lib.rs
//! PURPOSE: Library root for the review-flow template languages.
//! CONTEXT: Views render text through one of two dialects: `display`, a
//! brace-format string (`{title} by {author}`), and `liquid`, a subset of the
//! Liquid language with output markers, filters and control-flow tags.
//!
//! PIPELINE: Source --> Segments --> Tokens --> Parser --> Template --> render(Scope)
//!
//! SUPPORTED FEATURES:
//! - Display placeholders with `.Nf`, `d` and `s` format specs; `{{`/`}}` escapes
//! - Liquid output with filter chains: {{ title | upcase | truncate: 40 }}
//! - Liquid tags: if/elsif/else, unless, for (reversed, limit, offset), assign, capture, comment
//! - Whitespace control markers: {{- ... -}} and {%- ... -%}
//! - Undefined root variables are reported, never silently rendered empty

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod token;
pub mod value;


pub use ast::{Dialect, Template};
pub use lexer::Lexer;
pub use parser::{parse, parse_display, parse_liquid, ParseError, ParseResult};
pub use render::{render, RenderError, RenderResult};
pub use token::Token;
pub use value::{Layered, Scope, TemplateValue};
