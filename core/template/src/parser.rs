//! FILENAME: core/template/src/parser.rs
//! PURPOSE: Recursive descent parser that turns template segments into an AST.
//! CONTEXT: This is the second stage of the template pipeline. Liquid segments
//! are assembled into nested blocks; the inside of each marker is parsed from
//! the Lexer's token stream. Display segments map one-to-one onto nodes.
//!
//! GRAMMAR (marker interiors):
//!   filtered   --> expression ( "|" IDENT ( ":" expression ( "," expression )* )? )*
//!   condition  --> and_cond ( "or" and_cond )*
//!   and_cond   --> comparison ( "and" comparison )*
//!   comparison --> expression ( ("==" | "!=" | "<>" | "<" | ">" | "<=" | ">=" | "contains") expression )?
//!   expression --> STRING | NUMBER | "true" | "false" | "nil" | path | "(" expression ".." expression ")"
//!   path       --> IDENT ( "." IDENT | "[" expression "]" )*
//!
//! TAGS: if/elsif/else/endif, unless/else/endunless, for/else/endfor,
//!       assign, capture/endcapture, comment/endcomment

use crate::ast::{
    Accessor, CompareOperator, Condition, Dialect, Expr, Filter, FilteredExpr, Literal, Node,
    Template,
};
use crate::lexer::{split_display, split_liquid, DisplaySegment, Lexer, Segment};
use crate::token::Token;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Template parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parses a template in the given dialect.
pub fn parse(dialect: Dialect, source: &str) -> ParseResult<Template> {
    match dialect {
        Dialect::Display => parse_display(source),
        Dialect::Liquid => parse_liquid(source),
    }
}

/// Parses brace-format source: `Dear {firstName},`.
pub fn parse_display(source: &str) -> ParseResult<Template> {
    let nodes = split_display(source)?
        .into_iter()
        .map(|seg| match seg {
            DisplaySegment::Text(t) => Node::Text(t),
            DisplaySegment::Placeholder { name, spec } => Node::Placeholder { name, spec },
        })
        .collect();
    Ok(Template {
        dialect: Dialect::Display,
        nodes,
    })
}

/// Parses liquid source.
pub fn parse_liquid(source: &str) -> ParseResult<Template> {
    let segments = split_liquid(source)?;
    let mut parser = BlockParser { segments, pos: 0 };
    let (nodes, terminator) = parser.parse_block(&[])?;
    if let Some(tag) = terminator {
        return Err(ParseError::new(format!("Unexpected tag '{{% {} %}}'", tag)));
    }
    Ok(Template {
        dialect: Dialect::Liquid,
        nodes,
    })
}

// ============================================================================
// BLOCK STRUCTURE
// ============================================================================

struct BlockParser {
    segments: Vec<Segment>,
    pos: usize,
}

impl BlockParser {
    /// Parses nodes until one of `terminators` is met (returned, unconsumed
    /// content after it) or the input ends (returns None).
    fn parse_block(&mut self, terminators: &[&str]) -> ParseResult<(Vec<Node>, Option<String>)> {
        let mut nodes = Vec::new();

        while self.pos < self.segments.len() {
            let segment = self.segments[self.pos].clone();
            self.pos += 1;

            match segment {
                Segment::Text(t) => nodes.push(Node::Text(t)),
                Segment::Output(body) => {
                    let mut p = ExprParser::new(&body);
                    let fe = p.parse_filtered()?;
                    p.expect_end()?;
                    nodes.push(Node::Output(fe));
                }
                Segment::Tag(body) => {
                    let keyword = first_word(&body);
                    if terminators.iter().any(|t| *t == keyword) {
                        return Ok((nodes, Some(body)));
                    }
                    nodes.push(self.parse_tag(keyword, &body)?);
                }
            }
        }

        if terminators.is_empty() {
            Ok((nodes, None))
        } else {
            Err(ParseError::new(format!(
                "Missing '{{% {} %}}'",
                terminators[terminators.len() - 1]
            )))
        }
    }

    fn parse_tag(&mut self, keyword: &str, body: &str) -> ParseResult<Node> {
        let rest = body[keyword.len()..].trim();
        match keyword {
            "if" => self.parse_if(rest, false),
            "unless" => self.parse_if(rest, true),
            "for" => self.parse_for(rest),
            "assign" => {
                let mut p = ExprParser::new(rest);
                let name = p.expect_identifier()?;
                p.expect(Token::Assign)?;
                let value = p.parse_filtered()?;
                p.expect_end()?;
                Ok(Node::Assign { name, value })
            }
            "capture" => {
                let mut p = ExprParser::new(rest);
                let name = p.expect_identifier()?;
                p.expect_end()?;
                let (body, _) = self.parse_block(&["endcapture"])?;
                Ok(Node::Capture { name, body })
            }
            "comment" => {
                self.skip_until("endcomment")?;
                Ok(Node::Text(String::new()))
            }
            other => Err(ParseError::new(format!("Unknown tag '{}'", other))),
        }
    }

    fn parse_if(&mut self, first_condition: &str, negate: bool) -> ParseResult<Node> {
        let end_tag = if negate { "endunless" } else { "endif" };
        let terminators: &[&str] = if negate {
            &["else", "endunless"]
        } else {
            &["elsif", "else", "endif"]
        };

        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut condition = parse_condition_str(first_condition)?;
        if negate {
            condition = Condition::Not(Box::new(condition));
        }

        loop {
            let (body, terminator) = self.parse_block(terminators)?;
            branches.push((condition, body));
            let tag = terminator.unwrap_or_default();
            match first_word(&tag) {
                "elsif" => {
                    condition = parse_condition_str(tag["elsif".len()..].trim())?;
                }
                "else" => {
                    let (body, _) = self.parse_block(&[end_tag])?;
                    otherwise = Some(body);
                    break;
                }
                _ => break,
            }
        }

        Ok(Node::If {
            branches,
            otherwise,
        })
    }

    fn parse_for(&mut self, header: &str) -> ParseResult<Node> {
        let mut p = ExprParser::new(header);
        let variable = p.expect_identifier()?;
        match p.current.clone() {
            Token::Identifier(ref kw) if kw == "in" => p.advance(),
            other => {
                return Err(ParseError::new(format!(
                    "Expected 'in' in for tag, found {}",
                    other
                )))
            }
        }
        let iterable = p.parse_expression()?;

        let mut reversed = false;
        let mut limit = None;
        let mut offset = 0;
        while let Token::Identifier(option) = p.current.clone() {
            p.advance();
            match option.as_str() {
                "reversed" => reversed = true,
                "limit" => {
                    p.expect(Token::Colon)?;
                    limit = Some(p.expect_count()?);
                }
                "offset" => {
                    p.expect(Token::Colon)?;
                    offset = p.expect_count()?;
                }
                other => {
                    return Err(ParseError::new(format!("Unknown for option '{}'", other)))
                }
            }
        }
        p.expect_end()?;

        let (body, terminator) = self.parse_block(&["else", "endfor"])?;
        let otherwise = match terminator.as_deref().map(first_word) {
            Some("else") => Some(self.parse_block(&["endfor"])?.0),
            _ => None,
        };

        Ok(Node::For {
            variable,
            iterable,
            reversed,
            limit,
            offset,
            body,
            otherwise,
        })
    }

    fn skip_until(&mut self, end_tag: &str) -> ParseResult<()> {
        while self.pos < self.segments.len() {
            let seg = &self.segments[self.pos];
            self.pos += 1;
            if let Segment::Tag(body) = seg {
                if first_word(body) == end_tag {
                    return Ok(());
                }
            }
        }
        Err(ParseError::new(format!("Missing '{{% {} %}}'", end_tag)))
    }
}

fn first_word(body: &str) -> &str {
    body.split_whitespace().next().unwrap_or("")
}

fn parse_condition_str(source: &str) -> ParseResult<Condition> {
    let mut p = ExprParser::new(source);
    let cond = p.parse_condition()?;
    p.expect_end()?;
    Ok(cond)
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

/// Parses the token stream inside one marker.
pub struct ExprParser {
    lexer: Lexer,
    current: Token,
}

impl ExprParser {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        ExprParser { lexer, current }
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "Expected {}, found {}",
                expected, self.current
            )))
        }
    }

    fn expect_end(&self) -> ParseResult<()> {
        if self.current == Token::EOF {
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "Unexpected token after expression: {}",
                self.current
            )))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        match self.current.clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::new(format!(
                "Expected identifier, found {}",
                other
            ))),
        }
    }

    fn expect_count(&mut self) -> ParseResult<usize> {
        match self.current.clone() {
            Token::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                self.advance();
                Ok(n as usize)
            }
            other => Err(ParseError::new(format!(
                "Expected a non-negative integer, found {}",
                other
            ))),
        }
    }

    /// expression ( "|" filter )*
    pub fn parse_filtered(&mut self) -> ParseResult<FilteredExpr> {
        let expr = self.parse_expression()?;
        let mut filters = Vec::new();

        while self.current == Token::Pipe {
            self.advance();
            let name = self.expect_identifier()?;
            let mut args = Vec::new();
            if self.current == Token::Colon {
                self.advance();
                args.push(self.parse_expression()?);
                while self.current == Token::Comma {
                    self.advance();
                    args.push(self.parse_expression()?);
                }
            }
            filters.push(Filter { name, args });
        }

        Ok(FilteredExpr { expr, filters })
    }

    pub fn parse_condition(&mut self) -> ParseResult<Condition> {
        let mut left = self.parse_and()?;
        while self.current_is_keyword("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Condition> {
        let mut left = self.parse_comparison()?;
        while self.current_is_keyword("and") {
            self.advance();
            let right = self.parse_comparison()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Condition> {
        let left = self.parse_expression()?;

        let op = match &self.current {
            Token::Equal => CompareOperator::Equal,
            Token::NotEqual => CompareOperator::NotEqual,
            Token::LessThan => CompareOperator::LessThan,
            Token::GreaterThan => CompareOperator::GreaterThan,
            Token::LessEqual => CompareOperator::LessEqual,
            Token::GreaterEqual => CompareOperator::GreaterEqual,
            Token::Identifier(kw) if kw == "contains" => CompareOperator::Contains,
            _ => return Ok(Condition::Truthy(left)),
        };

        self.advance();
        let right = self.parse_expression()?;
        Ok(Condition::Compare { left, op, right })
    }

    fn current_is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current, Token::Identifier(k) if k == keyword)
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        match self.current.clone() {
            Token::String(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            Token::LParen => {
                self.advance();
                let start = self.parse_expression()?;
                self.expect(Token::DotDot)?;
                let end = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Range {
                    start: Box::new(start),
                    end: Box::new(end),
                })
            }
            Token::Identifier(name) => {
                self.advance();
                match name.as_str() {
                    "true" => return Ok(Expr::Literal(Literal::Boolean(true))),
                    "false" => return Ok(Expr::Literal(Literal::Boolean(false))),
                    "nil" | "null" => return Ok(Expr::Literal(Literal::Nil)),
                    _ => {}
                }
                let mut accessors = Vec::new();
                loop {
                    match self.current {
                        Token::Dot => {
                            self.advance();
                            accessors.push(Accessor::Key(self.expect_identifier()?));
                        }
                        Token::LBracket => {
                            self.advance();
                            let index = self.parse_expression()?;
                            self.expect(Token::RBracket)?;
                            accessors.push(Accessor::Index(index));
                        }
                        _ => break,
                    }
                }
                Ok(Expr::Path {
                    root: name,
                    accessors,
                })
            }
            other => Err(ParseError::new(format!(
                "Unexpected token in expression: {}",
                other
            ))),
        }
    }
}
