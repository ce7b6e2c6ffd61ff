//! # Expression Compiler
//!
//! Compiles an expression substring of the statement into an EET using
//! operator-precedence parsing (shunting-yard). Operands are emitted as soon
//! as they are scanned; operators wait on a small stack until an operator of
//! lower or equal precedence, a closing parenthesis or the end of the range
//! releases them, which yields postfix order directly.
//!
//! ## Two Passes
//!
//! The exact byte size of the node sequence is not known up front, and the
//! arena has no way to shrink a region. The compiler therefore parses the
//! range twice: once to measure, once to write into a region of exactly the
//! measured size. Parsing is idempotent because the lexer re-derives every
//! token from offsets.
//!
//! ## Continuations
//!
//! `ON` predicates of a join chain and the `WHERE` predicate are merged into
//! one conjunction. Compiling with `continuation = Some(eet)` appends the new
//! nodes after the existing ones followed by an `AND` node, growing the
//! existing region.
//!
//! ## Precedence (low to high)
//!
//! | Level | Operators |
//! |-------|-----------|
//! | 1 | `OR`, `XOR` |
//! | 2 | `AND` |
//! | 3 | `NOT` |
//! | 4 | `= <> < <= > >=` |
//! | 5 | `+ -` |
//! | 6 | `* / %` |
//! | 7 | unary `-` |
//!
//! A minus sign directly in front of a numeric literal is folded into the
//! constant, so `-9223372036854775808` compiles to a single INT node.

use eyre::{bail, Result};
use smallvec::SmallVec;

use super::eet::{Eet, NodeWriter, OpCode};
use super::lexer::Lexer;
use super::token::{Keyword, Operator, Punct, TokenKind};
use crate::error::SyntaxError;
use crate::memory::QueryArena;

#[derive(Debug, Clone, Copy)]
enum Pending {
    Op(OpCode),
    Open(usize),
}

fn binary_operator(kind: TokenKind) -> Option<OpCode> {
    Some(match kind {
        TokenKind::Operator(op) => match op {
            Operator::Plus => OpCode::Add,
            Operator::Minus => OpCode::Sub,
            Operator::Star => OpCode::Mul,
            Operator::Slash => OpCode::Div,
            Operator::Percent => OpCode::Mod,
            Operator::Eq => OpCode::Eq,
            Operator::NotEq => OpCode::Ne,
            Operator::Lt => OpCode::Lt,
            Operator::LtEq => OpCode::Le,
            Operator::Gt => OpCode::Gt,
            Operator::GtEq => OpCode::Ge,
        },
        TokenKind::Reserved(Keyword::And) => OpCode::And,
        TokenKind::Reserved(Keyword::Or) => OpCode::Or,
        TokenKind::Reserved(Keyword::Xor) => OpCode::Xor,
        _ => return None,
    })
}

pub(crate) fn is_aggregate_keyword(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Reserved(
            Keyword::Count | Keyword::Sum | Keyword::Min | Keyword::Max | Keyword::Avg
        )
    )
}

fn parse_int(text: &str, negate: bool, offset: usize) -> Result<i64> {
    let magnitude: i128 = match text.parse() {
        Ok(v) => v,
        Err(_) => bail!(SyntaxError::new(offset, "invalid integer literal")),
    };
    let value = if negate { -magnitude } else { magnitude };
    match i64::try_from(value) {
        Ok(v) => Ok(v),
        Err(_) => bail!(SyntaxError::new(offset, "integer literal out of range")),
    }
}

fn parse_decimal(text: &str, negate: bool, offset: usize) -> Result<f64> {
    match text.parse::<f64>() {
        Ok(v) if negate => Ok(-v),
        Ok(v) => Ok(v),
        Err(_) => bail!(SyntaxError::new(offset, "invalid decimal literal")),
    }
}

/// Parses `sql[start..end]` once, emitting nodes into `out`.
fn parse(sql: &str, start: usize, end: usize, out: &mut NodeWriter<'_, '_>) -> Result<()> {
    let mut lexer = Lexer::new(sql);
    lexer.set_offset(start);
    let mut pending: SmallVec<[Pending; 16]> = SmallVec::new();
    let mut expect_operand = true;
    let mut last_end = start;

    while lexer.advance() {
        let token = lexer.token();
        if token.start >= end {
            break;
        }
        last_end = token.end;
        if let TokenKind::Error(message) = token.kind {
            bail!(SyntaxError::new(token.start, message));
        }

        if expect_operand {
            match token.kind {
                TokenKind::Integer => out.int(parse_int(lexer.text(token), false, token.start)?),
                TokenKind::Decimal => {
                    out.decimal(parse_decimal(lexer.text(token), false, token.start)?)
                }
                TokenKind::String => {
                    let text = lexer.string_literal(token);
                    if text.len() > u16::MAX as usize {
                        bail!(SyntaxError::new(token.start, "string literal too long"));
                    }
                    out.text(&text);
                }
                TokenKind::Reserved(Keyword::Null) => out.null(),
                TokenKind::Identifier => {
                    let first = (token.start, token.end);
                    let resume = lexer.offset();
                    let qualified = lexer.advance()
                        && lexer.token().start < end
                        && lexer.token().is_punct(Punct::Dot);
                    if qualified {
                        if !lexer.advance()
                            || lexer.token().start >= end
                            || lexer.token().kind != TokenKind::Identifier
                        {
                            bail!(SyntaxError::new(
                                lexer.token().start,
                                "expected attribute name after '.'"
                            ));
                        }
                        let name = lexer.token();
                        last_end = name.end;
                        out.attr((name.start, name.end), Some(first));
                    } else {
                        lexer.set_offset(resume);
                        out.attr(first, None);
                    }
                }
                TokenKind::Operator(Operator::Minus) => {
                    let resume = lexer.offset();
                    let folded = lexer.advance() && lexer.token().start < end && {
                        let literal = lexer.token();
                        match literal.kind {
                            TokenKind::Integer => {
                                out.int(parse_int(lexer.text(literal), true, token.start)?);
                                last_end = literal.end;
                                true
                            }
                            TokenKind::Decimal => {
                                out.decimal(parse_decimal(lexer.text(literal), true, token.start)?);
                                last_end = literal.end;
                                true
                            }
                            _ => false,
                        }
                    };
                    if !folded {
                        lexer.set_offset(resume);
                        pending.push(Pending::Op(OpCode::Neg));
                    }
                    expect_operand = !folded;
                    continue;
                }
                TokenKind::Operator(Operator::Plus) => continue,
                TokenKind::Reserved(Keyword::Not) => {
                    pending.push(Pending::Op(OpCode::Not));
                    continue;
                }
                TokenKind::Punctuation(Punct::LParen) => {
                    pending.push(Pending::Open(token.start));
                    continue;
                }
                kind if is_aggregate_keyword(kind) => bail!(SyntaxError::new(
                    token.start,
                    "aggregate function not allowed in this expression"
                )),
                _ => bail!(SyntaxError::new(
                    token.start,
                    format!("expected operand, found '{}'", lexer.text(token))
                )),
            }
            expect_operand = false;
            continue;
        }

        if let Some(op) = binary_operator(token.kind) {
            while let Some(&Pending::Op(top)) = pending.last() {
                if top.precedence() < op.precedence() {
                    break;
                }
                out.op(top);
                pending.pop();
            }
            pending.push(Pending::Op(op));
            expect_operand = true;
        } else if token.is_punct(Punct::RParen) {
            loop {
                match pending.pop() {
                    Some(Pending::Op(op)) => out.op(op),
                    Some(Pending::Open(_)) => break,
                    None => bail!(SyntaxError::new(token.start, "unbalanced ')'")),
                }
            }
        } else {
            bail!(SyntaxError::new(
                token.start,
                format!("expected operator, found '{}'", lexer.text(token))
            ));
        }
    }

    if out.nodes == 0 && pending.is_empty() {
        bail!(SyntaxError::new(start, "empty expression"));
    }
    if expect_operand {
        bail!(SyntaxError::new(last_end, "incomplete expression"));
    }
    while let Some(entry) = pending.pop() {
        match entry {
            Pending::Op(op) => out.op(op),
            Pending::Open(offset) => bail!(SyntaxError::new(offset, "unbalanced '('")),
        }
    }
    Ok(())
}

/// Compiles `sql[start..end]` into an EET allocated at the arena front.
///
/// With a continuation the new nodes are appended to it and joined with
/// `AND`; the returned EET replaces the continuation and is unbound.
pub fn compile(
    arena: &QueryArena<'_>,
    sql: &str,
    start: usize,
    end: usize,
    continuation: Option<Eet>,
) -> Result<Eet> {
    let mut measure = NodeWriter::measure();
    parse(sql, start, end, &mut measure)?;

    match continuation {
        None => {
            let region = arena.allocate_front(measure.size)?;
            let mut writer = NodeWriter::into_region(arena, region.offset());
            parse(sql, start, end, &mut writer)?;
            Ok(Eet::from_parts(region, writer.nodes))
        }
        Some(previous) => {
            let region = arena.grow_front(previous.region(), measure.size + 1)?;
            let mut writer =
                NodeWriter::into_region(arena, region.offset() + previous.byte_size());
            parse(sql, start, end, &mut writer)?;
            writer.op(OpCode::And);
            Ok(Eet::from_parts(
                region,
                previous.node_count() + writer.nodes,
            ))
        }
    }
}
