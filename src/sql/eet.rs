//! # Expression Evaluation Tree (EET)
//!
//! Despite the name, an EET is not a pointer tree. It is one contiguous arena
//! region holding the expression's nodes in postfix order, evaluated left to
//! right with an explicit value stack.
//!
//! ## Node Encoding
//!
//! | Tag | Node | Size | Payload |
//! |-----|------|------|---------|
//! | 0x01 | INT constant | 9 | `i64` LE |
//! | 0x02 | DECIMAL constant | 9 | `f64` LE |
//! | 0x03 | STRING constant | 3 + n | `u16` length, bytes |
//! | 0x04 | attribute (unbound) | 17 | name start/end, qualifier start/end (`u32` each) |
//! | 0x05 | attribute (bound) | 17 | scan `u8`, position `u16`, offset `u16`, size `u16`, type `u8`, padding |
//! | 0x06 | NULL | 1 | |
//! | 0x10.. | operator | 1 | |
//!
//! Unbound attribute nodes point back into the statement text. Binding
//! rewrites them in place into bound nodes of the same size, so binding never
//! moves or reallocates the sequence.
//!
//! ## Verification
//!
//! `verify_and_bind` resolves every attribute against the operator tree's
//! current header and simulates the evaluation with a stack of types. This
//! catches operator/operand type mismatches before execution, computes the
//! exact stack depth needed at run time, and records the expression's result
//! type and maximum text width.
//!
//! ## Evaluation
//!
//! - NULL propagates through arithmetic and comparisons
//! - AND, OR and XOR follow three-valued logic
//! - division or modulo by zero yields NULL
//! - INT overflow is a runtime error

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::config::{
    EET_ATTRIBUTE_NODE_SIZE, EET_CONSTANT_NODE_SIZE, EET_STRING_HEADER_SIZE,
    EET_TAG_ONLY_NODE_SIZE,
};
use crate::error::SchemaError;
use crate::memory::{QueryArena, Region};
use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::types::{AttrType, TextBuf, Value, ValueKind};

const TAG_INT: u8 = 0x01;
const TAG_DECIMAL: u8 = 0x02;
const TAG_TEXT: u8 = 0x03;
const TAG_ATTR: u8 = 0x04;
const TAG_BOUND: u8 = 0x05;
const TAG_NULL: u8 = 0x06;
const TAG_OP_BASE: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Neg = 0,
    Not = 1,
    Mul = 2,
    Div = 3,
    Mod = 4,
    Add = 5,
    Sub = 6,
    Eq = 7,
    Ne = 8,
    Lt = 9,
    Le = 10,
    Gt = 11,
    Ge = 12,
    And = 13,
    Or = 14,
    Xor = 15,
}

impl OpCode {
    fn from_tag(tag: u8) -> Option<OpCode> {
        Some(match tag.checked_sub(TAG_OP_BASE)? {
            0 => OpCode::Neg,
            1 => OpCode::Not,
            2 => OpCode::Mul,
            3 => OpCode::Div,
            4 => OpCode::Mod,
            5 => OpCode::Add,
            6 => OpCode::Sub,
            7 => OpCode::Eq,
            8 => OpCode::Ne,
            9 => OpCode::Lt,
            10 => OpCode::Le,
            11 => OpCode::Gt,
            12 => OpCode::Ge,
            13 => OpCode::And,
            14 => OpCode::Or,
            15 => OpCode::Xor,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        TAG_OP_BASE + self as u8
    }

    pub fn is_unary(self) -> bool {
        matches!(self, OpCode::Neg | OpCode::Not)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            OpCode::Eq | OpCode::Ne | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge
        )
    }

    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            OpCode::Or | OpCode::Xor => 1,
            OpCode::And => 2,
            OpCode::Not => 3,
            OpCode::Eq | OpCode::Ne | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => 4,
            OpCode::Add | OpCode::Sub => 5,
            OpCode::Mul | OpCode::Div | OpCode::Mod => 6,
            OpCode::Neg => 7,
        }
    }

    /// The comparison that holds with operands swapped (`c < a` is `a > c`).
    pub fn mirrored(self) -> OpCode {
        match self {
            OpCode::Lt => OpCode::Gt,
            OpCode::Le => OpCode::Ge,
            OpCode::Gt => OpCode::Lt,
            OpCode::Ge => OpCode::Le,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            OpCode::Neg => "-",
            OpCode::Not => "NOT",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::Mod => "%",
            OpCode::Add => "+",
            OpCode::Sub => "-",
            OpCode::Eq => "=",
            OpCode::Ne => "<>",
            OpCode::Lt => "<",
            OpCode::Le => "<=",
            OpCode::Gt => ">",
            OpCode::Ge => ">=",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Xor => "XOR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAttr {
    pub scan: u8,
    pub position: u16,
    pub offset: u16,
    pub size: u16,
    pub ty: AttrType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Int(i64),
    Decimal(f64),
    Text { at: usize, len: usize },
    Attr {
        name: (usize, usize),
        qualifier: Option<(usize, usize)>,
    },
    Bound(BoundAttr),
    Null,
    Op(OpCode),
}

/// Encoded size of the node starting at `at`.
fn node_size(arena: &QueryArena<'_>, at: usize) -> usize {
    match arena.get_u8(at) {
        TAG_INT | TAG_DECIMAL => EET_CONSTANT_NODE_SIZE,
        TAG_TEXT => EET_STRING_HEADER_SIZE + arena.read_u16(at + 1) as usize,
        TAG_ATTR | TAG_BOUND => EET_ATTRIBUTE_NODE_SIZE,
        _ => EET_TAG_ONLY_NODE_SIZE,
    }
}

fn decode(arena: &QueryArena<'_>, at: usize) -> Result<Node> {
    Ok(match arena.get_u8(at) {
        TAG_INT => Node::Int(arena.read_i64(at + 1)),
        TAG_DECIMAL => Node::Decimal(arena.read_f64(at + 1)),
        TAG_TEXT => Node::Text {
            at: at + EET_STRING_HEADER_SIZE,
            len: arena.read_u16(at + 1) as usize,
        },
        TAG_ATTR => {
            let qs = arena.read_u32(at + 9) as usize;
            let qe = arena.read_u32(at + 13) as usize;
            Node::Attr {
                name: (
                    arena.read_u32(at + 1) as usize,
                    arena.read_u32(at + 5) as usize,
                ),
                qualifier: (qs != qe).then_some((qs, qe)),
            }
        }
        TAG_BOUND => Node::Bound(BoundAttr {
            scan: arena.get_u8(at + 1),
            position: arena.read_u16(at + 2),
            offset: arena.read_u16(at + 4),
            size: arena.read_u16(at + 6),
            ty: AttrType::from_u8(arena.get_u8(at + 8))?,
        }),
        TAG_NULL => Node::Null,
        tag => match OpCode::from_tag(tag) {
            Some(op) => Node::Op(op),
            None => bail!("corrupt expression node tag {:#04x}", tag),
        },
    })
}

/// Writes nodes into a region, or only measures them when no arena is given.
/// The compiler runs once to size the region and once to fill it.
pub(crate) struct NodeWriter<'x, 'buf> {
    arena: Option<&'x QueryArena<'buf>>,
    at: usize,
    pub(crate) size: usize,
    pub(crate) nodes: usize,
}

impl<'x, 'buf> NodeWriter<'x, 'buf> {
    pub(crate) fn measure() -> Self {
        Self {
            arena: None,
            at: 0,
            size: 0,
            nodes: 0,
        }
    }

    pub(crate) fn into_region(arena: &'x QueryArena<'buf>, at: usize) -> Self {
        Self {
            arena: Some(arena),
            at,
            size: 0,
            nodes: 0,
        }
    }

    fn bump(&mut self, len: usize) -> Option<(&'x QueryArena<'buf>, usize)> {
        let at = self.at + self.size;
        self.size += len;
        self.nodes += 1;
        self.arena.map(|arena| (arena, at))
    }

    pub(crate) fn int(&mut self, value: i64) {
        if let Some((arena, at)) = self.bump(EET_CONSTANT_NODE_SIZE) {
            arena.set_u8(at, TAG_INT);
            arena.write_i64(at + 1, value);
        }
    }

    pub(crate) fn decimal(&mut self, value: f64) {
        if let Some((arena, at)) = self.bump(EET_CONSTANT_NODE_SIZE) {
            arena.set_u8(at, TAG_DECIMAL);
            arena.write_f64(at + 1, value);
        }
    }

    pub(crate) fn text(&mut self, bytes: &[u8]) {
        if let Some((arena, at)) = self.bump(EET_STRING_HEADER_SIZE + bytes.len()) {
            arena.set_u8(at, TAG_TEXT);
            arena.write_u16(at + 1, bytes.len() as u16);
            arena.write_from(at + EET_STRING_HEADER_SIZE, bytes);
        }
    }

    pub(crate) fn attr(&mut self, name: (usize, usize), qualifier: Option<(usize, usize)>) {
        if let Some((arena, at)) = self.bump(EET_ATTRIBUTE_NODE_SIZE) {
            let (qs, qe) = qualifier.unwrap_or((0, 0));
            arena.set_u8(at, TAG_ATTR);
            arena.write_u32(at + 1, name.0 as u32);
            arena.write_u32(at + 5, name.1 as u32);
            arena.write_u32(at + 9, qs as u32);
            arena.write_u32(at + 13, qe as u32);
        }
    }

    pub(crate) fn bound(&mut self, attr: BoundAttr) {
        if let Some((arena, at)) = self.bump(EET_ATTRIBUTE_NODE_SIZE) {
            write_bound(arena, at, attr);
        }
    }

    pub(crate) fn null(&mut self) {
        if let Some((arena, at)) = self.bump(EET_TAG_ONLY_NODE_SIZE) {
            arena.set_u8(at, TAG_NULL);
        }
    }

    pub(crate) fn op(&mut self, op: OpCode) {
        if let Some((arena, at)) = self.bump(EET_TAG_ONLY_NODE_SIZE) {
            arena.set_u8(at, op.tag());
        }
    }
}

fn write_bound(arena: &QueryArena<'_>, at: usize, attr: BoundAttr) {
    arena.fill(Region::new(at, EET_ATTRIBUTE_NODE_SIZE), 0);
    arena.set_u8(at, TAG_BOUND);
    arena.set_u8(at + 1, attr.scan);
    arena.write_u16(at + 2, attr.position);
    arena.write_u16(at + 4, attr.offset);
    arena.write_u16(at + 6, attr.size);
    arena.set_u8(at + 8, attr.ty.as_u8());
}

/// A single `attribute <op> constant` comparison, normalized so the attribute
/// is on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePredicate {
    pub position: usize,
    pub op: OpCode,
    pub constant: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eet {
    region: Region,
    nodes: u16,
    stack_size: u16,
    kind: ValueKind,
    width: u16,
    bound: bool,
}

impl Eet {
    pub(crate) fn from_parts(region: Region, nodes: usize) -> Self {
        Self {
            region,
            nodes: nodes as u16,
            stack_size: 0,
            kind: ValueKind::Null,
            width: 0,
            bound: false,
        }
    }

    /// A one-node expression reading attribute `position` of `header`.
    pub fn attribute(
        arena: &QueryArena<'_>,
        header: &RelationHeader,
        position: usize,
    ) -> Result<Eet> {
        let region = arena.allocate_front(EET_ATTRIBUTE_NODE_SIZE)?;
        let attr = header.attribute(position);
        write_bound(
            arena,
            region.offset(),
            BoundAttr {
                scan: header.scan_index(position) as u8,
                position: position as u16,
                offset: attr.offset() as u16,
                size: attr.size() as u16,
                ty: attr.ty(),
            },
        );
        Ok(Eet {
            region,
            nodes: 1,
            stack_size: 1,
            kind: attr.ty().kind(),
            width: attr.size() as u16,
            bound: true,
        })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn byte_size(&self) -> usize {
        self.region.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes as usize
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size as usize
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Widest text the expression can produce (0 for non-text results).
    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn release(self, arena: &QueryArena<'_>) {
        arena.free_front(self.region);
    }

    pub fn nodes(&self, arena: &QueryArena<'_>) -> Result<SmallVec<[Node; 8]>> {
        let mut out = SmallVec::new();
        let mut at = self.region.offset();
        while at < self.region.end() {
            out.push(decode(arena, at)?);
            at += node_size(arena, at);
        }
        Ok(out)
    }

    /// Resolves attribute references against `header` and type-checks the
    /// expression. `sql` is the statement text the node offsets refer to.
    pub fn verify_and_bind(
        &mut self,
        arena: &QueryArena<'_>,
        sql: &str,
        header: &RelationHeader,
    ) -> Result<()> {
        let mut types: SmallVec<[(ValueKind, u16); 16]> = SmallVec::new();
        let mut max_depth = 0usize;
        let mut at = self.region.offset();

        while at < self.region.end() {
            let size = node_size(arena, at);
            match decode(arena, at)? {
                Node::Int(_) => types.push((ValueKind::Int, 0)),
                Node::Decimal(_) => types.push((ValueKind::Decimal, 0)),
                Node::Text { len, .. } => types.push((ValueKind::Text, len as u16)),
                Node::Null => types.push((ValueKind::Null, 0)),
                Node::Attr { name, qualifier } => {
                    let name_text = text_at(sql, name)?;
                    let qualifier_text = match qualifier {
                        Some(q) => Some(text_at(sql, q)?),
                        None => None,
                    };
                    let position = header.resolve(qualifier_text, name_text)?;
                    let attr = header.attribute(position);
                    write_bound(
                        arena,
                        at,
                        BoundAttr {
                            scan: header.scan_index(position) as u8,
                            position: position as u16,
                            offset: attr.offset() as u16,
                            size: attr.size() as u16,
                            ty: attr.ty(),
                        },
                    );
                    types.push((attr.ty().kind(), attr.size() as u16));
                }
                Node::Bound(attr) => {
                    ensure!(
                        (attr.position as usize) < header.len(),
                        "bound attribute {} outside header of {} attributes",
                        attr.position,
                        header.len()
                    );
                    types.push((attr.ty.kind(), attr.size));
                }
                Node::Op(op) => {
                    let result = if op.is_unary() {
                        let Some((operand, width)) = types.pop() else {
                            bail!("malformed expression: missing operand for {}", op.symbol());
                        };
                        (unary_type(op, operand)?, width)
                    } else {
                        let (Some((right, rw)), Some((left, lw))) = (types.pop(), types.pop())
                        else {
                            bail!("malformed expression: missing operand for {}", op.symbol());
                        };
                        (binary_type(op, left, right)?, lw.max(rw))
                    };
                    let width = if result.0 == ValueKind::Text { result.1 } else { 0 };
                    types.push((result.0, width));
                }
            }
            max_depth = max_depth.max(types.len());
            at += size;
        }

        ensure!(
            types.len() == 1,
            "malformed expression leaves {} values on the stack",
            types.len()
        );
        let (kind, width) = types[0];
        self.kind = kind;
        self.width = width;
        self.stack_size = max_depth as u16;
        self.bound = true;
        Ok(())
    }

    pub fn evaluate(&self, arena: &QueryArena<'_>, tuple: &Tuple) -> Result<Value> {
        ensure!(self.bound, "expression evaluated before binding");
        let mut stack: SmallVec<[Value; 8]> = SmallVec::with_capacity(self.stack_size());
        let mut at = self.region.offset();

        while at < self.region.end() {
            let value = match decode(arena, at)? {
                Node::Int(i) => Value::Int(i),
                Node::Decimal(d) => Value::Decimal(d),
                Node::Text { at: bytes, len } => {
                    let mut text = TextBuf::from_elem(0, len);
                    arena.read_into(bytes, &mut text);
                    Value::Text(text)
                }
                Node::Null => Value::Null,
                Node::Bound(attr) => tuple.get_raw(
                    arena,
                    attr.position as usize,
                    attr.ty,
                    attr.offset as usize,
                    attr.size as usize,
                ),
                Node::Attr { .. } => bail!("unbound attribute in expression"),
                Node::Op(op) if op.is_unary() => {
                    let operand = stack.pop().unwrap_or(Value::Null);
                    apply_unary(op, operand)?
                }
                Node::Op(op) => {
                    let right = stack.pop().unwrap_or(Value::Null);
                    let left = stack.pop().unwrap_or(Value::Null);
                    apply_binary(op, left, right)?
                }
            };
            stack.push(value);
            at += node_size(arena, at);
        }

        ensure!(
            stack.len() == 1,
            "expression evaluation left {} values on the stack",
            stack.len()
        );
        Ok(stack.pop().unwrap_or(Value::Null))
    }

    /// Recognizes `attr <cmp> int` and `int <cmp> attr` on a bound expression.
    pub fn range_predicate(&self, arena: &QueryArena<'_>) -> Result<Option<RangePredicate>> {
        if self.nodes != 3 || !self.bound {
            return Ok(None);
        }
        let nodes = self.nodes(arena)?;
        let Node::Op(op) = nodes[2] else {
            return Ok(None);
        };
        if !op.is_comparison() || op == OpCode::Ne {
            return Ok(None);
        }
        Ok(match (nodes[0], nodes[1]) {
            (Node::Bound(attr), Node::Int(c)) => Some(RangePredicate {
                position: attr.position as usize,
                op,
                constant: c,
            }),
            (Node::Int(c), Node::Bound(attr)) => Some(RangePredicate {
                position: attr.position as usize,
                op: op.mirrored(),
                constant: c,
            }),
            _ => None,
        })
    }

    /// Recognizes `attr = attr` on a bound expression.
    pub fn equi_join(&self, arena: &QueryArena<'_>) -> Result<Option<(usize, usize)>> {
        if self.nodes != 3 || !self.bound {
            return Ok(None);
        }
        let nodes = self.nodes(arena)?;
        Ok(match (nodes[0], nodes[1], nodes[2]) {
            (Node::Bound(a), Node::Bound(b), Node::Op(OpCode::Eq)) => {
                Some((a.position as usize, b.position as usize))
            }
            _ => None,
        })
    }
}

fn text_at(sql: &str, (start, end): (usize, usize)) -> Result<&str> {
    sql.get(start..end)
        .ok_or_else(|| eyre::eyre!("attribute reference {}..{} outside statement", start, end))
}

fn mismatch(op: OpCode, operands: &[ValueKind]) -> eyre::Report {
    let names: SmallVec<[&str; 2]> = operands.iter().map(|k| k.name()).collect();
    eyre::Report::new(SchemaError::new(format!(
        "type mismatch: cannot apply '{}' to {}",
        op.symbol(),
        names.join(" and ")
    )))
}

fn unary_type(op: OpCode, operand: ValueKind) -> Result<ValueKind> {
    match (op, operand) {
        (OpCode::Neg, ValueKind::Int | ValueKind::Decimal | ValueKind::Null) => Ok(operand),
        (OpCode::Not, ValueKind::Bool | ValueKind::Null) => Ok(ValueKind::Bool),
        _ => Err(mismatch(op, &[operand])),
    }
}

fn binary_type(op: OpCode, left: ValueKind, right: ValueKind) -> Result<ValueKind> {
    use ValueKind::*;
    match op {
        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod => {
            match (left, right) {
                (Int, Int) => Ok(Int),
                (Int | Decimal, Int | Decimal) => Ok(Decimal),
                (Null, k) | (k, Null) if k.is_numeric() || k == Null => Ok(k),
                _ => Err(mismatch(op, &[left, right])),
            }
        }
        OpCode::And | OpCode::Or | OpCode::Xor => match (left, right) {
            (Bool | Null, Bool | Null) => Ok(Bool),
            _ => Err(mismatch(op, &[left, right])),
        },
        _ => {
            let comparable = left == Null
                || right == Null
                || (left.is_numeric() && right.is_numeric())
                || left == right;
            if comparable {
                Ok(Bool)
            } else {
                Err(mismatch(op, &[left, right]))
            }
        }
    }
}

fn apply_unary(op: OpCode, operand: Value) -> Result<Value> {
    Ok(match (op, operand) {
        (_, Value::Null) => Value::Null,
        (OpCode::Neg, Value::Int(i)) => match i.checked_neg() {
            Some(v) => Value::Int(v),
            None => bail!("integer overflow"),
        },
        (OpCode::Neg, Value::Decimal(d)) => Value::Decimal(-d),
        (OpCode::Not, Value::Bool(b)) => Value::Bool(!b),
        (op, v) => bail!("cannot apply '{}' to {}", op.symbol(), v.kind().name()),
    })
}

fn apply_binary(op: OpCode, left: Value, right: Value) -> Result<Value> {
    match op {
        OpCode::And => Ok(match (&left, &right) {
            (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            _ => Value::Bool(true),
        }),
        OpCode::Or => Ok(match (&left, &right) {
            (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            _ => Value::Bool(false),
        }),
        OpCode::Xor => Ok(match (&left, &right) {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a != b),
            _ => Value::Null,
        }),
        OpCode::Eq | OpCode::Ne | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
            let Some(ordering) = left.sql_cmp(&right) else {
                return Ok(Value::Null);
            };
            Ok(Value::Bool(match op {
                OpCode::Eq => ordering.is_eq(),
                OpCode::Ne => ordering.is_ne(),
                OpCode::Lt => ordering.is_lt(),
                OpCode::Le => ordering.is_le(),
                OpCode::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        _ => arithmetic(op, left, right),
    }
}

fn arithmetic(op: OpCode, left: Value, right: Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        let result = match op {
            OpCode::Add => a.checked_add(b),
            OpCode::Sub => a.checked_sub(b),
            OpCode::Mul => a.checked_mul(b),
            OpCode::Div | OpCode::Mod if b == 0 => return Ok(Value::Null),
            OpCode::Div => a.checked_div(b),
            _ => a.checked_rem(b),
        };
        return match result {
            Some(v) => Ok(Value::Int(v)),
            None => bail!("integer overflow in {} {} {}", a, op.symbol(), b),
        };
    }
    let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) else {
        bail!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            left.kind().name(),
            right.kind().name()
        );
    };
    Ok(match op {
        OpCode::Add => Value::Decimal(a + b),
        OpCode::Sub => Value::Decimal(a - b),
        OpCode::Mul => Value::Decimal(a * b),
        OpCode::Div | OpCode::Mod if b == 0.0 => Value::Null,
        OpCode::Div => Value::Decimal(a / b),
        _ => Value::Decimal(a % b),
    })
}
