//! # Query Shaping
//!
//! Everything after FROM: binding the pending predicate and choosing the
//! access path, the SELECT list, aggregation and ORDER BY.
//!
//! ## Predicate Placement
//!
//! | Root after FROM | Predicate goes to |
//! |-----------------|-------------------|
//! | two-table NestedLoopJoin | the join (may become IndexOrderedJoin) |
//! | single Scan | a Selection above the (possibly range-narrowed) scan |
//! | anything else | a Selection above the root |
//!
//! ## SELECT Items
//!
//! | Item | Output |
//! |------|--------|
//! | `*` alone | the root unchanged, no Projection |
//! | `*` among others | every attribute of the root |
//! | `alias.*` | every attribute of that scan |
//! | `attr [AS name]` | a copy of the attribute |
//! | `expr [AS name]` | the evaluated expression; INT, DECIMAL or STRING(width) |
//!
//! An unaliased expression is named by its source text. Explicit aliases must
//! be unique among the output names.
//!
//! Aggregate functions or a GROUP BY turn the list into an Aggregate over a
//! Sort on the group keys. Plain items must then name a group key.

use eyre::{bail, Result};
use smallvec::SmallVec;

use super::{single_attribute, Cursor, Planner, QueryBuild};
use crate::config::{DECIMAL_SIZE, INT_SIZE, MAX_STRING_SIZE};
use crate::error::{SchemaError, SyntaxError};
use crate::schema::RelationHeader;
use crate::sql::clause::Clause;
use crate::sql::eet::Eet;
use crate::sql::executor::{
    AggFunc, AggItem, AggregateOp, Executor, Operator, ProjectItem, ProjectionOp, SelectionOp,
    SortKey, SortOp,
};
use crate::sql::optimizer;
use crate::sql::token::{Keyword, Operator as TokenOp, Punct, Token, TokenKind};
use crate::types::{AttrType, ValueKind};

#[derive(Debug, Clone, Copy)]
enum SelectItem<'s> {
    Star,
    TableStar(&'s str),
    Expr {
        start: usize,
        end: usize,
        alias: Option<&'s str>,
    },
    Agg {
        func: AggFunc,
        arg: Option<(usize, usize)>,
        start: usize,
        end: usize,
        alias: Option<&'s str>,
    },
}

fn aggregate_function(token: &Token) -> Option<AggFunc> {
    match token.kind {
        TokenKind::Reserved(Keyword::Count) => Some(AggFunc::Count),
        TokenKind::Reserved(Keyword::Sum) => Some(AggFunc::Sum),
        TokenKind::Reserved(Keyword::Min) => Some(AggFunc::Min),
        TokenKind::Reserved(Keyword::Max) => Some(AggFunc::Max),
        TokenKind::Reserved(Keyword::Avg) => Some(AggFunc::Avg),
        _ => None,
    }
}

/// Tokens that can end an operand, so a following identifier is an alias.
fn ends_operand(token: &Token) -> bool {
    matches!(
        token.kind,
        TokenKind::Identifier
            | TokenKind::Integer
            | TokenKind::Decimal
            | TokenKind::String
            | TokenKind::Reserved(Keyword::Null)
    ) || token.is_punct(Punct::RParen)
}

/// True when the parenthesis opening `tokens` closes at the last token.
fn encloses(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_punct(Punct::LParen) {
            depth += 1;
        } else if token.is_punct(Punct::RParen) {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return i == tokens.len() - 1;
            }
        }
    }
    false
}

/// Storage type and size of an expression result.
fn output_type(kind: ValueKind, width: usize) -> (AttrType, usize) {
    match kind.storage_type() {
        AttrType::Decimal => (AttrType::Decimal, DECIMAL_SIZE),
        AttrType::String => (AttrType::String, width.clamp(1, MAX_STRING_SIZE)),
        AttrType::Int => (AttrType::Int, INT_SIZE),
    }
}

/// Only explicit aliases are checked; unaliased items may repeat a name, as
/// in `SELECT id, id FROM t`.
fn check_alias(header: &RelationHeader, alias: Option<&str>) -> Result<()> {
    if let Some(alias) = alias {
        if header.position(alias).is_some() {
            bail!(SchemaError::new(format!("duplicate output name '{}'", alias)));
        }
    }
    Ok(())
}

/// Appends a copy of `source[pos]` to `header`, renamed when aliased.
fn push_copy(
    header: &mut RelationHeader,
    source: &RelationHeader,
    pos: usize,
    alias: Option<&str>,
) -> Result<()> {
    check_alias(header, alias)?;
    let attr = source.attribute(pos);
    let (name, table) = match alias {
        Some(alias) => (alias, None),
        None => (attr.name(), attr.table().map(str::to_string)),
    };
    header.push(name, table, attr.ty(), attr.size())
}

impl<'s, 'a, 'buf> Planner<'s, 'a, 'buf> {
    /// Binds the pending ON/WHERE conjunction to the root and places it.
    pub(super) fn finish_predicate(&self, build: &mut QueryBuild) -> Result<()> {
        let Some(mut predicate) = build.predicate.take() else {
            return Ok(());
        };
        let arena = self.cx.arena;
        let Some(root) = build.root.take() else {
            predicate.release(arena);
            bail!("predicate without a FROM operator");
        };
        if let Err(e) = self.bind_predicate(arena, &mut predicate, root.header()) {
            predicate.release(arena);
            build.root = Some(root);
            return Err(e);
        }

        let storage = self.cx.storage;
        let root = match root {
            Operator::NestedLoopJoin(mut join) if matches!(join.left(), Operator::Scan(_)) => {
                join.set_predicate(predicate);
                match optimizer::plan_join(storage, arena, &mut join) {
                    Ok(true) => Operator::IndexOrderedJoin(join),
                    Ok(false) => Operator::NestedLoopJoin(join),
                    Err(e) => {
                        build.root = Some(Operator::NestedLoopJoin(join));
                        return Err(e);
                    }
                }
            }
            Operator::Scan(mut scan) => {
                let narrowed = optimizer::narrow_scan(storage, arena, &mut scan, &predicate);
                build.root = Some(Operator::Selection(Box::new(SelectionOp::new(
                    Operator::Scan(scan),
                    predicate,
                ))));
                narrowed?;
                return Ok(());
            }
            other => Operator::Selection(Box::new(SelectionOp::new(other, predicate))),
        };
        build.root = Some(root);
        Ok(())
    }

    pub(super) fn plan_select(&self, clause: Clause, build: &mut QueryBuild) -> Result<()> {
        let mut cur = Cursor::new(self.sql, clause.start, clause.end);
        let spans = cur.comma_items(|_| false)?;
        let mut items: SmallVec<[SelectItem<'s>; 8]> = SmallVec::new();
        for (start, end) in spans {
            items.push(self.select_item(start, end)?);
        }

        let aggregate = build.group_by.is_some()
            || items.iter().any(|i| matches!(i, SelectItem::Agg { .. }));
        if aggregate {
            self.plan_aggregate(&items, build)
        } else {
            self.plan_projection(&items, build)
        }
    }

    fn select_item(&self, start: usize, end: usize) -> Result<SelectItem<'s>> {
        let mut cur = Cursor::new(self.sql, start, end);
        let mut tokens: SmallVec<[Token; 16]> = SmallVec::new();
        while let Some(token) = cur.next() {
            tokens.push(token);
        }
        let n = tokens.len();

        if n == 1 && tokens[0].is_operator(TokenOp::Star) {
            return Ok(SelectItem::Star);
        }
        if n == 3
            && tokens[0].kind == TokenKind::Identifier
            && tokens[1].is_punct(Punct::Dot)
            && tokens[2].is_operator(TokenOp::Star)
        {
            return Ok(SelectItem::TableStar(cur.text(tokens[0])));
        }

        let (body, alias) = if n >= 2 && tokens[n - 2].is_keyword(Keyword::As) {
            if tokens[n - 1].kind != TokenKind::Identifier {
                bail!(SyntaxError::new(tokens[n - 1].start, "expected alias after AS"));
            }
            (n - 2, Some(cur.text(tokens[n - 1])))
        } else if n >= 1 && tokens[n - 1].is_keyword(Keyword::As) {
            bail!(SyntaxError::new(tokens[n - 1].end, "expected alias after AS"));
        } else if n >= 2
            && tokens[n - 1].kind == TokenKind::Identifier
            && ends_operand(&tokens[n - 2])
        {
            (n - 1, Some(cur.text(tokens[n - 1])))
        } else {
            (n, None)
        };
        if body == 0 {
            bail!(SyntaxError::new(start, "expected expression"));
        }
        let (expr_start, expr_end) = (tokens[0].start, tokens[body - 1].end);

        if let Some(func) = aggregate_function(&tokens[0]) {
            if body >= 3 && tokens[1].is_punct(Punct::LParen) && encloses(&tokens[1..body]) {
                let inner = &tokens[2..body - 1];
                let (func, arg) = match inner {
                    [] => bail!(SyntaxError::new(tokens[1].end, "missing aggregate argument")),
                    [star] if star.is_operator(TokenOp::Star) => {
                        if func != AggFunc::Count {
                            bail!(SyntaxError::new(star.start, "'*' is only valid in COUNT(*)"));
                        }
                        (AggFunc::CountStar, None)
                    }
                    [first, .., last] => (func, Some((first.start, last.end))),
                    [only] => (func, Some((only.start, only.end))),
                };
                return Ok(SelectItem::Agg {
                    func,
                    arg,
                    start: expr_start,
                    end: expr_end,
                    alias,
                });
            }
        }
        Ok(SelectItem::Expr {
            start: expr_start,
            end: expr_end,
            alias,
        })
    }

    fn plan_projection(&self, items: &[SelectItem<'s>], build: &mut QueryBuild) -> Result<()> {
        if matches!(items, [SelectItem::Star]) {
            return Ok(());
        }
        let source = build.root()?.header().clone();
        let mut header = RelationHeader::new();
        let mut out: SmallVec<[ProjectItem; 8]> = SmallVec::new();
        if let Err(e) = self.projection_items(items, &source, &mut header, &mut out) {
            for item in out.iter().rev() {
                if let ProjectItem::Expr(eet) = item {
                    eet.release(self.cx.arena);
                }
            }
            return Err(e);
        }
        if let Some(child) = build.root.take() {
            build.root = Some(Operator::Projection(Box::new(ProjectionOp::new(
                child, out, header,
            ))));
        }
        Ok(())
    }

    fn projection_items(
        &self,
        items: &[SelectItem<'s>],
        source: &RelationHeader,
        header: &mut RelationHeader,
        out: &mut SmallVec<[ProjectItem; 8]>,
    ) -> Result<()> {
        let arena = self.cx.arena;
        for item in items {
            match *item {
                SelectItem::Star => {
                    for pos in 0..source.len() {
                        push_copy(header, source, pos, None)?;
                        out.push(ProjectItem::Copy(pos));
                    }
                }
                SelectItem::TableStar(alias) => {
                    let positions = source.positions_of_table(alias);
                    if positions.is_empty() {
                        bail!(SchemaError::new(format!("unknown table alias '{}'", alias)));
                    }
                    for pos in positions {
                        push_copy(header, source, pos, None)?;
                        out.push(ProjectItem::Copy(pos));
                    }
                }
                SelectItem::Expr { start, end, alias } => {
                    let eet = self.bind_expression(arena, start, end, source)?;
                    match single_attribute(arena, &eet) {
                        Ok(Some(pos)) => {
                            eet.release(arena);
                            push_copy(header, source, pos, alias)?;
                            out.push(ProjectItem::Copy(pos));
                        }
                        Ok(None) => {
                            out.push(ProjectItem::Expr(eet));
                            check_alias(header, alias)?;
                            let (ty, size) = output_type(eet.kind(), eet.width());
                            let name = alias.unwrap_or(&self.sql[start..end]);
                            header.push(name, None, ty, size)?;
                        }
                        Err(e) => {
                            eet.release(arena);
                            return Err(e);
                        }
                    }
                }
                SelectItem::Agg { start, .. } => bail!(SyntaxError::new(
                    start,
                    "aggregate function not allowed in this expression"
                )),
            }
        }
        Ok(())
    }

    fn plan_aggregate(&self, items: &[SelectItem<'s>], build: &mut QueryBuild) -> Result<()> {
        let source = build.root()?.header().clone();
        let group_by = match build.group_by {
            Some(clause) => self.group_keys(clause, &source)?,
            None => SmallVec::new(),
        };
        let mut header = RelationHeader::new();
        let mut out: SmallVec<[AggItem; 8]> = SmallVec::new();
        if let Err(e) = self.aggregate_items(items, &source, &group_by, &mut header, &mut out) {
            for item in out.iter().rev() {
                if let AggItem::Agg { arg: Some(eet), .. } = item {
                    eet.release(self.cx.arena);
                }
            }
            return Err(e);
        }

        let Some(child) = build.root.take() else {
            bail!("aggregate without a FROM operator");
        };
        let child = if group_by.is_empty() {
            child
        } else {
            let keys = group_by
                .iter()
                .map(|&position| SortKey {
                    position,
                    descending: false,
                })
                .collect();
            Operator::Sort(Box::new(SortOp::new(child, keys, self.config.sort_budget)))
        };
        build.root = Some(Operator::Aggregate(Box::new(AggregateOp::new(
            child, group_by, out, header,
        ))));
        Ok(())
    }

    fn aggregate_items(
        &self,
        items: &[SelectItem<'s>],
        source: &RelationHeader,
        group_by: &[usize],
        header: &mut RelationHeader,
        out: &mut SmallVec<[AggItem; 8]>,
    ) -> Result<()> {
        let arena = self.cx.arena;
        for item in items {
            match *item {
                SelectItem::Star | SelectItem::TableStar(_) => bail!(SchemaError::new(
                    "'*' cannot be combined with aggregate functions"
                )),
                SelectItem::Expr { start, end, alias } => {
                    let eet = self.bind_expression(arena, start, end, source)?;
                    let attribute = single_attribute(arena, &eet);
                    eet.release(arena);
                    let key = attribute?.and_then(|pos| group_by.iter().position(|&g| g == pos));
                    let Some(key) = key else {
                        bail!(SchemaError::new(format!(
                            "'{}' must appear in GROUP BY or inside an aggregate function",
                            &self.sql[start..end]
                        )));
                    };
                    push_copy(header, source, group_by[key], alias)?;
                    out.push(AggItem::Group(key));
                }
                SelectItem::Agg {
                    func,
                    arg,
                    start,
                    end,
                    alias,
                } => {
                    let arg = match arg {
                        Some((s, e)) => Some(self.bind_expression(arena, s, e, source)?),
                        None => None,
                    };
                    out.push(AggItem::Agg { func, arg });
                    let (ty, size) = aggregate_type(func, arg.as_ref())?;
                    check_alias(header, alias)?;
                    let name = alias.unwrap_or(&self.sql[start..end]);
                    header.push(name, None, ty, size)?;
                }
            }
        }
        Ok(())
    }

    fn group_keys(&self, clause: Clause, source: &RelationHeader) -> Result<SmallVec<[usize; 4]>> {
        let mut cur = Cursor::new(self.sql, clause.start, clause.end);
        let mut keys = SmallVec::new();
        for (start, end) in cur.comma_items(|_| false)? {
            let mut item = Cursor::new(self.sql, start, end);
            keys.push(self.attribute_ref(&mut item, source)?);
            item.expect_end()?;
        }
        Ok(keys)
    }

    /// `name` or `qualifier.name`, resolved against `header`.
    fn attribute_ref(&self, cur: &mut Cursor<'s>, header: &RelationHeader) -> Result<usize> {
        let first = cur.expect_identifier("attribute name")?;
        if cur.eat_punct(Punct::Dot) {
            let name = cur.expect_identifier("attribute name after '.'")?;
            return header.resolve(Some(cur.text(first)), cur.text(name));
        }
        header.resolve(None, cur.text(first))
    }

    /// `ORDER BY key [ASC | DESC], ...` where a key is an attribute of the
    /// current root or a 1-based output position.
    pub(super) fn plan_order_by(&self, clause: Clause, build: &mut QueryBuild) -> Result<()> {
        let header = build.root()?.header().clone();
        let mut cur = Cursor::new(self.sql, clause.start, clause.end);
        let mut keys: SmallVec<[SortKey; 4]> = SmallVec::new();
        for (start, end) in cur.comma_items(|_| false)? {
            let mut item = Cursor::new(self.sql, start, end);
            let position = match item.peek() {
                Some(t) if t.kind == TokenKind::Integer => {
                    item.next();
                    let ordinal: usize = item.text(t).parse().unwrap_or(0);
                    if ordinal == 0 || ordinal > header.len() {
                        bail!(SchemaError::new(format!(
                            "ORDER BY position {} is out of range (1..={})",
                            item.text(t),
                            header.len()
                        )));
                    }
                    ordinal - 1
                }
                _ => self.attribute_ref(&mut item, &header)?,
            };
            let descending = if item.eat_keyword(Keyword::Desc) {
                true
            } else {
                item.eat_keyword(Keyword::Asc);
                false
            };
            item.expect_end()?;
            keys.push(SortKey {
                position,
                descending,
            });
        }

        let Some(child) = build.root.take() else {
            bail!("ORDER BY without a FROM operator");
        };
        build.root = Some(Operator::Sort(Box::new(SortOp::new(
            child,
            keys,
            self.config.sort_budget,
        ))));
        Ok(())
    }
}

fn aggregate_type(func: AggFunc, arg: Option<&Eet>) -> Result<(AttrType, usize)> {
    let (kind, width) = arg.map(|e| (e.kind(), e.width())).unwrap_or((ValueKind::Int, 0));
    if matches!(func, AggFunc::Sum | AggFunc::Avg)
        && !matches!(kind, ValueKind::Int | ValueKind::Decimal | ValueKind::Null)
    {
        bail!(SchemaError::new(format!(
            "{} requires a numeric argument, got {}",
            func.name(),
            kind.name()
        )));
    }
    Ok(match func {
        AggFunc::CountStar | AggFunc::Count => (AttrType::Int, INT_SIZE),
        AggFunc::Avg => (AttrType::Decimal, DECIMAL_SIZE),
        AggFunc::Sum if kind == ValueKind::Decimal => (AttrType::Decimal, DECIMAL_SIZE),
        AggFunc::Sum => (AttrType::Int, INT_SIZE),
        AggFunc::Min | AggFunc::Max => output_type(kind, width),
    })
}
