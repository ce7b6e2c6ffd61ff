use eyre::{bail, Result};
use smallvec::SmallVec;

use super::{Executor, Next, Operator};
use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::sql::context::ExecutionContext;
use crate::sql::eet::Eet;

/// Forwards the child rows for which the predicate is TRUE (not NULL).
#[derive(Debug)]
pub struct SelectionOp {
    child: Operator,
    predicate: Option<Eet>,
}

impl SelectionOp {
    pub fn new(child: Operator, predicate: Eet) -> SelectionOp {
        SelectionOp {
            child,
            predicate: Some(predicate),
        }
    }

    pub fn child(&self) -> &Operator {
        &self.child
    }

    pub fn child_mut(&mut self) -> &mut Operator {
        &mut self.child
    }

    pub fn predicate(&self) -> Option<Eet> {
        self.predicate
    }
}

impl Executor for SelectionOp {
    fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        if self.predicate.is_none() {
            bail!("selection reopened after close");
        }
        self.child.open(cx)
    }

    fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next> {
        let Some(predicate) = self.predicate else {
            bail!("selection pulled after close");
        };
        loop {
            if self.child.next(cx, out)? == Next::Exhausted {
                return Ok(Next::Exhausted);
            }
            if predicate.evaluate(cx.arena, out)?.is_true() {
                return Ok(Next::Produced);
            }
        }
    }

    fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        let result = self.child.close(cx);
        if let Some(predicate) = self.predicate.take() {
            predicate.release(cx.arena);
        }
        result
    }

    fn header(&self) -> &RelationHeader {
        self.child.header()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ProjectItem {
    /// Copies attribute `position` of the input row.
    Copy(usize),
    Expr(Eet),
}

/// Writes one output row per input row, attribute by attribute.
#[derive(Debug)]
pub struct ProjectionOp {
    child: Operator,
    items: SmallVec<[ProjectItem; 8]>,
    header: RelationHeader,
    input: Option<Tuple>,
    released: bool,
}

impl ProjectionOp {
    pub fn new(
        child: Operator,
        items: SmallVec<[ProjectItem; 8]>,
        header: RelationHeader,
    ) -> ProjectionOp {
        debug_assert_eq!(items.len(), header.len());
        ProjectionOp {
            child,
            items,
            header,
            input: None,
            released: false,
        }
    }

    pub fn child(&self) -> &Operator {
        &self.child
    }

    pub fn items(&self) -> &[ProjectItem] {
        &self.items
    }
}

impl Executor for ProjectionOp {
    fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        if self.input.is_some() {
            return Ok(());
        }
        if self.released {
            bail!("projection reopened after close");
        }
        self.input = Some(Tuple::alloc(cx.arena, self.child.header())?);
        self.child.open(cx)
    }

    fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next> {
        let Some(input) = self.input else {
            bail!("projection pulled before open");
        };
        if self.child.next(cx, &input)? == Next::Exhausted {
            return Ok(Next::Exhausted);
        }
        let source = self.child.header();
        for (pos, item) in self.items.iter().enumerate() {
            let value = match item {
                ProjectItem::Copy(from) => input.get(cx.arena, source, *from),
                ProjectItem::Expr(eet) => eet.evaluate(cx.arena, &input)?,
            };
            out.set(cx.arena, &self.header, pos, &value)?;
        }
        Ok(Next::Produced)
    }

    fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        let result = self.child.close(cx);
        if let Some(input) = self.input.take() {
            input.release(cx.arena);
        }
        if !self.released {
            for item in self.items.iter().rev() {
                if let ProjectItem::Expr(eet) = item {
                    eet.release(cx.arena);
                }
            }
            self.released = true;
        }
        result
    }

    fn header(&self) -> &RelationHeader {
        &self.header
    }
}
