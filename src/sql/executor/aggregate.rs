//! # Aggregate
//!
//! Streaming aggregation over input sorted on the grouping attributes. The
//! operator reads ahead by one row: the row that ends a group stays in the
//! input tuple and opens the next group on the following `next` call.
//!
//! Without grouping attributes the whole input is one group, and an empty
//! input still produces one row (`COUNT` is 0, the others are NULL).
//!
//! | Function | Result type |
//! |----------|-------------|
//! | `COUNT(*)`, `COUNT(e)` | INT |
//! | `SUM(e)` | type of `e` |
//! | `AVG(e)` | DECIMAL |
//! | `MIN(e)`, `MAX(e)` | type and size of `e` |
//!
//! NULL arguments are ignored by every function except `COUNT(*)`.

use std::cmp::Ordering;

use eyre::{bail, Result};
use smallvec::SmallVec;

use super::{Executor, Next, Operator};
use crate::memory::QueryArena;
use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::sql::context::ExecutionContext;
use crate::sql::eet::Eet;
use crate::types::{AttrType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::CountStar | AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Avg => "AVG",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AggItem {
    /// Emits grouping attribute number `key` (an index into the group keys).
    Group(usize),
    Agg { func: AggFunc, arg: Option<Eet> },
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: i64,
    int_sum: i64,
    decimal_sum: f64,
    best: Option<Value>,
}

impl Accumulator {
    fn add(&mut self, func: AggFunc, value: Value) -> Result<()> {
        if func == AggFunc::CountStar {
            self.count += 1;
            return Ok(());
        }
        if value.is_null() {
            return Ok(());
        }
        self.count += 1;
        match func {
            AggFunc::Sum | AggFunc::Avg => match value {
                Value::Int(i) => match self.int_sum.checked_add(i) {
                    Some(sum) => self.int_sum = sum,
                    None => bail!("integer overflow in {}", func.name()),
                },
                Value::Decimal(d) => self.decimal_sum += d,
                other => bail!("cannot {} a {} value", func.name(), other.kind().name()),
            },
            AggFunc::Min | AggFunc::Max => {
                let replace = match &self.best {
                    None => true,
                    Some(best) => {
                        let ordering = value.sql_cmp(best).unwrap_or(Ordering::Equal);
                        (func == AggFunc::Min && ordering == Ordering::Less)
                            || (func == AggFunc::Max && ordering == Ordering::Greater)
                    }
                };
                if replace {
                    self.best = Some(value);
                }
            }
            AggFunc::Count | AggFunc::CountStar => {}
        }
        Ok(())
    }

    fn finish(&self, func: AggFunc, ty: AttrType) -> Value {
        match func {
            AggFunc::CountStar | AggFunc::Count => Value::Int(self.count),
            _ if self.count == 0 => Value::Null,
            AggFunc::Sum if ty == AttrType::Decimal => {
                Value::Decimal(self.decimal_sum + self.int_sum as f64)
            }
            AggFunc::Sum => Value::Int(self.int_sum),
            AggFunc::Avg => {
                Value::Decimal((self.decimal_sum + self.int_sum as f64) / self.count as f64)
            }
            AggFunc::Min | AggFunc::Max => self.best.clone().unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug)]
struct AggregateState {
    input: Tuple,
    pending: bool,
    input_done: bool,
    emitted: bool,
    keys: SmallVec<[Value; 4]>,
    accumulators: SmallVec<[Accumulator; 8]>,
}

#[derive(Debug)]
pub struct AggregateOp {
    child: Operator,
    group_by: SmallVec<[usize; 4]>,
    items: SmallVec<[AggItem; 8]>,
    header: RelationHeader,
    state: Option<AggregateState>,
    released: bool,
}

impl AggregateOp {
    pub fn new(
        child: Operator,
        group_by: SmallVec<[usize; 4]>,
        items: SmallVec<[AggItem; 8]>,
        header: RelationHeader,
    ) -> AggregateOp {
        debug_assert_eq!(items.len(), header.len());
        AggregateOp {
            child,
            group_by,
            items,
            header,
            state: None,
            released: false,
        }
    }

    pub fn child(&self) -> &Operator {
        &self.child
    }

    fn accumulate(
        items: &[AggItem],
        arena: &QueryArena<'_>,
        input: &Tuple,
        accumulators: &mut [Accumulator],
    ) -> Result<()> {
        for (item, acc) in items.iter().zip(accumulators.iter_mut()) {
            if let AggItem::Agg { func, arg } = item {
                let value = match arg {
                    Some(eet) => eet.evaluate(arena, input)?,
                    None => Value::Null,
                };
                acc.add(*func, value)?;
            }
        }
        Ok(())
    }

    fn emit(&self, cx: &ExecutionContext<'_, '_>, state: &AggregateState, out: &Tuple) -> Result<()> {
        for (pos, item) in self.items.iter().enumerate() {
            let value = match item {
                AggItem::Group(key) => state.keys.get(*key).cloned().unwrap_or(Value::Null),
                AggItem::Agg { func, .. } => {
                    state.accumulators[pos].finish(*func, self.header.attribute(pos).ty())
                }
            };
            out.set(cx.arena, &self.header, pos, &value)?;
        }
        Ok(())
    }
}

impl Executor for AggregateOp {
    fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        if self.released {
            bail!("aggregate reopened after close");
        }
        let input = Tuple::alloc(cx.arena, self.child.header())?;
        let mut accumulators = SmallVec::new();
        accumulators.resize(self.items.len(), Accumulator::default());
        self.state = Some(AggregateState {
            input,
            pending: false,
            input_done: false,
            emitted: false,
            keys: SmallVec::new(),
            accumulators,
        });
        self.child.open(cx)
    }

    fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next> {
        let Some(mut state) = self.state.take() else {
            bail!("aggregate pulled before open");
        };
        let result = self.next_group(cx, &mut state, out);
        self.state = Some(state);
        result
    }

    fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        let result = self.child.close(cx);
        if let Some(state) = self.state.take() {
            state.input.release(cx.arena);
        }
        if !self.released {
            for item in self.items.iter().rev() {
                if let AggItem::Agg { arg: Some(eet), .. } = item {
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

impl AggregateOp {
    fn next_group(
        &mut self,
        cx: &ExecutionContext<'_, '_>,
        state: &mut AggregateState,
        out: &Tuple,
    ) -> Result<Next> {
        if !state.pending {
            if state.input_done || self.child.next(cx, &state.input)? == Next::Exhausted {
                state.input_done = true;
                if self.group_by.is_empty() && !state.emitted {
                    state.accumulators.iter_mut().for_each(|a| *a = Accumulator::default());
                    self.emit(cx, state, out)?;
                    state.emitted = true;
                    return Ok(Next::Produced);
                }
                return Ok(Next::Exhausted);
            }
        }
        state.pending = false;

        let source = self.child.header();
        state.keys.clear();
        for &pos in &self.group_by {
            state.keys.push(state.input.get(cx.arena, source, pos));
        }
        state.accumulators.iter_mut().for_each(|a| *a = Accumulator::default());
        Self::accumulate(&self.items, cx.arena, &state.input, &mut state.accumulators)?;

        loop {
            if self.child.next(cx, &state.input)? == Next::Exhausted {
                state.input_done = true;
                break;
            }
            let source = self.child.header();
            let same_group = self
                .group_by
                .iter()
                .zip(state.keys.iter())
                .all(|(&pos, key)| state.input.get(cx.arena, source, pos) == *key);
            if !same_group {
                state.pending = true;
                break;
            }
            Self::accumulate(&self.items, cx.arena, &state.input, &mut state.accumulators)?;
        }

        self.emit(cx, state, out)?;
        state.emitted = true;
        Ok(Next::Produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_ignores_nulls_and_tracks_extremes() {
        let mut min = Accumulator::default();
        let mut max = Accumulator::default();
        for v in [Value::Int(4), Value::Null, Value::Int(-2), Value::Int(9)] {
            min.add(AggFunc::Min, v.clone()).unwrap();
            max.add(AggFunc::Max, v).unwrap();
        }
        assert_eq!(min.finish(AggFunc::Min, AttrType::Int), Value::Int(-2));
        assert_eq!(max.finish(AggFunc::Max, AttrType::Int), Value::Int(9));
        assert_eq!(min.count, 3);
    }

    #[test]
    fn test_sum_and_avg() {
        let mut sum = Accumulator::default();
        let mut avg = Accumulator::default();
        for v in [Value::Int(1), Value::Int(2), Value::Null] {
            sum.add(AggFunc::Sum, v.clone()).unwrap();
            avg.add(AggFunc::Avg, v).unwrap();
        }
        assert_eq!(sum.finish(AggFunc::Sum, AttrType::Int), Value::Int(3));
        assert_eq!(avg.finish(AggFunc::Avg, AttrType::Decimal), Value::Decimal(1.5));

        let mut overflow = Accumulator::default();
        overflow.add(AggFunc::Sum, Value::Int(i64::MAX)).unwrap();
        assert!(overflow.add(AggFunc::Sum, Value::Int(1)).is_err());
    }

    #[test]
    fn test_empty_group_results() {
        let acc = Accumulator::default();
        assert_eq!(acc.finish(AggFunc::CountStar, AttrType::Int), Value::Int(0));
        assert_eq!(acc.finish(AggFunc::Sum, AttrType::Int), Value::Null);
        assert_eq!(acc.finish(AggFunc::Max, AttrType::String), Value::Null);
    }

    #[test]
    fn test_count_star_counts_nulls() {
        let mut star = Accumulator::default();
        let mut count = Accumulator::default();
        for v in [Value::Null, Value::Int(1)] {
            star.add(AggFunc::CountStar, v.clone()).unwrap();
            count.add(AggFunc::Count, v).unwrap();
        }
        assert_eq!(star.finish(AggFunc::CountStar, AttrType::Int), Value::Int(2));
        assert_eq!(count.finish(AggFunc::Count, AttrType::Int), Value::Int(1));
    }
}
