//! # Access-Path Selection
//!
//! A narrow heuristic pass run once a WHERE predicate is bound. It never
//! changes results, only how rows are reached:
//!
//! - **Range scan**: a single scan whose predicate is exactly
//!   `attr <cmp> int` (or `int <cmp> attr`) on an indexed attribute reads
//!   only the index entries in the matching key range.
//! - **Index-ordered join**: a two-table join whose predicate is exactly
//!   `left.attr = right.attr` between INT attributes, with an index on the
//!   right attribute, probes the right index per left row instead of
//!   rescanning the right relation.
//!
//! Anything else, compound predicates included, leaves the plan untouched.
//! The Selection or join predicate is still evaluated on every row, so a
//! narrowed access path yields the same rows as the full one.
//!
//! ## Key Bounds
//!
//! | Predicate | Lower | Upper (exclusive) |
//! |-----------|-------|-------------------|
//! | `a = c` | `c` | `c + 1` |
//! | `a >= c` | `c` | end |
//! | `a > c` | `c + 1` | end |
//! | `a <= c` | start | `c + 1` |
//! | `a < c` | start | `c` |

use eyre::Result;
use tracing::debug;

use crate::memory::QueryArena;
use crate::sql::eet::{Eet, OpCode};
use crate::sql::executor::{Executor, JoinOp, ScanOp};
use crate::storage::Storage;
use crate::types::AttrType;

/// Key bounds `[low, high)` selected by `attr <op> constant`.
fn key_bounds(op: OpCode, constant: i64) -> Option<(Option<i64>, Option<i64>)> {
    let next = constant.saturating_add(1);
    Some(match op {
        OpCode::Eq => (Some(constant), Some(next)),
        OpCode::Ge => (Some(constant), None),
        OpCode::Gt => (Some(next), None),
        OpCode::Le => (None, Some(next)),
        OpCode::Lt => (None, Some(constant)),
        _ => return None,
    })
}

/// Narrows `scan` to an index range when `predicate` allows it.
pub fn narrow_scan(
    storage: &dyn Storage,
    arena: &QueryArena<'_>,
    scan: &mut ScanOp,
    predicate: &Eet,
) -> Result<bool> {
    let Some(range) = predicate.range_predicate(arena)? else {
        debug!(relation = scan.relation(), "full scan: predicate is not a single comparison");
        return Ok(false);
    };
    let Some(index) = storage.index_on(scan.relation(), range.position)? else {
        debug!(
            relation = scan.relation(),
            position = range.position,
            "full scan: attribute is not indexed"
        );
        return Ok(false);
    };
    let Some((low, high)) = key_bounds(range.op, range.constant) else {
        return Ok(false);
    };
    let bounds = ScanOp::key_range(storage, scan.relation(), index, range.position, low, high)?;
    scan.set_range(bounds);
    Ok(true)
}

/// Upgrades a two-table nested-loop join to index-ordered probing when its
/// predicate is an equi-join onto an indexed right attribute.
pub fn plan_join(
    storage: &dyn Storage,
    arena: &QueryArena<'_>,
    join: &mut JoinOp,
) -> Result<bool> {
    let Some(predicate) = join.predicate() else {
        return Ok(false);
    };
    let Some((a, b)) = predicate.equi_join(arena)? else {
        debug!("nested-loop join: predicate is not a single equality");
        return Ok(false);
    };
    let left_len = join.left().header().len();
    let (left_pos, right_pos) = match (a < left_len, b < left_len) {
        (true, false) => (a, b - left_len),
        (false, true) => (b, a - left_len),
        _ => {
            debug!("nested-loop join: equality does not span both inputs");
            return Ok(false);
        }
    };
    if join.left().header().attribute(left_pos).ty() != AttrType::Int {
        debug!(
            left_key = left_pos,
            "nested-loop join: outer key is not INT, index keys cannot be probed"
        );
        return Ok(false);
    }
    let relation = join.right().relation().to_string();
    let Some(index) = storage.index_on(&relation, right_pos)? else {
        debug!(
            relation = %relation,
            position = right_pos,
            "nested-loop join: inner attribute is not indexed"
        );
        return Ok(false);
    };
    let full = ScanOp::key_range(storage, &relation, index, right_pos, None, None)?;
    join.right_mut().set_range(full);
    join.set_probe_key(left_pos);
    debug!(relation = %relation, left_key = left_pos, right_key = right_pos, "index-ordered join");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bounds_per_operator() {
        assert_eq!(key_bounds(OpCode::Eq, 5), Some((Some(5), Some(6))));
        assert_eq!(key_bounds(OpCode::Ge, 5), Some((Some(5), None)));
        assert_eq!(key_bounds(OpCode::Gt, 5), Some((Some(6), None)));
        assert_eq!(key_bounds(OpCode::Le, 5), Some((None, Some(6))));
        assert_eq!(key_bounds(OpCode::Lt, 5), Some((None, Some(5))));
        assert_eq!(key_bounds(OpCode::Ne, 5), None);
    }

    #[test]
    fn test_range_pattern_recognition() {
        use crate::schema::RelationHeader;
        use crate::sql::expr::compile;

        let mut buf = [0u8; 512];
        let arena = QueryArena::new(&mut buf);
        let header = RelationHeader::builder().int("id").int("v").build().unwrap();
        let pattern = |sql: &str| {
            let mut eet = compile(&arena, sql, 0, sql.len(), None).unwrap();
            eet.verify_and_bind(&arena, sql, &header).unwrap();
            eet.range_predicate(&arena)
                .unwrap()
                .map(|r| (r.position, r.op, r.constant))
        };

        assert_eq!(pattern("v >= 2"), Some((1, OpCode::Ge, 2)));
        assert_eq!(pattern("5 < id"), Some((0, OpCode::Gt, 5)));
        assert_eq!(pattern("id = -3"), Some((0, OpCode::Eq, -3)));
        assert_eq!(pattern("id <> 1"), None);
        assert_eq!(pattern("id > 1 AND id < 5"), None);
        assert_eq!(pattern("id = v"), None);
        assert_eq!(pattern("id + 1 = 2"), None);
    }
}
