//! ORDER BY, DISTINCT, and LIMIT/OFFSET stages.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{Expr, NullsPosition, OrderByExpr, OrderDirection};
use crate::error::QueryError;
use crate::filter::Filter;
use crate::value::{Value, compare};
use crate::view::View;

/// Stable sort on the composite ORDER BY keys. NULLS FIRST/LAST default
/// to first for ascending and last for descending keys.
pub fn order_by(
    view: View,
    order_by: &[OrderByExpr],
    filter: &Filter<'_>,
) -> Result<View, QueryError> {
    let record_len = view.record_len();
    let shared = Arc::new(view);

    let mut keys: Vec<Vec<Value>> = Vec::with_capacity(record_len);
    {
        let mut bound = filter.for_records(Arc::clone(&shared));
        let exprs: Vec<Expr> = order_by.iter().map(|o| o.expr.clone()).collect();
        for i in 0..record_len {
            bound.set_record_index(i);
            keys.push(bound.eval_values(&exprs)?);
        }
    }

    let mut indices: Vec<usize> = (0..record_len).collect();
    indices.sort_by(|&a, &b| compare_keys(&keys[a], &keys[b], order_by));

    let mut view = Arc::try_unwrap(shared)
        .map_err(|_| QueryError::internal("view still shared after sort scan"))?;
    let mut records: Vec<Option<crate::record::Record>> =
        view.records.into_iter().map(Some).collect();
    view.records = indices
        .into_iter()
        .map(|i| records[i].take().expect("each index appears once"))
        .collect();
    Ok(view)
}

fn compare_keys(left: &[Value], right: &[Value], order_by: &[OrderByExpr]) -> Ordering {
    for (i, order) in order_by.iter().enumerate() {
        let l = left.get(i).unwrap_or(&Value::Null);
        let r = right.get(i).unwrap_or(&Value::Null);

        let ordering = match (l.is_null(), r.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) | (false, true) => {
                let nulls = order.nulls.unwrap_or(match order.direction {
                    OrderDirection::Asc => NullsPosition::First,
                    OrderDirection::Desc => NullsPosition::Last,
                });
                // The nulls position is absolute, not direction-relative.
                let null_side = match nulls {
                    NullsPosition::First => Ordering::Less,
                    NullsPosition::Last => Ordering::Greater,
                };
                if l.is_null() { null_side } else { null_side.reverse() }
            }
            (false, false) => {
                let ordering = compare(l, r).unwrap_or(Ordering::Equal);
                match order.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Remove duplicate records by serialized row key, keeping the first
/// appearance.
pub fn distinct(mut view: View) -> View {
    let mut seen = HashSet::new();
    view.records.retain(|record| seen.insert(record.serialize()));
    view
}

/// Apply OFFSET then LIMIT. Counts are evaluated once through a detached
/// filter and must be non-negative integers.
pub fn limit_offset(
    mut view: View,
    limit: Option<&Expr>,
    offset: Option<&Expr>,
    filter: &Filter<'_>,
) -> Result<View, QueryError> {
    if let Some(expr) = offset {
        let n = count_argument(expr, filter, "OFFSET")?;
        if n >= view.records.len() {
            view.records.clear();
        } else {
            view.records.drain(..n);
        }
    }
    if let Some(expr) = limit {
        let n = count_argument(expr, filter, "LIMIT")?;
        view.records.truncate(n);
    }
    Ok(view)
}

fn count_argument(
    expr: &Expr,
    filter: &Filter<'_>,
    clause: &str,
) -> Result<usize, QueryError> {
    let value = filter.detached().evaluate(expr)?;
    match value.as_integer() {
        Some(n) if n >= 0 => Ok(n as usize),
        _ => Err(QueryError::TypeConversion {
            value: value.to_string(),
            target: format!("{} count", clause),
            pos: expr.pos(),
        }),
    }
}
