//! GROUP BY grouping and HAVING filtering.
//!
//! Grouping folds the member records of each group into one record whose
//! cells carry every member value; aggregate evaluation then iterates the
//! group through the filter's field-reference index. A query that uses
//! aggregates without GROUP BY groups the whole view into one group.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::Expr;
use crate::error::QueryError;
use crate::filter::Filter;
use crate::record::{Cell, Record};
use crate::value::{Value, serialize_key};
use crate::view::View;

/// Group the view's records by the GROUP BY expression list; an empty
/// list produces a single group. Group order is first appearance.
pub fn group_by(view: View, exprs: &[Expr], filter: &Filter<'_>) -> Result<View, QueryError> {
    let record_len = view.record_len();
    let shared = Arc::new(view);

    let mut keys: Vec<String> = Vec::with_capacity(record_len);
    {
        let mut bound = filter.for_records(Arc::clone(&shared));
        for i in 0..record_len {
            bound.set_record_index(i);
            let key = if exprs.is_empty() {
                String::new()
            } else {
                serialize_key(&bound.eval_values(exprs)?)
            };
            keys.push(key);
        }
    }

    let mut view = Arc::try_unwrap(shared)
        .map_err(|_| QueryError::internal("view still shared after grouping scan"))?;

    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    let mut group_order: Vec<String> = Vec::new();
    for (i, key) in keys.into_iter().enumerate() {
        match groups.get_mut(&key) {
            Some(members) => members.push(i),
            None => {
                groups.insert(key.clone(), vec![i]);
                group_order.push(key);
            }
        }
    }

    let field_len = view.field_len();
    let mut grouped_records: Vec<Record> = Vec::with_capacity(group_order.len());
    for key in &group_order {
        let members = &groups[key];
        let mut record = Record::default();
        for column in 0..field_len {
            let values: Vec<Value> = members
                .iter()
                .map(|&i| {
                    view.records[i]
                        .cell(column)
                        .map(|c| c.value().clone())
                        .unwrap_or(Value::Null)
                })
                .collect();
            record.push(Cell::grouped(values));
        }
        grouped_records.push(record);
    }
    // A grouped empty view still exposes one (empty) group so that
    // COUNT(*) over no rows yields 0.
    if grouped_records.is_empty() && exprs.is_empty() {
        let mut record = Record::default();
        for _ in 0..field_len {
            record.push(Cell::grouped(Vec::new()));
        }
        grouped_records.push(record);
    }
    view.records = grouped_records;

    // Mark plainly referenced grouping columns.
    for expr in exprs {
        if let Expr::FieldReference(field) = expr {
            if let Ok(index) = view.field_index(field.view.as_deref(), &field.column, field.pos) {
                view.header[index].is_group_key = true;
            }
        }
    }
    Ok(view)
}

/// Keep the groups whose HAVING condition evaluates to TRUE.
pub fn having(view: View, condition: &Expr, filter: &Filter<'_>) -> Result<View, QueryError> {
    let record_len = view.record_len();
    let shared = Arc::new(view);
    let mut kept: Vec<bool> = Vec::with_capacity(record_len);
    {
        let mut bound = filter.for_records(Arc::clone(&shared));
        for i in 0..record_len {
            bound.set_record_index(i);
            kept.push(bound.evaluate(condition)?.as_ternary().is_true());
        }
    }
    let mut view = Arc::try_unwrap(shared)
        .map_err(|_| QueryError::internal("view still shared after having scan"))?;
    let mut keep = kept.into_iter();
    view.records.retain(|_| keep.next().unwrap_or(false));
    Ok(view)
}

/// Whether any select field or the HAVING clause calls an aggregate
/// function, forcing implicit single-group evaluation. Subqueries and
/// window invocations aggregate over their own context and do not count.
pub fn contains_aggregate(expr: &Expr, filter: &Filter<'_>) -> bool {
    match expr {
        Expr::Function { name, .. } => {
            let upper = name.to_uppercase();
            crate::function::AggregateFunction::from_name(&upper).is_some()
                || filter
                    .user_function(&upper)
                    .map(|f| f.is_aggregate())
                    .unwrap_or(false)
        }
        Expr::UnaryOp { expr, .. } | Expr::Cast { expr, .. } => contains_aggregate(expr, filter),
        Expr::BinaryOp { left, right, .. } => {
            contains_aggregate(left, filter) || contains_aggregate(right, filter)
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            contains_aggregate(expr, filter)
                || contains_aggregate(low, filter)
                || contains_aggregate(high, filter)
        }
        Expr::InList { expr, list, .. } => {
            contains_aggregate(expr, filter) || list.iter().any(|e| contains_aggregate(e, filter))
        }
        Expr::Like { expr, pattern, .. } => {
            contains_aggregate(expr, filter) || contains_aggregate(pattern, filter)
        }
        Expr::Case {
            operand,
            when_clauses,
            else_clause,
            ..
        } => {
            operand.as_deref().map(|e| contains_aggregate(e, filter)).unwrap_or(false)
                || when_clauses
                    .iter()
                    .any(|(c, r)| contains_aggregate(c, filter) || contains_aggregate(r, filter))
                || else_clause
                    .as_deref()
                    .map(|e| contains_aggregate(e, filter))
                    .unwrap_or(false)
        }
        _ => false,
    }
}
