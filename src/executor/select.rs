//! The SELECT pipeline.
//!
//! Stage order: FROM (joins), WHERE, GROUP BY, HAVING, SELECT expansion,
//! window evaluation, DISTINCT, set operations, ORDER BY, LIMIT/OFFSET.
//! Every intermediate is a view; the pipeline never mutates its sources.

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;

use crate::ast::{
    CommonTableExpr, Expr, SelectEntity, SelectField, SelectQuery, SelectSet, SetOperator,
};
use crate::error::{QueryError, SourcePos};
use crate::executor::join::{self, FromContext};
use crate::executor::{group, sort};
use crate::filter::Filter;
use crate::record::Record;
use crate::value::Value;
use crate::view::{HeaderField, View};
use crate::window;

/// Execute a SELECT query against the given filter. WITH views are
/// declared into the filter's innermost scope; callers isolate them by
/// passing a child filter.
pub fn execute(query: &SelectQuery, filter: &mut Filter<'_>) -> Result<View, QueryError> {
    for cte in &query.with {
        declare_cte(cte, filter)?;
    }

    let mut view = execute_set(&query.body, filter, query.for_update)?;
    if !query.order_by.is_empty() {
        view = sort::order_by(view, &query.order_by, filter)?;
    }
    view = sort::limit_offset(view, query.limit.as_ref(), query.offset.as_ref(), filter)?;
    view.for_update = query.for_update;
    Ok(view)
}

/// Register one WITH member as a temporary view. A RECURSIVE member
/// iterates to a fixed point: the working table holds the previous
/// iteration's new rows, and iteration stops when nothing new appears.
fn declare_cte(cte: &CommonTableExpr, filter: &mut Filter<'_>) -> Result<(), QueryError> {
    let view = if cte.recursive {
        execute_recursive(cte, filter)?
    } else {
        let mut view = execute(&cte.query, &mut filter.child())?;
        apply_cte_columns(&mut view, cte)?;
        view
    };
    filter.declare_view(&cte.name, view, cte.pos)
}

fn execute_recursive(cte: &CommonTableExpr, filter: &mut Filter<'_>) -> Result<View, QueryError> {
    // UNION and UNION ALL both iterate until a pass adds nothing new.
    let (anchor, member) = match &cte.query.body {
        SelectSet::Operation {
            left,
            operator: SetOperator::Union,
            right,
            ..
        } => (left.as_ref(), right.as_ref()),
        _ => {
            return Err(QueryError::Internal {
                message: format!("recursive table {} requires a UNION body", cte.name),
                pos: cte.pos,
            });
        }
    };

    let mut result = {
        let mut child = filter.child();
        let mut view = execute_set(anchor, &mut child, false)?;
        apply_cte_columns(&mut view, cte)?;
        view
    };
    let expected_fields = result.field_len();

    let mut seen: HashSet<String> = result.records.iter().map(Record::serialize).collect();
    let mut working = result.clone();

    loop {
        let iteration = {
            let child = filter.child();
            child.declare_view(&cte.name, working.clone(), cte.pos)?;
            let mut child = child;
            execute_set(member, &mut child, false)?
        };
        if iteration.field_len() != expected_fields {
            return Err(QueryError::RecursionFieldCount {
                expected: expected_fields,
                actual: iteration.field_len(),
                pos: cte.pos,
            });
        }

        let mut fresh: Vec<Record> = Vec::new();
        for record in iteration.records {
            if seen.insert(record.serialize()) {
                fresh.push(record);
            }
        }
        if fresh.is_empty() {
            break;
        }

        working = View::with_header(result.header.clone());
        working.records = fresh.clone();
        result.records.extend(fresh);
    }

    Ok(result)
}

/// Rename the view's columns to the CTE's declared column list.
fn apply_cte_columns(view: &mut View, cte: &CommonTableExpr) -> Result<(), QueryError> {
    if cte.columns.is_empty() {
        for field in &mut view.header {
            field.view_name = cte.name.clone();
        }
        return Ok(());
    }
    if cte.columns.len() != view.field_len() {
        return Err(QueryError::RecursionFieldCount {
            expected: cte.columns.len(),
            actual: view.field_len(),
            pos: cte.pos,
        });
    }
    view.header = cte
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| HeaderField::new(&cte.name, name.clone(), i as u32 + 1))
        .collect();
    view.validate_header(cte.pos)
}

fn execute_set(
    set: &SelectSet,
    filter: &mut Filter<'_>,
    for_update: bool,
) -> Result<View, QueryError> {
    match set {
        SelectSet::Entity(entity) => execute_entity(entity, filter, for_update),
        SelectSet::Operation {
            left,
            operator,
            all,
            right,
            pos,
        } => {
            let left_view = execute_set(left, filter, for_update)?;
            let right_view = execute_set(right, filter, for_update)?;
            combine(left_view, right_view, *operator, *all, *pos)
        }
    }
}

/// Set operations compare by serialized row key and preserve left-hand
/// order.
fn combine(
    left: View,
    right: View,
    operator: SetOperator,
    all: bool,
    pos: SourcePos,
) -> Result<View, QueryError> {
    if left.field_len() != right.field_len() {
        return Err(QueryError::SetClauseFieldCount {
            left: left.field_len(),
            right: right.field_len(),
            pos,
        });
    }

    let mut result = View::with_header(left.header.clone());
    match operator {
        SetOperator::Union => {
            result.records = left.records;
            result.records.extend(right.records);
            if !all {
                result = sort::distinct(result);
            }
        }
        SetOperator::Intersect => {
            let right_keys: HashSet<String> =
                right.records.iter().map(Record::serialize).collect();
            result.records = left
                .records
                .into_iter()
                .filter(|r| right_keys.contains(&r.serialize()))
                .collect();
            if !all {
                result = sort::distinct(result);
            }
        }
        SetOperator::Except => {
            let right_keys: HashSet<String> =
                right.records.iter().map(Record::serialize).collect();
            result.records = left
                .records
                .into_iter()
                .filter(|r| !right_keys.contains(&r.serialize()))
                .collect();
            if !all {
                result = sort::distinct(result);
            }
        }
    }
    Ok(result)
}

fn execute_entity(
    entity: &SelectEntity,
    filter: &mut Filter<'_>,
    for_update: bool,
) -> Result<View, QueryError> {
    let ctx = FromContext {
        for_update,
        id_targets: &[],
    };
    let mut view = join::resolve_from(&entity.from, filter, ctx)?;

    if let Some(condition) = &entity.where_clause {
        view = apply_where(view, condition, filter)?;
    }

    let has_aggregates = entity.fields.iter().any(|f| match f {
        SelectField::Expression { expr, .. } => group::contains_aggregate(expr, filter),
        SelectField::AllColumns { .. } => false,
    }) || entity
        .having
        .as_ref()
        .map(|h| group::contains_aggregate(h, filter))
        .unwrap_or(false);

    if !entity.group_by.is_empty() || has_aggregates {
        view = group::group_by(view, &entity.group_by, filter)?;
    }
    if let Some(condition) = &entity.having {
        view = group::having(view, condition, filter)?;
    }

    let mut view = project(view, &entity.fields, filter)?;
    if entity.distinct {
        view = sort::distinct(view);
    }
    Ok(view)
}

/// Filter records by the WHERE condition; the scan parallelizes over row
/// chunks with a cloned filter per worker.
pub fn apply_where(
    view: View,
    condition: &Expr,
    filter: &Filter<'_>,
) -> Result<View, QueryError> {
    let record_len = view.record_len();
    let cpu = filter.session().config().cpu;
    let shared = Arc::new(view);

    let kept: Vec<bool> = if window::worker_count(record_len, cpu) > 1 {
        (0..record_len)
            .into_par_iter()
            .map_init(
                || filter.for_records(Arc::clone(&shared)),
                |worker, i| {
                    worker.set_record_index(i);
                    worker.evaluate(condition).map(|v| v.as_ternary().is_true())
                },
            )
            .collect::<Result<Vec<_>, _>>()?
    } else {
        let mut bound = filter.for_records(Arc::clone(&shared));
        (0..record_len)
            .map(|i| {
                bound.set_record_index(i);
                bound.evaluate(condition).map(|v| v.as_ternary().is_true())
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut view = Arc::try_unwrap(shared)
        .map_err(|_| QueryError::internal("view still shared after where scan"))?;
    let mut keep = kept.into_iter();
    view.records.retain(|_| keep.next().unwrap_or(false));
    Ok(view)
}

/// One projected output column.
enum Projection {
    /// Read an existing column (wildcard expansion, window results).
    Column { index: usize, field: HeaderField },
    /// Evaluate an expression per record.
    Expression { expr: Expr, field: HeaderField },
}

/// Expand the select field list, evaluate window functions into appended
/// columns, then project each record.
fn project(
    view: View,
    fields: &[SelectField],
    filter: &mut Filter<'_>,
) -> Result<View, QueryError> {
    // Window functions first: each invocation appends one column to the
    // working view, which the projection then reads back by index.
    let mut view = view;
    let mut window_columns: Vec<usize> = Vec::new();
    for field in fields {
        if let SelectField::Expression { expr: Expr::WindowFunction(wf), .. } = field {
            view = window::analyze(view, wf, filter)?;
            let index = view.field_len();
            view.header.push(HeaderField::computed(wf.name.to_uppercase()));
            window_columns.push(index);
        }
    }

    let mut projections: Vec<Projection> = Vec::new();
    let mut window_iter = window_columns.into_iter();
    for (i, field) in fields.iter().enumerate() {
        match field {
            SelectField::AllColumns { view: qualifier, pos } => {
                let indices = view.expand_all_columns(qualifier.as_deref());
                if indices.is_empty() {
                    if let Some(name) = qualifier {
                        return Err(QueryError::TableNotLoaded {
                            table: name.clone(),
                            pos: *pos,
                        });
                    }
                }
                for index in indices {
                    let mut field = view.header[index].clone();
                    field.is_from_table = false;
                    projections.push(Projection::Column { index, field });
                }
            }
            SelectField::Expression { expr, alias } => {
                let label = alias.clone().unwrap_or_else(|| field_label(expr, i));
                match expr {
                    Expr::WindowFunction(_) => {
                        let index = window_iter.next().ok_or_else(|| {
                            QueryError::internal("window column missing during projection")
                        })?;
                        projections.push(Projection::Column {
                            index,
                            field: HeaderField::computed(label),
                        });
                    }
                    Expr::FieldReference(fr) => {
                        let mut header_field = HeaderField::computed(label.clone());
                        header_field.view_name =
                            fr.view.clone().unwrap_or_default();
                        if alias.is_some() {
                            header_field.aliases.push(fr.column.clone());
                        }
                        projections.push(Projection::Expression {
                            expr: expr.clone(),
                            field: header_field,
                        });
                    }
                    _ => projections.push(Projection::Expression {
                        expr: expr.clone(),
                        field: HeaderField::computed(label),
                    }),
                }
            }
        }
    }

    let record_len = view.record_len();
    let shared = Arc::new(view);
    let mut records: Vec<Record> = Vec::with_capacity(record_len);
    {
        let mut bound = filter.for_records(Arc::clone(&shared));
        for i in 0..record_len {
            bound.set_record_index(i);
            let mut record = Record::default();
            for projection in &projections {
                match projection {
                    Projection::Column { index, .. } => {
                        let cell = shared.records[i]
                            .cell(*index)
                            .cloned()
                            .unwrap_or_else(|| crate::record::Cell::new(Value::Null));
                        record.push(crate::record::Cell::new(cell.value().clone()));
                    }
                    Projection::Expression { expr, .. } => {
                        let value = bound.evaluate(expr)?;
                        record.push(crate::record::Cell::new(value));
                    }
                }
            }
            records.push(record);
        }
    }
    drop(shared);

    let header: Vec<HeaderField> = projections
        .into_iter()
        .enumerate()
        .map(|(i, projection)| {
            let mut field = match projection {
                Projection::Column { field, .. } => field,
                Projection::Expression { field, .. } => field,
            };
            field.number = i as u32 + 1;
            field
        })
        .collect();

    let mut result = View::with_header(header);
    result.records = records;
    Ok(result)
}

/// Output column name for an unaliased select expression.
fn field_label(expr: &Expr, index: usize) -> String {
    match expr {
        Expr::FieldReference(field) => field.column.clone(),
        Expr::ColumnNumber { view, number, .. } => format!("{}.{}", view, number),
        Expr::Variable { name, .. } => format!("@{}", name),
        Expr::Function { name, .. } => name.to_uppercase(),
        Expr::WindowFunction(wf) => wf.name.to_uppercase(),
        _ => format!("column{}", index + 1),
    }
}
