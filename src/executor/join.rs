//! FROM clause resolution and join evaluation.
//!
//! Table identifiers resolve to temporary views first, then to files
//! through the session cache. Join conditions are evaluated with two
//! record frames bound (left innermost), so qualified references reach
//! either side without materializing the cross product.

use std::sync::Arc;

use rayon::prelude::*;

use crate::ast::{Expr, JoinType, TableExpr, TableRef};
use crate::cache::table_name;
use crate::error::{QueryError, SourcePos};
use crate::executor::select;
use crate::filter::Filter;
use crate::record::{Cell, Record};
use crate::value::{Value, equals};
use crate::view::{HeaderField, INTERNAL_ID_COLUMN, View};
use crate::window::worker_count;

/// Options threaded through FROM resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct FromContext<'a> {
    /// Loaded files acquire their write lock.
    pub for_update: bool,
    /// Tables whose records must carry internal ids (UPDATE/DELETE
    /// targets), matched against identifier names and aliases.
    pub id_targets: &'a [String],
}

impl<'a> FromContext<'a> {
    fn is_target(&self, name: &str) -> bool {
        self.id_targets.iter().any(|t| t.eq_ignore_ascii_case(name))
    }
}

/// Resolve the FROM clause to a single working view. Multiple members
/// cross-join left to right; an empty clause yields the single-record
/// pseudo table.
pub fn resolve_from(
    from: &[TableRef],
    filter: &mut Filter<'_>,
    ctx: FromContext<'_>,
) -> Result<View, QueryError> {
    if from.is_empty() {
        let mut dual = View::default();
        dual.records.push(Record::default());
        return Ok(dual);
    }

    let mut view = resolve_table(&from[0], filter, ctx)?;
    for table in &from[1..] {
        let right = resolve_table(table, filter, ctx)?;
        view = join_views(view, right, JoinType::Cross, None, filter)?;
    }
    Ok(view)
}

/// Resolve one FROM member.
pub fn resolve_table(
    table: &TableRef,
    filter: &mut Filter<'_>,
    ctx: FromContext<'_>,
) -> Result<View, QueryError> {
    match &table.table {
        TableExpr::Identifier { name, pos } => {
            let qualifier = table.alias.clone().unwrap_or_else(|| {
                let path = filter.session().resolve_path(name);
                table_name(&path)
            });
            let needs_ids = ctx.is_target(name)
                || table.alias.as_deref().map(|a| ctx.is_target(a)).unwrap_or(false);

            let mut view = match filter.temp_view(name) {
                Some(view) => view,
                None => {
                    filter
                        .session()
                        .load_file_view(name, ctx.for_update || needs_ids, *pos)?
                }
            };
            rename_qualifier(&mut view, &qualifier);
            if needs_ids {
                attach_internal_ids(&mut view, &qualifier);
            }
            Ok(view)
        }
        TableExpr::Subquery { query, pos: _ } => {
            let mut view = select::execute(query, &mut filter.child())?;
            if let Some(alias) = &table.alias {
                rename_qualifier(&mut view, alias);
            }
            Ok(view)
        }
        TableExpr::Join {
            left,
            right,
            join_type,
            natural,
            condition,
            using,
            pos,
        } => {
            let left_view = resolve_table(left, filter, ctx)?;
            let right_view = resolve_table(right, filter, ctx)?;
            if *natural || !using.is_empty() {
                let keys = join_keys(&left_view, &right_view, *natural, using, *pos)?;
                equi_join(left_view, right_view, *join_type, &keys)
            } else {
                join_views(left_view, right_view, *join_type, condition.as_ref(), filter)
            }
        }
        TableExpr::Dual => {
            let mut dual = View::default();
            dual.records.push(Record::default());
            Ok(dual)
        }
    }
}

/// Rewrite every header field's qualifier, preserving column numbers.
pub fn rename_qualifier(view: &mut View, qualifier: &str) {
    for field in &mut view.header {
        field.view_name = qualifier.to_string();
    }
}

/// Prepend the hidden internal-id column carrying the source record
/// index; used to map joined rows back to mutation targets.
pub fn attach_internal_ids(view: &mut View, qualifier: &str) {
    let mut field = HeaderField::new(qualifier, INTERNAL_ID_COLUMN, 0);
    field.is_from_table = false;
    view.header.insert(0, field);
    for (i, record) in view.records.iter_mut().enumerate() {
        record.insert(0, Cell::new(Value::Integer(i as i64)));
    }
    view.use_internal_id = true;
}

/// Column index pairs joined on by NATURAL or USING.
fn join_keys(
    left: &View,
    right: &View,
    natural: bool,
    using: &[String],
    pos: SourcePos,
) -> Result<Vec<(usize, usize)>, QueryError> {
    if natural {
        let mut keys = Vec::new();
        for (li, field) in left.header.iter().enumerate() {
            if field.is_internal_id() {
                continue;
            }
            if let Ok(ri) = right.field_index(None, &field.column, pos) {
                keys.push((li, ri));
            }
        }
        Ok(keys)
    } else {
        using
            .iter()
            .map(|name| {
                let li = left.field_index(None, name, pos)?;
                let ri = right.field_index(None, name, pos)?;
                Ok((li, ri))
            })
            .collect()
    }
}

/// Join on an explicit condition (or none for CROSS/unconditioned INNER).
///
/// Row matching runs in parallel over left rows; assembly is serial and
/// keeps left-major order, with unmatched outer rows appended.
pub fn join_views(
    left: View,
    right: View,
    join_type: JoinType,
    condition: Option<&Expr>,
    filter: &Filter<'_>,
) -> Result<View, QueryError> {
    let left_arc = Arc::new(left);
    let right_arc = Arc::new(right);
    let left_len = left_arc.record_len();
    let right_len = right_arc.record_len();

    let matches: Vec<Vec<usize>> = match condition {
        None => vec![(0..right_len).collect(); left_len],
        Some(condition) => {
            let cpu = filter.session().config().cpu;
            let run = |worker: &mut Filter<'_>, i: usize| -> Result<Vec<usize>, QueryError> {
                let mut matched = Vec::new();
                worker.records[0].record_index = i;
                for j in 0..right_len {
                    worker.records[1].record_index = j;
                    if worker.evaluate(condition)?.as_ternary().is_true() {
                        matched.push(j);
                    }
                }
                Ok(matched)
            };

            if worker_count(left_len, cpu) > 1 {
                (0..left_len)
                    .into_par_iter()
                    .map_init(
                        || {
                            filter
                                .for_records(Arc::clone(&right_arc))
                                .for_records(Arc::clone(&left_arc))
                        },
                        |worker, i| run(worker, i),
                    )
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                let mut worker = filter
                    .for_records(Arc::clone(&right_arc))
                    .for_records(Arc::clone(&left_arc));
                (0..left_len)
                    .map(|i| run(&mut worker, i))
                    .collect::<Result<Vec<_>, _>>()?
            }
        }
    };

    let left = Arc::try_unwrap(left_arc)
        .map_err(|_| QueryError::internal("left view still shared after join scan"))?;
    let right = Arc::try_unwrap(right_arc)
        .map_err(|_| QueryError::internal("right view still shared after join scan"))?;

    let mut right_matched = vec![false; right_len];
    for matched in &matches {
        for j in matched {
            right_matched[*j] = true;
        }
    }

    let mut result = View::with_header(
        left.header
            .iter()
            .cloned()
            .chain(right.header.iter().cloned())
            .collect(),
    );

    let left_width = left.field_len();
    let right_width = right.field_len();
    for (i, matched) in matches.iter().enumerate() {
        if matched.is_empty() {
            if matches!(join_type, JoinType::Left | JoinType::Full) {
                let mut record: Record = left.records[i].cells().iter().cloned().collect();
                for _ in 0..right_width {
                    record.push(Cell::new(Value::Null));
                }
                result.records.push(record);
            }
            continue;
        }
        for j in matched {
            let record: Record = left.records[i]
                .cells()
                .iter()
                .cloned()
                .chain(right.records[*j].cells().iter().cloned())
                .collect();
            result.records.push(record);
        }
    }
    if matches!(join_type, JoinType::Right | JoinType::Full) {
        for (j, matched) in right_matched.iter().enumerate() {
            if !matched {
                let mut record = Record::default();
                for _ in 0..left_width {
                    record.push(Cell::new(Value::Null));
                }
                for cell in right.records[j].cells() {
                    record.push(cell.clone());
                }
                result.records.push(record);
            }
        }
    }
    Ok(result)
}

/// NATURAL / USING join: the key columns appear once, from the left side,
/// marked as join keys; outer rows coalesce the key value from whichever
/// side has it.
fn equi_join(
    left: View,
    right: View,
    join_type: JoinType,
    keys: &[(usize, usize)],
) -> Result<View, QueryError> {
    let left_len = left.record_len();
    let right_len = right.record_len();
    let left_width = left.field_len();

    let key_match = |l: &Record, r: &Record| {
        keys.iter().all(|(li, ri)| {
            match (l.cell(*li), r.cell(*ri)) {
                (Some(a), Some(b)) => equals(a.value(), b.value()).is_true(),
                _ => false,
            }
        })
    };

    let right_key_columns: Vec<usize> = keys.iter().map(|(_, ri)| *ri).collect();
    let mut header: Vec<HeaderField> = left.header.clone();
    for (li, _) in keys {
        header[*li].is_join_key = true;
    }
    for (ri, field) in right.header.iter().enumerate() {
        if !right_key_columns.contains(&ri) {
            header.push(field.clone());
        }
    }
    let mut result = View::with_header(header);

    let append_pair = |result: &mut View, l: &Record, r: &Record| {
        let mut record: Record = l.cells().iter().cloned().collect();
        for (ri, cell) in r.cells().iter().enumerate() {
            if !right_key_columns.contains(&ri) {
                record.push(cell.clone());
            }
        }
        result.records.push(record);
    };

    let mut right_matched = vec![false; right_len];
    for i in 0..left_len {
        let mut any = false;
        for j in 0..right_len {
            if key_match(&left.records[i], &right.records[j]) {
                any = true;
                right_matched[j] = true;
                append_pair(&mut result, &left.records[i], &right.records[j]);
            }
        }
        if !any && matches!(join_type, JoinType::Left | JoinType::Full) {
            let mut record: Record = left.records[i].cells().iter().cloned().collect();
            for (ri, _) in right.header.iter().enumerate() {
                if !right_key_columns.contains(&ri) {
                    record.push(Cell::new(Value::Null));
                }
            }
            result.records.push(record);
        }
    }
    if matches!(join_type, JoinType::Right | JoinType::Full) {
        for (j, matched) in right_matched.iter().enumerate() {
            if !matched {
                let mut record = Record::default();
                for li in 0..left_width {
                    // Key columns coalesce from the right side.
                    match keys.iter().find(|(kl, _)| *kl == li) {
                        Some((_, ri)) => record.push(
                            right.records[j]
                                .cell(*ri)
                                .cloned()
                                .unwrap_or_else(|| Cell::new(Value::Null)),
                        ),
                        None => record.push(Cell::new(Value::Null)),
                    }
                }
                for (ri, cell) in right.records[j].cells().iter().enumerate() {
                    if !right_key_columns.contains(&ri) {
                        record.push(cell.clone());
                    }
                }
                result.records.push(record);
            }
        }
    }
    Ok(result)
}
