//! INSERT, UPDATE, and DELETE execution.
//!
//! Mutation targets resolve to temporary views first (not transactional),
//! then to files through the cache, which acquires the per-file write
//! lock and registers a pending result. UPDATE and DELETE track target
//! records through hidden internal ids attached during FROM resolution,
//! so joined rows map back to the records they came from.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::ast::{
    DeleteStatement, Expr, InsertSource, InsertStatement, TableExpr, TableIdent, TableRef,
    UpdateStatement,
};
use crate::cache::table_name;
use crate::error::QueryError;
use crate::executor::join::{self, FromContext};
use crate::executor::{StatementResult, select};
use crate::filter::Filter;
use crate::record::{Cell, Record};
use crate::value::{Value, serialize_value};
use crate::view::View;

pub fn insert(stmt: &InsertStatement, filter: &mut Filter<'_>) -> Result<StatementResult, QueryError> {
    let pos = stmt.table.pos;
    let mut view = load_target(&stmt.table, filter)?;

    let field_indices: Vec<usize> = if stmt.fields.is_empty() {
        view.expand_all_columns(None)
    } else {
        stmt.fields
            .iter()
            .map(|f| view.field_index(f.view.as_deref(), &f.column, f.pos))
            .collect::<Result<Vec<_>, _>>()?
    };

    let rows: Vec<Vec<Value>> = match &stmt.source {
        InsertSource::Values(rows) => {
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                if row.len() != field_indices.len() {
                    return Err(QueryError::Internal {
                        message: format!(
                            "insert row has {} values for {} fields",
                            row.len(),
                            field_indices.len()
                        ),
                        pos,
                    });
                }
                values.push(filter.eval_values(row)?);
            }
            values
        }
        InsertSource::Query(query) => {
            let source = select::execute(query, &mut filter.child())?;
            if source.field_len() != field_indices.len() {
                return Err(QueryError::Internal {
                    message: format!(
                        "select returns {} fields for {} insert fields",
                        source.field_len(),
                        field_indices.len()
                    ),
                    pos,
                });
            }
            source
                .records
                .iter()
                .map(|r| r.cells().iter().map(|c| c.value().clone()).collect())
                .collect()
        }
    };

    // Provided values land at the target positions, NULL elsewhere.
    let width = view.field_len();
    let count = rows.len();
    for row in rows {
        let mut record = Record::from_values(vec![Value::Null; width]);
        for (value, index) in row.into_iter().zip(&field_indices) {
            record.set(*index, value);
        }
        view.records.push(record);
    }
    view.operated_records = count;

    store_target(&stmt.table, view, filter)?;
    Ok(StatementResult::Affected(count))
}

pub fn update(stmt: &UpdateStatement, filter: &mut Filter<'_>) -> Result<StatementResult, QueryError> {
    let targets: Vec<String> = stmt.tables.iter().map(|t| t.name.clone()).collect();
    let target_aliases = collect_target_aliases(&stmt.tables, &stmt.from, filter);

    let from = default_from(&stmt.tables, &stmt.from);
    let ctx = FromContext {
        for_update: true,
        id_targets: &targets,
    };
    let mut working = join::resolve_from(&from, filter, ctx)?;
    if let Some(condition) = &stmt.where_clause {
        working = select::apply_where(working, condition, filter)?;
    }

    // Resolve every SET clause against the working header; the field must
    // belong to one of the update targets.
    struct SetTarget {
        qualifier: String,
        id_column: usize,
        base_column: usize,
        value: Expr,
    }
    let id_columns: HashMap<String, usize> = working
        .header
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_internal_id())
        .map(|(i, f)| (f.view_name.to_uppercase(), i))
        .collect();

    let mut set_targets = Vec::with_capacity(stmt.set_clauses.len());
    for clause in &stmt.set_clauses {
        let index = working.field_index(
            clause.field.view.as_deref(),
            &clause.field.column,
            clause.field.pos,
        )?;
        let field = &working.header[index];
        let qualifier = field.view_name.to_uppercase();
        let id_column = *id_columns.get(&qualifier).ok_or_else(|| {
            QueryError::FieldNotInUpdateTables {
                field: clause.field.column.clone(),
                pos: clause.field.pos,
            }
        })?;
        set_targets.push(SetTarget {
            qualifier,
            id_column,
            base_column: field.number.saturating_sub(1) as usize,
            value: clause.value.clone(),
        });
    }

    // Compute the new values row by row, rejecting conflicting values for
    // the same target cell.
    let record_len = working.record_len();
    let shared = Arc::new(working);
    let mut pending: HashMap<String, BTreeMap<i64, Vec<(usize, Value)>>> = HashMap::new();
    let mut assigned: HashMap<(String, i64, usize), String> = HashMap::new();
    {
        let mut bound = filter.for_records(Arc::clone(&shared));
        for i in 0..record_len {
            bound.set_record_index(i);
            for target in &set_targets {
                let id = match shared.records[i].cell(target.id_column).map(Cell::value) {
                    Some(Value::Integer(id)) => *id,
                    // NULL id: the row comes from an unmatched outer side.
                    _ => continue,
                };
                let value = bound.evaluate(&target.value)?;
                let slot = (target.qualifier.clone(), id, target.base_column);
                let serialized = serialize_value(&value);
                match assigned.get(&slot) {
                    Some(existing) if *existing == serialized => continue,
                    Some(_) => {
                        return Err(QueryError::RecordAmbiguous { pos: target.value.pos() });
                    }
                    None => {
                        assigned.insert(slot, serialized);
                        pending
                            .entry(target.qualifier.clone())
                            .or_default()
                            .entry(id)
                            .or_default()
                            .push((target.base_column, value));
                    }
                }
            }
        }
    }
    drop(shared);

    // Apply per target table and register the mutations.
    let mut total = 0usize;
    for table in &stmt.tables {
        let qualifier = target_aliases
            .get(&table.name.to_uppercase())
            .cloned()
            .unwrap_or_else(|| derived_qualifier(table, filter));
        let Some(updates) = pending.get(&qualifier.to_uppercase()) else {
            continue;
        };

        let mut view = load_target(table, filter)?;
        let mut operated = 0usize;
        for (id, assignments) in updates {
            if let Some(record) = view.records.get_mut(*id as usize) {
                for (column, value) in assignments {
                    record.set(*column, value.clone());
                    view.operated_fields += 1;
                }
                operated += 1;
            }
        }
        view.operated_records = operated;
        total += operated;
        store_target(table, view, filter)?;
    }
    Ok(StatementResult::Affected(total))
}

pub fn delete(stmt: &DeleteStatement, filter: &mut Filter<'_>) -> Result<StatementResult, QueryError> {
    let tables: Vec<TableIdent> = if stmt.tables.is_empty() {
        match single_identifier(&stmt.from) {
            Some(ident) => vec![ident],
            None => return Err(QueryError::TablesToDeleteNotSpecified { pos: stmt.pos }),
        }
    } else {
        stmt.tables.clone()
    };
    let targets: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
    let target_aliases = collect_target_aliases(&tables, &stmt.from, filter);

    let ctx = FromContext {
        for_update: true,
        id_targets: &targets,
    };
    let mut working = join::resolve_from(&stmt.from, filter, ctx)?;
    if let Some(condition) = &stmt.where_clause {
        working = select::apply_where(working, condition, filter)?;
    }

    // Collect the distinct internal ids per target qualifier.
    let mut doomed: HashMap<String, Vec<i64>> = HashMap::new();
    for (column, field) in working.header.iter().enumerate() {
        if !field.is_internal_id() {
            continue;
        }
        let ids = doomed.entry(field.view_name.to_uppercase()).or_default();
        for record in &working.records {
            if let Some(Value::Integer(id)) = record.cell(column).map(Cell::value) {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
    }

    let mut total = 0usize;
    for table in &tables {
        let qualifier = target_aliases
            .get(&table.name.to_uppercase())
            .cloned()
            .unwrap_or_else(|| derived_qualifier(table, filter));
        let Some(ids) = doomed.get(&qualifier.to_uppercase()) else {
            continue;
        };

        let mut view = load_target(table, filter)?;
        let before = view.record_len();
        let mut index = 0usize;
        view.records.retain(|_| {
            let keep = !ids.contains(&(index as i64));
            index += 1;
            keep
        });
        let operated = before - view.record_len();
        view.operated_records = operated;
        total += operated;
        store_target(table, view, filter)?;
    }
    Ok(StatementResult::Affected(total))
}

/// Load a mutation target: a declared temporary view, or the cached file
/// instance (locking it for update on first touch).
fn load_target(table: &TableIdent, filter: &Filter<'_>) -> Result<View, QueryError> {
    match filter.temp_view(&table.name) {
        Some(view) => Ok(view),
        None => filter.session().load_file_view(&table.name, true, table.pos),
    }
}

/// Store a mutated target back where it came from.
fn store_target(
    table: &TableIdent,
    view: View,
    filter: &Filter<'_>,
) -> Result<(), QueryError> {
    if filter.replace_temp_view(&table.name, view.clone()) {
        return Ok(());
    }
    filter.session().stage_update(&table.name, view);
    Ok(())
}

/// UPDATE with no FROM clause iterates the target tables themselves.
fn default_from(tables: &[TableIdent], from: &[TableRef]) -> Vec<TableRef> {
    if !from.is_empty() {
        return from.to_vec();
    }
    tables
        .iter()
        .map(|t| TableRef {
            table: TableExpr::Identifier {
                name: t.name.clone(),
                pos: t.pos,
            },
            alias: None,
        })
        .collect()
}

/// The qualifier each target table appears under in the FROM clause
/// (its alias when one is declared).
fn collect_target_aliases(
    tables: &[TableIdent],
    from: &[TableRef],
    filter: &Filter<'_>,
) -> HashMap<String, String> {
    fn walk(table_ref: &TableRef, found: &mut Vec<(String, Option<String>)>) {
        match &table_ref.table {
            TableExpr::Identifier { name, .. } => {
                found.push((name.clone(), table_ref.alias.clone()));
            }
            TableExpr::Join { left, right, .. } => {
                walk(left, found);
                walk(right, found);
            }
            _ => {}
        }
    }

    let mut found = Vec::new();
    for table_ref in from {
        walk(table_ref, &mut found);
    }

    let mut aliases = HashMap::new();
    for table in tables {
        for (name, alias) in &found {
            if name.eq_ignore_ascii_case(&table.name) {
                let qualifier = alias.clone().unwrap_or_else(|| {
                    let path = filter.session().resolve_path(name);
                    table_name(&path)
                });
                aliases.insert(table.name.to_uppercase(), qualifier);
            }
        }
    }
    aliases
}

fn derived_qualifier(table: &TableIdent, filter: &Filter<'_>) -> String {
    if filter.temp_view(&table.name).is_some() {
        table.name.clone()
    } else {
        table_name(&filter.session().resolve_path(&table.name))
    }
}

/// The single plain table of a DELETE without a tables list; None when
/// the FROM clause is a join or has several members.
fn single_identifier(from: &[TableRef]) -> Option<TableIdent> {
    match from {
        [TableRef {
            table: TableExpr::Identifier { name, pos },
            ..
        }] => Some(TableIdent {
            name: name.clone(),
            pos: *pos,
        }),
        _ => None,
    }
}
