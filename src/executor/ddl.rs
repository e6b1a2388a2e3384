//! CREATE TABLE and column-level DDL.

use crate::ast::{
    AddColumnsStatement, ColumnPosition, CreateTableStatement, DropColumnsStatement,
    RenameColumnStatement, TableIdent,
};
use crate::cache::table_name;
use crate::error::QueryError;
use crate::executor::{StatementResult, select};
use crate::filter::Filter;
use crate::record::{Cell, Record};
use crate::value::Value;
use crate::view::{FileInfo, HeaderField, View};

/// CREATE TABLE: the file must not exist; the created view lives in the
/// cache until COMMIT writes it out.
pub fn create_table(
    stmt: &CreateTableStatement,
    filter: &mut Filter<'_>,
) -> Result<StatementResult, QueryError> {
    let pos = stmt.table.pos;
    let session = filter.session();

    let (columns, records) = match &stmt.query {
        Some(query) => {
            let source = select::execute(query, &mut filter.child())?;
            let columns: Vec<String> = if stmt.fields.is_empty() {
                source.header.iter().map(|f| f.column.clone()).collect()
            } else {
                if stmt.fields.len() != source.field_len() {
                    return Err(QueryError::SetClauseFieldCount {
                        left: stmt.fields.len(),
                        right: source.field_len(),
                        pos,
                    });
                }
                stmt.fields.clone()
            };
            let records: Vec<Record> = source
                .records
                .iter()
                .map(|r| {
                    Record::from_values(r.cells().iter().map(|c| c.value().clone()).collect())
                })
                .collect();
            (columns, records)
        }
        None => (stmt.fields.clone(), Vec::new()),
    };

    let path = session.resolve_path(&stmt.table.name);
    let mut view = View::from_columns(&table_name(&path), &columns);
    view.validate_header(pos)?;
    view.records = records;
    let count = view.record_len();
    view.file_info = Some(FileInfo::for_file(path, session.config()));

    session.stage_create(&stmt.table.name, view, pos)?;
    Ok(StatementResult::Affected(count))
}

/// ALTER TABLE ... ADD: defaults are evaluated once through the detached
/// scope and broadcast to every record.
pub fn add_columns(
    stmt: &AddColumnsStatement,
    filter: &mut Filter<'_>,
) -> Result<StatementResult, QueryError> {
    let pos = stmt.table.pos;
    let mut view = load_target(&stmt.table, filter)?;

    let insert_at = match &stmt.position {
        ColumnPosition::First => 0,
        ColumnPosition::Last => view.field_len(),
        ColumnPosition::After(field) => {
            view.field_index(field.view.as_deref(), &field.column, field.pos)? + 1
        }
        ColumnPosition::Before(field) => {
            view.field_index(field.view.as_deref(), &field.column, field.pos)?
        }
    };

    let mut defaults = Vec::with_capacity(stmt.columns.len());
    for column in &stmt.columns {
        if view.field_index(None, &column.column, pos).is_ok() {
            return Err(QueryError::FieldNameDuplicate {
                field: column.column.clone(),
                pos,
            });
        }
        let value = match &column.default {
            Some(expr) => filter.detached().evaluate(expr)?,
            None => Value::Null,
        };
        defaults.push(value);
    }

    let qualifier = view
        .header
        .first()
        .map(|f| f.view_name.clone())
        .unwrap_or_default();
    for (offset, column) in stmt.columns.iter().enumerate() {
        view.header.insert(
            insert_at + offset,
            HeaderField::new(&qualifier, column.column.clone(), 0),
        );
    }
    renumber(&mut view);

    for record in &mut view.records {
        for (offset, value) in defaults.iter().enumerate() {
            record.insert(insert_at + offset, Cell::new(value.clone()));
        }
    }
    view.operated_fields = stmt.columns.len();

    store_target(&stmt.table, view, filter)?;
    Ok(StatementResult::Affected(stmt.columns.len()))
}

pub fn drop_columns(
    stmt: &DropColumnsStatement,
    filter: &mut Filter<'_>,
) -> Result<StatementResult, QueryError> {
    let mut view = load_target(&stmt.table, filter)?;

    let mut indices = Vec::with_capacity(stmt.columns.len());
    for field in &stmt.columns {
        indices.push(view.field_index(field.view.as_deref(), &field.column, field.pos)?);
    }
    indices.sort_unstable();
    indices.dedup();

    for index in indices.iter().rev() {
        view.header.remove(*index);
        for record in &mut view.records {
            record.remove(*index);
        }
    }
    renumber(&mut view);
    view.operated_fields = indices.len();

    let count = indices.len();
    store_target(&stmt.table, view, filter)?;
    Ok(StatementResult::Affected(count))
}

pub fn rename_column(
    stmt: &RenameColumnStatement,
    filter: &mut Filter<'_>,
) -> Result<StatementResult, QueryError> {
    let mut view = load_target(&stmt.table, filter)?;

    let index = view.field_index(stmt.old.view.as_deref(), &stmt.old.column, stmt.old.pos)?;
    if view
        .header
        .iter()
        .enumerate()
        .any(|(i, f)| i != index && f.column.eq_ignore_ascii_case(&stmt.new))
    {
        return Err(QueryError::FieldNameDuplicate {
            field: stmt.new.clone(),
            pos: stmt.pos,
        });
    }
    view.header[index].column = stmt.new.clone();
    view.operated_fields = 1;

    store_target(&stmt.table, view, filter)?;
    Ok(StatementResult::Affected(1))
}

/// Reassign 1-based column numbers after structural changes.
fn renumber(view: &mut View) {
    for (i, field) in view.header.iter_mut().enumerate() {
        field.number = i as u32 + 1;
    }
}

fn load_target(table: &TableIdent, filter: &Filter<'_>) -> Result<View, QueryError> {
    match filter.temp_view(&table.name) {
        Some(view) => Ok(view),
        None => filter.session().load_file_view(&table.name, true, table.pos),
    }
}

fn store_target(table: &TableIdent, view: View, filter: &Filter<'_>) -> Result<(), QueryError> {
    if filter.replace_temp_view(&table.name, view.clone()) {
        return Ok(());
    }
    filter.session().stage_update(&table.name, view);
    Ok(())
}
