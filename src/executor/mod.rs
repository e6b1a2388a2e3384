//! Statement execution.
//!
//! The dispatcher routes a statement to its executor and normalizes the
//! result surface: reads produce a view, mutations produce an affected
//! count and register a pending result, FETCH reports whether it landed
//! in range.

pub mod ddl;
pub mod dml;
pub mod group;
pub mod join;
pub mod select;
pub mod sort;

use crate::ast::{FetchPosition, Statement};
use crate::cursor::ResolvedFetch;
use crate::error::{QueryError, SourcePos};
use crate::filter::Filter;
use crate::value::Value;
use crate::view::View;

/// Outcome of one statement.
#[derive(Debug)]
pub enum StatementResult {
    /// SELECT result.
    Selected(View),
    /// Row count affected by a mutation.
    Affected(usize),
    /// Whether a FETCH landed on a record.
    Fetched(bool),
    /// Statements with no result surface.
    Unit,
}

pub fn execute(
    statement: &Statement,
    filter: &mut Filter<'_>,
) -> Result<StatementResult, QueryError> {
    match statement {
        Statement::Select(query) => {
            let view = select::execute(query, &mut filter.child())?;
            Ok(StatementResult::Selected(view))
        }
        Statement::Insert(stmt) => dml::insert(stmt, filter),
        Statement::Update(stmt) => dml::update(stmt, filter),
        Statement::Delete(stmt) => dml::delete(stmt, filter),
        Statement::CreateTable(stmt) => ddl::create_table(stmt, filter),
        Statement::AddColumns(stmt) => ddl::add_columns(stmt, filter),
        Statement::DropColumns(stmt) => ddl::drop_columns(stmt, filter),
        Statement::RenameColumn(stmt) => ddl::rename_column(stmt, filter),
        Statement::DeclareVariable { assignments } => {
            for assignment in assignments {
                let value = match &assignment.value {
                    Some(expr) => filter.evaluate(expr)?,
                    None => Value::Null,
                };
                filter.declare_variable(&assignment.variable, value, assignment.pos)?;
            }
            Ok(StatementResult::Unit)
        }
        Statement::SetVariable {
            variable,
            value,
            pos,
        } => {
            let value = filter.evaluate(value)?;
            filter.set_variable(variable, value, *pos)?;
            Ok(StatementResult::Unit)
        }
        Statement::DeclareView {
            view,
            fields,
            query,
            pos,
        } => {
            let declared = match query {
                Some(query) => {
                    let mut result = select::execute(query, &mut filter.child())?;
                    if !fields.is_empty() {
                        if fields.len() != result.field_len() {
                            return Err(QueryError::SetClauseFieldCount {
                                left: fields.len(),
                                right: result.field_len(),
                                pos: *pos,
                            });
                        }
                        result = rename_columns(result, view, fields);
                    } else {
                        for field in &mut result.header {
                            field.view_name = view.clone();
                        }
                    }
                    result.validate_header(*pos)?;
                    result
                }
                None => {
                    let declared = View::from_columns(view, fields);
                    declared.validate_header(*pos)?;
                    declared
                }
            };
            filter.declare_view(view, declared, *pos)?;
            Ok(StatementResult::Unit)
        }
        Statement::DisposeView { view, pos } => {
            filter.dispose_view(view, *pos)?;
            Ok(StatementResult::Unit)
        }
        Statement::DeclareCursor { cursor, query, pos } => {
            filter.declare_cursor(cursor, query.clone(), *pos)?;
            Ok(StatementResult::Unit)
        }
        Statement::OpenCursor { cursor, pos } => {
            let query = filter.cursor(cursor, *pos, |c| c.query.clone())?;
            let view = select::execute(&query, &mut filter.child())?;
            filter.cursor_mut(cursor, *pos, |c| {
                c.open(view);
                Ok(())
            })?;
            Ok(StatementResult::Unit)
        }
        Statement::FetchCursor {
            cursor,
            position,
            variables,
            pos,
        } => fetch_cursor(cursor, position, variables, *pos, filter),
        Statement::CloseCursor { cursor, pos } => {
            filter.cursor_mut(cursor, *pos, |c| {
                c.close();
                Ok(())
            })?;
            Ok(StatementResult::Unit)
        }
        Statement::DisposeCursor { cursor, pos } => {
            filter.dispose_cursor(cursor, *pos)?;
            Ok(StatementResult::Unit)
        }
        Statement::Commit => {
            filter.session().commit(SourcePos::unknown())?;
            Ok(StatementResult::Unit)
        }
        Statement::Rollback => {
            filter.session().rollback()?;
            Ok(StatementResult::Unit)
        }
    }
}

fn rename_columns(mut view: View, name: &str, columns: &[String]) -> View {
    for (field, column) in view.header.iter_mut().zip(columns) {
        field.view_name = name.to_string();
        field.column = column.clone();
        field.aliases.clear();
    }
    view
}

/// FETCH: advance the cursor and assign the addressed record's fields to
/// the target variables; out of range assigns NULL to every variable.
fn fetch_cursor(
    cursor: &str,
    position: &FetchPosition,
    variables: &[String],
    pos: SourcePos,
    filter: &mut Filter<'_>,
) -> Result<StatementResult, QueryError> {
    let resolved = match position {
        FetchPosition::Next => ResolvedFetch::Next,
        FetchPosition::Prior => ResolvedFetch::Prior,
        FetchPosition::First => ResolvedFetch::First,
        FetchPosition::Last => ResolvedFetch::Last,
        FetchPosition::Absolute(expr) => {
            ResolvedFetch::Absolute(fetch_position_number(expr, filter, pos)?)
        }
        FetchPosition::Relative(expr) => {
            ResolvedFetch::Relative(fetch_position_number(expr, filter, pos)?)
        }
    };

    let fetched: Option<Vec<Value>> = filter.cursor_mut(cursor, pos, |c| {
        if !c.is_open() {
            return Err(QueryError::CursorClosed {
                cursor: cursor.to_string(),
                pos,
            });
        }
        match c.fetch_index(resolved) {
            Some(index) => {
                let record = &c.view().expect("cursor is open").records[index];
                if record.len() != variables.len() {
                    return Err(QueryError::CursorFetchLengthMismatch {
                        cursor: cursor.to_string(),
                        expected: record.len(),
                        pos,
                    });
                }
                Ok(Some(
                    record.cells().iter().map(|cell| cell.value().clone()).collect(),
                ))
            }
            None => Ok(None),
        }
    })?;

    match fetched {
        Some(values) => {
            for (variable, value) in variables.iter().zip(values) {
                filter.set_variable(variable, value, pos)?;
            }
            Ok(StatementResult::Fetched(true))
        }
        None => {
            for variable in variables {
                filter.set_variable(variable, Value::Null, pos)?;
            }
            Ok(StatementResult::Fetched(false))
        }
    }
}

fn fetch_position_number(
    expr: &crate::ast::Expr,
    filter: &mut Filter<'_>,
    pos: SourcePos,
) -> Result<i64, QueryError> {
    let value = filter.evaluate(expr)?;
    value
        .as_integer()
        .ok_or(QueryError::FetchPositionNotInteger { pos })
}
