//! Shared helpers for integration tests: AST builders and view
//! inspection shortcuts.

#![allow(dead_code)]

use csvql::ast::*;
use csvql::{
    Filter, Record, Session, SessionConfig, SourcePos, StatementResult, Value, View,
};

/// A quiet session with a small fixed worker count so parallel phases are
/// exercised deterministically.
pub fn session() -> Session {
    let config = SessionConfig {
        cpu: 2,
        quiet: true,
        ..SessionConfig::default()
    };
    Session::new(config)
}

/// Declare an in-memory temporary view filled with the given rows.
pub fn temp_view(filter: &Filter<'_>, name: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
    let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    let mut view = View::from_columns(name, &columns);
    for row in rows {
        view.records.push(Record::from_values(row));
    }
    filter
        .declare_view(name, view, SourcePos::unknown())
        .expect("declare temp view");
}

pub fn table(name: &str) -> TableRef {
    TableRef {
        table: TableExpr::Identifier {
            name: name.to_string(),
            pos: SourcePos::unknown(),
        },
        alias: None,
    }
}

pub fn aliased_table(name: &str, alias: &str) -> TableRef {
    TableRef {
        table: TableExpr::Identifier {
            name: name.to_string(),
            pos: SourcePos::unknown(),
        },
        alias: Some(alias.to_string()),
    }
}

pub fn entity(fields: Vec<SelectField>, from: Vec<TableRef>) -> SelectEntity {
    SelectEntity {
        distinct: false,
        fields,
        from,
        where_clause: None,
        group_by: Vec::new(),
        having: None,
    }
}

pub fn query(fields: Vec<SelectField>, from: Vec<TableRef>) -> SelectQuery {
    SelectQuery::plain(SelectSet::Entity(entity(fields, from)))
}

pub fn select_all(from: &str) -> SelectQuery {
    query(vec![all_columns()], vec![table(from)])
}

pub fn all_columns() -> SelectField {
    SelectField::AllColumns {
        view: None,
        pos: SourcePos::unknown(),
    }
}

pub fn field(expr: Expr) -> SelectField {
    SelectField::Expression { expr, alias: None }
}

pub fn aliased(expr: Expr, alias: &str) -> SelectField {
    SelectField::Expression {
        expr,
        alias: Some(alias.to_string()),
    }
}

pub fn asc(expr: Expr) -> OrderByExpr {
    OrderByExpr {
        expr,
        direction: OrderDirection::Asc,
        nulls: None,
    }
}

pub fn desc(expr: Expr) -> OrderByExpr {
    OrderByExpr {
        expr,
        direction: OrderDirection::Desc,
        nulls: None,
    }
}

/// A window function invocation with ascending ORDER BY keys.
pub fn over(
    name: &str,
    args: Vec<Expr>,
    partition_by: Vec<Expr>,
    order_by: Vec<Expr>,
) -> WindowFunctionExpr {
    WindowFunctionExpr {
        name: name.to_string(),
        args,
        distinct: false,
        ignore_nulls: false,
        partition_by,
        order_by: order_by.into_iter().map(asc).collect(),
        pos: SourcePos::unknown(),
    }
}

pub fn run_select(filter: &mut Filter<'_>, query: SelectQuery) -> View {
    match csvql::executor::execute(&Statement::Select(query), filter).expect("select succeeds") {
        StatementResult::Selected(view) => view,
        other => panic!("expected a view, got {:?}", other),
    }
}

pub fn run(filter: &mut Filter<'_>, statement: Statement) -> StatementResult {
    csvql::executor::execute(&statement, filter).expect("statement succeeds")
}

/// Values of one column, in record order.
pub fn column(view: &View, index: usize) -> Vec<Value> {
    view.records
        .iter()
        .map(|r| r.cell(index).expect("column exists").value().clone())
        .collect()
}

pub fn int_column(view: &View, index: usize) -> Vec<Option<i64>> {
    column(view, index)
        .into_iter()
        .map(|v| match v {
            Value::Integer(i) => Some(i),
            Value::Null => None,
            other => panic!("expected integer or null, got {:?}", other),
        })
        .collect()
}

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|i| Value::Integer(*i)).collect()
}
