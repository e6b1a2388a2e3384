/*!
Tests for cursor declaration, fetch positioning, status expressions, and
disposal.
*/

mod common;

use common::*;
use csvql::ast::*;
use csvql::{QueryError, SourcePos, StatementResult, Ternary, Value};

fn declare_three_row_cursor(filter: &mut csvql::Filter<'_>) {
    temp_view(
        filter,
        "t",
        &["n"],
        vec![
            vec![Value::Integer(10)],
            vec![Value::Integer(20)],
            vec![Value::Integer(30)],
        ],
    );
    run(
        filter,
        Statement::DeclareVariable {
            assignments: vec![VariableAssignment {
                variable: "n".into(),
                value: None,
                pos: SourcePos::unknown(),
            }],
        },
    );
    run(
        filter,
        Statement::DeclareCursor {
            cursor: "cur".into(),
            query: select_all("t"),
            pos: SourcePos::unknown(),
        },
    );
    run(
        filter,
        Statement::OpenCursor {
            cursor: "cur".into(),
            pos: SourcePos::unknown(),
        },
    );
}

fn fetch(filter: &mut csvql::Filter<'_>, position: FetchPosition) -> bool {
    match run(
        filter,
        Statement::FetchCursor {
            cursor: "cur".into(),
            position,
            variables: vec!["n".into()],
            pos: SourcePos::unknown(),
        },
    ) {
        StatementResult::Fetched(in_range) => in_range,
        other => panic!("expected fetch result, got {:?}", other),
    }
}

fn variable(filter: &csvql::Filter<'_>, name: &str) -> Value {
    filter.variable(name, SourcePos::unknown()).unwrap()
}

#[test]
fn absolute_is_zero_based_then_next_continues() {
    let session = session();
    let mut filter = session.filter();
    declare_three_row_cursor(&mut filter);

    // ABSOLUTE 1 addresses the second record (positions are 0-based).
    assert!(fetch(&mut filter, FetchPosition::Absolute(Expr::integer(1))));
    assert_eq!(variable(&filter, "n"), Value::Integer(20));

    assert!(fetch(&mut filter, FetchPosition::Next));
    assert_eq!(variable(&filter, "n"), Value::Integer(30));

    // Past the end: variables become NULL and the fetch reports false.
    assert!(!fetch(&mut filter, FetchPosition::Next));
    assert_eq!(variable(&filter, "n"), Value::Null);
}

#[test]
fn fetch_walk_next_prior_first_last_relative() {
    let session = session();
    let mut filter = session.filter();
    declare_three_row_cursor(&mut filter);

    assert!(fetch(&mut filter, FetchPosition::Next));
    assert_eq!(variable(&filter, "n"), Value::Integer(10));

    assert!(fetch(&mut filter, FetchPosition::Last));
    assert_eq!(variable(&filter, "n"), Value::Integer(30));

    assert!(fetch(&mut filter, FetchPosition::Prior));
    assert_eq!(variable(&filter, "n"), Value::Integer(20));

    assert!(fetch(&mut filter, FetchPosition::First));
    assert_eq!(variable(&filter, "n"), Value::Integer(10));

    assert!(fetch(&mut filter, FetchPosition::Relative(Expr::integer(2))));
    assert_eq!(variable(&filter, "n"), Value::Integer(30));

    assert!(!fetch(&mut filter, FetchPosition::Relative(Expr::integer(-9))));
}

#[test]
fn fetch_position_must_be_integer() {
    let session = session();
    let mut filter = session.filter();
    declare_three_row_cursor(&mut filter);

    let result = csvql::executor::execute(
        &Statement::FetchCursor {
            cursor: "cur".into(),
            position: FetchPosition::Absolute(Expr::string("first")),
            variables: vec!["n".into()],
            pos: SourcePos::unknown(),
        },
        &mut filter,
    );
    assert!(matches!(
        result,
        Err(QueryError::FetchPositionNotInteger { .. })
    ));
}

#[test]
fn fetch_variable_count_must_match_record() {
    let session = session();
    let mut filter = session.filter();
    declare_three_row_cursor(&mut filter);

    let result = csvql::executor::execute(
        &Statement::FetchCursor {
            cursor: "cur".into(),
            position: FetchPosition::Next,
            variables: vec!["n".into(), "extra".into()],
            pos: SourcePos::unknown(),
        },
        &mut filter,
    );
    assert!(matches!(
        result,
        Err(QueryError::CursorFetchLengthMismatch { expected: 1, .. })
    ));
}

#[test]
fn cursor_status_expressions() {
    let session = session();
    let mut filter = session.filter();
    declare_three_row_cursor(&mut filter);

    let status = |filter: &mut csvql::Filter<'_>, status| {
        filter
            .evaluate(&Expr::CursorStatus {
                cursor: "cur".into(),
                status,
                pos: SourcePos::unknown(),
            })
            .unwrap()
    };

    assert_eq!(
        status(&mut filter, CursorStatusKind::IsOpen),
        Value::Ternary(Ternary::True)
    );
    // No fetch yet: in-range is UNKNOWN.
    assert_eq!(
        status(&mut filter, CursorStatusKind::IsInRange),
        Value::Ternary(Ternary::Unknown)
    );
    assert_eq!(status(&mut filter, CursorStatusKind::Count), Value::Integer(3));

    fetch(&mut filter, FetchPosition::Next);
    assert_eq!(
        status(&mut filter, CursorStatusKind::IsInRange),
        Value::Ternary(Ternary::True)
    );

    run(
        &mut filter,
        Statement::CloseCursor {
            cursor: "cur".into(),
            pos: SourcePos::unknown(),
        },
    );
    assert_eq!(
        status(&mut filter, CursorStatusKind::IsOpen),
        Value::Ternary(Ternary::False)
    );
    let result = filter.evaluate(&Expr::CursorStatus {
        cursor: "cur".into(),
        status: CursorStatusKind::Count,
        pos: SourcePos::unknown(),
    });
    assert!(matches!(result, Err(QueryError::CursorClosed { .. })));
}

#[test]
fn fetch_from_closed_cursor_fails() {
    let session = session();
    let mut filter = session.filter();
    declare_three_row_cursor(&mut filter);
    run(
        &mut filter,
        Statement::CloseCursor {
            cursor: "cur".into(),
            pos: SourcePos::unknown(),
        },
    );

    let result = csvql::executor::execute(
        &Statement::FetchCursor {
            cursor: "cur".into(),
            position: FetchPosition::Next,
            variables: vec!["n".into()],
            pos: SourcePos::unknown(),
        },
        &mut filter,
    );
    assert!(matches!(result, Err(QueryError::CursorClosed { .. })));
}

#[test]
fn dispose_removes_the_cursor() {
    let session = session();
    let mut filter = session.filter();
    declare_three_row_cursor(&mut filter);

    run(
        &mut filter,
        Statement::DisposeCursor {
            cursor: "cur".into(),
            pos: SourcePos::unknown(),
        },
    );
    let result = csvql::executor::execute(
        &Statement::OpenCursor {
            cursor: "cur".into(),
            pos: SourcePos::unknown(),
        },
        &mut filter,
    );
    assert!(matches!(result, Err(QueryError::CursorUndeclared { .. })));
}

#[test]
fn undeclared_cursor_errors() {
    let session = session();
    let mut filter = session.filter();

    let result = csvql::executor::execute(
        &Statement::OpenCursor {
            cursor: "ghost".into(),
            pos: SourcePos::unknown(),
        },
        &mut filter,
    );
    assert!(matches!(result, Err(QueryError::CursorUndeclared { .. })));
}

#[test]
fn open_uses_the_filter_active_at_open_time() {
    let session = session();
    let mut filter = session.filter();
    temp_view(&filter, "t", &["n"], vec![vec![Value::Integer(1)]]);
    run(
        &mut filter,
        Statement::DeclareVariable {
            assignments: vec![VariableAssignment {
                variable: "n".into(),
                value: None,
                pos: SourcePos::unknown(),
            }],
        },
    );
    run(
        &mut filter,
        Statement::DeclareCursor {
            cursor: "cur".into(),
            query: select_all("t"),
            pos: SourcePos::unknown(),
        },
    );
    run(
        &mut filter,
        Statement::OpenCursor {
            cursor: "cur".into(),
            pos: SourcePos::unknown(),
        },
    );

    // Rows inserted after OPEN are not visible to the materialized view.
    run(
        &mut filter,
        Statement::Insert(InsertStatement {
            table: TableIdent::new("t"),
            fields: vec![],
            source: InsertSource::Values(vec![vec![Expr::integer(2)]]),
        }),
    );
    let count = filter
        .evaluate(&Expr::CursorStatus {
            cursor: "cur".into(),
            status: CursorStatusKind::Count,
            pos: SourcePos::unknown(),
        })
        .unwrap();
    assert_eq!(count, Value::Integer(1));
}
