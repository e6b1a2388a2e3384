/*!
Tests for the SELECT pipeline: filtering, projection, grouping, joins,
set operations, subqueries, and recursive common table expressions.
*/

mod common;

use common::*;
use csvql::ast::*;
use csvql::{QueryError, SourcePos, Ternary, Value};

fn people(filter: &csvql::Filter<'_>) {
    temp_view(
        filter,
        "people",
        &["id", "name", "age"],
        vec![
            vec![Value::Integer(1), Value::String("ann".into()), Value::Integer(30)],
            vec![Value::Integer(2), Value::String("bob".into()), Value::Integer(25)],
            vec![Value::Integer(3), Value::String("cho".into()), Value::Null],
            vec![Value::Integer(4), Value::String("dee".into()), Value::Integer(25)],
        ],
    );
}

#[test]
fn where_filters_with_three_valued_logic() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);

    let mut q = query(vec![field(Expr::field("id"))], vec![table("people")]);
    if let SelectSet::Entity(entity) = &mut q.body {
        // age > 24 is UNKNOWN for the NULL row, which filters it out.
        entity.where_clause = Some(Expr::binary(
            Expr::field("age"),
            BinaryOperator::GreaterThan,
            Expr::integer(24),
        ));
    }
    let view = run_select(&mut filter, q);
    assert_eq!(int_column(&view, 0), [1, 2, 4].map(Some));
}

#[test]
fn order_by_nulls_and_limit_offset() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);

    let mut q = query(
        vec![field(Expr::field("id")), field(Expr::field("age"))],
        vec![table("people")],
    );
    q.order_by = vec![asc(Expr::field("age")), asc(Expr::field("id"))];
    let view = run_select(&mut filter, q.clone());
    // NULLS FIRST by default for ascending keys; ties break on id.
    assert_eq!(int_column(&view, 0), [3, 2, 4, 1].map(Some));

    q.offset = Some(Expr::integer(1));
    q.limit = Some(Expr::integer(2));
    let view = run_select(&mut filter, q);
    assert_eq!(int_column(&view, 0), [2, 4].map(Some));
}

#[test]
fn limit_requires_an_integer() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);

    let mut q = select_all("people");
    q.limit = Some(Expr::string("lots"));
    let result = csvql::executor::execute(&Statement::Select(q), &mut filter);
    assert!(matches!(result, Err(QueryError::TypeConversion { .. })));
}

#[test]
fn group_by_with_having_and_aggregates() {
    let session = session();
    let mut filter = session.filter();
    temp_view(
        &filter,
        "sales",
        &["region", "amount"],
        vec![
            vec![Value::String("east".into()), Value::Integer(10)],
            vec![Value::String("west".into()), Value::Integer(1)],
            vec![Value::String("east".into()), Value::Integer(20)],
            vec![Value::String("west".into()), Value::Integer(2)],
            vec![Value::String("east".into()), Value::Integer(30)],
        ],
    );

    let mut q = query(
        vec![
            field(Expr::field("region")),
            aliased(
                Expr::Function {
                    name: "SUM".into(),
                    args: vec![Expr::field("amount")],
                    distinct: false,
                    pos: SourcePos::unknown(),
                },
                "total",
            ),
            aliased(
                Expr::Function {
                    name: "COUNT".into(),
                    args: vec![Expr::AllColumns { pos: SourcePos::unknown() }],
                    distinct: false,
                    pos: SourcePos::unknown(),
                },
                "n",
            ),
        ],
        vec![table("sales")],
    );
    if let SelectSet::Entity(entity) = &mut q.body {
        entity.group_by = vec![Expr::field("region")];
        entity.having = Some(Expr::binary(
            Expr::Function {
                name: "SUM".into(),
                args: vec![Expr::field("amount")],
                distinct: false,
                pos: SourcePos::unknown(),
            },
            BinaryOperator::GreaterThan,
            Expr::integer(5),
        ));
    }

    let view = run_select(&mut filter, q);
    assert_eq!(view.record_len(), 1);
    assert_eq!(column(&view, 0), vec![Value::String("east".into())]);
    assert_eq!(int_column(&view, 1), vec![Some(60)]);
    assert_eq!(int_column(&view, 2), vec![Some(3)]);
}

#[test]
fn implicit_grouping_without_group_by() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);

    let view = run_select(
        &mut filter,
        query(
            vec![
                field(Expr::Function {
                    name: "COUNT".into(),
                    args: vec![Expr::field("age")],
                    distinct: false,
                    pos: SourcePos::unknown(),
                }),
                field(Expr::Function {
                    name: "AVG".into(),
                    args: vec![Expr::field("age")],
                    distinct: false,
                    pos: SourcePos::unknown(),
                }),
            ],
            vec![table("people")],
        ),
    );
    assert_eq!(view.record_len(), 1);
    // COUNT skips the NULL age; AVG averages the remaining three.
    assert_eq!(int_column(&view, 0), vec![Some(3)]);
    assert_eq!(
        column(&view, 1),
        vec![Value::Float((30.0 + 25.0 + 25.0) / 3.0)]
    );
}

#[test]
fn count_over_empty_view_is_zero() {
    let session = session();
    let mut filter = session.filter();
    temp_view(&filter, "empty", &["x"], vec![]);

    let view = run_select(
        &mut filter,
        query(
            vec![field(Expr::Function {
                name: "COUNT".into(),
                args: vec![Expr::AllColumns { pos: SourcePos::unknown() }],
                distinct: false,
                pos: SourcePos::unknown(),
            })],
            vec![table("empty")],
        ),
    );
    assert_eq!(int_column(&view, 0), vec![Some(0)]);
}

#[test]
fn inner_and_left_joins() {
    let session = session();
    let mut filter = session.filter();
    temp_view(
        &filter,
        "orders",
        &["person_id", "item"],
        vec![
            vec![Value::Integer(1), Value::String("tea".into())],
            vec![Value::Integer(1), Value::String("jam".into())],
            vec![Value::Integer(9), Value::String("ice".into())],
        ],
    );
    people(&filter);

    let join = |join_type| TableRef {
        table: TableExpr::Join {
            left: Box::new(table("people")),
            right: Box::new(table("orders")),
            join_type,
            natural: false,
            condition: Some(Expr::binary(
                Expr::qualified_field("people", "id"),
                BinaryOperator::Equal,
                Expr::qualified_field("orders", "person_id"),
            )),
            using: vec![],
            pos: SourcePos::unknown(),
        },
        alias: None,
    };

    let view = run_select(
        &mut filter,
        query(
            vec![field(Expr::field("name")), field(Expr::field("item"))],
            vec![join(JoinType::Inner)],
        ),
    );
    assert_eq!(view.record_len(), 2);
    assert_eq!(
        column(&view, 1),
        vec![Value::String("tea".into()), Value::String("jam".into())]
    );

    let view = run_select(
        &mut filter,
        query(
            vec![field(Expr::field("name")), field(Expr::field("item"))],
            vec![join(JoinType::Left)],
        ),
    );
    // Every person appears; unmatched people carry NULL items.
    assert_eq!(view.record_len(), 5);
    assert_eq!(
        column(&view, 1)[2..],
        [Value::Null, Value::Null, Value::Null]
    );

    let view = run_select(
        &mut filter,
        query(
            vec![field(Expr::field("name")), field(Expr::field("item"))],
            vec![join(JoinType::Full)],
        ),
    );
    // Full outer adds the orphan order with a NULL name.
    assert_eq!(view.record_len(), 6);
    assert_eq!(column(&view, 0)[5], Value::Null);
    assert_eq!(column(&view, 1)[5], Value::String("ice".into()));
}

#[test]
fn natural_join_merges_key_columns() {
    let session = session();
    let mut filter = session.filter();
    temp_view(
        &filter,
        "a",
        &["k", "x"],
        vec![vec![Value::Integer(1), Value::String("l".into())]],
    );
    temp_view(
        &filter,
        "b",
        &["k", "y"],
        vec![vec![Value::Integer(1), Value::String("r".into())]],
    );

    let view = run_select(
        &mut filter,
        query(
            vec![all_columns()],
            vec![TableRef {
                table: TableExpr::Join {
                    left: Box::new(table("a")),
                    right: Box::new(table("b")),
                    join_type: JoinType::Inner,
                    natural: true,
                    condition: None,
                    using: vec![],
                    pos: SourcePos::unknown(),
                },
                alias: None,
            }],
        ),
    );

    // k appears once; the joined row is (k, x, y).
    assert_eq!(view.field_len(), 3);
    assert_eq!(
        view.records[0]
            .cells()
            .iter()
            .map(|c| c.value().clone())
            .collect::<Vec<_>>(),
        vec![
            Value::Integer(1),
            Value::String("l".into()),
            Value::String("r".into())
        ]
    );
}

#[test]
fn set_operations_preserve_left_order() {
    let session = session();
    let mut filter = session.filter();
    temp_view(&filter, "l", &["n"], ints(&[3, 1, 2, 1]).into_iter().map(|v| vec![v]).collect());
    temp_view(&filter, "r", &["n"], ints(&[2, 4]).into_iter().map(|v| vec![v]).collect());

    let combined = |operator, all| {
        SelectQuery::plain(SelectSet::Operation {
            left: Box::new(SelectSet::Entity(entity(
                vec![field(Expr::field("n"))],
                vec![table("l")],
            ))),
            operator,
            all,
            right: Box::new(SelectSet::Entity(entity(
                vec![field(Expr::field("n"))],
                vec![table("r")],
            ))),
            pos: SourcePos::unknown(),
        })
    };

    let union = run_select(&mut filter, combined(SetOperator::Union, false));
    assert_eq!(int_column(&union, 0), [3, 1, 2, 4].map(Some));

    let union_all = run_select(&mut filter, combined(SetOperator::Union, true));
    assert_eq!(int_column(&union_all, 0), [3, 1, 2, 1, 2, 4].map(Some));

    let intersect = run_select(&mut filter, combined(SetOperator::Intersect, false));
    assert_eq!(int_column(&intersect, 0), [2].map(Some));

    let except = run_select(&mut filter, combined(SetOperator::Except, false));
    assert_eq!(int_column(&except, 0), [3, 1].map(Some));
}

#[test]
fn set_operation_field_count_mismatch() {
    let session = session();
    let mut filter = session.filter();
    temp_view(&filter, "l", &["n"], vec![vec![Value::Integer(1)]]);
    temp_view(
        &filter,
        "r",
        &["a", "b"],
        vec![vec![Value::Integer(1), Value::Integer(2)]],
    );

    let q = SelectQuery::plain(SelectSet::Operation {
        left: Box::new(SelectSet::Entity(entity(vec![all_columns()], vec![table("l")]))),
        operator: SetOperator::Union,
        all: false,
        right: Box::new(SelectSet::Entity(entity(vec![all_columns()], vec![table("r")]))),
        pos: SourcePos::unknown(),
    });
    let result = csvql::executor::execute(&Statement::Select(q), &mut filter);
    assert!(matches!(result, Err(QueryError::SetClauseFieldCount { .. })));
}

#[test]
fn recursive_cte_counts_to_three() {
    let session = session();
    let mut filter = session.filter();

    // WITH RECURSIVE it(n) AS (SELECT 1 UNION SELECT n+1 FROM it WHERE n < 3)
    // SELECT n FROM it
    let anchor = SelectSet::Entity(entity(vec![field(Expr::integer(1))], vec![]));
    let mut member_entity = entity(
        vec![field(Expr::binary(
            Expr::field("n"),
            BinaryOperator::Add,
            Expr::integer(1),
        ))],
        vec![table("it")],
    );
    member_entity.where_clause = Some(Expr::binary(
        Expr::field("n"),
        BinaryOperator::LessThan,
        Expr::integer(3),
    ));

    let mut q = query(vec![field(Expr::field("n"))], vec![table("it")]);
    q.with = vec![CommonTableExpr {
        recursive: true,
        name: "it".into(),
        columns: vec!["n".into()],
        query: SelectQuery::plain(SelectSet::Operation {
            left: Box::new(anchor),
            operator: SetOperator::Union,
            all: false,
            right: Box::new(SelectSet::Entity(member_entity)),
            pos: SourcePos::unknown(),
        }),
        pos: SourcePos::unknown(),
    }];

    let view = run_select(&mut filter, q);
    assert_eq!(int_column(&view, 0), [1, 2, 3].map(Some));
}

#[test]
fn recursive_member_field_count_must_match_anchor() {
    let session = session();
    let mut filter = session.filter();

    let anchor = SelectSet::Entity(entity(vec![field(Expr::integer(1))], vec![]));
    let member = SelectSet::Entity(entity(
        vec![field(Expr::integer(2)), field(Expr::integer(3))],
        vec![table("it")],
    ));

    let mut q = query(vec![field(Expr::field("n"))], vec![table("it")]);
    q.with = vec![CommonTableExpr {
        recursive: true,
        name: "it".into(),
        columns: vec!["n".into()],
        query: SelectQuery::plain(SelectSet::Operation {
            left: Box::new(anchor),
            operator: SetOperator::Union,
            all: false,
            right: Box::new(member),
            pos: SourcePos::unknown(),
        }),
        pos: SourcePos::unknown(),
    }];

    let result = csvql::executor::execute(&Statement::Select(q), &mut filter);
    assert!(matches!(result, Err(QueryError::RecursionFieldCount { .. })));
}

#[test]
fn scalar_and_exists_subqueries() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);
    temp_view(
        &filter,
        "orders",
        &["person_id"],
        vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
    );

    // Correlated EXISTS keeps people with at least one order.
    let exists = Expr::Exists {
        query: Box::new({
            let mut q = query(vec![field(Expr::integer(1))], vec![table("orders")]);
            if let SelectSet::Entity(entity) = &mut q.body {
                entity.where_clause = Some(Expr::binary(
                    Expr::field("person_id"),
                    BinaryOperator::Equal,
                    Expr::qualified_field("people", "id"),
                ));
            }
            q
        }),
        pos: SourcePos::unknown(),
    };
    let mut q = query(vec![field(Expr::field("id"))], vec![table("people")]);
    if let SelectSet::Entity(entity) = &mut q.body {
        entity.where_clause = Some(exists);
    }
    let view = run_select(&mut filter, q);
    assert_eq!(int_column(&view, 0), [1, 2].map(Some));

    // Scalar subquery over a single cell.
    let scalar = Expr::Subquery {
        query: Box::new(query(
            vec![field(Expr::Function {
                name: "COUNT".into(),
                args: vec![Expr::AllColumns { pos: SourcePos::unknown() }],
                distinct: false,
                pos: SourcePos::unknown(),
            })],
            vec![table("orders")],
        )),
        pos: SourcePos::unknown(),
    };
    let view = run_select(&mut filter, query(vec![field(scalar)], vec![]));
    assert_eq!(int_column(&view, 0), vec![Some(2)]);
}

#[test]
fn scalar_subquery_rejects_multiple_rows() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);

    let scalar = Expr::Subquery {
        query: Box::new(query(vec![field(Expr::field("id"))], vec![table("people")])),
        pos: SourcePos::unknown(),
    };
    let result = csvql::executor::execute(
        &Statement::Select(query(vec![field(scalar)], vec![])),
        &mut filter,
    );
    assert!(matches!(result, Err(QueryError::SubqueryTooManyRows { .. })));
}

#[test]
fn in_subquery_and_any_all() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);
    temp_view(
        &filter,
        "vips",
        &["id"],
        vec![vec![Value::Integer(2)], vec![Value::Integer(4)]],
    );

    let mut q = query(vec![field(Expr::field("name"))], vec![table("people")]);
    if let SelectSet::Entity(entity) = &mut q.body {
        entity.where_clause = Some(Expr::InSubquery {
            expr: Box::new(Expr::field("id")),
            query: Box::new(select_all("vips")),
            negated: false,
            pos: SourcePos::unknown(),
        });
    }
    let view = run_select(&mut filter, q);
    assert_eq!(
        column(&view, 0),
        vec![Value::String("bob".into()), Value::String("dee".into())]
    );

    // id > ALL (vips) holds only for ids above every vip id.
    let mut q = query(vec![field(Expr::field("id"))], vec![table("people")]);
    if let SelectSet::Entity(entity) = &mut q.body {
        entity.where_clause = Some(Expr::AnyAll {
            expr: Box::new(Expr::field("id")),
            op: BinaryOperator::GreaterThan,
            query: Box::new(select_all("vips")),
            any: false,
            pos: SourcePos::unknown(),
        });
    }
    let view = run_select(&mut filter, q);
    assert_eq!(view.record_len(), 0);
}

#[test]
fn distinct_and_variables() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);

    run(
        &mut filter,
        Statement::DeclareVariable {
            assignments: vec![VariableAssignment {
                variable: "min_age".into(),
                value: Some(Expr::integer(25)),
                pos: SourcePos::unknown(),
            }],
        },
    );

    let mut q = query(vec![field(Expr::field("age"))], vec![table("people")]);
    if let SelectSet::Entity(entity) = &mut q.body {
        entity.distinct = true;
        entity.where_clause = Some(Expr::binary(
            Expr::field("age"),
            BinaryOperator::GreaterThanOrEqual,
            Expr::Variable {
                name: "min_age".into(),
                pos: SourcePos::unknown(),
            },
        ));
    }
    let view = run_select(&mut filter, q);
    assert_eq!(int_column(&view, 0), [30, 25].map(Some));
}

#[test]
fn case_cast_and_ternary_comparisons() {
    let session = session();
    let mut filter = session.filter();

    let case_expr = Expr::Case {
        operand: None,
        when_clauses: vec![(
            Expr::binary(Expr::integer(1), BinaryOperator::Equal, Expr::integer(2)),
            Expr::string("eq"),
        )],
        else_clause: Some(Box::new(Expr::string("ne"))),
        pos: SourcePos::unknown(),
    };
    let cast_expr = Expr::Cast {
        expr: Box::new(Expr::string("42")),
        target: CastType::Integer,
        pos: SourcePos::unknown(),
    };
    let null_eq = Expr::binary(Expr::null(), BinaryOperator::Equal, Expr::integer(1));

    let view = run_select(
        &mut filter,
        query(
            vec![field(case_expr), field(cast_expr), field(null_eq)],
            vec![],
        ),
    );
    assert_eq!(column(&view, 0), vec![Value::String("ne".into())]);
    assert_eq!(column(&view, 1), vec![Value::Integer(42)]);
    assert_eq!(column(&view, 2), vec![Value::Ternary(Ternary::Unknown)]);
}

#[test]
fn registered_scalar_functions_dispatch() {
    let mut session = session();
    session.register_scalar("REVERSE", 1, 1, |args| {
        Ok(match &args[0] {
            Value::String(s) => Value::String(s.chars().rev().collect()),
            other => other.clone(),
        })
    });
    let mut filter = session.filter();

    let view = run_select(
        &mut filter,
        query(
            vec![field(Expr::Function {
                name: "reverse".into(),
                args: vec![Expr::string("abc")],
                distinct: false,
                pos: SourcePos::unknown(),
            })],
            vec![],
        ),
    );
    assert_eq!(column(&view, 0), vec![Value::String("cba".into())]);

    let result = csvql::executor::execute(
        &Statement::Select(query(
            vec![field(Expr::Function {
                name: "missing".into(),
                args: vec![],
                distinct: false,
                pos: SourcePos::unknown(),
            })],
            vec![],
        )),
        &mut filter,
    );
    assert!(matches!(result, Err(QueryError::FunctionNotExist { .. })));
}

#[test]
fn unknown_field_reports_position() {
    let session = session();
    let mut filter = session.filter();
    people(&filter);

    let q = query(
        vec![field(Expr::FieldReference(FieldReference {
            view: None,
            column: "salary".into(),
            pos: SourcePos::new(2, 9),
        }))],
        vec![table("people")],
    );
    match csvql::executor::execute(&Statement::Select(q), &mut filter) {
        Err(err @ QueryError::FieldNotExist { .. }) => {
            assert_eq!(err.to_string(), "[L:2 C:9] field salary does not exist");
        }
        other => panic!("expected FieldNotExist, got {:?}", other),
    }
}
