//! Recursive evaluation of AST expression nodes.
//!
//! Arithmetic propagates NULL; comparisons follow three-valued logic;
//! function calls dispatch to the aggregate tables, user-defined
//! functions in scope, or the session's scalar registry, in that order.

use std::cmp::Ordering;

use regex::Regex;

use crate::ast::{
    BinaryOperator, CastType, CursorStatusKind, Expr, LiteralValue, UnaryOperator,
};
use crate::error::{QueryError, SourcePos};
use crate::filter::Filter;
use crate::function::aggregate::{AggregateFunction, distinguish, list_agg};
use crate::function::user::UserFunction;
use crate::value::{Ternary, Value, compare, equals};

impl<'s> Filter<'s> {
    /// Evaluate an expression against the current record frames.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, QueryError> {
        match expr {
            Expr::Literal { value, .. } => Ok(literal_value(value)),
            Expr::FieldReference(field) => {
                self.field_value(field.view.as_deref(), &field.column, field.pos)
            }
            Expr::ColumnNumber { view, number, pos } => {
                self.column_number_value(view, *number, *pos)
            }
            Expr::Variable { name, pos } => self.variable(name, *pos),
            Expr::SystemVariable { name, pos } => self.system_variable(name, *pos),
            Expr::UnaryOp { op, expr, .. } => {
                let value = self.evaluate(expr)?;
                Ok(unary(*op, &value))
            }
            Expr::BinaryOp { left, op, right, .. } => self.binary(left, *op, right),
            Expr::Between {
                expr,
                low,
                high,
                negated,
                ..
            } => {
                let value = self.evaluate(expr)?;
                let low = self.evaluate(low)?;
                let high = self.evaluate(high)?;
                let result = compare_with_op(&low, &value, BinaryOperator::LessThanOrEqual)
                    .and(compare_with_op(&value, &high, BinaryOperator::LessThanOrEqual));
                Ok(Value::Ternary(if *negated { result.not() } else { result }))
            }
            Expr::InList {
                expr,
                list,
                negated,
                ..
            } => {
                let value = self.evaluate(expr)?;
                let mut result = Ternary::False;
                for candidate_expr in list {
                    let candidate = self.evaluate(candidate_expr)?;
                    result = result.or(equals(&value, &candidate));
                    if result.is_true() {
                        break;
                    }
                }
                Ok(Value::Ternary(if *negated { result.not() } else { result }))
            }
            Expr::InSubquery {
                expr,
                query,
                negated,
                pos,
            } => {
                let value = self.evaluate(expr)?;
                let result = self.in_subquery(&value, query, *pos)?;
                Ok(Value::Ternary(if *negated { result.not() } else { result }))
            }
            Expr::Like {
                expr,
                pattern,
                negated,
                ..
            } => {
                let value = self.evaluate(expr)?;
                let pattern = self.evaluate(pattern)?;
                let result = like(&value, &pattern);
                Ok(Value::Ternary(if *negated { result.not() } else { result }))
            }
            Expr::Exists { query, .. } => {
                let exists = self.exists_subquery(query)?;
                Ok(Value::Ternary(Ternary::from_bool(exists)))
            }
            Expr::AnyAll {
                expr,
                op,
                query,
                any,
                pos,
            } => {
                let value = self.evaluate(expr)?;
                let result = self.any_all_subquery(&value, *op, query, *any, *pos)?;
                Ok(Value::Ternary(result))
            }
            Expr::Subquery { query, pos } => self.scalar_subquery(query, *pos),
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
                ..
            } => self.case(operand.as_deref(), when_clauses, else_clause.as_deref()),
            Expr::Cast { expr, target, .. } => {
                let value = self.evaluate(expr)?;
                Ok(cast(&value, *target))
            }
            Expr::Function {
                name,
                args,
                distinct,
                pos,
            } => self.function_call(name, args, *distinct, *pos),
            Expr::AllColumns { pos } => Err(QueryError::Internal {
                message: "* is only allowed as an aggregate function argument".to_string(),
                pos: *pos,
            }),
            Expr::WindowFunction(wf) => Err(QueryError::Internal {
                message: format!("window function {} is not allowed here", wf.name),
                pos: wf.pos,
            }),
            Expr::CursorStatus {
                cursor,
                status,
                pos,
            } => self.cursor_status(cursor, *status, *pos),
        }
    }

    /// Evaluate a list of expressions in order.
    pub fn eval_values(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, QueryError> {
        exprs.iter().map(|e| self.evaluate(e)).collect()
    }

    fn binary(
        &mut self,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
    ) -> Result<Value, QueryError> {
        match op {
            BinaryOperator::And => {
                // Short-circuit: FALSE AND x is FALSE without evaluating x.
                let lhs = self.evaluate(left)?.as_ternary();
                if lhs == Ternary::False {
                    return Ok(Value::Ternary(Ternary::False));
                }
                let rhs = self.evaluate(right)?.as_ternary();
                Ok(Value::Ternary(lhs.and(rhs)))
            }
            BinaryOperator::Or => {
                let lhs = self.evaluate(left)?.as_ternary();
                if lhs == Ternary::True {
                    return Ok(Value::Ternary(Ternary::True));
                }
                let rhs = self.evaluate(right)?.as_ternary();
                Ok(Value::Ternary(lhs.or(rhs)))
            }
            _ => {
                let lhs = self.evaluate(left)?;
                let rhs = self.evaluate(right)?;
                if op.is_comparison() {
                    Ok(Value::Ternary(compare_with_op(&lhs, &rhs, op)))
                } else if op == BinaryOperator::Concat {
                    Ok(concat(&lhs, &rhs))
                } else {
                    Ok(arithmetic(&lhs, op, &rhs))
                }
            }
        }
    }

    fn case(
        &mut self,
        operand: Option<&Expr>,
        when_clauses: &[(Expr, Expr)],
        else_clause: Option<&Expr>,
    ) -> Result<Value, QueryError> {
        let operand_value = operand.map(|e| self.evaluate(e)).transpose()?;
        for (condition, result) in when_clauses {
            let matched = match &operand_value {
                Some(value) => equals(value, &self.evaluate(condition)?).is_true(),
                None => self.evaluate(condition)?.as_ternary().is_true(),
            };
            if matched {
                return self.evaluate(result);
            }
        }
        match else_clause {
            Some(e) => self.evaluate(e),
            None => Ok(Value::Null),
        }
    }

    fn function_call(
        &mut self,
        name: &str,
        args: &[Expr],
        distinct: bool,
        pos: SourcePos,
    ) -> Result<Value, QueryError> {
        let upper = name.to_uppercase();

        if let Some(aggregate) = AggregateFunction::from_name(&upper) {
            return self.evaluate_aggregate(aggregate, &upper, args, distinct, pos);
        }

        if let Some(udf) = self.user_function(&upper) {
            if udf.is_aggregate() {
                return self.evaluate_user_aggregate(&udf, args, distinct, pos);
            }
            udf.check_args_len(args.len(), pos)?;
            let values = self.eval_values(args)?;
            return udf.call_scalar(&values, pos);
        }

        if let Some(scalar) = self.session().scalars().get(&upper) {
            scalar.check_args_len(args.len(), pos)?;
            let scalar = scalar.clone();
            let values = self.eval_values(args)?;
            return scalar.call(&values);
        }

        Err(QueryError::function_not_exist(name, pos))
    }

    /// Evaluate an aggregate call over the grouped cells of the current
    /// record. The argument expression runs once per group member through
    /// the frame's field-reference index; `*` is rewritten to integer 1.
    fn evaluate_aggregate(
        &mut self,
        aggregate: AggregateFunction,
        name: &str,
        args: &[Expr],
        distinct: bool,
        pos: SourcePos,
    ) -> Result<Value, QueryError> {
        let (min, max) = if aggregate == AggregateFunction::ListAgg {
            (1, 2)
        } else {
            (1, 1)
        };
        if args.len() < min || max < args.len() {
            let expected = if min == max {
                format!("exactly {} argument", min)
            } else {
                format!("{} to {} arguments", min, max)
            };
            return Err(QueryError::argument_length(name, expected, pos));
        }

        let mut values = self.grouped_values(&args[0], pos)?;
        if distinct {
            values = distinguish(values);
        }

        if aggregate == AggregateFunction::ListAgg {
            let separator = match args.get(1) {
                Some(arg) => match self.detached().evaluate(arg)? {
                    Value::String(s) => s,
                    _ => {
                        return Err(QueryError::invalid_argument(
                            name,
                            "the second argument must be a string",
                            pos,
                        ));
                    }
                },
                None => String::new(),
            };
            return Ok(list_agg(&values, &separator));
        }

        Ok(aggregate.apply(&values))
    }

    fn evaluate_user_aggregate(
        &mut self,
        udf: &UserFunction,
        args: &[Expr],
        distinct: bool,
        pos: SourcePos,
    ) -> Result<Value, QueryError> {
        if args.is_empty() {
            return Err(QueryError::argument_length(
                &udf.name,
                "at least 1 argument",
                pos,
            ));
        }
        udf.check_args_len(args.len() - 1, pos)?;

        let mut values = self.grouped_values(&args[0], pos)?;
        if distinct {
            values = distinguish(values);
        }
        let extra = self.eval_values(&args[1..])?;
        udf.call_aggregate(&values, &extra, pos)
    }

    /// Materialize an aggregate argument over every member of the current
    /// record's group.
    fn grouped_values(&mut self, arg: &Expr, pos: SourcePos) -> Result<Vec<Value>, QueryError> {
        let group_len = match self.records.first() {
            Some(frame) => frame
                .view
                .records
                .get(frame.record_index)
                .map(|r| r.group_len())
                .unwrap_or(0),
            None => {
                return Err(QueryError::Internal {
                    message: "aggregate function is not allowed here".to_string(),
                    pos,
                });
            }
        };

        let arg = match arg {
            Expr::AllColumns { .. } => Expr::integer(1),
            other => other.clone(),
        };

        let mut values = Vec::with_capacity(group_len);
        for g in 0..group_len {
            self.set_field_ref(Some(g));
            let result = self.evaluate(&arg);
            self.set_field_ref(None);
            values.push(result?);
        }
        Ok(values)
    }

    fn system_variable(&self, name: &str, pos: SourcePos) -> Result<Value, QueryError> {
        let config = self.session().config();
        match name.to_uppercase().as_str() {
            "CPU" => Ok(Value::Integer(config.cpu as i64)),
            "REPOSITORY" => Ok(Value::String(config.repository.display().to_string())),
            "QUIET" => Ok(Value::Boolean(config.quiet)),
            _ => Err(QueryError::VariableUndeclared {
                variable: format!("@@{}", name),
                pos,
            }),
        }
    }

    fn cursor_status(
        &self,
        cursor: &str,
        status: CursorStatusKind,
        pos: SourcePos,
    ) -> Result<Value, QueryError> {
        match status {
            CursorStatusKind::IsOpen => {
                self.cursor(cursor, pos, |c| Value::Ternary(Ternary::from_bool(c.is_open())))
            }
            CursorStatusKind::IsInRange => self.cursor_mut(cursor, pos, |c| {
                if !c.is_open() {
                    return Err(QueryError::CursorClosed {
                        cursor: cursor.to_string(),
                        pos,
                    });
                }
                Ok(Value::Ternary(c.is_in_range()))
            }),
            CursorStatusKind::Count => self.cursor_mut(cursor, pos, |c| match c.count() {
                Some(count) => Ok(Value::Integer(count as i64)),
                None => Err(QueryError::CursorClosed {
                    cursor: cursor.to_string(),
                    pos,
                }),
            }),
        }
    }
}

fn literal_value(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::String(s) => Value::String(s.clone()),
        LiteralValue::Integer(i) => Value::Integer(*i),
        LiteralValue::Float(f) => Value::Float(*f),
        LiteralValue::Boolean(b) => Value::Boolean(*b),
        LiteralValue::Ternary(t) => Value::Ternary(*t),
        LiteralValue::Null => Value::Null,
    }
}

fn unary(op: UnaryOperator, value: &Value) -> Value {
    match op {
        UnaryOperator::Not => Value::Ternary(value.as_ternary().not()),
        UnaryOperator::Minus => match value {
            Value::Integer(i) => Value::Integer(-i),
            Value::Float(f) => Value::Float(-f),
            other => match other.as_float() {
                Some(f) => Value::Float(-f),
                None => Value::Null,
            },
        },
        UnaryOperator::Plus => match value.as_float() {
            Some(_) => value.clone(),
            None => Value::Null,
        },
        UnaryOperator::IsNull => Value::Ternary(Ternary::from_bool(value.is_null())),
        UnaryOperator::IsNotNull => Value::Ternary(Ternary::from_bool(!value.is_null())),
    }
}

/// Arithmetic with NULL propagation. Integer arithmetic stays integral
/// except for division; overflow falls back to floats.
fn arithmetic(left: &Value, op: BinaryOperator, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    if op != BinaryOperator::Divide {
        if let (Some(a), Some(b)) = (left.as_integer(), right.as_integer()) {
            let result = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Subtract => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                BinaryOperator::Modulo => {
                    if b == 0 {
                        return Value::Null;
                    }
                    a.checked_rem(b)
                }
                _ => None,
            };
            if let Some(i) = result {
                return Value::Integer(i);
            }
        }
    }
    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => match op {
            BinaryOperator::Add => Value::Float(a + b),
            BinaryOperator::Subtract => Value::Float(a - b),
            BinaryOperator::Multiply => Value::Float(a * b),
            BinaryOperator::Divide => {
                if b == 0.0 {
                    Value::Null
                } else {
                    Value::Float(a / b)
                }
            }
            BinaryOperator::Modulo => {
                if b == 0.0 {
                    Value::Null
                } else {
                    Value::Float(a % b)
                }
            }
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn concat(left: &Value, right: &Value) -> Value {
    match (left.as_string(), right.as_string()) {
        (Some(a), Some(b)) => Value::String(format!("{}{}", a, b)),
        _ => Value::Null,
    }
}

/// Comparison under three-valued logic.
pub fn compare_with_op(left: &Value, right: &Value, op: BinaryOperator) -> Ternary {
    match compare(left, right) {
        None => Ternary::Unknown,
        Some(ordering) => {
            let result = match op {
                BinaryOperator::Equal => ordering == Ordering::Equal,
                BinaryOperator::NotEqual => ordering != Ordering::Equal,
                BinaryOperator::LessThan => ordering == Ordering::Less,
                BinaryOperator::LessThanOrEqual => ordering != Ordering::Greater,
                BinaryOperator::GreaterThan => ordering == Ordering::Greater,
                BinaryOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                _ => false,
            };
            Ternary::from_bool(result)
        }
    }
}

/// SQL LIKE: `%` matches any run, `_` matches one character; matching is
/// case-insensitive.
fn like(value: &Value, pattern: &Value) -> Ternary {
    let (value, pattern) = match (value, pattern) {
        (Value::Null, _) | (_, Value::Null) => return Ternary::Unknown,
        (v, p) => match (v.as_string(), p.as_string()) {
            (Some(v), Some(p)) => (v, p),
            _ => return Ternary::Unknown,
        },
    };

    let mut regex_pattern = String::from("(?is)^");
    for c in pattern.chars() {
        match c {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            c => regex_pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex_pattern.push('$');

    match Regex::new(&regex_pattern) {
        Ok(re) => Ternary::from_bool(re.is_match(&value)),
        Err(_) => Ternary::Unknown,
    }
}

/// CAST conversion; failure yields NULL.
fn cast(value: &Value, target: CastType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match target {
        CastType::String => value
            .as_string()
            .map(Value::String)
            .unwrap_or(Value::Null),
        CastType::Integer => value
            .as_integer()
            .map(Value::Integer)
            .unwrap_or(Value::Null),
        CastType::Float => value.as_float().map(Value::Float).unwrap_or(Value::Null),
        CastType::Boolean => match value.as_ternary() {
            Ternary::True => Value::Boolean(true),
            Ternary::False => Value::Boolean(false),
            Ternary::Unknown => Value::Null,
        },
        CastType::Ternary => Value::Ternary(value.as_ternary()),
        CastType::Datetime => value
            .as_datetime()
            .map(Value::Datetime)
            .unwrap_or(Value::Null),
    }
}
