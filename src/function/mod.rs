//! Function dispatch.
//!
//! Function names resolve once into a tagged class; each class carries its
//! own arity contract and evaluator. Analytic and aggregate names are
//! fixed tables, user-defined functions come from the filter scopes, and
//! scalar functions come from the session's registry.

pub mod aggregate;
pub mod analytic;
pub mod scalar;
pub mod user;

use std::sync::Arc;

pub use aggregate::AggregateFunction;
pub use analytic::AnalyticFunction;
pub use scalar::{ScalarFunction, ScalarRegistry};
pub use user::{UserFunction, UserFunctionBody};

use crate::ast::WindowFunctionExpr;
use crate::error::QueryError;
use crate::filter::Filter;

/// Resolved class of a window-clause function invocation.
#[derive(Debug, Clone)]
pub enum WindowFunctionClass {
    Analytic(AnalyticFunction),
    Aggregate(AggregateFunction),
    UserDefined(Arc<UserFunction>),
}

/// Classify a window function name and check its arity.
///
/// Lookup order: analytic table, aggregate table, then user-defined
/// aggregates visible in the filter's scopes. Unknown names are rejected.
pub fn classify_window_function(
    expr: &WindowFunctionExpr,
    filter: &Filter<'_>,
) -> Result<WindowFunctionClass, QueryError> {
    let upper = expr.name.to_uppercase();
    if let Some(analytic) = AnalyticFunction::from_name(&upper) {
        analytic.check_args_len(expr)?;
        return Ok(WindowFunctionClass::Analytic(analytic));
    }
    if let Some(aggregate) = AggregateFunction::from_name(&upper) {
        if expr.args.len() != 1 {
            return Err(QueryError::argument_length(
                &expr.name,
                "exactly 1 argument",
                expr.pos,
            ));
        }
        return Ok(WindowFunctionClass::Aggregate(aggregate));
    }
    match filter.user_function(&upper) {
        Some(udf) if udf.is_aggregate() => {
            // The first argument is the value-list expression.
            if expr.args.is_empty() {
                return Err(QueryError::argument_length(
                    &udf.name,
                    "at least 1 argument",
                    expr.pos,
                ));
            }
            udf.check_args_len(expr.args.len() - 1, expr.pos)?;
            Ok(WindowFunctionClass::UserDefined(udf))
        }
        _ => Err(QueryError::function_not_exist(&expr.name, expr.pos)),
    }
}
