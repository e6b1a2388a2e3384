//! User-defined functions.
//!
//! Hosts register scalar and aggregate functions into a filter scope;
//! lookups walk the scope stack innermost-first, so a function declared in
//! a subquery shadows an outer one of the same name.

use std::sync::Arc;

use crate::error::{QueryError, SourcePos};
use crate::value::Value;

type UserScalarFn = Arc<dyn Fn(&[Value]) -> Result<Value, QueryError> + Send + Sync>;

/// Aggregate entrypoint: the materialized value list for the partition or
/// group, plus the per-row extra arguments.
type UserAggregateFn = Arc<dyn Fn(&[Value], &[Value]) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub enum UserFunctionBody {
    Scalar(UserScalarFn),
    Aggregate(UserAggregateFn),
}

/// A user-defined function and its arity contract. For aggregates the
/// arity counts the per-row arguments; the value-list expression is passed
/// in addition as the call's first argument.
#[derive(Clone)]
pub struct UserFunction {
    pub name: String,
    pub arity: usize,
    pub body: UserFunctionBody,
}

impl UserFunction {
    pub fn scalar<F>(name: &str, arity: usize, func: F) -> Arc<Self>
    where
        F: Fn(&[Value]) -> Result<Value, QueryError> + Send + Sync + 'static,
    {
        Arc::new(UserFunction {
            name: name.to_uppercase(),
            arity,
            body: UserFunctionBody::Scalar(Arc::new(func)),
        })
    }

    pub fn aggregate<F>(name: &str, arity: usize, func: F) -> Arc<Self>
    where
        F: Fn(&[Value], &[Value]) -> Result<Value, QueryError> + Send + Sync + 'static,
    {
        Arc::new(UserFunction {
            name: name.to_uppercase(),
            arity,
            body: UserFunctionBody::Aggregate(Arc::new(func)),
        })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.body, UserFunctionBody::Aggregate(_))
    }

    pub fn check_args_len(&self, given: usize, pos: SourcePos) -> Result<(), QueryError> {
        if given != self.arity {
            return Err(QueryError::argument_length(
                &self.name,
                format!("exactly {} arguments", self.arity),
                pos,
            ));
        }
        Ok(())
    }

    pub fn call_scalar(&self, args: &[Value], pos: SourcePos) -> Result<Value, QueryError> {
        match &self.body {
            UserFunctionBody::Scalar(func) => func(args),
            UserFunctionBody::Aggregate(_) => Err(QueryError::invalid_argument(
                &self.name,
                "aggregate function called in a scalar context",
                pos,
            )),
        }
    }

    pub fn call_aggregate(
        &self,
        values: &[Value],
        args: &[Value],
        pos: SourcePos,
    ) -> Result<Value, QueryError> {
        match &self.body {
            UserFunctionBody::Aggregate(func) => func(values, args),
            UserFunctionBody::Scalar(_) => Err(QueryError::invalid_argument(
                &self.name,
                "scalar function called in an aggregate context",
                pos,
            )),
        }
    }
}

impl std::fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("is_aggregate", &self.is_aggregate())
            .finish()
    }
}
