//! Typed dispatch table for scalar functions.
//!
//! The internal math of the built-in scalar families (STRING, DATETIME,
//! NUMERIC) lives outside the engine; hosts register implementations here
//! and the engine validates arity and dispatches by uppercased name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{QueryError, SourcePos};
use crate::value::Value;

type ScalarFn = Arc<dyn Fn(&[Value]) -> Result<Value, QueryError> + Send + Sync>;

/// A registered scalar function with its arity contract.
#[derive(Clone)]
pub struct ScalarFunction {
    pub name: String,
    pub min_args: usize,
    pub max_args: usize,
    func: ScalarFn,
}

impl ScalarFunction {
    pub fn check_args_len(&self, given: usize, pos: SourcePos) -> Result<(), QueryError> {
        if given < self.min_args || self.max_args < given {
            let expected = if self.min_args == self.max_args {
                format!("exactly {} arguments", self.min_args)
            } else {
                format!("{} to {} arguments", self.min_args, self.max_args)
            };
            return Err(QueryError::argument_length(&self.name, expected, pos));
        }
        Ok(())
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, QueryError> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarFunction")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

/// Name → scalar function table. Lookup is case-insensitive.
#[derive(Debug, Default)]
pub struct ScalarRegistry {
    functions: HashMap<String, ScalarFunction>,
}

impl ScalarRegistry {
    pub fn new() -> Self {
        ScalarRegistry::default()
    }

    pub fn register<F>(&mut self, name: &str, min_args: usize, max_args: usize, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, QueryError> + Send + Sync + 'static,
    {
        let upper = name.to_uppercase();
        self.functions.insert(
            upper.clone(),
            ScalarFunction {
                name: upper,
                min_args,
                max_args,
                func: Arc::new(func),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ScalarFunction> {
        self.functions.get(&name.to_uppercase())
    }
}
