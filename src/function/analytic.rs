//! Ranking and positional window functions.
//!
//! Each function receives one partition in query order and returns a map
//! from record index to the computed value. Scalar arguments such as the
//! NTILE bucket count or the LAG offset are evaluated through a detached
//! filter with no record frame, since they must not reference fields.

use std::collections::HashMap;

use crate::ast::WindowFunctionExpr;
use crate::error::QueryError;
use crate::filter::Filter;
use crate::function::aggregate::{distinguish, list_agg};
use crate::value::Value;
use crate::window::partition::Partition;

/// The ranking/positional window functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticFunction {
    RowNumber,
    Rank,
    DenseRank,
    CumeDist,
    PercentRank,
    Ntile,
    FirstValue,
    LastValue,
    NthValue,
    Lag,
    Lead,
    ListAgg,
}

impl AnalyticFunction {
    /// Resolve an uppercased function name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ROW_NUMBER" => Some(AnalyticFunction::RowNumber),
            "RANK" => Some(AnalyticFunction::Rank),
            "DENSE_RANK" => Some(AnalyticFunction::DenseRank),
            "CUME_DIST" => Some(AnalyticFunction::CumeDist),
            "PERCENT_RANK" => Some(AnalyticFunction::PercentRank),
            "NTILE" => Some(AnalyticFunction::Ntile),
            "FIRST_VALUE" => Some(AnalyticFunction::FirstValue),
            "LAST_VALUE" => Some(AnalyticFunction::LastValue),
            "NTH_VALUE" => Some(AnalyticFunction::NthValue),
            "LAG" => Some(AnalyticFunction::Lag),
            "LEAD" => Some(AnalyticFunction::Lead),
            "LISTAGG" => Some(AnalyticFunction::ListAgg),
            _ => None,
        }
    }

    /// Declared argument count as an inclusive (min, max) range.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            AnalyticFunction::RowNumber
            | AnalyticFunction::Rank
            | AnalyticFunction::DenseRank
            | AnalyticFunction::CumeDist
            | AnalyticFunction::PercentRank => (0, 0),
            AnalyticFunction::Ntile
            | AnalyticFunction::FirstValue
            | AnalyticFunction::LastValue => (1, 1),
            AnalyticFunction::NthValue => (2, 2),
            AnalyticFunction::Lag | AnalyticFunction::Lead => (1, 3),
            AnalyticFunction::ListAgg => (1, 2),
        }
    }

    pub fn check_args_len(&self, expr: &WindowFunctionExpr) -> Result<(), QueryError> {
        let (min, max) = self.arity();
        let given = expr.args.len();
        if given < min || max < given {
            let expected = if min == max {
                format!("exactly {} arguments", min)
            } else {
                format!("{} to {} arguments", min, max)
            };
            return Err(QueryError::argument_length(&expr.name, expected, expr.pos));
        }
        Ok(())
    }

    /// Evaluate the function over one partition.
    pub fn execute(
        &self,
        partition: &Partition,
        expr: &WindowFunctionExpr,
        filter: &mut Filter<'_>,
    ) -> Result<HashMap<usize, Value>, QueryError> {
        match self {
            AnalyticFunction::RowNumber => Ok(row_number(partition)),
            AnalyticFunction::Rank => Ok(rank(partition)),
            AnalyticFunction::DenseRank => Ok(dense_rank(partition)),
            AnalyticFunction::CumeDist => Ok(cume_dist(partition)),
            AnalyticFunction::PercentRank => Ok(percent_rank(partition)),
            AnalyticFunction::Ntile => ntile(partition, expr, filter),
            AnalyticFunction::FirstValue => nth_value(partition, expr, filter, 1),
            AnalyticFunction::LastValue => nth_value(&partition.reversed(), expr, filter, 1),
            AnalyticFunction::NthValue => {
                let n = scalar_integer_arg(expr, filter, 1, "the second argument")?;
                if n < 1 {
                    return Err(QueryError::invalid_argument(
                        &expr.name,
                        "the second argument must be greater than 0",
                        expr.pos,
                    ));
                }
                nth_value(partition, expr, filter, n as usize)
            }
            AnalyticFunction::Lag => lag(partition, expr, filter),
            AnalyticFunction::Lead => lag(&partition.reversed(), expr, filter),
            AnalyticFunction::ListAgg => analytic_list_agg(partition, expr, filter),
        }
    }
}

fn row_number(partition: &Partition) -> HashMap<usize, Value> {
    partition
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| (item.record_index, Value::Integer(i as i64 + 1)))
        .collect()
}

fn rank(partition: &Partition) -> HashMap<usize, Value> {
    let mut list = HashMap::with_capacity(partition.len());
    let mut number = 0i64;
    let mut rank = 0i64;
    let mut current_key: Option<&str> = None;
    for item in partition {
        number += 1;
        if current_key != Some(item.order_key.as_str()) {
            rank = number;
            current_key = Some(item.order_key.as_str());
        }
        list.insert(item.record_index, Value::Integer(rank));
    }
    list
}

fn dense_rank(partition: &Partition) -> HashMap<usize, Value> {
    let mut list = HashMap::with_capacity(partition.len());
    let mut rank = 0i64;
    let mut current_key: Option<&str> = None;
    for item in partition {
        if current_key != Some(item.order_key.as_str()) {
            rank += 1;
            current_key = Some(item.order_key.as_str());
        }
        list.insert(item.record_index, Value::Integer(rank));
    }
    list
}

fn cume_dist(partition: &Partition) -> HashMap<usize, Value> {
    let mut list = HashMap::with_capacity(partition.len());
    let total = partition.len() as f64;
    let mut cumulative = 0.0;
    for group in partition.tie_groups() {
        cumulative += group.len() as f64;
        let dist = cumulative / total;
        for index in group {
            list.insert(index, Value::Float(dist));
        }
    }
    list
}

fn percent_rank(partition: &Partition) -> HashMap<usize, Value> {
    let mut list = HashMap::with_capacity(partition.len());
    let denom = partition.len() as f64 - 1.0;
    let mut cumulative = 0.0;
    for group in partition.tie_groups() {
        let dist = if denom > 0.0 { cumulative / denom } else { 1.0 };
        for index in &group {
            list.insert(*index, Value::Float(dist));
        }
        cumulative += group.len() as f64;
    }
    list
}

/// Bucket sizes are computed directly: the first `n mod k` buckets take
/// `ceil(n/k)` rows and the rest take `floor(n/k)`, so bucket numbers
/// never exceed min(k, n). When k > n each row is its own bucket.
fn ntile(
    partition: &Partition,
    expr: &WindowFunctionExpr,
    filter: &mut Filter<'_>,
) -> Result<HashMap<usize, Value>, QueryError> {
    let k = scalar_integer_arg(expr, filter, 0, "the first argument")?;
    if k < 1 {
        return Err(QueryError::invalid_argument(
            &expr.name,
            "the first argument must be greater than 0",
            expr.pos,
        ));
    }
    let k = k as usize;
    let n = partition.len();

    let mut list = HashMap::with_capacity(n);
    if k >= n {
        for (i, item) in partition.items().iter().enumerate() {
            list.insert(item.record_index, Value::Integer(i as i64 + 1));
        }
        return Ok(list);
    }

    let per_tile = n / k;
    let remainder = n % k;
    let mut items = partition.items().iter();
    for tile in 1..=k {
        let size = if tile <= remainder { per_tile + 1 } else { per_tile };
        for _ in 0..size {
            if let Some(item) = items.next() {
                list.insert(item.record_index, Value::Integer(tile as i64));
            }
        }
    }
    Ok(list)
}

/// Every row of the partition receives the value of the argument at the
/// n-th position in evaluation order, skipping NULLs under IGNORE NULLS;
/// NULL when the position is past the end.
fn nth_value(
    partition: &Partition,
    expr: &WindowFunctionExpr,
    filter: &mut Filter<'_>,
    n: usize,
) -> Result<HashMap<usize, Value>, QueryError> {
    let mut value = Value::Null;
    if n <= partition.len() {
        let mut count = 0;
        for item in partition {
            filter.set_record_index(item.record_index);
            let candidate = filter.evaluate(&expr.args[0])?;
            if expr.ignore_nulls && candidate.is_null() {
                continue;
            }
            count += 1;
            if count == n {
                value = candidate;
                break;
            }
        }
    }

    Ok(partition
        .items()
        .iter()
        .map(|item| (item.record_index, value.clone()))
        .collect())
}

/// LAG over the given order; LEAD is LAG over the reversed partition.
/// With IGNORE NULLS the walk continues backward past NULLs; the default
/// value is emitted when no value is found.
fn lag(
    partition: &Partition,
    expr: &WindowFunctionExpr,
    filter: &mut Filter<'_>,
) -> Result<HashMap<usize, Value>, QueryError> {
    let offset = if expr.args.len() > 1 {
        let i = scalar_integer_arg(expr, filter, 1, "the second argument")?;
        i as isize
    } else {
        1
    };
    let default_value = if expr.args.len() > 2 {
        let mut args_filter = filter.detached();
        args_filter.evaluate(&expr.args[2]).map_err(|_| {
            QueryError::invalid_argument(
                &expr.name,
                "the third argument must be a primitive type",
                expr.pos,
            )
        })?
    } else {
        Value::Null
    };

    let mut list = HashMap::with_capacity(partition.len());
    let mut values: Vec<Value> = Vec::with_capacity(partition.len());
    for item in partition {
        filter.set_record_index(item.record_index);
        values.push(filter.evaluate(&expr.args[0])?);

        let lag_idx = values.len() as isize - 1 - offset;
        let mut value = default_value.clone();
        if 0 <= lag_idx && lag_idx < values.len() as isize {
            for i in (0..=lag_idx as usize).rev() {
                if expr.ignore_nulls && values[i].is_null() {
                    continue;
                }
                value = values[i].clone();
                break;
            }
        }
        list.insert(item.record_index, value);
    }
    Ok(list)
}

fn analytic_list_agg(
    partition: &Partition,
    expr: &WindowFunctionExpr,
    filter: &mut Filter<'_>,
) -> Result<HashMap<usize, Value>, QueryError> {
    let separator = if expr.args.len() == 2 {
        let mut args_filter = filter.detached();
        let sep = args_filter.evaluate(&expr.args[1]).ok().and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        });
        sep.ok_or_else(|| {
            QueryError::invalid_argument(
                &expr.name,
                "the second argument must be a string",
                expr.pos,
            )
        })?
    } else {
        String::new()
    };

    let mut values = Vec::with_capacity(partition.len());
    for item in partition {
        filter.set_record_index(item.record_index);
        values.push(filter.evaluate(&expr.args[0])?);
    }
    if expr.distinct {
        values = distinguish(values);
    }

    let joined = list_agg(&values, &separator);
    Ok(partition
        .items()
        .iter()
        .map(|item| (item.record_index, joined.clone()))
        .collect())
}

/// Evaluate a scalar argument that must be an integer.
fn scalar_integer_arg(
    expr: &WindowFunctionExpr,
    filter: &mut Filter<'_>,
    index: usize,
    label: &str,
) -> Result<i64, QueryError> {
    let mut args_filter = filter.detached();
    let message = format!("{} must be an integer", label);
    let value = args_filter
        .evaluate(&expr.args[index])
        .map_err(|_| QueryError::invalid_argument(&expr.name, message.clone(), expr.pos))?;
    value
        .as_integer()
        .ok_or_else(|| QueryError::invalid_argument(&expr.name, message, expr.pos))
}
