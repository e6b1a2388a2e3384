//! Aggregate functions over materialized value lists.
//!
//! The caller evaluates the argument expression once per group or
//! partition member and hands the list here. NULLs are excluded before
//! computation; COUNT counts the non-NULL values.

use std::cmp::Ordering;

use crate::value::{Value, compare, serialize_value};

/// The built-in aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Stdev,
    StdevP,
    Var,
    VarP,
    Median,
    ListAgg,
}

impl AggregateFunction {
    /// Resolve an uppercased function name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "COUNT" => Some(AggregateFunction::Count),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" => Some(AggregateFunction::Avg),
            "MIN" => Some(AggregateFunction::Min),
            "MAX" => Some(AggregateFunction::Max),
            "STDEV" => Some(AggregateFunction::Stdev),
            "STDEVP" => Some(AggregateFunction::StdevP),
            "VAR" => Some(AggregateFunction::Var),
            "VARP" => Some(AggregateFunction::VarP),
            "MEDIAN" => Some(AggregateFunction::Median),
            "LISTAGG" => Some(AggregateFunction::ListAgg),
            _ => None,
        }
    }

    /// Apply the aggregate to a value list. LISTAGG takes its separator
    /// through [`list_agg`]; through this entry it joins with the empty
    /// string.
    pub fn apply(&self, values: &[Value]) -> Value {
        match self {
            AggregateFunction::Count => {
                Value::Integer(values.iter().filter(|v| !v.is_null()).count() as i64)
            }
            AggregateFunction::Sum => sum(values),
            AggregateFunction::Avg => avg(values),
            AggregateFunction::Min => extremum(values, Ordering::Less),
            AggregateFunction::Max => extremum(values, Ordering::Greater),
            AggregateFunction::Stdev => dispersion(values, true, true),
            AggregateFunction::StdevP => dispersion(values, true, false),
            AggregateFunction::Var => dispersion(values, false, true),
            AggregateFunction::VarP => dispersion(values, false, false),
            AggregateFunction::Median => median(values),
            AggregateFunction::ListAgg => list_agg(values, ""),
        }
    }
}

/// Remove duplicates by serialized comparison key, keeping first
/// appearances; used for DISTINCT aggregate arguments.
pub fn distinguish(values: Vec<Value>) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(serialize_value(v)))
        .collect()
}

fn non_null_floats(values: &[Value]) -> Vec<f64> {
    values.iter().filter_map(Value::as_float).collect()
}

fn sum(values: &[Value]) -> Value {
    let mut all_integer = true;
    let mut total = 0.0;
    let mut count = 0usize;
    for value in values {
        if value.is_null() {
            continue;
        }
        match value.as_float() {
            Some(f) => {
                if value.as_integer().is_none() || f.fract() != 0.0 {
                    all_integer = false;
                }
                total += f;
                count += 1;
            }
            None => all_integer = false,
        }
    }
    if count == 0 {
        Value::Null
    } else if all_integer {
        Value::Integer(total as i64)
    } else {
        Value::Float(total)
    }
}

fn avg(values: &[Value]) -> Value {
    let floats = non_null_floats(values);
    if floats.is_empty() {
        Value::Null
    } else {
        Value::Float(floats.iter().sum::<f64>() / floats.len() as f64)
    }
}

fn extremum(values: &[Value], keep: Ordering) -> Value {
    let mut result: Option<&Value> = None;
    for value in values.iter().filter(|v| !v.is_null()) {
        match result {
            None => result = Some(value),
            Some(current) => {
                if compare(value, current) == Some(keep) {
                    result = Some(value);
                }
            }
        }
    }
    result.cloned().unwrap_or(Value::Null)
}

fn dispersion(values: &[Value], sqrt: bool, sample: bool) -> Value {
    let floats = non_null_floats(values);
    let n = floats.len();
    let denom = if sample { n.saturating_sub(1) } else { n };
    if denom == 0 {
        return Value::Null;
    }
    let mean = floats.iter().sum::<f64>() / n as f64;
    let variance = floats.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / denom as f64;
    Value::Float(if sqrt { variance.sqrt() } else { variance })
}

fn median(values: &[Value]) -> Value {
    let mut floats = non_null_floats(values);
    if floats.is_empty() {
        return Value::Null;
    }
    floats.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = floats.len() / 2;
    if floats.len() % 2 == 1 {
        Value::Float(floats[mid])
    } else {
        Value::Float((floats[mid - 1] + floats[mid]) / 2.0)
    }
}

/// Stringify non-NULL values and join with the separator. Every row of the
/// partition or group receives the same joined string.
pub fn list_agg(values: &[Value], separator: &str) -> Value {
    let parts: Vec<String> = values
        .iter()
        .filter(|v| !v.is_null())
        .map(Value::to_string)
        .collect();
    Value::String(parts.join(separator))
}
