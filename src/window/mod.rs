//! Partition and window evaluation.
//!
//! [`analyze`] appends exactly one column to a view for one window
//! function invocation. Partition keys are computed in parallel over row
//! chunks, merged serially in row order to keep first-appearance
//! partition order, then partitions are evaluated in parallel. Workers
//! cooperate on cancellation through a shared first-error slot checked on
//! every iteration.

pub mod partition;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::ast::{Expr, WindowFunctionExpr};
use crate::error::QueryError;
use crate::filter::Filter;
use crate::function::aggregate::distinguish;
use crate::function::{WindowFunctionClass, classify_window_function};
use crate::record::Cell;
use crate::value::{Value, serialize_key};
use crate::view::View;
use self::partition::{Partition, PartitionItem, PartitionList};

/// Rows below this threshold per worker are not worth a thread.
const MIN_ROWS_PER_WORKER: usize = 64;

/// Worker count for a parallel phase over `units` items.
pub(crate) fn worker_count(units: usize, cpu: usize) -> usize {
    let useful = (units / MIN_ROWS_PER_WORKER).max(1);
    cpu.min(useful).max(1)
}

/// First-error-wins slot shared between workers. The flag is the fast
/// path checked on every iteration; the mutex holds the error itself.
pub(crate) struct ErrorSlot {
    raised: AtomicBool,
    slot: Mutex<Option<QueryError>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        ErrorSlot {
            raised: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Relaxed)
    }

    /// Record an error unless a sibling already won.
    pub fn record(&self, err: QueryError) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            *self.slot.lock().unwrap() = Some(err);
        }
    }

    pub fn take(&self) -> Result<(), QueryError> {
        match self.slot.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Evaluate one window function over the view and append its result
/// column. Row order of the output is exactly the input order.
pub fn analyze(
    view: View,
    expr: &WindowFunctionExpr,
    filter: &Filter<'_>,
) -> Result<View, QueryError> {
    let class = classify_window_function(expr, filter)?;
    let cpu = filter.session().config().cpu;

    let shared = Arc::new(view);
    let partitions = build_partitions(&shared, expr, filter, cpu)?;
    let column = evaluate_partitions(&shared, &partitions, &class, expr, filter, cpu)?;

    let mut view = Arc::try_unwrap(shared)
        .map_err(|_| QueryError::internal("view still shared after window phases"))?;
    for (record, value) in view.records.iter_mut().zip(column) {
        record.push(Cell::new(value.unwrap_or(Value::Null)));
    }
    Ok(view)
}

/// Partition phase (parallel) and merge phase (serial).
///
/// Workers fill two pre-sized arrays over disjoint row chunks; the merge
/// walks rows in original order so partition membership is stable and
/// first-appearance order is deterministic.
fn build_partitions(
    view: &Arc<View>,
    expr: &WindowFunctionExpr,
    filter: &Filter<'_>,
    cpu: usize,
) -> Result<PartitionList, QueryError> {
    let record_len = view.record_len();
    let mut partition_keys = vec![String::new(); record_len];
    let mut partition_items = vec![PartitionItem::default(); record_len];
    let order_exprs: Vec<Expr> = expr.order_by.iter().map(|o| o.expr.clone()).collect();

    if record_len > 0 {
        let workers = worker_count(record_len, cpu);
        let chunk_size = record_len.div_ceil(workers);
        let error = ErrorSlot::new();

        thread::scope(|s| {
            let key_chunks = partition_keys.chunks_mut(chunk_size);
            let item_chunks = partition_items.chunks_mut(chunk_size);
            for (w, (keys, items)) in key_chunks.zip(item_chunks).enumerate() {
                let mut worker_filter = filter.for_records(Arc::clone(view));
                let error = &error;
                let order_exprs = &order_exprs;
                s.spawn(move || {
                    let base = w * chunk_size;
                    for (offset, (key_slot, item_slot)) in
                        keys.iter_mut().zip(items.iter_mut()).enumerate()
                    {
                        if error.is_raised() {
                            break;
                        }
                        let index = base + offset;
                        worker_filter.set_record_index(index);

                        if !expr.partition_by.is_empty() {
                            match worker_filter.eval_values(&expr.partition_by) {
                                Ok(values) => *key_slot = serialize_key(&values),
                                Err(err) => {
                                    error.record(err);
                                    break;
                                }
                            }
                        }
                        let order_key = if order_exprs.is_empty() {
                            String::new()
                        } else {
                            match worker_filter.eval_values(order_exprs) {
                                Ok(values) => serialize_key(&values),
                                Err(err) => {
                                    error.record(err);
                                    break;
                                }
                            }
                        };
                        *item_slot = PartitionItem {
                            order_key,
                            record_index: index,
                        };
                    }
                });
            }
        });
        error.take()?;
    }

    let mut partitions = PartitionList::default();
    for (key, item) in partition_keys.into_iter().zip(partition_items) {
        partitions.append(key, item);
    }
    Ok(partitions)
}

/// Evaluation phase (parallel over partitions). Returns the new column in
/// record order; worker results are index-disjoint by construction.
fn evaluate_partitions(
    view: &Arc<View>,
    partitions: &PartitionList,
    class: &WindowFunctionClass,
    expr: &WindowFunctionExpr,
    filter: &Filter<'_>,
    cpu: usize,
) -> Result<Vec<Option<Value>>, QueryError> {
    let partition_len = partitions.len();
    let mut column: Vec<Option<Value>> = vec![None; view.record_len()];
    if partition_len == 0 {
        return Ok(column);
    }

    let workers = cpu.min(partition_len).max(1);
    let chunk_size = partition_len.div_ceil(workers);
    let error = ErrorSlot::new();

    let results = thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        for w in 0..workers {
            let start = w * chunk_size;
            let end = (start + chunk_size).min(partition_len);
            let mut worker_filter = filter.for_records(Arc::clone(view));
            let error = &error;
            handles.push(s.spawn(move || {
                let mut results: Vec<(usize, Value)> = Vec::new();
                for p in start..end {
                    if error.is_raised() {
                        break;
                    }
                    let partition = match partitions.get(p) {
                        Some(partition) => partition,
                        None => break,
                    };
                    match evaluate_one_partition(partition, class, expr, &mut worker_filter) {
                        Ok(mut list) => results.append(&mut list),
                        Err(err) => {
                            error.record(err);
                            break;
                        }
                    }
                }
                results
            }));
        }
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_default())
            .collect::<Vec<(usize, Value)>>()
    });
    error.take()?;

    for (index, value) in results {
        column[index] = Some(value);
    }
    Ok(column)
}

fn evaluate_one_partition(
    partition: &Partition,
    class: &WindowFunctionClass,
    expr: &WindowFunctionExpr,
    filter: &mut Filter<'_>,
) -> Result<Vec<(usize, Value)>, QueryError> {
    match class {
        WindowFunctionClass::Analytic(analytic) => {
            let list = analytic.execute(partition, expr, filter)?;
            Ok(list.into_iter().collect())
        }
        WindowFunctionClass::Aggregate(aggregate) => {
            let values = list_values(&expr.args[0], partition, filter, expr.distinct)?;
            let value = aggregate.apply(&values);
            Ok(partition
                .items()
                .iter()
                .map(|item| (item.record_index, value.clone()))
                .collect())
        }
        WindowFunctionClass::UserDefined(udf) => {
            let values = list_values(&expr.args[0], partition, filter, expr.distinct)?;
            let mut results = Vec::with_capacity(partition.len());
            for item in partition {
                filter.set_record_index(item.record_index);
                let args = filter.eval_values(&expr.args[1..])?;
                let value = udf.call_aggregate(&values, &args, expr.pos)?;
                results.push((item.record_index, value));
            }
            Ok(results)
        }
    }
}

/// Materialize an argument expression over every partition member. A `*`
/// argument is rewritten to integer 1 before list construction.
fn list_values(
    arg: &Expr,
    partition: &Partition,
    filter: &mut Filter<'_>,
    distinct: bool,
) -> Result<Vec<Value>, QueryError> {
    let arg = match arg {
        Expr::AllColumns { .. } => Expr::integer(1),
        other => other.clone(),
    };
    let mut values = Vec::with_capacity(partition.len());
    for item in partition {
        filter.set_record_index(item.record_index);
        values.push(filter.evaluate(&arg)?);
    }
    Ok(if distinct { distinguish(values) } else { values })
}
