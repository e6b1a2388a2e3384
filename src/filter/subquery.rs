//! Subquery execution within expression evaluation.
//!
//! Subqueries run through a child filter, so the parent's record frames
//! stay visible and correlated references resolve to the outer row.

use crate::ast::{BinaryOperator, SelectQuery};
use crate::error::{QueryError, SourcePos};
use crate::executor::select;
use crate::filter::Filter;
use crate::filter::evaluator::compare_with_op;
use crate::value::{Ternary, Value, equals};

impl<'s> Filter<'s> {
    /// A scalar subquery returns its single cell, NULL for an empty
    /// result, and fails on more than one row or field.
    pub(crate) fn scalar_subquery(
        &self,
        query: &SelectQuery,
        pos: SourcePos,
    ) -> Result<Value, QueryError> {
        let view = select::execute(query, &mut self.child())?;
        if view.field_len() > 1 {
            return Err(QueryError::SubqueryTooManyFields { pos });
        }
        if view.record_len() > 1 {
            return Err(QueryError::SubqueryTooManyRows { pos });
        }
        Ok(view
            .records
            .first()
            .and_then(|r| r.cell(0))
            .map(|c| c.value().clone())
            .unwrap_or(Value::Null))
    }

    pub(crate) fn exists_subquery(&self, query: &SelectQuery) -> Result<bool, QueryError> {
        let view = select::execute(query, &mut self.child())?;
        Ok(view.record_len() > 0)
    }

    /// Row-wise IN: TRUE when any row equals, UNKNOWN when none does but
    /// some comparison was unknown, FALSE otherwise.
    pub(crate) fn in_subquery(
        &self,
        value: &Value,
        query: &SelectQuery,
        pos: SourcePos,
    ) -> Result<Ternary, QueryError> {
        let view = select::execute(query, &mut self.child())?;
        if view.field_len() != 1 {
            return Err(QueryError::SubqueryTooManyFields { pos });
        }
        let mut result = Ternary::False;
        for record in &view.records {
            let candidate = record.cell(0).map(|c| c.value().clone()).unwrap_or(Value::Null);
            result = result.or(equals(value, &candidate));
            if result.is_true() {
                break;
            }
        }
        Ok(result)
    }

    /// ANY is an OR-fold over the rows, ALL an AND-fold; the empty result
    /// set yields FALSE for ANY and TRUE for ALL.
    pub(crate) fn any_all_subquery(
        &self,
        value: &Value,
        op: BinaryOperator,
        query: &SelectQuery,
        any: bool,
        pos: SourcePos,
    ) -> Result<Ternary, QueryError> {
        let view = select::execute(query, &mut self.child())?;
        if view.field_len() != 1 {
            return Err(QueryError::SubqueryTooManyFields { pos });
        }
        let mut result = if any { Ternary::False } else { Ternary::True };
        for record in &view.records {
            let candidate = record.cell(0).map(|c| c.value().clone()).unwrap_or(Value::Null);
            let comparison = compare_with_op(value, &candidate, op);
            result = if any {
                result.or(comparison)
            } else {
                result.and(comparison)
            };
        }
        Ok(result)
    }
}
