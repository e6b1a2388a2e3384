//! Scoped evaluation environment.
//!
//! A [`Filter`] is a non-empty stack of [`Scope`]s plus the record frames
//! of the rows currently being iterated. Lookups walk innermost to
//! outermost; declarations target the innermost scope. Child filters used
//! for subqueries and parallel workers share the parent's scopes by
//! reference and own their record frames, so correlated references
//! resolve to the correct outer row.

mod evaluator;
mod subquery;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::ast::SelectQuery;
use crate::cursor::Cursor;
use crate::error::{QueryError, SourcePos};
use crate::function::UserFunction;
use crate::session::Session;
use crate::value::Value;
use crate::view::View;

/// One lexical scope: variables, temporary views, cursors, and
/// user-defined functions. Maps are keyed by uppercased name.
#[derive(Debug, Default)]
pub struct Scope {
    variables: RwLock<HashMap<String, Value>>,
    temp_views: RwLock<HashMap<String, View>>,
    cursors: RwLock<HashMap<String, Cursor>>,
    functions: RwLock<HashMap<String, Arc<UserFunction>>>,
}

/// Binding of a filter to one row of a view during evaluation.
#[derive(Debug, Clone)]
pub struct RecordRef {
    pub view: Arc<View>,
    pub record_index: usize,
    /// Within-group index while an aggregate argument is being evaluated
    /// over a grouped cell.
    pub field_ref: Option<usize>,
}

impl RecordRef {
    pub fn new(view: Arc<View>) -> Self {
        RecordRef {
            view,
            record_index: 0,
            field_ref: None,
        }
    }
}

/// The evaluation environment threaded through every operation.
#[derive(Clone)]
pub struct Filter<'s> {
    session: &'s Session,
    /// Outermost first; the last entry is the innermost scope.
    scopes: Vec<Arc<Scope>>,
    /// Innermost record frame first.
    pub records: Vec<RecordRef>,
}

impl<'s> Filter<'s> {
    /// Root filter with a single empty scope.
    pub fn new(session: &'s Session) -> Self {
        Filter {
            session,
            scopes: vec![Arc::new(Scope::default())],
            records: Vec::new(),
        }
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Child filter for a nested query block: shares the parent scopes,
    /// adds a fresh innermost scope, and keeps the parent's record frames
    /// visible for correlated references.
    pub fn child(&self) -> Filter<'s> {
        let mut scopes = self.scopes.clone();
        scopes.push(Arc::new(Scope::default()));
        Filter {
            session: self.session,
            scopes,
            records: self.records.clone(),
        }
    }

    /// Filter with no record frames, for scalar arguments that must not
    /// reference fields.
    pub fn detached(&self) -> Filter<'s> {
        Filter {
            session: self.session,
            scopes: self.scopes.clone(),
            records: Vec::new(),
        }
    }

    /// Filter iterating the given view: a new innermost record frame is
    /// pushed in front of the parent's frames.
    pub fn for_records(&self, view: Arc<View>) -> Filter<'s> {
        let mut filter = self.clone();
        filter.records.insert(0, RecordRef::new(view));
        filter
    }

    pub fn set_record_index(&mut self, index: usize) {
        if let Some(frame) = self.records.first_mut() {
            frame.record_index = index;
        }
    }

    pub fn set_field_ref(&mut self, field_ref: Option<usize>) {
        if let Some(frame) = self.records.first_mut() {
            frame.field_ref = field_ref;
        }
    }

    fn innermost(&self) -> &Scope {
        self.scopes.last().expect("filter scope stack is never empty")
    }

    // ---- variables ----

    pub fn declare_variable(
        &self,
        name: &str,
        value: Value,
        pos: SourcePos,
    ) -> Result<(), QueryError> {
        let key = name.to_uppercase();
        let mut variables = self.innermost().variables.write().unwrap();
        if variables.contains_key(&key) {
            return Err(QueryError::VariableRedeclared {
                variable: name.to_string(),
                pos,
            });
        }
        variables.insert(key, value);
        Ok(())
    }

    pub fn variable(&self, name: &str, pos: SourcePos) -> Result<Value, QueryError> {
        let key = name.to_uppercase();
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.variables.read().unwrap().get(&key) {
                return Ok(value.clone());
            }
        }
        Err(QueryError::VariableUndeclared {
            variable: name.to_string(),
            pos,
        })
    }

    pub fn set_variable(&self, name: &str, value: Value, pos: SourcePos) -> Result<(), QueryError> {
        let key = name.to_uppercase();
        for scope in self.scopes.iter().rev() {
            let mut variables = scope.variables.write().unwrap();
            if let Some(slot) = variables.get_mut(&key) {
                *slot = value;
                return Ok(());
            }
        }
        Err(QueryError::VariableUndeclared {
            variable: name.to_string(),
            pos,
        })
    }

    // ---- temporary views ----

    pub fn declare_view(&self, name: &str, view: View, pos: SourcePos) -> Result<(), QueryError> {
        let key = name.to_uppercase();
        let mut views = self.innermost().temp_views.write().unwrap();
        if views.contains_key(&key) {
            return Err(QueryError::ViewRedeclared {
                view: name.to_string(),
                pos,
            });
        }
        views.insert(key, view);
        Ok(())
    }

    pub fn temp_view(&self, name: &str) -> Option<View> {
        let key = name.to_uppercase();
        for scope in self.scopes.iter().rev() {
            if let Some(view) = scope.temp_views.read().unwrap().get(&key) {
                return Some(view.clone());
            }
        }
        None
    }

    /// Replace a declared temporary view in its owning scope. Returns
    /// false when the name is not declared anywhere.
    pub fn replace_temp_view(&self, name: &str, view: View) -> bool {
        let key = name.to_uppercase();
        for scope in self.scopes.iter().rev() {
            let mut views = scope.temp_views.write().unwrap();
            if let std::collections::hash_map::Entry::Occupied(mut entry) = views.entry(key.clone())
            {
                entry.insert(view);
                return true;
            }
        }
        false
    }

    pub fn dispose_view(&self, name: &str, pos: SourcePos) -> Result<(), QueryError> {
        let key = name.to_uppercase();
        for scope in self.scopes.iter().rev() {
            if scope.temp_views.write().unwrap().remove(&key).is_some() {
                return Ok(());
            }
        }
        Err(QueryError::TableNotLoaded {
            table: name.to_string(),
            pos,
        })
    }

    // ---- cursors ----

    pub fn declare_cursor(
        &self,
        name: &str,
        query: SelectQuery,
        pos: SourcePos,
    ) -> Result<(), QueryError> {
        let key = name.to_uppercase();
        let mut cursors = self.innermost().cursors.write().unwrap();
        if cursors.contains_key(&key) {
            return Err(QueryError::CursorRedeclared {
                cursor: name.to_string(),
                pos,
            });
        }
        cursors.insert(key, Cursor::new(query));
        Ok(())
    }

    /// Run a closure against a declared cursor. The closure must not
    /// execute statements; OPEN materializes its view before locking.
    pub fn cursor_mut<R>(
        &self,
        name: &str,
        pos: SourcePos,
        f: impl FnOnce(&mut Cursor) -> Result<R, QueryError>,
    ) -> Result<R, QueryError> {
        let key = name.to_uppercase();
        for scope in self.scopes.iter().rev() {
            let mut cursors = scope.cursors.write().unwrap();
            if let Some(cursor) = cursors.get_mut(&key) {
                return f(cursor);
            }
        }
        Err(QueryError::CursorUndeclared {
            cursor: name.to_string(),
            pos,
        })
    }

    pub fn cursor<R>(
        &self,
        name: &str,
        pos: SourcePos,
        f: impl FnOnce(&Cursor) -> R,
    ) -> Result<R, QueryError> {
        self.cursor_mut(name, pos, |cursor| Ok(f(cursor)))
    }

    pub fn dispose_cursor(&self, name: &str, pos: SourcePos) -> Result<(), QueryError> {
        let key = name.to_uppercase();
        for scope in self.scopes.iter().rev() {
            if scope.cursors.write().unwrap().remove(&key).is_some() {
                return Ok(());
            }
        }
        Err(QueryError::CursorUndeclared {
            cursor: name.to_string(),
            pos,
        })
    }

    // ---- user-defined functions ----

    pub fn declare_function(&self, function: Arc<UserFunction>) {
        self.innermost()
            .functions
            .write()
            .unwrap()
            .insert(function.name.clone(), function);
    }

    pub fn user_function(&self, name: &str) -> Option<Arc<UserFunction>> {
        let key = name.to_uppercase();
        for scope in self.scopes.iter().rev() {
            if let Some(function) = scope.functions.read().unwrap().get(&key) {
                return Some(Arc::clone(function));
            }
        }
        None
    }

    // ---- field resolution ----

    /// Resolve a field reference against the record frames, innermost
    /// first. Ambiguity within a frame is an error; absence falls through
    /// to the next (outer) frame.
    pub fn field_value(
        &self,
        view: Option<&str>,
        name: &str,
        pos: SourcePos,
    ) -> Result<Value, QueryError> {
        for frame in &self.records {
            match frame.view.field_index(view, name, pos) {
                Ok(index) => return Ok(self.cell_value(frame, index)),
                Err(err @ QueryError::FieldAmbiguous { .. }) => return Err(err),
                Err(_) => continue,
            }
        }
        Err(QueryError::field_not_exist(
            match view {
                Some(v) => format!("{}.{}", v, name),
                None => name.to_string(),
            },
            pos,
        ))
    }

    /// Resolve a 1-based column number reference.
    pub fn column_number_value(
        &self,
        view: &str,
        number: u32,
        pos: SourcePos,
    ) -> Result<Value, QueryError> {
        for frame in &self.records {
            if let Ok(index) = frame.view.field_index_by_number(view, number, pos) {
                return Ok(self.cell_value(frame, index));
            }
        }
        Err(QueryError::field_not_exist(format!("{}.{}", view, number), pos))
    }

    fn cell_value(&self, frame: &RecordRef, index: usize) -> Value {
        match frame.view.records.get(frame.record_index).and_then(|r| r.cell(index)) {
            Some(cell) => match frame.field_ref {
                Some(g) => cell.at(g).clone(),
                None => cell.value().clone(),
            },
            None => Value::Null,
        }
    }
}

impl std::fmt::Debug for Filter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("scopes", &self.scopes.len())
            .field("records", &self.records.len())
            .finish()
    }
}
