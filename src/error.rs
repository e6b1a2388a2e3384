//! Error types for query evaluation.
//!
//! Every error carries the source position of the AST node it originated
//! from, printed as `[L:n C:n]` (or `[L:- C:-]` when unknown). Errors abort
//! the current statement and propagate to the caller unchanged; inside
//! parallel phases the first captured error wins.

use std::fmt;
use std::io;

/// Source position of an AST node (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl SourcePos {
    pub fn new(line: u32, column: u32) -> Self {
        SourcePos {
            line: Some(line),
            column: Some(column),
        }
    }

    /// An unknown position, printed as `[L:- C:-]`.
    pub fn unknown() -> Self {
        SourcePos::default()
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(l), Some(c)) => write!(f, "[L:{} C:{}]", l, c),
            (Some(l), None) => write!(f, "[L:{} C:-]", l),
            (None, Some(c)) => write!(f, "[L:- C:{}]", c),
            (None, None) => write!(f, "[L:- C:-]"),
        }
    }
}

/// Errors raised while evaluating statements against loaded views.
#[derive(Debug, Clone)]
pub enum QueryError {
    /// Function name does not resolve to any analytic, aggregate, scalar,
    /// or user-defined function
    FunctionNotExist { function: String, pos: SourcePos },
    /// Wrong number of arguments for a function
    FunctionArgumentLength {
        function: String,
        expected: String,
        pos: SourcePos,
    },
    /// Argument value of the wrong type or out of range
    FunctionInvalidArgument {
        function: String,
        message: String,
        pos: SourcePos,
    },
    /// Field reference does not resolve in any record frame
    FieldNotExist { field: String, pos: SourcePos },
    /// Field reference resolves to more than one header field
    FieldAmbiguous { field: String, pos: SourcePos },
    /// Two header fields share a case-insensitive name within one view
    FieldNameDuplicate { field: String, pos: SourcePos },
    /// Referenced table has not been loaded into the view cache
    TableNotLoaded { table: String, pos: SourcePos },
    /// CREATE TABLE target already exists on disk or in the cache
    FileAlreadyExists { path: String, pos: SourcePos },
    /// Referenced file does not exist
    FileDoesNotExist { path: String, pos: SourcePos },
    /// Temporary view name already declared in the current scope
    ViewRedeclared { view: String, pos: SourcePos },
    /// Cursor name is not declared in any scope
    CursorUndeclared { cursor: String, pos: SourcePos },
    /// Cursor name already declared in the current scope
    CursorRedeclared { cursor: String, pos: SourcePos },
    /// Operation requires an open cursor
    CursorClosed { cursor: String, pos: SourcePos },
    /// FETCH target variable count differs from the record field count
    CursorFetchLengthMismatch {
        cursor: String,
        expected: usize,
        pos: SourcePos,
    },
    /// FETCH ABSOLUTE/RELATIVE position does not evaluate to an integer
    FetchPositionNotInteger { pos: SourcePos },
    /// Variable is not declared in any scope
    VariableUndeclared { variable: String, pos: SourcePos },
    /// Variable name already declared in the current scope
    VariableRedeclared { variable: String, pos: SourcePos },
    /// The same target record would receive conflicting values for a field
    RecordAmbiguous { pos: SourcePos },
    /// Scalar subquery returned more than one row
    SubqueryTooManyRows { pos: SourcePos },
    /// Scalar subquery returned more than one field
    SubqueryTooManyFields { pos: SourcePos },
    /// Set operation operands have differing field counts
    SetClauseFieldCount {
        left: usize,
        right: usize,
        pos: SourcePos,
    },
    /// Recursive member field count differs from the anchor's
    RecursionFieldCount {
        expected: usize,
        actual: usize,
        pos: SourcePos,
    },
    /// DELETE over a join without an explicit tables list
    TablesToDeleteNotSpecified { pos: SourcePos },
    /// SET clause references a field outside the UPDATE tables list
    FieldNotInUpdateTables { field: String, pos: SourcePos },
    /// Value cannot be coerced to the required type
    TypeConversion {
        value: String,
        target: String,
        pos: SourcePos,
    },
    /// Underlying file operation failed
    IoError { message: String, pos: SourcePos },
    /// Invariant violation inside the engine
    Internal { message: String, pos: SourcePos },
}

impl QueryError {
    /// Source position the error originated from.
    pub fn pos(&self) -> SourcePos {
        match self {
            QueryError::FunctionNotExist { pos, .. }
            | QueryError::FunctionArgumentLength { pos, .. }
            | QueryError::FunctionInvalidArgument { pos, .. }
            | QueryError::FieldNotExist { pos, .. }
            | QueryError::FieldAmbiguous { pos, .. }
            | QueryError::FieldNameDuplicate { pos, .. }
            | QueryError::TableNotLoaded { pos, .. }
            | QueryError::FileAlreadyExists { pos, .. }
            | QueryError::FileDoesNotExist { pos, .. }
            | QueryError::ViewRedeclared { pos, .. }
            | QueryError::CursorUndeclared { pos, .. }
            | QueryError::CursorRedeclared { pos, .. }
            | QueryError::CursorClosed { pos, .. }
            | QueryError::CursorFetchLengthMismatch { pos, .. }
            | QueryError::FetchPositionNotInteger { pos }
            | QueryError::VariableUndeclared { pos, .. }
            | QueryError::VariableRedeclared { pos, .. }
            | QueryError::RecordAmbiguous { pos }
            | QueryError::SubqueryTooManyRows { pos }
            | QueryError::SubqueryTooManyFields { pos }
            | QueryError::SetClauseFieldCount { pos, .. }
            | QueryError::RecursionFieldCount { pos, .. }
            | QueryError::TablesToDeleteNotSpecified { pos }
            | QueryError::FieldNotInUpdateTables { pos, .. }
            | QueryError::TypeConversion { pos, .. }
            | QueryError::IoError { pos, .. }
            | QueryError::Internal { pos, .. } => *pos,
        }
    }

    pub fn function_not_exist(function: impl Into<String>, pos: SourcePos) -> Self {
        QueryError::FunctionNotExist {
            function: function.into(),
            pos,
        }
    }

    pub fn argument_length(
        function: impl Into<String>,
        expected: impl Into<String>,
        pos: SourcePos,
    ) -> Self {
        QueryError::FunctionArgumentLength {
            function: function.into(),
            expected: expected.into(),
            pos,
        }
    }

    pub fn invalid_argument(
        function: impl Into<String>,
        message: impl Into<String>,
        pos: SourcePos,
    ) -> Self {
        QueryError::FunctionInvalidArgument {
            function: function.into(),
            message: message.into(),
            pos,
        }
    }

    pub fn field_not_exist(field: impl Into<String>, pos: SourcePos) -> Self {
        QueryError::FieldNotExist {
            field: field.into(),
            pos,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        QueryError::Internal {
            message: message.into(),
            pos: SourcePos::unknown(),
        }
    }

    pub fn io(err: io::Error, pos: SourcePos) -> Self {
        QueryError::IoError {
            message: err.to_string(),
            pos,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::FunctionNotExist { function, pos } => {
                write!(f, "{} function {} does not exist", pos, function)
            }
            QueryError::FunctionArgumentLength {
                function,
                expected,
                pos,
            } => write!(f, "{} function {} takes {}", pos, function, expected),
            QueryError::FunctionInvalidArgument {
                function,
                message,
                pos,
            } => write!(f, "{} function {}: {}", pos, function, message),
            QueryError::FieldNotExist { field, pos } => {
                write!(f, "{} field {} does not exist", pos, field)
            }
            QueryError::FieldAmbiguous { field, pos } => {
                write!(f, "{} field {} is ambiguous", pos, field)
            }
            QueryError::FieldNameDuplicate { field, pos } => {
                write!(f, "{} field name {} is duplicated", pos, field)
            }
            QueryError::TableNotLoaded { table, pos } => {
                write!(f, "{} table {} is not loaded", pos, table)
            }
            QueryError::FileAlreadyExists { path, pos } => {
                write!(f, "{} file {} already exists", pos, path)
            }
            QueryError::FileDoesNotExist { path, pos } => {
                write!(f, "{} file {} does not exist", pos, path)
            }
            QueryError::ViewRedeclared { view, pos } => {
                write!(f, "{} view {} is redeclared", pos, view)
            }
            QueryError::CursorUndeclared { cursor, pos } => {
                write!(f, "{} cursor {} is undeclared", pos, cursor)
            }
            QueryError::CursorRedeclared { cursor, pos } => {
                write!(f, "{} cursor {} is redeclared", pos, cursor)
            }
            QueryError::CursorClosed { cursor, pos } => {
                write!(f, "{} cursor {} is closed", pos, cursor)
            }
            QueryError::CursorFetchLengthMismatch {
                cursor,
                expected,
                pos,
            } => write!(
                f,
                "{} fetching from cursor {} requires {} variables",
                pos, cursor, expected
            ),
            QueryError::FetchPositionNotInteger { pos } => {
                write!(f, "{} fetch position must be an integer", pos)
            }
            QueryError::VariableUndeclared { variable, pos } => {
                write!(f, "{} variable {} is undeclared", pos, variable)
            }
            QueryError::VariableRedeclared { variable, pos } => {
                write!(f, "{} variable {} is redeclared", pos, variable)
            }
            QueryError::RecordAmbiguous { pos } => {
                write!(f, "{} record to update is ambiguous", pos)
            }
            QueryError::SubqueryTooManyRows { pos } => {
                write!(f, "{} subquery returns too many records", pos)
            }
            QueryError::SubqueryTooManyFields { pos } => {
                write!(f, "{} subquery returns too many fields", pos)
            }
            QueryError::SetClauseFieldCount { left, right, pos } => write!(
                f,
                "{} set operation field counts differ ({} and {})",
                pos, left, right
            ),
            QueryError::RecursionFieldCount {
                expected,
                actual,
                pos,
            } => write!(
                f,
                "{} recursive member returns {} fields, anchor returns {}",
                pos, actual, expected
            ),
            QueryError::TablesToDeleteNotSpecified { pos } => {
                write!(f, "{} tables to delete are not specified", pos)
            }
            QueryError::FieldNotInUpdateTables { field, pos } => {
                write!(f, "{} field {} does not exist in the update tables", pos, field)
            }
            QueryError::TypeConversion { value, target, pos } => {
                write!(f, "{} {} cannot be converted to {}", pos, value, target)
            }
            QueryError::IoError { message, pos } => write!(f, "{} {}", pos, message),
            QueryError::Internal { message, pos } => {
                write!(f, "{} internal error: {}", pos, message)
            }
        }
    }
}

impl std::error::Error for QueryError {}
