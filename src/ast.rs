//! Abstract syntax tree consumed by the engine.
//!
//! The parser producing these nodes is an external collaborator; the
//! engine only evaluates them. Every node that can raise an error carries
//! the source position it was parsed from.

use crate::error::SourcePos;
use crate::value::Ternary;

/// A top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectQuery),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(CreateTableStatement),
    AddColumns(AddColumnsStatement),
    DropColumns(DropColumnsStatement),
    RenameColumn(RenameColumnStatement),
    /// DECLARE @var [:= expr][, ...]
    DeclareVariable { assignments: Vec<VariableAssignment> },
    /// @var := expr
    SetVariable {
        variable: String,
        value: Expr,
        pos: SourcePos,
    },
    /// DECLARE name VIEW (fields) [AS select]
    DeclareView {
        view: String,
        fields: Vec<String>,
        query: Option<SelectQuery>,
        pos: SourcePos,
    },
    /// DISPOSE VIEW name
    DisposeView { view: String, pos: SourcePos },
    /// DECLARE name CURSOR FOR select
    DeclareCursor {
        cursor: String,
        query: SelectQuery,
        pos: SourcePos,
    },
    OpenCursor { cursor: String, pos: SourcePos },
    FetchCursor {
        cursor: String,
        position: FetchPosition,
        variables: Vec<String>,
        pos: SourcePos,
    },
    CloseCursor { cursor: String, pos: SourcePos },
    DisposeCursor { cursor: String, pos: SourcePos },
    Commit,
    Rollback,
}

/// Cursor fetch positioning. ABSOLUTE is 0-based: ABSOLUTE 0 addresses the
/// first record.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPosition {
    Next,
    Prior,
    First,
    Last,
    Absolute(Expr),
    Relative(Expr),
}

/// A full SELECT query: set-operation body plus trailing clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub with: Vec<CommonTableExpr>,
    pub body: SelectSet,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub for_update: bool,
}

impl SelectQuery {
    pub fn plain(body: SelectSet) -> Self {
        SelectQuery {
            with: Vec::new(),
            body,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            for_update: false,
        }
    }
}

/// WITH clause member.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpr {
    pub recursive: bool,
    pub name: String,
    pub columns: Vec<String>,
    pub query: SelectQuery,
    pub pos: SourcePos,
}

/// Body of a SELECT: a single entity or a set operation tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectSet {
    Entity(SelectEntity),
    Operation {
        left: Box<SelectSet>,
        operator: SetOperator,
        all: bool,
        right: Box<SelectSet>,
        pos: SourcePos,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

/// One SELECT ... FROM ... WHERE ... GROUP BY ... HAVING block.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectEntity {
    pub distinct: bool,
    pub fields: Vec<SelectField>,
    pub from: Vec<TableRef>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

/// Field selection in a SELECT clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    /// `*` or `view.*`
    AllColumns { view: Option<String>, pos: SourcePos },
    /// expr [AS alias]
    Expression { expr: Expr, alias: Option<String> },
}

/// FROM clause member.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: TableExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableExpr {
    /// A file path or temporary view name.
    Identifier { name: String, pos: SourcePos },
    Subquery { query: Box<SelectQuery>, pos: SourcePos },
    Join {
        left: Box<TableRef>,
        right: Box<TableRef>,
        join_type: JoinType,
        natural: bool,
        condition: Option<Expr>,
        using: Vec<String>,
        pos: SourcePos,
    },
    /// FROM-less pseudo table with a single empty record.
    Dual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Cross,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub direction: OrderDirection,
    pub nulls: Option<NullsPosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsPosition {
    First,
    Last,
}

/// INSERT INTO table [(fields)] VALUES ... | select
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableIdent,
    pub fields: Vec<FieldReference>,
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(SelectQuery),
}

/// UPDATE tables SET field = value, ... [FROM ...] [WHERE ...]
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub tables: Vec<TableIdent>,
    pub set_clauses: Vec<SetClause>,
    pub from: Vec<TableRef>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetClause {
    pub field: FieldReference,
    pub value: Expr,
}

/// DELETE [tables] FROM ... [WHERE ...]
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub tables: Vec<TableIdent>,
    pub from: Vec<TableRef>,
    pub where_clause: Option<Expr>,
    pub pos: SourcePos,
}

/// CREATE TABLE file (fields) [AS select]
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub table: TableIdent,
    pub fields: Vec<String>,
    pub query: Option<SelectQuery>,
}

/// ALTER TABLE table ADD columns [FIRST | LAST | AFTER f | BEFORE f]
#[derive(Debug, Clone, PartialEq)]
pub struct AddColumnsStatement {
    pub table: TableIdent,
    pub columns: Vec<ColumnDefault>,
    pub position: ColumnPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefault {
    pub column: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ColumnPosition {
    First,
    #[default]
    Last,
    After(FieldReference),
    Before(FieldReference),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropColumnsStatement {
    pub table: TableIdent,
    pub columns: Vec<FieldReference>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameColumnStatement {
    pub table: TableIdent,
    pub old: FieldReference,
    pub new: String,
    pub pos: SourcePos,
}

/// A table identifier with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct TableIdent {
    pub name: String,
    pub pos: SourcePos,
}

impl TableIdent {
    pub fn new(name: impl Into<String>) -> Self {
        TableIdent {
            name: name.into(),
            pos: SourcePos::unknown(),
        }
    }
}

/// DECLARE assignment member.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableAssignment {
    pub variable: String,
    pub value: Option<Expr>,
    pub pos: SourcePos,
}

/// Field reference of the forms `col` and `view.col`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReference {
    pub view: Option<String>,
    pub column: String,
    pub pos: SourcePos,
}

impl FieldReference {
    pub fn new(column: impl Into<String>) -> Self {
        FieldReference {
            view: None,
            column: column.into(),
            pos: SourcePos::unknown(),
        }
    }

    pub fn qualified(view: impl Into<String>, column: impl Into<String>) -> Self {
        FieldReference {
            view: Some(view.into()),
            column: column.into(),
            pos: SourcePos::unknown(),
        }
    }
}

/// SQL expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal { value: LiteralValue, pos: SourcePos },
    FieldReference(FieldReference),
    /// 1-based column number reference: `view.#n`
    ColumnNumber {
        view: String,
        number: u32,
        pos: SourcePos,
    },
    /// `@var`
    Variable { name: String, pos: SourcePos },
    /// `@@sysvar`
    SystemVariable { name: String, pos: SourcePos },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
        pos: SourcePos,
    },
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
        pos: SourcePos,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
        pos: SourcePos,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
        pos: SourcePos,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<SelectQuery>,
        negated: bool,
        pos: SourcePos,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        pos: SourcePos,
    },
    Exists {
        query: Box<SelectQuery>,
        pos: SourcePos,
    },
    /// comparison with ANY/ALL over a single-field subquery
    AnyAll {
        expr: Box<Expr>,
        op: BinaryOperator,
        query: Box<SelectQuery>,
        any: bool,
        pos: SourcePos,
    },
    /// Scalar subquery.
    Subquery {
        query: Box<SelectQuery>,
        pos: SourcePos,
    },
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
        pos: SourcePos,
    },
    Cast {
        expr: Box<Expr>,
        target: CastType,
        pos: SourcePos,
    },
    /// Scalar, aggregate, or user-defined function call.
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
        pos: SourcePos,
    },
    /// `*` as a function argument (COUNT(*)).
    AllColumns { pos: SourcePos },
    /// fn(args) OVER (PARTITION BY ... ORDER BY ...)
    WindowFunction(WindowFunctionExpr),
    /// CURSOR name IS OPEN / IS IN RANGE / COUNT
    CursorStatus {
        cursor: String,
        status: CursorStatusKind,
        pos: SourcePos,
    },
}

impl Expr {
    pub fn pos(&self) -> SourcePos {
        match self {
            Expr::Literal { pos, .. }
            | Expr::ColumnNumber { pos, .. }
            | Expr::Variable { pos, .. }
            | Expr::SystemVariable { pos, .. }
            | Expr::UnaryOp { pos, .. }
            | Expr::BinaryOp { pos, .. }
            | Expr::Between { pos, .. }
            | Expr::InList { pos, .. }
            | Expr::InSubquery { pos, .. }
            | Expr::Like { pos, .. }
            | Expr::Exists { pos, .. }
            | Expr::AnyAll { pos, .. }
            | Expr::Subquery { pos, .. }
            | Expr::Case { pos, .. }
            | Expr::Cast { pos, .. }
            | Expr::Function { pos, .. }
            | Expr::AllColumns { pos }
            | Expr::CursorStatus { pos, .. } => *pos,
            Expr::FieldReference(field) => field.pos,
            Expr::WindowFunction(wf) => wf.pos,
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Ternary(Ternary),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// String concatenation `||`
    Concat,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }
}

/// CAST target types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    String,
    Integer,
    Float,
    Boolean,
    Ternary,
    Datetime,
}

/// A window function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunctionExpr {
    pub name: String,
    pub args: Vec<Expr>,
    pub distinct: bool,
    pub ignore_nulls: bool,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatusKind {
    IsOpen,
    IsInRange,
    Count,
}

/// Convenience constructors used widely by tests and hosts building ASTs
/// without a parser.
impl Expr {
    pub fn integer(i: i64) -> Self {
        Expr::Literal {
            value: LiteralValue::Integer(i),
            pos: SourcePos::unknown(),
        }
    }

    pub fn float(f: f64) -> Self {
        Expr::Literal {
            value: LiteralValue::Float(f),
            pos: SourcePos::unknown(),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal {
            value: LiteralValue::String(s.into()),
            pos: SourcePos::unknown(),
        }
    }

    pub fn null() -> Self {
        Expr::Literal {
            value: LiteralValue::Null,
            pos: SourcePos::unknown(),
        }
    }

    pub fn field(column: impl Into<String>) -> Self {
        Expr::FieldReference(FieldReference::new(column))
    }

    pub fn qualified_field(view: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::FieldReference(FieldReference::qualified(view, column))
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
            pos: SourcePos::unknown(),
        }
    }
}
