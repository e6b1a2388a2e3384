//! Records and cells.
//!
//! A [`Record`] is an ordered sequence of [`Cell`]s. A cell normally holds
//! exactly one value; after GROUP BY it holds every value of the group for
//! that column, and aggregate evaluation iterates the group through the
//! filter's field-reference index.

use crate::value::{Value, serialize_key};

/// One column position within a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell(Vec<Value>);

impl Cell {
    pub fn new(value: Value) -> Self {
        Cell(vec![value])
    }

    /// A grouped cell carrying every value of a group member column.
    pub fn grouped(values: Vec<Value>) -> Self {
        Cell(values)
    }

    /// The cell's primary value (first of the sequence).
    pub fn value(&self) -> &Value {
        self.0.first().unwrap_or(&Value::Null)
    }

    /// Value at a within-group index, NULL when past the end.
    pub fn at(&self, index: usize) -> &Value {
        self.0.get(index).unwrap_or(&Value::Null)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// An ordered sequence of cells; the engine guarantees the cell count
/// matches the owning view's header length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Vec<Cell>);

impl Record {
    pub fn new(cells: Vec<Cell>) -> Self {
        Record(cells)
    }

    /// A record of single-valued cells.
    pub fn from_values(values: Vec<Value>) -> Self {
        Record(values.into_iter().map(Cell::new).collect())
    }

    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, cell: Cell) {
        self.0.push(cell);
    }

    pub fn insert(&mut self, index: usize, cell: Cell) {
        self.0.insert(index, cell);
    }

    pub fn remove(&mut self, index: usize) -> Cell {
        self.0.remove(index)
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if let Some(cell) = self.0.get_mut(index) {
            *cell = Cell::new(value);
        }
    }

    /// Group size of a grouped record (1 for base records).
    pub fn group_len(&self) -> usize {
        self.0.iter().map(Cell::len).max().unwrap_or(0)
    }

    /// Serialized comparison key over the primary values of every cell,
    /// used for DISTINCT, set operations, and recursion termination.
    pub fn serialize(&self) -> String {
        let values: Vec<Value> = self.0.iter().map(|c| c.value().clone()).collect();
        serialize_key(&values)
    }
}

impl FromIterator<Cell> for Record {
    fn from_iter<T: IntoIterator<Item = Cell>>(iter: T) -> Self {
        Record(iter.into_iter().collect())
    }
}
