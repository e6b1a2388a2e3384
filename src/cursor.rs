//! Named cursors over materialized SELECT results.
//!
//! A cursor's query is evaluated once at OPEN with the filter active at
//! that point; FETCH then moves a zero-based position over the stored
//! view. Position -1 means "before first". ABSOLUTE positioning is
//! 0-based: `ABSOLUTE 0` addresses the first record.

use crate::ast::SelectQuery;
use crate::value::Ternary;
use crate::view::View;

/// Fetch target with scalar positions already evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFetch {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
}

#[derive(Debug, Clone)]
pub struct Cursor {
    pub query: SelectQuery,
    view: Option<View>,
    position: i64,
    fetched: bool,
}

impl Cursor {
    pub fn new(query: SelectQuery) -> Self {
        Cursor {
            query,
            view: None,
            position: -1,
            fetched: false,
        }
    }

    /// Install the materialized view and reset to before-first.
    pub fn open(&mut self, view: View) {
        self.view = Some(view);
        self.position = -1;
        self.fetched = false;
    }

    /// Discard the materialized view.
    pub fn close(&mut self) {
        self.view = None;
        self.position = -1;
        self.fetched = false;
    }

    pub fn is_open(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<&View> {
        self.view.as_ref()
    }

    /// Row count of the materialized view; None when closed.
    pub fn count(&self) -> Option<usize> {
        self.view.as_ref().map(View::record_len)
    }

    /// Whether the last fetch landed in range; Unknown before any fetch.
    pub fn is_in_range(&self) -> Ternary {
        if !self.fetched {
            return Ternary::Unknown;
        }
        let len = self.count().unwrap_or(0) as i64;
        Ternary::from_bool(0 <= self.position && self.position < len)
    }

    /// Advance the position and return the addressed record index, or
    /// None when the new position is out of range. The position saturates
    /// just past either end so NEXT/PRIOR keep working afterwards.
    pub fn fetch_index(&mut self, fetch: ResolvedFetch) -> Option<usize> {
        let len = self.count()? as i64;
        self.fetched = true;

        let target = match fetch {
            ResolvedFetch::Next => self.position + 1,
            ResolvedFetch::Prior => self.position - 1,
            ResolvedFetch::First => 0,
            ResolvedFetch::Last => len - 1,
            ResolvedFetch::Absolute(n) => n,
            ResolvedFetch::Relative(n) => self.position + n,
        };

        if target < 0 {
            self.position = -1;
            None
        } else if target >= len {
            self.position = len;
            None
        } else {
            self.position = target;
            Some(target as usize)
        }
    }
}
