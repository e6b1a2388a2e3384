//! In-memory views: header fields, records, and file metadata.
//!
//! A [`View`] is the unit every pipeline stage consumes and produces,
//! whether it is backed by a file, a temporary declaration, or a subquery.

use std::path::{Path, PathBuf};

use crate::config::{Encoding, LineBreak, SessionConfig};
use crate::error::{QueryError, SourcePos};
use crate::record::Record;

/// Hidden column carrying the source record index of views loaded for
/// mutation. Never matches a user field reference and is excluded from
/// wildcard expansion.
pub const INTERNAL_ID_COLUMN: &str = "@__internal_id";

/// One column of a view's header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderField {
    /// Qualifier the column is addressed through (table name or alias);
    /// empty for computed columns without one.
    pub view_name: String,
    pub column: String,
    pub aliases: Vec<String>,
    /// 1-based, unique within the view qualifier.
    pub number: u32,
    pub is_from_table: bool,
    pub is_join_key: bool,
    pub is_group_key: bool,
}

impl HeaderField {
    pub fn new(view_name: impl Into<String>, column: impl Into<String>, number: u32) -> Self {
        HeaderField {
            view_name: view_name.into(),
            column: column.into(),
            aliases: Vec::new(),
            number,
            is_from_table: true,
            is_join_key: false,
            is_group_key: false,
        }
    }

    /// A computed column (select expression result, window column).
    pub fn computed(column: impl Into<String>) -> Self {
        HeaderField {
            view_name: String::new(),
            column: column.into(),
            aliases: Vec::new(),
            number: 0,
            is_from_table: false,
            is_join_key: false,
            is_group_key: false,
        }
    }

    pub fn is_internal_id(&self) -> bool {
        self.column == INTERNAL_ID_COLUMN
    }

    fn matches_name(&self, name: &str) -> bool {
        self.column.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    fn matches_view(&self, view: &str) -> bool {
        self.view_name.eq_ignore_ascii_case(view)
    }
}

/// File metadata of a view. Identity key is the uppercased absolute path;
/// temporary views use their declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub delimiter: char,
    pub encoding: Encoding,
    pub line_break: LineBreak,
    pub no_header: bool,
    pub is_temporary: bool,
}

impl FileInfo {
    pub fn for_file(path: PathBuf, config: &SessionConfig) -> Self {
        FileInfo {
            path,
            delimiter: config.delimiter,
            encoding: config.encoding,
            line_break: config.line_break,
            no_header: config.no_header,
            is_temporary: false,
        }
    }

    pub fn temporary(name: &str) -> Self {
        FileInfo {
            path: PathBuf::from(name),
            delimiter: ',',
            encoding: Encoding::Utf8,
            line_break: LineBreak::Lf,
            no_header: false,
            is_temporary: true,
        }
    }

    /// Canonical cache key.
    pub fn key(&self) -> String {
        file_key(&self.path)
    }
}

/// Canonical identity key for a file path.
pub fn file_key(path: &Path) -> String {
    path.to_string_lossy().to_uppercase()
}

/// An in-memory table: ordered header plus ordered record set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct View {
    pub header: Vec<HeaderField>,
    pub records: Vec<Record>,
    pub file_info: Option<FileInfo>,
    pub for_update: bool,
    pub operated_records: usize,
    pub operated_fields: usize,
    pub use_internal_id: bool,
}

impl View {
    /// A view with the given header and no records.
    pub fn with_header(header: Vec<HeaderField>) -> Self {
        View {
            header,
            ..View::default()
        }
    }

    /// A view over named columns of a single source, e.g. a temporary
    /// declaration or a subquery result.
    pub fn from_columns(view_name: &str, columns: &[String]) -> Self {
        let header = columns
            .iter()
            .enumerate()
            .map(|(i, name)| HeaderField::new(view_name, name.clone(), i as u32 + 1))
            .collect();
        View::with_header(header)
    }

    pub fn record_len(&self) -> usize {
        self.records.len()
    }

    pub fn field_len(&self) -> usize {
        self.header.len()
    }

    /// Resolve a field reference to a header index.
    ///
    /// Matching is case-insensitive over column names and aliases; a view
    /// qualifier restricts the search. The hidden internal-id column never
    /// matches by name.
    pub fn field_index(
        &self,
        view: Option<&str>,
        name: &str,
        pos: SourcePos,
    ) -> Result<usize, QueryError> {
        let mut found: Option<usize> = None;
        for (i, field) in self.header.iter().enumerate() {
            if field.is_internal_id() {
                continue;
            }
            if let Some(qualifier) = view {
                if !field.matches_view(qualifier) {
                    continue;
                }
            }
            if field.matches_name(name) {
                if found.is_some() {
                    return Err(QueryError::FieldAmbiguous {
                        field: display_field(view, name),
                        pos,
                    });
                }
                found = Some(i);
            }
        }
        found.ok_or_else(|| QueryError::field_not_exist(display_field(view, name), pos))
    }

    /// Resolve a 1-based column number within a view qualifier.
    pub fn field_index_by_number(
        &self,
        view: &str,
        number: u32,
        pos: SourcePos,
    ) -> Result<usize, QueryError> {
        self.header
            .iter()
            .position(|f| f.matches_view(view) && f.number == number && !f.is_internal_id())
            .ok_or_else(|| {
                QueryError::field_not_exist(format!("{}.{}", view, number), pos)
            })
    }

    /// Index of the internal-id column belonging to a view qualifier.
    pub fn internal_id_index(&self, view: &str) -> Option<usize> {
        self.header
            .iter()
            .position(|f| f.is_internal_id() && f.matches_view(view))
    }

    /// Enforce the header invariant: no two fields share a
    /// case-insensitive column name under the same view qualifier.
    pub fn validate_header(&self, pos: SourcePos) -> Result<(), QueryError> {
        for (i, field) in self.header.iter().enumerate() {
            if field.is_internal_id() {
                continue;
            }
            for other in &self.header[i + 1..] {
                if other.is_internal_id() {
                    continue;
                }
                if field.matches_view(&other.view_name) && field.matches_name(&other.column) {
                    return Err(QueryError::FieldNameDuplicate {
                        field: other.column.clone(),
                        pos,
                    });
                }
            }
        }
        Ok(())
    }

    /// Header indices expanded by `*` or `view.*`, excluding internal ids.
    pub fn expand_all_columns(&self, view: Option<&str>) -> Vec<usize> {
        self.header
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_internal_id())
            .filter(|(_, f)| view.map(|v| f.matches_view(v)).unwrap_or(true))
            .map(|(i, _)| i)
            .collect()
    }

    /// True when any record carries grouped cells.
    pub fn is_grouped(&self) -> bool {
        self.records.first().map(|r| r.group_len() > 1).unwrap_or(false)
    }
}

fn display_field(view: Option<&str>, name: &str) -> String {
    match view {
        Some(v) => format!("{}.{}", v, name),
        None => name.to_string(),
    }
}
