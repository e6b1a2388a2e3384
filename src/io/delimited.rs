//! Delimited text reading and writing.
//!
//! Implements the file-format contract: configurable single-character
//! delimiter, LF/CR/CRLF line breaks, optional header row, and quoting.
//! A value is quoted when it contains the delimiter, a quote, or a line
//! break; embedded quotes are doubled.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{QueryError, SourcePos};
use crate::record::Record;
use crate::value::Value;
use crate::view::{FileInfo, HeaderField, View};

const UTF8_BOM: &str = "\u{feff}";

/// Parse delimited text into rows of string fields.
///
/// Handles quoted fields with doubled embedded quotes and accepts LF, CR,
/// and CRLF line breaks interchangeably on read.
pub fn parse(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' if field.is_empty() && !field_started => {
                in_quotes = true;
                field_started = true;
            }
            c if c == delimiter => {
                row.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                field_started = false;
            }
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                field_started = false;
            }
            c => {
                field.push(c);
                field_started = true;
            }
        }
    }
    if field_started || !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Quote a single field for writing when it needs it.
fn encode_field(value: &str, delimiter: char) -> String {
    let needs_quotes =
        value.contains(delimiter) || value.contains('"') || value.contains('\n') || value.contains('\r');
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render a view as delimited text, header first unless suppressed.
pub fn encode(view: &View, info: &FileInfo) -> String {
    let line_break = info.line_break.as_str();
    let mut out = String::new();
    if !info.no_header {
        let header: Vec<String> = view
            .header
            .iter()
            .filter(|f| !f.is_internal_id())
            .map(|f| encode_field(&f.column, info.delimiter))
            .collect();
        out.push_str(&header.join(&info.delimiter.to_string()));
        out.push_str(line_break);
    }
    for record in &view.records {
        let fields: Vec<String> = view
            .header
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_internal_id())
            .map(|(i, _)| {
                let value = record.cell(i).map(|c| c.value().clone()).unwrap_or(Value::Null);
                match value {
                    Value::Null => String::new(),
                    other => encode_field(&other.to_string(), info.delimiter),
                }
            })
            .collect();
        out.push_str(&fields.join(&info.delimiter.to_string()));
        out.push_str(line_break);
    }
    out
}

/// Load a file into a view. Every field is read as a string; typing
/// happens on demand in comparisons. Headerless files get `c1..cN` column
/// names from the widest row.
pub fn read_view(path: &Path, view_name: &str, info: FileInfo) -> Result<View, QueryError> {
    let pos = SourcePos::unknown();
    let mut text = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut text))
        .map_err(|e| QueryError::io(e, pos))?;

    let mut rows = parse(&text, info.delimiter);
    let columns: Vec<String> = if info.no_header {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        (1..=width).map(|i| format!("c{}", i)).collect()
    } else {
        if rows.is_empty() {
            return Err(QueryError::IoError {
                message: format!("file {} has no header line", path.display()),
                pos,
            });
        }
        rows.remove(0)
    };

    let header: Vec<HeaderField> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| HeaderField::new(view_name, name.clone(), i as u32 + 1))
        .collect();

    let width = header.len();
    let records = rows
        .into_iter()
        .map(|mut fields| {
            fields.resize(width, String::new());
            fields.truncate(width);
            Record::from_values(fields.into_iter().map(Value::String).collect())
        })
        .collect();

    let mut view = View::with_header(header);
    view.records = records;
    view.file_info = Some(info);
    view.validate_header(pos)?;
    Ok(view)
}

/// Rewrite an open file handle with the view's current contents.
pub fn write_view(file: &mut File, view: &View, info: &FileInfo) -> Result<(), QueryError> {
    let pos = SourcePos::unknown();
    let text = encode(view, info);
    file.set_len(0).map_err(|e| QueryError::io(e, pos))?;
    std::io::Seek::seek(file, std::io::SeekFrom::Start(0)).map_err(|e| QueryError::io(e, pos))?;
    file.write_all(text.as_bytes()).map_err(|e| QueryError::io(e, pos))?;
    file.flush().map_err(|e| QueryError::io(e, pos))
}
