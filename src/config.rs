//! Session configuration.
//!
//! Hosts load these settings however they wish (flags, files, env); the
//! engine only consumes the resolved struct. Defaults mirror a plain
//! comma-separated UTF-8 repository in the current directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Line break used when writing delimited files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineBreak {
    #[default]
    Lf,
    CrLf,
    Cr,
}

impl LineBreak {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineBreak::Lf => "\n",
            LineBreak::CrLf => "\r\n",
            LineBreak::Cr => "\r",
        }
    }
}

/// Text encoding of delimited files. Reads tolerate a UTF-8 BOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Encoding {
    #[default]
    Utf8,
}

/// Settings for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Worker thread count for parallel phases.
    pub cpu: usize,
    /// Base directory used to resolve unqualified table identifiers.
    pub repository: PathBuf,
    /// Suppress commit/rollback log lines.
    pub quiet: bool,
    /// Default field delimiter for newly loaded or created files.
    pub delimiter: char,
    /// Default encoding for newly loaded or created files.
    pub encoding: Encoding,
    /// Default line break for newly created files.
    pub line_break: LineBreak,
    /// Treat loaded files as headerless by default.
    pub no_header: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let cpu = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        SessionConfig {
            cpu,
            repository: PathBuf::from("."),
            quiet: false,
            delimiter: ',',
            encoding: Encoding::Utf8,
            line_break: LineBreak::Lf,
            no_header: false,
        }
    }
}
