//! File input/output for delimited text tables.

pub mod delimited;
