//! Output emitters. Everything here only reads the loaded tables.
pub mod json;
pub mod listing;
