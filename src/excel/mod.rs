//! Workbook import
//!
//! Turns the downloaded export into a `TabularGrid`. Format detection and
//! cell decoding are delegated to calamine; only the first sheet is read.

mod reader;

pub use reader::parse;
