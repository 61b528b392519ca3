//! Workbook reader - downloaded export bytes → `TabularGrid`

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::types::{CellValue, TabularGrid};

/// Parse a workbook and return the first worksheet (by position) as a grid.
///
/// Values are passed through as the file encodes them: dates stay serial
/// numbers, blanks stay blank. Cell positions are kept relative to A1, so a
/// sheet whose used range starts at B3 yields two blank leading rows and a
/// blank leading cell on every row. Trailing blank cells and trailing empty
/// rows are dropped.
pub fn parse(bytes: &[u8]) -> Result<TabularGrid, ParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ParseError::Workbook(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    if sheet_names.len() > 1 {
        warn!(
            sheets = ?sheet_names,
            "workbook has several sheets; only the first one is exported"
        );
    }

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::NoWorksheet)?
        .map_err(|e| ParseError::Workbook(e.to_string()))?;

    let grid = grid_from_range(&range);
    debug!(
        sheet = sheet_names.first().map(String::as_str).unwrap_or(""),
        rows = grid.row_count(),
        width = grid.width(),
        "parsed worksheet"
    );
    Ok(grid)
}

/// Convert a calamine range into a grid anchored at A1.
fn grid_from_range(range: &Range<Data>) -> TabularGrid {
    let Some((start_row, start_col)) = range.start() else {
        return TabularGrid::default();
    };
    if range.is_empty() {
        return TabularGrid::default();
    }

    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); start_row as usize];

    for source in range.rows() {
        let mut row: Vec<CellValue> = vec![CellValue::Blank; start_col as usize];
        row.extend(source.iter().map(convert_cell));
        trim_trailing_blanks(&mut row);
        rows.push(row);
    }

    while rows.last().is_some_and(Vec::is_empty) {
        rows.pop();
    }

    TabularGrid::new(rows)
}

/// Map a calamine cell to a raw value, without coercion.
fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Blank,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        // Serial date number, as stored in the file
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

fn trim_trailing_blanks(row: &mut Vec<CellValue>) {
    while row.last().is_some_and(CellValue::is_blank) {
        row.pop();
    }
}
