//! A1 notation helpers

/// Sheet name as it must appear before `!` in an A1 range.
///
/// Plain names (ASCII letters, digits, `_`) pass through; anything else is
/// wrapped in single quotes with embedded quotes doubled.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// `<sheet>!<cells>` with the sheet name quoted as needed.
pub fn a1(sheet: &str, cells: &str) -> String {
    format!("{}!{}", quote_sheet_name(sheet), cells)
}

/// 0-based column index to its letter (0 → A, 25 → Z, 26 → AA).
pub fn column_letter(index: usize) -> String {
    let mut result = String::new();
    let mut num = index;

    loop {
        let remainder = num % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if num < 26 {
            break;
        }
        num = num / 26 - 1;
    }

    result
}
