//! Workbook parsing against real xlsx bytes

use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;
use stock_sync::error::ParseError;
use stock_sync::excel;
use stock_sync::CellValue;

fn stock_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Veículos").unwrap();

    let header = ["Placa", "Modelo", "Ano", "Preço", "Disponível"];
    for (col, title) in header.iter().enumerate() {
        sheet.write_string(0, col as u16, *title).unwrap();
    }

    let rows = [
        ("ABC1D23", "Fiat Uno", 2019.0, 38900.0, true),
        ("XYZ9K88", "VW Gol", 2021.0, 52500.5, false),
        ("QWE4R56", "Chevrolet Onix", 2022.0, 71990.0, true),
    ];
    for (i, (plate, model, year, price, available)) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        sheet.write_string(r, 0, *plate).unwrap();
        sheet.write_string(r, 1, *model).unwrap();
        sheet.write_number(r, 2, *year).unwrap();
        sheet.write_number(r, 3, *price).unwrap();
        sheet.write_boolean(r, 4, *available).unwrap();
    }

    workbook.save_to_buffer().unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// STOCK EXPORT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_header_and_three_rows_give_four_rows() {
    let grid = excel::parse(&stock_workbook()).unwrap();

    assert_eq!(grid.row_count(), 4);
    assert_eq!(grid.width(), 5);
    assert_eq!(
        grid.rows[0],
        vec![
            CellValue::from("Placa"),
            CellValue::from("Modelo"),
            CellValue::from("Ano"),
            CellValue::from("Preço"),
            CellValue::from("Disponível"),
        ]
    );
    assert_eq!(
        grid.rows[2],
        vec![
            CellValue::from("XYZ9K88"),
            CellValue::from("VW Gol"),
            CellValue::Number(2021.0),
            CellValue::Number(52500.5),
            CellValue::Bool(false),
        ]
    );
}

#[test]
fn test_parse_is_deterministic() {
    let bytes = stock_workbook();
    let first = excel::parse(&bytes).unwrap();
    let second = excel::parse(&bytes).unwrap();
    assert_eq!(first, second);
}

// ═══════════════════════════════════════════════════════════════════════════
// SHEET SELECTION AND BLANKS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_first_sheet_by_position_wins() {
    let mut workbook = Workbook::new();
    let first = workbook.add_worksheet();
    first.set_name("Zeta").unwrap();
    first.write_string(0, 0, "from first").unwrap();
    let second = workbook.add_worksheet();
    second.set_name("Alpha").unwrap();
    second.write_string(0, 0, "from second").unwrap();
    let bytes = workbook.save_to_buffer().unwrap();

    let grid = excel::parse(&bytes).unwrap();
    assert_eq!(grid.rows, vec![vec![CellValue::from("from first")]]);
}

#[test]
fn test_blank_cells_stay_blank_and_rows_keep_their_length() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Placa").unwrap();
    sheet.write_string(0, 2, "Ano").unwrap();
    sheet.write_string(1, 0, "ABC1D23").unwrap();
    let bytes = workbook.save_to_buffer().unwrap();

    let grid = excel::parse(&bytes).unwrap();
    assert_eq!(
        grid.rows,
        vec![
            vec![CellValue::from("Placa"), CellValue::Blank, CellValue::from("Ano")],
            vec![CellValue::from("ABC1D23")],
        ]
    );
}

#[test]
fn test_data_not_starting_at_a1_keeps_position() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(1, 1, "Placa").unwrap();
    let bytes = workbook.save_to_buffer().unwrap();

    let grid = excel::parse(&bytes).unwrap();
    assert_eq!(
        grid.rows,
        vec![vec![], vec![CellValue::Blank, CellValue::from("Placa")]]
    );
}

#[test]
fn test_empty_sheet_gives_blank_grid() {
    let mut workbook = Workbook::new();
    workbook.add_worksheet();
    let bytes = workbook.save_to_buffer().unwrap();

    assert!(excel::parse(&bytes).unwrap().is_blank());
}

#[test]
fn test_formula_like_text_is_not_evaluated() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "=SUM(A2:A3)").unwrap();
    let bytes = workbook.save_to_buffer().unwrap();

    let grid = excel::parse(&bytes).unwrap();
    assert_eq!(grid.rows, vec![vec![CellValue::from("=SUM(A2:A3)")]]);
}

// ═══════════════════════════════════════════════════════════════════════════
// MALFORMED INPUT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_truncated_workbook_is_parse_error() {
    let bytes = stock_workbook();
    let result = excel::parse(&bytes[..bytes.len() / 2]);
    assert!(matches!(result, Err(ParseError::Workbook(_))));
}

#[test]
fn test_empty_bytes_is_parse_error() {
    assert!(excel::parse(&[]).is_err());
}
