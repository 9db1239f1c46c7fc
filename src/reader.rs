//! Loads the first worksheet of an uploaded workbook into a [`SheetData`].

use crate::error::{ReportError, Result};
use crate::formula;
use crate::types::{CellValue, SheetData, SheetFormula};
use calamine::{Data, DataType, Range, Reader, Xlsx};
use chrono::NaiveDateTime;
use std::io::Cursor;

/// Reads the first sheet. Row 1 becomes the headers, every later row is data.
///
/// The grid always starts at A1, so blank leading rows or columns survive as
/// empty cells and the coordinates of the result match the source sheet.
/// Formulas in the data rows are kept next to their cached values; the ones
/// saved without a value are computed where possible.
pub fn read_workbook(bytes: &[u8]) -> Result<SheetData> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;

    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReportError::Validation("Workbook contains no sheets".to_string()))?;

    let range = workbook.worksheet_range(&name)?;
    let source_formulas = formula_cells(&workbook.worksheet_formula(&name)?);

    let end = source_formulas
        .iter()
        .map(|(row, col, _)| (*row, *col))
        .chain(range.end())
        .reduce(|a, b| (a.0.max(b.0), a.1.max(b.1)));
    let Some((end_row, end_col)) = end else {
        tracing::debug!(sheet = %name, "first sheet is empty");
        return Ok(SheetData { name, columns: Vec::new(), formulas: Vec::new() });
    };

    let mut columns = Vec::with_capacity(end_col as usize + 1);
    for col in 0..=end_col {
        let header = range
            .get_value((0, col))
            .map(to_cell_value)
            .unwrap_or(CellValue::Empty)
            .to_label();

        let values = (1..=end_row)
            .map(|row| {
                range
                    .get_value((row, col))
                    .map(to_cell_value)
                    .unwrap_or(CellValue::Empty)
            })
            .collect();

        columns.push((header, values));
    }

    let mut formulas = Vec::with_capacity(source_formulas.len());
    for (row, col, text) in source_formulas {
        if row == 0 {
            tracing::debug!(sheet = %name, formula = %text, "header formula kept as its value");
            continue;
        }
        formulas.push(SheetFormula {
            row_idx: row as usize - 1,
            col: col as usize,
            formula: text,
        });
    }

    let mut sheet = SheetData { name, columns, formulas };
    fill_uncached_formulas(&mut sheet);

    tracing::debug!(
        sheet = %sheet.name,
        rows = end_row,
        cols = end_col + 1,
        formulas = sheet.formulas.len(),
        "workbook loaded"
    );
    Ok(sheet)
}

/// Non-empty formula cells with absolute coordinates.
fn formula_cells(range: &Range<String>) -> Vec<(u32, u32, String)> {
    let Some((row0, col0)) = range.start() else {
        return Vec::new();
    };
    range
        .used_cells()
        .map(|(row, col, text)| (row0 + row as u32, col0 + col as u32, text.clone()))
        .collect()
}

/// Computes formulas that came without a cached value, repeating while a pass
/// still resolves something so chains of formulas settle.
fn fill_uncached_formulas(sheet: &mut SheetData) {
    let mut pending: Vec<(usize, usize)> = sheet
        .formulas
        .iter()
        .filter(|f| sheet.cell(f.row_idx, f.col) == &CellValue::Empty)
        .map(|f| (f.row_idx, f.col))
        .collect();

    while !pending.is_empty() {
        let solved: Vec<(usize, usize, f64)> = sheet
            .formulas
            .iter()
            .filter(|f| pending.contains(&(f.row_idx, f.col)))
            .filter_map(|f| {
                formula::evaluate(&f.formula, sheet, &pending).map(|v| (f.row_idx, f.col, v))
            })
            .collect();
        if solved.is_empty() {
            break;
        }

        for (row_idx, col, value) in solved {
            sheet.columns[col].1[row_idx] = CellValue::Number(value);
            pending.retain(|cell| *cell != (row_idx, col));
        }
    }

    for (row_idx, col) in &pending {
        tracing::debug!(row_idx, col, "formula left for the spreadsheet to compute");
    }
}

fn to_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Float(n) => CellValue::Number(*n),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(parsed) => CellValue::Date(parsed),
            None => cell.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
        },
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::String(s.clone())),
        Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::String(e.to_string()),
    }
}
