/// Pre-write validation and safe file output
use crate::chart::{ChartPosition, ExcelChart};
use crate::error::ReportError;
use crate::styles::*;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

// Spreadsheet hard limits
pub const MAX_ROWS: usize = 1_048_576;
pub const MAX_COLS: usize = 16_384;
const MAX_SHEET_NAME_LEN: usize = 31;
const MAX_ROW_HEIGHT: f64 = 409.5;
const MAX_COL_WIDTH: f64 = 255.0;
const INVALID_SHEET_CHARS: &str = "[]:*?/\\";

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
    }

    pub fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    pub fn into_result(self) -> Result<(), ReportError> {
        for warning in &self.warnings {
            tracing::warn!("{}", warning);
        }

        if self.is_valid() {
            Ok(())
        } else {
            Err(ReportError::Validation(format!(
                "Validation failed with {} errors:\n{}",
                self.errors.len(),
                self.errors.join("\n")
            )))
        }
    }
}

/// Escape sheet names for use in formulas
/// Example: "My Sheet" -> "'My Sheet'"
///          "Quote's Sheet" -> "'Quote''s Sheet'"
///          "Q1" -> "'Q1'" (reads as a cell reference otherwise)
pub fn escape_sheet_name_for_formula(name: &str) -> String {
    let needs_quoting = name.chars().any(|c| !c.is_alphanumeric() && c != '_')
        || name.starts_with(|c: char| c.is_ascii_digit())
        || crate::formula::parse_a1_cell(name).is_some()
        || is_r1c1_reference(name);

    if needs_quoting {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

/// `R`, `C`, `RC`, `R2`, `C3`, `R2C3` in any case.
fn is_r1c1_reference(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let rest = upper.strip_prefix('R').unwrap_or(&upper);
    let (row_digits, rest) = rest.split_at(rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len()));
    if rest.is_empty() {
        return upper.starts_with('R');
    }
    if !row_digits.is_empty() && !upper.starts_with('R') {
        return false;
    }
    match rest.strip_prefix('C') {
        Some(col_digits) => col_digits.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

pub fn validate_sheet_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Sheet name cannot be empty".to_string());
    }

    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(format!(
            "Sheet name '{}' exceeds {} characters (has {})",
            name,
            MAX_SHEET_NAME_LEN,
            name.chars().count()
        ));
    }

    for c in INVALID_SHEET_CHARS.chars() {
        if name.contains(c) {
            return Err(format!(
                "Sheet name '{}' contains invalid character '{}'",
                name, c
            ));
        }
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(format!("Sheet name '{}' contains control characters", name));
    }

    Ok(())
}

/// Rows are 1-based, columns 0-based.
pub fn validate_cell_coords(row: usize, col: usize, context: &str) -> Result<(), String> {
    if row == 0 || row > MAX_ROWS {
        return Err(format!(
            "{}: Row {} is out of range (must be 1-{})",
            context, row, MAX_ROWS
        ));
    }

    if col >= MAX_COLS {
        return Err(format!(
            "{}: Column {} is out of range (must be 0-{})",
            context,
            col,
            MAX_COLS - 1
        ));
    }

    Ok(())
}

pub fn validate_merge_range(merge: &MergeRange, max_row: usize, max_col: usize) -> Result<(), String> {
    if merge.start_row > merge.end_row {
        return Err(format!(
            "Merge cell: start_row {} > end_row {}",
            merge.start_row, merge.end_row
        ));
    }

    if merge.start_col > merge.end_col {
        return Err(format!(
            "Merge cell: start_col {} > end_col {}",
            merge.start_col, merge.end_col
        ));
    }

    validate_cell_coords(merge.start_row, merge.start_col, "Merge cell start")?;
    validate_cell_coords(merge.end_row, merge.end_col, "Merge cell end")?;

    if merge.end_row > max_row {
        return Err(format!(
            "Merge cell end_row {} exceeds sheet rows {}",
            merge.end_row, max_row
        ));
    }

    if merge.end_col >= max_col {
        return Err(format!(
            "Merge cell end_col {} exceeds sheet columns {}",
            merge.end_col, max_col
        ));
    }

    Ok(())
}

pub fn validate_merge_overlaps(merges: &[MergeRange]) -> Result<(), String> {
    for (i, m1) in merges.iter().enumerate() {
        for m2 in merges.iter().skip(i + 1) {
            if ranges_overlap(m1, m2) {
                return Err(format!(
                    "Merge ranges overlap: ({},{} to {},{}) and ({},{} to {},{})",
                    m1.start_row, m1.start_col, m1.end_row, m1.end_col,
                    m2.start_row, m2.start_col, m2.end_row, m2.end_col
                ));
            }
        }
    }
    Ok(())
}

fn ranges_overlap(m1: &MergeRange, m2: &MergeRange) -> bool {
    !(m1.end_row < m2.start_row
        || m1.start_row > m2.end_row
        || m1.end_col < m2.start_col
        || m1.start_col > m2.end_col)
}

pub fn validate_chart(chart: &ExcelChart, max_row: usize, max_col: usize) -> Result<(), String> {
    let (start_row, start_col, end_row, end_col) = chart.data_range;

    validate_cell_coords(start_row, start_col, "Chart data start")?;
    validate_cell_coords(end_row, end_col, "Chart data end")?;

    if start_row > end_row || start_col > end_col {
        return Err("Chart: invalid data range".to_string());
    }

    if end_row > max_row || end_col >= max_col {
        return Err("Chart: data range exceeds sheet bounds".to_string());
    }

    if let Some(cat_col) = chart.category_col {
        if cat_col >= max_col {
            return Err(format!(
                "Chart: category_col {} is outside the sheet's {} columns",
                cat_col, max_col
            ));
        }
    }

    if chart.series.is_empty() {
        return Err("Chart: no data series".to_string());
    }

    let pos = &chart.position;
    validate_cell_coords(pos.from_row, pos.from_col, "Chart anchor")?;
    if pos.to_row <= pos.from_row || pos.to_col <= pos.from_col {
        return Err("Chart: anchor has no area".to_string());
    }

    Ok(())
}

fn anchors_overlap(a: &ChartPosition, b: &ChartPosition) -> bool {
    a.from_row < b.to_row && b.from_row < a.to_row && a.from_col < b.to_col && b.from_col < a.to_col
}

/// Charts may neither cover written cells (rows `1..=last_row`, columns
/// `0..=last_col`) nor each other.
pub fn validate_chart_anchors(
    charts: &[ExcelChart],
    last_row: usize,
    last_col: usize,
) -> Result<(), String> {
    let occupied = ChartPosition {
        from_col: 0,
        from_row: 1,
        to_col: last_col + 1,
        to_row: last_row + 1,
    };

    for (i, chart) in charts.iter().enumerate() {
        if anchors_overlap(&chart.position, &occupied) {
            return Err(format!("Chart {} covers cells that hold data", i));
        }
        for (j, other) in charts.iter().enumerate().skip(i + 1) {
            if anchors_overlap(&chart.position, &other.position) {
                return Err(format!("Charts {} and {} overlap", i, j));
            }
        }
    }
    Ok(())
}

pub fn validate_row_heights(heights: &HashMap<usize, f64>) -> Result<(), String> {
    for (row, height) in heights {
        if *row == 0 || *row > MAX_ROWS {
            return Err(format!("Row height: row {} out of range", row));
        }

        if *height < 0.0 || *height > MAX_ROW_HEIGHT {
            return Err(format!(
                "Row {}: height {} out of range (0-{})",
                row, height, MAX_ROW_HEIGHT
            ));
        }
    }
    Ok(())
}

pub fn validate_column_widths(widths: &HashMap<usize, f64>) -> Result<(), String> {
    for (col, width) in widths {
        if *width < 0.0 || *width > MAX_COL_WIDTH {
            return Err(format!(
                "Column {}: width {} out of range (0-{})",
                col, width, MAX_COL_WIDTH
            ));
        }
    }
    Ok(())
}

/// `max_row`/`max_col` bound the written area (last 1-based row, column count).
pub fn validate_style_config(config: &StyleConfig, max_row: usize, max_col: usize) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.table_origin_row == 0 {
        result.add_error("Table origin row must be 1 or greater".to_string());
    }

    for (idx, merge) in config.merge_cells.iter().enumerate() {
        if let Err(e) = validate_merge_range(merge, max_row, max_col) {
            result.add_error(format!("Merge cell {}: {}", idx, e));
        }
    }

    if let Err(e) = validate_merge_overlaps(&config.merge_cells) {
        result.add_error(e);
    }

    for (idx, chart) in config.charts.iter().enumerate() {
        if let Err(e) = validate_chart(chart, max_row, max_col) {
            result.add_error(format!("Chart {}: {}", idx, e));
        }
    }

    if let Err(e) = validate_chart_anchors(&config.charts, max_row, max_col.saturating_sub(1)) {
        result.add_error(e);
    }

    if let Some(ref heights) = config.row_heights {
        if let Err(e) = validate_row_heights(heights) {
            result.add_error(e);
        }
    }

    if let Some(ref widths) = config.column_widths {
        if let Err(e) = validate_column_widths(widths) {
            result.add_error(e);
        }
    }

    for (idx, style) in config.cell_styles.iter().enumerate() {
        if let Err(e) = validate_cell_coords(style.row, style.col, &format!("Cell style {}", idx)) {
            result.add_error(e);
        }
    }

    for (idx, cell) in config.cells.iter().enumerate() {
        if let Err(e) = validate_cell_coords(cell.row, cell.col, &format!("Cell {}", idx)) {
            result.add_error(e);
        }
    }

    for (idx, formula) in config.formulas.iter().enumerate() {
        if let Err(e) = validate_cell_coords(formula.row, formula.col, &format!("Formula {}", idx)) {
            result.add_error(e);
        }

        if formula.formula.trim_start_matches('=').is_empty() {
            result.add_error(format!("Formula {}: formula string cannot be empty", idx));
        }

        if config.cells.iter().any(|c| c.row == formula.row && c.col == formula.col) {
            result.add_warning(format!(
                "Formula {}: cell ({},{}) also has a literal value - the formula wins",
                idx, formula.row, formula.col
            ));
        }
    }

    result
}

/// Atomic file writing with rollback on error
pub fn write_file_atomic<F>(path: &Path, write_fn: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut fs::File) -> Result<(), ReportError>,
{
    if path.as_os_str().is_empty() {
        return Err(ReportError::Validation("Filename cannot be empty".to_string()));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ReportError::Validation(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }

    // Temporary file in the same directory so the rename stays atomic
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(format!(".tmp.{}", std::process::id()));
    let temp_path = Path::new(&temp_name);

    let write_result = (|| -> Result<(), ReportError> {
        let mut temp_file = fs::File::create(temp_path)?;
        write_fn(&mut temp_file)?;
        temp_file.flush()?;
        temp_file.sync_all()?;
        Ok(())
    })();

    match write_result {
        Ok(()) => {
            fs::rename(temp_path, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(temp_path);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartSeries, ChartType, DataRef};

    fn chart_at(from_row: usize, from_col: usize) -> ExcelChart {
        let mut chart = ExcelChart::new(
            ChartType::Bar,
            (4, 1, 6, 1),
            ChartPosition { from_col, from_row, to_col: from_col + 8, to_row: from_row + 15 },
        );
        chart.series.push(ChartSeries {
            name: None,
            categories: None,
            values: DataRef { formula: "Sheet1!$B$5:$B$6".to_string(), cache: vec![Some(1.0), Some(2.0)] },
        });
        chart
    }

    #[test]
    fn test_escape_sheet_name() {
        assert_eq!(escape_sheet_name_for_formula("Sheet1"), "Sheet1");
        assert_eq!(escape_sheet_name_for_formula("My Sheet"), "'My Sheet'");
        assert_eq!(escape_sheet_name_for_formula("Quote's"), "'Quote''s'");
        assert_eq!(escape_sheet_name_for_formula("Sheet!"), "'Sheet!'");
        assert_eq!(escape_sheet_name_for_formula("Sales_2024"), "Sales_2024");
    }

    #[test]
    fn test_escape_reference_like_sheet_names() {
        for name in ["Q1", "FY24", "xfd1048576", "2024", "1st", "R", "c", "RC", "R2", "C3", "r1c1"] {
            assert_eq!(escape_sheet_name_for_formula(name), format!("'{}'", name), "{name}");
        }
        for name in ["Sheet1", "XFE1", "Region", "RC2D", "CR1", "Q0"] {
            assert_eq!(escape_sheet_name_for_formula(name), name, "{name}");
        }
    }

    #[test]
    fn test_validate_sheet_name() {
        assert!(validate_sheet_name("Sheet1").is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name(&"A".repeat(32)).is_err());
        assert!(validate_sheet_name("Invalid:Name").is_err());
    }

    #[test]
    fn test_merge_overlap() {
        let m1 = MergeRange { start_row: 1, start_col: 0, end_row: 3, end_col: 2 };
        let m2 = MergeRange { start_row: 2, start_col: 1, end_row: 4, end_col: 3 };
        assert!(ranges_overlap(&m1, &m2));

        let m3 = MergeRange { start_row: 5, start_col: 0, end_row: 7, end_col: 2 };
        assert!(!ranges_overlap(&m1, &m3));
    }

    #[test]
    fn test_cell_coords_overflow() {
        assert!(validate_cell_coords(MAX_ROWS + 1, 0, "test").is_err());
        assert!(validate_cell_coords(1, MAX_COLS, "test").is_err());
        assert!(validate_cell_coords(0, 0, "test").is_err());
        assert!(validate_cell_coords(1, 0, "test").is_ok());
    }

    #[test]
    fn test_chart_anchors() {
        // Data occupies A1:C7.
        assert!(validate_chart_anchors(&[chart_at(9, 1), chart_at(9, 10)], 7, 2).is_ok());
        assert!(validate_chart_anchors(&[chart_at(5, 1)], 7, 2).is_err());
        assert!(validate_chart_anchors(&[chart_at(5, 3)], 7, 2).is_ok());
        assert!(validate_chart_anchors(&[chart_at(9, 1), chart_at(12, 4)], 7, 2).is_err());
    }

    #[test]
    fn test_style_config_reports_all_errors() {
        let mut config = StyleConfig::default();
        config.merge_cells.push(MergeRange { start_row: 1, start_col: 0, end_row: 1, end_col: 9 });
        config.formulas.push(Formula { row: 0, col: 0, formula: "=".to_string(), cached_value: None });

        let result = validate_style_config(&config, 5, 3);
        assert_eq!(result.errors.len(), 3);
        assert!(result.into_result().is_err());
    }

    #[test]
    fn test_atomic_write_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.xlsx");
        std::fs::write(&target, b"old").unwrap();

        write_file_atomic(&target, |file| {
            file.write_all(b"new")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new");

        let failed = write_file_atomic(&target, |_| Err(ReportError::Zip("boom".to_string())));
        assert!(failed.is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
