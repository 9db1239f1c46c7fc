//! Turns an uploaded table into a decorated report: title block, charts and
//! totals, written to a fresh file per request.

pub mod charts;
pub mod title;
pub mod totals;

use crate::config::ReportOptions;
use crate::error::{ReportError, Result};
use crate::formula;
use crate::reader::read_workbook;
use crate::styles::{Formula, StyleConfig};
use crate::types::SheetData;
use crate::writer;
use crate::xml::format_number;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Rows inserted above the table: title, month, spacer.
pub const TITLE_ROWS: usize = 3;

/// Where everything lands once the title rows are in place.
/// Rows are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    pub header_row: usize,
    pub first_data_row: usize,
    pub last_data_row: usize,
    pub total_row: usize,
    pub last_col: usize,
}

impl ReportLayout {
    pub fn for_sheet(sheet: &SheetData) -> Self {
        let header_row = TITLE_ROWS + 1;
        let last_data_row = header_row + sheet.num_rows();
        ReportLayout {
            header_row,
            first_data_row: header_row + 1,
            last_data_row,
            total_row: last_data_row + 1,
            last_col: sheet.num_cols().saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReport {
    pub file_name: String,
    pub path: PathBuf,
}

pub fn validate_input(sheet: &SheetData) -> Result<()> {
    if sheet.num_cols() == 0 || sheet.num_rows() == 0 {
        return Err(ReportError::Validation(
            "The worksheet needs a header row and at least one data row".to_string(),
        ));
    }
    sheet.validate().map_err(ReportError::Validation)
}

pub fn default_month() -> String {
    Local::now().format("%B %Y").to_string()
}

/// A blank or missing label falls back to the current month.
pub fn resolve_month(month: Option<&str>) -> String {
    match month.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => default_month(),
    }
}

/// `report_{month}_{YYYYmmdd_HHMMSS}_{8 hex}.xlsx`, month reduced to `[A-Za-z0-9_-]`.
pub fn report_file_name(month: &str, now: DateTime<Local>) -> String {
    let month: String = month
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("report_{}_{}_{}.xlsx", month, now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Decorations for `sheet`, in order: title rows, charts, totals.
pub fn build_report(sheet: &SheetData, month: &str, options: &ReportOptions) -> Result<StyleConfig> {
    validate_input(sheet)?;
    let layout = ReportLayout::for_sheet(sheet);

    let mut config = StyleConfig {
        table_origin_row: layout.header_row,
        styled_headers: options.styled_headers,
        auto_width: options.auto_width,
        ..Default::default()
    };

    title::apply_title(&mut config, &layout, options, month)?;
    carry_formulas(&mut config, sheet, &layout);
    config.charts = charts::build_charts(sheet, &layout, options);
    totals::apply_totals(&mut config, sheet, &layout, options);

    Ok(config)
}

/// Re-emits the source formulas at their shifted cells, with references moved
/// below the title rows and numeric results as cached values.
fn carry_formulas(config: &mut StyleConfig, sheet: &SheetData, layout: &ReportLayout) {
    let mut ryu_buf = ryu::Buffer::new();
    for f in &sheet.formulas {
        config.formulas.push(Formula {
            row: layout.first_data_row + f.row_idx,
            col: f.col,
            formula: formula::shift_rows(&f.formula, &sheet.name, TITLE_ROWS),
            cached_value: sheet
                .cell(f.row_idx, f.col)
                .as_number()
                .map(|n| format_number(n, &mut ryu_buf)),
        });
    }
}

/// Reads `input`, decorates the first sheet and saves it under `out_dir`.
/// Nothing is left behind on failure.
pub fn generate_report(
    input: &[u8],
    month: Option<&str>,
    options: &ReportOptions,
    out_dir: &Path,
    render_threads: usize,
) -> Result<GeneratedReport> {
    let sheet = read_workbook(input)?;
    let month = resolve_month(month);
    let config = build_report(&sheet, &month, options)?;

    let file_name = report_file_name(&month, Local::now());
    let path = out_dir.join(&file_name);
    writer::write_workbook(&sheet, &config, &path, render_threads)?;

    tracing::info!(
        report = %file_name,
        rows = sheet.num_rows(),
        charts = config.charts.len(),
        "report generated"
    );
    Ok(GeneratedReport { file_name, path })
}
