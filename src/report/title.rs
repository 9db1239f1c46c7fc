use super::{ReportLayout, TITLE_ROWS};
use crate::config::ReportOptions;
use crate::error::{ReportError, Result};
use crate::styles::*;
use crate::types::CellValue;

const TITLE_ROW_HEIGHT: f64 = 30.0;

/// Accepts `RRGGBB` or `AARRGGBB`; returns the 8-digit form.
pub fn normalize_argb(color: &str) -> Result<String> {
    let color = color.trim().trim_start_matches('#');
    if !color.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ReportError::Validation(format!("Invalid fill color '{}'", color)));
    }
    match color.len() {
        6 => Ok(format!("FF{}", color.to_ascii_uppercase())),
        8 => Ok(color.to_ascii_uppercase()),
        _ => Err(ReportError::Validation(format!("Invalid fill color '{}'", color))),
    }
}

/// Title in row 1, month in row 2, spacer in row 3, all on a solid fill.
pub fn apply_title(
    config: &mut StyleConfig,
    layout: &ReportLayout,
    options: &ReportOptions,
    month: &str,
) -> Result<()> {
    let fill = FillStyle::solid(&normalize_argb(&options.title_fill)?);

    config.cells.push(CellEntry {
        row: 1,
        col: 0,
        value: CellValue::String(options.title.clone()),
    });
    config.cells.push(CellEntry {
        row: 2,
        col: 0,
        value: CellValue::String(month.to_string()),
    });

    if layout.last_col > 0 {
        for row in 1..=2 {
            config.merge_cells.push(MergeRange {
                start_row: row,
                start_col: 0,
                end_row: row,
                end_col: layout.last_col,
            });
        }
    }

    config.style_cell(1, 0, CellStyle {
        font: Some(FontStyle::calibri(20.0, true)),
        alignment: Some(AlignmentStyle::centered()),
        ..Default::default()
    });
    config.style_cell(2, 0, CellStyle {
        font: Some(FontStyle::calibri(14.0, false)),
        alignment: Some(AlignmentStyle::centered()),
        ..Default::default()
    });

    for row in 1..=TITLE_ROWS {
        for col in 0..=layout.last_col {
            config.style_cell(row, col, CellStyle {
                fill: Some(fill.clone()),
                ..Default::default()
            });
        }
    }

    config
        .row_heights
        .get_or_insert_with(Default::default)
        .insert(1, TITLE_ROW_HEIGHT);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(last_col: usize) -> ReportLayout {
        ReportLayout {
            header_row: 4,
            first_data_row: 5,
            last_data_row: 6,
            total_row: 7,
            last_col,
        }
    }

    #[test]
    fn test_argb() {
        assert_eq!(normalize_argb("e6f2ff").unwrap(), "FFE6F2FF");
        assert_eq!(normalize_argb("#80E6F2FF").unwrap(), "80E6F2FF");
        assert!(normalize_argb("blue").is_err());
        assert!(normalize_argb("FFF").is_err());
    }

    #[test]
    fn test_title_block() {
        let mut config = StyleConfig::default();
        apply_title(&mut config, &layout(2), &ReportOptions::default(), "March 2024").unwrap();

        assert_eq!(config.cells.len(), 2);
        assert_eq!(config.cells[1].value, CellValue::String("March 2024".into()));
        assert_eq!(
            config.merge_cells,
            vec![
                MergeRange { start_row: 1, start_col: 0, end_row: 1, end_col: 2 },
                MergeRange { start_row: 2, start_col: 0, end_row: 2, end_col: 2 },
            ]
        );
        // Three rows by three columns of fill, merged into the title styles.
        assert_eq!(config.cell_styles.len(), 9);

        let title = &config.cell_styles[0];
        assert_eq!((title.row, title.col), (1, 0));
        assert_eq!(title.style.font, Some(FontStyle::calibri(20.0, true)));
        assert_eq!(title.style.fill, Some(FillStyle::solid("FFE6F2FF")));
        assert_eq!(config.row_heights.unwrap().get(&1), Some(&30.0));
    }

    #[test]
    fn test_single_column_has_no_merge() {
        let mut config = StyleConfig::default();
        apply_title(&mut config, &layout(0), &ReportOptions::default(), "May").unwrap();
        assert!(config.merge_cells.is_empty());
    }
}
