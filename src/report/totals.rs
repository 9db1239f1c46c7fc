use super::ReportLayout;
use crate::config::ReportOptions;
use crate::styles::*;
use crate::types::{CellValue, SheetData};
use crate::xml::{cell_ref, format_number};

pub const TOTAL_LABEL: &str = "Total";

pub fn currency_format(options: &ReportOptions) -> NumberFormat {
    match options.currency_format {
        Some(ref code) if !code.trim().is_empty() => NumberFormat::Currency(code.clone()),
        _ => NumberFormat::currency(&options.currency_symbol),
    }
}

/// Sum of the numeric cells of a column; anything else counts as nothing.
pub fn column_sum(sheet: &SheetData, col_idx: usize) -> f64 {
    sheet
        .columns
        .get(col_idx)
        .map(|(_, values)| values.iter().filter_map(CellValue::as_number).sum())
        .unwrap_or(0.0)
}

/// Adds the totals row below the data plus the currency formatting.
pub fn apply_totals(
    config: &mut StyleConfig,
    sheet: &SheetData,
    layout: &ReportLayout,
    options: &ReportOptions,
) {
    let currency = currency_format(options);
    let top_rule = BorderStyle {
        top: Some(BorderSide {
            style: BorderLineStyle::Thin,
            color: None,
        }),
        ..Default::default()
    };

    config.cells.push(CellEntry {
        row: layout.total_row,
        col: 0,
        value: CellValue::String(TOTAL_LABEL.to_string()),
    });
    config.style_cell(layout.total_row, 0, CellStyle {
        font: Some(FontStyle::calibri(11.0, true)),
        border: Some(top_rule.clone()),
        ..Default::default()
    });

    let mut ryu_buf = ryu::Buffer::new();
    for col in 1..=layout.last_col {
        let sum = column_sum(sheet, col);
        config.formulas.push(Formula {
            row: layout.total_row,
            col,
            formula: format!(
                "SUM({}:{})",
                cell_ref(col, layout.first_data_row),
                cell_ref(col, layout.last_data_row)
            ),
            cached_value: Some(format_number(sum, &mut ryu_buf)),
        });
        config.style_cell(layout.total_row, col, CellStyle {
            border: Some(top_rule.clone()),
            number_format: Some(currency.clone()),
            ..Default::default()
        });

        if options.format_data_body {
            for (row_idx, value) in sheet.columns[col].1.iter().enumerate() {
                if value.as_number().is_some() {
                    config.style_cell(layout.first_data_row + row_idx, col, CellStyle {
                        number_format: Some(currency.clone()),
                        ..Default::default()
                    });
                }
            }
        }
    }

    tracing::debug!(row = layout.total_row, columns = layout.last_col, "totals added");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> SheetData {
        SheetData {
            name: "Sheet1".to_string(),
            columns: vec![
                (
                    "Product".to_string(),
                    vec![CellValue::String("A".into()), CellValue::String("B".into())],
                ),
                ("Jan".to_string(), vec![CellValue::Number(10.0), CellValue::Number(5.0)]),
                (
                    "Feb".to_string(),
                    vec![CellValue::Number(20.5), CellValue::String("n/a".into())],
                ),
            ],
            formulas: Vec::new(),
        }
    }

    fn layout() -> ReportLayout {
        ReportLayout {
            header_row: 4,
            first_data_row: 5,
            last_data_row: 6,
            total_row: 7,
            last_col: 2,
        }
    }

    #[test]
    fn test_currency_format_choice() {
        let mut options = ReportOptions::default();
        assert_eq!(
            currency_format(&options),
            NumberFormat::Currency("\"₹\"#,##0.00".to_string())
        );
        options.currency_symbol = "$".to_string();
        assert_eq!(currency_format(&options), NumberFormat::Currency("\"$\"#,##0.00".to_string()));
        options.currency_format = Some("_-€* #,##0.00_-".to_string());
        assert_eq!(currency_format(&options), NumberFormat::Currency("_-€* #,##0.00_-".to_string()));
    }

    #[test]
    fn test_sums_skip_text() {
        assert_eq!(column_sum(&sheet(), 1), 15.0);
        assert_eq!(column_sum(&sheet(), 2), 20.5);
        assert_eq!(column_sum(&sheet(), 9), 0.0);
    }

    #[test]
    fn test_totals_row() {
        let mut config = StyleConfig::default();
        apply_totals(&mut config, &sheet(), &layout(), &ReportOptions::default());

        assert_eq!(config.cells[0].row, 7);
        assert_eq!(config.cells[0].value, CellValue::String("Total".into()));

        let formulas: Vec<_> = config
            .formulas
            .iter()
            .map(|f| (f.row, f.col, f.formula.as_str(), f.cached_value.as_deref()))
            .collect();
        assert_eq!(
            formulas,
            vec![
                (7, 1, "SUM(B5:B6)", Some("15")),
                (7, 2, "SUM(C5:C6)", Some("20.5")),
            ]
        );

        let currency = Some(currency_format(&ReportOptions::default()));
        let formatted: Vec<_> = config
            .cell_styles
            .iter()
            .filter(|s| s.style.number_format == currency)
            .map(|s| (s.row, s.col))
            .collect();
        // Totals plus the three numeric body cells; "n/a" is left alone.
        assert_eq!(formatted, vec![(7, 1), (5, 1), (6, 1), (7, 2), (5, 2)]);
    }

    #[test]
    fn test_body_pass_can_be_disabled() {
        let options = ReportOptions {
            format_data_body: false,
            ..Default::default()
        };
        let mut config = StyleConfig::default();
        apply_totals(&mut config, &sheet(), &layout(), &options);
        assert!(config.cell_styles.iter().all(|s| s.row == 7));
    }
}
