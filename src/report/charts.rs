use super::ReportLayout;
use crate::chart::{ChartPosition, ChartSeries, ChartType, DataRef, ExcelChart};
use crate::config::{ChartLayout, Placement, ReportOptions};
use crate::types::{CellValue, SheetData};
use crate::xml::absolute_range_ref;

/// Grid cells for `count` charts. The grid starts below the totals row or to
/// the right of the table and fills `per_row` charts per band.
pub fn chart_anchors(count: usize, layout: &ReportLayout, grid: &ChartLayout) -> Vec<ChartPosition> {
    let per_row = grid.per_row.max(1);
    let width = grid.width_cols.max(1);
    let height = grid.height_rows.max(1);

    let (start_row, start_col) = match grid.placement {
        Placement::Below => (layout.total_row + grid.gap_rows + 1, grid.origin_col),
        Placement::Right => (layout.header_row, layout.last_col + grid.gap_cols + 1),
    };

    (0..count)
        .map(|idx| {
            let from_row = start_row + (idx / per_row) * (height + grid.spacing_rows);
            let from_col = start_col + (idx % per_row) * (width + grid.spacing_cols);
            ChartPosition {
                from_col,
                from_row,
                to_col: from_col + width,
                to_row: from_row + height,
            }
        })
        .collect()
}

fn category_ref(sheet: &SheetData, layout: &ReportLayout) -> DataRef<String> {
    DataRef {
        formula: absolute_range_ref(&sheet.name, 0, layout.first_data_row, 0, layout.last_data_row),
        cache: sheet.columns[0].1.iter().map(CellValue::to_label).collect(),
    }
}

fn value_series(sheet: &SheetData, layout: &ReportLayout, col: usize, named: bool) -> ChartSeries {
    let (header, values) = &sheet.columns[col];
    ChartSeries {
        name: named.then(|| DataRef {
            formula: absolute_range_ref(&sheet.name, col, layout.header_row, col, layout.header_row),
            cache: vec![header.clone()],
        }),
        categories: Some(category_ref(sheet, layout)),
        values: DataRef {
            formula: absolute_range_ref(&sheet.name, col, layout.first_data_row, col, layout.last_data_row),
            cache: values.iter().map(CellValue::as_number).collect(),
        },
    }
}

/// Bar, line, pie and (optionally) doughnut charts over the table.
pub fn build_charts(sheet: &SheetData, layout: &ReportLayout, options: &ReportOptions) -> Vec<ExcelChart> {
    if layout.last_col == 0 {
        tracing::warn!("no value columns next to the labels; skipping charts");
        return Vec::new();
    }

    let data_range = (layout.header_row, 0, layout.last_data_row, layout.last_col);
    let all_series: Vec<ChartSeries> = (1..=layout.last_col)
        .map(|col| value_series(sheet, layout, col, true))
        .collect();

    let mut kinds = vec![
        (ChartType::Bar, "Sales by Product Line", Some(("Product", "Sales Amount"))),
        (ChartType::Line, "Sales Trend Analysis", Some(("Product", "Sales"))),
        (ChartType::Pie, "Sales Distribution", None),
    ];
    if options.include_doughnut {
        kinds.push((ChartType::Doughnut, "Sales Distribution (Doughnut)", None));
    }

    let anchors = chart_anchors(kinds.len(), layout, &options.charts);

    kinds
        .into_iter()
        .zip(anchors)
        .map(|((chart_type, title, axes), position)| {
            let mut chart = ExcelChart::new(chart_type, data_range, position);
            chart.title = Some(title.to_string());
            chart.category_col = Some(0);
            match axes {
                Some((x_title, y_title)) => {
                    chart.x_axis_title = Some(x_title.to_string());
                    chart.y_axis_title = Some(y_title.to_string());
                    chart.series = all_series.clone();
                }
                None => {
                    chart.series = vec![value_series(sheet, layout, layout.last_col, false)];
                }
            }
            chart
        })
        .collect()
}
