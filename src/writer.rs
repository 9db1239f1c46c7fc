use crate::chart::generate_chart_xml;
use crate::error::{ReportError, Result};
use crate::styles::{generate_styles_xml, StyleConfig, StyleRegistry};
use crate::types::SheetData;
use crate::validation;
use crate::xml::{self, SheetStyleIds};
use chrono::Utc;
use mtzip::{level::CompressionLevel, ZipArchive};
use rayon::prelude::*;
use std::io::{Cursor, Write};
use std::path::Path;

/// Writes a bare table (header row plus data) as a single-sheet workbook.
pub fn write_sheet_to_bytes(sheet: &SheetData) -> Result<Vec<u8>> {
    render_workbook(sheet, &StyleConfig::default(), 1)
}

/// Writes `sheet` decorated by `config` to `path`, replacing any existing file atomically.
pub fn write_workbook(
    sheet: &SheetData,
    config: &StyleConfig,
    path: &Path,
    render_threads: usize,
) -> Result<()> {
    let bytes = render_workbook(sheet, config, render_threads)?;
    validation::write_file_atomic(path, |file| {
        file.write_all(&bytes)?;
        Ok(())
    })
}

/// Last written row and number of columns, counting everything the config adds.
pub fn written_extent(sheet: &SheetData, config: &StyleConfig) -> (usize, usize) {
    let mut last_row = if sheet.num_cols() > 0 {
        config.table_origin_row + sheet.num_rows()
    } else {
        0
    };
    let mut col_count = sheet.num_cols();

    let decorations = config
        .cells
        .iter()
        .map(|c| (c.row, c.col))
        .chain(config.formulas.iter().map(|f| (f.row, f.col)))
        .chain(config.cell_styles.iter().map(|s| (s.row, s.col)));
    for (row, col) in decorations {
        last_row = last_row.max(row);
        col_count = col_count.max(col + 1);
    }

    (last_row, col_count)
}

pub fn render_workbook(
    sheet: &SheetData,
    config: &StyleConfig,
    render_threads: usize,
) -> Result<Vec<u8>> {
    sheet.validate().map_err(ReportError::Validation)?;
    validation::validate_sheet_name(&sheet.name).map_err(ReportError::Validation)?;

    let (last_row, col_count) = written_extent(sheet, config);
    validation::validate_style_config(config, last_row, col_count).into_result()?;

    let mut registry = StyleRegistry::new();
    let style_ids = SheetStyleIds::resolve(config, &mut registry);

    let sheet_xml = xml::generate_sheet_xml(sheet, config, &style_ids)?;

    // Chart parts are independent of each other
    let chart_xmls: Vec<String> = if render_threads > 1 && config.charts.len() > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(render_threads)
            .build()
            .map_err(|e| ReportError::Validation(format!("Thread pool error: {}", e)))?;

        pool.install(|| config.charts.par_iter().map(generate_chart_xml).collect())
    } else {
        config.charts.iter().map(generate_chart_xml).collect()
    };

    let mut zipper = ZipArchive::new();
    let sheet_names = [sheet.name.as_str()];

    add_static_files(&mut zipper, &sheet_names, &registry, chart_xmls.len());

    zipper
        .add_file_from_memory(sheet_xml, "xl/worksheets/sheet1.xml".to_string())
        .compression_level(CompressionLevel::fast())
        .done();

    if let Some(rels) = xml::generate_worksheet_rels(!chart_xmls.is_empty()) {
        zipper
            .add_file_from_memory(rels.into_bytes(), "xl/worksheets/_rels/sheet1.xml.rels".to_string())
            .compression_level(CompressionLevel::fast())
            .done();

        zipper
            .add_file_from_memory(
                xml::generate_drawing_xml(&config.charts).into_bytes(),
                "xl/drawings/drawing1.xml".to_string(),
            )
            .compression_level(CompressionLevel::fast())
            .done();

        zipper
            .add_file_from_memory(
                xml::generate_drawing_rels(chart_xmls.len()).into_bytes(),
                "xl/drawings/_rels/drawing1.xml.rels".to_string(),
            )
            .compression_level(CompressionLevel::fast())
            .done();
    }

    for (idx, chart_xml) in chart_xmls.into_iter().enumerate() {
        zipper
            .add_file_from_memory(chart_xml.into_bytes(), format!("xl/charts/chart{}.xml", idx + 1))
            .compression_level(CompressionLevel::fast())
            .done();
    }

    let mut out = Cursor::new(Vec::new());
    zipper
        .write(&mut out)
        .map_err(|e| ReportError::Zip(e.to_string()))?;
    Ok(out.into_inner())
}

fn add_static_files(
    zipper: &mut ZipArchive,
    sheet_names: &[&str],
    style_registry: &StyleRegistry,
    num_charts: usize,
) {
    zipper
        .add_file_from_memory(
            xml::generate_content_types(sheet_names.len(), num_charts).into_bytes(),
            "[Content_Types].xml".to_string(),
        )
        .compression_level(CompressionLevel::fast())
        .done();

    zipper
        .add_file_from_memory(
            xml::generate_rels().as_bytes().to_vec(),
            "_rels/.rels".to_string(),
        )
        .compression_level(CompressionLevel::fast())
        .done();

    zipper
        .add_file_from_memory(
            xml::generate_core_xml(&Utc::now()).into_bytes(),
            "docProps/core.xml".to_string(),
        )
        .compression_level(CompressionLevel::fast())
        .done();

    zipper
        .add_file_from_memory(
            xml::generate_app_xml(sheet_names).into_bytes(),
            "docProps/app.xml".to_string(),
        )
        .compression_level(CompressionLevel::fast())
        .done();

    zipper
        .add_file_from_memory(
            xml::generate_workbook(sheet_names).into_bytes(),
            "xl/workbook.xml".to_string(),
        )
        .compression_level(CompressionLevel::fast())
        .done();

    zipper
        .add_file_from_memory(
            xml::generate_workbook_rels(sheet_names.len()).into_bytes(),
            "xl/_rels/workbook.xml.rels".to_string(),
        )
        .compression_level(CompressionLevel::fast())
        .done();

    zipper
        .add_file_from_memory(
            generate_styles_xml(style_registry).into_bytes(),
            "xl/styles.xml".to_string(),
        )
        .compression_level(CompressionLevel::fast())
        .done();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;
    use std::io::Read;

    fn part_names(bytes: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut part = archive.by_name(name).unwrap();
        let mut out = String::new();
        part.read_to_string(&mut out).unwrap();
        out
    }

    fn sheet() -> SheetData {
        SheetData {
            name: "Sheet1".to_string(),
            columns: vec![
                ("Product".to_string(), vec![CellValue::String("A".into())]),
                ("Jan".to_string(), vec![CellValue::Number(3.0)]),
            ],
            formulas: Vec::new(),
        }
    }

    #[test]
    fn test_plain_workbook_parts() {
        let bytes = write_sheet_to_bytes(&sheet()).unwrap();
        assert_eq!(
            part_names(&bytes),
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "docProps/app.xml",
                "docProps/core.xml",
                "xl/_rels/workbook.xml.rels",
                "xl/styles.xml",
                "xl/workbook.xml",
                "xl/worksheets/sheet1.xml",
            ]
        );
        assert!(read_part(&bytes, "xl/worksheets/sheet1.xml").contains("<c r=\"B2\"><v>3</v></c>"));
    }

    #[test]
    fn test_invalid_sheet_name_rejected() {
        let mut bad = sheet();
        bad.name = "a/b".to_string();
        assert!(matches!(write_sheet_to_bytes(&bad), Err(ReportError::Validation(_))));
    }

    #[test]
    fn test_written_extent_counts_decorations() {
        let mut config = StyleConfig {
            table_origin_row: 4,
            ..Default::default()
        };
        assert_eq!(written_extent(&sheet(), &config), (5, 2));

        config.formulas.push(crate::styles::Formula {
            row: 6,
            col: 3,
            formula: "SUM(B5:B5)".to_string(),
            cached_value: None,
        });
        assert_eq!(written_extent(&sheet(), &config), (6, 4));
    }

    #[test]
    fn test_write_workbook_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.xlsx");
        write_workbook(&sheet(), &StyleConfig::default(), &path, 1).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(read_part(&bytes, "xl/workbook.xml").contains("name=\"Sheet1\""));
    }
}
