use crate::chart::ExcelChart;
use crate::error::ReportError;
use crate::styles::*;
use crate::types::{CellValue, SheetData};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

const WORKSHEET_OPEN: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">";

/// Days between the spreadsheet epoch (1899-12-30) and the Unix epoch.
const UNIX_EPOCH_SERIAL: f64 = 25569.0;

pub fn generate_app_xml(sheet_names: &[&str]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\" \
xmlns:vt=\"http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes\">\
<Application>Microsoft Excel</Application>\
<DocSecurity>0</DocSecurity>\
<ScaleCrop>false</ScaleCrop>\
<HeadingPairs><vt:vector size=\"2\" baseType=\"variant\">\
<vt:variant><vt:lpstr>Worksheets</vt:lpstr></vt:variant>\
<vt:variant><vt:i4>{}</vt:i4></vt:variant>\
</vt:vector></HeadingPairs>\
<TitlesOfParts><vt:vector size=\"{}\" baseType=\"lpstr\">{}</vt:vector></TitlesOfParts>\
<LinksUpToDate>false</LinksUpToDate>\
<SharedDoc>false</SharedDoc>\
<AppVersion>16.0300</AppVersion>\
</Properties>",
        sheet_names.len(),
        sheet_names.len(),
        sheet_names
            .iter()
            .map(|n| format!("<vt:lpstr>{}</vt:lpstr>", escape_str(n)))
            .collect::<Vec<_>>()
            .join("")
    )
}

pub fn generate_core_xml(created: &DateTime<Utc>) -> String {
    let stamp = created.format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
xmlns:dc=\"http://purl.org/dc/elements/1.1/\" \
xmlns:dcterms=\"http://purl.org/dc/terms/\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
<dc:creator>xlreport</dc:creator>\
<cp:lastModifiedBy>xlreport</cp:lastModifiedBy>\
<dcterms:created xsi:type=\"dcterms:W3CDTF\">{stamp}</dcterms:created>\
<dcterms:modified xsi:type=\"dcterms:W3CDTF\">{stamp}</dcterms:modified>\
</cp:coreProperties>"
    )
}

/// Zero-allocation column letter writing - returns length written
#[inline(always)]
pub fn write_col_letter(col: usize, buf: &mut [u8; 4]) -> usize {
    if col < 26 {
        buf[0] = b'A' + col as u8;
        return 1;
    }

    let mut col = col;
    let mut stack = [0u8; 4];
    let mut stack_len = 0;

    while col >= 26 {
        stack[stack_len] = b'A' + (col % 26) as u8;
        stack_len += 1;
        col = col / 26 - 1;
    }
    stack[stack_len] = b'A' + col as u8;
    stack_len += 1;

    for i in 0..stack_len {
        buf[i] = stack[stack_len - 1 - i];
    }

    stack_len
}

pub fn col_letter(col: usize) -> String {
    let mut buf = [0u8; 4];
    let len = write_col_letter(col, &mut buf);
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

/// Relative reference such as `B7`.
pub fn cell_ref(col: usize, row: usize) -> String {
    format!("{}{}", col_letter(col), row)
}

/// Absolute, sheet-qualified reference: `'My Sheet'!$B$5:$B$9` (or a single cell).
pub fn absolute_range_ref(
    sheet_name: &str,
    start_col: usize,
    start_row: usize,
    end_col: usize,
    end_row: usize,
) -> String {
    let sheet = crate::validation::escape_sheet_name_for_formula(sheet_name);
    if start_col == end_col && start_row == end_row {
        format!("{}!${}${}", sheet, col_letter(start_col), start_row)
    } else {
        format!(
            "{}!${}${}:${}${}",
            sheet,
            col_letter(start_col),
            start_row,
            col_letter(end_col),
            end_row
        )
    }
}

/// Write cell reference (e.g. "A1", "B2") to buffer
#[inline(always)]
fn write_cell_ref(col: usize, row: usize, buf: &mut Vec<u8>) {
    let mut col_buf = [0u8; 4];
    let col_len = write_col_letter(col, &mut col_buf);
    buf.extend_from_slice(&col_buf[..col_len]);
    buf.extend_from_slice(itoa::Buffer::new().format(row).as_bytes());
}

#[inline(always)]
pub(crate) fn datetime_to_excel_serial(dt: &NaiveDateTime) -> f64 {
    let utc = dt.and_utc();
    let days = utc.timestamp().div_euclid(86_400) as f64;
    let time_fraction =
        (dt.hour() * 3600 + dt.minute() * 60 + dt.second()) as f64 / 86400.0;
    UNIX_EPOCH_SERIAL + days + time_fraction
}

/// SIMD-accelerated XML escaping
#[inline(always)]
pub fn xml_escape_simd(input: &[u8], output: &mut Vec<u8>) {
    let needs_escape = memchr::memchr3(b'&', b'<', b'>', input).is_some()
        || memchr::memchr2(b'"', b'\'', input).is_some();

    if !needs_escape {
        output.extend_from_slice(input);
        return;
    }

    let mut last = 0;
    let mut pos = 0;

    while pos < input.len() {
        let byte = input[pos];
        let escape: &[u8] = match byte {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'"' => b"&quot;",
            b'\'' => b"&apos;",
            _ => {
                pos += 1;
                continue;
            }
        };

        output.extend_from_slice(&input[last..pos]);
        output.extend_from_slice(escape);
        pos += 1;
        last = pos;
    }

    if last < input.len() {
        output.extend_from_slice(&input[last..]);
    }
}

pub fn escape_str(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len() + 8);
    xml_escape_simd(input.as_bytes(), &mut out);
    // Escaping only replaces ASCII bytes, so the output stays valid UTF-8.
    String::from_utf8(out).unwrap_or_default()
}

pub fn generate_content_types(num_sheets: usize, num_charts: usize) -> String {
    let mut xml = String::with_capacity(800 + num_sheets * 150 + num_charts * 150);
    xml.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>\
<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\
<Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>",
    );

    for i in 1..=num_sheets {
        xml.push_str("<Override PartName=\"/xl/worksheets/sheet");
        xml.push_str(&i.to_string());
        xml.push_str(".xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>");
    }

    if num_charts > 0 {
        xml.push_str("<Override PartName=\"/xl/drawings/drawing1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.drawing+xml\"/>");
        for i in 1..=num_charts {
            xml.push_str("<Override PartName=\"/xl/charts/chart");
            xml.push_str(&i.to_string());
            xml.push_str(".xml\" ContentType=\"application/vnd.openxmlformats-officedocument.drawingml.chart+xml\"/>");
        }
    }

    xml.push_str("</Types>");
    xml
}

pub fn generate_rels() -> &'static str {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties\" Target=\"docProps/core.xml\"/>\
<Relationship Id=\"rId3\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties\" Target=\"docProps/app.xml\"/>\
</Relationships>"
}

pub fn generate_workbook(sheet_names: &[&str]) -> String {
    let mut xml = String::with_capacity(500 + sheet_names.len() * 80);
    xml.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
<fileVersion appName=\"xl\" lastEdited=\"7\" lowestEdited=\"7\" rupBuild=\"22621\"/>\
<workbookPr defaultThemeVersion=\"166925\"/>\
<bookViews><workbookView xWindow=\"0\" yWindow=\"0\" windowWidth=\"28800\" windowHeight=\"12600\" activeTab=\"0\"/></bookViews>\
<sheets>",
    );

    for (i, name) in sheet_names.iter().enumerate() {
        let id = i + 1;
        xml.push_str("<sheet name=\"");
        xml.push_str(&escape_str(name));
        xml.push_str("\" sheetId=\"");
        xml.push_str(&id.to_string());
        xml.push_str("\" r:id=\"rId");
        xml.push_str(&id.to_string());
        xml.push_str("\"/>");
    }

    // Totals are formulas; have the application recompute them on open.
    xml.push_str("</sheets><calcPr calcId=\"191029\" fullCalcOnLoad=\"1\"/></workbook>");
    xml
}

pub fn generate_workbook_rels(num_sheets: usize) -> String {
    let mut xml = String::with_capacity(300 + num_sheets * 150);
    xml.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId100\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>",
    );

    for i in 1..=num_sheets {
        xml.push_str("<Relationship Id=\"rId");
        xml.push_str(&i.to_string());
        xml.push_str("\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet");
        xml.push_str(&i.to_string());
        xml.push_str(".xml\"/>");
    }

    xml.push_str("</Relationships>");
    xml
}

/// Worksheet relationships; only a drawing is ever attached.
pub fn generate_worksheet_rels(has_drawing: bool) -> Option<String> {
    if !has_drawing {
        return None;
    }

    Some(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing\" Target=\"../drawings/drawing1.xml\"/>\
</Relationships>"
            .to_string(),
    )
}

pub fn generate_drawing_rels(num_charts: usize) -> String {
    let mut xml = String::with_capacity(200 + num_charts * 160);
    xml.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for i in 1..=num_charts {
        xml.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart\" Target=\"../charts/chart{}.xml\"/>",
            i, i
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

/// One two-cell anchor per chart; marker rows are 0-based in DrawingML.
pub fn generate_drawing_xml(charts: &[ExcelChart]) -> String {
    let mut xml = String::with_capacity(400 + charts.len() * 900);
    xml.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<xdr:wsDr xmlns:xdr=\"http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing\" \
xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
    );

    for (idx, chart) in charts.iter().enumerate() {
        let pos = &chart.position;
        xml.push_str("<xdr:twoCellAnchor editAs=\"oneCell\">");
        xml.push_str(&format!(
            "<xdr:from><xdr:col>{}</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>",
            pos.from_col,
            pos.from_row.saturating_sub(1)
        ));
        xml.push_str(&format!(
            "<xdr:to><xdr:col>{}</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to>",
            pos.to_col,
            pos.to_row.saturating_sub(1)
        ));

        let name = chart
            .title
            .clone()
            .unwrap_or_else(|| format!("Chart {}", idx + 1));
        xml.push_str(&format!(
            "<xdr:graphicFrame macro=\"\"><xdr:nvGraphicFramePr><xdr:cNvPr id=\"{}\" name=\"{}\"/>\
<xdr:cNvGraphicFramePr/></xdr:nvGraphicFramePr>\
<xdr:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/></xdr:xfrm>\
<a:graphic><a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/chart\">\
<c:chart xmlns:c=\"http://schemas.openxmlformats.org/drawingml/2006/chart\" r:id=\"rId{}\"/>\
</a:graphicData></a:graphic></xdr:graphicFrame>",
            idx + 2,
            escape_str(&name),
            idx + 1
        ));
        xml.push_str("<xdr:clientData/></xdr:twoCellAnchor>");
    }

    xml.push_str("</xdr:wsDr>");
    xml
}

/// Style ids resolved against the workbook's registry for one sheet.
#[derive(Debug, Clone)]
pub struct SheetStyleIds {
    pub cells: HashMap<(usize, usize), u32>,
    pub header: Option<u32>,
    pub date: u32,
    pub datetime: u32,
}

impl SheetStyleIds {
    pub fn resolve(config: &StyleConfig, registry: &mut StyleRegistry) -> Self {
        let mut cells = HashMap::with_capacity(config.cell_styles.len());
        for cell_style in &config.cell_styles {
            let style_id = registry.register_cell_style(&cell_style.style);
            cells.insert((cell_style.row, cell_style.col), style_id);
        }

        let header = config.styled_headers.then(|| {
            registry.register_cell_style(&CellStyle {
                font: Some(FontStyle::calibri(11.0, true)),
                fill: Some(FillStyle::solid("FFD9D9D9")),
                ..Default::default()
            })
        });

        let date = registry.register_cell_style(&CellStyle {
            number_format: Some(NumberFormat::Date),
            ..Default::default()
        });
        let datetime = registry.register_cell_style(&CellStyle {
            number_format: Some(NumberFormat::DateTime),
            ..Default::default()
        });

        Self { cells, header, date, datetime }
    }
}

enum Slot<'a> {
    Header(&'a str),
    Value(&'a CellValue),
    Formula(&'a Formula),
    Blank,
}

/// Table content replaces style-only placeholders; literal cells and formulas
/// from the config stay on top.
fn fill_table_slot<'a>(slots: &mut BTreeMap<usize, Slot<'a>>, col: usize, slot: Slot<'a>) {
    match slots.entry(col) {
        Entry::Vacant(e) => {
            e.insert(slot);
        }
        Entry::Occupied(mut e) => {
            if matches!(e.get(), Slot::Blank) {
                e.insert(slot);
            }
        }
    }
}

/// Generate the worksheet XML for a table plus its decorations.
/// Element order: dimension → sheetViews → sheetFormatPr → cols → sheetData →
///                mergeCells → pageMargins → drawing
pub fn generate_sheet_xml(
    sheet: &SheetData,
    config: &StyleConfig,
    styles: &SheetStyleIds,
) -> Result<Vec<u8>, ReportError> {
    let num_rows = sheet.num_rows();
    let num_cols = sheet.num_cols();
    let origin = config.table_origin_row.max(1);

    // Decorations outside (or on top of) the table, by row then column.
    let mut overlay: BTreeMap<usize, BTreeMap<usize, Slot>> = BTreeMap::new();
    for (row, col) in styles.cells.keys() {
        overlay.entry(*row).or_default().entry(*col).or_insert(Slot::Blank);
    }
    for cell in &config.cells {
        overlay.entry(cell.row).or_default().insert(cell.col, Slot::Value(&cell.value));
    }
    for formula in &config.formulas {
        overlay.entry(formula.row).or_default().insert(formula.col, Slot::Formula(formula));
    }

    let table_last_row = if num_cols > 0 { origin + num_rows } else { 0 };
    let last_row = overlay
        .keys()
        .next_back()
        .copied()
        .unwrap_or(0)
        .max(table_last_row);
    let last_col = overlay
        .values()
        .filter_map(|cols| cols.keys().next_back().copied())
        .max()
        .unwrap_or(0)
        .max(num_cols.saturating_sub(1));

    if last_row == 0 {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(WORKSHEET_OPEN);
        buf.extend_from_slice(b"<dimension ref=\"A1\"/><sheetData/></worksheet>");
        return Ok(buf);
    }

    let avg_cell_size = estimate_avg_cell_size(sheet);
    let estimated_size = 1500 + (num_rows + 1) * num_cols.max(1) * avg_cell_size;
    let mut buf = Vec::with_capacity(estimated_size);
    buf.extend_from_slice(WORKSHEET_OPEN);

    // 1. DIMENSION
    buf.extend_from_slice(b"<dimension ref=\"A1:");
    write_cell_ref(last_col, last_row, &mut buf);
    buf.extend_from_slice(b"\"/>");

    // 2. SHEETVIEWS
    buf.extend_from_slice(b"<sheetViews><sheetView tabSelected=\"1\" workbookViewId=\"0\"/></sheetViews>");

    // 3. SHEETFORMATPR
    buf.extend_from_slice(b"<sheetFormatPr defaultRowHeight=\"15\"/>");

    // 4. COLS
    if config.auto_width || config.column_widths.is_some() {
        buf.extend_from_slice(b"<cols>");
        for (col_idx, (header, values)) in sheet.columns.iter().enumerate() {
            let width = config
                .column_widths
                .as_ref()
                .and_then(|widths| widths.get(&col_idx).copied())
                .unwrap_or_else(|| {
                    if config.auto_width {
                        calculate_column_width(values, header, 100)
                    } else {
                        8.43
                    }
                });

            buf.extend_from_slice(b"<col min=\"");
            buf.extend_from_slice(itoa::Buffer::new().format(col_idx + 1).as_bytes());
            buf.extend_from_slice(b"\" max=\"");
            buf.extend_from_slice(itoa::Buffer::new().format(col_idx + 1).as_bytes());
            buf.extend_from_slice(b"\" width=\"");
            buf.extend_from_slice(ryu::Buffer::new().format(width).as_bytes());
            buf.extend_from_slice(b"\" customWidth=\"1\"/>");
        }
        buf.extend_from_slice(b"</cols>");
    }

    // 5. SHEETDATA
    buf.extend_from_slice(b"<sheetData>");

    let mut ryu_buf = ryu::Buffer::new();
    let mut int_buf = itoa::Buffer::new();

    for row_num in 1..=last_row {
        let mut slots = overlay.remove(&row_num).unwrap_or_default();

        if num_cols > 0 && row_num == origin {
            for (col_idx, (header, _)) in sheet.columns.iter().enumerate() {
                fill_table_slot(&mut slots, col_idx, Slot::Header(header));
            }
        } else if num_cols > 0 && row_num > origin && row_num <= table_last_row {
            let row_idx = row_num - origin - 1;
            for col_idx in 0..num_cols {
                fill_table_slot(&mut slots, col_idx, Slot::Value(sheet.cell(row_idx, col_idx)));
            }
        }

        let height = config.row_heights.as_ref().and_then(|h| h.get(&row_num));
        if slots.is_empty() && height.is_none() {
            continue;
        }

        buf.extend_from_slice(b"<row r=\"");
        buf.extend_from_slice(int_buf.format(row_num).as_bytes());
        buf.push(b'"');
        if let Some(height) = height {
            buf.extend_from_slice(b" ht=\"");
            buf.extend_from_slice(ryu::Buffer::new().format(*height).as_bytes());
            buf.extend_from_slice(b"\" customHeight=\"1\"");
        }
        buf.push(b'>');

        for (col_idx, slot) in &slots {
            let mut cell_ref = Vec::with_capacity(8);
            write_cell_ref(*col_idx, row_num, &mut cell_ref);
            let custom_style = styles.cells.get(&(row_num, *col_idx)).copied();

            match slot {
                Slot::Header(text) => {
                    write_string_cell(text, &cell_ref, custom_style.or(styles.header), &mut buf);
                }
                Slot::Value(value) => {
                    write_value_cell(value, &cell_ref, custom_style, styles, &mut buf, &mut ryu_buf);
                }
                Slot::Formula(formula) => {
                    write_formula_cell(formula, &cell_ref, custom_style, &mut buf);
                }
                Slot::Blank => write_blank_cell(&cell_ref, custom_style, &mut buf),
            }
        }

        buf.extend_from_slice(b"</row>");
    }

    buf.extend_from_slice(b"</sheetData>");

    // 6. MERGED CELLS
    if !config.merge_cells.is_empty() {
        buf.extend_from_slice(b"<mergeCells count=\"");
        buf.extend_from_slice(itoa::Buffer::new().format(config.merge_cells.len()).as_bytes());
        buf.extend_from_slice(b"\">");

        for merge in &config.merge_cells {
            buf.extend_from_slice(b"<mergeCell ref=\"");
            write_cell_ref(merge.start_col, merge.start_row, &mut buf);
            buf.push(b':');
            write_cell_ref(merge.end_col, merge.end_row, &mut buf);
            buf.extend_from_slice(b"\"/>");
        }

        buf.extend_from_slice(b"</mergeCells>");
    }

    // 7. PAGE MARGINS
    buf.extend_from_slice(b"<pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>");

    // 8. DRAWING
    if !config.charts.is_empty() {
        buf.extend_from_slice(b"<drawing r:id=\"rId1\"/>");
    }

    buf.extend_from_slice(b"</worksheet>");
    Ok(buf)
}

#[inline(always)]
fn open_cell(cell_ref: &[u8], style_id: Option<u32>, buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"<c r=\"");
    buf.extend_from_slice(cell_ref);
    buf.push(b'"');
    if let Some(sid) = style_id.filter(|sid| *sid > 0) {
        buf.extend_from_slice(b" s=\"");
        buf.extend_from_slice(itoa::Buffer::new().format(sid).as_bytes());
        buf.push(b'"');
    }
}

#[inline(always)]
fn write_blank_cell(cell_ref: &[u8], style_id: Option<u32>, buf: &mut Vec<u8>) {
    open_cell(cell_ref, style_id, buf);
    buf.extend_from_slice(b"/>");
}

#[inline(always)]
fn write_string_cell(text: &str, cell_ref: &[u8], style_id: Option<u32>, buf: &mut Vec<u8>) {
    open_cell(cell_ref, style_id, buf);
    buf.extend_from_slice(b" t=\"inlineStr\"><is><t xml:space=\"preserve\">");
    xml_escape_simd(text.as_bytes(), buf);
    buf.extend_from_slice(b"</t></is></c>");
}

#[inline(always)]
fn write_formula_cell(formula: &Formula, cell_ref: &[u8], style_id: Option<u32>, buf: &mut Vec<u8>) {
    open_cell(cell_ref, style_id, buf);
    buf.extend_from_slice(b"><f>");
    xml_escape_simd(formula.formula.trim_start_matches('=').as_bytes(), buf);
    buf.extend_from_slice(b"</f>");

    if let Some(ref cached) = formula.cached_value {
        buf.extend_from_slice(b"<v>");
        xml_escape_simd(cached.as_bytes(), buf);
        buf.extend_from_slice(b"</v>");
    }

    buf.extend_from_slice(b"</c>");
}

#[inline(always)]
fn write_number_cell(
    n: f64,
    cell_ref: &[u8],
    style_id: Option<u32>,
    buf: &mut Vec<u8>,
    ryu_buf: &mut ryu::Buffer,
) {
    open_cell(cell_ref, style_id, buf);
    buf.extend_from_slice(b"><v>");
    buf.extend_from_slice(format_number(n, ryu_buf).as_bytes());
    buf.extend_from_slice(b"</v></c>");
}

/// Integral values print without a fractional part; everything else via ryu.
pub fn format_number(n: f64, ryu_buf: &mut ryu::Buffer) -> String {
    let abs = n.abs();
    if n.fract() == 0.0 && abs < 9007199254740992.0 {
        itoa::Buffer::new().format(n as i64).to_string()
    } else {
        ryu_buf.format(n).to_string()
    }
}

fn write_value_cell(
    value: &CellValue,
    cell_ref: &[u8],
    style_id: Option<u32>,
    styles: &SheetStyleIds,
    buf: &mut Vec<u8>,
    ryu_buf: &mut ryu::Buffer,
) {
    match value {
        CellValue::Empty => {
            if style_id.is_some() {
                write_blank_cell(cell_ref, style_id, buf);
            }
        }
        CellValue::String(s) => write_string_cell(s, cell_ref, style_id, buf),
        CellValue::Number(n) => write_number_cell(*n, cell_ref, style_id, buf, ryu_buf),
        CellValue::Bool(b) => {
            open_cell(cell_ref, style_id, buf);
            buf.extend_from_slice(b" t=\"b\"><v>");
            buf.push(if *b { b'1' } else { b'0' });
            buf.extend_from_slice(b"</v></c>");
        }
        CellValue::Date(dt) => {
            let default_id = if dt.time() == chrono::NaiveTime::MIN {
                styles.date
            } else {
                styles.datetime
            };
            open_cell(cell_ref, Some(style_id.unwrap_or(default_id)), buf);
            buf.extend_from_slice(b"><v>");
            buf.extend_from_slice(ryu_buf.format(datetime_to_excel_serial(dt)).as_bytes());
            buf.extend_from_slice(b"</v></c>");
        }
    }
}

#[inline]
fn estimate_avg_cell_size(sheet: &SheetData) -> usize {
    if sheet.columns.is_empty() {
        return 30;
    }

    let sample_size = sheet.num_rows().min(100);
    if sample_size == 0 {
        return 30;
    }

    let mut total = 0;
    for (_, col_data) in &sheet.columns {
        for cell in col_data.iter().take(sample_size) {
            total += match cell {
                CellValue::Empty => 15,
                CellValue::String(s) => 40 + s.len(),
                CellValue::Number(_) => 25,
                CellValue::Bool(_) => 20,
                CellValue::Date(_) => 30,
            };
        }
    }

    (total / (sample_size * sheet.num_cols())).max(25)
}
