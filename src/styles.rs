use std::collections::HashMap;

use crate::types::CellValue;

/// First id available to custom number formats; lower ids are built in.
const FIRST_CUSTOM_NUM_FMT_ID: u32 = 164;

#[derive(Debug, Clone, PartialEq)]
pub enum NumberFormat {
    General,
    Date,
    DateTime,
    /// Currency with an explicit format code, e.g. `"₹"#,##0.00`.
    Currency(String),
}

impl NumberFormat {
    /// Builds the currency format for a symbol: symbol, thousands separator, two decimals.
    pub fn currency(symbol: &str) -> Self {
        NumberFormat::Currency(format!("\"{}\"#,##0.00", symbol.replace('"', "")))
    }

    fn builtin_id(&self) -> Option<u32> {
        match self {
            NumberFormat::General => Some(0),
            NumberFormat::Date => Some(14),
            _ => None,
        }
    }

    fn format_code(&self) -> &str {
        match self {
            NumberFormat::General => "General",
            NumberFormat::Date => "mm-dd-yy",
            NumberFormat::DateTime => "yyyy-mm-dd hh:mm:ss",
            NumberFormat::Currency(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellStyle {
    pub font: Option<FontStyle>,
    pub fill: Option<FillStyle>,
    pub border: Option<BorderStyle>,
    pub alignment: Option<AlignmentStyle>,
    pub number_format: Option<NumberFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub size: Option<f64>,
    pub color: Option<String>,
    pub name: Option<String>,
}

impl FontStyle {
    pub fn calibri(size: f64, bold: bool) -> Self {
        Self {
            bold,
            italic: false,
            underline: false,
            size: Some(size),
            color: None,
            name: Some("Calibri".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillStyle {
    pub pattern_type: PatternType,
    pub fg_color: Option<String>,
    pub bg_color: Option<String>,
}

impl FillStyle {
    pub fn solid(argb: &str) -> Self {
        Self {
            pattern_type: PatternType::Solid,
            fg_color: Some(argb.to_string()),
            bg_color: Some(argb.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternType {
    None,
    Solid,
    Gray125,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BorderStyle {
    pub left: Option<BorderSide>,
    pub right: Option<BorderSide>,
    pub top: Option<BorderSide>,
    pub bottom: Option<BorderSide>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BorderSide {
    pub style: BorderLineStyle,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BorderLineStyle {
    Thin,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignmentStyle {
    pub horizontal: Option<HorizontalAlignment>,
    pub vertical: Option<VerticalAlignment>,
    pub wrap_text: bool,
}

impl AlignmentStyle {
    pub fn centered() -> Self {
        Self {
            horizontal: Some(HorizontalAlignment::Center),
            vertical: Some(VerticalAlignment::Center),
            wrap_text: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HorizontalAlignment {
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerticalAlignment {
    Center,
}

#[derive(Debug, Clone)]
pub struct Formula {
    pub row: usize,
    pub col: usize,
    pub formula: String,
    pub cached_value: Option<String>,
}

/// A literal cell written outside the table (titles, labels).
#[derive(Debug, Clone)]
pub struct CellEntry {
    pub row: usize,
    pub col: usize,
    pub value: CellValue,
}

#[derive(Debug, Clone)]
pub struct CellStyleMap {
    pub row: usize,
    pub col: usize,
    pub style: CellStyle,
}

/// Everything that decorates a table when it is written.
/// Rows are 1-based, columns 0-based.
#[derive(Debug, Clone)]
pub struct StyleConfig {
    /// Row holding the table header; data follows directly below.
    pub table_origin_row: usize,
    pub styled_headers: bool,
    pub auto_width: bool,
    pub column_widths: Option<HashMap<usize, f64>>,
    pub merge_cells: Vec<MergeRange>,
    pub row_heights: Option<HashMap<usize, f64>>,
    pub cells: Vec<CellEntry>,
    pub cell_styles: Vec<CellStyleMap>,
    pub formulas: Vec<Formula>,
    pub charts: Vec<crate::chart::ExcelChart>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            table_origin_row: 1,
            styled_headers: false,
            auto_width: false,
            column_widths: None,
            merge_cells: Vec::new(),
            row_heights: None,
            cells: Vec::new(),
            cell_styles: Vec::new(),
            formulas: Vec::new(),
            charts: Vec::new(),
        }
    }
}

impl StyleConfig {
    /// Merges `style` into whatever is already registered for the cell.
    /// Later fields win; unset fields keep their earlier value.
    pub fn style_cell(&mut self, row: usize, col: usize, style: CellStyle) {
        if let Some(existing) = self
            .cell_styles
            .iter_mut()
            .find(|s| s.row == row && s.col == col)
        {
            let current = &mut existing.style;
            if style.font.is_some() {
                current.font = style.font;
            }
            if style.fill.is_some() {
                current.fill = style.fill;
            }
            if style.border.is_some() {
                current.border = style.border;
            }
            if style.alignment.is_some() {
                current.alignment = style.alignment;
            }
            if style.number_format.is_some() {
                current.number_format = style.number_format;
            }
            return;
        }
        self.cell_styles.push(CellStyleMap { row, col, style });
    }
}

pub struct StyleRegistry {
    fonts: Vec<FontStyle>,
    fills: Vec<FillStyle>,
    borders: Vec<BorderStyle>,
    num_fmts: Vec<(u32, String)>,
    cell_xfs: Vec<CellXfEntry>,
}

#[derive(Debug, Clone, PartialEq)]
struct CellXfEntry {
    num_fmt_id: u32,
    font_id: u32,
    fill_id: u32,
    border_id: u32,
    alignment: Option<AlignmentStyle>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self {
            fonts: vec![FontStyle::calibri(11.0, false)],
            fills: vec![
                FillStyle { pattern_type: PatternType::None, fg_color: None, bg_color: None },
                FillStyle { pattern_type: PatternType::Gray125, fg_color: None, bg_color: None },
            ],
            borders: vec![BorderStyle::default()],
            num_fmts: Vec::new(),
            cell_xfs: vec![CellXfEntry {
                num_fmt_id: 0,
                font_id: 0,
                fill_id: 0,
                border_id: 0,
                alignment: None,
            }],
        }
    }

    /// Returns the `s` attribute value for a cell carrying `style`.
    pub fn register_cell_style(&mut self, style: &CellStyle) -> u32 {
        let font_id = if let Some(ref font) = style.font {
            self.get_or_add_font(font)
        } else {
            0
        };

        let fill_id = if let Some(ref fill) = style.fill {
            self.get_or_add_fill(fill)
        } else {
            0
        };

        let border_id = if let Some(ref border) = style.border {
            self.get_or_add_border(border)
        } else {
            0
        };

        let num_fmt_id = if let Some(ref fmt) = style.number_format {
            self.get_or_add_num_fmt(fmt)
        } else {
            0
        };

        let entry = CellXfEntry {
            num_fmt_id,
            font_id,
            fill_id,
            border_id,
            alignment: style.alignment.clone(),
        };

        if let Some(idx) = self.cell_xfs.iter().position(|xf| *xf == entry) {
            return idx as u32;
        }

        self.cell_xfs.push(entry);
        (self.cell_xfs.len() - 1) as u32
    }

    fn get_or_add_num_fmt(&mut self, fmt: &NumberFormat) -> u32 {
        if let Some(id) = fmt.builtin_id() {
            return id;
        }
        let code = fmt.format_code();
        if let Some((id, _)) = self.num_fmts.iter().find(|(_, c)| c == code) {
            return *id;
        }
        let id = FIRST_CUSTOM_NUM_FMT_ID + self.num_fmts.len() as u32;
        self.num_fmts.push((id, code.to_string()));
        id
    }

    fn get_or_add_font(&mut self, font: &FontStyle) -> u32 {
        for (idx, f) in self.fonts.iter().enumerate() {
            if f == font {
                return idx as u32;
            }
        }
        self.fonts.push(font.clone());
        (self.fonts.len() - 1) as u32
    }

    fn get_or_add_fill(&mut self, fill: &FillStyle) -> u32 {
        for (idx, f) in self.fills.iter().enumerate() {
            if f == fill {
                return idx as u32;
            }
        }
        self.fills.push(fill.clone());
        (self.fills.len() - 1) as u32
    }

    fn get_or_add_border(&mut self, border: &BorderStyle) -> u32 {
        for (idx, b) in self.borders.iter().enumerate() {
            if b == border {
                return idx as u32;
            }
        }
        self.borders.push(border.clone());
        (self.borders.len() - 1) as u32
    }
}

pub fn generate_styles_xml(registry: &StyleRegistry) -> String {
    let mut xml = String::with_capacity(2000 + registry.fonts.len() * 200);

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\n");

    if !registry.num_fmts.is_empty() {
        xml.push_str(&format!("<numFmts count=\"{}\">\n", registry.num_fmts.len()));
        for (id, code) in &registry.num_fmts {
            xml.push_str(&format!("  <numFmt numFmtId=\"{}\" formatCode=\"", id));
            xml.push_str(&crate::xml::escape_str(code));
            xml.push_str("\"/>\n");
        }
        xml.push_str("</numFmts>\n");
    }

    xml.push_str(&format!("<fonts count=\"{}\">\n", registry.fonts.len()));
    for font in &registry.fonts {
        xml.push_str("  <font>");
        if font.bold { xml.push_str("<b/>"); }
        if font.italic { xml.push_str("<i/>"); }
        if font.underline { xml.push_str("<u/>"); }
        if let Some(size) = font.size {
            xml.push_str(&format!("<sz val=\"{}\"/>", size));
        }
        if let Some(ref color) = font.color {
            xml.push_str(&format!("<color rgb=\"{}\"/>", color));
        }
        if let Some(ref name) = font.name {
            xml.push_str(&format!("<name val=\"{}\"/>", name));
        }
        xml.push_str("</font>\n");
    }
    xml.push_str("</fonts>\n");

    xml.push_str(&format!("<fills count=\"{}\">\n", registry.fills.len()));
    for fill in &registry.fills {
        xml.push_str("  <fill>");
        match fill.pattern_type {
            PatternType::None => xml.push_str("<patternFill patternType=\"none\"/>"),
            PatternType::Gray125 => xml.push_str("<patternFill patternType=\"gray125\"/>"),
            PatternType::Solid => {
                xml.push_str("<patternFill patternType=\"solid\">");
                if let Some(ref fg) = fill.fg_color {
                    xml.push_str(&format!("<fgColor rgb=\"{}\"/>", fg));
                }
                if let Some(ref bg) = fill.bg_color {
                    xml.push_str(&format!("<bgColor rgb=\"{}\"/>", bg));
                }
                xml.push_str("</patternFill>");
            }
        }
        xml.push_str("</fill>\n");
    }
    xml.push_str("</fills>\n");

    xml.push_str(&format!("<borders count=\"{}\">\n", registry.borders.len()));
    for border in &registry.borders {
        xml.push_str("  <border>");
        write_border_side(&mut xml, "left", &border.left);
        write_border_side(&mut xml, "right", &border.right);
        write_border_side(&mut xml, "top", &border.top);
        write_border_side(&mut xml, "bottom", &border.bottom);
        xml.push_str("<diagonal/>");
        xml.push_str("</border>\n");
    }
    xml.push_str("</borders>\n");

    xml.push_str("<cellStyleXfs count=\"1\">\n");
    xml.push_str("  <xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/>\n");
    xml.push_str("</cellStyleXfs>\n");

    xml.push_str(&format!("<cellXfs count=\"{}\">\n", registry.cell_xfs.len()));
    for xf in &registry.cell_xfs {
        xml.push_str(&format!(
            "  <xf numFmtId=\"{}\" fontId=\"{}\" fillId=\"{}\" borderId=\"{}\" xfId=\"0\"",
            xf.num_fmt_id, xf.font_id, xf.fill_id, xf.border_id
        ));

        if xf.font_id > 0 { xml.push_str(" applyFont=\"1\""); }
        if xf.fill_id > 0 { xml.push_str(" applyFill=\"1\""); }
        if xf.border_id > 0 { xml.push_str(" applyBorder=\"1\""); }
        if xf.num_fmt_id > 0 { xml.push_str(" applyNumberFormat=\"1\""); }

        if let Some(ref align) = xf.alignment {
            xml.push_str(" applyAlignment=\"1\"><alignment");
            if let Some(ref h) = align.horizontal {
                xml.push_str(&format!(" horizontal=\"{}\"", match h {
                    HorizontalAlignment::Center => "center",
                }));
            }
            if let Some(ref v) = align.vertical {
                xml.push_str(&format!(" vertical=\"{}\"", match v {
                    VerticalAlignment::Center => "center",
                }));
            }
            if align.wrap_text {
                xml.push_str(" wrapText=\"1\"");
            }
            xml.push_str("/></xf>\n");
        } else {
            xml.push_str("/>\n");
        }
    }
    xml.push_str("</cellXfs>\n");

    xml.push_str("<cellStyles count=\"1\">\n");
    xml.push_str("  <cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/>\n");
    xml.push_str("</cellStyles>\n");
    xml.push_str("<dxfs count=\"0\"/>\n");

    xml.push_str("</styleSheet>");
    xml
}

fn write_border_side(xml: &mut String, side: &str, border: &Option<BorderSide>) {
    if let Some(ref b) = border {
        xml.push_str(&format!("<{} style=\"{}\">", side, match b.style {
            BorderLineStyle::Thin => "thin",
        }));
        if let Some(ref color) = b.color {
            xml.push_str(&format!("<color rgb=\"{}\"/>", color));
        }
        xml.push_str(&format!("</{}>", side));
    } else {
        xml.push_str(&format!("<{}/>", side));
    }
}

/// Width in character units for a column, from its header and the first rows.
pub fn calculate_column_width(
    values: &[CellValue],
    header: &str,
    max_rows_to_scan: usize,
) -> f64 {
    let mut max_len = header.chars().count();

    for value in values.iter().take(max_rows_to_scan) {
        let len = match value {
            CellValue::Empty => 0,
            CellValue::String(s) => s.chars().count(),
            CellValue::Number(_) => 14,
            CellValue::Bool(_) => 6,
            CellValue::Date(_) => 20,
        };
        max_len = max_len.max(len);
    }

    ((max_len as f64 * 1.2) + 2.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_deduplicates_styles() {
        let mut registry = StyleRegistry::new();
        let bold = CellStyle {
            font: Some(FontStyle::calibri(11.0, true)),
            ..Default::default()
        };
        let first = registry.register_cell_style(&bold);
        let second = registry.register_cell_style(&bold);
        assert_eq!(first, second);
        assert_eq!(first, 1);
        assert_eq!(registry.register_cell_style(&CellStyle::default()), 0);
    }

    #[test]
    fn test_custom_number_formats_get_ids_from_164() {
        let mut registry = StyleRegistry::new();
        let currency = CellStyle {
            number_format: Some(NumberFormat::currency("₹")),
            ..Default::default()
        };
        let datetime = CellStyle {
            number_format: Some(NumberFormat::DateTime),
            ..Default::default()
        };
        registry.register_cell_style(&currency);
        registry.register_cell_style(&datetime);
        registry.register_cell_style(&currency);

        let xml = generate_styles_xml(&registry);
        assert!(xml.contains("<numFmts count=\"2\">"));
        assert!(xml.contains("numFmtId=\"164\" formatCode=\"&quot;₹&quot;#,##0.00\""));
        assert!(xml.contains("numFmtId=\"165\" formatCode=\"yyyy-mm-dd hh:mm:ss\""));
    }

    #[test]
    fn test_alignment_and_border_markup() {
        let mut registry = StyleRegistry::new();
        registry.register_cell_style(&CellStyle {
            alignment: Some(AlignmentStyle::centered()),
            border: Some(BorderStyle {
                top: Some(BorderSide {
                    style: BorderLineStyle::Thin,
                    color: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        });

        let xml = generate_styles_xml(&registry);
        assert!(xml.contains("<top style=\"thin\">"));
        assert!(xml.contains("applyAlignment=\"1\"><alignment horizontal=\"center\" vertical=\"center\"/></xf>"));
    }

    #[test]
    fn test_builtin_date_format_not_declared() {
        let mut registry = StyleRegistry::new();
        registry.register_cell_style(&CellStyle {
            number_format: Some(NumberFormat::Date),
            ..Default::default()
        });
        let xml = generate_styles_xml(&registry);
        assert!(!xml.contains("<numFmts"));
        assert!(xml.contains("numFmtId=\"14\""));
    }

    #[test]
    fn test_style_cell_merges_fields() {
        let mut config = StyleConfig::default();
        config.style_cell(1, 0, CellStyle {
            fill: Some(FillStyle::solid("FFE6F2FF")),
            ..Default::default()
        });
        config.style_cell(1, 0, CellStyle {
            font: Some(FontStyle::calibri(20.0, true)),
            ..Default::default()
        });
        assert_eq!(config.cell_styles.len(), 1);
        let style = &config.cell_styles[0].style;
        assert!(style.fill.is_some());
        assert!(style.font.as_ref().is_some_and(|f| f.bold));
    }

    #[test]
    fn test_column_width_bounds() {
        let values = vec![CellValue::String("x".repeat(200))];
        assert_eq!(calculate_column_width(&values, "H", 10), 100.0);
        assert!(calculate_column_width(&[], "Product", 10) > 7.0);
    }
}
