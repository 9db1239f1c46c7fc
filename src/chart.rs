//! Chart model and `c:chartSpace` XML rendering.

use crate::xml::escape_str;

#[derive(Debug, Clone, PartialEq)]
pub enum ChartType {
    /// Clustered vertical bars.
    Bar,
    Line,
    Pie,
    Doughnut,
}

impl ChartType {
    pub fn has_axes(&self) -> bool {
        matches!(self, ChartType::Bar | ChartType::Line)
    }
}

/// Cell area covered by a chart. Rows are 1-based, columns 0-based.
/// `from_*` is the top-left cell; `to_*` is exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPosition {
    pub from_col: usize,
    pub from_row: usize,
    pub to_col: usize,
    pub to_row: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LegendPosition {
    Right,
}

impl LegendPosition {
    fn xml_value(&self) -> &'static str {
        match self {
            LegendPosition::Right => "r",
        }
    }
}

/// A sheet reference plus the values it held when the chart was built.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRef<T> {
    pub formula: String,
    pub cache: Vec<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub name: Option<DataRef<String>>,
    pub categories: Option<DataRef<String>>,
    pub values: DataRef<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct ExcelChart {
    pub chart_type: ChartType,
    pub title: Option<String>,
    pub data_range: (usize, usize, usize, usize), // start_row, start_col, end_row, end_col
    pub category_col: Option<usize>,
    pub series: Vec<ChartSeries>,
    pub position: ChartPosition,
    pub show_legend: bool,
    pub legend_position: LegendPosition,
    pub x_axis_title: Option<String>,
    pub y_axis_title: Option<String>,
}

impl ExcelChart {
    pub fn new(
        chart_type: ChartType,
        data_range: (usize, usize, usize, usize),
        position: ChartPosition,
    ) -> Self {
        Self {
            chart_type,
            title: None,
            data_range,
            category_col: None,
            series: Vec::new(),
            position,
            show_legend: true,
            legend_position: LegendPosition::Right,
            x_axis_title: None,
            y_axis_title: None,
        }
    }
}

const CAT_AX_ID: u32 = 50010;
const VAL_AX_ID: u32 = 50020;

pub fn generate_chart_xml(chart: &ExcelChart) -> String {
    let mut xml = String::with_capacity(2048 + chart.series.len() * 512);

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<c:chartSpace xmlns:c=\"http://schemas.openxmlformats.org/drawingml/2006/chart\" \
xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
<c:date1904 val=\"0\"/><c:lang val=\"en-US\"/><c:roundedCorners val=\"0\"/>");

    xml.push_str("<c:chart>");
    if let Some(ref title) = chart.title {
        write_title(&mut xml, title);
        xml.push_str("<c:autoTitleDeleted val=\"0\"/>");
    } else {
        xml.push_str("<c:autoTitleDeleted val=\"1\"/>");
    }

    xml.push_str("<c:plotArea><c:layout/>");
    match chart.chart_type {
        ChartType::Bar => {
            xml.push_str("<c:barChart><c:barDir val=\"col\"/><c:grouping val=\"clustered\"/>\
<c:varyColors val=\"0\"/>");
            write_all_series(&mut xml, chart);
            xml.push_str("<c:gapWidth val=\"150\"/>");
            write_ax_ids(&mut xml);
            xml.push_str("</c:barChart>");
        }
        ChartType::Line => {
            xml.push_str("<c:lineChart><c:grouping val=\"standard\"/><c:varyColors val=\"0\"/>");
            write_all_series(&mut xml, chart);
            xml.push_str("<c:marker val=\"1\"/>");
            write_ax_ids(&mut xml);
            xml.push_str("</c:lineChart>");
        }
        ChartType::Pie => {
            xml.push_str("<c:pieChart><c:varyColors val=\"1\"/>");
            write_all_series(&mut xml, chart);
            xml.push_str("<c:firstSliceAng val=\"0\"/></c:pieChart>");
        }
        ChartType::Doughnut => {
            xml.push_str("<c:doughnutChart><c:varyColors val=\"1\"/>");
            write_all_series(&mut xml, chart);
            xml.push_str("<c:firstSliceAng val=\"0\"/><c:holeSize val=\"50\"/></c:doughnutChart>");
        }
    }

    if chart.chart_type.has_axes() {
        write_category_axis(&mut xml, chart.x_axis_title.as_deref());
        write_value_axis(&mut xml, chart.y_axis_title.as_deref());
    }
    xml.push_str("</c:plotArea>");

    if chart.show_legend {
        xml.push_str("<c:legend><c:legendPos val=\"");
        xml.push_str(chart.legend_position.xml_value());
        xml.push_str("\"/><c:overlay val=\"0\"/></c:legend>");
    }

    xml.push_str("<c:plotVisOnly val=\"1\"/><c:dispBlanksAs val=\"gap\"/></c:chart>");
    xml.push_str("<c:printSettings><c:headerFooter/>\
<c:pageMargins b=\"0.75\" l=\"0.7\" r=\"0.7\" t=\"0.75\" header=\"0.3\" footer=\"0.3\"/>\
<c:pageSetup/></c:printSettings>");
    xml.push_str("</c:chartSpace>");
    xml
}

fn write_ax_ids(xml: &mut String) {
    xml.push_str(&format!("<c:axId val=\"{}\"/><c:axId val=\"{}\"/>", CAT_AX_ID, VAL_AX_ID));
}

fn write_title(xml: &mut String, title: &str) {
    xml.push_str("<c:title><c:tx><c:rich><a:bodyPr/><a:lstStyle/><a:p><a:pPr><a:defRPr/></a:pPr>\
<a:r><a:rPr lang=\"en-US\"/><a:t>");
    xml.push_str(&escape_str(title));
    xml.push_str("</a:t></a:r></a:p></c:rich></c:tx><c:overlay val=\"0\"/></c:title>");
}

fn write_all_series(xml: &mut String, chart: &ExcelChart) {
    for (idx, series) in chart.series.iter().enumerate() {
        write_series(xml, &chart.chart_type, series, idx);
    }
}

fn write_series(xml: &mut String, chart_type: &ChartType, series: &ChartSeries, idx: usize) {
    xml.push_str(&format!("<c:ser><c:idx val=\"{}\"/><c:order val=\"{}\"/>", idx, idx));

    if let Some(ref name) = series.name {
        xml.push_str("<c:tx>");
        write_string_ref(xml, name);
        xml.push_str("</c:tx>");
    }

    match chart_type {
        ChartType::Bar => xml.push_str("<c:invertIfNegative val=\"0\"/>"),
        ChartType::Line => xml.push_str("<c:marker><c:symbol val=\"circle\"/></c:marker>"),
        ChartType::Pie | ChartType::Doughnut => {}
    }

    if let Some(ref categories) = series.categories {
        xml.push_str("<c:cat>");
        write_string_ref(xml, categories);
        xml.push_str("</c:cat>");
    }

    xml.push_str("<c:val>");
    write_numeric_ref(xml, &series.values);
    xml.push_str("</c:val>");

    if *chart_type == ChartType::Line {
        xml.push_str("<c:smooth val=\"0\"/>");
    }
    xml.push_str("</c:ser>");
}

fn write_string_ref(xml: &mut String, data: &DataRef<String>) {
    xml.push_str("<c:strRef><c:f>");
    xml.push_str(&escape_str(&data.formula));
    xml.push_str("</c:f>");
    if !data.cache.is_empty() {
        xml.push_str(&format!("<c:strCache><c:ptCount val=\"{}\"/>", data.cache.len()));
        for (i, value) in data.cache.iter().enumerate() {
            xml.push_str(&format!("<c:pt idx=\"{}\"><c:v>", i));
            xml.push_str(&escape_str(value));
            xml.push_str("</c:v></c:pt>");
        }
        xml.push_str("</c:strCache>");
    }
    xml.push_str("</c:strRef>");
}

fn write_numeric_ref(xml: &mut String, data: &DataRef<Option<f64>>) {
    xml.push_str("<c:numRef><c:f>");
    xml.push_str(&escape_str(&data.formula));
    xml.push_str("</c:f>");
    if !data.cache.is_empty() {
        xml.push_str("<c:numCache><c:formatCode>General</c:formatCode>");
        xml.push_str(&format!("<c:ptCount val=\"{}\"/>", data.cache.len()));
        let mut ryu_buf = ryu::Buffer::new();
        for (i, value) in data.cache.iter().enumerate() {
            if let Some(v) = value {
                xml.push_str(&format!("<c:pt idx=\"{}\"><c:v>", i));
                xml.push_str(ryu_buf.format(*v));
                xml.push_str("</c:v></c:pt>");
            }
        }
        xml.push_str("</c:numCache>");
    }
    xml.push_str("</c:numRef>");
}

fn write_category_axis(xml: &mut String, title: Option<&str>) {
    xml.push_str(&format!(
        "<c:catAx><c:axId val=\"{}\"/><c:scaling><c:orientation val=\"minMax\"/></c:scaling>\
<c:delete val=\"0\"/><c:axPos val=\"b\"/>",
        CAT_AX_ID
    ));
    if let Some(title) = title {
        write_title(xml, title);
    }
    xml.push_str(&format!(
        "<c:numFmt formatCode=\"General\" sourceLinked=\"1\"/><c:majorTickMark val=\"out\"/>\
<c:minorTickMark val=\"none\"/><c:tickLblPos val=\"nextTo\"/><c:crossAx val=\"{}\"/>\
<c:crosses val=\"autoZero\"/><c:auto val=\"1\"/><c:lblAlgn val=\"ctr\"/>\
<c:lblOffset val=\"100\"/><c:noMultiLvlLbl val=\"0\"/></c:catAx>",
        VAL_AX_ID
    ));
}

fn write_value_axis(xml: &mut String, title: Option<&str>) {
    xml.push_str(&format!(
        "<c:valAx><c:axId val=\"{}\"/><c:scaling><c:orientation val=\"minMax\"/></c:scaling>\
<c:delete val=\"0\"/><c:axPos val=\"l\"/><c:majorGridlines/>",
        VAL_AX_ID
    ));
    if let Some(title) = title {
        write_title(xml, title);
    }
    xml.push_str(&format!(
        "<c:numFmt formatCode=\"General\" sourceLinked=\"1\"/><c:majorTickMark val=\"out\"/>\
<c:minorTickMark val=\"none\"/><c:tickLblPos val=\"nextTo\"/><c:crossAx val=\"{}\"/>\
<c:crosses val=\"autoZero\"/><c:crossBetween val=\"between\"/></c:valAx>",
        CAT_AX_ID
    ));
}
