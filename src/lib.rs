//! Sales report generation for uploaded spreadsheets.
//!
//! An uploaded workbook is read with [`reader::read_workbook`], decorated by
//! [`report::build_report`] (title block, charts, currency totals) and written
//! back through the crate's own OOXML writer. [`server::router`] exposes the
//! whole flow over HTTP.

pub mod chart;
pub mod config;
pub mod error;
pub mod formula;
pub mod reader;
pub mod report;
pub mod server;
pub mod styles;
pub mod types;
pub mod validation;
pub mod writer;
pub mod xml;

pub use config::{ChartLayout, Placement, ReportOptions, Settings};
pub use error::{ReportError, Result};
pub use reader::read_workbook;
pub use report::{build_report, generate_report, GeneratedReport, ReportLayout};
pub use types::{CellValue, SheetData, SheetFormula};
pub use writer::{render_workbook, write_sheet_to_bytes, write_workbook};
