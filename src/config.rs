// Service and report settings, loaded from an optional JSON file plus environment overrides
use crate::error::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "XLREPORT_CONFIG";
pub const HOST_ENV: &str = "XLREPORT_HOST";
pub const PORT_ENV: &str = "XLREPORT_PORT";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Uploads and generated reports both live here.
    pub storage_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub render_threads: usize,
    pub report: ReportOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "127.0.0.1".to_string(),
            port: 8000,
            storage_dir: PathBuf::from("uploads"),
            max_upload_bytes: 25 * 1024 * 1024,
            render_threads: 1,
            report: ReportOptions::default(),
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Defaults, or the file named by `XLREPORT_CONFIG`; host/port env vars win.
    pub fn load() -> Result<Self> {
        let mut settings = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Ok(host) = std::env::var(HOST_ENV) {
            settings.host = host;
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            match port.parse() {
                Ok(port) => settings.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid {}", PORT_ENV),
            }
        }

        Ok(settings)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReportOptions {
    pub title: String,
    pub currency_symbol: String,
    /// Full number format code; replaces the one built from `currency_symbol`.
    pub currency_format: Option<String>,
    /// ARGB fill for the title block.
    pub title_fill: String,
    pub include_doughnut: bool,
    pub format_data_body: bool,
    pub styled_headers: bool,
    pub auto_width: bool,
    pub charts: ChartLayout,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            title: "Sales Report".to_string(),
            currency_symbol: "₹".to_string(),
            currency_format: None,
            title_fill: "FFE6F2FF".to_string(),
            include_doughnut: true,
            format_data_body: true,
            styled_headers: true,
            auto_width: true,
            charts: ChartLayout::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Below,
    Right,
}

/// Where the chart grid goes. Sizes and gaps are in cells.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ChartLayout {
    pub placement: Placement,
    /// Empty rows between the totals row and the grid (`Below`).
    pub gap_rows: usize,
    /// First grid column (`Below`).
    pub origin_col: usize,
    /// Empty columns between the table and the grid (`Right`).
    pub gap_cols: usize,
    pub width_cols: usize,
    pub height_rows: usize,
    pub per_row: usize,
    pub spacing_cols: usize,
    pub spacing_rows: usize,
}

impl Default for ChartLayout {
    fn default() -> Self {
        ChartLayout {
            placement: Placement::Below,
            gap_rows: 2,
            origin_col: 1,
            gap_cols: 1,
            width_cols: 8,
            height_rows: 15,
            per_row: 2,
            spacing_cols: 1,
            spacing_rows: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.bind_address(), "127.0.0.1:8000");
        assert_eq!(settings.storage_dir, PathBuf::from("uploads"));
        assert_eq!(settings.report.title, "Sales Report");
        assert_eq!(settings.report.charts.placement, Placement::Below);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"port": 9100, "report": {{"currency_symbol": "$", "charts": {{"placement": "right", "per_row": 1}}}}}}"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.report.currency_symbol, "$");
        assert!(settings.report.include_doughnut);
        assert_eq!(settings.report.charts.placement, Placement::Right);
        assert_eq!(settings.report.charts.per_row, 1);
        assert_eq!(settings.report.charts.height_rows, 15);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(crate::error::ReportError::Config { .. })
        ));
    }
}
