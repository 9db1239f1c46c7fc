use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    String(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text used where a cell has to act as a label (headers, chart categories).
    pub fn to_label(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9007199254740992.0 {
                    itoa::Buffer::new().format(*n as i64).to_string()
                } else {
                    ryu::Buffer::new().format(*n).to_string()
                }
            }
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Date(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// A formula in the data area of a source sheet, as written there (no `=`).
/// `row_idx` counts data rows from 0, like [`SheetData::cell`].
#[derive(Debug, Clone, PartialEq)]
pub struct SheetFormula {
    pub row_idx: usize,
    pub col: usize,
    pub formula: String,
}

/// A single table: one header per column, then the data rows, column-major.
/// Formula cells hold their computed value in `columns` and their source text
/// in `formulas`.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub columns: Vec<(String, Vec<CellValue>)>,
    pub formulas: Vec<SheetFormula>,
}

impl SheetData {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.len() > 31 {
            return Err(format!("Sheet name '{}' exceeds 31 chars", self.name));
        }

        if self.name.chars().any(|c| "[]':*?/\\".contains(c)) {
            return Err(format!("Sheet name '{}' contains invalid chars", self.name));
        }

        if self.columns.is_empty() {
            return Ok(());
        }

        let expected_len = self.columns[0].1.len();
        for (name, col) in &self.columns {
            if col.len() != expected_len {
                return Err(format!(
                    "Column '{}' has {} rows, expected {}",
                    name,
                    col.len(),
                    expected_len
                ));
            }
        }

        for f in &self.formulas {
            if f.col >= self.columns.len() || f.row_idx >= expected_len {
                return Err(format!(
                    "Formula '{}' at data row {}, column {} lies outside the table",
                    f.formula, f.row_idx, f.col
                ));
            }
        }

        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|(_, col)| col.len()).unwrap_or(0)
    }

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn cell(&self, row_idx: usize, col_idx: usize) -> &CellValue {
        self.columns
            .get(col_idx)
            .and_then(|(_, col)| col.get(row_idx))
            .unwrap_or(&CellValue::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ragged_columns_rejected() {
        let sheet = SheetData {
            name: "Sheet1".to_string(),
            columns: vec![
                ("Product".to_string(), vec![CellValue::String("A".into())]),
                ("Jan".to_string(), vec![]),
            ],
            formulas: Vec::new(),
        };
        assert!(sheet.validate().is_err());
    }

    #[test]
    fn test_label_rendering() {
        assert_eq!(CellValue::Number(2024.0).to_label(), "2024");
        assert_eq!(CellValue::Number(1.5).to_label(), "1.5");
        assert_eq!(CellValue::Bool(true).to_label(), "TRUE");
        assert_eq!(CellValue::Empty.to_label(), "");
    }

    #[test]
    fn test_cell_out_of_range_is_empty() {
        let sheet = SheetData {
            name: "Sheet1".to_string(),
            columns: vec![("Product".to_string(), vec![CellValue::String("A".into())])],
            formulas: Vec::new(),
        };
        assert_eq!(sheet.cell(0, 0), &CellValue::String("A".into()));
        assert_eq!(sheet.cell(5, 3), &CellValue::Empty);
    }
}
