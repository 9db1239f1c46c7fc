//! Just enough formula handling to carry uploaded formulas into a report:
//! moving their row references when rows are inserted above the table, and
//! computing plain arithmetic ones that arrive without a cached value.

use crate::types::{CellValue, SheetData};
use crate::validation::{MAX_COLS, MAX_ROWS};
use crate::xml::datetime_to_excel_serial;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text,
    Cell {
        sheet: Option<String>,
        col: usize,
        row: usize,
        row_span: Range<usize>,
    },
    Function(String),
    Name,
    Op(u8),
    Open,
    Close,
    Comma,
    Colon,
    Other,
}

/// Parses `A1`, `$B$7`, `xfd1048576`. Returns the 0-based column, the 1-based
/// row and the byte offset where the row digits start.
pub(crate) fn parse_a1_cell(word: &str) -> Option<(usize, usize, usize)> {
    let b = word.as_bytes();
    let mut i = 0;
    if b.first() == Some(&b'$') {
        i += 1;
    }
    let letters_start = i;
    while i < b.len() && b[i].is_ascii_alphabetic() {
        i += 1;
    }
    let letters = &b[letters_start..i];
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    if b.get(i) == Some(&b'$') {
        i += 1;
    }
    let digits = &word[i..];
    if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let row: usize = digits.parse().ok()?;
    let col = letters
        .iter()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() - b'A' + 1) as usize)
        - 1;
    if row == 0 || row > MAX_ROWS || col >= MAX_COLS {
        return None;
    }
    Some((col, row, i))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'$' || b >= 0x80
}

/// Index just past the closing quote, or the end of input when unterminated.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn lex_number(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    i
}

fn lex_word(src: &str, start: usize, sheet: Option<String>, tokens: &mut Vec<Token>) -> usize {
    let bytes = src.as_bytes();
    let mut end = start;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    let word = &src[start..end];

    if sheet.is_none() && bytes.get(end) == Some(&b'!') {
        let next = end + 1;
        if next < bytes.len() && is_word_byte(bytes[next]) {
            return lex_word(src, next, Some(word.to_string()), tokens);
        }
        tokens.push(Token::Other);
        return next;
    }

    let mut after = end;
    while after < bytes.len() && bytes[after].is_ascii_whitespace() {
        after += 1;
    }
    if sheet.is_none() && bytes.get(after) == Some(&b'(') {
        tokens.push(Token::Function(word.to_ascii_uppercase()));
    } else if let Some((col, row, digits)) = parse_a1_cell(word) {
        tokens.push(Token::Cell {
            sheet,
            col,
            row,
            row_span: start + digits..end,
        });
    } else {
        tokens.push(Token::Name);
    }
    end
}

fn tokenize(src: &str) -> Vec<Token> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'"' => {
                i = skip_quoted(bytes, i, b'"');
                tokens.push(Token::Text);
            }
            b'\'' => {
                let end = skip_quoted(bytes, i, b'\'');
                if bytes.get(end) == Some(&b'!') && end >= i + 2 {
                    let sheet = src[i + 1..end - 1].replace("''", "'");
                    i = if end + 1 < bytes.len() && is_word_byte(bytes[end + 1]) {
                        lex_word(src, end + 1, Some(sheet), &mut tokens)
                    } else {
                        tokens.push(Token::Other);
                        end + 1
                    };
                } else {
                    tokens.push(Token::Other);
                    i = end;
                }
            }
            b'0'..=b'9' | b'.' => {
                let end = lex_number(bytes, i);
                match src[i..end].parse() {
                    Ok(n) => tokens.push(Token::Number(n)),
                    Err(_) => tokens.push(Token::Other),
                }
                i = end;
            }
            b'(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            b':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'<' | b'>' | b'%' => {
                tokens.push(Token::Op(b));
                i += 1;
            }
            _ if is_word_byte(b) => i = lex_word(src, i, None, &mut tokens),
            _ => {
                tokens.push(Token::Other);
                i += 1;
            }
        }
    }

    tokens
}

fn on_sheet(sheet: &Option<String>, name: &str) -> bool {
    sheet.as_deref().map_or(true, |s| s.eq_ignore_ascii_case(name))
}

/// Moves every row reference that points into `sheet_name` down by `offset`,
/// the way inserting rows above the data does. Absolute rows move as well;
/// references to other sheets are left alone.
pub fn shift_rows(formula: &str, sheet_name: &str, offset: usize) -> String {
    let mut out = String::with_capacity(formula.len() + 4);
    let mut last = 0;
    let mut row_buf = itoa::Buffer::new();

    for token in tokenize(formula) {
        if let Token::Cell { sheet, row, row_span, .. } = token {
            if on_sheet(&sheet, sheet_name) {
                out.push_str(&formula[last..row_span.start]);
                out.push_str(row_buf.format(row + offset));
                last = row_span.end;
            }
        }
    }
    out.push_str(&formula[last..]);
    out
}

/// Computes arithmetic formulas (`+ - * / ^ %`, parentheses, same-sheet
/// references, `SUM`, `AVERAGE`, `MIN`, `MAX`, `COUNT`) against `sheet`.
///
/// References use source coordinates: row 1 is the header row. Anything
/// outside that subset, or touching a cell listed in `unresolved`
/// (`(row_idx, col)` pairs), yields `None`.
pub fn evaluate(formula: &str, sheet: &SheetData, unresolved: &[(usize, usize)]) -> Option<f64> {
    let tokens = tokenize(formula.trim_start_matches('='));
    let mut eval = Evaluator {
        tokens: &tokens,
        pos: 0,
        sheet,
        unresolved,
    };
    let value = eval.expr()?;
    (eval.pos == tokens.len() && value.is_finite()).then_some(value)
}

struct Evaluator<'a> {
    tokens: &'a [Token],
    pos: usize,
    sheet: &'a SheetData,
    unresolved: &'a [(usize, usize)],
}

impl<'a> Evaluator<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn expr(&mut self) -> Option<f64> {
        let mut acc = self.term()?;
        while let Some(Token::Op(op @ (b'+' | b'-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if *op == b'+' { acc + rhs } else { acc - rhs };
        }
        Some(acc)
    }

    fn term(&mut self) -> Option<f64> {
        let mut acc = self.power()?;
        while let Some(Token::Op(op @ (b'*' | b'/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.power()?;
            acc = if *op == b'*' {
                acc * rhs
            } else if rhs == 0.0 {
                return None;
            } else {
                acc / rhs
            };
        }
        Some(acc)
    }

    fn power(&mut self) -> Option<f64> {
        let mut acc = self.unary()?;
        while let Some(Token::Op(b'^')) = self.peek() {
            self.pos += 1;
            acc = acc.powf(self.unary()?);
        }
        Some(acc)
    }

    fn unary(&mut self) -> Option<f64> {
        match self.peek() {
            Some(Token::Op(b'-')) => {
                self.pos += 1;
                Some(-self.unary()?)
            }
            Some(Token::Op(b'+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => {
                let mut value = self.primary()?;
                while let Some(Token::Op(b'%')) = self.peek() {
                    self.pos += 1;
                    value /= 100.0;
                }
                Some(value)
            }
        }
    }

    fn primary(&mut self) -> Option<f64> {
        match self.next()? {
            Token::Number(n) => Some(*n),
            Token::Open => {
                let value = self.expr()?;
                matches!(self.next()?, Token::Close).then_some(value)
            }
            Token::Cell { sheet, col, row, .. } => {
                if matches!(self.peek(), Some(Token::Colon)) || !on_sheet(sheet, &self.sheet.name) {
                    return None;
                }
                match self.lookup(*col, *row)? {
                    CellValue::Empty => Some(0.0),
                    CellValue::Number(n) => Some(*n),
                    CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                    CellValue::Date(dt) => Some(datetime_to_excel_serial(dt)),
                    CellValue::String(_) => None,
                }
            }
            Token::Function(name) => self.function(name),
            _ => None,
        }
    }

    /// `None` for the header row and for cells still waiting on a value.
    fn lookup(&self, col: usize, row: usize) -> Option<&'a CellValue> {
        let row_idx = row.checked_sub(2)?;
        if self.unresolved.contains(&(row_idx, col)) {
            return None;
        }
        Some(self.sheet.cell(row_idx, col))
    }

    fn function(&mut self, name: &str) -> Option<f64> {
        if !matches!(self.next()?, Token::Open) {
            return None;
        }

        let mut values = Vec::new();
        if !matches!(self.peek(), Some(Token::Close)) {
            loop {
                self.argument(&mut values)?;
                match self.next()? {
                    Token::Comma => continue,
                    Token::Close => break,
                    _ => return None,
                }
            }
        } else {
            self.pos += 1;
        }

        match name {
            "SUM" => Some(values.iter().sum()),
            "COUNT" => Some(values.len() as f64),
            "MIN" => Some(values.iter().copied().reduce(f64::min).unwrap_or(0.0)),
            "MAX" => Some(values.iter().copied().reduce(f64::max).unwrap_or(0.0)),
            "AVERAGE" if !values.is_empty() => Some(values.iter().sum::<f64>() / values.len() as f64),
            _ => None,
        }
    }

    /// Ranges and bare references contribute only their numbers; anything else
    /// is evaluated as an expression.
    fn argument(&mut self, values: &mut Vec<f64>) -> Option<()> {
        if let Some(Token::Cell { sheet, col, row, .. }) = self.peek() {
            let (end_col, end_row) = match (self.peek_at(1), self.peek_at(2)) {
                (Some(Token::Colon), Some(Token::Cell { sheet: end_sheet, col, row, .. }))
                    if end_sheet.is_none() || end_sheet == sheet =>
                {
                    self.pos += 3;
                    (*col, *row)
                }
                (Some(Token::Comma | Token::Close), _) => {
                    self.pos += 1;
                    (*col, *row)
                }
                _ => {
                    values.push(self.expr()?);
                    return Some(());
                }
            };
            if !on_sheet(sheet, &self.sheet.name) {
                return None;
            }
            return self.collect_range((*col, *row), (end_col, end_row), values);
        }

        values.push(self.expr()?);
        Some(())
    }

    fn collect_range(
        &self,
        (c1, r1): (usize, usize),
        (c2, r2): (usize, usize),
        values: &mut Vec<f64>,
    ) -> Option<()> {
        let last_row = self.sheet.num_rows() + 1;
        let rows = r1.min(r2).max(2)..=r1.max(r2).min(last_row);
        let cols = c1.min(c2)..=c1.max(c2).min(self.sheet.num_cols().saturating_sub(1));

        for row in rows {
            for col in cols.clone() {
                if let CellValue::Number(n) = self.lookup(col, row)? {
                    values.push(*n);
                }
            }
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SheetFormula;

    fn sheet() -> SheetData {
        SheetData {
            name: "Sales".to_string(),
            columns: vec![
                (
                    "Product".to_string(),
                    vec![CellValue::String("A".into()), CellValue::String("B".into())],
                ),
                ("Jan".to_string(), vec![CellValue::Number(10.0), CellValue::Number(5.0)]),
                ("Feb".to_string(), vec![CellValue::Empty, CellValue::Number(15.0)]),
            ],
            formulas: vec![SheetFormula {
                row_idx: 0,
                col: 2,
                formula: "B2*2".to_string(),
            }],
        }
    }

    #[test]
    fn test_shift_rows() {
        assert_eq!(shift_rows("B2*2", "Sales", 3), "B5*2");
        assert_eq!(shift_rows("SUM($B$2:B3)+C$2", "Sales", 3), "SUM($B$5:B6)+C$5");
        assert_eq!(shift_rows("Sales!B2+'Other Sheet'!B2", "Sales", 3), "Sales!B5+'Other Sheet'!B2");
        assert_eq!(shift_rows("Other!A1", "Sales", 3), "Other!A1");
    }

    #[test]
    fn test_shift_leaves_text_and_names_alone() {
        assert_eq!(shift_rows("IF(B2>0,\"A1 ok\",LOG10(B2))", "Sales", 3), "IF(B5>0,\"A1 ok\",LOG10(B5))");
        assert_eq!(shift_rows("SUMPRODUCT1+ABCD12", "Sales", 3), "SUMPRODUCT1+ABCD12");
        assert_eq!(shift_rows("1.5E3*A1", "Sales", 1), "1.5E3*A2");
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let sheet = sheet();
        assert_eq!(evaluate("B2*2", &sheet, &[]), Some(20.0));
        assert_eq!(evaluate("=(B2+B3)/5-1", &sheet, &[]), Some(2.0));
        assert_eq!(evaluate("-2^2", &sheet, &[]), Some(4.0));
        assert_eq!(evaluate("50%*B2", &sheet, &[]), Some(5.0));
        // Empty cells count as zero.
        assert_eq!(evaluate("C2+1", &sheet, &[]), Some(1.0));
    }

    #[test]
    fn test_evaluate_functions() {
        let sheet = sheet();
        assert_eq!(evaluate("SUM(B2:C3)", &sheet, &[]), Some(30.0));
        assert_eq!(evaluate("SUM(B1:B100)", &sheet, &[]), Some(15.0));
        assert_eq!(evaluate("max(B2,B3,7)", &sheet, &[]), Some(10.0));
        assert_eq!(evaluate("AVERAGE(B2:B3)", &sheet, &[]), Some(7.5));
        assert_eq!(evaluate("COUNT(A2:C3)", &sheet, &[]), Some(3.0));
    }

    #[test]
    fn test_evaluate_gives_up() {
        let sheet = sheet();
        assert_eq!(evaluate("A2*2", &sheet, &[]), None);
        assert_eq!(evaluate("B1+1", &sheet, &[]), None);
        assert_eq!(evaluate("B2/0", &sheet, &[]), None);
        assert_eq!(evaluate("Other!B2", &sheet, &[]), None);
        assert_eq!(evaluate("VLOOKUP(A2,A2:B3,2)", &sheet, &[]), None);
        assert_eq!(evaluate("B2*", &sheet, &[]), None);
        assert_eq!(evaluate("C2*2", &sheet, &[(0, 2)]), None);
        assert_eq!(evaluate("SUM(C2:C3)", &sheet, &[(0, 2)]), None);
    }
}
