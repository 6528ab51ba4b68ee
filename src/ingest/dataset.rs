use serde::Serialize;
use std::fmt;

/// Tokens read as missing values in addition to empty fields.
const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// A single parsed cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Parse a raw CSV field. Empty fields and NA markers are missing.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || NA_TOKENS.contains(&trimmed) {
            return Value::Missing;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(raw.to_string())
    }

    /// Numeric view of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) | Value::Missing => None,
        }
    }
}

/// Display form shared by the on-screen table and the CSV export.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{:.1}", x)
            }
            Value::Float(x) if x.is_finite() && (x.abs() >= 1e16 || (*x != 0.0 && x.abs() < 1e-4)) => {
                write_exponent(f, *x)
            }
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Missing => Ok(()),
        }
    }
}

/// Scientific form with a signed, two-digit exponent (`1e+20`, `2.5e-05`).
fn write_exponent(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    let shortest = format!("{:e}", x);
    let (mantissa, exponent) = shortest.split_once('e').unwrap_or((shortest.as_str(), "0"));
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    write!(f, "{}e{}{:0>2}", mantissa, sign, digits)
}

/// Inferred type of a whole column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Infer a column type from its cells.
    ///
    /// Missing cells demote an integer column to float rather than text, so a
    /// numeric column with gaps is still offered as a feature.
    pub fn infer<'a>(cells: impl Iterator<Item = &'a Value>) -> Self {
        let mut ty = ColumnType::Integer;
        for cell in cells {
            match cell {
                Value::Integer(_) => {}
                Value::Float(_) | Value::Missing => ty = ColumnType::Float,
                Value::Text(_) => return ColumnType::Text,
            }
        }
        ty
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// An in-memory table: ordered columns and row-major cells.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset from trimmed headers and parsed rows. Every row must
    /// have exactly `headers.len()` cells.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let ty = if rows.is_empty() {
                    // No data at all: an empty column is a float column.
                    ColumnType::Float
                } else {
                    ColumnType::infer(rows.iter().map(|r| &r[idx]))
                };
                Column { name, ty }
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name. On duplicate names the last one wins.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().rposition(|c| c.name == name)
    }

    /// Names of integer- or float-typed columns, in file order.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.ty.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    /// The first `n` rows, for the data preview.
    pub fn head(&self, n: usize) -> &[Vec<Value>] {
        &self.rows[..n.min(self.rows.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("42"), Value::Integer(42));
        assert_eq!(Value::parse(" -3 "), Value::Integer(-3));
        assert_eq!(Value::parse("1.5"), Value::Float(1.5));
        assert_eq!(Value::parse("1e3"), Value::Float(1000.0));
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("NaN"), Value::Missing);
        assert_eq!(Value::parse("N/A"), Value::Missing);
        assert_eq!(Value::parse("abc"), Value::Text("abc".into()));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Integer(7).to_string(), "7");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(0.1).to_string(), "0.1");
        assert_eq!(Value::Missing.to_string(), "");
        assert_eq!(Value::Float(1e20).to_string(), "1e+20");
        assert_eq!(Value::Float(-2.5e16).to_string(), "-2.5e+16");
        assert_eq!(Value::Float(1e308).to_string(), "1e+308");
        assert_eq!(Value::Float(0.00001).to_string(), "1e-05");
        assert_eq!(Value::Float(0.0001).to_string(), "0.0001");
        assert_eq!(Value::Float(0.0).to_string(), "0.0");
        assert_eq!(Value::Text("a b".into()).to_string(), "a b");
    }

    #[test]
    fn test_column_type_inference() {
        let ints = [Value::Integer(1), Value::Integer(2)];
        assert_eq!(ColumnType::infer(ints.iter()), ColumnType::Integer);

        let mixed = [Value::Integer(1), Value::Float(2.5)];
        assert_eq!(ColumnType::infer(mixed.iter()), ColumnType::Float);

        let gaps = [Value::Integer(1), Value::Missing];
        assert_eq!(ColumnType::infer(gaps.iter()), ColumnType::Float);

        let text = [Value::Integer(1), Value::Text("x".into())];
        assert_eq!(ColumnType::infer(text.iter()), ColumnType::Text);
    }

    #[test]
    fn test_numeric_columns_preserve_order() {
        let ds = Dataset::new(
            vec!["name".into(), "b".into(), "a".into()],
            vec![vec![
                Value::Text("x".into()),
                Value::Float(1.0),
                Value::Integer(2),
            ]],
        );
        assert_eq!(ds.numeric_columns(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(ds.column_index("a"), Some(2));
        assert_eq!(ds.column_index("zzz"), None);
    }
}
