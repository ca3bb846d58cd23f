//! Typed query results and their text rendering

use crate::error::DbError;
use std::fmt;
use tokio_postgres::types::Type;
use tokio_postgres::{Column, Row};

/// Text cells wider than this are wrapped when rendered
pub const WRAP_WIDTH: usize = 50;

/// A decoded cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),

    /// A column type squire does not decode; holds the type name
    Unsupported(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Unsupported(ty) => write!(f, "<{ty}>"),
        }
    }
}

impl Value {
    /// Decode column `idx` of `row` according to its declared type
    pub fn decode(row: &Row, idx: usize) -> Result<Value, tokio_postgres::Error> {
        let ty = row.columns()[idx].type_().clone();
        let value = match ty {
            Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
            Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v.into())),
            Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v.into())),
            Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
            Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Float(v.into())),
            Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
            }
            other => Some(Value::Unsupported(other.name().to_string())),
        };
        Ok(value.unwrap_or(Value::Null))
    }
}

/// Column names plus decoded rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    pub(crate) fn from_rows(columns: &[Column], rows: &[Row]) -> Result<Self, DbError> {
        let mut table = ResultTable::new(columns.iter().map(|c| c.name().to_string()).collect());
        for row in rows {
            let decoded = (0..row.len())
                .map(|idx| Value::decode(row, idx))
                .collect::<Result<Vec<_>, _>>()
                .map_err(DbError::Query)?;
            table.rows.push(decoded);
        }
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header: Vec<Vec<String>> = self.columns.iter().map(|c| vec![c.clone()]).collect();
        let body: Vec<Vec<Vec<String>>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| wrap_text(&v.to_string(), WRAP_WIDTH)).collect())
            .collect();

        let mut widths = vec![0usize; self.columns.len()];
        for cells in std::iter::once(&header).chain(body.iter()) {
            for (i, lines) in cells.iter().enumerate().take(widths.len()) {
                let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
                widths[i] = widths[i].max(widest);
            }
        }

        write_row(f, &header, &widths)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("-+-").trim_end())?;
        for cells in &body {
            write_row(f, cells, &widths)?;
        }
        Ok(())
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, cells: &[Vec<String>], widths: &[usize]) -> fmt::Result {
    let height = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
    for line in 0..height {
        let parts: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, width)| {
                let text = cells.get(i).and_then(|c| c.get(line)).map(String::as_str).unwrap_or("");
                let pad = width.saturating_sub(text.chars().count());
                format!("{text}{}", " ".repeat(pad))
            })
            .collect();
        writeln!(f, "{}", parts.join(" | ").trim_end())?;
    }
    Ok(())
}

/// Greedy word wrap. Existing line breaks are kept; words longer than
/// `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for source in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;

        for word in source.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed > width && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }

        lines.push(current);
    }

    lines
}
