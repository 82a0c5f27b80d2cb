//! CSV loader behind the `LoadData` action.
//!
//! Reads `<data_dir>/<name>` and returns its rows as JSON objects in file
//! order. Column types are inferred per column, the way a dataframe reader
//! would: integers, floats, `True`/`False`, otherwise strings. Empty cells
//! become `null`. The response content is the row array encoded into a JSON
//! string, which is what browser clients feed straight into `JSON.parse`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::domain::ActionHandler;
use crate::error::HandlerError;

/// One row, keyed by column name in header order.
pub type Row = Map<String, Value>;

/// Request content for `LoadData`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadDataRequest {
    /// File name relative to the data directory.
    pub name: String,
}

/// Loads CSV files from a fixed directory.
#[derive(Debug, Clone)]
pub struct TabularLoader {
    data_dir: PathBuf,
}

impl TabularLoader {
    /// Creates a loader rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Loads `name` and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::NotFound`] if `name` is not a plain relative
    /// path or the file does not exist, and [`HandlerError::Format`] if the
    /// file is not valid CSV.
    pub fn load(&self, name: &str) -> Result<Vec<Row>, HandlerError> {
        let path = self.resolve(name)?;
        let file = File::open(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => HandlerError::NotFound(name.to_string()),
            _ => HandlerError::Format(format!("{name}: {err}")),
        })?;
        parse_csv(file).map_err(|err| match err {
            HandlerError::Format(msg) => HandlerError::Format(format!("{name}: {msg}")),
            other => other,
        })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, HandlerError> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(HandlerError::NotFound(name.to_string()));
        }
        Ok(self.data_dir.join(relative))
    }
}

impl ActionHandler for TabularLoader {
    fn handle(&self, content: Value) -> Result<Value, HandlerError> {
        let request: LoadDataRequest = serde_json::from_value(content)
            .map_err(|err| HandlerError::InvalidPayload(err.to_string()))?;
        let rows = self.load(&request.name)?;
        let encoded = serde_json::to_string(&rows)
            .map_err(|err| HandlerError::Format(err.to_string()))?;
        tracing::debug!(name = %request.name, rows = rows.len(), "loaded tabular data");
        Ok(Value::String(encoded))
    }
}

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnKind {
    /// Infers the narrowest kind that fits every non-empty cell.
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut all_int = true;
        let mut all_float = true;
        let mut all_bool = true;
        let mut any_empty = false;
        let mut any_value = false;

        for cell in cells {
            if cell.is_empty() {
                any_empty = true;
                continue;
            }
            any_value = true;
            all_int &= cell.parse::<i64>().is_ok();
            all_float &= cell.parse::<f64>().is_ok_and(f64::is_finite);
            all_bool &= matches!(cell, "True" | "False");
        }

        if !any_value {
            Self::Float
        } else if all_int && !any_empty {
            Self::Int
        } else if all_float {
            Self::Float
        } else if all_bool {
            Self::Bool
        } else {
            Self::Text
        }
    }

    fn convert(self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            Self::Int => cell.parse::<i64>().map_or(Value::Null, Value::from),
            Self::Float => cell
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or(Value::Null, Value::Number),
            Self::Bool => Value::Bool(cell == "True"),
            Self::Text => Value::String(cell.to_string()),
        }
    }
}

/// Parses CSV with a header row into typed rows.
fn parse_csv(source: impl Read) -> Result<Vec<Row>, HandlerError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(source);

    let headers = reader
        .headers()
        .map_err(|err| HandlerError::Format(err.to_string()))?
        .clone();
    if headers.is_empty() {
        return Err(HandlerError::Format("no columns to parse".to_string()));
    }
    let columns = column_names(headers.iter());

    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| HandlerError::Format(err.to_string()))?;

    let kinds: Vec<ColumnKind> = (0..columns.len())
        .map(|col| ColumnKind::infer(records.iter().map(|rec| rec.get(col).unwrap_or(""))))
        .collect();

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .zip(&kinds)
                .zip(record.iter())
                .map(|((name, kind), cell)| (name.clone(), kind.convert(cell)))
                .collect::<Row>()
        })
        .collect();
    Ok(rows)
}

/// Names empty headers `Unnamed: <index>` and suffixes duplicates with
/// `.1`, `.2`, and so on.
fn column_names<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .enumerate()
        .map(|(index, header)| {
            let base = if header.is_empty() {
                format!("Unnamed: {index}")
            } else {
                header.to_string()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}
