use std::path::Path;

use dataflume_core::{Record, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid input: {0}")]
    Invalid(String),
}

/// Load records from a JSON array file or a CSV file with headers.
pub fn load_records(path: &Path) -> Result<Vec<Record>, InputError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => load_csv(path),
        _ => load_json(path),
    }
}

fn load_json(path: &Path) -> Result<Vec<Record>, InputError> {
    let contents = std::fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&contents)?;
    let items = match parsed {
        serde_json::Value::Array(items) => items,
        other @ serde_json::Value::Object(_) => vec![other],
        _ => {
            return Err(InputError::Invalid(
                "expected a JSON array or object of records".to_string(),
            ));
        }
    };
    items
        .into_iter()
        .map(|item| {
            Record::from_json(item).map_err(|err| InputError::Invalid(err.to_string()))
        })
        .collect()
}

fn load_csv(path: &Path) -> Result<Vec<Record>, InputError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (index, header) in headers.iter().enumerate() {
            let raw = row.get(index).unwrap_or_default();
            record.insert(header.clone(), parse_csv_value(raw));
        }
        records.push(record);
    }
    Ok(records)
}

// CSV carries no types; recover the obvious ones and keep the rest as text.
fn parse_csv_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(number) = trimmed.parse::<f64>() {
        return Value::Number(number);
    }
    Value::String(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_values_recover_types() {
        assert_eq!(parse_csv_value(""), Value::Null);
        assert_eq!(parse_csv_value("NULL"), Value::Null);
        assert_eq!(parse_csv_value("true"), Value::Bool(true));
        assert_eq!(parse_csv_value("42.5"), Value::Number(42.5));
        assert_eq!(
            parse_csv_value("john@x.com"),
            Value::String("john@x.com".to_string())
        );
    }
}
