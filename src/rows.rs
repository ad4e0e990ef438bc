//! Batch input rows
//!
//! Tabular input: one header row of design field names, one override row per
//! nameplate. Unknown columns fail the whole parse. Empty text cells mean
//! empty text; other empty cells keep the base value. Row ids follow the
//! record order, so every record becomes a job.

use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::design::{DesignError, DesignField, DesignPatch};

#[derive(Debug, Error)]
pub enum RowsError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Row {row}: {source}")]
    InvalidValue {
        row: usize,
        #[source]
        source: DesignError,
    },

    #[error("Row {0}: expected an object of field overrides")]
    NotAnObject(usize),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read rows: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rows JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl RowsError {
    fn from_design(row: usize, err: DesignError) -> Self {
        match err {
            DesignError::UnknownField(name) => Self::UnknownField(name),
            other => Self::InvalidValue { row, source: other },
        }
    }
}

/// Overrides for one nameplate variant. `row_id` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRow {
    pub row_id: usize,
    pub overrides: DesignPatch,
}

pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<BatchRow>, RowsError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<DesignField> = reader
        .headers()?
        .iter()
        .map(|h| h.parse().map_err(|e| RowsError::from_design(0, e)))
        .collect::<Result<_, _>>()?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row_id = i + 1;
        let mut overrides = DesignPatch::default();
        for (field, value) in headers.iter().zip(record.iter()) {
            overrides
                .set_cell(*field, value)
                .map_err(|e| RowsError::from_design(row_id, e))?;
        }
        rows.push(BatchRow { row_id, overrides });
    }
    tracing::debug!(rows = rows.len(), "Parsed batch rows");
    Ok(rows)
}

pub fn load_csv(path: &Path) -> Result<Vec<BatchRow>, RowsError> {
    parse_csv(File::open(path)?)
}

/// Rows from a JSON array of override objects.
pub fn parse_json(value: &Value) -> Result<Vec<BatchRow>, RowsError> {
    let items = match value {
        Value::Array(items) => items,
        _ => return Err(RowsError::NotAnObject(0)),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let row_id = i + 1;
            let map = item.as_object().ok_or(RowsError::NotAnObject(row_id))?;
            let overrides =
                DesignPatch::from_json_map(map).map_err(|e| RowsError::from_design(row_id, e))?;
            Ok(BatchRow { row_id, overrides })
        })
        .collect()
}
