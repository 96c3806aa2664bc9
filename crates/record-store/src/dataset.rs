//! Input dataset loading and schema validation.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use rendermill_job_model::{RawRecord, TemplateSlotMap};

use crate::StoreError;

/// The loaded input dataset, in file order.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl Dataset {
    /// Load a CSV dataset. Ids come from `id_column` when given, otherwise
    /// from the 1-based row number, so the same row always maps to the
    /// same record across runs.
    pub fn load(path: impl AsRef<Path>, id_column: Option<&str>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let csv_error = |source: csv::Error| StoreError::Csv {
            path: path.clone(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(csv_error)?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();

        if let Some(id_column) = id_column {
            if !headers.iter().any(|h| h == id_column) {
                return Err(StoreError::schema(format!(
                    "id column '{id_column}' not found in {}",
                    path.display()
                )));
            }
        }

        let mut records = vec![];
        let mut seen = HashSet::new();
        for (index, row) in reader.records().enumerate() {
            let row = row.map_err(csv_error)?;
            let row_number = index + 1;

            let fields: BTreeMap<String, String> = headers
                .iter()
                .cloned()
                .zip(row.iter().map(str::to_string))
                .collect();

            let id = match id_column {
                Some(column) => fields.get(column).cloned().unwrap_or_default(),
                None => row_number.to_string(),
            };
            if id.is_empty() {
                return Err(StoreError::schema(format!("row {row_number} has an empty id")));
            }
            if !seen.insert(id.clone()) {
                return Err(StoreError::schema(format!(
                    "duplicate id '{id}' at row {row_number}"
                )));
            }

            records.push(RawRecord {
                id,
                row: row_number,
                fields,
            });
        }

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            columns = headers.len(),
            "Dataset loaded"
        );

        Ok(Self {
            path,
            headers,
            records,
        })
    }

    /// Check the dataset columns against the slot map. A mismatch fails the
    /// whole run before any record is rendered.
    pub fn validate_schema(&self, slot_map: &TemplateSlotMap) -> Result<(), StoreError> {
        let present: HashSet<&str> = self.headers.iter().map(String::as_str).collect();
        let missing: Vec<&str> = slot_map
            .required_columns()
            .into_iter()
            .filter(|column| !present.contains(column))
            .collect();

        if !missing.is_empty() {
            return Err(StoreError::schema(format!(
                "{} is missing required column(s): {}",
                self.path.display(),
                missing.join(", ")
            )));
        }

        for slot in slot_map.slots.iter().filter(|s| !s.required) {
            if !present.contains(slot.column()) {
                tracing::warn!(
                    slot = %slot.name,
                    column = slot.column(),
                    "Optional slot has no dataset column; it will render with no value"
                );
            }
        }
        Ok(())
    }
}
