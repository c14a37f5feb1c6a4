//! In-process sink, used by tests and dry runs.

use std::collections::BTreeMap;

use super::{check_columns, StorageError, StorageSink};
use crate::table::{TableBatch, Value};

/// Keeps every appended table in memory, keyed by table name.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: BTreeMap<String, TableBatch>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&TableBatch> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map_or(0, TableBatch::len)
    }
}

impl StorageSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn check(&self, batch: &TableBatch) -> Result<(), StorageError> {
        match self.tables.get(&batch.name) {
            Some(table) if !batch.is_empty() => {
                let existing: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
                check_columns(batch, &existing)
            }
            _ => Ok(()),
        }
    }

    fn append_rows(&mut self, batch: &TableBatch) -> Result<usize, StorageError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let Some(table) = self.tables.get_mut(&batch.name) else {
            self.tables.insert(batch.name.clone(), batch.clone());
            return Ok(batch.len());
        };

        let existing: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
        check_columns(batch, &existing)?;

        // Re-order incoming cells to the stored column order.
        let positions: Vec<Option<usize>> = existing
            .iter()
            .map(|name| batch.columns.iter().position(|c| &c.name == name))
            .collect();
        for row in &batch.rows {
            table.rows.push(
                positions
                    .iter()
                    .map(|p| p.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null))
                    .collect(),
            );
        }
        Ok(batch.len())
    }
}
