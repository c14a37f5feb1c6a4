//! SQLite sink.

use std::path::PathBuf;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use super::{check_columns, StorageError, StorageSink};
use crate::table::{ColumnKind, TableBatch, Value};

pub struct SqliteSink {
    conn: Connection,
    label: String,
}

impl SqliteSink {
    /// Open (or create) a database file. Parent directories are created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let conn = Connection::open(&path)?;
        info!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            conn,
            label: format!("sqlite:{}", path.display()),
        })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            label: "sqlite::memory:".to_string(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Column names of `table`, empty when the table does not exist.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn row_count(&self, table: &str) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn create_table(&self, batch: &TableBatch) -> Result<(), StorageError> {
        let columns: Vec<String> = batch
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), sql_type(c.kind)))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&batch.name),
            columns.join(", ")
        );
        debug!(table = %batch.name, "{sql}");
        self.conn.execute_batch(&sql)?;
        Ok(())
    }
}

impl StorageSink for SqliteSink {
    fn name(&self) -> &str {
        &self.label
    }

    fn check(&self, batch: &TableBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let existing = self.table_columns(&batch.name)?;
        if existing.is_empty() {
            return Ok(());
        }
        check_columns(batch, &existing)
    }

    fn append_rows(&mut self, batch: &TableBatch) -> Result<usize, StorageError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let existing = self.table_columns(&batch.name)?;
        if existing.is_empty() {
            self.create_table(batch)?;
        } else {
            check_columns(batch, &existing)?;
        }

        let names: Vec<String> = batch.column_names().map(quote_ident).collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&batch.name),
            names.join(", "),
            placeholders
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &batch.rows {
                stmt.execute(params_from_iter(row.iter().map(to_sql)))?;
            }
        }
        tx.commit()?;

        debug!(table = %batch.name, rows = batch.len(), "appended");
        Ok(batch.len())
    }
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer => "INTEGER",
        ColumnKind::Real => "REAL",
        ColumnKind::Text | ColumnKind::Date => "TEXT",
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
