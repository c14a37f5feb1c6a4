//! Storage-bound tables built from a deduplicated batch.
//!
//! Three tables come out of every file: `underlying`, `instrument`, and the
//! market-data table (routed name or `market_data`, see `TableLayout`).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dedupe::DedupedBatch;
use crate::domain::{Instrument, MarketRow, Underlying};
use crate::routing::route_table_name;

pub const UNDERLYING_TABLE: &str = "underlying";
pub const INSTRUMENT_TABLE: &str = "instrument";
pub const MARKET_DATA_TABLE: &str = "market_data";

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Rows bound for one named table. Every row has one value per column;
/// values are either `Null` or match the column's kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
}

impl TableBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn underlyings<'a>(items: impl IntoIterator<Item = &'a Underlying>) -> Self {
        Self {
            name: UNDERLYING_TABLE.to_string(),
            columns: vec![
                ColumnDef::new("exch", ColumnKind::Text),
                ColumnDef::new("symbol", ColumnKind::Text),
                ColumnDef::new("expiry", ColumnKind::Integer),
                ColumnDef::new("inst_type", ColumnKind::Text),
            ],
            rows: items.into_iter().map(Underlying::to_row).collect(),
        }
    }

    /// The underlying association is not a column.
    pub fn instruments<'a>(items: impl IntoIterator<Item = &'a Instrument>) -> Self {
        Self {
            name: INSTRUMENT_TABLE.to_string(),
            columns: vec![
                ColumnDef::new("exch", ColumnKind::Text),
                ColumnDef::new("symbol", ColumnKind::Text),
                ColumnDef::new("expiry", ColumnKind::Integer),
                ColumnDef::new("maturity", ColumnKind::Integer),
                ColumnDef::new("inst_type", ColumnKind::Text),
                ColumnDef::new("strike", ColumnKind::Real),
            ],
            rows: items.into_iter().map(Instrument::to_row).collect(),
        }
    }

    /// Market rows: `date` first, then the sorted union of attribute keys.
    /// A key missing from a row is `Null` in that row.
    pub fn market_rows(name: impl Into<String>, rows: &[MarketRow]) -> Self {
        let keys: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.attributes.keys().map(String::as_str))
            .filter(|k| *k != "date")
            .collect();

        let mut columns = vec![ColumnDef::new("date", ColumnKind::Date)];
        columns.extend(keys.iter().map(|k| ColumnDef::new(*k, ColumnKind::Text)));

        let rows = rows
            .iter()
            .map(|r| {
                let mut values = Vec::with_capacity(columns.len());
                values.push(Value::Date(r.date));
                values.extend(keys.iter().map(|k| match r.attributes.get(*k) {
                    Some(v) => Value::Text(v.clone()),
                    None => Value::Null,
                }));
                values
            })
            .collect();

        Self {
            name: name.into(),
            columns,
            rows,
        }
    }
}

/// Where observation rows land.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLayout {
    /// One table per file family, named by `route_table_name`.
    #[default]
    Routed,
    /// Everything in `market_data`.
    Single,
}

impl TableLayout {
    pub fn market_table(self, filename: &str) -> String {
        match self {
            TableLayout::Routed => route_table_name(filename),
            TableLayout::Single => MARKET_DATA_TABLE.to_string(),
        }
    }
}

impl FromStr for TableLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "routed" => Ok(TableLayout::Routed),
            "single" => Ok(TableLayout::Single),
            other => Err(format!("unknown table layout '{other}' (expected routed or single)")),
        }
    }
}

impl fmt::Display for TableLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableLayout::Routed => write!(f, "routed"),
            TableLayout::Single => write!(f, "single"),
        }
    }
}

/// Build the storage batches for one file. Empty tables are left out.
pub fn build_tables(filename: &str, batch: &DedupedBatch, layout: TableLayout) -> Vec<TableBatch> {
    [
        TableBatch::underlyings(&batch.underlyings),
        TableBatch::instruments(&batch.instruments),
        TableBatch::market_rows(layout.market_table(filename), &batch.rows),
    ]
    .into_iter()
    .filter(|t| !t.is_empty())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attributes;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn market_row(pairs: &[(&str, &str)]) -> MarketRow {
        MarketRow {
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            attributes: attrs(pairs),
        }
    }

    #[test]
    fn market_columns_are_date_then_sorted_union() {
        let rows = vec![
            market_row(&[("Px", "1.5"), ("Typ", "6")]),
            market_row(&[("Sz", "10"), ("Typ", "B")]),
        ];
        let table = TableBatch::market_rows("cme", &rows);
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["date", "Px", "Sz", "Typ"]);
        assert_eq!(
            table.rows[1],
            vec![
                Value::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()),
                Value::Null,
                Value::Text("10".into()),
                Value::Text("B".into()),
            ]
        );
    }

    #[test]
    fn instrument_row_has_six_identity_columns() {
        let inst = Instrument::from_attributes(
            &attrs(&[("Exch", "CME"), ("Sym", "ES"), ("MMY", "202403")]),
            None,
        )
        .unwrap();
        let table = TableBatch::instruments([&inst]);
        assert_eq!(table.name, INSTRUMENT_TABLE);
        assert_eq!(
            table.rows[0],
            vec![
                Value::Text("CME".into()),
                Value::Text("ES".into()),
                Value::Integer(20240301),
                Value::Integer(0),
                Value::Text("F".into()),
                Value::Real(0.0),
            ]
        );
    }

    #[test]
    fn layout_selects_market_table() {
        assert_eq!(TableLayout::Routed.market_table("cme.fwd.settle.s.xml"), "cme_settle");
        assert_eq!(TableLayout::Single.market_table("cme.fwd.settle.s.xml"), "market_data");
        assert_eq!("SINGLE".parse::<TableLayout>().unwrap(), TableLayout::Single);
        assert!("wide".parse::<TableLayout>().is_err());
    }

    #[test]
    fn empty_tables_are_omitted() {
        let batch = DedupedBatch::default();
        assert!(build_tables("cme.settle.s.xml", &batch, TableLayout::Routed).is_empty());
    }
}
