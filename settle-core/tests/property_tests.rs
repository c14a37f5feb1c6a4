//! Property tests for ingestion invariants.
//!
//! Uses proptest to verify:
//! 1. Routing is deterministic and ignores directories
//! 2. Expiry encoding always yields a YYYYMMDD-shaped integer
//! 3. Instrument identity ignores the underlying association
//! 4. Dedupe keeps every row and yields distinct entities
//! 5. Every `Full` record becomes exactly one row

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use settle_core::batch;
use settle_core::dedupe::dedupe;
use settle_core::domain::attrs::encode_expiry;
use settle_core::domain::{Attributes, Instrument, ObservationRow, Underlying};
use settle_core::routing::route_table_name;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

fn arb_filename() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..6).prop_map(|segs| segs.join("."))
}

fn arb_instrument_attrs() -> impl Strategy<Value = Attributes> {
    (
        prop::sample::select(vec!["CME", "CBT", "NYMEX"]),
        prop::sample::select(vec!["ES", "NQ", "CL", "ZN"]),
        2020u32..2030,
        1u32..13,
        prop::option::of(0u32..100),
    )
        .prop_map(|(exch, sym, year, month, strike)| {
            let mut attrs = Attributes::new();
            attrs.insert("Exch".into(), exch.into());
            attrs.insert("Sym".into(), sym.into());
            attrs.insert("MMY".into(), format!("{year}{month:02}"));
            if let Some(k) = strike {
                attrs.insert("PutCall".into(), "1".into());
                attrs.insert("StrkPx".into(), (k * 25).to_string());
            }
            attrs
        })
}

// ── 1. Routing ───────────────────────────────────────────────────────

proptest! {
    /// Same input, same table; any string is accepted.
    #[test]
    fn routing_is_deterministic(name in ".*") {
        prop_assert_eq!(route_table_name(&name), route_table_name(&name));
    }

    /// Only the basename matters.
    #[test]
    fn routing_ignores_directory(dir in "[a-z]{1,8}(/[a-z]{1,8}){0,3}", name in arb_filename()) {
        let full = format!("{dir}/{name}");
        prop_assert_eq!(route_table_name(&full), route_table_name(&name));
    }

    /// Without `fwd`, the table is the first dot segment.
    #[test]
    fn plain_names_route_to_first_segment(name in arb_filename()) {
        prop_assume!(!name.contains("fwd"));
        let first = name.split('.').next().unwrap().to_string();
        prop_assert_eq!(route_table_name(&name), first);
    }
}

// ── 2. Expiry encoding ───────────────────────────────────────────────

proptest! {
    /// Six-digit YYYYMM gains a `01` day; eight-digit values pass through.
    #[test]
    fn expiry_is_yyyymmdd(year in 1990u32..2100, month in 1u32..13, day in 1u32..29) {
        let month_only = encode_expiry(Some(format!("{year}{month:02}").as_str())).unwrap();
        prop_assert_eq!(month_only, year * 10000 + month * 100 + 1);

        let full = encode_expiry(Some(format!("{year}{month:02}{day:02}").as_str())).unwrap();
        prop_assert_eq!(full, year * 10000 + month * 100 + day);
    }
}

// ── 3. Identity ──────────────────────────────────────────────────────

proptest! {
    /// Attaching an underlying never changes instrument equality.
    #[test]
    fn identity_ignores_underlying(attrs in arb_instrument_attrs()) {
        let mut und_attrs = Attributes::new();
        und_attrs.insert("Exch".into(), "CME".into());
        und_attrs.insert("ID".into(), "ES".into());
        let und = Arc::new(Underlying::from_attributes(&und_attrs).unwrap());

        let bare = Instrument::from_attributes(&attrs, None).unwrap();
        let linked = Instrument::from_attributes(&attrs, Some(und)).unwrap();
        prop_assert_eq!(&bare, &linked);
        prop_assert_eq!(bare.cmp(&linked), std::cmp::Ordering::Equal);
    }
}

// ── 4. Dedupe ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn dedupe_preserves_rows_and_collapses_entities(
        groups in prop::collection::vec(arb_instrument_attrs(), 1..30)
    ) {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let rows: Vec<ObservationRow> = groups
            .iter()
            .map(|attrs| ObservationRow {
                date,
                attributes: attrs.clone(),
                instrument: Some(Arc::new(Instrument::from_attributes(attrs, None).unwrap())),
                underlying: None,
            })
            .collect();
        let distinct: BTreeSet<Attributes> = groups.iter().cloned().collect();

        let batch = dedupe(rows);
        prop_assert_eq!(batch.rows.len(), groups.len());
        prop_assert_eq!(batch.instruments.len(), distinct.len());
        prop_assert!(batch.underlyings.is_empty());
        for (row, attrs) in batch.rows.iter().zip(&groups) {
            prop_assert_eq!(&row.attributes, attrs);
        }
    }
}

// ── 5. Row count ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn one_row_per_full_record(fulls in prop::collection::vec(0usize..5, 1..10)) {
        let body: String = fulls
            .iter()
            .enumerate()
            .map(|(g, n)| {
                let quotes: String = (0..*n)
                    .map(|q| format!(r#"<Full Typ="6" Px="{g}.{q}"/>"#))
                    .collect();
                format!(
                    r#"<MktDataFull BizDt="2024-03-15"><Instrmt Sym="S{g}" Exch="CME"/>{quotes}</MktDataFull>"#
                )
            })
            .collect();
        let doc = format!("<FIXML><Batch>{body}</Batch></FIXML>");

        let result = batch::parse(doc.as_bytes()).unwrap();
        prop_assert_eq!(result.groups, fulls.len());
        prop_assert_eq!(result.rows.len(), fulls.iter().sum::<usize>());
        prop_assert!(result.skipped.is_empty());
    }
}
