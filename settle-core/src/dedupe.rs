//! Collapse repeated entity references into distinct sets.

use std::collections::BTreeSet;

use crate::domain::{Instrument, MarketRow, ObservationRow, Underlying};

/// Distinct entities of one file plus its stripped observation rows.
#[derive(Debug, Default)]
pub struct DedupedBatch {
    pub underlyings: BTreeSet<Underlying>,
    pub instruments: BTreeSet<Instrument>,
    pub rows: Vec<MarketRow>,
}

/// Deduplicate underlyings and instruments by identity.
///
/// Rows are never deduplicated: the output has exactly as many rows as the
/// input, in the same order. Rows without an underlying simply contribute
/// nothing to the underlying set.
pub fn dedupe(rows: Vec<ObservationRow>) -> DedupedBatch {
    let mut batch = DedupedBatch {
        rows: Vec::with_capacity(rows.len()),
        ..Default::default()
    };

    for mut row in rows {
        if let Some(und) = row.underlying.take() {
            if !batch.underlyings.contains(&*und) {
                batch.underlyings.insert((*und).clone());
            }
        }
        if let Some(inst) = row.instrument.take() {
            if !batch.instruments.contains(&*inst) {
                batch.instruments.insert(inst.detached());
            }
        }
        batch.rows.push(row.into_market_row());
    }

    batch
}
