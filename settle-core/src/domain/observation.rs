use std::sync::Arc;

use chrono::NaiveDate;

use super::attrs::Attributes;
use super::instrument::Instrument;
use super::underlying::Underlying;

/// One flattened `Full` quote record with its owning entities attached.
#[derive(Debug, Clone)]
pub struct ObservationRow {
    /// Business date of the enclosing instrument group.
    pub date: NaiveDate,
    /// `Full` attributes overlaid by the group's `Instrmt` attributes.
    pub attributes: Attributes,
    pub instrument: Option<Arc<Instrument>>,
    pub underlying: Option<Arc<Underlying>>,
}

impl ObservationRow {
    /// Drop the entity associations, keeping only what is persisted.
    pub fn into_market_row(self) -> MarketRow {
        MarketRow {
            date: self.date,
            attributes: self.attributes,
        }
    }
}

/// Storage-bound form of an observation row.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRow {
    pub date: NaiveDate,
    pub attributes: Attributes,
}
