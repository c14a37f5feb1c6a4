use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::attrs::{encode_date, encode_expiry, optional, parse_strike, required, Attributes};
use super::underlying::Underlying;
use crate::error::IngestError;
use crate::table::Value;

/// Contract type of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Future,
    Call,
    /// Never produced by `Instrument::from_attributes`, see there.
    Put,
    Spot,
}

impl InstrumentType {
    pub fn code(self) -> char {
        match self {
            InstrumentType::Future => 'F',
            InstrumentType::Call => 'C',
            InstrumentType::Put => 'P',
            InstrumentType::Spot => 'S',
        }
    }
}

/// Strike price with a total order, so it can take part in identity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strike(f64);

impl Strike {
    pub fn new(value: f64) -> Self {
        // -0.0 and 0.0 must be one strike
        Self(if value == 0.0 { 0.0 } else { value })
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Strike {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Strike {}

impl PartialOrd for Strike {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Strike {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Strike {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// A tradable contract, optionally linked to its underlying.
///
/// Identity is `(exch, symbol, expiry, maturity, inst_type, strike)`. The
/// `underlying` link is a parse-time association only: it does not take part
/// in equality, hashing or ordering, and is never written to storage.
#[derive(Debug, Clone)]
pub struct Instrument {
    pub exch: String,
    pub symbol: String,
    /// `YYYYMMDD` encoding, 0 when absent.
    pub expiry: u32,
    /// `YYYYMMDD`, 0 when absent.
    pub maturity: u32,
    pub inst_type: InstrumentType,
    pub strike: Strike,
    pub underlying: Option<Arc<Underlying>>,
}

impl Instrument {
    const ENTITY: &'static str = "Instrument";

    /// Build from the attribute set of an `Instrmt` element.
    ///
    /// Known limitation: any `PutCall` value resolves to `Call`. Settlement
    /// files seen so far give no way to tell which `PutCall` encoding means
    /// put, so the put branch stays unreachable until sample data shows it.
    pub fn from_attributes(
        attrs: &Attributes,
        underlying: Option<Arc<Underlying>>,
    ) -> Result<Self, IngestError> {
        let expiry = encode_expiry(optional(attrs, "MMY"))?;
        let maturity = encode_date("MatDt", optional(attrs, "MatDt"))?;
        let exch = required(attrs, Self::ENTITY, "Exch")?;
        let symbol = required(attrs, Self::ENTITY, "Sym")?;
        let inst_type = match optional(attrs, "PutCall") {
            None if expiry != 0 => InstrumentType::Future,
            None => InstrumentType::Spot,
            Some(_) => InstrumentType::Call,
        };
        let strike = Strike::new(parse_strike(optional(attrs, "StrkPx")));

        Ok(Self {
            exch: exch.to_string(),
            symbol: symbol.to_string(),
            expiry,
            maturity,
            inst_type,
            strike,
            underlying,
        })
    }

    pub fn identity(&self) -> (&str, &str, u32, u32, InstrumentType, Strike) {
        (
            &self.exch,
            &self.symbol,
            self.expiry,
            self.maturity,
            self.inst_type,
            self.strike,
        )
    }

    /// Storage row: `exch, symbol, expiry, maturity, inst_type, strike`.
    /// The underlying association is not part of it.
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Text(self.exch.clone()),
            Value::Text(self.symbol.clone()),
            Value::Integer(self.expiry.into()),
            Value::Integer(self.maturity.into()),
            Value::Text(self.inst_type.code().to_string()),
            Value::Real(self.strike.value()),
        ]
    }

    /// The same instrument with the underlying association cleared.
    pub fn detached(&self) -> Self {
        Self {
            underlying: None,
            ..self.clone()
        }
    }
}

impl PartialEq for Instrument {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Instrument {}

impl Hash for Instrument {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for Instrument {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Instrument {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.exch,
            self.symbol,
            self.expiry,
            self.maturity,
            self.inst_type.code(),
            self.strike.value()
        )
    }
}
