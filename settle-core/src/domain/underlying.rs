use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::attrs::{encode_expiry, optional, required, Attributes};
use crate::error::IngestError;
use crate::table::Value;

/// Security type of an underlying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UnderlyingType {
    /// `F`
    Future,
    /// `S`, anything that is not a future
    Spot,
}

impl UnderlyingType {
    pub fn code(self) -> char {
        match self {
            UnderlyingType::Future => 'F',
            UnderlyingType::Spot => 'S',
        }
    }
}

/// The base security a derivative instrument refers to.
///
/// Identity is the tuple `(exch, symbol, expiry, inst_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Underlying {
    pub exch: String,
    pub symbol: String,
    /// `YYYYMMDD` encoding, 0 when the underlying does not expire.
    pub expiry: u32,
    pub inst_type: UnderlyingType,
}

impl Underlying {
    const ENTITY: &'static str = "Underlying";

    /// Build from the attribute set of an `Undly` element.
    ///
    /// Requires `Exch` and `ID`; reads `MMY` and `SecTyp` when present.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self, IngestError> {
        let expiry = encode_expiry(optional(attrs, "MMY"))?;
        let exch = required(attrs, Self::ENTITY, "Exch")?;
        let symbol = required(attrs, Self::ENTITY, "ID")?;
        let inst_type = match optional(attrs, "SecTyp") {
            Some("FUT") => UnderlyingType::Future,
            _ => UnderlyingType::Spot,
        };
        Ok(Self {
            exch: exch.to_string(),
            symbol: symbol.to_string(),
            expiry,
            inst_type,
        })
    }

    pub fn identity(&self) -> (&str, &str, u32, UnderlyingType) {
        (&self.exch, &self.symbol, self.expiry, self.inst_type)
    }

    /// Storage row: `exch, symbol, expiry, inst_type`.
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Text(self.exch.clone()),
            Value::Text(self.symbol.clone()),
            Value::Integer(self.expiry.into()),
            Value::Text(self.inst_type.code().to_string()),
        ]
    }
}

impl PartialEq for Underlying {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Underlying {}

impl Hash for Underlying {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for Underlying {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Underlying {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl fmt::Display for Underlying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.exch,
            self.symbol,
            self.expiry,
            self.inst_type.code()
        )
    }
}
