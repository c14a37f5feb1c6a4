//! Entity model: underlyings, instruments and the observation rows that
//! reference them.

pub mod attrs;
pub mod instrument;
pub mod observation;
pub mod underlying;

pub use attrs::Attributes;
pub use instrument::{Instrument, InstrumentType, Strike};
pub use observation::{MarketRow, ObservationRow};
pub use underlying::{Underlying, UnderlyingType};
