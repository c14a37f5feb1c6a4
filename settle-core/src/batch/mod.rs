//! Settlement batch parser.
//!
//! Expected hierarchy (local names, namespaces ignored):
//!
//! ```text
//! FIXML
//! └── Batch
//!     └── MktDataFull BizDt="YYYY-MM-DD" ...   (one per instrument group)
//!         ├── Instrmt ...                       (required)
//!         ├── Undly ...                         (optional)
//!         └── Full ...                          (zero or more quotes)
//! ```
//!
//! Every `Full` record becomes one `ObservationRow`. A group whose entities
//! lack a required identity attribute is skipped and reported; any other
//! failure rejects the whole document. Dates are checked before identity
//! attributes, so a malformed date fails the document even in a group that
//! would otherwise be skipped.

pub mod xml;

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::attrs::parse_iso_date;
use crate::domain::{Instrument, ObservationRow, Underlying};
use crate::error::IngestError;
use xml::Element;

/// The document does not have the expected batch structure.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("invalid UTF-8 in element or attribute name: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("document is empty")]
    EmptyDocument,

    #[error("document ends inside an open element")]
    Truncated,

    #[error("document has more than one root element")]
    MultipleRoots,

    #[error("<{parent}> has no <{child}> element")]
    MissingElement { parent: String, child: &'static str },

    #[error("instrument group {index} has no date attribute")]
    MissingGroupDate { index: usize },
}

/// A group left out of the result because of a missing identity attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedGroup {
    /// Position of the `MktDataFull` element within the batch.
    pub index: usize,
    pub entity: &'static str,
    pub field: &'static str,
}

/// Output of parsing one settlement document.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub rows: Vec<ObservationRow>,
    /// Number of instrument groups in the document, skipped ones included.
    pub groups: usize,
    pub skipped: Vec<SkippedGroup>,
}

/// Parse a settlement document into observation rows.
pub fn parse(bytes: &[u8]) -> Result<BatchResult, IngestError> {
    let root = xml::read_document(bytes)?;
    let batch = root.child("Batch").ok_or_else(|| ParseError::MissingElement {
        parent: root.name.clone(),
        child: "Batch",
    })?;

    let groups: Vec<&Element> = batch.children_named("MktDataFull").collect();
    if groups.is_empty() {
        return Err(ParseError::MissingElement {
            parent: batch.name.clone(),
            child: "MktDataFull",
        }
        .into());
    }

    let mut result = BatchResult {
        groups: groups.len(),
        ..Default::default()
    };

    for (index, group) in groups.into_iter().enumerate() {
        match parse_group(index, group) {
            Ok(rows) => result.rows.extend(rows),
            Err(IngestError::MissingField { entity, field }) => {
                warn!(group = index, entity, field, "skipping instrument group");
                result.skipped.push(SkippedGroup {
                    index,
                    entity,
                    field,
                });
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        groups = result.groups,
        rows = result.rows.len(),
        skipped = result.skipped.len(),
        "parsed settlement batch"
    );
    Ok(result)
}

fn parse_group(index: usize, group: &Element) -> Result<Vec<ObservationRow>, IngestError> {
    let instrmt = group
        .child("Instrmt")
        .ok_or_else(|| ParseError::MissingElement {
            parent: group.name.clone(),
            child: "Instrmt",
        })?;
    let inst_attrs = instrmt.attr_map();
    let date = group_date(index, group)?;

    // Build both entities before giving up on either, so a malformed date in
    // one is not hidden behind a missing field in the other.
    let underlying = group
        .child("Undly")
        .map(|u| Underlying::from_attributes(&u.attr_map()))
        .transpose();
    let instrument = Instrument::from_attributes(&inst_attrs, None);
    let (underlying, mut instrument) = match (underlying, instrument) {
        (Ok(u), Ok(i)) => (u.map(Arc::new), i),
        (Err(e @ IngestError::MalformedDate { .. }), _)
        | (_, Err(e @ IngestError::MalformedDate { .. })) => return Err(e),
        (Err(e), _) | (_, Err(e)) => return Err(e),
    };
    instrument.underlying = underlying.clone();
    let instrument = Arc::new(instrument);

    let rows = group
        .children_named("Full")
        .map(|full| {
            let mut attributes = full.attr_map();
            attributes.extend(inst_attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
            ObservationRow {
                date,
                attributes,
                instrument: Some(Arc::clone(&instrument)),
                underlying: underlying.clone(),
            }
        })
        .collect();
    Ok(rows)
}

/// The group date is the first attribute of `MktDataFull` (`BizDt` in
/// practice), whatever its name.
fn group_date(index: usize, group: &Element) -> Result<NaiveDate, IngestError> {
    let (field, raw) = group
        .first_attr()
        .ok_or(ParseError::MissingGroupDate { index })?;
    parse_iso_date(field, raw)
}
