//! Raw attribute maps and the field encodings shared by the entity types.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::IngestError;

/// The attribute set of one XML element, keyed by local attribute name.
pub type Attributes = BTreeMap<String, String>;

/// Look up an optional attribute. Empty strings count as absent.
pub fn optional<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a str> {
    attrs
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Look up a required identity attribute.
pub fn required<'a>(
    attrs: &'a Attributes,
    entity: &'static str,
    key: &'static str,
) -> Result<&'a str, IngestError> {
    optional(attrs, key).ok_or(IngestError::MissingField { entity, field: key })
}

/// Encode a maturity-month-year string as an integer expiry.
///
/// Eight-digit values (`YYYYMMDD`) pass through; six-digit ones (`YYYYMM`)
/// get `01` appended. Absent values encode as 0. Anything else, including
/// signs, week codes and other lengths, is `MalformedDate`.
pub fn encode_expiry(mmy: Option<&str>) -> Result<u32, IngestError> {
    let Some(raw) = mmy else {
        return Ok(0);
    };
    let malformed = || IngestError::MalformedDate {
        field: "MMY".into(),
        value: raw.to_string(),
    };
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    // at most 8 digits, so the parse cannot overflow
    let value: u32 = raw.parse().map_err(|_| malformed())?;
    match raw.len() {
        8 => Ok(value),
        6 => Ok(value * 100 + 1),
        _ => Err(malformed()),
    }
}

/// Encode a `YYYY-MM-DD` date string as the integer `YYYYMMDD`.
pub fn encode_date(field: &str, raw: Option<&str>) -> Result<u32, IngestError> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    let date = parse_iso_date(field, raw)?;
    Ok(date_to_int(date))
}

/// Parse a fixed `YYYY-MM-DD` date.
pub fn parse_iso_date(field: &str, raw: &str) -> Result<NaiveDate, IngestError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| IngestError::MalformedDate {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

fn date_to_int(date: NaiveDate) -> u32 {
    use chrono::Datelike;
    // years before 0 never appear in settlement files; parse_from_str with %Y
    // accepts them, so clamp rather than wrap
    let year = date.year().max(0) as u32;
    year * 10_000 + date.month() * 100 + date.day()
}

/// Parse a strike price. Absent, unparsable and non-finite values are 0.0.
pub fn parse_strike(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| if v == 0.0 { 0.0 } else { v })
        .unwrap_or(0.0)
}
