//! Comparison-key canonicalization.
//!
//! Floats and timestamps from independently encoded sources are not safe to
//! compare for equality. Every attribute is reduced to a coarse string form
//! (one decimal place, `YYYY-MM-DD`) before it joins a key.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::config::{AttributeSpec, GeoMatch};
use crate::model::{
    CanonicalKey, CanonicalValue, ClaimRecord, Coverage, FieldValue, PolicyRecord,
    PreparedClaim, PreparedPolicy,
};

/// Fixed one-decimal representation.
pub fn canonical_float(value: f64) -> String {
    format!("{value:.1}")
}

/// Calendar-day representation; sub-day precision is dropped.
pub fn canonical_date(value: NaiveDateTime) -> String {
    value.date().format("%Y-%m-%d").to_string()
}

/// `None` means the value is missing and the record cannot be keyed.
pub fn canonical_value(value: &FieldValue) -> Option<CanonicalValue> {
    let text = match value {
        FieldValue::Null => return None,
        FieldValue::Float(x) => canonical_float(*x),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::DateTime(dt) => canonical_date(*dt),
        FieldValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.to_string()
        }
        FieldValue::Coverage(Coverage::NoneSelected) => {
            return Some(CanonicalValue::NoCoverageSelected)
        }
        FieldValue::Coverage(Coverage::Amount(x)) => canonical_float(*x),
        FieldValue::Coverage(Coverage::Code(code)) => code.trim().to_string(),
    };
    Some(CanonicalValue::Value(text))
}

/// Key over `fields` in order. Absent attributes count as missing.
pub fn canonical_key(
    attributes: &HashMap<String, FieldValue>,
    fields: &[&AttributeSpec],
) -> Option<CanonicalKey> {
    let mut values = Vec::with_capacity(fields.len() + 1);
    for field in fields {
        let value = attributes.get(&field.name)?;
        values.push(canonical_value(value)?);
    }
    Some(CanonicalKey(values))
}

fn area_for(area_id: &Option<String>, geo: GeoMatch) -> Option<Option<String>> {
    match geo {
        GeoMatch::Ignore => Some(area_id.clone()),
        GeoMatch::Exact | GeoMatch::Overlap => {
            let area = area_id.as_deref().map(str::trim).filter(|a| !a.is_empty())?;
            Some(Some(area.to_string()))
        }
    }
}

/// Key a policy for one stage. `None` when any required field is missing.
///
/// With `GeoMatch::Exact` the area identifier is appended to the key.
pub fn prepare_policy(
    record: &PolicyRecord,
    fields: &[&AttributeSpec],
    geo: GeoMatch,
) -> Option<PreparedPolicy> {
    let effective = record.effective_date?;
    let termination = record.termination_date?;
    let area_id = area_for(&record.area_id, geo)?;
    let mut key = canonical_key(&record.attributes, fields)?;
    if geo == GeoMatch::Exact {
        if let Some(ref area) = area_id {
            key.0.push(CanonicalValue::Value(area.clone()));
        }
    }
    Some(PreparedPolicy {
        id: record.id.clone(),
        effective,
        termination,
        area_id,
        key,
    })
}

pub fn prepare_claim(
    record: &ClaimRecord,
    fields: &[&AttributeSpec],
    geo: GeoMatch,
) -> Option<PreparedClaim> {
    let date_of_loss = record.date_of_loss?;
    let area_id = area_for(&record.area_id, geo)?;
    let mut key = canonical_key(&record.attributes, fields)?;
    if geo == GeoMatch::Exact {
        if let Some(ref area) = area_id {
            key.0.push(CanonicalValue::Value(area.clone()));
        }
    }
    Some(PreparedClaim {
        id: record.id.clone(),
        date_of_loss,
        area_id,
        key,
    })
}
