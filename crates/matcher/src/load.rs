//! CSV loading for policies, claims and the vintage crosswalk.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::{AttributeKind, AttributeSpec, MatchConfig, Stage};
use crate::error::MatchError;
use crate::model::{ClaimRecord, Coverage, CrosswalkRow, FieldValue, LinkageInput, PolicyRecord};

const POLICIES: &str = "policies";
const CLAIMS: &str = "claims";
const CROSSWALK: &str = "crosswalk";

/// Parse the date/time spellings found in administrative extracts.
///
/// Offsets are converted to UTC before the value is returned.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc())
}

/// Reads a header row and resolves column names to indices.
struct HeaderIndex {
    source_name: &'static str,
    headers: Vec<String>,
}

impl HeaderIndex {
    fn idx(&self, name: &str) -> Result<usize, MatchError> {
        self.headers.iter().position(|h| h == name).ok_or_else(|| {
            MatchError::MissingColumn {
                source_name: self.source_name.into(),
                column: name.into(),
            }
        })
    }
}

fn csv_err(source_name: &str, e: csv::Error) -> MatchError {
    MatchError::Csv {
        source_name: source_name.into(),
        message: e.to_string(),
    }
}

fn open<R: Read>(source_name: &'static str, reader: R) -> Result<(csv::Reader<R>, HeaderIndex), MatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| csv_err(source_name, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    Ok((reader, HeaderIndex { source_name, headers }))
}

/// The raw token that marks "no coverage selected". A numeric sentinel also
/// matches any spelling of the same number (`-9999.0` for `-9999`).
struct CoverageSentinel<'a> {
    raw: &'a str,
    value: Option<f64>,
}

impl<'a> CoverageSentinel<'a> {
    fn new(raw: &'a str) -> Self {
        let raw = raw.trim();
        Self {
            raw,
            value: raw.parse::<f64>().ok().filter(|x| x.is_finite()),
        }
    }

    fn matches(&self, cell: &str, parsed: Option<f64>) -> bool {
        cell == self.raw || matches!((self.value, parsed), (Some(s), Some(x)) if s == x)
    }
}

/// Context for field-level parse errors.
struct Cell<'a> {
    source_name: &'static str,
    record_id: &'a str,
    column: &'a str,
}

impl Cell<'_> {
    fn date_err(&self, value: &str) -> MatchError {
        MatchError::DateParse {
            source_name: self.source_name.into(),
            record_id: self.record_id.into(),
            column: self.column.into(),
            value: value.into(),
        }
    }

    fn number_err(&self, value: &str) -> MatchError {
        MatchError::NumberParse {
            source_name: self.source_name.into(),
            record_id: self.record_id.into(),
            column: self.column.into(),
            value: value.into(),
        }
    }

    fn date(&self, raw: &str) -> Result<Option<NaiveDate>, MatchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        parse_datetime(raw)
            .map(|dt| Some(dt.date()))
            .ok_or_else(|| self.date_err(raw))
    }

    fn field(
        &self,
        kind: AttributeKind,
        raw: &str,
        sentinel: &CoverageSentinel<'_>,
    ) -> Result<FieldValue, MatchError> {
        let raw = raw.trim();
        match kind {
            AttributeKind::Coverage => {
                let amount = raw.parse::<f64>().ok().filter(|x| x.is_finite());
                Ok(FieldValue::Coverage(if raw.is_empty() || sentinel.matches(raw, amount) {
                    Coverage::NoneSelected
                } else if let Some(x) = amount {
                    Coverage::Amount(x)
                } else {
                    Coverage::Code(raw.to_string())
                }))
            }
            _ if raw.is_empty() => Ok(FieldValue::Null),
            AttributeKind::Float => {
                let x: f64 = raw.parse().map_err(|_| self.number_err(raw))?;
                Ok(if x.is_finite() { FieldValue::Float(x) } else { FieldValue::Null })
            }
            AttributeKind::Integer => {
                if let Ok(n) = raw.parse::<i64>() {
                    return Ok(FieldValue::Integer(n));
                }
                // Integer columns exported through a float type ("2.0").
                match raw.parse::<f64>() {
                    Ok(x) if x.is_nan() => Ok(FieldValue::Null),
                    Ok(x) if x.fract() == 0.0 && x.abs() < 9.0e15 => {
                        Ok(FieldValue::Integer(x as i64))
                    }
                    _ => Err(self.number_err(raw)),
                }
            }
            AttributeKind::Date => parse_datetime(raw)
                .map(FieldValue::DateTime)
                .ok_or_else(|| self.date_err(raw)),
            AttributeKind::Text => Ok(FieldValue::Text(raw.to_string())),
        }
    }
}

fn optional_text(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

fn require_id(source_name: &'static str, raw: &str, line: u64) -> Result<String, MatchError> {
    optional_text(raw).ok_or_else(|| MatchError::Csv {
        source_name: source_name.into(),
        message: format!("empty record id on line {line}"),
    })
}

fn check_unique(
    source_name: &'static str,
    seen: &mut HashSet<String>,
    id: &str,
) -> Result<(), MatchError> {
    if !seen.insert(id.to_string()) {
        return Err(MatchError::DuplicateId {
            source_name: source_name.into(),
            record_id: id.into(),
        });
    }
    Ok(())
}

/// Load the policies of one jurisdiction. Every configured attribute is read.
pub fn load_policies<R: Read>(
    reader: R,
    jurisdiction: &str,
    config: &MatchConfig,
) -> Result<Vec<PolicyRecord>, MatchError> {
    let (mut reader, headers) = open(POLICIES, reader)?;
    let col = &config.policies.columns;

    let id_idx = headers.idx(&col.id)?;
    let jurisdiction_idx = headers.idx(&col.jurisdiction)?;
    let effective_idx = headers.idx(&col.effective_date)?;
    let termination_idx = headers.idx(&col.termination_date)?;
    let area_idx = headers.idx(&col.area_id)?;
    let attr_idx: Vec<(&AttributeSpec, usize)> = config
        .attributes
        .iter()
        .map(|a| headers.idx(&a.name).map(|i| (a, i)))
        .collect::<Result<_, _>>()?;

    let sentinel = CoverageSentinel::new(&config.coverage.sentinel);
    let mut seen = HashSet::new();
    let mut policies = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| csv_err(POLICIES, e))?;
        if record.get(jurisdiction_idx).unwrap_or("").trim() != jurisdiction {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line());
        let id = require_id(POLICIES, record.get(id_idx).unwrap_or(""), line)?;
        check_unique(POLICIES, &mut seen, &id)?;

        let cell = |column: &'static str| Cell {
            source_name: POLICIES,
            record_id: &id,
            column,
        };
        let effective_date = cell("effective_date").date(record.get(effective_idx).unwrap_or(""))?;
        let termination_date =
            cell("termination_date").date(record.get(termination_idx).unwrap_or(""))?;

        let mut attributes = HashMap::with_capacity(attr_idx.len());
        for (spec, i) in &attr_idx {
            let c = Cell {
                source_name: POLICIES,
                record_id: &id,
                column: &spec.name,
            };
            let value = c.field(spec.kind, record.get(*i).unwrap_or(""), &sentinel)?;
            attributes.insert(spec.name.clone(), value);
        }

        policies.push(PolicyRecord {
            id,
            jurisdiction: jurisdiction.to_string(),
            effective_date,
            termination_date,
            area_id: optional_text(record.get(area_idx).unwrap_or("")),
            attributes,
        });
    }

    Ok(policies)
}

/// Load the claims of one jurisdiction, renaming claim-side attribute headers
/// to their policy-side names. Only claim-stage attributes are read.
pub fn load_claims<R: Read>(
    reader: R,
    jurisdiction: &str,
    config: &MatchConfig,
) -> Result<Vec<ClaimRecord>, MatchError> {
    let (mut reader, headers) = open(CLAIMS, reader)?;
    let col = &config.claims.columns;

    let id_idx = headers.idx(&col.id)?;
    let jurisdiction_idx = headers.idx(&col.jurisdiction)?;
    let loss_idx = headers.idx(&col.date_of_loss)?;
    let area_idx = headers.idx(&col.area_id)?;
    let attr_idx: Vec<(&AttributeSpec, usize)> = config
        .stage_attributes(Stage::Claims)
        .into_iter()
        .map(|a| headers.idx(a.claim_header()).map(|i| (a, i)))
        .collect::<Result<_, _>>()?;

    let sentinel = CoverageSentinel::new(&config.coverage.sentinel);
    let mut seen = HashSet::new();
    let mut claims = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| csv_err(CLAIMS, e))?;
        if record.get(jurisdiction_idx).unwrap_or("").trim() != jurisdiction {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line());
        let id = require_id(CLAIMS, record.get(id_idx).unwrap_or(""), line)?;
        check_unique(CLAIMS, &mut seen, &id)?;

        let loss = Cell {
            source_name: CLAIMS,
            record_id: &id,
            column: "date_of_loss",
        };
        let date_of_loss = loss.date(record.get(loss_idx).unwrap_or(""))?;

        let mut attributes = HashMap::with_capacity(attr_idx.len());
        for (spec, i) in &attr_idx {
            let c = Cell {
                source_name: CLAIMS,
                record_id: &id,
                column: spec.claim_header(),
            };
            let value = c.field(spec.kind, record.get(*i).unwrap_or(""), &sentinel)?;
            attributes.insert(spec.name.clone(), value);
        }

        claims.push(ClaimRecord {
            id,
            jurisdiction: jurisdiction.to_string(),
            date_of_loss,
            area_id: optional_text(record.get(area_idx).unwrap_or("")),
            attributes,
        });
    }

    Ok(claims)
}

pub fn load_crosswalk<R: Read>(reader: R) -> Result<Vec<CrosswalkRow>, MatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    reader
        .deserialize()
        .map(|row| row.map_err(|e| csv_err(CROSSWALK, e)))
        .collect()
}

fn open_file(base_dir: &Path, file: &str) -> Result<std::fs::File, MatchError> {
    let path = base_dir.join(file);
    std::fs::File::open(&path)
        .map_err(|e| MatchError::Io(format!("cannot read {}: {e}", path.display())))
}

/// Read every source for one jurisdiction. Paths resolve against `base_dir`.
pub fn load_input(
    config: &MatchConfig,
    base_dir: &Path,
    jurisdiction: &str,
) -> Result<LinkageInput, MatchError> {
    config.check_jurisdiction(jurisdiction)?;

    let policies = load_policies(
        std::io::BufReader::new(open_file(base_dir, &config.policies.file)?),
        jurisdiction,
        config,
    )?;
    let claims = load_claims(
        std::io::BufReader::new(open_file(base_dir, &config.claims.file)?),
        jurisdiction,
        config,
    )?;
    let crosswalk = match config.geography {
        Some(ref geo) => load_crosswalk(std::io::BufReader::new(open_file(base_dir, &geo.crosswalk)?))?,
        None => Vec::new(),
    };

    tracing::info!(
        jurisdiction,
        policies = policies.len(),
        claims = claims.len(),
        crosswalk_rows = crosswalk.len(),
        "inputs loaded"
    );

    Ok(LinkageInput {
        policies,
        claims,
        crosswalk,
    })
}
