use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::geo::GeoFlags;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A typed attribute cell as read from a source file.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Float(f64),
    Integer(i64),
    DateTime(NaiveDateTime),
    Text(String),
    Coverage(Coverage),
}

/// Coverage amounts and deductible codes. Absence is a category of its own,
/// not missing data.
#[derive(Debug, Clone, PartialEq)]
pub enum Coverage {
    NoneSelected,
    Amount(f64),
    Code(String),
}

#[derive(Debug, Clone)]
pub struct PolicyRecord {
    pub id: String,
    pub jurisdiction: String,
    pub effective_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
    pub area_id: Option<String>,
    /// Keyed by canonical (policy-side) attribute name.
    pub attributes: HashMap<String, FieldValue>,
}

/// Claim-side attributes are stored under the policy-side names.
#[derive(Debug, Clone)]
pub struct ClaimRecord {
    pub id: String,
    pub jurisdiction: String,
    pub date_of_loss: Option<NaiveDate>,
    pub area_id: Option<String>,
    pub attributes: HashMap<String, FieldValue>,
}

/// Census-boundary definition year of an area identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Vintage {
    Y2000,
    Y2010,
    Y2020,
}

impl Vintage {
    pub const ALL: [Vintage; 3] = [Vintage::Y2000, Vintage::Y2010, Vintage::Y2020];

    pub fn from_year(year: u16) -> Option<Self> {
        match year {
            2000 => Some(Self::Y2000),
            2010 => Some(Self::Y2010),
            2020 => Some(Self::Y2020),
            _ => None,
        }
    }

    pub fn year(&self) -> u16 {
        match self {
            Self::Y2000 => 2000,
            Self::Y2010 => 2010,
            Self::Y2020 => 2020,
        }
    }
}

/// One geometry-intersection row: `left_id` (of `left_vintage`) overlaps `right_id`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrosswalkRow {
    #[serde(rename = "left_GEOID")]
    pub left_id: String,
    pub left_vintage: u16,
    #[serde(rename = "right_GEOID")]
    pub right_id: String,
    pub right_vintage: u16,
}

/// Pre-loaded records for one jurisdiction.
#[derive(Debug, Clone, Default)]
pub struct LinkageInput {
    pub policies: Vec<PolicyRecord>,
    pub claims: Vec<ClaimRecord>,
    pub crosswalk: Vec<CrosswalkRow>,
}

// ---------------------------------------------------------------------------
// Canonical keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalValue {
    Value(String),
    NoCoverageSelected,
}

/// Normalized attribute tuple used for equality matching. Never an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(pub Vec<CanonicalValue>);

/// A policy that passed the missing-data check for a stage.
#[derive(Debug, Clone)]
pub struct PreparedPolicy {
    pub id: String,
    pub effective: NaiveDate,
    pub termination: NaiveDate,
    pub area_id: Option<String>,
    pub key: CanonicalKey,
}

impl PreparedPolicy {
    pub fn in_force_on(&self, date: NaiveDate) -> bool {
        self.effective <= date && date <= self.termination
    }
}

#[derive(Debug, Clone)]
pub struct PreparedClaim {
    pub id: String,
    pub date_of_loss: NaiveDate,
    pub area_id: Option<String>,
    pub key: CanonicalKey,
}

// ---------------------------------------------------------------------------
// Match tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenewalMatch {
    #[serde(rename = "id")]
    pub policy_id: String,
    pub is_distinct: bool,
    pub num_match: usize,
    pub match_id: Option<String>,
}

impl RenewalMatch {
    /// Only distinct policies with exactly one candidate contribute an edge.
    pub fn accepted_edge(&self) -> Option<(&str, &str)> {
        if !self.is_distinct || self.num_match != 1 {
            return None;
        }
        self.match_id
            .as_deref()
            .map(|target| (self.policy_id.as_str(), target))
    }

    /// Distinct with at most one candidate: survives into the renewal graph.
    pub fn survives(&self) -> bool {
        self.is_distinct && self.num_match <= 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stint {
    pub stint_id: String,
    /// Ordered by (effective date, policy id).
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StintRow {
    #[serde(rename = "id")]
    pub policy_id: String,
    pub stint_id: String,
    pub num_match: usize,
    pub match_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimMatch {
    pub claim_id: String,
    pub num_match: usize,
    /// Set only for a unique match.
    pub policy_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Selection flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Outcome {
    #[serde(rename = "Excluded - Missing data")]
    MissingData,
    #[serde(rename = "Excluded - Bad geocode")]
    BadGeocode,
    #[serde(rename = "Excluded - No matches")]
    NoMatches,
    #[serde(rename = "Excluded - Multiple matches")]
    MultipleMatches,
    #[serde(rename = "Included")]
    Included,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingData => "Excluded - Missing data",
            Self::BadGeocode => "Excluded - Bad geocode",
            Self::NoMatches => "Excluded - No matches",
            Self::MultipleMatches => "Excluded - Multiple matches",
            Self::Included => "Included",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One audited record. The vintage flags say which census vintages list the
/// record's area identifier; all false when no crosswalk was in play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionRow {
    pub id: String,
    pub outcome: Outcome,
    pub in_2000: bool,
    pub in_2010: bool,
    pub in_2020: bool,
}

impl SelectionRow {
    pub fn new(id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            id: id.into(),
            outcome,
            in_2000: false,
            in_2010: false,
            in_2020: false,
        }
    }

    pub fn set_vintages(&mut self, flags: GeoFlags) {
        self.in_2000 = flags.in_2000;
        self.in_2010 = flags.in_2010;
        self.in_2020 = flags.in_2020;
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub total: usize,
    /// Outcome label -> count. BTreeMap keeps serialized output stable.
    pub outcomes: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkageSummary {
    pub jurisdiction: String,
    pub engine_version: String,
    pub policies: StageSummary,
    pub stints: usize,
    pub claims: StageSummary,
}

#[derive(Debug, Clone)]
pub struct JurisdictionResult {
    pub jurisdiction: String,
    pub renewal_matches: Vec<RenewalMatch>,
    pub stints: Vec<StintRow>,
    pub policy_flow: Vec<SelectionRow>,
    pub claim_matches: Vec<ClaimMatch>,
    pub claim_flow: Vec<SelectionRow>,
    pub summary: LinkageSummary,
}
