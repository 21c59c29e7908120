use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::MatchError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MatchConfig {
    pub name: String,
    /// Known jurisdiction codes. Runs are partitioned by these.
    pub jurisdictions: Vec<String>,
    pub policies: PolicySource,
    pub claims: ClaimSource,
    pub attributes: Vec<AttributeSpec>,
    #[serde(default)]
    pub renewal: RenewalConfig,
    #[serde(default)]
    pub geography: Option<GeographyConfig>,
    #[serde(default)]
    pub coverage: CoverageConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PolicySource {
    pub file: String,
    /// Policies effective before this date are outside the study window.
    #[serde(default)]
    pub effective_cutoff: Option<NaiveDate>,
    pub columns: PolicyColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyColumns {
    pub id: String,
    pub jurisdiction: String,
    pub effective_date: String,
    pub termination_date: String,
    pub area_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimSource {
    pub file: String,
    /// Claims with a date of loss before this date are outside the study window.
    #[serde(default)]
    pub loss_cutoff: Option<NaiveDate>,
    /// Effective-date cutoff for the candidate policies claims are matched against.
    #[serde(default)]
    pub policy_cutoff: Option<NaiveDate>,
    pub columns: ClaimColumns,
    #[serde(default)]
    pub matching: ClaimMatchingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimColumns {
    pub id: String,
    pub jurisdiction: String,
    pub date_of_loss: String,
    pub area_id: String,
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// One canonical comparison attribute. `name` is the policy-side header and
/// the canonical name; `claim_column` is the claim-side header when it differs.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(default)]
    pub claim_column: Option<String>,
    pub kind: AttributeKind,
    #[serde(default = "default_stages")]
    pub stages: Vec<Stage>,
}

impl AttributeSpec {
    pub fn claim_header(&self) -> &str {
        self.claim_column.as_deref().unwrap_or(&self.name)
    }

    pub fn used_in(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Float,
    Date,
    Integer,
    Text,
    /// Coverage amount or deductible code; absence means "no coverage selected".
    Coverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Renewal,
    Claims,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Renewal => write!(f, "renewal"),
            Self::Claims => write!(f, "claims"),
        }
    }
}

fn default_stages() -> Vec<Stage> {
    vec![Stage::Renewal, Stage::Claims]
}

// ---------------------------------------------------------------------------
// Matching behavior
// ---------------------------------------------------------------------------

/// How the area identifier participates in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoMatch {
    /// Area identifier must be equal (it becomes part of the group key).
    Exact,
    /// Candidate's area identifier must be in the origin's crosswalk overlap set.
    Overlap,
    /// Area identifier is not compared and not required.
    Ignore,
}

/// What happens to a policy that has no accepted renewal edge at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolatedPolicy {
    /// Forms its own one-member stint.
    Stint,
    /// Excluded with the multiple/ambiguous matches reason.
    Exclude,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenewalConfig {
    /// Allowed deviation (days) from the expected renewal effective date.
    #[serde(default)]
    pub buffer_days: u32,
    /// Expected days between a termination date and the renewal's effective date.
    #[serde(default = "default_gap_days")]
    pub gap_days: i64,
    #[serde(default = "default_renewal_geo")]
    pub geo: GeoMatch,
    #[serde(default = "default_isolated")]
    pub isolated: IsolatedPolicy,
}

/// Upper bound on how far from a termination date a renewal may start.
pub const MAX_RENEWAL_REACH_DAYS: u64 = 36_500;

fn default_gap_days() -> i64 {
    1
}

fn default_renewal_geo() -> GeoMatch {
    GeoMatch::Exact
}

fn default_isolated() -> IsolatedPolicy {
    IsolatedPolicy::Stint
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            buffer_days: 0,
            gap_days: default_gap_days(),
            geo: default_renewal_geo(),
            isolated: default_isolated(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStrategy {
    /// Inner join on canonical key, restricted to in-force policies.
    Join,
    /// Per-date in-force subset, scanned once per claim.
    Scan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimMatchingConfig {
    #[serde(default = "default_claim_strategy")]
    pub strategy: ClaimStrategy,
    #[serde(default = "default_claim_geo")]
    pub geo: GeoMatch,
}

fn default_claim_strategy() -> ClaimStrategy {
    ClaimStrategy::Join
}

fn default_claim_geo() -> GeoMatch {
    GeoMatch::Overlap
}

impl Default for ClaimMatchingConfig {
    fn default() -> Self {
        Self {
            strategy: default_claim_strategy(),
            geo: default_claim_geo(),
        }
    }
}

// ---------------------------------------------------------------------------
// Geography, coverage, output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GeographyConfig {
    pub crosswalk: String,
    /// Number of leading characters that encode the jurisdiction.
    #[serde(default = "default_prefix_len")]
    pub prefix_len: usize,
    /// Fixed jurisdiction prefix; inferred from the records when absent.
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_prefix_len() -> usize {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageConfig {
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
}

fn default_sentinel() -> String {
    "-9999".into()
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            sentinel: default_sentinel(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

fn default_output_dir() -> String {
    "match_info".into()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl MatchConfig {
    pub fn from_toml(input: &str) -> Result<Self, MatchError> {
        let config: MatchConfig =
            toml::from_str(input).map_err(|e| MatchError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.jurisdictions.is_empty() {
            return Err(MatchError::ConfigValidation(
                "at least one jurisdiction is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for code in &self.jurisdictions {
            if code.trim().is_empty() {
                return Err(MatchError::ConfigValidation(
                    "jurisdiction codes must be non-empty".into(),
                ));
            }
            if !seen.insert(code.as_str()) {
                return Err(MatchError::ConfigValidation(format!(
                    "jurisdiction '{code}' listed twice"
                )));
            }
        }

        let mut names = HashSet::new();
        for attr in &self.attributes {
            if !names.insert(attr.name.as_str()) {
                return Err(MatchError::ConfigValidation(format!(
                    "attribute '{}' listed twice",
                    attr.name
                )));
            }
            if attr.stages.is_empty() {
                return Err(MatchError::ConfigValidation(format!(
                    "attribute '{}' is not used by any stage",
                    attr.name
                )));
            }
        }

        for stage in [Stage::Renewal, Stage::Claims] {
            if !self.attributes.iter().any(|a| a.used_in(stage)) {
                return Err(MatchError::ConfigValidation(format!(
                    "no attributes configured for the {stage} stage"
                )));
            }
        }

        let reach = self.renewal.gap_days.unsigned_abs() + u64::from(self.renewal.buffer_days);
        if reach > MAX_RENEWAL_REACH_DAYS {
            return Err(MatchError::ConfigValidation(format!(
                "renewal window |gap_days| + buffer_days = {reach} exceeds {MAX_RENEWAL_REACH_DAYS} days"
            )));
        }

        let wants_overlap = self.renewal.geo == GeoMatch::Overlap
            || self.claims.matching.geo == GeoMatch::Overlap;
        if wants_overlap && self.geography.is_none() {
            return Err(MatchError::ConfigValidation(
                "geo = \"overlap\" requires a [geography] crosswalk".into(),
            ));
        }

        if let Some(ref geo) = self.geography {
            if geo.prefix_len == 0 {
                return Err(MatchError::ConfigValidation(
                    "geography.prefix_len must be at least 1".into(),
                ));
            }
            if let Some(ref prefix) = geo.prefix {
                if prefix.chars().count() != geo.prefix_len {
                    return Err(MatchError::ConfigValidation(format!(
                        "geography.prefix '{prefix}' does not have prefix_len={} characters",
                        geo.prefix_len
                    )));
                }
            }
        }

        Ok(())
    }

    /// Fails with `UnknownJurisdiction` for codes outside the configured list.
    pub fn check_jurisdiction(&self, code: &str) -> Result<(), MatchError> {
        if self.jurisdictions.iter().any(|j| j == code) {
            Ok(())
        } else {
            Err(MatchError::UnknownJurisdiction(code.to_string()))
        }
    }

    /// Attributes participating in a stage, in configured order.
    pub fn stage_attributes(&self, stage: Stage) -> Vec<&AttributeSpec> {
        self.attributes.iter().filter(|a| a.used_in(stage)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
