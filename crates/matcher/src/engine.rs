use std::collections::{HashMap, HashSet};

use crate::canonical::{prepare_claim, prepare_policy};
use crate::claims::match_claims;
use crate::config::{GeoMatch, MatchConfig, Stage};
use crate::error::MatchError;
use crate::geo::{majority_prefix, GeoConstraint, VintageCrosswalk};
use crate::model::{
    ClaimRecord, CrosswalkRow, JurisdictionResult, LinkageInput, LinkageSummary, Outcome,
    PolicyRecord, PreparedClaim, PreparedPolicy, SelectionRow, StintRow,
};
use crate::renewal::{match_renewals, RenewalWindow};
use crate::selection::SelectionFlowTracker;
use crate::stint::build_stints;
use crate::summary::stage_summary;

/// Run the full per-jurisdiction pipeline over pre-loaded records.
///
/// canonicalize -> resolve geography -> match renewals -> build stints ->
/// match claims. Records outside the study window never enter a universe;
/// every record inside one leaves with exactly one outcome.
pub fn run(
    config: &MatchConfig,
    jurisdiction: &str,
    input: &LinkageInput,
) -> Result<JurisdictionResult, MatchError> {
    config.check_jurisdiction(jurisdiction)?;
    let span = tracing::info_span!("jurisdiction", code = %jurisdiction);
    let _enter = span.enter();

    // ---------------------------------------------------------------------
    // Universes and missing data
    // ---------------------------------------------------------------------

    let mut universe: Vec<&PolicyRecord> = input
        .policies
        .iter()
        .filter(|p| within(p.effective_date, config.policies.effective_cutoff))
        .collect();
    universe.sort_by(|a, b| {
        a.effective_date
            .cmp(&b.effective_date)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut claim_universe: Vec<&ClaimRecord> = input
        .claims
        .iter()
        .filter(|c| within(c.date_of_loss, config.claims.loss_cutoff))
        .collect();
    claim_universe.sort_by(|a, b| {
        a.date_of_loss
            .cmp(&b.date_of_loss)
            .then_with(|| a.id.cmp(&b.id))
    });

    let renewal_fields = config.stage_attributes(Stage::Renewal);
    let renewal_geo = config.renewal.geo;
    let mut missing = Vec::new();
    let mut prepared: Vec<PreparedPolicy> = Vec::with_capacity(universe.len());
    for record in &universe {
        match prepare_policy(record, &renewal_fields, renewal_geo) {
            None => missing.push(record.id.as_str()),
            Some(p) => prepared.push(p),
        }
    }

    let claim_geo = config.claims.matching.geo;
    let claim_fields = config.stage_attributes(Stage::Claims);
    let mut claim_missing = Vec::new();
    let mut prepared_claims: Vec<PreparedClaim> = Vec::with_capacity(claim_universe.len());
    for record in &claim_universe {
        match prepare_claim(record, &claim_fields, claim_geo) {
            None => claim_missing.push(record.id.as_str()),
            Some(c) => prepared_claims.push(c),
        }
    }

    // The jurisdiction prefix is taken from complete, in-window records only.
    let crosswalk = resolve_crosswalk(
        config,
        &input.crosswalk,
        prepared.iter().filter_map(|p| p.area_id.as_deref()),
        prepared_claims.iter().filter_map(|c| c.area_id.as_deref()),
    )?;

    // ---------------------------------------------------------------------
    // Policies -> renewals -> stints
    // ---------------------------------------------------------------------

    let mut policy_flow = SelectionFlowTracker::new(
        "policies",
        universe.iter().map(|p| p.id.clone()).collect(),
    )?;

    let (eligible, bad_geocode): (Vec<PreparedPolicy>, Vec<PreparedPolicy>) = prepared
        .into_iter()
        .partition(|p| geocode_ok(crosswalk.as_ref(), renewal_geo, p.area_id.as_deref()));
    policy_flow.record(Outcome::MissingData, missing.iter().copied())?;
    policy_flow.record(Outcome::BadGeocode, bad_geocode.iter().map(|p| p.id.as_str()))?;

    let window = RenewalWindow {
        gap_days: config.renewal.gap_days,
        buffer_days: config.renewal.buffer_days,
    };
    let renewal_matches = match_renewals(
        &eligible,
        window,
        GeoConstraint::for_mode(renewal_geo, crosswalk.as_ref()),
    );
    let assignment = build_stints(&renewal_matches, jurisdiction, config.renewal.isolated);

    let by_policy: HashMap<&str, _> = renewal_matches
        .iter()
        .map(|m| (m.policy_id.as_str(), m))
        .collect();
    let mut stints = Vec::new();
    for stint in &assignment.stints {
        for member in &stint.members {
            let m = by_policy.get(member.as_str());
            stints.push(StintRow {
                policy_id: member.clone(),
                stint_id: stint.stint_id.clone(),
                num_match: m.map_or(0, |m| m.num_match),
                match_id: m.and_then(|m| m.match_id.clone()),
            });
        }
    }

    let in_stint: HashSet<&str> = stints.iter().map(|r| r.policy_id.as_str()).collect();
    policy_flow.record(Outcome::Included, in_stint.iter().copied())?;
    policy_flow.record(
        Outcome::MultipleMatches,
        renewal_matches
            .iter()
            .map(|m| m.policy_id.as_str())
            .filter(|id| !in_stint.contains(id)),
    )?;
    let policy_flow = with_vintages(
        policy_flow.finish()?,
        universe.iter().map(|p| (p.id.as_str(), p.area_id.as_deref())),
        crosswalk.as_ref(),
    );

    tracing::info!(
        universe = universe.len(),
        missing = missing.len(),
        bad_geocode = bad_geocode.len(),
        matched = renewal_matches.len(),
        stints = assignment.stints.len(),
        "policy renewals linked"
    );

    // ---------------------------------------------------------------------
    // Claims -> in-force policies
    // ---------------------------------------------------------------------

    let candidates: Vec<PreparedPolicy> = input
        .policies
        .iter()
        .filter(|p| within(p.effective_date, config.claims.policy_cutoff))
        .filter_map(|p| prepare_policy(p, &claim_fields, claim_geo))
        .collect();

    let mut claim_flow = SelectionFlowTracker::new(
        "claims",
        claim_universe.iter().map(|c| c.id.clone()).collect(),
    )?;

    let (matchable, claim_bad_geocode): (Vec<PreparedClaim>, Vec<PreparedClaim>) = prepared_claims
        .into_iter()
        .partition(|c| geocode_ok(crosswalk.as_ref(), claim_geo, c.area_id.as_deref()));
    claim_flow.record(Outcome::MissingData, claim_missing.iter().copied())?;
    claim_flow.record(Outcome::BadGeocode, claim_bad_geocode.iter().map(|c| c.id.as_str()))?;

    let claim_matches = match_claims(
        &matchable,
        &candidates,
        config.claims.matching.strategy,
        GeoConstraint::for_mode(claim_geo, crosswalk.as_ref()),
    );
    for m in &claim_matches {
        claim_flow.record(m.outcome(), [m.claim_id.as_str()])?;
    }
    let claim_flow = with_vintages(
        claim_flow.finish()?,
        claim_universe.iter().map(|c| (c.id.as_str(), c.area_id.as_deref())),
        crosswalk.as_ref(),
    );

    tracing::info!(
        universe = claim_universe.len(),
        missing = claim_missing.len(),
        bad_geocode = claim_bad_geocode.len(),
        candidates = candidates.len(),
        unique = claim_matches.iter().filter(|m| m.num_match == 1).count(),
        "claims matched to policies"
    );

    let summary = LinkageSummary {
        jurisdiction: jurisdiction.to_string(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        policies: stage_summary(&policy_flow),
        stints: assignment.stints.len(),
        claims: stage_summary(&claim_flow),
    };

    Ok(JurisdictionResult {
        jurisdiction: jurisdiction.to_string(),
        renewal_matches,
        stints,
        policy_flow,
        claim_matches,
        claim_flow,
        summary,
    })
}

/// Records with no date stay in the universe (and fail as missing data).
fn within(date: Option<chrono::NaiveDate>, cutoff: Option<chrono::NaiveDate>) -> bool {
    match (date, cutoff) {
        (Some(d), Some(c)) => d >= c,
        _ => true,
    }
}

fn geocode_ok(crosswalk: Option<&VintageCrosswalk>, geo: GeoMatch, area_id: Option<&str>) -> bool {
    match (crosswalk, geo, area_id) {
        (_, GeoMatch::Ignore, _) | (None, _, _) => true,
        (Some(cw), _, Some(area)) => cw.is_resolvable(area),
        (Some(_), _, None) => false,
    }
}

/// Build the jurisdiction-scoped crosswalk. `None` when no geography is
/// configured or no record carries an area identifier to infer a prefix from.
fn resolve_crosswalk<'a>(
    config: &MatchConfig,
    rows: &[CrosswalkRow],
    policy_areas: impl Iterator<Item = &'a str>,
    claim_areas: impl Iterator<Item = &'a str>,
) -> Result<Option<VintageCrosswalk>, MatchError> {
    let Some(ref geo) = config.geography else {
        return Ok(None);
    };

    let prefix = match geo.prefix {
        Some(ref p) => Some(p.clone()),
        None => majority_prefix(policy_areas, geo.prefix_len)
            .or_else(|| majority_prefix(claim_areas, geo.prefix_len)),
    };

    let Some(prefix) = prefix else {
        tracing::warn!("no area identifiers to infer a jurisdiction prefix from");
        return Ok(None);
    };
    VintageCrosswalk::build(&prefix, rows).map(Some)
}

/// Fill the 2000/2010/2020 vintage flags of each row from its record's area id.
fn with_vintages<'a>(
    mut rows: Vec<SelectionRow>,
    areas: impl Iterator<Item = (&'a str, Option<&'a str>)>,
    crosswalk: Option<&VintageCrosswalk>,
) -> Vec<SelectionRow> {
    let Some(cw) = crosswalk else {
        return rows;
    };
    let areas: HashMap<&str, &str> = areas.filter_map(|(id, a)| Some((id, a?))).collect();
    for row in &mut rows {
        if let Some(area) = areas.get(row.id.as_str()) {
            row.set_vintages(cw.flags(area));
        }
    }
    rows
}
