//! Claim-to-policy matching.
//!
//! A claim matches a policy when the policy is in force on the date of loss
//! (`effective <= loss <= termination`), the canonical keys are equal, and the
//! geographic constraint admits the pair. Only a unique match is accepted.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::config::ClaimStrategy;
use crate::geo::GeoConstraint;
use crate::model::{CanonicalKey, ClaimMatch, Outcome, PreparedClaim, PreparedPolicy};

impl ClaimMatch {
    /// Terminal outcome for a claim that reached the matching step.
    pub fn outcome(&self) -> Outcome {
        match self.num_match {
            0 => Outcome::NoMatches,
            1 => Outcome::Included,
            _ => Outcome::MultipleMatches,
        }
    }
}

/// One row per claim, in input order. Both strategies give identical rows.
pub fn match_claims(
    claims: &[PreparedClaim],
    policies: &[PreparedPolicy],
    strategy: ClaimStrategy,
    geo: GeoConstraint<'_>,
) -> Vec<ClaimMatch> {
    let rows = match strategy {
        ClaimStrategy::Join => match_by_join(claims, policies, geo),
        ClaimStrategy::Scan => match_by_scan(claims, policies, geo),
    };
    tracing::debug!(
        claims = claims.len(),
        policies = policies.len(),
        ?strategy,
        unique = rows.iter().filter(|r| r.num_match == 1).count(),
        "claims matched"
    );
    rows
}

fn tally<'p, I>(claim: &PreparedClaim, candidates: I) -> ClaimMatch
where
    I: Iterator<Item = &'p PreparedPolicy>,
{
    let mut num_match = 0usize;
    let mut only: Option<&str> = None;
    for policy in candidates {
        num_match += 1;
        only = Some(policy.id.as_str());
    }
    ClaimMatch {
        claim_id: claim.id.clone(),
        num_match,
        policy_id: if num_match == 1 { only.map(String::from) } else { None },
    }
}

/// Inner join on canonical key, filtered to policies in force on the loss date.
fn match_by_join(
    claims: &[PreparedClaim],
    policies: &[PreparedPolicy],
    geo: GeoConstraint<'_>,
) -> Vec<ClaimMatch> {
    let mut by_key: HashMap<&CanonicalKey, Vec<&PreparedPolicy>> = HashMap::new();
    for p in policies {
        by_key.entry(&p.key).or_default().push(p);
    }

    claims
        .iter()
        .map(|claim| {
            let group = by_key.get(&claim.key).map(Vec::as_slice).unwrap_or(&[]);
            tally(
                claim,
                group.iter().copied().filter(|p| {
                    p.in_force_on(claim.date_of_loss)
                        && geo.admits(claim.area_id.as_deref(), p.area_id.as_deref())
                }),
            )
        })
        .collect()
}

/// For each distinct loss date, scan the in-force subset once per claim.
fn match_by_scan(
    claims: &[PreparedClaim],
    policies: &[PreparedPolicy],
    geo: GeoConstraint<'_>,
) -> Vec<ClaimMatch> {
    let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, c) in claims.iter().enumerate() {
        by_date.entry(c.date_of_loss).or_default().push(i);
    }

    let mut rows: Vec<Option<ClaimMatch>> = vec![None; claims.len()];
    for (date, indices) in &by_date {
        let in_force: Vec<&PreparedPolicy> =
            policies.iter().filter(|p| p.in_force_on(*date)).collect();
        for &i in indices {
            let claim = &claims[i];
            rows[i] = Some(tally(
                claim,
                in_force.iter().copied().filter(|p| {
                    p.key == claim.key
                        && geo.admits(claim.area_id.as_deref(), p.area_id.as_deref())
                }),
            ));
        }
    }
    rows.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::VintageCrosswalk;
    use crate::model::{CanonicalValue, CrosswalkRow};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn key(tag: &str) -> CanonicalKey {
        CanonicalKey(vec![CanonicalValue::Value(tag.into())])
    }

    fn policy(id: &str, k: &str, eff: &str, term: &str, area: &str) -> PreparedPolicy {
        PreparedPolicy {
            id: id.into(),
            effective: d(eff),
            termination: d(term),
            area_id: Some(area.into()),
            key: key(k),
        }
    }

    fn claim(id: &str, k: &str, loss: &str, area: &str) -> PreparedClaim {
        PreparedClaim {
            id: id.into(),
            date_of_loss: d(loss),
            area_id: Some(area.into()),
            key: key(k),
        }
    }

    fn both(
        claims: &[PreparedClaim],
        policies: &[PreparedPolicy],
        geo: GeoConstraint<'_>,
    ) -> Vec<ClaimMatch> {
        let join = match_claims(claims, policies, ClaimStrategy::Join, geo);
        let scan = match_claims(claims, policies, ClaimStrategy::Scan, geo);
        assert_eq!(join, scan, "join and scan must agree");
        join
    }

    #[test]
    fn unique_in_force_policy_is_included() {
        let policies = vec![
            policy("p1", "k", "2015-01-01", "2015-12-31", "37A"),
            policy("p0", "k", "2014-01-01", "2014-12-31", "37A"),
        ];
        let claims = vec![claim("c1", "k", "2015-06-01", "37A")];
        let rows = both(&claims, &policies, GeoConstraint::None);
        assert_eq!(rows[0].num_match, 1);
        assert_eq!(rows[0].policy_id.as_deref(), Some("p1"));
        assert_eq!(rows[0].outcome(), Outcome::Included);
    }

    #[test]
    fn second_identical_policy_makes_it_ambiguous() {
        let policies = vec![
            policy("p1", "k", "2015-01-01", "2015-12-31", "37A"),
            policy("p2", "k", "2015-03-01", "2016-02-28", "37A"),
        ];
        let claims = vec![claim("c1", "k", "2015-06-01", "37A")];
        let rows = both(&claims, &policies, GeoConstraint::None);
        assert_eq!(rows[0].num_match, 2);
        assert!(rows[0].policy_id.is_none());
        assert_eq!(rows[0].outcome(), Outcome::MultipleMatches);
    }

    #[test]
    fn in_force_bounds_are_inclusive() {
        let policies = vec![policy("p1", "k", "2015-01-01", "2015-12-31", "37A")];
        let claims = vec![
            claim("first", "k", "2015-01-01", "37A"),
            claim("last", "k", "2015-12-31", "37A"),
            claim("after", "k", "2016-01-01", "37A"),
        ];
        let rows = both(&claims, &policies, GeoConstraint::None);
        assert_eq!(rows[0].num_match, 1);
        assert_eq!(rows[1].num_match, 1);
        assert_eq!(rows[2].num_match, 0);
        assert_eq!(rows[2].outcome(), Outcome::NoMatches);
    }

    #[test]
    fn key_mismatch_is_no_match() {
        let policies = vec![policy("p1", "k", "2015-01-01", "2015-12-31", "37A")];
        let claims = vec![claim("c1", "other", "2015-06-01", "37A")];
        let rows = both(&claims, &policies, GeoConstraint::None);
        assert_eq!(rows[0].num_match, 0);
    }

    #[test]
    fn overlap_constraint_applies_from_claim_side() {
        let cw = VintageCrosswalk::build(
            "37",
            &[
                CrosswalkRow {
                    left_id: "37A".into(),
                    left_vintage: 2010,
                    right_id: "37A".into(),
                    right_vintage: 2010,
                },
                CrosswalkRow {
                    left_id: "37A".into(),
                    left_vintage: 2010,
                    right_id: "37B".into(),
                    right_vintage: 2020,
                },
            ],
        )
        .unwrap();
        let policies = vec![
            policy("in_b", "k", "2015-01-01", "2015-12-31", "37B"),
            policy("in_c", "k", "2015-01-01", "2015-12-31", "37C"),
        ];
        let claims = vec![claim("c1", "k", "2015-06-01", "37A")];

        let rows = both(&claims, &policies, GeoConstraint::Overlap(&cw));
        assert_eq!(rows[0].policy_id.as_deref(), Some("in_b"));

        let rows = both(&claims, &policies, GeoConstraint::None);
        assert_eq!(rows[0].num_match, 2);
    }

    #[test]
    fn rows_keep_claim_order() {
        let policies = vec![policy("p1", "k", "2015-01-01", "2015-12-31", "37A")];
        let claims = vec![
            claim("late", "k", "2015-09-01", "37A"),
            claim("early", "k", "2015-02-01", "37A"),
        ];
        let rows = both(&claims, &policies, GeoConstraint::None);
        let ids: Vec<&str> = rows.iter().map(|r| r.claim_id.as_str()).collect();
        assert_eq!(ids, vec!["late", "early"]);
    }
}
