//! Policy renewal detection.
//!
//! Policies are grouped on their time-invariant canonical key. Inside a group,
//! a policy's renewal candidates are the other members whose effective date
//! falls in the window `termination + gap_days ± buffer_days`. Only a single
//! candidate is ever recorded; zero or several leave the policy unmatched.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};

use crate::geo::GeoConstraint;
use crate::model::{CanonicalKey, PreparedPolicy, RenewalMatch};

/// Date convention for adjacency between a termination date and the next
/// effective date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalWindow {
    pub gap_days: i64,
    pub buffer_days: u32,
}

impl RenewalWindow {
    fn bounds(&self, termination: NaiveDate) -> (NaiveDate, NaiveDate) {
        let buffer = i64::from(self.buffer_days);
        let shift = |days: i64| {
            Duration::try_days(days)
                .and_then(|d| termination.checked_add_signed(d))
                .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
        };
        (
            shift(self.gap_days.saturating_sub(buffer)),
            shift(self.gap_days.saturating_add(buffer)),
        )
    }

    pub fn admits(&self, termination: NaiveDate, effective: NaiveDate) -> bool {
        let (lo, hi) = self.bounds(termination);
        lo <= effective && effective <= hi
    }
}

/// One row per input policy, in input order.
pub fn match_renewals(
    policies: &[PreparedPolicy],
    window: RenewalWindow,
    geo: GeoConstraint<'_>,
) -> Vec<RenewalMatch> {
    let mut groups: BTreeMap<&CanonicalKey, Vec<usize>> = BTreeMap::new();
    for (i, p) in policies.iter().enumerate() {
        groups.entry(&p.key).or_default().push(i);
    }

    let mut rows: Vec<Option<RenewalMatch>> = vec![None; policies.len()];
    let mut multi_member = 0usize;

    for members in groups.values_mut() {
        if members.len() > 1 {
            multi_member += 1;
        }
        members.sort_by(|&a, &b| {
            let (pa, pb) = (&policies[a], &policies[b]);
            pa.effective.cmp(&pb.effective).then_with(|| pa.id.cmp(&pb.id))
        });

        let mut period_counts: HashMap<(NaiveDate, NaiveDate), usize> = HashMap::new();
        for &i in members.iter() {
            let p = &policies[i];
            *period_counts.entry((p.effective, p.termination)).or_insert(0) += 1;
        }

        for &i in members.iter() {
            let origin = &policies[i];
            let (lo, hi) = window.bounds(origin.termination);
            let start = members.partition_point(|&j| policies[j].effective < lo);
            let end = members.partition_point(|&j| policies[j].effective <= hi);

            let mut num_match = 0usize;
            let mut only: Option<&str> = None;
            for &j in &members[start..end] {
                if j == i {
                    continue;
                }
                let candidate = &policies[j];
                if !geo.admits(origin.area_id.as_deref(), candidate.area_id.as_deref()) {
                    continue;
                }
                num_match += 1;
                only = Some(candidate.id.as_str());
            }

            let is_distinct = period_counts
                .get(&(origin.effective, origin.termination))
                .is_some_and(|&n| n == 1);

            rows[i] = Some(RenewalMatch {
                policy_id: origin.id.clone(),
                is_distinct,
                num_match,
                match_id: if num_match == 1 { only.map(String::from) } else { None },
            });
        }
    }

    tracing::debug!(
        policies = policies.len(),
        groups = groups.len(),
        multi_member,
        "renewal groups formed"
    );

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

    fn policy(id: &str, k: &str, eff: &str, term: &str) -> PreparedPolicy {
        PreparedPolicy {
            id: id.into(),
            effective: d(eff),
            termination: d(term),
            area_id: None,
            key: key(k),
        }
    }

    fn next_day() -> RenewalWindow {
        RenewalWindow { gap_days: 1, buffer_days: 0 }
    }

    fn by_id(rows: &[RenewalMatch], id: &str) -> RenewalMatch {
        rows.iter().find(|r| r.policy_id == id).unwrap().clone()
    }

    #[test]
    fn consecutive_years_chain() {
        let policies = vec![
            policy("a", "k", "2010-01-01", "2010-12-31"),
            policy("b", "k", "2011-01-01", "2011-12-31"),
            policy("c", "k", "2012-01-01", "2012-12-31"),
        ];
        let rows = match_renewals(&policies, next_day(), GeoConstraint::None);
        assert_eq!(rows.len(), 3);
        assert_eq!(by_id(&rows, "a").match_id.as_deref(), Some("b"));
        assert_eq!(by_id(&rows, "b").match_id.as_deref(), Some("c"));
        let c = by_id(&rows, "c");
        assert_eq!(c.num_match, 0);
        assert!(c.match_id.is_none());
        assert!(rows.iter().all(|r| r.is_distinct));
    }

    #[test]
    fn rows_follow_input_order() {
        let policies = vec![
            policy("c", "k", "2012-01-01", "2012-12-31"),
            policy("a", "k", "2010-01-01", "2010-12-31"),
            policy("z", "other", "2010-01-01", "2010-12-31"),
        ];
        let rows = match_renewals(&policies, next_day(), GeoConstraint::None);
        let ids: Vec<&str> = rows.iter().map(|r| r.policy_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "z"]);
    }

    #[test]
    fn different_keys_never_match() {
        let policies = vec![
            policy("a", "k1", "2010-01-01", "2010-12-31"),
            policy("b", "k2", "2011-01-01", "2011-12-31"),
        ];
        let rows = match_renewals(&policies, next_day(), GeoConstraint::None);
        assert!(rows.iter().all(|r| r.num_match == 0));
    }

    #[test]
    fn duplicated_periods_are_not_distinct() {
        let policies = vec![
            policy("a", "k", "2010-01-01", "2010-12-31"),
            policy("b", "k", "2010-01-01", "2010-12-31"),
            policy("c", "k", "2011-01-01", "2011-12-31"),
        ];
        let rows = match_renewals(&policies, next_day(), GeoConstraint::None);
        let a = by_id(&rows, "a");
        let b = by_id(&rows, "b");
        assert!(!a.is_distinct && !b.is_distinct);
        assert_eq!(a.num_match, 1);
        assert!(a.accepted_edge().is_none());
        assert!(by_id(&rows, "c").is_distinct);
    }

    #[test]
    fn multiple_candidates_leave_policy_unmatched() {
        let policies = vec![
            policy("a", "k", "2010-01-01", "2010-12-31"),
            policy("b", "k", "2011-01-01", "2011-06-30"),
            policy("c", "k", "2011-01-01", "2011-12-31"),
        ];
        let rows = match_renewals(&policies, next_day(), GeoConstraint::None);
        let a = by_id(&rows, "a");
        assert_eq!(a.num_match, 2);
        assert!(a.match_id.is_none());
    }

    #[test]
    fn buffer_widens_window() {
        let policies = vec![
            policy("a", "k", "2010-01-01", "2010-12-31"),
            policy("b", "k", "2011-01-04", "2011-12-31"),
        ];
        let strict = match_renewals(&policies, next_day(), GeoConstraint::None);
        assert_eq!(by_id(&strict, "a").num_match, 0);

        let loose = RenewalWindow { gap_days: 1, buffer_days: 3 };
        let rows = match_renewals(&policies, loose, GeoConstraint::None);
        assert_eq!(by_id(&rows, "a").match_id.as_deref(), Some("b"));
    }

    #[test]
    fn same_day_convention() {
        let policies = vec![
            policy("a", "k", "2010-05-14", "2011-05-14"),
            policy("b", "k", "2011-05-14", "2012-05-14"),
        ];
        let same_day = RenewalWindow { gap_days: 0, buffer_days: 0 };
        let rows = match_renewals(&policies, same_day, GeoConstraint::None);
        assert_eq!(by_id(&rows, "a").match_id.as_deref(), Some("b"));
        assert_eq!(by_id(&rows, "b").num_match, 0);
    }

    #[test]
    fn never_matches_itself() {
        let policies = vec![policy("a", "k", "2010-01-01", "2010-01-01")];
        let same_day = RenewalWindow { gap_days: 0, buffer_days: 0 };
        let rows = match_renewals(&policies, same_day, GeoConstraint::None);
        assert_eq!(rows[0].num_match, 0);
    }

    #[test]
    fn overlap_constraint_filters_candidates() {
        let cw = VintageCrosswalk::build(
            "37",
            &[
                CrosswalkRow {
                    left_id: "37A".into(),
                    left_vintage: 2010,
                    right_id: "37B".into(),
                    right_vintage: 2020,
                },
                CrosswalkRow {
                    left_id: "37B".into(),
                    left_vintage: 2020,
                    right_id: "37A".into(),
                    right_vintage: 2010,
                },
            ],
        )
        .unwrap();

        let mut a = policy("a", "k", "2010-01-01", "2010-12-31");
        a.area_id = Some("37A".into());
        let mut b = policy("b", "k", "2011-01-01", "2011-12-31");
        b.area_id = Some("37B".into());
        let mut c = policy("c", "k", "2011-01-01", "2011-12-31");
        c.area_id = Some("37C".into());

        let rows = match_renewals(&[a, b, c], next_day(), GeoConstraint::Overlap(&cw));
        let a = by_id(&rows, "a");
        assert_eq!(a.num_match, 1);
        assert_eq!(a.match_id.as_deref(), Some("b"));
        // b and c share a period, so neither identifies uniquely.
        assert!(!by_id(&rows, "b").is_distinct);
    }

    #[test]
    fn extreme_window_saturates() {
        let window = RenewalWindow { gap_days: i64::MIN, buffer_days: u32::MAX };
        assert!(!window.admits(d("2010-12-31"), d("1900-01-01")));
        let window = RenewalWindow { gap_days: 1_000_000_000_000_000, buffer_days: 0 };
        assert!(!window.admits(d("2010-12-31"), d("2011-01-01")));
    }

    #[test]
    fn window_admits() {
        let w = RenewalWindow { gap_days: 1, buffer_days: 2 };
        assert!(w.admits(d("2010-12-31"), d("2010-12-30")));
        assert!(w.admits(d("2010-12-31"), d("2011-01-03")));
        assert!(!w.admits(d("2010-12-31"), d("2011-01-04")));
    }
}
