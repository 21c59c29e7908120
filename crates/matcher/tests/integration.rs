use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use linkage_matcher::config::{ClaimStrategy, IsolatedPolicy};
use linkage_matcher::load::load_input;
use linkage_matcher::model::{JurisdictionResult, Outcome, SelectionRow};
use linkage_matcher::output::{read_summaries, write_artifacts};
use linkage_matcher::{run, MatchConfig, MatchError};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config() -> MatchConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join("nfip.linkage.toml")).unwrap();
    MatchConfig::from_toml(&toml).unwrap()
}

fn load_and_run(config: &MatchConfig, jurisdiction: &str) -> JurisdictionResult {
    let input = load_input(config, &fixtures_dir(), jurisdiction).unwrap();
    run(config, jurisdiction, &input).unwrap()
}

fn outcomes(rows: &[SelectionRow]) -> BTreeMap<&str, Outcome> {
    rows.iter().map(|r| (r.id.as_str(), r.outcome)).collect()
}

fn read_tree(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (
                e.file_name().to_string_lossy().into_owned(),
                std::fs::read(e.path()).unwrap(),
            )
        })
        .collect()
}

// -------------------------------------------------------------------------
// Renewal stage
// -------------------------------------------------------------------------

#[test]
fn policy_selection_flow() {
    let result = load_and_run(&fixture_config(), "NC");
    let flow = outcomes(&result.policy_flow);

    // OLD predates the study window; Q1 too. S1 belongs to SC.
    assert_eq!(flow.len(), 8);
    assert!(!flow.contains_key("OLD"));
    assert!(!flow.contains_key("Q1"));
    assert!(!flow.contains_key("S1"));

    assert_eq!(flow["M1"], Outcome::MissingData);
    assert_eq!(flow["G1"], Outcome::BadGeocode);
    assert_eq!(flow["A1"], Outcome::MultipleMatches);
    assert_eq!(flow["A2"], Outcome::MultipleMatches);
    for id in ["P1", "P2", "P3", "B"] {
        assert_eq!(flow[id], Outcome::Included, "{id}");
    }

    let order: Vec<&str> = result.policy_flow.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(order, vec!["P1", "G1", "M1", "P2", "A1", "A2", "P3", "B"]);
}

#[test]
fn renewal_chain_forms_one_stint() {
    let result = load_and_run(&fixture_config(), "NC");

    let stints: Vec<(&str, &str)> = result
        .stints
        .iter()
        .map(|r| (r.policy_id.as_str(), r.stint_id.as_str()))
        .collect();
    assert_eq!(
        stints,
        vec![("P1", "NC_0"), ("P2", "NC_0"), ("P3", "NC_0"), ("B", "NC_1")]
    );
    assert_eq!(result.summary.stints, 2);

    let p1 = result.renewal_matches.iter().find(|m| m.policy_id == "P1").unwrap();
    assert!(p1.is_distinct);
    assert_eq!(p1.num_match, 1);
    assert_eq!(p1.match_id.as_deref(), Some("P2"));
}

#[test]
fn duplicated_periods_are_not_distinct() {
    let result = load_and_run(&fixture_config(), "NC");
    for id in ["A1", "A2"] {
        let m = result.renewal_matches.iter().find(|m| m.policy_id == id).unwrap();
        assert!(!m.is_distinct, "{id}");
        assert_eq!(m.num_match, 1);
        assert_eq!(m.match_id.as_deref(), Some("B"));
    }
}

#[test]
fn isolated_policies_can_be_excluded() {
    let mut config = fixture_config();
    config.renewal.isolated = IsolatedPolicy::Exclude;
    let result = load_and_run(&config, "NC");
    let flow = outcomes(&result.policy_flow);
    assert_eq!(flow["B"], Outcome::MultipleMatches);
    assert_eq!(flow["P1"], Outcome::Included);
    assert_eq!(result.summary.stints, 1);
}

// -------------------------------------------------------------------------
// Claim stage
// -------------------------------------------------------------------------

#[test]
fn claim_selection_flow() {
    let result = load_and_run(&fixture_config(), "NC");
    let flow = outcomes(&result.claim_flow);

    assert_eq!(flow.len(), 6);
    assert!(!flow.contains_key("C7"));
    assert_eq!(flow["C1"], Outcome::Included);
    assert_eq!(flow["C2"], Outcome::MultipleMatches);
    assert_eq!(flow["C3"], Outcome::NoMatches);
    assert_eq!(flow["C4"], Outcome::MissingData);
    assert_eq!(flow["C5"], Outcome::BadGeocode);
    assert_eq!(flow["C6"], Outcome::Included);

    let matched: BTreeMap<&str, Option<&str>> = result
        .claim_matches
        .iter()
        .map(|m| (m.claim_id.as_str(), m.policy_id.as_deref()))
        .collect();
    assert_eq!(matched.len(), 4);
    assert_eq!(matched["C1"], Some("P2"));
    assert_eq!(matched["C2"], None);
    // Q1 never enters the renewal universe but is a valid claim-stage candidate.
    assert_eq!(matched["C6"], Some("Q1"));
}

#[test]
fn scan_strategy_agrees_with_join() {
    let join = load_and_run(&fixture_config(), "NC");
    let mut config = fixture_config();
    config.claims.matching.strategy = ClaimStrategy::Scan;
    let scan = load_and_run(&config, "NC");
    assert_eq!(join.claim_matches, scan.claim_matches);
    assert_eq!(join.claim_flow, scan.claim_flow);
}

// -------------------------------------------------------------------------
// Partitioning, artifacts, errors
// -------------------------------------------------------------------------

#[test]
fn jurisdictions_are_independent() {
    let result = load_and_run(&fixture_config(), "SC");
    assert_eq!(outcomes(&result.policy_flow).get("S1"), Some(&Outcome::Included));
    assert_eq!(result.policy_flow.len(), 1);
    assert!(result.claim_flow.is_empty());
    assert_eq!(result.stints[0].stint_id, "SC_0");
}

#[test]
fn rerun_is_byte_identical() {
    let config = fixture_config();
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let a = write_artifacts(&load_and_run(&config, "NC"), first.path()).unwrap();
    let b = write_artifacts(&load_and_run(&config, "NC"), second.path()).unwrap();

    let (ta, tb) = (read_tree(&a), read_tree(&b));
    assert_eq!(ta.len(), 6);
    assert_eq!(ta, tb);
}

#[test]
fn summaries_aggregate_across_jurisdictions() {
    let config = fixture_config();
    let out = tempfile::tempdir().unwrap();
    for code in ["NC", "SC"] {
        write_artifacts(&load_and_run(&config, code), out.path()).unwrap();
    }

    let summaries = read_summaries(out.path()).unwrap();
    assert_eq!(summaries.len(), 2);
    let total = linkage_matcher::summary::combine(&summaries, "ALL");
    assert_eq!(total.policies.total, 9);
    assert_eq!(total.stints, 3);
    assert_eq!(total.claims.outcomes.get("Included"), Some(&2));
}

#[test]
fn unknown_jurisdiction_is_rejected() {
    let err = load_input(&fixture_config(), &fixtures_dir(), "TX").unwrap_err();
    assert!(matches!(err, MatchError::UnknownJurisdiction(ref code) if code == "TX"));
}

#[test]
fn missing_column_is_structural() {
    let mut config = fixture_config();
    config.policies.columns.area_id = "cbg_fips".into();
    let err = load_input(&config, &fixtures_dir(), "NC").unwrap_err();
    assert!(err.to_string().contains("cbg_fips"), "{err}");
}
