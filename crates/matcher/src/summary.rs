use std::collections::BTreeMap;

use crate::model::{LinkageSummary, SelectionRow, StageSummary};

/// Count outcomes in a selection flow.
pub fn stage_summary(rows: &[SelectionRow]) -> StageSummary {
    let mut outcomes: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        *outcomes.entry(row.outcome.to_string()).or_insert(0) += 1;
    }
    StageSummary {
        total: rows.len(),
        outcomes,
    }
}

fn merge_stage(into: &mut StageSummary, from: &StageSummary) {
    into.total += from.total;
    for (label, count) in &from.outcomes {
        *into.outcomes.entry(label.clone()).or_insert(0) += count;
    }
}

/// Sum per-jurisdiction summaries into one, labelled `label`.
pub fn combine(summaries: &[LinkageSummary], label: &str) -> LinkageSummary {
    let mut total = LinkageSummary {
        jurisdiction: label.to_string(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        ..LinkageSummary::default()
    };
    for s in summaries {
        merge_stage(&mut total.policies, &s.policies);
        merge_stage(&mut total.claims, &s.claims);
        total.stints += s.stints;
    }
    total
}

/// One-line human summary for a jurisdiction.
pub fn describe(s: &LinkageSummary) -> String {
    let count = |stage: &StageSummary, label: &str| stage.outcomes.get(label).copied().unwrap_or(0);
    format!(
        "{}: {} policies ({} included, {} stints), {} claims ({} included, {} no match, {} ambiguous)",
        s.jurisdiction,
        s.policies.total,
        count(&s.policies, "Included"),
        s.stints,
        s.claims.total,
        count(&s.claims, "Included"),
        count(&s.claims, "Excluded - No matches"),
        count(&s.claims, "Excluded - Multiple matches"),
    )
}
