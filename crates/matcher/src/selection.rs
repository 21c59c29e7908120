//! Selection-flow bookkeeping.
//!
//! Every record in a stage's universe receives exactly one outcome. Recording
//! an id twice, recording an id outside the universe, or finishing with ids
//! left unassigned are all invariant violations.

use std::collections::{HashMap, HashSet};

use crate::error::MatchError;
use crate::model::{Outcome, SelectionRow};

#[derive(Debug)]
pub struct SelectionFlowTracker {
    stage: String,
    universe: Vec<String>,
    outcomes: HashMap<String, Outcome>,
}

impl SelectionFlowTracker {
    pub fn new(stage: &str, universe: Vec<String>) -> Result<Self, MatchError> {
        let mut seen = HashSet::with_capacity(universe.len());
        for id in &universe {
            if !seen.insert(id.as_str()) {
                return Err(MatchError::SelectionFlow {
                    stage: stage.to_string(),
                    detail: format!("id '{id}' appears twice in the universe"),
                });
            }
        }
        Ok(Self {
            stage: stage.to_string(),
            outcomes: HashMap::with_capacity(universe.len()),
            universe,
        })
    }

    fn violation(&self, detail: String) -> MatchError {
        MatchError::SelectionFlow {
            stage: self.stage.clone(),
            detail,
        }
    }

    pub fn record<'a, I>(&mut self, outcome: Outcome, ids: I) -> Result<(), MatchError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in ids {
            if let Some(previous) = self.outcomes.get(id) {
                return Err(self.violation(format!(
                    "id '{id}' already recorded as '{previous}', cannot record '{outcome}'"
                )));
            }
            self.outcomes.insert(id.to_string(), outcome);
        }
        Ok(())
    }

    /// Outcome rows in universe order.
    pub fn finish(self) -> Result<Vec<SelectionRow>, MatchError> {
        if self.outcomes.len() > self.universe.len() {
            let extra = self
                .outcomes
                .keys()
                .find(|id| !self.universe.contains(*id))
                .cloned()
                .unwrap_or_default();
            return Err(self.violation(format!("id '{extra}' is not in the universe")));
        }

        let mut rows = Vec::with_capacity(self.universe.len());
        for id in &self.universe {
            match self.outcomes.get(id) {
                Some(&outcome) => rows.push(SelectionRow::new(id.clone(), outcome)),
                None => return Err(self.violation(format!("id '{id}' has no outcome"))),
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn covers_universe_in_order() {
        let mut t = SelectionFlowTracker::new("policies", universe(&["a", "b", "c"])).unwrap();
        t.record(Outcome::Included, ["c", "a"]).unwrap();
        t.record(Outcome::MissingData, ["b"]).unwrap();
        let rows = t.finish().unwrap();
        let got: Vec<(&str, Outcome)> = rows.iter().map(|r| (r.id.as_str(), r.outcome)).collect();
        assert_eq!(
            got,
            vec![
                ("a", Outcome::Included),
                ("b", Outcome::MissingData),
                ("c", Outcome::Included),
            ]
        );
    }

    #[test]
    fn double_assignment_rejected() {
        let mut t = SelectionFlowTracker::new("claims", universe(&["a"])).unwrap();
        t.record(Outcome::BadGeocode, ["a"]).unwrap();
        let err = t.record(Outcome::Included, ["a"]).unwrap_err();
        assert!(err.to_string().contains("already recorded as 'Excluded - Bad geocode'"));
    }

    #[test]
    fn omission_rejected() {
        let mut t = SelectionFlowTracker::new("claims", universe(&["a", "b"])).unwrap();
        t.record(Outcome::Included, ["a"]).unwrap();
        let err = t.finish().unwrap_err();
        assert!(err.to_string().contains("'b' has no outcome"));
    }

    #[test]
    fn outsider_rejected() {
        let mut t = SelectionFlowTracker::new("claims", universe(&["a"])).unwrap();
        t.record(Outcome::Included, ["a", "zz"]).unwrap();
        let err = t.finish().unwrap_err();
        assert!(err.to_string().contains("'zz' is not in the universe"));
    }

    #[test]
    fn duplicate_universe_rejected() {
        let err = SelectionFlowTracker::new("claims", universe(&["a", "a"])).unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn labels() {
        assert_eq!(Outcome::MissingData.to_string(), "Excluded - Missing data");
        assert_eq!(Outcome::NoMatches.to_string(), "Excluded - No matches");
        assert_eq!(Outcome::MultipleMatches.to_string(), "Excluded - Multiple matches");
        assert_eq!(Outcome::Included.to_string(), "Included");
    }
}
