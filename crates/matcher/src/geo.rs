//! Area-identifier vintage reconciliation.
//!
//! Source records carry a census block group identifier without saying which
//! census vintage it was assigned under, and the same code can denote
//! different geometries in 2000, 2010 and 2020. The crosswalk lists, for each
//! (identifier, vintage), every identifier of any vintage whose geometry
//! intersects it.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::GeoMatch;
use crate::error::MatchError;
use crate::model::{CrosswalkRow, Vintage};

/// Which vintage identifier lists an area identifier appears in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeoFlags {
    pub in_2000: bool,
    pub in_2010: bool,
    pub in_2020: bool,
}

impl GeoFlags {
    pub fn any(&self) -> bool {
        self.in_2000 || self.in_2010 || self.in_2020
    }
}

/// Jurisdiction-scoped overlap map. Built once per run; read-only afterwards.
#[derive(Debug, Clone)]
pub struct VintageCrosswalk {
    prefix: String,
    overlaps: BTreeMap<String, BTreeSet<String>>,
    vintages: BTreeMap<Vintage, BTreeSet<String>>,
}

impl VintageCrosswalk {
    /// Keep only rows whose origin identifier starts with `prefix`.
    pub fn build(prefix: &str, rows: &[CrosswalkRow]) -> Result<Self, MatchError> {
        let mut overlaps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut vintages: BTreeMap<Vintage, BTreeSet<String>> = BTreeMap::new();
        let mut kept = 0usize;

        for row in rows {
            let left_vintage = Vintage::from_year(row.left_vintage).ok_or_else(|| {
                MatchError::BadVintage {
                    area_id: row.left_id.clone(),
                    vintage: row.left_vintage,
                }
            })?;
            if Vintage::from_year(row.right_vintage).is_none() {
                return Err(MatchError::BadVintage {
                    area_id: row.right_id.clone(),
                    vintage: row.right_vintage,
                });
            }
            if !row.left_id.starts_with(prefix) {
                continue;
            }
            kept += 1;
            vintages
                .entry(left_vintage)
                .or_default()
                .insert(row.left_id.clone());
            overlaps
                .entry(row.left_id.clone())
                .or_default()
                .insert(row.right_id.clone());
        }

        tracing::debug!(
            prefix,
            rows = rows.len(),
            kept,
            identifiers = overlaps.len(),
            "crosswalk filtered to jurisdiction"
        );

        Ok(Self {
            prefix: prefix.to_string(),
            overlaps,
            vintages,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn flags(&self, area_id: &str) -> GeoFlags {
        let has = |v: Vintage| {
            self.vintages
                .get(&v)
                .is_some_and(|ids| ids.contains(area_id))
        };
        GeoFlags {
            in_2000: has(Vintage::Y2000),
            in_2010: has(Vintage::Y2010),
            in_2020: has(Vintage::Y2020),
        }
    }

    /// False means the identifier matches no known in-jurisdiction geometry.
    pub fn is_resolvable(&self, area_id: &str) -> bool {
        self.flags(area_id).any()
    }

    /// Every identifier, across vintages, that may denote an overlapping area.
    pub fn overlaps(&self, area_id: &str) -> Option<&BTreeSet<String>> {
        self.overlaps.get(area_id)
    }

    pub fn overlaps_with(&self, origin: &str, candidate: &str) -> bool {
        self.overlaps(origin)
            .is_some_and(|set| set.contains(candidate))
    }
}

/// Geographic constraint applied on top of key equality.
#[derive(Debug, Clone, Copy)]
pub enum GeoConstraint<'a> {
    /// Nothing beyond the key (area is either in the key or ignored).
    None,
    /// Candidate's area must be in the origin's overlap set.
    Overlap(&'a VintageCrosswalk),
}

impl<'a> GeoConstraint<'a> {
    pub fn for_mode(geo: GeoMatch, crosswalk: Option<&'a VintageCrosswalk>) -> Self {
        match (geo, crosswalk) {
            (GeoMatch::Overlap, Some(cw)) => Self::Overlap(cw),
            _ => Self::None,
        }
    }

    pub fn admits(&self, origin: Option<&str>, candidate: Option<&str>) -> bool {
        match self {
            Self::None => true,
            Self::Overlap(cw) => match (origin, candidate) {
                (Some(o), Some(c)) => cw.overlaps_with(o, c),
                _ => false,
            },
        }
    }
}

/// Most common `prefix_len`-character prefix among `area_ids`.
///
/// Ties resolve to the lexicographically smallest prefix. Identifiers shorter
/// than `prefix_len` are ignored.
pub fn majority_prefix<'a, I>(area_ids: I, prefix_len: usize) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for id in area_ids {
        let prefix: String = id.chars().take(prefix_len).collect();
        if prefix.chars().count() < prefix_len {
            continue;
        }
        *counts.entry(prefix).or_insert(0) += 1;
    }

    let best = counts.values().copied().max()?;
    let mut winners = counts.into_iter().filter(|(_, n)| *n == best).map(|(p, _)| p);
    let winner = winners.next()?;
    if winners.next().is_some() {
        tracing::warn!(prefix = %winner, count = best, "tie for majority area prefix");
    }
    Some(winner)
}
