//! The Weighted-Majority LCA: aggregates weighted evidence up every hit's path to
//! root and selects the most specific ancestor that still covers `majority_cutoff` of
//! the total assigned weight.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{Result, TaxonomyError};
use crate::rank::RankConfig;
use crate::store::TaxonStore;

/// A ceiling weight assigned to evidence with a non-positive e-value, since `-ln`
/// would otherwise be undefined or negative.
pub const MAX_TAX_WEIGHT: f64 = 700.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteWeightMode {
    Uniform,
    MinusLogEvalue,
    RawScore,
}

impl FromStr for VoteWeightMode {
    type Err = TaxonomyError;

    fn from_str(s: &str) -> Result<VoteWeightMode> {
        match s {
            "uniform" => Ok(VoteWeightMode::Uniform),
            "minus_log_evalue" => Ok(VoteWeightMode::MinusLogEvalue),
            "raw_score" => Ok(VoteWeightMode::RawScore),
            other => Err(TaxonomyError::InvalidConfiguration(format!(
                "unknown vote weight mode: {}",
                other
            ))),
        }
    }
}

fn weight_of(mode: VoteWeightMode, evidence: f64) -> f64 {
    match mode {
        VoteWeightMode::Uniform => 1.0,
        VoteWeightMode::RawScore => evidence,
        VoteWeightMode::MinusLogEvalue => {
            if evidence == f64::MAX {
                f64::MAX
            } else if evidence > 0.0 {
                -evidence.ln()
            } else {
                MAX_TAX_WEIGHT
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CandidateState {
    accumulated_weight: f64,
    is_candidate: bool,
    last_child_seen: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMajorityResult {
    /// External id of the selected taxon, or 0 ("unassigned") if no candidate met
    /// the cutoff.
    pub selected: i64,
    pub total_assigned_weight: f64,
    pub unassigned_count: u64,
    pub agreeing_hits: u64,
    pub selected_percent: f64,
}

pub struct WeightedMajorityLca<'a> {
    store: &'a TaxonStore,
    rank_config: &'a RankConfig,
}

impl<'a> WeightedMajorityLca<'a> {
    pub fn new(store: &'a TaxonStore, rank_config: &'a RankConfig) -> Self {
        WeightedMajorityLca { store, rank_config }
    }

    /// The canonical rank index used to break ties between qualifying candidates:
    /// the lowest (most specific) canonical rank found on the candidate's own
    /// lineage, starting with the candidate itself and only climbing to ancestors
    /// when the candidate and its ancestors are unranked.
    fn selection_rank_index(&self, candidate_index: usize) -> usize {
        let mut current = candidate_index;
        loop {
            let current_record = self.store.record(current);
            if let Some(idx) = self.rank_config.canonical_index(&current_record.rank) {
                return idx;
            }
            if current_record.is_root() {
                return usize::MAX;
            }
            current = self.store.parent_index(current);
        }
    }

    pub fn compute(
        &self,
        hits: &[(i64, f64)],
        mode: VoteWeightMode,
        majority_cutoff: f64,
    ) -> Result<WeightedMajorityResult> {
        let mut candidates: HashMap<usize, CandidateState> = HashMap::new();
        let mut total_assigned_weight = 0.0f64;
        let mut unassigned_count = 0u64;

        for &(id, evidence) in hits {
            if id == 0 {
                unassigned_count += 1;
                continue;
            }
            let start = self
                .store
                .internal_of(id)
                .ok_or(TaxonomyError::UnknownTaxon(id))?;

            let weight = weight_of(mode, evidence);
            total_assigned_weight += weight;

            let own = candidates.entry(start).or_default();
            own.is_candidate = true;
            own.accumulated_weight += weight;

            if self.store.record(start).is_root() {
                continue;
            }

            let mut child_id = start;
            let mut current = self.store.parent_index(start);
            loop {
                let entry = candidates.entry(current).or_default();
                entry.accumulated_weight += weight;
                if matches!(entry.last_child_seen, Some(previous) if previous != child_id) {
                    entry.is_candidate = true;
                }
                entry.last_child_seen = Some(child_id);

                if self.store.record(current).is_root() {
                    break;
                }
                child_id = current;
                current = self.store.parent_index(current);
            }
        }

        let selected = if total_assigned_weight > 0.0 {
            candidates
                .iter()
                .filter(|(_, state)| state.is_candidate)
                .filter(|(_, state)| {
                    state.accumulated_weight / total_assigned_weight >= majority_cutoff
                })
                .min_by(|(&a_idx, a), (&b_idx, b)| {
                    let a_rank = self.selection_rank_index(a_idx);
                    let b_rank = self.selection_rank_index(b_idx);
                    a_rank
                        .cmp(&b_rank)
                        .then(b.accumulated_weight.partial_cmp(&a.accumulated_weight).unwrap())
                })
                .map(|(&idx, _)| idx)
        } else {
            None
        };

        let (selected_external, selected_weight) = match selected {
            Some(idx) => (
                self.store.record(idx).external_id,
                candidates[&idx].accumulated_weight,
            ),
            None => (0, 0.0),
        };

        let agreeing_hits = if let Some(idx) = selected {
            hits.iter()
                .filter(|&&(id, _)| {
                    id != 0
                        && self
                            .store
                            .internal_of(id)
                            .map(|hit_idx| hit_idx == idx || self.is_ancestor(idx, hit_idx))
                            .unwrap_or(false)
                })
                .count() as u64
        } else {
            0
        };

        let selected_percent = if total_assigned_weight > 0.0 {
            100.0 * selected_weight / total_assigned_weight
        } else {
            0.0
        };

        Ok(WeightedMajorityResult {
            selected: selected_external,
            total_assigned_weight,
            unassigned_count,
            agreeing_hits,
            selected_percent,
        })
    }

    fn is_ancestor(&self, ancestor_index: usize, descendant_index: usize) -> bool {
        let mut current = descendant_index;
        loop {
            if current == ancestor_index {
                return true;
            }
            let record = self.store.record(current);
            if record.is_root() {
                return false;
            }
            current = self.store.parent_index(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TaxonStore;

    // root=1; 2,3 children of 1; 4,5 children of 2; 6 child of 3.
    fn sample() -> (TaxonStore, RankConfig) {
        let mut store = TaxonStore::new();
        store.insert(1, 1, "no rank".into());
        store.insert(2, 1, "phylum".into());
        store.insert(3, 1, "phylum".into());
        store.insert(4, 2, "genus".into());
        store.insert(5, 2, "genus".into());
        store.insert(6, 3, "genus".into());
        (store, RankConfig::default())
    }

    #[test]
    fn scenario_5_high_cutoff_selects_root() {
        // Node 4's coverage is 10/11 ~= 0.909, so a cutoff above that leaves root
        // (11/11) as the sole qualifying candidate.
        let (store, config) = sample();
        let engine = WeightedMajorityLca::new(&store, &config);
        let hits = vec![(4, 10.0), (6, 1.0)];
        let result = engine
            .compute(&hits, VoteWeightMode::RawScore, 0.95)
            .unwrap();
        assert_eq!(result.selected, 1);
    }

    #[test]
    fn scenario_5_low_cutoff_prefers_specific_candidate() {
        // At cutoff 0.5 both root (11/11) and node 4 (10/11) qualify; node 4 wins
        // the tie-break because its nearest ranked ancestor (2, a phylum) has a
        // lower canonical rank index than root's (root has no rank at all).
        let (store, config) = sample();
        let engine = WeightedMajorityLca::new(&store, &config);
        let hits = vec![(4, 10.0), (6, 1.0)];
        let result = engine
            .compute(&hits, VoteWeightMode::RawScore, 0.5)
            .unwrap();
        assert_eq!(result.selected, 4);
    }

    #[test]
    fn scenario_5_low_cutoff_prefers_node_2_over_root() {
        // Three evenly-weighted hits under 4, 5 and 6: root (3/3) and node 2 (2/3,
        // reached via both 4 and 5) both qualify at cutoff 0.34; node 2 wins the
        // tie-break on its own "phylum" rank, which root (unranked) can't match.
        let (store, config) = sample();
        let engine = WeightedMajorityLca::new(&store, &config);
        let hits = vec![(4, 1.0), (5, 1.0), (6, 1.0)];
        let result = engine
            .compute(&hits, VoteWeightMode::Uniform, 0.34)
            .unwrap();
        assert_eq!(result.selected, 2);
    }

    #[test]
    fn unknown_taxon_is_fatal() {
        let (store, config) = sample();
        let engine = WeightedMajorityLca::new(&store, &config);
        let hits = vec![(999, 1.0)];
        assert!(engine.compute(&hits, VoteWeightMode::Uniform, 0.5).is_err());
    }

    #[test]
    fn unassigned_ids_counted_separately() {
        let (store, config) = sample();
        let engine = WeightedMajorityLca::new(&store, &config);
        let hits = vec![(0, 1.0), (4, 1.0)];
        let result = engine
            .compute(&hits, VoteWeightMode::Uniform, 0.5)
            .unwrap();
        assert_eq!(result.unassigned_count, 1);
        assert_eq!(result.selected, 4);
    }

    #[test]
    fn weighted_monotonicity() {
        let (store, config) = sample();
        let engine = WeightedMajorityLca::new(&store, &config);
        let hits = vec![(4, 1.0), (5, 1.0), (6, 1.0)];
        let loose = engine.compute(&hits, VoteWeightMode::Uniform, 0.1).unwrap();
        let strict = engine.compute(&hits, VoteWeightMode::Uniform, 0.9).unwrap();
        // Raising the cutoff never yields a strictly more specific ancestor: the
        // strict result's selection must be the loose one or a coarser ancestor.
        assert!(engine.is_ancestor(
            store.internal_of(strict.selected).unwrap(),
            store.internal_of(loose.selected).unwrap()
        ) || strict.selected == loose.selected);
    }
}
