//! The Rank Projector: a fixed, ordered vocabulary of canonical ranks, plus the
//! operations that classify a node against it — `all_ranks`, `at_ranks`, and
//! `lineage_string`.

use std::collections::HashMap;

use crate::error::{Result, TaxonomyError};
use crate::store::{is_no_rank, TaxonStore};

/// The closed, ordered set of canonical ranks the engine projects onto. Smaller index
/// means more general (closer to root).
#[derive(Debug, Clone)]
pub struct RankConfig {
    order: Vec<String>,
    index: HashMap<String, usize>,
    short_code: HashMap<String, char>,
}

impl Default for RankConfig {
    fn default() -> Self {
        RankConfig::new(&[
            ("superkingdom", 'd'),
            ("kingdom", 'k'),
            ("phylum", 'p'),
            ("class", 'c'),
            ("order", 'o'),
            ("family", 'f'),
            ("genus", 'g'),
            ("species", 's'),
            ("subspecies", 't'),
        ])
    }
}

impl RankConfig {
    pub fn new(ranks: &[(&str, char)]) -> Self {
        let mut order = Vec::with_capacity(ranks.len());
        let mut index = HashMap::with_capacity(ranks.len());
        let mut short_code = HashMap::with_capacity(ranks.len());
        for (i, (rank, code)) in ranks.iter().enumerate() {
            order.push((*rank).to_string());
            index.insert((*rank).to_string(), i);
            short_code.insert((*rank).to_string(), *code);
        }
        RankConfig {
            order,
            index,
            short_code,
        }
    }

    pub fn canonical_index(&self, rank: &str) -> Option<usize> {
        self.index.get(rank).copied()
    }

    pub fn short_code(&self, rank: &str) -> char {
        *self.short_code.get(rank).unwrap_or(&'x')
    }

    pub fn contains(&self, rank: &str) -> bool {
        self.index.contains_key(rank)
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }
}

pub struct RankProjector<'a> {
    store: &'a TaxonStore,
    config: &'a RankConfig,
}

impl<'a> RankProjector<'a> {
    pub fn new(store: &'a TaxonStore, config: &'a RankConfig) -> Self {
        RankProjector { store, config }
    }

    /// Walk from `internal_index` to root, collecting `(rank, name)` pairs. The
    /// nearest ancestor wins per rank (first-writer-wins on the way up); "no rank"
    /// variants are suppressed; the root is always inserted regardless of its rank.
    pub fn all_ranks(&self, internal_index: usize) -> HashMap<String, String> {
        let mut ranks = HashMap::new();
        let mut current = internal_index;
        loop {
            let record = self.store.record(current);
            let is_root = record.is_root();
            if !is_no_rank(&record.rank) || is_root {
                ranks
                    .entry(record.rank.clone())
                    .or_insert_with(|| record.name.clone());
            }
            if is_root {
                break;
            }
            current = self.store.parent_index(current);
        }
        ranks
    }

    /// Project a node onto a requested list of ranks. For each requested rank: emit
    /// the ancestor's name if found; else, if the requested rank is more specific than
    /// the node's own rank, emit `uc_<node name>` ("unclassified at this level,
    /// closest known is X"); else emit the literal `unknown`.
    pub fn at_ranks(&self, internal_index: usize, requested: &[String]) -> Result<Vec<String>> {
        for rank in requested {
            if !self.config.contains(rank) {
                return Err(TaxonomyError::InvalidConfiguration(format!(
                    "unknown rank requested: {}",
                    rank
                )));
            }
        }

        let known = self.all_ranks(internal_index);
        let record = self.store.record(internal_index);
        let node_rank_index = self.config.canonical_index(&record.rank);

        let mut out = Vec::with_capacity(requested.len());
        for rank in requested {
            if let Some(name) = known.get(rank) {
                out.push(name.clone());
                continue;
            }
            let requested_index = self.config.canonical_index(rank).unwrap();
            let more_specific = node_rank_index
                .map(|node_index| requested_index < node_index)
                .unwrap_or(false);
            if more_specific {
                out.push(format!("uc_{}", record.name));
            } else {
                out.push("unknown".to_string());
            }
        }
        Ok(out)
    }

    /// Root-to-node lineage string. Names: `<short_code>_<name>`; ids: the bare
    /// external id. Tokens joined by `;`.
    pub fn lineage_string(&self, internal_index: usize, as_names: bool) -> String {
        let mut path = vec![internal_index];
        let mut current = internal_index;
        while !self.store.record(current).is_root() {
            current = self.store.parent_index(current);
            path.push(current);
        }
        path.reverse();

        path.iter()
            .map(|&idx| {
                let record = self.store.record(idx);
                if as_names {
                    format!("{}_{}", self.config.short_code(&record.rank), record.name)
                } else {
                    record.external_id.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}
