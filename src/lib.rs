//! taxocore: an in-memory NCBI-style taxonomy engine.
//!
//! Builds a Taxon Store, Euler-tour linearization and sparse-table RMQ index from three
//! `.dmp` dump files, then answers pairwise/n-ary LCA, ancestor tests, rank-projected
//! lineages, clade-count aggregation and weighted-majority LCA — all read-only and safe
//! to call concurrently once built.

#[macro_use]
extern crate log;

pub mod clade;
pub mod download;
pub mod error;
pub mod euler;
pub mod lca;
pub mod loader;
pub mod rank;
pub mod rmq;
pub mod store;
pub mod tree;
pub mod weighted;

use std::collections::HashMap;
use std::path::Path;

use crate::clade::{CladeCount, CladeCounter};
use crate::error::{Result, TaxonomyError};
use crate::euler::EulerTour;
use crate::lca::LcaEngine;
use crate::rank::{RankConfig, RankProjector};
use crate::rmq::SparseTable;
use crate::store::{TaxonRecord, TaxonStore};
use crate::weighted::{VoteWeightMode, WeightedMajorityLca, WeightedMajorityResult};

pub static NCBI_FTP_HOST: &str = "ftp.ncbi.nih.gov:21";
pub static NCBI_FTP_PATH: &str = "/pub/taxonomy";

/// The fully-built, immutable taxonomy engine. The only way to obtain one is
/// `Engine::build`, which runs the loader pipeline (Uninitialized -> NodesLoaded ->
/// MergedApplied -> NamesResolved -> Indexed) to completion in one call; every method
/// below is therefore only reachable once the engine is Indexed, matching spec §4's
/// lifecycle state machine without needing an explicit state enum.
pub struct Engine {
    store: TaxonStore,
    tour: EulerTour,
    rmq: SparseTable,
    rank_config: RankConfig,
}

impl Engine {
    /// Build from the three dump files, using the default canonical rank vocabulary.
    pub fn build(nodes_path: &Path, names_path: &Path, merged_path: &Path) -> Result<Engine> {
        Engine::build_with_ranks(nodes_path, names_path, merged_path, RankConfig::default())
    }

    pub fn build_with_ranks(
        nodes_path: &Path,
        names_path: &Path,
        merged_path: &Path,
        rank_config: RankConfig,
    ) -> Result<Engine> {
        let mut store = TaxonStore::new();

        info!("Loading nodes from {}...", nodes_path.display());
        loader::load_nodes(nodes_path, &mut store)?;

        info!("Applying merged ids from {}...", merged_path.display());
        loader::load_merged(merged_path, &mut store)?;

        info!("Loading scientific names from {}...", names_path.display());
        loader::load_names(names_path, &mut store)?;

        info!("Loaded {} taxa. Building Euler tour and RMQ index...", store.len());
        let tour = EulerTour::build(&store);
        let rmq = SparseTable::build(&tour.depth);
        info!("Indexed.");

        Ok(Engine {
            store,
            tour,
            rmq,
            rank_config,
        })
    }

    pub fn store(&self) -> &TaxonStore {
        &self.store
    }

    pub fn rank_config(&self) -> &RankConfig {
        &self.rank_config
    }

    fn lca_engine(&self) -> LcaEngine {
        LcaEngine::new(&self.store, &self.tour, &self.rmq)
    }

    fn rank_projector(&self) -> RankProjector {
        RankProjector::new(&self.store, &self.rank_config)
    }

    pub fn lca(&self, a: i64, b: i64) -> i64 {
        self.lca_engine().lca(a, b)
    }

    pub fn lca_many<I: IntoIterator<Item = i64>>(&self, ids: I) -> Option<&TaxonRecord> {
        self.lca_engine().lca_many(ids)
    }

    pub fn is_ancestor(&self, candidate_ancestor: i64, child: i64) -> bool {
        self.lca_engine().is_ancestor(candidate_ancestor, child)
    }

    pub fn record_of(&self, external_id: i64, strict: bool) -> Result<Option<&TaxonRecord>> {
        self.store.record_of(external_id, strict)
    }

    /// Root-to-`record` lineage, one record per node.
    pub fn lineage_records(&self, record: &TaxonRecord) -> Vec<&TaxonRecord> {
        self.lca_engine()
            .lineage_indices(record.internal_index)
            .into_iter()
            .map(|idx| self.store.record(idx))
            .collect()
    }

    pub fn lineage_string(&self, record: &TaxonRecord, as_names: bool) -> String {
        self.rank_projector().lineage_string(record.internal_index, as_names)
    }

    pub fn at_ranks(&self, record: &TaxonRecord, ranks: &[String]) -> Result<Vec<String>> {
        self.rank_projector().at_ranks(record.internal_index, ranks)
    }

    pub fn clade_counts(&self, counts: &HashMap<i64, u64>) -> HashMap<i64, CladeCount> {
        CladeCounter::new(&self.store).compute(counts)
    }

    pub fn weighted_majority_lca(
        &self,
        hits: &[(i64, f64)],
        mode: VoteWeightMode,
        majority_cutoff: f64,
    ) -> Result<WeightedMajorityResult> {
        WeightedMajorityLca::new(&self.store, &self.rank_config).compute(hits, mode, majority_cutoff)
    }

    /// Resolve a CLI term (a numeric external id, or a scientific name) to an external
    /// id. Name lookup is a linear scan over the Store: the spec gives the engine no
    /// name index, only the dense id table, so this is strictly a CLI convenience, not
    /// a core operation.
    pub fn resolve_term(&self, term: &str) -> Result<i64> {
        let cleaned = term.trim().replace('_', " ");
        if let Ok(id) = cleaned.parse::<i64>() {
            return Ok(id);
        }
        self.store
            .iter()
            .find(|record| record.name == cleaned)
            .map(|record| record.external_id)
            .ok_or_else(|| TaxonomyError::InvalidConfiguration(format!("no such taxon: {}", term)))
    }
}
