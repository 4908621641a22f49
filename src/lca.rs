//! The LCA Engine: pairwise and n-ary lowest common ancestor, and ancestor tests,
//! built on top of the Taxon Store, Euler tour and RMQ index.

use crate::euler::EulerTour;
use crate::rmq::SparseTable;
use crate::store::TaxonStore;

pub struct LcaEngine<'a> {
    store: &'a TaxonStore,
    tour: &'a EulerTour,
    rmq: &'a SparseTable,
}

impl<'a> LcaEngine<'a> {
    pub fn new(store: &'a TaxonStore, tour: &'a EulerTour, rmq: &'a SparseTable) -> Self {
        LcaEngine { store, tour, rmq }
    }

    /// LCA of two internal indices, O(1) after preprocessing.
    pub fn lca_index(&self, a: usize, b: usize) -> usize {
        if a == b {
            return a;
        }
        let (fa, fb) = (self.tour.first[a], self.tour.first[b]);
        let (i, j) = if fa <= fb { (fa, fb) } else { (fb, fa) };
        let pos = self.rmq.query(i, j, &self.tour.depth);
        self.tour.visit[pos]
    }

    /// LCA of two external ids. If one is absent from the Store, the other is
    /// returned verbatim (a degenerate LCA) rather than failing.
    pub fn lca(&self, external_a: i64, external_b: i64) -> i64 {
        match (
            self.store.internal_of(external_a),
            self.store.internal_of(external_b),
        ) {
            (Some(a), Some(b)) => {
                let idx = self.lca_index(a, b);
                self.store.record(idx).external_id
            }
            (Some(_), None) => external_a,
            (None, Some(_)) => external_b,
            (None, None) => 0,
        }
    }

    /// LCA of a set of external ids. Unknown ids are skipped with a warning. Returns
    /// `None` if nothing in the set is known.
    pub fn lca_many<I: IntoIterator<Item = i64>>(&self, ids: I) -> Option<&'a crate::store::TaxonRecord> {
        let mut acc: Option<usize> = None;
        for id in ids {
            match self.store.internal_of(id) {
                Some(idx) => {
                    acc = Some(match acc {
                        Some(current) => self.lca_index(current, idx),
                        None => idx,
                    });
                }
                None => {
                    warn!("Unknown taxon {} skipped in LCA set", id);
                }
            }
        }
        acc.map(|idx| self.store.record(idx))
    }

    /// True iff `candidate_ancestor` is `child` itself, or both are known and
    /// `lca(child, candidate_ancestor) == candidate_ancestor`.
    pub fn is_ancestor(&self, candidate_ancestor: i64, child: i64) -> bool {
        if candidate_ancestor == child {
            return true;
        }
        match (
            self.store.internal_of(candidate_ancestor),
            self.store.internal_of(child),
        ) {
            (Some(a), Some(c)) => self.lca_index(a, c) == a,
            _ => false,
        }
    }

    pub fn lineage_indices(&self, internal_index: usize) -> Vec<usize> {
        let mut path = vec![internal_index];
        let mut current = internal_index;
        while !self.store.record(current).is_root() {
            current = self.store.parent_index(current);
            path.push(current);
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TaxonStore;

    // root=1; 2,3 children of 1; 4,5 children of 2; 6 child of 3 (spec §8 scenarios).
    fn sample() -> (TaxonStore, EulerTour, SparseTable) {
        let mut store = TaxonStore::new();
        store.insert(1, 1, "no rank".into());
        store.insert(2, 1, "kingdom".into());
        store.insert(3, 1, "kingdom".into());
        store.insert(4, 2, "genus".into());
        store.insert(5, 2, "genus".into());
        store.insert(6, 3, "genus".into());
        let tour = EulerTour::build(&store);
        let rmq = SparseTable::build(&tour.depth);
        (store, tour, rmq)
    }

    #[test]
    fn scenario_1_lca_4_5_is_2() {
        let (store, tour, rmq) = sample();
        let engine = LcaEngine::new(&store, &tour, &rmq);
        assert_eq!(engine.lca(4, 5), 2);
    }

    #[test]
    fn scenario_2_lca_4_6_is_1() {
        let (store, tour, rmq) = sample();
        let engine = LcaEngine::new(&store, &tour, &rmq);
        assert_eq!(engine.lca(4, 6), 1);
    }

    #[test]
    fn scenario_3_is_ancestor() {
        let (store, tour, rmq) = sample();
        let engine = LcaEngine::new(&store, &tour, &rmq);
        assert!(engine.is_ancestor(1, 5));
        assert!(!engine.is_ancestor(2, 6));
    }

    #[test]
    fn scenario_4_lca_many_skips_unknown() {
        let (store, tour, rmq) = sample();
        let engine = LcaEngine::new(&store, &tour, &rmq);
        assert_eq!(engine.lca_many(vec![4, 5, 6]).unwrap().external_id, 1);
        assert_eq!(engine.lca_many(vec![4, 5, 99]).unwrap().external_id, 2);
    }

    #[test]
    fn reflexivity_and_commutativity() {
        let (store, tour, rmq) = sample();
        let engine = LcaEngine::new(&store, &tour, &rmq);
        for id in [1, 2, 3, 4, 5, 6] {
            assert_eq!(engine.lca(id, id), id);
            assert!(engine.is_ancestor(id, id));
        }
        assert_eq!(engine.lca(4, 6), engine.lca(6, 4));
    }

    #[test]
    fn associativity() {
        let (store, tour, rmq) = sample();
        let engine = LcaEngine::new(&store, &tour, &rmq);
        let lhs = engine.lca(engine.lca(4, 5), 6);
        let rhs = engine.lca(4, engine.lca(5, 6));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn unknown_degeneracy() {
        let (store, tour, rmq) = sample();
        let engine = LcaEngine::new(&store, &tour, &rmq);
        assert_eq!(engine.lca(99, 5), 5);
    }

    #[test]
    fn root_absorbs() {
        let (store, tour, rmq) = sample();
        let engine = LcaEngine::new(&store, &tour, &rmq);
        assert_eq!(engine.lca(6, 1), 1);
    }
}
