//! The Clade Counter: folds per-taxon evidence counts into per-clade subtree sums,
//! plus a parent -> children index for rendering.

use std::collections::HashMap;

use crate::store::TaxonStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CladeCount {
    pub self_count: u64,
    pub clade_count: u64,
    pub children: Vec<i64>,
}

pub struct CladeCounter<'a> {
    store: &'a TaxonStore,
}

impl<'a> CladeCounter<'a> {
    pub fn new(store: &'a TaxonStore) -> Self {
        CladeCounter { store }
    }

    /// `counts` maps external id -> evidence hits. Unknown ids contribute only to
    /// their own entry (their lineage can't be walked), known ids propagate their
    /// count up to every ancestor including root.
    pub fn compute(&self, counts: &HashMap<i64, u64>) -> HashMap<i64, CladeCount> {
        let mut out: HashMap<i64, CladeCount> = HashMap::new();

        for (&id, &count) in counts {
            out.entry(id).or_default().self_count = count;

            match self.store.internal_of(id) {
                Some(start) => {
                    let mut current = start;
                    loop {
                        let record = self.store.record(current);
                        out.entry(record.external_id).or_default().clade_count += count;
                        if record.is_root() {
                            break;
                        }
                        current = self.store.parent_index(current);
                    }
                }
                None => {
                    out.entry(id).or_default().clade_count += count;
                }
            }
        }

        for record in self.store.iter() {
            if record.is_root() {
                continue;
            }
            if out.contains_key(&record.external_id) {
                out.entry(record.parent_external_id)
                    .or_default()
                    .children
                    .push(record.external_id);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TaxonStore;

    fn sample() -> TaxonStore {
        let mut store = TaxonStore::new();
        store.insert(1, 1, "no rank".into());
        store.insert(2, 1, "kingdom".into());
        store.insert(3, 1, "kingdom".into());
        store.insert(4, 2, "genus".into());
        store.insert(5, 2, "genus".into());
        store.insert(6, 3, "genus".into());
        store
    }

    #[test]
    fn clade_conservation() {
        let store = sample();
        let counter = CladeCounter::new(&store);
        let mut counts = HashMap::new();
        counts.insert(4, 3);
        counts.insert(5, 2);
        counts.insert(6, 1);

        let out = counter.compute(&counts);
        let total_self: u64 = out.values().map(|c| c.self_count).sum();
        assert_eq!(total_self, 6);
        assert_eq!(out[&1].clade_count, 6);
        assert_eq!(out[&2].clade_count, 5);
        assert_eq!(out[&3].clade_count, 1);
    }

    #[test]
    fn unknown_id_contributes_only_to_itself() {
        let store = sample();
        let counter = CladeCounter::new(&store);
        let mut counts = HashMap::new();
        counts.insert(999, 7);

        let out = counter.compute(&counts);
        assert_eq!(out.len(), 1);
        assert_eq!(out[&999].clade_count, 7);
        assert_eq!(out[&999].self_count, 7);
    }

    #[test]
    fn children_lists_follow_insertion_order() {
        let store = sample();
        let counter = CladeCounter::new(&store);
        let mut counts = HashMap::new();
        counts.insert(4, 1);
        counts.insert(5, 1);

        let out = counter.compute(&counts);
        assert_eq!(out[&2].children, vec![4, 5]);
    }
}
