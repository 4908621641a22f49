//! The Euler-Tour Builder: a single iterative DFS over the Taxon Store producing the
//! three parallel arrays the RMQ Index and LCA Engine need.
//!
//! Traversal is explicit-stack, not recursive: NCBI lineages run several dozen levels
//! deep in the worst case and a recursive walk has no safety margin against a
//! pathological dump.

use crate::store::TaxonStore;

pub struct EulerTour {
    /// `visit[i]` is the internal index entered/re-entered at tour step `i`.
    pub visit: Vec<usize>,
    /// `depth[i]` is the tree depth of `visit[i]`, root depth 0.
    pub depth: Vec<u32>,
    /// `first[v]` is the smallest `i` with `visit[i] == v`.
    pub first: Vec<usize>,
}

impl EulerTour {
    /// Build the tour. Length is exactly `2 * store.len()`.
    pub fn build(store: &TaxonStore) -> EulerTour {
        let n = store.len();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        for record in store.iter() {
            if !record.is_root() {
                let parent = store
                    .internal_of(record.parent_external_id)
                    .expect("dangling parent reference escaped load-time validation");
                children[parent].push(record.internal_index);
            }
        }

        let mut visit = Vec::with_capacity(2 * n);
        let mut depth = Vec::with_capacity(2 * n);
        let mut first = vec![usize::MAX; n];

        let root = store.root_index();
        visit.push(root);
        depth.push(0);
        first[root] = 0;

        // Each stack frame is (node, its depth, index of the next child to descend into).
        let mut stack: Vec<(usize, u32, usize)> = vec![(root, 0, 0)];

        while !stack.is_empty() {
            let (node, d, next_child) = *stack.last().unwrap();
            if next_child < children[node].len() {
                stack.last_mut().unwrap().2 += 1;
                let child = children[node][next_child];

                visit.push(child);
                depth.push(d + 1);
                if first[child] == usize::MAX {
                    first[child] = visit.len() - 1;
                }
                stack.push((child, d + 1, 0));
            } else {
                stack.pop();
                if let Some(&(parent, parent_depth, _)) = stack.last() {
                    // Returning from `node` to its parent re-emits the parent.
                    visit.push(parent);
                    depth.push(parent_depth);
                }
            }
        }

        // The root's own return-to-parent entry (self-parent) closes the tour at 2N.
        visit.push(root);
        depth.push(0);

        debug_assert_eq!(visit.len(), 2 * n);
        debug_assert_eq!(depth.len(), 2 * n);

        EulerTour { visit, depth, first }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TaxonStore;

    fn sample_store() -> TaxonStore {
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
    fn tour_has_length_2n() {
        let store = sample_store();
        let tour = EulerTour::build(&store);
        assert_eq!(tour.visit.len(), 2 * store.len());
        assert_eq!(tour.depth.len(), 2 * store.len());
    }

    #[test]
    fn tour_starts_and_ends_at_root() {
        let store = sample_store();
        let tour = EulerTour::build(&store);
        let root = store.root_index();
        assert_eq!(tour.visit[0], root);
        assert_eq!(*tour.visit.last().unwrap(), root);
    }

    #[test]
    fn first_occurrence_matches_depth() {
        let store = sample_store();
        let tour = EulerTour::build(&store);
        for v in 0..store.len() {
            assert_eq!(tour.visit[tour.first[v]], v);
        }
        let idx4 = store.internal_of(4).unwrap();
        assert_eq!(tour.depth[tour.first[idx4]], 2);
    }
}
