//! Subtree builder and renderer for the `tree` CLI command, kept from the teacher's
//! `tree.rs` and generalized to operate on `&TaxonStore` internal indices instead of a
//! private `HashMap<i64, Node>` — the engine owns the taxa, this module only owns which
//! ones are part of the displayed subtree.

use std::collections::{HashMap, HashSet};
use std::fmt;

use ansi_term::Style;

use crate::store::TaxonStore;

pub struct Tree<'a> {
    store: &'a TaxonStore,
    children: HashMap<usize, HashSet<usize>>,
    present: HashSet<usize>,
    marked: HashSet<usize>,
    root: usize,
    format_string: String,
}

impl<'a> Tree<'a> {
    /// Build a tree spanning the root-to-node lineage of every internal index in
    /// `roots`. Lineages that share an ancestor are merged automatically: once a node
    /// is `present`, its own path to root has already been linked by an earlier
    /// lineage, so later lineages stop climbing as soon as they reach it.
    pub fn new(store: &'a TaxonStore, roots: &[usize]) -> Tree<'a> {
        let mut tree = Tree {
            store,
            children: HashMap::new(),
            present: HashSet::new(),
            marked: HashSet::new(),
            root: store.root_index(),
            format_string: String::from("%rank: %name"),
        };
        for &idx in roots {
            tree.add_lineage(idx);
        }
        tree
    }

    fn add_lineage(&mut self, internal_index: usize) {
        let mut current = internal_index;
        loop {
            if !self.present.insert(current) {
                break;
            }
            let record = self.store.record(current);
            if record.is_root() {
                break;
            }
            let parent = self.store.parent_index(current);
            self.children.entry(parent).or_default().insert(current);
            current = parent;
        }
    }

    /// Mark the given internal indices so `simplify` never collapses them away.
    pub fn mark_nodes(&mut self, nodes: &[usize]) {
        self.marked.extend(nodes.iter().copied());
    }

    /// `%rank`, `%name` and `%taxid` are replaced when rendering each node.
    pub fn set_format_string(&mut self, format_string: String) {
        self.format_string = format_string;
    }

    /// Collapse every unmarked node with exactly one child into that child, so long
    /// chains of monotypic ranks (common in NCBI lineages) don't clutter the display.
    pub fn simplify(&mut self) {
        self.simplify_helper(self.root);
        self.children.retain(|_, v| !v.is_empty());
    }

    fn simplify_helper(&mut self, parent: usize) {
        let new_children = self.collapse_single_child(parent);
        self.children.insert(parent, new_children.clone());
        for &child in new_children.iter() {
            self.simplify_helper(child);
        }
    }

    fn collapse_single_child(&self, parent: usize) -> HashSet<usize> {
        let mut new_children = HashSet::new();
        if let Some(nodes) = self.children.get(&parent) {
            for &start in nodes.iter() {
                let mut node = start;
                loop {
                    match self.children.get(&node) {
                        Some(children) if children.len() == 1 && !self.marked.contains(&node) => {
                            node = *children.iter().next().unwrap();
                        }
                        _ => break,
                    }
                }
                new_children.insert(node);
            }
        }
        new_children
    }

    fn render_label(&self, internal_index: usize) -> String {
        let record = self.store.record(internal_index);
        self.format_string
            .replace("%rank", &record.rank)
            .replace("%name", &record.name)
            .replace("%taxid", &record.external_id.to_string())
    }

    /// Render the tree in Newick format.
    pub fn to_newick(&self) -> String {
        let mut n = String::from("(");
        self.newick_helper(&mut n, self.root);
        n.push_str(");");
        n
    }

    fn newick_helper(&self, n: &mut String, node: usize) {
        n.push_str(&self.render_label(node));
        if let Some(children) = self.children.get(&node) {
            if !children.is_empty() {
                n.push_str(",(");
                let mut children: Vec<usize> = children.iter().copied().collect();
                children.sort_unstable();
                for child in &children {
                    self.newick_helper(n, *child);
                    n.push(',');
                }
                n.pop();
                n.push(')');
            }
        }
    }

    fn print_tree_helper(&self, s: &mut String, node: usize, prefix: String, was_first_child: bool) {
        let label = self.render_label(node);
        let marked = self.marked.contains(&node);

        match self.children.get(&node).filter(|c| !c.is_empty()) {
            Some(children) => {
                if marked {
                    s.push_str(&format!(
                        "{}\u{2500}\u{252C}\u{2500} {}\n",
                        prefix,
                        Style::new().bold().paint(&label)
                    ));
                } else {
                    s.push_str(&format!("{}\u{2500}\u{252C}\u{2500} {}\n", prefix, label));
                }

                let mut prefix = prefix.clone();
                prefix.pop();
                prefix.push(if was_first_child { '\u{2502}' } else { ' ' });

                let mut children: Vec<usize> = children.iter().copied().collect();
                children.sort_unstable();

                loop {
                    let child = children.pop();
                    let mut new_prefix = prefix.clone();
                    match child {
                        Some(child) => {
                            if children.is_empty() {
                                new_prefix.push_str(" \u{2514}");
                                self.print_tree_helper(s, child, new_prefix, false);
                            } else {
                                new_prefix.push_str(" \u{251C}");
                                self.print_tree_helper(s, child, new_prefix, true);
                            }
                        }
                        None => break,
                    };
                }
            }
            None => {
                if marked {
                    s.push_str(&format!(
                        "{}\u{2500}\u{2500} {}\n",
                        prefix,
                        Style::new().bold().paint(&label)
                    ));
                } else {
                    s.push_str(&format!("{}\u{2500}\u{2500} {}\n", prefix, label));
                }
            }
        }
    }
}

impl<'a> fmt::Display for Tree<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        self.print_tree_helper(&mut s, self.root, String::from(" "), false);
        write!(f, "{}", s)
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
        store.set_name(1, "root".into());
        store.set_name(2, "Alpha".into());
        store.set_name(3, "Beta".into());
        store.set_name(4, "Gamma".into());
        store.set_name(5, "Delta".into());
        store.set_name(6, "Epsilon".into());
        store
    }

    #[test]
    fn merges_shared_ancestors() {
        let store = sample();
        let roots = [
            store.internal_of(4).unwrap(),
            store.internal_of(5).unwrap(),
            store.internal_of(6).unwrap(),
        ];
        let tree = Tree::new(&store, &roots);
        let root_idx = store.root_index();
        assert_eq!(tree.children.get(&root_idx).unwrap().len(), 2);
    }

    #[test]
    fn simplify_collapses_monotypic_chain() {
        let store = sample();
        let roots = [store.internal_of(6).unwrap()];
        let mut tree = Tree::new(&store, &roots);
        tree.simplify();
        let root_idx = store.root_index();
        // 3 has a single child 6, so after simplify root links straight to 6.
        let children = tree.children.get(&root_idx).unwrap();
        assert!(children.contains(&store.internal_of(6).unwrap()));
    }

    #[test]
    fn newick_contains_all_names() {
        let store = sample();
        let roots = [store.internal_of(4).unwrap(), store.internal_of(6).unwrap()];
        let tree = Tree::new(&store, &roots);
        let newick = tree.to_newick();
        assert!(newick.ends_with(");"));
        assert!(newick.contains("Gamma"));
        assert!(newick.contains("Epsilon"));
    }
}
