//! Disjoint-set over integer entry ids.
//!
//! Confirmed similar pairs are edges; the report wants connected
//! components. Sets are small (tens of entries), so path compression
//! alone is plenty and rank bookkeeping is not worth carrying.

use std::collections::{BTreeMap, HashMap};

/// Union-find with path compression and arbitrary-root union.
#[derive(Debug, Default)]
pub struct UnionFind {
    parent: HashMap<u32, u32>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root of `x`'s set. First touch materializes `x` as its own root.
    pub fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while let Some(&p) = self.parent.get(&root) {
            if p == root {
                break;
            }
            root = p;
        }
        // Compress the walked path.
        let mut cur = x;
        while cur != root {
            let next = self.parent.insert(cur, root).unwrap_or(root);
            cur = next;
        }
        self.parent.entry(root).or_insert(root);
        root
    }

    /// Merge the sets containing `x` and `y` (root of `x` under root of `y`).
    pub fn union(&mut self, x: u32, y: u32) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx != ry {
            self.parent.insert(rx, ry);
        }
    }

    /// Group `ids` by root, dropping singletons. Members are ascending and
    /// clusters are ordered by their smallest member, so output is
    /// deterministic regardless of union order.
    pub fn clusters<I>(&mut self, ids: I) -> Vec<Vec<u32>>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut by_root: HashMap<u32, Vec<u32>> = HashMap::new();
        for id in ids {
            let root = self.find(id);
            by_root.entry(root).or_default().push(id);
        }

        let mut out: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (_, mut members) in by_root {
            members.sort_unstable();
            members.dedup();
            if members.len() >= 2 {
                out.insert(members[0], members);
            }
        }
        out.into_values().collect()
    }
}
