//! Union-find over non-negative indices.
//!
//! Storage grows on demand: touching an index that has not been seen yet
//! creates it as its own singleton set.

#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(len: usize) -> Self {
        let mut set = Self::new();
        set.grow(len);
        set
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    fn grow(&mut self, len: usize) {
        let start = self.parent.len();
        if len > start {
            self.parent.extend(start..len);
            self.rank.resize(len, 0);
        }
    }

    /// Root of the set containing `x`, halving the path on the way up.
    pub fn find(&mut self, x: usize) -> usize {
        self.grow(x + 1);
        let mut x = x;
        while self.parent[x] != x {
            let grandparent = self.parent[self.parent[x]];
            self.parent[x] = grandparent;
            x = grandparent;
        }
        x
    }

    /// Merges the sets of `a` and `b`, returning the new root.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return root_a;
        }

        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => {
                self.parent[root_a] = root_b;
                root_b
            }
            std::cmp::Ordering::Greater => {
                self.parent[root_b] = root_a;
                root_a
            }
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
                root_a
            }
        }
    }

    pub fn same_set(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_elements_are_singletons() {
        let mut set = DisjointSet::new();
        assert_eq!(set.find(0), 0);
        assert_eq!(set.find(7), 7);
        assert_eq!(set.len(), 8);
        assert!(!set.same_set(3, 4));
    }

    #[test]
    fn find_is_idempotent() {
        let mut set = DisjointSet::new();
        set.union(1, 2);
        set.union(2, 3);
        let root = set.find(3);
        assert_eq!(set.find(3), root);
        assert_eq!(set.find(root), root);
    }

    #[test]
    fn union_is_transitive() {
        let mut set = DisjointSet::new();
        set.union(0, 1);
        set.union(2, 3);
        assert!(!set.same_set(0, 3));
        set.union(1, 2);
        for a in 0..4 {
            for b in 0..4 {
                assert!(set.same_set(a, b));
            }
        }
        assert!(!set.same_set(0, 4));
    }

    #[test]
    fn union_matches_naive_connectivity() {
        let edges = [(0, 5), (5, 9), (2, 3), (7, 7), (3, 8), (1, 4), (4, 6), (6, 1)];
        let mut set = DisjointSet::with_len(10);
        let mut label: Vec<usize> = (0..10).collect();

        for &(a, b) in &edges {
            set.union(a, b);
            let (from, to) = (label[b], label[a]);
            for l in label.iter_mut() {
                if *l == from {
                    *l = to;
                }
            }
        }

        for a in 0..10 {
            for b in 0..10 {
                assert_eq!(set.same_set(a, b), label[a] == label[b], "pair ({a}, {b})");
            }
        }
    }

    #[test]
    fn rank_keeps_trees_shallow() {
        let mut set = DisjointSet::new();
        for i in 1..64 {
            set.union(0, i);
        }
        let root = set.find(0);
        assert!((0..64).all(|i| set.parent[i] == root));
    }
}
