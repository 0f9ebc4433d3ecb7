//! Disjoint-set forest over dense point indices.
//!
//! Density clustering links every pair of core points that are neighbours;
//! the connected components are the clusters. Indices are dense (`0..n`), so
//! the forest is stored in flat vectors rather than maps.

/// Union-Find over `0..n` with path halving and union by rank.
///
/// # Example
/// ```
/// use trip_pipeline::union_find::DisjointSet;
///
/// let mut set = DisjointSet::new(3);
/// set.union(0, 1);
/// assert!(set.connected(0, 1));
/// assert!(!set.connected(0, 2));
/// ```
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    /// Create `len` singleton sets.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of the set containing `item`.
    pub fn find(&mut self, mut item: usize) -> usize {
        while self.parent[item] != item {
            let grandparent = self.parent[self.parent[item]];
            self.parent[item] = grandparent;
            item = grandparent;
        }
        item
    }

    /// Merge the sets containing `a` and `b`.
    ///
    /// Returns true if the sets were different (union performed),
    /// false if they were already in the same set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }

        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] = self.rank[root_a].saturating_add(1);
            }
        }
        true
    }

    /// Check if two indices are in the same set.
    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let mut set = DisjointSet::new(4);
        assert_eq!(set.len(), 4);
        for i in 0..4 {
            assert_eq!(set.find(i), i);
        }
    }

    #[test]
    fn test_union_is_transitive() {
        let mut set = DisjointSet::new(5);
        assert!(set.union(0, 1));
        assert!(set.union(1, 2));
        assert!(!set.union(0, 2));
        assert!(set.connected(0, 2));
        assert!(!set.connected(0, 3));
        assert!(set.union(3, 4));
        assert!(set.union(4, 0));
        assert!(set.connected(2, 3));
    }

    #[test]
    fn test_long_chain_compresses() {
        let mut set = DisjointSet::new(1000);
        for i in 1..1000 {
            set.union(i - 1, i);
        }
        let root = set.find(999);
        assert!((0..1000).all(|i| set.find(i) == root));
    }
}
