//! Fill-reducing column ordering.
//!
//! The ordering works on the block adjacency graph (one node per free
//! variable) and is expanded to scalar columns afterwards.

use super::ColumnBlock;
use faer::Mat;
use std::collections::BTreeSet;

/// Greedy minimum-degree elimination order over the block graph.
///
/// Ties are broken by the lowest block index, so the order is deterministic.
pub fn minimum_degree(adjacency: &[BTreeSet<usize>]) -> Vec<usize> {
    let n = adjacency.len();
    let mut graph: Vec<BTreeSet<usize>> = adjacency.to_vec();
    let mut eliminated = vec![false; n];
    let mut order = Vec::with_capacity(n);

    for _ in 0..n {
        let Some(pivot) = (0..n)
            .filter(|&v| !eliminated[v])
            .min_by_key(|&v| (graph[v].len(), v))
        else {
            break;
        };
        eliminate(&mut graph, pivot);
        eliminated[pivot] = true;
        order.push(pivot);
    }
    order
}

/// Number of fill edges created by eliminating blocks in `order`.
pub fn fill_in(adjacency: &[BTreeSet<usize>], order: &[usize]) -> usize {
    let mut graph: Vec<BTreeSet<usize>> = adjacency.to_vec();
    order.iter().map(|&v| eliminate(&mut graph, v)).sum()
}

/// Remove `pivot` from the graph, joining its neighbours into a clique.
/// Returns the number of edges added.
fn eliminate(graph: &mut [BTreeSet<usize>], pivot: usize) -> usize {
    let neighbours: Vec<usize> = graph[pivot].iter().copied().collect();
    let mut added = 0;
    for (i, &a) in neighbours.iter().enumerate() {
        graph[a].remove(&pivot);
        for &b in &neighbours[i + 1..] {
            if graph[a].insert(b) {
                graph[b].insert(a);
                added += 1;
            }
        }
    }
    graph[pivot].clear();
    added
}

/// Scalar column permutation.
///
/// `forward[new] = old` and `inverse[old] = new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPermutation {
    forward: Vec<usize>,
    inverse: Vec<usize>,
}

impl ColumnPermutation {
    pub fn identity(n: usize) -> Self {
        Self {
            forward: (0..n).collect(),
            inverse: (0..n).collect(),
        }
    }

    /// Expand a block order into a scalar column permutation.
    pub fn from_block_order(blocks: &[ColumnBlock], order: &[usize]) -> Self {
        let n = blocks.iter().map(|b| b.dof).sum();
        let mut forward = Vec::with_capacity(n);
        for &block in order {
            let b = blocks[block];
            forward.extend(b.offset..b.offset + b.dof);
        }
        let mut inverse = vec![0; forward.len()];
        for (new, &old) in forward.iter().enumerate() {
            inverse[old] = new;
        }
        Self { forward, inverse }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.forward.iter().enumerate().all(|(i, &j)| i == j)
    }

    /// Permuted position of an original column.
    pub fn new_index(&self, old: usize) -> usize {
        self.inverse[old]
    }

    /// Reorder a column vector from original to permuted positions.
    pub fn permute(&self, v: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(self.len(), 1, |i, _| v[(self.forward[i], 0)])
    }

    /// Reorder a column vector from permuted back to original positions.
    pub fn unpermute(&self, v: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(self.len(), 1, |i, _| v[(self.inverse[i], 0)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star(leaves: usize) -> Vec<BTreeSet<usize>> {
        let mut adjacency = vec![BTreeSet::new(); leaves + 1];
        for leaf in 1..=leaves {
            adjacency[0].insert(leaf);
            adjacency[leaf].insert(0);
        }
        adjacency
    }

    #[test]
    fn test_minimum_degree_defers_hub() {
        let adjacency = star(4);
        let order = minimum_degree(&adjacency);
        assert_eq!(order.len(), 5);
        assert_ne!(order[0], 0);
        assert_eq!(fill_in(&adjacency, &order), 0);
    }

    #[test]
    fn test_hub_first_creates_fill() {
        let adjacency = star(4);
        let natural: Vec<usize> = (0..5).collect();
        // Eliminating the hub first joins all 4 leaves: 6 edges.
        assert_eq!(fill_in(&adjacency, &natural), 6);
    }

    #[test]
    fn test_chain_has_no_fill() {
        let mut adjacency = vec![BTreeSet::new(); 4];
        for i in 0..3 {
            adjacency[i].insert(i + 1);
            adjacency[i + 1].insert(i);
        }
        let order = minimum_degree(&adjacency);
        assert_eq!(order[0], 0);
        assert_eq!(fill_in(&adjacency, &order), 0);
    }

    #[test]
    fn test_permutation_round_trip() {
        let blocks = [
            ColumnBlock { offset: 0, dof: 2 },
            ColumnBlock { offset: 2, dof: 1 },
        ];
        let permutation = ColumnPermutation::from_block_order(&blocks, &[1, 0]);
        assert_eq!(permutation.new_index(2), 0);
        assert_eq!(permutation.new_index(0), 1);
        assert!(!permutation.is_identity());

        let v = Mat::from_fn(3, 1, |i, _| i as f64 * 10.0);
        let permuted = permutation.permute(&v);
        assert_eq!(permuted[(0, 0)], 20.0);
        let restored = permutation.unpermute(&permuted);
        for i in 0..3 {
            assert_eq!(restored[(i, 0)], v[(i, 0)]);
        }
    }

    #[test]
    fn test_identity() {
        let permutation = ColumnPermutation::identity(3);
        assert!(permutation.is_identity());
        assert_eq!(permutation.len(), 3);
    }
}
