//! Budgeted top-K selection of specializations.

use crate::analysis::Cost;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Positions of the `budget` highest scores, in ascending position order.
///
/// Among equal scores at the cut-off, which ones survive is unspecified.
pub fn select_best(scores: &[Cost], budget: usize) -> Vec<usize> {
    if scores.len() <= budget {
        return (0..scores.len()).collect();
    }
    // Min-heap of the best `budget` seen so far; the root is the weakest.
    let mut heap: BinaryHeap<Reverse<(Cost, usize)>> = BinaryHeap::with_capacity(budget + 1);
    for (index, &score) in scores.iter().enumerate() {
        heap.push(Reverse((score, index)));
        if heap.len() > budget {
            heap.pop();
        }
    }
    let mut best: Vec<usize> = heap.into_iter().map(|Reverse((_, i))| i).collect();
    best.sort_unstable();
    best
}
