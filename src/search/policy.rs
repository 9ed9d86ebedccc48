//! Child-scoring rules for the selection phase.

use std::hash::Hash;

use crate::search::tree::Node;

/// Which UCB variant scores children during selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeuristicKind {
    /// Plain UCB1.
    #[default]
    None,
    /// Heuristic seeds act as pseudo-visits baked in before the first real
    /// visit.
    PreVisit,
    /// Plain UCB1 plus the heuristic seed as an additive bias.
    Simple,
}

/// Default exploration constant `C = 1/√2`.
pub const DEFAULT_EXPLORATION: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Score `child` from `perspective`'s point of view. `n_siblings` counts
/// the child's siblings (other children of `parent`).
///
/// Unvisited children score +∞ under the basic and simple variants, so
/// they are always tried before any visited sibling. Callers break ties in
/// insertion order by keeping the first strict maximum.
pub fn ucb<P: Copy + Eq + Hash>(
    kind: HeuristicKind,
    c: f64,
    parent: &Node<P>,
    child: &Node<P>,
    n_siblings: usize,
    perspective: P,
) -> f64 {
    match kind {
        HeuristicKind::None => basic(c, parent, child, perspective),
        HeuristicKind::PreVisit => match child.heuristic_seed {
            Some((k, n)) => {
                assert!(
                    n > 0 && 0.0 <= k && k <= n as f64,
                    "heuristic seed ({}, {}) violates 0 <= k <= n",
                    k,
                    n
                );
                let n = n as f64;
                let score = child.score.get(&perspective).copied().unwrap_or(0.0);
                let pseudo_visits = child.visits as f64 + n;
                (score + k) / pseudo_visits
                    + c * ((parent.visits as f64 + n * n_siblings as f64).ln() / pseudo_visits)
                        .sqrt()
            }
            // Nodes merged from peers carry no seed until the local
            // expansion backfills one.
            None => basic(c, parent, child, perspective),
        },
        HeuristicKind::Simple => {
            let bias = child
                .heuristic_seed
                .map(|(k, n)| k / n as f64)
                .unwrap_or(0.0);
            basic(c, parent, child, perspective) + bias
        }
    }
}

fn basic<P: Copy + Eq + Hash>(c: f64, parent: &Node<P>, child: &Node<P>, perspective: P) -> f64 {
    if child.visits == 0 {
        return f64::INFINITY;
    }
    let visits = child.visits as f64;
    let score = child.score.get(&perspective).copied().unwrap_or(0.0);
    score / visits + c * ((parent.visits as f64).ln() / visits).sqrt()
}
