//! Recombining-tree consistency pass.
//!
//! The raw leaf-state ordering encodes an explicit up/down move sequence, but
//! damage must depend only on the *composition* of moves, not their order: an
//! up-then-down path and a down-then-up path carry the same cumulative
//! mitigation. The pass groups leaf states by move-order class, replaces each
//! member's damage with the class's probability-weighted average, and returns
//! the leaf probabilities permuted into class-grouped enumeration order. The
//! caller pushes those back into its tree, which rebuilds and re-verifies the
//! interior node probabilities.

use tracing::debug;

use crate::error::{Error, Result};
use crate::tree::ScenarioTree;
use crate::types::{DamageMatrix, MoveHistory};

/// Collapse path-order information out of the raw damage table, in place.
///
/// Returns the reassigned leaf probabilities.
pub fn recombine(damage: &mut DamageMatrix, tree: &ScenarioTree) -> Result<Vec<f64>> {
    let nperiods = tree.nperiods();
    let final_states = tree.final_states();
    if damage.states() != final_states || damage.periods() != nperiods {
        return Err(Error::MalformedTopology(format!(
            "damage table is {}x{}, tree expects {final_states}x{nperiods}",
            damage.states(),
            damage.periods()
        )));
    }

    // Move-order classes 0..nperiods-1 up moves, members in state order.
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); nperiods];
    for state in 0..final_states {
        members[MoveHistory::new(state, nperiods).up_moves()].push(state);
    }

    let probs = tree.probs();
    let class_prob: Vec<f64> = members
        .iter()
        .map(|states| states.iter().map(|&s| probs[s]).sum())
        .collect();

    for period in 0..nperiods {
        for severity in 0..damage.severities() {
            for (class, states) in members.iter().enumerate() {
                let weighted: f64 = states
                    .iter()
                    .map(|&s| probs[s] * damage.get(s, period, severity))
                    .sum();
                let average = weighted / class_prob[class];
                for &s in states {
                    damage.set(s, period, severity, average);
                }
            }
        }
    }

    // Reassign probabilities to the class-grouped ordering: enumerating
    // states class by class, the k-th state takes the k-th original
    // probability.
    let mut new_probs = vec![0.0; final_states];
    let mut k = 0;
    for states in &members {
        for &s in states {
            new_probs[s] = probs[k];
            k += 1;
        }
    }

    debug!(
        classes = nperiods,
        states = final_states,
        "recombination pass complete"
    );
    Ok(new_probs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeParameters;

    fn tree_with(nperiods: usize, probs: Option<Vec<f64>>) -> ScenarioTree {
        let times: Vec<f64> = (0..=nperiods).map(|p| (p * 30) as f64).collect();
        ScenarioTree::balanced(TreeParameters {
            nperiods,
            decision_times: times,
            probs,
            ..TreeParameters::default()
        })
        .unwrap()
    }

    fn distinct_matrix(tree: &ScenarioTree, severities: usize) -> DamageMatrix {
        let mut d = DamageMatrix::zeros(tree.final_states(), tree.nperiods(), severities);
        for s in 0..tree.final_states() {
            for p in 0..tree.nperiods() {
                for v in 0..severities {
                    d.set(s, p, v, 0.01 * (s * 100 + p * 10 + v) as f64);
                }
            }
        }
        d
    }

    #[test]
    fn test_same_class_same_damage() {
        let tree = tree_with(4, None);
        let mut d = distinct_matrix(&tree, 3);
        recombine(&mut d, &tree).unwrap();
        for a in 0..tree.final_states() {
            for b in 0..tree.final_states() {
                let class_a = MoveHistory::new(a, 4).up_moves();
                let class_b = MoveHistory::new(b, 4).up_moves();
                if class_a != class_b {
                    continue;
                }
                for p in 0..tree.nperiods() {
                    for v in 0..3 {
                        assert_eq!(d.get(a, p, v), d.get(b, p, v));
                    }
                }
            }
        }
    }

    #[test]
    fn test_class_average_is_probability_weighted() {
        // 3 periods, 4 states; class 1 = states {1, 2}
        let probs = vec![0.1, 0.2, 0.3, 0.4];
        let tree = tree_with(3, Some(probs));
        let mut d = DamageMatrix::zeros(4, 3, 1);
        for s in 0..4 {
            d.set(s, 0, 0, s as f64);
        }
        recombine(&mut d, &tree).unwrap();
        let expect = (0.2 * 1.0 + 0.3 * 2.0) / 0.5;
        assert!((d.get(1, 0, 0) - expect).abs() < 1e-12);
        assert!((d.get(2, 0, 0) - expect).abs() < 1e-12);
        // Singleton classes keep their value.
        assert_eq!(d.get(0, 0, 0), 0.0);
        assert_eq!(d.get(3, 0, 0), 3.0);
    }

    #[test]
    fn test_probability_reassignment_permutes() {
        // 4 periods, 8 states; class order enumerates 0,1,2,4,3,5,6,7.
        let probs: Vec<f64> = (1..=8).map(|i| i as f64 / 36.0).collect();
        let tree = tree_with(4, Some(probs.clone()));
        let mut d = distinct_matrix(&tree, 1);
        let new_probs = recombine(&mut d, &tree).unwrap();

        let order = [0usize, 1, 2, 4, 3, 5, 6, 7];
        for (k, &s) in order.iter().enumerate() {
            assert_eq!(new_probs[s], probs[k]);
        }
        // Same mass, same multiset.
        let mut a = probs.clone();
        let mut b = new_probs.clone();
        a.sort_by(f64::total_cmp);
        b.sort_by(f64::total_cmp);
        assert_eq!(a, b);
    }

    #[test]
    fn test_node_probs_consistent_after_update() {
        let probs: Vec<f64> = (1..=8).map(|i| i as f64 / 36.0).collect();
        let mut tree = tree_with(4, Some(probs));
        let mut d = distinct_matrix(&tree, 2);
        let new_probs = recombine(&mut d, &tree).unwrap();
        tree.update_probabilities(new_probs).unwrap();
        tree.check_node_probs().unwrap();

        for node in 1..tree.x_dim() {
            let (lo, hi) = tree.reachable_states(node);
            let sum: f64 = tree.probs()[lo..=hi].iter().sum();
            assert!((tree.node_probs()[node] - sum).abs() < 1e-12);
        }
    }

    #[test]
    fn test_uniform_probs_unchanged() {
        let tree = tree_with(4, None);
        let mut d = distinct_matrix(&tree, 1);
        let new_probs = recombine(&mut d, &tree).unwrap();
        assert_eq!(new_probs, tree.probs());
    }
}
