//! Damage evaluation and derivatives.
//!
//! These are the functions the optimizer calls on every iteration. They are
//! pure with respect to the frozen engine state; the mitigation vector is
//! read-only, and the finite-difference cross-checks perturb a private copy.
//!
//! Node indexing: `x` carries one mitigation decision per decision node
//! (`0..x_dim`); evaluation also accepts the post-decision pseudo-nodes
//! (`x_dim..x_dim + final_states`) that stand for realized leaf states.

use std::f64::consts::LN_2;

use crate::engine::DamageEngine;

/// Forward-difference step of the numerical cross-checks.
const FD_STEP: f64 = 1e-4;

/// Supra-BAU decay rate: damage halves per 0.1 of mitigation beyond 1.
const DECAY_RATE: f64 = 10.0;

/// Damage multiplier past full mitigation.
fn supra_bau_decay(m: f64) -> f64 {
    0.5f64.powf(DECAY_RATE * (m - 1.0))
}

impl DamageEngine {
    /// Emissions-weighted average of the mitigation decisions on the path
    /// from the root to `node`. Exactly 0 in period 0, where no mitigation
    /// has yet applied.
    pub fn average_mitigation(&self, x: &[f64], node: usize) -> f64 {
        let tree = &self.tree;
        let period = tree.period_of(node);
        if period == 0 {
            return 0.0;
        }
        let state = tree.path_state(node);

        let mut emissions = tree.bau_of_t(0.0) * tree.period_length(0);
        let mut total = emissions;
        let mut weighted = x[0] * emissions;
        for p in 1..period {
            emissions = tree.bau_of_t(tree.decision_time(p)) * tree.period_length(p);
            total += emissions;
            weighted += x[tree.node_on_path(p, state)] * emissions;
        }
        weighted / total
    }

    /// Expected fraction of consumption lost to climate damage at `node`
    /// under mitigation plan `x`: the probability-weighted average of the
    /// interpolated damage curves over the leaf states reachable from the
    /// node, normalized by the summed probability of that range.
    pub fn damage_function(&self, x: &[f64], node: usize) -> f64 {
        let tree = &self.tree;
        let period = tree.period_of(node);
        if period == 0 {
            return 0.0;
        }
        let (first, last) = tree.reachable_states(node);
        let m = self.average_mitigation(x, node);
        let segment = self.table.segment_for(m);
        let decay = if m >= 1.0 { supra_bau_decay(m) } else { 1.0 };

        let mut sum_prob = 0.0;
        let mut damage = 0.0;
        for state in first..=last {
            let prob = tree.probs()[state];
            sum_prob += prob;
            damage += prob * self.table.get(state, period - 1, segment).value(m) * decay;
        }
        damage / sum_prob
    }

    /// Analytic derivative of [`Self::damage_function`] with respect to
    /// `x[j]`, via the chain rule through the average mitigation.
    pub fn d_damage_by_state(&self, x: &[f64], node: usize, j: usize) -> f64 {
        if node == j {
            return 0.0;
        }
        let tree = &self.tree;
        let period = tree.period_of(node);
        if period == 0 {
            return 0.0;
        }
        let emissions_deriv = self.d_average_mitigation(node, j);
        if emissions_deriv == 0.0 {
            return 0.0;
        }

        let (first, last) = tree.reachable_states(node);
        let m = self.average_mitigation(x, node);
        let segment = self.table.segment_for(m);

        let mut sum_prob = 0.0;
        let mut d_damage = 0.0;
        for state in first..=last {
            let prob = tree.probs()[state];
            sum_prob += prob;
            let q = self.table.get(state, period - 1, segment);
            let slope = if m >= 1.0 {
                let decay = supra_bau_decay(m);
                let d_decay = -DECAY_RATE * LN_2 * decay;
                q.value(m) * d_decay + q.slope(m) * decay
            } else {
                q.slope(m)
            };
            d_damage += prob * slope;
        }
        emissions_deriv * d_damage / sum_prob
    }

    /// Analytic derivative of [`Self::average_mitigation`] with respect to
    /// `x[j]`: zero unless `j` lies on the unique root path to the states
    /// reached by `node` and strictly predates it; otherwise the ratio of
    /// `j`'s period emissions to the total path emissions.
    pub fn d_average_mitigation(&self, node: usize, j: usize) -> f64 {
        let tree = &self.tree;
        let period = tree.period_of(node);
        if period == 0 || j >= tree.x_dim() {
            return 0.0;
        }
        let j_period = tree.period_of(j);
        if j_period >= period {
            return 0.0;
        }
        let on_path = if j_period == 0 {
            j == 0
        } else {
            j == tree.node_on_path(j_period, tree.path_state(node))
        };
        if !on_path {
            return 0.0;
        }

        let mut total = tree.bau_of_t(0.0) * tree.period_length(0);
        for p in 1..period {
            total += tree.bau_of_t(tree.decision_time(p)) * tree.period_length(p);
        }
        let emissions_at_j =
            tree.bau_of_t(tree.decision_time(j_period)) * tree.period_length(j_period);
        emissions_at_j / total
    }

    /// Forward-difference reference for [`Self::d_damage_by_state`]. A
    /// correctness cross-check, not the production path.
    pub fn nd_damage_by_state(&self, x: &[f64], node: usize, j: usize) -> f64 {
        let base = self.damage_function(x, node);
        let mut perturbed = x.to_vec();
        perturbed[j] += FD_STEP;
        (self.damage_function(&perturbed, node) - base) / FD_STEP
    }

    /// Forward-difference reference for [`Self::d_average_mitigation`].
    pub fn nd_average_mitigation(&self, x: &[f64], node: usize, j: usize) -> f64 {
        let base = self.average_mitigation(x, node);
        let mut perturbed = x.to_vec();
        perturbed[j] += FD_STEP;
        (self.average_mitigation(&perturbed, node) - base) / FD_STEP
    }
}
