//! Scenario-tree topology.
//!
//! The engine consumes the tree through a read-only interface: period
//! boundaries, node-to-state partitions, path lookups, leaf probabilities,
//! and the business-as-usual emissions curve. [`ScenarioTree::balanced`]
//! builds the standard tree the model runs on: a full binary tree with one
//! branching per period, `2^(nperiods-1)` leaf states, and a final range of
//! post-decision pseudo-nodes mapping one-to-one onto leaf states.
//!
//! The engine owns its tree. The recombination pass never reaches into
//! shared state; it hands the final probabilities back through
//! [`ScenarioTree::update_probabilities`].

use crate::error::{Error, Result};

/// Tolerance for leaf probabilities summing to one.
const PROB_SUM_TOLERANCE: f64 = 1e-9;

/// Piecewise-linear business-as-usual emissions-rate curve.
///
/// Rates are ppm of GHG added per year; times are years from the start of
/// the horizon. Constant extrapolation beyond the last knot.
#[derive(Debug, Clone)]
pub struct BauCurve {
    knots: Vec<(f64, f64)>,
}

impl BauCurve {
    pub fn new(knots: Vec<(f64, f64)>) -> Result<Self> {
        if knots.is_empty() {
            return Err(Error::MalformedTopology(
                "BAU emissions curve needs at least one knot".to_string(),
            ));
        }
        if !knots.windows(2).all(|w| w[0].0 < w[1].0) {
            return Err(Error::MalformedTopology(
                "BAU emissions curve knots must have strictly increasing times".to_string(),
            ));
        }
        if knots.iter().any(|&(_, rate)| rate <= 0.0) {
            return Err(Error::MalformedTopology(
                "BAU emissions rates must be positive".to_string(),
            ));
        }
        Ok(Self { knots })
    }

    /// Emissions rate at time `t`.
    pub fn rate_at(&self, t: f64) -> f64 {
        let first = self.knots[0];
        if t <= first.0 {
            return first.1;
        }
        for w in self.knots.windows(2) {
            let (t0, r0) = w[0];
            let (t1, r1) = w[1];
            if t <= t1 {
                return r0 + (r1 - r0) * (t - t0) / (t1 - t0);
            }
        }
        self.knots[self.knots.len() - 1].1
    }
}

/// Inputs to the balanced-tree builder.
#[derive(Debug, Clone)]
pub struct TreeParameters {
    /// Number of decision periods.
    pub nperiods: usize,
    /// Period boundary times, `nperiods + 1` entries starting at 0.
    pub decision_times: Vec<f64>,
    /// Leaf-state probabilities; uniform when absent.
    pub probs: Option<Vec<f64>>,
    /// Annual consumption growth rate.
    pub growth: f64,
    /// Elasticity of intertemporal substitution.
    pub eis: f64,
    /// Risk aversion.
    pub ra: f64,
    /// Years over which the tipping survival probability compounds.
    pub peak_temp_interval: f64,
    /// BAU emissions-rate knots, (years, ppm/year).
    pub bau_emission_knots: Vec<(f64, f64)>,
}

impl Default for TreeParameters {
    fn default() -> Self {
        Self {
            nperiods: 5,
            decision_times: vec![0.0, 15.0, 45.0, 85.0, 185.0, 285.0],
            probs: None,
            growth: 0.02,
            eis: 0.9,
            ra: 7.0,
            peak_temp_interval: 30.0,
            bau_emission_knots: vec![(0.0, 52.0), (30.0, 70.0), (60.0, 81.4)],
        }
    }
}

/// A decision tree over GHG outcomes, consumed read-only by the engine.
#[derive(Debug, Clone)]
pub struct ScenarioTree {
    nperiods: usize,
    x_dim: usize,
    final_states: usize,
    decision_times: Vec<f64>,
    decision_nodes: Vec<usize>,
    decision_period_pointer: Vec<usize>,
    /// `node_mapping[p-1][offset]` = leaf-state range reachable from the
    /// `offset`-th node of period `p`.
    node_mapping: Vec<Vec<(usize, usize)>>,
    /// `node_map[p-1][state]` = node of period `p` on the path to `state`.
    node_map: Vec<Vec<usize>>,
    period_map: Vec<usize>,
    probs: Vec<f64>,
    node_probs: Vec<f64>,
    bau: BauCurve,
    growth: f64,
    eis: f64,
    ra: f64,
    peak_temp_interval: f64,
}

impl ScenarioTree {
    /// Build the full binary scenario tree.
    pub fn balanced(params: TreeParameters) -> Result<Self> {
        let n = params.nperiods;
        if n < 2 {
            return Err(Error::MalformedTopology(
                "a scenario tree needs at least 2 periods".to_string(),
            ));
        }
        if n > usize::BITS as usize - 1 {
            return Err(Error::MalformedTopology(format!(
                "nperiods = {n} exceeds the representable tree depth"
            )));
        }
        if params.decision_times.len() != n + 1 {
            return Err(Error::MalformedTopology(format!(
                "expected {} decision times for {n} periods, got {}",
                n + 1,
                params.decision_times.len()
            )));
        }
        if params.decision_times[0] != 0.0 {
            return Err(Error::MalformedTopology(
                "the first decision time must be 0".to_string(),
            ));
        }
        if !params.decision_times.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::MalformedTopology(
                "decision times must be strictly increasing".to_string(),
            ));
        }
        if params.peak_temp_interval <= 0.0 {
            return Err(Error::MalformedTopology(
                "peak_temp_interval must be positive".to_string(),
            ));
        }

        let final_states = 1usize << (n - 1);
        let x_dim = (1usize << n) - 1;

        let probs = match params.probs {
            Some(p) => p,
            None => vec![1.0 / final_states as f64; final_states],
        };
        validate_probs(&probs, final_states)?;

        let decision_nodes: Vec<usize> = (0..n).map(|p| 1usize << p).collect();
        let decision_period_pointer: Vec<usize> = (0..n).map(|p| (1usize << p) - 1).collect();

        let mut period_map = vec![0usize; x_dim];
        for p in 0..n {
            let first = decision_period_pointer[p];
            for node in first..first + decision_nodes[p] {
                period_map[node] = p;
            }
        }

        // For each branching period p in 1..n, the offset-th of 2^p nodes
        // reaches a contiguous span of 2^(n-1-p) leaf states.
        let mut node_mapping = Vec::with_capacity(n - 1);
        let mut node_map = Vec::with_capacity(n - 1);
        for p in 1..n {
            let span = 1usize << (n - 1 - p);
            let nodes = 1usize << p;
            let mapping: Vec<(usize, usize)> = (0..nodes)
                .map(|offset| (offset * span, (offset + 1) * span - 1))
                .collect();
            let map: Vec<usize> = (0..final_states)
                .map(|state| decision_period_pointer[p] + state / span)
                .collect();
            node_mapping.push(mapping);
            node_map.push(map);
        }

        let bau = BauCurve::new(params.bau_emission_knots)?;
        let node_probs = node_probs_from(&probs, &decision_period_pointer, &node_mapping, n);

        Ok(Self {
            nperiods: n,
            x_dim,
            final_states,
            decision_times: params.decision_times,
            decision_nodes,
            decision_period_pointer,
            node_mapping,
            node_map,
            period_map,
            probs,
            node_probs,
            bau,
            growth: params.growth,
            eis: params.eis,
            ra: params.ra,
            peak_temp_interval: params.peak_temp_interval,
        })
    }

    pub fn nperiods(&self) -> usize {
        self.nperiods
    }

    pub fn x_dim(&self) -> usize {
        self.x_dim
    }

    pub fn final_states(&self) -> usize {
        self.final_states
    }

    pub fn decision_times(&self) -> &[f64] {
        &self.decision_times
    }

    pub fn decision_time(&self, p: usize) -> f64 {
        self.decision_times[p]
    }

    /// Length of period `p` in years.
    pub fn period_length(&self, p: usize) -> f64 {
        self.decision_times[p + 1] - self.decision_times[p]
    }

    pub fn decision_nodes(&self, p: usize) -> usize {
        self.decision_nodes[p]
    }

    pub fn decision_period_pointer(&self, p: usize) -> usize {
        self.decision_period_pointer[p]
    }

    /// The period a node belongs to; post-decision pseudo-nodes report
    /// `nperiods`.
    pub fn period_of(&self, node: usize) -> usize {
        if node >= self.x_dim {
            self.nperiods
        } else {
            self.period_map[node]
        }
    }

    /// The inclusive leaf-state range reachable from `node`.
    pub fn reachable_states(&self, node: usize) -> (usize, usize) {
        if node >= self.x_dim {
            let state = node - self.x_dim;
            return (state, state);
        }
        let period = self.period_map[node];
        if period == 0 {
            return (0, self.final_states - 1);
        }
        let offset = node - self.decision_period_pointer[period];
        if period <= self.nperiods - 2 {
            self.node_mapping[period - 1][offset]
        } else {
            (offset, offset)
        }
    }

    /// The first leaf state reachable from `node`; any state in the range
    /// identifies the same root path.
    pub fn path_state(&self, node: usize) -> usize {
        self.reachable_states(node).0
    }

    /// The node of `period` on the path from the root to `state`.
    pub fn node_on_path(&self, period: usize, state: usize) -> usize {
        if period == 0 {
            0
        } else {
            self.node_map[period - 1][state]
        }
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn node_probs(&self) -> &[f64] {
        &self.node_probs
    }

    /// BAU emissions rate at time `t`.
    pub fn bau_of_t(&self, t: f64) -> f64 {
        self.bau.rate_at(t)
    }

    pub fn growth(&self) -> f64 {
        self.growth
    }

    pub fn eis(&self) -> f64 {
        self.eis
    }

    pub fn ra(&self) -> f64 {
        self.ra
    }

    pub fn peak_temp_interval(&self) -> f64 {
        self.peak_temp_interval
    }

    /// Install recombined probabilities. The node probabilities are rebuilt
    /// from the leaves and the result is checked for consistency.
    pub fn update_probabilities(&mut self, probs: Vec<f64>) -> Result<()> {
        validate_probs(&probs, self.final_states)?;
        self.node_probs = node_probs_from(
            &probs,
            &self.decision_period_pointer,
            &self.node_mapping,
            self.nperiods,
        );
        self.probs = probs;
        self.check_node_probs()
    }

    /// Verify that every interior node's probability equals the sum of the
    /// leaf probabilities it can reach.
    pub fn check_node_probs(&self) -> Result<()> {
        if (self.node_probs[0] - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(Error::MalformedTopology(format!(
                "root probability is {}, expected 1",
                self.node_probs[0]
            )));
        }
        for p in 1..self.nperiods {
            for offset in 0..self.decision_nodes[p] {
                let node = self.decision_period_pointer[p] + offset;
                let (first, last) = self.reachable_states(node);
                let sum: f64 = self.probs[first..=last].iter().sum();
                if (self.node_probs[node] - sum).abs() > PROB_SUM_TOLERANCE {
                    return Err(Error::MalformedTopology(format!(
                        "node {node} probability {} disagrees with its leaf range sum {sum}",
                        self.node_probs[node]
                    )));
                }
            }
        }
        Ok(())
    }
}

fn validate_probs(probs: &[f64], final_states: usize) -> Result<()> {
    if probs.len() != final_states {
        return Err(Error::MalformedTopology(format!(
            "expected {final_states} leaf probabilities, got {}",
            probs.len()
        )));
    }
    if probs.iter().any(|&p| p <= 0.0 || !p.is_finite()) {
        return Err(Error::MalformedTopology(
            "leaf probabilities must be positive and finite".to_string(),
        ));
    }
    let sum: f64 = probs.iter().sum();
    if (sum - 1.0).abs() > PROB_SUM_TOLERANCE {
        return Err(Error::MalformedTopology(format!(
            "leaf probabilities sum to {sum}, expected 1"
        )));
    }
    Ok(())
}

/// Node probabilities from leaf probabilities: each node sums the leaves it
/// can reach; the root carries the whole mass.
fn node_probs_from(
    probs: &[f64],
    decision_period_pointer: &[usize],
    node_mapping: &[Vec<(usize, usize)>],
    nperiods: usize,
) -> Vec<f64> {
    let x_dim = (1usize << nperiods) - 1;
    let mut node_probs = vec![0.0; x_dim];
    node_probs[0] = 1.0;
    for p in 1..nperiods {
        let first = decision_period_pointer[p];
        for (offset, &(lo, hi)) in node_mapping[p - 1].iter().enumerate() {
            node_probs[first + offset] = probs[lo..=hi].iter().sum();
        }
    }
    node_probs
}
