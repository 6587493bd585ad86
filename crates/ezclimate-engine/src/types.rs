//! Core value types.

use serde::{Deserialize, Serialize};

/// The move history encoded in a leaf state's binary index.
///
/// Over `nperiods - 1` branching periods, bit `p` of the state index records
/// whether the path took the "up" move in period `p`. Two states with the
/// same number of up moves belong to the same move-order class and must end
/// up with identical damage after the recombination pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveHistory {
    state: usize,
    bits: usize,
}

impl MoveHistory {
    /// Decode the move history of `state` in a tree with `nperiods` periods.
    pub fn new(state: usize, nperiods: usize) -> Self {
        Self {
            state,
            bits: nperiods.saturating_sub(1),
        }
    }

    /// The leaf-state index this history belongs to.
    pub fn state(&self) -> usize {
        self.state
    }

    /// Whether the path moved up in period `period`.
    pub fn moved_up(&self, period: usize) -> bool {
        period < self.bits && (self.state >> period) & 1 == 1
    }

    /// The move-order class: the count of up moves across all periods.
    pub fn up_moves(&self) -> usize {
        let mask = if self.bits >= usize::BITS as usize {
            usize::MAX
        } else {
            (1usize << self.bits) - 1
        };
        (self.state & mask).count_ones() as usize
    }
}

/// One quadratic interpolation segment, `damage(m) = a*m^2 + b*m + c`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quadratic {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Quadratic {
    pub fn value(&self, m: f64) -> f64 {
        (self.a * m + self.b) * m + self.c
    }

    pub fn slope(&self, m: f64) -> f64 {
        2.0 * self.a * m + self.b
    }
}

/// Dense damage storage indexed by `(state, period, severity)`.
///
/// Created once per engine initialization (by simulation or cache load),
/// rewritten in place by the recombination pass, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageMatrix {
    states: usize,
    periods: usize,
    severities: usize,
    data: Vec<f64>,
}

impl DamageMatrix {
    pub fn zeros(states: usize, periods: usize, severities: usize) -> Self {
        Self {
            states,
            periods,
            severities,
            data: vec![0.0; states * periods * severities],
        }
    }

    pub fn states(&self) -> usize {
        self.states
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn severities(&self) -> usize {
        self.severities
    }

    #[inline]
    fn offset(&self, state: usize, period: usize, severity: usize) -> usize {
        debug_assert!(state < self.states && period < self.periods && severity < self.severities);
        (state * self.periods + period) * self.severities + severity
    }

    #[inline]
    pub fn get(&self, state: usize, period: usize, severity: usize) -> f64 {
        self.data[self.offset(state, period, severity)]
    }

    #[inline]
    pub fn set(&mut self, state: usize, period: usize, severity: usize, value: f64) {
        let idx = self.offset(state, period, severity);
        self.data[idx] = value;
    }

    /// All stored values, for finiteness checks and comparisons.
    pub fn values(&self) -> &[f64] {
        &self.data
    }
}
