//! Piecewise-quadratic damage interpolation.
//!
//! The simulation produces damage at `dnum` discrete severities; the
//! optimizer needs damage as a continuous, differentiable function of average
//! mitigation. Per (state, period) the builder fits one quadratic per
//! severity gap: the segment nearest business-as-usual is flat at zero
//! mitigation and anchored to the BAU damage level, and each further segment
//! solves a 3x3 system enforcing slope continuity at the shared breakpoint
//! plus value matches at both of its breakpoints.

use nalgebra::{Matrix3, Vector3};

use crate::error::{Error, Result};
use crate::types::{DamageMatrix, Quadratic};

/// The fitted damage-vs-mitigation curves, one per (state, period).
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationTable {
    states: usize,
    periods: usize,
    segments: usize,
    /// Mitigation breakpoints, strictly decreasing, one per severity.
    emit: Vec<f64>,
    coef: Vec<Quadratic>,
}

impl InterpolationTable {
    pub fn states(&self) -> usize {
        self.states
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    /// Number of quadratic segments per curve (`dnum - 1`).
    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.emit
    }

    #[inline]
    pub fn get(&self, state: usize, period: usize, segment: usize) -> Quadratic {
        debug_assert!(state < self.states && period < self.periods && segment < self.segments);
        self.coef[(state * self.periods + period) * self.segments + segment]
    }

    /// The segment whose breakpoint range contains mitigation `m`.
    ///
    /// Segment `segments - 1` runs from zero mitigation up to its breakpoint;
    /// segment 0 covers everything from the second breakpoint on, including
    /// the supra-BAU extrapolation past full mitigation.
    pub fn segment_for(&self, m: f64) -> usize {
        for s in (1..self.segments).rev() {
            if m < self.emit[s] {
                return s;
            }
        }
        0
    }
}

/// Fit the interpolation table from the recombined damage matrix.
pub fn build(damage: &DamageMatrix, emit: &[f64]) -> Result<InterpolationTable> {
    let dnum = emit.len();
    if dnum < 2 {
        return Err(Error::InvalidConfig(
            "interpolation needs at least 2 severity breakpoints".to_string(),
        ));
    }
    if dnum != damage.severities() {
        return Err(Error::InvalidConfig(format!(
            "{} breakpoints for a damage table with {} severities",
            dnum,
            damage.severities()
        )));
    }
    if !emit.windows(2).all(|w| w[0] > w[1]) {
        return Err(Error::InvalidConfig(
            "mitigation breakpoints must be strictly decreasing".to_string(),
        ));
    }

    let states = damage.states();
    let periods = damage.periods();
    let segments = dnum - 1;
    let mut coef = vec![Quadratic::default(); states * periods * segments];

    for state in 0..states {
        for period in 0..periods {
            let base = (state * periods + period) * segments;

            // Flat at zero mitigation, anchored to BAU damage; curvature
            // pinned by the next simulated severity.
            let c = damage.get(state, period, dnum - 1);
            let a = (damage.get(state, period, dnum - 2) - c) / (emit[dnum - 2] * emit[dnum - 2]);
            let flat = Quadratic { a, b: 0.0, c };
            coef[base + dnum - 2] = flat;
            let mut slope = flat.slope(emit[dnum - 2]);

            for k in 1..dnum - 1 {
                let segment = dnum - k - 2;
                let m_lo = emit[segment + 1];
                let m_hi = emit[segment];
                let system = Matrix3::new(
                    2.0 * m_lo, 1.0, 0.0, //
                    m_hi * m_hi, m_hi, 1.0, //
                    m_lo * m_lo, m_lo, 1.0,
                );
                let rhs = Vector3::new(
                    slope,
                    damage.get(state, period, segment),
                    damage.get(state, period, segment + 1),
                );
                let solution = system.lu().solve(&rhs).ok_or(Error::DegenerateSystem {
                    state,
                    period,
                    segment,
                })?;
                if !solution.iter().all(|v| v.is_finite()) {
                    return Err(Error::DegenerateSystem {
                        state,
                        period,
                        segment,
                    });
                }
                let q = Quadratic {
                    a: solution[0],
                    b: solution[1],
                    c: solution[2],
                };
                slope = q.slope(m_hi);
                coef[base + segment] = q;
            }
        }
    }

    Ok(InterpolationTable {
        states,
        periods,
        segments,
        emit: emit.to_vec(),
        coef,
    })
}
