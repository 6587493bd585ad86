//! Monte Carlo damage generator.
//!
//! For each GHG severity the generator draws temperature, economic impact,
//! tipping-point occurrence, and tipping severity; converts them into a
//! consumption path per sample; sorts each batch by final-period damage; and
//! partitions the sorted batch into leaf-state buckets sized by the tree's
//! cumulative probabilities. Bucket means, averaged over `over` batches, form
//! the raw damage table `d[state][period][severity]`.
//!
//! Batches are independent: each derives its own seed from the root seed and
//! its (severity, repetition, batch) indices, so the rayon fan-out below is
//! reproducible regardless of scheduling. Results are combined in fixed index
//! order.

use std::f64::consts::LN_2;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DamageConfig;
use crate::error::{Error, Result};
use crate::sampler::{batch_seed, DrawSampler};
use crate::tree::ScenarioTree;
use crate::types::DamageMatrix;

/// One persisted state-by-period damage table: the `over`-batch average for
/// a (monte loop, severity, repetition) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityBlock {
    pub monte_loop: usize,
    pub severity: usize,
    pub repetition: usize,
    /// State-major rows of per-period mean damage.
    pub table: Vec<Vec<f64>>,
}

/// Everything one simulation run produces.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    /// The canonical damage matrix consumed downstream, from the first
    /// monte loop's first repetition.
    pub damage: DamageMatrix,
    /// Every block, retained for inspection and for the cache.
    pub blocks: Vec<SeverityBlock>,
}

/// Run the full Monte Carlo damage simulation.
pub fn simulate(config: &DamageConfig, tree: &ScenarioTree) -> Result<SimulationOutput> {
    config.validate()?;

    info!(
        nperiods = tree.nperiods(),
        x_dim = tree.x_dim(),
        final_states = tree.final_states(),
        horizons = ?tree.decision_times(),
        "tree structure"
    );
    info!(
        growth = tree.growth(),
        eis = tree.eis(),
        ra = tree.ra(),
        "economic parameters"
    );
    info!(
        temp_map = %config.temp_map,
        tip_on = config.tip_on,
        peak_temp = config.peak_temp,
        disaster_tail = config.disaster_tail,
        "damage parameters"
    );
    info!(
        draws = config.draws,
        over = config.over,
        loops = config.loops,
        monte_loops = config.monte_loops,
        total = config.draws * config.over * config.loops * config.monte_loops,
        seed = config.seed,
        "Monte Carlo parameters"
    );

    let bounds = bucket_bounds(tree.probs(), config.draws)?;
    let nperiods = tree.nperiods();
    let final_states = tree.final_states();

    let mut damage = DamageMatrix::zeros(final_states, nperiods, config.dnum);
    let mut blocks = Vec::with_capacity(config.monte_loops * config.dnum * config.loops);

    for monte_loop in 0..config.monte_loops {
        for severity in 0..config.dnum {
            for repetition in 0..config.loops {
                debug!(
                    monte_loop,
                    severity,
                    repetition,
                    ghg = config.ghg_levels[severity],
                    "simulating severity block"
                );
                let rep_index = monte_loop * config.loops + repetition;
                let batch_tables: Vec<Vec<Vec<f64>>> = (0..config.over)
                    .into_par_iter()
                    .map(|batch| {
                        let seed = batch_seed(config.seed, severity, rep_index, batch);
                        run_batch(config, tree, severity, seed, &bounds)
                    })
                    .collect::<Result<Vec<_>>>()?;

                let mut table = vec![vec![0.0; nperiods]; final_states];
                for batch_table in &batch_tables {
                    for (state, row) in batch_table.iter().enumerate() {
                        for (period, value) in row.iter().enumerate() {
                            table[state][period] += value;
                        }
                    }
                }
                let scale = 1.0 / config.over as f64;
                for row in &mut table {
                    for value in row.iter_mut() {
                        *value *= scale;
                    }
                }

                if table.iter().flatten().any(|v| !v.is_finite()) {
                    return Err(Error::NonFinite {
                        context: format!(
                            "damage table for monte_loop {monte_loop}, severity {severity}, \
                             repetition {repetition}"
                        ),
                    });
                }

                if monte_loop == 0 && repetition == 0 {
                    for (state, row) in table.iter().enumerate() {
                        for (period, &value) in row.iter().enumerate() {
                            damage.set(state, period, severity, value);
                        }
                    }
                }
                blocks.push(SeverityBlock {
                    monte_loop,
                    severity,
                    repetition,
                    table,
                });
            }
        }
    }

    Ok(SimulationOutput { damage, blocks })
}

/// Leaf-state bucket boundaries over a sorted batch: state `n` owns the
/// sample ranks up to `round(cum_prob_n * (draws - 1))`, inclusive.
fn bucket_bounds(probs: &[f64], draws: usize) -> Result<Vec<(usize, usize)>> {
    let mut bounds = Vec::with_capacity(probs.len());
    let mut first = 0usize;
    let mut cum = 0.0;
    for (state, &p) in probs.iter().enumerate() {
        cum += p;
        let last = if state + 1 == probs.len() {
            draws - 1
        } else {
            ((cum * (draws - 1) as f64).round() as usize).min(draws - 1)
        };
        if first > last {
            return Err(Error::MalformedTopology(format!(
                "state {state} gets an empty sample bucket: probability {p} is too small \
                 for {draws} draws"
            )));
        }
        bounds.push((first, last));
        first = last + 1;
    }
    Ok(bounds)
}

/// Simulate one batch of `draws` samples for one severity and reduce it to
/// per-state, per-period bucket means.
fn run_batch(
    config: &DamageConfig,
    tree: &ScenarioTree,
    severity: usize,
    seed: u64,
    bounds: &[(usize, usize)],
) -> Result<Vec<Vec<f64>>> {
    let draws = config.draws;
    let nperiods = tree.nperiods();
    let growth = tree.growth();

    let mut sampler = DrawSampler::new(seed);
    let temperature = sampler.temperature_draws(config, severity, draws)?;
    let impact = sampler.impact_draws(config, draws)?;
    let tip_uniform = sampler.uniform_matrix(draws, nperiods);
    let disaster = sampler.disaster_draws(config, draws)?;

    // Damage-free consumption benchmark at each period's end.
    let peak_consumption: Vec<f64> = (1..=nperiods)
        .map(|p| (growth * tree.decision_time(p)).exp())
        .collect();

    let mut rows = vec![vec![0.0; nperiods]; draws];
    let mut temp_at_h = vec![0.0; nperiods];
    let mut consumption = vec![0.0; nperiods];
    for (i, row) in rows.iter_mut().enumerate() {
        let temp = temperature[i].max(0.0);
        for p in 0..nperiods {
            let horizon = tree.decision_time(p + 1);
            temp_at_h[p] = 2.0 * temp * (1.0 - 0.5f64.powf(horizon / config.maxh));
            consumption[p] = consumption_growth(impact[i], temp, growth, config.maxh, horizon);
        }

        // A tipping point fires at most once per sample and hits consumption
        // in its period and every later one.
        let mut tipped = false;
        for p in 0..nperiods {
            let threshold = if config.tip_on {
                let survival = 1.0 - (temp_at_h[p] / temp_at_h[p].max(config.peak_temp)).powi(2);
                survival.powf(tree.period_length(p) / tree.peak_temp_interval())
            } else {
                1.0
            };
            if !tipped && tip_uniform[i * nperiods + p] > threshold {
                let hit = (-disaster[i]).exp();
                for c in consumption.iter_mut().skip(p) {
                    *c *= hit;
                }
                tipped = true;
            }
        }

        for p in 0..nperiods {
            row[p] = 1.0 - consumption[p] / peak_consumption[p];
        }
    }

    // Ascending sort on final-period damage; total_cmp keeps ties (and any
    // non-finite garbage) deterministically ordered.
    rows.sort_by(|a, b| a[nperiods - 1].total_cmp(&b[nperiods - 1]));

    let mut means = vec![vec![0.0; nperiods]; bounds.len()];
    for (state, &(first, last)) in bounds.iter().enumerate() {
        let count = (last - first + 1) as f64;
        for p in 0..nperiods {
            let sum: f64 = rows[first..=last].iter().map(|r| r[p]).sum();
            means[state][p] = sum / count;
        }
    }
    Ok(means)
}

/// Consumption growth to `end_time` under warming, Pindyck's closed-form
/// discounted-impact integral: the loss rate is `2 * impact * T(t)` with
/// `T(t)` saturating exponentially with half-life `maxh`.
fn consumption_growth(impact: f64, temp: f64, growth: f64, maxh: f64, end_time: f64) -> f64 {
    let term1 = 2.0 * impact * maxh * temp / LN_2;
    let term2 = (growth - 2.0 * impact * temp) * end_time;
    let term3 = -(2.0 * impact * maxh * temp * 0.5f64.powf(end_time / maxh)) / LN_2;
    (term1 + term2 + term3).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeParameters;

    fn small_tree() -> ScenarioTree {
        ScenarioTree::balanced(TreeParameters {
            nperiods: 3,
            decision_times: vec![0.0, 15.0, 45.0, 85.0],
            ..TreeParameters::default()
        })
        .unwrap()
    }

    fn small_config() -> DamageConfig {
        DamageConfig {
            draws: 400,
            over: 2,
            seed: 42,
            ..DamageConfig::default()
        }
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let tree = small_tree();
        let cfg = small_config();
        let a = simulate(&cfg, &tree).unwrap();
        let b = simulate(&cfg, &tree).unwrap();
        assert_eq!(a.damage, b.damage);
        assert_eq!(a.blocks, b.blocks);
    }

    #[test]
    fn test_damage_is_fractional() {
        let tree = small_tree();
        let out = simulate(&small_config(), &tree).unwrap();
        for &v in out.damage.values() {
            assert!(v.is_finite());
            assert!(v < 1.0, "damage {v} >= 1");
        }
    }

    #[test]
    fn test_states_ordered_by_final_period_damage() {
        let tree = small_tree();
        let out = simulate(&small_config(), &tree).unwrap();
        let last = tree.nperiods() - 1;
        for severity in 0..3 {
            for state in 1..tree.final_states() {
                assert!(
                    out.damage.get(state - 1, last, severity)
                        <= out.damage.get(state, last, severity) + 1e-12
                );
            }
        }
    }

    #[test]
    fn test_higher_severity_does_more_damage() {
        let tree = small_tree();
        let out = simulate(&small_config(), &tree).unwrap();
        let last = tree.nperiods() - 1;
        let worst = 2;
        // Final-period bucket means are order statistics of the sample
        // distribution, which the 1000ppm path dominates.
        for state in 0..tree.final_states() {
            assert!(out.damage.get(state, last, 0) <= out.damage.get(state, last, worst) + 1e-9);
        }
        // Bucket-count-weighted per-period aggregates equal the plain sample
        // mean, which the severer path dominates.
        let bounds = bucket_bounds(tree.probs(), small_config().draws).unwrap();
        for period in 0..tree.nperiods() {
            let agg = |severity: usize| -> f64 {
                bounds
                    .iter()
                    .enumerate()
                    .map(|(s, &(lo, hi))| {
                        (hi - lo + 1) as f64 * out.damage.get(s, period, severity)
                    })
                    .sum()
            };
            assert!(agg(0) <= agg(worst) + 1e-6);
        }
    }

    #[test]
    fn test_tipping_raises_damage() {
        let tree = small_tree();
        let on = simulate(&small_config(), &tree).unwrap();
        let off = simulate(
            &DamageConfig {
                tip_on: false,
                ..small_config()
            },
            &tree,
        )
        .unwrap();
        let last = tree.nperiods() - 1;
        for severity in 0..3 {
            for state in 0..tree.final_states() {
                assert!(
                    off.damage.get(state, last, severity)
                        <= on.damage.get(state, last, severity) + 1e-9
                );
            }
            // Count-weighted aggregates are sort-order free: tipping can only
            // lower consumption per sample, so the sample mean can only rise.
            let bounds = bucket_bounds(tree.probs(), small_config().draws).unwrap();
            for period in 0..tree.nperiods() {
                let agg = |d: &DamageMatrix| -> f64 {
                    bounds
                        .iter()
                        .enumerate()
                        .map(|(s, &(lo, hi))| (hi - lo + 1) as f64 * d.get(s, period, severity))
                        .sum()
                };
                assert!(agg(&off.damage) <= agg(&on.damage) + 1e-9);
            }
        }
    }

    #[test]
    fn test_too_few_draws_for_buckets() {
        let tree = small_tree();
        let cfg = DamageConfig {
            draws: 2,
            ..small_config()
        };
        assert!(matches!(
            simulate(&cfg, &tree),
            Err(Error::MalformedTopology(_))
        ));
    }

    #[test]
    fn test_bucket_bounds_cover_all_draws() {
        let probs = vec![0.25; 4];
        let bounds = bucket_bounds(&probs, 1000).unwrap();
        assert_eq!(bounds[0].0, 0);
        assert_eq!(bounds[3].1, 999);
        for w in bounds.windows(2) {
            assert_eq!(w[0].1 + 1, w[1].0);
        }
    }

    #[test]
    fn test_consumption_growth_without_impact() {
        // Zero impact reduces to pure exponential growth.
        let g = consumption_growth(0.0, 3.0, 0.02, 100.0, 85.0);
        assert!((g - (0.02f64 * 85.0).exp()).abs() < 1e-12);
    }
}
