//! Distribution samplers for the Monte Carlo damage simulation.
//!
//! All randomness derives from the configured root seed. Independent
//! sub-streams are obtained by SplitMix64 mixing of the (severity,
//! repetition, batch) indices into the root seed, so batches can run in any
//! order, or in parallel, and still reproduce bit-for-bit.

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Gamma, Normal};

use crate::config::{DamageConfig, TemperatureMap};
use crate::error::{Error, Result};

/// SplitMix64 finalizer; mixes a value into a well-distributed 64-bit state.
#[inline]
const fn splitmix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive an independent stream seed for one simulation batch.
pub fn batch_seed(root: u64, severity: usize, repetition: usize, batch: usize) -> u64 {
    let mut state = splitmix64(root ^ 0x9E3779B97F4A7C15);
    for label in [severity as u64, repetition as u64, batch as u64] {
        state = splitmix64(state ^ label.wrapping_mul(0x9E3779B97F4A7C15));
    }
    state
}

/// A seeded source of the random draws one batch consumes.
pub struct DrawSampler {
    rng: StdRng,
}

impl DrawSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `n` gamma draws with the given shape and rate (scale = 1/rate).
    pub fn gamma_draws(&mut self, shape: f64, rate: f64, n: usize) -> Result<Vec<f64>> {
        let gamma = Gamma::new(shape, 1.0 / rate)
            .map_err(|e| Error::InvalidConfig(format!("gamma({shape}, 1/{rate}): {e}")))?;
        Ok((0..n).map(|_| gamma.sample(&mut self.rng)).collect())
    }

    /// `n` normal draws.
    pub fn normal_draws(&mut self, mean: f64, stddev: f64, n: usize) -> Result<Vec<f64>> {
        let normal = Normal::new(mean, stddev)
            .map_err(|e| Error::InvalidConfig(format!("normal({mean}, {stddev}): {e}")))?;
        Ok((0..n).map(|_| normal.sample(&mut self.rng)).collect())
    }

    /// `n` uniform draws in `[0, 1)`.
    pub fn uniform_draws(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.rng.gen::<f64>()).collect()
    }

    /// `rows x cols` uniform draws in `[0, 1)`, row-major.
    pub fn uniform_matrix(&mut self, rows: usize, cols: usize) -> Vec<f64> {
        (0..rows * cols).map(|_| self.rng.gen::<f64>()).collect()
    }

    /// Temperature draws for one severity under the configured regime.
    ///
    /// | regime          | draw                                   | post-processing        |
    /// |-----------------|----------------------------------------|------------------------|
    /// | displaced gamma | gamma(k[s], 1/theta[s]) + displace[s]  | none                   |
    /// | log-normal      | normal(ave[s], stddev[s])              | exponentiate           |
    /// | Roe-Baker       | normal(fbar[s], sigf[s])               | 1/(1-v) - theta[s]     |
    pub fn temperature_draws(
        &mut self,
        config: &DamageConfig,
        severity: usize,
        n: usize,
    ) -> Result<Vec<f64>> {
        match config.temp_map {
            TemperatureMap::DisplacedGamma => {
                let displace = config.pindyck_temp_displace[severity];
                let mut draws = self.gamma_draws(
                    config.pindyck_temp_k[severity],
                    config.pindyck_temp_theta[severity],
                    n,
                )?;
                for t in &mut draws {
                    *t += displace;
                }
                Ok(draws)
            }
            TemperatureMap::LogNormal => {
                let mut draws = self.normal_draws(
                    config.ww_temp_ave[severity],
                    config.ww_temp_stddev[severity],
                    n,
                )?;
                for t in &mut draws {
                    *t = t.exp();
                }
                Ok(draws)
            }
            TemperatureMap::RoeBaker => {
                let theta = config.rb_theta[severity];
                let mut draws =
                    self.normal_draws(config.rb_fbar[severity], config.rb_sigf[severity], n)?;
                for t in &mut draws {
                    *t = 1.0 / (1.0 - *t) - theta;
                }
                Ok(draws)
            }
        }
    }

    /// Economic-impact draws: displaced gamma, independent of the regime.
    pub fn impact_draws(&mut self, config: &DamageConfig, n: usize) -> Result<Vec<f64>> {
        let mut draws =
            self.gamma_draws(config.pindyck_impact_k, config.pindyck_impact_theta, n)?;
        for x in &mut draws {
            *x += config.pindyck_impact_displace;
        }
        Ok(draws)
    }

    /// Tipping-severity draws: gamma(1, 1/disaster_tail) per sample.
    pub fn disaster_draws(&mut self, config: &DamageConfig, n: usize) -> Result<Vec<f64>> {
        self.gamma_draws(1.0, config.disaster_tail, n)
    }
}
