//! Damage engine configuration.
//!
//! All knobs of the Monte Carlo simulation and the cache live here; nothing
//! is hardcoded in the engine. Defaults reproduce the standard calibration:
//! three GHG severities at 450/650/1000 ppm, Pindyck impact parameters, and
//! tipping points enabled.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Atmospheric GHG concentration at the start of the planning horizon, ppm.
/// Severity paths are measured as increases above this level.
pub const BASE_GHG: f64 = 400.0;

/// The mapping from GHG concentration to temperature uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureMap {
    /// Thin-tailed displaced gamma (Pindyck).
    DisplacedGamma,
    /// Thicker-tailed log-normal (Wagner-Weitzman).
    LogNormal,
    /// Feedback-parameter distribution (Roe-Baker).
    RoeBaker,
}

impl std::fmt::Display for TemperatureMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemperatureMap::DisplacedGamma => write!(f, "displaced-gamma"),
            TemperatureMap::LogNormal => write!(f, "log-normal"),
            TemperatureMap::RoeBaker => write!(f, "roe-baker"),
        }
    }
}

/// Configuration for damage simulation, interpolation, and caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageConfig {
    /// Temperature scale of the tipping-point survival probability.
    pub peak_temp: f64,
    /// Rate of the gamma draw governing post-tipping consumption loss.
    pub disaster_tail: f64,
    /// Whether tipping points fire at all.
    pub tip_on: bool,
    /// GHG-to-temperature regime.
    pub temp_map: TemperatureMap,
    /// Business-as-usual GHG concentration reached with zero mitigation, ppm.
    pub bau_ghg: f64,
    /// GHG concentration reached by each severity path, ppm, strictly
    /// increasing, `dnum` entries.
    pub ghg_levels: Vec<f64>,

    /// Pindyck economic-impact gamma shape.
    pub pindyck_impact_k: f64,
    /// Pindyck economic-impact gamma rate.
    pub pindyck_impact_theta: f64,
    /// Pindyck economic-impact displacement.
    pub pindyck_impact_displace: f64,

    /// Displaced-gamma temperature shape per severity.
    pub pindyck_temp_k: Vec<f64>,
    /// Displaced-gamma temperature rate per severity.
    pub pindyck_temp_theta: Vec<f64>,
    /// Displaced-gamma temperature displacement per severity.
    pub pindyck_temp_displace: Vec<f64>,
    /// Log-normal temperature mean (of the log) per severity.
    pub ww_temp_ave: Vec<f64>,
    /// Log-normal temperature stdev (of the log) per severity.
    pub ww_temp_stddev: Vec<f64>,
    /// Roe-Baker feedback mean per severity.
    pub rb_fbar: Vec<f64>,
    /// Roe-Baker feedback stdev per severity.
    pub rb_sigf: Vec<f64>,
    /// Roe-Baker displacement per severity.
    pub rb_theta: Vec<f64>,

    /// Samples per batch.
    pub draws: usize,
    /// Batches averaged per repetition.
    pub over: usize,
    /// Full Monte Carlo runs recorded in the cache.
    pub monte_loops: usize,
    /// Repetitions of the `draws * over` pass per severity.
    pub loops: usize,
    /// Number of GHG severities simulated.
    pub dnum: usize,
    /// Resimulate and overwrite the cache instead of loading it.
    pub force_simul: bool,
    /// Years for temperature to reach half its equilibrium response.
    pub maxh: f64,
    /// Root seed for all random draws.
    pub seed: u64,
    /// Location of the simulation cache file.
    pub cache_path: PathBuf,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            peak_temp: 11.0,
            disaster_tail: 18.0,
            tip_on: true,
            temp_map: TemperatureMap::LogNormal,
            bau_ghg: 1000.0,
            ghg_levels: vec![450.0, 650.0, 1000.0],
            pindyck_impact_k: 4.5,
            pindyck_impact_theta: 21341.0,
            pindyck_impact_displace: -0.0000746,
            pindyck_temp_k: vec![2.81, 4.6134, 6.14],
            pindyck_temp_theta: vec![1.6667, 1.5974, 1.53139],
            pindyck_temp_displace: vec![-0.25, -0.5, -1.0],
            ww_temp_ave: vec![0.573, 1.148, 1.563],
            ww_temp_stddev: vec![0.462, 0.441, 0.432],
            rb_fbar: vec![0.75233, 0.844652, 0.858332],
            rb_sigf: vec![0.049921, 0.033055, 0.042408],
            rb_theta: vec![2.304627, 3.333599, 2.356967],
            draws: 50,
            over: 10,
            monte_loops: 1,
            loops: 1,
            dnum: 3,
            force_simul: true,
            maxh: 100.0,
            seed: 0,
            cache_path: PathBuf::from("damage_coefficients.ezc"),
        }
    }
}

impl DamageConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.draws == 0 || self.over == 0 || self.loops == 0 || self.monte_loops == 0 {
            return Err(Error::InvalidConfig(
                "draws, over, loops, and monte_loops must all be > 0".to_string(),
            ));
        }
        if self.dnum < 2 {
            return Err(Error::InvalidConfig(
                "dnum must be >= 2 to interpolate between severities".to_string(),
            ));
        }
        if self.ghg_levels.len() != self.dnum {
            return Err(Error::InvalidConfig(format!(
                "ghg_levels has {} entries, expected dnum = {}",
                self.ghg_levels.len(),
                self.dnum
            )));
        }
        if !self.ghg_levels.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::InvalidConfig(
                "ghg_levels must be strictly increasing".to_string(),
            ));
        }
        if self.bau_ghg <= BASE_GHG {
            return Err(Error::InvalidConfig(format!(
                "bau_ghg must exceed the base concentration of {BASE_GHG} ppm"
            )));
        }
        if self.ghg_levels[0] <= BASE_GHG {
            return Err(Error::InvalidConfig(format!(
                "every severity GHG level must exceed the base concentration of {BASE_GHG} ppm"
            )));
        }
        if self.ghg_levels.last().is_some_and(|&g| g > self.bau_ghg) {
            return Err(Error::InvalidConfig(
                "the most severe GHG level cannot exceed bau_ghg".to_string(),
            ));
        }
        for (name, table) in [
            ("pindyck_temp_k", &self.pindyck_temp_k),
            ("pindyck_temp_theta", &self.pindyck_temp_theta),
            ("pindyck_temp_displace", &self.pindyck_temp_displace),
            ("ww_temp_ave", &self.ww_temp_ave),
            ("ww_temp_stddev", &self.ww_temp_stddev),
            ("rb_fbar", &self.rb_fbar),
            ("rb_sigf", &self.rb_sigf),
            ("rb_theta", &self.rb_theta),
        ] {
            if table.len() != self.dnum {
                return Err(Error::InvalidConfig(format!(
                    "{name} has {} entries, expected dnum = {}",
                    table.len(),
                    self.dnum
                )));
            }
        }
        if self.maxh <= 0.0 {
            return Err(Error::InvalidConfig("maxh must be > 0".to_string()));
        }
        if self.peak_temp <= 0.0 {
            return Err(Error::InvalidConfig("peak_temp must be > 0".to_string()));
        }
        if self.disaster_tail <= 0.0 {
            return Err(Error::InvalidConfig(
                "disaster_tail must be > 0".to_string(),
            ));
        }
        if self.pindyck_impact_k <= 0.0 || self.pindyck_impact_theta <= 0.0 {
            return Err(Error::InvalidConfig(
                "Pindyck impact shape and rate must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// BAU emissions over the horizon, in ppm above base.
    pub fn bau_emissions(&self) -> f64 {
        self.bau_ghg - BASE_GHG
    }

    /// Mitigation breakpoint of each severity path: the fraction of BAU
    /// emissions avoided on the way to its GHG level. Strictly decreasing,
    /// ending at 0 when the most severe path is BAU itself.
    pub fn emit_percentages(&self) -> Vec<f64> {
        let bau = self.bau_emissions();
        self.ghg_levels
            .iter()
            .map(|ghg| 1.0 - (ghg - BASE_GHG) / bau)
            .collect()
    }
}
