//! Simulation cache.
//!
//! The Monte Carlo output is expensive; its result is keyed by the full
//! parameter set and persisted so later runs with identical parameters can
//! skip resimulation. The cache is designed with these principles:
//!
//! - **Versioned**: a format version gates deserialization; schema drift is
//!   detected by validation, not positional parsing.
//! - **Fail loudly**: any parameter mismatch between the cache and the
//!   current run is fatal and reported field by field. The engine never
//!   silently regenerates or partially trusts a stale cache.
//! - **Portable**: bincode + zstd compression.
//!
//! A run with `force_simul` set resimulates and overwrites the file; a run
//! without it must find a matching cache or stop.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DamageConfig, TemperatureMap};
use crate::error::{Error, Result};
use crate::simulation::{SeverityBlock, SimulationOutput};
use crate::tree::ScenarioTree;
use crate::types::DamageMatrix;

/// Cache format version (increment on breaking changes).
pub const CACHE_VERSION: u32 = 1;

/// zstd compression level (3 = good balance of speed/size).
const COMPRESSION_LEVEL: i32 = 3;

/// Tolerance when comparing cached leaf probabilities.
pub const PROB_TOLERANCE: f64 = 1e-4;

/// The full parameter tuple a cache record is keyed by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub version: u32,
    pub nperiods: usize,
    pub x_dim: usize,
    pub final_states: usize,
    pub monte_loops: usize,
    pub draws: usize,
    pub over: usize,
    pub loops: usize,
    pub dnum: usize,
    pub tip_on: bool,
    pub temp_map: TemperatureMap,
    pub disaster_tail: f64,
    pub peak_temp: f64,
    pub growth: f64,
    pub maxh: f64,
    pub bau_ghg: f64,
    pub seed: u64,
    /// Leaf probabilities at simulation time (pre-recombination).
    pub probs: Vec<f64>,
    /// Period boundary times.
    pub decision_times: Vec<f64>,
}

impl CacheHeader {
    /// The header the current run would write.
    pub fn for_run(config: &DamageConfig, tree: &ScenarioTree) -> Self {
        Self {
            version: CACHE_VERSION,
            nperiods: tree.nperiods(),
            x_dim: tree.x_dim(),
            final_states: tree.final_states(),
            monte_loops: config.monte_loops,
            draws: config.draws,
            over: config.over,
            loops: config.loops,
            dnum: config.dnum,
            tip_on: config.tip_on,
            temp_map: config.temp_map,
            disaster_tail: config.disaster_tail,
            peak_temp: config.peak_temp,
            growth: tree.growth(),
            maxh: config.maxh,
            bau_ghg: config.bau_ghg,
            seed: config.seed,
            probs: tree.probs().to_vec(),
            decision_times: tree.decision_times().to_vec(),
        }
    }

    /// Check this (cached) header against the current run's.
    ///
    /// Every field must match exactly, except probabilities which are
    /// compared within [`PROB_TOLERANCE`]. All mismatched fields are listed
    /// in the error.
    pub fn validate_against(&self, current: &Self) -> Result<()> {
        if self.version != current.version {
            return Err(Error::CacheVersion {
                found: self.version,
                expected: current.version,
            });
        }

        let mut mismatches: Vec<String> = Vec::new();
        let mut check = |field: &str, cached: String, now: String| {
            if cached != now {
                mismatches.push(format!("{field} (cached {cached}, current {now})"));
            }
        };

        check("nperiods", self.nperiods.to_string(), current.nperiods.to_string());
        check("x_dim", self.x_dim.to_string(), current.x_dim.to_string());
        check(
            "final_states",
            self.final_states.to_string(),
            current.final_states.to_string(),
        );
        check(
            "monte_loops",
            self.monte_loops.to_string(),
            current.monte_loops.to_string(),
        );
        check("draws", self.draws.to_string(), current.draws.to_string());
        check("over", self.over.to_string(), current.over.to_string());
        check("loops", self.loops.to_string(), current.loops.to_string());
        check("dnum", self.dnum.to_string(), current.dnum.to_string());
        check("tip_on", self.tip_on.to_string(), current.tip_on.to_string());
        check("temp_map", self.temp_map.to_string(), current.temp_map.to_string());
        check(
            "disaster_tail",
            self.disaster_tail.to_string(),
            current.disaster_tail.to_string(),
        );
        check(
            "peak_temp",
            self.peak_temp.to_string(),
            current.peak_temp.to_string(),
        );
        check("growth", self.growth.to_string(), current.growth.to_string());
        check("maxh", self.maxh.to_string(), current.maxh.to_string());
        check("bau_ghg", self.bau_ghg.to_string(), current.bau_ghg.to_string());
        check("seed", self.seed.to_string(), current.seed.to_string());

        if self.probs.len() != current.probs.len() {
            mismatches.push(format!(
                "probs length (cached {}, current {})",
                self.probs.len(),
                current.probs.len()
            ));
        } else {
            for (i, (cached, now)) in self.probs.iter().zip(&current.probs).enumerate() {
                if (cached - now).abs() > PROB_TOLERANCE {
                    mismatches.push(format!("probs[{i}] (cached {cached}, current {now})"));
                }
            }
        }
        if self.decision_times != current.decision_times {
            mismatches.push(format!(
                "decision_times (cached {:?}, current {:?})",
                self.decision_times, current.decision_times
            ));
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(Error::CacheMismatch(mismatches.join("; ")))
        }
    }
}

/// A complete cache record: header, every simulated block, and the canonical
/// damage matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationCache {
    pub header: CacheHeader,
    pub blocks: Vec<SeverityBlock>,
    pub damage: DamageMatrix,
}

impl SimulationCache {
    pub fn from_output(header: CacheHeader, output: SimulationOutput) -> Self {
        Self {
            header,
            blocks: output.blocks,
            damage: output.damage,
        }
    }
}

/// Write a cache record to disk (bincode + zstd).
pub fn save(path: &Path, cache: &SimulationCache) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }

    let serialized =
        bincode::serialize(cache).map_err(|e| Error::Serialization(e.to_string()))?;
    debug!(bytes = serialized.len(), "cache serialized");

    let compressed = zstd::encode_all(&serialized[..], COMPRESSION_LEVEL)
        .map_err(|e| Error::Compression(e.to_string()))?;
    debug!(bytes = compressed.len(), "cache compressed");

    std::fs::write(path, compressed).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!(path = %path.display(), blocks = cache.blocks.len(), "simulation cache written");
    Ok(())
}

/// Load a cache record from disk. The caller validates the header against
/// its own parameters before trusting the data.
pub fn load(path: &Path) -> Result<SimulationCache> {
    let compressed = std::fs::read(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let serialized =
        zstd::decode_all(&compressed[..]).map_err(|e| Error::Decompression(e.to_string()))?;
    let cache: SimulationCache =
        bincode::deserialize(&serialized).map_err(|e| Error::Deserialization(e.to_string()))?;

    if cache.header.version != CACHE_VERSION {
        return Err(Error::CacheVersion {
            found: cache.header.version,
            expected: CACHE_VERSION,
        });
    }
    info!(
        path = %path.display(),
        seed = cache.header.seed,
        blocks = cache.blocks.len(),
        "simulation cache loaded"
    );
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeParameters;

    fn test_header() -> CacheHeader {
        let config = DamageConfig::default();
        let tree = ScenarioTree::balanced(TreeParameters::default()).unwrap();
        CacheHeader::for_run(&config, &tree)
    }

    fn test_cache() -> SimulationCache {
        let header = test_header();
        let damage = DamageMatrix::zeros(header.final_states, header.nperiods, header.dnum);
        SimulationCache {
            header,
            blocks: vec![SeverityBlock {
                monte_loop: 0,
                severity: 0,
                repetition: 0,
                table: vec![vec![0.0; 5]; 16],
            }],
            damage,
        }
    }

    #[test]
    fn test_roundtrip() {
        let path = std::env::temp_dir().join(format!("ezc_cache_roundtrip_{}.ezc", std::process::id()));
        let cache = test_cache();
        save(&path, &cache).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, cache);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_matching_header_validates() {
        let header = test_header();
        header.validate_against(&header.clone()).unwrap();
    }

    #[test]
    fn test_mismatch_reports_every_field() {
        let cached = test_header();
        let mut current = cached.clone();
        current.draws = 5000;
        current.peak_temp = 9.0;
        let err = cached.validate_against(&current).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("draws"), "missing field in: {message}");
        assert!(message.contains("peak_temp"), "missing field in: {message}");
        assert!(!message.contains("maxh"), "spurious field in: {message}");
    }

    #[test]
    fn test_probability_tolerance() {
        let cached = test_header();
        let mut current = cached.clone();
        current.probs[3] += 5e-5;
        cached.validate_against(&current).unwrap();

        current.probs[3] += 5e-4;
        let err = cached.validate_against(&current).unwrap_err();
        assert!(err.to_string().contains("probs[3]"));
    }

    #[test]
    fn test_version_gate() {
        let cached = test_header();
        let mut old = cached.clone();
        old.version = 0;
        assert!(matches!(
            old.validate_against(&cached),
            Err(Error::CacheVersion { found: 0, .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("ezc_cache_does_not_exist.ezc");
        assert!(matches!(load(&path), Err(Error::Io { .. })));
    }
}
