//! Engine assembly.
//!
//! [`DamageEngine::new`] runs the full initialization pipeline: simulate (or
//! load and validate the cache), recombine, fit the interpolation table.
//! Everything the evaluator reads is frozen afterwards, so one engine can be
//! shared read-only across concurrent optimizer calls.

use tracing::info;

use crate::cache::{self, CacheHeader, SimulationCache};
use crate::config::DamageConfig;
use crate::error::Result;
use crate::interpolate::{self, InterpolationTable};
use crate::recombine;
use crate::simulation;
use crate::tree::ScenarioTree;
use crate::types::DamageMatrix;

/// The damage-generation and damage-evaluation engine.
pub struct DamageEngine {
    pub(crate) config: DamageConfig,
    pub(crate) tree: ScenarioTree,
    pub(crate) damage: DamageMatrix,
    pub(crate) table: InterpolationTable,
}

impl DamageEngine {
    /// Initialize the engine: obtain the raw damage matrix (simulating or
    /// loading the cache per `config.force_simul`), run the recombination
    /// pass, push the recombined probabilities into the tree, and fit the
    /// interpolation coefficients.
    pub fn new(config: DamageConfig, mut tree: ScenarioTree) -> Result<Self> {
        config.validate()?;
        let emit = config.emit_percentages();
        info!(
            bau_emissions = config.bau_emissions(),
            breakpoints = ?emit,
            "severity mitigation breakpoints"
        );

        let expected = CacheHeader::for_run(&config, &tree);
        let record = if config.force_simul {
            let output = simulation::simulate(&config, &tree)?;
            let record = SimulationCache::from_output(expected, output);
            cache::save(&config.cache_path, &record)?;
            record
        } else {
            info!(
                path = %config.cache_path.display(),
                "checking cache parameters against current run"
            );
            let record = cache::load(&config.cache_path)?;
            record.header.validate_against(&expected)?;
            record
        };

        let mut damage = record.damage;
        let recombined_probs = recombine::recombine(&mut damage, &tree)?;
        tree.update_probabilities(recombined_probs)?;
        let table = interpolate::build(&damage, &emit)?;

        Ok(Self {
            config,
            tree,
            damage,
            table,
        })
    }

    pub fn config(&self) -> &DamageConfig {
        &self.config
    }

    /// The tree with recombined probabilities installed.
    pub fn tree(&self) -> &ScenarioTree {
        &self.tree
    }

    /// The recombined damage matrix.
    pub fn damage_matrix(&self) -> &DamageMatrix {
        &self.damage
    }

    /// The fitted interpolation table.
    pub fn interpolation(&self) -> &InterpolationTable {
        &self.table
    }
}
