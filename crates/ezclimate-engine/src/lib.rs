//! Climate damage engine.
//!
//! Estimates the expected economic damage of climate change, as a fraction
//! of consumption, across a recombining scenario tree of GHG outcomes, as a
//! differentiable function of a mitigation policy.
//!
//! The pipeline: a Monte Carlo simulation of temperature, economic impact,
//! and catastrophic tipping points produces raw per-state, per-period damage
//! at a handful of GHG severities; a recombination pass makes those values
//! path-independent; a piecewise-quadratic fit turns the sparse severities
//! into a continuous damage-vs-mitigation curve; and the evaluator answers
//! `damage_function` / `d_damage_by_state` queries from an external
//! optimizer. A versioned on-disk cache short-circuits resimulation when the
//! full parameter set is unchanged.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod interpolate;
pub mod recombine;
pub mod sampler;
pub mod simulation;
pub mod tree;
pub mod types;

pub use config::{DamageConfig, TemperatureMap};
pub use engine::DamageEngine;
pub use error::{Error, Result};
pub use tree::{ScenarioTree, TreeParameters};
pub use types::{DamageMatrix, MoveHistory, Quadratic};
