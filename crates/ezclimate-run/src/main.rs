//! ezclimate-run - simulate the damage engine and print its tables.
//!
//! Builds the balanced scenario tree and a damage configuration from flags,
//! initializes the engine (simulating or reloading the cache), and prints
//! the recombined damage matrix plus sample evaluations.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ezclimate_engine::{DamageConfig, DamageEngine, ScenarioTree, TemperatureMap, TreeParameters};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TempMapArg {
    /// Pindyck displaced gamma.
    Gamma,
    /// Wagner-Weitzman log-normal.
    Lognormal,
    /// Roe-Baker feedback distribution.
    RoeBaker,
}

impl From<TempMapArg> for TemperatureMap {
    fn from(arg: TempMapArg) -> Self {
        match arg {
            TempMapArg::Gamma => TemperatureMap::DisplacedGamma,
            TempMapArg::Lognormal => TemperatureMap::LogNormal,
            TempMapArg::RoeBaker => TemperatureMap::RoeBaker,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ezclimate-run")]
#[command(about = "Simulate climate damage over a recombining scenario tree")]
struct Cli {
    /// Samples per Monte Carlo batch
    #[arg(long, default_value = "50")]
    draws: usize,

    /// Batches averaged per severity
    #[arg(long, default_value = "10")]
    over: usize,

    /// Root seed for all random draws
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Tipping-point survival temperature scale
    #[arg(long, default_value = "11.0")]
    peak_temp: f64,

    /// Post-tipping consumption-loss rate
    #[arg(long, default_value = "18.0")]
    disaster_tail: f64,

    /// Disable tipping points
    #[arg(long)]
    no_tipping: bool,

    /// GHG-to-temperature mapping
    #[arg(long, value_enum, default_value = "lognormal")]
    temp_map: TempMapArg,

    /// Simulation cache file
    #[arg(long, default_value = "damage_coefficients.ezc")]
    cache: PathBuf,

    /// Load the cache instead of resimulating (parameters must match)
    #[arg(long)]
    load: bool,

    /// Uniform mitigation level for the sample evaluation
    #[arg(long, default_value = "0.5")]
    mitigation: f64,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ezclimate=info,ezclimate_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let tree = match ScenarioTree::balanced(TreeParameters::default()) {
        Ok(t) => t,
        Err(e) => {
            error!("failed to build scenario tree: {e}");
            std::process::exit(1);
        }
    };

    let config = DamageConfig {
        draws: cli.draws,
        over: cli.over,
        seed: cli.seed,
        peak_temp: cli.peak_temp,
        disaster_tail: cli.disaster_tail,
        tip_on: !cli.no_tipping,
        temp_map: cli.temp_map.into(),
        force_simul: !cli.load,
        cache_path: cli.cache,
        ..DamageConfig::default()
    };

    info!(
        draws = config.draws,
        over = config.over,
        seed = config.seed,
        "initializing damage engine"
    );

    let engine = match DamageEngine::new(config, tree) {
        Ok(engine) => engine,
        Err(e) => {
            error!("engine initialization failed: {e}");
            std::process::exit(1);
        }
    };

    let tree = engine.tree();
    let d = engine.damage_matrix();

    for severity in 0..engine.config().dnum {
        println!(
            "damage matrix, GHG path {} ppm (state x period):",
            engine.config().ghg_levels[severity]
        );
        for state in 0..tree.final_states() {
            let row: Vec<String> = (0..tree.nperiods())
                .map(|p| format!("{:9.6}", d.get(state, p, severity)))
                .collect();
            println!("  state {state:3}: {}", row.join(" "));
        }
        println!();
    }

    let x = vec![cli.mitigation; tree.x_dim()];
    println!(
        "expected damage under uniform mitigation {} (node: damage, d/dx[0]):",
        cli.mitigation
    );
    for node in 0..tree.x_dim() {
        let damage = engine.damage_function(&x, node);
        let deriv = engine.d_damage_by_state(&x, node, 0);
        println!("  node {node:3}: {damage:9.6}  {deriv:+9.6}");
    }
}
