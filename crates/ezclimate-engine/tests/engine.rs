//! End-to-end engine tests: simulate, cache, reload, evaluate.

use std::path::PathBuf;

use ezclimate_engine::{DamageConfig, DamageEngine, Error, ScenarioTree, TreeParameters};

fn test_tree() -> ScenarioTree {
    ScenarioTree::balanced(TreeParameters {
        nperiods: 3,
        decision_times: vec![0.0, 15.0, 45.0, 85.0],
        ..TreeParameters::default()
    })
    .unwrap()
}

fn test_config(name: &str) -> DamageConfig {
    DamageConfig {
        draws: 1000,
        over: 5,
        loops: 1,
        monte_loops: 1,
        seed: 4242,
        cache_path: cache_path(name),
        ..DamageConfig::default()
    }
}

fn cache_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ezc_engine_{name}_{}.ezc", std::process::id()))
}

#[test]
fn identical_seeds_yield_identical_engines() {
    let a = DamageEngine::new(test_config("determinism_a"), test_tree()).unwrap();
    let b = DamageEngine::new(test_config("determinism_b"), test_tree()).unwrap();
    assert_eq!(a.damage_matrix(), b.damage_matrix());
    assert_eq!(a.interpolation(), b.interpolation());
    assert_eq!(a.tree().probs(), b.tree().probs());
}

#[test]
fn cache_reload_reproduces_the_run() {
    let name = "reload";
    let simulated = DamageEngine::new(test_config(name), test_tree()).unwrap();

    // Same parameters, force_simul off: must load the cache and land on
    // bit-identical state.
    let reloaded = DamageEngine::new(
        DamageConfig {
            force_simul: false,
            ..test_config(name)
        },
        test_tree(),
    )
    .unwrap();

    assert_eq!(simulated.damage_matrix(), reloaded.damage_matrix());
    assert_eq!(simulated.interpolation(), reloaded.interpolation());

    let x = vec![0.4; simulated.tree().x_dim()];
    for node in 0..simulated.tree().x_dim() + simulated.tree().final_states() {
        assert_eq!(
            simulated.damage_function(&x, node),
            reloaded.damage_function(&x, node)
        );
    }
    std::fs::remove_file(cache_path(name)).ok();
}

#[test]
fn mismatched_cache_is_fatal() {
    let name = "mismatch";
    DamageEngine::new(test_config(name), test_tree()).unwrap();

    // Different draw count: the engine must refuse the cache, naming the
    // offending field, and must not resimulate on its own.
    let result = DamageEngine::new(
        DamageConfig {
            force_simul: false,
            draws: 999,
            ..test_config(name)
        },
        test_tree(),
    );
    match result.err() {
        Some(Error::CacheMismatch(details)) => {
            assert!(details.contains("draws"), "missing field in: {details}")
        }
        Some(other) => panic!("expected CacheMismatch, got {other}"),
        None => panic!("expected CacheMismatch, engine initialized"),
    }
    std::fs::remove_file(cache_path(name)).ok();
}

#[test]
fn missing_cache_is_fatal() {
    let result = DamageEngine::new(
        DamageConfig {
            force_simul: false,
            cache_path: cache_path("never_written"),
            ..test_config("never_written")
        },
        test_tree(),
    );
    assert!(matches!(result, Err(Error::Io { .. })));
}

#[test]
fn recombination_makes_damage_path_independent() {
    let engine = DamageEngine::new(test_config("recombined"), test_tree()).unwrap();
    let d = engine.damage_matrix();
    // 3 periods, 4 leaf states: states 1 (up-down) and 2 (down-up) share a
    // move-order class.
    for period in 0..3 {
        for severity in 0..3 {
            assert_eq!(
                d.get(1, period, severity),
                d.get(2, period, severity),
                "period {period}, severity {severity}"
            );
        }
    }
    engine.tree().check_node_probs().unwrap();
}

#[test]
fn damage_stays_in_unit_range_across_policies() {
    let engine = DamageEngine::new(test_config("range"), test_tree()).unwrap();
    let x_dim = engine.tree().x_dim();
    for policy in [0.0, 0.25, 0.5, 0.75, 1.0, 1.3] {
        let x = vec![policy; x_dim];
        for node in 0..x_dim + engine.tree().final_states() {
            let damage = engine.damage_function(&x, node);
            assert!(damage.is_finite());
            assert!(damage < 1.0, "policy {policy}, node {node}: {damage}");
        }
    }
}
