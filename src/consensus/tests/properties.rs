//! Property tests for the simulation engine

use pbftviz_consensus::{
    Phase, RetentionConfig, RetentionPolicy, SimulationConfig, SimulationEngine, STEP_MS,
};
use proptest::prelude::*;

fn engine(n: usize, seed: u64) -> SimulationEngine {
    SimulationEngine::new(SimulationConfig::for_nodes(n).with_seed(seed)).unwrap()
}

proptest! {
    #[test]
    fn test_clock_sums_deltas(
        deltas in prop::collection::vec(0u64..3000, 1..60),
        manual in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let mut engine = engine(4, seed);
        engine.set_manual_mode(manual);
        engine.set_playing(true);

        let mut expected = 0;
        for delta in deltas {
            engine.step(delta);
            expected += delta;
            prop_assert_eq!(engine.t(), expected);
            prop_assert!(engine.phase_start() <= engine.t());
        }
    }

    #[test]
    fn test_chunking_does_not_change_replay(
        deltas in prop::collection::vec(1u64..500, 1..40),
        n in prop::sample::select(vec![4usize, 7, 10]),
    ) {
        let mut engine = engine(n, 3);
        engine.set_phase(Phase::Prepare);

        engine.step(0);
        for delta in deltas {
            engine.step(delta);
        }
        let horizon = (n as u64 - 1) * STEP_MS;
        if engine.t() < horizon {
            engine.step(horizon - engine.t());
        }

        // Every node broadcasts exactly once to its n-1 peers
        prop_assert_eq!(engine.timeline().len(), n * (n - 1));
        let quorum = engine.quorum().needed();
        prop_assert!(engine.stats().iter().all(|s| s.prepare == n && s.prepare >= quorum));
    }

    #[test]
    fn test_votes_bounded_by_honest_senders(
        faulty in prop::collection::vec(any::<bool>(), 7),
        seed in any::<u64>(),
    ) {
        let mut engine = engine(7, seed);
        for (id, is_faulty) in faulty.iter().enumerate() {
            if *is_faulty {
                engine.toggle_faulty(id).unwrap();
            }
        }
        let honest = faulty.iter().filter(|f| !**f).count();

        for phase in [Phase::Prepare, Phase::Commit] {
            engine.set_phase(phase);
            engine.step(0);
            engine.step(8 * STEP_MS);
            for st in engine.stats() {
                prop_assert!(st.prepare <= honest);
                prop_assert!(st.commit <= honest);
            }
        }
    }

    #[test]
    fn test_value_is_triangular(rounds in 1u64..20) {
        let mut engine = engine(4, 0);
        for _ in 0..rounds * 5 {
            engine.skip_phase();
        }

        prop_assert_eq!(engine.round().round, rounds + 1);
        prop_assert_eq!(engine.round().value, (rounds * (rounds + 1) / 2) as i64);
    }
}

proptest! {
    #[test]
    fn test_retention_bounds_hold(
        max_entries in 1usize..40,
        max_age_ms in 500u64..20_000,
        deltas in prop::collection::vec(0u64..1500, 1..120),
    ) {
        let config = SimulationConfig {
            retention: RetentionConfig {
                timeline: RetentionPolicy::new(max_entries, max_age_ms),
                log: RetentionPolicy::new(max_entries, max_age_ms),
            },
            ..SimulationConfig::default().with_seed(17)
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        engine.set_playing(true);

        for delta in deltas {
            engine.step(delta);
            let now = engine.t();
            prop_assert!(engine.timeline().len() <= max_entries);
            prop_assert!(engine.log().len() <= max_entries);
            prop_assert!(engine.timeline().iter().all(|m| now - m.at() <= max_age_ms));
        }
    }
}
