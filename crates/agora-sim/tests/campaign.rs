use agora_core::{AllocatorConfig, DegradationLevel};
use agora_sim::campaign::{CampaignConfig, replay_seed, run_campaign, run_single_seed};
use agora_sim::oracle::AllocationOracle;
use agora_sim::{SimulationConfig, Simulator};
use proptest::prelude::*;

#[test]
fn default_campaign_holds_every_invariant() {
    let config = CampaignConfig {
        seed_range: 0..20,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign should not error");
    assert_eq!(report.seeds_run, 20);
    assert_eq!(report.seeds_passed, 20, "failures: {:?}", report.failures);
}

#[test]
fn overloaded_campaign_degrades_without_violations() {
    let config = CampaignConfig {
        seed_range: 100..106,
        rounds: 30,
        events_per_round: 24,
        batch_size: 5,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign should not error");
    assert!(report.all_passed(), "failures: {:?}", report.failures);
    assert_eq!(report.interesting_states_reached, 6);
}

#[test]
fn tight_thread_cap_is_never_exceeded() {
    let config = CampaignConfig {
        seed_range: 0..6,
        allocator: AllocatorConfig {
            default_thread_max_agents: 4,
            ..AllocatorConfig::default()
        },
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign should not error");
    assert!(report.all_passed(), "failures: {:?}", report.failures);
}

#[test]
fn critical_backlog_zeroes_post_quotas() {
    let config = SimulationConfig {
        seed: 11,
        rounds: 40,
        events_per_round: 30,
        batch_size: 4,
        ..SimulationConfig::default()
    };
    let result = Simulator::new(config)
        .and_then(|mut sim| sim.run())
        .expect("simulation should not error");
    assert_eq!(result.peak_level, DegradationLevel::Critical);

    // Critical factor 0.1 floors every default base quota to zero.
    assert!(result
        .trace
        .iter()
        .filter(|e| e.result.degradation_level == DegradationLevel::Critical)
        .all(|e| e.result.agents.is_empty()));
    assert!(AllocationOracle::check_all(&result).passed);
}

#[test]
fn redeliveries_are_rejected_at_admission() {
    let config = SimulationConfig {
        seed: 5,
        rounds: 15,
        duplicate_percent: 50,
        ..SimulationConfig::default()
    };
    let result = Simulator::new(config)
        .and_then(|mut sim| sim.run())
        .expect("simulation should not error");
    assert!(result.stats.duplicates_injected > 0);
    assert!(result.stats.rejected_admission > 0);
    assert!(result
        .trace
        .iter()
        .filter_map(|e| e.result.admission_reason())
        .any(|reason| reason == "duplicate idempotency_key"));
}

#[test]
fn chains_stay_within_depth_ceiling() {
    let config = SimulationConfig {
        seed: 9,
        rounds: 60,
        executor_failure_percent: 0,
        ..SimulationConfig::default()
    };
    let result = Simulator::new(config)
        .and_then(|mut sim| sim.run())
        .expect("simulation should not error");
    assert!(result.stats.follow_ups > 0);
    let max_admitted = result
        .trace
        .iter()
        .filter(|e| e.result.admission_reason().is_none())
        .map(|e| e.event.chain_depth)
        .max()
        .unwrap_or(0);
    assert!(max_admitted <= result.allocator.max_chain_depth);
}

#[test]
fn replay_reproduces_the_campaign_run() {
    let config = CampaignConfig {
        seed_range: 3..4,
        rounds: 10,
        ..CampaignConfig::default()
    };
    let first = replay_seed(3, &config).expect("replay should not error");
    let second = replay_seed(3, &config).expect("replay should not error");
    assert_eq!(first.result, second.result);
    assert_eq!(first.oracle, second.oracle);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_seed_passes_the_oracle(seed in any::<u64>()) {
        let config = CampaignConfig {
            rounds: 12,
            ..CampaignConfig::default()
        };
        let outcome = run_single_seed(seed, &config).expect("seed should not error");
        prop_assert!(outcome.verdict.is_ok(), "seed {seed}: {:?}", outcome.verdict);
    }
}
