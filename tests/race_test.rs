use proptest::prelude::*;
use shared_counter_race::{
    Config, LockedCounter, RacyCounter, SharedCounter, Strategy as UpdateStrategy, run,
    run_strategy,
};

#[test]
fn default_racy_run_is_bounded_by_200() {
    // 実行ごとに値が変わり得るため、200との一致は検査しない。
    for _ in 0..20 {
        let value = run_strategy(&Config::default(), UpdateStrategy::Racy).unwrap();
        assert!((1..=200).contains(&value), "value: {value}");
    }
}

#[test]
fn default_synchronized_runs_are_exactly_200() {
    for _ in 0..20 {
        assert_eq!(run_strategy(&Config::default(), UpdateStrategy::Atomic).unwrap(), 200);
        assert_eq!(run_strategy(&Config::default(), UpdateStrategy::Locked).unwrap(), 200);
        assert_eq!(run_strategy(&Config::default(), UpdateStrategy::LocalSum).unwrap(), 200);
    }
}

#[test]
fn run_reads_the_handle_it_was_given() {
    let config = Config::new(2, 50).unwrap();
    let counter = LockedCounter::new();
    assert_eq!(run(&config, &counter).unwrap(), 100);
    // 同じカウンタで再度実行すると、前回の値から積み上がる。
    assert_eq!(run(&config, &counter).unwrap(), 200);
    assert_eq!(counter.value(), 200);
}

#[test]
fn racy_strategy_is_not_synchronized() {
    assert!(!UpdateStrategy::Racy.is_synchronized());
}

#[test]
fn racy_run_loses_updates_under_contention() {
    let config = Config::new(4, 100_000).unwrap();
    let min = (0..20)
        .map(|_| run_strategy(&config, UpdateStrategy::Racy).unwrap())
        .min()
        .unwrap();
    assert!(
        min < config.max_value(),
        "min over 20 runs: {min} / {}",
        config.max_value()
    );
}

#[test]
fn heavy_racy_run_never_exceeds_max() {
    let config = Config::new(8, 100_000).unwrap();
    let counter = RacyCounter::new();
    let value = run(&config, &counter).unwrap();
    assert!(value >= 1 && value <= config.max_value(), "value: {value}");
}

fn synchronized_strategies() -> Vec<UpdateStrategy> {
    UpdateStrategy::ALL
        .into_iter()
        .filter(|s| s.is_synchronized())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// 同期していないカウンタの最終値は、1以上かつ更新が失われなかった場合の値以下である。
    #[test]
    fn prop_racy_value_is_bounded(threads in 1usize..=4, increments in 1u64..=2_000) {
        let config = Config::new(threads, increments).unwrap();
        let value = run_strategy(&config, UpdateStrategy::Racy).unwrap();
        prop_assert!(value >= 1);
        prop_assert!(value <= config.max_value());
    }

    /// 同期したカウンタは更新を失わない。
    #[test]
    fn prop_synchronized_value_is_exact(
        threads in 1usize..=4,
        increments in 1u64..=2_000,
        strategy in prop::sample::select(synchronized_strategies()),
    ) {
        let config = Config::new(threads, increments).unwrap();
        prop_assert_eq!(run_strategy(&config, strategy).unwrap(), config.max_value());
    }

    /// 1スレッドだけなら同期しなくても更新は失われない。
    #[test]
    fn prop_single_worker_loses_nothing(increments in 1u64..=10_000) {
        let config = Config::new(1, increments).unwrap();
        prop_assert_eq!(run_strategy(&config, UpdateStrategy::Racy).unwrap(), increments);
    }
}
