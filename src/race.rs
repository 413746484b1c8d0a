use std::any::Any;
use std::thread::{self, Scope, ScopedJoinHandle};

use anyhow::{Context, Result, anyhow};

use crate::config::Config;
use crate::counter::{AtomicCounter, LockedCounter, RacyCounter, SharedCounter, worker_loop};

/// 共有カウンタの更新方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// 同期しない（更新が失われ得る）
    Racy,
    /// `fetch_add`でインクリメントする
    Atomic,
    /// `Mutex`でロックしてインクリメントする
    Locked,
    /// 各スレッドでローカルに数え、ジョイン後にメインスレッドで合計する
    LocalSum,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Racy,
        Strategy::Atomic,
        Strategy::Locked,
        Strategy::LocalSum,
    ];

    /// 最終値が常に`Config::max_value`と一致するか
    pub fn is_synchronized(self) -> bool {
        !matches!(self, Strategy::Racy)
    }
}

pub fn run_strategy(config: &Config, strategy: Strategy) -> Result<u64> {
    match strategy {
        Strategy::Racy => run(config, &RacyCounter::new()),
        Strategy::Atomic => run(config, &AtomicCounter::new()),
        Strategy::Locked => run(config, &LockedCounter::new()),
        Strategy::LocalSum => run_local_sum(config),
    }
}

/// `config.thread_count`個のワーカーを起動し、すべてのジョインを待ってからカウンタを1度だけ読み込む。
pub fn run<C: SharedCounter>(config: &Config, counter: &C) -> Result<u64> {
    let increments = config.increments_per_thread;
    spawn_and_join(config, |_| worker_loop(counter, increments))?;
    // すべてのスレッドをジョインしたため、ワーカーの書き込みはすべてこのスレッドから見える。
    Ok(counter.value())
}

fn run_local_sum(config: &Config) -> Result<u64> {
    let increments = config.increments_per_thread;
    let partial_sums = spawn_and_join(config, |_| {
        let mut local = 0u64;
        for _ in 0..increments {
            local += 1;
        }
        local
    })?;
    Ok(partial_sums.into_iter().sum())
}

/// ワーカーを起動してすべてジョインし、各ワーカーの戻り値をインデックス順に返す。
///
/// 起動に失敗した場合も、それまでに起動したワーカーはジョインしてからエラーを返す。
fn spawn_and_join<T, F>(config: &Config, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let work = &work;
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(config.thread_count);
        let mut spawn_error = None;
        for index in 0..config.thread_count {
            match spawn_worker(s, index, work) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut join_error = None;
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(value) => results.push(value),
                Err(payload) => {
                    join_error.get_or_insert_with(|| {
                        anyhow!("worker-{index} panicked: {}", panic_message(&*payload))
                    });
                }
            }
        }

        if let Some(e) = spawn_error.or(join_error) {
            return Err(e);
        }
        Ok(results)
    })
}

fn spawn_worker<'scope, T, F>(
    s: &'scope Scope<'scope, '_>,
    index: usize,
    work: &'scope F,
) -> Result<ScopedJoinHandle<'scope, T>>
where
    T: Send + 'scope,
    F: Fn(usize) -> T + Sync,
{
    thread::Builder::new()
        .name(format!("worker-{index}"))
        .spawn_scoped(s, move || work(index))
        .with_context(|| format!("failed to spawn worker-{index}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
