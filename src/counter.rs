use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicU64, Ordering::Relaxed},
};

/// ワーカースレッド間で共有されるカウンタ
pub trait SharedCounter: Sync {
    fn increment(&self);
    fn value(&self) -> u64;
}

/// 同期せずにインクリメントするカウンタ
///
/// ロードとストアはそれぞれアトミックだが、読み込みから書き込みまでの間に
/// 他のスレッドのストアが割り込めるため、その更新は上書きされて失われる。
#[derive(Debug, Default)]
pub struct RacyCounter {
    value: AtomicU64,
}

impl RacyCounter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
}

impl SharedCounter for RacyCounter {
    fn increment(&self) {
        let old = self.value.load(Relaxed);
        // ここで他のスレッドが同じ`old`を読み込んでいれば、どちらか一方の更新が失われる。
        self.value.store(old + 1, Relaxed);
    }

    fn value(&self) -> u64 {
        self.value.load(Relaxed)
    }
}

/// `fetch_add`で読み込みと書き込みを1つの操作として行うカウンタ
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
}

impl SharedCounter for AtomicCounter {
    fn increment(&self) {
        self.value.fetch_add(1, Relaxed);
    }

    fn value(&self) -> u64 {
        self.value.load(Relaxed)
    }
}

/// インクリメントの間ロックを保持するカウンタ
pub struct LockedCounter {
    value: Mutex<u64>,
}

impl LockedCounter {
    pub const fn new() -> Self {
        Self {
            value: Mutex::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        // 他のワーカーがパニックしてもカウンタの値自体は壊れていないため、ポイズンは無視する。
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LockedCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedCounter for LockedCounter {
    fn increment(&self) {
        *self.lock() += 1;
    }

    fn value(&self) -> u64 {
        *self.lock()
    }
}

/// ワーカースレッドの本体
pub fn worker_loop<C: SharedCounter + ?Sized>(counter: &C, increments: u64) {
    for _ in 0..increments {
        counter.increment();
    }
}
