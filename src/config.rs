use anyhow::{Result, anyhow, bail};

pub const DEFAULT_THREAD_COUNT: usize = 2;
pub const DEFAULT_INCREMENTS_PER_THREAD: u64 = 100;

/// 起動するワーカースレッド数と、各スレッドがインクリメントする回数
///
/// どちらを増やしても競合が起こる「機会」が増えるだけで、失われる更新の数が決まるわけではない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub thread_count: usize,
    pub increments_per_thread: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_count: DEFAULT_THREAD_COUNT,
            increments_per_thread: DEFAULT_INCREMENTS_PER_THREAD,
        }
    }
}

impl Config {
    pub fn new(thread_count: usize, increments_per_thread: u64) -> Result<Self> {
        if thread_count == 0 {
            bail!("thread count must be at least 1");
        }
        if increments_per_thread == 0 {
            bail!("increments per thread must be at least 1");
        }
        let config = Self {
            thread_count,
            increments_per_thread,
        };
        config.checked_max_value().ok_or_else(|| {
            anyhow!("{thread_count} threads x {increments_per_thread} increments overflows u64")
        })?;
        Ok(config)
    }

    /// 更新が1つも失われなかった場合の最終値
    pub fn max_value(&self) -> u64 {
        self.checked_max_value().unwrap_or(u64::MAX)
    }

    fn checked_max_value(&self) -> Option<u64> {
        u64::try_from(self.thread_count)
            .ok()?
            .checked_mul(self.increments_per_thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_two_threads_with_100_increments() {
        let config = Config::default();
        assert_eq!(config.thread_count, 2);
        assert_eq!(config.increments_per_thread, 100);
        assert_eq!(config.max_value(), 200);
    }

    #[test]
    fn rejects_zero() {
        assert!(Config::new(0, 100).is_err());
        assert!(Config::new(2, 0).is_err());
    }

    #[test]
    fn rejects_overflowing_max_value() {
        let err = Config::new(2, u64::MAX).unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn accepts_valid_values() {
        let config = Config::new(8, 1_000).unwrap();
        assert_eq!(config.max_value(), 8_000);
    }
}
