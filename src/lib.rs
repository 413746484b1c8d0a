//! 同期されていない共有カウンタを複数スレッドから同時にインクリメントし、
//! 更新が失われる（lost update）様子を示す。
//!
//! 比較のために、同期されたカウンタ（アトミック、Mutex、スレッドローカル集計）も提供する。
//! また、ThreadSanitizerのデータ競合レポートを解析し、競合箇所を根とするコールグラフを作る。

pub mod config;
pub mod counter;
pub mod race;
pub mod tsan;

pub use config::{Config, DEFAULT_INCREMENTS_PER_THREAD, DEFAULT_THREAD_COUNT};
pub use counter::{AtomicCounter, LockedCounter, RacyCounter, SharedCounter, worker_loop};
pub use race::{Strategy, run, run_strategy};
pub use tsan::{RaceGraph, RaceReport};
