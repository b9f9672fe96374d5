//! 同步原语
//!
//! 结构性的短临界区（分区链表、引用计数表、哈希桶）直接使用 `spin::Mutex`。
//! 本模块只补充 `spin` 没有的东西：等待时让出处理器的睡眠锁，
//! 用于可能跨越磁盘 I/O 持有的缓冲区独占锁。

mod sleeplock;

pub use sleeplock::{SleepLock, SleepLockGuard};
