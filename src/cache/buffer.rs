//! 缓冲区结构
//!
//! 对应内核的 `struct buf`

use super::chain::ChainGuard;
use crate::consts::BSIZE;
use crate::hal::KernelHal;
use crate::sync::SleepLock;
use alloc::boxed::Box;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

/// 缓冲区 ID：在固定缓冲池中的槽位号
pub type BufferId = usize;

/// 一块的数据
pub(super) type BlockData = Box<[u8; BSIZE]>;

bitflags! {
    /// 缓冲区状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u8 {
        /// 内容已从磁盘读入（有效）
        const VALID = 0x01;
        /// 已绑定到某个 `(dev, blockno)`
        const BOUND = 0x02;
    }
}

/// 缓冲池中的一个槽位
///
/// # 字段的保护
///
/// - `dev`/`blockno`/`refcnt`/`pins`：只在持有缓冲区所在桶的锁时修改，
///   修改方法都要求传入该桶的 [`ChainGuard`]
/// - `bucket`：只由驱逐者在持有驱逐锁和目标桶锁时修改；
///   引用计数非零期间不会变化
/// - `flags`：`VALID` 由持有睡眠锁的读者置位，由驱逐者在引用计数为零时清除
/// - `data`：只由持有睡眠锁的线程访问
///
/// 字段用原子类型只是为了能在 `&self` 下修改，排序由上面的锁保证。
pub(super) struct Buf<H> {
    dev: AtomicU32,
    blockno: AtomicU32,
    refcnt: AtomicU32,
    pins: AtomicU32,
    flags: AtomicU8,
    bucket: AtomicUsize,
    pub(super) data: SleepLock<BlockData, H>,
}

impl<H: KernelHal> Buf<H> {
    /// 创建未绑定的缓冲区，挂在 `bucket` 上
    pub(super) fn new(bucket: usize) -> Self {
        Self {
            dev: AtomicU32::new(0),
            blockno: AtomicU32::new(0),
            refcnt: AtomicU32::new(0),
            pins: AtomicU32::new(0),
            flags: AtomicU8::new(BufFlags::empty().bits()),
            bucket: AtomicUsize::new(bucket),
            data: SleepLock::new("buffer", Box::new([0u8; BSIZE])),
        }
    }
}

impl<H> Buf<H> {
    pub(super) fn flags(&self) -> BufFlags {
        BufFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(super) fn is_valid(&self) -> bool {
        self.flags().contains(BufFlags::VALID)
    }

    /// 调用者持有睡眠锁
    pub(super) fn mark_valid(&self) {
        self.flags.fetch_or(BufFlags::VALID.bits(), Ordering::Release);
    }

    /// 是否绑定到 `(dev, blockno)`
    pub(super) fn matches(&self, dev: u32, blockno: u32) -> bool {
        self.flags().contains(BufFlags::BOUND)
            && self.dev.load(Ordering::Relaxed) == dev
            && self.blockno.load(Ordering::Relaxed) == blockno
    }

    /// 当前绑定的键
    pub(super) fn key(&self) -> Option<(u32, u32)> {
        self.flags().contains(BufFlags::BOUND).then(|| {
            (
                self.dev.load(Ordering::Relaxed),
                self.blockno.load(Ordering::Relaxed),
            )
        })
    }

    pub(super) fn refcnt(&self) -> u32 {
        self.refcnt.load(Ordering::Relaxed)
    }

    pub(super) fn pins(&self) -> u32 {
        self.pins.load(Ordering::Relaxed)
    }

    pub(super) fn bucket(&self) -> usize {
        self.bucket.load(Ordering::Relaxed)
    }

    pub(super) fn set_bucket(&self, chain: &ChainGuard<'_>) {
        self.bucket.store(chain.bucket(), Ordering::Relaxed);
    }

    /// 多一个持有者
    pub(super) fn acquire(&self, _chain: &ChainGuard<'_>) {
        self.refcnt.fetch_add(1, Ordering::Relaxed);
    }

    /// 少一个持有者
    pub(super) fn release(&self, _chain: &ChainGuard<'_>, id: BufferId) {
        let count = self.refcnt.load(Ordering::Relaxed);
        if count == 0 {
            panic!("brelse: buffer {id} has no references");
        }
        self.refcnt.store(count - 1, Ordering::Relaxed);
    }

    pub(super) fn pin(&self, _chain: &ChainGuard<'_>, id: BufferId) {
        if self.refcnt.load(Ordering::Relaxed) == 0 {
            panic!("bpin: buffer {id} is not referenced");
        }
        self.pins.fetch_add(1, Ordering::Relaxed);
        self.refcnt.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn unpin(&self, _chain: &ChainGuard<'_>, id: BufferId) {
        let pins = self.pins.load(Ordering::Relaxed);
        if pins == 0 {
            panic!("bunpin: buffer {id} is not pinned");
        }
        self.pins.store(pins - 1, Ordering::Relaxed);
        self.refcnt.fetch_sub(1, Ordering::Relaxed);
    }

    /// 作为驱逐的受害者绑定到新键
    ///
    /// 调用者持有缓冲区当前所在桶的锁，且已确认引用计数为零。
    /// 清除 `VALID`，下次访问会重新从磁盘读取。
    pub(super) fn rebind(&self, _chain: &ChainGuard<'_>, dev: u32, blockno: u32) {
        debug_assert_eq!(self.refcnt(), 0, "rebinding a referenced buffer");
        self.dev.store(dev, Ordering::Relaxed);
        self.blockno.store(blockno, Ordering::Relaxed);
        self.refcnt.store(1, Ordering::Relaxed);
        self.flags.store(BufFlags::BOUND.bits(), Ordering::Release);
    }

    /// 持有引用时读取键（此时键不会变化）
    pub(super) fn held_key(&self) -> (u32, u32) {
        (
            self.dev.load(Ordering::Relaxed),
            self.blockno.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::chain::Chains;
    use crate::hal::StdHal;

    #[test]
    fn test_buffer_creation() {
        let buf: Buf<StdHal> = Buf::new(3);
        assert_eq!(buf.bucket(), 3);
        assert_eq!(buf.refcnt(), 0);
        assert_eq!(buf.pins(), 0);
        assert_eq!(buf.flags(), BufFlags::empty());
        assert_eq!(buf.key(), None);
        assert!(!buf.matches(0, 0));
    }

    #[test]
    fn test_rebind_clears_valid() {
        let chains = Chains::new(1, 1);
        let chain = chains.lock(0);
        let buf: Buf<StdHal> = Buf::new(0);

        buf.rebind(&chain, 1, 10);
        buf.mark_valid();
        assert!(buf.is_valid());
        assert_eq!(buf.key(), Some((1, 10)));
        assert!(buf.matches(1, 10));
        assert_eq!(buf.refcnt(), 1);

        buf.release(&chain, 0);
        buf.rebind(&chain, 1, 20);
        assert!(!buf.is_valid());
        assert!(!buf.matches(1, 10));
        assert_eq!(buf.held_key(), (1, 20));
    }

    #[test]
    fn test_pin_counts_as_reference() {
        let chains = Chains::new(1, 1);
        let chain = chains.lock(0);
        let buf: Buf<StdHal> = Buf::new(0);

        buf.rebind(&chain, 1, 1);
        buf.pin(&chain, 0);
        assert_eq!(buf.refcnt(), 2);
        assert_eq!(buf.pins(), 1);

        buf.release(&chain, 0);
        assert_eq!(buf.refcnt(), 1);
        buf.unpin(&chain, 0);
        assert_eq!(buf.refcnt(), 0);
        assert_eq!(buf.pins(), 0);
    }

    #[test]
    #[should_panic(expected = "is not pinned")]
    fn test_unpin_without_pin_panics() {
        let chains = Chains::new(1, 1);
        let chain = chains.lock(0);
        let buf: Buf<StdHal> = Buf::new(0);
        buf.rebind(&chain, 1, 1);
        buf.unpin(&chain, 0);
    }

    #[test]
    #[should_panic(expected = "is not referenced")]
    fn test_pin_unreferenced_panics() {
        let chains = Chains::new(1, 1);
        let chain = chains.lock(0);
        let buf: Buf<StdHal> = Buf::new(0);
        buf.pin(&chain, 0);
    }
}
