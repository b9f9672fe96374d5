//! 缓冲区守卫 - RAII 风格的独占借用
//!
//! 对应内核里 `bread` 返回、`brelse` 归还的那个上锁的 `struct buf *`

use super::bcache::Bcache;
use super::buffer::{BlockData, BufferId};
use crate::block::BlockDevice;
use crate::hal::KernelHal;
use crate::sync::SleepLockGuard;
use core::fmt;
use core::marker::PhantomData;

/// 上锁的缓冲区
///
/// 由 [`Bcache::read`] 返回，持有期间：
/// - 缓冲区的睡眠锁被本守卫占有，可以读写数据；
/// - 缓冲区的引用计数包含本守卫，不会被驱逐。
///
/// 通过 [`Bcache::release`] 或直接 drop 归还：先释放睡眠锁，再递减引用计数。
///
/// 守卫不能跨线程传递（`!Send`），与内核中"不要跨进程持有缓冲区"的约定一致。
pub struct BufGuard<'a, D: BlockDevice, H: KernelHal> {
    cache: &'a Bcache<D, H>,
    id: BufferId,
    dev: u32,
    blockno: u32,
    data: Option<SleepLockGuard<'a, BlockData>>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, D: BlockDevice, H: KernelHal> BufGuard<'a, D, H> {
    pub(super) fn new(
        cache: &'a Bcache<D, H>,
        id: BufferId,
        (dev, blockno): (u32, u32),
        data: SleepLockGuard<'a, BlockData>,
    ) -> Self {
        Self {
            cache,
            id,
            dev,
            blockno,
            data: Some(data),
            _not_send: PhantomData,
        }
    }

    /// 缓冲池槽位号，用于 [`Bcache::unpin`]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// 设备号
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// 块号
    pub fn blockno(&self) -> u32 {
        self.blockno
    }

    /// 内容是否已从磁盘读入
    pub fn is_valid(&self) -> bool {
        self.cache.buf(self.id).is_valid()
    }

    /// 块数据
    pub fn data(&self) -> &[u8] {
        &self.block()[..]
    }

    /// 可写的块数据
    ///
    /// 修改后需要 [`Bcache::write`] 才会落盘。
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.data {
            Some(data) => &mut data[..],
            None => unreachable!("buffer guard used after release"),
        }
    }

    pub(super) fn cache(&self) -> &'a Bcache<D, H> {
        self.cache
    }

    pub(super) fn mark_valid(&self) {
        self.cache.buf(self.id).mark_valid();
    }

    fn block(&self) -> &BlockData {
        match &self.data {
            Some(data) => &**data,
            None => unreachable!("buffer guard used after release"),
        }
    }
}

impl<D: BlockDevice, H: KernelHal> Drop for BufGuard<'_, D, H> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            drop(data);
            self.cache.put(self.id);
        }
    }
}

impl<D: BlockDevice, H: KernelHal> fmt::Debug for BufGuard<'_, D, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufGuard")
            .field("id", &self.id)
            .field("dev", &self.dev)
            .field("blockno", &self.blockno)
            .field("valid", &self.is_valid())
            .finish()
    }
}
