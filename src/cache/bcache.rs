//! 哈希分桶的块缓存
//!
//! 对应内核的 `bcache` 以及 `binit`/`bget`/`bread`/`bwrite`/`brelse`/`bpin`/`bunpin`
//!
//! # 查找与驱逐
//!
//! ```text
//! read(dev, blockno)
//!   │ hash → 目标桶
//!   ├─ 锁目标桶，找到 → refcnt++，放桶锁 ─────────────┐
//!   │                                                │
//!   └─ 未找到 → 锁驱逐锁                             │
//!        ├─ 重查目标桶（两次加锁之间可能已被绑定）    │
//!        └─ 按槽位顺序扫描缓冲池：                    │
//!             逐个锁住候选者当前所在的桶，            │
//!             第一个 refcnt == 0 的就是受害者：       │
//!             重新绑定、清 VALID、挪到目标桶          │
//!                                                    ▼
//!                                         睡在缓冲区的睡眠锁上
//! ```
//!
//! # 锁顺序
//!
//! - 驱逐锁 → 桶锁；任何时刻最多持有一把桶锁
//! - 阻塞在睡眠锁上之前，桶锁和驱逐锁都已释放
//! - 睡眠锁可以跨磁盘 I/O 持有，它只保护一个缓冲区的内容

use super::buffer::{Buf, BufferId};
use super::chain::{hash, Chains};
use super::guard::BufGuard;
use crate::block::BlockDevice;
use crate::consts::{BSIZE, NBUCKET, NBUF};
use crate::error::{Error, ErrorKind, Result};
use crate::hal::KernelHal;
use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// 块缓存配置
#[derive(Debug, Clone, Copy)]
pub struct BcacheConfig {
    /// 缓冲池大小（块数）
    pub nbuf: usize,
    /// 哈希桶数量
    pub nbucket: usize,
}

impl Default for BcacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nbucket: NBUCKET,
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BcacheStats {
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 驱逐已绑定缓冲区的次数
    pub evictions: u64,
    /// 设备读次数
    pub device_reads: u64,
    /// 设备写次数
    pub device_writes: u64,
}

impl BcacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    device_reads: AtomicU64,
    device_writes: AtomicU64,
}

/// 块缓存
///
/// 固定容量：所有缓冲区在 [`Bcache::new`] 时一次性分配，之后只会被重新绑定。
/// 一个内核只创建一个实例，以引用的方式传给文件系统层。
///
/// # 示例
///
/// ```rust,ignore
/// let bcache: Bcache<VirtioDisk, RiscvHal> = Bcache::new(disk, BcacheConfig::default())?;
///
/// let mut buf = bcache.read(ROOTDEV, 1)?;
/// buf.data_mut()[0] = 42;
/// bcache.write(&buf)?;
/// bcache.release(buf);
/// ```
pub struct Bcache<D, H> {
    device: D,
    bufs: Box<[Buf<H>]>,
    chains: Chains,
    /// 串行化未命中路径；持有期间只有本线程会重新绑定缓冲区
    evict_lock: spin::Mutex<()>,
    counters: Counters,
}

impl<D: BlockDevice, H: KernelHal> Bcache<D, H> {
    /// 创建块缓存
    ///
    /// 对应 `binit`。缓冲区初始都未绑定，按槽位号轮流挂到各个桶上。
    ///
    /// # 错误
    ///
    /// - `nbuf` 或 `nbucket` 为零
    /// - 设备块大小不等于 [`BSIZE`]
    pub fn new(device: D, config: BcacheConfig) -> Result<Self> {
        if config.nbuf == 0 || config.nbucket == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer cache needs at least one buffer and one bucket"));
        }
        if device.block_size() != BSIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "device block size must equal the page size"));
        }

        let chains = Chains::new(config.nbuf, config.nbucket);
        let bufs: Box<[Buf<H>]> = (0..config.nbuf).map(|id| Buf::new(id % config.nbucket)).collect();
        for (id, buf) in bufs.iter().enumerate() {
            let chain = chains.lock(buf.bucket());
            chains.insert(&chain, id);
        }

        log::debug!("[BCACHE] init nbuf={} nbucket={}", config.nbuf, config.nbucket);

        Ok(Self {
            device,
            bufs,
            chains,
            evict_lock: spin::Mutex::new(()),
            counters: Counters::default(),
        })
    }

    /// 读取块，返回上锁且内容有效的缓冲区
    ///
    /// 对应 `bread`。未命中时绑定一个空闲缓冲区并同步从设备读入。
    ///
    /// # 错误
    ///
    /// - [`ErrorKind::NoSpace`]：未命中且所有缓冲区都被引用
    /// - 设备读失败时原样返回设备的错误；缓冲区保持无效，下次读取会重试
    pub fn read(&self, dev: u32, blockno: u32) -> Result<BufGuard<'_, D, H>> {
        let mut buf = self.get(dev, blockno)?;
        if !buf.is_valid() {
            self.counters.device_reads.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = self.device.read_block(dev, blockno, buf.data_mut()) {
                log::error!("[BCACHE] read dev={} block={} failed: {}", dev, blockno, err);
                return Err(err);
            }
            buf.mark_valid();
        }
        Ok(buf)
    }

    /// 把缓冲区内容写回设备
    ///
    /// 对应 `bwrite`。只能传入本缓存 [`read`](Self::read) 返回的守卫，
    /// 因此"未持锁就写回"在类型上无法表达：
    ///
    /// ```compile_fail
    /// use kmem_bcache::{Bcache, BlockDevice, BufferId, KernelHal};
    ///
    /// fn write_without_read<D: BlockDevice, H: KernelHal>(cache: &Bcache<D, H>, id: BufferId) {
    ///     cache.write(id).unwrap();
    /// }
    /// ```
    ///
    /// # Panics
    ///
    /// 守卫来自另一个缓存实例。
    pub fn write(&self, buf: &BufGuard<'_, D, H>) -> Result<()> {
        self.check_holder(buf, "bwrite");
        self.counters.device_writes.fetch_add(1, Ordering::Relaxed);
        log::trace!("[BCACHE] write dev={} block={}", buf.dev(), buf.blockno());
        self.device
            .write_block(buf.dev(), buf.blockno(), buf.data())
            .inspect_err(|err| {
                log::error!("[BCACHE] write dev={} block={} failed: {}", buf.dev(), buf.blockno(), err);
            })
    }

    /// 归还缓冲区
    ///
    /// 对应 `brelse`：释放睡眠锁，再递减引用计数。引用计数归零后缓冲区可以被驱逐。
    ///
    /// # Panics
    ///
    /// 守卫来自另一个缓存实例。
    pub fn release(&self, buf: BufGuard<'_, D, H>) {
        self.check_holder(&buf, "brelse");
        drop(buf);
    }

    /// 固定缓冲区，使其在归还后仍不会被驱逐
    ///
    /// 对应 `bpin`，供日志提交等需要跨越多次 `read`/`release` 保持块驻留的场景使用。
    pub fn pin(&self, buf: &BufGuard<'_, D, H>) {
        self.check_holder(buf, "bpin");
        let id = buf.id();
        let target = &self.bufs[id];
        let chain = self.chains.lock(target.bucket());
        target.pin(&chain, id);
        log::trace!("[BCACHE] pin buffer {} refcnt={} pins={}", id, target.refcnt(), target.pins());
    }

    /// 解除一次 [`pin`](Self::pin)
    ///
    /// 对应 `bunpin`，不需要持有缓冲区的锁。
    ///
    /// # Panics
    ///
    /// `id` 越界或该缓冲区没有未解除的 pin。
    pub fn unpin(&self, id: BufferId) {
        if id >= self.bufs.len() {
            panic!("bunpin: invalid buffer id {id}");
        }
        let target = &self.bufs[id];
        let chain = self.chains.lock(target.bucket());
        target.unpin(&chain, id);
        log::trace!("[BCACHE] unpin buffer {} refcnt={} pins={}", id, target.refcnt(), target.pins());
    }

    /// 刷新设备写缓存
    pub fn sync(&self) -> Result<()> {
        self.device.flush()
    }

    /// 缓冲池容量
    pub fn capacity(&self) -> usize {
        self.bufs.len()
    }

    /// 哈希桶数量
    pub fn nbucket(&self) -> usize {
        self.chains.nbucket()
    }

    /// 底层设备
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> BcacheStats {
        BcacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            device_reads: self.counters.device_reads.load(Ordering::Relaxed),
            device_writes: self.counters.device_writes.load(Ordering::Relaxed),
        }
    }

    /// 找到或绑定 `(dev, blockno)` 的缓冲区并上锁
    ///
    /// 对应 `bget`。
    fn get(&self, dev: u32, blockno: u32) -> Result<BufGuard<'_, D, H>> {
        let target = hash(dev, blockno, self.chains.nbucket());

        if let Some(id) = self.lookup(target, dev, blockno) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("[BCACHE] hit dev={} block={} buffer={}", dev, blockno, id);
            return Ok(self.lock_buf(id));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let evict = self.evict_lock.lock();

        // 只有持驱逐锁的线程会绑定新键，重查之后目标桶的内容就是最终结果
        if let Some(id) = self.lookup(target, dev, blockno) {
            drop(evict);
            log::trace!("[BCACHE] late bind dev={} block={} buffer={}", dev, blockno, id);
            return Ok(self.lock_buf(id));
        }

        let claimed = self.claim_victim(target, dev, blockno);
        drop(evict);

        match claimed {
            Some(id) => Ok(self.lock_buf(id)),
            None => {
                log::warn!("[BCACHE] no buffers: all {} buffers are referenced", self.bufs.len());
                Err(Error::new(ErrorKind::NoSpace, "all buffers are referenced, cannot evict"))
            }
        }
    }

    /// 在桶 `bucket` 中查找，找到则递增引用计数
    ///
    /// 返回时桶锁已释放。
    fn lookup(&self, bucket: usize, dev: u32, blockno: u32) -> Option<BufferId> {
        let chain = self.chains.lock(bucket);
        let id = self.chains.iter(&chain).find(|&id| self.bufs[id].matches(dev, blockno))?;
        self.bufs[id].acquire(&chain);
        Some(id)
    }

    /// 按槽位顺序选择第一个引用计数为零的缓冲区，绑定到新键并挪到目标桶
    ///
    /// 调用者持有驱逐锁，因此缓冲区的 `bucket` 字段在扫描期间不会变化。
    fn claim_victim(&self, target: usize, dev: u32, blockno: u32) -> Option<BufferId> {
        for (id, buf) in self.bufs.iter().enumerate() {
            let home = buf.bucket();
            let chain = self.chains.lock(home);
            if buf.refcnt() != 0 {
                continue;
            }

            let old = buf.key();
            buf.rebind(&chain, dev, blockno);
            if home != target {
                self.chains.remove(&chain, id);
                drop(chain);
                let chain = self.chains.lock(target);
                self.chains.insert(&chain, id);
                buf.set_bucket(&chain);
            }

            match old {
                Some((old_dev, old_blockno)) => {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    log::debug!(
                        "[BCACHE] miss dev={} block={}: evicted dev={} block={} from buffer {}",
                        dev,
                        blockno,
                        old_dev,
                        old_blockno,
                        id
                    );
                }
                None => log::debug!("[BCACHE] miss dev={} block={}: bound unused buffer {}", dev, blockno, id),
            }
            return Some(id);
        }
        None
    }

    /// 阻塞直到拿到缓冲区 `id` 的睡眠锁
    ///
    /// 调用者已为其递增了引用计数，因此键在此期间不会变化。
    fn lock_buf(&self, id: BufferId) -> BufGuard<'_, D, H> {
        let buf = &self.bufs[id];
        let data = buf.data.lock();
        BufGuard::new(self, id, buf.held_key(), data)
    }

    /// 守卫归还时递减引用计数
    pub(super) fn put(&self, id: BufferId) {
        let buf = &self.bufs[id];
        let chain = self.chains.lock(buf.bucket());
        buf.release(&chain, id);
        log::trace!("[BCACHE] release buffer {} refcnt={}", id, buf.refcnt());
    }

    pub(super) fn buf(&self, id: BufferId) -> &Buf<H> {
        &self.bufs[id]
    }

    fn check_holder(&self, buf: &BufGuard<'_, D, H>, op: &str) {
        if !core::ptr::eq(buf.cache(), self) {
            panic!("{op}: buffer {} is not held from this cache", buf.id());
        }
        debug_assert!(self.bufs[buf.id()].data.is_locked(), "{op}: buffer {} is not locked", buf.id());
    }
}

impl<D, H> fmt::Debug for Bcache<D, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bcache")
            .field("nbuf", &self.bufs.len())
            .field("nbucket", &self.chains.nbucket())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::buffer::BufFlags;
    use crate::hal::StdHal;
    use crate::test_support::{counter, identity, MemDisk};
    use alloc::vec::Vec;
    use std::sync::Barrier;

    type TestCache = Bcache<MemDisk, StdHal>;

    fn cache(nbuf: usize, nbucket: usize) -> TestCache {
        Bcache::new(MemDisk::new(), BcacheConfig { nbuf, nbucket }).unwrap()
    }

    fn bound_blocks(cache: &TestCache) -> Vec<u32> {
        let mut blocks: Vec<u32> = cache.bufs.iter().filter_map(|b| b.key()).map(|(_, b)| b).collect();
        blocks.sort_unstable();
        blocks
    }

    struct OddBlockDevice;

    impl BlockDevice for OddBlockDevice {
        fn block_size(&self) -> usize {
            512
        }

        fn read_block(&self, _dev: u32, _blockno: u32, _buf: &mut [u8]) -> Result<()> {
            Ok(())
        }

        fn write_block(&self, _dev: u32, _blockno: u32, _buf: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_cache_creation() {
        let cache = cache(8, 3);
        assert_eq!(cache.capacity(), 8);
        assert_eq!(cache.nbucket(), 3);
        assert_eq!(cache.stats(), BcacheStats::default());
        assert!(bound_blocks(&cache).is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let err = Bcache::<MemDisk, StdHal>::new(MemDisk::new(), BcacheConfig { nbuf: 0, nbucket: 1 }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = Bcache::<MemDisk, StdHal>::new(MemDisk::new(), BcacheConfig { nbuf: 1, nbucket: 0 }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = Bcache::<_, StdHal>::new(OddBlockDevice, BcacheConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_miss_loads_from_device() {
        let cache = cache(4, 2);
        let buf = cache.read(1, 10).unwrap();
        assert_eq!(buf.dev(), 1);
        assert_eq!(buf.blockno(), 10);
        assert!(buf.is_valid());
        assert_eq!(identity(buf.data()), (1, 10));
        assert_eq!(buf.data().len(), BSIZE);
        cache.release(buf);

        assert_eq!(cache.device().reads(), 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_read_hit_skips_device() {
        let cache = cache(4, 2);
        let first = cache.read(1, 10).unwrap();
        let id = first.id();
        cache.release(first);

        let second = cache.read(1, 10).unwrap();
        assert_eq!(second.id(), id);
        assert_eq!(identity(second.data()), (1, 10));
        drop(second);

        assert_eq!(cache.device().reads(), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_write_reaches_device() {
        let cache = cache(2, 1);
        let mut buf = cache.read(2, 5).unwrap();
        buf.data_mut()[0] = 0x42;
        cache.write(&buf).unwrap();
        cache.release(buf);

        let on_disk = cache.device().peek(2, 5).unwrap();
        assert_eq!(on_disk[0], 0x42);
        assert_eq!(cache.device().writes(), 1);
        assert_eq!(cache.stats().device_writes, 1);
        cache.sync().unwrap();
    }

    #[test]
    fn test_release_drops_reference() {
        let cache = cache(2, 1);
        let buf = cache.read(1, 1).unwrap();
        let id = buf.id();
        assert_eq!(cache.bufs[id].refcnt(), 1);
        assert!(cache.bufs[id].data.is_locked());

        cache.release(buf);
        assert_eq!(cache.bufs[id].refcnt(), 0);
        assert!(!cache.bufs[id].data.is_locked());
    }

    #[test]
    fn test_end_to_end_eviction() {
        // 所有键都落在同一个桶
        let cache = cache(3, 1);

        let held: Vec<_> = [10, 20, 30].into_iter().map(|b| cache.read(1, b).unwrap()).collect();
        for (buf, blockno) in held.iter().zip([10, 20, 30]) {
            assert_eq!(identity(buf.data()), (1, blockno));
        }
        for buf in held {
            cache.release(buf);
        }
        assert_eq!(cache.device().reads(), 3);
        assert_eq!(bound_blocks(&cache), [10, 20, 30]);

        let buf = cache.read(1, 40).unwrap();
        assert_eq!(identity(buf.data()), (1, 40));
        cache.release(buf);
        assert_eq!(cache.device().reads(), 4);
        assert_eq!(cache.stats().evictions, 1);
        // 按槽位顺序，第一个空闲的缓冲区（块 10）被驱逐
        assert_eq!(bound_blocks(&cache), [20, 30, 40]);

        // 块 10 已不在缓存中，必须重新读盘
        let buf = cache.read(1, 10).unwrap();
        assert_eq!(identity(buf.data()), (1, 10));
        cache.release(buf);
        assert_eq!(cache.device().reads(), 5);
        assert_eq!(bound_blocks(&cache), [10, 30, 40]);
    }

    #[test]
    fn test_sequential_reads_reuse_first_free_slot() {
        let cache = cache(3, 1);
        for blockno in [10, 20, 30] {
            let buf = cache.read(1, blockno).unwrap();
            assert_eq!(buf.id(), 0);
            cache.release(buf);
        }
        assert_eq!(bound_blocks(&cache), [30]);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_eviction_moves_buffer_between_buckets() {
        let cache = cache(1, 13);
        let buf = cache.read(1, 10).unwrap();
        let id = buf.id();
        cache.release(buf);
        assert_eq!(cache.bufs[id].bucket(), hash(1, 10, 13));

        let buf = cache.read(1, 11).unwrap();
        assert_eq!(buf.id(), id);
        cache.release(buf);
        assert_eq!(cache.bufs[id].bucket(), hash(1, 11, 13));

        let old_chain = cache.chains.lock(hash(1, 10, 13));
        assert_eq!(cache.chains.iter(&old_chain).count(), 0);
    }

    #[test]
    fn test_eviction_skips_pinned_buffers() {
        let cache = cache(3, 2);
        let mut pinned = Vec::new();
        for blockno in [1, 2] {
            let buf = cache.read(1, blockno).unwrap();
            cache.pin(&buf);
            pinned.push(buf.id());
            cache.release(buf);
        }
        let buf = cache.read(1, 3).unwrap();
        cache.release(buf);

        // 只有未固定的那个槽位可以被驱逐
        let buf = cache.read(1, 4).unwrap();
        assert!(!pinned.contains(&buf.id()));
        cache.release(buf);

        let resident = bound_blocks(&cache);
        assert!(resident.contains(&1));
        assert!(resident.contains(&2));
        assert!(resident.contains(&4));

        // 固定的块仍在缓存中，读取命中
        let reads = cache.device().reads();
        let buf = cache.read(1, 1).unwrap();
        assert_eq!(cache.device().reads(), reads);
        drop(buf);

        for id in pinned {
            cache.unpin(id);
        }
    }

    #[test]
    fn test_exhaustion_when_all_pinned() {
        let cache = cache(3, 1);
        let mut pinned = Vec::new();
        for blockno in 0..3 {
            let buf = cache.read(1, blockno).unwrap();
            cache.pin(&buf);
            pinned.push(buf.id());
            cache.release(buf);
        }

        let err = cache.read(1, 99).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
        // 失败不改变已缓存的内容
        assert_eq!(bound_blocks(&cache), [0, 1, 2]);

        cache.unpin(pinned[1]);
        let buf = cache.read(1, 99).unwrap();
        assert_eq!(buf.id(), pinned[1]);
        assert_eq!(identity(buf.data()), (1, 99));
    }

    #[test]
    fn test_exhaustion_when_all_held() {
        let cache = cache(2, 1);
        let a = cache.read(1, 1).unwrap();
        let b = cache.read(1, 2).unwrap();
        assert_eq!(cache.read(1, 3).unwrap_err().kind(), ErrorKind::NoSpace);
        drop(a);
        drop(b);
        assert!(cache.read(1, 3).is_ok());
    }

    #[test]
    fn test_device_failure_leaves_buffer_invalid() {
        let cache = cache(2, 1);
        cache.device().set_fail_reads(true);
        let err = cache.read(1, 7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let slot = cache.bufs.iter().find(|b| b.key() == Some((1, 7))).unwrap();
        assert_eq!(slot.refcnt(), 0);
        assert!(!slot.flags().contains(BufFlags::VALID));

        cache.device().set_fail_reads(false);
        let buf = cache.read(1, 7).unwrap();
        assert!(buf.is_valid());
        assert_eq!(identity(buf.data()), (1, 7));
        assert_eq!(cache.device().reads(), 1);
    }

    #[test]
    #[should_panic(expected = "is not pinned")]
    fn test_unpin_without_pin_panics() {
        let cache = cache(2, 1);
        let buf = cache.read(1, 1).unwrap();
        let id = buf.id();
        cache.release(buf);
        cache.unpin(id);
    }

    #[test]
    #[should_panic(expected = "invalid buffer id")]
    fn test_unpin_out_of_range_panics() {
        let cache = cache(2, 1);
        cache.unpin(2);
    }

    #[test]
    #[should_panic(expected = "not held from this cache")]
    fn test_write_with_foreign_buffer_panics() {
        let ours = cache(2, 1);
        let theirs = cache(2, 1);
        let buf = theirs.read(1, 1).unwrap();
        let _ = ours.write(&buf);
    }

    #[test]
    #[should_panic(expected = "not held from this cache")]
    fn test_release_with_foreign_buffer_panics() {
        let ours = cache(2, 1);
        let theirs = cache(2, 1);
        let buf = theirs.read(1, 1).unwrap();
        ours.release(buf);
    }

    #[test]
    fn test_concurrent_reads_share_buffer() {
        const ROUNDS: usize = 100;
        let cache = cache(4, 2);
        let first = cache.read(1, 7).unwrap();
        let id = first.id();
        cache.release(first);

        std::thread::scope(|s| {
            for _ in 0..2 {
                s.spawn(|| {
                    for _ in 0..ROUNDS {
                        let buf = cache.read(1, 7).unwrap();
                        assert_eq!(buf.id(), id);
                        assert_eq!(identity(buf.data()), (1, 7));
                        cache.release(buf);
                    }
                });
            }
        });

        assert_eq!(cache.device().reads(), 1);
        assert_eq!(cache.bufs[id].refcnt(), 0);
    }

    #[test]
    fn test_distinct_keys_get_distinct_buffers() {
        let cache = cache(4, 1);
        let barrier = Barrier::new(2);

        let ids: Vec<BufferId> = std::thread::scope(|s| {
            let handles: Vec<_> = [1u32, 2]
                .into_iter()
                .map(|blockno| {
                    let (cache, barrier) = (&cache, &barrier);
                    s.spawn(move || {
                        let buf = cache.read(1, blockno).unwrap();
                        assert_eq!(identity(buf.data()), (1, blockno));
                        // 两个缓冲区同时被持有
                        barrier.wait();
                        let id = buf.id();
                        barrier.wait();
                        cache.release(buf);
                        id
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_exclusive_access_under_contention() {
        const THREADS: u32 = 4;
        const ROUNDS: u32 = 150;
        const KEYS: u32 = 8;
        // 每个线程最多持有一块，容量足够
        let cache = cache(6, 3);

        std::thread::scope(|s| {
            for t in 0..THREADS {
                let cache = &cache;
                s.spawn(move || {
                    for round in 0..ROUNDS {
                        let blockno = (t * 3 + round) % KEYS;
                        let mut buf = cache.read(1, blockno).unwrap();
                        assert_eq!(identity(buf.data()), (1, blockno));
                        let next = counter(buf.data()) + 1;
                        buf.data_mut()[..4].copy_from_slice(&next.to_le_bytes());
                        cache.write(&buf).unwrap();
                        cache.release(buf);
                    }
                });
            }
        });

        let total: u32 = (0..KEYS)
            .map(|blockno| cache.device().peek(1, blockno).map_or(0, |data| counter(&data)))
            .sum();
        assert_eq!(total, THREADS * ROUNDS);
        assert!(cache.bufs.iter().all(|b| b.refcnt() == 0));
    }

    #[test]
    fn test_pinned_buffer_survives_contention() {
        let cache = cache(4, 2);
        let buf = cache.read(1, 100).unwrap();
        let pinned = buf.id();
        cache.pin(&buf);
        cache.release(buf);

        std::thread::scope(|s| {
            for t in 0..3u32 {
                let cache = &cache;
                s.spawn(move || {
                    for blockno in 0..50 {
                        let buf = cache.read(2, t * 50 + blockno).unwrap();
                        assert_ne!(buf.id(), pinned);
                        cache.release(buf);
                    }
                });
            }
        });

        let buf = cache.read(1, 100).unwrap();
        assert_eq!(buf.id(), pinned);
        cache.release(buf);
        cache.unpin(pinned);
        assert_eq!(cache.bufs[pinned].refcnt(), 0);
    }
}
