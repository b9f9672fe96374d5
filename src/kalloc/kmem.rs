//! 分区物理页分配器
//!
//! 对应内核的 `kinit`/`kalloc`/`kfree`/`kreference`/`kdereference`

use super::addr::PhysAddr;
use super::freelist::{FreeList, Links};
use super::refcount::RefTable;
use crate::consts::{ALLOC_FILL, JUNK_FILL, NCPU, PGSIZE};
use crate::error::{Error, ErrorKind, Result};
use crate::hal::KernelHal;
use alloc::boxed::Box;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU64, Ordering};

/// 初始化时如何把页分给各分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Seeding {
    /// 页 `i` 进入分区 `i % ncpu`
    #[default]
    RoundRobin,
    /// 按地址切成 `ncpu` 段连续区间，每个分区一段
    Chunked,
}

/// 分配器配置
#[derive(Debug, Clone, Copy)]
pub struct KmemConfig {
    /// 分区数量（通常等于 CPU 数）
    pub ncpu: usize,
    /// 是否启用引用计数
    pub refcount: bool,
    /// 初始播种方式
    pub seeding: Seeding,
}

impl Default for KmemConfig {
    fn default() -> Self {
        Self {
            ncpu: NCPU,
            refcount: true,
            seeding: Seeding::RoundRobin,
        }
    }
}

/// 分配器统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KmemStats {
    /// 成功分配次数
    pub allocs: u64,
    /// 释放次数
    pub frees: u64,
    /// 从其他分区窃取页的次数
    pub steals: u64,
    /// 分配失败次数
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    allocs: AtomicU64,
    frees: AtomicU64,
    steals: AtomicU64,
    failures: AtomicU64,
}

/// 单个物理页的内容
struct Frame {
    allocated: bool,
    bytes: Box<[u8; PGSIZE]>,
}

/// 已分配页内容的访问守卫
///
/// 持有该页的帧锁；drop 时释放。
pub struct FrameGuard<'a> {
    frame: spin::MutexGuard<'a, Frame>,
}

impl Deref for FrameGuard<'_> {
    type Target = [u8; PGSIZE];

    fn deref(&self) -> &Self::Target {
        &self.frame.bytes
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.frame.bytes
    }
}

/// 物理页分配器
///
/// 管理 `[start, end)` 范围内的所有整页。空闲页按 CPU 分成若干分区，
/// 每个分区一条单链表和一把锁：
///
/// - 分配优先从调用者所在 CPU 的分区取页；
/// - 本分区为空时按分区号顺序扫描其他分区，从第一个非空分区偷一页；
/// - 只有所有分区都为空才返回 [`ErrorKind::OutOfMemory`]。
///
/// 任何时刻最多持有一把分区锁；引用计数表和页内容各自有独立的锁，
/// 三者从不嵌套获取。
///
/// # 示例
///
/// ```rust,ignore
/// let kmem: Kmem<MyHal> = Kmem::new(end_of_kernel, PHYSTOP, KmemConfig::default())?;
///
/// let pa = kmem.alloc()?;
/// kmem.add_ref(pa);          // 写时复制：第二个映射
/// kmem.drop_ref(pa);         // 其中一个映射被拆除
/// kmem.free(pa);             // 最后一个映射被拆除
/// ```
pub struct Kmem<H> {
    start: PhysAddr,
    end: PhysAddr,
    partitions: Box<[spin::Mutex<FreeList>]>,
    links: Links,
    frames: Box<[spin::Mutex<Frame>]>,
    refs: Option<RefTable>,
    counters: Counters,
    _hal: PhantomData<fn() -> H>,
}

impl<H: KernelHal> Kmem<H> {
    /// 初始化分配器
    ///
    /// 对应 `kinit`：把 `[start, end)` 按页切分并播种到各分区。
    /// 起点向上、终点向下对齐到页边界。
    ///
    /// # 错误
    ///
    /// - 范围内没有一个完整的页
    /// - `config.ncpu == 0`
    pub fn new(start: PhysAddr, end: PhysAddr, config: KmemConfig) -> Result<Self> {
        if config.ncpu == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "allocator needs at least one partition"));
        }

        let start = start.page_round_up();
        let end = end.page_round_down();
        if end <= start {
            return Err(Error::new(ErrorKind::InvalidInput, "physical range holds no whole page"));
        }
        let npages = (end.as_usize() - start.as_usize()) / PGSIZE;

        let partitions: Box<[spin::Mutex<FreeList>]> =
            (0..config.ncpu).map(|_| spin::Mutex::new(FreeList::new())).collect();
        let links = Links::new(npages);
        let frames = (0..npages)
            .map(|_| {
                spin::Mutex::new(Frame {
                    allocated: false,
                    bytes: Box::new([JUNK_FILL; PGSIZE]),
                })
            })
            .collect();

        // 每个分区至少一页，避免 Chunked 下除零
        let chunk = npages.div_ceil(config.ncpu).max(1);
        for page in 0..npages {
            let part = match config.seeding {
                Seeding::RoundRobin => page % config.ncpu,
                Seeding::Chunked => page / chunk,
            };
            partitions[part].lock().push(&links, page);
        }

        log::debug!(
            "[KMEM] init range=[{}, {}) pages={} partitions={} refcount={} seeding={:?}",
            start,
            end,
            npages,
            config.ncpu,
            config.refcount,
            config.seeding
        );

        Ok(Self {
            start,
            end,
            partitions,
            links,
            frames,
            refs: config.refcount.then(|| RefTable::new(npages)),
            counters: Counters::default(),
            _hal: PhantomData,
        })
    }

    /// 分配一页
    ///
    /// 对应 `kalloc`。页内容被填充为 [`ALLOC_FILL`]；启用引用计数时计数为 1。
    pub fn alloc(&self) -> Result<PhysAddr> {
        self.alloc_on(H::cpu_id())
    }

    /// 以 `cpu` 的分区为首选分区分配一页
    pub fn alloc_on(&self, cpu: usize) -> Result<PhysAddr> {
        let home = self.partition_of(cpu);

        let popped = self.partitions[home].lock().pop(&self.links);
        let Some(page) = popped.or_else(|| self.steal(home)) else {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            log::warn!("[KMEM] out of memory: all {} partitions are empty", self.partitions.len());
            return Err(Error::new(ErrorKind::OutOfMemory, "no free physical pages"));
        };

        if let Some(refs) = &self.refs {
            refs.init_allocated(page);
        }
        {
            let mut frame = self.frames[page].lock();
            frame.allocated = true;
            frame.bytes.fill(ALLOC_FILL);
        }

        self.counters.allocs.fetch_add(1, Ordering::Relaxed);
        let pa = self.addr_of(page);
        log::trace!("[KMEM] alloc {} on partition {}", pa, home);
        Ok(pa)
    }

    /// 从其他分区偷一页
    ///
    /// 按分区号顺序扫描，每次只持有一把分区锁。
    fn steal(&self, home: usize) -> Option<usize> {
        for victim in (0..self.partitions.len()).filter(|&p| p != home) {
            let page = self.partitions[victim].lock().pop(&self.links);
            if let Some(page) = page {
                self.counters.steals.fetch_add(1, Ordering::Relaxed);
                log::debug!("[KMEM] partition {} stole page {} from partition {}", home, self.addr_of(page), victim);
                return Some(page);
            }
        }
        None
    }

    /// 释放一页
    ///
    /// 对应 `kfree`。释放到调用者所在 CPU 的分区。
    ///
    /// # Panics
    ///
    /// - `pa` 未页对齐或不在受管理范围内
    /// - 启用引用计数时计数不恰好为 1
    /// - 页已经是空闲的
    pub fn free(&self, pa: PhysAddr) {
        self.free_on(pa, H::cpu_id());
    }

    /// 释放一页到 `cpu` 的分区
    pub fn free_on(&self, pa: PhysAddr, cpu: usize) {
        let page = self.page_index(pa, "kfree");

        if let Some(refs) = &self.refs {
            refs.release(page, pa);
        }
        {
            let mut frame = self.frames[page].lock();
            if !frame.allocated {
                panic!("kfree: double free of page {pa}");
            }
            frame.allocated = false;
            frame.bytes.fill(JUNK_FILL);
        }

        let home = self.partition_of(cpu);
        self.partitions[home].lock().push(&self.links, page);
        self.counters.frees.fetch_add(1, Ordering::Relaxed);
        log::trace!("[KMEM] free {} to partition {}", pa, home);
    }

    /// 页 `pa` 多了一个所有者，返回新的计数
    ///
    /// 对应 `kreference`。
    ///
    /// # Panics
    ///
    /// 未启用引用计数、地址非法或页处于空闲状态。
    pub fn add_ref(&self, pa: PhysAddr) -> u16 {
        let page = self.page_index(pa, "kreference");
        let count = self.ref_table("kreference").increment(page, pa);
        log::trace!("[KMEM] reference {} -> {}", pa, count);
        count
    }

    /// 页 `pa` 少了一个所有者，返回新的计数
    ///
    /// 对应 `kdereference`。最后一个所有者必须调用 [`Kmem::free`]。
    pub fn drop_ref(&self, pa: PhysAddr) -> u16 {
        let page = self.page_index(pa, "kdereference");
        let count = self.ref_table("kdereference").decrement(page, pa);
        log::trace!("[KMEM] dereference {} -> {}", pa, count);
        count
    }

    /// 页 `pa` 当前的引用计数
    ///
    /// 对应 `knumreference`；未启用引用计数时返回 `None`。
    pub fn ref_count(&self, pa: PhysAddr) -> Option<u16> {
        let page = self.page_index(pa, "knumreference");
        self.refs.as_ref().map(|refs| refs.get(page))
    }

    /// 访问已分配页的内容
    ///
    /// # Panics
    ///
    /// 地址非法或页处于空闲状态。
    pub fn frame(&self, pa: PhysAddr) -> FrameGuard<'_> {
        let page = self.page_index(pa, "frame");
        let frame = self.frames[page].lock();
        if !frame.allocated {
            panic!("frame: page {pa} is free");
        }
        FrameGuard { frame }
    }

    /// 空闲内存字节数
    ///
    /// 对应 `sys_fmem` / `sysinfo.freemem`。逐个分区加锁求和，
    /// 并发分配时结果只是近似值。
    pub fn free_memory(&self) -> usize {
        self.free_pages() * PGSIZE
    }

    /// 空闲页数
    pub fn free_pages(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().len()).sum()
    }

    /// 某个分区的空闲页数
    pub fn partition_len(&self, cpu: usize) -> usize {
        self.partitions[self.partition_of(cpu)].lock().len()
    }

    /// 分区是否为空
    pub fn partition_is_empty(&self, cpu: usize) -> bool {
        self.partitions[self.partition_of(cpu)].lock().is_empty()
    }

    /// 受管理的总页数
    pub fn total_pages(&self) -> usize {
        self.frames.len()
    }

    /// 分区数量
    pub fn partitions(&self) -> usize {
        self.partitions.len()
    }

    /// 是否启用引用计数
    pub fn refcounting(&self) -> bool {
        self.refs.is_some()
    }

    /// 受管理的地址范围
    pub fn range(&self) -> (PhysAddr, PhysAddr) {
        (self.start, self.end)
    }

    /// 统计信息
    pub fn stats(&self) -> KmemStats {
        KmemStats {
            allocs: self.counters.allocs.load(Ordering::Relaxed),
            frees: self.counters.frees.load(Ordering::Relaxed),
            steals: self.counters.steals.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    fn partition_of(&self, cpu: usize) -> usize {
        cpu % self.partitions.len()
    }

    fn addr_of(&self, page: usize) -> PhysAddr {
        self.start.offset(page * PGSIZE)
    }

    /// 校验地址并换算成页号
    fn page_index(&self, pa: PhysAddr, op: &str) -> usize {
        if !pa.is_page_aligned() {
            panic!("{op}: page {pa} is not page aligned");
        }
        if pa < self.start || pa >= self.end {
            panic!("{op}: page {pa} outside managed range [{}, {})", self.start, self.end);
        }
        (pa.as_usize() - self.start.as_usize()) / PGSIZE
    }

    fn ref_table(&self, op: &str) -> &RefTable {
        match &self.refs {
            Some(refs) => refs,
            None => panic!("{op}: reference counting is disabled"),
        }
    }
}

impl<H> fmt::Debug for Kmem<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kmem")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("total_pages", &self.frames.len())
            .field("partitions", &self.partitions.len())
            .field("refcount", &self.refs.is_some())
            .finish()
    }
}
