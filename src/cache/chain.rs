//! 哈希桶链表
//!
//! 每个桶是一条带哨兵的循环双向链表。节点用下标表示：
//! `0..nbuf` 是缓冲区，`nbuf..nbuf + nbucket` 是各桶的哨兵。
//!
//! 链表修改都要求传入该桶的 [`ChainGuard`]，因此不持桶锁就改不了链表。

use super::buffer::BufferId;
use alloc::boxed::Box;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 未链入任何桶
const UNLINKED: usize = usize::MAX;

/// 把 `(dev, blockno)` 映射到桶号
///
/// 三角数（Cantor 配对）组合：`((d + b)(d + b + 1) / 2 + d) % nbucket`，
/// 相邻块号会落到不同的桶。
pub(super) fn hash(dev: u32, blockno: u32, nbucket: usize) -> usize {
    let (d, b) = (u128::from(dev), u128::from(blockno));
    let sum = d + b;
    let pair = sum * (sum + 1) / 2 + d;
    (pair % nbucket as u128) as usize
}

struct Link {
    prev: AtomicUsize,
    next: AtomicUsize,
}

impl Link {
    fn unlinked() -> Self {
        Self {
            prev: AtomicUsize::new(UNLINKED),
            next: AtomicUsize::new(UNLINKED),
        }
    }

    fn prev(&self) -> usize {
        self.prev.load(Ordering::Relaxed)
    }

    fn next(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    fn set(&self, prev: usize, next: usize) {
        self.prev.store(prev, Ordering::Relaxed);
        self.next.store(next, Ordering::Relaxed);
    }
}

/// 全部桶的链表和锁
pub(super) struct Chains {
    nbuf: usize,
    links: Box<[Link]>,
    locks: Box<[spin::Mutex<()>]>,
}

/// 持有某个桶的锁
pub(super) struct ChainGuard<'a> {
    bucket: usize,
    _lock: spin::MutexGuard<'a, ()>,
}

impl ChainGuard<'_> {
    /// 被锁住的桶号
    pub(super) fn bucket(&self) -> usize {
        self.bucket
    }
}

impl Chains {
    /// 创建 `nbucket` 条空链表，`nbuf` 个缓冲区节点都未链入
    pub(super) fn new(nbuf: usize, nbucket: usize) -> Self {
        let links: Box<[Link]> = (0..nbuf + nbucket).map(|_| Link::unlinked()).collect();
        for sentinel in nbuf..nbuf + nbucket {
            links[sentinel].set(sentinel, sentinel);
        }
        Self {
            nbuf,
            links,
            locks: (0..nbucket).map(|_| spin::Mutex::new(())).collect(),
        }
    }

    pub(super) fn nbucket(&self) -> usize {
        self.locks.len()
    }

    /// 锁住桶 `bucket`
    pub(super) fn lock(&self, bucket: usize) -> ChainGuard<'_> {
        ChainGuard {
            bucket,
            _lock: self.locks[bucket].lock(),
        }
    }

    fn sentinel(&self, chain: &ChainGuard<'_>) -> usize {
        self.nbuf + chain.bucket
    }

    /// 把缓冲区 `id` 插到链表尾部（哨兵之前）
    pub(super) fn insert(&self, chain: &ChainGuard<'_>, id: BufferId) {
        debug_assert!(!self.is_linked(id), "buffer {id} is already on a chain");
        let head = self.sentinel(chain);
        let tail = self.links[head].prev();
        self.links[id].set(tail, head);
        self.links[tail].next.store(id, Ordering::Relaxed);
        self.links[head].prev.store(id, Ordering::Relaxed);
    }

    /// 把缓冲区 `id` 从它所在的链表上摘下
    ///
    /// `chain` 必须是 `id` 当前所在的桶。
    pub(super) fn remove(&self, _chain: &ChainGuard<'_>, id: BufferId) {
        let link = &self.links[id];
        let (prev, next) = (link.prev(), link.next());
        if prev == UNLINKED || next == UNLINKED {
            return;
        }
        self.links[prev].next.store(next, Ordering::Relaxed);
        self.links[next].prev.store(prev, Ordering::Relaxed);
        link.set(UNLINKED, UNLINKED);
    }

    /// 遍历桶中的缓冲区
    pub(super) fn iter<'a>(&'a self, chain: &'a ChainGuard<'_>) -> ChainIter<'a> {
        let head = self.sentinel(chain);
        ChainIter {
            links: &self.links,
            head,
            cur: self.links[head].next(),
        }
    }

    fn is_linked(&self, id: BufferId) -> bool {
        self.links[id].next() != UNLINKED
    }
}

/// 桶内遍历器，借用桶锁
pub(super) struct ChainIter<'a> {
    links: &'a [Link],
    head: usize,
    cur: usize,
}

impl Iterator for ChainIter<'_> {
    type Item = BufferId;

    fn next(&mut self) -> Option<BufferId> {
        if self.cur == self.head {
            return None;
        }
        let id = self.cur;
        self.cur = self.links[id].next();
        Some(id)
    }
}
