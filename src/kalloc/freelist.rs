//! 空闲页单链表
//!
//! 链表节点不是指针而是页号：`next` 表按页号索引，每一项是下一空闲页的页号。
//! 一个页同一时刻只在一个分区的链表上，因此它的 `next` 只会被持有该分区锁的人修改。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 链表结束标记
pub(super) const NIL: usize = usize::MAX;

/// 所有页共享的 `next` 表
pub(super) struct Links {
    next: alloc::boxed::Box<[AtomicUsize]>,
}

impl Links {
    pub(super) fn new(npages: usize) -> Self {
        Self {
            next: (0..npages).map(|_| AtomicUsize::new(NIL)).collect(),
        }
    }
}

/// 单个分区的空闲链表
///
/// 放在分区的 `spin::Mutex` 里；`push`/`pop` 要求调用者持有该锁。
#[derive(Debug)]
pub(super) struct FreeList {
    head: usize,
    len: usize,
}

impl FreeList {
    pub(super) const fn new() -> Self {
        Self { head: NIL, len: 0 }
    }

    /// 把页 `page` 压到表头
    pub(super) fn push(&mut self, links: &Links, page: usize) {
        links.next[page].store(self.head, Ordering::Relaxed);
        self.head = page;
        self.len += 1;
    }

    /// 弹出表头页
    pub(super) fn pop(&mut self, links: &Links) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let page = self.head;
        self.head = links.next[page].swap(NIL, Ordering::Relaxed);
        self.len -= 1;
        Some(page)
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    pub(super) fn is_empty(&self) -> bool {
        self.head == NIL
    }
}
