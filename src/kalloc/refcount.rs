//! 物理页引用计数表
//!
//! 用独立的锁保护，与分区锁互不嵌套，
//! 这样引用计数的更新不会阻塞无关的分配。

use super::addr::PhysAddr;
use alloc::boxed::Box;
use alloc::vec;

/// 每页一个计数
pub(super) struct RefTable {
    counts: spin::Mutex<Box<[u16]>>,
}

impl RefTable {
    pub(super) fn new(npages: usize) -> Self {
        Self {
            counts: spin::Mutex::new(vec![0u16; npages].into_boxed_slice()),
        }
    }

    /// 页刚被分配：唯一的所有者
    pub(super) fn init_allocated(&self, page: usize) {
        let mut counts = self.counts.lock();
        debug_assert_eq!(counts[page], 0, "allocated page already referenced");
        counts[page] = 1;
    }

    pub(super) fn get(&self, page: usize) -> u16 {
        self.counts.lock()[page]
    }

    /// 增加一个所有者，返回新的计数
    pub(super) fn increment(&self, page: usize, pa: PhysAddr) -> u16 {
        let mut counts = self.counts.lock();
        let count = counts[page];
        if count == 0 {
            panic!("kreference: page {pa} is free");
        }
        let Some(next) = count.checked_add(1) else {
            panic!("kreference: reference count overflow on page {pa}");
        };
        counts[page] = next;
        next
    }

    /// 去掉一个所有者，返回新的计数
    ///
    /// 最后一个引用只能通过 `free` 释放。
    pub(super) fn decrement(&self, page: usize, pa: PhysAddr) -> u16 {
        let mut counts = self.counts.lock();
        let count = counts[page];
        if count <= 1 {
            panic!("kdereference: page {pa} has {count} reference(s); the last one must be released with free");
        }
        counts[page] = count - 1;
        count - 1
    }

    /// 释放前检查：调用者必须是唯一的所有者
    pub(super) fn release(&self, page: usize, pa: PhysAddr) {
        let mut counts = self.counts.lock();
        let count = counts[page];
        if count != 1 {
            panic!("kfree: page {pa} has {count} reference(s), expected 1");
        }
        counts[page] = 0;
    }
}
