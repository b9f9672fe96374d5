//! 物理地址类型

use crate::consts::{pg_round_down, pg_round_up, PGSIZE};
use core::fmt;

/// 物理地址
///
/// 分配器只把它当作页的名字：合法的页地址是 [`PGSIZE`] 的整数倍，
/// 并且落在受管理的范围内。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// 从整数构造
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// 原始数值
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// 是否页对齐
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PGSIZE == 0
    }

    /// 向上对齐到页边界
    pub const fn page_round_up(self) -> Self {
        Self(pg_round_up(self.0))
    }

    /// 向下对齐到页边界
    pub const fn page_round_down(self) -> Self {
        Self(pg_round_down(self.0))
    }

    /// 偏移 `bytes` 字节
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for PhysAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}
