//! 内核参数常量
//!
//! 这个模块包含页分配器和块缓存共享的常量：
//! - 页与块的大小
//! - 默认 CPU 数、缓冲区数量、哈希桶数量
//! - 调试用的填充字节

//=============================================================================
// 页与块
//=============================================================================

/// 物理页大小（字节）
pub const PGSIZE: usize = 4096;

/// 磁盘块大小（字节），与页大小相同
pub const BSIZE: usize = PGSIZE;

//=============================================================================
// 默认规模
//=============================================================================

/// 默认最大 CPU 数（每个 CPU 一个空闲链表分区）
pub const NCPU: usize = 8;

/// 单个文件系统操作最多写入的块数
pub const MAXOPBLOCKS: usize = 10;

/// 默认缓冲区池大小
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// 默认哈希桶数量（取素数以分散相邻块号）
pub const NBUCKET: usize = 13;

//=============================================================================
// 调试填充
//=============================================================================

/// 分配时写入页内容的字节，用于暴露未初始化读取
pub const ALLOC_FILL: u8 = 0x05;

/// 释放时写入页内容的字节，用于暴露悬垂引用
pub const JUNK_FILL: u8 = 0x01;

/// 向上对齐到页边界
#[inline]
pub const fn pg_round_up(addr: usize) -> usize {
    (addr + PGSIZE - 1) & !(PGSIZE - 1)
}

/// 向下对齐到页边界
#[inline]
pub const fn pg_round_down(addr: usize) -> usize {
    addr & !(PGSIZE - 1)
}
