//! kmem_bcache: 教学内核的内存核心
//!
//! 这个库实现内核中两个最底层的共享资源服务：
//! - **物理页分配器**：按 CPU 分区的空闲链表、空分区窃取、共享页引用计数
//! - **块缓存**：哈希分桶的固定容量磁盘块缓存，缓冲区独占上锁、引用计数驱逐、pin
//!
//! 两者都是显式构造、以引用传递的单实例服务，不依赖全局变量。
//!
//! # 示例
//!
//! ```rust,ignore
//! use kmem_bcache::{Bcache, BcacheConfig, Kmem, KmemConfig, PhysAddr};
//!
//! // 启动时初始化一次
//! let kmem: Kmem<RiscvHal> = Kmem::new(PhysAddr::new(end), PhysAddr::new(PHYSTOP), KmemConfig::default())?;
//! let bcache: Bcache<_, RiscvHal> = Bcache::new(virtio_disk, BcacheConfig::default())?;
//!
//! // 分配一页
//! let pa = kmem.alloc()?;
//! kmem.free(pa);
//!
//! // 读取一块
//! let buf = bcache.read(ROOTDEV, 1)?;
//! bcache.release(buf);
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`hal`] - 硬件抽象（当前 CPU、让出处理器）
//! - [`sync`] - 睡眠锁
//! - [`kalloc`] - 物理页分配器
//! - [`block`] - 块设备抽象
//! - [`cache`] - 块缓存

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 硬件抽象层
pub mod hal;

/// 同步原语
pub mod sync;

/// 物理页分配器
pub mod kalloc;

/// 块设备抽象
pub mod block;

/// 块缓存
pub mod cache;

#[cfg(test)]
mod test_support;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 硬件抽象
pub use hal::KernelHal;
#[cfg(any(test, feature = "std"))]
pub use hal::StdHal;

// 页分配器
pub use kalloc::{FrameGuard, Kmem, KmemConfig, KmemStats, PhysAddr, Seeding};

// 块设备
pub use block::BlockDevice;

// 块缓存
pub use cache::{Bcache, BcacheConfig, BcacheStats, BufFlags, BufGuard, BufferId};
