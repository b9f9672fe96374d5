//! 物理页分配器
//!
//! 这个模块负责内核保留区之上的全部物理内存，按 4096 字节整页分配和回收。
//!
//! # 主要组件
//!
//! - [`Kmem`] - 分配器本体：按 CPU 分区的空闲链表、窃取、引用计数
//! - [`PhysAddr`] - 物理地址
//! - [`KmemConfig`] / [`Seeding`] - 分区数量、是否启用引用计数、初始播种方式
//! - [`KmemStats`] - 分配、释放、窃取、失败次数
//!
//! # 设计原理
//!
//! 1. **分区**：每个 CPU 一条空闲链表和一把锁，常见路径上 CPU 之间没有竞争
//! 2. **窃取**：本分区为空时从其他分区借一页，只有全部为空才报告内存不足
//! 3. **引用计数**：写时复制等共享映射通过 `add_ref`/`drop_ref` 记录所有者数量，
//!    `free` 要求调用者是唯一所有者
//! 4. **链表用页号**：空闲链表的 `next` 是页号数组，没有裸指针
//!
//! # 锁
//!
//! | 锁              | 保护                    |
//! |-----------------|-------------------------|
//! | 分区锁（每 CPU）| 该分区的空闲链表        |
//! | 引用计数表锁    | 所有页的引用计数        |
//! | 帧锁（每页）    | 页内容与分配状态        |
//!
//! 三类锁互不嵌套，同一时刻一个线程最多持有其中一把。

mod addr;
mod freelist;
mod kmem;
mod refcount;

pub use addr::PhysAddr;
pub use kmem::{FrameGuard, Kmem, KmemConfig, KmemStats, Seeding};
