//! 块缓存模块
//!
//! 固定容量的磁盘块缓存，按 `(dev, blockno)` 哈希分桶，供文件系统层读写磁盘块。
//!
//! # 主要组件
//!
//! - [`Bcache`] - 缓存本体：缓冲池、哈希桶、驱逐
//! - [`BufGuard`] - `read` 返回的上锁缓冲区，drop 即归还
//! - [`BufFlags`] - 缓冲区状态标志
//! - [`BcacheConfig`] / [`BcacheStats`] - 容量配置与统计信息
//!
//! # 设计原理
//!
//! 1. **分桶**：每个桶一把自旋锁，不同桶上的命中互不竞争
//! 2. **两级锁**：桶锁保护键、引用计数和链表，只持有很短的时间；
//!    每个缓冲区另有一把睡眠锁保护内容，可以跨磁盘 I/O 持有
//! 3. **串行驱逐**：未命中路径持有一把全局驱逐锁，同一个键不会被绑定两次
//! 4. **守卫即所有权**：`write`/`release` 只接受 [`BufGuard`]，
//!    未持锁就写回或归还在类型上无法表达
//! 5. **链表用下标**：桶链表的 `prev`/`next` 是缓冲区槽位号，哨兵节点排在缓冲区之后
//!
//! # 与内核接口的对应关系
//!
//! | 内核               | 本模块                         |
//! |--------------------|--------------------------------|
//! | `struct buf`       | 内部 `Buf` + [`BufGuard`]      |
//! | `binit()`          | [`Bcache::new()`]              |
//! | `bread()`          | [`Bcache::read()`]             |
//! | `bwrite()`         | [`Bcache::write()`]            |
//! | `brelse()`         | [`Bcache::release()`] / drop   |
//! | `bpin()`           | [`Bcache::pin()`]              |
//! | `bunpin()`         | [`Bcache::unpin()`]            |
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use kmem_bcache::cache::{Bcache, BcacheConfig};
//!
//! let bcache: Bcache<_, RiscvHal> = Bcache::new(disk, BcacheConfig::default())?;
//!
//! // 读取并修改一块
//! let mut buf = bcache.read(ROOTDEV, 46)?;
//! buf.data_mut()[0] = 42;
//! bcache.write(&buf)?;
//!
//! // 日志层固定该块，直到提交完成
//! bcache.pin(&buf);
//! let id = buf.id();
//! bcache.release(buf);
//! // ...
//! bcache.unpin(id);
//! ```
//!
//! # 内存分配要求
//!
//! 缓冲区数据在 [`Bcache::new`] 时一次性从 `alloc` 分配，之后不再分配。

mod bcache;
mod buffer;
mod chain;
mod guard;

pub use bcache::{Bcache, BcacheConfig, BcacheStats};
pub use buffer::{BufFlags, BufferId};
pub use guard::BufGuard;
