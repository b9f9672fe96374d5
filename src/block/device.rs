//! 块设备接口

use crate::consts::BSIZE;
use crate::error::Result;

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问。所有方法都是同步的：返回时传输已经完成。
///
/// 块缓存会在多个 CPU 上并发调用这些方法（针对不同的缓冲区），
/// 因此接收者是 `&self`，驱动自己负责内部同步。
///
/// # 示例
///
/// ```rust,ignore
/// use kmem_bcache::{BlockDevice, Result};
///
/// struct VirtioDisk {
///     // ...
/// }
///
/// impl BlockDevice for VirtioDisk {
///     fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
///         self.rw(blockno, buf, false)
///     }
///
///     fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
///         self.rw(blockno, buf, true)
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 块大小，必须等于 [`BSIZE`]
    fn block_size(&self) -> usize {
        BSIZE
    }

    /// 把块 `(dev, blockno)` 读入 `buf`
    ///
    /// `buf` 的长度恰好是一块。
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()>;

    /// 把 `buf` 写到块 `(dev, blockno)`
    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()>;

    /// 刷新设备写缓存
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
