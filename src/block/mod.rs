//! 块设备抽象
//!
//! 块缓存只需要设备驱动提供一件事：按 `(dev, blockno)` 同步读写一整块。
//! 块大小等于页大小（[`BSIZE`](crate::consts::BSIZE)）。

mod device;

pub use device::BlockDevice;
