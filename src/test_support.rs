//! 测试用的内存块设备

use crate::block::BlockDevice;
use crate::consts::BSIZE;
use crate::error::{Error, ErrorKind, Result};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 内存中的块设备
///
/// 从未写过的块读出时前 4 字节为 0，`[4..8]` 是 dev，`[8..12]` 是 blockno（小端），
/// 方便测试判断缓冲区内容属于哪一块。
pub(crate) struct MemDisk {
    blocks: spin::Mutex<BTreeMap<(u32, u32), Box<[u8]>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
}

impl MemDisk {
    pub(crate) fn new() -> Self {
        Self {
            blocks: spin::Mutex::new(BTreeMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 直接查看设备上某块的内容
    pub(crate) fn peek(&self, dev: u32, blockno: u32) -> Option<Box<[u8]>> {
        self.blocks.lock().get(&(dev, blockno)).cloned()
    }

    pub(crate) fn fresh_block(dev: u32, blockno: u32) -> Box<[u8]> {
        let mut block = alloc::vec![0u8; BSIZE].into_boxed_slice();
        block[4..8].copy_from_slice(&dev.to_le_bytes());
        block[8..12].copy_from_slice(&blockno.to_le_bytes());
        block
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Io, "injected read failure"));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.blocks.lock().get(&(dev, blockno)) {
            Some(block) => buf.copy_from_slice(block),
            None => buf.copy_from_slice(&Self::fresh_block(dev, blockno)),
        }
        Ok(())
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.blocks.lock().insert((dev, blockno), buf.into());
        Ok(())
    }
}

/// 读取块内容中的计数器（`[0..4]`）
pub(crate) fn counter(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// 读取块内容中记录的 `(dev, blockno)`
pub(crate) fn identity(data: &[u8]) -> (u32, u32) {
    (
        u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
    )
}
