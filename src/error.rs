//! 错误类型定义
//!
//! 提供页分配器与块缓存的可恢复错误类型。
//!
//! 违反调用约定（释放越界地址、引用计数不一致、解除未持有的 pin 等）
//! 不属于可恢复错误，而是直接 `panic!`，消息中携带出错的地址或计数。

use core::fmt;

/// 内存核心操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 块设备 I/O 错误
    Io,
    /// 无效参数（初始化范围、配置等）
    InvalidInput,
    /// 所有分区都没有空闲物理页
    OutOfMemory,
    /// 缓存池中所有缓冲区都被引用，无法驱逐
    NoSpace,
    /// 设备忙
    Busy,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
