//! 睡眠锁
//!
//! 与自旋锁不同，获取失败时调用 [`KernelHal::yield_now`] 让出处理器，
//! 因此允许在持有期间执行磁盘 I/O。

use crate::hal::KernelHal;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// 睡眠锁
///
/// 内部是一把 `spin::Mutex`，但从不在上面自旋：只用 `try_lock`，
/// 失败就让出处理器后重试。
pub struct SleepLock<T, H> {
    inner: spin::Mutex<T>,
    name: &'static str,
    _hal: PhantomData<fn() -> H>,
}

/// 睡眠锁守卫，drop 时释放锁
pub struct SleepLockGuard<'a, T> {
    guard: spin::MutexGuard<'a, T>,
}

impl<T, H: KernelHal> SleepLock<T, H> {
    /// 创建睡眠锁
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
            name,
            _hal: PhantomData,
        }
    }

    /// 获取锁，必要时阻塞
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return SleepLockGuard { guard };
            }
            H::yield_now();
        }
    }

    /// 尝试获取锁，不阻塞
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        self.inner.try_lock().map(|guard| SleepLockGuard { guard })
    }

    /// 锁当前是否被某个持有者占用
    ///
    /// 只用于诊断断言，返回后状态可能立刻改变。
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// 锁名
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T, H> fmt::Debug for SleepLock<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepLock")
            .field("name", &self.name)
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
