//! 硬件抽象层
//!
//! 页分配器需要知道调用者当前运行在哪个 CPU 上，睡眠锁需要在等待时让出处理器。
//! 这两件事都由内核的其余部分提供，这里只定义接口。

/// 内核硬件抽象层 trait
///
/// 与文件系统的 `SystemHal` 一样，所有方法都是关联函数，实现者通常是一个零大小类型。
///
/// # 示例
///
/// ```ignore
/// struct RiscvHal;
/// impl KernelHal for RiscvHal {
///     fn cpu_id() -> usize {
///         // 调用者已关闭中断，读取 tp 寄存器
///         r_tp()
///     }
///     fn yield_now() {
///         sched_yield();
///     }
/// }
/// ```
pub trait KernelHal {
    /// 当前 CPU 编号
    ///
    /// 返回值只用于选择分区；在返回后被迁移到其他 CPU 不影响正确性。
    fn cpu_id() -> usize;

    /// 让出处理器
    ///
    /// 睡眠锁在等待时调用。默认实现只是一次自旋提示。
    fn yield_now() {
        core::hint::spin_loop();
    }
}

#[cfg(any(test, feature = "std"))]
mod std_hal {
    use super::KernelHal;
    use core::cell::Cell;

    std::thread_local! {
        static CPU_ID: Cell<usize> = const { Cell::new(0) };
    }

    /// 基于 std 线程的硬件抽象层
    ///
    /// 每个线程通过 [`StdHal::bind_cpu`] 声明自己模拟的 CPU 编号，默认是 0。
    /// 让出处理器映射为 `std::thread::yield_now`。
    #[derive(Debug, Clone, Copy, Default)]
    pub struct StdHal;

    impl StdHal {
        /// 把当前线程绑定到指定 CPU
        pub fn bind_cpu(cpu: usize) {
            CPU_ID.with(|id| id.set(cpu));
        }
    }

    impl KernelHal for StdHal {
        fn cpu_id() -> usize {
            CPU_ID.with(Cell::get)
        }

        fn yield_now() {
            std::thread::yield_now();
        }
    }
}

#[cfg(any(test, feature = "std"))]
pub use std_hal::StdHal;
