//! vm-engine-interpreter: 解释执行引擎
//!
//! [`Cpu`] 持有一个客户机核心的全部可变状态，并驱动取指、解码、执行、
//! 提交 PC 的循环。每条指令提交后依次调用差分测试与设备轮询两个可选
//! 协作者（见 [`hooks`]）。

pub mod cpu;
pub mod hooks;
pub mod stats;

pub use cpu::Cpu;
pub use hooks::{DevicePoll, DiffTest, RefState};
pub use stats::ExecStats;
