//! 执行循环的外部协作者
//!
//! 每提交一条指令，执行器会依次调用差分测试和设备轮询。两者都是同步
//! 调用，返回之后才会取下一条指令。

use vm_core::{EmuState, GuestWord, VmResult};

/// Per-instruction device poll.
///
/// Timers and host input are expected to set flags that are consumed
/// here; this is the only place a device may affect the run state.
pub trait DevicePoll {
    fn device_update(&mut self, state: &mut EmuState);
}

impl<F> DevicePoll for F
where
    F: FnMut(&mut EmuState),
{
    fn device_update(&mut self, state: &mut EmuState) {
        self(state)
    }
}

/// 参考实现单步之后的寄存器状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefState<W> {
    pub gpr: Vec<W>,
    pub pc: W,
}

/// Reference model stepped in lockstep with the interpreter.
pub trait DiffTest<W: GuestWord> {
    /// 参考实现执行一条指令
    ///
    /// `pc` 为刚执行完的指令地址，`npc` 为解释器提交后的 PC。
    fn step(&mut self, pc: W, npc: W) -> VmResult<RefState<W>>;

    /// 该指令的效果无法在参考实现上重现（访问了设备或停机），
    /// 直接把解释器的状态同步过去。
    fn skip_ref(&mut self, gpr: &[W], pc: W);
}
