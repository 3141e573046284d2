//! 运行/陷入状态

use std::fmt;

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// 暂停，可以继续运行
    #[default]
    Stopped,
    /// 正在执行
    Running,
    /// 客户机执行了停机指令
    Ended,
    /// 遇到非法指令或被外部强制终止
    Aborted,
    /// 外部退出请求
    Quit,
}

impl RunState {
    /// ENDED/ABORTED/QUIT
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Ended | RunState::Aborted | RunState::Quit)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Stopped => "STOPPED",
            RunState::Running => "RUNNING",
            RunState::Ended => "ENDED",
            RunState::Aborted => "ABORTED",
            RunState::Quit => "QUIT",
        };
        f.write_str(name)
    }
}

/// Run state plus the PC and result code recorded when a terminal state
/// was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmuState {
    pub state: RunState,
    pub halt_pc: u64,
    pub halt_ret: u64,
}

impl EmuState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置状态。QUIT 一旦进入便不再改变。
    pub fn set_state(&mut self, state: RunState, pc: u64, ret: u64) {
        if self.state == RunState::Quit {
            return;
        }
        self.state = state;
        self.halt_pc = pc;
        self.halt_ret = ret;
    }

    /// 正常停机
    pub fn end(&mut self, pc: u64, code: u64) {
        self.set_state(RunState::Ended, pc, code);
    }

    /// 非法指令，结果码记为 -1
    pub fn abort(&mut self, pc: u64) {
        self.set_state(RunState::Aborted, pc, u64::MAX);
    }

    pub fn quit(&mut self) {
        self.state = RunState::Quit;
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// True unless the run ended cleanly with a zero code or was quit.
    pub fn is_exit_status_bad(&self) -> bool {
        let good = (self.state == RunState::Ended && self.halt_ret == 0)
            || self.state == RunState::Quit;
        !good
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        let mut st = EmuState::new();
        assert!(st.is_exit_status_bad());

        st.end(0x8000_000c, 0);
        assert!(!st.is_exit_status_bad());

        st.end(0x8000_000c, 1);
        assert!(st.is_exit_status_bad());

        st.abort(0x8000_0000);
        assert_eq!(st.halt_ret, u64::MAX);
        assert!(st.is_exit_status_bad());
    }

    #[test]
    fn test_quit_is_absorbing() {
        let mut st = EmuState::new();
        st.quit();
        st.end(0x1000, 3);
        assert_eq!(st.state, RunState::Quit);
        assert!(!st.is_exit_status_bad());
        assert!(st.state.is_terminal());
    }
}
