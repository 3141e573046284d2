//! vm-ir: 寄存器传输级（RTL）原语
//!
//! 各架构的指令语义都编译为这里的一小组原语。执行期上下文见
//! [`rtl::Rtl`]，纯计算核见 [`op`]。

pub mod decode;
pub mod op;
pub mod relop;
pub mod rtl;

pub use decode::{Decode, MAX_INST_BYTES, Operand};
pub use op::{AluOp, DivOp};
pub use relop::RelOp;
pub use rtl::{NR_TMP, Reg, Rtl, S0, S1, S2, Src, T0};

/// 寄存器编号
pub type RegId = u32;
