//! vm-core: 模拟器核心类型
//!
//! 客户机字长、地址、运行状态、错误分类、配置，以及地址空间与设备的
//! 接口定义。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod device_emulation;
pub mod error;
pub mod mmu_traits;
pub mod vm_state;
pub mod word;

pub use config::{Config, VmConfig};
pub use device_emulation::IoDevice;
pub use error::{ConfigError, DecodeError, ExecutionError, MemoryError, VmError, VmResult};
pub use mmu_traits::{AddressTranslator, BareTranslator, MemoryAccess, MmuCheck};
pub use vm_state::{EmuState, RunState};
pub use word::GuestWord;

// ============================================================================
// 基础类型定义
// ============================================================================

/// 客户机地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GuestAddr(pub u64);

impl GuestAddr {
    /// Wrapping addition
    pub fn wrapping_add(self, rhs: u64) -> Self {
        GuestAddr(self.0.wrapping_add(rhs))
    }

    /// Wrapping subtraction
    pub fn wrapping_sub(self, rhs: GuestAddr) -> u64 {
        self.0.wrapping_sub(rhs.0)
    }
}

impl fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u64> for GuestAddr {
    fn from(v: u64) -> Self {
        GuestAddr(v)
    }
}

/// 访问类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// 读取
    Read,
    /// 写入
    Write,
    /// 执行
    Execute,
}

/// 客户机架构
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestArch {
    Riscv32,
    Riscv64,
    Mips32,
    LoongArch32r,
    X86,
}

impl GuestArch {
    pub const ALL: [GuestArch; 5] = [
        GuestArch::Riscv32,
        GuestArch::Riscv64,
        GuestArch::Mips32,
        GuestArch::LoongArch32r,
        GuestArch::X86,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GuestArch::Riscv32 => "riscv32",
            GuestArch::Riscv64 => "riscv64",
            GuestArch::Mips32 => "mips32",
            GuestArch::LoongArch32r => "loongarch32r",
            GuestArch::X86 => "x86",
        }
    }
}

impl fmt::Display for GuestArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GuestArch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GuestArch::ALL
            .into_iter()
            .find(|arch| arch.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownArch(s.to_string()))
    }
}
