//! 统一错误类型
//!
//! 这里的错误均为宿主侧（模拟器自身或指令表）错误：一旦产生即向上传播
//! 到驱动程序并终止运行。客户机可见的结果（正常停机、非法指令）不走这
//! 条路径，而是记录在 [`EmuState`](crate::EmuState) 中。

use thiserror::Error;

use crate::{AccessType, GuestAddr};

/// 统一结果类型
pub type VmResult<T> = Result<T, VmError>;

/// 顶层错误
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 执行某条指令期间产生的错误，附带该指令的 PC
    #[error("{source} (pc = {pc})")]
    AtPc {
        pc: GuestAddr,
        #[source]
        source: Box<VmError>,
    },
}

impl VmError {
    /// Attaches the guest PC of the instruction being executed.
    pub fn at_pc(self, pc: GuestAddr) -> Self {
        match self {
            already @ VmError::AtPc { .. } => already,
            other => VmError::AtPc {
                pc,
                source: Box::new(other),
            },
        }
    }

    /// Strips any PC context and returns the underlying error.
    pub fn root(&self) -> &VmError {
        match self {
            VmError::AtPc { source, .. } => source.root(),
            other => other,
        }
    }
}

/// 地址空间错误
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("address = {addr} is out of bound of pmem [{base}, {end}]")]
    OutOfBound {
        addr: GuestAddr,
        base: GuestAddr,
        end: GuestAddr,
    },

    #[error("access of {len} byte(s) at {addr} exceeds region '{name}' [{low}, {high}]")]
    RegionBound {
        name: String,
        addr: GuestAddr,
        len: usize,
        low: GuestAddr,
        high: GuestAddr,
    },

    #[error("port {port:#x} is not mapped by any port I/O region")]
    UnmappedPort { port: u64 },

    #[error("invalid access width {len}")]
    InvalidWidth { len: usize },

    #[error("region table '{table}' is full (capacity {capacity})")]
    TableFull {
        table: &'static str,
        capacity: usize,
    },

    #[error("region '{name}' [{low}, {high}] lies outside the {table} window [{win_low}, {win_high}]")]
    OutsideWindow {
        name: String,
        table: &'static str,
        low: GuestAddr,
        high: GuestAddr,
        win_low: GuestAddr,
        win_high: GuestAddr,
    },

    #[error("region '{name}' [{low}, {high}] overlaps {other}")]
    Overlap {
        name: String,
        low: GuestAddr,
        high: GuestAddr,
        other: String,
    },

    #[error("region '{name}' has {have} bytes of backing storage, needs {need}")]
    BackingTooSmall {
        name: String,
        have: usize,
        need: u64,
    },

    #[error("I/O space exhausted: requested {requested} bytes, {available} available")]
    IoSpaceExhausted { requested: usize, available: usize },

    #[error("block of {len} bytes at {addr} does not fit in pmem")]
    BlockOutOfRange { addr: GuestAddr, len: usize },

    #[error("address translation failed: {access:?} {addr}")]
    TranslationFailed { addr: GuestAddr, access: AccessType },
}

/// 指令表与解码错误
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("pattern '{pattern}' is too long ({bits} bits, at most {max})")]
    PatternTooLong {
        pattern: String,
        bits: usize,
        max: usize,
    },

    #[error("pattern '{pattern}' contains invalid character {ch:?}")]
    InvalidPatternChar { pattern: String, ch: char },

    #[error("unsupported relation code {0}")]
    UnknownRelOp(u32),

    #[error("decode table '{table}' does not end with a catch-all row")]
    MissingCatchAll { table: &'static str },

    #[error("no row of decode table '{table}' matches {inst:#x}")]
    NoMatch { table: &'static str, inst: u64 },
}

/// 指令执行期间的宿主错误
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("division by zero")]
    DivisionByZero,

    /// 商超出目标寄存器宽度
    #[error("quotient overflow")]
    DivideOverflow,

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unknown guest architecture '{0}'")]
    UnknownArch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_pc_wraps_once() {
        let err = VmError::from(ExecutionError::DivisionByZero)
            .at_pc(GuestAddr(0x8000_0010))
            .at_pc(GuestAddr(0x8000_0020));
        assert_eq!(err.to_string(), "division by zero (pc = 0x80000010)");
        assert!(matches!(
            err.root(),
            VmError::Execution(ExecutionError::DivisionByZero)
        ));
    }

    #[test]
    fn test_memory_error_message() {
        let err = MemoryError::OutOfBound {
            addr: GuestAddr(0x1000),
            base: GuestAddr(0x8000_0000),
            end: GuestAddr(0x87ff_ffff),
        };
        assert_eq!(
            err.to_string(),
            "address = 0x00001000 is out of bound of pmem [0x80000000, 0x87ffffff]"
        );
    }
}
