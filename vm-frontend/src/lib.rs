//! Instruction decoders for the supported guest architectures.
//!
//! Every guest is described by an [`Architecture`] implementation: an
//! ordered [`DecodeTable`] of bit patterns, an operand-layout function and
//! the execute handlers that express each instruction in RTL.
//!
//! Guests are gated behind cargo features (`riscv32`, `riscv64`, `mips32`,
//! `loongarch32r`, `x86`); `all` is on by default.

use std::fmt;

use vm_core::{DecodeError, GuestAddr, GuestArch, GuestWord, MemoryAccess, VmResult};
use vm_ir::Decode;

pub mod pattern;
pub mod table;

#[cfg(any(feature = "riscv32", feature = "riscv64"))]
pub mod riscv;

#[cfg(feature = "mips32")]
pub mod mips32;

#[cfg(feature = "loongarch32r")]
pub mod loongarch32r;

#[cfg(feature = "x86")]
pub mod x86;

#[cfg(feature = "loongarch32r")]
pub use loongarch32r::LoongArch32r;
#[cfg(feature = "mips32")]
pub use mips32::Mips32;
pub use pattern::{MAX_PATTERN_BITS, Pattern};
#[cfg(feature = "riscv32")]
pub use riscv::Riscv32;
#[cfg(feature = "riscv64")]
pub use riscv::Riscv64;
#[cfg(feature = "x86")]
pub use x86::X86;
pub use table::{DecodeTable, ExecFn, InstPat, TableBuilder};

/// 某一架构的解码表类型
pub type ArchTable<A> = DecodeTable<<A as Architecture>::Word, <A as Architecture>::Layout>;

/// 某一架构的表项类型
pub type ArchRow<A> = InstPat<<A as Architecture>::Word, <A as Architecture>::Layout>;

/// 客户机架构能力集
pub trait Architecture: Sized + 'static {
    /// 原生字长
    type Word: GuestWord;
    /// 操作数布局标签
    type Layout: Copy + fmt::Debug + Send + Sync + 'static;

    const NAME: &'static str;
    const ARCH: GuestArch;
    /// 寄存器槽位数，包括 HI/LO、EFLAGS 一类的附加寄存器
    const NR_REGS: usize;
    /// 0 号寄存器恒为零
    const ZERO_REG: bool;

    /// 构建解码表，每个执行器只构建一次
    fn decode_table() -> Result<ArchTable<Self>, DecodeError>;

    /// 按布局填写解码记录中的操作数
    fn decode_operands(
        layout: Self::Layout,
        s: &mut Decode<Self::Word>,
        gpr: &[Self::Word],
        mem: &mut dyn MemoryAccess,
    ) -> VmResult<()>;

    /// 取指并解码。返回时 `dnpc` 等于 `snpc`，即默认顺序执行。
    /// 默认实现适用于定长 32 位编码。
    fn fetch_decode<'t>(
        table: &'t ArchTable<Self>,
        s: &mut Decode<Self::Word>,
        gpr: &[Self::Word],
        mem: &mut dyn MemoryAccess,
    ) -> VmResult<&'t ArchRow<Self>> {
        let inst = inst_fetch(s, mem, 4)?;
        s.inst = inst;
        let (idx, row) = table.lookup(inst)?;
        s.row = idx;
        Self::decode_operands(row.layout, s, gpr, mem)?;
        s.dnpc = s.snpc;
        Ok(row)
    }

    fn reset_vector(mem_base: u64, image_offset: u64) -> Self::Word {
        Self::Word::from_u64(mem_base.wrapping_add(image_offset))
    }

    /// 寄存器名
    fn reg_name(idx: usize) -> &'static str;

    /// 未指定镜像时使用的内置程序
    fn builtin_image() -> Vec<u8>;
}

/// Fetches `len` bytes at `snpc` and advances it.
pub fn inst_fetch<W: GuestWord>(
    s: &mut Decode<W>,
    mem: &mut dyn MemoryAccess,
    len: usize,
) -> VmResult<u64> {
    let v = mem.ifetch(GuestAddr(s.snpc.as_u64()), len)?;
    s.push_fetched(v, len);
    Ok(v)
}

/// 将 32 位指令字序列转为小端字节流
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Looks up a register index by name.
pub fn reg_by_name<A: Architecture>(name: &str) -> Option<usize> {
    (0..A::NR_REGS).find(|&i| A::reg_name(i) == name)
}
