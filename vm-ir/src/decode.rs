//! 指令解码记录

use vm_core::GuestWord;

use crate::RegId;
use crate::rtl::Reg;

/// 单条指令最多读取的字节数
pub const MAX_INST_BYTES: usize = 16;

/// 已解码的操作数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operand<W> {
    #[default]
    None,
    /// 寄存器编号
    Reg(RegId),
    /// 立即数
    Imm(W),
    /// 有效地址
    Mem(W),
}

impl<W: GuestWord> Operand<W> {
    pub fn reg(&self) -> Option<RegId> {
        match *self {
            Operand::Reg(r) => Some(r),
            _ => None,
        }
    }

    pub fn imm(&self) -> Option<W> {
        match *self {
            Operand::Imm(v) => Some(v),
            _ => None,
        }
    }

    pub fn addr(&self) -> Option<W> {
        match *self {
            Operand::Mem(a) => Some(a),
            _ => None,
        }
    }

    /// 寄存器操作数对应的 RTL 位置，其余情况视为恒零寄存器
    pub fn to_reg(&self) -> Reg {
        match *self {
            Operand::Reg(r) => Reg::Gpr(r),
            _ => Reg::Zero,
        }
    }

    /// 立即数或地址的值
    pub fn value(&self) -> W {
        match *self {
            Operand::Imm(v) | Operand::Mem(v) => v,
            _ => W::ZERO,
        }
    }
}

/// Per-instruction decode state.
///
/// Created at the start of each fetch and dropped once the instruction
/// has been executed and `dnpc` committed.
#[derive(Debug, Clone)]
pub struct Decode<W> {
    /// 当前指令地址
    pub pc: W,
    /// 顺序执行的下一条指令地址
    pub snpc: W,
    /// 实际的下一条指令地址
    pub dnpc: W,
    /// 用于模式匹配的指令编码
    pub inst: u64,
    pub dest: Operand<W>,
    pub src1: Operand<W>,
    pub src2: Operand<W>,
    /// 操作数宽度（字节），仅变长编码使用
    pub width: usize,
    /// 附加操作码字段（例如 x86 的操作码字节或 ModR/M 中的 reg 字段）
    pub opcode: u32,
    /// 命中的表项下标
    pub row: usize,
    bytes: [u8; MAX_INST_BYTES],
    ilen: usize,
}

impl<W: GuestWord> Decode<W> {
    pub fn new(pc: W) -> Self {
        Self {
            pc,
            snpc: pc,
            dnpc: pc,
            inst: 0,
            dest: Operand::None,
            src1: Operand::None,
            src2: Operand::None,
            width: W::BYTES,
            opcode: 0,
            row: 0,
            bytes: [0; MAX_INST_BYTES],
            ilen: 0,
        }
    }

    /// 记录取到的指令字节并推进 `snpc`
    pub fn push_fetched(&mut self, value: u64, len: usize) {
        let bytes = value.to_le_bytes();
        let room = MAX_INST_BYTES - self.ilen;
        let n = len.min(room);
        self.bytes[self.ilen..self.ilen + n].copy_from_slice(&bytes[..n]);
        self.ilen += n;
        self.snpc = self.snpc.wrapping_add(W::from_u64(len as u64));
    }

    /// 已取到的指令字节
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.ilen]
    }

    pub fn ilen(&self) -> usize {
        self.ilen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_fetched_advances_snpc() {
        let mut s = Decode::new(0x1000u32);
        s.push_fetched(0x0010_0073, 4);
        assert_eq!(s.snpc, 0x1004);
        assert_eq!(s.dnpc, 0x1000);
        assert_eq!(s.bytes(), &[0x73, 0x00, 0x10, 0x00]);

        s.push_fetched(0xcc, 1);
        assert_eq!(s.ilen(), 5);
        assert_eq!(s.snpc, 0x1005);
    }

    #[test]
    fn test_operand_accessors() {
        let op: Operand<u64> = Operand::Mem(0x8000_0000);
        assert_eq!(op.addr(), Some(0x8000_0000));
        assert_eq!(op.reg(), None);
        assert_eq!(Operand::<u32>::Reg(3).reg(), Some(3));
        assert_eq!(Operand::<u32>::default(), Operand::None);
        assert_eq!(Operand::<u32>::Reg(3).to_reg(), Reg::Gpr(3));
        assert_eq!(Operand::<u32>::Imm(9).to_reg(), Reg::Zero);
        assert_eq!(Operand::<u32>::Imm(9).value(), 9);
    }
}
