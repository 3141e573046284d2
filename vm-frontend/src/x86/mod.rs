//! i386 子集
//!
//! 变长编码按字节取指。解码表以 16 位键匹配：单字节操作码直接作为键，
//! `0x0f` 转义的双字节操作码记为 `0x0fXX`。前缀只支持操作数宽度前缀
//! `0x66`。
//!
//! 寄存器编号 0-7 依次为 eax, ecx, edx, ebx, esp, ebp, esi, edi，第 8 号
//! 为 EFLAGS。字节寄存器沿用 x86 编码：0-3 为 al/cl/dl/bl，4-7 为
//! ah/ch/dh/bh。

use vm_core::word::{bits, sext};
use vm_core::{DecodeError, GuestArch, MemoryAccess, VmResult};
use vm_ir::{Decode, Operand, RegId};

use crate::table::TableBuilder;
use crate::{ArchRow, ArchTable, Architecture, inst_fetch};

pub mod encode;
mod exec;

use exec::*;

pub const EAX: RegId = 0;
pub const ECX: RegId = 1;
pub const EDX: RegId = 2;
pub const EBX: RegId = 3;
pub const ESP: RegId = 4;
pub const EBP: RegId = 5;
pub const EFLAGS: RegId = 8;

pub const CF: u32 = 0;
pub const ZF: u32 = 6;
pub const SF: u32 = 7;
pub const OF: u32 = 11;

const OPERAND_SIZE_PREFIX: u64 = 0x66;
const ESCAPE: u64 = 0x0f;

const REGS: [&str; 9] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "eflags"];

/// 操作数布局，E 为 ModR/M 的 r/m 操作数，G 为其 reg 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X86Type {
    /// dest = E, src1 = G
    G2E,
    /// dest = G, src1 = E
    E2G,
    /// dest = G, src1 = E, src2 = 操作数宽度的立即数
    E2GI,
    /// dest = G, src1 = E, src2 = 符号扩展的 imm8
    E2GI8,
    /// dest = E, src1 = 操作数宽度的立即数；opcode = reg 字段
    I2E,
    /// dest = E, src1 = 符号扩展的 imm8；opcode = reg 字段
    I8E,
    /// dest = E；opcode = reg 字段
    E,
    /// dest = E, src1 = 1
    E1,
    /// dest = E, src1 = cl
    ECl,
    /// 组 3：dest = E，仅 test 带立即数
    Gp3,
    /// dest = eAX, src1 = 立即数
    I2a,
    /// dest = 操作码低 3 位的寄存器, src1 = 立即数
    I2r,
    /// dest = 操作码低 3 位的寄存器
    R,
    /// dest = eAX, src1 = moffs
    O2a,
    /// dest = moffs, src1 = eAX
    A2o,
    /// src1 = 操作数宽度的立即数
    I,
    /// src1 = 符号扩展的 imm8
    I8,
    /// src1 = 零扩展的 imm8
    I8u,
    /// src1 = 零扩展的 imm16
    I16,
    /// dest = 相对跳转目标，位移为操作数宽度
    J,
    /// dest = 相对跳转目标，8 位位移
    J8,
    N,
}

pub struct X86;

fn fetch_imm(
    s: &mut Decode<u32>,
    mem: &mut dyn MemoryAccess,
    len: usize,
) -> VmResult<u32> {
    let v = inst_fetch(s, mem, len)?;
    Ok(sext(v, 8 * len as u32) as u32)
}

/// 解析 ModR/M（及 SIB、位移），返回 reg 字段和 r/m 操作数
fn decode_modrm(
    s: &mut Decode<u32>,
    gpr: &[u32],
    mem: &mut dyn MemoryAccess,
) -> VmResult<(RegId, Operand<u32>)> {
    let m = inst_fetch(s, mem, 1)?;
    let (mode, reg, rm) = (bits(m, 7, 6), bits(m, 5, 3) as RegId, bits(m, 2, 0) as RegId);
    if mode == 3 {
        return Ok((reg, Operand::Reg(rm)));
    }

    let value = |idx: RegId| gpr.get(idx as usize).copied().unwrap_or(0);
    let mut addr = 0u32;
    let mut disp32 = mode == 2;

    if rm == 4 {
        let sib = inst_fetch(s, mem, 1)?;
        let (scale, index, base) =
            (bits(sib, 7, 6) as u32, bits(sib, 5, 3) as RegId, bits(sib, 2, 0) as RegId);
        if index != 4 {
            addr = value(index) << scale;
        }
        if base == 5 && mode == 0 {
            disp32 = true;
        } else {
            addr = addr.wrapping_add(value(base));
        }
    } else if rm == 5 && mode == 0 {
        disp32 = true;
    } else {
        addr = value(rm);
    }

    if mode == 1 {
        addr = addr.wrapping_add(fetch_imm(s, mem, 1)?);
    } else if disp32 {
        addr = addr.wrapping_add(fetch_imm(s, mem, 4)?);
    }
    Ok((reg, Operand::Mem(addr)))
}

impl Architecture for X86 {
    type Word = u32;
    type Layout = X86Type;

    const NAME: &'static str = "x86";
    const ARCH: GuestArch = GuestArch::X86;
    const NR_REGS: usize = 9;
    const ZERO_REG: bool = false;

    fn decode_table() -> Result<ArchTable<Self>, DecodeError> {
        use X86Type::*;
        TableBuilder::new(Self::NAME, 16)
            // ALU 组合：00-05, 08-0d, ..., 38-3d
            .pat_w("0000 0000 00?? ?000", "alu", G2E, 1, alu_op)
            .pat("0000 0000 00?? ?001", "alu", G2E, alu_op)
            .pat_w("0000 0000 00?? ?010", "alu", E2G, 1, alu_op)
            .pat("0000 0000 00?? ?011", "alu", E2G, alu_op)
            .pat_w("0000 0000 00?? ?100", "alu", I2a, 1, alu_op)
            .pat("0000 0000 00?? ?101", "alu", I2a, alu_op)
            .pat("0000 0000 0100 0???", "inc", R, inc)
            .pat("0000 0000 0100 1???", "dec", R, dec)
            .pat("0000 0000 0101 0???", "push", R, push)
            .pat("0000 0000 0101 1???", "pop", R, pop)
            .hex("0068", "push", I, push_imm)
            .hex("0069", "imul", E2GI, imul3)
            .hex("006a", "push", I8, push_imm)
            .hex("006b", "imul", E2GI8, imul3)
            .pat("0000 0000 0111 ????", "jcc", J8, jcc)
            .hex_w("0080", "gp1", I2E, 1, gp1)
            .hex("0081", "gp1", I2E, gp1)
            .hex("0083", "gp1", I8E, gp1)
            .hex_w("0084", "test", G2E, 1, test)
            .hex("0085", "test", G2E, test)
            .hex_w("0088", "mov", G2E, 1, mov)
            .hex("0089", "mov", G2E, mov)
            .hex_w("008a", "mov", E2G, 1, mov)
            .hex("008b", "mov", E2G, mov)
            .hex("008d", "lea", E2G, lea)
            .hex("008f", "pop", E, pop)
            .hex("0090", "nop", N, nop)
            .hex("0098", "cwtl", N, cwtl)
            .hex("0099", "cltd", N, cltd)
            .hex_w("00a0", "mov", O2a, 1, mov)
            .hex("00a1", "mov", O2a, mov)
            .hex_w("00a2", "mov", A2o, 1, mov)
            .hex("00a3", "mov", A2o, mov)
            .hex_w("00a8", "test", I2a, 1, test)
            .hex("00a9", "test", I2a, test)
            .pat_w("0000 0000 1011 0???", "mov", I2r, 1, mov)
            .pat("0000 0000 1011 1???", "mov", I2r, mov)
            .hex_w("00c0", "gp2", I8E, 1, gp2)
            .hex("00c1", "gp2", I8E, gp2)
            .hex("00c2", "ret", I16, ret_imm)
            .hex("00c3", "ret", N, ret)
            .hex_w("00c6", "mov", I2E, 1, mov)
            .hex("00c7", "mov", I2E, mov)
            .hex("00c9", "leave", N, leave)
            .hex("00cc", "int3", N, int3)
            .hex_w("00d0", "gp2", E1, 1, gp2)
            .hex("00d1", "gp2", E1, gp2)
            .hex_w("00d2", "gp2", ECl, 1, gp2)
            .hex("00d3", "gp2", ECl, gp2)
            .hex_w("00e4", "in", I8u, 1, in_imm)
            .hex("00e5", "in", I8u, in_imm)
            .hex_w("00e6", "out", I8u, 1, out_imm)
            .hex("00e7", "out", I8u, out_imm)
            .hex("00e8", "call", J, call)
            .hex("00e9", "jmp", J, jmp)
            .hex("00eb", "jmp", J8, jmp)
            .hex_w("00ec", "in", N, 1, in_dx)
            .hex("00ed", "in", N, in_dx)
            .hex_w("00ee", "out", N, 1, out_dx)
            .hex("00ef", "out", N, out_dx)
            .hex_w("00f6", "gp3", Gp3, 1, gp3)
            .hex("00f7", "gp3", Gp3, gp3)
            .hex_w("00fe", "gp4", E, 1, gp4)
            .hex("00ff", "gp5", E, gp5)
            .hex("0f8?", "jcc", J, jcc)
            .hex_w("0f9?", "setcc", E, 1, setcc)
            .hex("0faf", "imul", E2G, imul2)
            .hex("0fb6", "movzx", E2G, movzb)
            .hex("0fb7", "movzx", E2G, movzw)
            .hex("0fbe", "movsx", E2G, movsb)
            .hex("0fbf", "movsx", E2G, movsw)
            .pat(&"?".repeat(16), "inv", N, inv)
            .build()
    }

    fn decode_operands(
        layout: X86Type,
        s: &mut Decode<u32>,
        gpr: &[u32],
        mem: &mut dyn MemoryAccess,
    ) -> VmResult<()> {
        use X86Type::*;
        let w = s.width;
        let low_reg = Operand::Reg((s.inst & 7) as RegId);
        match layout {
            G2E | E2G | E2GI | E2GI8 => {
                let (reg, rm) = decode_modrm(s, gpr, mem)?;
                if layout == G2E {
                    s.dest = rm;
                    s.src1 = Operand::Reg(reg);
                } else {
                    s.dest = Operand::Reg(reg);
                    s.src1 = rm;
                }
                match layout {
                    E2GI => s.src2 = Operand::Imm(fetch_imm(s, mem, w)?),
                    E2GI8 => s.src2 = Operand::Imm(fetch_imm(s, mem, 1)?),
                    _ => {}
                }
            }
            I2E | I8E | E | E1 | ECl | Gp3 => {
                let (reg, rm) = decode_modrm(s, gpr, mem)?;
                s.opcode = reg;
                s.dest = rm;
                s.src1 = match layout {
                    I2E => Operand::Imm(fetch_imm(s, mem, w)?),
                    I8E => Operand::Imm(fetch_imm(s, mem, 1)?),
                    E1 => Operand::Imm(1),
                    ECl => Operand::Reg(ECX),
                    Gp3 if reg == 0 => Operand::Imm(fetch_imm(s, mem, w)?),
                    _ => Operand::None,
                };
            }
            I2a => {
                s.dest = Operand::Reg(EAX);
                s.src1 = Operand::Imm(fetch_imm(s, mem, w)?);
            }
            I2r => {
                s.dest = low_reg;
                s.src1 = Operand::Imm(fetch_imm(s, mem, w)?);
            }
            R => s.dest = low_reg,
            O2a | A2o => {
                let moffs = Operand::Mem(inst_fetch(s, mem, 4)? as u32);
                let acc = Operand::Reg(EAX);
                (s.dest, s.src1) = if layout == O2a { (acc, moffs) } else { (moffs, acc) };
            }
            I => s.src1 = Operand::Imm(fetch_imm(s, mem, w)?),
            I8 => s.src1 = Operand::Imm(fetch_imm(s, mem, 1)?),
            I8u => s.src1 = Operand::Imm(inst_fetch(s, mem, 1)? as u32),
            I16 => s.src1 = Operand::Imm(inst_fetch(s, mem, 2)? as u32),
            J | J8 => {
                let len = if layout == J8 { 1 } else { w };
                let disp = fetch_imm(s, mem, len)?;
                s.dest = Operand::Imm(s.snpc.wrapping_add(disp));
            }
            N => {}
        }
        Ok(())
    }

    fn fetch_decode<'t>(
        table: &'t ArchTable<Self>,
        s: &mut Decode<u32>,
        gpr: &[u32],
        mem: &mut dyn MemoryAccess,
    ) -> VmResult<&'t ArchRow<Self>> {
        let mut op = inst_fetch(s, mem, 1)?;
        while op == OPERAND_SIZE_PREFIX {
            s.width = 2;
            op = inst_fetch(s, mem, 1)?;
        }
        if op == ESCAPE {
            op = (ESCAPE << 8) | inst_fetch(s, mem, 1)?;
        }
        s.inst = op;

        let (idx, row) = table.lookup(op)?;
        s.row = idx;
        if row.width != 0 {
            s.width = row.width;
        }
        Self::decode_operands(row.layout, s, gpr, mem)?;
        s.dnpc = s.snpc;
        Ok(row)
    }

    fn reg_name(idx: usize) -> &'static str {
        REGS.get(idx).copied().unwrap_or("?")
    }

    fn builtin_image() -> Vec<u8> {
        vec![
            0xb9, 0x00, 0x01, 0x00, 0x80, // mov  $0x80000100,%ecx
            0xc7, 0x01, 0x34, 0x12, 0x00, 0x00, // movl $0x1234,(%ecx)
            0x66, 0xc7, 0x41, 0x04, 0xcd, 0xab, // movw $0xabcd,0x4(%ecx)
            0xbb, 0x02, 0x00, 0x00, 0x00, // mov  $0x2,%ebx
            0x8b, 0x01, // mov  (%ecx),%eax
            0x66, 0xc7, 0x84, 0x99, 0xf8, 0xff, 0xff, 0xff, 0x01, 0x00, // movw $0x1,-0x8(%ecx,%ebx,4)
            0x2d, 0x34, 0x12, 0x00, 0x00, // sub  $0x1234,%eax
            0xcc, // int3
        ]
    }
}
