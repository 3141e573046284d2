//! MIPS32（无分支延迟槽）
//!
//! HI/LO 作为第 32、33 号寄存器存放在通用寄存器文件之后。

use vm_core::word::{bits, sext};
use vm_core::{DecodeError, GuestArch, MemoryAccess, VmResult};
use vm_ir::{Decode, Operand, Reg, RegId, RelOp, Rtl, T0};

use crate::table::TableBuilder;
use crate::{ArchTable, Architecture, words_to_bytes};

pub mod encode;

pub const HI: Reg = Reg::Gpr(32);
pub const LO: Reg = Reg::Gpr(33);
/// 停机结果码所在寄存器（v0）
pub const V0: RegId = 2;
const RA: RegId = 31;

const REGS: [&str; 34] = [
    "$0", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7",
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp", "ra",
    "hi", "lo",
];

/// 操作数布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipsType {
    /// dest = rd, src1 = rs, src2 = rt
    R,
    /// dest = rd, src1 = rt, src2 = sa
    Shift,
    /// dest = rt, src1 = rs, src2 = 符号扩展的 imm16
    I,
    /// dest = rt, src1 = rs, src2 = 零扩展的 imm16
    IU,
    /// dest = rt, src1 = imm16 << 16
    Lui,
    /// dest = 跳转目标, src1 = rs, src2 = rt
    B,
    /// dest = 跳转目标
    J,
    N,
}

pub struct Mips32;

fn decode_operands(ty: MipsType, s: &mut Decode<u32>) {
    let i = s.inst;
    let rs = Operand::Reg(bits(i, 25, 21) as RegId);
    let rt = Operand::Reg(bits(i, 20, 16) as RegId);
    let rd = Operand::Reg(bits(i, 15, 11) as RegId);
    let imm = bits(i, 15, 0);

    match ty {
        MipsType::R => {
            s.dest = rd;
            s.src1 = rs;
            s.src2 = rt;
        }
        MipsType::Shift => {
            s.dest = rd;
            s.src1 = rt;
            s.src2 = Operand::Imm(bits(i, 10, 6) as u32);
        }
        MipsType::I => {
            s.dest = rt;
            s.src1 = rs;
            s.src2 = Operand::Imm(sext(imm, 16) as u32);
        }
        MipsType::IU => {
            s.dest = rt;
            s.src1 = rs;
            s.src2 = Operand::Imm(imm as u32);
        }
        MipsType::Lui => {
            s.dest = rt;
            s.src1 = Operand::Imm((imm as u32) << 16);
        }
        MipsType::B => {
            let off = (sext(imm, 16) as u32) << 2;
            s.dest = Operand::Imm(s.pc.wrapping_add(4).wrapping_add(off));
            s.src1 = rs;
            s.src2 = rt;
        }
        MipsType::J => {
            let region = s.pc.wrapping_add(4) & 0xf000_0000;
            s.dest = Operand::Imm(region | ((bits(i, 25, 0) as u32) << 2));
        }
        MipsType::N => {}
    }
}

// ============================================================================
// 执行函数
// ============================================================================

type Ctx<'r, 'a> = &'r mut Rtl<'a, u32>;

fn ops(r: &Rtl<'_, u32>) -> (Reg, Reg, Reg) {
    (r.s.dest.to_reg(), r.s.src1.to_reg(), r.s.src2.to_reg())
}

fn ops_imm(r: &Rtl<'_, u32>) -> (Reg, Reg, u32) {
    (r.s.dest.to_reg(), r.s.src1.to_reg(), r.s.src2.value())
}

fn lui(r: Ctx<'_, '_>) -> VmResult<()> {
    let (rt, imm) = (r.s.dest.to_reg(), r.s.src1.value());
    r.li(rt, imm);
    Ok(())
}

macro_rules! imm_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            fn $name(r: Ctx<'_, '_>) -> VmResult<()> {
                let (d, a, imm) = ops_imm(r);
                r.$op(d, a, imm);
                Ok(())
            }
        )*
    };
}

imm_ops! {
    addiu => addi,
    andi => andi,
    ori => ori,
    xori => xori,
    sll => shli,
    srl => shri,
    sra => sari,
}

fn slti(r: Ctx<'_, '_>) -> VmResult<()> {
    let (d, a, imm) = ops_imm(r);
    r.setrelopi(RelOp::Lt, d, a, imm);
    Ok(())
}

fn sltiu(r: Ctx<'_, '_>) -> VmResult<()> {
    let (d, a, imm) = ops_imm(r);
    r.setrelopi(RelOp::Ltu, d, a, imm);
    Ok(())
}

macro_rules! reg_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            fn $name(r: Ctx<'_, '_>) -> VmResult<()> {
                let (d, a, b) = ops(r);
                r.$op(d, a, b);
                Ok(())
            }
        )*
    };
}

reg_ops! {
    addu => add,
    subu => sub,
    and => and,
    or => or,
    xor => xor,
    mul => mul_lo,
}

fn nor(r: Ctx<'_, '_>) -> VmResult<()> {
    let (d, a, b) = ops(r);
    r.or(d, a, b);
    r.not(d, d);
    Ok(())
}

fn slt(r: Ctx<'_, '_>) -> VmResult<()> {
    let (d, a, b) = ops(r);
    r.setrelop(RelOp::Lt, d, a, b);
    Ok(())
}

fn sltu(r: Ctx<'_, '_>) -> VmResult<()> {
    let (d, a, b) = ops(r);
    r.setrelop(RelOp::Ltu, d, a, b);
    Ok(())
}

// 变量移位：rd = rt op rs
macro_rules! var_shift {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            fn $name(r: Ctx<'_, '_>) -> VmResult<()> {
                let (d, rs, rt) = ops(r);
                r.$op(d, rt, rs);
                Ok(())
            }
        )*
    };
}

var_shift! {
    sllv => shl,
    srlv => shr,
    srav => sar,
}

fn mult(r: Ctx<'_, '_>) -> VmResult<()> {
    let (_, rs, rt) = ops(r);
    r.imul_hi(HI, rs, rt);
    r.imul_lo(LO, rs, rt);
    Ok(())
}

fn multu(r: Ctx<'_, '_>) -> VmResult<()> {
    let (_, rs, rt) = ops(r);
    r.mul_hi(HI, rs, rt);
    r.mul_lo(LO, rs, rt);
    Ok(())
}

// 除数为零时 HI/LO 保持不变

fn div(r: Ctx<'_, '_>) -> VmResult<()> {
    let (_, rs, rt) = ops(r);
    if r.get(rt) == 0 {
        return Ok(());
    }
    r.idiv_q(LO, rs, rt)?;
    r.idiv_r(HI, rs, rt)
}

fn divu(r: Ctx<'_, '_>) -> VmResult<()> {
    let (_, rs, rt) = ops(r);
    if r.get(rt) == 0 {
        return Ok(());
    }
    r.div_q(LO, rs, rt)?;
    r.div_r(HI, rs, rt)
}

fn mfhi(r: Ctx<'_, '_>) -> VmResult<()> {
    let rd = r.s.dest.to_reg();
    r.mv(rd, HI);
    Ok(())
}

fn mflo(r: Ctx<'_, '_>) -> VmResult<()> {
    let rd = r.s.dest.to_reg();
    r.mv(rd, LO);
    Ok(())
}

fn mthi(r: Ctx<'_, '_>) -> VmResult<()> {
    let rs = r.s.src1.to_reg();
    r.mv(HI, rs);
    Ok(())
}

fn mtlo(r: Ctx<'_, '_>) -> VmResult<()> {
    let rs = r.s.src1.to_reg();
    r.mv(LO, rs);
    Ok(())
}

fn movz(r: Ctx<'_, '_>) -> VmResult<()> {
    let (d, rs, rt) = ops(r);
    if r.get(rt) == 0 {
        r.mv(d, rs);
    }
    Ok(())
}

fn movn(r: Ctx<'_, '_>) -> VmResult<()> {
    let (d, rs, rt) = ops(r);
    if r.get(rt) != 0 {
        r.mv(d, rs);
    }
    Ok(())
}

macro_rules! loads {
    ($($name:ident => $op:ident, $len:expr);* $(;)?) => {
        $(
            fn $name(r: Ctx<'_, '_>) -> VmResult<()> {
                let (rt, base, off) = ops_imm(r);
                r.$op(rt, base, off, $len)
            }
        )*
    };
}

loads! {
    lb => lms, 1;
    lh => lms, 2;
    lw => lm, 4;
    lbu => lm, 1;
    lhu => lm, 2;
}

macro_rules! stores {
    ($($name:ident => $len:expr),* $(,)?) => {
        $(
            fn $name(r: Ctx<'_, '_>) -> VmResult<()> {
                let (rt, base, off) = ops_imm(r);
                r.sm(base, off, rt, $len)
            }
        )*
    };
}

stores! {
    sb => 1,
    sh => 2,
    sw => 4,
}

macro_rules! branches {
    ($($name:ident => $relop:ident),* $(,)?) => {
        $(
            fn $name(r: Ctx<'_, '_>) -> VmResult<()> {
                let (target, rs, rt) = (r.s.dest.value(), r.s.src1.to_reg(), r.s.src2.to_reg());
                r.jrelop(RelOp::$relop, rs, rt, target);
                Ok(())
            }
        )*
    };
}

branches! {
    beq => Eq,
    bne => Ne,
}

// 与零比较的分支，rt 字段是操作码的一部分

macro_rules! branches_zero {
    ($($name:ident => $relop:ident),* $(,)?) => {
        $(
            fn $name(r: Ctx<'_, '_>) -> VmResult<()> {
                let (target, rs) = (r.s.dest.value(), r.s.src1.to_reg());
                r.jrelop(RelOp::$relop, rs, Reg::Zero, target);
                Ok(())
            }
        )*
    };
}

branches_zero! {
    blez => Le,
    bgtz => Gt,
    bltz => Lt,
    bgez => Ge,
}

fn j(r: Ctx<'_, '_>) -> VmResult<()> {
    let target = r.s.dest.value();
    r.j(target);
    Ok(())
}

fn jal(r: Ctx<'_, '_>) -> VmResult<()> {
    let target = r.s.dest.value();
    let link = r.s.snpc;
    r.li(Reg::Gpr(RA), link);
    r.j(target);
    Ok(())
}

fn jr(r: Ctx<'_, '_>) -> VmResult<()> {
    let rs = r.s.src1.to_reg();
    r.jr(rs);
    Ok(())
}

fn jalr(r: Ctx<'_, '_>) -> VmResult<()> {
    let (rd, rs) = (r.s.dest.to_reg(), r.s.src1.to_reg());
    r.mv(T0, rs);
    let link = r.s.snpc;
    r.li(rd, link);
    r.jr(T0);
    Ok(())
}

fn sdbbp(r: Ctx<'_, '_>) -> VmResult<()> {
    r.exit(Reg::Gpr(V0));
    Ok(())
}

fn inv(r: Ctx<'_, '_>) -> VmResult<()> {
    r.inv();
    Ok(())
}

impl Architecture for Mips32 {
    type Word = u32;
    type Layout = MipsType;

    const NAME: &'static str = "mips32";
    const ARCH: GuestArch = GuestArch::Mips32;
    const NR_REGS: usize = 34;
    const ZERO_REG: bool = true;

    fn decode_table() -> Result<ArchTable<Self>, DecodeError> {
        use MipsType::*;
        TableBuilder::new(Self::NAME, 32)
            .pat("001111 ????? ????? ????? ????? ??????", "lui", Lui, lui)
            .pat("001001 ????? ????? ????? ????? ??????", "addiu", I, addiu)
            .pat("001010 ????? ????? ????? ????? ??????", "slti", I, slti)
            .pat("001011 ????? ????? ????? ????? ??????", "sltiu", I, sltiu)
            .pat("001100 ????? ????? ????? ????? ??????", "andi", IU, andi)
            .pat("001101 ????? ????? ????? ????? ??????", "ori", IU, ori)
            .pat("001110 ????? ????? ????? ????? ??????", "xori", IU, xori)
            .pat("100000 ????? ????? ????? ????? ??????", "lb", I, lb)
            .pat("100001 ????? ????? ????? ????? ??????", "lh", I, lh)
            .pat("100011 ????? ????? ????? ????? ??????", "lw", I, lw)
            .pat("100100 ????? ????? ????? ????? ??????", "lbu", I, lbu)
            .pat("100101 ????? ????? ????? ????? ??????", "lhu", I, lhu)
            .pat("101000 ????? ????? ????? ????? ??????", "sb", I, sb)
            .pat("101001 ????? ????? ????? ????? ??????", "sh", I, sh)
            .pat("101011 ????? ????? ????? ????? ??????", "sw", I, sw)
            .pat("000100 ????? ????? ????? ????? ??????", "beq", B, beq)
            .pat("000101 ????? ????? ????? ????? ??????", "bne", B, bne)
            .pat("000110 ????? 00000 ????? ????? ??????", "blez", B, blez)
            .pat("000111 ????? 00000 ????? ????? ??????", "bgtz", B, bgtz)
            .pat("000001 ????? 00000 ????? ????? ??????", "bltz", B, bltz)
            .pat("000001 ????? 00001 ????? ????? ??????", "bgez", B, bgez)
            .pat("000010 ????? ????? ????? ????? ??????", "j", J, j)
            .pat("000011 ????? ????? ????? ????? ??????", "jal", J, jal)
            .pat("000000 00000 ????? ????? ????? 000000", "sll", Shift, sll)
            .pat("000000 00000 ????? ????? ????? 000010", "srl", Shift, srl)
            .pat("000000 00000 ????? ????? ????? 000011", "sra", Shift, sra)
            .pat("000000 ????? ????? ????? 00000 000100", "sllv", R, sllv)
            .pat("000000 ????? ????? ????? 00000 000110", "srlv", R, srlv)
            .pat("000000 ????? ????? ????? 00000 000111", "srav", R, srav)
            .pat("000000 ????? 00000 00000 ????? 001000", "jr", R, jr)
            .pat("000000 ????? 00000 ????? ????? 001001", "jalr", R, jalr)
            .pat("000000 ????? ????? ????? 00000 001010", "movz", R, movz)
            .pat("000000 ????? ????? ????? 00000 001011", "movn", R, movn)
            .pat("000000 00000 00000 ????? 00000 010000", "mfhi", R, mfhi)
            .pat("000000 ????? 00000 00000 00000 010001", "mthi", R, mthi)
            .pat("000000 00000 00000 ????? 00000 010010", "mflo", R, mflo)
            .pat("000000 ????? 00000 00000 00000 010011", "mtlo", R, mtlo)
            .pat("000000 ????? ????? 00000 00000 011000", "mult", R, mult)
            .pat("000000 ????? ????? 00000 00000 011001", "multu", R, multu)
            .pat("000000 ????? ????? 00000 00000 011010", "div", R, div)
            .pat("000000 ????? ????? 00000 00000 011011", "divu", R, divu)
            .pat("000000 ????? ????? ????? 00000 100001", "addu", R, addu)
            .pat("000000 ????? ????? ????? 00000 100011", "subu", R, subu)
            .pat("000000 ????? ????? ????? 00000 100100", "and", R, and)
            .pat("000000 ????? ????? ????? 00000 100101", "or", R, or)
            .pat("000000 ????? ????? ????? 00000 100110", "xor", R, xor)
            .pat("000000 ????? ????? ????? 00000 100111", "nor", R, nor)
            .pat("000000 ????? ????? ????? 00000 101010", "slt", R, slt)
            .pat("000000 ????? ????? ????? 00000 101011", "sltu", R, sltu)
            .pat("011100 ????? ????? ????? 00000 000010", "mul", R, mul)
            .pat("011100 ????? ????? ????? ????? 111111", "sdbbp", N, sdbbp)
            .pat(&"?".repeat(32), "inv", N, inv)
            .build()
    }

    fn decode_operands(
        layout: MipsType,
        s: &mut Decode<u32>,
        _gpr: &[u32],
        _mem: &mut dyn MemoryAccess,
    ) -> VmResult<()> {
        decode_operands(layout, s);
        Ok(())
    }

    fn reg_name(idx: usize) -> &'static str {
        REGS.get(idx).copied().unwrap_or("?")
    }

    fn builtin_image() -> Vec<u8> {
        words_to_bytes(&[
            0x3c04_8000, // lui   a0,0x8000
            0xac80_0000, // sw    zero,0(a0)
            0x8c82_0000, // lw    v0,0(a0)
            0x7000_003f, // sdbbp
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::encode::*;
    use super::*;

    fn name_of(inst: u32) -> &'static str {
        let table = Mips32::decode_table().unwrap();
        table.lookup(inst as u64).unwrap().1.name
    }

    #[test]
    fn test_table_names() {
        assert_eq!(name_of(encode_lui(4, 0x8000)), "lui");
        assert_eq!(name_of(encode_sll(0, 0, 0)), "sll");
        assert_eq!(name_of(encode_bgez(3, 4)), "bgez");
        assert_eq!(name_of(encode_bltz(3, 4)), "bltz");
        assert_eq!(name_of(encode_mul(1, 2, 3)), "mul");
        assert_eq!(name_of(encode_sdbbp()), "sdbbp");
        assert_eq!(name_of(0xffff_ffff), "inv");
    }

    #[test]
    fn test_branch_targets_skip_delay_slot_offset() {
        let mut s = Decode::<u32>::new(0x8000_0100);
        s.inst = encode_beq(1, 2, -2) as u64;
        decode_operands(MipsType::B, &mut s);
        assert_eq!(s.dest.value(), 0x8000_00fc);

        s.inst = encode_j(0x0000_0100) as u64;
        decode_operands(MipsType::J, &mut s);
        assert_eq!(s.dest.value(), 0x8000_0100);
    }

    #[test]
    fn test_immediate_extension() {
        let mut s = Decode::<u32>::new(0);
        s.inst = encode_addiu(1, 2, -1) as u64;
        decode_operands(MipsType::I, &mut s);
        assert_eq!(s.src2.value(), 0xffff_ffff);
        decode_operands(MipsType::IU, &mut s);
        assert_eq!(s.src2.value(), 0xffff);
    }

    #[test]
    fn test_reg_names() {
        assert_eq!(Mips32::reg_name(2), "v0");
        assert_eq!(Mips32::reg_name(32), "hi");
        assert_eq!(crate::reg_by_name::<Mips32>("lo"), Some(33));
    }
}
