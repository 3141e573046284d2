//! LoongArch32 Reduced

use vm_core::word::{bits, sext};
use vm_core::{DecodeError, GuestArch, MemoryAccess, VmResult};
use vm_ir::{Decode, Operand, Reg, RegId, RelOp, Rtl, T0};

use crate::table::TableBuilder;
use crate::{ArchTable, Architecture, words_to_bytes};

pub mod encode;

/// 停机结果码所在寄存器（a0）
pub const A0: RegId = 4;
const RA: RegId = 1;

const REGS: [&str; 32] = [
    "$0", "ra", "tp", "sp", "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7", "t0", "t1", "t2", "t3",
    "t4", "t5", "t6", "t7", "t8", "r21", "fp", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8",
];

/// 操作数布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaType {
    /// dest = rd, src1 = rj, src2 = rk
    R3,
    /// dest = rd, src1 = rj, src2 = 符号扩展 si12
    R2I12,
    /// dest = rd, src1 = rj, src2 = 零扩展 ui12
    R2UI12,
    /// dest = rd, src1 = rj, src2 = ui5
    R2UI5,
    /// dest = rd, src1 = si20 << 12
    R1I20,
    /// dest = 跳转目标, src1 = rj, src2 = rd
    Br,
    /// dest = rd, src1 = rj, src2 = offs16 << 2
    Jirl,
    /// dest = 跳转目标
    I26,
    N,
}

pub struct LoongArch32r;

fn decode_operands(ty: LaType, s: &mut Decode<u32>) {
    let i = s.inst;
    let rd = Operand::Reg(bits(i, 4, 0) as RegId);
    let rj = Operand::Reg(bits(i, 9, 5) as RegId);
    let rk = Operand::Reg(bits(i, 14, 10) as RegId);
    let offs16 = || sext(bits(i, 25, 10) << 2, 18) as u32;

    match ty {
        LaType::R3 => {
            s.dest = rd;
            s.src1 = rj;
            s.src2 = rk;
        }
        LaType::R2I12 => {
            s.dest = rd;
            s.src1 = rj;
            s.src2 = Operand::Imm(sext(bits(i, 21, 10), 12) as u32);
        }
        LaType::R2UI12 => {
            s.dest = rd;
            s.src1 = rj;
            s.src2 = Operand::Imm(bits(i, 21, 10) as u32);
        }
        LaType::R2UI5 => {
            s.dest = rd;
            s.src1 = rj;
            s.src2 = Operand::Imm(bits(i, 14, 10) as u32);
        }
        LaType::R1I20 => {
            s.dest = rd;
            s.src1 = Operand::Imm((bits(i, 24, 5) as u32) << 12);
        }
        LaType::Br => {
            s.dest = Operand::Imm(s.pc.wrapping_add(offs16()));
            s.src1 = rj;
            s.src2 = rd;
        }
        LaType::Jirl => {
            s.dest = rd;
            s.src1 = rj;
            s.src2 = Operand::Imm(offs16());
        }
        LaType::I26 => {
            let offs = (bits(i, 9, 0) << 16) | bits(i, 25, 10);
            s.dest = Operand::Imm(s.pc.wrapping_add(sext(offs << 2, 28) as u32));
        }
        LaType::N => {}
    }
}

// ============================================================================
// 执行函数
// ============================================================================

fn ops(r: &Rtl<'_, u32>) -> (Reg, Reg, Reg) {
    (r.s.dest.to_reg(), r.s.src1.to_reg(), r.s.src2.to_reg())
}

fn ops_imm(r: &Rtl<'_, u32>) -> (Reg, Reg, u32) {
    (r.s.dest.to_reg(), r.s.src1.to_reg(), r.s.src2.value())
}

fn lu12i_w(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let (rd, imm) = (r.s.dest.to_reg(), r.s.src1.value());
    r.li(rd, imm);
    Ok(())
}

fn pcaddu12i(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let (rd, imm) = (r.s.dest.to_reg(), r.s.src1.value());
    let v = r.s.pc.wrapping_add(imm);
    r.li(rd, v);
    Ok(())
}

macro_rules! reg_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            fn $name(r: &mut Rtl<'_, u32>) -> VmResult<()> {
                let (d, a, b) = ops(r);
                r.$op(d, a, b);
                Ok(())
            }
        )*
    };
}

reg_ops! {
    add_w => add,
    sub_w => sub,
    and => and,
    or => or,
    xor => xor,
    sll_w => shl,
    srl_w => shr,
    sra_w => sar,
    mul_w => mul_lo,
    mulh_w => imul_hi,
    mulh_wu => mul_hi,
}

macro_rules! imm_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            fn $name(r: &mut Rtl<'_, u32>) -> VmResult<()> {
                let (d, a, imm) = ops_imm(r);
                r.$op(d, a, imm);
                Ok(())
            }
        )*
    };
}

imm_ops! {
    addi_w => addi,
    andi => andi,
    ori => ori,
    xori => xori,
    slli_w => shli,
    srli_w => shri,
    srai_w => sari,
}

fn nor(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let (d, a, b) = ops(r);
    r.or(d, a, b);
    r.not(d, d);
    Ok(())
}

fn slt(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let (d, a, b) = ops(r);
    r.setrelop(RelOp::Lt, d, a, b);
    Ok(())
}

fn sltu(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let (d, a, b) = ops(r);
    r.setrelop(RelOp::Ltu, d, a, b);
    Ok(())
}

fn slti(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let (d, a, imm) = ops_imm(r);
    r.setrelopi(RelOp::Lt, d, a, imm);
    Ok(())
}

fn sltui(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let (d, a, imm) = ops_imm(r);
    r.setrelopi(RelOp::Ltu, d, a, imm);
    Ok(())
}

// 除数为零时结果写 0

macro_rules! div_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            fn $name(r: &mut Rtl<'_, u32>) -> VmResult<()> {
                let (d, a, b) = ops(r);
                if r.get(b) == 0 {
                    r.li(d, 0);
                    return Ok(());
                }
                r.$op(d, a, b)
            }
        )*
    };
}

div_ops! {
    div_w => idiv_q,
    mod_w => idiv_r,
    div_wu => div_q,
    mod_wu => div_r,
}

macro_rules! loads {
    ($($name:ident => $op:ident, $len:expr);* $(;)?) => {
        $(
            fn $name(r: &mut Rtl<'_, u32>) -> VmResult<()> {
                let (rd, base, off) = ops_imm(r);
                r.$op(rd, base, off, $len)
            }
        )*
    };
}

loads! {
    ld_b => lms, 1;
    ld_h => lms, 2;
    ld_w => lm, 4;
    ld_bu => lm, 1;
    ld_hu => lm, 2;
}

macro_rules! stores {
    ($($name:ident => $len:expr),* $(,)?) => {
        $(
            fn $name(r: &mut Rtl<'_, u32>) -> VmResult<()> {
                let (rd, base, off) = ops_imm(r);
                r.sm(base, off, rd, $len)
            }
        )*
    };
}

stores! {
    st_b => 1,
    st_h => 2,
    st_w => 4,
}

macro_rules! branches {
    ($($name:ident => $relop:ident),* $(,)?) => {
        $(
            fn $name(r: &mut Rtl<'_, u32>) -> VmResult<()> {
                let (target, rj, rd) = (r.s.dest.value(), r.s.src1.to_reg(), r.s.src2.to_reg());
                r.jrelop(RelOp::$relop, rj, rd, target);
                Ok(())
            }
        )*
    };
}

branches! {
    beq => Eq,
    bne => Ne,
    blt => Lt,
    bge => Ge,
    bltu => Ltu,
    bgeu => Geu,
}

fn jirl(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let (rd, rj, off) = ops_imm(r);
    r.addi(T0, rj, off);
    let link = r.s.snpc;
    r.li(rd, link);
    r.jr(T0);
    Ok(())
}

fn b(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let target = r.s.dest.value();
    r.j(target);
    Ok(())
}

fn bl(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    let target = r.s.dest.value();
    let link = r.s.snpc;
    r.li(Reg::Gpr(RA), link);
    r.j(target);
    Ok(())
}

fn brk(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    r.exit(Reg::Gpr(A0));
    Ok(())
}

fn inv(r: &mut Rtl<'_, u32>) -> VmResult<()> {
    r.inv();
    Ok(())
}

impl Architecture for LoongArch32r {
    type Word = u32;
    type Layout = LaType;

    const NAME: &'static str = "loongarch32r";
    const ARCH: GuestArch = GuestArch::LoongArch32r;
    const NR_REGS: usize = 32;
    const ZERO_REG: bool = true;

    fn decode_table() -> Result<ArchTable<Self>, DecodeError> {
        use LaType::*;
        TableBuilder::new(Self::NAME, 32)
            .pat("0001010 ???????????????????? ?????", "lu12i.w", R1I20, lu12i_w)
            .pat("0001110 ???????????????????? ?????", "pcaddu12i", R1I20, pcaddu12i)
            .pat("00000000000100000 ????? ????? ?????", "add.w", R3, add_w)
            .pat("00000000000100010 ????? ????? ?????", "sub.w", R3, sub_w)
            .pat("00000000000100100 ????? ????? ?????", "slt", R3, slt)
            .pat("00000000000100101 ????? ????? ?????", "sltu", R3, sltu)
            .pat("00000000000101000 ????? ????? ?????", "nor", R3, nor)
            .pat("00000000000101001 ????? ????? ?????", "and", R3, and)
            .pat("00000000000101010 ????? ????? ?????", "or", R3, or)
            .pat("00000000000101011 ????? ????? ?????", "xor", R3, xor)
            .pat("00000000000101110 ????? ????? ?????", "sll.w", R3, sll_w)
            .pat("00000000000101111 ????? ????? ?????", "srl.w", R3, srl_w)
            .pat("00000000000110000 ????? ????? ?????", "sra.w", R3, sra_w)
            .pat("00000000000111000 ????? ????? ?????", "mul.w", R3, mul_w)
            .pat("00000000000111001 ????? ????? ?????", "mulh.w", R3, mulh_w)
            .pat("00000000000111010 ????? ????? ?????", "mulh.wu", R3, mulh_wu)
            .pat("00000000001000000 ????? ????? ?????", "div.w", R3, div_w)
            .pat("00000000001000001 ????? ????? ?????", "mod.w", R3, mod_w)
            .pat("00000000001000010 ????? ????? ?????", "div.wu", R3, div_wu)
            .pat("00000000001000011 ????? ????? ?????", "mod.wu", R3, mod_wu)
            .pat("00000000001010100 ???????????????", "break", N, brk)
            .pat("00000000010000001 ????? ????? ?????", "slli.w", R2UI5, slli_w)
            .pat("00000000010001001 ????? ????? ?????", "srli.w", R2UI5, srli_w)
            .pat("00000000010010001 ????? ????? ?????", "srai.w", R2UI5, srai_w)
            .pat("0000001000 ???????????? ????? ?????", "slti", R2I12, slti)
            .pat("0000001001 ???????????? ????? ?????", "sltui", R2I12, sltui)
            .pat("0000001010 ???????????? ????? ?????", "addi.w", R2I12, addi_w)
            .pat("0000001101 ???????????? ????? ?????", "andi", R2UI12, andi)
            .pat("0000001110 ???????????? ????? ?????", "ori", R2UI12, ori)
            .pat("0000001111 ???????????? ????? ?????", "xori", R2UI12, xori)
            .pat("0010100000 ???????????? ????? ?????", "ld.b", R2I12, ld_b)
            .pat("0010100001 ???????????? ????? ?????", "ld.h", R2I12, ld_h)
            .pat("0010100010 ???????????? ????? ?????", "ld.w", R2I12, ld_w)
            .pat("0010100100 ???????????? ????? ?????", "st.b", R2I12, st_b)
            .pat("0010100101 ???????????? ????? ?????", "st.h", R2I12, st_h)
            .pat("0010100110 ???????????? ????? ?????", "st.w", R2I12, st_w)
            .pat("0010101000 ???????????? ????? ?????", "ld.bu", R2I12, ld_bu)
            .pat("0010101001 ???????????? ????? ?????", "ld.hu", R2I12, ld_hu)
            .pat("010011 ???????????????? ????? ?????", "jirl", Jirl, jirl)
            .pat("010100 ???????????????? ??????????", "b", I26, b)
            .pat("010101 ???????????????? ??????????", "bl", I26, bl)
            .pat("010110 ???????????????? ????? ?????", "beq", Br, beq)
            .pat("010111 ???????????????? ????? ?????", "bne", Br, bne)
            .pat("011000 ???????????????? ????? ?????", "blt", Br, blt)
            .pat("011001 ???????????????? ????? ?????", "bge", Br, bge)
            .pat("011010 ???????????????? ????? ?????", "bltu", Br, bltu)
            .pat("011011 ???????????????? ????? ?????", "bgeu", Br, bgeu)
            .pat(&"?".repeat(32), "inv", N, inv)
            .build()
    }

    fn decode_operands(
        layout: LaType,
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
            0x1c00_000c, // pcaddu12i t0,0
            0x2980_4180, // st.w zero,t0,16
            0x2880_4184, // ld.w a0,t0,16
            0x002a_0000, // break 0
            0xdead_beef,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::encode::*;
    use super::*;

    fn name_of(inst: u32) -> &'static str {
        let table = LoongArch32r::decode_table().unwrap();
        table.lookup(inst as u64).unwrap().1.name
    }

    #[test]
    fn test_table_names() {
        assert_eq!(name_of(0x1c00_000c), "pcaddu12i");
        assert_eq!(name_of(0x2980_4180), "st.w");
        assert_eq!(name_of(0x2880_4184), "ld.w");
        assert_eq!(name_of(0x002a_0000), "break");
        assert_eq!(name_of(encode_add_w(1, 2, 3)), "add.w");
        assert_eq!(name_of(encode_srai_w(1, 2, 31)), "srai.w");
        assert_eq!(name_of(encode_bl(8)), "bl");
        assert_eq!(name_of(0), "inv");
    }

    #[test]
    fn test_branch_offsets() {
        let mut s = Decode::<u32>::new(0x1c00_0010);
        s.inst = encode_beq(4, 5, -8) as u64;
        decode_operands(LaType::Br, &mut s);
        assert_eq!(s.dest.value(), 0x1c00_0008);
        assert_eq!(s.src1.reg(), Some(4));
        assert_eq!(s.src2.reg(), Some(5));

        s.inst = encode_b(-0x10) as u64;
        decode_operands(LaType::I26, &mut s);
        assert_eq!(s.dest.value(), 0x1c00_0000);

        s.inst = encode_b(0x0100_0000) as u64;
        decode_operands(LaType::I26, &mut s);
        assert_eq!(s.dest.value(), 0x1d00_0010);
    }

    #[test]
    fn test_immediate_extension() {
        let mut s = Decode::<u32>::new(0);
        s.inst = encode_addi_w(1, 2, -1) as u64;
        decode_operands(LaType::R2I12, &mut s);
        assert_eq!(s.src2.value(), 0xffff_ffff);
        decode_operands(LaType::R2UI12, &mut s);
        assert_eq!(s.src2.value(), 0xfff);

        s.inst = encode_lu12i_w(1, -1) as u64;
        decode_operands(LaType::R1I20, &mut s);
        assert_eq!(s.src1.value(), 0xffff_f000);
    }
}
