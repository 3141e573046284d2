//! RISC-V（RV32IM / RV64IM）
//!
//! 两种字长共用操作数布局与执行函数，只在解码表上有差别：RV64 的移位
//! 立即数为 6 位，并额外带有 `*W` 指令与双字访存。
//!
//! 位编号约定：bit 0 为最低位，`bits(inst, hi, lo)` 取闭区间 `[lo, hi]`。

use vm_core::word::{bits, sext};
use vm_core::{DecodeError, GuestWord, VmResult};
use vm_ir::{Decode, Operand, Reg, RegId, RelOp, Rtl, S0, S1, T0};

use crate::table::{DecodeTable, TableBuilder};

pub mod encode;
#[cfg(feature = "riscv32")]
pub mod rv32;
#[cfg(feature = "riscv64")]
pub mod rv64;

pub use encode::*;
#[cfg(feature = "riscv32")]
pub use rv32::Riscv32;
#[cfg(feature = "riscv64")]
pub use rv64::Riscv64;

const REGS: [&str; 32] = [
    "$0", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

/// 停机结果码所在寄存器（a0）
pub const A0: RegId = 10;

pub(crate) fn reg_name(idx: usize) -> &'static str {
    REGS.get(idx).copied().unwrap_or("?")
}

/// 指令格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RvType {
    R,
    I,
    S,
    B,
    U,
    J,
    N,
}

/// 操作数槽位：
/// - R: dest = rd, src1 = rs1, src2 = rs2
/// - I: dest = rd, src1 = rs1, src2 = imm
/// - S: dest = 偏移, src1 = rs1, src2 = rs2
/// - B: dest = 跳转目标, src1 = rs1, src2 = rs2
/// - U: dest = rd, src1 = imm << 12
/// - J: dest = rd, src1 = 跳转目标
pub(crate) fn decode_operands<W: GuestWord>(ty: RvType, s: &mut Decode<W>) {
    let i = s.inst;
    let rd = Operand::Reg(bits(i, 11, 7) as RegId);
    let rs1 = Operand::Reg(bits(i, 19, 15) as RegId);
    let rs2 = Operand::Reg(bits(i, 24, 20) as RegId);
    let imm = |v: u64, width: u32| W::from_i64(sext(v, width));

    match ty {
        RvType::R => {
            s.dest = rd;
            s.src1 = rs1;
            s.src2 = rs2;
        }
        RvType::I => {
            s.dest = rd;
            s.src1 = rs1;
            s.src2 = Operand::Imm(imm(bits(i, 31, 20), 12));
        }
        RvType::S => {
            let off = (bits(i, 31, 25) << 5) | bits(i, 11, 7);
            s.dest = Operand::Imm(imm(off, 12));
            s.src1 = rs1;
            s.src2 = rs2;
        }
        RvType::B => {
            let off = (bits(i, 31, 31) << 12)
                | (bits(i, 7, 7) << 11)
                | (bits(i, 30, 25) << 5)
                | (bits(i, 11, 8) << 1);
            s.dest = Operand::Imm(s.pc.wrapping_add(imm(off, 13)));
            s.src1 = rs1;
            s.src2 = rs2;
        }
        RvType::U => {
            s.dest = rd;
            s.src1 = Operand::Imm(imm(bits(i, 31, 12) << 12, 32));
        }
        RvType::J => {
            let off = (bits(i, 31, 31) << 20)
                | (bits(i, 19, 12) << 12)
                | (bits(i, 20, 20) << 11)
                | (bits(i, 30, 21) << 1);
            s.dest = rd;
            s.src1 = Operand::Imm(s.pc.wrapping_add(imm(off, 21)));
        }
        RvType::N => {}
    }
}

// ============================================================================
// 执行函数
// ============================================================================


#[inline]
fn rrr<W: GuestWord>(r: &Rtl<'_, W>) -> (Reg, Reg, Reg) {
    (r.s.dest.to_reg(), r.s.src1.to_reg(), r.s.src2.to_reg())
}

#[inline]
fn rri<W: GuestWord>(r: &Rtl<'_, W>) -> (Reg, Reg, W) {
    (r.s.dest.to_reg(), r.s.src1.to_reg(), r.s.src2.value())
}

/// 访存：(基址, 偏移, 数据寄存器)
#[inline]
fn mem_operands<W: GuestWord>(r: &Rtl<'_, W>) -> (Reg, W, Reg) {
    (r.s.src1.to_reg(), r.s.dest.value(), r.s.src2.to_reg())
}

pub(crate) fn lui<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, imm) = (r.s.dest.to_reg(), r.s.src1.value());
    r.li(rd, imm);
    Ok(())
}

pub(crate) fn auipc<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, imm) = (r.s.dest.to_reg(), r.s.src1.value());
    let v = r.s.pc.wrapping_add(imm);
    r.li(rd, v);
    Ok(())
}

pub(crate) fn jal<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, target) = (r.s.dest.to_reg(), r.s.src1.value());
    let link = r.s.snpc;
    r.li(rd, link);
    r.j(target);
    Ok(())
}

pub(crate) fn jalr<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, imm) = rri(r);
    r.addi(T0, rs1, imm);
    r.andi(T0, T0, W::from_i64(-2));
    let link = r.s.snpc;
    r.li(rd, link);
    r.jr(T0);
    Ok(())
}

macro_rules! branch {
    ($($name:ident => $relop:ident),* $(,)?) => {
        $(
            pub(crate) fn $name<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
                let (target, rs1, rs2) = (r.s.dest.value(), r.s.src1.to_reg(), r.s.src2.to_reg());
                r.jrelop(RelOp::$relop, rs1, rs2, target);
                Ok(())
            }
        )*
    };
}

branch! {
    beq => Eq,
    bne => Ne,
    blt => Lt,
    bge => Ge,
    bltu => Ltu,
    bgeu => Geu,
}

macro_rules! load {
    ($($name:ident => $op:ident, $len:expr);* $(;)?) => {
        $(
            pub(crate) fn $name<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
                let (rd, rs1, imm) = rri(r);
                r.$op(rd, rs1, imm, $len)
            }
        )*
    };
}

load! {
    lb => lms, 1;
    lh => lms, 2;
    lw => lms, 4;
    ld => lm, 8;
    lbu => lm, 1;
    lhu => lm, 2;
    lwu => lm, 4;
}

macro_rules! store {
    ($($name:ident => $len:expr),* $(,)?) => {
        $(
            pub(crate) fn $name<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
                let (base, off, src) = mem_operands(r);
                r.sm(base, off, src, $len)
            }
        )*
    };
}

store! {
    sb => 1,
    sh => 2,
    sw => 4,
    sd => 8,
}

macro_rules! alu_imm {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub(crate) fn $name<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
                let (rd, rs1, imm) = rri(r);
                r.$op(rd, rs1, imm);
                Ok(())
            }
        )*
    };
}

alu_imm! {
    addi => addi,
    xori => xori,
    ori => ori,
    andi => andi,
    slli => shli,
    srli => shri,
    srai => sari,
    addiw => addiw,
    slliw => shliw,
    srliw => shriw,
    sraiw => sariw,
}

pub(crate) fn slti<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, imm) = rri(r);
    r.setrelopi(RelOp::Lt, rd, rs1, imm);
    Ok(())
}

pub(crate) fn sltiu<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, imm) = rri(r);
    r.setrelopi(RelOp::Ltu, rd, rs1, imm);
    Ok(())
}

macro_rules! alu_reg {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub(crate) fn $name<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
                let (rd, rs1, rs2) = rrr(r);
                r.$op(rd, rs1, rs2);
                Ok(())
            }
        )*
    };
}

alu_reg! {
    add => add,
    sub => sub,
    sll => shl,
    xor => xor,
    srl => shr,
    sra => sar,
    or => or,
    and => and,
    addw => addw,
    subw => subw,
    sllw => shlw,
    srlw => shrw,
    sraw => sarw,
    mul => mul_lo,
    mulh => imul_hi,
    mulhu => mul_hi,
    mulw => mulw,
}

pub(crate) fn slt<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    r.setrelop(RelOp::Lt, rd, rs1, rs2);
    Ok(())
}

pub(crate) fn sltu<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    r.setrelop(RelOp::Ltu, rd, rs1, rs2);
    Ok(())
}

/// 有符号乘无符号的高半部分：`mulhu(a, b) - (a < 0 ? b : 0)`
pub(crate) fn mulhsu<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    r.mul_hi(S0, rs1, rs2);
    r.sari(S1, rs1, W::from_u64(W::BITS as u64 - 1));
    r.and(S1, S1, rs2);
    r.sub(rd, S0, S1);
    Ok(())
}

// Division by zero yields all ones for quotients and the dividend for
// remainders; MIN / -1 wraps.

pub(crate) fn div<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    if r.get(rs2) == W::ZERO {
        r.li(rd, W::ONES);
        return Ok(());
    }
    r.idiv_q(rd, rs1, rs2)
}

pub(crate) fn divu<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    if r.get(rs2) == W::ZERO {
        r.li(rd, W::ONES);
        return Ok(());
    }
    r.div_q(rd, rs1, rs2)
}

pub(crate) fn rem<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    if r.get(rs2) == W::ZERO {
        r.mv(rd, rs1);
        return Ok(());
    }
    r.idiv_r(rd, rs1, rs2)
}

pub(crate) fn remu<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    if r.get(rs2) == W::ZERO {
        r.mv(rd, rs1);
        return Ok(());
    }
    r.div_r(rd, rs1, rs2)
}

fn low_word_is_zero<W: GuestWord>(r: &Rtl<'_, W>, reg: Reg) -> bool {
    r.get(reg).as_u64() as u32 == 0
}

pub(crate) fn divw<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    if low_word_is_zero(r, rs2) {
        r.li(rd, W::ONES);
        return Ok(());
    }
    r.divw(rd, rs1, rs2)
}

pub(crate) fn divuw<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    if low_word_is_zero(r, rs2) {
        r.li(rd, W::ONES);
        return Ok(());
    }
    r.divuw(rd, rs1, rs2)
}

pub(crate) fn remw<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    if low_word_is_zero(r, rs2) {
        r.sext(rd, rs1, 4);
        return Ok(());
    }
    r.remw(rd, rs1, rs2)
}

pub(crate) fn remuw<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    let (rd, rs1, rs2) = rrr(r);
    if low_word_is_zero(r, rs2) {
        r.sext(rd, rs1, 4);
        return Ok(());
    }
    r.remuw(rd, rs1, rs2)
}

pub(crate) fn fence<W: GuestWord>(_r: &mut Rtl<'_, W>) -> VmResult<()> {
    Ok(())
}

pub(crate) fn ebreak<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    r.exit(Reg::Gpr(A0));
    Ok(())
}

pub(crate) fn inv<W: GuestWord>(r: &mut Rtl<'_, W>) -> VmResult<()> {
    r.inv();
    Ok(())
}

// ============================================================================
// 公共表项
// ============================================================================


/// RV32I/RV64I 与 M 扩展共有的指令，不含移位立即数和 `*W` 指令
pub(crate) fn base_rows<W: GuestWord>(b: TableBuilder<W, RvType>) -> TableBuilder<W, RvType> {
    use RvType::*;
    b.pat("??????? ????? ????? ??? ????? 01101 11", "lui", U, lui)
        .pat("??????? ????? ????? ??? ????? 00101 11", "auipc", U, auipc)
        .pat("??????? ????? ????? ??? ????? 11011 11", "jal", J, jal)
        .pat("??????? ????? ????? 000 ????? 11001 11", "jalr", I, jalr)
        .pat("??????? ????? ????? 000 ????? 11000 11", "beq", B, beq)
        .pat("??????? ????? ????? 001 ????? 11000 11", "bne", B, bne)
        .pat("??????? ????? ????? 100 ????? 11000 11", "blt", B, blt)
        .pat("??????? ????? ????? 101 ????? 11000 11", "bge", B, bge)
        .pat("??????? ????? ????? 110 ????? 11000 11", "bltu", B, bltu)
        .pat("??????? ????? ????? 111 ????? 11000 11", "bgeu", B, bgeu)
        .pat("??????? ????? ????? 000 ????? 00000 11", "lb", I, lb)
        .pat("??????? ????? ????? 001 ????? 00000 11", "lh", I, lh)
        .pat("??????? ????? ????? 010 ????? 00000 11", "lw", I, lw)
        .pat("??????? ????? ????? 100 ????? 00000 11", "lbu", I, lbu)
        .pat("??????? ????? ????? 101 ????? 00000 11", "lhu", I, lhu)
        .pat("??????? ????? ????? 000 ????? 01000 11", "sb", S, sb)
        .pat("??????? ????? ????? 001 ????? 01000 11", "sh", S, sh)
        .pat("??????? ????? ????? 010 ????? 01000 11", "sw", S, sw)
        .pat("??????? ????? ????? 000 ????? 00100 11", "addi", I, addi)
        .pat("??????? ????? ????? 010 ????? 00100 11", "slti", I, slti)
        .pat("??????? ????? ????? 011 ????? 00100 11", "sltiu", I, sltiu)
        .pat("??????? ????? ????? 100 ????? 00100 11", "xori", I, xori)
        .pat("??????? ????? ????? 110 ????? 00100 11", "ori", I, ori)
        .pat("??????? ????? ????? 111 ????? 00100 11", "andi", I, andi)
        .pat("0000000 ????? ????? 000 ????? 01100 11", "add", R, add)
        .pat("0100000 ????? ????? 000 ????? 01100 11", "sub", R, sub)
        .pat("0000000 ????? ????? 001 ????? 01100 11", "sll", R, sll)
        .pat("0000000 ????? ????? 010 ????? 01100 11", "slt", R, slt)
        .pat("0000000 ????? ????? 011 ????? 01100 11", "sltu", R, sltu)
        .pat("0000000 ????? ????? 100 ????? 01100 11", "xor", R, xor)
        .pat("0000000 ????? ????? 101 ????? 01100 11", "srl", R, srl)
        .pat("0100000 ????? ????? 101 ????? 01100 11", "sra", R, sra)
        .pat("0000000 ????? ????? 110 ????? 01100 11", "or", R, or)
        .pat("0000000 ????? ????? 111 ????? 01100 11", "and", R, and)
        .pat("0000001 ????? ????? 000 ????? 01100 11", "mul", R, mul)
        .pat("0000001 ????? ????? 001 ????? 01100 11", "mulh", R, mulh)
        .pat("0000001 ????? ????? 010 ????? 01100 11", "mulhsu", R, mulhsu)
        .pat("0000001 ????? ????? 011 ????? 01100 11", "mulhu", R, mulhu)
        .pat("0000001 ????? ????? 100 ????? 01100 11", "div", R, div)
        .pat("0000001 ????? ????? 101 ????? 01100 11", "divu", R, divu)
        .pat("0000001 ????? ????? 110 ????? 01100 11", "rem", R, rem)
        .pat("0000001 ????? ????? 111 ????? 01100 11", "remu", R, remu)
        .pat("??????? ????? ????? 000 ????? 00011 11", "fence", N, fence)
        .pat("0000000 00001 00000 000 00000 11100 11", "ebreak", N, ebreak)
}

/// 表尾的兜底行
pub(crate) fn finish<W: GuestWord>(
    b: TableBuilder<W, RvType>,
) -> Result<DecodeTable<W, RvType>, DecodeError> {
    b.pat(&"?".repeat(32), "inv", RvType::N, inv).build()
}
