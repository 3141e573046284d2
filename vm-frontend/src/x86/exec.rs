//! x86 执行函数
//!
//! 操作数宽度取自 `s.width`。寄存器与内存操作数统一经 [`load`] / [`store`]
//! 按宽度读写，结果只写回目标宽度内的位。

use vm_core::word::sext;
use vm_core::{ExecutionError, VmResult};
use vm_ir::{Operand, Reg, RegId, Rtl, S0, S1, S2, T0};

use super::{CF, EAX, EBP, EDX, EFLAGS, ESP, OF, SF, ZF};

type Ctx<'r, 'a> = &'r mut Rtl<'a, u32>;

fn mask(w: usize) -> u32 {
    if w >= 4 { u32::MAX } else { (1u32 << (8 * w)) - 1 }
}

fn sign_bit(w: usize) -> u32 {
    1u32 << (8 * w - 1)
}

fn msb(v: u32, w: usize) -> bool {
    v & sign_bit(w) != 0
}

fn sext_w(v: u32, w: usize) -> i64 {
    sext(v as u64, 8 * w as u32)
}

// ----------------------------------------------------------------------------
// 寄存器与操作数
// ----------------------------------------------------------------------------

fn read_reg(r: &Rtl<'_, u32>, idx: RegId, w: usize) -> u32 {
    match w {
        1 => (r.get(Reg::Gpr(idx & 3)) >> ((idx >> 2) * 8)) & 0xff,
        _ => r.get(Reg::Gpr(idx)) & mask(w),
    }
}

fn write_reg(r: &mut Rtl<'_, u32>, idx: RegId, w: usize, v: u32) {
    match w {
        1 => {
            let reg = Reg::Gpr(idx & 3);
            let shift = (idx >> 2) * 8;
            let old = r.get(reg) & !(0xff << shift);
            r.set(reg, old | ((v & 0xff) << shift));
        }
        2 => {
            let reg = Reg::Gpr(idx);
            let old = r.get(reg) & 0xffff_0000;
            r.set(reg, old | (v & 0xffff));
        }
        _ => r.set(Reg::Gpr(idx), v),
    }
}

pub(super) fn load(r: &mut Rtl<'_, u32>, op: Operand<u32>, w: usize) -> VmResult<u32> {
    match op {
        Operand::Reg(idx) => Ok(read_reg(r, idx, w)),
        Operand::Mem(addr) => {
            r.lm(T0, Reg::Zero, addr, w)?;
            Ok(r.get(T0))
        }
        Operand::Imm(v) => Ok(v & mask(w)),
        Operand::None => Ok(0),
    }
}

pub(super) fn store(r: &mut Rtl<'_, u32>, op: Operand<u32>, w: usize, v: u32) -> VmResult<()> {
    match op {
        Operand::Reg(idx) => {
            write_reg(r, idx, w, v);
            Ok(())
        }
        Operand::Mem(addr) => {
            r.li(T0, v);
            r.sm(Reg::Zero, addr, T0, w)
        }
        Operand::Imm(_) | Operand::None => Ok(()),
    }
}

// ----------------------------------------------------------------------------
// EFLAGS
// ----------------------------------------------------------------------------

fn flag(r: &Rtl<'_, u32>, bit: u32) -> bool {
    (r.get(Reg::Gpr(EFLAGS)) >> bit) & 1 != 0
}

fn set_flag(r: &mut Rtl<'_, u32>, bit: u32, v: bool) {
    let reg = Reg::Gpr(EFLAGS);
    let old = r.get(reg) & !(1 << bit);
    r.set(reg, old | ((v as u32) << bit));
}

fn set_zfsf(r: &mut Rtl<'_, u32>, res: u32, w: usize) {
    set_flag(r, ZF, res & mask(w) == 0);
    set_flag(r, SF, msb(res, w));
}

fn set_logic_flags(r: &mut Rtl<'_, u32>, res: u32, w: usize) {
    set_flag(r, CF, false);
    set_flag(r, OF, false);
    set_zfsf(r, res, w);
}

/// 条件码，低位为取反位
fn cond(r: &Rtl<'_, u32>, cc: u32) -> VmResult<bool> {
    let (cf, zf, sf, of) = (flag(r, CF), flag(r, ZF), flag(r, SF), flag(r, OF));
    let base = match cc >> 1 {
        0 => of,
        1 => cf,
        2 => zf,
        3 => cf || zf,
        4 => sf,
        5 => return Err(ExecutionError::Unsupported("parity flag".into()).into()),
        6 => sf != of,
        _ => zf || sf != of,
    };
    Ok(base ^ (cc & 1 != 0))
}

// ----------------------------------------------------------------------------
// 栈
// ----------------------------------------------------------------------------

fn push_val(r: &mut Rtl<'_, u32>, v: u32, w: usize) -> VmResult<()> {
    let sp = r.get(Reg::Gpr(ESP)).wrapping_sub(w as u32);
    r.li(T0, v);
    r.sm(Reg::Zero, sp, T0, w)?;
    r.set(Reg::Gpr(ESP), sp);
    Ok(())
}

fn pop_val(r: &mut Rtl<'_, u32>, w: usize) -> VmResult<u32> {
    let sp = r.get(Reg::Gpr(ESP));
    r.lm(T0, Reg::Zero, sp, w)?;
    r.set(Reg::Gpr(ESP), sp.wrapping_add(w as u32));
    Ok(r.get(T0))
}

// ----------------------------------------------------------------------------
// 算术逻辑
// ----------------------------------------------------------------------------

fn add_with(a: u32, b: u32, carry: u32, w: usize) -> (u32, bool, bool) {
    let full = a as u64 + b as u64 + carry as u64;
    let res = full as u32 & mask(w);
    let of = msb(!(a ^ b) & (a ^ res), w);
    (res, full > mask(w) as u64, of)
}

fn sub_with(a: u32, b: u32, borrow: u32, w: usize) -> (u32, bool, bool) {
    let rhs = b as u64 + borrow as u64;
    let res = (a as u64).wrapping_sub(rhs) as u32 & mask(w);
    let of = msb((a ^ b) & (a ^ res), w);
    (res, (a as u64) < rhs, of)
}

/// add, or, adc, sbb, and, sub, xor, cmp
fn alu(r: Ctx<'_, '_>, idx: u32) -> VmResult<()> {
    let w = r.s.width;
    let (dest, src) = (r.s.dest, r.s.src1);
    let a = load(r, dest, w)?;
    let b = load(r, src, w)?;
    let c = flag(r, CF) as u32;

    let (res, cf, of) = match idx & 7 {
        0 => add_with(a, b, 0, w),
        1 => (a | b, false, false),
        2 => add_with(a, b, c, w),
        3 => sub_with(a, b, c, w),
        4 => (a & b, false, false),
        6 => (a ^ b, false, false),
        _ => sub_with(a, b, 0, w),
    };
    set_flag(r, CF, cf);
    set_flag(r, OF, of);
    set_zfsf(r, res, w);
    if idx != 7 {
        store(r, dest, w, res)?;
    }
    Ok(())
}

pub(super) fn alu_op(r: Ctx<'_, '_>) -> VmResult<()> {
    let idx = ((r.s.inst >> 3) & 7) as u32;
    alu(r, idx)
}

pub(super) fn gp1(r: Ctx<'_, '_>) -> VmResult<()> {
    let idx = r.s.opcode;
    alu(r, idx)
}

pub(super) fn test(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let (dest, src) = (r.s.dest, r.s.src1);
    let res = load(r, dest, w)? & load(r, src, w)?;
    set_logic_flags(r, res, w);
    Ok(())
}

fn inc_dec(r: Ctx<'_, '_>, dec: bool) -> VmResult<()> {
    let w = r.s.width;
    let dest = r.s.dest;
    let a = load(r, dest, w)?;
    let (res, of) = if dec {
        (a.wrapping_sub(1) & mask(w), a == sign_bit(w))
    } else {
        let res = a.wrapping_add(1) & mask(w);
        (res, res == sign_bit(w))
    };
    set_flag(r, OF, of);
    set_zfsf(r, res, w);
    store(r, dest, w, res)
}

pub(super) fn inc(r: Ctx<'_, '_>) -> VmResult<()> {
    inc_dec(r, false)
}

pub(super) fn dec(r: Ctx<'_, '_>) -> VmResult<()> {
    inc_dec(r, true)
}

/// 组 2 移位：shl/sal, shr, sar
pub(super) fn gp2(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let bits = 8 * w as u32;
    let (dest, src) = (r.s.dest, r.s.src1);
    let count = load(r, src, 1)? & 0x1f;
    let a = load(r, dest, w)?;
    if count == 0 {
        return Ok(());
    }

    let (res, cf) = match r.s.opcode {
        4 | 6 => {
            let full = (a as u64) << count;
            (full as u32 & mask(w), (full >> bits) & 1 != 0)
        }
        5 => (a >> count, (a >> (count - 1)) & 1 != 0),
        7 => {
            let v = sext_w(a, w);
            ((v >> count) as u32 & mask(w), (v >> (count - 1)) & 1 != 0)
        }
        _ => {
            r.inv();
            return Ok(());
        }
    };
    let of = match r.s.opcode {
        5 => msb(a, w),
        7 => false,
        _ => msb(res, w) != cf,
    };
    set_flag(r, CF, cf);
    set_flag(r, OF, of);
    set_zfsf(r, res, w);
    store(r, dest, w, res)
}

/// 组 3：test, not, neg, mul, imul, div, idiv
pub(super) fn gp3(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let dest = r.s.dest;
    match r.s.opcode {
        0 => test(r),
        2 => {
            let a = load(r, dest, w)?;
            store(r, dest, w, !a & mask(w))
        }
        3 => {
            let a = load(r, dest, w)?;
            let res = a.wrapping_neg() & mask(w);
            set_flag(r, CF, a != 0);
            set_flag(r, OF, a == sign_bit(w));
            set_zfsf(r, res, w);
            store(r, dest, w, res)
        }
        4 => mul(r, false),
        5 => mul(r, true),
        6 => div(r, false),
        7 => div(r, true),
        _ => {
            r.inv();
            Ok(())
        }
    }
}

/// 单操作数乘法：eDX:eAX = eAX * E（字节形式写 ax）
fn mul(r: Ctx<'_, '_>, signed: bool) -> VmResult<()> {
    let w = r.s.width;
    let bits = 8 * w as u32;
    let dest = r.s.dest;
    let a = read_reg(r, EAX, w);
    let b = load(r, dest, w)?;

    let (lo, hi, overflow) = if signed {
        let p = sext_w(a, w) * sext_w(b, w);
        let lo = p as u32 & mask(w);
        (lo, (p >> bits) as u32 & mask(w), p != sext_w(lo, w))
    } else {
        let p = a as u64 * b as u64;
        let hi = (p >> bits) as u32 & mask(w);
        (p as u32 & mask(w), hi, hi != 0)
    };

    if w == 1 {
        write_reg(r, EAX, 2, (hi << 8) | lo);
    } else {
        write_reg(r, EAX, w, lo);
        write_reg(r, EDX, w, hi);
    }
    set_flag(r, CF, overflow);
    set_flag(r, OF, overflow);
    Ok(())
}

/// 单操作数除法。除数为零或商溢出都是致命错误。
fn div(r: Ctx<'_, '_>, signed: bool) -> VmResult<()> {
    let w = r.s.width;
    let bits = 8 * w as u32;
    let dest = r.s.dest;
    let d = load(r, dest, w)?;
    if d == 0 {
        return Err(ExecutionError::DivisionByZero.into());
    }

    let (hi, lo) = if w == 1 {
        (read_reg(r, 4, 1), read_reg(r, EAX, 1))
    } else {
        (read_reg(r, EDX, w), read_reg(r, EAX, w))
    };
    let dividend = ((hi as u64) << bits) | lo as u64;

    let fits = if signed {
        let n = sext(dividend, 2 * bits);
        n.checked_div(sext_w(d, w))
            .is_some_and(|q| q >= -(sign_bit(w) as i64) && q < sign_bit(w) as i64)
    } else {
        dividend / d as u64 <= mask(w) as u64
    };
    if !fits {
        return Err(ExecutionError::DivideOverflow.into());
    }

    if w == 4 {
        let (edx, eax) = (Reg::Gpr(EDX), Reg::Gpr(EAX));
        r.li(S1, d);
        if signed {
            r.idiv64_q(S2, edx, eax, S1)?;
            r.idiv64_r(edx, edx, eax, S1)?;
        } else {
            r.div64_q(S2, edx, eax, S1)?;
            r.div64_r(edx, edx, eax, S1)?;
        }
        r.mv(eax, S2);
        return Ok(());
    }

    // 16/32 位被除数放得进一个机器字
    r.li(S0, dividend as u32);
    r.li(S1, d);
    if signed {
        r.sext(S0, S0, 2 * w);
        r.sext(S1, S1, w);
        r.idiv_q(S2, S0, S1)?;
        r.idiv_r(S0, S0, S1)?;
    } else {
        r.div_q(S2, S0, S1)?;
        r.div_r(S0, S0, S1)?;
    }
    let (q, rem) = (r.get(S2), r.get(S0));
    if w == 1 {
        write_reg(r, EAX, 1, q);
        write_reg(r, 4, 1, rem);
    } else {
        write_reg(r, EAX, w, q);
        write_reg(r, EDX, w, rem);
    }
    Ok(())
}

fn imul_into(r: Ctx<'_, '_>, a: u32, b: u32) -> VmResult<()> {
    let w = r.s.width;
    let dest = r.s.dest;
    let p = sext_w(a, w) * sext_w(b, w);
    let res = p as u32 & mask(w);
    let overflow = p != sext_w(res, w);
    set_flag(r, CF, overflow);
    set_flag(r, OF, overflow);
    store(r, dest, w, res)
}

/// imul G, E
pub(super) fn imul2(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let (dest, src) = (r.s.dest, r.s.src1);
    let a = load(r, dest, w)?;
    let b = load(r, src, w)?;
    imul_into(r, a, b)
}

/// imul G, E, imm
pub(super) fn imul3(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let (src, imm) = (r.s.src1, r.s.src2);
    let a = load(r, src, w)?;
    let b = load(r, imm, w)?;
    imul_into(r, a, b)
}

// ----------------------------------------------------------------------------
// 数据传送
// ----------------------------------------------------------------------------

pub(super) fn mov(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let (dest, src) = (r.s.dest, r.s.src1);
    let v = load(r, src, w)?;
    store(r, dest, w, v)
}

pub(super) fn lea(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let (dest, ea) = (r.s.dest, r.s.src1.value());
    store(r, dest, w, ea)
}

fn mov_ext(r: Ctx<'_, '_>, src_w: usize, signed: bool) -> VmResult<()> {
    let w = r.s.width;
    let (dest, src) = (r.s.dest, r.s.src1);
    let v = load(r, src, src_w)?;
    let v = if signed { sext_w(v, src_w) as u32 } else { v };
    store(r, dest, w, v)
}

pub(super) fn movzb(r: Ctx<'_, '_>) -> VmResult<()> {
    mov_ext(r, 1, false)
}

pub(super) fn movzw(r: Ctx<'_, '_>) -> VmResult<()> {
    mov_ext(r, 2, false)
}

pub(super) fn movsb(r: Ctx<'_, '_>) -> VmResult<()> {
    mov_ext(r, 1, true)
}

pub(super) fn movsw(r: Ctx<'_, '_>) -> VmResult<()> {
    mov_ext(r, 2, true)
}

pub(super) fn push(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let dest = r.s.dest;
    let v = load(r, dest, w)?;
    push_val(r, v, w)
}

pub(super) fn push_imm(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let v = r.s.src1.value() & mask(w);
    push_val(r, v, w)
}

pub(super) fn pop(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let dest = r.s.dest;
    let v = pop_val(r, w)?;
    store(r, dest, w, v)
}

pub(super) fn leave(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    r.mv(Reg::Gpr(ESP), Reg::Gpr(EBP));
    let v = pop_val(r, w)?;
    write_reg(r, EBP, w, v);
    Ok(())
}

pub(super) fn cwtl(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let half = read_reg(r, EAX, w / 2);
    write_reg(r, EAX, w, sext_w(half, w / 2) as u32);
    Ok(())
}

pub(super) fn cltd(r: Ctx<'_, '_>) -> VmResult<()> {
    let w = r.s.width;
    let v = if msb(read_reg(r, EAX, w), w) { u32::MAX } else { 0 };
    write_reg(r, EDX, w, v);
    Ok(())
}

// ----------------------------------------------------------------------------
// 控制流
// ----------------------------------------------------------------------------

pub(super) fn jmp(r: Ctx<'_, '_>) -> VmResult<()> {
    let target = r.s.dest.value();
    r.j(target);
    Ok(())
}

pub(super) fn jcc(r: Ctx<'_, '_>) -> VmResult<()> {
    let target = r.s.dest.value();
    if cond(r, (r.s.inst & 0xf) as u32)? {
        r.j(target);
    }
    Ok(())
}

pub(super) fn setcc(r: Ctx<'_, '_>) -> VmResult<()> {
    let dest = r.s.dest;
    let v = cond(r, (r.s.inst & 0xf) as u32)?;
    store(r, dest, 1, v as u32)
}

pub(super) fn call(r: Ctx<'_, '_>) -> VmResult<()> {
    let (target, link) = (r.s.dest.value(), r.s.snpc);
    push_val(r, link, 4)?;
    r.j(target);
    Ok(())
}

pub(super) fn ret(r: Ctx<'_, '_>) -> VmResult<()> {
    let target = pop_val(r, 4)?;
    r.j(target);
    Ok(())
}

pub(super) fn ret_imm(r: Ctx<'_, '_>) -> VmResult<()> {
    let target = pop_val(r, 4)?;
    let extra = r.s.src1.value();
    let esp = Reg::Gpr(ESP);
    r.addi(esp, esp, extra);
    r.j(target);
    Ok(())
}

pub(super) fn gp4(r: Ctx<'_, '_>) -> VmResult<()> {
    match r.s.opcode {
        0 => inc_dec(r, false),
        1 => inc_dec(r, true),
        _ => {
            r.inv();
            Ok(())
        }
    }
}

/// 组 5：inc, dec, call, jmp, push
pub(super) fn gp5(r: Ctx<'_, '_>) -> VmResult<()> {
    let dest = r.s.dest;
    match r.s.opcode {
        0 => inc_dec(r, false),
        1 => inc_dec(r, true),
        2 => {
            let target = load(r, dest, 4)?;
            let link = r.s.snpc;
            push_val(r, link, 4)?;
            r.j(target);
            Ok(())
        }
        4 => {
            let target = load(r, dest, 4)?;
            r.j(target);
            Ok(())
        }
        6 => push(r),
        _ => {
            r.inv();
            Ok(())
        }
    }
}

// ----------------------------------------------------------------------------
// 端口 I/O 与宿主调用
// ----------------------------------------------------------------------------

fn port_in(r: Ctx<'_, '_>, port: u32) -> VmResult<()> {
    let w = r.s.width;
    r.li(S0, port);
    r.pio_in(S1, S0, w)?;
    let v = r.get(S1);
    write_reg(r, EAX, w, v);
    Ok(())
}

fn port_out(r: Ctx<'_, '_>, port: u32) -> VmResult<()> {
    let w = r.s.width;
    let v = read_reg(r, EAX, w);
    r.li(S0, port);
    r.li(S1, v);
    r.pio_out(S0, S1, w)
}

pub(super) fn in_imm(r: Ctx<'_, '_>) -> VmResult<()> {
    let port = r.s.src1.value();
    port_in(r, port)
}

pub(super) fn in_dx(r: Ctx<'_, '_>) -> VmResult<()> {
    let port = read_reg(r, EDX, 2);
    port_in(r, port)
}

pub(super) fn out_imm(r: Ctx<'_, '_>) -> VmResult<()> {
    let port = r.s.src1.value();
    port_out(r, port)
}

pub(super) fn out_dx(r: Ctx<'_, '_>) -> VmResult<()> {
    let port = read_reg(r, EDX, 2);
    port_out(r, port)
}

pub(super) fn nop(_r: Ctx<'_, '_>) -> VmResult<()> {
    Ok(())
}

pub(super) fn int3(r: Ctx<'_, '_>) -> VmResult<()> {
    r.exit(Reg::Gpr(EAX));
    Ok(())
}

pub(super) fn inv(r: Ctx<'_, '_>) -> VmResult<()> {
    r.inv();
    Ok(())
}
