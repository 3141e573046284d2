//! 纯计算核
//!
//! 不接触寄存器与内存，只对两个客户机字求值。所有运算按字长回绕；移位量
//! 截断到 `log2(BITS)` 位，`*W` 系列在低 32 位上计算后符号扩展。

use vm_core::GuestWord;
use vm_core::word::sext;

/// 不会失败的二元运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    MulLo,
    MulHi,
    IMulLo,
    IMulHi,
    AddW,
    SubW,
    ShlW,
    ShrW,
    SarW,
    MulW,
}

#[inline]
fn w32<W: GuestWord>(v: u64) -> W {
    W::from_i64(sext(v, 32))
}

impl AluOp {
    pub fn eval<W: GuestWord>(self, a: W, b: W) -> W {
        let (ua, ub) = (a.as_u64(), b.as_u64());
        let sh = ub & W::shamt_mask();
        let sh32 = ub & 0x1f;
        match self {
            AluOp::Add => W::from_u64(ua.wrapping_add(ub)),
            AluOp::Sub => W::from_u64(ua.wrapping_sub(ub)),
            AluOp::And => W::from_u64(ua & ub),
            AluOp::Or => W::from_u64(ua | ub),
            AluOp::Xor => W::from_u64(ua ^ ub),
            AluOp::Shl => W::from_u64(ua << sh),
            AluOp::Shr => W::from_u64(ua >> sh),
            AluOp::Sar => W::from_i64(a.as_i64() >> sh),
            AluOp::MulLo | AluOp::IMulLo => W::from_u64(ua.wrapping_mul(ub)),
            AluOp::MulHi => W::from_u64(((ua as u128 * ub as u128) >> W::BITS) as u64),
            AluOp::IMulHi => {
                let prod = a.as_i64() as i128 * b.as_i64() as i128;
                W::from_u64((prod >> W::BITS) as u64)
            }
            AluOp::AddW => w32(ua.wrapping_add(ub)),
            AluOp::SubW => w32(ua.wrapping_sub(ub)),
            AluOp::ShlW => w32((ua as u32 as u64) << sh32),
            AluOp::ShrW => w32((ua as u32 as u64) >> sh32),
            AluOp::SarW => W::from_i64(((ua as u32 as i32) >> sh32) as i64),
            AluOp::MulW => w32(ua.wrapping_mul(ub)),
        }
    }
}

/// 除法类运算，除数为零时返回 `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivOp {
    DivQ,
    DivR,
    IDivQ,
    IDivR,
    DivW,
    DivUW,
    RemW,
    RemUW,
}

impl DivOp {
    pub fn eval<W: GuestWord>(self, a: W, b: W) -> Option<W> {
        let (ua, ub) = (a.as_u64(), b.as_u64());
        let (sa, sb) = (a.as_i64(), b.as_i64());
        let (a32, b32) = (ua as u32, ub as u32);
        let zero = match self {
            DivOp::DivQ | DivOp::DivR | DivOp::IDivQ | DivOp::IDivR => ub == 0,
            DivOp::DivW | DivOp::DivUW | DivOp::RemW | DivOp::RemUW => b32 == 0,
        };
        if zero {
            return None;
        }
        let v = match self {
            DivOp::DivQ => W::from_u64(ua / ub),
            DivOp::DivR => W::from_u64(ua % ub),
            DivOp::IDivQ => W::from_i64(sa.wrapping_div(sb)),
            DivOp::IDivR => W::from_i64(sa.wrapping_rem(sb)),
            DivOp::DivW => w32((a32 as i32).wrapping_div(b32 as i32) as u32 as u64),
            DivOp::DivUW => w32((a32 / b32) as u64),
            DivOp::RemW => w32((a32 as i32).wrapping_rem(b32 as i32) as u32 as u64),
            DivOp::RemUW => w32((a32 % b32) as u64),
        };
        Some(v)
    }
}

fn dividend_u<W: GuestWord>(hi: W, lo: W) -> u128 {
    ((hi.as_u64() as u128) << W::BITS) | lo.as_u64() as u128
}

fn dividend_i<W: GuestWord>(hi: W, lo: W) -> i128 {
    ((hi.as_i64() as i128) << W::BITS) | lo.as_u64() as i128
}

/// `(hi:lo) / d`，无符号，商截断到字长
pub fn div64_q<W: GuestWord>(hi: W, lo: W, d: W) -> Option<W> {
    let q = dividend_u(hi, lo).checked_div(d.as_u64() as u128)?;
    Some(W::from_u64(q as u64))
}

pub fn div64_r<W: GuestWord>(hi: W, lo: W, d: W) -> Option<W> {
    let r = dividend_u(hi, lo).checked_rem(d.as_u64() as u128)?;
    Some(W::from_u64(r as u64))
}

/// `(hi:lo) / d`，有符号
pub fn idiv64_q<W: GuestWord>(hi: W, lo: W, d: W) -> Option<W> {
    let d = d.as_i64() as i128;
    if d == 0 {
        return None;
    }
    Some(W::from_u64(dividend_i(hi, lo).wrapping_div(d) as u64))
}

pub fn idiv64_r<W: GuestWord>(hi: W, lo: W, d: W) -> Option<W> {
    let d = d.as_i64() as i128;
    if d == 0 {
        return None;
    }
    Some(W::from_u64(dividend_i(hi, lo).wrapping_rem(d) as u64))
}
