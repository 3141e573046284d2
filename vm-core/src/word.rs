//! 客户机字长抽象
//!
//! 寄存器值、地址与立即数统一使用 [`GuestWord`]，32 位与 64 位客户机分别
//! 实例化为 `u32` 与 `u64`。所有算术按字长取模回绕。

use std::fmt::{Debug, LowerHex};

/// 客户机原生字
pub trait GuestWord:
    Copy + Eq + Ord + Default + Debug + LowerHex + Send + Sync + 'static
{
    /// 有符号视图
    type Signed: Copy + Eq + Ord + Debug;

    /// 位宽
    const BITS: u32;
    /// 字节数
    const BYTES: usize;
    const ZERO: Self;
    const ONES: Self;

    /// Truncates `v` to the word width.
    fn from_u64(v: u64) -> Self;
    /// Zero-extends to 64 bits.
    fn as_u64(self) -> u64;
    /// Sign-extends to 64 bits.
    fn as_i64(self) -> i64;
    fn as_signed(self) -> Self::Signed;

    fn from_i64(v: i64) -> Self {
        Self::from_u64(v as u64)
    }

    fn from_bool(b: bool) -> Self {
        Self::from_u64(b as u64)
    }

    fn wrapping_add(self, rhs: Self) -> Self {
        Self::from_u64(self.as_u64().wrapping_add(rhs.as_u64()))
    }

    fn wrapping_sub(self, rhs: Self) -> Self {
        Self::from_u64(self.as_u64().wrapping_sub(rhs.as_u64()))
    }

    /// 移位量掩码，即 `log2(BITS)` 位全一
    fn shamt_mask() -> u64 {
        (Self::BITS - 1) as u64
    }
}

macro_rules! impl_guest_word {
    ($u:ty, $s:ty) => {
        impl GuestWord for $u {
            type Signed = $s;

            const BITS: u32 = <$u>::BITS;
            const BYTES: usize = std::mem::size_of::<$u>();
            const ZERO: Self = 0;
            const ONES: Self = <$u>::MAX;

            #[inline]
            fn from_u64(v: u64) -> Self {
                v as $u
            }

            #[inline]
            fn as_u64(self) -> u64 {
                self as u64
            }

            #[inline]
            fn as_i64(self) -> i64 {
                self as $s as i64
            }

            #[inline]
            fn as_signed(self) -> $s {
                self as $s
            }
        }
    };
}

impl_guest_word!(u32, i32);
impl_guest_word!(u64, i64);

/// Sign-extends the low `bits` bits of `v`.
#[inline]
pub fn sext(v: u64, bits: u32) -> i64 {
    debug_assert!(bits > 0 && bits <= 64);
    let sh = 64 - bits;
    ((v << sh) as i64) >> sh
}

/// Keeps the low `bits` bits of `v`.
#[inline]
pub fn zext(v: u64, bits: u32) -> u64 {
    if bits >= 64 { v } else { v & ((1u64 << bits) - 1) }
}

/// Extracts bits `hi..=lo` of `v` (MSB-first numbering, bit 0 is the LSB).
#[inline]
pub fn bits(v: u64, hi: u32, lo: u32) -> u64 {
    zext(v >> lo, hi - lo + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_and_extension() {
        assert_eq!(u32::from_u64(0x1_2345_6789), 0x2345_6789);
        assert_eq!(0xffff_fffeu32.as_i64(), -2);
        assert_eq!(0xffff_fffeu32.as_u64(), 0xffff_fffe);
        assert_eq!(u32::from_i64(-1), u32::MAX);
        assert_eq!(u64::ONES, u64::MAX);
    }

    #[test]
    fn test_wrapping_arith() {
        assert_eq!(u32::MAX.wrapping_add(2), 1);
        assert_eq!(GuestWord::wrapping_sub(0u64, 1), u64::MAX);
        assert_eq!(u32::shamt_mask(), 0x1f);
        assert_eq!(u64::shamt_mask(), 0x3f);
    }

    #[test]
    fn test_bit_helpers() {
        assert_eq!(sext(0x800, 12), -2048);
        assert_eq!(sext(0x7ff, 12), 2047);
        assert_eq!(zext(0xdead_beef, 16), 0xbeef);
        assert_eq!(bits(0x0010_0073, 6, 0), 0x73);
        assert_eq!(bits(0x0010_0073, 31, 20), 1);
    }
}
