//! 位模式匹配
//!
//! 模式串由 `0`、`1`、`?` 组成（空格忽略），编译为 `(key, mask, shift)`：
//! `shift` 是末尾连续 `?` 的长度，`key`/`mask` 描述其余位置上的固定位。
//! 指令字 `w` 命中当且仅当 `((w >> shift) & mask) == key`。
//!
//! 十六进制变体每个符号占 4 位，取值 `0`-`9`、`a`-`f` 或 `?`。

use vm_core::DecodeError;

/// 模式串最多描述的位数
pub const MAX_PATTERN_BITS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    pub key: u64,
    pub mask: u64,
    pub shift: u32,
    /// 模式覆盖的位数
    pub bits: usize,
}

impl Pattern {
    /// 编译二进制模式
    pub fn compile(src: &str) -> Result<Self, DecodeError> {
        Self::compile_with(src, 1)
    }

    /// 编译十六进制模式
    pub fn compile_hex(src: &str) -> Result<Self, DecodeError> {
        Self::compile_with(src, 4)
    }

    fn compile_with(src: &str, sym_bits: u32) -> Result<Self, DecodeError> {
        let (mut key, mut mask, mut shift) = (0u64, 0u64, 0u32);
        let mut bits = 0usize;
        let sym_mask = (1u64 << sym_bits) - 1;

        for ch in src.chars().filter(|c| *c != ' ') {
            bits += sym_bits as usize;
            if bits > MAX_PATTERN_BITS {
                return Err(DecodeError::PatternTooLong {
                    pattern: src.to_string(),
                    bits: Self::count_bits(src, sym_bits),
                    max: MAX_PATTERN_BITS,
                });
            }
            key <<= sym_bits;
            mask <<= sym_bits;
            if ch == '?' {
                shift += sym_bits;
                continue;
            }
            let digit = ch
                .to_digit(1 << sym_bits)
                .filter(|_| sym_bits == 1 || !ch.is_ascii_uppercase())
                .ok_or_else(|| DecodeError::InvalidPatternChar {
                    pattern: src.to_string(),
                    ch,
                })?;
            key |= digit as u64;
            mask |= sym_mask;
            shift = 0;
        }

        Ok(Self {
            key: key.checked_shr(shift).unwrap_or(0),
            mask: mask.checked_shr(shift).unwrap_or(0),
            shift,
            bits,
        })
    }

    fn count_bits(src: &str, sym_bits: u32) -> usize {
        src.chars().filter(|c| *c != ' ').count() * sym_bits as usize
    }

    #[inline]
    pub fn matches(&self, inst: u64) -> bool {
        (inst.checked_shr(self.shift).unwrap_or(0) & self.mask) == self.key
    }

    /// 没有任何固定位
    pub fn is_catch_all(&self) -> bool {
        self.mask == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_trailing_shift() {
        let p = Pattern::compile("??????? ????? ????? ??? ????? 01101 11").unwrap();
        assert_eq!(p.shift, 0);
        assert_eq!(p.mask, 0x7f);
        assert_eq!(p.key, 0x37);

        let p = Pattern::compile("1011 0???").unwrap();
        assert_eq!((p.key, p.mask, p.shift), (0b10110, 0b11111, 3));
        assert!(p.matches(0xb0));
        assert!(p.matches(0xb7));
        assert!(!p.matches(0xb8));
    }

    #[test]
    fn test_inner_wildcards() {
        let p = Pattern::compile("0000000 00001 00000 000 00000 11100 11").unwrap();
        assert!(p.matches(0x0010_0073));
        assert!(!p.matches(0x0000_0073));

        let p = Pattern::compile("011100 ????? ????? ????? ????? 111111").unwrap();
        assert_eq!(p.shift, 0);
        assert!(p.matches(0x7000_003f));
        assert!(p.matches(0x7fff_ffff));
        assert!(!p.matches(0x7000_003e));
    }

    #[test]
    fn test_catch_all() {
        let p = Pattern::compile(&"?".repeat(32)).unwrap();
        assert!(p.is_catch_all());
        assert!(p.matches(0xffff_ffff));
        let p = Pattern::compile(&"?".repeat(64)).unwrap();
        assert!(p.matches(u64::MAX));
    }

    #[test]
    fn test_hex() {
        let p = Pattern::compile_hex("0f 8?").unwrap();
        assert_eq!((p.key, p.mask, p.shift), (0x0f8, 0xfff, 4));
        assert!(p.matches(0x0f84));
        assert!(!p.matches(0x0f94));
        assert!(Pattern::compile_hex("cc").unwrap().matches(0xcc));
        assert!(matches!(
            Pattern::compile_hex("CC"),
            Err(DecodeError::InvalidPatternChar { ch: 'C', .. })
        ));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Pattern::compile(&"0".repeat(65)),
            Err(DecodeError::PatternTooLong { bits: 65, max: 64, .. })
        ));
        assert!(matches!(
            Pattern::compile_hex(&"?".repeat(17)),
            Err(DecodeError::PatternTooLong { bits: 68, .. })
        ));
        assert!(matches!(
            Pattern::compile("01x1"),
            Err(DecodeError::InvalidPatternChar { ch: 'x', .. })
        ));
    }
}
