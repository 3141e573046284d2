//! RV64IM

use vm_core::{DecodeError, GuestArch, MemoryAccess, VmResult};
use vm_ir::Decode;

use super::*;
use crate::{ArchTable, Architecture, words_to_bytes};

pub struct Riscv64;

impl Architecture for Riscv64 {
    type Word = u64;
    type Layout = RvType;

    const NAME: &'static str = "riscv64";
    const ARCH: GuestArch = GuestArch::Riscv64;
    const NR_REGS: usize = 32;
    const ZERO_REG: bool = true;

    fn decode_table() -> Result<ArchTable<Self>, DecodeError> {
        use RvType::*;
        let b = base_rows(TableBuilder::new(Self::NAME, 32))
            .pat("000000? ????? ????? 001 ????? 00100 11", "slli", I, slli)
            .pat("000000? ????? ????? 101 ????? 00100 11", "srli", I, srli)
            .pat("010000? ????? ????? 101 ????? 00100 11", "srai", I, srai)
            .pat("??????? ????? ????? 011 ????? 00000 11", "ld", I, ld)
            .pat("??????? ????? ????? 110 ????? 00000 11", "lwu", I, lwu)
            .pat("??????? ????? ????? 011 ????? 01000 11", "sd", S, sd)
            .pat("??????? ????? ????? 000 ????? 00110 11", "addiw", I, addiw)
            .pat("0000000 ????? ????? 001 ????? 00110 11", "slliw", I, slliw)
            .pat("0000000 ????? ????? 101 ????? 00110 11", "srliw", I, srliw)
            .pat("0100000 ????? ????? 101 ????? 00110 11", "sraiw", I, sraiw)
            .pat("0000000 ????? ????? 000 ????? 01110 11", "addw", R, addw)
            .pat("0100000 ????? ????? 000 ????? 01110 11", "subw", R, subw)
            .pat("0000000 ????? ????? 001 ????? 01110 11", "sllw", R, sllw)
            .pat("0000000 ????? ????? 101 ????? 01110 11", "srlw", R, srlw)
            .pat("0100000 ????? ????? 101 ????? 01110 11", "sraw", R, sraw)
            .pat("0000001 ????? ????? 000 ????? 01110 11", "mulw", R, mulw)
            .pat("0000001 ????? ????? 100 ????? 01110 11", "divw", R, divw)
            .pat("0000001 ????? ????? 101 ????? 01110 11", "divuw", R, divuw)
            .pat("0000001 ????? ????? 110 ????? 01110 11", "remw", R, remw)
            .pat("0000001 ????? ????? 111 ????? 01110 11", "remuw", R, remuw);
        finish(b)
    }

    fn decode_operands(
        layout: RvType,
        s: &mut Decode<u64>,
        _gpr: &[u64],
        _mem: &mut dyn MemoryAccess,
    ) -> VmResult<()> {
        decode_operands(layout, s);
        Ok(())
    }

    fn reg_name(idx: usize) -> &'static str {
        reg_name(idx)
    }

    fn builtin_image() -> Vec<u8> {
        words_to_bytes(&[
            0x0000_0297, // auipc t0,0
            0x0002_b823, // sd  zero,16(t0)
            0x0102_b503, // ld  a0,16(t0)
            0x0010_0073, // ebreak
            0xdead_beef,
            0xdead_beef,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_of(inst: u32) -> &'static str {
        let table = Riscv64::decode_table().unwrap();
        table.lookup(inst as u64).unwrap().1.name
    }

    #[test]
    fn test_wide_shift_and_word_ops() {
        assert_eq!(name_of(encode_slli(1, 2, 33)), "slli");
        assert_eq!(name_of(encode_srai(1, 2, 63)), "srai");
        assert_eq!(name_of(encode_addiw(1, 2, 5)), "addiw");
        assert_eq!(name_of(encode_divw(1, 2, 3)), "divw");
        assert_eq!(name_of(encode_ld(1, 2, 8)), "ld");
        assert_eq!(name_of(encode_sd(1, 2, 8)), "sd");
    }

    #[test]
    fn test_immediates_sign_extend_to_64() {
        let mut s = Decode::<u64>::new(0x8000_0000);
        s.inst = encode_addi(1, 0, -1) as u64;
        decode_operands(RvType::I, &mut s);
        assert_eq!(s.src2.value(), u64::MAX);

        s.inst = encode_lui(1, 0x80000) as u64;
        decode_operands(RvType::U, &mut s);
        assert_eq!(s.src1.value(), 0xffff_ffff_8000_0000);
    }
}
