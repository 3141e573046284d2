//! RV32IM

use vm_core::{DecodeError, GuestArch, MemoryAccess, VmResult};
use vm_ir::Decode;

use super::*;
use crate::{ArchTable, Architecture, words_to_bytes};

pub struct Riscv32;

impl Architecture for Riscv32 {
    type Word = u32;
    type Layout = RvType;

    const NAME: &'static str = "riscv32";
    const ARCH: GuestArch = GuestArch::Riscv32;
    const NR_REGS: usize = 32;
    const ZERO_REG: bool = true;

    fn decode_table() -> Result<ArchTable<Self>, DecodeError> {
        use RvType::*;
        let b = base_rows(TableBuilder::new(Self::NAME, 32))
            .pat("0000000 ????? ????? 001 ????? 00100 11", "slli", I, slli)
            .pat("0000000 ????? ????? 101 ????? 00100 11", "srli", I, srli)
            .pat("0100000 ????? ????? 101 ????? 00100 11", "srai", I, srai);
        finish(b)
    }

    fn decode_operands(
        layout: RvType,
        s: &mut Decode<u32>,
        _gpr: &[u32],
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
            0x0002_8823, // sb  zero,16(t0)
            0x0102_c503, // lbu a0,16(t0)
            0x0010_0073, // ebreak
            0xdead_beef,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_of(inst: u32) -> &'static str {
        let table = Riscv32::decode_table().unwrap();
        table.lookup(inst as u64).unwrap().1.name
    }

    #[test]
    fn test_table_names() {
        assert_eq!(name_of(encode_addi(1, 2, -1)), "addi");
        assert_eq!(name_of(encode_srai(1, 2, 3)), "srai");
        assert_eq!(name_of(encode_mulhsu(1, 2, 3)), "mulhsu");
        assert_eq!(name_of(encode_ebreak()), "ebreak");
        assert_eq!(name_of(encode_lui(5, 0x12345)), "lui");
    }

    #[test]
    fn test_rv64_only_encodings_are_invalid() {
        assert_eq!(name_of(encode_ld(1, 2, 0)), "inv");
        assert_eq!(name_of(encode_addw(1, 2, 3)), "inv");
        // 6 位移位量在 RV32 上非法
        assert_eq!(name_of(encode_slli(1, 2, 33)), "inv");
    }

    #[test]
    fn test_operand_layouts() {
        let mut s = Decode::<u32>::new(0x8000_0010);
        s.inst = encode_beq(1, 2, -16) as u64;
        decode_operands(RvType::B, &mut s);
        assert_eq!(s.dest.value(), 0x8000_0000);
        assert_eq!(s.src1.reg(), Some(1));
        assert_eq!(s.src2.reg(), Some(2));

        s.inst = encode_sw(3, 4, -4) as u64;
        decode_operands(RvType::S, &mut s);
        assert_eq!(s.dest.value(), (-4i32) as u32);
        assert_eq!(s.src1.reg(), Some(3));

        s.inst = encode_lui(5, 0xfffff) as u64;
        decode_operands(RvType::U, &mut s);
        assert_eq!(s.src1.value(), 0xffff_f000);

        s.inst = encode_jal(1, 2048) as u64;
        decode_operands(RvType::J, &mut s);
        assert_eq!(s.src1.value(), 0x8000_0810);
    }

    #[test]
    fn test_reg_names() {
        assert_eq!(Riscv32::reg_name(0), "$0");
        assert_eq!(Riscv32::reg_name(10), "a0");
        assert_eq!(crate::reg_by_name::<Riscv32>("t6"), Some(31));
    }
}
