//! LoongArch32r 指令编码辅助函数

pub fn encode_3r(op17: u32, rd: u32, rj: u32, rk: u32) -> u32 {
    (op17 << 15) | (rk << 10) | (rj << 5) | rd
}

pub fn encode_2ri12(op10: u32, rd: u32, rj: u32, imm: i32) -> u32 {
    (op10 << 22) | (((imm as u32) & 0xfff) << 10) | (rj << 5) | rd
}

/// `offset` 为字节偏移
pub fn encode_2ri16(op6: u32, rj: u32, rd: u32, offset: i32) -> u32 {
    let offs = ((offset >> 2) as u32) & 0xffff;
    (op6 << 26) | (offs << 10) | (rj << 5) | rd
}

pub fn encode_i26(op6: u32, offset: i32) -> u32 {
    let offs = ((offset >> 2) as u32) & 0x03ff_ffff;
    (op6 << 26) | ((offs & 0xffff) << 10) | (offs >> 16)
}

pub fn encode_add_w(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x20, rd, rj, rk) }
pub fn encode_sub_w(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x22, rd, rj, rk) }
pub fn encode_slt(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x24, rd, rj, rk) }
pub fn encode_nor(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x28, rd, rj, rk) }
pub fn encode_sll_w(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x2e, rd, rj, rk) }
pub fn encode_mul_w(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x38, rd, rj, rk) }
pub fn encode_mulh_wu(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x3a, rd, rj, rk) }
pub fn encode_div_w(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x40, rd, rj, rk) }
pub fn encode_mod_w(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x41, rd, rj, rk) }
pub fn encode_div_wu(rd: u32, rj: u32, rk: u32) -> u32 { encode_3r(0x42, rd, rj, rk) }
pub fn encode_break(code: u32) -> u32 { (0x54 << 15) | (code & 0x7fff) }

pub fn encode_slli_w(rd: u32, rj: u32, ui5: u32) -> u32 { encode_3r(0x81, rd, rj, ui5 & 0x1f) }
pub fn encode_srai_w(rd: u32, rj: u32, ui5: u32) -> u32 { encode_3r(0x91, rd, rj, ui5 & 0x1f) }

pub fn encode_slti(rd: u32, rj: u32, imm: i32) -> u32 { encode_2ri12(0x008, rd, rj, imm) }
pub fn encode_sltui(rd: u32, rj: u32, imm: i32) -> u32 { encode_2ri12(0x009, rd, rj, imm) }
pub fn encode_addi_w(rd: u32, rj: u32, imm: i32) -> u32 { encode_2ri12(0x00a, rd, rj, imm) }
pub fn encode_ori(rd: u32, rj: u32, imm: u32) -> u32 { encode_2ri12(0x00e, rd, rj, imm as i32) }
pub fn encode_ld_b(rd: u32, rj: u32, imm: i32) -> u32 { encode_2ri12(0x0a0, rd, rj, imm) }
pub fn encode_ld_w(rd: u32, rj: u32, imm: i32) -> u32 { encode_2ri12(0x0a2, rd, rj, imm) }
pub fn encode_st_b(rd: u32, rj: u32, imm: i32) -> u32 { encode_2ri12(0x0a4, rd, rj, imm) }
pub fn encode_st_w(rd: u32, rj: u32, imm: i32) -> u32 { encode_2ri12(0x0a6, rd, rj, imm) }
pub fn encode_ld_bu(rd: u32, rj: u32, imm: i32) -> u32 { encode_2ri12(0x0a8, rd, rj, imm) }

pub fn encode_lu12i_w(rd: u32, si20: i32) -> u32 { (0x0a << 25) | (((si20 as u32) & 0xfffff) << 5) | rd }
pub fn encode_pcaddu12i(rd: u32, si20: i32) -> u32 { (0x0e << 25) | (((si20 as u32) & 0xfffff) << 5) | rd }

pub fn encode_jirl(rd: u32, rj: u32, offset: i32) -> u32 { encode_2ri16(0x13, rj, rd, offset) }
pub fn encode_b(offset: i32) -> u32 { encode_i26(0x14, offset) }
pub fn encode_bl(offset: i32) -> u32 { encode_i26(0x15, offset) }
pub fn encode_beq(rj: u32, rd: u32, offset: i32) -> u32 { encode_2ri16(0x16, rj, rd, offset) }
pub fn encode_bne(rj: u32, rd: u32, offset: i32) -> u32 { encode_2ri16(0x17, rj, rd, offset) }
pub fn encode_blt(rj: u32, rd: u32, offset: i32) -> u32 { encode_2ri16(0x18, rj, rd, offset) }
pub fn encode_bltu(rj: u32, rd: u32, offset: i32) -> u32 { encode_2ri16(0x1a, rj, rd, offset) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode_pcaddu12i(12, 0), 0x1c00_000c);
        assert_eq!(encode_st_w(0, 12, 16), 0x2980_4180);
        assert_eq!(encode_ld_w(4, 12, 16), 0x2880_4184);
        assert_eq!(encode_break(0), 0x002a_0000);
    }
}
