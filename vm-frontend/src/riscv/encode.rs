//! RISC-V 指令编码辅助函数，供测试与内置镜像使用

fn i_imm(imm: i32) -> u32 {
    (imm as u32) & 0xfff
}

pub fn encode_r_type(opcode: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

pub fn encode_i_type(opcode: u32, funct3: u32, rd: u32, rs1: u32, imm: i32) -> u32 {
    (i_imm(imm) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

pub fn encode_s_type(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm: i32) -> u32 {
    let imm = i_imm(imm);
    let imm11_5 = (imm >> 5) & 0x7f;
    let imm4_0 = imm & 0x1f;
    (imm11_5 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (imm4_0 << 7) | opcode
}

pub fn encode_branch(funct3: u32, rs1: u32, rs2: u32, imm: i32) -> u32 {
    let v = imm as u32;
    let b12 = ((v >> 12) & 0x1) << 31;
    let b11 = ((v >> 11) & 0x1) << 7;
    let b10_5 = ((v >> 5) & 0x3f) << 25;
    let b4_1 = ((v >> 1) & 0xf) << 8;
    b12 | b10_5 | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | b4_1 | b11 | 0x63
}

pub fn encode_jal(rd: u32, imm: i32) -> u32 {
    let u = imm as u32;
    let b20 = ((u >> 20) & 0x1) << 31;
    let b10_1 = ((u >> 1) & 0x3ff) << 21;
    let b11 = ((u >> 11) & 0x1) << 20;
    let b19_12 = ((u >> 12) & 0xff) << 12;
    b20 | b10_1 | b11 | b19_12 | (rd << 7) | 0x6f
}

pub fn encode_jalr(rd: u32, rs1: u32, imm: i32) -> u32 { encode_i_type(0x67, 0x0, rd, rs1, imm) }
pub fn encode_lui(rd: u32, upper: u32) -> u32 { ((upper & 0xfffff) << 12) | (rd << 7) | 0x37 }
pub fn encode_auipc(rd: u32, upper: u32) -> u32 { ((upper & 0xfffff) << 12) | (rd << 7) | 0x17 }

pub fn encode_beq(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_branch(0x0, rs1, rs2, imm) }
pub fn encode_bne(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_branch(0x1, rs1, rs2, imm) }
pub fn encode_blt(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_branch(0x4, rs1, rs2, imm) }
pub fn encode_bge(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_branch(0x5, rs1, rs2, imm) }
pub fn encode_bltu(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_branch(0x6, rs1, rs2, imm) }
pub fn encode_bgeu(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_branch(0x7, rs1, rs2, imm) }

pub fn encode_add(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x33, 0x0, 0x00, rd, rs1, rs2) }
pub fn encode_sub(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x33, 0x0, 0x20, rd, rs1, rs2) }
pub fn encode_mul(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x33, 0x0, 0x01, rd, rs1, rs2) }
pub fn encode_mulhsu(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x33, 0x2, 0x01, rd, rs1, rs2) }
pub fn encode_div(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x33, 0x4, 0x01, rd, rs1, rs2) }
pub fn encode_divu(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x33, 0x5, 0x01, rd, rs1, rs2) }
pub fn encode_rem(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x33, 0x6, 0x01, rd, rs1, rs2) }
pub fn encode_addw(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x3b, 0x0, 0x00, rd, rs1, rs2) }
pub fn encode_divw(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x3b, 0x4, 0x01, rd, rs1, rs2) }
pub fn encode_remw(rd: u32, rs1: u32, rs2: u32) -> u32 { encode_r_type(0x3b, 0x6, 0x01, rd, rs1, rs2) }

pub fn encode_addi(rd: u32, rs1: u32, imm: i32) -> u32 { encode_i_type(0x13, 0x0, rd, rs1, imm) }
pub fn encode_slli(rd: u32, rs1: u32, shamt: u32) -> u32 { encode_i_type(0x13, 0x1, rd, rs1, shamt as i32) }
pub fn encode_srai(rd: u32, rs1: u32, shamt: u32) -> u32 { encode_i_type(0x13, 0x5, rd, rs1, (0x400 | shamt) as i32) }
pub fn encode_addiw(rd: u32, rs1: u32, imm: i32) -> u32 { encode_i_type(0x1b, 0x0, rd, rs1, imm) }

pub fn encode_lb(rd: u32, rs1: u32, imm: i32) -> u32 { encode_i_type(0x03, 0x0, rd, rs1, imm) }
pub fn encode_lbu(rd: u32, rs1: u32, imm: i32) -> u32 { encode_i_type(0x03, 0x4, rd, rs1, imm) }
pub fn encode_lw(rd: u32, rs1: u32, imm: i32) -> u32 { encode_i_type(0x03, 0x2, rd, rs1, imm) }
pub fn encode_lwu(rd: u32, rs1: u32, imm: i32) -> u32 { encode_i_type(0x03, 0x6, rd, rs1, imm) }
pub fn encode_ld(rd: u32, rs1: u32, imm: i32) -> u32 { encode_i_type(0x03, 0x3, rd, rs1, imm) }
pub fn encode_sb(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_s_type(0x23, 0x0, rs1, rs2, imm) }
pub fn encode_sw(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_s_type(0x23, 0x2, rs1, rs2, imm) }
pub fn encode_sd(rs1: u32, rs2: u32, imm: i32) -> u32 { encode_s_type(0x23, 0x3, rs1, rs2, imm) }

pub fn encode_ebreak() -> u32 { 0x0010_0073 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode_auipc(5, 0), 0x0000_0297);
        assert_eq!(encode_sb(5, 0, 16), 0x0002_8823);
        assert_eq!(encode_lbu(10, 5, 16), 0x0102_c503);
        assert_eq!(encode_sd(5, 0, 16), 0x0002_b823);
        assert_eq!(encode_ld(10, 5, 16), 0x0102_b503);
        assert_eq!(encode_addi(0, 0, 0), 0x0000_0013);
        assert_eq!(encode_lui(1, 0x12345), 0x1234_50b7);
        assert_eq!(encode_jal(0, 0), 0x0000_006f);
        assert_eq!(encode_beq(0, 0, -4), 0xfe00_0ee3);
    }
}
