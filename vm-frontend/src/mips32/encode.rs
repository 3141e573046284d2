//! MIPS32 指令编码辅助函数

fn imm16(imm: i32) -> u32 {
    (imm as u32) & 0xffff
}

pub fn encode_r(funct: u32, rd: u32, rs: u32, rt: u32, sa: u32) -> u32 {
    (rs << 21) | (rt << 16) | (rd << 11) | (sa << 6) | funct
}

pub fn encode_i(op: u32, rt: u32, rs: u32, imm: i32) -> u32 {
    (op << 26) | (rs << 21) | (rt << 16) | imm16(imm)
}

pub fn encode_addu(rd: u32, rs: u32, rt: u32) -> u32 { encode_r(0x21, rd, rs, rt, 0) }
pub fn encode_subu(rd: u32, rs: u32, rt: u32) -> u32 { encode_r(0x23, rd, rs, rt, 0) }
pub fn encode_nor(rd: u32, rs: u32, rt: u32) -> u32 { encode_r(0x27, rd, rs, rt, 0) }
pub fn encode_slt(rd: u32, rs: u32, rt: u32) -> u32 { encode_r(0x2a, rd, rs, rt, 0) }
pub fn encode_sll(rd: u32, rt: u32, sa: u32) -> u32 { encode_r(0x00, rd, 0, rt, sa) }
pub fn encode_sra(rd: u32, rt: u32, sa: u32) -> u32 { encode_r(0x03, rd, 0, rt, sa) }
pub fn encode_sllv(rd: u32, rt: u32, rs: u32) -> u32 { encode_r(0x04, rd, rs, rt, 0) }
pub fn encode_jr(rs: u32) -> u32 { encode_r(0x08, 0, rs, 0, 0) }
pub fn encode_jalr(rd: u32, rs: u32) -> u32 { encode_r(0x09, rd, rs, 0, 0) }
pub fn encode_movz(rd: u32, rs: u32, rt: u32) -> u32 { encode_r(0x0a, rd, rs, rt, 0) }
pub fn encode_movn(rd: u32, rs: u32, rt: u32) -> u32 { encode_r(0x0b, rd, rs, rt, 0) }
pub fn encode_mfhi(rd: u32) -> u32 { encode_r(0x10, rd, 0, 0, 0) }
pub fn encode_mflo(rd: u32) -> u32 { encode_r(0x12, rd, 0, 0, 0) }
pub fn encode_mult(rs: u32, rt: u32) -> u32 { encode_r(0x18, 0, rs, rt, 0) }
pub fn encode_multu(rs: u32, rt: u32) -> u32 { encode_r(0x19, 0, rs, rt, 0) }
pub fn encode_div(rs: u32, rt: u32) -> u32 { encode_r(0x1a, 0, rs, rt, 0) }
pub fn encode_divu(rs: u32, rt: u32) -> u32 { encode_r(0x1b, 0, rs, rt, 0) }
pub fn encode_mul(rd: u32, rs: u32, rt: u32) -> u32 { (0x1c << 26) | encode_r(0x02, rd, rs, rt, 0) }
pub fn encode_sdbbp() -> u32 { (0x1c << 26) | 0x3f }

pub fn encode_lui(rt: u32, imm: u32) -> u32 { encode_i(0x0f, rt, 0, imm as i32) }
pub fn encode_addiu(rt: u32, rs: u32, imm: i32) -> u32 { encode_i(0x09, rt, rs, imm) }
pub fn encode_ori(rt: u32, rs: u32, imm: u32) -> u32 { encode_i(0x0d, rt, rs, imm as i32) }
pub fn encode_sltiu(rt: u32, rs: u32, imm: i32) -> u32 { encode_i(0x0b, rt, rs, imm) }
pub fn encode_lb(rt: u32, rs: u32, imm: i32) -> u32 { encode_i(0x20, rt, rs, imm) }
pub fn encode_lw(rt: u32, rs: u32, imm: i32) -> u32 { encode_i(0x23, rt, rs, imm) }
pub fn encode_sb(rt: u32, rs: u32, imm: i32) -> u32 { encode_i(0x28, rt, rs, imm) }
pub fn encode_sw(rt: u32, rs: u32, imm: i32) -> u32 { encode_i(0x2b, rt, rs, imm) }

/// `offset` 以指令为单位，相对 `pc + 4`
pub fn encode_beq(rs: u32, rt: u32, offset: i32) -> u32 { encode_i(0x04, rt, rs, offset) }
pub fn encode_bne(rs: u32, rt: u32, offset: i32) -> u32 { encode_i(0x05, rt, rs, offset) }
pub fn encode_blez(rs: u32, offset: i32) -> u32 { encode_i(0x06, 0, rs, offset) }
pub fn encode_bgtz(rs: u32, offset: i32) -> u32 { encode_i(0x07, 0, rs, offset) }
pub fn encode_bltz(rs: u32, offset: i32) -> u32 { encode_i(0x01, 0, rs, offset) }
pub fn encode_bgez(rs: u32, offset: i32) -> u32 { encode_i(0x01, 1, rs, offset) }

/// `target` 为字节地址
pub fn encode_j(target: u32) -> u32 { (0x02 << 26) | ((target >> 2) & 0x03ff_ffff) }
pub fn encode_jal(target: u32) -> u32 { (0x03 << 26) | ((target >> 2) & 0x03ff_ffff) }
