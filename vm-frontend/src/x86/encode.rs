//! x86 指令字节序列构造，供测试使用

pub fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    (mode << 6) | ((reg & 7) << 3) | (rm & 7)
}

pub fn sib(scale: u8, index: u8, base: u8) -> u8 {
    (scale << 6) | ((index & 7) << 3) | (base & 7)
}

/// mov r32, imm32
pub fn encode_mov_imm(reg: u8, imm: u32) -> Vec<u8> {
    let mut v = vec![0xb8 + (reg & 7)];
    v.extend_from_slice(&imm.to_le_bytes());
    v
}

/// op r/m32, r32（寄存器直接寻址）
pub fn encode_rr(opcode: u8, dst: u8, src: u8) -> Vec<u8> {
    vec![opcode, modrm(3, src, dst)]
}

/// 组 1 运算 r32, imm32
pub fn encode_gp1_imm(op: u8, reg: u8, imm: u32) -> Vec<u8> {
    let mut v = vec![0x81, modrm(3, op, reg)];
    v.extend_from_slice(&imm.to_le_bytes());
    v
}

pub fn encode_push(reg: u8) -> Vec<u8> {
    vec![0x50 + (reg & 7)]
}

pub fn encode_pop(reg: u8) -> Vec<u8> {
    vec![0x58 + (reg & 7)]
}

/// call rel32，`rel` 相对下一条指令
pub fn encode_call(rel: i32) -> Vec<u8> {
    let mut v = vec![0xe8];
    v.extend_from_slice(&rel.to_le_bytes());
    v
}

pub fn encode_jcc8(cc: u8, rel: i8) -> Vec<u8> {
    vec![0x70 | (cc & 0xf), rel as u8]
}

pub fn encode_ret() -> Vec<u8> {
    vec![0xc3]
}

pub fn encode_int3() -> Vec<u8> {
    vec![0xcc]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode_mov_imm(1, 0x8000_0100), [0xb9, 0x00, 0x01, 0x00, 0x80]);
        assert_eq!(modrm(2, 0, 4), 0x84);
        assert_eq!(sib(2, 3, 1), 0x99);
        assert_eq!(encode_rr(0x01, 0, 3), [0x01, 0xd8]);
        assert_eq!(encode_gp1_imm(7, 0, 5), [0x81, 0xf8, 5, 0, 0, 0]);
    }
}
