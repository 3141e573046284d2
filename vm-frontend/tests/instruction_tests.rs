//! Single-instruction execution tests for every guest
//!
//! Each test loads a few encoded instructions into a small address space
//! and steps them through `fetch_decode` and the selected row's handler,
//! the same way the interpreter does.

use std::sync::{Arc, Mutex};

use vm_core::{EmuState, ExecutionError, GuestAddr, GuestWord, RunState, VmError, VmResult};
use vm_frontend::{ArchTable, Architecture, LoongArch32r, Mips32, Riscv32, Riscv64, X86};
use vm_ir::{Decode, Rtl};
use vm_mem::AddressSpace;

const BASE: u64 = 0x8000_0000;

struct Machine<A: Architecture> {
    table: ArchTable<A>,
    gpr: Vec<A::Word>,
    pc: A::Word,
    mem: AddressSpace,
    state: EmuState,
}

impl<A: Architecture> Machine<A> {
    fn new(image: &[u8]) -> Self {
        let mut mem = AddressSpace::new(BASE, 0x1_0000);
        mem.write_block(GuestAddr(BASE), image).unwrap();
        let mut state = EmuState::new();
        state.set_state(RunState::Running, 0, 0);
        Self {
            table: A::decode_table().unwrap(),
            gpr: vec![A::Word::ZERO; A::NR_REGS],
            pc: A::Word::from_u64(BASE),
            mem,
            state,
        }
    }

    fn from_words(words: &[u32]) -> Self {
        Self::new(&vm_frontend::words_to_bytes(words))
    }

    fn step(&mut self) -> VmResult<&'static str> {
        let mut s = Decode::new(self.pc);
        let row = A::fetch_decode(&self.table, &mut s, &self.gpr, &mut self.mem)?;
        let (name, exec) = (row.name, row.exec);
        let mut rtl = Rtl::new(&mut s, &mut self.gpr, &mut self.mem, &mut self.state);
        exec(&mut rtl)?;
        if A::ZERO_REG {
            self.gpr[0] = A::Word::ZERO;
        }
        self.pc = s.dnpc;
        Ok(name)
    }

    fn steps(&mut self, n: usize) {
        for _ in 0..n {
            self.step().unwrap();
        }
    }

    fn reg(&self, idx: usize) -> u64 {
        self.gpr[idx].as_u64()
    }

    fn set(&mut self, idx: usize, v: u64) {
        self.gpr[idx] = A::Word::from_u64(v);
    }
}

// ============================================================================
// RISC-V
// ============================================================================

mod riscv {
    use super::*;
    use vm_frontend::riscv::*;

    #[test]
    fn test_builtin_image_halts_cleanly() {
        let mut m = Machine::<Riscv32>::new(&Riscv32::builtin_image());
        m.steps(4);
        assert_eq!(m.state.state, RunState::Ended);
        assert_eq!(m.state.halt_ret, 0);
        assert_eq!(m.state.halt_pc, BASE + 12);
    }

    #[test]
    fn test_zero_register_stays_zero() {
        let mut m = Machine::<Riscv32>::from_words(&[encode_addi(0, 0, 5), encode_add(1, 0, 0)]);
        m.steps(2);
        assert_eq!(m.reg(0), 0);
        assert_eq!(m.reg(1), 0);
    }

    #[test]
    fn test_division_by_zero_follows_isa() {
        let mut m = Machine::<Riscv32>::from_words(&[
            encode_div(3, 1, 2),
            encode_divu(4, 1, 2),
            encode_rem(5, 1, 2),
        ]);
        m.set(1, 7);
        m.steps(3);
        assert_eq!(m.reg(3), 0xffff_ffff);
        assert_eq!(m.reg(4), 0xffff_ffff);
        assert_eq!(m.reg(5), 7);
    }

    #[test]
    fn test_signed_overflow_wraps() {
        let mut m = Machine::<Riscv32>::from_words(&[encode_div(3, 1, 2), encode_rem(4, 1, 2)]);
        m.set(1, 0x8000_0000);
        m.set(2, 0xffff_ffff);
        m.steps(2);
        assert_eq!(m.reg(3), 0x8000_0000);
        assert_eq!(m.reg(4), 0);
    }

    #[test]
    fn test_mulhsu() {
        let mut m = Machine::<Riscv32>::from_words(&[encode_mulhsu(3, 1, 2)]);
        m.set(1, (-2i32) as u32 as u64);
        m.set(2, 0xffff_ffff);
        m.step().unwrap();
        // -2 * (2^32 - 1) 的高 32 位
        assert_eq!(m.reg(3), 0xffff_fffe);
    }

    #[test]
    fn test_jalr_with_rd_equal_rs1() {
        let mut m = Machine::<Riscv32>::from_words(&[encode_jalr(1, 1, 5)]);
        m.set(1, BASE + 0x100);
        m.step().unwrap();
        assert_eq!(m.pc.as_u64(), BASE + 0x104);
        assert_eq!(m.reg(1), BASE + 4);
    }

    #[test]
    fn test_branch_taken_and_not_taken() {
        let mut m = Machine::<Riscv32>::from_words(&[encode_bne(1, 2, 16), encode_beq(1, 1, -4)]);
        m.step().unwrap();
        assert_eq!(m.pc.as_u64(), BASE + 4);
        m.step().unwrap();
        assert_eq!(m.pc.as_u64(), BASE);
    }

    #[test]
    fn test_rv64_word_ops_sign_extend() {
        let mut m = Machine::<Riscv64>::from_words(&[
            encode_addiw(1, 0, -1),
            encode_addw(2, 3, 3),
            encode_divw(4, 3, 0),
            encode_remw(5, 3, 0),
        ]);
        m.set(3, 0x4000_0000);
        m.steps(4);
        assert_eq!(m.reg(1), u64::MAX);
        assert_eq!(m.reg(2), 0xffff_ffff_8000_0000);
        assert_eq!(m.reg(4), u64::MAX);
        assert_eq!(m.reg(5), 0x4000_0000);
    }

    #[test]
    fn test_rv64_doubleword_memory() {
        let mut m = Machine::<Riscv64>::from_words(&[
            encode_sd(1, 2, 0x100),
            encode_ld(3, 1, 0x100),
            encode_lwu(4, 1, 0x104),
            encode_lw(5, 1, 0x104),
        ]);
        m.set(1, BASE);
        m.set(2, 0x8765_4321_1234_5678);
        m.steps(4);
        assert_eq!(m.reg(3), 0x8765_4321_1234_5678);
        assert_eq!(m.reg(4), 0x8765_4321);
        assert_eq!(m.reg(5), 0xffff_ffff_8765_4321);
    }

    #[test]
    fn test_invalid_encoding_aborts() {
        let mut m = Machine::<Riscv32>::from_words(&[0xffff_ffff]);
        assert_eq!(m.step().unwrap(), "inv");
        assert_eq!(m.state.state, RunState::Aborted);
        assert_eq!(m.state.halt_pc, BASE);
        assert!(m.state.is_exit_status_bad());
    }

    #[test]
    fn test_load_outside_memory_is_host_error() {
        let mut m = Machine::<Riscv32>::from_words(&[encode_lw(1, 0, 0)]);
        let err = m.step().unwrap_err();
        assert!(matches!(err, VmError::Memory(_)));
    }
}

// ============================================================================
// MIPS32
// ============================================================================

mod mips {
    use super::*;
    use vm_frontend::mips32::encode::*;

    const HI: usize = 32;
    const LO: usize = 33;

    #[test]
    fn test_builtin_image_halts_cleanly() {
        let mut m = Machine::<Mips32>::new(&Mips32::builtin_image());
        m.steps(4);
        assert_eq!(m.state.state, RunState::Ended);
        assert_eq!(m.state.halt_ret, 0);
    }

    #[test]
    fn test_mult_and_div_use_hi_lo() {
        let mut m = Machine::<Mips32>::from_words(&[
            encode_mult(1, 2),
            encode_mfhi(3),
            encode_mflo(4),
            encode_div(1, 5),
            encode_mfhi(6),
            encode_mflo(7),
        ]);
        m.set(1, (-7i32) as u32 as u64);
        m.set(2, 0x1000_0000);
        m.set(5, 2);
        m.steps(6);
        assert_eq!(m.reg(3), 0xffff_ffff);
        assert_eq!(m.reg(4), 0x9000_0000);
        assert_eq!(m.reg(6), (-1i32) as u32 as u64);
        assert_eq!(m.reg(7), (-3i32) as u32 as u64);
    }

    #[test]
    fn test_divide_by_zero_leaves_hi_lo() {
        let mut m = Machine::<Mips32>::from_words(&[encode_divu(1, 0)]);
        m.set(HI, 0x11);
        m.set(LO, 0x22);
        m.set(1, 9);
        m.step().unwrap();
        assert_eq!((m.reg(HI), m.reg(LO)), (0x11, 0x22));
    }

    #[test]
    fn test_conditional_moves() {
        let mut m = Machine::<Mips32>::from_words(&[encode_movz(3, 1, 0), encode_movn(4, 1, 0)]);
        m.set(1, 42);
        m.set(4, 7);
        m.steps(2);
        assert_eq!(m.reg(3), 42);
        assert_eq!(m.reg(4), 7);
    }

    #[test]
    fn test_jal_links_without_delay_slot() {
        let mut m = Machine::<Mips32>::from_words(&[encode_jal(BASE as u32 + 0x40)]);
        m.step().unwrap();
        assert_eq!(m.pc.as_u64(), BASE + 0x40);
        assert_eq!(m.reg(31), BASE + 4);
    }

    #[test]
    fn test_nor_and_set_less_than() {
        let mut m = Machine::<Mips32>::from_words(&[
            encode_nor(3, 1, 2),
            encode_slt(4, 1, 2),
            encode_sltiu(5, 1, -1),
        ]);
        m.set(1, 0xffff_0000);
        m.set(2, 0x0000_00ff);
        m.steps(3);
        assert_eq!(m.reg(3), 0x0000_ff00);
        assert_eq!(m.reg(4), 1);
        assert_eq!(m.reg(5), 1);
    }
}

// ============================================================================
// LoongArch32r
// ============================================================================

mod loongarch {
    use super::*;
    use vm_frontend::loongarch32r::encode::*;

    #[test]
    fn test_builtin_image_halts_cleanly() {
        let mut m = Machine::<LoongArch32r>::new(&LoongArch32r::builtin_image());
        m.steps(4);
        assert_eq!(m.state.state, RunState::Ended);
        assert_eq!(m.state.halt_ret, 0);
    }

    #[test]
    fn test_divide_by_zero_writes_zero() {
        let mut m = Machine::<LoongArch32r>::from_words(&[encode_div_w(5, 4, 0), encode_mod_w(6, 4, 0)]);
        m.set(4, 100);
        m.set(5, 1);
        m.set(6, 1);
        m.steps(2);
        assert_eq!(m.reg(5), 0);
        assert_eq!(m.reg(6), 0);
    }

    #[test]
    fn test_bl_and_jirl_return() {
        let mut m = Machine::<LoongArch32r>::from_words(&[encode_bl(8), 0, encode_jirl(0, 1, 0)]);
        m.step().unwrap();
        assert_eq!(m.pc.as_u64(), BASE + 8);
        assert_eq!(m.reg(1), BASE + 4);
        m.step().unwrap();
        assert_eq!(m.pc.as_u64(), BASE + 4);
    }

    #[test]
    fn test_lu12i_ori_builds_constant() {
        let mut m = Machine::<LoongArch32r>::from_words(&[
            encode_lu12i_w(4, 0x12345),
            encode_ori(4, 4, 0x678),
            encode_srai_w(5, 4, 4),
        ]);
        m.steps(3);
        assert_eq!(m.reg(4), 0x1234_5678);
        assert_eq!(m.reg(5), 0x0123_4567);
    }
}

// ============================================================================
// x86
// ============================================================================

mod x86 {
    use super::*;
    use vm_frontend::x86::encode::*;
    use vm_frontend::x86::{EAX, EBX, ECX, EDX, ESP};

    fn image(parts: &[Vec<u8>]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn test_builtin_image_halts_cleanly() {
        let mut m = Machine::<X86>::new(&X86::builtin_image());
        m.steps(8);
        assert_eq!(m.state.state, RunState::Ended);
        assert_eq!(m.state.halt_ret, 0);
        let data = m.mem.read_block(GuestAddr(BASE + 0x100), 8).unwrap();
        assert_eq!(data.to_vec(), vec![0x01, 0x00, 0x00, 0x00, 0xcd, 0xab, 0x00, 0x00]);
    }

    #[test]
    fn test_byte_registers_alias_correctly() {
        // mov ah, 0x12 ; mov al, 0x34 ; mov bl, ah
        let mut m = Machine::<X86>::new(&[0xb4, 0x12, 0xb0, 0x34, 0x88, 0xe3]);
        m.set(EAX as usize, 0xdead_0000);
        m.steps(3);
        assert_eq!(m.reg(EAX as usize), 0xdead_1234);
        assert_eq!(m.reg(EBX as usize) & 0xff, 0x12);
    }

    #[test]
    fn test_counted_loop_with_flags() {
        // mov ecx, 3 ; xor eax, eax ; L: add eax, ecx ; dec ecx ; jne L ; int3
        let mut m = Machine::<X86>::new(&image(&[
            encode_mov_imm(ECX as u8, 3),
            encode_rr(0x31, EAX as u8, EAX as u8),
            encode_rr(0x01, EAX as u8, ECX as u8),
            vec![0x49],
            encode_jcc8(0x5, -5),
            encode_int3(),
        ]));
        for _ in 0..64 {
            if m.state.state != RunState::Running {
                break;
            }
            m.step().unwrap();
        }
        assert_eq!(m.state.state, RunState::Ended);
        assert_eq!(m.state.halt_ret, 6);
    }

    #[test]
    fn test_carry_and_overflow() {
        // mov eax, 0x7fffffff ; add eax, 1 ; setc bl ; seto bh
        let mut m = Machine::<X86>::new(&image(&[
            encode_mov_imm(EAX as u8, 0x7fff_ffff),
            vec![0x83, 0xc0, 0x01],
            vec![0x0f, 0x92, 0xc3],
            vec![0x0f, 0x90, 0xc7],
        ]));
        m.steps(4);
        assert_eq!(m.reg(EAX as usize), 0x8000_0000);
        assert_eq!(m.reg(EBX as usize) & 0xffff, 0x0100);
    }

    #[test]
    fn test_cmp_sets_borrow_without_writing() {
        // cmp eax, 5 ; setb cl
        let mut m = Machine::<X86>::new(&image(&[encode_gp1_imm(7, EAX as u8, 5), vec![0x0f, 0x92, 0xc1]]));
        m.set(EAX as usize, 3);
        m.steps(2);
        assert_eq!(m.reg(EAX as usize), 3);
        assert_eq!(m.reg(ECX as usize) & 0xff, 1);
    }

    #[test]
    fn test_call_ret_and_stack() {
        // call +1 ; int3 ; push ebx ; pop edx ; ret
        let mut m = Machine::<X86>::new(&image(&[
            encode_call(1),
            encode_int3(),
            encode_push(EBX as u8),
            encode_pop(EDX as u8),
            encode_ret(),
        ]));
        m.set(ESP as usize, BASE + 0x1000);
        m.set(EBX as usize, 0x55);
        m.steps(4);
        assert_eq!(m.pc.as_u64(), BASE + 5);
        assert_eq!(m.reg(EDX as usize), 0x55);
        assert_eq!(m.reg(ESP as usize), BASE + 0x1000);
        m.step().unwrap();
        assert_eq!(m.state.state, RunState::Ended);
    }

    #[test]
    fn test_mul_and_div() {
        // mul ebx ; div ecx
        let mut m = Machine::<X86>::new(&[0xf7, 0xe3, 0xf7, 0xf1]);
        m.set(EAX as usize, 0x8000_0000);
        m.set(EBX as usize, 4);
        m.set(ECX as usize, 3);
        m.step().unwrap();
        assert_eq!((m.reg(EDX as usize), m.reg(EAX as usize)), (2, 0));
        m.step().unwrap();
        assert_eq!(m.reg(EAX as usize), 0x2_0000_0000 / 3);
        assert_eq!(m.reg(EDX as usize), 0x2_0000_0000 % 3);
    }

    #[test]
    fn test_divide_by_zero_is_fatal() {
        // div ecx
        let mut m = Machine::<X86>::new(&[0xf7, 0xf1]);
        let err = m.step().unwrap_err();
        assert!(matches!(err, VmError::Execution(ExecutionError::DivisionByZero)));
    }

    #[test]
    fn test_divide_overflow_is_fatal() {
        let mut m = Machine::<X86>::new(&[0xf7, 0xf1]);
        m.set(EDX as usize, 5);
        m.set(ECX as usize, 2);
        let err = m.step().unwrap_err();
        assert!(matches!(err, VmError::Execution(ExecutionError::DivideOverflow)));
    }

    #[test]
    fn test_movzx_movsx() {
        // movzx eax, bl ; movsx edx, bl
        let mut m = Machine::<X86>::new(&[0x0f, 0xb6, 0xc3, 0x0f, 0xbe, 0xd3]);
        m.set(EBX as usize, 0x80);
        m.steps(2);
        assert_eq!(m.reg(EAX as usize), 0x80);
        assert_eq!(m.reg(EDX as usize), 0xffff_ff80);
    }

    #[test]
    fn test_port_output_reaches_device() {
        // mov edx, 0x3f8 ; mov al, 'A' ; out dx, al
        let mut m = Machine::<X86>::new(&image(&[encode_mov_imm(EDX as u8, 0x3f8), vec![0xb0, b'A', 0xee]]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let buf = m.mem.new_space(8).unwrap();
        m.mem
            .add_pio_map(
                "serial",
                0x3f8,
                8,
                buf,
                Some(Box::new(move |space: &mut [u8], off: u64, _len: usize, is_write: bool| {
                    if is_write {
                        sink.lock().unwrap().push(space[off as usize]);
                    }
                })),
            )
            .unwrap();
        m.steps(3);
        assert_eq!(&*seen.lock().unwrap(), b"A");
    }
}
