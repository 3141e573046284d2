//! RTL primitive tests
//!
//! Exercises the execution context against a real address space: memory
//! primitives, control-flow targets, host calls and the temporaries.

use vm_core::{EmuState, ExecutionError, GuestAddr, MemoryAccess, MemoryError, RunState, VmError};
use vm_ir::{Decode, Reg, RelOp, Rtl, S0, S1};
use vm_mem::AddressSpace;

const BASE: u64 = 0x8000_0000;

struct Harness<W: vm_core::GuestWord> {
    s: Decode<W>,
    gpr: Vec<W>,
    mem: AddressSpace,
    state: EmuState,
}

impl<W: vm_core::GuestWord> Harness<W> {
    fn new(pc: W) -> Self {
        let mut s = Decode::new(pc);
        s.snpc = pc.wrapping_add(W::from_u64(4));
        s.dnpc = s.snpc;
        Self {
            s,
            gpr: vec![W::ZERO; 32],
            mem: AddressSpace::new(BASE, 0x1_0000),
            state: EmuState {
                state: RunState::Running,
                ..EmuState::default()
            },
        }
    }

    fn rtl(&mut self) -> Rtl<'_, W> {
        Rtl::new(&mut self.s, &mut self.gpr, &mut self.mem, &mut self.state)
    }
}

fn r(i: u32) -> Reg {
    Reg::Gpr(i)
}

#[test]
fn test_compute_and_zero_register() {
    let mut h = Harness::<u32>::new(0x1000);
    let mut rtl = h.rtl();
    rtl.li(r(1), 0x1234);
    rtl.addi(r(2), r(1), 0xffff_ffff);
    rtl.shli(r(3), r(1), 36);
    rtl.add(Reg::Zero, r(1), r(1));
    rtl.setrelopi(RelOp::Ltu, r(4), r(1), 0x2000);
    rtl.neg(r(5), r(1));
    rtl.not(r(6), Reg::Zero);
    assert_eq!(rtl.get(r(2)), 0x1233);
    assert_eq!(rtl.get(r(3)), 0x1_2340);
    assert_eq!(rtl.get(Reg::Zero), 0);
    assert_eq!(rtl.get(r(4)), 1);
    assert_eq!(rtl.get(r(5)), 0xffff_edcc);
    assert_eq!(rtl.get(r(6)), u32::MAX);
}

#[test]
fn test_temporaries_are_private() {
    let mut h = Harness::<u32>::new(0x1000);
    {
        let mut rtl = h.rtl();
        rtl.li(S0, 7);
        rtl.li(S1, 5);
        rtl.sub(r(1), S0, S1);
    }
    assert_eq!(h.gpr[1], 2);
    assert!(h.gpr.iter().enumerate().all(|(i, v)| i == 1 || *v == 0));
}

#[test]
fn test_extension_pseudo_ops() {
    let mut h = Harness::<u64>::new(0x1000);
    let mut rtl = h.rtl();
    rtl.li(r(1), 0x80);
    rtl.sext(r(2), r(1), 1);
    rtl.zext(r(3), r(2), 2);
    rtl.msb(r(4), r(1), 1);
    rtl.mv(r(5), r(3));
    assert_eq!(rtl.get(r(2)), 0xffff_ffff_ffff_ff80);
    assert_eq!(rtl.get(r(3)), 0xff80);
    assert_eq!(rtl.get(r(4)), 1);
    assert_eq!(rtl.get(r(5)), 0xff80);
}

#[test]
fn test_load_store() {
    let mut h = Harness::<u32>::new(0x1000);
    let mut rtl = h.rtl();
    rtl.li(r(1), BASE as u32);
    rtl.li(r(2), 0x8765_43f0);
    rtl.sm(r(1), 0x10, r(2), 4).unwrap();
    rtl.lm(r(3), r(1), 0x10, 1).unwrap();
    rtl.lms(r(4), r(1), 0x10, 1).unwrap();
    rtl.lms(r(5), r(1), 0x12, 2).unwrap();
    rtl.lm(r(6), r(1), 0x14, 4).unwrap();
    assert_eq!(rtl.get(r(3)), 0xf0);
    assert_eq!(rtl.get(r(4)), 0xffff_fff0);
    assert_eq!(rtl.get(r(5)), 0xffff_8765);
    assert_eq!(rtl.get(r(6)), 0);
}

#[test]
fn test_bad_width_is_fatal() {
    let mut h = Harness::<u32>::new(0x1000);
    let mut rtl = h.rtl();
    rtl.li(r(1), BASE as u32);
    let err = rtl.lm(r(2), r(1), 0, 8).unwrap_err();
    assert!(matches!(err, VmError::Memory(MemoryError::InvalidWidth { len: 8 })));
    let err = rtl.sm(r(1), 0, r(1), 3).unwrap_err();
    assert!(matches!(err, VmError::Memory(MemoryError::InvalidWidth { len: 3 })));
}

#[test]
fn test_out_of_bound_is_fatal() {
    let mut h = Harness::<u32>::new(0x1000);
    let mut rtl = h.rtl();
    let err = rtl.lm(r(2), Reg::Zero, 0x100, 4).unwrap_err();
    assert!(matches!(err, VmError::Memory(MemoryError::OutOfBound { .. })));
}

#[test]
fn test_division_by_zero_is_not_masked() {
    let mut h = Harness::<u32>::new(0x1000);
    let mut rtl = h.rtl();
    rtl.li(r(1), 10);
    let err = rtl.div_q(r(2), r(1), Reg::Zero).unwrap_err();
    assert!(matches!(err, VmError::Execution(ExecutionError::DivisionByZero)));
    let err = rtl.idiv64_r(r(2), Reg::Zero, r(1), Reg::Zero).unwrap_err();
    assert!(matches!(err, VmError::Execution(ExecutionError::DivisionByZero)));
    rtl.li(r(3), 3);
    rtl.idiv_r(r(4), r(1), r(3)).unwrap();
    assert_eq!(rtl.get(r(4)), 1);
}

#[test]
fn test_sequential_and_branch_targets() {
    let h = Harness::<u32>::new(0x1000);
    assert_eq!(h.s.dnpc, 0x1004);

    let mut h = Harness::<u32>::new(0x2000);
    {
        let mut rtl = h.rtl();
        rtl.li(r(1), 1);
        rtl.jrelop(RelOp::Eq, r(1), r(1), 0x2100);
    }
    assert_eq!(h.s.dnpc, 0x2100);

    let mut h = Harness::<u32>::new(0x2000);
    {
        let mut rtl = h.rtl();
        rtl.li(r(1), 1);
        rtl.jrelop(RelOp::Eq, r(1), Reg::Zero, 0x2100);
    }
    assert_eq!(h.s.dnpc, h.s.snpc);

    let mut h = Harness::<u32>::new(0x3000);
    {
        let mut rtl = h.rtl();
        rtl.li(r(7), 0x4444);
        rtl.jr(r(7));
    }
    assert_eq!(h.s.dnpc, 0x4444);
}

#[test]
fn test_exit_and_inv_update_state() {
    let mut h = Harness::<u32>::new(0x8000_000c);
    {
        let mut rtl = h.rtl();
        rtl.li(r(10), 0x1234);
        rtl.exit(r(10));
    }
    assert_eq!(h.state.state, RunState::Ended);
    assert_eq!(h.state.halt_pc, 0x8000_000c);
    assert_eq!(h.state.halt_ret, 0x1234);

    let mut h = Harness::<u32>::new(BASE as u32);
    h.mem.write(GuestAddr(BASE), 4, 0xffff_ffff).unwrap();
    h.rtl().inv();
    assert_eq!(h.state.state, RunState::Aborted);
    assert_eq!(h.state.halt_pc, BASE);
}

#[test]
fn test_port_io() {
    let mut h = Harness::<u32>::new(0x1000);
    let buf = h.mem.new_space(4).unwrap();
    h.mem.add_pio_map("latch", 0x60, 4, buf, None).unwrap();
    let mut rtl = h.rtl();
    rtl.li(r(1), 0x60);
    rtl.li(r(2), 0xab);
    rtl.pio_out(r(1), r(2), 1).unwrap();
    rtl.pio_in(r(3), r(1), 4).unwrap();
    assert_eq!(rtl.get(r(3)), 0xab);
}
