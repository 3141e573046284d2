//! RTL 执行上下文
//!
//! 每条指令的语义都用这里的原语表达：计算、比较、乘除、访存、控制流和
//! 宿主调用。原语读写的是架构寄存器、四个临时寄存器或恒零寄存器，由
//! [`Reg`] 统一描述。

use log::error;
use vm_core::{EmuState, ExecutionError, GuestAddr, GuestWord, MemoryAccess, MemoryError, VmResult};
use vm_core::word::{sext, zext};

use crate::decode::Decode;
use crate::op::{self, AluOp, DivOp};
use crate::relop::RelOp;
use crate::RegId;

/// 临时寄存器个数
pub const NR_TMP: usize = 4;

/// RTL 操作数的存放位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    /// 架构寄存器
    Gpr(RegId),
    /// 临时寄存器
    Tmp(u8),
    /// 读为零、写被丢弃
    Zero,
}

pub const S0: Reg = Reg::Tmp(0);
pub const S1: Reg = Reg::Tmp(1);
pub const S2: Reg = Reg::Tmp(2);
pub const T0: Reg = Reg::Tmp(3);

/// 第二源操作数：寄存器或立即数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Src<W> {
    Reg(Reg),
    Imm(W),
}

impl<W> From<Reg> for Src<W> {
    fn from(r: Reg) -> Self {
        Src::Reg(r)
    }
}

/// Execution context handed to one instruction's handler.
pub struct Rtl<'a, W: GuestWord> {
    pub s: &'a mut Decode<W>,
    gpr: &'a mut [W],
    tmp: [W; NR_TMP],
    mem: &'a mut dyn MemoryAccess,
    state: &'a mut EmuState,
}

macro_rules! def_rtl_compute {
    ($($name:ident, $namei:ident => $op:ident;)*) => {
        $(
            pub fn $name(&mut self, dest: Reg, src1: Reg, src2: Reg) {
                self.alu(AluOp::$op, dest, src1, Src::Reg(src2));
            }

            pub fn $namei(&mut self, dest: Reg, src1: Reg, imm: W) {
                self.alu(AluOp::$op, dest, src1, Src::Imm(imm));
            }
        )*
    };
}

macro_rules! def_rtl_div {
    ($($name:ident => $op:ident;)*) => {
        $(
            pub fn $name(&mut self, dest: Reg, src1: Reg, src2: Reg) -> VmResult<()> {
                self.div(DivOp::$op, dest, src1, src2)
            }
        )*
    };
}

impl<'a, W: GuestWord> Rtl<'a, W> {
    pub fn new(
        s: &'a mut Decode<W>,
        gpr: &'a mut [W],
        mem: &'a mut dyn MemoryAccess,
        state: &'a mut EmuState,
    ) -> Self {
        Self {
            s,
            gpr,
            tmp: [W::ZERO; NR_TMP],
            mem,
            state,
        }
    }

    // ------------------------------------------------------------------------
    // 寄存器
    // ------------------------------------------------------------------------

    #[inline]
    pub fn get(&self, r: Reg) -> W {
        match r {
            Reg::Gpr(i) => self.gpr[i as usize],
            Reg::Tmp(i) => self.tmp[i as usize],
            Reg::Zero => W::ZERO,
        }
    }

    #[inline]
    pub fn set(&mut self, r: Reg, v: W) {
        match r {
            Reg::Gpr(i) => self.gpr[i as usize] = v,
            Reg::Tmp(i) => self.tmp[i as usize] = v,
            Reg::Zero => {}
        }
    }

    fn value(&self, src: Src<W>) -> W {
        match src {
            Src::Reg(r) => self.get(r),
            Src::Imm(v) => v,
        }
    }

    pub fn state(&self) -> &EmuState {
        self.state
    }

    /// 访存接口，供需要直接访问地址空间的架构代码使用
    pub fn mem(&mut self) -> &mut (dyn MemoryAccess + 'a) {
        &mut *self.mem
    }

    // ------------------------------------------------------------------------
    // 计算
    // ------------------------------------------------------------------------

    pub fn alu(&mut self, op: AluOp, dest: Reg, src1: Reg, src2: Src<W>) {
        let v = op.eval(self.get(src1), self.value(src2));
        self.set(dest, v);
    }

    def_rtl_compute! {
        add, addi => Add;
        sub, subi => Sub;
        and, andi => And;
        or, ori => Or;
        xor, xori => Xor;
        shl, shli => Shl;
        shr, shri => Shr;
        sar, sari => Sar;
        addw, addiw => AddW;
        subw, subiw => SubW;
        shlw, shliw => ShlW;
        shrw, shriw => ShrW;
        sarw, sariw => SarW;
    }

    pub fn setrelop(&mut self, relop: RelOp, dest: Reg, src1: Reg, src2: Reg) {
        let v = relop.eval(self.get(src1), self.get(src2));
        self.set(dest, W::from_bool(v));
    }

    pub fn setrelopi(&mut self, relop: RelOp, dest: Reg, src1: Reg, imm: W) {
        let v = relop.eval(self.get(src1), imm);
        self.set(dest, W::from_bool(v));
    }

    // ------------------------------------------------------------------------
    // 乘除
    // ------------------------------------------------------------------------

    pub fn mul_lo(&mut self, dest: Reg, src1: Reg, src2: Reg) {
        self.alu(AluOp::MulLo, dest, src1, Src::Reg(src2));
    }

    pub fn mul_hi(&mut self, dest: Reg, src1: Reg, src2: Reg) {
        self.alu(AluOp::MulHi, dest, src1, Src::Reg(src2));
    }

    pub fn imul_lo(&mut self, dest: Reg, src1: Reg, src2: Reg) {
        self.alu(AluOp::IMulLo, dest, src1, Src::Reg(src2));
    }

    pub fn imul_hi(&mut self, dest: Reg, src1: Reg, src2: Reg) {
        self.alu(AluOp::IMulHi, dest, src1, Src::Reg(src2));
    }

    pub fn mulw(&mut self, dest: Reg, src1: Reg, src2: Reg) {
        self.alu(AluOp::MulW, dest, src1, Src::Reg(src2));
    }

    /// 除数为零时返回错误，由调用方按架构规定先行处理
    pub fn div(&mut self, op: DivOp, dest: Reg, src1: Reg, src2: Reg) -> VmResult<()> {
        let v = op
            .eval(self.get(src1), self.get(src2))
            .ok_or(ExecutionError::DivisionByZero)?;
        self.set(dest, v);
        Ok(())
    }

    def_rtl_div! {
        div_q => DivQ;
        div_r => DivR;
        idiv_q => IDivQ;
        idiv_r => IDivR;
        divw => DivW;
        divuw => DivUW;
        remw => RemW;
        remuw => RemUW;
    }

    fn div_wide(
        &mut self,
        f: fn(W, W, W) -> Option<W>,
        dest: Reg,
        hi: Reg,
        lo: Reg,
        divisor: Reg,
    ) -> VmResult<()> {
        let v = f(self.get(hi), self.get(lo), self.get(divisor))
            .ok_or(ExecutionError::DivisionByZero)?;
        self.set(dest, v);
        Ok(())
    }

    /// `dest = (hi:lo) / divisor`
    pub fn div64_q(&mut self, dest: Reg, hi: Reg, lo: Reg, divisor: Reg) -> VmResult<()> {
        self.div_wide(op::div64_q, dest, hi, lo, divisor)
    }

    pub fn div64_r(&mut self, dest: Reg, hi: Reg, lo: Reg, divisor: Reg) -> VmResult<()> {
        self.div_wide(op::div64_r, dest, hi, lo, divisor)
    }

    pub fn idiv64_q(&mut self, dest: Reg, hi: Reg, lo: Reg, divisor: Reg) -> VmResult<()> {
        self.div_wide(op::idiv64_q, dest, hi, lo, divisor)
    }

    pub fn idiv64_r(&mut self, dest: Reg, hi: Reg, lo: Reg, divisor: Reg) -> VmResult<()> {
        self.div_wide(op::idiv64_r, dest, hi, lo, divisor)
    }

    // ------------------------------------------------------------------------
    // 访存
    // ------------------------------------------------------------------------

    fn check_len(len: usize) -> Result<(), MemoryError> {
        match len {
            1 | 2 | 4 => Ok(()),
            8 if W::BYTES == 8 => Ok(()),
            _ => Err(MemoryError::InvalidWidth { len }),
        }
    }

    fn ea(&self, addr: Reg, offset: W) -> GuestAddr {
        GuestAddr(self.get(addr).wrapping_add(offset).as_u64())
    }

    /// 零扩展载入
    pub fn lm(&mut self, dest: Reg, addr: Reg, offset: W, len: usize) -> VmResult<()> {
        Self::check_len(len)?;
        let ea = self.ea(addr, offset);
        let v = self.mem.read(ea, len)?;
        self.set(dest, W::from_u64(v));
        Ok(())
    }

    /// 符号扩展载入
    pub fn lms(&mut self, dest: Reg, addr: Reg, offset: W, len: usize) -> VmResult<()> {
        Self::check_len(len)?;
        let ea = self.ea(addr, offset);
        let v = self.mem.read(ea, len)?;
        self.set(dest, W::from_i64(sext(v, 8 * len as u32)));
        Ok(())
    }

    pub fn sm(&mut self, addr: Reg, offset: W, src: Reg, len: usize) -> VmResult<()> {
        Self::check_len(len)?;
        let ea = self.ea(addr, offset);
        let v = self.get(src).as_u64();
        self.mem.write(ea, len, v)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // 控制流
    // ------------------------------------------------------------------------

    pub fn j(&mut self, target: W) {
        self.s.dnpc = target;
    }

    pub fn jr(&mut self, target: Reg) {
        self.s.dnpc = self.get(target);
    }

    /// 条件成立时跳转，否则保持顺序执行
    pub fn jrelop(&mut self, relop: RelOp, src1: Reg, src2: Reg, target: W) {
        if relop.eval(self.get(src1), self.get(src2)) {
            self.s.dnpc = target;
        }
    }

    // ------------------------------------------------------------------------
    // 伪指令
    // ------------------------------------------------------------------------

    pub fn li(&mut self, dest: Reg, imm: W) {
        self.set(dest, imm);
    }

    pub fn mv(&mut self, dest: Reg, src: Reg) {
        if dest != src {
            let v = self.get(src);
            self.set(dest, v);
        }
    }

    pub fn not(&mut self, dest: Reg, src: Reg) {
        let v = self.get(src);
        self.set(dest, W::from_u64(!v.as_u64()));
    }

    pub fn neg(&mut self, dest: Reg, src: Reg) {
        let v = self.get(src);
        self.set(dest, W::ZERO.wrapping_sub(v));
    }

    /// 将低 `width` 字节符号扩展
    pub fn sext(&mut self, dest: Reg, src: Reg, width: usize) {
        let v = self.get(src).as_u64();
        self.set(dest, W::from_i64(sext(v, 8 * width as u32)));
    }

    /// 将低 `width` 字节零扩展
    pub fn zext(&mut self, dest: Reg, src: Reg, width: usize) {
        let v = self.get(src).as_u64();
        self.set(dest, W::from_u64(zext(v, 8 * width as u32)));
    }

    /// 取 `width` 字节数据的最高位
    pub fn msb(&mut self, dest: Reg, src: Reg, width: usize) {
        let v = self.get(src).as_u64();
        self.set(dest, W::from_u64((v >> (8 * width - 1)) & 1));
    }

    // ------------------------------------------------------------------------
    // 宿主调用
    // ------------------------------------------------------------------------

    /// 客户机停机，以 `code` 寄存器的值为结果码
    pub fn exit(&mut self, code: Reg) {
        let ret = self.get(code).as_u64();
        self.state.end(self.s.pc.as_u64(), ret);
    }

    /// 非法指令
    pub fn inv(&mut self) {
        let pc = self.s.pc.as_u64();
        let mut dump = Vec::with_capacity(8);
        for i in 0..8 {
            match self.mem.ifetch(GuestAddr(pc.wrapping_add(i)), 1) {
                Ok(b) => dump.push(format!("{:02x}", b)),
                Err(_) => break,
            }
        }
        error!("invalid opcode(PC = {:#010x}):", pc);
        error!("\t{} ...", dump.join(" "));
        error!("There are two cases which will trigger this unexpected exception:");
        error!("1. The instruction at PC = {:#010x} is not implemented.", pc);
        error!("2. Something is implemented incorrectly.");
        self.state.abort(pc);
    }

    pub fn pio_in(&mut self, dest: Reg, port: Reg, len: usize) -> VmResult<()> {
        let port = self.get(port).as_u64();
        let v = self.mem.pio_read(port, len)?;
        self.set(dest, W::from_u64(v));
        Ok(())
    }

    pub fn pio_out(&mut self, port: Reg, src: Reg, len: usize) -> VmResult<()> {
        let port = self.get(port).as_u64();
        let v = self.get(src).as_u64();
        self.mem.pio_write(port, len, v)?;
        Ok(())
    }
}
