//! 取指-解码-执行循环

use std::fmt::Write as _;
use std::time::Instant;

use log::{debug, error, info, log_enabled, trace, warn, Level};
use vm_core::{
    Config, ConfigError, EmuState, GuestAddr, GuestWord, RunState, VmConfig, VmError, VmResult,
};
use vm_frontend::{ArchTable, Architecture};
use vm_ir::{Decode, Rtl};
use vm_mem::AddressSpace;

use crate::hooks::{DevicePoll, DiffTest};
use crate::stats::ExecStats;

/// One guest core: register file, PC, address space and run state.
pub struct Cpu<A: Architecture> {
    gpr: Vec<A::Word>,
    pc: A::Word,
    mem: AddressSpace,
    state: EmuState,
    table: ArchTable<A>,
    stats: ExecStats,
    config: VmConfig,
    device: Option<Box<dyn DevicePoll>>,
    difftest: Option<Box<dyn DiffTest<A::Word>>>,
}

impl<A: Architecture> Cpu<A> {
    /// The configured architecture must be `A`.
    pub fn new(config: VmConfig) -> VmResult<Self> {
        config.validate()?;
        if config.arch != A::ARCH {
            return Err(ConfigError::Invalid {
                field: "arch",
                reason: format!("configured for {} but built for {}", config.arch, A::NAME),
            }
            .into());
        }
        let table = A::decode_table()?;
        debug!("{}: decode table with {} rows", A::NAME, table.len());
        let mem = AddressSpace::from_config(&config);
        let pc = A::reset_vector(config.mem_base, config.image_offset);
        Ok(Self {
            gpr: vec![A::Word::ZERO; A::NR_REGS],
            pc,
            mem,
            state: EmuState::new(),
            table,
            stats: ExecStats::new(),
            config,
            device: None,
            difftest: None,
        })
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn state(&self) -> &EmuState {
        &self.state
    }

    pub fn stats(&self) -> &ExecStats {
        &self.stats
    }

    pub fn pc(&self) -> A::Word {
        self.pc
    }

    pub fn set_pc(&mut self, pc: A::Word) {
        self.pc = pc;
    }

    pub fn reg(&self, idx: usize) -> A::Word {
        self.gpr[idx]
    }

    pub fn set_reg(&mut self, idx: usize, v: A::Word) {
        if A::ZERO_REG && idx == 0 {
            return;
        }
        self.gpr[idx] = v;
    }

    pub fn regs(&self) -> &[A::Word] {
        &self.gpr
    }

    pub fn mem(&self) -> &AddressSpace {
        &self.mem
    }

    /// 设备初始化期间用于注册 MMIO/PIO 区域
    pub fn mem_mut(&mut self) -> &mut AddressSpace {
        &mut self.mem
    }

    pub fn set_device(&mut self, device: Box<dyn DevicePoll>) {
        self.device = Some(device);
    }

    pub fn set_difftest(&mut self, difftest: Box<dyn DiffTest<A::Word>>) {
        self.difftest = Some(difftest);
    }

    /// 外部退出请求，在指令之间生效
    pub fn quit(&mut self) {
        self.state.quit();
    }

    // ------------------------------------------------------------------------
    // 镜像加载
    // ------------------------------------------------------------------------

    /// Copies `image` to the reset vector and returns its size.
    pub fn load_image(&mut self, image: &[u8]) -> VmResult<usize> {
        let base = A::reset_vector(self.config.mem_base, self.config.image_offset);
        self.mem.write_block(GuestAddr(base.as_u64()), image)?;
        info!(
            "image loaded at {:#010x}, size = {} bytes",
            base.as_u64(),
            image.len()
        );
        Ok(image.len())
    }

    pub fn load_builtin(&mut self) -> VmResult<usize> {
        info!("No image is given. Use the default build-in image.");
        self.load_image(&A::builtin_image())
    }

    // ------------------------------------------------------------------------
    // 执行
    // ------------------------------------------------------------------------

    /// Executes at most `n` instructions and returns the resulting state.
    ///
    /// A run that exhausts its budget leaves the core STOPPED so that a
    /// later call resumes it. Once a terminal state has been entered,
    /// further calls do nothing.
    pub fn run(&mut self, n: u64) -> VmResult<RunState> {
        if self.state.state.is_terminal() {
            info!("Program execution has ended. To restart the program, exit and run again.");
            return Ok(self.state.state);
        }
        if n == 0 {
            warn!("instruction budget is zero, nothing to execute");
            return Ok(self.state.state);
        }

        self.state.set_state(RunState::Running, self.pc.as_u64(), 0);
        let start = Instant::now();
        let result = self.execute(n);
        self.stats.host_time += start.elapsed();

        if let Err(e) = result {
            self.state.abort(self.pc.as_u64());
            return Err(e);
        }

        match self.state.state {
            RunState::Running => {
                self.state.set_state(RunState::Stopped, self.pc.as_u64(), 0);
            }
            RunState::Ended | RunState::Aborted => {
                self.report_halt();
                self.stats.report();
            }
            RunState::Quit => self.stats.report(),
            RunState::Stopped => {}
        }
        Ok(self.state.state)
    }

    fn execute(&mut self, n: u64) -> VmResult<()> {
        for _ in 0..n {
            let pc = self.pc;
            self.exec_once()?;
            self.stats.guest_instructions += 1;
            self.difftest_step(pc)?;
            if !self.state.is_running() {
                break;
            }
            if let Some(device) = self.device.as_mut() {
                device.device_update(&mut self.state);
            }
            if !self.state.is_running() {
                break;
            }
        }
        Ok(())
    }

    /// Fetches, decodes and executes the instruction at the current PC,
    /// then commits the next PC.
    ///
    /// 宿主错误会附带该指令的 PC。
    pub fn exec_once(&mut self) -> VmResult<()> {
        let pc = self.pc;
        let mut s = Decode::new(pc);
        let row = A::fetch_decode(&self.table, &mut s, &self.gpr, &mut self.mem)
            .map_err(|e| e.at_pc(GuestAddr(pc.as_u64())))?;
        let (name, exec) = (row.name, row.exec);

        if log_enabled!(Level::Trace) {
            trace!("{:#010x}: {:<24} {}", pc.as_u64(), hex_bytes(s.bytes()), name);
        }

        let mut rtl = Rtl::new(&mut s, &mut self.gpr, &mut self.mem, &mut self.state);
        exec(&mut rtl).map_err(|e| e.at_pc(GuestAddr(pc.as_u64())))?;

        if A::ZERO_REG {
            self.gpr[0] = A::Word::ZERO;
        }
        self.pc = s.dnpc;
        Ok(())
    }

    fn difftest_step(&mut self, pc: A::Word) -> VmResult<()> {
        let touched = self.mem.take_device_touched();
        let Some(dt) = self.difftest.as_mut() else {
            return Ok(());
        };
        if touched || !self.state.is_running() {
            dt.skip_ref(&self.gpr, self.pc);
            return Ok(());
        }
        let reference = dt.step(pc, self.pc)?;
        if !self.check_regs(&reference.gpr, reference.pc, pc) {
            self.state.abort(pc.as_u64());
            error!("{}", self.dump_regs());
        }
        Ok(())
    }

    /// Compares the register file and PC against a reference state.
    ///
    /// Every mismatching register is logged by name; `pc` is the address
    /// of the instruction that was just executed.
    pub fn check_regs(&self, ref_regs: &[A::Word], ref_pc: A::Word, pc: A::Word) -> bool {
        let mut same = true;
        for (idx, (dut, reference)) in self.gpr.iter().zip(ref_regs).enumerate() {
            if dut != reference {
                error!(
                    "{} is different after executing instruction at pc = {:#010x}, right = {:#010x}, wrong = {:#010x}, diff = {:#010x}",
                    A::reg_name(idx),
                    pc.as_u64(),
                    reference.as_u64(),
                    dut.as_u64(),
                    reference.as_u64() ^ dut.as_u64()
                );
                same = false;
            }
        }
        if self.pc != ref_pc {
            error!(
                "pc is different after executing instruction at pc = {:#010x}, right = {:#010x}, wrong = {:#010x}",
                pc.as_u64(),
                ref_pc.as_u64(),
                self.pc.as_u64()
            );
            same = false;
        }
        same
    }

    fn report_halt(&self) {
        let pc = self.state.halt_pc;
        match self.state.state {
            RunState::Aborted => error!("{}: ABORT at pc = {:#010x}", A::NAME, pc),
            _ if self.state.halt_ret == 0 => {
                info!("{}: HIT GOOD TRAP at pc = {:#010x}", A::NAME, pc)
            }
            _ => error!(
                "{}: HIT BAD TRAP at pc = {:#010x}, code = {:#x}",
                A::NAME,
                pc,
                self.state.halt_ret
            ),
        }
    }

    // ------------------------------------------------------------------------
    // 寄存器查看
    // ------------------------------------------------------------------------

    /// 格式化的寄存器列表
    pub fn dump_regs(&self) -> String {
        let width = A::Word::BYTES * 2 + 2;
        let mut out = String::new();
        for (idx, v) in self.gpr.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:<8}{:#0width$x}  {}",
                A::reg_name(idx),
                v.as_u64(),
                v.as_i64(),
                width = width
            );
        }
        let _ = writeln!(out, "{:<8}{:#0width$x}", "pc", self.pc.as_u64(), width = width);
        out
    }

    /// Reads a register (or `pc`) by its ABI name.
    pub fn reg_by_name(&self, name: &str) -> Option<A::Word> {
        if name == "pc" {
            return Some(self.pc);
        }
        vm_frontend::reg_by_name::<A>(name).map(|idx| self.gpr[idx])
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

impl<A: Architecture> std::fmt::Debug for Cpu<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("arch", &A::NAME)
            .field("pc", &format_args!("{:#x}", self.pc.as_u64()))
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}
