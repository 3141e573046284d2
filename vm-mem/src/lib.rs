//! vm-mem: 客户机地址空间
//!
//! 物理内存之上叠加两张设备区域表：MMIO（物理内存之外的任意地址）与
//! 端口 I/O（独立的 64K 端口空间）。所有访问都经过边界检查；落在区域
//! 内的访问会触发设备回调。

use vm_core::{
    AccessType, AddressTranslator, BareTranslator, GuestAddr, IoDevice, MemoryAccess,
    MemoryError, MmuCheck, VmConfig,
};

pub mod mmio;
pub mod pmem;

pub use mmio::{IoRegion, IoSpace, PORT_IO_SPACE_MAX, RegionTable};
pub use pmem::PhysMem;

/// 区域所属的地址窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Mmio,
    PortIo,
}

// ============================================================================
// AddressSpace 实现
// ============================================================================

/// 客户机地址空间
pub struct AddressSpace {
    /// 物理内存
    pmem: PhysMem,
    /// MMIO 区域
    mmio: RegionTable,
    /// 端口 I/O 区域
    pio: RegionTable,
    /// 设备后备存储池
    io_space: IoSpace,
    /// 虚拟地址检查钩子
    translator: Box<dyn AddressTranslator>,
    /// 自上次 [`take_device_touched`](Self::take_device_touched) 以来是否访问过设备
    device_touched: bool,
}

impl AddressSpace {
    /// 使用默认区域表容量与 I/O 池大小
    pub fn new(base: u64, size: usize) -> Self {
        let defaults = VmConfig::default();
        Self::with_limits(
            base,
            size,
            defaults.mmio_capacity,
            defaults.pio_capacity,
            defaults.io_space_size,
        )
    }

    pub fn with_limits(
        base: u64,
        size: usize,
        mmio_capacity: usize,
        pio_capacity: usize,
        io_space_size: usize,
    ) -> Self {
        Self {
            pmem: PhysMem::new(base, size),
            mmio: RegionTable::new("mmio", 0, u64::MAX, mmio_capacity),
            pio: RegionTable::new("port-io", 0, PORT_IO_SPACE_MAX - 1, pio_capacity),
            io_space: IoSpace::new(io_space_size),
            translator: Box::new(BareTranslator),
            device_touched: false,
        }
    }

    pub fn from_config(cfg: &VmConfig) -> Self {
        let mut space = Self::with_limits(
            cfg.mem_base,
            cfg.mem_size,
            cfg.mmio_capacity,
            cfg.pio_capacity,
            cfg.io_space_size,
        );
        if cfg.randomize_memory {
            space.pmem.randomize();
        }
        log::info!(
            "physical memory area [{:#010x}, {:#010x}]",
            space.pmem.base(),
            space.pmem.end()
        );
        space
    }

    pub fn pmem(&self) -> &PhysMem {
        &self.pmem
    }

    pub fn pmem_mut(&mut self) -> &mut PhysMem {
        &mut self.pmem
    }

    pub fn mmio_regions(&self) -> &[IoRegion] {
        self.mmio.regions()
    }

    pub fn pio_regions(&self) -> &[IoRegion] {
        self.pio.regions()
    }

    /// 替换虚拟地址检查钩子
    pub fn set_translator(&mut self, translator: Box<dyn AddressTranslator>) {
        self.translator = translator;
    }

    /// 从 I/O 池分配页对齐的后备存储
    pub fn new_space(&mut self, size: usize) -> Result<Vec<u8>, MemoryError> {
        self.io_space.alloc(size)
    }

    /// 注册设备区域 `[low, high]`
    pub fn register_region(
        &mut self,
        kind: RegionKind,
        name: &str,
        low: u64,
        high: u64,
        space: Vec<u8>,
        callback: Option<Box<dyn IoDevice>>,
    ) -> Result<(), MemoryError> {
        let region = IoRegion::new(name, low, high, space, callback);
        match kind {
            RegionKind::Mmio => self
                .mmio
                .add(region, Some((self.pmem.base(), self.pmem.end()))),
            RegionKind::PortIo => self.pio.add(region, None),
        }
    }

    pub fn add_mmio_map(
        &mut self,
        name: &str,
        low: u64,
        len: u64,
        space: Vec<u8>,
        callback: Option<Box<dyn IoDevice>>,
    ) -> Result<(), MemoryError> {
        let high = low.saturating_add(len.saturating_sub(1));
        self.register_region(RegionKind::Mmio, name, low, high, space, callback)
    }

    pub fn add_pio_map(
        &mut self,
        name: &str,
        port: u64,
        len: u64,
        space: Vec<u8>,
        callback: Option<Box<dyn IoDevice>>,
    ) -> Result<(), MemoryError> {
        let high = port.saturating_add(len.saturating_sub(1));
        self.register_region(RegionKind::PortIo, name, port, high, space, callback)
    }

    /// Returns whether a device region was accessed since the last call,
    /// and clears the flag.
    pub fn take_device_touched(&mut self) -> bool {
        std::mem::take(&mut self.device_touched)
    }

    // ------------------------------------------------------------------------
    // 物理地址访问
    // ------------------------------------------------------------------------

    pub fn paddr_read(&mut self, addr: GuestAddr, len: usize) -> Result<u64, MemoryError> {
        if self.pmem.in_pmem(addr.0) {
            return self.pmem.read(addr.0, len);
        }
        match self.mmio.find(addr.0) {
            Some(region) => {
                self.device_touched = true;
                region.read(addr.0, len)
            }
            None => Err(self.out_of_bound(addr)),
        }
    }

    pub fn paddr_write(&mut self, addr: GuestAddr, len: usize, data: u64) -> Result<(), MemoryError> {
        if self.pmem.in_pmem(addr.0) {
            return self.pmem.write(addr.0, len, data);
        }
        match self.mmio.find(addr.0) {
            Some(region) => {
                self.device_touched = true;
                region.write(addr.0, len, data)
            }
            None => Err(self.out_of_bound(addr)),
        }
    }

    fn out_of_bound(&self, addr: GuestAddr) -> MemoryError {
        MemoryError::OutOfBound {
            addr,
            base: GuestAddr(self.pmem.base()),
            end: GuestAddr(self.pmem.end()),
        }
    }

    /// 批量写入物理内存
    pub fn write_block(&mut self, base: GuestAddr, bytes: &[u8]) -> Result<(), MemoryError> {
        self.pmem.write_block(base.0, bytes)
    }

    pub fn read_block(&self, base: GuestAddr, len: usize) -> Result<&[u8], MemoryError> {
        self.pmem.read_block(base.0, len)
    }

    // ------------------------------------------------------------------------
    // 虚拟地址访问
    // ------------------------------------------------------------------------

    fn vaddr_to_paddr(
        &mut self,
        vaddr: GuestAddr,
        len: usize,
        access: AccessType,
    ) -> Result<GuestAddr, MemoryError> {
        match self.translator.check(vaddr, len, access) {
            MmuCheck::Direct => Ok(vaddr),
            MmuCheck::Translate => self.translator.translate(vaddr, len, access),
            MmuCheck::Fail => Err(MemoryError::TranslationFailed {
                addr: vaddr,
                access,
            }),
        }
    }
}

impl MemoryAccess for AddressSpace {
    fn ifetch(&mut self, addr: GuestAddr, len: usize) -> Result<u64, MemoryError> {
        let paddr = self.vaddr_to_paddr(addr, len, AccessType::Execute)?;
        self.paddr_read(paddr, len)
    }

    fn read(&mut self, addr: GuestAddr, len: usize) -> Result<u64, MemoryError> {
        let paddr = self.vaddr_to_paddr(addr, len, AccessType::Read)?;
        self.paddr_read(paddr, len)
    }

    fn write(&mut self, addr: GuestAddr, len: usize, data: u64) -> Result<(), MemoryError> {
        let paddr = self.vaddr_to_paddr(addr, len, AccessType::Write)?;
        self.paddr_write(paddr, len, data)
    }

    fn pio_read(&mut self, port: u64, len: usize) -> Result<u64, MemoryError> {
        match self.pio.find(port) {
            Some(region) => {
                self.device_touched = true;
                region.read(port, len)
            }
            None => Err(MemoryError::UnmappedPort { port }),
        }
    }

    fn pio_write(&mut self, port: u64, len: usize, data: u64) -> Result<(), MemoryError> {
        match self.pio.find(port) {
            Some(region) => {
                self.device_touched = true;
                region.write(port, len, data)
            }
            None => Err(MemoryError::UnmappedPort { port }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 0x8000_0000;

    #[test]
    fn test_ram_roundtrip() {
        let mut space = AddressSpace::new(BASE, 0x1_0000);
        space.write(GuestAddr(BASE + 8), 8, 0x0123_4567_89ab_cdef).unwrap();
        assert_eq!(space.read(GuestAddr(BASE + 8), 8).unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(space.read(GuestAddr(BASE + 12), 4).unwrap(), 0x0123_4567);
        assert!(!space.take_device_touched());
    }

    #[test]
    fn test_unmapped_is_error() {
        let mut space = AddressSpace::new(BASE, 0x1_0000);
        assert!(matches!(
            space.read(GuestAddr(0x1000), 4),
            Err(MemoryError::OutOfBound { .. })
        ));
        assert!(matches!(
            space.pio_write(0x3f8, 1, 0),
            Err(MemoryError::UnmappedPort { port: 0x3f8 })
        ));
    }

    #[test]
    fn test_mmio_may_not_overlap_pmem() {
        let mut space = AddressSpace::new(BASE, 0x1_0000);
        let buf = space.new_space(8).unwrap();
        assert!(matches!(
            space.add_mmio_map("bad", BASE + 0xfffc, 8, buf, None),
            Err(MemoryError::Overlap { .. })
        ));
    }

    #[test]
    fn test_translate_fail() {
        struct Deny;
        impl AddressTranslator for Deny {
            fn check(&mut self, _: GuestAddr, _: usize, _: AccessType) -> MmuCheck {
                MmuCheck::Fail
            }
            fn translate(
                &mut self,
                vaddr: GuestAddr,
                _: usize,
                _: AccessType,
            ) -> Result<GuestAddr, MemoryError> {
                Ok(vaddr)
            }
        }

        let mut space = AddressSpace::new(BASE, 0x1000);
        space.set_translator(Box::new(Deny));
        assert!(matches!(
            space.ifetch(GuestAddr(BASE), 4),
            Err(MemoryError::TranslationFailed {
                access: AccessType::Execute,
                ..
            })
        ));
        assert_eq!(space.paddr_read(GuestAddr(BASE), 4).unwrap(), 0);
    }

    #[test]
    fn test_translate_offset() {
        struct Offset(u64);
        impl AddressTranslator for Offset {
            fn check(&mut self, _: GuestAddr, _: usize, _: AccessType) -> MmuCheck {
                MmuCheck::Translate
            }
            fn translate(
                &mut self,
                vaddr: GuestAddr,
                _: usize,
                _: AccessType,
            ) -> Result<GuestAddr, MemoryError> {
                Ok(vaddr.wrapping_add(self.0))
            }
        }

        let mut space = AddressSpace::new(BASE, 0x1000);
        space.set_translator(Box::new(Offset(BASE)));
        space.write(GuestAddr(0x10), 4, 0xdead_beef).unwrap();
        assert_eq!(space.paddr_read(GuestAddr(BASE + 0x10), 4).unwrap(), 0xdead_beef);
    }
}
