//! 设备区域表与 I/O 后备存储池

use log::info;
use vm_core::config::PAGE_SIZE;
use vm_core::{GuestAddr, IoDevice, MemoryError};

use crate::pmem::{check_width, raw_read, raw_write};

/// 端口 I/O 地址空间大小
pub const PORT_IO_SPACE_MAX: u64 = 0x1_0000;

// ============================================================================
// 区域
// ============================================================================

/// 一段映射到设备的地址区间 `[low, high]`
pub struct IoRegion {
    name: String,
    low: u64,
    high: u64,
    space: Vec<u8>,
    callback: Option<Box<dyn IoDevice>>,
}

impl IoRegion {
    pub fn new(
        name: impl Into<String>,
        low: u64,
        high: u64,
        space: Vec<u8>,
        callback: Option<Box<dyn IoDevice>>,
    ) -> Self {
        Self {
            name: name.into(),
            low,
            high,
            space,
            callback,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    /// 后备存储
    pub fn space(&self) -> &[u8] {
        &self.space
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.low <= addr && addr <= self.high
    }

    fn overlaps(&self, low: u64, high: u64) -> bool {
        self.low <= high && low <= self.high
    }

    fn check_bound(&self, addr: u64, len: usize) -> Result<u64, MemoryError> {
        let last = addr.checked_add(len as u64 - 1);
        match last {
            Some(last) if self.contains(addr) && last <= self.high => Ok(addr - self.low),
            _ => Err(MemoryError::RegionBound {
                name: self.name.clone(),
                addr: GuestAddr(addr),
                len,
                low: GuestAddr(self.low),
                high: GuestAddr(self.high),
            }),
        }
    }

    fn invoke(&mut self, offset: u64, len: usize, is_write: bool) {
        if let Some(cb) = self.callback.as_mut() {
            cb.on_access(&mut self.space, offset, len, is_write);
        }
    }

    /// 先回调再取值
    pub fn read(&mut self, addr: u64, len: usize) -> Result<u64, MemoryError> {
        check_width(len)?;
        let offset = self.check_bound(addr, len)?;
        self.invoke(offset, len, false);
        Ok(raw_read(&self.space[offset as usize..], len))
    }

    /// 先写入再回调
    pub fn write(&mut self, addr: u64, len: usize, data: u64) -> Result<(), MemoryError> {
        check_width(len)?;
        let offset = self.check_bound(addr, len)?;
        raw_write(&mut self.space[offset as usize..], len, data);
        self.invoke(offset, len, true);
        Ok(())
    }
}

// ============================================================================
// 区域表
// ============================================================================

/// Fixed-capacity table of regions living inside one address window.
pub struct RegionTable {
    kind: &'static str,
    win_low: u64,
    win_high: u64,
    capacity: usize,
    regions: Vec<IoRegion>,
}

impl RegionTable {
    pub fn new(kind: &'static str, win_low: u64, win_high: u64, capacity: usize) -> Self {
        Self {
            kind,
            win_low,
            win_high,
            capacity,
            regions: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[IoRegion] {
        &self.regions
    }

    /// 注册区域。`reserved` 是不允许重叠的额外区间（例如物理内存）。
    pub fn add(&mut self, region: IoRegion, reserved: Option<(u64, u64)>) -> Result<(), MemoryError> {
        let (low, high) = (region.low, region.high);
        if self.regions.len() >= self.capacity {
            return Err(MemoryError::TableFull {
                table: self.kind,
                capacity: self.capacity,
            });
        }
        if low > high || low < self.win_low || high > self.win_high {
            return Err(MemoryError::OutsideWindow {
                name: region.name,
                table: self.kind,
                low: GuestAddr(low),
                high: GuestAddr(high),
                win_low: GuestAddr(self.win_low),
                win_high: GuestAddr(self.win_high),
            });
        }
        let need = high - low + 1;
        if (region.space.len() as u64) < need {
            return Err(MemoryError::BackingTooSmall {
                name: region.name,
                have: region.space.len(),
                need,
            });
        }
        if let Some((r_low, r_high)) = reserved {
            if r_low <= high && low <= r_high {
                return Err(MemoryError::Overlap {
                    name: region.name,
                    low: GuestAddr(low),
                    high: GuestAddr(high),
                    other: "pmem".to_string(),
                });
            }
        }
        if let Some(other) = self.regions.iter().find(|r| r.overlaps(low, high)) {
            return Err(MemoryError::Overlap {
                name: region.name,
                low: GuestAddr(low),
                high: GuestAddr(high),
                other: format!("region '{}'", other.name),
            });
        }

        info!(
            "Add {} map '{}' at [{:#010x}, {:#010x}]",
            self.kind, region.name, low, high
        );
        self.regions.push(region);
        Ok(())
    }

    /// 线性查找包含 `addr` 的区域
    pub fn find(&mut self, addr: u64) -> Option<&mut IoRegion> {
        self.regions.iter_mut().find(|r| r.contains(addr))
    }
}

// ============================================================================
// I/O 后备存储池
// ============================================================================

/// 设备后备存储的分配预算，每次分配按页对齐
pub struct IoSpace {
    capacity: usize,
    used: usize,
}

impl IoSpace {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, used: 0 }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn alloc(&mut self, size: usize) -> Result<Vec<u8>, MemoryError> {
        let rounded = size.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let available = self.capacity - self.used;
        if rounded > available {
            return Err(MemoryError::IoSpaceExhausted {
                requested: rounded,
                available,
            });
        }
        self.used += rounded;
        Ok(vec![0u8; rounded])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(name: &str, low: u64, high: u64) -> IoRegion {
        IoRegion::new(name, low, high, vec![0; (high - low + 1) as usize], None)
    }

    #[test]
    fn test_table_capacity() {
        let mut table = RegionTable::new("mmio", 0, u64::MAX, 2);
        table.add(region("a", 0x100, 0x107), None).unwrap();
        table.add(region("b", 0x200, 0x207), None).unwrap();
        assert!(matches!(
            table.add(region("c", 0x300, 0x307), None),
            Err(MemoryError::TableFull { capacity: 2, .. })
        ));
    }

    #[test]
    fn test_reject_overlap_and_window() {
        let mut table = RegionTable::new("port-io", 0, PORT_IO_SPACE_MAX - 1, 8);
        table.add(region("serial", 0x3f8, 0x3ff), None).unwrap();
        assert!(matches!(
            table.add(region("dup", 0x3fc, 0x403), None),
            Err(MemoryError::Overlap { .. })
        ));
        assert!(matches!(
            table.add(region("far", 0x1_0000, 0x1_0003), None),
            Err(MemoryError::OutsideWindow { .. })
        ));
        assert!(matches!(
            table.add(region("ram", 0x8000, 0x8003), Some((0x8000, 0xffff))),
            Err(MemoryError::Overlap { .. })
        ));
        let short = IoRegion::new("short", 0x60, 0x6f, vec![0; 4], None);
        assert!(matches!(
            table.add(short, None),
            Err(MemoryError::BackingTooSmall { need: 16, .. })
        ));
    }

    #[test]
    fn test_region_bound() {
        let mut r = region("rtc", 0x48, 0x4f);
        assert!(r.write(0x4c, 4, 7).is_ok());
        assert_eq!(r.read(0x4c, 4).unwrap(), 7);
        assert!(matches!(r.read(0x4e, 4), Err(MemoryError::RegionBound { .. })));
    }

    #[test]
    fn test_io_space_page_aligned() {
        let mut pool = IoSpace::new(2 * PAGE_SIZE);
        let a = pool.alloc(8).unwrap();
        assert_eq!(a.len(), PAGE_SIZE);
        let b = pool.alloc(PAGE_SIZE).unwrap();
        assert_eq!(b.len(), PAGE_SIZE);
        assert_eq!(pool.used(), 2 * PAGE_SIZE);
        assert!(matches!(
            pool.alloc(1),
            Err(MemoryError::IoSpaceExhausted { available: 0, .. })
        ));
    }
}
