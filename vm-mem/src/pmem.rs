//! 物理内存

use rand::Rng;
use vm_core::{GuestAddr, MemoryError};

/// 检查访问宽度
pub(crate) fn check_width(len: usize) -> Result<(), MemoryError> {
    match len {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(MemoryError::InvalidWidth { len }),
    }
}

/// Reads `len` bytes of `buf` as a little-endian value.
#[inline]
pub(crate) fn raw_read(buf: &[u8], len: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..len].copy_from_slice(&buf[..len]);
    u64::from_le_bytes(bytes)
}

/// Stores the low `len` bytes of `data` into `buf`.
#[inline]
pub(crate) fn raw_write(buf: &mut [u8], len: usize, data: u64) {
    buf[..len].copy_from_slice(&data.to_le_bytes()[..len]);
}

/// 以 `base` 为起始地址的一段连续物理内存
pub struct PhysMem {
    base: u64,
    data: Vec<u8>,
}

impl PhysMem {
    /// 创建全零的物理内存
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0u8; size],
        }
    }

    /// 用随机字节填充，便于暴露读取未初始化内存的客户程序
    pub fn randomize(&mut self) {
        rand::thread_rng().fill(&mut self.data[..]);
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 最后一个字节的地址
    pub fn end(&self) -> u64 {
        self.base + self.data.len() as u64 - 1
    }

    pub fn in_pmem(&self, addr: u64) -> bool {
        addr.wrapping_sub(self.base) < self.data.len() as u64
    }

    /// True if the whole `[addr, addr+len)` range is RAM.
    pub fn contains(&self, addr: u64, len: usize) -> bool {
        len > 0
            && self.in_pmem(addr)
            && addr.checked_add(len as u64 - 1).is_some_and(|last| self.in_pmem(last))
    }

    fn offset(&self, addr: u64, len: usize) -> Result<usize, MemoryError> {
        if !self.contains(addr, len) {
            return Err(self.out_of_bound(addr));
        }
        Ok((addr - self.base) as usize)
    }

    fn out_of_bound(&self, addr: u64) -> MemoryError {
        MemoryError::OutOfBound {
            addr: GuestAddr(addr),
            base: GuestAddr(self.base),
            end: GuestAddr(self.end()),
        }
    }

    pub fn read(&self, addr: u64, len: usize) -> Result<u64, MemoryError> {
        check_width(len)?;
        let off = self.offset(addr, len)?;
        Ok(raw_read(&self.data[off..], len))
    }

    pub fn write(&mut self, addr: u64, len: usize, data: u64) -> Result<(), MemoryError> {
        check_width(len)?;
        let off = self.offset(addr, len)?;
        raw_write(&mut self.data[off..], len, data);
        Ok(())
    }

    /// 批量写入，用于装载镜像
    pub fn write_block(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if !self.contains(addr, bytes.len()) {
            return Err(MemoryError::BlockOutOfRange {
                addr: GuestAddr(addr),
                len: bytes.len(),
            });
        }
        let off = (addr - self.base) as usize;
        self.data[off..off + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_block(&self, addr: u64, len: usize) -> Result<&[u8], MemoryError> {
        if len == 0 {
            return Ok(&[]);
        }
        if !self.contains(addr, len) {
            return Err(MemoryError::BlockOutOfRange {
                addr: GuestAddr(addr),
                len,
            });
        }
        let off = (addr - self.base) as usize;
        Ok(&self.data[off..off + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut pmem = PhysMem::new(0x8000_0000, 0x1000);
        pmem.write(0x8000_0000, 4, 0x1122_3344).unwrap();
        assert_eq!(pmem.read(0x8000_0000, 1).unwrap(), 0x44);
        assert_eq!(pmem.read(0x8000_0002, 2).unwrap(), 0x1122);
        assert_eq!(pmem.read_block(0x8000_0000, 4).unwrap(), &[0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_bounds() {
        let mut pmem = PhysMem::new(0x8000_0000, 0x1000);
        assert!(pmem.in_pmem(0x8000_0fff));
        assert!(!pmem.in_pmem(0x8000_1000));
        assert!(!pmem.in_pmem(0x7fff_ffff));
        assert!(pmem.read(0x8000_0ffc, 4).is_ok());
        assert!(matches!(
            pmem.read(0x8000_0ffe, 4),
            Err(MemoryError::OutOfBound { .. })
        ));
        assert!(matches!(
            pmem.write(0x8000_0000, 3, 0),
            Err(MemoryError::InvalidWidth { len: 3 })
        ));
        assert!(pmem.write_block(0x8000_0ff0, &[0u8; 0x20]).is_err());
    }

    #[test]
    fn test_randomize_keeps_size() {
        let mut pmem = PhysMem::new(0, 0x1000);
        pmem.randomize();
        assert_eq!(pmem.size(), 0x1000);
        assert_eq!(pmem.end(), 0xfff);
    }
}
