//! 地址空间访问接口
//!
//! RTL 层只通过 [`MemoryAccess`] 访问客户机内存；虚拟地址检查钩子由
//! [`AddressTranslator`] 提供。

use crate::error::MemoryError;
use crate::{AccessType, GuestAddr};

/// 虚拟地址检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuCheck {
    /// 虚拟地址即物理地址
    Direct,
    /// 需要经过 [`AddressTranslator::translate`]
    Translate,
    /// 访问不可满足
    Fail,
}

/// 虚拟地址到物理地址的检查/转换钩子
pub trait AddressTranslator: Send {
    fn check(&mut self, vaddr: GuestAddr, len: usize, access: AccessType) -> MmuCheck;

    /// 仅在 `check` 返回 [`MmuCheck::Translate`] 时调用
    fn translate(
        &mut self,
        vaddr: GuestAddr,
        len: usize,
        access: AccessType,
    ) -> Result<GuestAddr, MemoryError>;
}

/// 不做任何转换
#[derive(Debug, Default, Clone, Copy)]
pub struct BareTranslator;

impl AddressTranslator for BareTranslator {
    fn check(&mut self, _vaddr: GuestAddr, _len: usize, _access: AccessType) -> MmuCheck {
        MmuCheck::Direct
    }

    fn translate(
        &mut self,
        vaddr: GuestAddr,
        _len: usize,
        _access: AccessType,
    ) -> Result<GuestAddr, MemoryError> {
        Ok(vaddr)
    }
}

/// Guest memory entry points used by instruction semantics.
///
/// `len` is always one of 1, 2, 4 or 8; values are zero-extended into
/// the returned `u64` and truncated on write.
pub trait MemoryAccess {
    /// 取指
    fn ifetch(&mut self, addr: GuestAddr, len: usize) -> Result<u64, MemoryError>;

    fn read(&mut self, addr: GuestAddr, len: usize) -> Result<u64, MemoryError>;

    fn write(&mut self, addr: GuestAddr, len: usize, data: u64) -> Result<(), MemoryError>;

    /// 端口 I/O 读
    fn pio_read(&mut self, port: u64, len: usize) -> Result<u64, MemoryError>;

    /// 端口 I/O 写
    fn pio_write(&mut self, port: u64, len: usize, data: u64) -> Result<(), MemoryError>;
}
