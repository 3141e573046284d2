//! 统一配置管理
//!
//! 配置以 TOML 描述，未出现的字段取默认值：
//!
//! ```toml
//! arch = "riscv32"
//! mem_base = 0x80000000
//! mem_size = 134217728
//! log_level = "debug"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, VmResult};
use crate::GuestArch;

/// 物理内存默认基址
pub const DEFAULT_MEM_BASE: u64 = 0x8000_0000;
/// 物理内存默认大小（128MB）
pub const DEFAULT_MEM_SIZE: usize = 128 * 1024 * 1024;
/// 设备后备存储池默认大小（2MB）
pub const DEFAULT_IO_SPACE_SIZE: usize = 2 * 1024 * 1024;
/// 每张区域表的默认容量
pub const DEFAULT_REGION_CAPACITY: usize = 16;
pub const PAGE_SIZE: usize = 4096;

/// 统一配置 Trait
pub trait Config: Serialize + serde::de::DeserializeOwned {
    /// 验证配置的有效性
    fn validate(&self) -> Result<(), ConfigError>;

    /// 获取默认配置
    fn defaults() -> Self;

    /// 从 TOML 文本解析并验证
    fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// 虚拟机配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// 客户机架构
    pub arch: GuestArch,
    /// 物理内存基址
    pub mem_base: u64,
    /// 物理内存大小（字节）
    pub mem_size: usize,
    /// 镜像相对内存基址的偏移，复位向量即 `mem_base + image_offset`
    pub image_offset: u64,
    /// 启动时用随机数填充内存
    pub randomize_memory: bool,
    /// 设备后备存储池大小
    pub io_space_size: usize,
    /// MMIO 区域表容量
    pub mmio_capacity: usize,
    /// 端口 I/O 区域表容量
    pub pio_capacity: usize,
    /// 日志级别（env_logger 过滤串）
    pub log_level: String,
    /// 单次运行的指令上限，缺省时不限
    pub max_instructions: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config for VmConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mem_size == 0 || self.mem_size % PAGE_SIZE != 0 {
            return Err(ConfigError::Invalid {
                field: "mem_size",
                reason: format!("{:#x} is not a non-zero multiple of {PAGE_SIZE:#x}", self.mem_size),
            });
        }
        if self.mem_base.checked_add(self.mem_size as u64 - 1).is_none() {
            return Err(ConfigError::Invalid {
                field: "mem_base",
                reason: format!("pmem at {:#x} wraps around the address space", self.mem_base),
            });
        }
        if self.image_offset >= self.mem_size as u64 {
            return Err(ConfigError::Invalid {
                field: "image_offset",
                reason: format!("{:#x} lies outside pmem", self.image_offset),
            });
        }
        if self.mmio_capacity == 0 || self.pio_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "mmio_capacity",
                reason: "region table capacity must be non-zero".to_string(),
            });
        }
        if self.io_space_size % PAGE_SIZE != 0 {
            return Err(ConfigError::Invalid {
                field: "io_space_size",
                reason: format!("{:#x} is not a multiple of {PAGE_SIZE:#x}", self.io_space_size),
            });
        }
        Ok(())
    }

    fn defaults() -> Self {
        Self {
            arch: GuestArch::Riscv32,
            mem_base: DEFAULT_MEM_BASE,
            mem_size: DEFAULT_MEM_SIZE,
            image_offset: 0,
            randomize_memory: false,
            io_space_size: DEFAULT_IO_SPACE_SIZE,
            mmio_capacity: DEFAULT_REGION_CAPACITY,
            pio_capacity: DEFAULT_REGION_CAPACITY,
            log_level: "info".to_string(),
            max_instructions: None,
        }
    }
}

impl VmConfig {
    /// 读取并验证配置文件
    pub fn from_file(path: impl AsRef<Path>) -> VmResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&text)?)
    }

    pub fn with_arch(mut self, arch: GuestArch) -> Self {
        self.arch = arch;
        self
    }

    /// 复位向量
    pub fn reset_vector(&self) -> u64 {
        self.mem_base + self.image_offset
    }
}
