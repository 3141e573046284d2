//! 有序解码表

use std::fmt;

use vm_core::{DecodeError, GuestWord, VmResult};
use vm_ir::Rtl;

use crate::pattern::Pattern;

/// 指令执行函数
pub type ExecFn<W> = fn(&mut Rtl<'_, W>) -> VmResult<()>;

/// 解码表中的一行
pub struct InstPat<W: GuestWord, L> {
    pub name: &'static str,
    pub pattern: Pattern,
    /// 操作数布局
    pub layout: L,
    /// 操作数宽度（字节），0 表示使用当前的默认操作数宽度
    pub width: usize,
    pub exec: ExecFn<W>,
}

impl<W: GuestWord, L: fmt::Debug> fmt::Debug for InstPat<W, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstPat")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("layout", &self.layout)
            .field("width", &self.width)
            .finish()
    }
}

/// Rows are scanned in order and the first match wins, so specific
/// encodings must precede the general ones they overlap with.
pub struct DecodeTable<W: GuestWord, L> {
    name: &'static str,
    rows: Vec<InstPat<W, L>>,
}

impl<W: GuestWord, L> DecodeTable<W, L> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rows(&self) -> &[InstPat<W, L>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 返回第一个命中的行及其下标
    pub fn lookup(&self, inst: u64) -> Result<(usize, &InstPat<W, L>), DecodeError> {
        self.rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.pattern.matches(inst))
            .ok_or(DecodeError::NoMatch {
                table: self.name,
                inst,
            })
    }

    pub fn row(&self, idx: usize) -> Option<&InstPat<W, L>> {
        self.rows.get(idx)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&InstPat<W, L>> {
        self.rows.iter().find(|row| row.name == name)
    }
}

/// 声明式构建解码表
///
/// ```rust,ignore
/// let table = TableBuilder::new("riscv32", 32)
///     .pat("0000000 00001 00000 000 00000 11100 11", "ebreak", RvType::N, ebreak)
///     .pat(&"?".repeat(32), "inv", RvType::N, inv)
///     .build()?;
/// ```
pub struct TableBuilder<W: GuestWord, L> {
    name: &'static str,
    inst_bits: usize,
    rows: Vec<InstPat<W, L>>,
    error: Option<DecodeError>,
}

impl<W: GuestWord, L> TableBuilder<W, L> {
    /// `inst_bits` 为该表所匹配的编码位宽
    pub fn new(name: &'static str, inst_bits: usize) -> Self {
        Self {
            name,
            inst_bits,
            rows: Vec::new(),
            error: None,
        }
    }

    fn push(
        mut self,
        compiled: Result<Pattern, DecodeError>,
        src: &str,
        name: &'static str,
        layout: L,
        width: usize,
        exec: ExecFn<W>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        match compiled {
            Ok(pattern) if pattern.bits > self.inst_bits => {
                self.error = Some(DecodeError::PatternTooLong {
                    pattern: src.to_string(),
                    bits: pattern.bits,
                    max: self.inst_bits,
                });
            }
            Ok(pattern) => self.rows.push(InstPat {
                name,
                pattern,
                layout,
                width,
                exec,
            }),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// 二进制模式行
    pub fn pat(self, pattern: &str, name: &'static str, layout: L, exec: ExecFn<W>) -> Self {
        self.push(Pattern::compile(pattern), pattern, name, layout, 0, exec)
    }

    /// 带固定操作数宽度的二进制模式行
    pub fn pat_w(
        self,
        pattern: &str,
        name: &'static str,
        layout: L,
        width: usize,
        exec: ExecFn<W>,
    ) -> Self {
        self.push(Pattern::compile(pattern), pattern, name, layout, width, exec)
    }

    /// 十六进制模式行
    pub fn hex(self, pattern: &str, name: &'static str, layout: L, exec: ExecFn<W>) -> Self {
        self.push(Pattern::compile_hex(pattern), pattern, name, layout, 0, exec)
    }

    pub fn hex_w(
        self,
        pattern: &str,
        name: &'static str,
        layout: L,
        width: usize,
        exec: ExecFn<W>,
    ) -> Self {
        self.push(Pattern::compile_hex(pattern), pattern, name, layout, width, exec)
    }

    /// 完成构建。表必须以全 `?` 行结尾。
    pub fn build(self) -> Result<DecodeTable<W, L>, DecodeError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        match self.rows.last() {
            Some(last) if last.pattern.is_catch_all() => Ok(DecodeTable {
                name: self.name,
                rows: self.rows,
            }),
            _ => Err(DecodeError::MissingCatchAll { table: self.name }),
        }
    }
}
