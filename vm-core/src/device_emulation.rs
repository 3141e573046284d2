//! 设备回调接口

/// 映射到地址空间中的设备
///
/// 地址空间在访问设备区域时调用 [`on_access`](IoDevice::on_access)：读操作
/// 在取值之前回调（设备可以先刷新后备存储），写操作在写入之后回调（设备
/// 能看到刚写入的值）。
pub trait IoDevice: Send {
    /// # 参数
    /// - `space`: 区域的后备存储
    /// - `offset`: 相对区域起始地址的字节偏移
    /// - `len`: 访问宽度（1/2/4/8 字节）
    /// - `is_write`: 是否为写操作
    fn on_access(&mut self, space: &mut [u8], offset: u64, len: usize, is_write: bool);
}

impl<F> IoDevice for F
where
    F: FnMut(&mut [u8], u64, usize, bool) + Send,
{
    fn on_access(&mut self, space: &mut [u8], offset: u64, len: usize, is_write: bool) {
        self(space, offset, len, is_write)
    }
}
