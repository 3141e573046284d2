//! 执行统计

use std::time::Duration;

use log::info;

/// Instruction count and host time accumulated across every `run` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    /// 已提交的客户机指令数
    pub guest_instructions: u64,
    /// 执行循环内消耗的宿主时间
    pub host_time: Duration,
}

impl ExecStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟频率（条/秒）。运行时间不足 1 微秒时无法计算。
    pub fn frequency(&self) -> Option<u64> {
        let us = self.host_time.as_micros();
        if us == 0 {
            return None;
        }
        let freq = u128::from(self.guest_instructions) * 1_000_000 / us;
        Some(u64::try_from(freq).unwrap_or(u64::MAX))
    }

    pub fn report(&self) {
        info!("host time spent = {} us", self.host_time.as_micros());
        info!("total guest instructions = {}", self.guest_instructions);
        match self.frequency() {
            Some(freq) => info!("simulation frequency = {} inst/s", freq),
            None => info!(
                "Finish running in less than 1 us and can not calculate the simulation frequency"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency() {
        let stats = ExecStats {
            guest_instructions: 3_000,
            host_time: Duration::from_millis(2),
        };
        assert_eq!(stats.frequency(), Some(1_500_000));
    }

    #[test]
    fn test_frequency_too_short() {
        let stats = ExecStats {
            guest_instructions: 4,
            host_time: Duration::from_nanos(800),
        };
        assert_eq!(stats.frequency(), None);
        assert_eq!(ExecStats::new().frequency(), None);
    }
}
