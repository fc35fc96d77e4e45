use chrono::{DateTime, Duration, Utc};
use cohida_core::common::Granularity;

/// # Summary
/// 把回补窗口切分为首尾相接的半开区间 `[a, b)`。
///
/// # Invariants
/// - 各块从左到右依次产出，前一块的 `end` 即后一块的 `start`，无缝隙无重叠。
/// - 每块宽度不超过 `granularity * max_candles` 秒，最后一块在窗口终点截断。
/// - `start >= end` 时不产出任何块。
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    width: Duration,
}

impl ChunkPlan {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        max_candles: u32,
    ) -> Self {
        // 上限为 0 时仍按一根推进，避免死循环
        let candles = i64::from(max_candles.max(1));
        Self {
            cursor: start,
            end,
            width: Duration::seconds(i64::from(granularity.seconds()) * candles),
        }
    }

    /// 单块的最大宽度。
    pub fn width(&self) -> Duration {
        self.width
    }
}

impl Iterator for ChunkPlan {
    type Item = (DateTime<Utc>, DateTime<Utc>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let chunk_start = self.cursor;
        let chunk_end = (chunk_start + self.width).min(self.end);
        self.cursor = chunk_end;
        Some((chunk_start, chunk_end))
    }
}
