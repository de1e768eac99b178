//! Sink 统计
//!
//! 计数器由生产者在 push 路径上以 Relaxed 累加，这里只做快照和报告

use super::format::AudioFormat;
use super::ring_buffer::AudioRingBuffer;

/// 统计快照
#[derive(Debug, Clone)]
pub struct SinkStats {
    pub capacity: usize,
    pub occupancy: usize,
    pub accepted_frames: u64,
    pub accepted_bytes: u64,
    pub dropped_frames: u64,
    pub format_changes: u64,
    pub format: Option<AudioFormat>,
    pub memory_locked: bool,
    pub water_level: Option<WaterLevelStats>,
}

/// 消费者观测到的水位范围（字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterLevelStats {
    pub min: usize,
    pub max: usize,
}

impl SinkStats {
    /// 从任意线程采集快照
    pub fn capture(ring: &AudioRingBuffer) -> Self {
        Self {
            capacity: ring.capacity(),
            occupancy: ring.occupancy(),
            accepted_frames: ring.accepted_frames(),
            accepted_bytes: ring.accepted_bytes(),
            dropped_frames: ring.dropped_frames(),
            format_changes: ring.format_changes(),
            format: ring.format(),
            memory_locked: ring.is_memory_locked(),
            water_level: None,
        }
    }

    /// 附加水位统计
    pub fn with_water_level(mut self, water_level: Option<WaterLevelStats>) -> Self {
        self.water_level = water_level;
        self
    }

    /// 缓冲区填充比例
    #[inline]
    pub fn fill_ratio(&self) -> f64 {
        self.occupancy as f64 / self.capacity as f64
    }

    /// 丢帧比例（丢弃 / 总回调次数）
    pub fn drop_ratio(&self) -> f64 {
        let total = self.accepted_frames + self.dropped_frames;
        if total == 0 {
            0.0
        } else {
            self.dropped_frames as f64 / total as f64
        }
    }
}

impl std::fmt::Display for SinkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Audio Sink Statistics")?;
        writeln!(f, "=====================")?;
        match self.format {
            Some(format) => writeln!(f, "Format: {}", format)?,
            None => writeln!(f, "Format: (no frames received)")?,
        }
        writeln!(
            f,
            "Capacity: {} bytes{}",
            self.capacity,
            if self.memory_locked { " (locked)" } else { "" }
        )?;
        writeln!(f)?;

        writeln!(f, "Frames accepted: {}", self.accepted_frames)?;
        writeln!(f, "Bytes accepted: {}", self.accepted_bytes)?;
        writeln!(
            f,
            "Frames dropped: {} ({:.2}%)",
            self.dropped_frames,
            self.drop_ratio() * 100.0
        )?;
        writeln!(f, "Format changes: {}", self.format_changes)?;
        writeln!(f)?;

        writeln!(f, "Ring Buffer Water Level:")?;
        writeln!(
            f,
            "  Current: {} bytes ({:.1}%)",
            self.occupancy,
            self.fill_ratio() * 100.0
        )?;
        if let Some(level) = self.water_level {
            writeln!(f, "  Min: {} bytes", level.min)?;
            writeln!(f, "  Max: {} bytes", level.max)?;
        }

        Ok(())
    }
}
