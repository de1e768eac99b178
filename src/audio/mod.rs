//! 音频核心模块
//!
//! 包含：
//! - Ring Buffer: Lock-free 字节环形缓冲区（音频回调 → 拉取线程）
//! - Format: 音频格式和样本解码
//! - Stats: Sink 统计

pub mod format;
pub mod ring_buffer;
pub mod stats;

pub use format::{peak_dbfs, AudioFormat};
pub use ring_buffer::{AudioRingBuffer, Consumer, Producer, PushOutcome};
pub use stats::{SinkStats, WaterLevelStats};
