//! 音频 Sink：音频管线的逐帧回调接口，以及基于 ring buffer 的实现

use crate::audio::{AudioFormat, AudioRingBuffer, Consumer, Producer};
use crate::error::Result;

/// 逐帧音频回调
///
/// 在实时线程上调用：实现不得加锁、分配或做 I/O
pub trait AudioSink: Send {
    /// 收到一帧音频
    ///
    /// `data`: 交织 PCM，长度至少 `frames * format.bytes_per_frame()`
    fn on_data(&mut self, data: &[u8], format: AudioFormat, frames: usize);
}

impl AudioSink for Producer {
    #[inline]
    fn on_data(&mut self, data: &[u8], format: AudioFormat, frames: usize) {
        // 丢帧只计数，不向实时线程报告
        let _ = self.push(data, format, frames);
    }
}

/// Sink 配置
#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Ring buffer 大小（字节）
    /// 越大越不容易丢帧，但消费者落后时延迟也越高
    pub capacity_bytes: usize,
    /// 是否 mlock 存储
    pub lock_memory: bool,
}

impl SinkConfig {
    /// 按给定格式缓冲 `millis` 毫秒
    pub fn for_duration(format: AudioFormat, millis: u32) -> Self {
        Self {
            capacity_bytes: format.bytes_for_millis(millis),
            ..Self::default()
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            // 1 秒 @ 48kHz 立体声 16-bit
            capacity_bytes: 48000 * 2 * 2,
            lock_memory: false,
        }
    }
}

/// 按配置创建 ring buffer 并拆分为生产者/消费者
pub fn open(config: &SinkConfig) -> Result<(Producer, Consumer)> {
    let ring = AudioRingBuffer::new(config.capacity_bytes)?;
    if config.lock_memory && !ring.lock_memory() {
        log::warn!("Continuing with unlocked ring buffer memory");
    }
    log::info!(
        "Audio sink opened: {} bytes{}",
        config.capacity_bytes,
        if ring.is_memory_locked() { ", locked" } else { "" }
    );
    Ok(ring.split())
}
