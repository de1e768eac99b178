//! 拉取线程
//!
//! 独立线程轮询 ring buffer 的消费者端，把每段连续数据连同格式交给处理函数
//! （播放、编码、分析）。音频回调线程与处理逻辑完全解耦：
//! 处理慢了只会让生产者丢帧，不会阻塞回调。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{AudioFormat, Consumer, WaterLevelStats};
use crate::error::Result;

/// 拉取配置
#[derive(Clone, Debug)]
pub struct DrainConfig {
    /// 缓冲区为空时的等待间隔
    pub poll_interval: Duration,
    /// 单次交给处理函数的最大字节数（向下对齐到整帧）
    pub max_chunk_bytes: usize,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            // 约半个 10ms 回调周期
            poll_interval: Duration::from_millis(5),
            max_chunk_bytes: 16 * 1024,
        }
    }
}

/// 拉取线程共享状态
///
/// 完全基于原子操作
struct DrainState {
    running: AtomicBool,
    bytes_drained: AtomicU64,
    chunks_delivered: AtomicU64,
    water_min: AtomicUsize,
    water_max: AtomicUsize,
}

impl DrainState {
    fn record_level(&self, level: usize) {
        self.water_min.fetch_min(level, Ordering::Relaxed);
        self.water_max.fetch_max(level, Ordering::Relaxed);
    }
}

/// 拉取统计
#[derive(Debug, Clone, Copy)]
pub struct DrainStats {
    pub bytes_drained: u64,
    pub chunks_delivered: u64,
    pub water_level: Option<WaterLevelStats>,
}

/// 拉取线程句柄
///
/// drop 时自动停止并 join
pub struct DrainWorker {
    config: DrainConfig,
    state: Arc<DrainState>,
    thread: Option<JoinHandle<Consumer>>,
}

impl DrainWorker {
    /// 启动拉取线程
    ///
    /// `handler` 在拉取线程上被调用，参数为一段连续的整帧数据及其格式
    pub fn start<F>(consumer: Consumer, config: DrainConfig, handler: F) -> Result<Self>
    where
        F: FnMut(&[u8], AudioFormat) + Send + 'static,
    {
        let state = Arc::new(DrainState {
            running: AtomicBool::new(true),
            bytes_drained: AtomicU64::new(0),
            chunks_delivered: AtomicU64::new(0),
            water_min: AtomicUsize::new(usize::MAX),
            water_max: AtomicUsize::new(0),
        });

        let thread_state = Arc::clone(&state);
        let thread_config = config.clone();
        let thread = thread::Builder::new()
            .name("audio-drain".to_string())
            .spawn(move || Self::drain_thread_main(consumer, thread_config, thread_state, handler))?;

        log::info!(
            "Drain thread started, poll interval: {:?}, max chunk: {} bytes",
            config.poll_interval,
            config.max_chunk_bytes
        );

        Ok(Self {
            config,
            state,
            thread: Some(thread),
        })
    }

    fn drain_thread_main<F>(
        mut consumer: Consumer,
        config: DrainConfig,
        state: Arc<DrainState>,
        mut handler: F,
    ) -> Consumer
    where
        F: FnMut(&[u8], AudioFormat),
    {
        let ring = Arc::clone(consumer.ring());

        while state.running.load(Ordering::Acquire) {
            let level = consumer.available();
            state.record_level(level);

            if level == 0 {
                thread::park_timeout(config.poll_interval);
                continue;
            }

            // 处理函数慢、生产者持续写入时，也要能及时响应 stop
            while state.running.load(Ordering::Acquire) {
                let before = ring.format();
                let chunk = consumer.peek();
                if chunk.is_empty() {
                    break;
                }

                // peek 期间格式变化：重新同步读位置
                let format = match ring.format() {
                    Some(format) if before == Some(format) => format,
                    _ => continue,
                };

                let n = frame_aligned_len(chunk.len(), config.max_chunk_bytes, format);
                handler(&chunk[..n], format);
                consumer.advance(n);

                state.bytes_drained.fetch_add(n as u64, Ordering::Relaxed);
                state.chunks_delivered.fetch_add(1, Ordering::Relaxed);
            }
        }

        log::info!("Drain thread finished");
        consumer
    }

    /// 当前统计
    pub fn stats(&self) -> DrainStats {
        let min = self.state.water_min.load(Ordering::Relaxed);
        DrainStats {
            bytes_drained: self.state.bytes_drained.load(Ordering::Relaxed),
            chunks_delivered: self.state.chunks_delivered.load(Ordering::Relaxed),
            water_level: (min != usize::MAX).then(|| WaterLevelStats {
                min,
                max: self.state.water_max.load(Ordering::Relaxed),
            }),
        }
    }

    /// 配置
    pub fn config(&self) -> &DrainConfig {
        &self.config
    }

    /// 停止拉取线程，取回消费者端
    ///
    /// 处理函数 panic 时返回 None
    pub fn stop(&mut self) -> Option<Consumer> {
        self.state.running.store(false, Ordering::Release);
        let thread = self.thread.take()?;
        thread.thread().unpark();

        match thread.join() {
            Ok(consumer) => Some(consumer),
            Err(_) => {
                log::error!("Drain thread panicked");
                None
            }
        }
    }
}

impl Drop for DrainWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 单次交付长度：不超过 `max`，超出时向下对齐到整帧（至少一帧）
fn frame_aligned_len(available: usize, max: usize, format: AudioFormat) -> usize {
    if available <= max {
        return available;
    }
    let frame = format.bytes_per_frame().max(1);
    ((max / frame).max(1) * frame).min(available)
}
