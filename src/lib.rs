//! WebRTC Audio Sink Library
//!
//! 实时音频帧的无锁 SPSC 缓冲：音频管线回调线程写入，拉取线程零拷贝读出。

pub mod audio;
pub mod drain;
pub mod error;
pub mod ffi;
pub mod sink;

pub use audio::{AudioFormat, AudioRingBuffer, Consumer, Producer, PushOutcome, SinkStats};
pub use drain::{DrainConfig, DrainStats, DrainWorker};
pub use error::{Result, SinkError};
pub use sink::{AudioSink, SinkConfig};
