//! 错误类型
//!
//! 只有构造阶段会失败；实时路径上的丢帧不是错误，只计数

use thiserror::Error;

/// Sink 错误
#[derive(Debug, Error)]
pub enum SinkError {
    /// 存储分配失败（致命，不重试）
    #[error("failed to allocate {bytes} bytes of ring buffer storage")]
    Allocation {
        bytes: usize,
        #[source]
        source: std::collections::TryReserveError,
    },

    /// 容量非法
    #[error("invalid ring buffer capacity: {0} bytes")]
    InvalidCapacity(usize),

    /// 消费线程启动失败
    #[error("failed to spawn drain thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;
