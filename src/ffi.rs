//! C ABI
//!
//! 以不透明句柄暴露 ring buffer sink，供其他语言的绑定层使用。
//!
//! # 线程约束
//!
//! - `audio_sink_on_data` 只能由一个线程（音频管线的逐帧回调）调用
//! - `audio_sink_available` / `audio_sink_peek` / `audio_sink_data` /
//!   `audio_sink_contiguous` / `audio_sink_advance` 只能由另一个线程调用
//! - `audio_sink_info` / `audio_sink_dropped` 可在任意线程调用
//! - `audio_sink_peek` / `audio_sink_data` 返回的指针只在下一次消费者端调用之前有效
//!   （包括 `audio_sink_available` 和 `audio_sink_contiguous`，它们会应用格式重置）
//! - 指针和长度应当用 `audio_sink_peek` 一次取得；分开调用 `audio_sink_data` 和
//!   `audio_sink_contiguous` 时，两次之间的格式变化会让二者对不上

use std::cell::UnsafeCell;
use std::ffi::{c_int, c_void};
use std::sync::Arc;

use crate::audio::{AudioFormat, AudioRingBuffer, Consumer, Producer};

/// 不透明句柄
pub struct AudioSinkHandle {
    producer: UnsafeCell<Producer>,
    consumer: UnsafeCell<Consumer>,
    ring: Arc<AudioRingBuffer>,
}

/// 格式信息，字段顺序与绑定层约定一致
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioFormatInfo {
    pub bits_per_sample: c_int,
    pub number_of_channels: c_int,
    pub sample_rate: c_int,
}

impl From<Option<AudioFormat>> for AudioFormatInfo {
    fn from(format: Option<AudioFormat>) -> Self {
        match format {
            Some(f) => Self {
                bits_per_sample: f.bits_per_sample as c_int,
                number_of_channels: f.channels as c_int,
                sample_rate: c_int::try_from(f.sample_rate).unwrap_or(c_int::MAX),
            },
            None => Self::default(),
        }
    }
}

/// 创建 sink，失败时返回空指针
#[no_mangle]
pub extern "C" fn audio_sink_new(buffer_size: usize) -> *mut AudioSinkHandle {
    match AudioRingBuffer::new(buffer_size) {
        Ok(ring) => {
            let (producer, consumer) = ring.split();
            let ring = Arc::clone(producer.ring());
            Box::into_raw(Box::new(AudioSinkHandle {
                producer: UnsafeCell::new(producer),
                consumer: UnsafeCell::new(consumer),
                ring,
            }))
        }
        Err(e) => {
            log::error!("audio_sink_new failed: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// 销毁 sink
///
/// # Safety
/// `handle` 必须来自 `audio_sink_new` 且未被销毁；销毁后两端都不得再使用
#[no_mangle]
pub unsafe extern "C" fn audio_sink_free(handle: *mut AudioSinkHandle) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

/// 逐帧回调：写入一帧 PCM
///
/// 参数非法（负数、长度溢出、空指针）时按丢帧处理
///
/// # Safety
/// `handle` 有效；`audio_data` 指向至少
/// `number_of_frames * number_of_channels * bits_per_sample / 8` 字节
#[no_mangle]
pub unsafe extern "C" fn audio_sink_on_data(
    handle: *mut AudioSinkHandle,
    audio_data: *const c_void,
    bits_per_sample: c_int,
    sample_rate: c_int,
    number_of_channels: usize,
    number_of_frames: usize,
) {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return;
    };

    let format = match (
        u16::try_from(bits_per_sample),
        u32::try_from(sample_rate),
        u16::try_from(number_of_channels),
    ) {
        (Ok(bits), Ok(rate), Ok(channels)) => AudioFormat::new(bits, rate, channels),
        _ => {
            handle.ring.record_drop();
            return;
        }
    };

    let data: &[u8] = match format.frame_bytes(number_of_frames) {
        Some(0) => &[],
        Some(len) if !audio_data.is_null() => unsafe {
            std::slice::from_raw_parts(audio_data as *const u8, len)
        },
        _ => {
            handle.ring.record_drop();
            return;
        }
    };

    let producer = unsafe { &mut *handle.producer.get() };
    producer.push(data, format, number_of_frames);
}

/// 可读字节数
///
/// # Safety
/// `handle` 有效；只能在消费者线程调用
#[no_mangle]
pub unsafe extern "C" fn audio_sink_available(handle: *mut AudioSinkHandle) -> usize {
    match unsafe { handle.as_ref() } {
        Some(handle) => unsafe { &mut *handle.consumer.get() }.available(),
        None => 0,
    }
}

/// 连续可读区域：返回读指针，长度写入 `len`
///
/// # Safety
/// `handle` 有效；`len` 为空或指向可写的 usize；只能在消费者线程调用
#[no_mangle]
pub unsafe extern "C" fn audio_sink_peek(
    handle: *mut AudioSinkHandle,
    len: *mut usize,
) -> *const c_void {
    let (ptr, n) = match unsafe { handle.as_ref() } {
        Some(handle) => {
            let chunk = unsafe { &mut *handle.consumer.get() }.peek();
            (chunk.as_ptr() as *const c_void, chunk.len())
        }
        None => (std::ptr::null(), 0),
    };
    if let Some(len) = unsafe { len.as_mut() } {
        *len = n;
    }
    ptr
}

/// 读指针
///
/// # Safety
/// `handle` 有效；只能在消费者线程调用
#[no_mangle]
pub unsafe extern "C" fn audio_sink_data(handle: *mut AudioSinkHandle) -> *const c_void {
    match unsafe { handle.as_ref() } {
        Some(handle) => unsafe { &mut *handle.consumer.get() }.peek().as_ptr() as *const c_void,
        None => std::ptr::null(),
    }
}

/// 读指针处的连续可读字节数（生产者回绕时可能小于 available）
///
/// # Safety
/// `handle` 有效；只能在消费者线程调用
#[no_mangle]
pub unsafe extern "C" fn audio_sink_contiguous(handle: *mut AudioSinkHandle) -> usize {
    match unsafe { handle.as_ref() } {
        Some(handle) => unsafe { &mut *handle.consumer.get() }.peek().len(),
        None => 0,
    }
}

/// 释放 `amount` 字节
///
/// # Safety
/// `handle` 有效；只能在消费者线程调用；`amount` 不超过 available
#[no_mangle]
pub unsafe extern "C" fn audio_sink_advance(handle: *mut AudioSinkHandle, amount: usize) {
    if let Some(handle) = unsafe { handle.as_ref() } {
        unsafe { &mut *handle.consumer.get() }.advance(amount);
    }
}

/// 最近一次观测到的格式；尚未收到帧时全为 0
///
/// # Safety
/// `handle` 有效
#[no_mangle]
pub unsafe extern "C" fn audio_sink_info(handle: *const AudioSinkHandle) -> AudioFormatInfo {
    match unsafe { handle.as_ref() } {
        Some(handle) => handle.ring.format().into(),
        None => AudioFormatInfo::default(),
    }
}

/// 丢帧计数
///
/// # Safety
/// `handle` 有效
#[no_mangle]
pub unsafe extern "C" fn audio_sink_dropped(handle: *const AudioSinkHandle) -> u64 {
    match unsafe { handle.as_ref() } {
        Some(handle) => handle.ring.dropped_frames(),
        None => 0,
    }
}
