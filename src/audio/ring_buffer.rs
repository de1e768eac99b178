//! Lock-free SPSC 音频 Ring Buffer（字节级，整帧写入）
//!
//! 设计目标：
//! - 零锁：生产者（音频回调）和消费者（拉取线程）完全无锁操作
//! - 零分配：存储在构造时一次性分配，push 路径不分配、不阻塞
//! - 整块写入：一帧要么完整写入，要么整帧丢弃（计入 dropped），绝不覆盖未读数据
//! - 连续读取：每帧数据在存储中连续，消费者可以零拷贝 peek
//!
//! # 游标协议
//!
//! `write_pos` / `read_pos` 是单调递增的 64 位逻辑位置：
//! - 物理偏移 = pos % capacity，圈数（lap）= pos / capacity
//! - 帧放不进尾部剩余空间时，生产者跳到下一圈的偏移 0，
//!   并把跳转前的偏移记到 `watermark`；尾部 [watermark, capacity) 不含数据
//! - 写入区间 [start, start + len) 必须满足 start + len - read <= capacity，
//!   即不覆盖消费者尚未释放的字节；消费者尚未同步的格式重置之后，read 换成 reset_pos
//! - 每个字段只有一个写者：write_pos / watermark / reset_pos / format 归生产者，
//!   read_pos / view_end 归消费者
//!
//! 生产者先写数据再 Release 发布 write_pos；消费者 Acquire 读 write_pos 后才读数据，
//! 读完再 Release 发布 read_pos。
//!
//! # 格式变化
//!
//! 生产者发现格式变化时把当前 write_pos 发布到 `reset_pos`，此前的字节全部作废，
//! 之后的写入按 reset_pos 计算剩余空间。消费者下一次操作时把读位置跳到 reset_pos。
//!
//! 生产者从不修改 read_pos。消费者在 peek 时先把视图可能的终点写入 `view_end`，
//! 再读 reset_pos；生产者先写 reset_pos，再读 `view_end`（两边都是 SeqCst）。
//! 因此要么消费者看到重置、视图为空，要么生产者看到视图并避开它：
//! 作废区间里消费者正在查看的部分不会被覆盖。

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use super::format::AudioFormat;
use crate::error::{Result, SinkError};

/// push 结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// 整帧已写入
    Accepted,
    /// 空间不足（或帧数据不完整），整帧丢弃
    Dropped,
}

/// 生产者和消费者共享的 ring buffer 状态
///
/// 只能通过 [`AudioRingBuffer::split`] 得到的 [`Producer`] / [`Consumer`] 修改；
/// 共享引用上只提供只读观测（格式、计数器、占用量）。
pub struct AudioRingBuffer {
    storage: Box<[UnsafeCell<u8>]>,
    capacity: usize,

    write_pos: CachePadded<AtomicU64>,
    read_pos: CachePadded<AtomicU64>,

    // 生产者写，消费者读
    watermark: AtomicUsize,
    reset_pos: AtomicU64,
    format: AtomicU64,
    format_known: AtomicBool,

    // 消费者写：最近一次 peek 视图的逻辑终点，0 表示没有视图
    view_end: AtomicU64,

    // 统计
    dropped: AtomicU64,
    accepted_frames: AtomicU64,
    accepted_bytes: AtomicU64,
    format_changes: AtomicU64,

    memory_locked: AtomicBool,
}

unsafe impl Send for AudioRingBuffer {}
unsafe impl Sync for AudioRingBuffer {}

impl AudioRingBuffer {
    /// 分配 `capacity` 字节的 ring buffer
    ///
    /// 只有分配失败（或容量为 0）时返回错误
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SinkError::InvalidCapacity(capacity));
        }

        let mut storage: Vec<UnsafeCell<u8>> = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|source| SinkError::Allocation {
                bytes: capacity,
                source,
            })?;
        storage.resize_with(capacity, || UnsafeCell::new(0));

        log::debug!("Audio ring buffer allocated: {} bytes", capacity);

        Ok(Self {
            storage: storage.into_boxed_slice(),
            capacity,
            write_pos: CachePadded::new(AtomicU64::new(0)),
            read_pos: CachePadded::new(AtomicU64::new(0)),
            watermark: AtomicUsize::new(capacity),
            reset_pos: AtomicU64::new(0),
            format: AtomicU64::new(0),
            format_known: AtomicBool::new(false),
            view_end: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            accepted_frames: AtomicU64::new(0),
            accepted_bytes: AtomicU64::new(0),
            format_changes: AtomicU64::new(0),
            memory_locked: AtomicBool::new(false),
        })
    }

    /// 拆分为唯一的生产者和消费者
    pub fn split(self) -> (Producer, Consumer) {
        let ring = Arc::new(self);
        (
            Producer {
                ring: Arc::clone(&ring),
                format: None,
            },
            Consumer { ring },
        )
    }

    /// 锁定存储内存，防止被换页
    ///
    /// 实时音频回调里的 page fault 会造成爆音。返回是否成功锁定。
    #[cfg(unix)]
    pub fn lock_memory(&self) -> bool {
        if self.memory_locked.load(Ordering::Acquire) {
            return true;
        }

        let ptr = self.storage.as_ptr() as *const libc::c_void;
        let result = unsafe { libc::mlock(ptr, self.capacity) };

        if result == 0 {
            self.memory_locked.store(true, Ordering::Release);
            log::debug!("Ring buffer memory locked: {} bytes", self.capacity);
            true
        } else {
            log::warn!(
                "Failed to lock ring buffer memory: {}",
                std::io::Error::last_os_error()
            );
            false
        }
    }

    #[cfg(not(unix))]
    pub fn lock_memory(&self) -> bool {
        false
    }

    #[cfg(unix)]
    fn unlock_memory(&self) {
        if !self.memory_locked.swap(false, Ordering::AcqRel) {
            return;
        }
        let ptr = self.storage.as_ptr() as *const libc::c_void;
        unsafe {
            libc::munlock(ptr, self.capacity);
        }
        log::debug!("Ring buffer memory unlocked");
    }

    #[cfg(not(unix))]
    fn unlock_memory(&self) {}

    /// 检查内存是否已锁定
    pub fn is_memory_locked(&self) -> bool {
        self.memory_locked.load(Ordering::Acquire)
    }

    /// 容量（字节）
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 最近一次观测到的格式；尚未收到任何帧时为 None
    #[inline]
    pub fn format(&self) -> Option<AudioFormat> {
        self.format_known
            .load(Ordering::Acquire)
            .then(|| AudioFormat::unpack(self.format.load(Ordering::Acquire)))
    }

    /// 因空间不足被丢弃的帧数
    #[inline]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 成功写入的回调次数
    #[inline]
    pub fn accepted_frames(&self) -> u64 {
        self.accepted_frames.load(Ordering::Relaxed)
    }

    /// 成功写入的字节数
    #[inline]
    pub fn accepted_bytes(&self) -> u64 {
        self.accepted_bytes.load(Ordering::Relaxed)
    }

    /// 格式变化（即缓冲区重置）次数
    #[inline]
    pub fn format_changes(&self) -> u64 {
        self.format_changes.load(Ordering::Relaxed)
    }

    /// 从任意线程观测当前未读字节数（监控用，可能略有滞后）
    pub fn occupancy(&self) -> usize {
        // 先读 read 再读 write，保证 read <= write
        let read = self.read_pos.load(Ordering::Acquire);
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.effective_read(read, write);
        self.readable(read, write)
    }

    #[inline]
    fn lap(&self, pos: u64) -> u64 {
        pos / self.capacity as u64
    }

    #[inline]
    fn offset(&self, pos: u64) -> usize {
        (pos % self.capacity as u64) as usize
    }

    #[inline]
    fn slot_ptr(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.capacity);
        unsafe { UnsafeCell::raw_get(self.storage.as_ptr().add(offset)) }
    }

    /// 消费者视角的有效读位置
    ///
    /// `write` 必须先于此函数内的 reset_pos / watermark 被 Acquire 读取。
    /// 1. 格式重置：跳到 reset_pos（不越过 write）
    /// 2. 生产者已回绕且读位置到达 watermark：跳到下一圈起点
    #[inline]
    fn effective_read(&self, read: u64, write: u64) -> u64 {
        let reset = self.reset_pos.load(Ordering::SeqCst);
        let mut read = read.max(reset.min(write));

        if self.lap(write) > self.lap(read)
            && self.offset(read) >= self.watermark.load(Ordering::Acquire)
        {
            read = (self.lap(read) + 1) * self.capacity as u64;
        }
        read
    }

    /// 可读字节数；`read` 必须是 effective_read 的结果
    #[inline]
    fn readable(&self, read: u64, write: u64) -> usize {
        if self.lap(write) > self.lap(read) {
            // 回绕前剩余 + 回绕后已写
            self.watermark
                .load(Ordering::Acquire)
                .saturating_sub(self.offset(read))
                + self.offset(write)
        } else {
            (write - read) as usize
        }
    }

    /// 物理区间 [dest, dest + len) 是否与消费者视图 [read, view_end) 重叠
    ///
    /// 视图最多一圈，可能跨过物理末尾
    fn overlaps_view(&self, dest: usize, len: usize, read: u64, view_end: u64) -> bool {
        if view_end <= read || len == 0 {
            return false;
        }
        let view_start = self.offset(read);
        let view_len = (view_end - read).min(self.capacity as u64) as usize;
        let hit = |start: usize, end: usize| dest < end && start < dest + len;

        let first_end = (view_start + view_len).min(self.capacity);
        hit(view_start, first_end) || hit(0, view_start + view_len - first_end)
    }

    #[inline]
    pub(crate) fn record_drop(&self) -> PushOutcome {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        PushOutcome::Dropped
    }
}

impl Drop for AudioRingBuffer {
    fn drop(&mut self) {
        self.unlock_memory();
    }
}

impl std::fmt::Debug for AudioRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRingBuffer")
            .field("capacity", &self.capacity)
            .field("write_pos", &self.write_pos.load(Ordering::Relaxed))
            .field("read_pos", &self.read_pos.load(Ordering::Relaxed))
            .field("watermark", &self.watermark.load(Ordering::Relaxed))
            .field("format", &self.format())
            .field("dropped", &self.dropped_frames())
            .finish()
    }
}

/// 生产者端：音频回调线程持有
#[derive(Debug)]
pub struct Producer {
    ring: Arc<AudioRingBuffer>,
    format: Option<AudioFormat>,
}

impl Producer {
    /// 写入一帧（音频回调调用）
    ///
    /// `data` 至少包含 `frames * channels * bits_per_sample / 8` 字节，多余部分忽略。
    /// wait-free：不阻塞、不分配，耗时只与帧大小有关。
    pub fn push(&mut self, data: &[u8], format: AudioFormat, frames: usize) -> PushOutcome {
        if self.format != Some(format) {
            self.reset(format);
        }

        let rb = &*self.ring;
        let Some(payload) = format.frame_bytes(frames).and_then(|len| data.get(..len)) else {
            return rb.record_drop();
        };
        let len = payload.len();
        let capacity = rb.capacity as u64;

        let write = rb.write_pos.load(Ordering::Relaxed);
        let read = rb.read_pos.load(Ordering::Acquire);
        let reset = rb.reset_pos.load(Ordering::Relaxed);
        let offset = rb.offset(write);
        let tail_room = rb.capacity - offset;

        // 尾部放得下就接着写，否则跳到下一圈的偏移 0
        let (start, dest) = if len <= tail_room {
            (write, offset)
        } else {
            ((rb.lap(write) + 1) * capacity, 0)
        };

        // 不能覆盖 [read, write) 中尚未释放的字节
        if reset > read {
            // 消费者还没同步格式重置：[read, reset) 已作废，只避开它正在查看的部分
            let view_end = rb.view_end.load(Ordering::SeqCst);
            if start + len as u64 - reset > capacity || rb.overlaps_view(dest, len, read, view_end)
            {
                return rb.record_drop();
            }
        } else if start + len as u64 - read > capacity {
            return rb.record_drop();
        }

        unsafe {
            std::ptr::copy_nonoverlapping(payload.as_ptr(), rb.slot_ptr(dest), len);
        }

        let new_write = start + len as u64;
        if start != write {
            rb.watermark.store(offset, Ordering::Relaxed);
        } else if rb.lap(new_write) > rb.lap(write) {
            // 恰好写满到物理末尾
            rb.watermark.store(rb.capacity, Ordering::Relaxed);
        }
        rb.write_pos.store(new_write, Ordering::Release);

        rb.accepted_frames.fetch_add(1, Ordering::Relaxed);
        rb.accepted_bytes.fetch_add(len as u64, Ordering::Relaxed);
        PushOutcome::Accepted
    }

    /// 格式变化：作废所有未读数据
    fn reset(&mut self, format: AudioFormat) {
        let rb = &*self.ring;
        let write = rb.write_pos.load(Ordering::Relaxed);
        rb.reset_pos.store(write, Ordering::SeqCst);
        rb.format.store(format.pack(), Ordering::Release);
        rb.format_known.store(true, Ordering::Release);
        if self.format.is_some() {
            rb.format_changes.fetch_add(1, Ordering::Relaxed);
        }
        self.format = Some(format);
    }

    /// 共享状态（统计、格式）
    pub fn ring(&self) -> &Arc<AudioRingBuffer> {
        &self.ring
    }
}

/// 消费者端：拉取线程持有
///
/// 所有读操作取 `&mut self`：peek 返回的视图借用消费者，
/// 因此在视图存活期间无法调用 advance。
#[derive(Debug)]
pub struct Consumer {
    ring: Arc<AudioRingBuffer>,
}

impl Consumer {
    /// 同步读位置（应用格式重置和回绕跳转），返回 (write, read)
    ///
    /// `pin` 为 true 时先把 write 登记为视图上界，否则清除上一次的视图
    #[inline]
    fn sync(&mut self, pin: bool) -> (u64, u64) {
        let rb = &*self.ring;
        let write = rb.write_pos.load(Ordering::Acquire);
        // 必须先于 effective_read 里的 reset_pos 读取
        rb.view_end
            .store(if pin { write } else { 0 }, Ordering::SeqCst);
        let stored = rb.read_pos.load(Ordering::Relaxed);
        let read = rb.effective_read(stored, write);
        if read != stored {
            rb.read_pos.store(read, Ordering::Release);
        }
        (write, read)
    }

    /// 当前可读字节数
    #[inline]
    pub fn available(&mut self) -> usize {
        let (write, read) = self.sync(false);
        self.ring.readable(read, write)
    }

    /// 从读位置开始的连续可读区域，不拷贝、不前进
    ///
    /// 生产者已回绕时只返回 watermark 之前的部分，长度可能小于 `available()`；
    /// advance 越过该部分后，下一次 peek 从偏移 0 开始。
    pub fn peek(&mut self) -> &[u8] {
        let (write, read) = self.sync(true);
        let rb = &*self.ring;
        let start = rb.offset(read);
        let end = if rb.lap(write) > rb.lap(read) {
            rb.watermark.load(Ordering::Acquire)
        } else {
            rb.offset(write)
        };
        // 收紧到实际视图
        rb.view_end
            .store(read + (end - start) as u64, Ordering::Release);
        unsafe { std::slice::from_raw_parts(rb.slot_ptr(start), end - start) }
    }

    /// 释放 `amount` 字节
    ///
    /// `amount` 不得超过 `available()`：debug 构建中断言，release 构建截断。
    /// 查看之后若发生格式重置，这些字节已被丢弃，advance 不再前进。
    pub fn advance(&mut self, amount: usize) {
        let stored = self.ring.read_pos.load(Ordering::Relaxed);
        let (write, read) = self.sync(false);
        let rb = &*self.ring;

        // 上次同步之后发生了格式重置：刚才看到的字节已随重置作废
        if rb.reset_pos.load(Ordering::SeqCst) > stored {
            return;
        }

        let readable = rb.readable(read, write);
        debug_assert!(
            amount <= readable,
            "advance past available: {} > {}",
            amount,
            readable
        );
        let amount = amount.min(readable);

        let next = if rb.lap(write) > rb.lap(read) {
            let before_wrap = rb.watermark.load(Ordering::Acquire) - rb.offset(read);
            if amount >= before_wrap {
                (rb.lap(read) + 1) * rb.capacity as u64 + (amount - before_wrap) as u64
            } else {
                read + amount as u64
            }
        } else {
            read + amount as u64
        };
        rb.read_pos.store(next, Ordering::Release);
    }

    /// 拷贝并释放最多 `output.len()` 字节（跨回绕），返回实际字节数
    pub fn read_into(&mut self, output: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < output.len() {
            let chunk = self.peek();
            if chunk.is_empty() {
                break;
            }
            let n = chunk.len().min(output.len() - copied);
            output[copied..copied + n].copy_from_slice(&chunk[..n]);
            self.advance(n);
            copied += n;
        }
        copied
    }

    /// 最近一次观测到的格式
    #[inline]
    pub fn format(&self) -> Option<AudioFormat> {
        self.ring.format()
    }

    /// 共享状态（统计、格式）
    pub fn ring(&self) -> &Arc<AudioRingBuffer> {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FMT_48K: AudioFormat = AudioFormat {
        bits_per_sample: 8,
        sample_rate: 48000,
        channels: 1,
    };

    const FMT_44K: AudioFormat = AudioFormat {
        bits_per_sample: 8,
        sample_rate: 44100,
        channels: 1,
    };

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
    }

    /// 8-bit 单声道：帧数 == 字节数
    fn push(p: &mut Producer, data: &[u8]) -> PushOutcome {
        p.push(data, FMT_48K, data.len())
    }

    fn pair(capacity: usize) -> (Producer, Consumer) {
        AudioRingBuffer::new(capacity).unwrap().split()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            AudioRingBuffer::new(0),
            Err(SinkError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_roundtrip_in_order() {
        let (mut p, mut c) = pair(1024);
        let chunks = [pattern(100, 1), pattern(300, 2), pattern(250, 3)];

        for chunk in &chunks {
            assert_eq!(push(&mut p, chunk), PushOutcome::Accepted);
        }
        assert_eq!(c.available(), 650);

        let mut out = vec![0u8; 650];
        assert_eq!(c.read_into(&mut out), 650);
        assert_eq!(out, chunks.concat());
        assert_eq!(c.available(), 0);
        assert_eq!(p.ring().accepted_frames(), 3);
        assert_eq!(p.ring().accepted_bytes(), 650);
    }

    #[test]
    fn test_multichannel_length() {
        let (mut p, mut c) = pair(4096);
        let format = AudioFormat::new(16, 48000, 2);
        let data = pattern(480 * 4, 9);

        assert_eq!(p.push(&data, format, 480), PushOutcome::Accepted);
        assert_eq!(c.available(), 1920);
        assert_eq!(c.format(), Some(format));
    }

    #[test]
    fn test_short_payload_dropped() {
        let (mut p, mut c) = pair(1024);
        let format = AudioFormat::new(16, 48000, 2);

        // 声明 100 帧（400 字节）但只给了 399 字节
        assert_eq!(p.push(&[0u8; 399], format, 100), PushOutcome::Dropped);
        assert_eq!(p.ring().dropped_frames(), 1);
        assert_eq!(c.available(), 0);
    }

    #[test]
    fn test_drop_then_wrap_scenario() {
        let (mut p, mut c) = pair(1024);
        let first = pattern(600, 1);
        let second = pattern(600, 2);

        assert_eq!(push(&mut p, &first), PushOutcome::Accepted);
        assert_eq!(c.available(), 600);

        // tail_room 424 < 600，且读位置 0 < 600：丢弃
        assert_eq!(push(&mut p, &second), PushOutcome::Dropped);
        assert_eq!(p.ring().dropped_frames(), 1);
        assert_eq!(c.available(), 600);
        assert_eq!(c.peek(), &first[..]);

        c.advance(600);
        assert_eq!(c.available(), 0);

        // 读位置 600 >= 600：回绕写到开头
        assert_eq!(push(&mut p, &second), PushOutcome::Accepted);
        assert_eq!(c.available(), 600);
        assert_eq!(c.peek(), &second[..]);
        assert_eq!(p.ring().dropped_frames(), 1);
    }

    #[test]
    fn test_wrap_accounts_both_regions() {
        let (mut p, mut c) = pair(1024);
        let a = pattern(400, 1);
        let b = pattern(400, 2);
        let d = pattern(400, 3);

        assert_eq!(push(&mut p, &a), PushOutcome::Accepted);
        assert_eq!(push(&mut p, &b), PushOutcome::Accepted);
        c.advance(500);

        // tail_room 224 < 400，读位置 500 >= 400：回绕
        assert_eq!(push(&mut p, &d), PushOutcome::Accepted);
        assert_eq!(c.available(), 300 + 400);

        // peek 只给出回绕前的连续部分
        assert_eq!(c.peek(), &b[100..]);
        c.advance(300);
        assert_eq!(c.available(), 400);
        assert_eq!(c.peek(), &d[..]);
    }

    #[test]
    fn test_advance_across_wrap() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(400, 1)), PushOutcome::Accepted);
        assert_eq!(push(&mut p, &pattern(400, 2)), PushOutcome::Accepted);
        c.advance(500);
        let d = pattern(400, 3);
        assert_eq!(push(&mut p, &d), PushOutcome::Accepted);

        // 一次越过 watermark：剩余量落在回绕后的区域
        c.advance(350);
        assert_eq!(c.available(), 350);
        assert_eq!(c.peek(), &d[50..]);
    }

    #[test]
    fn test_rejected_push_leaves_content() {
        let (mut p, mut c) = pair(256);
        let a = pattern(200, 1);
        assert_eq!(push(&mut p, &a), PushOutcome::Accepted);
        assert_eq!(push(&mut p, &pattern(100, 0xFF)), PushOutcome::Dropped);
        assert_eq!(push(&mut p, &pattern(57, 0xEE)), PushOutcome::Dropped);
        assert_eq!(p.ring().dropped_frames(), 2);

        let mut out = vec![0u8; 200];
        assert_eq!(c.read_into(&mut out), 200);
        assert_eq!(out, a);
    }

    #[test]
    fn test_tail_room_exact_fit() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(424, 1)), PushOutcome::Accepted);
        // tail_room == len：不回绕，恰好写到物理末尾
        assert_eq!(push(&mut p, &pattern(600, 2)), PushOutcome::Accepted);
        assert_eq!(c.available(), 1024);
        assert_eq!(c.peek().len(), 1024);

        c.advance(1024);
        assert_eq!(c.available(), 0);

        let next = pattern(100, 3);
        assert_eq!(push(&mut p, &next), PushOutcome::Accepted);
        assert_eq!(c.peek(), &next[..]);
    }

    #[test]
    fn test_wrap_needs_read_offset_at_least_len() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(600, 1)), PushOutcome::Accepted);
        c.advance(599);

        // 读位置 599 < 600：差一个字节也不能回绕
        assert_eq!(push(&mut p, &pattern(600, 2)), PushOutcome::Dropped);
        assert_eq!(c.available(), 1);

        c.advance(1);
        assert_eq!(push(&mut p, &pattern(600, 2)), PushOutcome::Accepted);
    }

    #[test]
    fn test_wrapped_writer_fills_up_to_reader() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(512, 1)), PushOutcome::Accepted);
        assert_eq!(push(&mut p, &pattern(256, 2)), PushOutcome::Accepted);
        c.advance(512);
        assert_eq!(push(&mut p, &pattern(512, 3)), PushOutcome::Accepted);
        assert_eq!(c.available(), 256 + 512);

        // 写偏移 512 已经追上读偏移 512
        assert_eq!(push(&mut p, &[7]), PushOutcome::Dropped);

        c.advance(1);
        assert_eq!(push(&mut p, &[7]), PushOutcome::Accepted);
        // 写偏移 == 读偏移，但圈数不同：缓冲区是满的而不是空的
        assert_eq!(c.available(), 255 + 513);
    }

    #[test]
    fn test_full_capacity_and_oversized() {
        let (mut p, mut c) = pair(512);
        assert_eq!(push(&mut p, &pattern(513, 1)), PushOutcome::Dropped);

        let whole = pattern(512, 2);
        assert_eq!(push(&mut p, &whole), PushOutcome::Accepted);
        assert_eq!(c.available(), 512);
        assert_eq!(push(&mut p, &[1]), PushOutcome::Dropped);
        assert_eq!(c.peek(), &whole[..]);
    }

    #[test]
    fn test_zero_length_push() {
        let (mut p, mut c) = pair(64);
        assert_eq!(push(&mut p, &pattern(10, 1)), PushOutcome::Accepted);
        assert_eq!(push(&mut p, &[]), PushOutcome::Accepted);
        assert_eq!(c.available(), 10);
    }

    #[test]
    fn test_format_change_discards_unread() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(600, 1)), PushOutcome::Accepted);
        assert_eq!(c.format(), Some(FMT_48K));

        let fresh = pattern(200, 2);
        assert_eq!(p.push(&fresh, FMT_44K, 200), PushOutcome::Accepted);
        assert_eq!(c.format(), Some(FMT_44K));
        assert_eq!(c.available(), 200);
        assert_eq!(c.peek(), &fresh[..]);
        assert_eq!(p.ring().format_changes(), 1);
    }

    #[test]
    fn test_format_change_empties_buffer() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(600, 1)), PushOutcome::Accepted);

        assert_eq!(p.push(&[], FMT_44K, 0), PushOutcome::Accepted);
        assert_eq!(c.available(), 0);
        assert!(c.peek().is_empty());
        assert_eq!(p.ring().occupancy(), 0);
    }

    #[test]
    fn test_format_change_while_wrapped() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(400, 1)), PushOutcome::Accepted);
        assert_eq!(push(&mut p, &pattern(400, 2)), PushOutcome::Accepted);
        c.advance(500);
        assert_eq!(push(&mut p, &pattern(400, 3)), PushOutcome::Accepted);

        let fresh = pattern(100, 4);
        assert_eq!(p.push(&fresh, FMT_44K, 100), PushOutcome::Accepted);
        assert_eq!(c.available(), 100);
        assert_eq!(c.peek(), &fresh[..]);

        c.advance(100);
        assert_eq!(c.available(), 0);
    }

    #[test]
    fn test_format_change_frees_space_before_consumer_syncs() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(1000, 1)), PushOutcome::Accepted);

        // 消费者还没有任何操作，旧数据也已作废
        let fresh = pattern(600, 2);
        assert_eq!(p.push(&fresh, FMT_44K, 600), PushOutcome::Accepted);
        assert_eq!(p.ring().dropped_frames(), 0);
        assert_eq!(c.available(), 600);
        assert_eq!(c.peek(), &fresh[..]);
    }

    #[test]
    fn test_format_change_spares_held_view() {
        let (mut p, mut c) = pair(1024);
        let old = pattern(600, 1);
        assert_eq!(push(&mut p, &old), PushOutcome::Accepted);

        let view = c.peek();
        // 不碰视图的写入照常接受
        assert_eq!(p.push(&pattern(200, 2), FMT_44K, 200), PushOutcome::Accepted);
        // 回绕后会覆盖视图：丢弃
        assert_eq!(p.push(&pattern(300, 3), FMT_44K, 300), PushOutcome::Dropped);
        assert_eq!(view, &old[..]);

        assert_eq!(c.available(), 200);
        assert_eq!(p.push(&pattern(300, 3), FMT_44K, 300), PushOutcome::Accepted);
        assert_eq!(c.available(), 200 + 300);
        assert_eq!(p.ring().dropped_frames(), 1);
    }

    #[test]
    fn test_advance_after_format_change_is_ignored() {
        let (mut p, mut c) = pair(1024);
        assert_eq!(push(&mut p, &pattern(600, 1)), PushOutcome::Accepted);
        let n = c.peek().len();

        // 查看之后格式变化，刚才那 600 字节已经作废
        let fresh = pattern(100, 2);
        assert_eq!(p.push(&fresh, FMT_44K, 100), PushOutcome::Accepted);
        c.advance(n);
        assert_eq!(c.available(), 100);
        assert_eq!(c.peek(), &fresh[..]);
    }

    #[test]
    fn test_all_zero_format_is_reported() {
        let (mut p, c) = pair(64);
        let zero = AudioFormat::new(0, 0, 0);
        assert_eq!(p.push(&[], zero, 0), PushOutcome::Accepted);
        assert_eq!(c.format(), Some(zero));
    }

    #[test]
    fn test_first_frame_is_not_a_format_change() {
        let (mut p, _c) = pair(64);
        assert_eq!(p.ring().format(), None);
        assert_eq!(push(&mut p, &[1, 2, 3]), PushOutcome::Accepted);
        assert_eq!(p.ring().format_changes(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "advance past available")]
    fn test_over_advance_asserts() {
        let (mut p, mut c) = pair(64);
        assert_eq!(push(&mut p, &pattern(10, 1)), PushOutcome::Accepted);
        let n = c.available();
        c.advance(n);
        c.advance(1);
    }

    #[test]
    fn test_lock_memory_state() {
        let rb = AudioRingBuffer::new(4096).unwrap();
        let locked = rb.lock_memory();
        assert_eq!(rb.is_memory_locked(), locked);
    }
}
