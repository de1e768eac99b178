//! 音频格式和样本解码
//!
//! 格式由音频回调逐帧上报（位深、采样率、声道数），
//! 格式变化时 ring buffer 会丢弃所有未读数据。
//!
//! 解码的内部表示：所有位深统一左对齐到 i32 的高位
//! - 8-bit:  无符号 PCM，去偏置后占据 bit[31:24]
//! - 16-bit: 占据 bit[31:16]，bit[15:0] = 0
//! - 24-bit: 占据 bit[31:8]，bit[7:0] = 0
//! - 32-bit: 占据 bit[31:0]

/// 音频格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// 创建新的音频格式
    pub fn new(bits_per_sample: u16, sample_rate: u32, channels: u16) -> Self {
        Self {
            bits_per_sample,
            sample_rate,
            channels,
        }
    }

    /// 每样本的字节数
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// 每帧的字节数
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// `frames` 帧对应的字节数，溢出时返回 None
    #[inline]
    pub fn frame_bytes(&self, frames: usize) -> Option<usize> {
        frames.checked_mul(self.bytes_per_frame())
    }

    /// `millis` 毫秒音频对应的字节数
    pub fn bytes_for_millis(&self, millis: u32) -> usize {
        let frames = self.sample_rate as u64 * millis as u64 / 1000;
        (frames as usize).saturating_mul(self.bytes_per_frame())
    }

    /// 打包为单个 u64，供原子存储使用
    ///
    /// 布局：bits[63:48] = 位深，bits[47:32] = 声道数，bits[31:0] = 采样率。
    /// 所有取值都合法（包括全零），"尚未收到帧" 由 ring buffer 单独记录。
    #[inline]
    pub(crate) fn pack(&self) -> u64 {
        ((self.bits_per_sample as u64) << 48)
            | ((self.channels as u64) << 32)
            | self.sample_rate as u64
    }

    #[inline]
    pub(crate) fn unpack(packed: u64) -> Self {
        Self {
            bits_per_sample: (packed >> 48) as u16,
            channels: (packed >> 32) as u16,
            sample_rate: packed as u32,
        }
    }

    /// 将原始字节（little-endian）解码为左对齐的 i32 样本
    ///
    /// 返回写入 `output` 的样本数；不支持的位深返回 0
    pub fn decode_samples(&self, bytes: &[u8], output: &mut [i32]) -> usize {
        match self.bits_per_sample {
            8 => {
                let n = bytes.len().min(output.len());
                for (out, &b) in output.iter_mut().zip(bytes) {
                    *out = (b as i32 - 128) << 24;
                }
                n
            }
            16 => {
                let mut n = 0;
                for (out, chunk) in output.iter_mut().zip(bytes.chunks_exact(2)) {
                    *out = (i16::from_le_bytes([chunk[0], chunk[1]]) as i32) << 16;
                    n += 1;
                }
                n
            }
            24 => {
                let mut n = 0;
                for (out, chunk) in output.iter_mut().zip(bytes.chunks_exact(3)) {
                    // 先把 MSB 放到 bit31，符号位自然就位
                    *out = ((chunk[0] as i32) << 8)
                        | ((chunk[1] as i32) << 16)
                        | ((chunk[2] as i32) << 24);
                    n += 1;
                }
                n
            }
            32 => {
                let mut n = 0;
                for (out, chunk) in output.iter_mut().zip(bytes.chunks_exact(4)) {
                    *out = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    n += 1;
                }
                n
            }
            _ => 0,
        }
    }

    /// 将左对齐的 i32 样本打包为 little-endian 字节
    ///
    /// 返回写入的样本数（受 `output` 长度限制）
    pub fn encode_samples(&self, samples: &[i32], output: &mut [u8]) -> usize {
        let width = self.bytes_per_sample();
        if !matches!(width, 1..=4) || self.bits_per_sample % 8 != 0 {
            return 0;
        }

        let mut n = 0;
        for (&sample, out) in samples.iter().zip(output.chunks_exact_mut(width)) {
            match width {
                // 8-bit 是无符号 PCM
                1 => out[0] = ((sample >> 24) + 128) as u8,
                // 高位在 bytes[4 - width..]
                _ => out.copy_from_slice(&sample.to_le_bytes()[4 - width..]),
            }
            n += 1;
        }
        n
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz / {} ch / {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// 左对齐样本的峰值电平（dBFS），静音返回 `f64::NEG_INFINITY`
pub fn peak_dbfs(samples: &[i32]) -> f64 {
    let peak = samples
        .iter()
        .map(|s| s.unsigned_abs())
        .max()
        .unwrap_or(0);
    if peak == 0 {
        return f64::NEG_INFINITY;
    }
    20.0 * (peak as f64 / 2_147_483_648.0).log10()
}
