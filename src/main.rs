//! WebRTC Audio Sink - 压力演示
//!
//! 模拟音频管线：采集线程按固定周期产生正弦波帧写入 sink，
//! 拉取线程把数据读出并做电平分析，结束时打印统计。
//! 通过放慢消费者或缩小缓冲区可以观察丢帧行为。

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use webrtc_audio_sink::audio::peak_dbfs;
use webrtc_audio_sink::{
    sink, AudioFormat, AudioSink, DrainConfig, DrainWorker, SinkConfig, SinkStats,
};

/// WebRTC Audio Sink - lock-free audio frame sink stress demo
#[derive(Parser, Debug)]
#[command(name = "webrtc-audio-sink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Ring buffer size in milliseconds of audio
    #[arg(short, long, default_value = "200")]
    buffer_ms: u32,

    /// Ring buffer size in bytes (overrides --buffer-ms)
    #[arg(long)]
    buffer_bytes: Option<usize>,

    /// Run time in seconds
    #[arg(short, long, default_value = "5")]
    duration: f64,

    /// Sample rate in Hz
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Channel count
    #[arg(long, default_value = "2")]
    channels: u16,

    /// Bits per sample (8, 16, 24 or 32)
    #[arg(long, default_value = "16", value_parser = clap::value_parser!(u16).range(8..=32))]
    bits: u16,

    /// Callback period in milliseconds
    #[arg(long, default_value = "10")]
    period_ms: u32,

    /// Switch to this sample rate halfway through the run
    #[arg(long)]
    switch_rate: Option<u32>,

    /// Extra delay per drained chunk, to simulate a slow consumer
    #[arg(long, default_value = "0")]
    consumer_delay_ms: u64,

    /// Lock ring buffer memory (mlock)
    #[arg(long)]
    lock_memory: bool,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// 正弦波测试音
const TONE_HZ: f64 = 440.0;
/// 测试音幅度（-6 dBFS）
const TONE_AMPLITUDE: f64 = 0.5;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    check_args(&cli)?;

    let format = AudioFormat::new(cli.bits, cli.sample_rate, cli.channels);
    let mut config = match cli.buffer_bytes {
        Some(bytes) => SinkConfig {
            capacity_bytes: bytes,
            ..SinkConfig::default()
        },
        None => SinkConfig::for_duration(format, cli.buffer_ms),
    };
    config.lock_memory = cli.lock_memory;

    let (producer, consumer) = sink::open(&config)?;
    let ring = Arc::clone(producer.ring());

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    println!("WebRTC Audio Sink - stress demo");
    println!("Format: {} | Buffer: {} bytes", format, config.capacity_bytes);
    println!("Press Ctrl+C to stop early.\n");

    // 拉取线程：解码并统计峰值电平
    let peak = Arc::new(Mutex::new(f64::NEG_INFINITY));
    let peak_sink = Arc::clone(&peak);
    let consumer_delay = Duration::from_millis(cli.consumer_delay_ms);
    let mut samples = vec![0i32; DrainConfig::default().max_chunk_bytes];
    let mut drain = DrainWorker::start(consumer, DrainConfig::default(), move |data, format| {
        let n = format.decode_samples(data, &mut samples);
        let level = peak_dbfs(&samples[..n]);
        if let Ok(mut peak) = peak_sink.lock() {
            *peak = peak.max(level);
        }
        if !consumer_delay.is_zero() {
            thread::sleep(consumer_delay);
        }
    })?;

    // 采集线程
    let capture_running = Arc::clone(&running);
    let capture = CaptureConfig {
        format,
        switch_rate: cli.switch_rate,
        period: Duration::from_millis(cli.period_ms as u64),
        duration: Duration::from_secs_f64(cli.duration.max(0.0)),
    };
    let capture_thread = thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || {
            let mut producer = producer;
            run_capture(&mut producer, &capture, &capture_running)
        })?;

    let frames_pushed = capture_thread
        .join()
        .map_err(|_| anyhow::anyhow!("capture thread panicked"))?;
    running.store(false, Ordering::SeqCst);

    // 给消费者一点时间排空
    let deadline = Instant::now() + Duration::from_millis(500);
    while ring.occupancy() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let drain_stats = drain.stats();
    drain.stop();

    let stats = SinkStats::capture(&ring).with_water_level(drain_stats.water_level);
    println!("{}", stats);
    println!("Callbacks: {}", frames_pushed);
    println!(
        "Drained: {} bytes in {} chunks",
        drain_stats.bytes_drained, drain_stats.chunks_delivered
    );
    if let Ok(peak) = peak.lock() {
        println!("Peak level: {:.2} dBFS", *peak);
    }

    Ok(())
}

/// 参数校验：采样率（包括切换目标）、声道数和周期不能为 0
fn check_args(cli: &Cli) -> anyhow::Result<()> {
    if cli.sample_rate == 0 || cli.channels == 0 || cli.period_ms == 0 {
        anyhow::bail!("sample rate, channels and period must be non-zero");
    }
    if cli.switch_rate == Some(0) {
        anyhow::bail!("switch rate must be non-zero");
    }
    if cli.bits % 8 != 0 {
        anyhow::bail!("unsupported bit depth: {}", cli.bits);
    }
    Ok(())
}

/// 采集模拟参数
struct CaptureConfig {
    format: AudioFormat,
    switch_rate: Option<u32>,
    period: Duration,
    duration: Duration,
}

/// 采集线程主函数：按周期调用 sink，返回回调次数
///
/// 帧缓冲区按两种格式中较大者预先分配，循环内不分配
fn run_capture<S: AudioSink>(sink: &mut S, config: &CaptureConfig, running: &AtomicBool) -> u64 {
    let mut format = config.format;
    let switched = config.switch_rate.map(|rate| AudioFormat {
        sample_rate: rate,
        ..format
    });

    let max_rate = config
        .switch_rate
        .unwrap_or(0)
        .max(format.sample_rate) as u64;
    let max_frames = (max_rate * config.period.as_millis() as u64 / 1000).max(1) as usize;
    let channels = format.channels as usize;
    let mut samples = vec![0i32; max_frames * channels];
    let mut bytes = vec![0u8; max_frames * format.bytes_per_frame()];

    let mut phase = 0.0f64;
    let mut callbacks = 0u64;
    let start = Instant::now();
    let mut next_tick = start;

    log::info!(
        "Capture thread started: {} frames per {:?} callback",
        max_frames,
        config.period
    );

    while running.load(Ordering::Relaxed) && start.elapsed() < config.duration {
        if let Some(target) = switched {
            if format != target && start.elapsed() >= config.duration / 2 {
                log::info!("Switching capture format: {} -> {}", format, target);
                format = target;
            }
        }

        let frames = (format.sample_rate as u64 * config.period.as_millis() as u64 / 1000) as usize;
        let step = TAU * TONE_HZ / format.sample_rate as f64;
        for frame in samples[..frames * channels].chunks_exact_mut(channels) {
            let value = (phase.sin() * TONE_AMPLITUDE * i32::MAX as f64) as i32;
            frame.fill(value);
            phase = (phase + step) % TAU;
        }

        let len = frames * format.bytes_per_frame();
        format.encode_samples(&samples[..frames * channels], &mut bytes[..len]);
        sink.on_data(&bytes[..len], format, frames);
        callbacks += 1;

        next_tick += config.period;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    log::info!("Capture thread finished after {} callbacks", callbacks);
    callbacks
}
