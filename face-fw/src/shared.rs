// Cross-task globals for the face image.

use core::sync::atomic::{AtomicU32, Ordering};

use companion_link::packet::TxState;
use face_core::audio::PcmQueue;
use face_core::channels::{ButtonSample, EventBuffer, FaceChannels, TouchSample};
use face_core::config::{DEFAULT_BRIGHTNESS, FaceFlags};
use face_core::status::StatusShared;

pub static CHANNELS: FaceChannels = FaceChannels::new(
    DEFAULT_BRIGHTNESS,
    FaceFlags::all().difference(FaceFlags::AFTERGLOW).bits(),
);

pub static TOUCH_EVENTS: EventBuffer<TouchSample> = EventBuffer::new(TouchSample {
    event_type: 0xFF,
    x: 0,
    y: 0,
    timestamp_us: 0,
});

pub static BUTTON_EVENTS: EventBuffer<ButtonSample> = EventBuffer::new(ButtonSample {
    button_id: 0xFF,
    event_type: 0xFF,
    state: 0,
    timestamp_us: 0,
});

pub static STATUS: StatusShared = StatusShared::new();
pub static TX: TxState = TxState::new();

/// Active calibration touch-transform preset (diagnostic builds only).
pub static TOUCH_PRESET: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);

/// Speaker playback and microphone capture, ~100 ms deep each.
pub static SPEAKER_QUEUE: PcmQueue = PcmQueue::new();
pub static MIC_QUEUE: PcmQueue = PcmQueue::new();

// Link counters surfaced through HEARTBEAT.
pub static RX_FRAMES: AtomicU32 = AtomicU32::new(0);
pub static RX_BAD_CRC: AtomicU32 = AtomicU32::new(0);
pub static RX_OVERRUNS: AtomicU32 = AtomicU32::new(0);
pub static RX_UNKNOWN: AtomicU32 = AtomicU32::new(0);
pub static TX_FRAMES: AtomicU32 = AtomicU32::new(0);
pub static TX_DROPPED: AtomicU32 = AtomicU32::new(0);

pub static STATUS_TX_COUNT: AtomicU32 = AtomicU32::new(0);
pub static TOUCH_TX_COUNT: AtomicU32 = AtomicU32::new(0);
pub static BUTTON_TX_COUNT: AtomicU32 = AtomicU32::new(0);

pub fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Small replies produced by host-RX, sent by the telemetry task.
#[derive(Clone, Copy)]
pub struct Reply {
    pub type_id: u8,
    pub payload: [u8; 16],
    pub len: usize,
}

pub static REPLIES: embassy_sync::channel::Channel<
    embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex,
    Reply,
    4,
> = embassy_sync::channel::Channel::new();

pub fn now_us() -> u32 {
    embassy_time::Instant::now().as_micros() as u32
}

pub fn now_us64() -> u64 {
    embassy_time::Instant::now().as_micros()
}

pub fn now_s() -> f32 {
    embassy_time::Instant::now().as_micros() as f32 / 1_000_000.0
}
