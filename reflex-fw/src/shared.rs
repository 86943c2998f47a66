// Cross-task globals. Single writer per buffer (see reflex-core::shared);
// the runtime-mutable config is copied out per tick under a short critical
// section.

use core::cell::RefCell;

use critical_section::Mutex;

use companion_link::packet::TxState;
use reflex_core::config::ReflexConfig;
use reflex_core::faults::FaultLatch;
use reflex_core::imu::ImuSample;
use reflex_core::range::RangeSample;
use reflex_core::shared::{CommandBuffer, DoubleBuffer, TelemetrySeqlock};

pub static IMU: DoubleBuffer<ImuSample> = DoubleBuffer::new(ImuSample {
    gyro_z_rad_s: 0.0,
    accel_x_g: 0.0,
    accel_y_g: 0.0,
    accel_z_g: 0.0,
    timestamp_us: 0,
});

pub static RANGE: DoubleBuffer<RangeSample> = DoubleBuffer::new(RangeSample {
    range_mm: 0,
    status: reflex_core::range::RangeStatus::NotReady,
    timestamp_us: 0,
});

pub static COMMAND: CommandBuffer = CommandBuffer::new();
pub static TELEMETRY: TelemetrySeqlock = TelemetrySeqlock::new();
pub static FAULTS: FaultLatch = FaultLatch::new();
pub static TX: TxState = TxState::new();

/// Set by the safety task when a stop policy requests short-brake; the
/// control task applies the brake pattern instead of its outputs while any
/// fault is latched (PWM registers stay single-writer).
pub static BRAKE_REQ: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

/// Small replies (time-sync, version ack) produced by the host-RX task and
/// transmitted by the telemetry task, which owns the TX endpoint.
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

static CONFIG: Mutex<RefCell<Option<ReflexConfig>>> = Mutex::new(RefCell::new(None));

pub fn config_init() {
    critical_section::with(|cs| {
        CONFIG.borrow_ref_mut(cs).replace(ReflexConfig::default());
    });
}

pub fn config_snapshot() -> ReflexConfig {
    critical_section::with(|cs| {
        CONFIG
            .borrow_ref(cs)
            .clone()
            .unwrap_or_default()
    })
}

pub fn config_apply(param_id: u8, value: &[u8; 4]) -> bool {
    critical_section::with(|cs| {
        let mut cfg = CONFIG.borrow_ref_mut(cs);
        match cfg.as_mut() {
            Some(cfg) => cfg.apply(param_id, value),
            None => false,
        }
    })
}

/// Microseconds since boot, truncated to the wire width.
pub fn now_us() -> u32 {
    embassy_time::Instant::now().as_micros() as u32
}

pub fn now_us64() -> u64 {
    embassy_time::Instant::now().as_micros()
}
