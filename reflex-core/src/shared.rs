// Cross-task shared state. Every buffer has exactly one writing task;
// readers observe an atomically published slot with acquire/release
// ordering. Telemetry uses a seqlock so its larger record stays torn-free.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::imu::ImuSample;
use crate::range::RangeSample;

// ---- Double-buffered sample exchange ----

/// Two-slot publish/subscribe for a single writer and any readers.
///
/// The writer fills the non-published slot, then release-stores the slot
/// index; readers acquire-load the index and copy. The two-slot scheme
/// assumes readers copy out faster than the writer completes a full cycle,
/// which holds for the sample rates here.
pub struct DoubleBuffer<T> {
    slots: [UnsafeCell<T>; 2],
    current: AtomicU8,
}

// Single writer; readers only copy out of the published slot.
unsafe impl<T: Copy + Send> Sync for DoubleBuffer<T> {}

impl<T: Copy> DoubleBuffer<T> {
    pub const fn new(initial: T) -> Self {
        Self {
            slots: [UnsafeCell::new(initial), UnsafeCell::new(initial)],
            current: AtomicU8::new(0),
        }
    }

    /// Writer side: fill the spare slot and publish it.
    pub fn publish(&self, value: T) {
        let idx = (self.current.load(Ordering::Relaxed) ^ 1) & 1;
        unsafe {
            core::ptr::write_volatile(self.slots[idx as usize].get(), value);
        }
        self.current.store(idx, Ordering::Release);
    }

    /// Reader side: copy the latest published value.
    pub fn read(&self) -> T {
        let idx = self.current.load(Ordering::Acquire);
        unsafe { core::ptr::read_volatile(self.slots[idx as usize].get()) }
    }
}

// ---- Command channel ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command {
    pub v_mm_s: i16,
    pub w_mrad_s: i16,
    /// Envelope sequence of the command, echoed in telemetry.
    pub seq: u32,
}

/// Latched host command plus arrival timestamp. Writer: host-RX task.
/// Readers: control task, safety supervisor.
pub struct CommandBuffer {
    buf: DoubleBuffer<Command>,
    /// Microsecond timestamp of the last valid command; 0 = never.
    last_cmd_us: AtomicU32,
}

impl CommandBuffer {
    pub const fn new() -> Self {
        Self {
            buf: DoubleBuffer::new(Command {
                v_mm_s: 0,
                w_mrad_s: 0,
                seq: 0,
            }),
            last_cmd_us: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, cmd: Command, now_us: u32) {
        self.buf.publish(cmd);
        // A genuine arrival at tick 0 must still arm the timeout check.
        self.last_cmd_us
            .store(if now_us == 0 { 1 } else { now_us }, Ordering::Release);
    }

    pub fn read(&self) -> Command {
        self.buf.read()
    }

    /// 0 until the first command arrives.
    pub fn last_cmd_us(&self) -> u32 {
        self.last_cmd_us.load(Ordering::Acquire)
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub type ImuBuffer = DoubleBuffer<ImuSample>;
pub type RangeBuffer = DoubleBuffer<RangeSample>;

// ---- Telemetry seqlock ----

/// Control-loop snapshot published every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    pub speed_l_mm_s: i16,
    pub speed_r_mm_s: i16,
    pub gyro_z_mrad_s: i16,
    pub accel_x_mg: i16,
    pub accel_y_mg: i16,
    pub accel_z_mg: i16,
    pub battery_mv: u16,
    pub fault_flags: u16,
    pub timestamp_us: u32,
    pub cmd_seq_last_applied: u32,
    pub t_cmd_applied_us: u32,
}

/// Single-buffer seqlock: the writer increments to odd, stores the record,
/// increments to even. A reader accepts a copy only when it observes the
/// same even sequence on both sides; it retries a bounded number of times
/// and otherwise skips the cycle.
pub struct TelemetrySeqlock {
    seq: AtomicU32,
    data: UnsafeCell<TelemetrySnapshot>,
}

unsafe impl Sync for TelemetrySeqlock {}

const SEQLOCK_READ_RETRIES: usize = 3;

impl TelemetrySeqlock {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            data: UnsafeCell::new(TelemetrySnapshot {
                speed_l_mm_s: 0,
                speed_r_mm_s: 0,
                gyro_z_mrad_s: 0,
                accel_x_mg: 0,
                accel_y_mg: 0,
                accel_z_mg: 0,
                battery_mv: 0,
                fault_flags: 0,
                timestamp_us: 0,
                cmd_seq_last_applied: 0,
                t_cmd_applied_us: 0,
            }),
        }
    }

    /// Writer: control task only.
    pub fn write(&self, snapshot: TelemetrySnapshot) {
        // To odd: keeps subsequent stores from reordering before the mark.
        self.seq.fetch_add(1, Ordering::Acquire);
        unsafe {
            core::ptr::write_volatile(self.data.get(), snapshot);
        }
        // To even: keeps preceding stores from reordering after the mark.
        self.seq.fetch_add(1, Ordering::Release);
    }

    /// Reader: returns None when the writer kept colliding (skip the cycle).
    pub fn read(&self) -> Option<TelemetrySnapshot> {
        for _ in 0..SEQLOCK_READ_RETRIES {
            let s1 = self.seq.load(Ordering::Acquire);
            if s1 & 1 != 0 {
                continue;
            }
            let copy = unsafe { core::ptr::read_volatile(self.data.get()) };
            let s2 = self.seq.load(Ordering::Acquire);
            if s1 == s2 {
                return Some(copy);
            }
        }
        None
    }

    pub fn seq(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }
}

impl Default for TelemetrySeqlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn double_buffer_returns_latest() {
        let buf = DoubleBuffer::new(0u32);
        assert_eq!(buf.read(), 0);
        buf.publish(7);
        assert_eq!(buf.read(), 7);
        buf.publish(9);
        buf.publish(11);
        assert_eq!(buf.read(), 11);
    }

    #[test]
    fn command_buffer_arms_timeout_on_first_publish() {
        let cb = CommandBuffer::new();
        assert_eq!(cb.last_cmd_us(), 0);
        cb.publish(
            Command {
                v_mm_s: 100,
                w_mrad_s: 0,
                seq: 5,
            },
            0,
        );
        assert_ne!(cb.last_cmd_us(), 0);
        assert_eq!(cb.read().seq, 5);
    }

    #[test]
    fn seqlock_reads_are_even_and_consistent() {
        let tl = TelemetrySeqlock::new();
        tl.write(TelemetrySnapshot {
            speed_l_mm_s: 10,
            speed_r_mm_s: 10,
            ..Default::default()
        });
        assert_eq!(tl.seq() & 1, 0);
        let snap = tl.read().unwrap();
        assert_eq!(snap.speed_l_mm_s, 10);
    }

    #[test]
    fn seqlock_no_torn_reads_under_contention() {
        // Writer publishes snapshots whose fields encode one counter;
        // any accepted read must be internally consistent.
        let tl = Arc::new(TelemetrySeqlock::new());
        let writer = {
            let tl = Arc::clone(&tl);
            thread::spawn(move || {
                for i in 0..100_000u32 {
                    let v = (i % 30_000) as i16;
                    tl.write(TelemetrySnapshot {
                        speed_l_mm_s: v,
                        speed_r_mm_s: v,
                        gyro_z_mrad_s: v,
                        timestamp_us: i,
                        ..Default::default()
                    });
                }
            })
        };

        let mut accepted = 0u32;
        for _ in 0..100_000 {
            if let Some(snap) = tl.read() {
                accepted += 1;
                assert_eq!(snap.speed_l_mm_s, snap.speed_r_mm_s);
                assert_eq!(snap.speed_l_mm_s, snap.gyro_z_mrad_s);
            }
        }
        writer.join().unwrap();
        assert!(accepted > 0);
    }
}
