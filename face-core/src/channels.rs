// Latched command channels between the host-RX task and the animation task,
// plus the gesture ring and the touch/button event buffers.
//
// State, system, talking, flags and conv-state are last-writer-wins: a
// microsecond stamp doubles as the version, so high-rate re-sends of one
// channel can never crowd out another. Gestures queue because each one-shot
// is semantically distinct.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI8, AtomicU32, AtomicU8, Ordering};

use crate::border::ConvBorder;
use crate::config::{FaceFlags, MAX_GAZE, TALKING_CMD_TIMEOUT_MS};
use crate::gesture::GestureId;
use crate::mood::Mood;
use crate::state::{FaceState, SystemMode};

fn stamp(now_us: u32) -> u32 {
    // 0 means "never published"; a genuine 0 timestamp still counts.
    if now_us == 0 { 1 } else { now_us }
}

// ---- Latched channels ----

pub struct StateChannel {
    mood: AtomicU8,
    intensity: AtomicU8,
    gaze_x: AtomicI8,
    gaze_y: AtomicI8,
    brightness: AtomicU8,
    stamp_us: AtomicU32,
}

impl StateChannel {
    pub const fn new(default_brightness: u8) -> Self {
        Self {
            mood: AtomicU8::new(0),
            intensity: AtomicU8::new(255),
            gaze_x: AtomicI8::new(0),
            gaze_y: AtomicI8::new(0),
            brightness: AtomicU8::new(default_brightness),
            stamp_us: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, mood: u8, intensity: u8, gaze_x: i8, gaze_y: i8, brightness: u8, now_us: u32) {
        self.mood.store(mood, Ordering::Relaxed);
        self.intensity.store(intensity, Ordering::Relaxed);
        self.gaze_x.store(gaze_x, Ordering::Relaxed);
        self.gaze_y.store(gaze_y, Ordering::Relaxed);
        self.brightness.store(brightness, Ordering::Relaxed);
        self.stamp_us.store(stamp(now_us), Ordering::Release);
    }

    pub fn stamp_us(&self) -> u32 {
        self.stamp_us.load(Ordering::Acquire)
    }
}

pub struct SystemChannel {
    mode: AtomicU8,
    param: AtomicU8,
    stamp_us: AtomicU32,
}

impl SystemChannel {
    pub const fn new() -> Self {
        Self {
            mode: AtomicU8::new(0),
            param: AtomicU8::new(0),
            stamp_us: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, mode: u8, param: u8, now_us: u32) {
        self.mode.store(mode, Ordering::Relaxed);
        self.param.store(param, Ordering::Relaxed);
        self.stamp_us.store(stamp(now_us), Ordering::Release);
    }
}

pub struct TalkingChannel {
    talking: AtomicU8,
    energy: AtomicU8,
    stamp_us: AtomicU32,
}

impl TalkingChannel {
    pub const fn new() -> Self {
        Self {
            talking: AtomicU8::new(0),
            energy: AtomicU8::new(0),
            stamp_us: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, talking: bool, energy: u8, now_us: u32) {
        self.talking.store(talking as u8, Ordering::Relaxed);
        self.energy.store(energy, Ordering::Relaxed);
        self.stamp_us.store(stamp(now_us), Ordering::Release);
    }
}

pub struct FlagsChannel {
    flags: AtomicU8,
    stamp_us: AtomicU32,
}

impl FlagsChannel {
    pub const fn new(boot_default: u8) -> Self {
        Self {
            flags: AtomicU8::new(boot_default),
            stamp_us: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, flags: u8, now_us: u32) {
        self.flags.store(flags, Ordering::Relaxed);
        self.stamp_us.store(stamp(now_us), Ordering::Release);
    }

    pub fn current(&self) -> u8 {
        self.flags.load(Ordering::Relaxed)
    }
}

pub struct ConvChannel {
    state: AtomicU8,
    stamp_us: AtomicU32,
}

impl ConvChannel {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
            stamp_us: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, state: u8, now_us: u32) {
        self.state.store(state, Ordering::Relaxed);
        self.stamp_us.store(stamp(now_us), Ordering::Release);
    }
}

// ---- Gesture ring ----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GestureEvent {
    pub gesture_id: u8,
    pub duration_ms: u16,
    pub timestamp_us: u32,
}

pub const GESTURE_QUEUE_CAP: usize = 16;

/// SPSC FIFO, drop-oldest on overflow. The producer may evict the oldest
/// entry; both eviction and the consumer pop advance the tail with a CAS so
/// a slot is consumed exactly once.
pub struct GestureQueue {
    buf: [UnsafeCell<GestureEvent>; GESTURE_QUEUE_CAP],
    head: AtomicU8,
    tail: AtomicU8,
}

unsafe impl Sync for GestureQueue {}

impl GestureQueue {
    pub const fn new() -> Self {
        const INIT: UnsafeCell<GestureEvent> = UnsafeCell::new(GestureEvent {
            gesture_id: 0,
            duration_ms: 0,
            timestamp_us: 0,
        });
        Self {
            buf: [INIT; GESTURE_QUEUE_CAP],
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
        }
    }

    fn next(i: u8) -> u8 {
        ((i as usize + 1) % GESTURE_QUEUE_CAP) as u8
    }

    /// Producer side. Returns false when full.
    pub fn push(&self, ev: GestureEvent) -> bool {
        let h = self.head.load(Ordering::Relaxed);
        let n = Self::next(h);
        if n == self.tail.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            *self.buf[h as usize].get() = ev;
        }
        self.head.store(n, Ordering::Release);
        true
    }

    /// Producer side: make room by dropping the oldest entry, then push.
    pub fn push_evicting(&self, ev: GestureEvent) {
        if self.push(ev) {
            return;
        }
        let t = self.tail.load(Ordering::Acquire);
        if t != self.head.load(Ordering::Relaxed) {
            let _ = self
                .tail
                .compare_exchange(t, Self::next(t), Ordering::AcqRel, Ordering::Relaxed);
        }
        if !self.push(ev) {
            log::warn!("gesture queue saturated; dropped gesture id={}", ev.gesture_id);
        }
    }

    /// Consumer side.
    pub fn pop(&self) -> Option<GestureEvent> {
        loop {
            let t = self.tail.load(Ordering::Acquire);
            if t == self.head.load(Ordering::Acquire) {
                return None;
            }
            let ev = unsafe { *self.buf[t as usize].get() };
            if self
                .tail
                .compare_exchange(t, Self::next(t), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(ev);
            }
            // Lost the slot to an eviction; retry.
        }
    }
}

impl Default for GestureQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ---- Input event buffers ----

/// Two-slot single-writer sample exchange (same discipline as the sensor
/// buffers on the other MCU).
pub struct EventBuffer<T> {
    slots: [UnsafeCell<T>; 2],
    current: AtomicU8,
}

unsafe impl<T: Copy + Send> Sync for EventBuffer<T> {}

impl<T: Copy> EventBuffer<T> {
    pub const fn new(initial: T) -> Self {
        Self {
            slots: [UnsafeCell::new(initial), UnsafeCell::new(initial)],
            current: AtomicU8::new(0),
        }
    }

    pub fn publish(&self, value: T) {
        let idx = (self.current.load(Ordering::Relaxed) ^ 1) & 1;
        unsafe {
            core::ptr::write_volatile(self.slots[idx as usize].get(), value);
        }
        self.current.store(idx, Ordering::Release);
    }

    pub fn read(&self) -> T {
        let idx = self.current.load(Ordering::Acquire);
        unsafe { core::ptr::read_volatile(self.slots[idx as usize].get()) }
    }
}

pub const EVENT_NONE: u8 = 0xFF;

#[derive(Debug, Clone, Copy)]
pub struct TouchSample {
    /// 0 = press, 1 = release, 2 = drag; EVENT_NONE when consumed.
    pub event_type: u8,
    pub x: u16,
    pub y: u16,
    pub timestamp_us: u32,
}

impl Default for TouchSample {
    fn default() -> Self {
        Self {
            event_type: EVENT_NONE,
            x: 0,
            y: 0,
            timestamp_us: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ButtonSample {
    pub button_id: u8,
    pub event_type: u8,
    pub state: u8,
    pub timestamp_us: u32,
}

impl Default for ButtonSample {
    fn default() -> Self {
        Self {
            button_id: EVENT_NONE,
            event_type: EVENT_NONE,
            state: 0,
            timestamp_us: 0,
        }
    }
}

// ---- Channel bundle + per-frame ingest ----

pub struct FaceChannels {
    pub state: StateChannel,
    pub system: SystemChannel,
    pub talking: TalkingChannel,
    pub flags: FlagsChannel,
    pub conv: ConvChannel,
    pub gestures: GestureQueue,
}

impl FaceChannels {
    pub const fn new(default_brightness: u8, boot_flags: u8) -> Self {
        Self {
            state: StateChannel::new(default_brightness),
            system: SystemChannel::new(),
            talking: TalkingChannel::new(),
            flags: FlagsChannel::new(boot_flags),
            conv: ConvChannel::new(),
            gestures: GestureQueue::new(),
        }
    }
}

/// Animation-task-private view of what has already been applied.
#[derive(Debug, Default)]
pub struct ChannelCursor {
    last_state_us: u32,
    last_system_us: u32,
    last_talking_us: u32,
    last_flags_us: u32,
    last_conv_us: u32,
    /// Receive stamp of the newest command applied this frame (for the
    /// cmd→apply latency measurement).
    pub latest_cmd_rx_us: u32,
}

/// Effects the caller must carry out after ingest.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyResult {
    pub backlight: Option<u8>,
}

/// Drain all command channels into the face state, in the fixed order:
/// gestures, state, system, talking (with staleness), flags, conv-state.
pub fn apply_commands(
    cursor: &mut ChannelCursor,
    ch: &FaceChannels,
    fs: &mut FaceState,
    border: &mut ConvBorder,
    now_us: u32,
) -> ApplyResult {
    let mut result = ApplyResult::default();
    let now_s = now_us as f32 / 1_000_000.0;

    // 1. One-shot gestures, FIFO.
    while let Some(ev) = ch.gestures.pop() {
        if let Some(g) = GestureId::from_u8(ev.gesture_id) {
            fs.trigger_gesture(g, ev.duration_ms, now_s);
            cursor.latest_cmd_rx_us = ev.timestamp_us;
        }
    }

    // 2. Latest state command.
    let state_us = ch.state.stamp_us();
    if state_us != 0 && state_us != cursor.last_state_us {
        cursor.last_state_us = state_us;
        cursor.latest_cmd_rx_us = state_us;
        let mood = ch.state.mood.load(Ordering::Relaxed);
        let intensity = ch.state.intensity.load(Ordering::Relaxed);
        let gx = ch.state.gaze_x.load(Ordering::Relaxed);
        let gy = ch.state.gaze_y.load(Ordering::Relaxed);
        let brightness = ch.state.brightness.load(Ordering::Relaxed);

        if let Some(m) = Mood::from_u8(mood) {
            fs.set_mood(m);
        }
        fs.set_expression_intensity(intensity as f32 / 255.0);
        fs.set_gaze(
            gx as f32 / 127.0 * MAX_GAZE,
            gy as f32 / 127.0 * MAX_GAZE,
        );
        result.backlight = Some(brightness);
    }

    // 3. Latest system command.
    let system_us = ch.system.stamp_us.load(Ordering::Acquire);
    if system_us != 0 && system_us != cursor.last_system_us {
        cursor.last_system_us = system_us;
        cursor.latest_cmd_rx_us = system_us;
        let mode = ch.system.mode.load(Ordering::Relaxed);
        let param = ch.system.param.load(Ordering::Relaxed);
        if let Some(m) = SystemMode::from_u8(mode) {
            fs.set_system_mode(m, param as f32 / 255.0, now_s);
        }
    }

    // 4. Latest talking command + starve timeout.
    let talking_us = ch.talking.stamp_us.load(Ordering::Acquire);
    if talking_us != 0 && talking_us != cursor.last_talking_us {
        cursor.last_talking_us = talking_us;
        cursor.latest_cmd_rx_us = talking_us;
        let talking = ch.talking.talking.load(Ordering::Relaxed) != 0;
        let energy = ch.talking.energy.load(Ordering::Relaxed);
        fs.set_talking(talking, energy as f32 / 255.0);
    }
    if fs.talking && cursor.last_talking_us != 0 {
        let age_us = now_us.wrapping_sub(cursor.last_talking_us);
        if age_us > TALKING_CMD_TIMEOUT_MS * 1000 {
            fs.set_talking(false, 0.0);
        }
    }

    // 5. Latest flags command.
    let flags_us = ch.flags.stamp_us.load(Ordering::Acquire);
    if flags_us != 0 && flags_us != cursor.last_flags_us {
        cursor.last_flags_us = flags_us;
        cursor.latest_cmd_rx_us = flags_us;
        let flags = ch.flags.flags.load(Ordering::Relaxed);
        fs.apply_flags(FaceFlags::from_bits_truncate(flags));
    }

    // 6. Latest conversation state.
    let conv_us = ch.conv.stamp_us.load(Ordering::Acquire);
    if conv_us != 0 && conv_us != cursor.last_conv_us {
        cursor.last_conv_us = conv_us;
        cursor.latest_cmd_rx_us = conv_us;
        border.set_state(ch.conv.state.load(Ordering::Relaxed));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BRIGHTNESS;

    fn fixture() -> (FaceChannels, ChannelCursor, FaceState, ConvBorder) {
        let ch = FaceChannels::new(DEFAULT_BRIGHTNESS, FaceFlags::boot_default().bits());
        let mut fs = FaceState::default();
        fs.fx.boot_active = false;
        (ch, ChannelCursor::default(), fs, ConvBorder::new())
    }

    #[test]
    fn gesture_fifo_preserves_order() {
        let (ch, _, _, _) = fixture();
        for id in [3u8, 4, 5] {
            ch.gestures.push_evicting(GestureEvent {
                gesture_id: id,
                duration_ms: 0,
                timestamp_us: 1,
            });
        }
        assert_eq!(ch.gestures.pop().unwrap().gesture_id, 3);
        assert_eq!(ch.gestures.pop().unwrap().gesture_id, 4);
        assert_eq!(ch.gestures.pop().unwrap().gesture_id, 5);
        assert!(ch.gestures.pop().is_none());
    }

    #[test]
    fn gesture_overflow_drops_oldest() {
        let (ch, _, _, _) = fixture();
        // Ring holds CAP-1 entries.
        for id in 0..(GESTURE_QUEUE_CAP as u8 + 2) {
            ch.gestures.push_evicting(GestureEvent {
                gesture_id: id,
                duration_ms: 0,
                timestamp_us: 1,
            });
        }
        // Oldest entries were evicted; the newest survives.
        let first = ch.gestures.pop().unwrap().gesture_id;
        assert!(first > 0);
        let mut last = first;
        while let Some(ev) = ch.gestures.pop() {
            assert_eq!(ev.gesture_id, last + 1);
            last = ev.gesture_id;
        }
        assert_eq!(last, GESTURE_QUEUE_CAP as u8 + 1);
    }

    #[test]
    fn talking_resends_do_not_mask_state_command() {
        let (ch, mut cur, mut fs, mut border) = fixture();

        // 100 Hz talking re-sends...
        for i in 0..10u32 {
            ch.talking.publish(true, 0, 1000 + i * 10_000);
        }
        // ...with one state command interleaved.
        ch.state.publish(Mood::Happy as u8, 255, 0, 0, 128, 95_000);

        apply_commands(&mut cur, &ch, &mut fs, &mut border, 100_000);
        assert_eq!(fs.mood, Mood::Happy);
        assert!(fs.talking);

        // Further talking traffic leaves the applied state untouched.
        ch.talking.publish(true, 10, 110_000);
        apply_commands(&mut cur, &ch, &mut fs, &mut border, 120_000);
        assert_eq!(fs.mood, Mood::Happy);
    }

    #[test]
    fn talking_goes_stale_after_timeout() {
        let (ch, mut cur, mut fs, mut border) = fixture();

        ch.talking.publish(true, 200, 1_000_000);
        apply_commands(&mut cur, &ch, &mut fs, &mut border, 1_010_000);
        assert!(fs.talking);

        // One frame past the starve timeout: talking drops out.
        let later = 1_000_000 + (TALKING_CMD_TIMEOUT_MS + 40) * 1000;
        apply_commands(&mut cur, &ch, &mut fs, &mut border, later);
        assert!(!fs.talking);
        assert_eq!(fs.talking_energy, 0.0);
    }

    #[test]
    fn gestures_apply_before_state() {
        let (ch, mut cur, mut fs, mut border) = fixture();
        ch.gestures.push_evicting(GestureEvent {
            gesture_id: GestureId::Rage as u8,
            duration_ms: 0,
            timestamp_us: 500,
        });
        ch.state.publish(Mood::Sad as u8, 255, 0, 0, 200, 600);

        apply_commands(&mut cur, &ch, &mut fs, &mut border, 1000);
        assert!(fs.anim.rage);
        assert_eq!(fs.mood, Mood::Sad);
        // Latest applied command stamp is the later of the two.
        assert_eq!(cur.latest_cmd_rx_us, 600);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let (ch, mut cur, mut fs, mut border) = fixture();
        ch.state.publish(200, 255, 0, 0, 200, 700); // bad mood id
        ch.gestures.push_evicting(GestureEvent {
            gesture_id: 99,
            duration_ms: 0,
            timestamp_us: 1,
        });
        apply_commands(&mut cur, &ch, &mut fs, &mut border, 1000);
        assert_eq!(fs.mood, Mood::Neutral);
        assert_eq!(fs.active_gesture(), crate::gesture::GESTURE_NONE);
    }

    #[test]
    fn event_buffer_latest_wins() {
        let buf: EventBuffer<TouchSample> = EventBuffer::new(TouchSample::default());
        assert_eq!(buf.read().event_type, EVENT_NONE);
        buf.publish(TouchSample {
            event_type: 0,
            x: 10,
            y: 20,
            timestamp_us: 1,
        });
        buf.publish(TouchSample {
            event_type: 1,
            x: 11,
            y: 21,
            timestamp_us: 2,
        });
        let s = buf.read();
        assert_eq!(s.event_type, 1);
        assert_eq!(s.x, 11);
    }
}
