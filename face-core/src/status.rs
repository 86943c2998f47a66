// Status shared between the animation task (writer) and the telemetry task
// (reader), plus the render-perf accumulation window for HEARTBEAT.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use companion_link::telemetry::{
    FaceStatus, HeartbeatPerfTail, STATUS_FLAG_PTT_LISTENING, STATUS_FLAG_TALKING,
    STATUS_FLAG_TOUCH_ACTIVE,
};

use crate::config::{AFTERGLOW_DOWNSAMPLE, FACE_PERF_SAMPLE_DIV};
use crate::gesture::GESTURE_NONE;
use crate::render::RenderPerf;
use crate::state::FaceState;

/// Face status mirror, one writer (animation task).
pub struct StatusShared {
    mood: AtomicU8,
    active_gesture: AtomicU8,
    system_mode: AtomicU8,
    talking: AtomicBool,
    touch_active: AtomicBool,
    ptt_listening: AtomicBool,
    /// Last command seq received over the v2 envelope.
    cmd_seq_last: AtomicU32,
    /// When the display buffer was last committed.
    cmd_applied_us: AtomicU32,
}

impl StatusShared {
    pub const fn new() -> Self {
        Self {
            mood: AtomicU8::new(0),
            active_gesture: AtomicU8::new(GESTURE_NONE),
            system_mode: AtomicU8::new(0),
            talking: AtomicBool::new(false),
            touch_active: AtomicBool::new(false),
            ptt_listening: AtomicBool::new(false),
            cmd_seq_last: AtomicU32::new(0),
            cmd_applied_us: AtomicU32::new(0),
        }
    }

    /// Animation task: mirror the post-advance face state.
    pub fn publish_face(&self, fs: &FaceState) {
        self.mood.store(fs.mood as u8, Ordering::Relaxed);
        self.active_gesture.store(fs.active_gesture(), Ordering::Relaxed);
        self.system_mode.store(fs.system.mode as u8, Ordering::Relaxed);
        self.talking.store(fs.talking, Ordering::Relaxed);
    }

    pub fn set_touch_active(&self, active: bool) {
        self.touch_active.store(active, Ordering::Relaxed);
    }

    pub fn set_ptt_listening(&self, listening: bool) {
        self.ptt_listening.store(listening, Ordering::Relaxed);
    }

    pub fn ptt_listening(&self) -> bool {
        self.ptt_listening.load(Ordering::Relaxed)
    }

    pub fn system_mode(&self) -> u8 {
        self.system_mode.load(Ordering::Relaxed)
    }

    pub fn note_cmd_seq(&self, seq: u32) {
        self.cmd_seq_last.store(seq, Ordering::Relaxed);
    }

    pub fn note_applied(&self, now_us: u32) {
        self.cmd_applied_us.store(now_us, Ordering::Release);
    }

    pub fn applied_us(&self) -> u32 {
        self.cmd_applied_us.load(Ordering::Acquire)
    }

    /// Telemetry task: assemble the FACE_STATUS payload.
    pub fn snapshot(&self) -> FaceStatus {
        let mut flags = 0u8;
        if self.touch_active.load(Ordering::Relaxed) {
            flags |= STATUS_FLAG_TOUCH_ACTIVE;
        }
        if self.talking.load(Ordering::Relaxed) {
            flags |= STATUS_FLAG_TALKING;
        }
        if self.ptt_listening.load(Ordering::Relaxed) {
            flags |= STATUS_FLAG_PTT_LISTENING;
        }
        FaceStatus {
            mood_id: self.mood.load(Ordering::Relaxed),
            active_gesture: self.active_gesture.load(Ordering::Relaxed),
            system_mode: self.system_mode.load(Ordering::Relaxed),
            flags,
            cmd_seq_last_applied: self.cmd_seq_last.load(Ordering::Relaxed),
            t_state_applied_us: self.applied_us(),
        }
    }
}

impl Default for StatusShared {
    fn default() -> Self {
        Self::new()
    }
}

// ---- Render-perf accumulation ----

/// Accumulates frame/render timings between HEARTBEAT publishes.
#[derive(Debug, Default)]
pub struct PerfWindow {
    frames: u32,
    frame_sum_us: u64,
    frame_max_us: u32,
    render_sum_us: u64,
    render_max_us: u32,
    stage_samples: u32,
    eyes_sum_us: u64,
    mouth_sum_us: u64,
    border_sum_us: u64,
    effects_sum_us: u64,
    overlay_sum_us: u64,
    dirty_px_sum: u64,
    latency_sum_us: u64,
    latency_samples: u32,
    dirty_rect_enabled: bool,
}

impl PerfWindow {
    pub const fn new(dirty_rect_enabled: bool) -> Self {
        Self {
            frames: 0,
            frame_sum_us: 0,
            frame_max_us: 0,
            render_sum_us: 0,
            render_max_us: 0,
            stage_samples: 0,
            eyes_sum_us: 0,
            mouth_sum_us: 0,
            border_sum_us: 0,
            effects_sum_us: 0,
            overlay_sum_us: 0,
            dirty_px_sum: 0,
            latency_sum_us: 0,
            latency_samples: 0,
            dirty_rect_enabled,
        }
    }

    pub fn record_frame(&mut self, frame_us: u32, perf: &RenderPerf, stage_sampled: bool) {
        self.frames += 1;
        self.frame_sum_us += frame_us as u64;
        if frame_us > self.frame_max_us {
            self.frame_max_us = frame_us;
        }
        self.render_sum_us += perf.render_us as u64;
        if perf.render_us > self.render_max_us {
            self.render_max_us = perf.render_us;
        }
        self.dirty_px_sum += perf.dirty_px as u64;

        if stage_sampled {
            self.stage_samples += 1;
            self.eyes_sum_us += perf.eyes_us as u64;
            self.mouth_sum_us += perf.mouth_us as u64;
            self.border_sum_us += perf.border_us as u64;
            self.effects_sum_us += perf.effects_us as u64;
            self.overlay_sum_us += perf.overlay_us as u64;
        }
    }

    pub fn record_cmd_latency(&mut self, us: u32) {
        self.latency_sum_us += us as u64;
        self.latency_samples += 1;
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Drain the window into a HEARTBEAT perf tail.
    pub fn take(&mut self) -> HeartbeatPerfTail {
        fn avg(sum: u64, n: u32) -> u32 {
            if n > 0 { (sum / n as u64) as u32 } else { 0 }
        }

        let tail = HeartbeatPerfTail {
            window_frames: self.frames,
            frame_us_avg: avg(self.frame_sum_us, self.frames),
            frame_us_max: self.frame_max_us,
            render_us_avg: avg(self.render_sum_us, self.frames),
            render_us_max: self.render_max_us,
            eyes_us_avg: avg(self.eyes_sum_us, self.stage_samples),
            mouth_us_avg: avg(self.mouth_sum_us, self.stage_samples),
            border_us_avg: avg(self.border_sum_us, self.stage_samples),
            effects_us_avg: avg(self.effects_sum_us, self.stage_samples),
            overlay_us_avg: avg(self.overlay_sum_us, self.stage_samples),
            dirty_px_avg: avg(self.dirty_px_sum, self.frames),
            // Two bytes per RGB565 pixel, one window per second.
            spi_bytes_per_s: (self.dirty_px_sum * 2).min(u32::MAX as u64) as u32,
            cmd_rx_to_apply_us_avg: avg(self.latency_sum_us, self.latency_samples),
            perf_sample_div: FACE_PERF_SAMPLE_DIV as u8,
            dirty_rect_enabled: self.dirty_rect_enabled as u8,
            afterglow_downsample: AFTERGLOW_DOWNSAMPLE as u8,
            reserved: 0,
        };
        *self = Self::new(self.dirty_rect_enabled);
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mood::Mood;

    #[test]
    fn status_flags_assemble() {
        let st = StatusShared::new();
        let mut fs = FaceState::default();
        fs.set_mood(Mood::Love);
        fs.set_talking(true, 0.5);
        st.publish_face(&fs);
        st.set_touch_active(true);
        st.set_ptt_listening(true);
        st.note_cmd_seq(99);

        let snap = st.snapshot();
        assert_eq!(snap.mood_id, Mood::Love as u8);
        assert_eq!(
            snap.flags,
            STATUS_FLAG_TOUCH_ACTIVE | STATUS_FLAG_TALKING | STATUS_FLAG_PTT_LISTENING
        );
        assert_eq!(snap.cmd_seq_last_applied, 99);
    }

    #[test]
    fn perf_window_averages_and_resets() {
        let mut w = PerfWindow::new(true);
        for i in 0..10u32 {
            let perf = RenderPerf {
                render_us: 1000,
                dirty_px: 100,
                eyes_us: 400,
                ..Default::default()
            };
            w.record_frame(2000 + i, &perf, i % 2 == 0);
        }
        w.record_cmd_latency(33_000);

        let tail = w.take();
        assert_eq!(tail.window_frames, 10);
        assert!(tail.frame_us_avg >= 2000);
        assert_eq!(tail.render_us_avg, 1000);
        assert_eq!(tail.eyes_us_avg, 400);
        assert_eq!(tail.dirty_px_avg, 100);
        assert_eq!(tail.cmd_rx_to_apply_us_avg, 33_000);

        // Window restarts empty.
        assert_eq!(w.frames(), 0);
        assert_eq!(w.take().window_frames, 0);
    }
}
