// Audio pipeline logic for the audio-capable variant: PCM chunk queues,
// tone synthesis with edge fades, and the microphone activity probe.
// Codec bring-up and I2S transfers live in the firmware crate.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

use libm::{log10, sinf, sqrt};

pub const SAMPLE_RATE_HZ: u32 = 16_000;
/// 10 ms of mono s16 at 16 kHz.
pub const CHUNK_SAMPLES: usize = 160;
/// ~100 ms of buffering per direction.
pub const CHUNK_QUEUE_CAP: usize = 10;

pub const TONE_EDGE_FADE_MS: u32 = 15;
pub const DIAG_TONE_FREQ_HZ: u32 = 1000;
pub const DIAG_TONE_AMP: i16 = 28_000;
pub const BOOT_TONE_FREQ_HZ: u32 = 660;
pub const BOOT_TONE_AMP: i16 = 12_000;

/// Per-chunk RMS above this counts as microphone activity.
pub const MIC_ACTIVITY_RMS_THRESHOLD: f32 = 300.0;

#[derive(Clone, Copy)]
pub struct AudioChunk {
    pub samples: [i16; CHUNK_SAMPLES],
    pub len: usize,
}

impl Default for AudioChunk {
    fn default() -> Self {
        Self {
            samples: [0; CHUNK_SAMPLES],
            len: 0,
        }
    }
}

/// SPSC ring of PCM chunks (speaker playback and microphone capture each
/// get one). Drop-newest on overflow: better to lose the incoming chunk
/// than to glitch what is already queued.
pub struct PcmQueue {
    buf: [UnsafeCell<AudioChunk>; CHUNK_QUEUE_CAP],
    head: AtomicU8,
    tail: AtomicU8,
}

unsafe impl Sync for PcmQueue {}

impl PcmQueue {
    pub const fn new() -> Self {
        const INIT: UnsafeCell<AudioChunk> = UnsafeCell::new(AudioChunk {
            samples: [0; CHUNK_SAMPLES],
            len: 0,
        });
        Self {
            buf: [INIT; CHUNK_QUEUE_CAP],
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
        }
    }

    fn next(i: u8) -> u8 {
        ((i as usize + 1) % CHUNK_QUEUE_CAP) as u8
    }

    pub fn push(&self, chunk: &AudioChunk) -> bool {
        let h = self.head.load(Ordering::Relaxed);
        let n = Self::next(h);
        if n == self.tail.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            *self.buf[h as usize].get() = *chunk;
        }
        self.head.store(n, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<AudioChunk> {
        let t = self.tail.load(Ordering::Relaxed);
        if t == self.head.load(Ordering::Acquire) {
            return None;
        }
        let chunk = unsafe { *self.buf[t as usize].get() };
        self.tail.store(Self::next(t), Ordering::Release);
        Some(chunk)
    }

    pub fn len(&self) -> usize {
        let h = self.head.load(Ordering::Acquire) as usize;
        let t = self.tail.load(Ordering::Acquire) as usize;
        (h + CHUNK_QUEUE_CAP - t) % CHUNK_QUEUE_CAP
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PcmQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ---- Tone synthesis ----

/// Sine generator with linear fade-in/out so tone edges don't click.
pub struct ToneSynth {
    phase: f32,
    phase_inc: f32,
    amp: f32,
    frames_total: u32,
    frames_written: u32,
    fade_frames: u32,
}

impl ToneSynth {
    pub fn new(freq_hz: u32, amp: i16, duration_ms: u32) -> Self {
        let frames_total = SAMPLE_RATE_HZ * duration_ms / 1000;
        let fade = SAMPLE_RATE_HZ * TONE_EDGE_FADE_MS / 1000;
        Self {
            phase: 0.0,
            phase_inc: 2.0 * core::f32::consts::PI * freq_hz as f32 / SAMPLE_RATE_HZ as f32,
            amp: amp as f32,
            frames_total,
            frames_written: 0,
            fade_frames: fade.max(1).min(frames_total / 2),
        }
    }

    pub fn finished(&self) -> bool {
        self.frames_written >= self.frames_total
    }

    /// Fill `out` with the next frames; returns how many were produced
    /// (less than `out.len()` only at the end of the tone).
    pub fn fill(&mut self, out: &mut [i16]) -> usize {
        let mut produced = 0;
        for slot in out.iter_mut() {
            if self.finished() {
                break;
            }
            let idx = self.frames_written;
            let fade_in = (idx as f32 / self.fade_frames as f32).min(1.0);
            let remaining = self.frames_total - idx;
            let fade_out = (remaining as f32 / self.fade_frames as f32).min(1.0);
            let env = fade_in.min(fade_out);

            *slot = (self.amp * env * sinf(self.phase)) as i16;
            self.phase += self.phase_inc;
            if self.phase > 2.0 * core::f32::consts::PI {
                self.phase -= 2.0 * core::f32::consts::PI;
            }
            self.frames_written += 1;
            produced += 1;
        }
        produced
    }
}

// ---- Microphone activity probe ----

/// Running RMS/peak over captured samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeStats {
    sum_sq: u64,
    peak: i32,
    count: u32,
}

impl ProbeStats {
    pub const fn new() -> Self {
        Self {
            sum_sq: 0,
            peak: 0,
            count: 0,
        }
    }

    pub fn add_sample(&mut self, sample: i16) {
        let s = sample as i32;
        let a = s.unsigned_abs() as i32;
        if a > self.peak {
            self.peak = a;
        }
        self.sum_sq += (s as i64 * s as i64) as u64;
        self.count += 1;
    }

    pub fn add_chunk(&mut self, chunk: &AudioChunk) {
        for &s in &chunk.samples[..chunk.len] {
            self.add_sample(s);
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn peak(&self) -> i32 {
        self.peak
    }

    pub fn rms(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        sqrt(self.sum_sq as f64 / self.count as f64) as f32
    }

    pub fn dbfs(&self) -> f32 {
        let rms = self.rms();
        if rms > 0.0 {
            (20.0 * log10(rms as f64 / 32768.0)) as f32
        } else {
            -120.0
        }
    }

    pub fn is_active(&self) -> bool {
        self.rms() >= MIC_ACTIVITY_RMS_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo_and_bounded() {
        let q = PcmQueue::new();
        assert!(q.is_empty());

        for i in 0..CHUNK_QUEUE_CAP as i16 + 3 {
            let mut c = AudioChunk::default();
            c.samples[0] = i;
            c.len = 1;
            q.push(&c);
        }
        // Ring keeps CAP-1 entries; overflow pushes were refused.
        assert_eq!(q.len(), CHUNK_QUEUE_CAP - 1);
        assert_eq!(q.pop().unwrap().samples[0], 0);
        assert_eq!(q.pop().unwrap().samples[0], 1);
    }

    #[test]
    fn tone_fades_in_and_out() {
        let mut synth = ToneSynth::new(DIAG_TONE_FREQ_HZ, DIAG_TONE_AMP, 100);
        let mut buf = [0i16; CHUNK_SAMPLES];
        let mut all = std::vec::Vec::new();
        loop {
            let n = synth.fill(&mut buf);
            if n == 0 {
                break;
            }
            all.extend_from_slice(&buf[..n]);
        }
        assert_eq!(all.len(), (SAMPLE_RATE_HZ as usize) / 10);

        // First sample silent, middle loud, last samples quiet again.
        assert_eq!(all[0], 0);
        let mid_peak = all[all.len() / 2 - 40..all.len() / 2 + 40]
            .iter()
            .map(|s| s.unsigned_abs() as u32)
            .max()
            .unwrap();
        assert!(mid_peak > DIAG_TONE_AMP as u32 * 9 / 10);
        let tail_peak = all[all.len() - 10..]
            .iter()
            .map(|s| s.unsigned_abs() as u32)
            .max()
            .unwrap();
        assert!(tail_peak < DIAG_TONE_AMP as u32 / 10);
    }

    #[test]
    fn probe_classifies_silence_and_signal() {
        let mut quiet = ProbeStats::new();
        for _ in 0..1000 {
            quiet.add_sample(3);
        }
        assert!(!quiet.is_active());
        assert!(quiet.dbfs() < -60.0);

        let mut loud = ProbeStats::new();
        for i in 0..1000 {
            loud.add_sample(if i % 2 == 0 { 2000 } else { -2000 });
        }
        assert!(loud.is_active());
        assert!((loud.rms() - 2000.0).abs() < 1.0);
        assert_eq!(loud.peak(), 2000);
    }
}
