// Face pose state machine. One task owns `FaceState`; command handlers only
// write `_target` fields (and one-shot gesture latches), the per-frame tick
// is the only writer of the continuous values.

use libm::{fmaxf, fminf, sinf};
use rand::Rng;

use crate::config::*;
use crate::gesture::{GestureId, GESTURE_NONE};
use crate::mood::Mood;

fn clampf(v: f32, lo: f32, hi: f32) -> f32 {
    fminf(fmaxf(v, lo), hi)
}

// First-order step toward the target.
fn tween(current: f32, target: f32, rate: f32) -> f32 {
    current + (target - current) * rate
}

// ---- Per-eye state ----

#[derive(Debug, Clone, Copy)]
pub struct EyeState {
    /// 0 = closed, 1 = open (starts closed for the boot sequence).
    pub openness: f32,
    pub openness_target: f32,
    pub is_open: bool,

    pub gaze_x: f32,
    pub gaze_x_target: f32,
    pub gaze_y: f32,
    pub gaze_y_target: f32,

    pub width_scale: f32,
    pub width_scale_target: f32,
    pub height_scale: f32,
    pub height_scale_target: f32,
}

impl Default for EyeState {
    fn default() -> Self {
        Self {
            openness: 0.0,
            openness_target: 1.0,
            is_open: true,
            gaze_x: 0.0,
            gaze_x_target: 0.0,
            gaze_y: 0.0,
            gaze_y_target: 0.0,
            width_scale: 1.0,
            width_scale_target: 1.0,
            height_scale: 1.0,
            height_scale_target: 1.0,
        }
    }
}

// ---- Eyelid state ----

/// Rendered coverage is the top/bottom/slope triple; the tired/angry/happy
/// overlays are the mood-driven sources that feed it each frame (system
/// drapes write the triple directly).
#[derive(Debug, Clone, Copy, Default)]
pub struct EyelidState {
    pub top_l: f32,
    pub top_r: f32,
    pub bottom_l: f32,
    pub bottom_r: f32,
    /// Signed: positive = inner corners pulled down (angry), negative =
    /// outer droop (tired).
    pub slope: f32,

    pub tired: f32,
    pub tired_target: f32,
    pub angry: f32,
    pub angry_target: f32,
    pub happy: f32,
    pub happy_target: f32,
}

// ---- Animation timers ----

#[derive(Debug, Clone, Copy)]
pub struct AnimTimers {
    pub autoblink: bool,
    pub next_blink: f32,

    pub idle: bool,
    pub next_idle: f32,

    pub confused: bool,
    pub confused_timer: f32,
    pub confused_duration: f32,
    pub confused_toggle: bool,

    pub laugh: bool,
    pub laugh_timer: f32,
    pub laugh_duration: f32,
    pub laugh_toggle: bool,

    pub surprise: bool,
    pub surprise_timer: f32,
    pub surprise_duration: f32,

    pub heart: bool,
    pub heart_timer: f32,
    pub heart_duration: f32,

    pub x_eyes: bool,
    pub x_eyes_timer: f32,
    pub x_eyes_duration: f32,

    pub sleepy: bool,
    pub sleepy_timer: f32,
    pub sleepy_duration: f32,

    pub rage: bool,
    pub rage_timer: f32,
    pub rage_duration: f32,

    pub h_flicker: bool,
    pub h_flicker_alt: bool,
    pub h_flicker_amp: f32,
    pub v_flicker: bool,
    pub v_flicker_alt: bool,
    pub v_flicker_amp: f32,
}

impl Default for AnimTimers {
    fn default() -> Self {
        Self {
            autoblink: true,
            next_blink: 0.0,
            idle: true,
            next_idle: 0.0,
            confused: false,
            confused_timer: 0.0,
            confused_duration: 0.5,
            confused_toggle: true,
            laugh: false,
            laugh_timer: 0.0,
            laugh_duration: 0.5,
            laugh_toggle: true,
            surprise: false,
            surprise_timer: 0.0,
            surprise_duration: 0.8,
            heart: false,
            heart_timer: 0.0,
            heart_duration: 2.0,
            x_eyes: false,
            x_eyes_timer: 0.0,
            x_eyes_duration: 1.5,
            sleepy: false,
            sleepy_timer: 0.0,
            sleepy_duration: 3.0,
            rage: false,
            rage_timer: 0.0,
            rage_duration: 3.0,
            h_flicker: false,
            h_flicker_alt: false,
            h_flicker_amp: 1.5,
            v_flicker: false,
            v_flicker_alt: false,
            v_flicker_amp: 1.5,
        }
    }
}

// ---- Effects ----

#[derive(Debug, Clone, Copy, Default)]
pub struct SparklePixel {
    pub x: i32,
    pub y: i32,
    pub life: i32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FirePixel {
    pub x: f32,
    pub y: f32,
    pub life: i32,
    /// 0..1, drives the palette band.
    pub heat: f32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EffectsState {
    pub breathing: bool,
    pub breath_phase: f32,

    pub edge_glow: bool,
    pub afterglow: bool,

    pub sparkle: bool,
    pub sparkle_chance: f32,
    pub sparkle_pixels: [SparklePixel; MAX_SPARKLES],

    pub fire_pixels: [FirePixel; MAX_FIRE_PIXELS],

    pub boot_active: bool,
    pub boot_timer: f32,
    pub boot_phase: u8,
}

impl Default for EffectsState {
    fn default() -> Self {
        Self {
            breathing: true,
            breath_phase: 0.0,
            edge_glow: true,
            afterglow: false,
            sparkle: true,
            sparkle_chance: 0.03,
            sparkle_pixels: [SparklePixel::default(); MAX_SPARKLES],
            fire_pixels: [FirePixel::default(); MAX_FIRE_PIXELS],
            boot_active: true,
            boot_timer: 0.0,
            boot_phase: 0,
        }
    }
}

// ---- System display state ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SystemMode {
    #[default]
    None = 0,
    Booting = 1,
    Error = 2,
    LowBattery = 3,
    Updating = 4,
    ShuttingDown = 5,
}

impl SystemMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::None,
            1 => Self::Booting,
            2 => Self::Error,
            3 => Self::LowBattery,
            4 => Self::Updating,
            5 => Self::ShuttingDown,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemState {
    pub mode: SystemMode,
    /// Entry timestamp, seconds.
    pub timer: f32,
    /// Mode-specific, e.g. battery level 0..1.
    pub param: f32,
}

// ---- Top-level face state ----

#[derive(Debug, Clone, Copy)]
pub struct FaceState {
    pub eye_l: EyeState,
    pub eye_r: EyeState,
    pub eyelids: EyelidState,
    pub anim: AnimTimers,
    pub fx: EffectsState,
    pub system: SystemState,

    pub mood: Mood,
    pub expression_intensity: f32,
    pub brightness: f32,
    pub solid_eye: bool,
    pub show_mouth: bool,

    pub talking: bool,
    pub talking_energy: f32,

    pub mouth_curve: f32,
    pub mouth_curve_target: f32,
    pub mouth_open: f32,
    pub mouth_open_target: f32,
    pub mouth_wave: f32,
    pub mouth_wave_target: f32,
    pub mouth_offset_x: f32,
    pub mouth_offset_x_target: f32,
    pub mouth_width: f32,
    pub mouth_width_target: f32,

    /// Color chosen this frame (mood table or gesture override).
    pub current_color: (u8, u8, u8),
    /// System drapes override the emotion color entirely.
    pub color_override: Option<(u8, u8, u8)>,
}

impl Default for FaceState {
    fn default() -> Self {
        Self {
            eye_l: EyeState::default(),
            eye_r: EyeState::default(),
            eyelids: EyelidState::default(),
            anim: AnimTimers::default(),
            fx: EffectsState::default(),
            system: SystemState::default(),
            mood: Mood::Neutral,
            expression_intensity: 1.0,
            brightness: 1.0,
            solid_eye: true,
            show_mouth: true,
            talking: false,
            talking_energy: 0.0,
            mouth_curve: 0.2,
            mouth_curve_target: 0.2,
            mouth_open: 0.0,
            mouth_open_target: 0.0,
            mouth_wave: 0.0,
            mouth_wave_target: 0.0,
            mouth_offset_x: 0.0,
            mouth_offset_x_target: 0.0,
            mouth_width: 1.0,
            mouth_width_target: 1.0,
            current_color: Mood::Neutral.color(),
            color_override: None,
        }
    }
}

impl FaceState {
    // ---- Command-side setters (targets only) ----

    pub fn blink(&mut self) {
        self.eye_l.openness_target = 0.0;
        self.eye_r.openness_target = 0.0;
        self.eye_l.is_open = true;
        self.eye_r.is_open = true;
    }

    pub fn wink_left(&mut self) {
        self.eye_l.openness_target = 0.0;
        self.eye_l.is_open = true;
    }

    pub fn wink_right(&mut self) {
        self.eye_r.openness_target = 0.0;
        self.eye_r.is_open = true;
    }

    pub fn set_gaze(&mut self, x: f32, y: f32) {
        let x = clampf(x, -MAX_GAZE, MAX_GAZE);
        let y = clampf(y, -MAX_GAZE, MAX_GAZE);
        for eye in [&mut self.eye_l, &mut self.eye_r] {
            eye.gaze_x_target = x;
            eye.gaze_y_target = y;
        }
    }

    pub fn set_mood(&mut self, mood: Mood) {
        self.mood = mood;
    }

    pub fn set_expression_intensity(&mut self, intensity: f32) {
        self.expression_intensity = clampf(intensity, 0.0, 1.0);
    }

    pub fn set_talking(&mut self, talking: bool, energy: f32) {
        self.talking = talking;
        self.talking_energy = if talking { clampf(energy, 0.0, 1.0) } else { 0.0 };
    }

    pub fn apply_flags(&mut self, flags: FaceFlags) {
        self.anim.idle = flags.contains(FaceFlags::IDLE_WANDER);
        self.anim.autoblink = flags.contains(FaceFlags::AUTOBLINK);
        self.solid_eye = flags.contains(FaceFlags::SOLID_EYE);
        self.show_mouth = flags.contains(FaceFlags::SHOW_MOUTH);
        self.fx.edge_glow = flags.contains(FaceFlags::EDGE_GLOW);
        self.fx.sparkle = flags.contains(FaceFlags::SPARKLE);
        self.fx.afterglow = flags.contains(FaceFlags::AFTERGLOW);
    }

    /// Trigger a one-shot gesture. Duration 0 selects the per-gesture
    /// default; anything else is clamped to at least 80 ms.
    pub fn trigger_gesture(&mut self, gesture: GestureId, duration_ms: u16, now: f32) {
        let dur = |fallback: f32| -> f32 {
            if duration_ms == 0 {
                fallback
            } else {
                fmaxf(0.08, duration_ms as f32 / 1000.0)
            }
        };

        match gesture {
            GestureId::Blink => self.blink(),
            GestureId::WinkL => self.wink_left(),
            GestureId::WinkR => self.wink_right(),
            GestureId::Confused => {
                self.anim.confused = true;
                self.anim.confused_duration = dur(0.5);
            }
            GestureId::Laugh => {
                self.anim.laugh = true;
                self.anim.laugh_duration = dur(0.5);
            }
            GestureId::Surprise => {
                self.anim.surprise = true;
                self.anim.surprise_timer = now;
                self.anim.surprise_duration = dur(0.8);
            }
            GestureId::Heart => {
                self.anim.heart = true;
                self.anim.heart_timer = now;
                self.anim.heart_duration = dur(2.0);
            }
            GestureId::XEyes => {
                self.anim.x_eyes = true;
                self.anim.x_eyes_timer = now;
                self.anim.x_eyes_duration = dur(1.5);
            }
            GestureId::Sleepy => {
                self.anim.sleepy = true;
                self.anim.sleepy_timer = now;
                self.anim.sleepy_duration = dur(3.0);
            }
            GestureId::Rage => {
                self.anim.rage = true;
                self.anim.rage_timer = now;
                self.anim.rage_duration = dur(3.0);
            }
            GestureId::Nod => {
                self.anim.laugh = true;
                self.anim.laugh_duration = dur(0.35);
            }
            GestureId::Headshake => {
                self.anim.confused = true;
                self.anim.confused_duration = dur(0.35);
            }
            GestureId::Wiggle => {
                self.anim.confused = true;
                self.anim.laugh = true;
                self.anim.confused_duration = dur(0.6);
                self.anim.laugh_duration = dur(0.6);
            }
        }
    }

    pub fn set_system_mode(&mut self, mode: SystemMode, param: f32, now: f32) {
        if self.system.mode == mode {
            self.system.param = param;
            return;
        }
        self.system.mode = mode;
        self.system.timer = now;
        self.system.param = param;
    }

    /// Highest-priority active gesture for status reporting, 0xFF for none.
    pub fn active_gesture(&self) -> u8 {
        if self.anim.rage {
            GestureId::Rage as u8
        } else if self.anim.heart {
            GestureId::Heart as u8
        } else if self.anim.surprise {
            GestureId::Surprise as u8
        } else if self.anim.x_eyes {
            GestureId::XEyes as u8
        } else if self.anim.sleepy {
            GestureId::Sleepy as u8
        } else if self.anim.laugh {
            GestureId::Laugh as u8
        } else if self.anim.confused {
            GestureId::Confused as u8
        } else {
            GESTURE_NONE
        }
    }

    pub fn breath_scale(&self) -> f32 {
        if !self.fx.breathing {
            return 1.0;
        }
        1.0 + sinf(self.fx.breath_phase) * BREATH_AMOUNT
    }

    // ---- Per-frame update ----

    /// Advance all animations by one frame. Call at ANIM_FPS with the
    /// monotonic time in seconds.
    pub fn advance<R: Rng>(&mut self, now: f32, rng: &mut R) {
        if self.update_system(now) {
            // System drapes own the pose; they run before the tween from
            // system_face::apply, called by the render task.
            self.update_breathing();
            self.current_color = self.compute_emotion_color(now, rng);
            return;
        }

        if self.fx.boot_active {
            if self.fx.boot_timer == 0.0 {
                self.fx.boot_timer = now;
            }
            self.update_boot(now);
            self.update_breathing();
            self.update_sparkle(rng);
            self.current_color = self.compute_emotion_color(now, rng);
            return;
        }

        self.apply_mood_targets();
        self.update_autoblink(now, rng);
        self.update_reopen();
        self.update_idle_gaze(now, rng);
        self.update_gestures(now);
        self.update_talking(now);
        self.update_squash_stretch();
        self.tween_all();
        self.apply_flicker();
        self.derive_eyelid_coverage();

        self.update_breathing();
        self.update_sparkle(rng);
        self.update_fire(rng);
        self.current_color = self.compute_emotion_color(now, rng);
    }

    fn update_system(&mut self, now: f32) -> bool {
        if self.system.mode == SystemMode::None {
            return false;
        }
        // BOOTING clears itself; the others persist until the host says so.
        if self.system.mode == SystemMode::Booting && now - self.system.timer >= 3.0 {
            self.system.mode = SystemMode::None;
            return false;
        }
        true
    }

    fn update_boot(&mut self, now: f32) {
        let elapsed = now - self.fx.boot_timer;

        match self.fx.boot_phase {
            0 => {
                // Ease-in eye open.
                let progress = fminf(1.0, elapsed / 1.0);
                let eased = 1.0 - (1.0 - progress) * (1.0 - progress);
                for eye in [&mut self.eye_l, &mut self.eye_r] {
                    eye.openness = eased;
                    eye.openness_target = eased;
                }
                if progress >= 1.0 {
                    self.fx.boot_phase = 1;
                    self.fx.boot_timer = now;
                }
            }
            1 => {
                // Blink down and back up.
                let o = if elapsed < 0.3 {
                    1.0 - elapsed / 0.3
                } else if elapsed < 0.5 {
                    0.0
                } else if elapsed < 0.9 {
                    (elapsed - 0.5) / 0.4
                } else {
                    self.fx.boot_phase = 2;
                    self.fx.boot_timer = now;
                    1.0
                };
                for eye in [&mut self.eye_l, &mut self.eye_r] {
                    eye.openness = o;
                    eye.openness_target = o;
                }
            }
            _ => {
                // Look left, right, center; then hand over to the live loop.
                let gx = if elapsed < 0.5 {
                    -2.0 * (elapsed / 0.5)
                } else if elapsed < 1.2 {
                    -2.0 + 4.0 * ((elapsed - 0.5) / 0.7)
                } else if elapsed < 1.8 {
                    2.0 * (1.0 - (elapsed - 1.2) / 0.6)
                } else {
                    self.fx.boot_active = false;
                    0.0
                };
                for eye in [&mut self.eye_l, &mut self.eye_r] {
                    eye.gaze_x = gx;
                    eye.gaze_x_target = gx;
                    eye.gaze_y = 0.0;
                    eye.gaze_y_target = 0.0;
                }
            }
        }
    }

    fn apply_mood_targets(&mut self) {
        let intensity = self.expression_intensity;

        self.eyelids.tired_target = match self.mood {
            Mood::Sad | Mood::Sleepy | Mood::Thinking => intensity,
            _ => 0.0,
        };
        self.eyelids.angry_target = match self.mood {
            Mood::Angry | Mood::Scared => intensity,
            _ => 0.0,
        };
        self.eyelids.happy_target = match self.mood {
            Mood::Happy | Mood::Excited | Mood::Love | Mood::Silly => intensity,
            _ => 0.0,
        };

        let curve = match self.mood {
            Mood::Happy | Mood::Excited | Mood::Love | Mood::Silly => 0.8,
            Mood::Angry | Mood::Scared => -0.6,
            Mood::Sad | Mood::Sleepy => -0.3,
            Mood::Curious | Mood::Thinking => 0.1,
            Mood::Surprised => 0.0,
            Mood::Neutral => 0.2,
        };
        // Intensity pulls the curve toward the neutral resting value.
        self.mouth_curve_target = 0.2 + (curve - 0.2) * intensity;
    }

    fn update_autoblink<R: Rng>(&mut self, now: f32, rng: &mut R) {
        if self.anim.autoblink && now >= self.anim.next_blink {
            self.blink();
            self.anim.next_blink = now + BLINK_INTERVAL + rng.gen_range(0.0..BLINK_VARIATION);
        }
    }

    fn update_reopen(&mut self) {
        for eye in [&mut self.eye_l, &mut self.eye_r] {
            if eye.is_open && eye.openness < 0.05 {
                eye.openness_target = 1.0;
            }
            if !eye.is_open {
                eye.openness_target = 0.0;
            }
        }
    }

    fn update_idle_gaze<R: Rng>(&mut self, now: f32, rng: &mut R) {
        if self.anim.idle && now >= self.anim.next_idle {
            let gx = rng.gen_range(-MAX_GAZE..MAX_GAZE);
            let gy = rng.gen_range(-MAX_GAZE * 0.6..MAX_GAZE * 0.6);
            for eye in [&mut self.eye_l, &mut self.eye_r] {
                eye.gaze_x_target = gx;
                eye.gaze_y_target = gy;
            }
            self.anim.next_idle = now + IDLE_INTERVAL + rng.gen_range(0.0..IDLE_VARIATION);
        }
    }

    fn update_gestures(&mut self, now: f32) {
        // Confused: horizontal shake one-shot.
        if self.anim.confused {
            if self.anim.confused_toggle {
                self.anim.h_flicker = true;
                self.anim.h_flicker_amp = 1.5;
                self.anim.confused_timer = now;
                self.anim.confused_toggle = false;
            } else if now >= self.anim.confused_timer + self.anim.confused_duration {
                self.anim.h_flicker = false;
                self.anim.confused_toggle = true;
                self.anim.confused = false;
            }
        }

        // Laugh: vertical shake one-shot.
        if self.anim.laugh {
            if self.anim.laugh_toggle {
                self.anim.v_flicker = true;
                self.anim.v_flicker_amp = 1.5;
                self.anim.laugh_timer = now;
                self.anim.laugh_toggle = false;
            } else if now >= self.anim.laugh_timer + self.anim.laugh_duration {
                self.anim.v_flicker = false;
                self.anim.laugh_toggle = true;
                self.anim.laugh = false;
            }
        }

        // Surprise: brief pop, then ease back.
        if self.anim.surprise {
            let elapsed = now - self.anim.surprise_timer;
            let (w, h) = if elapsed < 0.15 {
                (1.3, 1.25)
            } else {
                (1.0, 1.0)
            };
            for eye in [&mut self.eye_l, &mut self.eye_r] {
                eye.width_scale_target = w;
                eye.height_scale_target = h;
            }
            if elapsed >= self.anim.surprise_duration {
                self.anim.surprise = false;
            }
        }

        if self.anim.heart && now >= self.anim.heart_timer + self.anim.heart_duration {
            self.anim.heart = false;
        }

        if self.anim.x_eyes && now >= self.anim.x_eyes_timer + self.anim.x_eyes_duration {
            self.anim.x_eyes = false;
        }

        // Rage: 30 Hz gaze shake under angry lids.
        if self.anim.rage {
            let elapsed = now - self.anim.rage_timer;
            if elapsed < self.anim.rage_duration {
                self.eyelids.angry_target = 1.0;
                let shake = sinf(elapsed * 30.0) * 0.4;
                self.eye_l.gaze_x_target = shake;
                self.eye_r.gaze_x_target = shake;
            } else {
                self.eyelids.angry_target = 0.0;
                self.anim.rage = false;
            }
        }

        // Sleepy: droop + slow sway.
        if self.anim.sleepy {
            let elapsed = now - self.anim.sleepy_timer;
            if elapsed < self.anim.sleepy_duration {
                let droop = fminf(1.0, elapsed / (self.anim.sleepy_duration * 0.5));
                self.eyelids.tired_target = droop;
                let sway = sinf(elapsed * 2.0) * 1.5;
                for eye in [&mut self.eye_l, &mut self.eye_r] {
                    eye.gaze_x_target = sway;
                    eye.gaze_y_target = droop;
                }
            } else {
                self.eyelids.tired_target = 0.0;
                self.anim.sleepy = false;
            }
        }

        // Gesture → mouth overrides.
        self.mouth_wave_target = 0.0;
        self.mouth_offset_x_target = 0.0;
        self.mouth_width_target = 1.0;

        if self.anim.surprise {
            self.mouth_curve_target = 0.0;
            self.mouth_open_target = 0.8;
            self.mouth_width_target = 0.5;
        } else if self.anim.laugh {
            self.mouth_curve_target = 1.0;
            let elapsed = now - self.anim.laugh_timer;
            // 50 Hz chatter, set directly so it isn't smoothed away.
            let chatter = 0.2 + 0.3 * fmaxf(0.0, sinf(elapsed * 50.0));
            self.mouth_open = chatter;
            self.mouth_open_target = chatter;
        } else if self.anim.heart {
            self.mouth_curve_target = 1.0;
            self.mouth_open_target = 0.0;
        } else if self.anim.rage {
            self.mouth_curve_target = -1.0;
            self.mouth_open_target = 0.3;
            self.mouth_wave_target = 0.7;
        } else if self.anim.x_eyes {
            self.mouth_curve_target = 0.0;
            self.mouth_open_target = 0.8;
            self.mouth_width_target = 0.5;
        } else if self.anim.sleepy {
            // Yawn profile across the sleepy window.
            let elapsed = now - self.anim.sleepy_timer;
            let dur = fmaxf(0.2, self.anim.sleepy_duration);
            let (ys, yp, ye) = (dur * 0.2, dur * 0.4, dur * 0.7);
            if elapsed < ys {
                self.mouth_open_target = 0.0;
            } else if elapsed < yp {
                self.mouth_open_target = (elapsed - ys) / (yp - ys);
                self.mouth_curve_target = 0.0;
                self.mouth_width_target = 0.7;
            } else if elapsed < ye {
                self.mouth_open_target = 1.0;
                self.mouth_curve_target = 0.0;
                self.mouth_width_target = 0.7;
            } else {
                let t = (elapsed - ye) / (dur - ye);
                self.mouth_open_target = fmaxf(0.0, 1.0 - t * 1.5);
            }
        } else if self.anim.confused {
            let elapsed = now - self.anim.confused_timer;
            self.mouth_offset_x_target = 1.5 * sinf(elapsed * 12.0);
            self.mouth_curve_target = -0.2;
            self.mouth_open_target = 0.0;
        } else {
            self.mouth_open_target = 0.0;
        }
    }

    fn update_talking(&mut self, now: f32) {
        if !self.talking {
            return;
        }
        let e = clampf(self.talking_energy, 0.0, 1.0);
        let chatter = 0.18 + (0.72 * e) * (0.35 + 0.65 * (0.5 + 0.5 * sinf(now * 28.0)));
        self.mouth_open_target = fmaxf(self.mouth_open_target, chatter);
        self.mouth_width_target = fmaxf(self.mouth_width_target, 1.0 + 0.08 * e);

        let pulse = 0.015 + 0.035 * e;
        let y_pulse = pulse * sinf(now * 8.0);
        self.eye_l.height_scale_target = fmaxf(0.8, self.eye_l.height_scale_target + y_pulse);
        self.eye_r.height_scale_target = fmaxf(0.8, self.eye_r.height_scale_target + y_pulse);
    }

    fn update_squash_stretch(&mut self) {
        for eye in [&mut self.eye_l, &mut self.eye_r] {
            if eye.openness_target < 0.1 && eye.openness > 0.3 {
                eye.width_scale_target = 1.15;
                eye.height_scale_target = 0.85;
            } else if eye.openness_target > 0.9 && eye.openness < 0.7 {
                eye.width_scale_target = 0.9;
                eye.height_scale_target = 1.1;
            } else if eye.openness > 0.9 {
                eye.width_scale_target = 1.0;
                eye.height_scale_target = 1.0;
            }
        }
    }

    fn tween_all(&mut self) {
        for eye in [&mut self.eye_l, &mut self.eye_r] {
            eye.openness = tween(eye.openness, eye.openness_target, 0.5);
            eye.gaze_x = tween(eye.gaze_x, eye.gaze_x_target, 0.35);
            eye.gaze_y = tween(eye.gaze_y, eye.gaze_y_target, 0.35);
            eye.width_scale = tween(eye.width_scale, eye.width_scale_target, 0.3);
            eye.height_scale = tween(eye.height_scale, eye.height_scale_target, 0.3);
        }

        self.eyelids.tired = tween(self.eyelids.tired, self.eyelids.tired_target, 0.5);
        self.eyelids.angry = tween(self.eyelids.angry, self.eyelids.angry_target, 0.5);
        self.eyelids.happy = tween(self.eyelids.happy, self.eyelids.happy_target, 0.5);

        self.mouth_curve = tween(self.mouth_curve, self.mouth_curve_target, 0.25);
        self.mouth_open = tween(self.mouth_open, self.mouth_open_target, 0.3);
        self.mouth_wave = tween(self.mouth_wave, self.mouth_wave_target, 0.3);
        self.mouth_offset_x = tween(self.mouth_offset_x, self.mouth_offset_x_target, 0.25);
        self.mouth_width = tween(self.mouth_width, self.mouth_width_target, 0.25);
    }

    fn apply_flicker(&mut self) {
        if self.anim.h_flicker {
            let dx = if self.anim.h_flicker_alt {
                self.anim.h_flicker_amp
            } else {
                -self.anim.h_flicker_amp
            };
            self.eye_l.gaze_x += dx;
            self.eye_r.gaze_x += dx;
            self.anim.h_flicker_alt = !self.anim.h_flicker_alt;
        }
        if self.anim.v_flicker {
            let dy = if self.anim.v_flicker_alt {
                self.anim.v_flicker_amp
            } else {
                -self.anim.v_flicker_amp
            };
            self.eye_l.gaze_y += dy;
            self.eye_r.gaze_y += dy;
            self.anim.v_flicker_alt = !self.anim.v_flicker_alt;
        }
    }

    // Fold the tweened mood overlays into the rendered coverage triple.
    // Coverage is in half-eye-height units (0.5 fully closes a side).
    fn derive_eyelid_coverage(&mut self) {
        let lids = &mut self.eyelids;
        let top = clampf(0.25 * lids.tired + 0.1 * lids.angry, 0.0, 1.0);
        lids.top_l = top;
        lids.top_r = top;
        let bottom = clampf(0.15 * lids.happy, 0.0, 1.0);
        lids.bottom_l = bottom;
        lids.bottom_r = bottom;
        lids.slope = 0.25 * lids.angry - 0.15 * lids.tired;
    }

    fn update_breathing(&mut self) {
        if !self.fx.breathing {
            return;
        }
        self.fx.breath_phase += BREATH_SPEED / ANIM_FPS as f32;
        if self.fx.breath_phase > 2.0 * core::f32::consts::PI {
            self.fx.breath_phase -= 2.0 * core::f32::consts::PI;
        }
    }

    fn update_sparkle<R: Rng>(&mut self, rng: &mut R) {
        if !self.fx.sparkle {
            for sp in self.fx.sparkle_pixels.iter_mut() {
                sp.active = false;
            }
            return;
        }

        for sp in self.fx.sparkle_pixels.iter_mut() {
            if sp.active {
                sp.life -= 1;
                if sp.life <= 0 {
                    sp.active = false;
                }
            }
        }

        if rng.gen_range(0.0..1.0f32) < self.fx.sparkle_chance {
            if let Some(slot) = self.fx.sparkle_pixels.iter_mut().find(|s| !s.active) {
                slot.x = rng.gen_range(0..SCREEN_W);
                slot.y = rng.gen_range(0..SCREEN_H);
                slot.life = rng.gen_range(4..13);
                slot.active = true;
            }
        }
    }

    fn update_fire<R: Rng>(&mut self, rng: &mut R) {
        if !self.anim.rage {
            for fp in self.fx.fire_pixels.iter_mut() {
                fp.active = false;
            }
            return;
        }

        for fp in self.fx.fire_pixels.iter_mut() {
            if !fp.active {
                continue;
            }
            fp.x += rng.gen_range(-2.0..2.0);
            fp.y -= 3.0;
            fp.life -= 1;
            fp.heat *= 0.9;
            if fp.life <= 1 || fp.y < 0.0 {
                fp.active = false;
            }
        }

        // Spawn along the top of each eye.
        for cx in [LEFT_EYE_CX, RIGHT_EYE_CX] {
            for _ in 0..3 {
                if rng.gen_range(0.0..1.0f32) >= 0.7 {
                    continue;
                }
                if let Some(slot) = self.fx.fire_pixels.iter_mut().find(|f| !f.active) {
                    slot.x = cx + rng.gen_range(-EYE_WIDTH * 0.5..EYE_WIDTH * 0.5);
                    slot.y = rng.gen_range(20.0..55.0);
                    slot.life = rng.gen_range(4..11);
                    slot.heat = rng.gen_range(0.7..1.0);
                    slot.active = true;
                }
            }
        }
    }

    fn compute_emotion_color<R: Rng>(&self, now: f32, rng: &mut R) -> (u8, u8, u8) {
        if self.anim.rage {
            let flicker = rng.gen_range(-20i32..=20);
            let r = (230 + flicker).clamp(0, 255) as u8;
            let g = (30 + flicker).clamp(0, 255) as u8;
            return (r, g, 0);
        }
        if self.anim.heart {
            return (255, 60, 140);
        }
        if self.anim.x_eyes {
            return (200, 40, 40);
        }
        if self.anim.surprise && now - self.anim.surprise_timer < 0.15 {
            return (200, 220, 255);
        }
        self.mood.color()
    }

    /// Color the renderer should draw with this frame.
    pub fn draw_color(&self) -> (u8, u8, u8) {
        self.color_override.unwrap_or(self.current_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const DT: f32 = 1.0 / ANIM_FPS as f32;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0x5EED)
    }

    /// Run frames from `start` for `secs`, recording eye_l openness.
    fn run(fs: &mut FaceState, rng: &mut SmallRng, start: f32, secs: f32) -> std::vec::Vec<f32> {
        let mut out = std::vec::Vec::new();
        let frames = (secs / DT) as usize;
        for i in 0..frames {
            fs.advance(start + i as f32 * DT, rng);
            out.push(fs.eye_l.openness);
        }
        out
    }

    #[test]
    fn boot_sequence_opens_blinks_reopens_then_deactivates() {
        let mut fs = FaceState::default();
        let mut r = rng();
        assert!(fs.fx.boot_active);

        let trace = run(&mut fs, &mut r, 1.0, 6.0);
        assert!(!fs.fx.boot_active, "boot must deactivate");

        // Three legs: up to open, down to closed, back up to open.
        let peak1 = trace
            .iter()
            .position(|&o| o > 0.95)
            .expect("ease-in must fully open");
        let dip = trace[peak1..]
            .iter()
            .position(|&o| o < 0.05)
            .expect("boot blink must close");
        let reopen = trace[peak1 + dip..]
            .iter()
            .position(|&o| o > 0.95)
            .expect("boot blink must reopen");
        assert!(peak1 > 0 && dip > 0 && reopen > 0);

        // Monotonic ease-in on the first leg.
        for w in trace[..peak1].windows(2) {
            assert!(w[1] >= w[0] - 1e-4);
        }
    }

    fn settle(fs: &mut FaceState, r: &mut SmallRng) -> f32 {
        // Consume the boot sequence; return the next timestamp.
        let mut t = 1.0;
        while fs.fx.boot_active {
            fs.advance(t, r);
            t += DT;
        }
        // Keep wander/blink deterministic for target assertions.
        fs.anim.autoblink = false;
        fs.anim.idle = false;
        t
    }

    #[test]
    fn mood_tables_drive_targets() {
        let mut fs = FaceState::default();
        let mut r = rng();
        let t = settle(&mut fs, &mut r);

        fs.set_mood(Mood::Happy);
        fs.advance(t, &mut r);
        assert_eq!(fs.mouth_curve_target, 0.8);
        assert_eq!(fs.eyelids.happy_target, 1.0);
        assert_eq!(fs.eyelids.angry_target, 0.0);

        fs.set_mood(Mood::Angry);
        fs.advance(t + DT, &mut r);
        assert_eq!(fs.mouth_curve_target, -0.6);
        assert_eq!(fs.eyelids.angry_target, 1.0);

        fs.set_mood(Mood::Sad);
        fs.advance(t + 2.0 * DT, &mut r);
        assert!((fs.mouth_curve_target - -0.3).abs() < 1e-6);
        assert_eq!(fs.eyelids.tired_target, 1.0);

        fs.set_mood(Mood::Surprised);
        fs.advance(t + 3.0 * DT, &mut r);
        assert_eq!(fs.mouth_curve_target, 0.0);
    }

    #[test]
    fn expression_intensity_scales_toward_neutral() {
        let mut fs = FaceState::default();
        let mut r = rng();
        let t = settle(&mut fs, &mut r);

        fs.set_mood(Mood::Happy);
        fs.set_expression_intensity(0.5);
        fs.advance(t, &mut r);
        assert!((fs.mouth_curve_target - 0.5).abs() < 1e-6); // 0.2 + 0.6*0.5
        assert_eq!(fs.eyelids.happy_target, 0.5);
    }

    #[test]
    fn blink_closes_then_reopens() {
        let mut fs = FaceState::default();
        let mut r = rng();
        let mut t = settle(&mut fs, &mut r);

        // Let the eye open fully first.
        for _ in 0..40 {
            fs.advance(t, &mut r);
            t += DT;
        }
        assert!(fs.eye_l.openness > 0.9);

        fs.blink();
        let mut min_seen = 1.0f32;
        for _ in 0..40 {
            fs.advance(t, &mut r);
            t += DT;
            min_seen = min_seen.min(fs.eye_l.openness);
        }
        assert!(min_seen < 0.05, "blink must close, saw {min_seen}");
        assert!(fs.eye_l.openness > 0.9, "blink must reopen");
    }

    #[test]
    fn gaze_is_clamped_at_set_time() {
        let mut fs = FaceState::default();
        fs.set_gaze(99.0, -99.0);
        assert_eq!(fs.eye_l.gaze_x_target, MAX_GAZE);
        assert_eq!(fs.eye_l.gaze_y_target, -MAX_GAZE);
    }

    #[test]
    fn talking_overlay_opens_mouth_and_respects_energy() {
        let mut fs = FaceState::default();
        let mut r = rng();
        let mut t = settle(&mut fs, &mut r);

        fs.set_talking(true, 1.0);
        let mut max_open_target = 0.0f32;
        for _ in 0..30 {
            fs.advance(t, &mut r);
            t += DT;
            max_open_target = max_open_target.max(fs.mouth_open_target);
        }
        assert!(max_open_target >= 0.18, "talking must open the mouth");

        // Dropping talking returns the mouth target to the mood default
        // on the very next frame.
        fs.set_talking(false, 0.0);
        fs.advance(t, &mut r);
        assert_eq!(fs.mouth_open_target, 0.0);
    }

    #[test]
    fn rage_takes_priority_in_status() {
        let mut fs = FaceState::default();
        fs.anim.laugh = true;
        fs.anim.rage = true;
        assert_eq!(fs.active_gesture(), GestureId::Rage as u8);
        fs.anim.rage = false;
        assert_eq!(fs.active_gesture(), GestureId::Laugh as u8);
        fs.anim.laugh = false;
        assert_eq!(fs.active_gesture(), GESTURE_NONE);
    }

    #[test]
    fn gesture_duration_clamped_to_80ms() {
        let mut fs = FaceState::default();
        fs.trigger_gesture(GestureId::Surprise, 5, 10.0);
        assert!((fs.anim.surprise_duration - 0.08).abs() < 1e-6);

        fs.trigger_gesture(GestureId::Heart, 0, 10.0);
        assert_eq!(fs.anim.heart_duration, 2.0);
    }

    #[test]
    fn surprise_pops_then_releases() {
        let mut fs = FaceState::default();
        let mut r = rng();
        let t = settle(&mut fs, &mut r);

        fs.trigger_gesture(GestureId::Surprise, 0, t);
        fs.advance(t + DT, &mut r);
        assert_eq!(fs.eye_l.width_scale_target, 1.3);
        assert_eq!(fs.eye_l.height_scale_target, 1.25);

        // After the pop window the targets ease back.
        fs.advance(t + 0.3, &mut r);
        assert_eq!(fs.eye_l.width_scale_target, 1.0);

        // And the one-shot expires.
        fs.advance(t + 1.0, &mut r);
        assert!(!fs.anim.surprise);
    }

    #[test]
    fn flags_toggle_features() {
        let mut fs = FaceState::default();
        fs.apply_flags(FaceFlags::AUTOBLINK | FaceFlags::SHOW_MOUTH);
        assert!(fs.anim.autoblink);
        assert!(!fs.anim.idle);
        assert!(!fs.solid_eye);
        assert!(fs.show_mouth);
        assert!(!fs.fx.afterglow);
    }

    #[test]
    fn gesture_colors_override_mood() {
        let mut fs = FaceState::default();
        let mut r = rng();
        fs.set_mood(Mood::Happy);
        fs.anim.heart = true;
        fs.anim.heart_timer = 99.0;
        fs.anim.heart_duration = 10.0;
        fs.fx.boot_active = false;
        fs.advance(100.0, &mut r);
        assert_eq!(fs.current_color, (255, 60, 140));

        // System drape override wins over everything.
        fs.color_override = Some((1, 2, 3));
        assert_eq!(fs.draw_color(), (1, 2, 3));
    }

    #[test]
    fn booting_system_mode_self_clears_after_3s() {
        let mut fs = FaceState::default();
        let mut r = rng();
        fs.fx.boot_active = false;
        fs.set_system_mode(SystemMode::Booting, 0.0, 10.0);

        fs.advance(11.0, &mut r);
        assert_eq!(fs.system.mode, SystemMode::Booting);
        fs.advance(13.1, &mut r);
        assert_eq!(fs.system.mode, SystemMode::None);
    }
}
