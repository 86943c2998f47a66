// Display geometry, animation timing and feature flags (320x240 landscape).

use bitflags::bitflags;

// ---- Display ----
pub const SCREEN_W: i32 = 320;
pub const SCREEN_H: i32 = 240;

// ---- Face geometry ----
pub const EYE_WIDTH: f32 = 80.0;
pub const EYE_HEIGHT: f32 = 85.0;
pub const EYE_CORNER_R: f32 = 25.0;
pub const PUPIL_R: f32 = 20.0;

pub const LEFT_EYE_CX: f32 = 90.0;
pub const LEFT_EYE_CY: f32 = 85.0;
pub const RIGHT_EYE_CX: f32 = 230.0;
pub const RIGHT_EYE_CY: f32 = 85.0;

/// Eye body shift per unit gaze.
pub const GAZE_EYE_SHIFT: f32 = 3.0;
/// Pupil shift per unit gaze.
pub const GAZE_PUPIL_SHIFT: f32 = 8.0;
pub const MAX_GAZE: f32 = 12.0;

// ---- Mouth geometry ----
pub const MOUTH_CX: f32 = 160.0;
pub const MOUTH_CY: f32 = 185.0;
pub const MOUTH_HALF_W: f32 = 60.0;
pub const MOUTH_THICKNESS: f32 = 8.0;

// ---- Timing ----
/// TFT refresh; 30 FPS is sufficient. The tween rate constants in
/// `state.rs` are tuned against this value.
pub const ANIM_FPS: u32 = 30;
/// Base seconds between blinks.
pub const BLINK_INTERVAL: f32 = 2.0;
/// Random extra seconds.
pub const BLINK_VARIATION: f32 = 3.0;
pub const IDLE_INTERVAL: f32 = 1.5;
pub const IDLE_VARIATION: f32 = 2.5;
/// rad/s.
pub const BREATH_SPEED: f32 = 1.8;
/// ±4% scale.
pub const BREATH_AMOUNT: f32 = 0.04;

/// Talking is starved back to idle after this much command silence.
pub const TALKING_CMD_TIMEOUT_MS: u32 = 450;

// ---- Brightness ----
pub const DEFAULT_BRIGHTNESS: u8 = 200;

// ---- Telemetry ----
pub const TELEMETRY_HZ: u32 = 20;

// ---- Effects ----
/// Afterglow shadow buffer downsample factor.
pub const AFTERGLOW_DOWNSAMPLE: i32 = 4;
pub const MAX_SPARKLES: usize = 8;
pub const MAX_FIRE_PIXELS: usize = 24;

// ---- Corner icon zones (calibration screen) ----
pub const UI_ICON_HITBOX: i32 = 44;
pub const UI_ICON_DIAMETER: i32 = 28;
pub const UI_ICON_MARGIN: i32 = 6;

// ---- Diagnostics ----
/// Calibration screen instead of the face (touch-transform bring-up).
pub const FACE_CALIBRATION_MODE: bool = false;
/// Auto-cycle the calibration touch transform; 0 = locked.
pub const CALIB_TOUCH_AUTOCYCLE_MS: u32 = 0;
/// Collect per-stage render timings and publish them in HEARTBEAT.
pub const FACE_PERF_TELEMETRY: bool = true;
/// Sample stage timings every Nth frame.
pub const FACE_PERF_SAMPLE_DIV: u32 = 8;

bitflags! {
    /// Renderer/animation feature toggles (SET_FLAGS).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaceFlags: u8 {
        const IDLE_WANDER = 1 << 0;
        const AUTOBLINK   = 1 << 1;
        const SOLID_EYE   = 1 << 2;
        const SHOW_MOUTH  = 1 << 3;
        const EDGE_GLOW   = 1 << 4;
        const SPARKLE     = 1 << 5;
        const AFTERGLOW   = 1 << 6;
    }
}

impl FaceFlags {
    /// Boot default: everything on except the afterglow trail.
    pub fn boot_default() -> Self {
        Self::all() & !Self::AFTERGLOW
    }
}
