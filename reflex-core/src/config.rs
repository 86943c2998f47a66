// Runtime configuration. Defaults are compile-time; every field below is
// mutable at runtime through SET_CONFIG (4-byte little-endian values).
// Nothing persists across reset; the host re-applies on connect.

#[derive(Debug, Clone)]
pub struct ReflexConfig {
    // Kinematics
    pub wheelbase_mm: f32,
    pub wheel_diameter_mm: f32,
    /// Encoder counts per wheel revolution (post-gearbox).
    pub counts_per_rev: u16,

    // Control loop
    pub control_hz: u16,
    pub pwm_freq_hz: u16,
    pub max_pwm: u16,

    // FF + PI gains (per wheel)
    /// Feedforward velocity gain: duty per (mm/s).
    pub k_v: f32,
    /// Feedforward static friction offset (duty units).
    pub k_s: f32,
    pub k_p: f32,
    pub k_i: f32,
    /// Deadband / stiction compensation (duty units).
    pub min_pwm: u16,

    // Rate limits
    pub max_v_mm_s: i16,
    pub max_a_mm_s2: i16,
    pub max_w_mrad_s: i16,
    pub max_aw_mrad_s2: i16,

    // Yaw damping
    pub k_yaw: f32,

    // Safety
    pub cmd_timeout_ms: u32,
    pub soft_stop_ramp_ms: u32,
    pub tilt_thresh_deg: f32,
    pub tilt_hold_ms: u32,
    pub stall_thresh_ms: u32,
    /// Speed below this while commanding above 2x this → stall (mm/s).
    pub stall_speed_thresh: i16,

    // Range sensor
    pub range_stop_mm: u16,
    pub range_release_mm: u16,
    /// Max echo wait; bounds the measurable range.
    pub range_timeout_us: u32,
    pub range_hz: u16,
}

/// PWM resolution: 10-bit.
pub const PWM_RESOLUTION_BITS: u8 = 10;
pub const PWM_MAX_DUTY: u16 = (1 << PWM_RESOLUTION_BITS) - 1;

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            wheelbase_mm: 150.0,
            wheel_diameter_mm: 65.0,
            counts_per_rev: 1440,

            control_hz: 100,
            pwm_freq_hz: 20_000,
            max_pwm: PWM_MAX_DUTY,

            // Conservative starting point, tuned on the bench.
            k_v: 1.0,
            k_s: 0.0,
            k_p: 2.0,
            k_i: 0.5,
            min_pwm: 80,

            max_v_mm_s: 500,
            max_a_mm_s2: 1000,
            max_w_mrad_s: 2000,
            max_aw_mrad_s2: 4000,

            k_yaw: 0.1,

            cmd_timeout_ms: 400,
            soft_stop_ramp_ms: 500,
            tilt_thresh_deg: 45.0,
            tilt_hold_ms: 200,
            stall_thresh_ms: 500,
            stall_speed_thresh: 20,

            range_stop_mm: 250,
            range_release_mm: 350,
            range_timeout_us: 25_000,
            range_hz: 20,
        }
    }
}

/// SET_CONFIG parameter IDs. Each maps to one field above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigParam {
    KV = 0x01,
    KS = 0x02,
    KP = 0x03,
    KI = 0x04,
    MinPwm = 0x05,
    MaxPwm = 0x06,

    MaxVMmS = 0x10,
    MaxAMmS2 = 0x11,
    MaxWMradS = 0x12,
    MaxAwMradS2 = 0x13,

    KYaw = 0x20,

    CmdTimeoutMs = 0x30,
    SoftStopRampMs = 0x31,
    TiltThreshDeg = 0x32,
    TiltHoldMs = 0x33,
    StallThreshMs = 0x34,
    StallSpeedThresh = 0x35,

    RangeStopMm = 0x40,
    RangeReleaseMm = 0x41,
}

impl ConfigParam {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x01 => Self::KV,
            0x02 => Self::KS,
            0x03 => Self::KP,
            0x04 => Self::KI,
            0x05 => Self::MinPwm,
            0x06 => Self::MaxPwm,
            0x10 => Self::MaxVMmS,
            0x11 => Self::MaxAMmS2,
            0x12 => Self::MaxWMradS,
            0x13 => Self::MaxAwMradS2,
            0x20 => Self::KYaw,
            0x30 => Self::CmdTimeoutMs,
            0x31 => Self::SoftStopRampMs,
            0x32 => Self::TiltThreshDeg,
            0x33 => Self::TiltHoldMs,
            0x34 => Self::StallThreshMs,
            0x35 => Self::StallSpeedThresh,
            0x40 => Self::RangeStopMm,
            0x41 => Self::RangeReleaseMm,
            _ => return None,
        })
    }
}

fn as_f32(b: &[u8; 4]) -> f32 {
    f32::from_le_bytes(*b)
}

fn as_u32(b: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*b)
}

fn as_i32(b: &[u8; 4]) -> i32 {
    i32::from_le_bytes(*b)
}

impl ReflexConfig {
    /// Apply one SET_CONFIG parameter. Returns false for unknown IDs.
    pub fn apply(&mut self, param_id: u8, value: &[u8; 4]) -> bool {
        let Some(param) = ConfigParam::from_u8(param_id) else {
            log::warn!("unknown config param 0x{:02X}", param_id);
            return false;
        };

        match param {
            ConfigParam::KV => self.k_v = as_f32(value),
            ConfigParam::KS => self.k_s = as_f32(value),
            ConfigParam::KP => self.k_p = as_f32(value),
            ConfigParam::KI => self.k_i = as_f32(value),
            ConfigParam::MinPwm => self.min_pwm = as_u32(value) as u16,
            ConfigParam::MaxPwm => self.max_pwm = as_u32(value) as u16,
            ConfigParam::MaxVMmS => self.max_v_mm_s = as_i32(value) as i16,
            ConfigParam::MaxAMmS2 => self.max_a_mm_s2 = as_i32(value) as i16,
            ConfigParam::MaxWMradS => self.max_w_mrad_s = as_i32(value) as i16,
            ConfigParam::MaxAwMradS2 => self.max_aw_mrad_s2 = as_i32(value) as i16,
            ConfigParam::KYaw => self.k_yaw = as_f32(value),
            ConfigParam::CmdTimeoutMs => self.cmd_timeout_ms = as_u32(value),
            ConfigParam::SoftStopRampMs => self.soft_stop_ramp_ms = as_u32(value),
            ConfigParam::TiltThreshDeg => self.tilt_thresh_deg = as_f32(value),
            ConfigParam::TiltHoldMs => self.tilt_hold_ms = as_u32(value),
            ConfigParam::StallThreshMs => self.stall_thresh_ms = as_u32(value),
            ConfigParam::StallSpeedThresh => self.stall_speed_thresh = as_i32(value) as i16,
            ConfigParam::RangeStopMm => self.range_stop_mm = as_u32(value) as u16,
            ConfigParam::RangeReleaseMm => self.range_release_mm = as_u32(value) as u16,
        }
        log::info!("config param 0x{:02X} updated", param_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_float_and_int_params() {
        let mut cfg = ReflexConfig::default();
        assert!(cfg.apply(ConfigParam::KP as u8, &3.5f32.to_le_bytes()));
        assert_eq!(cfg.k_p, 3.5);

        assert!(cfg.apply(ConfigParam::RangeStopMm as u8, &200u32.to_le_bytes()));
        assert_eq!(cfg.range_stop_mm, 200);

        assert!(cfg.apply(ConfigParam::MaxVMmS as u8, &(-300i32).to_le_bytes()));
        assert_eq!(cfg.max_v_mm_s, -300);
    }

    #[test]
    fn unknown_param_rejected() {
        let mut cfg = ReflexConfig::default();
        assert!(!cfg.apply(0x7F, &[0; 4]));
    }
}
