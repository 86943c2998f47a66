// Fixed-rate wheel control: twist → per-wheel targets → rate limit →
// yaw damping → FF+PI → deadband compensation → fault gate.
//
// The loop is stateless across ticks except for the two integrators and the
// rate-limited targets; those reset together when faults latch.

use crate::config::ReflexConfig;
use crate::faults::Fault;

fn clampf(v: f32, lo: f32, hi: f32) -> f32 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

// Slew `current` toward `setpoint` by at most `max_accel * dt`.
fn rate_limit(current: f32, setpoint: f32, max_accel: f32, dt: f32) -> f32 {
    let max_delta = max_accel * dt;
    current + clampf(setpoint - current, -max_delta, max_delta)
}

/// Per-wheel PI state.
#[derive(Debug, Default)]
struct WheelPi {
    integral: f32,
}

impl WheelPi {
    fn reset(&mut self) {
        self.integral = 0.0;
    }

    // Feedforward + PI. Returns clamped signed duty.
    fn step(&mut self, cfg: &ReflexConfig, v_target: f32, v_meas: f32, dt: f32) -> f32 {
        let mut ff = cfg.k_v * v_target;
        if v_target != 0.0 {
            ff += if v_target > 0.0 { cfg.k_s } else { -cfg.k_s };
        }

        let error = v_target - v_meas;
        self.integral += error * dt;

        let u = ff + cfg.k_p * error + cfg.k_i * self.integral;

        let max_u = cfg.max_pwm as f32;
        let u_clamped = clampf(u, -max_u, max_u);

        // Anti-windup: on saturation, bleed the integrator by half the
        // back-calculated residual so recovery is immediate.
        if u != u_clamped {
            let ki = if cfg.k_i > 0.0 { cfg.k_i } else { 1.0 };
            self.integral -= (u - u_clamped) / ki * 0.5;
        }

        u_clamped
    }
}

// Shift the output curve past the motor's dead zone whenever a nonzero
// speed is commanded; kick-start if PI lands exactly on zero.
fn deadband_comp(cfg: &ReflexConfig, u: f32, v_target: f32) -> f32 {
    if v_target == 0.0 {
        return u;
    }

    let min = cfg.min_pwm as f32;
    let u = if u > 0.0 {
        u + min
    } else if u < 0.0 {
        u - min
    } else if v_target > 0.0 {
        min
    } else {
        -min
    };

    let max_u = cfg.max_pwm as f32;
    clampf(u, -max_u, max_u)
}

/// Inputs for one control tick.
#[derive(Debug, Clone, Copy)]
pub struct ControlInputs {
    /// Measured tick interval in seconds (from the monotonic clock).
    pub dt: f32,
    /// Measured wheel speeds, mm/s.
    pub v_meas_l: f32,
    pub v_meas_r: f32,
    /// Commanded twist.
    pub v_cmd_mm_s: f32,
    /// Commanded yaw rate, rad/s.
    pub w_cmd_rad_s: f32,
    /// Latest gyro yaw rate, rad/s.
    pub gyro_z_rad_s: f32,
    /// Current fault word; any set bit forces zero output.
    pub faults: Fault,
}

/// Signed duty per wheel. `|duty| → PWM`, `sign → direction`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlOutputs {
    pub duty_l: f32,
    pub duty_r: f32,
    /// Rate-limited targets after yaw damping, for stall diagnostics.
    pub v_target_l: f32,
    pub v_target_r: f32,
}

pub struct ControlLoop {
    pi_left: WheelPi,
    pi_right: WheelPi,
    rl_target_l: f32,
    rl_target_r: f32,
}

impl ControlLoop {
    pub const fn new() -> Self {
        Self {
            pi_left: WheelPi { integral: 0.0 },
            pi_right: WheelPi { integral: 0.0 },
            rl_target_l: 0.0,
            rl_target_r: 0.0,
        }
    }

    /// Rate-limited targets from the previous tick (test hook).
    pub fn targets(&self) -> (f32, f32) {
        (self.rl_target_l, self.rl_target_r)
    }

    pub fn step(&mut self, cfg: &ReflexConfig, input: &ControlInputs) -> ControlOutputs {
        // Differential drive: twist → per-wheel targets.
        let half_wb = cfg.wheelbase_mm / 2.0;
        let max_v = cfg.max_v_mm_s as f32;
        let v_target_l = clampf(input.v_cmd_mm_s - input.w_cmd_rad_s * half_wb, -max_v, max_v);
        let v_target_r = clampf(input.v_cmd_mm_s + input.w_cmd_rad_s * half_wb, -max_v, max_v);

        // Rate limiting.
        let max_a = cfg.max_a_mm_s2 as f32;
        self.rl_target_l = rate_limit(self.rl_target_l, v_target_l, max_a, input.dt);
        self.rl_target_r = rate_limit(self.rl_target_r, v_target_r, max_a, input.dt);

        // Yaw damping: symmetric per-wheel offset from the gyro error.
        let w_error = input.w_cmd_rad_s - input.gyro_z_rad_s;
        let delta_v = cfg.k_yaw * w_error;
        let rl_l = self.rl_target_l - delta_v;
        let rl_r = self.rl_target_r + delta_v;

        // FF + PI, then deadband compensation.
        let mut u_l = self.pi_left.step(cfg, rl_l, input.v_meas_l, input.dt);
        let mut u_r = self.pi_right.step(cfg, rl_r, input.v_meas_r, input.dt);
        u_l = deadband_comp(cfg, u_l, rl_l);
        u_r = deadband_comp(cfg, u_r, rl_r);

        // Fault gate: the supervisor owns the stop behavior; we just zero
        // output and reset the tick-local state.
        if !input.faults.is_empty() {
            u_l = 0.0;
            u_r = 0.0;
            self.pi_left.reset();
            self.pi_right.reset();
            self.rl_target_l = 0.0;
            self.rl_target_r = 0.0;
        }

        ControlOutputs {
            duty_l: u_l,
            duty_r: u_r,
            v_target_l: self.rl_target_l,
            v_target_r: self.rl_target_r,
        }
    }
}

impl Default for ControlLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp a float into i16 before the telemetry cast.
pub fn clamp_i16(v: f32) -> i16 {
    if v > 32767.0 {
        32767
    } else if v < -32768.0 {
        -32768
    } else {
        v as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.01;

    fn quiet_input() -> ControlInputs {
        ControlInputs {
            dt: DT,
            v_meas_l: 0.0,
            v_meas_r: 0.0,
            v_cmd_mm_s: 0.0,
            w_cmd_rad_s: 0.0,
            gyro_z_rad_s: 0.0,
            faults: Fault::empty(),
        }
    }

    #[test]
    fn stillness_under_zero_command() {
        let cfg = ReflexConfig::default();
        let mut cl = ControlLoop::new();
        let input = quiet_input();

        // 1 s of zero command, zero measurement, zero fault.
        for _ in 0..100 {
            let out = cl.step(&cfg, &input);
            assert_eq!(out.duty_l, 0.0);
            assert_eq!(out.duty_r, 0.0);
        }
        assert!(cl.pi_left.integral.abs() < 1.0);
        assert!(cl.pi_right.integral.abs() < 1.0);
    }

    #[test]
    fn forward_command_produces_forward_duty_past_deadband() {
        let cfg = ReflexConfig::default();
        let mut cl = ControlLoop::new();
        let mut input = quiet_input();
        input.v_cmd_mm_s = 100.0;

        let mut out = ControlOutputs::default();
        for _ in 0..30 {
            out = cl.step(&cfg, &input);
        }
        assert!(out.duty_l > cfg.min_pwm as f32);
        assert!(out.duty_r > cfg.min_pwm as f32);
        assert!(out.duty_l <= cfg.max_pwm as f32);
    }

    #[test]
    fn fault_gate_forces_zero_output_regardless_of_command() {
        let cfg = ReflexConfig::default();
        let mut cl = ControlLoop::new();
        let mut input = quiet_input();
        input.v_cmd_mm_s = 400.0;

        for _ in 0..10 {
            cl.step(&cfg, &input);
        }

        input.faults = Fault::CMD_TIMEOUT;
        for _ in 0..20 {
            let out = cl.step(&cfg, &input);
            assert_eq!(out.duty_l, 0.0);
            assert_eq!(out.duty_r, 0.0);
            assert_eq!(out.v_target_l, 0.0);
            assert_eq!(out.v_target_r, 0.0);
        }
        assert_eq!(cl.pi_left.integral, 0.0);
    }

    #[test]
    fn targets_never_increase_after_timeout_latch() {
        let cfg = ReflexConfig::default();
        let mut cl = ControlLoop::new();
        let mut input = quiet_input();
        input.v_cmd_mm_s = 300.0;

        for _ in 0..50 {
            cl.step(&cfg, &input);
        }
        let (t0, _) = cl.targets();
        assert!(t0 > 0.0);

        input.faults = Fault::CMD_TIMEOUT;
        let mut prev = t0;
        let ramp_ticks = (cfg.soft_stop_ramp_ms as f32 / 1000.0 / DT) as usize + 1;
        for _ in 0..ramp_ticks {
            cl.step(&cfg, &input);
            let (t, _) = cl.targets();
            assert!(t.abs() <= prev.abs());
            prev = t;
        }
        assert_eq!(prev, 0.0);
    }

    #[test]
    fn rate_limit_bounds_target_slew() {
        let cfg = ReflexConfig::default();
        let mut cl = ControlLoop::new();
        let mut input = quiet_input();
        input.v_cmd_mm_s = 500.0;

        cl.step(&cfg, &input);
        let (t1, _) = cl.targets();
        // One tick may advance at most max_a * dt.
        let bound = cfg.max_a_mm_s2 as f32 * DT + 0.001;
        assert!(t1 <= bound, "target {t1} exceeded slew bound {bound}");
    }

    #[test]
    fn antiwindup_bleeds_integrator_on_saturation() {
        let cfg = ReflexConfig::default();
        let mut cl = ControlLoop::new();
        let mut input = quiet_input();
        // Large persistent error with the wheel held (stalled): output
        // saturates; the integral must stay bounded.
        input.v_cmd_mm_s = 500.0;

        // 20 s stalled: a plain integrator would accumulate to ~10 000;
        // the half back-calculation pins it near its fixed point instead.
        for _ in 0..2000 {
            let out = cl.step(&cfg, &input);
            assert!(out.duty_l.abs() <= cfg.max_pwm as f32);
        }
        assert!(cl.pi_left.integral.abs() < 1500.0);
    }

    #[test]
    fn yaw_damping_splits_wheel_targets() {
        let cfg = ReflexConfig::default();
        let mut cl = ControlLoop::new();
        let mut input = quiet_input();
        input.v_cmd_mm_s = 200.0;
        // Yawing clockwise although commanded straight: the damper must
        // speed the right wheel relative to the left.
        input.gyro_z_rad_s = -0.5;

        let out = cl.step(&cfg, &input);
        assert!(out.duty_r > out.duty_l);
    }

    #[test]
    fn clamp_i16_saturates() {
        assert_eq!(clamp_i16(40_000.0), 32_767);
        assert_eq!(clamp_i16(-40_000.0), -32_768);
        assert_eq!(clamp_i16(123.4), 123);
    }
}
