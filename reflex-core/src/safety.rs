// Safety supervisor: owns fault latching, the stop policies and recovery.
//
// Soft stop sets a fault bit and lets the control loop's zeroed targets ramp
// the wheels down; after soft_stop_ramp_ms the motors are braked (driver
// still enabled, holds position). Hard stop brakes and drops the driver
// standby line immediately.

use libm::{acosf, fabsf, sqrtf};

use crate::config::ReflexConfig;
use crate::faults::{Fault, FaultLatch};
use crate::imu::ImuSample;
use crate::range::{RangeSample, RangeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    Running,
    RampingDown,
    Stopped,
}

/// What the motor driver should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorAction {
    None,
    /// Short-brake both motors, driver stays enabled.
    Brake,
    /// Brake + driver standby low.
    HardKill,
    /// Faults cleared: re-enable the driver.
    Enable,
}

#[derive(Debug, Clone, Copy)]
pub struct SafetyInputs {
    pub now_us: u32,
    /// From the command buffer; 0 = no command ever received.
    pub last_cmd_us: u32,
    /// Commanded linear speed, for stall detection.
    pub cmd_v_mm_s: i16,
    /// Measured speeds from the latest telemetry snapshot.
    pub speed_l_mm_s: i16,
    pub speed_r_mm_s: i16,
    pub imu: ImuSample,
    pub range: RangeSample,
}

pub struct SafetySupervisor {
    stop_state: StopState,
    ramp_start_us: u32,
    tilt_active: bool,
    tilt_since_us: u32,
    stall_active: bool,
    stall_since_us: u32,
    obstacle_active: bool,
}

fn elapsed_ms(from_us: u32, to_us: u32) -> u32 {
    to_us.wrapping_sub(from_us) / 1000
}

impl SafetySupervisor {
    pub const fn new() -> Self {
        Self {
            stop_state: StopState::Running,
            ramp_start_us: 0,
            tilt_active: false,
            tilt_since_us: 0,
            stall_active: false,
            stall_since_us: 0,
            obstacle_active: false,
        }
    }

    pub fn stop_state(&self) -> StopState {
        self.stop_state
    }

    fn begin_soft_stop(&mut self, now_us: u32) {
        if self.stop_state == StopState::Running {
            self.stop_state = StopState::RampingDown;
            self.ramp_start_us = now_us;
        }
    }

    fn hard_stop(&mut self, action: &mut MotorAction) {
        if self.stop_state != StopState::Stopped {
            self.stop_state = StopState::Stopped;
            log::warn!("hard stop executed");
        }
        *action = MotorAction::HardKill;
    }

    fn check_cmd_timeout(&mut self, cfg: &ReflexConfig, faults: &FaultLatch, input: &SafetyInputs) {
        // Before the first command the control loop just drives zero.
        if input.last_cmd_us == 0 {
            return;
        }
        let age_ms = elapsed_ms(input.last_cmd_us, input.now_us);
        if age_ms > cfg.cmd_timeout_ms && faults.latch(Fault::CMD_TIMEOUT) {
            log::warn!("command timeout ({} ms)", age_ms);
            self.begin_soft_stop(input.now_us);
        }
    }

    fn check_estop(&mut self, faults: &FaultLatch, action: &mut MotorAction) {
        if faults.load().contains(Fault::ESTOP) && self.stop_state != StopState::Stopped {
            log::warn!("ESTOP fault active");
            self.hard_stop(action);
        }
    }

    fn check_tilt(
        &mut self,
        cfg: &ReflexConfig,
        faults: &FaultLatch,
        input: &SafetyInputs,
        action: &mut MotorAction,
    ) {
        // Tilt angle from the gravity vector: acos(|az| / |a|).
        let ax = input.imu.accel_x_g;
        let ay = input.imu.accel_y_g;
        let az = input.imu.accel_z_g;
        let a_mag = sqrtf(ax * ax + ay * ay + az * az);
        if a_mag < 0.1 {
            // Freefall or dead IMU; no valid reading.
            return;
        }

        let cos_tilt = fabsf(az) / a_mag;
        let tilt_deg = acosf(if cos_tilt > 1.0 { 1.0 } else { cos_tilt }) * (180.0 / core::f32::consts::PI);

        if tilt_deg > cfg.tilt_thresh_deg {
            if !self.tilt_active {
                self.tilt_active = true;
                self.tilt_since_us = input.now_us;
            } else if elapsed_ms(self.tilt_since_us, input.now_us) > cfg.tilt_hold_ms
                && faults.latch(Fault::TILT)
            {
                log::warn!("TILT fault ({} deg)", tilt_deg as i32);
                self.hard_stop(action);
            }
        } else {
            self.tilt_active = false;
        }
    }

    fn check_stall(
        &mut self,
        cfg: &ReflexConfig,
        faults: &FaultLatch,
        input: &SafetyInputs,
        action: &mut MotorAction,
    ) {
        // While a stop policy is holding the wheels, a stationary base under
        // a nonzero command is intentional, not a stall.
        if self.stop_state != StopState::Running {
            self.stall_active = false;
            return;
        }

        let avg_speed =
            (input.speed_l_mm_s.unsigned_abs() as f32 + input.speed_r_mm_s.unsigned_abs() as f32) / 2.0;
        let cmd_speed = input.cmd_v_mm_s.unsigned_abs() as f32;
        let thresh = cfg.stall_speed_thresh as f32;

        // Commanding real speed but the wheels aren't turning.
        let stalled = cmd_speed > thresh * 2.0 && avg_speed < thresh;

        if stalled {
            if !self.stall_active {
                self.stall_active = true;
                self.stall_since_us = input.now_us;
            } else if elapsed_ms(self.stall_since_us, input.now_us) > cfg.stall_thresh_ms
                && faults.latch(Fault::STALL)
            {
                log::warn!(
                    "STALL fault (cmd={} mm/s, meas={} mm/s)",
                    cmd_speed as i32,
                    avg_speed as i32
                );
                self.hard_stop(action);
            }
        } else {
            self.stall_active = false;
        }
    }

    fn check_obstacle(&mut self, cfg: &ReflexConfig, faults: &FaultLatch, input: &SafetyInputs) {
        // Only act on valid readings.
        if input.range.status != RangeStatus::Ok {
            return;
        }

        if !self.obstacle_active {
            if input.range.range_mm < cfg.range_stop_mm {
                self.obstacle_active = true;
                if faults.latch(Fault::OBSTACLE) {
                    log::warn!(
                        "OBSTACLE fault ({} mm < {} mm)",
                        input.range.range_mm,
                        cfg.range_stop_mm
                    );
                }
                self.begin_soft_stop(input.now_us);
            }
        } else if input.range.range_mm > cfg.range_release_mm {
            // Hysteretic release: this single bit clears itself.
            self.obstacle_active = false;
            faults.clear(Fault::OBSTACLE);
            log::info!(
                "obstacle cleared ({} mm > {} mm)",
                input.range.range_mm,
                cfg.range_release_mm
            );
        }
    }

    fn update_soft_stop_ramp(
        &mut self,
        cfg: &ReflexConfig,
        input: &SafetyInputs,
        action: &mut MotorAction,
    ) {
        if self.stop_state != StopState::RampingDown {
            return;
        }
        // During the ramp the control loop sees the fault and zeroes its
        // output; the rate limiter provides the smooth decay.
        if elapsed_ms(self.ramp_start_us, input.now_us) >= cfg.soft_stop_ramp_ms {
            self.stop_state = StopState::Stopped;
            if *action == MotorAction::None {
                *action = MotorAction::Brake;
            }
            log::info!("soft stop complete, motors braked");
        }
    }

    fn check_fault_cleared(&mut self, faults: &FaultLatch, action: &mut MotorAction) {
        if !faults.any() && self.stop_state == StopState::Stopped {
            self.stop_state = StopState::Running;
            self.tilt_active = false;
            self.stall_active = false;
            self.obstacle_active = false;
            if *action == MotorAction::None {
                *action = MotorAction::Enable;
            }
            log::info!("faults cleared, motors re-enabled");
        }
    }

    /// One 50 Hz supervisor tick.
    pub fn step(
        &mut self,
        cfg: &ReflexConfig,
        faults: &FaultLatch,
        input: &SafetyInputs,
    ) -> MotorAction {
        let mut action = MotorAction::None;

        self.check_cmd_timeout(cfg, faults, input);
        self.check_estop(faults, &mut action);
        self.check_tilt(cfg, faults, input, &mut action);
        self.check_stall(cfg, faults, input, &mut action);
        self.check_obstacle(cfg, faults, input);
        self.update_soft_stop_ramp(cfg, input, &mut action);
        self.check_fault_cleared(faults, &mut action);

        action
    }
}

impl Default for SafetySupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_input(now_us: u32) -> SafetyInputs {
        SafetyInputs {
            now_us,
            last_cmd_us: 0,
            cmd_v_mm_s: 0,
            speed_l_mm_s: 0,
            speed_r_mm_s: 0,
            imu: ImuSample {
                accel_z_g: 1.0,
                ..Default::default()
            },
            range: RangeSample::default(), // NotReady
        }
    }

    #[test]
    fn no_timeout_before_first_command() {
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        for t in 0..100u32 {
            sup.step(&cfg, &faults, &quiet_input(t * 20_000));
        }
        assert!(!faults.any());
        assert_eq!(sup.stop_state(), StopState::Running);
    }

    #[test]
    fn cmd_timeout_soft_stops_then_brakes() {
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        let mut input = quiet_input(0);
        input.last_cmd_us = 1; // command arrived at t≈0

        // Just past the timeout: latch + ramp begins.
        input.now_us = (cfg.cmd_timeout_ms + 10) * 1000;
        assert_eq!(sup.step(&cfg, &faults, &input), MotorAction::None);
        assert!(faults.load().contains(Fault::CMD_TIMEOUT));
        assert_eq!(sup.stop_state(), StopState::RampingDown);

        // Ramp period elapses: brake, driver stays enabled.
        input.now_us += (cfg.soft_stop_ramp_ms + 10) * 1000;
        assert_eq!(sup.step(&cfg, &faults, &input), MotorAction::Brake);
        assert_eq!(sup.stop_state(), StopState::Stopped);
    }

    #[test]
    fn estop_hard_kills() {
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        faults.latch(Fault::ESTOP);
        assert_eq!(sup.step(&cfg, &faults, &quiet_input(1000)), MotorAction::HardKill);
        assert_eq!(sup.stop_state(), StopState::Stopped);
    }

    #[test]
    fn tilt_requires_hold_duration() {
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        // ~60 degrees: az = 0.5, ax = 0.866.
        let mut input = quiet_input(0);
        input.imu = ImuSample {
            accel_x_g: 0.866,
            accel_z_g: 0.5,
            ..Default::default()
        };

        // First sighting arms the timer but must not latch.
        input.now_us = 1000;
        sup.step(&cfg, &faults, &input);
        assert!(!faults.load().contains(Fault::TILT));

        // Still tilted after tilt_hold_ms: latch + hard stop.
        input.now_us = 1000 + (cfg.tilt_hold_ms + 20) * 1000;
        assert_eq!(sup.step(&cfg, &faults, &input), MotorAction::HardKill);
        assert!(faults.load().contains(Fault::TILT));
    }

    #[test]
    fn transient_tilt_is_forgiven() {
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        let mut tilted = quiet_input(1000);
        tilted.imu = ImuSample {
            accel_x_g: 0.866,
            accel_z_g: 0.5,
            ..Default::default()
        };
        sup.step(&cfg, &faults, &tilted);

        // Back upright before the hold expires.
        let mut upright = quiet_input(50_000);
        upright.imu.accel_z_g = 1.0;
        sup.step(&cfg, &faults, &upright);

        // Tilted again much later: the hold window restarts.
        tilted.now_us = 10_000_000;
        sup.step(&cfg, &faults, &tilted);
        assert!(!faults.load().contains(Fault::TILT));
    }

    #[test]
    fn stall_latches_after_window() {
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        let mut input = quiet_input(0);
        input.cmd_v_mm_s = 200; // well above 2x stall_speed_thresh
        input.speed_l_mm_s = 2;
        input.speed_r_mm_s = 3;

        input.now_us = 1000;
        input.last_cmd_us = input.now_us; // command stream stays fresh
        sup.step(&cfg, &faults, &input);
        assert!(!faults.load().contains(Fault::STALL));

        input.now_us = 1000 + (cfg.stall_thresh_ms + 20) * 1000;
        input.last_cmd_us = input.now_us;
        assert_eq!(sup.step(&cfg, &faults, &input), MotorAction::HardKill);
        assert!(faults.load().contains(Fault::STALL));
    }

    #[test]
    fn stall_is_not_flagged_while_stopped_on_purpose() {
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        // Obstacle stop with the host still commanding motion.
        let mut input = quiet_input(20_000);
        input.last_cmd_us = input.now_us;
        input.cmd_v_mm_s = 200;
        input.range = RangeSample {
            range_mm: 100,
            status: RangeStatus::Ok,
            timestamp_us: input.now_us,
        };
        sup.step(&cfg, &faults, &input);
        assert!(faults.load().contains(Fault::OBSTACLE));

        // Stationary under command for far longer than the stall window.
        for _ in 0..200 {
            input.now_us += 20_000;
            input.last_cmd_us = input.now_us;
            sup.step(&cfg, &faults, &input);
        }
        assert!(!faults.load().contains(Fault::STALL));
    }

    #[test]
    fn obstacle_hysteresis_trace() {
        let cfg = ReflexConfig::default(); // stop 250, release 350
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        let mut input = quiet_input(0);
        let mut at = |sup: &mut SafetySupervisor, t_us: u32, mm: u16| {
            input.now_us = t_us;
            input.range = RangeSample {
                range_mm: mm,
                status: RangeStatus::Ok,
                timestamp_us: t_us,
            };
            sup.step(&cfg, &faults, &input);
        };

        at(&mut sup, 20_000, 500);
        assert!(!faults.load().contains(Fault::OBSTACLE));

        at(&mut sup, 40_000, 200);
        assert!(faults.load().contains(Fault::OBSTACLE));
        assert_eq!(sup.stop_state(), StopState::RampingDown);

        // 300 mm sits inside the hysteresis band: still latched.
        at(&mut sup, 60_000, 300);
        assert!(faults.load().contains(Fault::OBSTACLE));

        at(&mut sup, 80_000, 400);
        assert!(!faults.load().contains(Fault::OBSTACLE));
    }

    #[test]
    fn recovery_after_clear_faults() {
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        faults.latch(Fault::ESTOP);
        sup.step(&cfg, &faults, &quiet_input(1000));
        assert_eq!(sup.stop_state(), StopState::Stopped);

        // Host clears; next tick re-enables.
        faults.clear(Fault::ESTOP);
        assert_eq!(sup.step(&cfg, &faults, &quiet_input(2000)), MotorAction::Enable);
        assert_eq!(sup.stop_state(), StopState::Running);
    }

    #[test]
    fn obstacle_clears_without_host_and_resumes() {
        // Scenario: moving, obstacle latches, obstacle recedes, motion may
        // resume without CLEAR_FAULTS.
        let cfg = ReflexConfig::default();
        let faults = FaultLatch::new();
        let mut sup = SafetySupervisor::new();

        let mut input = quiet_input(0);
        input.last_cmd_us = 1;
        input.cmd_v_mm_s = 200;
        input.speed_l_mm_s = 200;
        input.speed_r_mm_s = 200;

        input.now_us = 20_000;
        input.range = RangeSample {
            range_mm: 200,
            status: RangeStatus::Ok,
            timestamp_us: input.now_us,
        };
        // Keep the command fresh so CMD_TIMEOUT stays out of the picture.
        input.last_cmd_us = input.now_us;
        sup.step(&cfg, &faults, &input);
        assert!(faults.load().contains(Fault::OBSTACLE));

        // Ramp completes while the obstacle persists.
        input.now_us += (cfg.soft_stop_ramp_ms + 20) * 1000;
        input.last_cmd_us = input.now_us;
        sup.step(&cfg, &faults, &input);
        assert_eq!(sup.stop_state(), StopState::Stopped);

        // Obstacle recedes past the release threshold: bit clears itself
        // and the supervisor re-enables on the same tick.
        input.now_us += 20_000;
        input.last_cmd_us = input.now_us;
        input.range.range_mm = 400;
        let action = sup.step(&cfg, &faults, &input);
        assert!(!faults.any());
        assert_eq!(action, MotorAction::Enable);
        assert_eq!(sup.stop_state(), StopState::Running);
    }
}
