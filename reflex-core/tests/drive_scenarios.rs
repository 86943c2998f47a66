// Closed-loop scenarios: control loop + safety supervisor against a
// first-order motor plant, commands delivered through the wire codec.

use companion_link::cmd::Twist;
use reflex_core::config::ReflexConfig;
use reflex_core::control::{ControlInputs, ControlLoop};
use reflex_core::faults::{Fault, FaultLatch};
use reflex_core::imu::ImuSample;
use reflex_core::range::{RangeSample, RangeStatus};
use reflex_core::safety::{SafetyInputs, SafetySupervisor};

const TICK_US: u32 = 10_000; // 100 Hz control
const DT: f32 = 0.01;
/// Plant time constant: small gearmotor spin-up.
const PLANT_TAU: f32 = 0.05;

struct Sim {
    cfg: ReflexConfig,
    control: ControlLoop,
    supervisor: SafetySupervisor,
    faults: FaultLatch,
    now_us: u32,
    cmd: Twist,
    last_cmd_us: u32,
    v_l: f32,
    v_r: f32,
    range: RangeSample,
}

impl Sim {
    fn new() -> Self {
        Self {
            cfg: ReflexConfig::default(),
            control: ControlLoop::new(),
            supervisor: SafetySupervisor::new(),
            faults: FaultLatch::new(),
            now_us: 1_000_000,
            cmd: Twist::default(),
            last_cmd_us: 0,
            v_l: 0.0,
            v_r: 0.0,
            range: RangeSample::default(),
        }
    }

    /// Deliver a SET_TWIST through the payload codec, as host-RX would.
    fn send_twist(&mut self, v_mm_s: i16, w_mrad_s: i16) {
        let tw = Twist { v_mm_s, w_mrad_s };
        let mut wire = [0u8; Twist::LEN];
        tw.encode(&mut wire);
        self.cmd = Twist::decode(&wire).unwrap();
        self.last_cmd_us = self.now_us;
    }

    fn set_range(&mut self, mm: u16) {
        self.range = RangeSample {
            range_mm: mm,
            status: RangeStatus::Ok,
            timestamp_us: self.now_us,
        };
    }

    fn plant_step(v: f32, duty: f32, min_pwm: f32) -> f32 {
        // Stiction: duty below min_pwm produces no torque.
        let magnitude = (duty.abs() - min_pwm).max(0.0);
        let driven = if duty >= 0.0 { magnitude } else { -magnitude };
        v + (driven - v) * (DT / PLANT_TAU)
    }

    /// One 10 ms step: control every tick, safety on the 50 Hz beat.
    fn tick(&mut self) {
        self.now_us += TICK_US;

        let out = self.control.step(
            &self.cfg,
            &ControlInputs {
                dt: DT,
                v_meas_l: self.v_l,
                v_meas_r: self.v_r,
                v_cmd_mm_s: self.cmd.v_mm_s as f32,
                w_cmd_rad_s: self.cmd.w_mrad_s as f32 / 1000.0,
                gyro_z_rad_s: 0.0,
                faults: self.faults.load(),
            },
        );

        let min = self.cfg.min_pwm as f32;
        self.v_l = Self::plant_step(self.v_l, out.duty_l, min);
        self.v_r = Self::plant_step(self.v_r, out.duty_r, min);

        if self.now_us % 20_000 == 0 {
            self.supervisor.step(
                &self.cfg,
                &self.faults,
                &SafetyInputs {
                    now_us: self.now_us,
                    last_cmd_us: self.last_cmd_us,
                    cmd_v_mm_s: self.cmd.v_mm_s,
                    speed_l_mm_s: self.v_l as i16,
                    speed_r_mm_s: self.v_r as i16,
                    imu: ImuSample {
                        accel_z_g: 1.0,
                        ..Default::default()
                    },
                    range: self.range,
                },
            );
        }
    }

    fn run_ms(&mut self, ms: u32) {
        for _ in 0..ms / 10 {
            self.tick();
        }
    }

    fn avg_speed(&self) -> f32 {
        (self.v_l + self.v_r) / 2.0
    }
}

#[test]
fn s1_move_and_stop() {
    let mut sim = Sim::new();

    // Host streams SET_TWIST{v=100} every 50 ms for one second.
    for _ in 0..20 {
        sim.send_twist(100, 0);
        sim.run_ms(50);
    }
    // Spin-up completes well within the first 300 ms; verify the hold band.
    assert!(
        (sim.avg_speed() - 100.0).abs() < 20.0,
        "speed must hold near 100 mm/s, got {}",
        sim.avg_speed()
    );

    // STOP is a zero twist; speeds decay within the ramp window.
    sim.send_twist(0, 0);
    sim.run_ms(sim.cfg.soft_stop_ramp_ms + 10);
    assert!(sim.avg_speed().abs() < 5.0, "got {}", sim.avg_speed());
}

#[test]
fn s2_command_lost() {
    let mut sim = Sim::new();

    sim.send_twist(100, 0);
    sim.run_ms(200);
    assert!(sim.avg_speed() > 50.0);

    // Host goes silent: CMD_TIMEOUT latches, speeds decay to zero.
    sim.run_ms(sim.cfg.cmd_timeout_ms + 100);
    assert!(sim.faults.load().contains(Fault::CMD_TIMEOUT));
    sim.run_ms(sim.cfg.soft_stop_ramp_ms);
    assert!(sim.avg_speed().abs() < 2.0);

    // Reconnecting without clearing the fault must not move the base.
    sim.send_twist(200, 0);
    sim.run_ms(300);
    assert!(sim.avg_speed().abs() < 2.0, "fault gate must hold");
    assert!(sim.faults.load().contains(Fault::CMD_TIMEOUT));

    // CLEAR_FAULTS + fresh SET_TWIST resumes motion.
    sim.faults.clear(Fault::CMD_TIMEOUT);
    sim.send_twist(200, 0);
    sim.run_ms(400);
    assert!(
        sim.avg_speed() > 100.0,
        "motion must resume after clear, got {}",
        sim.avg_speed()
    );
}

#[test]
fn s3_obstacle_stop_and_resume() {
    let mut sim = Sim::new();
    sim.set_range(500);

    // Keep the command stream alive for the whole scenario.
    let mut drive = |sim: &mut Sim, ms: u32| {
        for _ in 0..ms / 50 {
            sim.send_twist(200, 0);
            sim.run_ms(50);
        }
    };

    drive(&mut sim, 400);
    assert!(sim.avg_speed() > 150.0, "got {}", sim.avg_speed());

    // Obstacle at 200 mm (< 250 stop threshold): latch + ramp to zero.
    sim.set_range(200);
    drive(&mut sim, 100);
    assert!(sim.faults.load().contains(Fault::OBSTACLE));
    let ramp_ms = sim.cfg.soft_stop_ramp_ms + 100;
    drive(&mut sim, ramp_ms);
    assert!(sim.avg_speed().abs() < 2.0, "got {}", sim.avg_speed());

    // 300 mm sits inside the hysteresis band: still stopped.
    sim.set_range(300);
    drive(&mut sim, 200);
    assert!(sim.faults.load().contains(Fault::OBSTACLE));

    // 400 mm (> 350 release): clears without CLEAR_FAULTS, motion resumes.
    sim.set_range(400);
    drive(&mut sim, 600);
    assert!(!sim.faults.load().contains(Fault::OBSTACLE));
    assert!(
        sim.avg_speed() > 150.0,
        "motion must resume after release, got {}",
        sim.avg_speed()
    );
}
