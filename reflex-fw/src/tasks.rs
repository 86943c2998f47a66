// Embassy tasks. Core 0 (deterministic): control, IMU, safety. Core 1
// (I/O): host-RX, telemetry, range. All cross-task traffic goes through the
// single-writer buffers in `shared`.

use core::sync::atomic::Ordering;

use embassy_time::{Duration, Instant, Ticker};

use companion_link::cmd::{self, CmdId};
use companion_link::packet::{self, PROTOCOL_V2};
use companion_link::telemetry::{self, ReflexState, TimeSyncResp};
use companion_link::Deframer;

use reflex_core::control::{clamp_i16, ControlInputs, ControlLoop};
use reflex_core::faults::Fault;
use reflex_core::imu::{BusVerdict, BusHealth, ImuSample};
use reflex_core::odometry::Odometry;
use reflex_core::safety::{MotorAction, SafetyInputs, SafetySupervisor};
use reflex_core::shared::{Command, TelemetrySnapshot};

use crate::drivers::encoder::Encoders;
use crate::drivers::imu::ImuDriver;
use crate::drivers::motor::{Motors, StandbyPin};
use crate::drivers::range::RangeDriver;
use crate::drivers::usb::{UsbRx, UsbTx};
use crate::shared::{
    config_apply, config_snapshot, now_us, now_us64, Reply, BRAKE_REQ, COMMAND, FAULTS, IMU,
    RANGE, REPLIES, TELEMETRY, TX,
};

/// Feed handle for the control task's hardware watchdog. A missed deadline
/// resets the MCU; safer than continuing with a stuck actuator.
pub struct WatchdogFeed {
    pub wdt: esp_hal::timer::timg::Wdt<esp_hal::peripherals::TIMG1<'static>>,
}

// ---- Control (100 Hz, highest priority, core 0) ----

#[embassy_executor::task]
pub async fn control_task(mut motors: Motors, mut encoders: Encoders, mut wdt: WatchdogFeed) -> ! {
    let cfg0 = config_snapshot();
    log::info!("control_task started @ {} Hz", cfg0.control_hz);

    let mut ticker = Ticker::every(Duration::from_millis(1000 / cfg0.control_hz as u64));
    let mut odometry = Odometry::new(encoders.snapshot());
    let mut control = ControlLoop::new();
    let mut prev = Instant::now();

    loop {
        ticker.next().await;
        wdt.wdt.feed();

        let cfg = config_snapshot();
        let now = Instant::now();
        // Measured, not assumed; guard the first tick.
        let mut dt = (now - prev).as_micros() as u32;
        prev = now;
        if dt == 0 {
            dt = 1_000_000 / cfg.control_hz as u32;
        }

        let counts = encoders.snapshot();
        let (v_meas_l, v_meas_r) = odometry.step(&cfg, counts, dt);

        let cmd = COMMAND.read();
        let imu = IMU.read();
        let faults = FAULTS.load();

        let out = control.step(
            &cfg,
            &ControlInputs {
                dt: dt as f32 / 1_000_000.0,
                v_meas_l,
                v_meas_r,
                v_cmd_mm_s: cmd.v_mm_s as f32,
                w_cmd_rad_s: cmd.w_mrad_s as f32 / 1000.0,
                gyro_z_rad_s: imu.gyro_z_rad_s,
                faults,
            },
        );

        // Fault + brake-request gate before the registers are touched.
        if !faults.is_empty() && BRAKE_REQ.load(Ordering::Relaxed) {
            motors.brake();
        } else {
            motors.apply(&out, cfg.max_pwm);
        }

        let (ax, ay, az) = imu.accel_mg();
        let t = now_us();
        TELEMETRY.write(TelemetrySnapshot {
            speed_l_mm_s: clamp_i16(v_meas_l),
            speed_r_mm_s: clamp_i16(v_meas_r),
            gyro_z_mrad_s: clamp_i16(imu.gyro_z_rad_s * 1000.0),
            accel_x_mg: ax,
            accel_y_mg: ay,
            accel_z_mg: az,
            battery_mv: 0,
            fault_flags: FAULTS.raw(),
            timestamp_us: t,
            cmd_seq_last_applied: cmd.seq,
            t_cmd_applied_us: t,
        });
    }
}

// ---- Safety supervisor (50 Hz, core 0) ----

#[embassy_executor::task]
pub async fn safety_task(mut standby: StandbyPin) -> ! {
    log::info!("safety_task started @ 50 Hz");

    let mut ticker = Ticker::every(Duration::from_millis(20));
    let mut supervisor = SafetySupervisor::new();

    // Driver comes up enabled; faults will drop it.
    standby.enable();

    loop {
        ticker.next().await;

        let cfg = config_snapshot();
        let snapshot = TELEMETRY.read().unwrap_or_default();
        let cmd = COMMAND.read();

        let action = supervisor.step(
            &cfg,
            &FAULTS,
            &SafetyInputs {
                now_us: now_us(),
                last_cmd_us: COMMAND.last_cmd_us(),
                cmd_v_mm_s: cmd.v_mm_s,
                speed_l_mm_s: snapshot.speed_l_mm_s,
                speed_r_mm_s: snapshot.speed_r_mm_s,
                imu: IMU.read(),
                range: RANGE.read(),
            },
        );

        match action {
            MotorAction::None => {}
            MotorAction::Brake => {
                BRAKE_REQ.store(true, Ordering::Relaxed);
            }
            MotorAction::HardKill => {
                BRAKE_REQ.store(true, Ordering::Relaxed);
                standby.kill();
            }
            MotorAction::Enable => {
                BRAKE_REQ.store(false, Ordering::Relaxed);
                standby.enable();
            }
        }
    }
}

// ---- IMU ingest (~240 Hz, core 0) ----

#[embassy_executor::task]
pub async fn imu_task(mut imu: ImuDriver) -> ! {
    log::info!("imu_task started");

    let mut ticker = Ticker::every(Duration::from_millis(4));
    let mut health = BusHealth::new();

    loop {
        ticker.next().await;

        match imu.read_raw() {
            Ok((gyro, accel)) => {
                if health.on_success() == BusVerdict::ClearFault {
                    FAULTS.clear(Fault::IMU_FAIL);
                }
                IMU.publish(ImuSample::from_raw(&gyro, &accel, now_us()));
            }
            Err(_) => {
                if health.on_error() == BusVerdict::Recover {
                    FAULTS.latch(Fault::IMU_FAIL);
                    if imu.recover() {
                        health.on_recovered();
                    }
                }
            }
        }
    }
}

// ---- Rangefinder (cfg.range_hz, core 1) ----

#[embassy_executor::task]
pub async fn range_task(mut range: RangeDriver) -> ! {
    let cfg0 = config_snapshot();
    log::info!("range_task started @ {} Hz", cfg0.range_hz);

    let mut ticker = Ticker::every(Duration::from_millis(1000 / cfg0.range_hz as u64));
    loop {
        ticker.next().await;
        let timeout_us = config_snapshot().range_timeout_us;
        let sample = range.measure(timeout_us, now_us()).await;
        RANGE.publish(sample);
    }
}

// ---- Host-RX (core 1) ----

fn dispatch(pkt: &companion_link::ParsedPacket<'_>) {
    let Some(id) = CmdId::from_u8(pkt.type_id) else {
        log::debug!("unknown cmd type 0x{:02X}", pkt.type_id);
        return;
    };

    match id {
        CmdId::SetTwist => {
            if let Some(tw) = cmd::Twist::decode(pkt.payload) {
                COMMAND.publish(
                    Command {
                        v_mm_s: tw.v_mm_s,
                        w_mrad_s: tw.w_mrad_s,
                        seq: pkt.seq,
                    },
                    now_us(),
                );
            }
        }
        CmdId::Stop => {
            // Soft stop: zero the command.
            COMMAND.publish(
                Command {
                    v_mm_s: 0,
                    w_mrad_s: 0,
                    seq: pkt.seq,
                },
                now_us(),
            );
        }
        CmdId::Estop => {
            // The safety task executes the kill.
            FAULTS.latch(Fault::ESTOP);
        }
        CmdId::ClearFaults => {
            if let Some(cf) = cmd::ClearFaults::decode(pkt.payload) {
                FAULTS.clear(Fault::from_bits_truncate(cf.mask));
                log::info!("faults cleared: mask=0x{:04X}", cf.mask);
            }
        }
        CmdId::SetConfig => {
            if let Some(sc) = cmd::SetConfig::decode(pkt.payload) {
                config_apply(sc.param_id, &sc.value);
            }
        }
        CmdId::SetLimits => {
            // Limits travel through SET_CONFIG; the legacy ID is accepted
            // and ignored.
            log::debug!("SET_LIMITS ignored");
        }
        CmdId::TimeSyncReq => {
            if let Some(req) = cmd::TimeSyncReq::decode(pkt.payload) {
                let resp = TimeSyncResp {
                    ping_seq: req.ping_seq,
                    t_src_us: now_us64(),
                };
                let mut reply = Reply {
                    type_id: telemetry::id::TIME_SYNC_RESP,
                    payload: [0; 16],
                    len: 0,
                };
                reply.len = resp.encode(&mut reply.payload);
                let _ = REPLIES.try_send(reply);
            }
        }
        CmdId::SetProtocolVersion => {
            if let Some(sp) = cmd::SetProtocolVersion::decode(pkt.payload) {
                if TX.set_version(sp.version) {
                    log::info!("protocol version -> {}", sp.version);
                }
                let _ = REPLIES.try_send(Reply {
                    type_id: telemetry::id::PROTOCOL_VERSION_ACK,
                    payload: {
                        let mut p = [0u8; 16];
                        p[0] = sp.version;
                        p
                    },
                    len: 1,
                });
            }
        }
        // Face-only commands never reach this MCU.
        _ => log::debug!("unhandled cmd type 0x{:02X}", pkt.type_id),
    }
}

#[embassy_executor::task]
pub async fn usb_rx_task(mut usb: UsbRx) -> ! {
    log::info!("usb_rx_task started");

    let mut deframer = Deframer::new();
    let mut buf = [0u8; 64];

    loop {
        let n = usb.read_some(&mut buf).await;
        if n == 0 {
            continue;
        }
        deframer.feed(&buf[..n], TX.version(), |pkt| dispatch(pkt));
    }
}

// ---- Telemetry (20 Hz, core 1) ----

#[embassy_executor::task]
pub async fn telemetry_task(mut usb: UsbTx) -> ! {
    log::info!("telemetry_task started @ 20 Hz");

    let mut ticker = Ticker::every(Duration::from_millis(50));
    let mut wire = [0u8; 128];

    loop {
        ticker.next().await;

        // Replies first so time-sync answers go out promptly.
        while let Ok(reply) = REPLIES.try_receive() {
            let n = packet::build(&TX, reply.type_id, now_us64(), &reply.payload[..reply.len], &mut wire);
            if n > 0 {
                usb.write_all(&wire[..n]).await;
            }
        }

        let Some(snapshot) = TELEMETRY.read() else {
            // Writer kept colliding; skip the cycle.
            continue;
        };
        let range = RANGE.read();

        let state = ReflexState {
            speed_l_mm_s: snapshot.speed_l_mm_s,
            speed_r_mm_s: snapshot.speed_r_mm_s,
            gyro_z_mrad_s: snapshot.gyro_z_mrad_s,
            accel_x_mg: snapshot.accel_x_mg,
            accel_y_mg: snapshot.accel_y_mg,
            accel_z_mg: snapshot.accel_z_mg,
            battery_mv: snapshot.battery_mv,
            fault_flags: snapshot.fault_flags,
            range_mm: range.range_mm,
            range_status: range.status as u8,
            cmd_seq_last_applied: snapshot.cmd_seq_last_applied,
            t_cmd_applied_us: snapshot.t_cmd_applied_us,
        };

        let mut payload = [0u8; ReflexState::LEN_V2];
        let len = if TX.version() == PROTOCOL_V2 {
            state.encode_v2(&mut payload)
        } else {
            state.encode_v1(&mut payload)
        };

        let n = packet::build(&TX, telemetry::id::STATE, now_us64(), &payload[..len], &mut wire);
        if n > 0 {
            usb.write_all(&wire[..n]).await;
        }
    }
}
