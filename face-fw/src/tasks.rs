// Embassy tasks. Core 0: animation + render (frame-paced). Core 1: host-RX,
// telemetry, touch polling, audio workers.

use core::sync::atomic::Ordering;

use embassy_time::{Duration, Instant, Ticker, Timer};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use companion_link::cmd::{self, CmdId};
use companion_link::packet::{self, PROTOCOL_V2};
use companion_link::telemetry::{self, ButtonEvent, Heartbeat, TimeSyncResp, TouchEvent};
use companion_link::Deframer;

use face_core::audio::{ProbeStats, ToneSynth, BOOT_TONE_AMP, BOOT_TONE_FREQ_HZ};
use face_core::border::ConvBorder;
use face_core::channels::{apply_commands, ChannelCursor, EventBuffer, GestureEvent, EVENT_NONE};
use face_core::config::{ANIM_FPS, FACE_PERF_SAMPLE_DIV, FACE_PERF_TELEMETRY};
use face_core::render::{RenderPerf, Renderer};
use face_core::state::FaceState;
use face_core::status::PerfWindow;
use face_core::system_face;
use face_core::touch::{TouchPhase, TouchTracker, TOUCH_TRANSFORM_PRESETS};

use crate::drivers::audio::{AudioRx, AudioTx, Codec};
use crate::drivers::display::Display;
use crate::drivers::led::StatusLed;
use crate::drivers::touch::TouchController;
use crate::drivers::usb::{UsbRx, UsbTx};
use crate::shared::{
    bump, now_s, now_us, now_us64, Reply, BUTTON_EVENTS, BUTTON_TX_COUNT, CHANNELS, MIC_QUEUE,
    REPLIES, RX_BAD_CRC, RX_FRAMES, RX_OVERRUNS, RX_UNKNOWN, SPEAKER_QUEUE, STATUS,
    STATUS_TX_COUNT, TOUCH_EVENTS, TOUCH_PRESET, TOUCH_TX_COUNT, TX, TX_DROPPED, TX_FRAMES,
};

/// Latest completed perf window, consumed by the telemetry task.
pub static PERF_TAIL: EventBuffer<companion_link::telemetry::HeartbeatPerfTail> =
    EventBuffer::new(companion_link::telemetry::HeartbeatPerfTail {
        window_frames: 0,
        frame_us_avg: 0,
        frame_us_max: 0,
        render_us_avg: 0,
        render_us_max: 0,
        eyes_us_avg: 0,
        mouth_us_avg: 0,
        border_us_avg: 0,
        effects_us_avg: 0,
        overlay_us_avg: 0,
        dirty_px_avg: 0,
        spi_bytes_per_s: 0,
        cmd_rx_to_apply_us_avg: 0,
        perf_sample_div: 0,
        dirty_rect_enabled: 0,
        afterglow_downsample: 0,
        reserved: 0,
    });

// ---- Animation + render (30 FPS, core 0) ----

#[embassy_executor::task]
pub async fn face_task(mut display: Display, mut led: StatusLed) -> ! {
    log::info!("face_task started ({} FPS)", ANIM_FPS);

    display.panel_init().await;

    let mut fs = FaceState::default();
    let mut border = ConvBorder::new();
    let mut renderer = Renderer::new();
    let mut cursor = ChannelCursor::default();
    let mut perf_window = PerfWindow::new(true);
    let mut rng = SmallRng::seed_from_u64(now_us64());

    fs.apply_flags(face_core::config::FaceFlags::from_bits_truncate(
        CHANNELS.flags.current(),
    ));
    display.set_backlight(face_core::config::DEFAULT_BRIGHTNESS);

    let mut ticker = Ticker::every(Duration::from_millis(1000 / ANIM_FPS as u64));
    let mut frame_idx: u32 = 0;
    let mut next_perf_pub = Instant::now() + Duration::from_secs(1);
    let mut next_preset_cycle = Instant::now();

    loop {
        ticker.next().await;
        let frame_start = Instant::now();
        let t_us = now_us();
        let t_s = now_s();

        // Calibration diagnostic: cycle the touch transform, track the
        // crosshair from the latest touch sample.
        if renderer.calibration {
            let touch = TOUCH_EVENTS.read();
            if touch.event_type != face_core::channels::EVENT_NONE {
                renderer.last_touch = Some((touch.x as i32, touch.y as i32));
            }
            if face_core::config::CALIB_TOUCH_AUTOCYCLE_MS > 0 && Instant::now() >= next_preset_cycle
            {
                let next = (TOUCH_PRESET.load(Ordering::Relaxed) + 1) % TOUCH_TRANSFORM_PRESETS.len();
                TOUCH_PRESET.store(next, Ordering::Relaxed);
                log::info!("touch transform -> {}", TOUCH_TRANSFORM_PRESETS[next].name);
                next_preset_cycle = Instant::now()
                    + Duration::from_millis(face_core::config::CALIB_TOUCH_AUTOCYCLE_MS as u64);
            }
        }

        // Command ingest: gestures, state, system, talking, flags, conv.
        let applied = apply_commands(&mut cursor, &CHANNELS, &mut fs, &mut border, t_us);
        if let Some(level) = applied.backlight {
            display.set_backlight(level);
        }

        // Border animation follows the talking energy.
        border.set_energy(fs.talking_energy);
        border.update(1.0 / ANIM_FPS as f32);

        // Advance the pose, then let any active system mode drape it.
        fs.advance(t_s, &mut rng);
        if fs.system.mode != face_core::state::SystemMode::None {
            system_face::apply(&mut fs, t_s);
        } else {
            fs.color_override = None;
        }

        // Mirror for the telemetry task.
        STATUS.publish_face(&fs);

        // Status LED: border color wins, then talking/listening/idle.
        if border.active() {
            let (r, g, b) = border.led();
            led.set_rgb(r, g, b);
        } else if fs.talking {
            led.set_rgb(180, 80, 0);
        } else if STATUS.ptt_listening() {
            led.set_rgb(0, 90, 180);
        } else {
            led.set_rgb(0, 40, 0);
        }

        // Rasterize + flush the dirty window.
        let collect = FACE_PERF_TELEMETRY && frame_idx % FACE_PERF_SAMPLE_DIV == 0;
        let mut perf = RenderPerf::default();
        let dirty = renderer.render(&fs, &border, t_s, collect, &now_us, &mut perf);
        display.flush(renderer.framebuffer(), dirty);
        STATUS.note_applied(now_us());

        // Perf accounting.
        let frame_us = (Instant::now() - frame_start).as_micros() as u32;
        perf_window.record_frame(frame_us, &perf, collect);
        if cursor.latest_cmd_rx_us != 0 {
            let applied_us = STATUS.applied_us();
            if applied_us > cursor.latest_cmd_rx_us {
                perf_window.record_cmd_latency(applied_us - cursor.latest_cmd_rx_us);
            }
        }
        if FACE_PERF_TELEMETRY && Instant::now() >= next_perf_pub {
            PERF_TAIL.publish(perf_window.take());
            next_perf_pub = Instant::now() + Duration::from_secs(1);
        }

        frame_idx = frame_idx.wrapping_add(1);
    }
}

// ---- Touch polling (core 1) ----

#[embassy_executor::task]
pub async fn touch_task(mut controller: TouchController) -> ! {
    log::info!("touch_task started");

    let mut ticker = Ticker::every(Duration::from_millis(15));
    let mut tracker = TouchTracker::new();
    let mut prev: Option<(i32, i32)> = None;

    loop {
        ticker.next().await;

        let preset = &TOUCH_TRANSFORM_PRESETS
            [TOUCH_PRESET.load(Ordering::Relaxed) % TOUCH_TRANSFORM_PRESETS.len()];
        let raw = controller.read().map(|t| preset.apply(t.x, t.y));
        let event = match (prev, raw) {
            (None, Some(p)) => Some((TouchPhase::Press, p)),
            (Some(_), Some(p)) => Some((TouchPhase::Drag, p)),
            (Some(p), None) => Some((TouchPhase::Release, p)),
            (None, None) => None,
        };
        prev = raw;

        let Some((phase, (x, y))) = event else {
            continue;
        };

        let overlay = STATUS.system_mode() != 0;
        let out = tracker.on_touch(phase, x, y, overlay, now_us());

        if let Some(sample) = out.touch {
            TOUCH_EVENTS.publish(sample);
        }
        for btn in out.buttons.iter().flatten() {
            BUTTON_EVENTS.publish(*btn);
        }

        STATUS.set_touch_active(tracker.touch_active());
        STATUS.set_ptt_listening(tracker.ptt_listening());
    }
}

// ---- Host-RX (core 1) ----

fn dispatch(pkt: &companion_link::ParsedPacket<'_>) {
    let t = now_us();
    STATUS.note_cmd_seq(pkt.seq);

    let Some(id) = CmdId::from_u8(pkt.type_id) else {
        bump(&RX_UNKNOWN);
        log::debug!("unknown cmd type 0x{:02X}", pkt.type_id);
        return;
    };

    match id {
        CmdId::SetState => {
            if let Some(sp) = cmd::SetState::decode(pkt.payload) {
                CHANNELS
                    .state
                    .publish(sp.mood_id, sp.intensity, sp.gaze_x, sp.gaze_y, sp.brightness, t);
            }
        }
        CmdId::Gesture => {
            if let Some(gp) = cmd::Gesture::decode(pkt.payload) {
                CHANNELS.gestures.push_evicting(GestureEvent {
                    gesture_id: gp.gesture_id,
                    duration_ms: gp.duration_ms,
                    timestamp_us: t,
                });
            }
        }
        CmdId::SetSystem => {
            if let Some(sp) = cmd::SetSystem::decode(pkt.payload) {
                CHANNELS.system.publish(sp.mode, sp.param, t);
            }
        }
        CmdId::SetTalking => {
            if let Some(tp) = cmd::SetTalking::decode(pkt.payload) {
                CHANNELS.talking.publish(tp.talking != 0, tp.energy, t);
            }
        }
        CmdId::SetFlags => {
            if let Some(fp) = cmd::SetFlags::decode(pkt.payload) {
                CHANNELS.flags.publish(fp.flags, t);
            }
        }
        CmdId::SetConvState => {
            if let Some(cs) = cmd::SetConvState::decode(pkt.payload) {
                CHANNELS.conv.publish(cs.state, t);
            }
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
        // Reflex-only commands never reach this MCU.
        _ => {
            bump(&RX_UNKNOWN);
            log::debug!("unhandled cmd type 0x{:02X}", pkt.type_id);
        }
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

        RX_FRAMES.store(deframer.stats.frames_ok, Ordering::Relaxed);
        RX_BAD_CRC.store(deframer.stats.bad_crc, Ordering::Relaxed);
        RX_OVERRUNS.store(deframer.stats.overruns, Ordering::Relaxed);
    }
}

// ---- Telemetry (core 1) ----

async fn send(usb: &mut UsbTx, type_id: u8, t_src_us: u64, payload: &[u8]) {
    let mut wire = [0u8; 256];
    let n = packet::build(&TX, type_id, t_src_us, payload, &mut wire);
    if n > 0 && usb.write_all(&wire[..n]).await {
        bump(&TX_FRAMES);
    } else {
        bump(&TX_DROPPED);
    }
}

#[embassy_executor::task]
pub async fn telemetry_task(mut usb: UsbTx) -> ! {
    log::info!("telemetry_task started @ {} Hz", face_core::config::TELEMETRY_HZ);

    let mut ticker = Ticker::every(Duration::from_millis(50));
    let mut heartbeat_countdown = 0u32;

    loop {
        ticker.next().await;

        while let Ok(reply) = REPLIES.try_receive() {
            send(&mut usb, reply.type_id, now_us64(), &reply.payload[..reply.len]).await;
        }

        // FACE_STATUS at the telemetry rate, envelope per negotiation.
        let status = STATUS.snapshot();
        let mut payload = [0u8; companion_link::telemetry::FaceStatus::LEN_V2];
        let len = if TX.version() == PROTOCOL_V2 {
            status.encode_v2(&mut payload)
        } else {
            status.encode_v1(&mut payload)
        };
        send(&mut usb, telemetry::id::FACE_STATUS, now_us64(), &payload[..len]).await;
        bump(&STATUS_TX_COUNT);

        // Touch events ride the sample's own timestamp, then self-clear.
        let touch = TOUCH_EVENTS.read();
        if touch.event_type != EVENT_NONE {
            let ev = TouchEvent {
                event_type: touch.event_type,
                x: touch.x,
                y: touch.y,
            };
            let mut p = [0u8; TouchEvent::LEN];
            ev.encode(&mut p);
            send(&mut usb, telemetry::id::TOUCH_EVENT, touch.timestamp_us as u64, &p).await;
            bump(&TOUCH_TX_COUNT);

            let mut consumed = touch;
            consumed.event_type = EVENT_NONE;
            TOUCH_EVENTS.publish(consumed);
        }

        let btn = BUTTON_EVENTS.read();
        if btn.event_type != EVENT_NONE && btn.button_id != EVENT_NONE {
            let ev = ButtonEvent {
                button_id: btn.button_id,
                event_type: btn.event_type,
                state: btn.state,
                reserved: 0,
            };
            let mut p = [0u8; ButtonEvent::LEN];
            ev.encode(&mut p);
            send(&mut usb, telemetry::id::BUTTON_EVENT, btn.timestamp_us as u64, &p).await;
            bump(&BUTTON_TX_COUNT);

            let mut consumed = btn;
            consumed.button_id = EVENT_NONE;
            consumed.event_type = EVENT_NONE;
            BUTTON_EVENTS.publish(consumed);
        }

        // 1 Hz heartbeat with link counters + optional perf tail.
        if heartbeat_countdown == 0 {
            heartbeat_countdown = 20;

            let hb = Heartbeat {
                uptime_ms: (now_us64() / 1000) as u32,
                status_tx_count: STATUS_TX_COUNT.load(Ordering::Relaxed),
                touch_tx_count: TOUCH_TX_COUNT.load(Ordering::Relaxed),
                button_tx_count: BUTTON_TX_COUNT.load(Ordering::Relaxed),
                rx_frames_ok: RX_FRAMES.load(Ordering::Relaxed),
                rx_bad_crc: RX_BAD_CRC.load(Ordering::Relaxed),
                rx_overruns: RX_OVERRUNS.load(Ordering::Relaxed),
                rx_unknown_type: RX_UNKNOWN.load(Ordering::Relaxed),
                tx_frames: TX_FRAMES.load(Ordering::Relaxed),
                tx_dropped: TX_DROPPED.load(Ordering::Relaxed),
                ptt_listening: STATUS.ptt_listening() as u8,
                reserved: [0; 3],
            };

            let mut p = [0u8; Heartbeat::LEN + companion_link::telemetry::HeartbeatPerfTail::LEN];
            let mut len = hb.encode(&mut p);
            if FACE_PERF_TELEMETRY {
                let tail = PERF_TAIL.read();
                if tail.window_frames > 0 {
                    len += tail.encode(&mut p[len..]);
                }
            }
            send(&mut usb, telemetry::id::HEARTBEAT, now_us64(), &p[..len]).await;
        }
        heartbeat_countdown -= 1;
    }
}

// ---- Audio workers (audio variant, core 1) ----

#[embassy_executor::task]
pub async fn speaker_task(mut codec: Codec, mut i2s: AudioTx) -> ! {
    log::info!("speaker_task started");

    codec.init();

    // Boot chirp so a silent codec is caught immediately.
    let mut tone = ToneSynth::new(BOOT_TONE_FREQ_HZ, BOOT_TONE_AMP, 140);
    codec.amp(true);
    let mut chunk = face_core::audio::AudioChunk::default();
    while !tone.finished() {
        chunk.len = tone.fill(&mut chunk.samples);
        i2s.write_chunk(&chunk);
    }
    codec.amp(false);

    let mut playing = false;
    loop {
        match SPEAKER_QUEUE.pop() {
            Some(chunk) => {
                if !playing {
                    codec.amp(true);
                    playing = true;
                }
                if !i2s.write_chunk(&chunk) {
                    log::warn!("speaker write failed");
                }
            }
            None => {
                if playing {
                    codec.amp(false);
                    playing = false;
                }
                Timer::after(Duration::from_millis(10)).await;
            }
        }
    }
}

#[embassy_executor::task]
pub async fn mic_task(mut i2s: AudioRx) -> ! {
    log::info!("mic_task started");

    let mut was_active = false;
    loop {
        if !STATUS.ptt_listening() {
            Timer::after(Duration::from_millis(50)).await;
            was_active = false;
            continue;
        }

        let Some(chunk) = i2s.read_chunk() else {
            Timer::after(Duration::from_millis(5)).await;
            continue;
        };

        // Per-chunk activity probe; the queue carries the PCM to the host
        // broker when it drains it.
        let mut probe = ProbeStats::new();
        probe.add_chunk(&chunk);
        let active = probe.is_active();
        if active != was_active {
            log::info!(
                "mic activity {} (rms={} dbfs={})",
                if active { "start" } else { "stop" },
                probe.rms() as i32,
                probe.dbfs() as i32
            );
            was_active = active;
        }

        if !MIC_QUEUE.push(&chunk) {
            // Capture outpacing the consumer; drop the chunk.
        }
    }
}
