// MCU → host telemetry IDs and payload codecs.

/// Telemetry type IDs. Shared telemetry lives in 0x80-0x8F, Reflex state at
/// 0x80, Face at 0x90+.
pub mod id {
    pub const STATE: u8 = 0x80;
    pub const TIME_SYNC_RESP: u8 = 0x86;
    pub const PROTOCOL_VERSION_ACK: u8 = 0x87;

    pub const FACE_STATUS: u8 = 0x90;
    pub const TOUCH_EVENT: u8 = 0x91;
    pub const BUTTON_EVENT: u8 = 0x92;
    pub const HEARTBEAT: u8 = 0x93;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSyncResp {
    pub ping_seq: u32,
    pub t_src_us: u64,
}

impl TimeSyncResp {
    pub const LEN: usize = 12;

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[..4].copy_from_slice(&self.ping_seq.to_le_bytes());
        out[4..12].copy_from_slice(&self.t_src_us.to_le_bytes());
        Self::LEN
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            ping_seq: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            t_src_us: u64::from_le_bytes([
                data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
            ]),
        })
    }
}

// ---- Reflex STATE ----

/// Reflex state snapshot. The v1 wire form stops after `range_status`; v2
/// appends the command-causality tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReflexState {
    pub speed_l_mm_s: i16,
    pub speed_r_mm_s: i16,
    pub gyro_z_mrad_s: i16,
    pub accel_x_mg: i16,
    pub accel_y_mg: i16,
    pub accel_z_mg: i16,
    pub battery_mv: u16,
    pub fault_flags: u16,
    pub range_mm: u16,
    pub range_status: u8,
    // v2 additions
    pub cmd_seq_last_applied: u32,
    pub t_cmd_applied_us: u32,
}

impl ReflexState {
    pub const LEN_V1: usize = 19;
    pub const LEN_V2: usize = 27;

    fn encode_common(&self, out: &mut [u8]) {
        out[..2].copy_from_slice(&self.speed_l_mm_s.to_le_bytes());
        out[2..4].copy_from_slice(&self.speed_r_mm_s.to_le_bytes());
        out[4..6].copy_from_slice(&self.gyro_z_mrad_s.to_le_bytes());
        out[6..8].copy_from_slice(&self.accel_x_mg.to_le_bytes());
        out[8..10].copy_from_slice(&self.accel_y_mg.to_le_bytes());
        out[10..12].copy_from_slice(&self.accel_z_mg.to_le_bytes());
        out[12..14].copy_from_slice(&self.battery_mv.to_le_bytes());
        out[14..16].copy_from_slice(&self.fault_flags.to_le_bytes());
        out[16..18].copy_from_slice(&self.range_mm.to_le_bytes());
        out[18] = self.range_status;
    }

    pub fn encode_v1(&self, out: &mut [u8]) -> usize {
        self.encode_common(out);
        Self::LEN_V1
    }

    pub fn encode_v2(&self, out: &mut [u8]) -> usize {
        self.encode_common(out);
        out[19..23].copy_from_slice(&self.cmd_seq_last_applied.to_le_bytes());
        out[23..27].copy_from_slice(&self.t_cmd_applied_us.to_le_bytes());
        Self::LEN_V2
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN_V1 {
            return None;
        }
        let mut s = Self {
            speed_l_mm_s: i16::from_le_bytes([data[0], data[1]]),
            speed_r_mm_s: i16::from_le_bytes([data[2], data[3]]),
            gyro_z_mrad_s: i16::from_le_bytes([data[4], data[5]]),
            accel_x_mg: i16::from_le_bytes([data[6], data[7]]),
            accel_y_mg: i16::from_le_bytes([data[8], data[9]]),
            accel_z_mg: i16::from_le_bytes([data[10], data[11]]),
            battery_mv: u16::from_le_bytes([data[12], data[13]]),
            fault_flags: u16::from_le_bytes([data[14], data[15]]),
            range_mm: u16::from_le_bytes([data[16], data[17]]),
            range_status: data[18],
            ..Default::default()
        };
        if data.len() >= Self::LEN_V2 {
            s.cmd_seq_last_applied = u32::from_le_bytes([data[19], data[20], data[21], data[22]]);
            s.t_cmd_applied_us = u32::from_le_bytes([data[23], data[24], data[25], data[26]]);
        }
        Some(s)
    }
}

// ---- Face status / input events ----

pub const STATUS_FLAG_TOUCH_ACTIVE: u8 = 1 << 0;
pub const STATUS_FLAG_TALKING: u8 = 1 << 1;
pub const STATUS_FLAG_PTT_LISTENING: u8 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaceStatus {
    pub mood_id: u8,
    /// 0xFF = none.
    pub active_gesture: u8,
    pub system_mode: u8,
    pub flags: u8,
    // v2 additions
    pub cmd_seq_last_applied: u32,
    pub t_state_applied_us: u32,
}

impl FaceStatus {
    pub const LEN_V1: usize = 4;
    pub const LEN_V2: usize = 12;

    pub fn encode_v1(&self, out: &mut [u8]) -> usize {
        out[0] = self.mood_id;
        out[1] = self.active_gesture;
        out[2] = self.system_mode;
        out[3] = self.flags;
        Self::LEN_V1
    }

    pub fn encode_v2(&self, out: &mut [u8]) -> usize {
        self.encode_v1(out);
        out[4..8].copy_from_slice(&self.cmd_seq_last_applied.to_le_bytes());
        out[8..12].copy_from_slice(&self.t_state_applied_us.to_le_bytes());
        Self::LEN_V2
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN_V1 {
            return None;
        }
        let mut s = Self {
            mood_id: data[0],
            active_gesture: data[1],
            system_mode: data[2],
            flags: data[3],
            ..Default::default()
        };
        if data.len() >= Self::LEN_V2 {
            s.cmd_seq_last_applied = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
            s.t_state_applied_us = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        }
        Some(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    /// 0 = press, 1 = release, 2 = drag.
    pub event_type: u8,
    pub x: u16,
    pub y: u16,
}

impl TouchEvent {
    pub const LEN: usize = 5;

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.event_type;
        out[1..3].copy_from_slice(&self.x.to_le_bytes());
        out[3..5].copy_from_slice(&self.y.to_le_bytes());
        Self::LEN
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            event_type: data[0],
            x: u16::from_le_bytes([data[1], data[2]]),
            y: u16::from_le_bytes([data[3], data[4]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    /// 0 = PTT, 1 = Action.
    pub button_id: u8,
    /// 0 = press, 1 = release, 2 = toggle, 3 = click.
    pub event_type: u8,
    /// Toggle state for PTT, else 0.
    pub state: u8,
    pub reserved: u8,
}

impl ButtonEvent {
    pub const LEN: usize = 4;

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.button_id;
        out[1] = self.event_type;
        out[2] = self.state;
        out[3] = self.reserved;
        Self::LEN
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            button_id: data[0],
            event_type: data[1],
            state: data[2],
            reserved: data[3],
        })
    }
}

// ---- Heartbeat ----

/// Periodic liveness + link-health record (1 Hz). The optional render-perf
/// tail follows directly after when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    pub uptime_ms: u32,
    pub status_tx_count: u32,
    pub touch_tx_count: u32,
    pub button_tx_count: u32,
    pub rx_frames_ok: u32,
    pub rx_bad_crc: u32,
    pub rx_overruns: u32,
    pub rx_unknown_type: u32,
    pub tx_frames: u32,
    pub tx_dropped: u32,
    pub ptt_listening: u8,
    pub reserved: [u8; 3],
}

impl Heartbeat {
    pub const LEN: usize = 44;

    pub fn encode(&self, out: &mut [u8]) -> usize {
        let words = [
            self.uptime_ms,
            self.status_tx_count,
            self.touch_tx_count,
            self.button_tx_count,
            self.rx_frames_ok,
            self.rx_bad_crc,
            self.rx_overruns,
            self.rx_unknown_type,
            self.tx_frames,
            self.tx_dropped,
        ];
        for (i, w) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        out[40] = self.ptt_listening;
        out[41..44].copy_from_slice(&self.reserved);
        Self::LEN
    }
}

/// Render-performance tail appended to HEARTBEAT when perf telemetry is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatPerfTail {
    pub window_frames: u32,
    pub frame_us_avg: u32,
    pub frame_us_max: u32,
    pub render_us_avg: u32,
    pub render_us_max: u32,
    pub eyes_us_avg: u32,
    pub mouth_us_avg: u32,
    pub border_us_avg: u32,
    pub effects_us_avg: u32,
    pub overlay_us_avg: u32,
    pub dirty_px_avg: u32,
    pub spi_bytes_per_s: u32,
    pub cmd_rx_to_apply_us_avg: u32,
    pub perf_sample_div: u8,
    pub dirty_rect_enabled: u8,
    pub afterglow_downsample: u8,
    pub reserved: u8,
}

impl HeartbeatPerfTail {
    pub const LEN: usize = 56;

    pub fn encode(&self, out: &mut [u8]) -> usize {
        let words = [
            self.window_frames,
            self.frame_us_avg,
            self.frame_us_max,
            self.render_us_avg,
            self.render_us_max,
            self.eyes_us_avg,
            self.mouth_us_avg,
            self.border_us_avg,
            self.effects_us_avg,
            self.overlay_us_avg,
            self.dirty_px_avg,
            self.spi_bytes_per_s,
            self.cmd_rx_to_apply_us_avg,
        ];
        for (i, w) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        out[52] = self.perf_sample_div;
        out[53] = self.dirty_rect_enabled;
        out[54] = self.afterglow_downsample;
        out[55] = self.reserved;
        Self::LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflex_state_v1_v2_round_trip() {
        let s = ReflexState {
            speed_l_mm_s: 98,
            speed_r_mm_s: 102,
            gyro_z_mrad_s: -12,
            accel_x_mg: 5,
            accel_y_mg: -3,
            accel_z_mg: 998,
            battery_mv: 7400,
            fault_flags: 0x0041,
            range_mm: 312,
            range_status: 0,
            cmd_seq_last_applied: 77,
            t_cmd_applied_us: 123_456,
        };

        let mut buf = [0u8; 32];
        assert_eq!(s.encode_v2(&mut buf), ReflexState::LEN_V2);
        assert_eq!(ReflexState::decode(&buf[..ReflexState::LEN_V2]).unwrap(), s);

        // v1 form drops the causality tail.
        let v1 = ReflexState::decode(&buf[..ReflexState::LEN_V1]).unwrap();
        assert_eq!(v1.cmd_seq_last_applied, 0);
        assert_eq!(v1.speed_r_mm_s, 102);
    }

    #[test]
    fn time_sync_resp_round_trip() {
        let r = TimeSyncResp {
            ping_seq: 42,
            t_src_us: 0x0102_0304_0506_0708,
        };
        let mut buf = [0u8; 16];
        r.encode(&mut buf);
        assert_eq!(TimeSyncResp::decode(&buf).unwrap(), r);
    }

    #[test]
    fn heartbeat_layout() {
        let hb = Heartbeat {
            uptime_ms: 60_000,
            rx_bad_crc: 3,
            ptt_listening: 1,
            ..Default::default()
        };
        let mut buf = [0u8; Heartbeat::LEN];
        assert_eq!(hb.encode(&mut buf), Heartbeat::LEN);
        assert_eq!(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]), 60_000);
        assert_eq!(u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]), 3);
        assert_eq!(buf[40], 1);
    }
}
