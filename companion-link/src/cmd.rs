// Host → MCU command IDs and payload codecs.
//
// All multi-byte fields are little-endian. Decoders tolerate trailing bytes
// (forward compatibility) and reject short payloads.

/// Command type IDs. Shared commands live in 0x00-0x0F, Reflex in 0x10-0x1F,
/// Face in 0x20-0x2F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdId {
    TimeSyncReq = 0x06,
    SetProtocolVersion = 0x07,

    SetTwist = 0x10,
    Stop = 0x11,
    Estop = 0x12,
    SetLimits = 0x13,
    ClearFaults = 0x14,
    SetConfig = 0x15,

    SetState = 0x20,
    Gesture = 0x21,
    SetSystem = 0x22,
    SetTalking = 0x23,
    SetFlags = 0x24,
    SetConvState = 0x25,
}

impl CmdId {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x06 => Self::TimeSyncReq,
            0x07 => Self::SetProtocolVersion,
            0x10 => Self::SetTwist,
            0x11 => Self::Stop,
            0x12 => Self::Estop,
            0x13 => Self::SetLimits,
            0x14 => Self::ClearFaults,
            0x15 => Self::SetConfig,
            0x20 => Self::SetState,
            0x21 => Self::Gesture,
            0x22 => Self::SetSystem,
            0x23 => Self::SetTalking,
            0x24 => Self::SetFlags,
            0x25 => Self::SetConvState,
            _ => return None,
        })
    }
}

// ---- Shared ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSyncReq {
    pub ping_seq: u32,
    pub reserved: u32,
}

impl TimeSyncReq {
    pub const LEN: usize = 8;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            ping_seq: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            reserved: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[..4].copy_from_slice(&self.ping_seq.to_le_bytes());
        out[4..8].copy_from_slice(&self.reserved.to_le_bytes());
        Self::LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetProtocolVersion {
    pub version: u8,
}

impl SetProtocolVersion {
    pub const LEN: usize = 1;

    pub fn decode(data: &[u8]) -> Option<Self> {
        data.first().map(|&version| Self { version })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.version;
        Self::LEN
    }
}

// ---- Reflex ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Twist {
    pub v_mm_s: i16,
    pub w_mrad_s: i16,
}

impl Twist {
    pub const LEN: usize = 4;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            v_mm_s: i16::from_le_bytes([data[0], data[1]]),
            w_mrad_s: i16::from_le_bytes([data[2], data[3]]),
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[..2].copy_from_slice(&self.v_mm_s.to_le_bytes());
        out[2..4].copy_from_slice(&self.w_mrad_s.to_le_bytes());
        Self::LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearFaults {
    pub mask: u16,
}

impl ClearFaults {
    pub const LEN: usize = 2;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            mask: u16::from_le_bytes([data[0], data[1]]),
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[..2].copy_from_slice(&self.mask.to_le_bytes());
        Self::LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetConfig {
    pub param_id: u8,
    /// Little-endian f32, u32, or i32 depending on the parameter.
    pub value: [u8; 4],
}

impl SetConfig {
    pub const LEN: usize = 5;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            param_id: data[0],
            value: [data[1], data[2], data[3], data[4]],
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.param_id;
        out[1..5].copy_from_slice(&self.value);
        Self::LEN
    }
}

// ---- Face ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetState {
    pub mood_id: u8,
    pub intensity: u8,
    /// -128..+127, scaled to ±MAX_GAZE by the consumer.
    pub gaze_x: i8,
    pub gaze_y: i8,
    pub brightness: u8,
}

impl SetState {
    pub const LEN: usize = 5;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            mood_id: data[0],
            intensity: data[1],
            gaze_x: data[2] as i8,
            gaze_y: data[3] as i8,
            brightness: data[4],
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.mood_id;
        out[1] = self.intensity;
        out[2] = self.gaze_x as u8;
        out[3] = self.gaze_y as u8;
        out[4] = self.brightness;
        Self::LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gesture {
    pub gesture_id: u8,
    /// 0 = use the gesture's default duration.
    pub duration_ms: u16,
}

impl Gesture {
    pub const LEN: usize = 3;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            gesture_id: data[0],
            duration_ms: u16::from_le_bytes([data[1], data[2]]),
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.gesture_id;
        out[1..3].copy_from_slice(&self.duration_ms.to_le_bytes());
        Self::LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetSystem {
    pub mode: u8,
    pub phase: u8,
    /// Mode-specific, e.g. battery level 0-255.
    pub param: u8,
}

impl SetSystem {
    pub const LEN: usize = 3;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            mode: data[0],
            phase: data[1],
            param: data[2],
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.mode;
        out[1] = self.phase;
        out[2] = self.param;
        Self::LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTalking {
    pub talking: u8,
    pub energy: u8,
}

impl SetTalking {
    pub const LEN: usize = 2;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            talking: data[0],
            energy: data[1],
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.talking;
        out[1] = self.energy;
        Self::LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetFlags {
    pub flags: u8,
}

impl SetFlags {
    pub const LEN: usize = 1;

    pub fn decode(data: &[u8]) -> Option<Self> {
        data.first().map(|&flags| Self { flags })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.flags;
        Self::LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetConvState {
    pub state: u8,
}

impl SetConvState {
    pub const LEN: usize = 1;

    pub fn decode(data: &[u8]) -> Option<Self> {
        data.first().map(|&state| Self { state })
    }

    pub fn encode(&self, out: &mut [u8]) -> usize {
        out[0] = self.state;
        Self::LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twist_codec() {
        let t = Twist {
            v_mm_s: -350,
            w_mrad_s: 1200,
        };
        let mut buf = [0u8; 8];
        assert_eq!(t.encode(&mut buf), Twist::LEN);
        assert_eq!(Twist::decode(&buf).unwrap(), t);
        assert_eq!(Twist::decode(&buf[..3]), None);
    }

    #[test]
    fn set_state_codec_preserves_sign() {
        let s = SetState {
            mood_id: 9,
            intensity: 200,
            gaze_x: -127,
            gaze_y: 64,
            brightness: 255,
        };
        let mut buf = [0u8; 8];
        s.encode(&mut buf);
        assert_eq!(SetState::decode(&buf).unwrap(), s);
    }

    #[test]
    fn id_mapping_is_total_over_known_ids() {
        for id in [
            0x06u8, 0x07, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x20, 0x21, 0x22, 0x23, 0x24, 0x25,
        ] {
            let cmd = CmdId::from_u8(id).unwrap();
            assert_eq!(cmd as u8, id);
        }
        assert_eq!(CmdId::from_u8(0x3F), None);
    }
}
