// One-shot gesture identifiers.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GestureId {
    Blink = 0,
    WinkL = 1,
    WinkR = 2,
    Confused = 3,
    Laugh = 4,
    Surprise = 5,
    Heart = 6,
    XEyes = 7,
    Sleepy = 8,
    Rage = 9,
    /// Short vertical shake used as an acknowledgement.
    Nod = 10,
    /// Short horizontal shake used as a "no".
    Headshake = 11,
    /// Horizontal + vertical one-shots together.
    Wiggle = 12,
}

impl GestureId {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Blink,
            1 => Self::WinkL,
            2 => Self::WinkR,
            3 => Self::Confused,
            4 => Self::Laugh,
            5 => Self::Surprise,
            6 => Self::Heart,
            7 => Self::XEyes,
            8 => Self::Sleepy,
            9 => Self::Rage,
            10 => Self::Nod,
            11 => Self::Headshake,
            12 => Self::Wiggle,
            _ => return None,
        })
    }
}

/// Reported in FACE_STATUS when no gesture is active.
pub const GESTURE_NONE: u8 = 0xFF;
