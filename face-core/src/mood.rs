// Mood set and the mood → eye/mouth color table.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mood {
    #[default]
    Neutral = 0,
    Happy = 1,
    Excited = 2,
    Curious = 3,
    Sad = 4,
    Scared = 5,
    Angry = 6,
    Surprised = 7,
    Sleepy = 8,
    Love = 9,
    Silly = 10,
    Thinking = 11,
}

impl Mood {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Neutral,
            1 => Self::Happy,
            2 => Self::Excited,
            3 => Self::Curious,
            4 => Self::Sad,
            5 => Self::Scared,
            6 => Self::Angry,
            7 => Self::Surprised,
            8 => Self::Sleepy,
            9 => Self::Love,
            10 => Self::Silly,
            11 => Self::Thinking,
            _ => return None,
        })
    }

    /// Per-mood base color (gesture overrides live in `FaceState::emotion_color`).
    pub fn color(self) -> (u8, u8, u8) {
        match self {
            Mood::Happy => (50, 180, 255),     // cyan
            Mood::Excited => (80, 220, 255),   // bright cyan
            Mood::Curious => (40, 160, 240),   // sky blue
            Mood::Sad => (20, 60, 160),        // deep blue
            Mood::Scared => (100, 60, 200),    // violet
            Mood::Angry => (60, 80, 220),      // indigo
            Mood::Surprised => (200, 220, 255),
            Mood::Sleepy => (20, 40, 120),     // navy
            Mood::Love => (255, 100, 180),     // pink
            Mood::Silly => (180, 255, 100),    // lime
            Mood::Thinking => (60, 120, 200),  // muted blue
            Mood::Neutral => (30, 120, 255),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for id in 0..12u8 {
            assert_eq!(Mood::from_u8(id).unwrap() as u8, id);
        }
        assert_eq!(Mood::from_u8(12), None);
    }
}
