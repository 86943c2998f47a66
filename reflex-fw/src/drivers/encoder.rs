// Quadrature decode on the PCNT units. The 16-bit hardware counters are
// widened to i32 in software; at 100 Hz sampling they cannot wrap more than
// once between reads.

use esp_hal::pcnt::channel::{CtrlMode, EdgeMode};
use esp_hal::pcnt::unit::Unit;
use esp_hal::pcnt::Pcnt;
use esp_hal::peripherals::{GPIO10, GPIO11, GPIO8, GPIO9, PCNT};

use reflex_core::odometry::EncoderCounts;

pub struct Encoders {
    unit_left: Unit<'static, 0>,
    unit_right: Unit<'static, 1>,
    accum_left: i32,
    accum_right: i32,
    prev_left: i16,
    prev_right: i16,
}

impl Encoders {
    pub fn init(
        pcnt: PCNT<'static>,
        left_a: GPIO8<'static>,
        left_b: GPIO9<'static>,
        right_a: GPIO10<'static>,
        right_b: GPIO11<'static>,
    ) -> Self {
        let pcnt = Pcnt::new(pcnt);

        let unit_left = pcnt.unit0;
        let unit_right = pcnt.unit1;

        // Full quadrature: each edge of A counts with direction from B, and
        // vice versa.
        let (left_a, left_b) = (left_a.into(), left_b.into());
        unit_left.channel0.set_edge_signal(left_a);
        unit_left.channel0.set_ctrl_signal(left_b);
        unit_left
            .channel0
            .set_input_mode(EdgeMode::Decrement, EdgeMode::Increment);
        unit_left
            .channel0
            .set_ctrl_mode(CtrlMode::Keep, CtrlMode::Reverse);
        unit_left.channel1.set_edge_signal(left_b);
        unit_left.channel1.set_ctrl_signal(left_a);
        unit_left
            .channel1
            .set_input_mode(EdgeMode::Increment, EdgeMode::Decrement);
        unit_left
            .channel1
            .set_ctrl_mode(CtrlMode::Keep, CtrlMode::Reverse);

        let (right_a, right_b) = (right_a.into(), right_b.into());
        unit_right.channel0.set_edge_signal(right_a);
        unit_right.channel0.set_ctrl_signal(right_b);
        unit_right
            .channel0
            .set_input_mode(EdgeMode::Decrement, EdgeMode::Increment);
        unit_right
            .channel0
            .set_ctrl_mode(CtrlMode::Keep, CtrlMode::Reverse);
        unit_right.channel1.set_edge_signal(right_b);
        unit_right.channel1.set_ctrl_signal(right_a);
        unit_right
            .channel1
            .set_input_mode(EdgeMode::Increment, EdgeMode::Decrement);
        unit_right
            .channel1
            .set_ctrl_mode(CtrlMode::Keep, CtrlMode::Reverse);

        // Reject glitches shorter than ~1 µs.
        unit_left.set_filter(Some(80)).unwrap();
        unit_right.set_filter(Some(80)).unwrap();
        unit_left.clear();
        unit_right.clear();
        unit_left.resume();
        unit_right.resume();

        log::info!("encoders initialized (L: GPIO8/9, R: GPIO10/11)");

        Self {
            unit_left,
            unit_right,
            accum_left: 0,
            accum_right: 0,
            prev_left: 0,
            prev_right: 0,
        }
    }

    /// Read both counters as close together as the bus allows, widening to
    /// the 32-bit accumulators.
    pub fn snapshot(&mut self) -> EncoderCounts {
        let l = self.unit_left.value();
        let r = self.unit_right.value();

        self.accum_left += l.wrapping_sub(self.prev_left) as i32;
        self.accum_right += r.wrapping_sub(self.prev_right) as i32;
        self.prev_left = l;
        self.prev_right = r;

        EncoderCounts {
            left: self.accum_left,
            right: self.accum_right,
        }
    }
}
