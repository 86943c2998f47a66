// Single WS2812 status neopixel on an RMT TX channel.
//
// 800 kHz protocol at 80 MHz RMT clock: 0 = 0.4 µs high / 0.85 µs low,
// 1 = 0.8 µs high / 0.45 µs low.

use esp_hal::gpio::interconnect::PeripheralOutput;
use esp_hal::rmt::{PulseCode, Rmt, TxChannel, TxChannelConfig, TxChannelCreator};
use esp_hal::Blocking;

const T0H: u16 = 32; // 0.4 µs @ 80 MHz
const T0L: u16 = 68;
const T1H: u16 = 64;
const T1L: u16 = 36;

pub struct StatusLed {
    channel: Option<esp_hal::rmt::Channel<Blocking, 0>>,
    last: (u8, u8, u8),
}

impl StatusLed {
    pub fn new(rmt: Rmt<'static, Blocking>, pin: impl PeripheralOutput<'static>) -> Self {
        let channel = rmt
            .channel0
            .configure(
                pin,
                TxChannelConfig::default().with_clk_divider(1),
            )
            .unwrap();
        Self {
            channel: Some(channel),
            last: (1, 1, 1),
        }
    }

    pub fn set_rgb(&mut self, r: u8, g: u8, b: u8) {
        if (r, g, b) == self.last {
            return;
        }
        self.last = (r, g, b);

        // GRB bit order, MSB first, then the reset latch.
        let grb = ((g as u32) << 16) | ((r as u32) << 8) | b as u32;
        let mut pulses = [PulseCode::empty(); 25];
        for (i, slot) in pulses.iter_mut().take(24).enumerate() {
            let bit = (grb >> (23 - i)) & 1;
            *slot = if bit == 1 {
                PulseCode::new(true, T1H, false, T1L)
            } else {
                PulseCode::new(true, T0H, false, T0L)
            };
        }
        pulses[24] = PulseCode::new(false, 4000, false, 0); // >50 µs latch

        if let Some(ch) = self.channel.take() {
            if let Ok(tx) = ch.transmit(&pulses) {
                match tx.wait() {
                    Ok(ch) => self.channel = Some(ch),
                    Err((_, ch)) => self.channel = Some(ch),
                }
            }
        }
    }
}
