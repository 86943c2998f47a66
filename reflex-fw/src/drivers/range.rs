// Ultrasonic rangefinder: 10 µs trigger pulse, echo width captured by an
// RMT receive channel at 1 µs resolution.

use embassy_time::{with_timeout, Duration};
use esp_hal::gpio::Output;
use esp_hal::peripherals::{GPIO13, RMT};
use esp_hal::rmt::{PulseCode, Rmt, RxChannelAsync, RxChannelConfig, RxChannelCreatorAsync};
use esp_hal::time::Rate;
use esp_hal::Async;

use reflex_core::range::RangeSample;

const RMT_RESOLUTION_HZ: u32 = 1_000_000;
const RX_SYMBOLS: usize = 64;

pub struct RangeDriver {
    trig: Output<'static>,
    rx: esp_hal::rmt::Channel<Async, 4>,
}

impl RangeDriver {
    pub fn init(rmt: RMT<'static>, trig: Output<'static>, echo: GPIO13<'static>) -> Self {
        let rmt = Rmt::new(rmt, Rate::from_hz(RMT_RESOLUTION_HZ))
            .unwrap()
            .into_async();
        let rx = rmt
            .channel4
            .configure(
                echo,
                RxChannelConfig::default()
                    .with_filter_threshold(1)
                    .with_idle_threshold(0x7FFF),
            )
            .unwrap();

        log::info!("range sensor initialized (TRIG=GPIO12, ECHO=GPIO13)");
        Self { trig, rx }
    }

    /// One trigger-and-measure cycle. The echo line's first high-level
    /// symbol carries the round-trip time.
    pub async fn measure(&mut self, timeout_us: u32, now_us: u32) -> RangeSample {
        let mut symbols: [u32; RX_SYMBOLS] = [PulseCode::empty(); RX_SYMBOLS];

        // Arm capture before the trigger so the echo edge cannot be missed.
        let capture = self.rx.receive(&mut symbols);

        self.trig.set_high();
        embassy_time::block_for(Duration::from_micros(10));
        self.trig.set_low();

        let wait = Duration::from_micros(timeout_us as u64 + 10_000);
        match with_timeout(wait, capture).await {
            Ok(Ok(())) => {
                // First high-level duration in the captured train.
                let mut echo_us = 0u32;
                for sym in symbols.iter() {
                    if sym.length1() == 0 && sym.length2() == 0 {
                        break;
                    }
                    if sym.level1() {
                        echo_us = sym.length1() as u32;
                        break;
                    }
                    if sym.level2() {
                        echo_us = sym.length2() as u32;
                        break;
                    }
                }
                RangeSample::from_echo(echo_us, timeout_us, now_us)
            }
            _ => RangeSample::timeout(now_us),
        }
    }
}
