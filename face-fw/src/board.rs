// Board support for the face MCU.
//
// ESP32-S3 with PSRAM: ILI9341 TFT on SPI2 (40 MHz), FT6236 touch on I2C0,
// WS2812 status pixel on RMT, ES8311 codec on I2S + shared I2C, host link
// over USB Serial/JTAG.

use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::i2s::master::I2s;
use esp_hal::peripherals::Peripherals;
use esp_hal::rmt::Rmt;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use esp_hal::usb_serial_jtag::UsbSerialJtag;

use crate::drivers::audio::{i2s_config, AudioRx, AudioTx, Codec};
use crate::drivers::display::Display;
use crate::drivers::led::StatusLed;
use crate::drivers::touch::TouchController;
use crate::drivers::usb::{UsbRx, UsbTx};

// ---- Pin map ----
//
//   TFT   SCK GPIO36, MOSI GPIO35, CS GPIO37, DC GPIO38, RST GPIO39, BL GPIO42
//   TOUCH SDA GPIO3, SCL GPIO4 (I2C0)
//   LED   GPIO48 (RMT ch0)
//   CODEC SDA GPIO17, SCL GPIO18 (I2C1), MCLK GPIO41,
//         BCLK GPIO14, WS GPIO21, DOUT GPIO45, DIN GPIO46, PA_EN GPIO40

pub struct Board {
    pub display: Display,
    pub touch: TouchController,
    pub led: StatusLed,
    pub codec: Codec,
    pub audio_tx: AudioTx,
    pub audio_rx: AudioRx,
    pub usb_rx: UsbRx,
    pub usb_tx: UsbTx,
}

impl Board {
    pub fn init(p: Peripherals) -> Self {
        // Display SPI at 40 MHz.
        let spi = Spi::new(
            p.SPI2,
            SpiConfig::default()
                .with_frequency(Rate::from_mhz(40))
                .with_mode(Mode::_0),
        )
        .unwrap()
        .with_sck(p.GPIO36)
        .with_mosi(p.GPIO35)
        .with_cs(p.GPIO37);

        let display = Display::init(
            spi,
            Output::new(p.GPIO38, Level::Low, OutputConfig::default()),
            Output::new(p.GPIO39, Level::High, OutputConfig::default()),
            p.LEDC,
            p.GPIO42,
        );

        let touch_i2c = I2c::new(
            p.I2C0,
            I2cConfig::default().with_frequency(Rate::from_khz(400)),
        )
        .unwrap()
        .with_sda(p.GPIO3)
        .with_scl(p.GPIO4);
        let touch = TouchController::new(touch_i2c);

        let codec_i2c = I2c::new(p.I2C1, I2cConfig::default().with_frequency(Rate::from_khz(100)))
            .unwrap()
            .with_sda(p.GPIO17)
            .with_scl(p.GPIO18);
        let codec = Codec::new(
            codec_i2c,
            Output::new(p.GPIO40, Level::Low, OutputConfig::default()),
        );

        // Status pixel.
        let rmt = Rmt::new(p.RMT, Rate::from_mhz(80)).unwrap();
        let led = StatusLed::new(rmt, p.GPIO48);

        // I2S full duplex for the codec.
        let (standard, format, rate) = i2s_config();
        let i2s = I2s::new(p.I2S0, standard, format, rate)
            .with_mclk(p.GPIO41);
        let audio_tx = AudioTx::new(
            i2s.i2s_tx
                .with_bclk(p.GPIO14)
                .with_ws(p.GPIO21)
                .with_dout(p.GPIO45)
                .build(),
        );
        let audio_rx = AudioRx::new(
            i2s.i2s_rx
                .with_bclk(unsafe { p.GPIO14.clone_unchecked() })
                .with_ws(unsafe { p.GPIO21.clone_unchecked() })
                .with_din(p.GPIO46)
                .build(),
        );

        let usb = UsbSerialJtag::new(p.USB_DEVICE).into_async();
        let (rx, tx) = usb.split();

        log::info!("board initialized");

        Self {
            display,
            touch,
            led,
            codec,
            audio_tx,
            audio_rx,
            usb_rx: UsbRx::new(rx),
            usb_tx: UsbTx::new(tx),
        }
    }
}
