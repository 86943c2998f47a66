// ILI9341 over SPI, landscape 320x240, RGB565. The renderer hands us a
// dirty rectangle; only that window goes over the bus.

use embassy_time::{Duration, Timer};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use esp_hal::gpio::Output;
use esp_hal::ledc::channel::{self, Channel, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{Ledc, LowSpeed};
use esp_hal::peripherals::{GPIO42, LEDC};
use esp_hal::spi::master::Spi;
use esp_hal::time::Rate;
use esp_hal::Blocking;
use static_cell::StaticCell;

use face_core::config::{SCREEN_H, SCREEN_W};
use face_core::Framebuffer;

// Command subset used by this panel.
const CMD_SLEEP_OUT: u8 = 0x11;
const CMD_DISPLAY_ON: u8 = 0x29;
const CMD_CASET: u8 = 0x2A;
const CMD_PASET: u8 = 0x2B;
const CMD_RAMWR: u8 = 0x2C;
const CMD_MADCTL: u8 = 0x36;
const CMD_PIXFMT: u8 = 0x3A;

/// Landscape, BGR panel order.
const MADCTL_LANDSCAPE: u8 = 0x28;
/// 16 bpp.
const PIXFMT_RGB565: u8 = 0x55;

static BL_LEDC: StaticCell<Ledc<'static>> = StaticCell::new();
static BL_TIMER: StaticCell<timer::Timer<'static, LowSpeed>> = StaticCell::new();

pub struct Display {
    spi: Spi<'static, Blocking>,
    dc: Output<'static>,
    rst: Output<'static>,
    backlight: Channel<'static, LowSpeed>,
    row_buf: [u8; (SCREEN_W as usize) * 2],
}

impl Display {
    pub fn init(
        spi: Spi<'static, Blocking>,
        dc: Output<'static>,
        rst: Output<'static>,
        ledc: LEDC<'static>,
        backlight_pin: GPIO42<'static>,
    ) -> Self {
        let ledc = BL_LEDC.init(Ledc::new(ledc));
        let bl_timer = BL_TIMER.init(ledc.timer::<LowSpeed>(timer::Number::Timer1));
        bl_timer
            .configure(timer::config::Config {
                duty: timer::config::Duty::Duty8Bit,
                clock_source: timer::LSClockSource::APBClk,
                frequency: Rate::from_khz(5),
            })
            .unwrap();
        let mut backlight = ledc.channel(channel::Number::Channel2, backlight_pin);
        backlight
            .configure(channel::config::Config {
                timer: bl_timer,
                duty_pct: 0,
                pin_config: channel::config::PinConfig::PushPull,
            })
            .unwrap();

        Self {
            spi,
            dc,
            rst,
            backlight,
            row_buf: [0; (SCREEN_W as usize) * 2],
        }
    }

    pub async fn panel_init(&mut self) {
        self.rst.set_low();
        Timer::after(Duration::from_millis(10)).await;
        self.rst.set_high();
        Timer::after(Duration::from_millis(120)).await;

        self.command(CMD_SLEEP_OUT, &[]);
        Timer::after(Duration::from_millis(120)).await;
        self.command(CMD_MADCTL, &[MADCTL_LANDSCAPE]);
        self.command(CMD_PIXFMT, &[PIXFMT_RGB565]);
        self.command(CMD_DISPLAY_ON, &[]);

        log::info!("panel initialized ({}x{})", SCREEN_W, SCREEN_H);
    }

    fn command(&mut self, cmd: u8, args: &[u8]) {
        self.dc.set_low();
        let _ = self.spi.write(&[cmd]);
        if !args.is_empty() {
            self.dc.set_high();
            let _ = self.spi.write(args);
        }
    }

    fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) {
        self.command(
            CMD_CASET,
            &[(x0 >> 8) as u8, x0 as u8, (x1 >> 8) as u8, x1 as u8],
        );
        self.command(
            CMD_PASET,
            &[(y0 >> 8) as u8, y0 as u8, (y1 >> 8) as u8, y1 as u8],
        );
    }

    /// Commit one dirty rectangle from the framebuffer to the panel.
    pub fn flush(&mut self, fb: &Framebuffer, dirty: Rectangle) {
        if dirty.size.width == 0 || dirty.size.height == 0 {
            return;
        }
        let x0 = dirty.top_left.x.max(0);
        let y0 = dirty.top_left.y.max(0);
        let x1 = (dirty.top_left.x + dirty.size.width as i32 - 1).min(SCREEN_W - 1);
        let y1 = (dirty.top_left.y + dirty.size.height as i32 - 1).min(SCREEN_H - 1);

        self.set_window(x0 as u16, y0 as u16, x1 as u16, y1 as u16);
        self.command(CMD_RAMWR, &[]);
        self.dc.set_high();

        let words = fb.as_words();
        let row_px = (x1 - x0 + 1) as usize;
        for y in y0..=y1 {
            let start = (y * SCREEN_W + x0) as usize;
            for (i, &px) in words[start..start + row_px].iter().enumerate() {
                // Panel expects big-endian RGB565.
                self.row_buf[i * 2] = (px >> 8) as u8;
                self.row_buf[i * 2 + 1] = px as u8;
            }
            let _ = self.spi.write(&self.row_buf[..row_px * 2]);
        }
    }

    pub fn set_backlight(&mut self, level: u8) {
        let _ = self.backlight.set_duty_hw(level as u32);
    }
}
