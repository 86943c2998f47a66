// ES8311 codec bring-up + I2S transfers for the audio-capable variant.
// Queue handling, tone synthesis and the activity probe live in face-core.

use embedded_hal::delay::DelayNs;
use esp_hal::delay::Delay;
use esp_hal::gpio::Output;
use esp_hal::i2c::master::I2c;
use esp_hal::i2s::master::{DataFormat, I2sRx, I2sTx, Standard};
use esp_hal::time::Rate;
use esp_hal::Blocking;

use face_core::audio::{AudioChunk, CHUNK_SAMPLES, SAMPLE_RATE_HZ};

const ES8311_ADDR: u8 = 0x18;

pub struct Codec {
    i2c: I2c<'static, Blocking>,
    amp_enable: Output<'static>,
}

impl Codec {
    pub fn new(i2c: I2c<'static, Blocking>, amp_enable: Output<'static>) -> Self {
        Self { i2c, amp_enable }
    }

    fn write_reg(&mut self, reg: u8, val: u8) -> bool {
        self.i2c.write(ES8311_ADDR, &[reg, val]).is_ok()
    }

    /// Minimal bring-up: clocking from MCLK, 16-bit slave mode, DAC + ADC
    /// powered, mic gain 24 dB.
    pub fn init(&mut self) -> bool {
        let mut delay = Delay::new();

        // Reset, then release with clocks gated on.
        let ok = self.write_reg(0x00, 0x1F);
        delay.delay_ms(5);
        let ok = ok && self.write_reg(0x00, 0x80);
        let ok = ok
            && self.write_reg(0x01, 0x3F) // clock manager on
            && self.write_reg(0x02, 0x00) // MCLK prediv 1
            && self.write_reg(0x09, 0x0C) // SDP in: 16-bit I2S
            && self.write_reg(0x0A, 0x0C) // SDP out: 16-bit I2S
            && self.write_reg(0x0D, 0x01) // power up analog
            && self.write_reg(0x0E, 0x02) // ADC on
            && self.write_reg(0x12, 0x00) // DAC on
            && self.write_reg(0x13, 0x10) // HP drive
            && self.write_reg(0x14, 0x1A) // mic PGA +24 dB
            && self.write_reg(0x17, 0xBF) // ADC volume 0 dB
            && self.write_reg(0x32, 0xBF); // DAC volume 0 dB

        if ok {
            log::info!("ES8311 configured ({} Hz)", SAMPLE_RATE_HZ);
        } else {
            log::error!("ES8311 init failed");
        }
        ok
    }

    /// The speaker amp stays gated outside playback.
    pub fn amp(&mut self, on: bool) {
        if on {
            self.amp_enable.set_high();
        } else {
            self.amp_enable.set_low();
        }
    }
}

pub struct AudioTx {
    tx: I2sTx<'static, Blocking>,
}

pub struct AudioRx {
    rx: I2sRx<'static, Blocking>,
}

impl AudioTx {
    pub fn new(tx: I2sTx<'static, Blocking>) -> Self {
        Self { tx }
    }

    pub fn write_chunk(&mut self, chunk: &AudioChunk) -> bool {
        let mut bytes = [0u8; CHUNK_SAMPLES * 2];
        for (i, &s) in chunk.samples[..chunk.len].iter().enumerate() {
            bytes[i * 2..i * 2 + 2].copy_from_slice(&s.to_le_bytes());
        }
        self.tx.write_bytes(&bytes[..chunk.len * 2]).is_ok()
    }
}

impl AudioRx {
    pub fn new(rx: I2sRx<'static, Blocking>) -> Self {
        Self { rx }
    }

    pub fn read_chunk(&mut self) -> Option<AudioChunk> {
        let mut bytes = [0u8; CHUNK_SAMPLES * 2];
        let n = self.rx.read_bytes(&mut bytes).ok()?;
        let mut chunk = AudioChunk::default();
        chunk.len = n / 2;
        for i in 0..chunk.len {
            chunk.samples[i] = i16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        }
        Some(chunk)
    }
}

/// Standard-config helper shared by the board bring-up.
pub fn i2s_config() -> (Standard, DataFormat, Rate) {
    (
        Standard::Philips,
        DataFormat::Data16Channel16,
        Rate::from_hz(SAMPLE_RATE_HZ),
    )
}
