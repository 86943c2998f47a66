// FT6236 capacitive touch controller (I2C). Polled by the touch task; the
// press/drag/release edges are synthesized from consecutive reads.

use esp_hal::i2c::master::I2c;
use esp_hal::Blocking;

const FT6236_ADDR: u8 = 0x38;
const REG_TD_STATUS: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTouch {
    pub x: u16,
    pub y: u16,
}

pub struct TouchController {
    i2c: I2c<'static, Blocking>,
}

impl TouchController {
    pub fn new(i2c: I2c<'static, Blocking>) -> Self {
        Self { i2c }
    }

    /// Latest touch point, None when the panel is untouched.
    pub fn read(&mut self) -> Option<RawTouch> {
        // TD_STATUS + P1 registers in one burst: count, XH, XL, YH, YL.
        let mut buf = [0u8; 5];
        if self
            .i2c
            .write_read(FT6236_ADDR, &[REG_TD_STATUS], &mut buf)
            .is_err()
        {
            return None;
        }

        let touches = buf[0] & 0x0F;
        if touches == 0 {
            return None;
        }

        let x = (((buf[1] & 0x0F) as u16) << 8) | buf[2] as u16;
        let y = (((buf[3] & 0x0F) as u16) << 8) | buf[4] as u16;
        Some(RawTouch { x, y })
    }
}
