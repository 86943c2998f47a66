// LSM6DSV16X over a dedicated I2C bus, with stuck-bus recovery.
//
// The read path runs at the IMU task rate; on repeated NAKs the task tears
// the controller down, clocks SCL until SDA releases, issues a STOP, and
// reinitializes.

use embedded_hal::delay::DelayNs;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Flex, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::peripherals::{GPIO1, GPIO2, I2C1};
use esp_hal::time::Rate;
use esp_hal::Blocking;

const LSM6_ADDR: u8 = 0x6A;
const REG_WHO_AM_I: u8 = 0x0F;
const WHO_AM_I_VALUE: u8 = 0x70;
const REG_CTRL1: u8 = 0x10;
const REG_CTRL2: u8 = 0x11;
const REG_CTRL3: u8 = 0x12;
const REG_OUTX_L_G: u8 = 0x22;
const REG_OUTX_L_A: u8 = 0x28;

/// Accel 240 Hz, ±2 g.
const CTRL1_VAL: u8 = 0x60;
/// Gyro 240 Hz, ±500 dps.
const CTRL2_VAL: u8 = 0x62;
/// BDU + IF_INC.
const CTRL3_VAL: u8 = 0x44;

const RECOVERY_CLK_PULSES: u8 = 9;
const RECOVERY_HALF_PERIOD_US: u32 = 5;

#[derive(Debug)]
pub struct ImuError;

pub struct ImuDriver {
    i2c: Option<I2c<'static, Blocking>>,
    i2c_periph: I2C1<'static>,
    sda: GPIO1<'static>,
    scl: GPIO2<'static>,
    delay: Delay,
}

impl ImuDriver {
    pub fn init(i2c: I2C1<'static>, sda: GPIO1<'static>, scl: GPIO2<'static>) -> Self {
        let mut drv = Self {
            i2c: None,
            // Kept for teardown/reinit across bus recovery.
            i2c_periph: unsafe { i2c.clone_unchecked() },
            sda: unsafe { sda.clone_unchecked() },
            scl: unsafe { scl.clone_unchecked() },
            delay: Delay::new(),
        };

        if !drv.controller_init() {
            log::warn!("I2C init failed, trying bus recovery");
            drv.bus_recover();
            let _ = drv.controller_init();
        }
        if !drv.configure() {
            log::error!("LSM6DSV16X configuration failed");
        }
        drv
    }

    fn controller_init(&mut self) -> bool {
        let cfg = I2cConfig::default().with_frequency(Rate::from_khz(400));
        match I2c::new(unsafe { self.i2c_periph.clone_unchecked() }, cfg) {
            Ok(bus) => {
                let bus = bus
                    .with_sda(unsafe { self.sda.clone_unchecked() })
                    .with_scl(unsafe { self.scl.clone_unchecked() });
                self.i2c = Some(bus);
                true
            }
            Err(_) => false,
        }
    }

    fn reg_write(&mut self, reg: u8, val: u8) -> Result<(), ImuError> {
        let bus = self.i2c.as_mut().ok_or(ImuError)?;
        bus.write(LSM6_ADDR, &[reg, val]).map_err(|_| ImuError)
    }

    fn reg_read(&mut self, reg: u8, out: &mut [u8]) -> Result<(), ImuError> {
        let bus = self.i2c.as_mut().ok_or(ImuError)?;
        bus.write_read(LSM6_ADDR, &[reg], out).map_err(|_| ImuError)
    }

    /// Reconfigure the sensor after power-up or recovery.
    pub fn configure(&mut self) -> bool {
        let mut who = [0u8; 1];
        if self.reg_read(REG_WHO_AM_I, &mut who).is_err() || who[0] != WHO_AM_I_VALUE {
            log::error!("WHO_AM_I failed: got 0x{:02X}", who[0]);
            return false;
        }

        // Software reset, then BDU/IF_INC, then rates.
        if self.reg_write(REG_CTRL3, 0x01).is_err() {
            return false;
        }
        self.delay.delay_ms(20);

        self.reg_write(REG_CTRL3, CTRL3_VAL).is_ok()
            && self.reg_write(REG_CTRL1, CTRL1_VAL).is_ok()
            && self.reg_write(REG_CTRL2, CTRL2_VAL).is_ok()
    }

    /// One sample cycle: gyro burst + accel burst.
    pub fn read_raw(&mut self) -> Result<([u8; 6], [u8; 6]), ImuError> {
        let mut gyro = [0u8; 6];
        let mut accel = [0u8; 6];
        self.reg_read(REG_OUTX_L_G, &mut gyro)?;
        self.reg_read(REG_OUTX_L_A, &mut accel)?;
        Ok((gyro, accel))
    }

    /// Bit-bang SCL until a stuck slave releases SDA, then STOP, then
    /// rebuild the controller and the sensor configuration.
    pub fn recover(&mut self) -> bool {
        log::warn!("attempting I2C bus recovery");
        self.bus_recover();
        if self.controller_init() && self.configure() {
            log::info!("I2C recovery + reinit succeeded");
            true
        } else {
            log::error!("I2C recovery failed, will retry next cycle");
            false
        }
    }

    fn bus_recover(&mut self) {
        // Drop the controller so the pins can be driven manually.
        self.i2c = None;

        let mut scl = Flex::new(unsafe { self.scl.clone_unchecked() });
        let mut sda = Flex::new(unsafe { self.sda.clone_unchecked() });
        scl.set_as_open_drain(Pull::Up);
        sda.set_as_open_drain(Pull::Up);

        sda.set_high();
        for i in 0..RECOVERY_CLK_PULSES {
            scl.set_low();
            self.delay.delay_us(RECOVERY_HALF_PERIOD_US);
            scl.set_high();
            self.delay.delay_us(RECOVERY_HALF_PERIOD_US);
            if sda.is_high() {
                log::info!("SDA released after {} clocks", i + 1);
                break;
            }
        }

        // STOP: SDA low → SCL high → SDA high.
        sda.set_low();
        self.delay.delay_us(RECOVERY_HALF_PERIOD_US);
        scl.set_high();
        self.delay.delay_us(RECOVERY_HALF_PERIOD_US);
        sda.set_high();
        self.delay.delay_us(RECOVERY_HALF_PERIOD_US);
    }
}
