// Board support: pin map and peripheral bring-up for the drive base.
//
// ESP32-S3, TB6612 H-bridge, two quadrature encoders, LSM6DSV16X on a
// dedicated I2C bus, HC-SR04 style rangefinder on RMT capture, host link
// over the built-in USB Serial/JTAG.

use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::peripherals::Peripherals;
use esp_hal::usb_serial_jtag::UsbSerialJtag;

use crate::drivers::encoder::Encoders;
use crate::drivers::imu::ImuDriver;
use crate::drivers::motor::{Motors, StandbyPin};
use crate::drivers::range::RangeDriver;
use crate::drivers::usb::{UsbRx, UsbTx};

// ---- Pin map ----
//
//   PWMA  GPIO5    AIN1 GPIO6    AIN2 GPIO7
//   PWMB  GPIO15   BIN1 GPIO16   BIN2 GPIO17
//   STBY  GPIO18
//   ENC_L A/B GPIO8/GPIO9, ENC_R A/B GPIO10/GPIO11
//   IMU   SDA GPIO1, SCL GPIO2 (I2C1, 400 kHz)
//   RANGE TRIG GPIO12, ECHO GPIO13 (RMT RX, 1 MHz resolution)

pub struct Board {
    pub motors: Motors,
    pub standby: StandbyPin,
    pub encoders: Encoders,
    pub imu: ImuDriver,
    pub range: RangeDriver,
    pub usb_rx: UsbRx,
    pub usb_tx: UsbTx,
}

impl Board {
    pub fn init(p: Peripherals) -> Self {
        let cfg = reflex_core::config::ReflexConfig::default();

        let motors = Motors::init(
            p.LEDC,
            p.GPIO5,
            p.GPIO15,
            Output::new(p.GPIO6, Level::Low, OutputConfig::default()),
            Output::new(p.GPIO7, Level::Low, OutputConfig::default()),
            Output::new(p.GPIO16, Level::Low, OutputConfig::default()),
            Output::new(p.GPIO17, Level::Low, OutputConfig::default()),
            cfg.pwm_freq_hz,
        );
        let standby = StandbyPin::new(Output::new(p.GPIO18, Level::Low, OutputConfig::default()));

        let encoders = Encoders::init(p.PCNT, p.GPIO8, p.GPIO9, p.GPIO10, p.GPIO11);

        let imu = ImuDriver::init(p.I2C1, p.GPIO1, p.GPIO2);

        let range = RangeDriver::init(
            p.RMT,
            Output::new(p.GPIO12, Level::Low, OutputConfig::default()),
            p.GPIO13,
        );

        let usb = UsbSerialJtag::new(p.USB_DEVICE).into_async();
        let (rx, tx) = usb.split();

        log::info!("board initialized");

        Self {
            motors,
            standby,
            encoders,
            imu,
            range,
            usb_rx: UsbRx::new(rx),
            usb_tx: UsbTx::new(tx),
        }
    }
}
