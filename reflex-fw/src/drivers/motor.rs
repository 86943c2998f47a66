// TB6612 H-bridge: signed duty → direction pins + LEDC PWM.
//
// PWM and direction are written only by the control task. The standby line
// lives in its own handle so the safety task can hard-kill independently.

use esp_hal::gpio::Output;
use esp_hal::ledc::channel::{self, Channel, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{Ledc, LowSpeed};
use esp_hal::peripherals::{GPIO15, GPIO5, LEDC};
use esp_hal::time::Rate;
use static_cell::StaticCell;

use reflex_core::config::PWM_MAX_DUTY;
use reflex_core::control::ControlOutputs;

static LEDC_CELL: StaticCell<Ledc<'static>> = StaticCell::new();
static TIMER_CELL: StaticCell<timer::Timer<'static, LowSpeed>> = StaticCell::new();

pub struct Motors {
    ch_left: Channel<'static, LowSpeed>,
    ch_right: Channel<'static, LowSpeed>,
    // [fwd, rev] per side
    dir_left: (Output<'static>, Output<'static>),
    dir_right: (Output<'static>, Output<'static>),
}

impl Motors {
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        ledc: LEDC<'static>,
        pwm_a: GPIO5<'static>,
        pwm_b: GPIO15<'static>,
        ain1: Output<'static>,
        ain2: Output<'static>,
        bin1: Output<'static>,
        bin2: Output<'static>,
        pwm_freq_hz: u16,
    ) -> Self {
        let ledc = LEDC_CELL.init(Ledc::new(ledc));
        let lstimer = TIMER_CELL.init(ledc.timer::<LowSpeed>(timer::Number::Timer0));
        lstimer
            .configure(timer::config::Config {
                duty: timer::config::Duty::Duty10Bit,
                clock_source: timer::LSClockSource::APBClk,
                frequency: Rate::from_hz(pwm_freq_hz as u32),
            })
            .unwrap();

        let mut ch_left = ledc.channel(channel::Number::Channel0, pwm_a);
        ch_left
            .configure(channel::config::Config {
                timer: lstimer,
                duty_pct: 0,
                pin_config: channel::config::PinConfig::PushPull,
            })
            .unwrap();
        let mut ch_right = ledc.channel(channel::Number::Channel1, pwm_b);
        ch_right
            .configure(channel::config::Config {
                timer: lstimer,
                duty_pct: 0,
                pin_config: channel::config::PinConfig::PushPull,
            })
            .unwrap();

        log::info!("LEDC PWM initialized @ {} Hz, 10-bit", pwm_freq_hz);

        Self {
            ch_left,
            ch_right,
            dir_left: (ain1, ain2),
            dir_right: (bin1, bin2),
        }
    }

    fn set_side(
        ch: &mut Channel<'static, LowSpeed>,
        dir: &mut (Output<'static>, Output<'static>),
        duty: f32,
        max_pwm: u16,
    ) {
        let forward = duty >= 0.0;
        let mut magnitude = if forward { duty } else { -duty } as u16;
        if magnitude > max_pwm {
            magnitude = max_pwm;
        }

        // TB6612: IN1=H IN2=L forward, IN1=L IN2=H reverse.
        if forward {
            dir.0.set_high();
            dir.1.set_low();
        } else {
            dir.0.set_low();
            dir.1.set_high();
        }
        let _ = ch.set_duty_hw(magnitude as u32);
    }

    /// Apply one control tick's outputs.
    pub fn apply(&mut self, out: &ControlOutputs, max_pwm: u16) {
        Self::set_side(&mut self.ch_left, &mut self.dir_left, out.duty_l, max_pwm);
        Self::set_side(&mut self.ch_right, &mut self.dir_right, out.duty_r, max_pwm);
    }

    /// Short-brake: both inputs high, duty zero.
    pub fn brake(&mut self) {
        for dir in [&mut self.dir_left, &mut self.dir_right] {
            dir.0.set_high();
            dir.1.set_high();
        }
        let _ = self.ch_left.set_duty_hw(0);
        let _ = self.ch_right.set_duty_hw(0);
    }

    pub fn max_duty() -> u16 {
        PWM_MAX_DUTY
    }
}

/// H-bridge standby line. Owned by the safety task; low = driver disabled.
pub struct StandbyPin {
    pin: Output<'static>,
}

impl StandbyPin {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }

    pub fn enable(&mut self) {
        self.pin.set_high();
        log::info!("motors ENABLED (STBY high)");
    }

    pub fn kill(&mut self) {
        self.pin.set_low();
        log::warn!("HARD KILL (STBY low)");
    }

    pub fn is_enabled(&self) -> bool {
        self.pin.is_set_high()
    }
}
