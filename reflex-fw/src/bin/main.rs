#![no_std]
#![no_main]

use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::system::{CpuControl, Stack};
use esp_hal::timer::timg::TimerGroup;
use log::info;

use embassy_executor::Executor;
use static_cell::StaticCell;

use reflex_fw::board::Board;
use reflex_fw::shared;
use reflex_fw::tasks::{self, WatchdogFeed};

esp_bootloader_esp_idf::esp_app_desc!();

static IO_EXECUTOR: StaticCell<Executor> = StaticCell::new();
static CORE0_EXECUTOR: StaticCell<Executor> = StaticCell::new();
static APP_CORE_STACK: StaticCell<Stack<8192>> = StaticCell::new();

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    info!("booting...");

    shared::config_init();

    let timg0 = TimerGroup::new(unsafe { peripherals.TIMG0.clone_unchecked() });
    esp_rtos::start(timg0.timer0);

    // Control-task watchdog: a missed deadline resets the MCU.
    let timg1 = TimerGroup::new(unsafe { peripherals.TIMG1.clone_unchecked() });
    let mut wdt = timg1.wdt;
    wdt.set_timeout(
        esp_hal::timer::timg::MwdtStage::Stage0,
        esp_hal::time::Duration::from_millis(200),
    );
    wdt.enable();

    let mut cpu_control = CpuControl::new(unsafe { peripherals.CPU_CTRL.clone_unchecked() });
    let board = Board::init(peripherals);
    info!("hardware initialized");

    let Board {
        motors,
        standby,
        encoders,
        imu,
        range,
        usb_rx,
        usb_tx,
    } = board;

    // Core 1: host-RX, telemetry, rangefinder.
    let stack = APP_CORE_STACK.init(Stack::new());
    let _guard = cpu_control
        .start_app_core(stack, move || {
            let executor = IO_EXECUTOR.init(Executor::new());
            executor.run(|spawner| {
                spawner.spawn(tasks::usb_rx_task(usb_rx)).unwrap();
                spawner.spawn(tasks::telemetry_task(usb_tx)).unwrap();
                spawner.spawn(tasks::range_task(range)).unwrap();
            });
        })
        .unwrap();

    // Core 0: the deterministic loop set, control at the highest priority.
    let executor = CORE0_EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner
            .spawn(tasks::control_task(motors, encoders, WatchdogFeed { wdt }))
            .unwrap();
        spawner.spawn(tasks::imu_task(imu)).unwrap();
        spawner.spawn(tasks::safety_task(standby)).unwrap();
    })
}
