#![no_std]
#![no_main]

use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::system::{CpuControl, Stack};
use esp_hal::timer::timg::TimerGroup;
use log::info;

use embassy_executor::Executor;
use static_cell::StaticCell;

use face_fw::board::Board;
use face_fw::tasks;

esp_bootloader_esp_idf::esp_app_desc!();

static IO_EXECUTOR: StaticCell<Executor> = StaticCell::new();
static CORE0_EXECUTOR: StaticCell<Executor> = StaticCell::new();
static APP_CORE_STACK: StaticCell<Stack<8192>> = StaticCell::new();

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Framebuffer + afterglow shadow live on the external RAM heap.
    esp_alloc::psram_allocator!(peripherals.PSRAM, esp_hal);

    info!("booting...");

    let timg0 = TimerGroup::new(unsafe { peripherals.TIMG0.clone_unchecked() });
    esp_rtos::start(timg0.timer0);

    let mut cpu_control = CpuControl::new(unsafe { peripherals.CPU_CTRL.clone_unchecked() });
    let board = Board::init(peripherals);
    info!("hardware initialized");

    let Board {
        display,
        touch,
        led,
        codec,
        audio_tx,
        audio_rx,
        usb_rx,
        usb_tx,
    } = board;

    // Core 1: host link, telemetry, touch polling, audio workers.
    let stack = APP_CORE_STACK.init(Stack::new());
    let _guard = cpu_control
        .start_app_core(stack, move || {
            let executor = IO_EXECUTOR.init(Executor::new());
            executor.run(|spawner| {
                spawner.spawn(tasks::usb_rx_task(usb_rx)).unwrap();
                spawner.spawn(tasks::telemetry_task(usb_tx)).unwrap();
                spawner.spawn(tasks::touch_task(touch)).unwrap();
                spawner.spawn(tasks::speaker_task(codec, audio_tx)).unwrap();
                spawner.spawn(tasks::mic_task(audio_rx)).unwrap();
            });
        })
        .unwrap();

    // Core 0: the frame-paced animation + render loop.
    let executor = CORE0_EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(tasks::face_task(display, led)).unwrap();
    })
}
