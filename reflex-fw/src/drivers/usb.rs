// Host link over the built-in USB Serial/JTAG peripheral.

use embedded_io_async::{Read, Write};
use esp_hal::usb_serial_jtag::{UsbSerialJtagRx, UsbSerialJtagTx};
use esp_hal::Async;

pub struct UsbRx {
    rx: UsbSerialJtagRx<'static, Async>,
}

impl UsbRx {
    pub fn new(rx: UsbSerialJtagRx<'static, Async>) -> Self {
        Self { rx }
    }

    /// Read whatever is available into `buf`.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> usize {
        self.rx.read(buf).await.unwrap_or(0)
    }
}

pub struct UsbTx {
    tx: UsbSerialJtagTx<'static, Async>,
}

impl UsbTx {
    pub fn new(tx: UsbSerialJtagTx<'static, Async>) -> Self {
        Self { tx }
    }

    /// Best-effort write; a detached host simply drops bytes.
    pub async fn write_all(&mut self, data: &[u8]) {
        let _ = self.tx.write_all(data).await;
    }
}
