// Fault latching. Bits are additive-by-safety and cleared only by an
// explicit host CLEAR_FAULTS (OBSTACLE additionally clears itself through
// the supervisor's hysteresis). PWM output is zero whenever any bit is set.

use core::sync::atomic::{AtomicU16, Ordering};

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fault: u16 {
        const CMD_TIMEOUT = 1 << 0;
        const ESTOP       = 1 << 1;
        const TILT        = 1 << 2;
        const STALL       = 1 << 3;
        const IMU_FAIL    = 1 << 4;
        const BROWNOUT    = 1 << 5;
        const OBSTACLE    = 1 << 6;
    }
}

/// Shared fault word. Writers: safety supervisor, IMU task, host-RX task
/// (each touches disjoint bits); readers everywhere.
pub struct FaultLatch {
    bits: AtomicU16,
}

impl FaultLatch {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU16::new(0),
        }
    }

    pub fn load(&self) -> Fault {
        Fault::from_bits_truncate(self.bits.load(Ordering::Relaxed))
    }

    pub fn raw(&self) -> u16 {
        self.bits.load(Ordering::Relaxed)
    }

    /// Latch `fault`. Returns true if any bit was newly set.
    pub fn latch(&self, fault: Fault) -> bool {
        let prev = self.bits.fetch_or(fault.bits(), Ordering::Relaxed);
        prev & fault.bits() != fault.bits()
    }

    /// Clear the bits in `mask` (host CLEAR_FAULTS, or OBSTACLE release).
    pub fn clear(&self, mask: Fault) {
        self.bits.fetch_and(!mask.bits(), Ordering::Relaxed);
    }

    pub fn any(&self) -> bool {
        self.bits.load(Ordering::Relaxed) != 0
    }
}

impl Default for FaultLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_reports_new_bits_only() {
        let latch = FaultLatch::new();
        assert!(latch.latch(Fault::TILT));
        assert!(!latch.latch(Fault::TILT));
        assert!(latch.latch(Fault::TILT | Fault::STALL));
        assert_eq!(latch.load(), Fault::TILT | Fault::STALL);
    }

    #[test]
    fn clear_is_masked() {
        let latch = FaultLatch::new();
        latch.latch(Fault::OBSTACLE | Fault::ESTOP);
        latch.clear(Fault::OBSTACLE);
        assert_eq!(latch.load(), Fault::ESTOP);
    }
}
