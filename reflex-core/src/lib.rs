// Deterministic locomotion core for the Reflex MCU.
//
// Everything here is hardware-free: the firmware tasks feed in encoder
// counts, IMU samples, range measurements and host commands, and apply the
// duty/direction outputs to the H-bridge. All cross-task state follows the
// single-writer rule (double-buffered pointer swaps, one seqlock).

#![no_std]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod control;
pub mod faults;
pub mod imu;
pub mod odometry;
pub mod range;
pub mod safety;
pub mod shared;

pub use config::ReflexConfig;
pub use control::ControlLoop;
pub use faults::{Fault, FaultLatch};
pub use safety::SafetySupervisor;
