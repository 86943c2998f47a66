// Face MCU image: board bring-up + embassy tasks around face-core.

#![no_std]

extern crate alloc;

pub mod board;
pub mod drivers;
pub mod shared;
pub mod tasks;
