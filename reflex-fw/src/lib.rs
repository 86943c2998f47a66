// Reflex MCU image: board bring-up + embassy tasks around reflex-core.

#![no_std]

pub mod board;
pub mod drivers;
pub mod shared;
pub mod tasks;
