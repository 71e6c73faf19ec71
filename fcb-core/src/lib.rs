//! Command dispatch and peripheral drivers for a fluidics/lighting control board
//! on no-std embedded platforms.
//!
//! For a desktop run against simulated peripherals, see `fcb-app/mock-board`.
#![no_std]

extern crate alloc;

#[cfg(test)]
use critical_section as _;

pub mod utils;
