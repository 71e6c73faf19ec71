//! Utility re-exports for the control board.
//!
//! - `connection`: command intake (line assembly, normalization, the inbound
//!   channel) and the outbound message sink
//! - `controllers`: the board controller, command dispatch and peripheral drivers
//! - `math`: pump geometry and unit conversions

pub mod connection;
pub mod controllers;
pub mod math;

pub use connection::console::{submit_line, LineAssembler, COMMAND_CHANNEL};
pub use connection::sink::{Message, Transport};
pub use controllers::{BoardConfig, BoardDrivers, BoardParts, ControlBoard};
pub use embassy_time::Duration;
