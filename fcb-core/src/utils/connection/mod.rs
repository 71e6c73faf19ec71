//! Module Exports
//!
//! This file exports the modules that move text between the transports and the
//! board controller.
//!
//! # Modules
//! - `console`: line assembly, normalization, tokenizing and the inbound command
//!   channel.
//! - `sink`: the outbound message buffer and the `Transport` trait it drains to.

pub mod console;
pub mod sink;
