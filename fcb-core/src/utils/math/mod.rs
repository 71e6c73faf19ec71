//! Math utilities for the control board.
//!
//! This module provides the fluid-geometry conversions shared by the syringe and
//! peristaltic pumps.

pub mod fluidics;
