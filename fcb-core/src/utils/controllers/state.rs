//! Peripheral state store.
//!
//! `PeripheralState` is the single authoritative record of what every peripheral
//! has been told to do. It is owned by the `ControlBoard` and mutated only while
//! dispatching; every setter validates before it writes.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::{
    config::BoardConfig,
    error::{FormatError, Interval, RangeError},
};

/// Stepper pump status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PumpState {
    /// Cruise speed in microsteps/s, always positive.
    pub speed: f32,
    pub moving: bool,
}

/// Open/closed state of the eight solenoid channels; bit `i` is channel `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolenoidMask(u8);

impl SolenoidMask {
    pub const CHANNELS: u8 = 8;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    fn check_channel(channel: i32) -> Result<u8, RangeError> {
        RangeError::check(
            "solenoid channel",
            Interval::Closed(1.0, f32::from(Self::CHANNELS)),
            "",
            channel as f32,
        )?;
        Ok(channel as u8)
    }

    /// Whether `channel` (1..=8) is open. Channels outside the bank read as closed.
    pub fn is_open(
        self,
        channel: u8,
    ) -> bool {
        (1..=Self::CHANNELS).contains(&channel) && self.0 & (1 << (channel - 1)) != 0
    }

    /// Open or close one channel, leaving the others untouched.
    pub fn set_channel(
        &mut self,
        channel: i32,
        open: bool,
    ) -> Result<(), RangeError> {
        let bit = 1u8 << (Self::check_channel(channel)? - 1);
        if open {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
        Ok(())
    }

    /// Mask from a decimal value in `0..=255`.
    pub fn from_decimal(value: i32) -> Result<Self, RangeError> {
        RangeError::check("solenoid mask", Interval::Closed(0.0, 255.0), "", value as f32)?;
        Ok(Self(value as u8))
    }

    /// Mask from exactly eight `0`/`1` characters, channel 8 first.
    pub fn parse_binary(text: &str) -> Result<Self, FormatError> {
        if text.len() != 8 || !text.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(FormatError::Binary);
        }
        u8::from_str_radix(text, 2).map(Self).map_err(|_| FormatError::Binary)
    }

    /// Mask from exactly two hex characters.
    pub fn parse_hex(text: &str) -> Result<Self, FormatError> {
        if text.len() != 2 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FormatError::Hex);
        }
        u8::from_str_radix(text, 16).map(Self).map_err(|_| FormatError::Hex)
    }

    /// `(channel, open)` pairs for channels 1 through 8.
    pub fn channels(self) -> impl Iterator<Item = (u8, bool)> {
        (1..=Self::CHANNELS).map(move |ch| (ch, self.is_open(ch)))
    }
}

impl fmt::Display for SolenoidMask {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("solenoid valves:")?;
        for (channel, open) in self.channels() {
            write!(f, " ch{channel} {}", if open { "open" } else { "closed" })?;
        }
        Ok(())
    }
}

/// Proportional valve pressure record (kPa). `current <= max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureState {
    max: u16,
    current: u16,
}

impl PressureState {
    pub const MAX_RATED: u16 = 500;
    /// DAC full-scale code.
    pub const DAC_MAX_CODE: u16 = 4095;

    pub fn new(max: i32) -> Result<Self, RangeError> {
        Self::check_max(max)?;
        Ok(Self {
            max: max as u16,
            current: 0,
        })
    }

    fn check_max(max: i32) -> Result<(), RangeError> {
        RangeError::check(
            "max pressure",
            Interval::LeftOpen(0.0, f32::from(Self::MAX_RATED)),
            " kPa",
            max as f32,
        )
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn current(&self) -> u16 {
        self.current
    }

    /// Record a new maximum. A current pressure above it is pulled down to it;
    /// returns `true` when that happened.
    pub fn set_max(
        &mut self,
        max: i32,
    ) -> Result<bool, RangeError> {
        Self::check_max(max)?;
        self.max = max as u16;
        let clamped = self.current > self.max;
        if clamped {
            self.current = self.max;
        }
        Ok(clamped)
    }

    pub fn set_current(
        &mut self,
        pressure: i32,
    ) -> Result<(), RangeError> {
        RangeError::check(
            "pressure",
            Interval::Closed(0.0, f32::from(self.max)),
            " kPa",
            pressure as f32,
        )?;
        self.current = pressure as u16;
        Ok(())
    }

    /// 12-bit DAC code for the current pressure: `round(current / max * 4096)`,
    /// clamped to the full-scale code.
    pub fn dac_code(&self) -> u16 {
        let proportion = f32::from(self.current) / f32::from(self.max);
        let code = libm::roundf(proportion * 4096.0) as u16;
        code.min(Self::DAC_MAX_CODE)
    }
}

/// LED array status. Brightness is kept while the array is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub brightness: u8,
    pub on: bool,
}

/// Authoritative state of all six peripherals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeripheralState {
    pub syringe: PumpState,
    pub peristaltic: PumpState,
    /// Current switch-valve channel: 0 when unknown or after a reset, else 1..=6.
    pub switch_channel: u8,
    pub solenoids: SolenoidMask,
    pub pressure: PressureState,
    pub light: LightState,
}

impl PeripheralState {
    /// Firmware defaults taken from an already validated configuration.
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            syringe: PumpState {
                speed: config.syringe_speed,
                moving: false,
            },
            peristaltic: PumpState {
                speed: config.peristaltic_speed,
                moving: false,
            },
            switch_channel: 0,
            solenoids: SolenoidMask::default(),
            pressure: PressureState {
                max: config.max_pressure,
                current: 0,
            },
            light: LightState {
                brightness: config.brightness,
                on: false,
            },
        }
    }

    /// Whether either pump has a move in flight.
    pub fn any_pump_moving(&self) -> bool {
        self.syringe.moving || self.peristaltic.moving
    }
}

impl Default for PeripheralState {
    fn default() -> Self {
        Self::new(&BoardConfig::default())
    }
}
