//! Board configuration.
//!
//! Defaults are the values the firmware boots with. Hosts may deserialize a
//! partial document on top of them; `validate` applies the same bounds the
//! command grammar enforces.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use super::error::{Interval, RangeError};
use crate::utils::math::fluidics::{FINETUNE_FAST, PERISTALTIC_MAX_MICROSTEP};

/// Default I2C address of the proportional-valve DAC.
pub const DAC_ADDRESS: u8 = 0x61;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Syringe cruise speed (microsteps/s).
    pub syringe_speed: f32,
    /// Syringe acceleration handed to the motion collaborator (microsteps/s²).
    pub syringe_acceleration: f32,
    pub peristaltic_speed: f32,
    pub peristaltic_acceleration: f32,
    /// Pressure (kPa) mapped to the DAC full-scale code.
    pub max_pressure: u16,
    pub brightness: u8,
    pub dac_address: u8,
    /// How long a switch-valve request waits for its reply.
    pub reply_window_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            syringe_speed: 3200.0,
            syringe_acceleration: 200_000.0,
            peristaltic_speed: 800.0,
            peristaltic_acceleration: 40_000.0,
            max_pressure: 100,
            brightness: 200,
            dac_address: DAC_ADDRESS,
            reply_window_ms: 1000,
        }
    }
}

impl BoardConfig {
    pub fn reply_window(&self) -> Duration {
        Duration::from_millis(self.reply_window_ms)
    }

    /// Reject values the command grammar would also reject.
    pub fn validate(&self) -> Result<(), RangeError> {
        RangeError::check(
            "syringe speed",
            Interval::LeftOpen(0.0, FINETUNE_FAST),
            " steps/s",
            self.syringe_speed,
        )?;
        RangeError::check(
            "peristaltic speed",
            Interval::LeftOpen(0.0, PERISTALTIC_MAX_MICROSTEP),
            " steps/s",
            self.peristaltic_speed,
        )?;
        RangeError::check(
            "syringe acceleration",
            Interval::Positive,
            " steps/s2",
            self.syringe_acceleration,
        )?;
        RangeError::check(
            "peristaltic acceleration",
            Interval::Positive,
            " steps/s2",
            self.peristaltic_acceleration,
        )?;
        RangeError::check(
            "max pressure",
            Interval::LeftOpen(0.0, 500.0),
            " kPa",
            f32::from(self.max_pressure),
        )?;
        RangeError::check(
            "reply window",
            Interval::LeftOpen(0.0, 60_000.0),
            " ms",
            self.reply_window_ms as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BoardConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.reply_window(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: BoardConfig =
            serde_json::from_str(r#"{ "max_pressure": 250, "brightness": 32 }"#).unwrap();
        assert_eq!(config.max_pressure, 250);
        assert_eq!(config.brightness, 32);
        assert_eq!(config.syringe_speed, 3200.0);
    }

    #[test]
    fn test_validate_rejects_out_of_bounds() {
        let config = BoardConfig {
            max_pressure: 0,
            ..BoardConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BoardConfig {
            syringe_speed: 1.0e6,
            ..BoardConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
