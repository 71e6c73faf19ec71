//! Rejection reasons for dispatched commands.
//!
//! The `Display` text of each error is exactly the line the operator sees.

use alloc::string::String;
use core::fmt;

use super::dispatch::Subsystem;

/// Accepted interval of a numeric argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interval {
    /// `[lo, hi]`
    Closed(f32, f32),
    /// `(lo, hi]`
    LeftOpen(f32, f32),
    /// `(0, inf)`
    Positive,
}

impl Interval {
    pub fn contains(
        &self,
        value: f32,
    ) -> bool {
        match *self {
            Interval::Closed(lo, hi) => value >= lo && value <= hi,
            Interval::LeftOpen(lo, hi) => value > lo && value <= hi,
            Interval::Positive => value > 0.0,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Interval::Closed(lo, hi) => write!(f, "[{lo}, {hi}]"),
            Interval::LeftOpen(lo, hi) => write!(f, "({lo}, {hi}]"),
            Interval::Positive => f.write_str("(0, inf)"),
        }
    }
}

/// A numeric argument fell outside its bound.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("{quantity} must be within {interval}{unit}")]
pub struct RangeError {
    pub quantity: &'static str,
    pub interval: Interval,
    /// Unit suffix including its leading space, or empty.
    pub unit: &'static str,
}

impl RangeError {
    /// Check `value` against `interval`.
    pub fn check(
        quantity: &'static str,
        interval: Interval,
        unit: &'static str,
        value: f32,
    ) -> Result<(), Self> {
        if interval.contains(value) {
            Ok(())
        } else {
            Err(Self {
                quantity,
                interval,
                unit,
            })
        }
    }
}

/// A literal argument could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("expected a number, got '{0}'")]
    Number(String),
    #[error("solenoid mask must be exactly 8 binary digits (0 or 1)")]
    Binary,
    #[error("solenoid mask must be exactly 2 hex digits (0-f)")]
    Hex,
    #[error("raw frame must be exactly 16 hex digits, e.g. cc00200000ddc901")]
    RawFrame,
}

/// Everything `dispatch` can reject a command for.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// Wrong token count or unknown option for a recognized verb.
    #[error("invalid {0} instruction")]
    Grammar(Subsystem),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("switch valve reply timed out ({received} of 8 bytes received)")]
    LinkTimeout { received: usize },
    /// The verb matches no subsystem.
    #[error("invalid instruction '{0}'")]
    UnknownVerb(String),
    /// A pump is moving; the valve must not switch under flow.
    #[error("switch valve busy: stop both pumps before sending valve commands")]
    Busy,
    /// A collaborator returned an error after the state was updated.
    #[error("{0} hardware write failed")]
    Hardware(Subsystem),
}

/// Which usage text follows a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageHint {
    None,
    Subsystem(Subsystem),
    All,
}

impl CommandError {
    pub fn usage_hint(&self) -> UsageHint {
        match self {
            CommandError::Grammar(subsystem) => UsageHint::Subsystem(*subsystem),
            CommandError::UnknownVerb(_) => UsageHint::All,
            CommandError::Range(_)
            | CommandError::Format(_)
            | CommandError::LinkTimeout { .. }
            | CommandError::Busy
            | CommandError::Hardware(_) => UsageHint::None,
        }
    }
}

/// Parse a float argument (`std::stof` style, but the whole token must parse).
pub fn parse_f32(token: &str) -> Result<f32, FormatError> {
    token
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FormatError::Number(String::from(token)))
}

/// Parse an integer argument.
pub fn parse_i32(token: &str) -> Result<i32, FormatError> {
    token
        .parse::<i32>()
        .map_err(|_| FormatError::Number(String::from(token)))
}
