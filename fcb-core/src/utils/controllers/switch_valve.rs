//! Rotary switch valve: frame codec and request/response exchange.
//!
//! Every exchange is one 8-byte request followed by one 8-byte reply:
//!
//! ```text
//! [0]=0xCC [1]=channel [2]=opcode [3]=param [4]=0 [5]=0xDD [6]=sum lo [7]=sum hi
//! ```
//!
//! The checksum is the sum of bytes 0..=5, little-endian. The exchange blocks the
//! caller for at most the reply window and is never retried.

use alloc::string::String;
use core::fmt;

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use super::error::{CommandError, FormatError, Interval, RangeError};

pub const FRAME_LEN: usize = 8;
pub const HEADER: u8 = 0xCC;
pub const TRAILER: u8 = 0xDD;
/// Highest channel the valve head has.
pub const CHANNEL_COUNT: u8 = 6;
/// Granularity of the reply wait.
pub const POLL_INTERVAL_MS: u32 = 10;
/// Most stale bytes dropped before a request; a noisy line cannot stall the loop.
pub const MAX_STALE_BYTES: usize = 4 * FRAME_LEN;

pub const OP_CHECK: u8 = 0x3E;
pub const OP_STATUS: u8 = 0x4A;
pub const OP_GOTO_CHANNEL: u8 = 0x44;
pub const OP_RESET: u8 = 0x45;

/// Switch-valve instruction built from an `sv` command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchCommand {
    /// Complete frame as 16 hex characters, sent verbatim.
    Raw(String),
    /// Query the current channel.
    Check,
    /// Query the valve motor status.
    Status,
    GotoChannel(i32),
    Reset,
}

/// Why a `SwitchCommand` could not be turned into a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("switch channel {0} is outside 1..=6")]
    ChannelOutOfRange(i32),
    #[error("raw frame is not 16 hex digits")]
    MalformedRaw,
}

impl From<FrameError> for CommandError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ChannelOutOfRange(_) => CommandError::Range(RangeError {
                quantity: "switch channel",
                interval: Interval::Closed(1.0, f32::from(CHANNEL_COUNT)),
                unit: "",
            }),
            FrameError::MalformedRaw => CommandError::Format(FormatError::RawFrame),
        }
    }
}

/// One 8-byte frame, request or reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchFrame([u8; FRAME_LEN]);

impl SwitchFrame {
    /// Build a request with header, trailer and checksum filled in.
    pub fn request(
        channel: u8,
        opcode: u8,
        param: u8,
    ) -> Self {
        let mut bytes = [HEADER, channel, opcode, param, 0, TRAILER, 0, 0];
        let [lo, hi] = Self::checksum(&bytes).to_le_bytes();
        bytes[6] = lo;
        bytes[7] = hi;
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode exactly 16 hex characters without touching the checksum.
    pub fn parse_hex(text: &str) -> Result<Self, FrameError> {
        if text.len() != FRAME_LEN * 2 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FrameError::MalformedRaw);
        }
        let mut bytes = [0u8; FRAME_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = text.get(i * 2..i * 2 + 2).ok_or(FrameError::MalformedRaw)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| FrameError::MalformedRaw)?;
        }
        Ok(Self(bytes))
    }

    /// Sum of the first six bytes, modulo 65536.
    pub fn checksum(bytes: &[u8; FRAME_LEN]) -> u16 {
        bytes[..6]
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn channel(&self) -> u8 {
        self.0[1]
    }

    pub fn opcode(&self) -> u8 {
        self.0[2]
    }

    pub fn param(&self) -> u8 {
        self.0[3]
    }

    /// Header, trailer and checksum all check out.
    pub fn is_well_formed(&self) -> bool {
        self.0[0] == HEADER
            && self.0[5] == TRAILER
            && u16::from_le_bytes([self.0[6], self.0[7]]) == Self::checksum(&self.0)
    }
}

impl fmt::Display for SwitchFrame {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl SwitchCommand {
    /// Encode into a request frame. Nothing is sent for an invalid command.
    pub fn encode(&self) -> Result<SwitchFrame, FrameError> {
        match self {
            SwitchCommand::Raw(text) => SwitchFrame::parse_hex(text),
            SwitchCommand::Check => Ok(SwitchFrame::request(0, OP_CHECK, 0)),
            SwitchCommand::Status => Ok(SwitchFrame::request(0, OP_STATUS, 0)),
            SwitchCommand::GotoChannel(channel) => match u8::try_from(*channel) {
                Ok(ch) if (1..=CHANNEL_COUNT).contains(&ch) => {
                    Ok(SwitchFrame::request(0, OP_GOTO_CHANNEL, ch))
                }
                _ => Err(FrameError::ChannelOutOfRange(*channel)),
            },
            SwitchCommand::Reset => Ok(SwitchFrame::request(0, OP_RESET, 0)),
        }
    }
}

/// Errors from one request/response exchange.
#[derive(Debug)]
pub enum SwitchError<E: core::fmt::Debug> {
    /// The serial link itself failed.
    Io(E),
    /// Fewer than 8 bytes arrived within the reply window.
    Timeout { received: usize },
}

/// Serial link to the switch-valve controller.
pub struct SwitchValve<L, D> {
    link: L,
    delay: D,
    reply_window: Duration,
}

impl<L, D> SwitchValve<L, D>
where
    L: Read + Write + ReadReady,
    D: DelayNs,
{
    pub fn new(
        link: L,
        delay: D,
        reply_window: Duration,
    ) -> Self {
        Self {
            link,
            delay,
            reply_window,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn reply_window(&self) -> Duration {
        self.reply_window
    }

    /// Send `request` and wait for an 8-byte reply.
    ///
    /// Blocks for at most the reply window, polling every `POLL_INTERVAL_MS`.
    pub fn transact(
        &mut self,
        request: &SwitchFrame,
    ) -> Result<SwitchFrame, SwitchError<L::Error>> {
        self.discard_stale()?;

        tracing::debug!(%request, "switch valve request");
        self.link.write_all(request.as_bytes()).map_err(SwitchError::Io)?;
        self.link.flush().map_err(SwitchError::Io)?;

        let window_ms = self.reply_window.as_millis();
        let mut reply = [0u8; FRAME_LEN];
        let mut received = 0;
        let mut waited_ms = 0u64;
        loop {
            while received < FRAME_LEN && self.link.read_ready().map_err(SwitchError::Io)? {
                let n = self
                    .link
                    .read(&mut reply[received..])
                    .map_err(SwitchError::Io)?;
                if n == 0 {
                    break;
                }
                received += n;
            }

            if received == FRAME_LEN {
                let reply = SwitchFrame(reply);
                tracing::debug!(%reply, waited_ms, "switch valve reply");
                return Ok(reply);
            }
            if waited_ms >= window_ms {
                tracing::warn!(received, window_ms, "switch valve reply timed out");
                return Err(SwitchError::Timeout { received });
            }

            let step = (window_ms - waited_ms).min(u64::from(POLL_INTERVAL_MS)) as u32;
            self.delay.delay_ms(step);
            waited_ms += u64::from(step);
        }
    }

    /// Drop bytes left over from an earlier, late reply.
    fn discard_stale(&mut self) -> Result<(), SwitchError<L::Error>> {
        let mut scratch = [0u8; FRAME_LEN];
        let mut dropped = 0usize;
        while dropped < MAX_STALE_BYTES && self.link.read_ready().map_err(SwitchError::Io)? {
            let n = self.link.read(&mut scratch).map_err(SwitchError::Io)?;
            if n == 0 {
                break;
            }
            dropped += n;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "discarded stale switch valve bytes");
        }
        Ok(())
    }
}
