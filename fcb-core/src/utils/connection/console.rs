//! Console Input Module
//!
//! Serial-console bytes are assembled into lines here, every line (console or
//! wireless) is normalized to the command alphabet, and complete lines are queued
//! on a `CommandChannel` that the control loop drains once per tick.

use alloc::{string::String, vec::Vec};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

/// Lines that may wait for the next tick before transports start getting refused.
pub const COMMAND_QUEUE_DEPTH: usize = 8;
/// Longest console line kept; extra bytes are dropped.
pub const LINE_CAPACITY: usize = 128;

/// Channel carrying normalized command lines from transports to the controller.
pub type CommandChannel = Channel<CriticalSectionRawMutex, String, COMMAND_QUEUE_DEPTH>;

/// Default command channel shared by the console and wireless transports.
pub static COMMAND_CHANNEL: CommandChannel = Channel::new();

/// Whether `c` belongs to the command alphabet.
pub fn is_command_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || c == '.' || c == '-'
}

/// Lower-case a raw line and strip everything outside the command alphabet.
pub fn normalize_line(raw: &str) -> String {
    raw.chars()
        .filter(|&c| is_command_char(c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Split a normalized line on single spaces.
///
/// The empty line has no tokens. Repeated spaces yield empty tokens, which no
/// grammar accepts.
pub fn tokenize(line: &str) -> Vec<&str> {
    if line.is_empty() {
        return Vec::new();
    }
    line.split(' ').collect()
}

/// Normalize `raw` and queue it for the next tick.
///
/// This is the single entry point transports use for incoming commands. When the
/// queue is full the normalized line is handed back so the caller can report it.
pub fn submit_line(
    channel: &CommandChannel,
    raw: &str,
) -> Result<(), String> {
    let line = normalize_line(raw);
    channel.try_send(line).map_err(|err| {
        let embassy_sync::channel::TrySendError::Full(line) = err;
        tracing::warn!(%line, "command queue full, line refused");
        line
    })
}

/// Byte-wise line assembler for the serial console.
pub struct LineAssembler {
    buf: heapless::Vec<u8, LINE_CAPACITY>,
    truncated: bool,
}

impl LineAssembler {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            truncated: false,
        }
    }

    /// Feed one byte; returns the normalized line when `byte` is `\n`.
    pub fn push(
        &mut self,
        byte: u8,
    ) -> Option<String> {
        if byte == b'\n' {
            let line = self.buf.iter().map(|&b| char::from(b)).collect();
            self.buf.clear();
            self.truncated = false;
            return Some(line);
        }

        if !is_command_char(char::from(byte)) {
            return None;
        }
        if self.buf.push(byte.to_ascii_lowercase()).is_err() && !self.truncated {
            self.truncated = true;
            tracing::warn!(capacity = LINE_CAPACITY, "console line too long, truncating");
        }
        None
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_line_has_no_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_single_spaces() {
        assert_eq!(tokenize("sov -c 3 1"), ["sov", "-c", "3", "1"]);
        assert_eq!(tokenize("sp  -s"), ["sp", "", "-s"]);
    }

    #[test]
    fn test_normalize_line() {
        assert_eq!(normalize_line("SV -RAW CC00200000DDC901\r"), "sv -raw cc00200000ddc901");
        assert_eq!(normalize_line("pv -p 1_0!"), "pv -p 10");
    }

    #[test]
    fn test_line_assembler() {
        let mut asm = LineAssembler::new();
        let mut lines = Vec::new();
        for &b in b"L -ON\r\nsp -v 100\n" {
            if let Some(line) = asm.push(b) {
                lines.push(line);
            }
        }
        assert_eq!(lines, ["l -on", "sp -v 100"]);
    }

    #[test]
    fn test_line_assembler_truncates() {
        let mut asm = LineAssembler::new();
        for _ in 0..LINE_CAPACITY + 10 {
            assert!(asm.push(b'a').is_none());
        }
        let line = asm.push(b'\n').unwrap_or_default();
        assert_eq!(line.len(), LINE_CAPACITY);
        // The next line starts clean.
        asm.push(b'l');
        assert_eq!(asm.push(b'\n').as_deref(), Some("l"));
    }

    #[test]
    fn test_submit_line_until_full() {
        let channel = CommandChannel::new();
        for _ in 0..COMMAND_QUEUE_DEPTH {
            assert!(submit_line(&channel, "SP -S").is_ok());
        }
        assert_eq!(submit_line(&channel, "l -off"), Err(String::from("l -off")));
        assert_eq!(channel.try_receive().ok().as_deref(), Some("sp -s"));
    }
}
