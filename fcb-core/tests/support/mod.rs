//! Recording fakes for driving a `ControlBoard` on the host.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;

use embedded_hal::{delay::DelayNs, digital, i2c};
use fcb_core::utils::{
    controllers::{pumps::MotionControl, BoardConfig, BoardDrivers, BoardParts, ControlBoard},
    Message,
};
use smart_leds_trait::{SmartLedsWrite, RGB8};

/// Steps a fake motor covers per `run` call.
pub const RUN_STRIDE: i64 = 4000;

#[derive(Debug, Default)]
pub struct FakeMotor {
    pub max_speed: f32,
    pub acceleration: f32,
    pub position: i64,
    pub remaining: i64,
    pub enabled: bool,
    pub moves: Vec<i64>,
    pub stops: usize,
}

impl MotionControl for FakeMotor {
    fn set_max_speed(
        &mut self,
        steps_per_s: f32,
    ) {
        self.max_speed = steps_per_s;
    }

    fn set_acceleration(
        &mut self,
        steps_per_s2: f32,
    ) {
        self.acceleration = steps_per_s2;
    }

    fn set_current_position(
        &mut self,
        position: i64,
    ) {
        self.position = position;
    }

    fn move_by(
        &mut self,
        steps: i64,
    ) {
        self.moves.push(steps);
        self.remaining = steps;
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.remaining = 0;
    }

    fn distance_to_go(&self) -> i64 {
        self.remaining
    }

    fn run(&mut self) {
        let step = self.remaining.signum() * self.remaining.abs().min(RUN_STRIDE);
        self.position += step;
        self.remaining -= step;
    }

    fn set_enabled(
        &mut self,
        enabled: bool,
    ) {
        self.enabled = enabled;
    }
}

/// How the fake switch valve answers a request.
#[derive(Debug, Clone)]
pub enum ReplyMode {
    /// Reply with the request bytes.
    Echo,
    /// Never reply.
    Silent,
    /// Reply with these frames in order, then stay silent.
    Scripted(VecDeque<Vec<u8>>),
}

#[derive(Debug)]
pub struct FakeLink {
    pub mode: ReplyMode,
    pub written: Vec<u8>,
    pub inbox: VecDeque<u8>,
}

impl Default for FakeLink {
    fn default() -> Self {
        Self {
            mode: ReplyMode::Echo,
            written: Vec::new(),
            inbox: VecDeque::new(),
        }
    }
}

impl FakeLink {
    /// Every 8-byte frame written so far.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.written.chunks(8).map(<[u8]>::to_vec).collect()
    }
}

impl embedded_io::ErrorType for FakeLink {
    type Error = Infallible;
}

impl embedded_io::Write for FakeLink {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> Result<usize, Self::Error> {
        self.written.extend_from_slice(buf);
        match &mut self.mode {
            ReplyMode::Echo => self.inbox.extend(buf),
            ReplyMode::Silent => {}
            ReplyMode::Scripted(replies) => {
                if let Some(reply) = replies.pop_front() {
                    self.inbox.extend(reply);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::ReadReady for FakeLink {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.inbox.is_empty())
    }
}

impl embedded_io::Read for FakeLink {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.inbox.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

#[derive(Debug, Default)]
pub struct FakeDelay {
    pub elapsed_ns: u64,
}

impl DelayNs for FakeDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.elapsed_ns += u64::from(ns);
    }
}

/// Output pin recording every level it is driven to.
#[derive(Debug, Default)]
pub struct FakePin {
    pub levels: Vec<bool>,
}

impl digital::ErrorType for FakePin {
    type Error = Infallible;
}

impl digital::OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}

/// I2C bus recording `(address, bytes)` for every write.
#[derive(Debug, Default)]
pub struct FakeDac {
    pub writes: Vec<(u8, Vec<u8>)>,
}

impl i2c::ErrorType for FakeDac {
    type Error = Infallible;
}

impl i2c::I2c for FakeDac {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations {
            match operation {
                i2c::Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                i2c::Operation::Read(buf) => buf.fill(0),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeLeds {
    pub frames: Vec<Vec<RGB8>>,
}

impl FakeLeds {
    pub fn last_frame(&self) -> Option<&[RGB8]> {
        self.frames.last().map(Vec::as_slice)
    }
}

impl SmartLedsWrite for FakeLeds {
    type Error = Infallible;
    type Color = RGB8;

    fn write<T, I>(
        &mut self,
        iterator: T,
    ) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        self.frames.push(iterator.into_iter().map(Into::into).collect());
        Ok(())
    }
}

pub struct Fakes;

impl BoardDrivers for Fakes {
    type Syringe = FakeMotor;
    type Peristaltic = FakeMotor;
    type Link = FakeLink;
    type Delay = FakeDelay;
    type Pin = FakePin;
    type Dac = FakeDac;
    type Leds = FakeLeds;
    type LedError = Infallible;
}

pub fn parts() -> BoardParts<Fakes> {
    BoardParts {
        syringe: FakeMotor::default(),
        peristaltic: FakeMotor::default(),
        switch_link: FakeLink::default(),
        delay: FakeDelay::default(),
        shift_data: FakePin::default(),
        shift_clock: FakePin::default(),
        shift_latch: FakePin::default(),
        dac: FakeDac::default(),
        leds: FakeLeds::default(),
    }
}

/// A booted board with the boot transcript already drained.
pub fn board() -> ControlBoard<Fakes> {
    let mut board = ControlBoard::new(parts(), BoardConfig::default()).unwrap();
    board.init();
    board.take_messages();
    board
}

/// Run one raw line and return what it reported.
pub fn run(
    board: &mut ControlBoard<Fakes>,
    line: &str,
) -> Vec<String> {
    board.handle_line(line);
    board
        .take_messages()
        .iter()
        .map(Message::to_string)
        .collect()
}

/// The most recently latched solenoid mask, read back from the data pin.
pub fn latched_mask(board: &ControlBoard<Fakes>) -> Option<u8> {
    let (data, _, _) = board.solenoids().pins();
    let levels = data.levels.len().checked_sub(8).map(|start| &data.levels[start..])?;
    Some(levels.iter().fold(0u8, |acc, &high| (acc << 1) | u8::from(high)))
}
