//! Host-side control board with simulated peripherals.
//!
//! Reads command lines from stdin, runs the board's control loop and prints the
//! transcript to stdout. Hardware writes are logged through `tracing`.

use anyhow::Context;
use clap::Parser;
use critical_section as _;
use embedded_hal::{delay::DelayNs, digital, i2c};
use fcb_core::utils::{
    connection::console::LineAssembler,
    controllers::{
        pumps::MotionControl,
        switch_valve::{SwitchFrame, CHANNEL_COUNT, OP_CHECK, OP_GOTO_CHANNEL, OP_RESET, OP_STATUS},
        BoardConfig, BoardDrivers, BoardParts, ControlBoard,
    },
    submit_line, Transport, COMMAND_CHANNEL,
};
use smart_leds_trait::{SmartLedsWrite, RGB8};
use std::{
    collections::VecDeque,
    convert::Infallible,
    io::{Read, Write},
    path::PathBuf,
    thread,
    time::Duration,
};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// JSON board configuration; omitted fields keep their defaults
    #[clap(long)]
    config: Option<PathBuf>,
    /// syringe cruise speed (microsteps/s)
    #[clap(long)]
    syringe_speed: Option<f32>,
    /// peristaltic cruise speed (microsteps/s)
    #[clap(long)]
    peristaltic_speed: Option<f32>,
    /// pressure at DAC full scale (kPa)
    #[clap(long)]
    max_pressure: Option<u16>,
    #[clap(long)]
    brightness: Option<u8>,
    /// switch valve reply window (ms)
    #[clap(long)]
    reply_window_ms: Option<u64>,
    /// control loop period (ms)
    #[clap(long, default_value = "5")]
    tick_ms: u64,
    /// pretend a wireless client is connected
    #[clap(long)]
    wireless: bool,
}

impl Opts {
    fn board_config(&self) -> anyhow::Result<BoardConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => BoardConfig::default(),
        };
        if let Some(speed) = self.syringe_speed {
            config.syringe_speed = speed;
        }
        if let Some(speed) = self.peristaltic_speed {
            config.peristaltic_speed = speed;
        }
        if let Some(max) = self.max_pressure {
            config.max_pressure = max;
        }
        if let Some(brightness) = self.brightness {
            config.brightness = brightness;
        }
        if let Some(window) = self.reply_window_ms {
            config.reply_window_ms = window;
        }
        Ok(config)
    }
}

/// Stepper that covers `max_speed * tick` microsteps per `run`.
struct SimStepper {
    name: &'static str,
    tick_s: f32,
    max_speed: f32,
    position: i64,
    target: i64,
}

impl SimStepper {
    fn new(
        name: &'static str,
        tick_ms: u64,
    ) -> Self {
        Self {
            name,
            tick_s: tick_ms as f32 / 1000.0,
            max_speed: 0.0,
            position: 0,
            target: 0,
        }
    }
}

impl MotionControl for SimStepper {
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
        debug!(motor = self.name, steps_per_s2, "acceleration set");
    }

    fn set_current_position(
        &mut self,
        position: i64,
    ) {
        self.position = position;
        self.target = position;
    }

    fn move_by(
        &mut self,
        steps: i64,
    ) {
        self.target = self.position.saturating_add(steps);
    }

    fn stop(&mut self) {
        self.target = self.position;
    }

    fn distance_to_go(&self) -> i64 {
        self.target.saturating_sub(self.position)
    }

    fn run(&mut self) {
        let stride = ((self.max_speed * self.tick_s) as i64).max(1);
        let remaining = self.distance_to_go();
        let step = remaining.unsigned_abs().min(stride.unsigned_abs()) as i64;
        self.position = self.position.saturating_add(remaining.signum() * step);
    }

    fn set_enabled(
        &mut self,
        enabled: bool,
    ) {
        debug!(motor = self.name, enabled, position = self.position, "driver enable");
    }
}

/// Switch valve that answers well-formed requests with a status frame.
#[derive(Default)]
struct SimValveLink {
    channel: u8,
    request: Vec<u8>,
    reply: VecDeque<u8>,
}

impl SimValveLink {
    fn answer(
        &mut self,
        request: SwitchFrame,
    ) {
        if !request.is_well_formed() {
            warn!(%request, "valve ignored malformed frame");
            return;
        }
        let param = match request.opcode() {
            OP_GOTO_CHANNEL if (1..=CHANNEL_COUNT).contains(&request.param()) => {
                self.channel = request.param();
                self.channel
            }
            OP_RESET => {
                self.channel = 0;
                0
            }
            OP_CHECK => self.channel,
            OP_STATUS => 0,
            opcode => {
                warn!(opcode, "valve ignored unknown opcode");
                return;
            }
        };
        self.reply
            .extend(SwitchFrame::request(0, 0, param).as_bytes());
    }
}

impl embedded_io::ErrorType for SimValveLink {
    type Error = Infallible;
}

impl embedded_io::Write for SimValveLink {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> Result<usize, Self::Error> {
        for &byte in buf {
            self.request.push(byte);
            if let Ok(bytes) = <[u8; 8]>::try_from(self.request.as_slice()) {
                self.request.clear();
                self.answer(SwitchFrame::from_bytes(bytes));
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::ReadReady for SimValveLink {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.reply.is_empty())
    }
}

impl embedded_io::Read for SimValveLink {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.reply.len());
        for (slot, byte) in buf.iter_mut().zip(self.reply.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

struct ThreadDelay;

impl DelayNs for ThreadDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// Shift-register pin that logs its level.
struct LogPin(&'static str);

impl digital::ErrorType for LogPin {
    type Error = Infallible;
}

impl digital::OutputPin for LogPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        debug!(pin = self.0, "low");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        debug!(pin = self.0, "high");
        Ok(())
    }
}

/// DAC bus that logs every write.
struct LogDac;

impl i2c::ErrorType for LogDac {
    type Error = Infallible;
}

impl i2c::I2c for LogDac {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations {
            match operation {
                i2c::Operation::Write(bytes) => info!(address, ?bytes, "I2C write"),
                i2c::Operation::Read(buf) => buf.fill(0),
            }
        }
        Ok(())
    }
}

// LED driver that logs to console
struct SerialLedDriver;

impl SmartLedsWrite for SerialLedDriver {
    type Color = RGB8;
    type Error = Infallible;

    fn write<T, I>(
        &mut self,
        iterator: T,
    ) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let frame: Vec<RGB8> = iterator.into_iter().map(Into::into).collect();
        let lit = frame.iter().filter(|c| c.r | c.g | c.b != 0).count();
        let level = frame.iter().map(|c| c.r).max().unwrap_or(0);
        info!(leds = frame.len(), lit, level, "LED frame");
        Ok(())
    }
}

struct SimBoard;

impl BoardDrivers for SimBoard {
    type Syringe = SimStepper;
    type Peristaltic = SimStepper;
    type Link = SimValveLink;
    type Delay = ThreadDelay;
    type Pin = LogPin;
    type Dac = LogDac;
    type Leds = SerialLedDriver;
    type LedError = Infallible;
}

/// Serial echo: every line to stdout.
struct Console;

impl Transport for Console {
    fn send_line(
        &mut self,
        line: &str,
    ) {
        println!("{line}");
    }
}

/// Wireless notify characteristic, logged instead of transmitted.
struct Wireless {
    connected: bool,
}

impl Transport for Wireless {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_line(
        &mut self,
        line: &str,
    ) {
        info!(target: "wireless", "notify: {line}");
    }

    fn send_status(
        &mut self,
        status: &str,
    ) {
        info!(target: "wireless", "status: {status}");
    }
}

/// Feed stdin into the command channel, one assembled line at a time.
fn spawn_console_reader() {
    thread::spawn(|| {
        let mut assembler = LineAssembler::new();
        for byte in std::io::stdin().lock().bytes() {
            let Ok(byte) = byte else { break };
            if let Some(line) = assembler.push(byte) {
                // A full queue is retried until the control loop catches up.
                let mut pending = line;
                while let Err(refused) = submit_line(&COMMAND_CHANNEL, &pending) {
                    pending = refused;
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
        info!("stdin closed");
    });
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let config = opts.board_config()?;
    let parts = BoardParts::<SimBoard> {
        syringe: SimStepper::new("syringe", opts.tick_ms),
        peristaltic: SimStepper::new("peristaltic", opts.tick_ms),
        switch_link: SimValveLink::default(),
        delay: ThreadDelay,
        shift_data: LogPin("ds"),
        shift_clock: LogPin("shcp"),
        shift_latch: LogPin("stcp"),
        dac: LogDac,
        leds: SerialLedDriver,
    };
    let mut board = ControlBoard::new(parts, config).context("invalid board configuration")?;

    let mut console = Console;
    let mut wireless = Wireless {
        connected: opts.wireless,
    };

    board.init();
    board.flush(&mut [&mut console, &mut wireless]);
    spawn_console_reader();

    let period = Duration::from_millis(opts.tick_ms);
    loop {
        board.tick(&COMMAND_CHANNEL, &mut [&mut console, &mut wireless]);
        std::io::stdout().flush()?;
        thread::sleep(period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(args: &[&str]) -> Opts {
        Opts::parse_from(std::iter::once("mock-board").chain(args.iter().copied()))
    }

    #[test]
    fn test_missing_config_names_the_file() {
        let err = opts(&["--config", "/nonexistent/board.json"])
            .board_config()
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot read /nonexistent/board.json");
        assert!(err.chain().count() > 1);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = opts(&["--max-pressure", "150", "--brightness", "40"])
            .board_config()
            .unwrap();
        assert_eq!(config.max_pressure, 150);
        assert_eq!(config.brightness, 40);
    }

    #[test]
    fn test_stepper_saturates_on_huge_moves() {
        let mut stepper = SimStepper::new("syringe", 5);
        stepper.set_max_speed(f32::MAX);
        stepper.set_current_position(i64::MAX - 10);
        stepper.move_by(i64::MAX);
        assert_eq!(stepper.distance_to_go(), 10);
        stepper.run();
        assert_eq!(stepper.position, i64::MAX);
        assert_eq!(stepper.distance_to_go(), 0);

        stepper.set_current_position(i64::MIN + 1);
        stepper.move_by(i64::MIN);
        stepper.run();
        assert_eq!(stepper.position, i64::MIN);
    }
}
