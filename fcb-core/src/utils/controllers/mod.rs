//! Board Controller
//!
//! `ControlBoard` owns the peripheral state store, the hardware collaborators
//! and the outbound message sink. One `tick` drains the command channel,
//! dispatches each line, advances both pumps and flushes messages.
//!
//! - `dispatch`: verb routing and per-subsystem command grammar
//! - `switch_valve`: frame codec and the blocking request/reply exchange
//! - `solenoid`, `pressure`, `leds`: the output drivers
//! - `pumps`: stepper pumps behind `MotionControl`
//! - `state`, `config`, `error`: the data they share

pub mod config;
pub mod dispatch;
pub mod error;
pub mod leds;
pub mod pressure;
pub mod pumps;
pub mod solenoid;
pub mod state;
pub mod switch_valve;

use alloc::{string::String, vec::Vec};

use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c};
use smart_leds_trait::{SmartLedsWrite, RGB8};

pub use config::BoardConfig;
pub use dispatch::Subsystem;
pub use error::{CommandError, RangeError};
pub use state::PeripheralState;

use crate::utils::{
    connection::{
        console::{normalize_line, tokenize, CommandChannel},
        sink::{Message, MessageSink, Transport},
    },
    math::fluidics::PumpGeometry,
};
use leds::LightArray;
use pressure::PressureDac;
use pumps::{MotionControl, PumpDrive};
use solenoid::ShiftRegister;
use switch_valve::{SwitchCommand, SwitchValve};

/// The hardware a board is built from.
pub trait BoardDrivers {
    type Syringe: MotionControl;
    type Peristaltic: MotionControl;
    /// Byte link to the switch valve.
    type Link: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady;
    type Delay: DelayNs;
    /// Shift-register data, clock and latch pins.
    type Pin: OutputPin;
    type Dac: I2c;
    type Leds: SmartLedsWrite<Color = RGB8, Error = Self::LedError>;
    type LedError: core::fmt::Debug;
}

/// Owned driver instances handed to `ControlBoard::new`.
pub struct BoardParts<B: BoardDrivers> {
    pub syringe: B::Syringe,
    pub peristaltic: B::Peristaltic,
    pub switch_link: B::Link,
    pub delay: B::Delay,
    pub shift_data: B::Pin,
    pub shift_clock: B::Pin,
    pub shift_latch: B::Pin,
    pub dac: B::Dac,
    pub leds: B::Leds,
}

pub struct ControlBoard<B: BoardDrivers> {
    state: PeripheralState,
    config: BoardConfig,
    syringe: PumpDrive<B::Syringe>,
    peristaltic: PumpDrive<B::Peristaltic>,
    switch_valve: SwitchValve<B::Link, B::Delay>,
    solenoids: ShiftRegister<B::Pin>,
    dac: PressureDac<B::Dac>,
    light: LightArray<B::Leds>,
    sink: MessageSink,
    status_dirty: bool,
}

impl<B: BoardDrivers> ControlBoard<B> {
    /// Assemble a board. Nothing is written to the hardware until `init`.
    pub fn new(
        parts: BoardParts<B>,
        config: BoardConfig,
    ) -> Result<Self, RangeError> {
        config.validate()?;
        Ok(Self {
            state: PeripheralState::new(&config),
            syringe: PumpDrive::new(parts.syringe, PumpGeometry::SYRINGE),
            peristaltic: PumpDrive::new(parts.peristaltic, PumpGeometry::PERISTALTIC),
            switch_valve: SwitchValve::new(parts.switch_link, parts.delay, config.reply_window()),
            solenoids: ShiftRegister::new(parts.shift_data, parts.shift_clock, parts.shift_latch),
            dac: PressureDac::new(parts.dac, config.dac_address),
            light: LightArray::new(parts.leds),
            sink: MessageSink::new(),
            status_dirty: false,
            config,
        })
    }

    /// Push the boot state to every peripheral and reset the switch valve.
    pub fn init(&mut self) {
        self.syringe
            .configure(&self.state.syringe, self.config.syringe_acceleration);
        self.peristaltic
            .configure(&self.state.peristaltic, self.config.peristaltic_acceleration);

        let outcomes = [
            self.write_solenoids(),
            self.write_pressure().map(|_| ()),
            self.render_light(),
            self.send_switch_command(&SwitchCommand::Reset),
        ];
        for outcome in outcomes {
            if let Err(err) = outcome {
                self.reject(err);
            }
        }

        self.sink.push("control board ready");
        self.status_dirty = true;
        tracing::info!("control board initialized");
    }

    /// Normalize, tokenize and dispatch one raw line.
    pub fn handle_line(
        &mut self,
        raw: &str,
    ) {
        let line = normalize_line(raw);
        let tokens = tokenize(&line);
        self.dispatch(&tokens);
    }

    /// One pass of the control loop.
    pub fn tick(
        &mut self,
        commands: &CommandChannel,
        transports: &mut [&mut dyn Transport],
    ) {
        while let Ok(line) = commands.try_receive() {
            self.handle_line(&line);
        }
        self.maintain_motors();
        self.flush(transports);
    }

    /// Advance both pumps by one quantum and report finished moves.
    pub fn maintain_motors(&mut self) {
        if self.syringe.maintain(&mut self.state.syringe) {
            self.sink.push("syringe pump motion complete");
            self.status_dirty = true;
        }
        if self.peristaltic.maintain(&mut self.state.peristaltic) {
            self.sink.push("peristaltic pump motion complete");
            self.status_dirty = true;
        }
    }

    /// Deliver pending messages, then the status snapshot if the state changed.
    pub fn flush(
        &mut self,
        transports: &mut [&mut dyn Transport],
    ) -> usize {
        let delivered = self.sink.flush(transports);
        if self.status_dirty {
            self.status_dirty = false;
            match self.status_json() {
                Ok(json) => {
                    for transport in transports.iter_mut() {
                        if transport.is_connected() {
                            transport.send_status(&json);
                        }
                    }
                }
                Err(err) => tracing::error!(%err, "status snapshot failed"),
            }
        }
        delivered
    }

    /// Machine-readable snapshot of the state store.
    pub fn status_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.state)
    }

    pub fn state(&self) -> &PeripheralState {
        &self.state
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn sink(&self) -> &MessageSink {
        &self.sink
    }

    /// Remove and return pending messages without a transport.
    pub fn take_messages(&mut self) -> Vec<Message> {
        self.sink.take()
    }

    pub fn syringe(&self) -> &PumpDrive<B::Syringe> {
        &self.syringe
    }

    pub fn peristaltic(&self) -> &PumpDrive<B::Peristaltic> {
        &self.peristaltic
    }

    pub fn switch_valve(&self) -> &SwitchValve<B::Link, B::Delay> {
        &self.switch_valve
    }

    pub fn switch_valve_mut(&mut self) -> &mut SwitchValve<B::Link, B::Delay> {
        &mut self.switch_valve
    }

    pub fn dac(&self) -> &PressureDac<B::Dac> {
        &self.dac
    }

    pub fn light(&self) -> &LightArray<B::Leds> {
        &self.light
    }

    pub fn solenoids(&self) -> &ShiftRegister<B::Pin> {
        &self.solenoids
    }

    fn write_solenoids(&mut self) -> Result<(), CommandError> {
        self.solenoids.write(self.state.solenoids).map_err(|err| {
            tracing::error!(?err, "shift register write failed");
            CommandError::Hardware(Subsystem::Solenoid)
        })
    }

    fn write_pressure(&mut self) -> Result<u16, CommandError> {
        self.dac.apply(&self.state.pressure).map_err(|err| {
            tracing::error!(?err, "DAC write failed");
            CommandError::Hardware(Subsystem::ProportionalValve)
        })
    }

    fn render_light(&mut self) -> Result<(), CommandError> {
        let light = self.state.light;
        let result = if light.on {
            self.light.show(light.brightness)
        } else {
            self.light.blank()
        };
        result.map_err(|err| {
            tracing::error!(?err, "LED write failed");
            CommandError::Hardware(Subsystem::Light)
        })
    }
}
