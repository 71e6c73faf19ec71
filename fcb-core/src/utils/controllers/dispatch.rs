//! Command dispatch.
//!
//! `ControlBoard::dispatch` routes a token list to one of six subsystem
//! handlers. A handler validates every argument before it touches the state
//! store, drives the collaborator and reports through the message sink. A
//! rejected command leaves exactly one explanatory message, followed by usage
//! text for grammar errors and unknown verbs.

use alloc::{format, string::String};
use core::fmt;

use super::{
    error::{parse_f32, parse_i32, CommandError, Interval, RangeError, UsageHint},
    pumps::{Finetune, MotionControl, PumpDrive},
    state::{PumpState, SolenoidMask},
    switch_valve::{SwitchCommand, SwitchError, SwitchFrame, CHANNEL_COUNT},
    BoardDrivers, ControlBoard,
};
use crate::utils::{
    connection::sink::MessageSink,
    math::fluidics::{FINETUNE_FAST, PERISTALTIC_MAX_MICROSTEP},
};

/// The six command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Syringe,
    Peristaltic,
    SwitchValve,
    Solenoid,
    ProportionalValve,
    Light,
}

impl Subsystem {
    pub const ALL: [Subsystem; 6] = [
        Subsystem::Syringe,
        Subsystem::Peristaltic,
        Subsystem::SwitchValve,
        Subsystem::Solenoid,
        Subsystem::ProportionalValve,
        Subsystem::Light,
    ];

    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "sp" => Some(Subsystem::Syringe),
            "pp" => Some(Subsystem::Peristaltic),
            "sv" => Some(Subsystem::SwitchValve),
            "sov" => Some(Subsystem::Solenoid),
            "pv" => Some(Subsystem::ProportionalValve),
            "l" => Some(Subsystem::Light),
            _ => None,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Subsystem::Syringe => "sp",
            Subsystem::Peristaltic => "pp",
            Subsystem::SwitchValve => "sv",
            Subsystem::Solenoid => "sov",
            Subsystem::ProportionalValve => "pv",
            Subsystem::Light => "l",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Subsystem::Syringe => "syringe pump",
            Subsystem::Peristaltic => "peristaltic pump",
            Subsystem::SwitchValve => "switch valve",
            Subsystem::Solenoid => "solenoid valve",
            Subsystem::ProportionalValve => "proportional valve",
            Subsystem::Light => "light",
        }
    }

    /// Usage lines, one per accepted form.
    pub fn usage(self) -> &'static [&'static str] {
        match self {
            Subsystem::Syringe => &[
                "sp -f 50      move the plunger forward 50 mm",
                "sp -b 30      move the plunger backward 30 mm",
                "sp -fv 5      push 5 mL",
                "sp -bv 3      draw 3 mL",
                "sp -v 3200    set the speed to 3200 steps/s",
                "sp -sv 0.1    set the speed to 0.1 mL/s",
                "sp -ft 0..3   fine-tune: 0 fast up, 1 slow up, 2 slow down, 3 fast down",
                "sp -s         stop the syringe pump",
            ],
            Subsystem::Peristaltic => &[
                "pp -f 5       turn the pump head forward 5 rev",
                "pp -b 5       turn the pump head backward 5 rev",
                "pp -fv 2      pump 2 mL forward",
                "pp -bv 2      pump 2 mL backward",
                "pp -v 800     set the speed to 800 steps/s",
                "pp -sv 0.1    set the speed to 0.1 mL/s",
                "pp -s         stop the peristaltic pump",
            ],
            Subsystem::SwitchValve => &[
                "sv -c 3       switch to channel 3 (1..6)",
                "sv -check     query the current channel",
                "sv -status    query the motor status",
                "sv -r         reset the valve",
                "sv -raw cc00200000ddc901   send 8 raw frame bytes",
            ],
            Subsystem::Solenoid => &[
                "sov -s        show all channels",
                "sov -c 3 1    open channel 3 (0 closes it)",
                "sov -d 195    set all channels from a decimal mask",
                "sov -b 11000011   set all channels, first digit is channel 8",
                "sov -h c3     set all channels from a hex mask",
            ],
            Subsystem::ProportionalValve => &[
                "pv -max 100   record the pressure at full scale (kPa, up to 500)",
                "pv -p 50      set the output pressure (kPa, up to the max)",
            ],
            Subsystem::Light => &[
                "l -on         turn the light on",
                "l -off        turn the light off",
                "l -b 200      set the brightness (0..255)",
            ],
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-pump limits and wording.
struct PumpProfile {
    subsystem: Subsystem,
    /// Distance unit with its leading space.
    unit: &'static str,
    speed_quantity: &'static str,
    flow_quantity: &'static str,
    max_step_rate: f32,
}

const SYRINGE_PROFILE: PumpProfile = PumpProfile {
    subsystem: Subsystem::Syringe,
    unit: " mm",
    speed_quantity: "syringe speed",
    flow_quantity: "syringe flow",
    max_step_rate: FINETUNE_FAST,
};

const PERISTALTIC_PROFILE: PumpProfile = PumpProfile {
    subsystem: Subsystem::Peristaltic,
    unit: " rev",
    speed_quantity: "peristaltic speed",
    flow_quantity: "peristaltic flow",
    max_step_rate: PERISTALTIC_MAX_MICROSTEP,
};

fn direction(forward: bool) -> &'static str {
    if forward {
        "forward"
    } else {
        "backward"
    }
}

/// Grammar shared by both stepper pumps.
fn pump_command<M: MotionControl>(
    profile: &PumpProfile,
    drive: &mut PumpDrive<M>,
    state: &mut PumpState,
    sink: &mut MessageSink,
    args: &[&str],
) -> Result<(), CommandError> {
    let geometry = *drive.geometry();
    let name = profile.subsystem.name();
    match *args {
        ["-s"] => {
            drive.stop(state);
            sink.push(format!("{name} stopped"));
        }
        ["-v", value] => {
            let speed = parse_f32(value)?;
            RangeError::check(
                profile.speed_quantity,
                Interval::LeftOpen(0.0, profile.max_step_rate),
                " steps/s",
                speed,
            )?;
            drive.set_speed(state, speed);
            sink.push(format!(
                "{name} speed set to {speed} steps/s ({} rps)",
                geometry.step_rate_to_rps(speed)
            ));
        }
        ["-sv", value] => {
            let flow = parse_f32(value)?;
            RangeError::check(
                profile.flow_quantity,
                Interval::LeftOpen(0.0, geometry.max_flow),
                " mL/s",
                flow,
            )?;
            drive.set_speed(state, geometry.flow_to_step_rate(flow));
            sink.push(format!(
                "{name} speed set to {flow} mL/s ({} rps)",
                geometry.flow_to_rps(flow)
            ));
        }
        [option @ ("-f" | "-b"), value] => {
            let distance = parse_f32(value)?;
            RangeError::check(
                "distance",
                Interval::LeftOpen(0.0, geometry.max_units()),
                profile.unit,
                distance,
            )?;
            let forward = option == "-f";
            drive.move_units(state, if forward { distance } else { -distance });
            sink.push(format!(
                "{name} moving {} {distance}{}",
                direction(forward),
                profile.unit
            ));
        }
        [option @ ("-fv" | "-bv"), value] => {
            let volume = parse_f32(value)?;
            RangeError::check(
                "volume",
                Interval::LeftOpen(0.0, geometry.max_volume()),
                " mL",
                volume,
            )?;
            let forward = option == "-fv";
            let units = geometry.units_for_volume(volume);
            drive.move_units(state, if forward { units } else { -units });
            sink.push(format!("{name} moving {} {volume} mL", direction(forward)));
        }
        _ => return Err(CommandError::Grammar(profile.subsystem)),
    }
    tracing::info!(pump = name, ?args, "pump command executed");
    Ok(())
}

impl<B: BoardDrivers> ControlBoard<B> {
    /// Execute one tokenized command. Never fails; rejections become messages.
    pub fn dispatch(
        &mut self,
        tokens: &[&str],
    ) {
        let Some((&verb, args)) = tokens.split_first() else {
            return;
        };
        let before = self.state;

        let outcome = match Subsystem::from_verb(verb) {
            Some(Subsystem::Syringe) => self.syringe_command(args),
            Some(Subsystem::Peristaltic) => pump_command(
                &PERISTALTIC_PROFILE,
                &mut self.peristaltic,
                &mut self.state.peristaltic,
                &mut self.sink,
                args,
            ),
            Some(Subsystem::SwitchValve) => self.switch_valve_command(args),
            Some(Subsystem::Solenoid) => self.solenoid_command(args),
            Some(Subsystem::ProportionalValve) => self.pressure_command(args),
            Some(Subsystem::Light) => self.light_command(args),
            None => Err(CommandError::UnknownVerb(String::from(verb))),
        };
        if let Err(err) = outcome {
            self.reject(err);
        }

        if self.state != before {
            self.status_dirty = true;
        }
    }

    /// Report a rejected command and the usage text it calls for.
    pub(crate) fn reject(
        &mut self,
        err: CommandError,
    ) {
        tracing::warn!(%err, "command rejected");
        self.sink.push(format!("{err}"));
        match err.usage_hint() {
            UsageHint::None => {}
            UsageHint::Subsystem(subsystem) => self.push_usage(subsystem),
            UsageHint::All => {
                for subsystem in Subsystem::ALL {
                    self.push_usage(subsystem);
                }
            }
        }
    }

    fn push_usage(
        &mut self,
        subsystem: Subsystem,
    ) {
        self.sink.push(format!("{subsystem} ({}):", subsystem.verb()));
        for line in subsystem.usage() {
            self.sink.push(*line);
        }
    }

    fn syringe_command(
        &mut self,
        args: &[&str],
    ) -> Result<(), CommandError> {
        if let ["-ft", code] = *args {
            let jog = Finetune::from_code(parse_i32(code)?)?;
            self.syringe.finetune(&mut self.state.syringe, jog);
            self.sink.push(jog.describe());
            tracing::info!(?jog, "syringe fine-tune started");
            return Ok(());
        }
        pump_command(
            &SYRINGE_PROFILE,
            &mut self.syringe,
            &mut self.state.syringe,
            &mut self.sink,
            args,
        )
    }

    fn switch_valve_command(
        &mut self,
        args: &[&str],
    ) -> Result<(), CommandError> {
        let command = match *args {
            ["-check"] => SwitchCommand::Check,
            ["-status"] => SwitchCommand::Status,
            ["-r"] => SwitchCommand::Reset,
            ["-raw", frame] => SwitchCommand::Raw(String::from(frame)),
            ["-c", channel] => SwitchCommand::GotoChannel(parse_i32(channel)?),
            _ => return Err(CommandError::Grammar(Subsystem::SwitchValve)),
        };
        let request = command.encode()?;
        if self.state.any_pump_moving() {
            return Err(CommandError::Busy);
        }
        self.exchange_switch_frame(&command, &request)
    }

    /// Encode, transmit and report one switch-valve command.
    pub(crate) fn send_switch_command(
        &mut self,
        command: &SwitchCommand,
    ) -> Result<(), CommandError> {
        let request = command.encode()?;
        self.exchange_switch_frame(command, &request)
    }

    fn exchange_switch_frame(
        &mut self,
        command: &SwitchCommand,
        request: &SwitchFrame,
    ) -> Result<(), CommandError> {
        self.sink
            .push(format!("switch valve command sent: {request}"));
        match self.switch_valve.transact(request) {
            Ok(reply) => {
                self.apply_switch_reply(command, request, &reply);
                Ok(())
            }
            Err(SwitchError::Timeout { received }) => {
                Err(CommandError::LinkTimeout { received })
            }
            Err(SwitchError::Io(err)) => {
                tracing::error!(?err, "switch valve link failed");
                Err(CommandError::Hardware(Subsystem::SwitchValve))
            }
        }
    }

    fn apply_switch_reply(
        &mut self,
        command: &SwitchCommand,
        request: &SwitchFrame,
        reply: &SwitchFrame,
    ) {
        let well_formed = reply.is_well_formed();
        match command {
            SwitchCommand::GotoChannel(_) => self.state.switch_channel = request.param(),
            SwitchCommand::Reset => self.state.switch_channel = 0,
            SwitchCommand::Check if well_formed && (1..=CHANNEL_COUNT).contains(&reply.param()) => {
                self.state.switch_channel = reply.param();
            }
            SwitchCommand::Check | SwitchCommand::Status | SwitchCommand::Raw(_) => {}
        }
        if well_formed {
            self.sink.push(format!("switch valve reply: {reply}"));
        } else {
            tracing::warn!(%reply, "malformed switch valve reply");
            self.sink
                .push(format!("switch valve reply (malformed): {reply}"));
        }
    }

    fn solenoid_command(
        &mut self,
        args: &[&str],
    ) -> Result<(), CommandError> {
        let mask = match *args {
            ["-s"] => {
                self.sink.push(format!("{}", self.state.solenoids));
                return Ok(());
            }
            ["-d", value] => SolenoidMask::from_decimal(parse_i32(value)?)?,
            ["-b", value] => SolenoidMask::parse_binary(value)?,
            ["-h", value] => SolenoidMask::parse_hex(value)?,
            ["-c", channel, open] => {
                let channel = parse_i32(channel)?;
                let open = parse_i32(open)? != 0;
                let mut mask = self.state.solenoids;
                mask.set_channel(channel, open)?;
                mask
            }
            _ => return Err(CommandError::Grammar(Subsystem::Solenoid)),
        };
        self.state.solenoids = mask;
        self.write_solenoids()?;
        self.sink.push(format!("{mask}"));
        Ok(())
    }

    fn pressure_command(
        &mut self,
        args: &[&str],
    ) -> Result<(), CommandError> {
        match *args {
            ["-max", value] => {
                let max = parse_i32(value)?;
                let clamped = self.state.pressure.set_max(max)?;
                let code = self.write_pressure()?;
                let current = self.state.pressure.current();
                if clamped {
                    self.sink.push(format!(
                        "max pressure set to {max} kPa, output pressure lowered to {current} kPa \
                         (DAC code {code})"
                    ));
                } else {
                    self.sink
                        .push(format!("max pressure set to {max} kPa (DAC code {code})"));
                }
            }
            ["-p", value] => {
                let pressure = parse_i32(value)?;
                self.state.pressure.set_current(pressure)?;
                let code = self.write_pressure()?;
                self.sink
                    .push(format!("output pressure set to {pressure} kPa (DAC code {code})"));
            }
            _ => return Err(CommandError::Grammar(Subsystem::ProportionalValve)),
        }
        Ok(())
    }

    fn light_command(
        &mut self,
        args: &[&str],
    ) -> Result<(), CommandError> {
        match *args {
            ["-on"] => {
                self.state.light.on = true;
                self.render_light()?;
                self.sink.push(format!(
                    "light on, brightness {}",
                    self.state.light.brightness
                ));
            }
            ["-off"] => {
                self.state.light.on = false;
                self.render_light()?;
                self.sink.push("light off");
            }
            ["-b", value] => {
                let brightness = parse_i32(value)?;
                RangeError::check(
                    "brightness",
                    Interval::Closed(0.0, 255.0),
                    "",
                    brightness as f32,
                )?;
                self.state.light.brightness = brightness as u8;
                if self.state.light.on {
                    self.render_light()?;
                }
                self.sink.push(format!("brightness set to {brightness}"));
            }
            _ => return Err(CommandError::Grammar(Subsystem::Light)),
        }
        Ok(())
    }
}
