//! Stepper pump control.
//!
//! Acceleration and velocity ramping belong to the motion collaborator behind
//! `MotionControl`; this module only decides speeds, relative targets and when a
//! move has finished. `PumpDrive` never stores state of its own: the caller hands
//! in the pump's `PumpState` from the state store.

use super::{
    error::{Interval, RangeError},
    state::PumpState,
};
use crate::utils::math::fluidics::{
    PumpGeometry, FINETUNE_FAST, FINETUNE_SLOW, FINETUNE_VOLUME_ML, MM_PER_ML,
};

/// Motion-profile collaborator driving one stepper.
pub trait MotionControl {
    /// Speed ceiling of the profile (microsteps/s).
    fn set_max_speed(
        &mut self,
        steps_per_s: f32,
    );

    fn set_acceleration(
        &mut self,
        steps_per_s2: f32,
    );

    fn set_current_position(
        &mut self,
        position: i64,
    );

    /// Queue a relative move of `steps` microsteps from the current position.
    fn move_by(
        &mut self,
        steps: i64,
    );

    /// Decelerate to rest as quickly as the acceleration allows.
    fn stop(&mut self);

    /// Microsteps remaining until the current target.
    fn distance_to_go(&self) -> i64;

    /// Advance the profile by one scheduling quantum.
    fn run(&mut self);

    /// Power the driver stage.
    fn set_enabled(
        &mut self,
        enabled: bool,
    );
}

/// Syringe jog selected by `sp -ft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finetune {
    FastUp,
    SlowUp,
    SlowDown,
    FastDown,
}

impl Finetune {
    /// Decode the `0..=3` argument of `sp -ft`.
    pub fn from_code(code: i32) -> Result<Self, RangeError> {
        match code {
            0 => Ok(Finetune::FastUp),
            1 => Ok(Finetune::SlowUp),
            2 => Ok(Finetune::SlowDown),
            3 => Ok(Finetune::FastDown),
            _ => Err(RangeError {
                quantity: "fine-tune mode",
                interval: Interval::Closed(0.0, 3.0),
                unit: "",
            }),
        }
    }

    /// Override speed (microsteps/s), independent of the cruise speed.
    pub fn speed(self) -> f32 {
        match self {
            Finetune::FastUp | Finetune::FastDown => FINETUNE_FAST,
            Finetune::SlowUp | Finetune::SlowDown => FINETUNE_SLOW,
        }
    }

    /// Signed plunger travel (mm) of the jog: far enough to only end on `sp -s`.
    pub fn travel_mm(self) -> f32 {
        let distance = FINETUNE_VOLUME_ML * MM_PER_ML;
        match self {
            Finetune::FastUp | Finetune::SlowUp => distance,
            Finetune::SlowDown | Finetune::FastDown => -distance,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Finetune::FastUp => "syringe pump jogging up fast",
            Finetune::SlowUp => "syringe pump jogging up slowly",
            Finetune::SlowDown => "syringe pump jogging down slowly",
            Finetune::FastDown => "syringe pump jogging down fast",
        }
    }
}

/// One stepper pump: its motion collaborator and drive geometry.
pub struct PumpDrive<M> {
    motor: M,
    geometry: PumpGeometry,
}

impl<M: MotionControl> PumpDrive<M> {
    pub fn new(
        motor: M,
        geometry: PumpGeometry,
    ) -> Self {
        Self { motor, geometry }
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn geometry(&self) -> &PumpGeometry {
        &self.geometry
    }

    /// Push the boot configuration to the motion collaborator.
    pub fn configure(
        &mut self,
        state: &PumpState,
        acceleration: f32,
    ) {
        self.motor.set_max_speed(state.speed);
        self.motor.set_acceleration(acceleration);
        self.motor.set_current_position(0);
        self.motor.set_enabled(false);
    }

    /// Store a new cruise speed and apply it immediately.
    pub fn set_speed(
        &mut self,
        state: &mut PumpState,
        steps_per_s: f32,
    ) {
        state.speed = steps_per_s;
        self.motor.set_max_speed(steps_per_s);
    }

    /// Start a relative move of `units` (mm or revolutions) at cruise speed.
    pub fn move_units(
        &mut self,
        state: &mut PumpState,
        units: f32,
    ) {
        let steps = self.geometry.steps_for(units);
        self.motor.set_max_speed(state.speed);
        self.start(state, steps);
    }

    /// Start a jog at the fine-tune speed; the cruise speed in `state` is kept.
    pub fn finetune(
        &mut self,
        state: &mut PumpState,
        jog: Finetune,
    ) {
        let steps = self.geometry.steps_for(jog.travel_mm());
        self.motor.set_max_speed(jog.speed());
        self.start(state, steps);
    }

    fn start(
        &mut self,
        state: &mut PumpState,
        steps: i64,
    ) {
        self.motor.set_enabled(true);
        self.motor.move_by(steps);
        state.moving = true;
        tracing::info!(steps, speed = state.speed, "pump move started");
    }

    /// Stop and re-apply the cruise speed so no override outlives the move.
    pub fn stop(
        &mut self,
        state: &mut PumpState,
    ) {
        self.motor.stop();
        self.motor.set_max_speed(state.speed);
        state.moving = false;
    }

    /// Advance one quantum. Returns `true` on the tick a move is found finished.
    pub fn maintain(
        &mut self,
        state: &mut PumpState,
    ) -> bool {
        let finished = if self.motor.distance_to_go() != 0 {
            self.motor.run();
            false
        } else if state.moving {
            state.moving = false;
            self.motor.set_max_speed(state.speed);
            true
        } else {
            false
        };
        self.motor.set_enabled(state.moving);
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Motor {
        max_speed: f32,
        remaining: i64,
        enabled: bool,
    }

    impl MotionControl for Motor {
        fn set_max_speed(
            &mut self,
            steps_per_s: f32,
        ) {
            self.max_speed = steps_per_s;
        }

        fn set_acceleration(
            &mut self,
            _steps_per_s2: f32,
        ) {
        }

        fn set_current_position(
            &mut self,
            _position: i64,
        ) {
            self.remaining = 0;
        }

        fn move_by(
            &mut self,
            steps: i64,
        ) {
            self.remaining += steps;
        }

        fn stop(&mut self) {
            self.remaining = 0;
        }

        fn distance_to_go(&self) -> i64 {
            self.remaining
        }

        fn run(&mut self) {
            self.remaining -= self.remaining.signum() * self.remaining.abs().min(1000);
        }

        fn set_enabled(
            &mut self,
            enabled: bool,
        ) {
            self.enabled = enabled;
        }
    }

    fn syringe() -> (PumpDrive<Motor>, PumpState) {
        let state = PumpState {
            speed: 3200.0,
            moving: false,
        };
        let mut drive = PumpDrive::new(Motor::default(), PumpGeometry::SYRINGE);
        drive.configure(&state, 200_000.0);
        (drive, state)
    }

    #[test]
    fn test_finetune_codes() {
        assert_eq!(Finetune::from_code(0), Ok(Finetune::FastUp));
        assert_eq!(Finetune::from_code(3), Ok(Finetune::FastDown));
        assert!(Finetune::from_code(4).is_err());
        assert!(Finetune::from_code(-1).is_err());
        assert!(Finetune::SlowDown.travel_mm() < 0.0);
    }

    #[test]
    fn test_stop_after_finetune_restores_cruise_speed() {
        let (mut drive, mut state) = syringe();
        drive.finetune(&mut state, Finetune::FastUp);
        assert_eq!(drive.motor().max_speed, FINETUNE_FAST);
        assert!(state.moving);

        drive.stop(&mut state);
        assert_eq!(drive.motor().max_speed, 3200.0);
        assert_eq!(state.speed, 3200.0);
        assert!(!state.moving);
    }

    #[test]
    fn test_move_runs_to_completion() {
        let (mut drive, mut state) = syringe();
        // 0.1 mm = 1600 microsteps, two quanta of the test motor.
        drive.move_units(&mut state, 0.1);
        assert!(drive.motor().enabled);
        assert!(!drive.maintain(&mut state));
        assert!(!drive.maintain(&mut state));
        assert!(drive.maintain(&mut state));
        assert!(!state.moving);
        assert!(!drive.motor().enabled);
        assert!(!drive.maintain(&mut state));
    }
}
