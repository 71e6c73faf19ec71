//! Fluid-geometry conversions for the stepper-driven pumps.
//!
//! `PumpGeometry` maps between the units an operator types (millimetres of
//! plunger travel, pump-head revolutions, millilitres, mL/s) and the microstep
//! counts and step rates the motion collaborator understands.
//!
//! # Example
//! ```rust
//! use fcb_core::utils::math::fluidics::PumpGeometry;
//! let steps = PumpGeometry::PERISTALTIC.steps_for(2.0);
//! assert_eq!(steps, 3200);
//! ```

/// Full steps per motor revolution.
pub const STEPS_PER_REV: f32 = 200.0;
/// Lead-screw pitch of the syringe drive (mm per revolution).
pub const SCREW_PITCH_MM: f32 = 0.8;
pub const SYRINGE_MICROSTEPS: f32 = 64.0;
pub const PERISTALTIC_MICROSTEPS: f32 = 8.0;
/// Plunger travel per millilitre (mm/mL).
pub const MM_PER_ML: f32 = 3.51;
/// Peristaltic pump-head revolutions per millilitre.
pub const REV_PER_ML: f32 = 9.524;

/// Syringe flow ceiling (mL/s). The fast fine-tune speed is derived from it.
pub const SYRINGE_MAX_FLOW: f32 = 0.5;
pub const PERISTALTIC_MAX_FLOW: f32 = 0.5;

/// Fast fine-tune speed (microsteps/s), also the ceiling for raw syringe speeds.
pub const FINETUNE_FAST: f32 =
    SYRINGE_MAX_FLOW * MM_PER_ML / SCREW_PITCH_MM * STEPS_PER_REV * SYRINGE_MICROSTEPS;
/// Slow fine-tune speed (microsteps/s), 0.05 mL/s.
pub const FINETUNE_SLOW: f32 =
    0.05 * MM_PER_ML / SCREW_PITCH_MM * STEPS_PER_REV * SYRINGE_MICROSTEPS;
/// Ceiling for raw peristaltic speeds (microsteps/s).
pub const PERISTALTIC_MAX_MICROSTEP: f32 =
    PERISTALTIC_MAX_FLOW * REV_PER_ML * STEPS_PER_REV * PERISTALTIC_MICROSTEPS;

/// Longest relative move (microsteps) a motion collaborator with 32-bit
/// position counters can take.
pub const MAX_MOVE_STEPS: i64 = i32::MAX as i64;

/// Volume a fine-tune jog is allowed to travel before it has to be stopped.
pub const FINETUNE_VOLUME_ML: f32 = 30.0;

/// Drive geometry of one pump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpGeometry {
    /// Microsteps per full step configured on the driver.
    pub microsteps: f32,
    /// Distance units covered by one motor revolution (mm for the syringe,
    /// revolutions for the peristaltic head).
    pub units_per_rev: f32,
    /// Distance units per millilitre pumped.
    pub units_per_ml: f32,
    /// Flow ceiling (mL/s) accepted for volume-speed commands.
    pub max_flow: f32,
}

impl PumpGeometry {
    pub const SYRINGE: Self = Self {
        microsteps: SYRINGE_MICROSTEPS,
        units_per_rev: SCREW_PITCH_MM,
        units_per_ml: MM_PER_ML,
        max_flow: SYRINGE_MAX_FLOW,
    };

    pub const PERISTALTIC: Self = Self {
        microsteps: PERISTALTIC_MICROSTEPS,
        units_per_rev: 1.0,
        units_per_ml: REV_PER_ML,
        max_flow: PERISTALTIC_MAX_FLOW,
    };

    /// Microsteps per distance unit.
    pub fn steps_per_unit(&self) -> f32 {
        STEPS_PER_REV * self.microsteps / self.units_per_rev
    }

    /// Relative move in microsteps for a signed distance. Truncates toward zero.
    pub fn steps_for(
        &self,
        units: f32,
    ) -> i64 {
        (units * self.steps_per_unit()) as i64
    }

    /// Largest whole distance whose move fits in `MAX_MOVE_STEPS`.
    pub fn max_units(&self) -> f32 {
        libm::floorf(MAX_MOVE_STEPS as f32 / self.steps_per_unit())
    }

    /// Largest whole volume (mL) whose move fits in `MAX_MOVE_STEPS`.
    pub fn max_volume(&self) -> f32 {
        libm::floorf(self.max_units() / self.units_per_ml)
    }

    /// Distance units for a signed volume (mL).
    pub fn units_for_volume(
        &self,
        ml: f32,
    ) -> f32 {
        ml * self.units_per_ml
    }

    /// Step rate (microsteps/s) for a flow rate (mL/s).
    pub fn flow_to_step_rate(
        &self,
        ml_per_s: f32,
    ) -> f32 {
        self.units_for_volume(ml_per_s) * self.steps_per_unit()
    }

    /// Motor revolutions per second at a given step rate.
    pub fn step_rate_to_rps(
        &self,
        steps_per_s: f32,
    ) -> f32 {
        steps_per_s / self.microsteps / STEPS_PER_REV
    }

    /// Motor revolutions per second at a given flow rate.
    pub fn flow_to_rps(
        &self,
        ml_per_s: f32,
    ) -> f32 {
        self.units_for_volume(ml_per_s) / self.units_per_rev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(
        a: f32,
        b: f32,
    ) -> bool {
        (a - b).abs() <= b.abs() * 1e-4
    }

    #[test]
    fn test_finetune_constants() {
        assert!(close(FINETUNE_FAST, 28_080.0));
        assert!(close(FINETUNE_SLOW, 2_808.0));
        assert!(close(PERISTALTIC_MAX_MICROSTEP, 7_619.2));
    }

    #[test]
    fn test_syringe_steps() {
        assert_eq!(PumpGeometry::SYRINGE.steps_for(2.5), 40_000);
        assert_eq!(PumpGeometry::SYRINGE.steps_for(-2.5), -40_000);
    }

    #[test]
    fn test_largest_moves_fit_the_step_counter() {
        for geometry in [PumpGeometry::SYRINGE, PumpGeometry::PERISTALTIC] {
            let furthest = geometry.steps_for(geometry.max_units());
            assert!(furthest > 0 && furthest <= MAX_MOVE_STEPS);
            let by_volume = geometry.steps_for(geometry.units_for_volume(geometry.max_volume()));
            assert!(by_volume > 0 && by_volume <= MAX_MOVE_STEPS);
            assert!(geometry.steps_for(-geometry.max_units()) >= -MAX_MOVE_STEPS);
        }
        assert_eq!(PumpGeometry::SYRINGE.max_units(), 134_217.0);
        assert_eq!(PumpGeometry::PERISTALTIC.max_units(), 1_342_177.0);
    }

    #[test]
    fn test_flow_to_step_rate_matches_ceiling() {
        let syringe = PumpGeometry::SYRINGE;
        assert!(close(syringe.flow_to_step_rate(SYRINGE_MAX_FLOW), FINETUNE_FAST));
        let pp = PumpGeometry::PERISTALTIC;
        assert!(close(
            pp.flow_to_step_rate(PERISTALTIC_MAX_FLOW),
            PERISTALTIC_MAX_MICROSTEP
        ));
    }

    #[test]
    fn test_rps() {
        // 3200 microsteps/s at 64x microstepping is a quarter turn per second.
        assert!(close(PumpGeometry::SYRINGE.step_rate_to_rps(3200.0), 0.25));
        assert!(close(PumpGeometry::SYRINGE.flow_to_rps(0.1), 0.43875));
        assert!(close(PumpGeometry::PERISTALTIC.flow_to_rps(0.1), 0.9524));
    }
}
