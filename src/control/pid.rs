//! PI controller for stirrer speed.
//!
//! The H-bridge speed byte is centred on `mid_output`, so the controller
//! adds its correction to that offset instead of to zero.  The integral
//! term is bounded so it cannot alone drive the output past full scale.

use crate::config::MotorTuning;

/// One planned controller step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlStep {
    measured: f32,
    integral: f32,
    output: u8,
}

impl ControlStep {
    pub fn output(&self) -> u8 {
        self.output
    }
}

/// Speed controller state.  Every field stays within its bounds after
/// any sequence of calls.
#[derive(Debug, Clone)]
pub struct SpeedController {
    tuning: MotorTuning,
    setpoint: f32,
    measured: f32,
    integral: f32,
    output: u8,
}

impl SpeedController {
    pub fn new(tuning: MotorTuning) -> Self {
        Self {
            tuning,
            setpoint: 0.0,
            measured: 0.0,
            integral: 0.0,
            output: 0,
        }
    }

    /// Set the target speed, clamped to `[0, max_rpm]`.
    pub fn set_target(&mut self, rpm: f32) {
        self.setpoint = if rpm.is_finite() {
            rpm.clamp(0.0, self.tuning.max_rpm)
        } else {
            0.0
        };
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn measured(&self) -> f32 {
        self.measured
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn output(&self) -> u8 {
        self.output
    }

    fn integral_bound(&self) -> f32 {
        if self.tuning.ki > 0.0 {
            self.tuning.max_output / self.tuning.ki
        } else {
            0.0
        }
    }

    /// Work out the next step for `measured` without changing any state.
    ///
    /// `None` when the measurement is implausible and the step should be
    /// skipped.  Nothing is integrated until the step is [`commit`]ted, so
    /// a step whose output never reaches the motor leaves no trace.
    ///
    /// [`commit`]: Self::commit
    pub fn plan(&self, measured: f32) -> Option<ControlStep> {
        if !measured.is_finite() || measured < 0.0 || measured > self.tuning.plausible_rpm {
            return None;
        }
        if self.setpoint <= 0.0 {
            return Some(ControlStep {
                measured,
                integral: 0.0,
                output: 0,
            });
        }

        let error = self.setpoint - measured;
        let bound = self.integral_bound();
        let integral = (self.integral + error).clamp(-bound, bound);

        let correction = (self.tuning.kp * error + self.tuning.ki * integral).round();
        let output = (self.tuning.mid_output + correction).clamp(0.0, self.tuning.max_output);
        Some(ControlStep {
            measured,
            integral,
            output: output as u8,
        })
    }

    /// Adopt a planned step once its output has been applied.
    pub fn commit(&mut self, step: ControlStep) {
        self.measured = step.measured;
        self.integral = step.integral;
        self.output = step.output;
    }

    /// Plan and commit in one go.
    pub fn compute(&mut self, measured: f32) -> Option<u8> {
        let step = self.plan(measured)?;
        self.commit(step);
        Some(step.output)
    }

    /// Zero the integral and the output.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.output = 0;
    }
}
