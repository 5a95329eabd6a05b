// This file is part of em_instrument.
//
// Developed for the Vera Rubin Observatory Systems.
// This product includes software developed by the LSST Project
// (https://www.lsst.org).
// See the COPYRIGHT file at the top-level directory of this distribution
// for details of code ownership.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::constants::NUM_COIL_PIN;

// Full-step coil activation of the coils A to D. The four phases are repeated
// so that one cycle of the step counter covers two electrical cycles.
pub const FULL_STEP_SEQUENCE: [[bool; NUM_COIL_PIN]; 8] = [
    [true, true, false, false],
    [false, true, true, false],
    [false, false, true, true],
    [true, false, false, true],
    [true, true, false, false],
    [false, true, true, false],
    [false, false, true, true],
    [true, false, false, true],
];

/// Direction of the stepper move in the unit of the axis.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StepDirection {
    Increase,
    Decrease,
}

/// Calculate the maximum steps the motor should turn for the full sweep of
/// the potentiometer.
///
/// # Arguments
/// * `steps_per_revolution` - Full steps of the motor for one revolution.
/// * `potentiometer_degrees` - Sweep angle of the potentiometer in degree.
/// * `gear_ratio` - Gear ratio of the pulleys.
///
/// # Returns
/// Maximum steps.
pub fn calculate_max_steps(
    steps_per_revolution: f64,
    potentiometer_degrees: f64,
    gear_ratio: f64,
) -> f64 {
    (steps_per_revolution * potentiometer_degrees / 360.0) * gear_ratio
}

/// Calculate the steps for one unit of the axis.
///
/// # Arguments
/// * `max_steps` - Maximum steps of the full sweep.
/// * `full_scale_units` - Units of the full sweep.
///
/// # Returns
/// Steps per unit.
pub fn calculate_steps_per_unit(max_steps: f64, full_scale_units: f64) -> f64 {
    max_steps / full_scale_units
}

/// Calculate the steps to move the axis from the current value to the
/// target.
///
/// # Arguments
/// * `target_units` - Target value in the unit of the axis.
/// * `current_units` - Current tracked value in the unit of the axis.
/// * `steps_per_unit` - Calibration of the axis.
///
/// # Returns
/// A tuple of the step count, the length of the coil sequence, and the
/// direction.
pub fn steps_for(
    target_units: i32,
    current_units: i32,
    steps_per_unit: f64,
) -> (u32, usize, StepDirection) {
    let delta = (target_units as i64) - (current_units as i64);
    let step_count = ((delta.abs() as f64) * steps_per_unit).round() as u32;

    let direction = if delta > 0 {
        StepDirection::Increase
    } else {
        StepDirection::Decrease
    };

    (step_count, FULL_STEP_SEQUENCE.len(), direction)
}

/// Get the index in the coil sequence of one iteration of the move. The
/// increasing move walks the table backward from the step count and the
/// decreasing one walks it forward from zero, so the two directions rotate
/// the motor in opposite senses.
///
/// # Arguments
/// * `iteration` - Iteration of the move, from 0 to `step_count - 1`.
/// * `step_count` - Total steps of the move.
/// * `direction` - Direction of the move.
///
/// # Returns
/// Index in the `FULL_STEP_SEQUENCE`.
pub fn sequence_index(iteration: u32, step_count: u32, direction: StepDirection) -> usize {
    let length = FULL_STEP_SEQUENCE.len() as u32;
    match direction {
        StepDirection::Increase => ((step_count - iteration) % length) as usize,
        StepDirection::Decrease => (iteration % length) as usize,
    }
}
