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

// Continuous axes driven by the stepper motors.
pub const NUM_AXIS: usize = 3;

// Coil pins of one stepper motor.
pub const NUM_COIL_PIN: usize = 4;

// Relay pins: two for the magnetic arc and two for the deflecting polarity.
pub const NUM_RELAY_PIN: usize = 4;

pub const NUM_PIN: usize = NUM_AXIS * NUM_COIL_PIN + NUM_RELAY_PIN;

// Number of the fields in the setpoint vector.
pub const NUM_SETPOINT_FIELD: usize = 5;

// Steps of the 28BYJ-48 stepper motor for one revolution of the output shaft
// in the full-step mode.
pub const STEPS_PER_REVOLUTION: f64 = 2036.8;

// Full-scale units of each axis.
pub const FULL_SCALE_ACCELERATION: f64 = 250.0;
pub const FULL_SCALE_DEFLECTION: f64 = 200.0;
// Unit is 0.01 ampere.
pub const FULL_SCALE_MAGNETIZING_CURRENT: f64 = 300.0;

// Domain of the setpoints.
pub const RANGE_ACCELERATING_VOLTAGE: (i32, i32) = (0, 250);
pub const RANGE_DEFLECTING_VOLTAGE: (i32, i32) = (50, 250);
pub const RANGE_MAGNETIZING_CURRENT: (i32, i32) = (0, 300);

pub const LOCAL_HOST: &str = "127.0.0.1";
pub const ALL_HOST: &str = "0.0.0.0";
pub const TERMINATOR: &[u8; 2] = b"\r\n";

// Name of the only command of the remote procedure call.
pub const COMMAND_SET_VARIABLES: &str = "cmd_setVariables";
// Name of the reply to the command.
pub const REPLY_VARIABLES_SET: &str = "variablesSet";

pub const CONFIG_FILE_CONTROLLER: &str = "config/parameters_controller.yaml";
pub const CONFIG_FILE_SYNCHRONIZER: &str = "config/parameters_synchronizer.yaml";
