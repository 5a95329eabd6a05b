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

use std::path::Path;

use crate::actuation::gpio::PinMap;
use crate::constants::{NUM_AXIS, NUM_COIL_PIN};
use crate::error::{InstrumentError, Result};
use crate::utility::{get_parameter, get_parameter_array};

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigController {
    // Default port of the setpoint server.
    pub port: i32,
    // Sleep time of the server in millisecond when there is no message.
    pub timeout: u64,
    // Gear ratio of the pulleys.
    pub gear_ratio: f64,
    // Sweep angle of the potentiometer in degree.
    pub potentiometer_degrees: f64,
    // Full steps of the motor for one revolution.
    pub steps_per_revolution: f64,
    // Time in millisecond to hold the coil pattern.
    pub dwell_time: u64,
    // Tracked unit values at startup. The index is `Axis::index()`.
    pub initial_values: [i32; NUM_AXIS],
    // Map of the pins.
    pub pin_map: PinMap,
}

impl ConfigController {
    /// Create a new config object of the actuator controller.
    ///
    /// # Arguments
    /// * `filepath` - The path to the controller parameters file.
    ///
    /// # Returns
    /// A new config object.
    ///
    /// # Errors
    /// If any parameter is missing or invalid.
    pub fn new(filepath: &Path) -> Result<Self> {
        Ok(Self {
            port: get_parameter(filepath, "port")?,
            timeout: get_parameter(filepath, "timeout")?,

            gear_ratio: get_parameter(filepath, "gear_ratio")?,
            potentiometer_degrees: get_parameter(filepath, "potentiometer_degrees")?,
            steps_per_revolution: get_parameter(filepath, "steps_per_revolution")?,

            dwell_time: get_parameter(filepath, "dwell_time")?,

            initial_values: [
                get_parameter(filepath, "initial_acceleration")?,
                get_parameter(filepath, "initial_deflection")?,
                get_parameter(filepath, "initial_magnetizing_current")?,
            ],

            pin_map: PinMap {
                coils: [
                    Self::read_pins(filepath, "pins_acceleration")?,
                    Self::read_pins(filepath, "pins_deflection")?,
                    Self::read_pins(filepath, "pins_magnetizing_current")?,
                ],
                relays: Self::read_pins(filepath, "pins_relay")?,
            },
        })
    }

    /// Read the four pins of a group.
    ///
    /// # Arguments
    /// * `filepath` - The path to the controller parameters file.
    /// * `key` - Key of the pins.
    ///
    /// # Returns
    /// Four pins.
    fn read_pins(filepath: &Path, key: &str) -> Result<[u32; NUM_COIL_PIN]> {
        let pins: Vec<u32> = get_parameter_array(filepath, key)?;
        let number = pins.len();

        pins.try_into().map_err(|_| InstrumentError::Config {
            key: String::from(key),
            message: format!("should have {NUM_COIL_PIN} pins instead of {number}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSynchronizer {
    // Host of the actuator controller.
    pub host: String,
    // Port of the actuator controller.
    pub port: i32,
    // Poll interval of the store in millisecond.
    pub poll_interval: u64,
    // Timeout of the remote procedure call in millisecond.
    pub timeout: u64,
    // Path of the SQLite database.
    pub database: String,
    // Table of the setpoints in the database.
    pub table: String,
}

impl ConfigSynchronizer {
    /// Create a new config object of the synchronizer.
    ///
    /// # Arguments
    /// * `filepath` - The path to the synchronizer parameters file.
    ///
    /// # Returns
    /// A new config object.
    ///
    /// # Errors
    /// If any parameter is missing or invalid.
    pub fn new(filepath: &Path) -> Result<Self> {
        Ok(Self {
            host: get_parameter(filepath, "host")?,
            port: get_parameter(filepath, "port")?,
            poll_interval: get_parameter(filepath, "poll_interval")?,
            timeout: get_parameter(filepath, "timeout")?,
            database: get_parameter(filepath, "database")?,
            table: get_parameter(filepath, "table")?,
        })
    }
}
