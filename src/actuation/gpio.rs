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

use log::debug;
use std::collections::HashMap;
use sysfs_gpio::{Direction, Pin};

use crate::constants::{NUM_AXIS, NUM_COIL_PIN, NUM_PIN, NUM_RELAY_PIN};
use crate::enums::{Axis, PinLevel, PinMode};
use crate::error::{InstrumentError, Result};

/// Capability to drive the GPIO pins.
pub trait Gpio: Send {
    /// Set the direction of the pin.
    ///
    /// # Arguments
    /// * `pin` - Pin number.
    /// * `mode` - Direction of the pin.
    ///
    /// # Errors
    /// If the hardware rejects the request.
    fn set_pin_mode(&mut self, pin: u32, mode: PinMode) -> Result<()>;

    /// Write the level of the output pin.
    ///
    /// # Arguments
    /// * `pin` - Pin number.
    /// * `level` - Level to write.
    ///
    /// # Errors
    /// If the hardware rejects the request.
    fn write_pin(&mut self, pin: u32, level: PinLevel) -> Result<()>;
}

/// Map of the 16 logical pins to the physical pins.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PinMap {
    // Coil pins A to D of each axis. The index is `Axis::index()`.
    pub coils: [[u32; NUM_COIL_PIN]; NUM_AXIS],
    // Relay pins 1 to 4.
    pub relays: [u32; NUM_RELAY_PIN],
}

impl PinMap {
    /// Get the coil pins of the axis.
    ///
    /// # Arguments
    /// * `axis` - Axis.
    ///
    /// # Returns
    /// Coil pins A to D.
    pub fn get_coils(&self, axis: Axis) -> [u32; NUM_COIL_PIN] {
        self.coils[axis.index()]
    }

    /// Get all the pins with the level they should have at the idle state:
    /// coils low and relays high (de-energized).
    ///
    /// # Returns
    /// Pins and their idle levels.
    pub fn get_idle_levels(&self) -> Vec<(u32, PinLevel)> {
        let mut levels = Vec::with_capacity(NUM_PIN);
        for coils in self.coils.iter() {
            levels.extend(coils.iter().map(|pin| (*pin, PinLevel::Low)));
        }
        levels.extend(self.relays.iter().map(|pin| (*pin, PinLevel::High)));

        levels
    }
}

/// GPIO through the sysfs interface of the Linux kernel.
#[derive(Default)]
pub struct SysfsGpio {
    // Exported pins.
    _pins: HashMap<u32, Pin>,
}

impl SysfsGpio {
    /// Create a new sysfs GPIO.
    ///
    /// # Returns
    /// New sysfs GPIO without any exported pin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the pin is exported by this GPIO.
    pub fn is_exported(&self, pin: u32) -> bool {
        self._pins.contains_key(&pin)
    }

    /// Get the exported pin or the pin of the number.
    fn get_pin(&self, pin: u32) -> Pin {
        match self._pins.get(&pin) {
            Some(exported) => *exported,
            None => Pin::new(u64::from(pin)),
        }
    }
}

/// Map the sysfs error to the hardware error of the pin.
fn to_hardware_error(pin: u32, error: sysfs_gpio::Error) -> InstrumentError {
    InstrumentError::HardwareWrite {
        pin,
        message: error.to_string(),
    }
}

impl Gpio for SysfsGpio {
    fn set_pin_mode(&mut self, pin: u32, mode: PinMode) -> Result<()> {
        let gpio_pin = self.get_pin(pin);
        if !self.is_exported(pin) {
            debug!("Export the GPIO pin {pin}.");
            gpio_pin
                .export()
                .map_err(|error| to_hardware_error(pin, error))?;
        }

        let direction = match mode {
            PinMode::Input => Direction::In,
            PinMode::Output => Direction::Out,
        };
        gpio_pin
            .set_direction(direction)
            .map_err(|error| to_hardware_error(pin, error))?;

        self._pins.insert(pin, gpio_pin);

        Ok(())
    }

    fn write_pin(&mut self, pin: u32, level: PinLevel) -> Result<()> {
        self.get_pin(pin)
            .set_value(level as u8)
            .map_err(|error| to_hardware_error(pin, error))
    }
}
