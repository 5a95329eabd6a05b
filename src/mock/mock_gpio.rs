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

use std::collections::HashMap;

use crate::actuation::gpio::Gpio;
use crate::enums::{PinLevel, PinMode};
use crate::error::{InstrumentError, Result};

/// Call made to the GPIO.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum GpioCall {
    SetPinMode(u32, PinMode),
    WritePin(u32, PinLevel),
}

/// Mock GPIO to simulate the hardware. It records all the calls in order.
#[derive(Default)]
pub struct MockGpio {
    // Calls in the order they are made.
    pub calls: Vec<GpioCall>,
    // Current levels of the pins.
    _levels: HashMap<u32, PinLevel>,
    // Pin that fails to be written.
    _failing_pin: Option<u32>,
}

impl MockGpio {
    /// Create a new mock GPIO.
    ///
    /// # Returns
    /// New mock GPIO.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the writes to the pin fail.
    ///
    /// # Arguments
    /// * `pin` - Pin to fail. Put None to clear the failure.
    pub fn set_failing_pin(&mut self, pin: Option<u32>) {
        self._failing_pin = pin;
    }

    /// Get the current level of the pin.
    ///
    /// # Arguments
    /// * `pin` - Pin number.
    ///
    /// # Returns
    /// Level of the pin. None if the pin was never written.
    pub fn get_level(&self, pin: u32) -> Option<PinLevel> {
        self._levels.get(&pin).copied()
    }

    /// Get the written levels of the pin in order.
    ///
    /// # Arguments
    /// * `pin` - Pin number.
    ///
    /// # Returns
    /// Written levels.
    pub fn get_writes(&self, pin: u32) -> Vec<PinLevel> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GpioCall::WritePin(written_pin, level) if *written_pin == pin => Some(*level),
                _ => None,
            })
            .collect()
    }

    /// Clear the recorded calls.
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Check the pin is not the failing one.
    fn check_pin(&self, pin: u32) -> Result<()> {
        if self._failing_pin == Some(pin) {
            return Err(InstrumentError::HardwareWrite {
                pin,
                message: String::from("simulated failure"),
            });
        }

        Ok(())
    }
}

impl Gpio for MockGpio {
    fn set_pin_mode(&mut self, pin: u32, mode: PinMode) -> Result<()> {
        self.check_pin(pin)?;
        self.calls.push(GpioCall::SetPinMode(pin, mode));

        Ok(())
    }

    fn write_pin(&mut self, pin: u32, level: PinLevel) -> Result<()> {
        self.check_pin(pin)?;
        self.calls.push(GpioCall::WritePin(pin, level));
        self._levels.insert(pin, level);

        Ok(())
    }
}
