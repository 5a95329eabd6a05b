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

use strum_macros::{AsRefStr, EnumIter, FromRepr};

/// Continuous axis driven by a stepper motor through a potentiometer.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, EnumIter, AsRefStr)]
pub enum Axis {
    Acceleration,
    Deflection,
    MagnetizingCurrent,
}

impl Axis {
    /// Index of the axis in the per-axis arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Polarity of the deflecting plates.
#[derive(FromRepr, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[repr(u8)]
pub enum DeflectingPolarity {
    #[default]
    Off = 0,
    Positive = 1,
    Negative = 2,
}

/// Direction of the magnetic arc.
#[derive(FromRepr, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[repr(u8)]
pub enum MagneticArcDirection {
    #[default]
    Off = 0,
    Clockwise = 1,
    CounterClockwise = 2,
}

/// Group of the relay pins. The value is the offset of the first pin in the
/// relay bank.
#[derive(FromRepr, Debug, PartialEq, Eq, Clone, Copy, AsRefStr)]
#[repr(u8)]
pub enum RelayGroup {
    MagneticArc = 0,
    DeflectingPolarity = 2,
}

impl RelayGroup {
    /// Offset of the first pin of the group in the relay bank.
    pub fn offset(&self) -> usize {
        *self as usize
    }
}

/// Direction of the GPIO pin.
#[derive(Debug, PartialEq, Eq, Clone, Copy, AsRefStr)]
pub enum PinMode {
    Input,
    Output,
}

/// Level of the GPIO pin.
#[derive(FromRepr, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum PinLevel {
    Low = 0,
    High = 1,
}

impl From<bool> for PinLevel {
    fn from(is_high: bool) -> Self {
        if is_high {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

/// State of the setpoint synchronizer.
#[derive(Debug, PartialEq, Eq, Clone, Copy, AsRefStr)]
pub enum SyncState {
    // Waiting for the next poll tick.
    Idle,
    // The remote procedure call is in flight.
    Delivering,
}

#[cfg(test)]
mod tests {
    use super::*;

    use strum::IntoEnumIterator;

    #[test]
    fn test_axis_index() {
        let indices: Vec<usize> = Axis::iter().map(|axis| axis.index()).collect();

        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_from_repr() {
        assert_eq!(
            DeflectingPolarity::from_repr(2),
            Some(DeflectingPolarity::Negative)
        );
        assert_eq!(DeflectingPolarity::from_repr(3), None);

        assert_eq!(
            MagneticArcDirection::from_repr(1),
            Some(MagneticArcDirection::Clockwise)
        );
        assert_eq!(MagneticArcDirection::from_repr(7), None);
    }

    #[test]
    fn test_relay_group_offset() {
        assert_eq!(RelayGroup::MagneticArc.offset(), 0);
        assert_eq!(RelayGroup::DeflectingPolarity.offset(), 2);
    }

    #[test]
    fn test_pin_level_from_bool() {
        assert_eq!(PinLevel::from(true), PinLevel::High);
        assert_eq!(PinLevel::from(false), PinLevel::Low);
    }
}
