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

use log::{debug, info};
use std::thread::sleep;
use std::time::Duration;

use crate::actuation::gpio::{Gpio, PinMap};
use crate::config::ConfigController;
use crate::constants::{
    FULL_SCALE_ACCELERATION, FULL_SCALE_DEFLECTION, FULL_SCALE_MAGNETIZING_CURRENT, NUM_AXIS,
    NUM_COIL_PIN, NUM_RELAY_PIN,
};
use crate::enums::{Axis, DeflectingPolarity, MagneticArcDirection, PinLevel, PinMode, RelayGroup};
use crate::error::Result;
use crate::motion::motion_model::{
    calculate_max_steps, calculate_steps_per_unit, sequence_index, steps_for, StepDirection,
    FULL_STEP_SEQUENCE,
};

/// State of one continuous axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisState {
    // Raw step position from the zero reference at the process start.
    pub current_raw_position: i64,
    // Tracked value in the unit of the axis.
    pub current_value: i32,
    // Calibration of the axis.
    pub steps_per_unit: f64,
    // Full-scale units of the axis.
    pub full_scale_units: f64,
    // Coil pins A to D.
    _pins: [u32; NUM_COIL_PIN],
}

impl AxisState {
    /// Create a new axis state.
    ///
    /// # Arguments
    /// * `max_steps` - Maximum steps of the full sweep.
    /// * `full_scale_units` - Units of the full sweep.
    /// * `initial_value` - Tracked value at the start.
    /// * `pins` - Coil pins A to D.
    ///
    /// # Returns
    /// New axis state.
    pub fn new(
        max_steps: f64,
        full_scale_units: f64,
        initial_value: i32,
        pins: [u32; NUM_COIL_PIN],
    ) -> Self {
        Self {
            current_raw_position: 0,
            current_value: initial_value,
            steps_per_unit: calculate_steps_per_unit(max_steps, full_scale_units),
            full_scale_units,
            _pins: pins,
        }
    }
}

/// Levels of the four relay pins.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayBank {
    // Current levels of the relays 1 to 4.
    pub levels: [PinLevel; NUM_RELAY_PIN],
    // Relay pins 1 to 4.
    _pins: [u32; NUM_RELAY_PIN],
}

/// Get the relay pattern of the magnetic arc.
///
/// # Arguments
/// * `arc` - Direction of the magnetic arc.
///
/// # Returns
/// Levels of the two relays of the group.
pub fn pattern_magnetic_arc(arc: MagneticArcDirection) -> [PinLevel; 2] {
    match arc {
        MagneticArcDirection::Off => [PinLevel::High, PinLevel::High],
        MagneticArcDirection::Clockwise => [PinLevel::Low, PinLevel::High],
        MagneticArcDirection::CounterClockwise => [PinLevel::High, PinLevel::Low],
    }
}

/// Get the relay pattern of the deflecting polarity. The negative polarity
/// shares the pattern of the off state, which is how the relays are wired.
///
/// # Arguments
/// * `polarity` - Deflecting polarity.
///
/// # Returns
/// Levels of the two relays of the group.
pub fn pattern_deflecting_polarity(polarity: DeflectingPolarity) -> [PinLevel; 2] {
    match polarity {
        DeflectingPolarity::Off => [PinLevel::High, PinLevel::High],
        DeflectingPolarity::Positive => [PinLevel::Low, PinLevel::Low],
        DeflectingPolarity::Negative => [PinLevel::High, PinLevel::High],
    }
}

pub struct ActuationEngine<G: Gpio> {
    // GPIO capability.
    _gpio: G,
    // States of the axes. The index is `Axis::index()`.
    _axes: [AxisState; NUM_AXIS],
    // Relay bank.
    _relay_bank: RelayBank,
    // Time to hold the coil pattern.
    _dwell_time: Duration,
}

impl<G: Gpio> ActuationEngine<G> {
    /// Create a new actuation engine. All the pins are configured as outputs
    /// and put at the idle levels.
    ///
    /// # Arguments
    /// * `gpio` - GPIO capability.
    /// * `config` - Configuration of the controller.
    ///
    /// # Returns
    /// New actuation engine.
    ///
    /// # Errors
    /// If the pins can not be initialized.
    pub fn new(gpio: G, config: &ConfigController) -> Result<Self> {
        let max_steps = calculate_max_steps(
            config.steps_per_revolution,
            config.potentiometer_degrees,
            config.gear_ratio,
        );
        info!("Maximum steps of the stepper motors: {max_steps}.");

        let pin_map = &config.pin_map;
        let create_axis = |axis: Axis, full_scale_units: f64| {
            AxisState::new(
                max_steps,
                full_scale_units,
                config.initial_values[axis.index()],
                pin_map.get_coils(axis),
            )
        };

        let mut engine = Self {
            _gpio: gpio,
            _axes: [
                create_axis(Axis::Acceleration, FULL_SCALE_ACCELERATION),
                create_axis(Axis::Deflection, FULL_SCALE_DEFLECTION),
                create_axis(Axis::MagnetizingCurrent, FULL_SCALE_MAGNETIZING_CURRENT),
            ],
            _relay_bank: RelayBank {
                levels: [PinLevel::High; NUM_RELAY_PIN],
                _pins: pin_map.relays,
            },
            _dwell_time: Duration::from_millis(config.dwell_time),
        };

        engine.init_pins(pin_map)?;

        Ok(engine)
    }

    /// Configure the pins as outputs and write the idle levels.
    fn init_pins(&mut self, pin_map: &PinMap) -> Result<()> {
        for (pin, level) in pin_map.get_idle_levels() {
            self._gpio.set_pin_mode(pin, PinMode::Output)?;
            self._gpio.write_pin(pin, level)?;
        }

        Ok(())
    }

    /// Get the state of the axis.
    ///
    /// # Arguments
    /// * `axis` - Axis.
    ///
    /// # Returns
    /// State of the axis.
    pub fn get_axis(&self, axis: Axis) -> &AxisState {
        &self._axes[axis.index()]
    }

    /// Get the relay bank.
    ///
    /// # Returns
    /// Relay bank.
    pub fn get_relay_bank(&self) -> &RelayBank {
        &self._relay_bank
    }

    /// Get the GPIO capability.
    ///
    /// # Returns
    /// GPIO capability.
    pub fn get_gpio(&self) -> &G {
        &self._gpio
    }

    /// Get the mutable GPIO capability.
    ///
    /// # Returns
    /// Mutable GPIO capability.
    pub fn get_gpio_mut(&mut self) -> &mut G {
        &mut self._gpio
    }

    /// Move the axis to the target. This blocks for the step count times the
    /// dwell time and can not be interrupted. The tracked value becomes the
    /// target once all the steps are written, there is no feedback of the
    /// real position.
    ///
    /// # Arguments
    /// * `axis` - Axis to move.
    /// * `target_units` - Target in the unit of the axis. It is not checked
    /// against the domain of the axis.
    ///
    /// # Returns
    /// Number of the written coil patterns.
    ///
    /// # Errors
    /// If a pin can not be written. The tracked value is kept in this case.
    pub fn move_axis(&mut self, axis: Axis, target_units: i32) -> Result<u32> {
        let state = &self._axes[axis.index()];
        let pins = state._pins;
        let (step_count, _, direction) =
            steps_for(target_units, state.current_value, state.steps_per_unit);

        debug!(
            "Move the {} axis from {} to {target_units} in {step_count} steps.",
            axis.as_ref(),
            state.current_value
        );

        let raw_step = match direction {
            StepDirection::Increase => 1,
            StepDirection::Decrease => -1,
        };
        for iteration in 0..step_count {
            let pattern = FULL_STEP_SEQUENCE[sequence_index(iteration, step_count, direction)];
            if let Err(error) = self.write_coils(&pins, &pattern) {
                self.release_coils(&pins);
                return Err(error);
            }

            sleep(self._dwell_time);

            // De-assert all the coils before the next step.
            if let Err(error) = self.write_coils(&pins, &[false; NUM_COIL_PIN]) {
                self.release_coils(&pins);
                return Err(error);
            }

            self._axes[axis.index()].current_raw_position += raw_step;
        }

        self._axes[axis.index()].current_value = target_units;

        Ok(step_count)
    }

    /// Write the coil pattern.
    fn write_coils(
        &mut self,
        pins: &[u32; NUM_COIL_PIN],
        pattern: &[bool; NUM_COIL_PIN],
    ) -> Result<()> {
        for (pin, is_high) in pins.iter().zip(pattern.iter()) {
            self._gpio.write_pin(*pin, PinLevel::from(*is_high))?;
        }

        Ok(())
    }

    /// Write all the coils low after a failed write. Every pin is tried and
    /// the errors are ignored, the first error is reported by the caller.
    fn release_coils(&mut self, pins: &[u32; NUM_COIL_PIN]) {
        for pin in pins.iter() {
            let _ = self._gpio.write_pin(*pin, PinLevel::Low);
        }
    }

    /// Set the two relays of the group immediately.
    ///
    /// # Arguments
    /// * `group` - Relay group.
    /// * `pattern` - Levels of the two relays.
    ///
    /// # Errors
    /// If a pin can not be written.
    pub fn set_relay(&mut self, group: RelayGroup, pattern: [PinLevel; 2]) -> Result<()> {
        let offset = group.offset();
        for (idx, level) in pattern.iter().enumerate() {
            self._gpio
                .write_pin(self._relay_bank._pins[offset + idx], *level)?;
            self._relay_bank.levels[offset + idx] = *level;
        }

        Ok(())
    }

    /// Set the relays of the magnetic arc.
    ///
    /// # Arguments
    /// * `arc` - Direction of the magnetic arc.
    ///
    /// # Errors
    /// If a pin can not be written.
    pub fn set_magnetic_arc(&mut self, arc: MagneticArcDirection) -> Result<()> {
        self.set_relay(RelayGroup::MagneticArc, pattern_magnetic_arc(arc))
    }

    /// Set the relays of the deflecting polarity.
    ///
    /// # Arguments
    /// * `polarity` - Deflecting polarity.
    ///
    /// # Errors
    /// If a pin can not be written.
    pub fn set_deflecting_polarity(&mut self, polarity: DeflectingPolarity) -> Result<()> {
        self.set_relay(
            RelayGroup::DeflectingPolarity,
            pattern_deflecting_polarity(polarity),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use std::path::Path;

    use crate::error::InstrumentError;
    use crate::mock::mock_gpio::{GpioCall, MockGpio};

    const EPSILON: f64 = 1e-9;

    fn create_config() -> ConfigController {
        let mut config =
            ConfigController::new(Path::new("config/parameters_controller.yaml")).unwrap();
        config.dwell_time = 0;

        config
    }

    fn create_engine() -> ActuationEngine<MockGpio> {
        let mut engine = ActuationEngine::new(MockGpio::new(), &create_config()).unwrap();
        engine.get_gpio_mut().clear();

        engine
    }

    fn count_patterns(gpio: &MockGpio, pins: &[u32; NUM_COIL_PIN]) -> usize {
        // Each step writes the pattern and then de-asserts, so the first coil
        // is written twice per step.
        gpio.get_writes(pins[0]).len() / 2
    }

    #[test]
    fn test_new() {
        let config = create_config();
        let engine = ActuationEngine::new(MockGpio::new(), &config).unwrap();

        // All the pins are configured and put at the idle levels.
        let gpio = engine.get_gpio();
        assert_eq!(gpio.calls.len(), 32);
        assert_eq!(gpio.calls[0], GpioCall::SetPinMode(17, PinMode::Output));
        assert_eq!(gpio.calls[1], GpioCall::WritePin(17, PinLevel::Low));

        for coils in config.pin_map.coils.iter() {
            for pin in coils {
                assert_eq!(gpio.get_level(*pin), Some(PinLevel::Low));
            }
        }
        for pin in config.pin_map.relays.iter() {
            assert_eq!(gpio.get_level(*pin), Some(PinLevel::High));
        }

        assert_eq!(engine.get_relay_bank().levels, [PinLevel::High; 4]);

        let axis = engine.get_axis(Axis::Acceleration);
        assert_eq!(axis.current_raw_position, 0);
        assert_eq!(axis.current_value, 0);
        assert_relative_eq!(axis.steps_per_unit, 12.2208, epsilon = EPSILON);

        assert_eq!(engine.get_axis(Axis::Deflection).current_value, 50);
        assert_relative_eq!(
            engine.get_axis(Axis::Deflection).full_scale_units,
            200.0
        );
    }

    #[test]
    fn test_new_fail() {
        let mut gpio = MockGpio::new();
        gpio.set_failing_pin(Some(25));

        assert!(matches!(
            ActuationEngine::new(gpio, &create_config()),
            Err(InstrumentError::HardwareWrite { pin: 25, .. })
        ));
    }

    #[test]
    fn test_move_axis() {
        let mut config = create_config();
        // Calibration of 8.1472 steps per volt for the acceleration.
        config.gear_ratio = 1.0;
        config.potentiometer_degrees = 360.0;

        let mut engine = ActuationEngine::new(MockGpio::new(), &config).unwrap();
        engine.get_gpio_mut().clear();

        let pins = config.pin_map.coils[Axis::Acceleration.index()];

        assert_eq!(engine.move_axis(Axis::Acceleration, 10).unwrap(), 81);
        assert_eq!(count_patterns(engine.get_gpio(), &pins), 81);

        let axis = engine.get_axis(Axis::Acceleration);
        assert_eq!(axis.current_value, 10);
        assert_eq!(axis.current_raw_position, 81);

        // Only the coils of the acceleration axis are written.
        assert_eq!(engine.get_gpio().calls.len(), 81 * 2 * NUM_COIL_PIN);

        // Back to 0.
        engine.get_gpio_mut().clear();
        assert_eq!(engine.move_axis(Axis::Acceleration, 0).unwrap(), 81);

        let axis = engine.get_axis(Axis::Acceleration);
        assert_eq!(axis.current_value, 0);
        assert_eq!(axis.current_raw_position, 0);
    }

    #[test]
    fn test_move_axis_coil_sequence() {
        let mut engine = create_engine();
        let pins = create_config().pin_map.coils[Axis::Deflection.index()];

        // 15.276 steps per volt, so 1 volt is 15 steps.
        assert_eq!(engine.move_axis(Axis::Deflection, 49).unwrap(), 15);

        // The decreasing move walks the table forward from 0.
        let calls = &engine.get_gpio().calls;
        let first_pattern: Vec<GpioCall> = calls[0..4].to_vec();
        assert_eq!(
            first_pattern,
            vec![
                GpioCall::WritePin(pins[0], PinLevel::High),
                GpioCall::WritePin(pins[1], PinLevel::High),
                GpioCall::WritePin(pins[2], PinLevel::Low),
                GpioCall::WritePin(pins[3], PinLevel::Low),
            ]
        );

        // Coils are de-asserted after each pattern.
        for idx in 4..8 {
            assert_eq!(calls[idx], GpioCall::WritePin(pins[idx - 4], PinLevel::Low));
        }

        let second_pattern: Vec<GpioCall> = calls[8..12].to_vec();
        assert_eq!(
            second_pattern,
            vec![
                GpioCall::WritePin(pins[0], PinLevel::Low),
                GpioCall::WritePin(pins[1], PinLevel::High),
                GpioCall::WritePin(pins[2], PinLevel::High),
                GpioCall::WritePin(pins[3], PinLevel::Low),
            ]
        );

        // All coils are low at the end.
        for pin in pins {
            assert_eq!(engine.get_gpio().get_level(pin), Some(PinLevel::Low));
        }
    }

    #[test]
    fn test_move_axis_no_move() {
        let mut engine = create_engine();

        assert_eq!(engine.move_axis(Axis::Deflection, 50).unwrap(), 0);
        assert!(engine.get_gpio().calls.is_empty());
    }

    #[test]
    fn test_move_axis_out_of_domain() {
        let mut engine = create_engine();

        // The value is accepted as it is.
        assert_eq!(engine.move_axis(Axis::MagnetizingCurrent, 301).unwrap(), 3065);
        assert_eq!(
            engine.get_axis(Axis::MagnetizingCurrent).current_value,
            301
        );
    }

    #[test]
    fn test_move_axis_fail() {
        let mut engine = create_engine();
        engine.get_gpio_mut().set_failing_pin(Some(13));

        assert!(matches!(
            engine.move_axis(Axis::MagnetizingCurrent, 100),
            Err(InstrumentError::HardwareWrite { pin: 13, .. })
        ));

        // The tracked value is not advanced.
        assert_eq!(engine.get_axis(Axis::MagnetizingCurrent).current_value, 0);

        // Other axes are fine.
        assert!(engine.move_axis(Axis::Acceleration, 1).is_ok());
    }

    #[test]
    fn test_move_axis_fail_releases_coils() {
        let mut engine = create_engine();
        let pins = create_config().pin_map.coils[Axis::Deflection.index()];

        // The first pattern drives the coils A and B, the coil C fails.
        engine.get_gpio_mut().set_failing_pin(Some(pins[2]));

        assert!(engine.move_axis(Axis::Deflection, 49).is_err());

        for pin in pins.iter() {
            assert_ne!(engine.get_gpio().get_level(*pin), Some(PinLevel::High));
        }
        assert_eq!(engine.get_gpio().get_level(pins[0]), Some(PinLevel::Low));
        assert_eq!(engine.get_gpio().get_level(pins[1]), Some(PinLevel::Low));
        assert_eq!(engine.get_gpio().get_level(pins[3]), Some(PinLevel::Low));

        assert_eq!(engine.get_axis(Axis::Deflection).current_value, 50);
    }

    #[test]
    fn test_set_relay() {
        let mut engine = create_engine();

        engine
            .set_relay(RelayGroup::DeflectingPolarity, [PinLevel::Low, PinLevel::High])
            .unwrap();

        assert_eq!(
            engine.get_gpio().calls,
            vec![
                GpioCall::WritePin(7, PinLevel::Low),
                GpioCall::WritePin(1, PinLevel::High),
            ]
        );
        assert_eq!(
            engine.get_relay_bank().levels,
            [PinLevel::High, PinLevel::High, PinLevel::Low, PinLevel::High]
        );
    }

    #[test]
    fn test_set_magnetic_arc() {
        let mut engine = create_engine();

        for (arc, expected) in [
            (MagneticArcDirection::Clockwise, [PinLevel::Low, PinLevel::High]),
            (
                MagneticArcDirection::CounterClockwise,
                [PinLevel::High, PinLevel::Low],
            ),
            (MagneticArcDirection::Off, [PinLevel::High, PinLevel::High]),
        ] {
            // Repeat to check the pattern is the same every time.
            for _ in 0..2 {
                engine.set_magnetic_arc(arc).unwrap();

                assert_eq!(engine.get_relay_bank().levels[0..2], expected);
                assert_eq!(engine.get_gpio().get_level(25), Some(expected[0]));
                assert_eq!(engine.get_gpio().get_level(8), Some(expected[1]));
            }
        }
    }

    #[test]
    fn test_set_deflecting_polarity() {
        let mut engine = create_engine();

        for (polarity, expected) in [
            (DeflectingPolarity::Positive, [PinLevel::Low, PinLevel::Low]),
            (DeflectingPolarity::Negative, [PinLevel::High, PinLevel::High]),
            (DeflectingPolarity::Off, [PinLevel::High, PinLevel::High]),
        ] {
            for _ in 0..2 {
                engine.set_deflecting_polarity(polarity).unwrap();

                assert_eq!(engine.get_relay_bank().levels[2..4], expected);
                assert_eq!(engine.get_gpio().get_level(7), Some(expected[0]));
                assert_eq!(engine.get_gpio().get_level(1), Some(expected[1]));
            }
        }

        // The magnetic arc is not touched.
        assert_eq!(engine.get_gpio().get_level(25), Some(PinLevel::High));
    }

    #[test]
    fn test_patterns() {
        assert_eq!(
            pattern_magnetic_arc(MagneticArcDirection::Off),
            [PinLevel::High, PinLevel::High]
        );
        assert_eq!(
            pattern_deflecting_polarity(DeflectingPolarity::Negative),
            pattern_deflecting_polarity(DeflectingPolarity::Off)
        );
    }
}
