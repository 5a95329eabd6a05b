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

use log::{error, info, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::actuation::actuation_engine::ActuationEngine;
use crate::actuation::gpio::Gpio;
use crate::enums::Axis;
use crate::error::{InstrumentError, Result};
use crate::setpoint::{Acknowledgement, SetpointVector};

pub struct SetpointReceiver<G: Gpio> {
    // Actuation engine shared with the other requests. The lock is held for
    // the whole setpoint vector.
    _engine: Arc<Mutex<ActuationEngine<G>>>,
}

impl<G: Gpio> SetpointReceiver<G> {
    /// Create a new setpoint receiver.
    ///
    /// # Arguments
    /// * `engine` - Actuation engine.
    ///
    /// # Returns
    /// New setpoint receiver.
    pub fn new(engine: ActuationEngine<G>) -> Self {
        Self {
            _engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// Get the reference to the actuation engine.
    ///
    /// # Returns
    /// Shared actuation engine.
    pub fn get_engine_reference(&self) -> Arc<Mutex<ActuationEngine<G>>> {
        self._engine.clone()
    }

    /// Decode the request message and apply the setpoint vector.
    ///
    /// # Arguments
    /// * `message` - Request message.
    ///
    /// # Returns
    /// Acknowledgement. The flag is false if the message can not be decoded
    /// or the hardware fails.
    pub fn on_message(&self, message: &Value) -> Acknowledgement {
        match SetpointVector::from_message(message) {
            Ok(vector) => self.on_setpoint_vector(&vector),
            Err(error) => {
                error!("Reject the message {message}: {error}.");
                Acknowledgement { flag: false }
            }
        }
    }

    /// Apply the setpoint vector to the instrument.
    ///
    /// # Arguments
    /// * `vector` - Setpoint vector.
    ///
    /// # Returns
    /// Acknowledgement. The flag is false if the hardware fails.
    pub fn on_setpoint_vector(&self, vector: &SetpointVector) -> Acknowledgement {
        let fields = vector.out_of_domain_fields();
        if !fields.is_empty() {
            warn!("Setpoints out of the domain are applied as they are: {fields:?}.");
        }

        let result = match self._engine.lock() {
            Ok(mut engine) => Self::apply(&mut engine, vector),
            Err(_) => Err(InstrumentError::HardwareWrite {
                pin: 0,
                message: String::from("actuation engine is poisoned by an earlier failure"),
            }),
        };

        match result {
            Ok(()) => {
                info!("Setpoints are applied: {vector:?}.");
                Acknowledgement { flag: true }
            }
            Err(error) => {
                error!("Fail to apply the setpoints {vector:?}: {error}.");
                Acknowledgement { flag: false }
            }
        }
    }

    /// Apply the setpoint vector in the fixed order: deflection, acceleration,
    /// magnetizing current, magnetic arc, and deflecting polarity.
    fn apply(engine: &mut ActuationEngine<G>, vector: &SetpointVector) -> Result<()> {
        engine.move_axis(Axis::Deflection, vector.deflecting_voltage)?;
        engine.move_axis(Axis::Acceleration, vector.accelerating_voltage)?;
        engine.move_axis(Axis::MagnetizingCurrent, vector.magnetizing_current)?;

        engine.set_magnetic_arc(vector.magnetic_arc)?;
        engine.set_deflecting_polarity(vector.deflecting_polarity)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use std::path::Path;

    use crate::config::ConfigController;
    use crate::enums::{DeflectingPolarity, MagneticArcDirection, PinLevel};
    use crate::mock::mock_gpio::{GpioCall, MockGpio};

    fn create_receiver() -> SetpointReceiver<MockGpio> {
        let mut config =
            ConfigController::new(Path::new("config/parameters_controller.yaml")).unwrap();
        config.dwell_time = 0;

        let mut engine = ActuationEngine::new(MockGpio::new(), &config).unwrap();
        engine.get_gpio_mut().clear();

        SetpointReceiver::new(engine)
    }

    fn create_setpoint_vector() -> SetpointVector {
        SetpointVector {
            accelerating_voltage: 1,
            deflecting_voltage: 51,
            magnetizing_current: 1,
            deflecting_polarity: DeflectingPolarity::Positive,
            magnetic_arc: MagneticArcDirection::CounterClockwise,
        }
    }

    #[test]
    fn test_on_setpoint_vector() {
        let receiver = create_receiver();

        let ack = receiver.on_setpoint_vector(&create_setpoint_vector());
        assert!(ack.flag);

        let engine_reference = receiver.get_engine_reference();
        let engine = engine_reference.lock().unwrap();

        assert_eq!(engine.get_axis(Axis::Acceleration).current_value, 1);
        assert_eq!(engine.get_axis(Axis::Deflection).current_value, 51);
        assert_eq!(engine.get_axis(Axis::MagnetizingCurrent).current_value, 1);

        assert_eq!(
            engine.get_relay_bank().levels,
            [PinLevel::High, PinLevel::Low, PinLevel::Low, PinLevel::Low]
        );
    }

    #[test]
    fn test_on_setpoint_vector_order() {
        let receiver = create_receiver();
        receiver.on_setpoint_vector(&create_setpoint_vector());

        let engine_reference = receiver.get_engine_reference();
        let engine = engine_reference.lock().unwrap();
        let calls = &engine.get_gpio().calls;

        // Deflection (15 steps), acceleration (12 steps), and magnetizing
        // current (10 steps), then the four relays.
        let pin_of = |idx: usize| match calls[idx] {
            GpioCall::WritePin(pin, _) => pin,
            GpioCall::SetPinMode(pin, _) => pin,
        };

        assert_eq!(calls.len(), (15 + 12 + 10) * 8 + 4);
        assert_eq!(pin_of(0), 2);
        assert_eq!(pin_of(15 * 8), 17);
        assert_eq!(pin_of((15 + 12) * 8), 5);

        let relays: Vec<GpioCall> = calls[calls.len() - 4..].to_vec();
        assert_eq!(
            relays,
            vec![
                GpioCall::WritePin(25, PinLevel::High),
                GpioCall::WritePin(8, PinLevel::Low),
                GpioCall::WritePin(7, PinLevel::Low),
                GpioCall::WritePin(1, PinLevel::Low),
            ]
        );
    }

    #[test]
    fn test_on_setpoint_vector_relays_always_written() {
        let receiver = create_receiver();
        let vector = create_setpoint_vector();

        receiver.on_setpoint_vector(&vector);
        receiver
            .get_engine_reference()
            .lock()
            .unwrap()
            .get_gpio_mut()
            .clear();

        // Same vector again: no steps but the relays are written.
        assert!(receiver.on_setpoint_vector(&vector).flag);

        let engine_reference = receiver.get_engine_reference();
        let engine = engine_reference.lock().unwrap();
        assert_eq!(engine.get_gpio().calls.len(), 4);
    }

    #[test]
    fn test_on_setpoint_vector_hardware_fail() {
        let receiver = create_receiver();
        receiver
            .get_engine_reference()
            .lock()
            .unwrap()
            .get_gpio_mut()
            .set_failing_pin(Some(17));

        assert!(!receiver.on_setpoint_vector(&create_setpoint_vector()).flag);

        let engine_reference = receiver.get_engine_reference();
        let engine = engine_reference.lock().unwrap();

        // The deflection is done before the failure of the acceleration.
        assert_eq!(engine.get_axis(Axis::Deflection).current_value, 51);
        assert_eq!(engine.get_axis(Axis::Acceleration).current_value, 0);
        assert_eq!(engine.get_relay_bank().levels, [PinLevel::High; 4]);
    }

    #[test]
    fn test_on_message() {
        let receiver = create_receiver();

        let ack = receiver.on_message(&create_setpoint_vector().to_message(0));
        assert!(ack.flag);

        // Malformed message does not touch the engine.
        receiver
            .get_engine_reference()
            .lock()
            .unwrap()
            .get_gpio_mut()
            .clear();

        let ack = receiver.on_message(&json!({
            "id": "cmd_setVariables",
            "sequence_id": 1,
            "acceleratingVoltage": 100,
        }));
        assert!(!ack.flag);

        let engine_reference = receiver.get_engine_reference();
        let engine = engine_reference.lock().unwrap();
        assert!(engine.get_gpio().calls.is_empty());
        assert_eq!(engine.get_axis(Axis::Acceleration).current_value, 1);
    }
}
