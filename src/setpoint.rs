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

//! Setpoint vector and acknowledgement, the two messages of the remote
//! procedure call `SetVariables`.

use serde_json::{json, Value};

use crate::constants::{
    COMMAND_SET_VARIABLES, NUM_SETPOINT_FIELD, RANGE_ACCELERATING_VOLTAGE,
    RANGE_DEFLECTING_VOLTAGE, RANGE_MAGNETIZING_CURRENT, REPLY_VARIABLES_SET,
};
use crate::enums::{DeflectingPolarity, MagneticArcDirection};
use crate::error::{InstrumentError, Result};
use crate::utility::{get_message_name, get_message_sequence_id};

pub const FIELD_ACCELERATING_VOLTAGE: &str = "acceleratingVoltage";
pub const FIELD_DEFLECTING_POLARITY: &str = "deflectingPolarity";
pub const FIELD_DEFLECTING_VOLTAGE: &str = "deflectingVoltage";
pub const FIELD_MAGNETIC_ARC: &str = "magneticArc";
pub const FIELD_MAGNETIZING_CURRENT: &str = "magnetizingCurrent";

// Field names in the order the store returns them (sorted by name).
pub const STORE_FIELDS: [&str; NUM_SETPOINT_FIELD] = [
    FIELD_ACCELERATING_VOLTAGE,
    FIELD_DEFLECTING_POLARITY,
    FIELD_DEFLECTING_VOLTAGE,
    FIELD_MAGNETIC_ARC,
    FIELD_MAGNETIZING_CURRENT,
];

/// Target state of the instrument. The five fields always travel together.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct SetpointVector {
    // Accelerating voltage in volt.
    pub accelerating_voltage: i32,
    // Deflecting voltage in volt.
    pub deflecting_voltage: i32,
    // Magnetizing current in 0.01 ampere.
    pub magnetizing_current: i32,
    pub deflecting_polarity: DeflectingPolarity,
    pub magnetic_arc: MagneticArcDirection,
}

impl SetpointVector {
    /// Setpoints the instrument is put in when the store is initialized.
    ///
    /// # Returns
    /// Setpoint vector with everything off and the deflecting voltage at the
    /// lower bound of its range.
    pub fn instrument_default() -> Self {
        Self {
            deflecting_voltage: RANGE_DEFLECTING_VOLTAGE.0,
            ..Self::default()
        }
    }

    /// Create the setpoint vector from the values read from the store.
    ///
    /// # Arguments
    /// * `values` - Values in the order of `STORE_FIELDS`.
    ///
    /// # Returns
    /// Setpoint vector.
    ///
    /// # Errors
    /// If an enum code is not defined.
    pub fn from_store_values(values: &[i32; NUM_SETPOINT_FIELD]) -> Result<Self> {
        Ok(Self {
            accelerating_voltage: values[0],
            deflecting_polarity: decode_polarity(values[1] as i64)?,
            deflecting_voltage: values[2],
            magnetic_arc: decode_magnetic_arc(values[3] as i64)?,
            magnetizing_current: values[4],
        })
    }

    /// Get the values to write to the store.
    ///
    /// # Returns
    /// Values in the order of `STORE_FIELDS`.
    pub fn to_store_values(&self) -> [i32; NUM_SETPOINT_FIELD] {
        [
            self.accelerating_voltage,
            self.deflecting_polarity as i32,
            self.deflecting_voltage,
            self.magnetic_arc as i32,
            self.magnetizing_current,
        ]
    }

    /// Get the request message of the remote procedure call.
    ///
    /// # Arguments
    /// * `sequence_id` - Sequence ID.
    ///
    /// # Returns
    /// Request message.
    pub fn to_message(&self, sequence_id: i64) -> Value {
        json!({
            "id": COMMAND_SET_VARIABLES,
            "sequence_id": sequence_id,
            FIELD_ACCELERATING_VOLTAGE: self.accelerating_voltage,
            FIELD_DEFLECTING_POLARITY: self.deflecting_polarity as u8,
            FIELD_DEFLECTING_VOLTAGE: self.deflecting_voltage,
            FIELD_MAGNETIC_ARC: self.magnetic_arc as u8,
            FIELD_MAGNETIZING_CURRENT: self.magnetizing_current,
        })
    }

    /// Decode the setpoint vector from the request message. All five fields
    /// are required.
    ///
    /// # Arguments
    /// * `message` - Request message.
    ///
    /// # Returns
    /// Setpoint vector.
    ///
    /// # Errors
    /// If any field is missing, not an integer, or not a defined enum code.
    pub fn from_message(message: &Value) -> Result<Self> {
        Ok(Self {
            accelerating_voltage: get_field_i32(message, FIELD_ACCELERATING_VOLTAGE)?,
            deflecting_voltage: get_field_i32(message, FIELD_DEFLECTING_VOLTAGE)?,
            magnetizing_current: get_field_i32(message, FIELD_MAGNETIZING_CURRENT)?,
            deflecting_polarity: decode_polarity(get_field_i64(
                message,
                FIELD_DEFLECTING_POLARITY,
            )?)?,
            magnetic_arc: decode_magnetic_arc(get_field_i64(message, FIELD_MAGNETIC_ARC)?)?,
        })
    }

    /// Get the names of the continuous fields that are out of their domain.
    ///
    /// # Returns
    /// Field names. Empty if all the fields are in the domain.
    pub fn out_of_domain_fields(&self) -> Vec<&'static str> {
        let is_out = |value: i32, range: (i32, i32)| (value < range.0) || (value > range.1);

        let mut fields = Vec::new();
        if is_out(self.accelerating_voltage, RANGE_ACCELERATING_VOLTAGE) {
            fields.push(FIELD_ACCELERATING_VOLTAGE);
        }
        if is_out(self.deflecting_voltage, RANGE_DEFLECTING_VOLTAGE) {
            fields.push(FIELD_DEFLECTING_VOLTAGE);
        }
        if is_out(self.magnetizing_current, RANGE_MAGNETIZING_CURRENT) {
            fields.push(FIELD_MAGNETIZING_CURRENT);
        }

        fields
    }
}

/// Reply of the remote procedure call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Acknowledgement {
    // The setpoint vector is applied or not.
    pub flag: bool,
}

impl Acknowledgement {
    /// Get the reply message.
    ///
    /// # Arguments
    /// * `sequence_id` - Sequence ID of the request.
    ///
    /// # Returns
    /// Reply message.
    pub fn to_message(&self, sequence_id: i64) -> Value {
        json!({"id": REPLY_VARIABLES_SET, "sequence_id": sequence_id, "flag": self.flag})
    }

    /// Decode the reply message.
    ///
    /// # Arguments
    /// * `message` - Reply message.
    /// * `sequence_id` - Sequence ID of the request the reply should answer.
    ///
    /// # Returns
    /// Acknowledgement.
    ///
    /// # Errors
    /// If the reply has the wrong name or sequence ID, or has no boolean flag.
    pub fn from_message(message: &Value, sequence_id: i64) -> Result<Self> {
        let name = get_message_name(message);
        if name != REPLY_VARIABLES_SET {
            return Err(InstrumentError::MalformedReply(format!(
                "unexpected id in {message}"
            )));
        }

        let reply_sequence_id = get_message_sequence_id(message);
        if reply_sequence_id != sequence_id {
            return Err(InstrumentError::MalformedReply(format!(
                "sequence ID {reply_sequence_id} does not match {sequence_id}"
            )));
        }

        match message["flag"].as_bool() {
            Some(flag) => Ok(Self { flag }),
            None => Err(InstrumentError::MalformedReply(format!(
                "no flag in {message}"
            ))),
        }
    }
}

/// Get the integer field of the message.
fn get_field_i64(message: &Value, field: &str) -> Result<i64> {
    message[field]
        .as_i64()
        .ok_or_else(|| InstrumentError::Decode(format!("{field} is not an integer")))
}

/// Get the integer field of the message that should fit in i32.
fn get_field_i32(message: &Value, field: &str) -> Result<i32> {
    let value = get_field_i64(message, field)?;
    i32::try_from(value)
        .map_err(|_| InstrumentError::Decode(format!("{field} = {value} is out of i32")))
}

/// Decode the code of the deflecting polarity.
fn decode_polarity(code: i64) -> Result<DeflectingPolarity> {
    u8::try_from(code)
        .ok()
        .and_then(DeflectingPolarity::from_repr)
        .ok_or_else(|| InstrumentError::Decode(format!("unknown deflecting polarity {code}")))
}

/// Decode the code of the magnetic arc direction.
fn decode_magnetic_arc(code: i64) -> Result<MagneticArcDirection> {
    u8::try_from(code)
        .ok()
        .and_then(MagneticArcDirection::from_repr)
        .ok_or_else(|| InstrumentError::Decode(format!("unknown magnetic arc {code}")))
}
