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

use config::Config;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use crate::error::{InstrumentError, Result};

/// Trait for parsing the configuration value.
///
/// # Parameters
/// * `Self` - Type of the configuration value.
pub trait ConfigValue: Sized {
    /// Parse the configuration value.
    ///
    /// # Parameters
    /// * `s` - String to parse.
    ///
    /// # Returns
    /// The parsed configuration value or None if the string is not valid.
    fn parse_value(s: &str) -> Option<Self>;
}

impl ConfigValue for String {
    fn parse_value(s: &str) -> Option<Self> {
        Some(s.to_string())
    }
}

impl ConfigValue for f64 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<f64>().ok()
    }
}

impl ConfigValue for i32 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<i32>().ok()
    }
}

impl ConfigValue for u32 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<u32>().ok()
    }
}

impl ConfigValue for u64 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<u64>().ok()
    }
}

impl ConfigValue for bool {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<bool>().ok()
    }
}

/// Get the configuation from the file.
///
/// # Parameters
/// * `filepath` - Path to the config file.
///
/// # Returns
/// The configuration.
///
/// # Errors
/// If the file can not be read.
pub fn get_config(filepath: &Path) -> Result<Config> {
    Config::builder()
        .add_source(config::File::from(filepath))
        .build()
        .map_err(|error| InstrumentError::Config {
            key: filepath.display().to_string(),
            message: error.to_string(),
        })
}

/// Get the parameter from the file.
///
/// # Parameters
/// * `filepath` - Path to the config file.
/// * `key` - Key to find the parameter in the config file.
///
/// # Returns
/// The parameter.
///
/// # Errors
/// If the key is not found or the value can not be parsed.
pub fn get_parameter<T: ConfigValue>(filepath: &Path, key: &str) -> Result<T> {
    let value = get_config(filepath)?
        .get_string(key)
        .map_err(|error| InstrumentError::Config {
            key: String::from(key),
            message: error.to_string(),
        })?;

    T::parse_value(&value).ok_or_else(|| InstrumentError::Config {
        key: String::from(key),
        message: format!("can not parse {value}"),
    })
}

/// Get the array parameter from the file.
///
/// # Parameters
/// * `filepath` - Path to the config file.
/// * `key` - Key to find the parameter in the config file.
///
/// # Returns
/// The array parameter.
///
/// # Errors
/// If the key is not found or any element can not be parsed.
pub fn get_parameter_array<T: ConfigValue>(filepath: &Path, key: &str) -> Result<Vec<T>> {
    let config_error = |message: String| InstrumentError::Config {
        key: String::from(key),
        message,
    };

    let config_array = get_config(filepath)?
        .get_array(key)
        .map_err(|error| config_error(error.to_string()))?;

    config_array
        .into_iter()
        .map(|x| {
            let value = x
                .into_string()
                .map_err(|error| config_error(error.to_string()))?;
            T::parse_value(&value).ok_or_else(|| config_error(format!("can not parse {value}")))
        })
        .collect()
}

/// Check if the message is a command.
///
/// # Arguments
/// * `name` - Name of the message.
///
/// # Returns
/// True if the message is a command, false otherwise.
pub fn is_command(name: &str) -> bool {
    name.starts_with("cmd_")
}

/// Get the message name.
///
/// # Arguments
/// * `message` - Message that should have the "id" field.
///
/// # Returns
/// Message name. Return an empty string if the name is not found.
pub fn get_message_name(message: &Value) -> String {
    match message["id"].as_str() {
        Some(id) => String::from(id),
        None => String::new(),
    }
}

/// Get the message sequence ID.
///
/// # Arguments
/// * `message` - Message.
///
/// # Returns
/// Message sequence ID. Return -1 if the sequence ID is not found.
pub fn get_message_sequence_id(message: &Value) -> i64 {
    match message["sequence_id"].as_i64() {
        Some(sequence_id) => sequence_id,
        None => -1,
    }
}

/// TCP/IP client writes the message and sleep.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `message` - Message to write.
/// * `sleep_time` - Sleep time in milliseconds.
///
/// # Panics
/// If the TCP stream of the client cannot write or flush.
pub fn client_write_and_sleep(client: &mut TcpStream, message: &str, sleep_time: u64) {
    client
        .write_all(message.as_bytes())
        .expect("Tcp stream should write.");
    client.flush().expect("Tcp stream should flush.");

    sleep(Duration::from_millis(sleep_time));
}

/// TCP/IP client reads the JSON message.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `terminator` - Terminator of the message.
///
/// # Returns
/// JSON message.
///
/// # Panics
/// If the TCP stream of the client cannot read or the message is not JSON.
pub fn client_read_json(client: &mut TcpStream, terminator: &[u8]) -> Value {
    let mut buffer = Vec::new();
    loop {
        let mut byte = [0; 1];
        client
            .read_exact(&mut byte)
            .expect("Tcp stream of the client should read.");

        buffer.push(byte[0]);
        if buffer.ends_with(terminator) {
            break;
        }
    }

    serde_json::from_slice(&buffer[0..(buffer.len() - terminator.len())])
        .expect("Should be able to convert to JSON.")
}
