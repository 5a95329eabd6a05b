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
use serde_json::Value;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{InstrumentError, Result};
use crate::setpoint::{Acknowledgement, SetpointVector};
use crate::synchronizer::synchronizer::SetpointTransport;

pub struct RpcClient {
    _host: String,
    _port: i32,
    // Timeout of connect, read and write in millisecond.
    _timeout: u64,
    _terminator: Vec<u8>,
    _reader: Option<BufReader<TcpStream>>,
    _writer: Option<TcpStream>,
    // Sequence ID of the next call.
    _sequence_id: i64,
}

impl RpcClient {
    /// Create a new RPC client. The connection is opened on the first call.
    ///
    /// # Arguments
    /// * `host` - Host of the receiver.
    /// * `port` - Port of the receiver.
    /// * `timeout` - Timeout of connect, read and write in millisecond.
    /// * `terminator` - Terminator of the message.
    ///
    /// # Returns
    /// RPC client.
    pub fn new(host: &str, port: i32, timeout: u64, terminator: &[u8]) -> Self {
        Self {
            _host: String::from(host),
            _port: port,
            _timeout: timeout,
            _terminator: terminator.to_vec(),
            _reader: None,
            _writer: None,
            _sequence_id: 0,
        }
    }

    /// Check if the client is connected.
    pub fn is_connected(&self) -> bool {
        self._reader.is_some() && self._writer.is_some()
    }

    /// Get the sequence ID of the next call.
    pub fn get_sequence_id(&self) -> i64 {
        self._sequence_id
    }

    /// Connect to the receiver.
    ///
    /// # Errors
    /// If the port is out of range or no address of the host accepts the
    /// connection.
    fn connect(&mut self) -> Result<()> {
        let timeout = Duration::from_millis(self._timeout);

        let port = u16::try_from(self._port).map_err(|_| InstrumentError::Config {
            key: String::from("port"),
            message: format!("{} is not a TCP port", self._port),
        })?;

        let addresses = (self._host.as_str(), port)
            .to_socket_addrs()
            .map_err(|error| {
                InstrumentError::Transport(format!("cannot resolve {}: {error}", self._host))
            })?;

        let mut last_error = None;
        for address in addresses {
            match TcpStream::connect_timeout(&address, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;

                    info!("Connected to the receiver at {address}.");

                    self._reader = Some(BufReader::new(stream.try_clone()?));
                    self._writer = Some(stream);

                    return Ok(());
                }
                Err(error) => last_error = Some(error),
            }
        }

        Err(InstrumentError::Transport(match last_error {
            Some(error) => format!(
                "cannot connect to {}:{}: {error}",
                self._host, self._port
            ),
            None => format!("no address for {}", self._host),
        }))
    }

    /// Close the connection.
    fn disconnect(&mut self) {
        if self.is_connected() {
            debug!("Disconnect from the receiver.");
        }

        self._reader = None;
        self._writer = None;
    }

    /// Do one request/reply round trip.
    ///
    /// # Arguments
    /// * `request` - Request message.
    /// * `sequence_id` - Sequence ID of the request.
    ///
    /// # Returns
    /// Acknowledgement.
    fn call(&mut self, request: &Value, sequence_id: i64) -> Result<Acknowledgement> {
        if !self.is_connected() {
            self.connect()?;
        }

        let mut data = request.to_string().into_bytes();
        data.extend_from_slice(&self._terminator);

        if let Some(writer) = self._writer.as_mut() {
            writer
                .write_all(&data)
                .and_then(|_| writer.flush())
                .map_err(|error| InstrumentError::Transport(format!("cannot send: {error}")))?;
        }

        let reply = self.read_reply()?;
        debug!("Receive the reply: {reply}.");

        let value: Value = serde_json::from_str(&reply).map_err(|error| {
            InstrumentError::MalformedReply(format!("not a JSON ({error}): {reply:?}"))
        })?;

        Acknowledgement::from_message(&value, sequence_id)
    }

    /// Read the reply until the terminator.
    ///
    /// # Returns
    /// Reply without the terminator.
    fn read_reply(&mut self) -> Result<String> {
        let reader = self
            ._reader
            .as_mut()
            .ok_or_else(|| InstrumentError::Transport(String::from("not connected")))?;

        let last_byte = match self._terminator.last() {
            Some(byte) => *byte,
            None => b'\n',
        };

        let mut buffer = Vec::new();
        while !buffer.ends_with(&self._terminator) {
            match reader.read_until(last_byte, &mut buffer) {
                Ok(0) => {
                    return Err(InstrumentError::Transport(String::from(
                        "connection is closed by the receiver",
                    )))
                }
                Ok(_) => {}
                Err(error) if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(InstrumentError::Transport(String::from(
                        "timeout of the reply",
                    )))
                }
                Err(error) => {
                    return Err(InstrumentError::Transport(format!("cannot receive: {error}")))
                }
            }
        }

        buffer.truncate(buffer.len() - self._terminator.len());

        String::from_utf8(buffer)
            .map_err(|error| InstrumentError::MalformedReply(format!("not a UTF-8 string: {error}")))
    }
}

impl SetpointTransport for RpcClient {
    fn set_variables(&mut self, vector: &SetpointVector) -> Result<Acknowledgement> {
        let sequence_id = self._sequence_id;
        self._sequence_id += 1;

        let result = self.call(&vector.to_message(sequence_id), sequence_id);

        // The stream state is unknown after a failure.
        if result.is_err() {
            self.disconnect();
        }

        result
    }
}
