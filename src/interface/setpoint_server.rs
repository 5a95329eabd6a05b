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

use log::{info, warn};
use std::thread::sleep;
use std::time::Duration;

use crate::actuation::gpio::Gpio;
use crate::constants::COMMAND_SET_VARIABLES;
use crate::interface::tcp_server::TcpServer;
use crate::receiver::SetpointReceiver;
use crate::setpoint::Acknowledgement;
use crate::utility::{get_message_name, get_message_sequence_id, is_command};

pub struct SetpointServer<G: Gpio> {
    // Receiver that applies the setpoint vectors.
    pub receiver: SetpointReceiver<G>,
    // Last sequence ID.
    _last_sequence_id: i64,
}

impl<G: Gpio> SetpointServer<G> {
    /// Create a new setpoint server instance.
    ///
    /// # Arguments
    /// * `receiver` - Setpoint receiver.
    ///
    /// # Returns
    /// Setpoint server.
    pub fn new(receiver: SetpointReceiver<G>) -> Self {
        Self {
            receiver,
            _last_sequence_id: -1,
        }
    }

    /// Reset the sequence ID.
    pub fn reset_sequence_id(&mut self) {
        self._last_sequence_id = -1;
    }

    /// Check the sequence ID.
    ///
    /// # Arguments
    /// * `sequence_id` - Sequence ID, which should be >= 0.
    ///
    /// # Returns
    /// Lost sequence IDs.
    pub fn check_sequence_id(&mut self, sequence_id: i64) -> Vec<i64> {
        if self._last_sequence_id == -1 {
            self._last_sequence_id = sequence_id;
            return Vec::new();
        }

        let expected_sequence_id = self._last_sequence_id + 1;

        let mut lost_sequence_ids = Vec::new();
        if sequence_id > expected_sequence_id {
            lost_sequence_ids = (expected_sequence_id..sequence_id).collect();
        }

        self._last_sequence_id = sequence_id;

        lost_sequence_ids
    }

    /// Process the command. Every complete message gets exactly one reply.
    ///
    /// # Arguments
    /// * `tcp_server` - TCP server.
    /// * `setpoint_server` - Setpoint server.
    pub fn process_command(tcp_server: &mut TcpServer, setpoint_server: &mut SetpointServer<G>) {
        let message = match tcp_server.read_json() {
            Some(Ok(message)) => message,
            Some(Err(error)) => {
                // The sequence ID is unknown.
                warn!("Reject the message: {error}.");
                tcp_server.write_json(&Acknowledgement { flag: false }.to_message(-1));
                return;
            }
            None => {
                // Sleep for a while to avoid busy waiting.
                sleep(Duration::from_millis(tcp_server.timeout));
                return;
            }
        };

        let name = get_message_name(&message);
        let sequence_id = get_message_sequence_id(&message);

        let acknowledgement = if name == COMMAND_SET_VARIABLES {
            let lost_sequence_ids = setpoint_server.check_sequence_id(sequence_id);
            if !lost_sequence_ids.is_empty() {
                warn!("Lost sequence IDs of {name}: {lost_sequence_ids:?}.");
            }

            setpoint_server.receiver.on_message(&message)
        } else {
            if is_command(&name) {
                info!("Unsupported command: {name}.");
            } else {
                info!("Invalid command message: {message}.");
            }

            Acknowledgement { flag: false }
        };

        tcp_server.write_json(&acknowledgement.to_message(sequence_id));
    }

    /// Process the first connection.
    ///
    /// # Arguments
    /// * `tcp_server` - TCP server.
    /// * `setpoint_server` - Setpoint server.
    pub fn process_first_connection(
        _tcp_server: &mut TcpServer,
        setpoint_server: &mut SetpointServer<G>,
    ) {
        setpoint_server.reset_sequence_id();
    }
}
