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

use log::{debug, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::sleep;
use std::time::Duration;

use crate::enums::SyncState;
use crate::error::Result;
use crate::setpoint::{Acknowledgement, SetpointVector};
use crate::synchronizer::store::SetpointStore;

// Longest sleep in millisecond before the stop flag is checked again.
const STOP_CHECK_INTERVAL: u64 = 100;

/// Request/reply channel that carries the setpoint vector to the receiver.
pub trait SetpointTransport {
    /// Call the remote procedure `SetVariables`.
    ///
    /// # Arguments
    /// * `vector` - Setpoint vector to deliver.
    ///
    /// # Returns
    /// Acknowledgement of the receiver.
    ///
    /// # Errors
    /// If the call can not be finished or the reply can not be interpreted.
    fn set_variables(&mut self, vector: &SetpointVector) -> Result<Acknowledgement>;
}

/// Result of a poll tick.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PollOutcome {
    // Store equals the delivery baseline. Nothing is sent.
    Unchanged,
    // Vector is acknowledged and becomes the baseline.
    Delivered,
    // Receiver replied with a false flag.
    Rejected,
    // Store, transport or reply failure.
    Failed,
}

pub struct Synchronizer<S: SetpointStore, T: SetpointTransport> {
    _store: S,
    _transport: T,
    // Last vector confirmed by the receiver.
    _baseline: SetpointVector,
    _state: SyncState,
    // Poll interval in millisecond.
    _poll_interval: u64,
}

impl<S: SetpointStore, T: SetpointTransport> Synchronizer<S, T> {
    /// Create a new synchronizer. The baseline is the zero vector.
    ///
    /// # Arguments
    /// * `store` - Setpoint store.
    /// * `transport` - Transport to the receiver.
    /// * `poll_interval` - Poll interval in millisecond.
    ///
    /// # Returns
    /// Synchronizer.
    pub fn new(store: S, transport: T, poll_interval: u64) -> Self {
        Self {
            _store: store,
            _transport: transport,
            _baseline: SetpointVector::default(),
            _state: SyncState::Idle,
            _poll_interval: poll_interval,
        }
    }

    /// Get the delivery baseline.
    ///
    /// # Returns
    /// Last vector confirmed by the receiver.
    pub fn get_baseline(&self) -> SetpointVector {
        self._baseline
    }

    /// Get the state.
    ///
    /// # Returns
    /// State.
    pub fn get_state(&self) -> SyncState {
        self._state
    }

    /// Get the store.
    pub fn get_store_mut(&mut self) -> &mut S {
        &mut self._store
    }

    /// Get the transport.
    pub fn get_transport(&self) -> &T {
        &self._transport
    }

    /// Do one poll tick: read the store and deliver the vector if it differs
    /// from the baseline. The baseline only advances on a true acknowledgement.
    ///
    /// # Returns
    /// Outcome of the tick.
    pub fn poll_once(&mut self) -> PollOutcome {
        let vector = match self._store.read() {
            Ok(vector) => vector,
            Err(error) => {
                warn!("Fail to read the store: {error}.");
                return PollOutcome::Failed;
            }
        };

        if vector == self._baseline {
            debug!("No change of the setpoints.");
            return PollOutcome::Unchanged;
        }

        self._state = SyncState::Delivering;
        let result = self._transport.set_variables(&vector);
        self._state = SyncState::Idle;

        match result {
            Ok(Acknowledgement { flag: true }) => {
                info!("Setpoints are delivered: {vector:?}.");
                self._baseline = vector;

                PollOutcome::Delivered
            }
            Ok(Acknowledgement { flag: false }) => {
                warn!("Setpoints are rejected by the receiver: {vector:?}.");
                PollOutcome::Rejected
            }
            Err(error) => {
                warn!("Fail to deliver the setpoints: {error}.");
                PollOutcome::Failed
            }
        }
    }

    /// Run the poll loop until it is stopped. The interval is counted from the
    /// end of the previous tick.
    ///
    /// # Arguments
    /// * `stop` - Stop the loop.
    pub fn run(&mut self, stop: &Arc<AtomicBool>) {
        info!(
            "Synchronizer is running with a poll interval of {} ms.",
            self._poll_interval
        );

        while !stop.load(Ordering::Relaxed) {
            if !Self::sleep_until_stop(self._poll_interval, stop) {
                break;
            }

            self.poll_once();
        }

        info!("Synchronizer is stopped.");
    }

    /// Sleep for a period of time unless it is stopped.
    ///
    /// # Arguments
    /// * `period` - Period in millisecond.
    /// * `stop` - Stop flag.
    ///
    /// # Returns
    /// True if the whole period is slept, false if stopped.
    fn sleep_until_stop(period: u64, stop: &Arc<AtomicBool>) -> bool {
        let mut remaining = period;
        while remaining > 0 {
            if stop.load(Ordering::Relaxed) {
                return false;
            }

            let duration = remaining.min(STOP_CHECK_INTERVAL);
            sleep(Duration::from_millis(duration));

            remaining -= duration;
        }

        !stop.load(Ordering::Relaxed)
    }
}
