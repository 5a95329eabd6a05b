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

use thiserror::Error;

/// Errors of the instrument control system.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("configuration {key}: {message}")]
    Config { key: String, message: String },

    #[error("hardware write on pin {pin} failed: {message}")]
    HardwareWrite { pin: u32, message: String },

    #[error("cannot decode the setpoint vector: {0}")]
    Decode(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for InstrumentError {
    fn from(error: rusqlite::Error) -> Self {
        InstrumentError::Store(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InstrumentError>;
