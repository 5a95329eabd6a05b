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

//! # E/M Instrument Control System
//!
//! This library keeps the e/m instrument in sync with the setpoints in the
//! numeric store. The synchronizer delivers the changed setpoint vectors over
//! TCP/IP and the actuator controller drives the stepper motors and relays.
pub mod actuation;
pub mod application;
pub mod config;
pub mod constants;
pub mod enums;
pub mod error;
pub mod interface;
pub mod mock;
pub mod motion;
pub mod receiver;
pub mod setpoint;
pub mod synchronizer;
pub mod utility;
