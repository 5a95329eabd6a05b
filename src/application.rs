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

use log::info;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag::register,
};
use std::path::Path;
use std::sync::{atomic::AtomicBool, Arc};

use crate::actuation::actuation_engine::ActuationEngine;
use crate::actuation::gpio::{Gpio, SysfsGpio};
use crate::config::{ConfigController, ConfigSynchronizer};
use crate::constants::{
    ALL_HOST, CONFIG_FILE_CONTROLLER, CONFIG_FILE_SYNCHRONIZER, TERMINATOR,
};
use crate::error::Result;
use crate::interface::rpc_client::RpcClient;
use crate::interface::setpoint_server::SetpointServer;
use crate::interface::tcp_server::TcpServer;
use crate::mock::mock_gpio::MockGpio;
use crate::receiver::SetpointReceiver;
use crate::synchronizer::store::SqliteStore;
use crate::synchronizer::synchronizer::Synchronizer;

/// Run the actuator controller: the setpoint receiver behind the TCP/IP
/// server.
///
/// # Arguments
/// * `port` - Port of the server. If the value is 0, the port is read from the
/// configuration file.
/// * `is_simulation_mode` - Is the simulation mode or not.
///
/// # Errors
/// If the configuration is invalid, the pins can not be initialized or the
/// server can not bind the port.
pub fn run_controller(port: i32, is_simulation_mode: bool) -> Result<()> {
    // Log the running mode
    let mode = if is_simulation_mode {
        "simulation mode"
    } else {
        "hardware mode"
    };
    info!("Run the actuator controller in {mode}.");

    let config = ConfigController::new(Path::new(CONFIG_FILE_CONTROLLER))?;
    let final_port = get_final_value(port, config.port);

    let stop = create_stop_flag();
    if is_simulation_mode {
        serve_setpoints(MockGpio::new(), &config, final_port, &stop)?;
    } else {
        serve_setpoints(SysfsGpio::new(), &config, final_port, &stop)?;
    }

    info!("Actuator controller is stopped.");

    Ok(())
}

/// Serve the setpoint vectors until it is stopped.
///
/// # Arguments
/// * `gpio` - GPIO capability.
/// * `config` - Configuration of the controller.
/// * `port` - Port of the server.
/// * `stop` - Stop flag.
fn serve_setpoints<G: Gpio>(
    gpio: G,
    config: &ConfigController,
    port: i32,
    stop: &Arc<AtomicBool>,
) -> Result<()> {
    let engine = ActuationEngine::new(gpio, config)?;
    let mut setpoint_server = SetpointServer::new(SetpointReceiver::new(engine));

    let mut tcp_server = TcpServer::new(
        "Setpoint server",
        ALL_HOST,
        port,
        config.timeout,
        TERMINATOR,
        stop,
    )?;
    tcp_server.run(
        SetpointServer::process_command,
        Some(SetpointServer::process_first_connection),
        &mut setpoint_server,
    );

    Ok(())
}

/// Run the setpoint synchronizer against the SQLite store.
///
/// # Arguments
/// * `host` - Host of the actuator controller. If empty, the host is read
/// from the configuration file.
/// * `port` - Port of the actuator controller. If the value is 0, the port is
/// read from the configuration file.
/// * `poll_interval` - Poll interval in millisecond. If the value is 0, the
/// interval is read from the configuration file.
/// * `database` - Path of the database. If empty, the path is read from the
/// configuration file.
/// * `is_init_store` - Recreate the store with the default setpoints or not.
///
/// # Errors
/// If the configuration is invalid or the store can not be initialized.
pub fn run_synchronizer(
    host: &str,
    port: i32,
    poll_interval: u64,
    database: &str,
    is_init_store: bool,
) -> Result<()> {
    let config = ConfigSynchronizer::new(Path::new(CONFIG_FILE_SYNCHRONIZER))?;

    let final_host = get_final_value(String::from(host), config.host);
    let final_port = get_final_value(port, config.port);
    let final_poll_interval = get_final_value(poll_interval, config.poll_interval);
    let final_database = get_final_value(String::from(database), config.database);

    info!("Run the synchronizer with the store {final_database} to {final_host}:{final_port}.");

    let store = SqliteStore::new(Path::new(&final_database), &config.table)?;
    if is_init_store {
        store.initialize_defaults()?;
        info!("Store is initialized with the default setpoints.");
    }

    let client = RpcClient::new(&final_host, final_port, config.timeout, TERMINATOR);

    let stop = create_stop_flag();
    Synchronizer::new(store, client, final_poll_interval).run(&stop);

    Ok(())
}

/// Create the flag that is set by SIGINT and SIGTERM.
///
/// # Returns
/// Stop flag.
fn create_stop_flag() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));

    // Register the signals that stop the application
    for signal in [SIGTERM, SIGINT].iter() {
        let _ = register(*signal, stop.clone());
    }

    stop
}

/// Get the final value of a setting that the command line can override.
///
/// # Arguments
/// * `value` - Value from the command line. The default value means no
/// override.
/// * `value_config` - Value from the configuration file.
///
/// # Returns
/// Final value.
fn get_final_value<T: Default + PartialEq>(value: T, value_config: T) -> T {
    if value == T::default() {
        value_config
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_final_value() {
        let config = ConfigSynchronizer::new(Path::new(CONFIG_FILE_SYNCHRONIZER)).unwrap();

        assert_eq!(get_final_value(0, config.port), 50051);
        assert_eq!(get_final_value(10, config.port), 10);

        assert_eq!(get_final_value(0, config.poll_interval), 3000);

        assert_eq!(
            get_final_value(String::new(), config.host.clone()),
            "127.0.0.1"
        );
        assert_eq!(
            get_final_value(String::from("10.0.0.2"), config.host),
            "10.0.0.2"
        );
    }

    #[test]
    fn test_serve_setpoints_stopped() {
        let config = ConfigController::new(Path::new(CONFIG_FILE_CONTROLLER)).unwrap();
        let stop = Arc::new(AtomicBool::new(true));

        assert!(serve_setpoints(MockGpio::new(), &config, 0, &stop).is_ok());
    }

    #[test]
    fn test_serve_setpoints_hardware_error() {
        let config = ConfigController::new(Path::new(CONFIG_FILE_CONTROLLER)).unwrap();
        let stop = Arc::new(AtomicBool::new(true));

        let mut gpio = MockGpio::new();
        gpio.set_failing_pin(Some(config.pin_map.relays[0]));

        assert!(serve_setpoints(gpio, &config, 0, &stop).is_err());
    }
}
