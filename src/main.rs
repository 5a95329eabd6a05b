use clap::{value_parser, Arg, ArgAction, Command};
use log::{error, info};
use simplelog::{
    format_description, ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::File;
use std::process::ExitCode;

use run_em_instrument::application;

fn main() -> ExitCode {
    // Parse the command line arguments
    let matches = Command::new("em instrument")
        .about("Setpoint synchronizer and actuator controller of the e/m instrument.")
        .subcommand_required(true)
        .arg(
            Arg::new("level")
                .short('l')
                .long("log-level")
                .global(true)
                .help("Log level: 0 (Off), 1 (Error), 2 (Warn), 3 (Info), 4 (Debug), 5 (Trace)")
                .default_value("3")
                .value_parser(value_parser!(u32)),
        )
        .subcommand(
            Command::new("controller")
                .about("Apply the received setpoints to the stepper motors and relays.")
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .help("Port to override the configuration file. Default is 0, which means no override.")
                        .default_value("0")
                        .value_parser(value_parser!(i32)),
                )
                .arg(
                    Arg::new("simulate")
                        .short('s')
                        .long("simulate")
                        .action(ArgAction::SetTrue)
                        .help("Run the simulation mode"),
                ),
        )
        .subcommand(
            Command::new("synchronizer")
                .about("Poll the store and deliver the changed setpoints to the controller.")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .help("Host of the controller to override the configuration file."),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .help("Port of the controller. Default is 0, which means no override.")
                        .default_value("0")
                        .value_parser(value_parser!(i32)),
                )
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .help("Poll interval in millisecond. Default is 0, which means no override.")
                        .default_value("0")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("database")
                        .short('d')
                        .long("database")
                        .help("Path of the SQLite store to override the configuration file."),
                )
                .arg(
                    Arg::new("init_store")
                        .long("init-store")
                        .action(ArgAction::SetTrue)
                        .help("Recreate the store with the default setpoints"),
                ),
        )
        .get_matches();

    // Check the log filter
    let log_filter = get_log_filter(matches.get_one::<u32>("level"));

    let result = match matches.subcommand() {
        Some(("controller", sub_matches)) => {
            initiate_logger(log_filter, "controller.log");
            info!("Log level: {log_filter}.");

            application::run_controller(
                get_argument(sub_matches.get_one::<i32>("port")),
                sub_matches.get_flag("simulate"),
            )
        }
        Some(("synchronizer", sub_matches)) => {
            initiate_logger(log_filter, "synchronizer.log");
            info!("Log level: {log_filter}.");

            application::run_synchronizer(
                &get_argument(sub_matches.get_one::<String>("host")),
                get_argument(sub_matches.get_one::<i32>("port")),
                get_argument(sub_matches.get_one::<u64>("interval")),
                &get_argument(sub_matches.get_one::<String>("database")),
                sub_matches.get_flag("init_store"),
            )
        }
        _ => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("Application fails: {error}.");
            ExitCode::FAILURE
        }
    }
}

/// Get the argument or its default value.
///
/// # Arguments
/// * `argument` - Argument of the command line.
///
/// # Returns
/// Argument. The default value means no override.
fn get_argument<T: Clone + Default>(argument: Option<&T>) -> T {
    argument.cloned().unwrap_or_default()
}

/// Get the log filter.
///
/// # Arguments
/// * `log_level` - Log level.
///
/// # Returns
/// Log filter.
fn get_log_filter(log_level: Option<&u32>) -> LevelFilter {
    match log_level {
        Some(level) => match level {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            5 => LevelFilter::Trace,
            _ => LevelFilter::Info,
        },
        None => LevelFilter::Info,
    }
}

/// Initiate the logger.
///
/// # Arguments
/// * `level` - Log level.
/// * `filepath` - Log file path.
fn initiate_logger(level: LevelFilter, filepath: &str) {
    let config = ConfigBuilder::new()
        .set_time_format_custom(format_description!(
            "[year]/[month]/[day] [hour]:[minute]:[second].[subsecond]"
        ))
        .build();

    // Log to the terminal
    let logger_terminal = TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    // Log to the file
    match File::create(filepath) {
        Ok(file) => {
            let _ = CombinedLogger::init(vec![
                logger_terminal,
                WriteLogger::new(level, config, file),
            ]);
        }
        Err(error) => {
            eprintln!("Failed to create the log file: {error}.");
            let _ = CombinedLogger::init(vec![logger_terminal]);
        }
    }
}
