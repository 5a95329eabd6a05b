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

use log::debug;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::constants::NUM_SETPOINT_FIELD;
use crate::error::{InstrumentError, Result};
use crate::setpoint::{SetpointVector, STORE_FIELDS};

/// Numeric store that holds the desired setpoint vector.
pub trait SetpointStore {
    /// Read the current setpoint vector.
    ///
    /// # Returns
    /// Setpoint vector.
    ///
    /// # Errors
    /// If the store can not be read or does not hold a complete vector.
    fn read(&mut self) -> Result<SetpointVector>;
}

pub struct SqliteStore {
    _path: PathBuf,
    _table: String,
}

impl SqliteStore {
    /// Create a new SQLite store.
    ///
    /// # Arguments
    /// * `path` - Path of the database file.
    /// * `table` - Name of the table. Only ASCII letters, digits and
    /// underscores are allowed.
    ///
    /// # Returns
    /// SQLite store.
    ///
    /// # Errors
    /// If the table name is not allowed.
    pub fn new(path: &Path, table: &str) -> Result<Self> {
        let is_valid = !table.is_empty()
            && table
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || character == '_');
        if !is_valid {
            return Err(InstrumentError::Store(format!(
                "invalid table name: {table:?}"
            )));
        }

        Ok(Self {
            _path: path.to_path_buf(),
            _table: String::from(table),
        })
    }

    /// Open the connection.
    fn open(&self) -> Result<Connection> {
        Ok(Connection::open(&self._path)?)
    }

    /// Recreate the table and seed the default setpoints of the instrument.
    pub fn initialize_defaults(&self) -> Result<()> {
        let connection = self.open()?;
        connection.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table}(
                 Variables CHAR(50) PRIMARY KEY NOT NULL,
                 Values_ INT NOT NULL);",
            table = self._table
        ))?;

        self.write_with(&connection, &SetpointVector::instrument_default())
    }

    /// Write the setpoint vector. External programs normally do this.
    ///
    /// # Arguments
    /// * `vector` - Setpoint vector.
    pub fn write(&self, vector: &SetpointVector) -> Result<()> {
        self.write_with(&self.open()?, vector)
    }

    fn write_with(&self, connection: &Connection, vector: &SetpointVector) -> Result<()> {
        let mut statement = connection.prepare(&format!(
            "INSERT OR REPLACE INTO {} (Variables, Values_) VALUES (?1, ?2)",
            self._table
        ))?;

        for (name, value) in STORE_FIELDS.iter().zip(vector.to_store_values()) {
            statement.execute(params![name, value])?;
        }

        Ok(())
    }
}

impl SetpointStore for SqliteStore {
    fn read(&mut self) -> Result<SetpointVector> {
        let connection = self.open()?;
        let mut statement = connection.prepare(&format!(
            "SELECT Variables, Values_ FROM {} ORDER BY Variables",
            self._table
        ))?;

        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?))
        })?;

        let mut records = HashMap::new();
        for row in rows {
            let (name, value) = row?;
            records.insert(name, value);
        }

        if records.len() != NUM_SETPOINT_FIELD {
            return Err(InstrumentError::Store(format!(
                "expect {NUM_SETPOINT_FIELD} variables but get {}",
                records.len()
            )));
        }

        let mut values = [0; NUM_SETPOINT_FIELD];
        for (value, name) in values.iter_mut().zip(STORE_FIELDS) {
            *value = *records
                .get(name)
                .ok_or_else(|| InstrumentError::Store(format!("no variable {name}")))?;
        }

        debug!("Store values: {values:?}.");

        SetpointVector::from_store_values(&values)
            .map_err(|error| InstrumentError::Store(error.to_string()))
    }
}

/// Store in the memory. The clones share the same vector.
#[derive(Clone, Default)]
pub struct MemoryStore {
    _vector: Arc<Mutex<SetpointVector>>,
}

impl MemoryStore {
    /// Create a new memory store.
    ///
    /// # Arguments
    /// * `vector` - Initial setpoint vector.
    ///
    /// # Returns
    /// Memory store.
    pub fn new(vector: SetpointVector) -> Self {
        Self {
            _vector: Arc::new(Mutex::new(vector)),
        }
    }

    /// Set the setpoint vector.
    ///
    /// # Arguments
    /// * `vector` - Setpoint vector.
    pub fn set(&self, vector: SetpointVector) {
        match self._vector.lock() {
            Ok(mut current) => *current = vector,
            Err(poisoned) => *poisoned.into_inner() = vector,
        }
    }
}

impl SetpointStore for MemoryStore {
    fn read(&mut self) -> Result<SetpointVector> {
        match self._vector.lock() {
            Ok(vector) => Ok(*vector),
            Err(_) => Err(InstrumentError::Store(String::from(
                "memory store is poisoned",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::{tempdir, TempDir};

    use crate::enums::{DeflectingPolarity, MagneticArcDirection};

    fn create_sqlite_store() -> (SqliteStore, TempDir) {
        let directory = tempdir().unwrap();
        let store = SqliteStore::new(&directory.path().join("store.db"), "DATA").unwrap();

        (store, directory)
    }

    #[test]
    fn test_new() {
        let path = Path::new("store.db");

        assert!(SqliteStore::new(path, "DATA_1").is_ok());

        assert!(SqliteStore::new(path, "").is_err());
        assert!(SqliteStore::new(path, "DATA; DROP TABLE DATA").is_err());
    }

    #[test]
    fn test_initialize_defaults() {
        let (mut store, _directory) = create_sqlite_store();

        store.initialize_defaults().unwrap();

        assert_eq!(store.read().unwrap(), SetpointVector::instrument_default());
    }

    #[test]
    fn test_initialize_defaults_overwrite() {
        let (mut store, _directory) = create_sqlite_store();

        store.initialize_defaults().unwrap();
        store
            .write(&SetpointVector {
                accelerating_voltage: 100,
                ..SetpointVector::instrument_default()
            })
            .unwrap();

        store.initialize_defaults().unwrap();

        assert_eq!(store.read().unwrap(), SetpointVector::instrument_default());
    }

    #[test]
    fn test_read_external_write() {
        let (mut store, directory) = create_sqlite_store();
        store.initialize_defaults().unwrap();

        // Another program updates the store.
        let connection = Connection::open(directory.path().join("store.db")).unwrap();
        connection
            .execute(
                "UPDATE DATA SET Values_ = ?1 WHERE Variables = ?2",
                params![2, "magneticArc"],
            )
            .unwrap();
        connection
            .execute(
                "UPDATE DATA SET Values_ = ?1 WHERE Variables = ?2",
                params![120, "magnetizingCurrent"],
            )
            .unwrap();

        let vector = store.read().unwrap();

        assert_eq!(vector.magnetic_arc, MagneticArcDirection::CounterClockwise);
        assert_eq!(vector.magnetizing_current, 120);
        assert_eq!(vector.deflecting_polarity, DeflectingPolarity::Off);
        assert_eq!(vector.deflecting_voltage, 50);
    }

    #[test]
    fn test_read_error() {
        let (mut store, directory) = create_sqlite_store();

        // No table.
        assert!(matches!(store.read(), Err(InstrumentError::Store(_))));

        // Missing variable.
        store.initialize_defaults().unwrap();

        let connection = Connection::open(directory.path().join("store.db")).unwrap();
        connection
            .execute("DELETE FROM DATA WHERE Variables = ?1", params!["magneticArc"])
            .unwrap();

        assert!(matches!(store.read(), Err(InstrumentError::Store(_))));

        // Unknown variable name.
        connection
            .execute(
                "INSERT INTO DATA (Variables, Values_) VALUES (?1, ?2)",
                params!["magneticArcs", 0],
            )
            .unwrap();

        assert!(matches!(store.read(), Err(InstrumentError::Store(_))));
    }

    #[test]
    fn test_read_undefined_enum_code() {
        let (mut store, directory) = create_sqlite_store();
        store.initialize_defaults().unwrap();

        let connection = Connection::open(directory.path().join("store.db")).unwrap();
        connection
            .execute(
                "UPDATE DATA SET Values_ = ?1 WHERE Variables = ?2",
                params![3, "deflectingPolarity"],
            )
            .unwrap();

        assert!(matches!(store.read(), Err(InstrumentError::Store(_))));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new(SetpointVector::instrument_default());
        let store_clone = store.clone();

        assert_eq!(store.read().unwrap(), SetpointVector::instrument_default());

        let vector = SetpointVector {
            accelerating_voltage: 30,
            ..SetpointVector::default()
        };
        store_clone.set(vector);

        assert_eq!(store.read().unwrap(), vector);
    }
}
