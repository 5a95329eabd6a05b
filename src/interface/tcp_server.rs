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
use serde_json::Value;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::sleep;
use std::time::Duration;

use crate::error::{InstrumentError, Result};

// Longest line in byte that is buffered before the terminator.
pub const MAX_BUFFER_SIZE: usize = 4096;

pub struct TcpServer {
    _name: String,
    _listener: TcpListener,
    _reader: Option<BufReader<TcpStream>>,
    _writer: Option<BufWriter<TcpStream>>,
    // Timeout in milliseconds.
    pub timeout: u64,
    // Bytes received but not yet terminated.
    _buffer: Vec<u8>,
    // Terminator of the message.
    _terminator: Vec<u8>,
    // Stop the server.
    _stop: Arc<AtomicBool>,
    // The server is connected or not.
    _is_connected: Arc<AtomicBool>,
}

impl TcpServer {
    /// Create a new TcpServer instance.
    ///
    /// # Arguments
    /// * `name` - Name of ther server.
    /// * `host` - A string slice that holds the hostname or IP address.
    /// * `port` - An integer that holds the port number. Put 0 to let the OS
    /// choose the port number.
    /// * `timeout` - Timeout in milliseconds.
    /// * `terminator` - A slice that holds the terminator.
    /// * `stop` - An Arc instance that holds the AtomicBool instance to stop
    /// the server.
    ///
    /// # Returns
    /// A TcpServer instance.
    ///
    /// # Errors
    /// If the listener can not bind the address.
    pub fn new(
        name: &str,
        host: &str,
        port: i32,
        timeout: u64,
        terminator: &[u8],
        stop: &Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(format!("{}:{}", host, port))?;
        listener.set_nonblocking(true)?;

        const DEFAULT_BUFFER_SIZE: usize = 256;

        Ok(Self {
            _name: String::from(name),

            _listener: listener,
            _reader: None,
            _writer: None,
            timeout,

            _buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            _terminator: terminator.to_vec(),

            _stop: stop.clone(),
            _is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the port number.
    ///
    /// # Returns
    /// An integer that holds the port number. If the port number is not
    /// available, return -1.
    pub fn get_port(&self) -> i32 {
        match self._listener.local_addr() {
            Ok(addr) => addr.port() as i32,
            Err(_) => -1,
        }
    }

    /// Accept a connection.
    ///
    /// # Returns
    /// A boolean value. If the connection is accepted, return true. Otherwise,
    /// return false.
    fn accept(&mut self) -> bool {
        let stream = match self._listener.accept() {
            Ok((stream, _)) => stream,
            Err(_) => return false,
        };

        let stream_clone = match Self::configure_stream(&stream) {
            Ok(()) => stream.try_clone(),
            Err(error) => Err(error),
        };

        match stream_clone {
            Ok(stream_clone) => {
                if let Ok(peer_addr) = stream.peer_addr() {
                    info!("{} is connected from {}.", self._name, peer_addr);
                }

                self._is_connected.store(true, Ordering::Relaxed);

                // Wrap the stream to the BufReader and BufWriter.
                self._reader = Some(BufReader::new(stream_clone));
                self._writer = Some(BufWriter::new(stream));
                self._buffer.clear();

                true
            }
            Err(error) => {
                warn!("{} fails to set up the connection: {error}.", self._name);
                false
            }
        }
    }

    /// Configure the accepted stream.
    fn configure_stream(stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)
    }

    /// Check if the server is connected.
    ///
    /// # Returns
    /// A boolean value. If the server is connected, return true. Otherwise,
    /// return false.
    fn is_connected(&self) -> bool {
        self._reader.is_some() && self._writer.is_some()
    }

    /// Get the reference to the connection status. This is useful to check the
    /// connection status in a separate thread.
    ///
    /// # Returns
    /// An Arc instance to check the connection status.
    pub fn get_connection_status_reference(&self) -> Arc<AtomicBool> {
        self._is_connected.clone()
    }

    /// Read the JSON data.
    ///
    /// # Returns
    /// None if there is no complete message. Otherwise, the JSON data or the
    /// decode error if the message is not a JSON.
    pub fn read_json(&mut self) -> Option<Result<Value>> {
        let data = self.read_line()?;
        match serde_json::from_slice(&data) {
            Ok(value) => Some(Ok(value)),
            Err(error) => {
                let text = String::from_utf8_lossy(&data);
                info!("{} receives non-JSON message: {}.", self._name, text);

                Some(Err(InstrumentError::Decode(format!("{error}: {text}"))))
            }
        }
    }

    /// Read one line. The bytes of an incomplete line are kept for the next
    /// read. The connection is closed if the line grows over
    /// `MAX_BUFFER_SIZE` bytes without the terminator.
    ///
    /// # Returns
    /// Line without the terminator. None if there is no complete line.
    fn read_line(&mut self) -> Option<Vec<u8>> {
        let stream = self._reader.as_mut()?;

        let mut is_disconnected = false;
        let mut is_terminated = false;
        let mut byte = [0; 1];
        loop {
            match stream.read(&mut byte) {
                Ok(0) => {
                    debug!(
                        "{} is disconnected from the client when reading.",
                        self._name
                    );
                    is_disconnected = true;
                    break;
                }

                Ok(_) => {
                    self._buffer.push(byte[0]);
                    if self._buffer.ends_with(&self._terminator) {
                        is_terminated = true;
                        break;
                    }

                    if self._buffer.len() > MAX_BUFFER_SIZE {
                        warn!(
                            "{} receives more than {MAX_BUFFER_SIZE} bytes without the terminator.",
                            self._name
                        );
                        is_disconnected = true;
                        break;
                    }
                }

                Err(error) => {
                    if error.kind() != ErrorKind::WouldBlock {
                        debug!("{} fails to read: {error}.", self._name);
                        is_disconnected = true;
                    }
                    break;
                }
            }
        }

        if is_disconnected {
            self.close_stream();
            return None;
        }

        if !is_terminated {
            return None;
        }

        let length = self._buffer.len() - self._terminator.len();
        let line = self._buffer[..length].to_vec();
        self._buffer.clear();

        debug!(
            "{} receives: {}.",
            self._name,
            String::from_utf8_lossy(&line)
        );

        Some(line)
    }

    /// Write the JSON item.
    ///
    /// # Arguments
    /// * `item` - A Value instance that holds the JSON data.
    pub fn write_json(&mut self, item: &Value) {
        self.write_string(item.to_string());
        self.flush();
    }

    /// Write the string data to buffer.
    ///
    /// # Arguments
    /// * `data` - A string that holds the data.
    fn write_string(&mut self, data: String) {
        if let Some(stream) = self._writer.as_mut() {
            let mut data_with_terminator = data.into_bytes();
            data_with_terminator.extend_from_slice(&self._terminator);

            // Ignore the possible error, which is found when flushing.
            let _ = stream.write_all(&data_with_terminator);
        }
    }

    /// Flush the stream.
    fn flush(&mut self) {
        if let Some(stream) = self._writer.as_mut() {
            if let Err(error) = stream.flush() {
                if error.kind() != ErrorKind::WouldBlock {
                    debug!(
                        "{} fails to flush the stream: {}. Diconnecting...",
                        self._name, error
                    );
                    self.close_stream();
                }
            }
        }
    }

    /// Close the stream.
    fn close_stream(&mut self) {
        info!("{} is disconnected.", self._name);

        // Flush the stream in the writer first before closing the stream.
        if let Some(stream) = self._writer.as_mut() {
            // Ignore the possible error.
            let _ = stream.flush();
        }

        if let Some(stream) = self._reader.as_ref() {
            // Ignore the possible error.
            let _ = stream.get_ref().shutdown(Shutdown::Both);
        }

        self._reader = None;
        self._writer = None;
        self._buffer.clear();

        self._is_connected.store(false, Ordering::Relaxed);
    }

    /// Run the server until it is stopped. One client is served at a time.
    ///
    /// # Arguments
    /// * `callback_periodic` - A periodic callback function that is called
    /// once the server is connected. It takes two mutable references to the
    /// TcpServer and other data.
    /// * `callback_first_time` - An optional callback function that is called
    /// once the server is connected for the first time. It takes two mutable
    /// references to the TcpServer and other data.
    /// * `other` - A mutable reference to the other data that is used in
    /// callback function.
    pub fn run<F1, F2, T>(
        &mut self,
        mut callback_periodic: F1,
        mut callback_first_time: Option<F2>,
        other: &mut T,
    ) where
        F1: FnMut(&mut TcpServer, &mut T),
        F2: FnMut(&mut TcpServer, &mut T),
    {
        info!("{} is running on port {}.", self._name, self.get_port());
        while !self._stop.load(Ordering::Relaxed) {
            if self.is_connected() {
                callback_periodic(self, other);
            } else if self.accept() {
                if let Some(ref mut callback) = callback_first_time {
                    callback(self, other);
                }
            } else {
                sleep(Duration::from_millis(self.timeout));
            }
        }

        self.close_stream();
        info!("{} is stopped.", self._name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use std::thread::spawn;

    use crate::constants::{LOCAL_HOST, TERMINATOR};
    use crate::utility::{client_read_json, client_write_and_sleep};

    const MAX_TIMEOUT: u64 = 200;

    fn create_tcp_server() -> (TcpServer, Arc<AtomicBool>) {
        let stop = Arc::new(AtomicBool::new(false));
        let server = TcpServer::new("server", LOCAL_HOST, 0, 20, TERMINATOR, &stop).unwrap();

        (server, stop)
    }

    fn create_tcp_client(port: i32) -> TcpStream {
        TcpStream::connect(format!("{}:{}", LOCAL_HOST, port)).expect("Tcp stream should connect.")
    }

    fn accept_connection(server: &mut TcpServer) -> bool {
        let max_timeout_counter = MAX_TIMEOUT / server.timeout;

        let mut timeout_counter = 0;
        while timeout_counter < max_timeout_counter {
            if server.accept() {
                return true;
            } else {
                timeout_counter += 1;

                sleep(Duration::from_millis(server.timeout));
            }
        }

        false
    }

    fn callback_echo(server: &mut TcpServer, count: &mut i32) {
        if let Some(Ok(mut message)) = server.read_json() {
            *count += 1;
            message["count"] = json!(*count);
            server.write_json(&message);
        } else {
            sleep(Duration::from_millis(server.timeout));
        }
    }

    #[test]
    fn test_new_port_in_use() {
        let (server, stop) = create_tcp_server();

        assert!(TcpServer::new("other", LOCAL_HOST, server.get_port(), 20, TERMINATOR, &stop).is_err());
    }

    #[test]
    fn test_get_port() {
        let server = create_tcp_server().0;

        assert!(server.get_port() > 0);
    }

    #[test]
    fn test_accept() {
        let mut server = create_tcp_server().0;
        let is_connected = server.get_connection_status_reference();

        assert!(!accept_connection(&mut server));
        assert!(!server.is_connected());

        let _client = create_tcp_client(server.get_port());

        assert!(accept_connection(&mut server));
        assert!(server.is_connected());
        assert!(is_connected.load(Ordering::Relaxed));
    }

    #[test]
    fn test_read_json() {
        let mut server = create_tcp_server().0;

        // Not connected. But it is safe to read.
        assert!(server.read_json().is_none());

        let mut client = create_tcp_client(server.get_port());
        accept_connection(&mut server);

        // Not a JSON data.
        client_write_and_sleep(&mut client, "abc\r\n", server.timeout);
        assert!(matches!(
            server.read_json(),
            Some(Err(InstrumentError::Decode(_)))
        ));

        client_write_and_sleep(&mut client, "{\"id\":\"name\",\"value\":1}\r\n", server.timeout);
        assert_eq!(
            server.read_json().unwrap().unwrap(),
            json!({"id":"name","value":1})
        );

        // No new data.
        assert!(server.read_json().is_none());
    }

    #[test]
    fn test_read_line_partial() {
        let mut server = create_tcp_server().0;
        let mut client = create_tcp_client(server.get_port());
        accept_connection(&mut server);

        // The message arrives in two pieces.
        client_write_and_sleep(&mut client, "{\"id\":", server.timeout);
        assert!(server.read_line().is_none());

        client_write_and_sleep(&mut client, "\"name\"}\r\n", server.timeout);
        assert_eq!(server.read_line(), Some(b"{\"id\":\"name\"}".to_vec()));
    }

    #[test]
    fn test_read_line_too_long() {
        let mut server = create_tcp_server().0;
        let mut client = create_tcp_client(server.get_port());
        accept_connection(&mut server);

        let data = "a".repeat(MAX_BUFFER_SIZE + 1);
        client_write_and_sleep(&mut client, &data, MAX_TIMEOUT);

        assert!(server.read_line().is_none());
        assert!(!server.is_connected());
    }

    #[test]
    fn test_read_line_disconnect() {
        let mut server = create_tcp_server().0;
        let client = create_tcp_client(server.get_port());
        accept_connection(&mut server);

        client
            .shutdown(Shutdown::Both)
            .expect("Tcp stream of the client should shutdown.");
        sleep(Duration::from_millis(server.timeout));

        assert!(server.read_line().is_none());
        assert!(!server.is_connected());
    }

    #[test]
    fn test_write_json() {
        let mut server = create_tcp_server().0;

        // Not connected. But it is safe to write.
        let item = json!({"id":"name","value":1});
        server.write_json(&item);

        let mut client = create_tcp_client(server.get_port());
        accept_connection(&mut server);

        server.write_json(&item);

        assert_eq!(client_read_json(&mut client, TERMINATOR), item);
    }

    #[test]
    fn test_run() {
        let (mut server, stop) = create_tcp_server();
        let port = server.get_port();

        let handle = spawn(move || {
            let mut count = 0;
            server.run(
                callback_echo,
                None::<fn(&mut TcpServer, &mut i32)>,
                &mut count,
            );
        });

        let mut client = create_tcp_client(port);
        for idx in 1..4 {
            client_write_and_sleep(&mut client, "{\"id\":\"echo\"}\r\n", 0);

            assert_eq!(
                client_read_json(&mut client, TERMINATOR),
                json!({"id": "echo", "count": idx})
            );
        }

        stop.store(true, Ordering::Relaxed);

        assert!(handle.join().is_ok());
    }

    #[test]
    fn test_run_multiple_connections() {
        let (mut server, stop) = create_tcp_server();
        let port = server.get_port();
        let is_connected = server.get_connection_status_reference();

        let handle = spawn(move || {
            let mut count = 0;
            server.run(
                callback_echo,
                Some(|_: &mut TcpServer, count: &mut i32| *count = 0),
                &mut count,
            );
        });

        for _ in 0..2 {
            let mut client = create_tcp_client(port);

            // The count is reset for each new connection.
            client_write_and_sleep(&mut client, "{\"id\":\"echo\"}\r\n", 0);
            assert_eq!(
                client_read_json(&mut client, TERMINATOR),
                json!({"id": "echo", "count": 1})
            );
            assert!(is_connected.load(Ordering::Relaxed));

            let _ = client.shutdown(Shutdown::Both);

            sleep(Duration::from_millis(MAX_TIMEOUT));
            assert!(!is_connected.load(Ordering::Relaxed));
        }

        stop.store(true, Ordering::Relaxed);

        assert!(handle.join().is_ok());
    }
}
