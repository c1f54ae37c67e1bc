use crate::transport::{drain_until_idle, read_until_idle, Transport, TransportError};
use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;

/// SCPI over the RS-232 port found on the back of DS1000-series scopes.
///
/// The port itself is opened with a short `idle` timeout; a response is
/// complete once the line stays quiet that long after its first byte.
pub struct SerialTerminal {
    serial: Box<dyn SerialPort>,
    port: String,
    timeout: Duration,
    idle: Duration,
}

impl std::fmt::Debug for SerialTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTerminal")
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct SerialTerminalBuilder {
    port: String,
    baud_rate: u32,
    timeout: Duration,
    idle: Duration,
}

impl SerialTerminalBuilder {
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// How long to wait for the first byte of a response.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Silence that ends a response once it has started.
    pub fn idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn open(self) -> Result<SerialTerminal, TransportError> {
        log::debug!("Opening {} at {} baud", self.port, self.baud_rate);
        let serial = serialport::new(&self.port, self.baud_rate)
            .timeout(self.idle)
            .open()?;

        let terminal = SerialTerminal {
            serial,
            port: self.port,
            timeout: self.timeout,
            idle: self.idle,
        };
        terminal.flush()?;
        Ok(terminal)
    }
}

impl SerialTerminal {
    pub const DEFAULT_BAUD_RATE: u32 = 9600;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const DEFAULT_IDLE: Duration = Duration::from_millis(50);

    pub fn builder(port: &str) -> SerialTerminalBuilder {
        SerialTerminalBuilder {
            port: port.to_string(),
            baud_rate: Self::DEFAULT_BAUD_RATE,
            timeout: Self::DEFAULT_TIMEOUT,
            idle: Self::DEFAULT_IDLE,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Drop anything left over from an earlier exchange.
    fn flush(&self) -> Result<(), TransportError> {
        self.serial.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }
}

impl Transport for SerialTerminal {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        log::trace!("{} <- {}", self.port, command);
        let command_with_newline = format!("{command}\n");
        self.serial.write_all(command_with_newline.as_bytes())?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let response = read_until_idle(&mut self.serial, max_len, self.timeout)?;
        log::trace!("{} -> {} bytes", self.port, response.len());

        if response.len() >= max_len {
            let discarded = drain_until_idle(&mut self.serial)?;
            if discarded > 0 {
                log::warn!(
                    "{}: reply exceeded {} bytes, discarded {} more",
                    self.port,
                    max_len,
                    discarded
                );
            }
        }
        Ok(response)
    }
}
