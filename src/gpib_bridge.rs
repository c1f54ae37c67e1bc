//! GPIB instruments reached through a GPIB-to-Ethernet adapter.
//!
//! The adapter speaks the common `++` controller protocol over a plain TCP
//! socket: lines starting with `++` configure the adapter itself, anything
//! else is forwarded to the instrument at the selected primary address.
//! Reads are explicit (`++read eoi`) so the adapter only talks to the bus
//! when a response is actually expected.

use crate::transport::{drain_until_idle, read_until_idle, Transport, TransportError};
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const ESC: u8 = 0x1b;

#[derive(Debug, Clone)]
pub struct GpibBridgeBuilder {
    host: String,
    port: u16,
    pad: u8,
    timeout: Duration,
    idle: Duration,
}

impl GpibBridgeBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Primary GPIB address of the instrument, 0..=30.
    pub fn pad(mut self, pad: u8) -> Self {
        self.pad = pad;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Silence that ends a reply once it has started. Applied as the socket
    /// read timeout.
    pub fn idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn open(self) -> Result<GpibBridge, TransportError> {
        let target = format!("{}:{}", self.host, self.port);
        let open_error = |source| TransportError::Open {
            target: target.clone(),
            source,
        };

        if self.pad > GpibBridge::MAX_PAD {
            return Err(open_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("primary address {} out of range 0..=30", self.pad),
            )));
        }

        let addr: SocketAddr = target
            .to_socket_addrs()
            .map_err(open_error)?
            .next()
            .ok_or_else(|| {
                open_error(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host did not resolve",
                ))
            })?;

        log::debug!("Connecting to GPIB bridge at {} (pad {})", addr, self.pad);
        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(open_error)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.idle))?;

        let mut bridge = GpibBridge {
            stream,
            target,
            pad: self.pad,
            timeout: self.timeout,
        };
        bridge.configure()?;
        Ok(bridge)
    }
}

#[derive(Debug)]
pub struct GpibBridge {
    stream: TcpStream,
    target: String,
    pad: u8,
    timeout: Duration,
}

impl GpibBridge {
    pub const DEFAULT_PORT: u16 = 1234;
    pub const DEFAULT_PAD: u8 = 5;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
    pub const DEFAULT_IDLE: Duration = Duration::from_millis(100);
    pub const MAX_PAD: u8 = 30;
    /// Longest bus read timeout the adapter accepts.
    const MAX_READ_TMO_MS: u128 = 3000;

    pub fn builder(host: &str) -> GpibBridgeBuilder {
        GpibBridgeBuilder {
            host: host.to_string(),
            port: Self::DEFAULT_PORT,
            pad: Self::DEFAULT_PAD,
            timeout: Self::DEFAULT_TIMEOUT,
            idle: Self::DEFAULT_IDLE,
        }
    }

    pub fn pad(&self) -> u8 {
        self.pad
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn configure(&mut self) -> Result<(), TransportError> {
        let read_tmo = self.timeout.as_millis().clamp(1, Self::MAX_READ_TMO_MS);
        for line in [
            "++mode 1".to_string(),
            "++auto 0".to_string(),
            "++eoi 1".to_string(),
            format!("++addr {}", self.pad),
            format!("++read_tmo_ms {read_tmo}"),
        ] {
            self.controller(&line)?;
        }
        Ok(())
    }

    fn controller(&mut self, line: &str) -> Result<(), TransportError> {
        log::trace!("{} ++ {}", self.target, line);
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        Ok(())
    }
}

/// Escape bytes the adapter would otherwise treat as framing.
fn escape(command: &str) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(command.len() + 1);
    for &b in command.as_bytes() {
        if matches!(b, b'\r' | b'\n' | b'+' | ESC) {
            escaped.push(ESC);
        }
        escaped.push(b);
    }
    escaped.push(b'\n');
    escaped
}

impl Transport for GpibBridge {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        log::trace!("{} <- {}", self.target, command);
        self.stream.write_all(&escape(command))?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        self.controller("++read eoi")?;
        let response = read_until_idle(&mut self.stream, max_len, self.timeout)?;
        log::trace!("{} -> {} bytes", self.target, response.len());

        // A reply cut at `max_len` must not leak into the next one.
        if response.len() >= max_len {
            let discarded = drain_until_idle(&mut self.stream)?;
            if discarded > 0 {
                log::warn!(
                    "{}: reply exceeded {} bytes, discarded {} more",
                    self.target,
                    max_len,
                    discarded
                );
            }
        }
        Ok(response)
    }
}
