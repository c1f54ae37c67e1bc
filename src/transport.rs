use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout after {0:?} waiting for the instrument to respond")]
    Timeout(Duration),

    #[error("Connection closed by the instrument")]
    Closed,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Blocking byte channel to one instrument.
///
/// Implementations never retry on their own; any failure is handed back to
/// the caller, which decides whether to repeat the whole acquisition.
pub trait Transport {
    /// Send one command to the instrument.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Read at most `max_len` bytes of the pending response.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// `write` followed by `read`.
    fn query(&mut self, command: &str, max_len: usize) -> Result<Vec<u8>, TransportError> {
        self.write(command)?;
        self.read(max_len)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command)
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(max_len)
    }

    fn query(&mut self, command: &str, max_len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).query(command, max_len)
    }
}

fn is_idle(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

/// Read from a stream whose own timeout is short, until `max_len` bytes have
/// arrived or the line goes quiet after the first byte.
///
/// Nothing at all within `timeout` is a [`TransportError::Timeout`].
pub(crate) fn read_until_idle<R: Read + ?Sized>(
    reader: &mut R,
    max_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let mut response = Vec::with_capacity(max_len.min(64 * 1024));
    let mut chunk = [0u8; 4096];
    let now = Instant::now();

    while response.len() < max_len {
        let want = chunk.len().min(max_len - response.len());
        match reader.read(&mut chunk[..want]) {
            Ok(0) => {
                if response.is_empty() {
                    return Err(TransportError::Closed);
                }
                break;
            }
            Ok(n) => response.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if is_idle(e.kind()) => {
                if !response.is_empty() {
                    break;
                }
                if now.elapsed() >= timeout {
                    return Err(TransportError::Timeout(timeout));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(response)
}

/// Discard whatever is still arriving until the line goes quiet or the
/// stream ends. Returns the number of bytes thrown away.
pub(crate) fn drain_until_idle<R: Read + ?Sized>(reader: &mut R) -> Result<usize, TransportError> {
    let mut chunk = [0u8; 4096];
    let mut discarded = 0;

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => discarded += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if is_idle(e.kind()) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(discarded)
}

/// Map an I/O error from a blocking device read onto the transport error kinds.
pub(crate) fn classify_io(error: std::io::Error, timeout: Duration) -> TransportError {
    if is_idle(error.kind()) {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Io(error)
    }
}

/// Scripted in-memory instrument.
///
/// Every command written is logged. A command with a scripted reply queues
/// that reply for the next `read`; reading with nothing queued times out,
/// the same as a real instrument that was sent a command without a reply.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    replies: HashMap<String, VecDeque<Vec<u8>>>,
    persistent: HashMap<String, Vec<u8>>,
    failing: HashMap<String, usize>,
    pending: Option<Vec<u8>>,
    writes: Vec<String>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `command` with `reply`.
    pub fn respond(mut self, command: &str, reply: impl Into<Vec<u8>>) -> Self {
        self.persistent.insert(command.to_string(), reply.into());
        self
    }

    /// Answer the next `command` with `reply`. One-shot replies are used in
    /// order before falling back to a persistent reply.
    pub fn respond_once(&mut self, command: &str, reply: impl Into<Vec<u8>>) {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply.into());
    }

    /// Make the next `times` reads after `command` time out.
    pub fn fail_on(&mut self, command: &str, times: usize) {
        *self.failing.entry(command.to_string()).or_default() += times;
    }

    /// Commands written so far, oldest first.
    pub fn writes(&self) -> &[String] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl Transport for LoopbackTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.writes.push(command.to_string());

        if let Some(remaining) = self.failing.get_mut(command) {
            if *remaining > 0 {
                *remaining -= 1;
                self.pending = None;
                return Ok(());
            }
        }

        self.pending = self
            .replies
            .get_mut(command)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.persistent.get(command).cloned());
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut reply = self
            .pending
            .take()
            .ok_or(TransportError::Timeout(Duration::ZERO))?;
        reply.truncate(max_len);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct StutteringReader {
        chunks: VecDeque<std::io::Result<Vec<u8>>>,
    }

    impl Read for StutteringReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[test]
    fn test_loopback_query() {
        let mut transport = LoopbackTransport::new().respond("*IDN?", "RIGOL,DS1052E\n");
        let reply = transport.query("*IDN?", 300).unwrap();
        assert_eq!(reply, b"RIGOL,DS1052E\n");
        assert_eq!(transport.writes(), ["*IDN?"]);
    }

    #[test]
    fn test_loopback_read_without_reply_times_out() {
        let mut transport = LoopbackTransport::new();
        transport.write(":STOP").unwrap();
        assert!(transport.read(20).unwrap_err().is_timeout());
    }

    #[test]
    fn test_loopback_one_shot_before_persistent() {
        let mut transport = LoopbackTransport::new().respond(":TIM:SCAL?", "1e-3");
        transport.respond_once(":TIM:SCAL?", "5e-6");
        assert_eq!(transport.query(":TIM:SCAL?", 20).unwrap(), b"5e-6");
        assert_eq!(transport.query(":TIM:SCAL?", 20).unwrap(), b"1e-3");
    }

    #[test]
    fn test_loopback_failure_is_counted() {
        let mut transport = LoopbackTransport::new().respond("*IDN?", "X");
        transport.fail_on("*IDN?", 1);
        assert!(transport.query("*IDN?", 10).is_err());
        assert!(transport.query("*IDN?", 10).is_ok());
    }

    #[test]
    fn test_loopback_truncates_to_max_len() {
        let mut transport = LoopbackTransport::new().respond("Q", vec![7u8; 100]);
        assert_eq!(transport.query("Q", 10).unwrap().len(), 10);
    }

    #[test]
    fn test_read_until_idle_stops_at_max_len() {
        let mut reader = Cursor::new(vec![1u8; 10_000]);
        let data = read_until_idle(&mut reader, 9000, Duration::from_millis(10)).unwrap();
        assert_eq!(data.len(), 9000);
    }

    #[test]
    fn test_read_until_idle_returns_after_quiet_line() {
        let mut reader = StutteringReader {
            chunks: VecDeque::from([
                Err(ErrorKind::WouldBlock.into()),
                Ok(b"2.000e".to_vec()),
                Ok(b"+00\n".to_vec()),
            ]),
        };
        let data = read_until_idle(&mut reader, 20, Duration::from_secs(1)).unwrap();
        assert_eq!(data, b"2.000e+00\n");
    }

    #[test]
    fn test_read_until_idle_times_out_without_data() {
        let mut reader = StutteringReader {
            chunks: VecDeque::new(),
        };
        let err = read_until_idle(&mut reader, 20, Duration::from_millis(5)).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_drain_discards_until_quiet() {
        let mut reader = StutteringReader {
            chunks: VecDeque::from([
                Ok(vec![0u8; 4096]),
                Ok(vec![0u8; 100]),
                Err(ErrorKind::WouldBlock.into()),
                Ok(b"next reply\n".to_vec()),
            ]),
        };
        assert_eq!(drain_until_idle(&mut reader).unwrap(), 4196);
        let data = read_until_idle(&mut reader, 64, Duration::from_secs(1)).unwrap();
        assert_eq!(data, b"next reply\n");
    }

    #[test]
    fn test_drain_quiet_line() {
        let mut reader = StutteringReader {
            chunks: VecDeque::new(),
        };
        assert_eq!(drain_until_idle(&mut reader).unwrap(), 0);
    }

    #[test]
    fn test_read_until_idle_reports_closed_stream() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let err = read_until_idle(&mut reader, 20, Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
