use crate::transport::{classify_io, Transport, TransportError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timeout of the kernel `usbtmc` driver, reported when a read gives up.
pub const DRIVER_TIMEOUT: Duration = Duration::from_secs(5);

/// An instrument exposed by the Linux `usbtmc` driver as a character device,
/// typically `/dev/usbtmc0`.
///
/// Each `read` is one driver transfer: the driver hands back at most the
/// requested number of bytes of the current response and fails with
/// `ETIMEDOUT` when the instrument stays silent.
#[derive(Debug)]
pub struct UsbtmcDevice {
    file: File,
    path: PathBuf,
}

impl UsbtmcDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening USBTMC device {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TransportError::Open {
                target: path.display().to_string(),
                source,
            })?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for UsbtmcDevice {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        log::trace!("{} <- {}", self.path.display(), command);
        self.file.write_all(command.as_bytes())?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; max_len];
        let n = self
            .file
            .read(&mut buf)
            .map_err(|e| classify_io(e, DRIVER_TIMEOUT))?;
        buf.truncate(n);
        log::trace!("{} -> {} bytes", self.path.display(), n);
        Ok(buf)
    }
}
