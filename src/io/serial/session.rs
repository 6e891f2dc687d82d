// src/io/serial/session.rs
//
// One open serial device. Opening applies the fixed line settings; any
// failure after the OS open releases the handle before returning.

use serialport::SerialPort;
use std::io::Read;

use super::utils::{
    to_serialport_data_bits, to_serialport_flow_control, to_serialport_parity,
    to_serialport_stop_bits, SessionConfig,
};
use crate::error::{Result, SerialError};

// ============================================================================
// Device Backend
// ============================================================================

/// An open OS serial handle. Dropping it releases the handle.
pub trait LineDevice: Send {
    /// Confirm the device runs with `config`; an error means the session
    /// must not be used.
    fn configure(&mut self, config: &SessionConfig) -> serialport::Result<()>;

    /// Read whatever is buffered, up to `buf.len()` bytes, without waiting.
    fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Opens device paths for exclusive read access.
pub trait DeviceOpener {
    type Device: LineDevice;

    fn open_device(&self, path: &str, config: &SessionConfig) -> serialport::Result<Self::Device>;
}

/// Opens real devices through the serialport crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemOpener;

impl DeviceOpener for SystemOpener {
    type Device = Box<dyn SerialPort>;

    fn open_device(&self, path: &str, config: &SessionConfig) -> serialport::Result<Self::Device> {
        // The whole line setup goes through the builder, so opening does a
        // single termios/DCB read, modify and write.
        let builder = serialport::new(path, config.baud_rate())
            .data_bits(to_serialport_data_bits(config.data_bits()))
            .parity(to_serialport_parity(config.parity()))
            .stop_bits(to_serialport_stop_bits(config.stop_bits()))
            .flow_control(to_serialport_flow_control(config.flow_control()))
            .timeout(config.read_timeout());

        // No controlling terminal, and no other process may open the tty
        // while we hold it.
        #[cfg(unix)]
        {
            let mut port = builder.open_native()?;
            port.set_exclusive(true)?;
            Ok(Box::new(port))
        }

        #[cfg(not(unix))]
        {
            builder.open()
        }
    }
}

impl LineDevice for Box<dyn SerialPort> {
    fn configure(&mut self, config: &SessionConfig) -> serialport::Result<()> {
        // Settings were written at open; only read them back here.
        let applied = (
            self.data_bits()?,
            self.parity()?,
            self.stop_bits()?,
            self.flow_control()?,
        );
        check_applied(config, applied)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.read(buf) {
            Ok(n) => Ok(n),
            // Timeout is expected for zero-timeout reads
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}

type AppliedSettings = (
    serialport::DataBits,
    serialport::Parity,
    serialport::StopBits,
    serialport::FlowControl,
);

fn check_applied(config: &SessionConfig, applied: AppliedSettings) -> serialport::Result<()> {
    let wanted = (
        to_serialport_data_bits(config.data_bits()),
        to_serialport_parity(config.parity()),
        to_serialport_stop_bits(config.stop_bits()),
        to_serialport_flow_control(config.flow_control()),
    );
    if applied == wanted {
        Ok(())
    } else {
        Err(serialport::Error::new(
            serialport::ErrorKind::InvalidInput,
            format!("device reports {:?}, wanted {}", applied, config.describe()),
        ))
    }
}

// ============================================================================
// Port Session
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

pub struct PortSession<D: LineDevice = Box<dyn SerialPort>> {
    path: String,
    device: Option<D>,
}

impl PortSession {
    /// Open a real device with the fixed session settings.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with(&SystemOpener, path, &SessionConfig::FIXED)
    }
}

impl<D: LineDevice> PortSession<D> {
    pub fn open_with<O>(opener: &O, path: &str, config: &SessionConfig) -> Result<Self>
    where
        O: DeviceOpener<Device = D>,
    {
        let mut device = opener
            .open_device(path, config)
            .map_err(|source| SerialError::Open {
                path: path.to_string(),
                source,
            })?;

        if let Err(source) = device.configure(config) {
            drop(device);
            tracing::debug!(path, "Released handle after configuration failure");
            return Err(SerialError::Configuration {
                path: path.to_string(),
                source,
            });
        }

        tracing::debug!(path, config = %config.describe(), "Opened serial session");
        Ok(PortSession {
            path: path.to_string(),
            device: Some(device),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> SessionState {
        if self.device.is_some() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Read up to `max_bytes` without blocking. An empty result means nothing
    /// was available and is not an error.
    pub fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max_bytes];
        let n = self.read_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Like [`read`](Self::read) but fills a caller-owned buffer.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let device = self.device.as_mut().ok_or_else(|| SerialError::SessionClosed {
            path: self.path.clone(),
        })?;

        device.read_available(buf).map_err(|source| SerialError::Read {
            path: self.path.clone(),
            source,
        })
    }

    /// Release the handle. Closing a closed session does nothing.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            drop(device);
            tracing::debug!(path = %self.path, "Closed serial session");
        }
    }
}

impl<D: LineDevice> Drop for PortSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: LineDevice> std::fmt::Debug for PortSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSession")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Scripted Device (tests)
// ============================================================================
