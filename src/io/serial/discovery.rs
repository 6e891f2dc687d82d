// src/io/serial/discovery.rs
//
// Serial port discovery. An enumerator lists raw candidates from the host
// and a platform filter keeps the ones that look like USB serial adapters.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, SerialError};

// ============================================================================
// Types
// ============================================================================

/// A discovered serial device
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    /// Device entry name, e.g. `ttyUSB0` or `COM3`
    pub display_name: String,
    /// Path to pass to `PortSession::open`
    pub path: String,
}

/// Where raw port candidates come from
pub trait PortEnumerator: Send + Sync {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>>;
}

/// Which candidates count as ports on this host
pub trait PortFilter: Send + Sync {
    fn accepts(&self, display_name: &str) -> bool;

    fn name(&self) -> &'static str;
}

// ============================================================================
// Enumerators
// ============================================================================

/// Lists entries of a device directory such as `/dev`
#[derive(Clone, Debug)]
pub struct DeviceDirectory {
    root: PathBuf,
}

impl DeviceDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DeviceDirectory { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for DeviceDirectory {
    fn default() -> Self {
        DeviceDirectory::new("/dev")
    }
}

impl PortEnumerator for DeviceDirectory {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>> {
        let unavailable = |source| SerialError::DiscoveryUnavailable {
            path: self.root.clone(),
            source,
        };

        let mut ports = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(unavailable)? {
            // Entries can vanish mid-scan when a device is unplugged
            let Ok(entry) = entry else { continue };
            let display_name = entry.file_name().to_string_lossy().into_owned();
            ports.push(PortDescriptor {
                path: entry.path().to_string_lossy().into_owned(),
                display_name,
            });
        }
        Ok(ports)
    }
}

/// Asks the OS enumeration service through the serialport crate
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports().map_err(|e| SerialError::DiscoveryUnavailable {
            path: PathBuf::from("<system>"),
            source: e.into(),
        })?;

        Ok(ports
            .into_iter()
            .map(|p| PortDescriptor {
                display_name: display_name_for(&p.port_name),
                path: p.port_name,
            })
            .collect())
    }
}

/// Last path component, or the whole name for paths like `COM3`.
fn display_name_for(port_name: &str) -> String {
    Path::new(port_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| port_name.to_string())
}

// ============================================================================
// Platform Filters
// ============================================================================

/// Linux USB-serial (`ttyUSB*`) and USB CDC-ACM (`ttyACM*`) devices
#[derive(Clone, Copy, Debug, Default)]
pub struct UsbSerialFilter;

impl PortFilter for UsbSerialFilter {
    fn accepts(&self, display_name: &str) -> bool {
        display_name.starts_with("ttyUSB") || display_name.starts_with("ttyACM")
    }

    fn name(&self) -> &'static str {
        "usb-serial"
    }
}

/// macOS calling-unit devices (`cu.*`).
///
/// The matching `tty.*` nodes block on open waiting for carrier detect.
#[derive(Clone, Copy, Debug, Default)]
pub struct CalloutFilter;

impl PortFilter for CalloutFilter {
    fn accepts(&self, display_name: &str) -> bool {
        display_name.starts_with("cu.")
    }

    fn name(&self) -> &'static str {
        "callout"
    }
}

/// Every enumerated port (Windows COM ports carry no USB hint in the name)
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllFilter;

impl PortFilter for AcceptAllFilter {
    fn accepts(&self, _display_name: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "all"
    }
}

/// Filter for the platform this binary was built for
pub fn host_filter() -> Box<dyn PortFilter> {
    #[cfg(target_os = "macos")]
    {
        Box::new(CalloutFilter)
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(AcceptAllFilter)
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Box::new(UsbSerialFilter)
    }
}

/// Enumerator for the platform this binary was built for
pub fn host_enumerator() -> Box<dyn PortEnumerator> {
    #[cfg(unix)]
    {
        Box::new(DeviceDirectory::default())
    }
    #[cfg(not(unix))]
    {
        Box::new(SystemPorts)
    }
}

// ============================================================================
// Discovery
// ============================================================================

pub struct Discovery {
    enumerator: Box<dyn PortEnumerator>,
    filter: Box<dyn PortFilter>,
}

impl Discovery {
    pub fn new(enumerator: Box<dyn PortEnumerator>, filter: Box<dyn PortFilter>) -> Self {
        Discovery { enumerator, filter }
    }

    pub fn for_host() -> Self {
        Discovery::new(host_enumerator(), host_filter())
    }

    /// Candidate ports in enumeration order. Never fails: an unreadable
    /// device namespace is logged and reported as no ports.
    pub fn list(&self) -> Vec<PortDescriptor> {
        match self.enumerator.enumerate() {
            Ok(candidates) => {
                let ports: Vec<PortDescriptor> = candidates
                    .into_iter()
                    .filter(|p| self.filter.accepts(&p.display_name))
                    .collect();
                tracing::debug!(
                    filter = self.filter.name(),
                    found = ports.len(),
                    "Port scan complete"
                );
                ports
            }
            Err(e) => {
                tracing::warn!("{}", e);
                Vec::new()
            }
        }
    }
}

/// List candidate ports using the host's default enumerator and filter.
pub fn list_candidate_ports() -> Vec<PortDescriptor> {
    Discovery::for_host().list()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_dev(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_usb_serial_filter() {
        let filter = UsbSerialFilter;
        assert!(filter.accepts("ttyUSB0"));
        assert!(filter.accepts("ttyACM12"));
        assert!(!filter.accepts("ttyS0"));
        assert!(!filter.accepts("tty"));
        assert!(!filter.accepts("cu.usbserial-1410"));
    }

    #[test]
    fn test_callout_filter() {
        let filter = CalloutFilter;
        assert!(filter.accepts("cu.usbmodem101"));
        assert!(!filter.accepts("tty.usbmodem101"));
    }

    #[test]
    fn test_directory_scan_filters_by_prefix() {
        let dev = fake_dev(&["ttyUSB0", "ttyS0", "null", "ttyACM1"]);
        let discovery = Discovery::new(
            Box::new(DeviceDirectory::new(dev.path())),
            Box::new(UsbSerialFilter),
        );

        let mut ports = discovery.list();
        // Directory order is not guaranteed
        ports.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        let names: Vec<&str> = ports.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, ["ttyACM1", "ttyUSB0"]);
        assert_eq!(
            ports[1].path,
            dev.path().join("ttyUSB0").to_string_lossy().into_owned()
        );
    }

    #[test]
    fn test_no_matching_devices_is_empty() {
        let dev = fake_dev(&["ttyS0", "random"]);
        let discovery = Discovery::new(
            Box::new(DeviceDirectory::new(dev.path())),
            Box::new(UsbSerialFilter),
        );
        assert!(discovery.list().is_empty());
    }

    #[test]
    fn test_unreadable_namespace_degrades_to_empty() {
        let dev = tempfile::tempdir().unwrap();
        let missing = dev.path().join("not-here");

        let enumerator = DeviceDirectory::new(&missing);
        let err = enumerator.enumerate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DiscoveryUnavailable);

        let discovery = Discovery::new(Box::new(enumerator), Box::new(AcceptAllFilter));
        assert!(discovery.list().is_empty());
    }

    #[test]
    fn test_display_name_for() {
        assert_eq!(display_name_for("/dev/ttyUSB0"), "ttyUSB0");
        assert_eq!(display_name_for("/dev/cu.usbmodem1"), "cu.usbmodem1");
        assert_eq!(display_name_for("COM3"), "COM3");
    }
}
