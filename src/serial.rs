//! Serial-port endpoint for USB serial bridges
//!
//! This module handles device enumeration and the concrete [`Endpoint`]
//! used against real hardware. Multi-channel FTDI bridges (FT2232 and
//! friends) expose one serial port per channel, all sharing the chip's
//! serial number; the requested [`InterfaceSelector`] picks among them.

use serde::Serialize;
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::endpoint::{
    DeviceIdentifier, Endpoint, InterfaceSelector, LinkConfig, LinkError, LinkMode, Result,
};

/// A USB serial port found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// OS port name (e.g. `/dev/ttyUSB1`, `COM4`).
    pub port_name: String,
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// USB serial number, if the device reports one.
    pub serial_number: Option<String>,
    /// Manufacturer string.
    pub manufacturer: Option<String>,
    /// Product string.
    pub product: Option<String>,
    /// USB interface number of this port.
    pub interface: Option<u8>,
}

/// List every USB serial port on the system.
///
/// # Errors
///
/// Returns `LinkError::DeviceUnavailable` if the ports cannot be enumerated.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| LinkError::DeviceUnavailable(format!("port enumeration failed: {}", e)))?;

    let devices: Vec<DeviceInfo> = ports
        .into_iter()
        .filter_map(|port| match port.port_type {
            SerialPortType::UsbPort(info) => Some(DeviceInfo {
                port_name: port.port_name,
                vid: info.vid,
                pid: info.pid,
                serial_number: info.serial_number,
                manufacturer: info.manufacturer,
                product: info.product,
                interface: info.interface,
            }),
            _ => None,
        })
        .collect();

    log::debug!("Found {} USB serial ports", devices.len());
    Ok(devices)
}

/// Whether a reported serial number belongs to `id`.
///
/// Some drivers append the channel letter (`FTZ17IROA`, `FTZ17IROB`).
fn serial_matches(serial: &str, id: &str) -> bool {
    serial == id
        || serial
            .strip_prefix(id)
            .is_some_and(|rest| rest.len() == 1 && rest.chars().all(|c| c.is_ascii_alphabetic()))
}

/// Pick the port for `identifier` on channel `interface`.
///
/// Prefers the port reporting the matching USB interface number, then a
/// channel-letter serial suffix, then the n-th matching port by name.
pub fn resolve_port<'a>(
    devices: &'a [DeviceInfo],
    identifier: &DeviceIdentifier,
    interface: InterfaceSelector,
) -> Option<&'a DeviceInfo> {
    let id = identifier.as_str();
    let mut candidates: Vec<&DeviceInfo> = devices
        .iter()
        .filter(|d| {
            d.serial_number
                .as_deref()
                .is_some_and(|serial| serial_matches(serial, id))
        })
        .collect();

    if let Some(device) = candidates
        .iter()
        .find(|d| d.interface == Some(interface.index()))
    {
        return Some(device);
    }

    let suffixed = format!("{}{}", id, interface);
    if let Some(device) = candidates
        .iter()
        .find(|d| d.serial_number.as_deref() == Some(suffixed.as_str()))
    {
        return Some(device);
    }

    candidates.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    candidates.get(usize::from(interface.index())).copied()
}

fn map_io_error(err: io::Error, timeout: Duration) -> LinkError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout(timeout),
        _ => LinkError::Io(err.to_string()),
    }
}

/// Endpoint over an OS serial port.
pub struct SerialEndpoint {
    identifier: DeviceIdentifier,
    port_name: String,
    config: LinkConfig,
    port: Option<Box<dyn SerialPort>>,
    active_timeout: Duration,
}

impl SerialEndpoint {
    /// Find the device with serial number `identifier` and open the port
    /// for the configured interface.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::DeviceUnavailable` if no port matches,
    /// `LinkError::OpenFailed` if the port cannot be opened (for example when
    /// another process holds it), and `LinkError::InvalidConfig` for an
    /// unusable configuration.
    pub fn open(identifier: &DeviceIdentifier, config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        let devices = list_devices()?;
        let device = resolve_port(&devices, identifier, config.interface).ok_or_else(|| {
            LinkError::DeviceUnavailable(format!(
                "no USB serial port with serial number {} on interface {}",
                identifier, config.interface
            ))
        })?;

        log::info!(
            "Resolved {} interface {} to {}",
            identifier,
            config.interface,
            device.port_name
        );
        Self::open_port(identifier.clone(), &device.port_name, config)
    }

    /// Open a serial port by OS name, bypassing enumeration.
    ///
    /// # Errors
    ///
    /// Same as [`SerialEndpoint::open`], except that a missing port is
    /// reported as `LinkError::OpenFailed`.
    pub fn open_path(port_name: &str, config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        Self::open_port(DeviceIdentifier::new(port_name), port_name, config)
    }

    fn open_port(identifier: DeviceIdentifier, port_name: &str, config: &LinkConfig) -> Result<Self> {
        if config.mode == LinkMode::Text {
            return Err(LinkError::OpenFailed {
                identifier: identifier.to_string(),
                message: "text mode cannot carry raw byte exchanges".to_string(),
            });
        }

        let port = serialport::new(port_name, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| LinkError::OpenFailed {
                identifier: identifier.to_string(),
                message: e.to_string(),
            })?;

        // Stale bytes from a previous session would desynchronise the first exchange
        if let Err(e) = port.clear(ClearBuffer::All) {
            log::warn!("Could not clear buffers on {}: {}", port_name, e);
        }

        log::info!(
            "Opened {} at {} baud (read timeout {:?}, write timeout {:?})",
            port_name,
            config.baud_rate,
            config.read_timeout,
            config.write_timeout
        );

        Ok(Self {
            identifier,
            port_name: port_name.to_string(),
            config: config.clone(),
            port: Some(port),
            active_timeout: config.read_timeout,
        })
    }

    /// OS name of the open port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Configuration the port was opened with.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The port switches between read and write deadlines only when they differ.
    fn port_with_timeout(&mut self, timeout: Duration) -> Result<&mut Box<dyn SerialPort>> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| LinkError::Io("endpoint closed".to_string()))?;
        if self.active_timeout != timeout {
            port.set_timeout(timeout)
                .map_err(|e| LinkError::Io(format!("failed to set timeout: {}", e)))?;
            self.active_timeout = timeout;
        }
        Ok(port)
    }
}

impl Endpoint for SerialEndpoint {
    fn identifier(&self) -> &DeviceIdentifier {
        &self.identifier
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let timeout = self.config.write_timeout;
        let port = self.port_with_timeout(timeout)?;
        port.write_all(bytes)
            .and_then(|()| port.flush())
            .map_err(|e| map_io_error(e, timeout))?;
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let timeout = self.config.read_timeout;
        let port = self.port_with_timeout(timeout)?;
        port.read(buf).map_err(|e| map_io_error(e, timeout))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Closed {}", self.port_name);
        }
    }
}

impl Drop for SerialEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(port: &str, serial: &str, interface: Option<u8>) -> DeviceInfo {
        DeviceInfo {
            port_name: port.to_string(),
            vid: 0x0403,
            pid: 0x6010,
            serial_number: Some(serial.to_string()),
            manufacturer: Some("FTDI".to_string()),
            product: Some("Dual RS232-HS".to_string()),
            interface,
        }
    }

    #[test]
    fn test_serial_matches() {
        assert!(serial_matches("FTZ17IRO", "FTZ17IRO"));
        assert!(serial_matches("FTZ17IROB", "FTZ17IRO"));
        assert!(!serial_matches("FTZ17IRO12", "FTZ17IRO"));
        assert!(!serial_matches("FTZ17IR", "FTZ17IRO"));
        assert!(!serial_matches("OTHER", "FTZ17IRO"));
    }

    #[test]
    fn test_resolve_by_interface_number() {
        let devices = vec![
            device("/dev/ttyUSB0", "FTZ17IRO", Some(0)),
            device("/dev/ttyUSB1", "FTZ17IRO", Some(1)),
        ];
        let id = DeviceIdentifier::new("FTZ17IRO");

        let b = resolve_port(&devices, &id, InterfaceSelector::B).unwrap();
        assert_eq!(b.port_name, "/dev/ttyUSB1");
        let a = resolve_port(&devices, &id, InterfaceSelector::A).unwrap();
        assert_eq!(a.port_name, "/dev/ttyUSB0");
    }

    #[test]
    fn test_resolve_by_serial_suffix() {
        let devices = vec![
            device("COM7", "FTZ17IROB", None),
            device("COM6", "FTZ17IROA", None),
        ];
        let id = DeviceIdentifier::new("FTZ17IRO");

        let b = resolve_port(&devices, &id, InterfaceSelector::B).unwrap();
        assert_eq!(b.port_name, "COM7");
    }

    #[test]
    fn test_resolve_by_port_order() {
        let devices = vec![
            device("/dev/ttyUSB3", "FTZ17IRO", None),
            device("/dev/ttyUSB2", "FTZ17IRO", None),
        ];
        let id = DeviceIdentifier::new("FTZ17IRO");

        let b = resolve_port(&devices, &id, InterfaceSelector::B).unwrap();
        assert_eq!(b.port_name, "/dev/ttyUSB3");
        assert!(resolve_port(&devices, &id, InterfaceSelector::C).is_none());
    }

    #[test]
    fn test_resolve_unknown_identifier() {
        let devices = vec![device("/dev/ttyUSB0", "OTHER123", Some(0))];
        let id = DeviceIdentifier::new("FTZ17IRO");
        assert!(resolve_port(&devices, &id, InterfaceSelector::A).is_none());
    }

    #[test]
    fn test_map_io_error() {
        let timeout = Duration::from_millis(10);
        assert!(matches!(
            map_io_error(io::Error::from(io::ErrorKind::TimedOut), timeout),
            LinkError::Timeout(t) if t == timeout
        ));
        assert!(matches!(
            map_io_error(io::Error::from(io::ErrorKind::BrokenPipe), timeout),
            LinkError::Io(_)
        ));
    }

    #[test]
    fn test_text_mode_rejected() {
        let config = LinkConfig {
            mode: LinkMode::Text,
            ..Default::default()
        };
        let result = SerialEndpoint::open_path("/dev/null-link-probe", &config);
        assert!(matches!(result, Err(LinkError::OpenFailed { .. })));
    }

    #[test]
    fn test_missing_port_fails_to_open() {
        let result = SerialEndpoint::open_path("/dev/does-not-exist-link-probe", &LinkConfig::default());
        assert!(matches!(result, Err(LinkError::OpenFailed { .. })));
    }
}
