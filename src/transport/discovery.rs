// src/transport/discovery.rs - USB serial port enumeration
use super::{DynSerial, SerialBackend, SerialSettings};
use async_trait::async_trait;
use serde::Serialize;
use serialport::SerialPortType;
use std::io;

/// USB controller chip the host knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedDevice {
    pub vid: u16,
    pub pid: u16,
    pub name: &'static str,
}

pub const SUPPORTED_DEVICES: [SupportedDevice; 3] = [
    SupportedDevice { vid: 0x1A86, pid: 0x7523, name: "CH340" },
    SupportedDevice { vid: 0x1A86, pid: 0x8040, name: "CH340K" },
    SupportedDevice { vid: 0x04D8, pid: 0xFD92, name: "EiBotBoard" },
];

pub fn supported_device(vid: u16, pid: u16) -> Option<&'static SupportedDevice> {
    SUPPORTED_DEVICES.iter().find(|d| d.vid == vid && d.pid == pid)
}

pub fn is_supported(vid: u16, pid: u16) -> bool {
    supported_device(vid, pid).is_some()
}

/// One enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    pub device: String,
    pub description: String,
    pub hwid: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub compatible: bool,
    /// Chip name when compatible.
    pub device_name: Option<String>,
}

impl PortDescriptor {
    pub fn usb(
        device: impl Into<String>,
        vid: u16,
        pid: u16,
        description: Option<String>,
        serial_number: Option<String>,
    ) -> Self {
        let known = supported_device(vid, pid);
        let mut hwid = format!("USB VID:PID={:04X}:{:04X}", vid, pid);
        if let Some(sn) = serial_number {
            hwid.push_str(&format!(" SER={}", sn));
        }
        Self {
            device: device.into(),
            description: description.unwrap_or_else(|| "USB Serial".to_string()),
            hwid,
            vid: Some(vid),
            pid: Some(pid),
            compatible: known.is_some(),
            device_name: known.map(|d| d.name.to_string()),
        }
    }

    pub fn other(device: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            description: description.into(),
            hwid: "n/a".to_string(),
            vid: None,
            pid: None,
            compatible: false,
            device_name: None,
        }
    }
}

/// Operating-system serial ports: `serialport` for enumeration, `serial2-tokio` for I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

#[async_trait]
impl SerialBackend for SystemSerial {
    fn available_ports(&self) -> io::Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports().map_err(io::Error::other)?;
        Ok(ports
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(info) => PortDescriptor::usb(
                    p.port_name,
                    info.vid,
                    info.pid,
                    info.product.or(info.manufacturer),
                    info.serial_number,
                ),
                SerialPortType::PciPort => PortDescriptor::other(p.port_name, "PCI Port"),
                SerialPortType::BluetoothPort => PortDescriptor::other(p.port_name, "Bluetooth Port"),
                SerialPortType::Unknown => PortDescriptor::other(p.port_name, "n/a"),
            })
            .collect())
    }

    async fn open(&self, path: &str, settings: &SerialSettings) -> io::Result<DynSerial> {
        let port = serial2_tokio::SerialPort::open(path, settings.baud_rate)?;
        Ok(Box::new(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_chips_are_compatible() {
        let ch340 = PortDescriptor::usb("/dev/ttyUSB0", 0x1A86, 0x7523, None, Some("A1".into()));
        assert!(ch340.compatible);
        assert_eq!(ch340.device_name.as_deref(), Some("CH340"));
        assert_eq!(ch340.hwid, "USB VID:PID=1A86:7523 SER=A1");

        let ebb = PortDescriptor::usb("COM4", 0x04D8, 0xFD92, Some("EiBotBoard".into()), None);
        assert!(ebb.compatible);
    }

    #[test]
    fn test_every_supported_chip_is_compatible() {
        for device in SUPPORTED_DEVICES {
            let port = PortDescriptor::usb("/dev/ttyUSB0", device.vid, device.pid, None, None);
            assert!(port.compatible, "{} not marked compatible", device.name);
            assert_eq!(port.device_name.as_deref(), Some(device.name));
            assert!(is_supported(device.vid, device.pid));
        }
        assert_eq!(supported_device(0x1A86, 0x8040).map(|d| d.name), Some("CH340K"));
    }

    #[test]
    fn test_unknown_usb_and_non_usb_ports_are_not_compatible() {
        let ftdi = PortDescriptor::usb("/dev/ttyUSB1", 0x0403, 0x6001, None, None);
        assert!(!ftdi.compatible);
        assert_eq!(ftdi.device_name, None);
        assert!(!PortDescriptor::other("/dev/ttyS0", "n/a").compatible);
        assert!(!is_supported(0x1A86, 0x0000));
    }
}
