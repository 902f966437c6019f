mod libusb;

pub use libusb::UsbTransport;

use crate::codec::DeviceKind;
use std::time::Duration;

pub const HID_REQ_GET_REPORT: u8 = 0x01;
pub const HID_REQ_SET_REPORT: u8 = 0x09;

/// Timeout for every request sent to the pad
pub const USB_TIMEOUT: Duration = Duration::from_millis(5000);

/// One physical pad as announced by discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub bus: u8,
    pub address: u8,
    pub kind: DeviceKind,
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} pad at {:03}:{:03}", self.kind, self.bus, self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidReportType {
    Output = 0x02,
    Feature = 0x03,
}

/// Setup packet of a class request addressed to interface 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlSetup {
    pub fn hid_get_report(report_type: HidReportType, report_id: u8) -> Self {
        Self {
            request_type: rusb::request_type(
                rusb::Direction::In,
                rusb::RequestType::Class,
                rusb::Recipient::Interface,
            ),
            request: HID_REQ_GET_REPORT,
            value: ((report_type as u16) << 8) | report_id as u16,
            index: 0,
        }
    }

    pub fn hid_set_report(report_type: HidReportType, report_id: u8) -> Self {
        Self {
            request_type: rusb::request_type(
                rusb::Direction::Out,
                rusb::RequestType::Class,
                rusb::Recipient::Interface,
            ),
            request: HID_REQ_SET_REPORT,
            value: ((report_type as u16) << 8) | report_id as u16,
            index: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transfer timed out")]
    Timeout,
    #[error("transfer interrupted")]
    Interrupted,
    #[error("device disconnected")]
    NoDevice,
    #[error("no USB device at {bus:03}:{address:03}")]
    NotFound { bus: u8, address: u8 },
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

impl TransportError {
    /// Timeouts just mean the pad had nothing new to say
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Raw USB access to one opened pad.
///
/// Input polling and rumble output run on different threads against the
/// same handle, so implementations must allow concurrent calls.
pub trait Transport: Send + Sync {
    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    fn read_control(
        &self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    fn write_control(
        &self,
        setup: &ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hid_requests_use_class_interface_type() {
        let get = ControlSetup::hid_get_report(HidReportType::Feature, 0xf2);
        assert_eq!(get.request_type, 0xa1);
        assert_eq!(get.value, 0x03f2);

        let set = ControlSetup::hid_set_report(HidReportType::Output, 0x01);
        assert_eq!(set.request_type, 0x21);
        assert_eq!(set.request, HID_REQ_SET_REPORT);
        assert_eq!(set.value, 0x0201);
    }

    #[test]
    fn only_timeouts_are_idle() {
        assert!(TransportError::Timeout.is_timeout());
        assert!(!TransportError::NoDevice.is_timeout());
        assert!(!TransportError::Usb(rusb::Error::Io).is_timeout());
    }

    #[test]
    fn identity_display() {
        let identity = DeviceIdentity {
            bus: 3,
            address: 12,
            kind: DeviceKind::Ps4,
        };
        assert_eq!(identity.to_string(), "PS4 pad at 003:012");
    }
}
