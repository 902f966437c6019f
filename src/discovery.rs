use crate::codec::DeviceKind;
use crate::usb::DeviceIdentity;
use std::os::unix::io::AsRawFd;

pub const SONY_VENDOR_ID: &str = "054c";

const PS3_PRODUCT_IDS: &[&str] = &["0268"];
// First and second revision DualShock 4
const PS4_PRODUCT_IDS: &[&str] = &["05c4", "09cc"];

/// Which pad a Sony product id belongs to, if any
pub fn kind_for_product(product: &str) -> Option<DeviceKind> {
    let matches = |ids: &[&str]| ids.iter().any(|id| id.eq_ignore_ascii_case(product));
    if matches(PS3_PRODUCT_IDS) {
        Some(DeviceKind::Ps3)
    } else if matches(PS4_PRODUCT_IDS) {
        Some(DeviceKind::Ps4)
    } else {
        None
    }
}

/// Build an identity from the udev properties ID_MODEL_ID, BUSNUM and DEVNUM
pub fn identity_from_properties(
    product: Option<&str>,
    busnum: Option<&str>,
    devnum: Option<&str>,
) -> Option<DeviceIdentity> {
    let kind = kind_for_product(product?)?;
    let bus = busnum?.trim().parse().ok()?;
    let address = devnum?.trim().parse().ok()?;
    Some(DeviceIdentity { bus, address, kind })
}

fn property<'a>(device: &'a libudev::Device, name: &str) -> Option<&'a str> {
    device.property_value(name).and_then(|s| s.to_str())
}

fn identity_of(device: &libudev::Device) -> Option<DeviceIdentity> {
    if property(device, "ID_VENDOR_ID") != Some(SONY_VENDOR_ID) {
        return None;
    }
    identity_from_properties(
        property(device, "ID_MODEL_ID"),
        property(device, "BUSNUM"),
        property(device, "DEVNUM"),
    )
}

/// Finds PlayStation pads already plugged in and watches for new ones
pub struct Discovery {
    udev: libudev::Context,
}

impl Discovery {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            udev: libudev::Context::new()?,
        })
    }

    /// Report every supported pad to `on_device`, first those present now,
    /// then each one that gets plugged in. Only returns on udev errors.
    pub fn run(&self, mut on_device: impl FnMut(DeviceIdentity)) -> anyhow::Result<()> {
        // Listen before enumerating so nothing plugged in between is missed
        let mut monitor = libudev::Monitor::new(&self.udev)?;
        monitor.match_subsystem_devtype("usb", "usb_device")?;
        let mut socket = monitor.listen()?;

        let mut enumerator = libudev::Enumerator::new(&self.udev)?;
        enumerator.match_subsystem("usb")?;
        enumerator.match_property("ID_VENDOR_ID", SONY_VENDOR_ID)?;

        for device in enumerator.scan_devices()? {
            log::debug!("Found udev device: {:?}", device.syspath());
            if let Some(identity) = identity_of(&device) {
                log::info!("Found {}", identity);
                on_device(identity);
            }
        }

        loop {
            let mut pollfd = libc::pollfd {
                fd: socket.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let result = unsafe { libc::poll(&mut pollfd as *mut libc::pollfd, 1, -1) };
            if result < 0 {
                let e = std::io::Error::last_os_error();
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(anyhow::anyhow!("Failed to wait for udev events: {}", e));
            }

            let Some(event) = socket.receive_event() else {
                log::warn!("No device from udev monitor");
                continue;
            };

            if !matches!(event.event_type(), libudev::EventType::Add) {
                continue;
            }
            if let Some(identity) = identity_of(event.device()) {
                log::info!("Plugged in: {}", identity);
                on_device(identity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_products() {
        assert_eq!(kind_for_product("0268"), Some(DeviceKind::Ps3));
        assert_eq!(kind_for_product("05c4"), Some(DeviceKind::Ps4));
        assert_eq!(kind_for_product("09CC"), Some(DeviceKind::Ps4));
        assert_eq!(kind_for_product("0ce6"), None);
        assert_eq!(kind_for_product(""), None);
    }

    #[test]
    fn identity_needs_all_properties() {
        assert_eq!(
            identity_from_properties(Some("05c4"), Some("003"), Some("012")),
            Some(DeviceIdentity {
                bus: 3,
                address: 12,
                kind: DeviceKind::Ps4
            })
        );
        assert_eq!(identity_from_properties(None, Some("3"), Some("12")), None);
        assert_eq!(identity_from_properties(Some("0268"), None, Some("12")), None);
        assert_eq!(identity_from_properties(Some("0268"), Some("3"), None), None);
        assert_eq!(identity_from_properties(Some("0268"), Some("x"), Some("1")), None);
    }
}
