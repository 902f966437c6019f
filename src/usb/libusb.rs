use super::{ControlSetup, DeviceIdentity, Transport, TransportError};
use rusb::{DeviceHandle, UsbContext};
use std::time::Duration;

const INTERFACE: u8 = 0;

/// libusb handle on a claimed pad. Closed when dropped.
pub struct UsbTransport<C: UsbContext = rusb::Context> {
    handle: DeviceHandle<C>,
}

impl<C: UsbContext> UsbTransport<C> {
    /// Find the device at the given bus and address, detach the kernel
    /// driver from its first interface and claim it.
    pub fn open(context: &C, identity: &DeviceIdentity) -> Result<Self, TransportError> {
        let device = context
            .devices()?
            .iter()
            .find(|d| d.bus_number() == identity.bus && d.address() == identity.address)
            .ok_or(TransportError::NotFound {
                bus: identity.bus,
                address: identity.address,
            })?;

        let mut handle = device.open().map_err(classify)?;

        match handle.kernel_driver_active(INTERFACE) {
            Ok(true) => {
                log::debug!("Detaching kernel driver from {}", identity);
                if let Err(e) = handle.detach_kernel_driver(INTERFACE) {
                    log::warn!("Failed to detach kernel driver from {}: {}", identity, e);
                }
            }
            Ok(false) => {}
            Err(e) => log::debug!("Cannot query kernel driver of {}: {}", identity, e),
        }

        handle.claim_interface(INTERFACE).map_err(classify)?;

        Ok(Self { handle })
    }
}

impl<C: UsbContext> Drop for UsbTransport<C> {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(INTERFACE) {
            log::debug!("Failed to release interface: {}", e);
        }
    }
}

impl<C: UsbContext> Transport for UsbTransport<C> {
    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.handle
            .read_interrupt(endpoint, buf, timeout)
            .map_err(classify)
    }

    fn read_control(
        &self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.handle
            .read_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                buf,
                timeout,
            )
            .map_err(classify)
    }

    fn write_control(
        &self,
        setup: &ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.handle
            .write_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                data,
                timeout,
            )
            .map_err(classify)
    }
}

fn classify(error: rusb::Error) -> TransportError {
    match error {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::Interrupted => TransportError::Interrupted,
        rusb::Error::NoDevice => TransportError::NoDevice,
        other => TransportError::Usb(other),
    }
}
