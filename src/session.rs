use crate::codec::{self, ps3};
use crate::force_feedback::{RelayExit, RelayHandle, RelayMode, RumbleRelay};
use crate::usb::{DeviceIdentity, Transport, TransportError, USB_TIMEOUT};
use crate::virtual_controller::{VirtualController, VirtualDeviceConfig};
use crossbeam_channel::Receiver;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Per-device settings, derived from the driver configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub enable_force_feedback: bool,
    pub relay_mode: RelayMode,
    pub poll_timeout: Duration,
    pub relay_wakeup: Duration,
    pub device_name: String,
    pub ps3_led_mask: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enable_force_feedback: true,
            relay_mode: RelayMode::default(),
            poll_timeout: USB_TIMEOUT,
            relay_wakeup: Duration::from_millis(100),
            device_name: crate::virtual_controller::DEFAULT_DEVICE_NAME.to_string(),
            ps3_led_mask: 0x02,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to open controller device: {0}")]
    Open(#[source] TransportError),
    #[error("failed to enable PS3 controller: {0}")]
    Negotiation(#[source] TransportError),
    #[error("failed to create virtual gamepad: {0:#}")]
    VirtualDevice(anyhow::Error),
    #[error("failed to start force feedback relay: {0}")]
    Relay(#[source] io::Error),
}

/// Why a running session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The pad stopped answering (unplugged or I/O error)
    Disconnected(TransportError),
    /// The force feedback relay lost the virtual device
    RelayFailed(io::Error),
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected(e) => write!(f, "controller did not return values: {}", e),
            Self::RelayFailed(e) => write!(f, "force feedback relay failed: {}", e),
        }
    }
}

/// Everything serving one physical pad: its USB handle, the virtual
/// gamepad and the rumble relay thread.
pub struct DeviceSession<T: Transport + 'static, V: VirtualController> {
    identity: DeviceIdentity,
    config: SessionConfig,
    relay: Option<RelayHandle>,
    relay_exits: Receiver<RelayExit>,
    controller: Option<V>,
    // Dropped last, after the relay has let go of its clone
    transport: Arc<T>,
}

impl<T, V> DeviceSession<T, V>
where
    T: Transport + 'static,
    V: VirtualController,
{
    /// Bring a pad up. Each step undoes the previous ones when it fails, so
    /// an error never leaves a handle open.
    pub fn open<O, C>(
        identity: DeviceIdentity,
        config: SessionConfig,
        open_transport: O,
        create_controller: C,
    ) -> Result<Self, SessionError>
    where
        O: FnOnce(&DeviceIdentity) -> Result<T, TransportError>,
        C: FnOnce(&VirtualDeviceConfig) -> anyhow::Result<V>,
    {
        let transport = open_transport(&identity).map_err(SessionError::Open)?;

        if identity.kind.needs_activation() {
            set_operational(&transport).map_err(SessionError::Negotiation)?;
        }

        let controller = create_controller(&VirtualDeviceConfig {
            name: config.device_name.clone(),
            force_feedback: config.enable_force_feedback,
        })
        .map_err(SessionError::VirtualDevice)?;

        let transport = Arc::new(transport);
        let (exits_tx, relay_exits) = crossbeam_channel::bounded(1);

        let relay = if config.enable_force_feedback {
            let channel = controller
                .feedback_channel()
                .map_err(SessionError::VirtualDevice)?;
            let relay = RumbleRelay::new(
                channel,
                Arc::clone(&transport),
                identity.kind,
                config.relay_mode,
                config.ps3_led_mask,
                config.relay_wakeup,
            );
            let name = format!("ff-{:03}-{:03}", identity.bus, identity.address);
            Some(relay.spawn(name, exits_tx).map_err(SessionError::Relay)?)
        } else {
            None
        };

        log::info!("Serving {}", identity);

        Ok(Self {
            identity,
            config,
            relay,
            relay_exits,
            controller: Some(controller),
            transport,
        })
    }

    /// Poll the pad until it goes away, then tear the session down.
    ///
    /// A failed relay is only noticed between reads, so while one runs the
    /// read timeout is capped at the relay wakeup interval.
    pub fn run(mut self) -> SessionEnd {
        let kind = self.identity.kind;
        let endpoint = kind.input_endpoint();
        let mut report = vec![0u8; kind.report_len()];
        let mut battery = None;
        let read_timeout = if self.relay.is_some() {
            self.config.poll_timeout.min(self.config.relay_wakeup)
        } else {
            self.config.poll_timeout
        };

        let end = loop {
            if let Ok(RelayExit::ReadFailed(e)) = self.relay_exits.try_recv() {
                break SessionEnd::RelayFailed(e);
            }

            match self
                .transport
                .read_interrupt(endpoint, &mut report, read_timeout)
            {
                Ok(n) if n == report.len() => {}
                Ok(n) => {
                    log::debug!("Ignoring {} byte report from {}", n, self.identity);
                    continue;
                }
                // No new data, the pad may just be idle
                Err(e) if e.is_timeout() => continue,
                Err(e) => break SessionEnd::Disconnected(e),
            }

            let Some(state) = codec::decode(kind, &report) else {
                continue;
            };

            if let Some(level) = codec::battery_level(kind, &report) {
                if battery != Some(level) {
                    log::debug!("{} battery level {}", self.identity, level);
                    battery = Some(level);
                }
            }

            if let Some(controller) = self.controller.as_mut() {
                if let Err(e) = controller.update(&state) {
                    log::error!("Failed to update virtual controller: {}", e);
                }
            }
        };

        log::info!("{}: {}", self.identity, end);
        self.shutdown();
        end
    }

    /// Stop the relay first; only then may the handles it uses go away.
    fn shutdown(&mut self) {
        if let Some(mut relay) = self.relay.take() {
            relay.stop();
        }
        if let Some(controller) = self.controller.take() {
            drop(controller);
            log::debug!("Closed virtual gamepad of {}", self.identity);
        }
    }
}

impl<T, V> Drop for DeviceSession<T, V>
where
    T: Transport + 'static,
    V: VirtualController,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// GET_REPORT on feature 0xf2. Without it the Sixaxis sends nothing.
fn set_operational<T: Transport>(transport: &T) -> Result<(), TransportError> {
    let mut reply = [0u8; ps3::OPERATIONAL_REPORT_LEN];
    let n = transport.read_control(&ps3::operational_request(), &mut reply, USB_TIMEOUT)?;
    log::debug!("PS3 operational reply: {:02x?}", &reply[..n]);
    Ok(())
}
