pub mod codes;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
mod uinput_ffi;

#[cfg(target_os = "linux")]
pub use linux::VirtualXboxController;

use crate::codec::{stick, ControllerState};
use codes::*;
use std::io;
use std::time::Duration;

pub const XBOX_VENDOR_ID: u16 = 0x045e;
pub const XBOX_PRODUCT_ID: u16 = 0x028e;
pub const XBOX_VERSION: u16 = 0x0110;
pub const DEFAULT_DEVICE_NAME: &str = "Microsoft X-Box 360 pad";

/// One input event as written to or read from the virtual device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadEvent {
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl PadEvent {
    pub const fn new(type_: u16, code: u16, value: i32) -> Self {
        Self { type_, code, value }
    }

    fn key(code: u16, pressed: bool) -> Self {
        Self::new(EV_KEY, code, pressed as i32)
    }

    fn abs(code: u16, value: i32) -> Self {
        Self::new(EV_ABS, code, value)
    }

    pub const fn sync() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }
}

/// What the virtual device should look like to the rest of the system
#[derive(Debug, Clone)]
pub struct VirtualDeviceConfig {
    pub name: String,
    /// Advertise one rumble slot
    pub force_feedback: bool,
}

impl Default for VirtualDeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            force_feedback: true,
        }
    }
}

/// Event group for one controller snapshot, sync event included.
///
/// Buttons first, then d-pad, triggers and the translated sticks.
pub fn state_events(state: &ControllerState) -> [PadEvent; 20] {
    let b = &state.buttons;
    [
        PadEvent::key(BTN_A, b.a),
        PadEvent::key(BTN_B, b.b),
        PadEvent::key(BTN_X, b.x),
        PadEvent::key(BTN_Y, b.y),
        PadEvent::key(BTN_SELECT, b.back),
        PadEvent::key(BTN_START, b.start),
        PadEvent::key(BTN_MODE, b.guide),
        PadEvent::key(BTN_THUMBL, b.left_thumb),
        PadEvent::key(BTN_THUMBR, b.right_thumb),
        PadEvent::key(BTN_TL, b.left_bumper),
        PadEvent::key(BTN_TR, b.right_bumper),
        PadEvent::abs(ABS_HAT0X, state.dpad_x as i32),
        PadEvent::abs(ABS_HAT0Y, state.dpad_y as i32),
        PadEvent::abs(ABS_Z, state.left_trigger as i32),
        PadEvent::abs(ABS_RZ, state.right_trigger as i32),
        PadEvent::abs(ABS_X, stick::translate(state.left_stick_x)),
        PadEvent::abs(ABS_Y, stick::translate(state.left_stick_y)),
        PadEvent::abs(ABS_RX, stick::translate(state.right_stick_x)),
        PadEvent::abs(ABS_RY, stick::translate(state.right_stick_y)),
        PadEvent::sync(),
    ]
}

/// Effect parameters fetched during an upload handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Rumble { strong: u16, weak: u16 },
    Other(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadedEffect {
    pub id: i16,
    pub kind: EffectKind,
}

/// Read side of the virtual device, owned by the force feedback relay.
pub trait FeedbackChannel: Send {
    /// Wait at most `timeout` for the next request. `Ok(None)` when nothing
    /// arrived in time.
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<PadEvent>>;

    /// Run the begin/end upload handshake for `request_id`. The end step is
    /// always performed once the begin step was attempted.
    fn upload(&mut self, request_id: u32) -> io::Result<UploadedEffect>;

    /// Run the begin/end erase handshake, returning the erased effect id.
    fn erase(&mut self, request_id: u32) -> io::Result<i16>;
}

/// Trait for virtual Xbox controller implementations
pub trait VirtualController: Send {
    type Feedback: FeedbackChannel + 'static;

    /// Write one complete event group; nothing is synced if a write fails.
    fn emit(&mut self, events: &[PadEvent]) -> anyhow::Result<()>;

    /// Second handle on the same device for the force feedback relay
    fn feedback_channel(&self) -> anyhow::Result<Self::Feedback>;

    fn update(&mut self, state: &ControllerState) -> anyhow::Result<()> {
        self.emit(&state_events(state))
    }
}
