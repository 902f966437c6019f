mod relay;

pub use relay::{RelayExit, RelayHandle, RumbleRelay};

use crate::codec::{ps3, ps4, DeviceKind};
use crate::usb::ControlSetup;
use crate::virtual_controller::{EffectKind, UploadedEffect};
use serde::{Deserialize, Serialize};

/// How records read from the virtual device are turned into rumble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Kernel effect lifecycle: upload/erase handshakes plus EV_FF playback
    /// of the single tracked effect
    #[default]
    Effects,
    /// Every EV_FF/FF_RUMBLE record carries the intensities itself:
    /// strong in the upper 16 bits of the value, weak in the lower 16 bits
    Direct,
}

/// Motor intensities sent to the pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rumble {
    pub strong: u16,
    pub weak: u16,
}

impl Rumble {
    pub const OFF: Rumble = Rumble { strong: 0, weak: 0 };

    /// Unpack a direct intensity record
    pub fn from_packed(value: i32) -> Self {
        let value = value as u32;
        Self {
            strong: (value >> 16) as u16,
            weak: value as u16,
        }
    }

    /// Control transfer that makes the pad vibrate at these intensities
    pub fn output_report(&self, kind: DeviceKind, ps3_led_mask: u8) -> (ControlSetup, Vec<u8>) {
        match kind {
            DeviceKind::Ps3 => ps3::rumble_report(self.strong, self.weak, ps3_led_mask),
            DeviceKind::Ps4 => ps4::rumble_report(self.strong, self.weak),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Uploaded,
    Playing,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct StoredEffect {
    id: i16,
    rumble: Rumble,
    playing: Option<bool>,
}

/// The one effect the virtual device can hold
#[derive(Debug, Default)]
pub struct ForceFeedbackSlot {
    effect: Option<StoredEffect>,
}

impl ForceFeedbackSlot {
    pub fn state(&self) -> SlotState {
        match self.effect {
            None => SlotState::Empty,
            Some(StoredEffect { playing: None, .. }) => SlotState::Uploaded,
            Some(StoredEffect { playing: Some(true), .. }) => SlotState::Playing,
            Some(StoredEffect { playing: Some(false), .. }) => SlotState::Stopped,
        }
    }

    pub fn effect_id(&self) -> Option<i16> {
        self.effect.map(|e| e.id)
    }

    /// Remember an uploaded effect. Only rumble effects are kept; anything
    /// else uploaded under the tracked id drops the old parameters.
    pub fn store(&mut self, effect: &UploadedEffect) -> bool {
        match effect.kind {
            EffectKind::Rumble { strong, weak } => {
                self.effect = Some(StoredEffect {
                    id: effect.id,
                    rumble: Rumble { strong, weak },
                    playing: None,
                });
                true
            }
            EffectKind::Other(_) => {
                if self.effect_id() == Some(effect.id) {
                    self.effect = None;
                }
                false
            }
        }
    }

    /// Play (value > 0) or stop (value == 0) request for `id`. Returns the
    /// intensities to send, or `None` if `id` is not the tracked effect.
    pub fn play(&mut self, id: i16, value: i32) -> Option<Rumble> {
        let effect = self.effect.as_mut().filter(|e| e.id == id)?;
        let playing = value != 0;
        effect.playing = Some(playing);
        Some(if playing { effect.rumble } else { Rumble::OFF })
    }

    pub fn erase(&mut self, id: i16) {
        if self.effect_id() == Some(id) {
            self.effect = None;
        }
    }
}
