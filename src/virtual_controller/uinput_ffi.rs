use super::PadEvent;

pub const UINPUT_PATH: &str = "/dev/uinput";

const UINPUT_IOCTL_BASE: u8 = b'U';
const UINPUT_MAX_NAME_SIZE: usize = 80;
const ABS_CNT: usize = 64;

nix::ioctl_none!(ui_dev_create, UINPUT_IOCTL_BASE, 1);
nix::ioctl_none!(ui_dev_destroy, UINPUT_IOCTL_BASE, 2);
nix::ioctl_write_int!(ui_set_evbit, UINPUT_IOCTL_BASE, 100);
nix::ioctl_write_int!(ui_set_keybit, UINPUT_IOCTL_BASE, 101);
nix::ioctl_write_int!(ui_set_absbit, UINPUT_IOCTL_BASE, 103);
nix::ioctl_write_int!(ui_set_ffbit, UINPUT_IOCTL_BASE, 107);
nix::ioctl_readwrite!(ui_begin_ff_upload, UINPUT_IOCTL_BASE, 200, UinputFFUpload);
nix::ioctl_write_ptr!(ui_end_ff_upload, UINPUT_IOCTL_BASE, 201, UinputFFUpload);
nix::ioctl_readwrite!(ui_begin_ff_erase, UINPUT_IOCTL_BASE, 202, UinputFFErase);
nix::ioctl_write_ptr!(ui_end_ff_erase, UINPUT_IOCTL_BASE, 203, UinputFFErase);

/// struct input_event: a timeval followed by type, code and value
const TIME_SIZE: usize = std::mem::size_of::<libc::timeval>();
pub const INPUT_EVENT_SIZE: usize = TIME_SIZE + 8;

/// Serialize with a zero timestamp; the kernel stamps injected events itself
pub fn encode_event(event: &PadEvent) -> [u8; INPUT_EVENT_SIZE] {
    let mut bytes = [0u8; INPUT_EVENT_SIZE];
    bytes[TIME_SIZE..TIME_SIZE + 2].copy_from_slice(&event.type_.to_ne_bytes());
    bytes[TIME_SIZE + 2..TIME_SIZE + 4].copy_from_slice(&event.code.to_ne_bytes());
    bytes[TIME_SIZE + 4..].copy_from_slice(&event.value.to_ne_bytes());
    bytes
}

pub fn decode_event(bytes: &[u8; INPUT_EVENT_SIZE]) -> PadEvent {
    let at = TIME_SIZE;
    PadEvent {
        type_: u16::from_ne_bytes([bytes[at], bytes[at + 1]]),
        code: u16::from_ne_bytes([bytes[at + 2], bytes[at + 3]]),
        value: i32::from_ne_bytes([bytes[at + 4], bytes[at + 5], bytes[at + 6], bytes[at + 7]]),
    }
}

#[repr(C)]
pub struct UinputUserDev {
    pub name: [u8; UINPUT_MAX_NAME_SIZE],
    pub id: InputId,
    pub ff_effects_max: u32,
    pub absmax: [i32; ABS_CNT],
    pub absmin: [i32; ABS_CNT],
    pub absfuzz: [i32; ABS_CNT],
    pub absflat: [i32; ABS_CNT],
}

impl UinputUserDev {
    pub fn new(name: &str, id: InputId, ff_effects_max: u32) -> Self {
        let mut dev = Self {
            name: [0; UINPUT_MAX_NAME_SIZE],
            id,
            ff_effects_max,
            absmax: [0; ABS_CNT],
            absmin: [0; ABS_CNT],
            absfuzz: [0; ABS_CNT],
            absflat: [0; ABS_CNT],
        };
        // Keep the trailing NUL
        let len = name.len().min(UINPUT_MAX_NAME_SIZE - 1);
        dev.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        dev
    }

    pub fn set_abs(&mut self, axis: u16, min: i32, max: i32, fuzz: i32, flat: i32) {
        let axis = axis as usize;
        self.absmin[axis] = min;
        self.absmax[axis] = max;
        self.absfuzz[axis] = fuzz;
        self.absflat[axis] = flat;
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) struct of integer arrays without padding
        unsafe {
            std::slice::from_raw_parts(
                self as *const _ as *const u8,
                std::mem::size_of::<UinputUserDev>(),
            )
        }
    }
}

#[repr(C)]
#[derive(Default)]
pub struct InputId {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

/// struct ff_effect. The union holds a pointer in ff_periodic_effect, so it
/// is 8 byte aligned and 32 bytes long on 64 bit targets.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FFEffect {
    pub type_: u16,
    pub id: i16,
    pub direction: u16,
    pub trigger: [u16; 2], // button, interval
    pub replay: [u16; 2],  // length, delay
    pub _pad: [u8; 2],
    pub u: [u8; 32],
}

impl FFEffect {
    /// ff_rumble_effect: strong_magnitude then weak_magnitude
    pub fn rumble_magnitudes(&self) -> (u16, u16) {
        (
            u16::from_ne_bytes([self.u[0], self.u[1]]),
            u16::from_ne_bytes([self.u[2], self.u[3]]),
        )
    }
}

#[repr(C)]
pub struct UinputFFUpload {
    pub request_id: u32,
    pub retval: i32,
    pub effect: FFEffect,
    pub old: FFEffect,
}

impl UinputFFUpload {
    pub fn new(request_id: u32) -> Self {
        let empty = FFEffect {
            type_: 0,
            id: -1,
            direction: 0,
            trigger: [0; 2],
            replay: [0; 2],
            _pad: [0; 2],
            u: [0; 32],
        };
        Self {
            request_id,
            retval: 0,
            effect: empty,
            old: empty,
        }
    }
}

#[repr(C)]
pub struct UinputFFErase {
    pub request_id: u32,
    pub retval: i32,
    pub effect_id: u32,
}

impl UinputFFErase {
    pub fn new(request_id: u32) -> Self {
        Self {
            request_id,
            retval: 0,
            effect_id: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_struct_sizes() {
        assert_eq!(std::mem::size_of::<FFEffect>(), 48);
        assert_eq!(std::mem::size_of::<UinputFFUpload>(), 104);
        assert_eq!(std::mem::size_of::<UinputFFErase>(), 12);
        assert_eq!(std::mem::size_of::<UinputUserDev>(), 80 + 8 + 4 + 4 * 64 * 4);
    }

    #[test]
    fn event_bytes_keep_type_code_value() {
        let event = PadEvent::new(0x03, 0x11, -1);
        let bytes = encode_event(&event);
        assert_eq!(bytes.len(), std::mem::size_of::<libc::input_event>());
        assert_eq!(decode_event(&bytes), event);
    }

    #[test]
    fn name_is_truncated_with_terminator() {
        let long = "x".repeat(200);
        let dev = UinputUserDev::new(&long, InputId::default(), 0);
        assert_eq!(dev.name[UINPUT_MAX_NAME_SIZE - 1], 0);
        assert_eq!(dev.name[0], b'x');
    }

    #[test]
    fn rumble_magnitudes_from_union() {
        let mut upload = UinputFFUpload::new(1);
        upload.effect.u[..4].copy_from_slice(
            &[0x1234u16.to_ne_bytes(), 0x5678u16.to_ne_bytes()].concat(),
        );
        assert_eq!(upload.effect.rumble_magnitudes(), (0x1234, 0x5678));
    }
}
